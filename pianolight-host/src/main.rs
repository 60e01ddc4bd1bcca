//! `pianolight`: light the keys of a piano on an addressable LED strip.
//!
//! Input is one of dense hex lines on stdin (`hex`), a live MIDI port
//! (`midi`) or raw MIDI over TCP (`serve`). Output is an Adalight stream to a
//! serial device, a file or stdout.

use std::io;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use log::{error, info};
use pianolight_render_lib::{AdalightTransport, FrameRenderer, Pipeline, PushPolicy, SharedTransport};

mod config;
mod error;
mod hex_mode;
mod midi_mode;
mod output;
mod shutdown;
mod tcp_server;

use config::{HostConfig, LogLevel};
use error::HostError;
use shutdown::Shutdown;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

/// Options shared by every mode. Each one overrides the config file.
#[derive(Args, Debug, Default)]
struct CommonArgs {
    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// JSON palette file (list of [r, g, b]).
    #[arg(short, long, global = true)]
    palette: Option<PathBuf>,

    /// Number of keys.
    #[arg(short, long, global = true)]
    keys: Option<usize>,

    /// LEDs lit per key.
    #[arg(long, global = true)]
    leds_per_key: Option<usize>,

    /// Unused LEDs before the first key.
    #[arg(long, global = true)]
    led_offset: Option<usize>,

    /// Palette rotation (any integer, negative allowed).
    #[arg(short, long, global = true, allow_negative_numbers = true)]
    rotation: Option<i64>,

    /// Global brightness, 0-255.
    #[arg(short, long, global = true)]
    brightness: Option<u8>,

    /// Adalight output: serial device, file, or `-` for stdout.
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Log level (RUST_LOG takes precedence).
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read dense hex lines (2 hex digits per key) from stdin.
    Hex {
        /// Push every Nth valid line (1 = every line).
        #[arg(short = 'n', long)]
        push_every: Option<u32>,
    },
    /// Read note events from a MIDI input port.
    Midi {
        /// Port index or name fragment (default: first port).
        #[arg(long)]
        port: Option<String>,

        /// MIDI note number of the lowest key.
        #[arg(short, long)]
        first_key: Option<u8>,

        /// Render at a fixed rate instead of on every event (60 without a
        /// value).
        #[arg(long, num_args = 0..=1, default_missing_value = "60")]
        fps: Option<u32>,

        /// List input ports and exit.
        #[arg(long)]
        list: bool,
    },
    /// Accept raw 3-byte MIDI messages over TCP.
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,

        /// TCP port (default 9080).
        #[arg(long)]
        port: Option<u16>,

        /// MIDI note number of the lowest key.
        #[arg(short, long)]
        first_key: Option<u8>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = HostConfig::load(cli.common.config.as_deref());
    let log_level = cli
        .common
        .log_level
        .or_else(|| loaded.as_ref().ok().map(|c| c.log_level))
        .unwrap_or_default();
    env_logger::Builder::new()
        .filter_level(log_level.as_level_filter())
        .parse_default_env()
        .init();

    let result = loaded.and_then(|mut config| {
        apply_overrides(&mut config, &cli);
        run(&cli.command, &config)
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Fold command line options into the loaded configuration.
fn apply_overrides(config: &mut HostConfig, cli: &Cli) {
    let args = &cli.common;
    if let Some(palette) = &args.palette {
        config.palette.clone_from(palette);
    }
    if let Some(keys) = args.keys {
        config.keys = keys;
    }
    if let Some(n) = args.leds_per_key {
        config.leds_per_key = n;
    }
    if let Some(n) = args.led_offset {
        config.led_offset = n;
    }
    if let Some(rotation) = args.rotation {
        config.rotation = rotation;
    }
    if let Some(brightness) = args.brightness {
        config.brightness = brightness;
    }
    if let Some(output) = &args.output {
        config.output.clone_from(output);
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    match &cli.command {
        Command::Hex { push_every } => {
            if let Some(n) = push_every {
                config.push_every = *n;
            }
        }
        Command::Midi { first_key, fps, .. } => {
            if let Some(key) = first_key {
                config.first_key = *key;
            }
            if fps.is_some() {
                config.frame_rate = *fps;
            }
        }
        Command::Serve {
            port, first_key, ..
        } => {
            if let Some(key) = first_key {
                config.first_key = *key;
            }
            if let Some(port) = port {
                config.listen_port = *port;
            }
        }
    }
}

fn run(command: &Command, config: &HostConfig) -> Result<(), HostError> {
    if let Command::Midi { list: true, .. } = command {
        for (index, name) in midi_mode::list_ports()?.iter().enumerate() {
            println!("{index}: {name}");
        }
        return Ok(());
    }

    info!("Starting pianolight v{}", env!("CARGO_PKG_VERSION"));

    // Everything that can fail on bad configuration happens before any input
    // is read.
    let layout = config.layout()?;
    let palette = config.load_palette()?;
    info!(
        "Strip: {} keys x {} LEDs + {} offset = {} LEDs",
        layout.keys,
        layout.leds_per_key,
        layout.led_offset,
        layout.led_count()
    );
    let shutdown = Shutdown::install()?;
    let sink = output::open(&config.output)?;
    let transport = AdalightTransport::new(sink).with_brightness(config.brightness);

    match command {
        Command::Hex { .. } => {
            let policy = PushPolicy::every(config.push_every);
            let mut pipeline = Pipeline::new(
                FrameRenderer::new(layout, palette),
                policy,
                transport,
                config.first_key,
            );
            let stdin = io::BufReader::new(io::stdin());
            hex_mode::run(&mut pipeline, stdin, &shutdown)
        }
        Command::Midi { port, .. } => {
            let pipeline = Pipeline::new(
                FrameRenderer::new(layout, palette),
                PushPolicy::Immediate,
                transport,
                config.first_key,
            );
            match config.frame_rate {
                Some(fps) => midi_mode::run_fixed_rate(pipeline, port.as_deref(), fps, &shutdown),
                None => midi_mode::run_event_driven(pipeline, port.as_deref(), &shutdown),
            }
        }
        Command::Serve { bind, .. } => {
            let listener = TcpListener::bind((bind.as_str(), config.listen_port))?;
            let template = tcp_server::ConnectionTemplate {
                layout,
                palette,
                first_key: config.first_key,
            };
            tcp_server::run(&listener, &SharedTransport::new(transport), &template, &shutdown)
        }
    }
}
