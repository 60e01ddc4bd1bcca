use clap::Parser;
use pianolight_adalight_format::{AdalightFrame, FrameIter};
use std::fmt::Write;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;

/// Decode a recorded Adalight stream (e.g. `pianolight hex --output capture.ada`)
/// into human-readable output.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to the recorded stream, or `-` for stdin.
    file: PathBuf,

    /// List the lit LEDs of every frame.
    #[arg(short = 'L', long)]
    leds: bool,

    /// Skip frames in which every LED is black.
    #[arg(short, long)]
    lit_only: bool,

    /// Maximum number of frames to display.
    #[arg(short = 'n', long)]
    limit: Option<usize>,
}

fn main() {
    let args = Args::parse();

    let (input, file_size): (Box<dyn Read>, Option<u64>) = if args.file.as_os_str() == "-" {
        (Box::new(io::stdin().lock()), None)
    } else {
        match File::open(&args.file) {
            Ok(f) => {
                let size = f.metadata().map(|m| m.len()).ok();
                (Box::new(f), size)
            }
            Err(e) => {
                eprintln!("Error opening {}: {e}", args.file.display());
                std::process::exit(1);
            }
        }
    };

    println!("=== Adalight Stream ===");
    match file_size {
        Some(size) => println!("File size:        {size} bytes"),
        None => println!("File size:        (stream)"),
    }

    println!();
    println!(
        "{:>8}  {:>10}  {:>6}  {:>8}  {:>5}",
        "#", "Offset", "LEDs", "Checksum", "Lit"
    );
    println!("{}", "-".repeat(48));

    let mut frames = FrameIter::new(BufReader::new(input));
    let mut decoded = 0u64;
    let mut shown = 0usize;
    let mut failed = false;
    loop {
        let offset = frames.offset();
        let Some(result) = frames.next() else {
            break;
        };
        match result {
            Ok(frame) => {
                decoded += 1;
                let lit = frame.lit().count();
                if args.lit_only && lit == 0 {
                    continue;
                }

                shown += 1;
                if let Some(limit) = args.limit {
                    if shown > limit {
                        println!("... (truncated at {limit} frames)");
                        break;
                    }
                }

                println!(
                    "{decoded:>8}  {offset:>10}  {leds:>6}  {chk:>8}  {lit:>5}",
                    leds = frame.header.led_count(),
                    chk = format!("0x{:02x} ok", frame.header.checksum),
                );
                if args.leds && lit > 0 {
                    println!("{}", format_lit(&frame));
                }
            }
            Err(e) => {
                eprintln!("Error decoding frame {}: {e}", decoded + 1);
                failed = true;
                break;
            }
        }
    }

    println!("{}", "-".repeat(48));
    println!("Frames decoded:   {decoded}");
    if failed {
        std::process::exit(1);
    }
}

/// One `index:rrggbb` entry per lit LED, indented under the frame line.
fn format_lit(frame: &AdalightFrame) -> String {
    let mut out = String::from("          ");
    for (i, (index, [r, g, b])) in frame.lit().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        write!(out, "{index}:{r:02x}{g:02x}{b:02x}").unwrap();
    }
    out
}
