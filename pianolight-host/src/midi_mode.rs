//! `pianolight midi`: live MIDI input through `midir`.
//!
//! Two shapes:
//! - event driven: the MIDI callback renders and pushes every note itself
//! - fixed rate: the callback only updates [`SharedKeyState`]; the main loop
//!   renders a snapshot at most `fps` times per second when something changed

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiInputPort};
use pianolight_render_lib::{
    key_update, FrameClock, MidiMessage, Outcome, Pipeline, SharedKeyState, Transport,
    TransportError,
};

use crate::error::HostError;
use crate::shutdown::Shutdown;

const CLIENT_NAME: &str = "pianolight";
const CONNECTION_NAME: &str = "pianolight-in";

/// How often the event-driven main thread checks for shutdown.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Names of all MIDI input ports, in port order.
pub fn list_ports() -> Result<Vec<String>, HostError> {
    let input = MidiInput::new(CLIENT_NAME).map_err(HostError::midi)?;
    input
        .ports()
        .iter()
        .map(|port| input.port_name(port).map_err(HostError::midi))
        .collect()
}

/// Pick a port by index or by case-insensitive name fragment; the first port
/// when nothing is asked for.
fn select_port(names: &[String], wanted: Option<&str>) -> Option<usize> {
    let Some(wanted) = wanted else {
        return (!names.is_empty()).then_some(0);
    };
    if let Ok(index) = wanted.parse::<usize>() {
        return (index < names.len()).then_some(index);
    }
    let wanted = wanted.to_lowercase();
    names
        .iter()
        .position(|name| name.to_lowercase().contains(&wanted))
}

fn open_port(wanted: Option<&str>) -> Result<(MidiInput, MidiInputPort, String), HostError> {
    let mut input = MidiInput::new(CLIENT_NAME).map_err(HostError::midi)?;
    // Clock, active sensing and sysex are never note events.
    input.ignore(Ignore::All);

    let ports = input.ports();
    let names = ports
        .iter()
        .map(|port| input.port_name(port).map_err(HostError::midi))
        .collect::<Result<Vec<_>, _>>()?;
    let index = select_port(&names, wanted).ok_or_else(|| {
        HostError::midi(match wanted {
            Some(w) => format!("no input port matching '{w}' (have: {})", names.join(", ")),
            None => "no MIDI input ports available".to_string(),
        })
    })?;
    let name = names[index].clone();
    Ok((input, ports[index].clone(), name))
}

/// Push every note as it arrives.
pub fn run_event_driven<T>(
    pipeline: Pipeline<T>,
    port: Option<&str>,
    shutdown: &Shutdown,
) -> Result<(), HostError>
where
    T: Transport + Send + 'static,
{
    let (input, port, name) = open_port(port)?;
    let pipeline = Arc::new(Mutex::new(pipeline));
    let failure: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

    let connection = {
        let pipeline = Arc::clone(&pipeline);
        let failure = Arc::clone(&failure);
        let shutdown = shutdown.clone();
        input
            .connect(
                &port,
                CONNECTION_NAME,
                move |_timestamp: u64, bytes: &[u8], _: &mut ()| {
                    on_event(&pipeline, &failure, &shutdown, bytes);
                },
                (),
            )
            .map_err(HostError::midi)?
    };
    info!("Listening on MIDI port '{name}'. Press Ctrl-C to exit.");

    while !shutdown.requested() {
        thread::sleep(IDLE_POLL);
    }
    close(connection);

    let mut pipeline = pipeline.lock().unwrap_or_else(PoisonError::into_inner);
    let blank = pipeline.shutdown();
    let failure = failure.lock().unwrap_or_else(PoisonError::into_inner).take();
    finish(failure, blank)
}

/// Render the shared key state at a fixed rate.
pub fn run_fixed_rate<T: Transport>(
    mut pipeline: Pipeline<T>,
    port: Option<&str>,
    fps: u32,
    shutdown: &Shutdown,
) -> Result<(), HostError> {
    let (input, port, name) = open_port(port)?;
    let layout = pipeline.renderer().layout();
    let state = Arc::new(SharedKeyState::new(layout.keys));
    state.set_rotation(pipeline.renderer().palette().rotation());
    let first_key = pipeline.first_key();

    let connection = {
        let state = Arc::clone(&state);
        input
            .connect(
                &port,
                CONNECTION_NAME,
                move |_timestamp: u64, bytes: &[u8], _: &mut ()| {
                    let update = MidiMessage::from_bytes(bytes)
                        .and_then(|msg| key_update(msg, first_key, layout.keys));
                    match update {
                        Ok(update) => {
                            if let Err(e) = state.set(update) {
                                warn!("{e}");
                            }
                        }
                        Err(e) => warn!("{e}"),
                    }
                },
                (),
            )
            .map_err(HostError::midi)?
    };
    info!("Listening on MIDI port '{name}' at {fps} fps. Press Ctrl-C to exit.");

    let failure = run_frames(&mut pipeline, &state, fps, shutdown);
    close(connection);

    let blank = pipeline.shutdown();
    finish(failure, blank)
}

/// Handle one event from the MIDI callback. After the first failed push
/// every later event is dropped until the main thread shuts down.
fn on_event<T: Transport>(
    pipeline: &Mutex<Pipeline<T>>,
    failure: &Mutex<Option<TransportError>>,
    shutdown: &Shutdown,
    bytes: &[u8],
) {
    if failure
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .is_some()
    {
        return;
    }
    let mut pipeline = pipeline.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(e) = pipeline.handle_message(bytes) {
        error!("Transport failed: {e}");
        *failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(e);
        shutdown.request();
    }
}

/// Render `state` when it changed since the last tick. Returns whether a
/// frame was pushed.
fn tick<T: Transport>(
    pipeline: &mut Pipeline<T>,
    state: &SharedKeyState,
) -> Result<bool, TransportError> {
    let Some(snapshot) = state.take_snapshot() else {
        return Ok(false);
    };
    let outcome = pipeline.render_snapshot(&snapshot)?;
    Ok(outcome == Outcome::Pushed)
}

/// Tick at `fps` until shutdown or the first failed push.
fn run_frames<T: Transport>(
    pipeline: &mut Pipeline<T>,
    state: &SharedKeyState,
    fps: u32,
    shutdown: &Shutdown,
) -> Option<TransportError> {
    let mut clock = FrameClock::from_rate(fps);
    while !shutdown.requested() {
        clock.wait();
        if let Err(e) = tick(pipeline, state) {
            error!("Transport failed: {e}");
            return Some(e);
        }
    }
    None
}

fn close<T>(connection: MidiInputConnection<T>) {
    debug!("Closing MIDI connection");
    drop(connection.close());
}

fn finish(
    failure: Option<TransportError>,
    blank: Result<(), TransportError>,
) -> Result<(), HostError> {
    if let Err(e) = &blank {
        warn!("Could not blank strip: {e}");
    }
    match failure {
        Some(e) => Err(e.into()),
        None => blank.map_err(HostError::from),
    }
}
