//! `pianolight serve`: raw 3-byte MIDI messages over TCP.
//!
//! Every connection gets its own renderer and pushes whole frames through the
//! shared transport. A transport failure closes only the connection that hit
//! it.

use std::io::{self, Read};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};
use pianolight_render_lib::{
    FrameRenderer, PaletteMap, Pipeline, PushPolicy, SharedTransport, StripLayout, Transport,
};

use crate::error::HostError;
use crate::shutdown::Shutdown;

/// Sleep between accept attempts when no client is waiting.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Read timeout so connection threads notice shutdown.
const READ_TIMEOUT: Duration = Duration::from_millis(200);

const MESSAGE_LEN: usize = 3;

/// What each connection needs to build its own pipeline.
#[derive(Debug, Clone)]
pub struct ConnectionTemplate {
    pub layout: StripLayout,
    pub palette: PaletteMap,
    pub first_key: u8,
}

impl ConnectionTemplate {
    fn pipeline<T: Transport>(&self, transport: T) -> Pipeline<T> {
        let renderer = FrameRenderer::new(self.layout, self.palette.clone());
        Pipeline::new(renderer, PushPolicy::Immediate, transport, self.first_key)
    }
}

/// Accept clients until shutdown, then wait for them and blank the strip once.
pub fn run<T>(
    listener: &TcpListener,
    transport: &SharedTransport<T>,
    template: &ConnectionTemplate,
    shutdown: &Shutdown,
) -> Result<(), HostError>
where
    T: Transport + Send + 'static,
{
    listener.set_nonblocking(true)?;
    info!("MIDI server listening on {}", listener.local_addr()?);

    let mut clients: Vec<JoinHandle<()>> = Vec::new();
    while !shutdown.requested() {
        match listener.accept() {
            Ok((stream, addr)) => {
                info!("Client connected: {addr}");
                let pipeline = template.pipeline(transport.clone());
                let shutdown = shutdown.clone();
                clients.push(thread::spawn(move || {
                    if let Err(e) = handle_client(stream, pipeline, &shutdown) {
                        error!("Client {addr}: {e}");
                    }
                    info!("Client disconnected: {addr}");
                }));
                clients.retain(|client| !client.is_finished());
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                warn!("Accept error: {e}");
            }
        }
    }

    info!("Stopping MIDI server, waiting for {} clients", clients.len());
    for client in clients {
        if client.join().is_err() {
            warn!("Client thread panicked");
        }
    }

    template.pipeline(transport.clone()).shutdown()?;
    Ok(())
}

/// Read messages from one client until it disconnects, shutdown is requested
/// or a push fails.
fn handle_client<T: Transport>(
    mut stream: TcpStream,
    mut pipeline: Pipeline<T>,
    shutdown: &Shutdown,
) -> Result<(), HostError> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;

    let mut pending = Vec::with_capacity(64);
    let mut chunk = [0u8; 64];
    while !shutdown.requested() {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&chunk[..n]);
                for message in drain_messages(&mut pending) {
                    pipeline.handle_message(&message)?;
                }
            }
            Err(ref e)
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    if !pending.is_empty() {
        debug!("Dropping {} trailing bytes", pending.len());
    }
    Ok(())
}

/// Split off every complete message, leaving a partial one in `pending`.
fn drain_messages(pending: &mut Vec<u8>) -> Vec<[u8; MESSAGE_LEN]> {
    let complete = pending.len() - pending.len() % MESSAGE_LEN;
    let messages = pending[..complete]
        .chunks_exact(MESSAGE_LEN)
        .map(|c| [c[0], c[1], c[2]])
        .collect();
    pending.drain(..complete);
    messages
}
