//! `pianolight hex`: dense hex lines on stdin, one per analysis frame.

use std::io::BufRead;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use log::{debug, info, warn};
use pianolight_render_lib::{Pipeline, Transport};

use crate::error::HostError;
use crate::shutdown::Shutdown;

/// Lines buffered between the reader thread and the render loop.
const LINE_QUEUE: usize = 64;

/// How often the render loop checks for shutdown while no input arrives.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Feed lines from `input` through `pipeline` until EOF or shutdown, then
/// blank the strip.
///
/// A transport failure stops the loop; the blank is still attempted and the
/// first failure is returned.
pub fn run<T, R>(pipeline: &mut Pipeline<T>, input: R, shutdown: &Shutdown) -> Result<(), HostError>
where
    T: Transport,
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel::<String>(LINE_QUEUE);
    std::thread::spawn(move || read_lines(input, &tx));

    info!("Reading hex lines ({} keys per line)", pipeline.renderer().layout().keys);

    let mut result = Ok(());
    while !shutdown.requested() {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                if let Err(e) = pipeline.handle_line(&line) {
                    result = Err(e.into());
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Input closed");
                break;
            }
        }
    }

    if shutdown.requested() {
        info!("Interrupted");
    }
    let scheduler = pipeline.scheduler();
    info!(
        "Processed {} valid lines, pushed {}",
        scheduler.pushed() + scheduler.skipped(),
        scheduler.pushed()
    );

    if let Err(e) = pipeline.shutdown() {
        warn!("Could not blank strip: {e}");
        if result.is_ok() {
            result = Err(e.into());
        }
    }
    result
}

fn read_lines<R: BufRead>(mut input: R, tx: &mpsc::SyncSender<String>) {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match input.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Error reading input: {e}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pianolight_adalight_format::FrameIter;
    use pianolight_render_lib::{
        AdalightTransport, FrameRenderer, PaletteMap, PushPolicy, StripLayout, RGB8,
    };
    use std::io::{self, Cursor, Write};

    fn pipeline<W: Write>(writer: W, push_every: u32) -> Pipeline<AdalightTransport<W>> {
        let palette = PaletteMap::new(vec![
            RGB8::new(255, 0, 0),
            RGB8::new(0, 255, 0),
            RGB8::new(0, 0, 255),
        ])
        .unwrap();
        let renderer = FrameRenderer::new(StripLayout::new(3, 1, 0), palette);
        Pipeline::new(
            renderer,
            PushPolicy::every(push_every),
            AdalightTransport::new(writer),
            36,
        )
    }

    #[test]
    fn test_stream_until_eof_then_blank() {
        let input = Cursor::new(b"ff8000\nnot hex\n010203\n\xff\xfe\n040506\n".to_vec());
        let mut pipeline = pipeline(Vec::new(), 3);

        run(&mut pipeline, input, &Shutdown::default()).unwrap();

        let frames: Vec<Vec<[u8; 3]>> = FrameIter::new(pipeline.transport().get_ref().as_slice())
            .map(|f| f.unwrap().pixels)
            .collect();
        // 3 valid lines -> one push of the third, then the blank frame.
        assert_eq!(
            frames,
            vec![vec![[4, 0, 0], [0, 5, 0], [0, 0, 6]], vec![[0, 0, 0]; 3]]
        );
        assert!(pipeline.is_shut_down());
    }

    #[test]
    fn test_shutdown_before_input() {
        let shutdown = Shutdown::default();
        shutdown.request();
        let mut pipeline = pipeline(Vec::new(), 1);

        run(&mut pipeline, Cursor::new(b"ffffff\n".to_vec()), &shutdown).unwrap();

        let frames = FrameIter::new(pipeline.transport().get_ref().as_slice()).count();
        assert_eq!(frames, 1);
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "tty hung up"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_transport_failure_is_fatal() {
        let mut pipeline = pipeline(FailingSink, 1);
        let err = run(&mut pipeline, Cursor::new(b"ffffff\n".to_vec()), &Shutdown::default())
            .unwrap_err();
        assert!(matches!(err, HostError::Transport(_)));
        assert!(pipeline.is_shut_down());
    }
}
