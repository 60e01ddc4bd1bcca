//! Input-to-strip pipeline: decode, render, schedule, push.

use derive_more::{Display, From};
use log::{debug, info, warn};

use crate::input::{key_update, parse_levels, InputError, MidiMessage};
use crate::render::{FrameRenderer, RenderError};
use crate::schedule::{PushPolicy, UpdateScheduler};
use crate::shared::Snapshot;
use crate::transport::{Transport, TransportError};

/// Why an input was skipped. The retained frame is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Display, From)]
pub enum Rejection {
    Input(InputError),
    Render(RenderError),
}

/// What happened to one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Rendered and pushed to the transport.
    Pushed,
    /// Rendered, push held back by the scheduler (or the pipeline is shut down).
    Held,
    /// Invalid input, reported and skipped.
    Rejected(Rejection),
}

/// Owns a renderer, a scheduler and a transport.
///
/// Recoverable input problems come back as [`Outcome::Rejected`]; transport
/// failures come back as `Err` and should end the session.
#[derive(Debug)]
pub struct Pipeline<T> {
    renderer: FrameRenderer,
    scheduler: UpdateScheduler,
    transport: T,
    first_key: u8,
    shut_down: bool,
}

impl<T: Transport> Pipeline<T> {
    pub fn new(renderer: FrameRenderer, policy: PushPolicy, transport: T, first_key: u8) -> Self {
        Self {
            renderer,
            scheduler: UpdateScheduler::new(policy),
            transport,
            first_key,
            shut_down: false,
        }
    }

    #[must_use]
    pub fn renderer(&self) -> &FrameRenderer {
        &self.renderer
    }

    #[must_use]
    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// MIDI note number of key 0.
    #[must_use]
    pub fn first_key(&self) -> u8 {
        self.first_key
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Handle one dense hex line.
    ///
    /// # Errors
    /// A push that fails.
    pub fn handle_line(&mut self, line: &str) -> Result<Outcome, TransportError> {
        if self.shut_down {
            return Ok(Outcome::Held);
        }
        let keys = self.renderer.layout().keys;
        let rendered = parse_levels(line, keys)
            .map_err(Rejection::from)
            .and_then(|levels| self.renderer.render_levels(&levels).map_err(Rejection::from));
        self.finish(rendered)
    }

    /// Handle one raw MIDI message.
    ///
    /// # Errors
    /// A push that fails.
    pub fn handle_message(&mut self, bytes: &[u8]) -> Result<Outcome, TransportError> {
        if self.shut_down {
            return Ok(Outcome::Held);
        }
        let keys = self.renderer.layout().keys;
        let rendered = MidiMessage::from_bytes(bytes)
            .and_then(|msg| key_update(msg, self.first_key, keys))
            .map_err(Rejection::from)
            .and_then(|update| {
                debug!("key {} -> {:.3}", update.key, update.intensity);
                self.renderer.apply(update).map(drop).map_err(Rejection::from)
            });
        self.finish(rendered)
    }

    /// Render a whole snapshot taken from shared key state.
    ///
    /// # Errors
    /// A push that fails.
    pub fn render_snapshot(&mut self, snapshot: &Snapshot) -> Result<Outcome, TransportError> {
        if self.shut_down {
            return Ok(Outcome::Held);
        }
        self.renderer.palette_mut().set_rotation(snapshot.rotation);
        let rendered = self
            .renderer
            .render_dense(&snapshot.intensities)
            .map_err(Rejection::from);
        self.finish(rendered)
    }

    /// Change the palette rotation and repaint. The new colors go out with
    /// the next push.
    pub fn set_rotation(&mut self, rotation: i64) {
        self.renderer.palette_mut().set_rotation(rotation);
        self.renderer.rerender();
    }

    /// Push the current frame unconditionally (unless shut down).
    ///
    /// # Errors
    /// Whatever the transport reports.
    pub fn push(&mut self) -> Result<(), TransportError> {
        if self.shut_down {
            return Ok(());
        }
        self.transport.push(self.renderer.frame())
    }

    /// Blank the strip and stop pushing. Only the first call sends anything.
    ///
    /// # Errors
    /// Whatever the transport reports for the blank frame.
    pub fn shutdown(&mut self) -> Result<(), TransportError> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        info!(
            "Blanking strip ({} frames pushed, {} held)",
            self.scheduler.pushed(),
            self.scheduler.skipped()
        );
        self.renderer.blank();
        self.transport.push(self.renderer.frame())
    }

    fn finish(&mut self, rendered: Result<(), Rejection>) -> Result<Outcome, TransportError> {
        if let Err(rejection) = rendered {
            warn!("{rejection}");
            return Ok(Outcome::Rejected(rejection));
        }
        if self.scheduler.frame_ready() {
            self.transport.push(self.renderer.frame())?;
            Ok(Outcome::Pushed)
        } else {
            Ok(Outcome::Held)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{NOTE_OFF, NOTE_ON};
    use crate::layout::StripLayout;
    use crate::palette::PaletteMap;
    use crate::shared::SharedKeyState;
    use crate::transport::tests::{BrokenPipe, RecordingDriver};
    use crate::transport::{AdalightTransport, DirectPush};
    use pianolight_adalight_format::FrameIter;
    use rgb::RGB8;

    fn rgb_palette() -> PaletteMap {
        PaletteMap::new(vec![
            RGB8::new(255, 0, 0),
            RGB8::new(0, 255, 0),
            RGB8::new(0, 0, 255),
        ])
        .unwrap()
    }

    fn hex_pipeline(policy: PushPolicy) -> Pipeline<AdalightTransport<Vec<u8>>> {
        let renderer = FrameRenderer::new(StripLayout::new(3, 1, 0), rgb_palette());
        Pipeline::new(renderer, policy, AdalightTransport::new(Vec::new()), 36)
    }

    fn pushed_frames(pipeline: &Pipeline<AdalightTransport<Vec<u8>>>) -> Vec<Vec<[u8; 3]>> {
        FrameIter::new(pipeline.transport().get_ref().as_slice())
            .map(|frame| frame.unwrap().pixels)
            .collect()
    }

    #[test]
    fn test_hex_line_renders_and_pushes() {
        let mut pipeline = hex_pipeline(PushPolicy::Immediate);
        assert_eq!(pipeline.handle_line("ff8000\n").unwrap(), Outcome::Pushed);

        assert_eq!(
            pushed_frames(&pipeline),
            vec![vec![[255, 0, 0], [0, 128, 0], [0, 0, 0]]]
        );
    }

    #[test]
    fn test_default_throttle_pushes_every_third_line() {
        let mut pipeline = hex_pipeline(PushPolicy::default());
        let outcomes: Vec<Outcome> = ["010101", "020202", "030303", "040404", "050505", "060606"]
            .iter()
            .map(|line| pipeline.handle_line(line).unwrap())
            .collect();

        assert_eq!(
            outcomes,
            vec![
                Outcome::Held,
                Outcome::Held,
                Outcome::Pushed,
                Outcome::Held,
                Outcome::Held,
                Outcome::Pushed
            ]
        );
        let frames = pushed_frames(&pipeline);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][0], [3, 0, 0]);
        assert_eq!(frames[1][0], [6, 0, 0]);
    }

    #[test]
    fn test_invalid_lines_do_not_advance_throttle() {
        let mut pipeline = hex_pipeline(PushPolicy::default());
        pipeline.handle_line("ff0000").unwrap();
        let before = pipeline.renderer().frame().clone();

        for bad in ["", "zz", "ff000", "ff00000", "hello world"] {
            let outcome = pipeline.handle_line(bad).unwrap();
            assert!(
                matches!(outcome, Outcome::Rejected(Rejection::Input(InputError::BadLine { .. }))),
                "{bad:?} -> {outcome:?}"
            );
            assert_eq!(pipeline.renderer().frame(), &before);
        }

        assert_eq!(pipeline.handle_line("ff0000").unwrap(), Outcome::Held);
        assert_eq!(pipeline.handle_line("ff0000").unwrap(), Outcome::Pushed);
    }

    #[test]
    fn test_note_on_then_off() {
        let layout = StripLayout::new(61, 2, 3);
        let renderer = FrameRenderer::new(layout, rgb_palette());
        let driver = DirectPush::new(RecordingDriver::default()).unwrap();
        let mut pipeline = Pipeline::new(renderer, PushPolicy::Immediate, driver, 36);

        assert_eq!(pipeline.handle_message(&[NOTE_ON, 40, 64]).unwrap(), Outcome::Pushed);
        // key 4 -> palette[1] (green) at 128/255
        let leds = pipeline.renderer().frame().leds();
        assert_eq!(leds[3 + 8], RGB8::new(0, 128, 0));
        assert_eq!(leds[3 + 9], RGB8::new(0, 128, 0));
        assert_eq!(leds.iter().filter(|&&c| c != RGB8::default()).count(), 2);

        assert_eq!(pipeline.handle_message(&[NOTE_OFF, 40, 0]).unwrap(), Outcome::Pushed);
        assert!(pipeline.renderer().frame().is_dark());
        assert_eq!(pipeline.transport().driver().shown.len(), 2);
    }

    #[test]
    fn test_unknown_midi_is_ignored() {
        let mut pipeline = hex_pipeline(PushPolicy::Immediate);
        let outcome = pipeline.handle_message(&[0xB0, 1, 2]).unwrap();
        assert!(matches!(
            outcome,
            Outcome::Rejected(Rejection::Input(InputError::UnknownStatus { status: 0xB0, .. }))
        ));
        let outcome = pipeline.handle_message(&[0x90, 1]).unwrap();
        assert!(matches!(
            outcome,
            Outcome::Rejected(Rejection::Input(InputError::BadMessage { .. }))
        ));
        assert!(pushed_frames(&pipeline).is_empty());
    }

    #[test]
    fn test_transport_failure_surfaces_and_keeps_frame() {
        let renderer = FrameRenderer::new(StripLayout::new(3, 1, 0), rgb_palette());
        let mut pipeline = Pipeline::new(
            renderer,
            PushPolicy::Immediate,
            AdalightTransport::new(BrokenPipe),
            36,
        );

        let err = pipeline.handle_line("ff8000").unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
        assert_eq!(
            pipeline.renderer().frame().leds(),
            &[RGB8::new(255, 0, 0), RGB8::new(0, 128, 0), RGB8::new(0, 0, 0)]
        );
    }

    #[test]
    fn test_snapshot_render() {
        let renderer = FrameRenderer::new(StripLayout::new(3, 1, 0), rgb_palette());
        let mut pipeline = Pipeline::new(
            renderer,
            PushPolicy::Immediate,
            AdalightTransport::new(Vec::new()),
            36,
        );
        let state = SharedKeyState::new(3);
        state.set_rotation(1);
        state
            .set(crate::input::KeyUpdate {
                key: 0,
                intensity: 1.0,
            })
            .unwrap();

        let snapshot = state.take_snapshot().unwrap();
        assert_eq!(pipeline.render_snapshot(&snapshot).unwrap(), Outcome::Pushed);
        assert_eq!(pushed_frames(&pipeline), vec![vec![[0, 255, 0], [0, 0, 0], [0, 0, 0]]]);
    }

    #[test]
    fn test_shutdown_blanks_exactly_once() {
        let mut pipeline = hex_pipeline(PushPolicy::Immediate);
        pipeline.handle_line("ffffff").unwrap();

        pipeline.shutdown().unwrap();
        pipeline.shutdown().unwrap();
        assert_eq!(pipeline.handle_line("ffffff").unwrap(), Outcome::Held);
        pipeline.push().unwrap();

        let frames = pushed_frames(&pipeline);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], vec![[0, 0, 0]; 3]);
        assert!(pipeline.is_shut_down());
    }

    #[test]
    fn test_set_rotation_repaints() {
        let mut pipeline = hex_pipeline(PushPolicy::Immediate);
        pipeline.handle_line("ff0000").unwrap();
        pipeline.set_rotation(2);
        pipeline.push().unwrap();

        let frames = pushed_frames(&pipeline);
        assert_eq!(frames[1][0], [0, 0, 255]);
    }
}
