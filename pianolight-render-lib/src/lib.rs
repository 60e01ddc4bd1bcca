//! Key illumination rendering for pianolight
//!
//! Maps "which keys are active, at what intensity" onto the RGB values of an
//! addressable LED strip laid along a keyboard. The library is hardware
//! agnostic: frames go out through a [`Transport`], either as an Adalight
//! serial stream or pixel by pixel to an [`LedDriver`].
//!
//! Data flow: a dense hex line or a MIDI message is decoded by [`input`],
//! painted into the retained [`Frame`] by the [`FrameRenderer`] through the
//! [`PaletteMap`], and the [`UpdateScheduler`] decides whether the frame is
//! pushed. [`Pipeline`] wires the three together.

pub use rgb::RGB8;

pub mod input;
pub mod layout;
pub mod palette;
pub mod pipeline;
pub mod render;
pub mod schedule;
pub mod shared;
pub mod transport;

pub use input::{key_update, parse_levels, InputError, KeyUpdate, MidiMessage};
pub use layout::{Frame, StripLayout};
pub use palette::{PaletteError, PaletteMap};
pub use pipeline::{Outcome, Pipeline, Rejection};
pub use render::{FrameRenderer, KeyState, RenderError};
pub use schedule::{FrameClock, PushPolicy, UpdateScheduler, DEFAULT_FRAME_RATE, DEFAULT_PUSH_EVERY};
pub use shared::{SharedKeyState, Snapshot};
pub use transport::{
    AdalightTransport, DirectPush, LedDriver, SharedTransport, SmartLedsDriver, Transport,
    TransportError,
};
