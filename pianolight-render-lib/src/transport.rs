//! Output encodings for a rendered frame.
//!
//! - [`AdalightTransport`]: framed serial protocol written to any [`Write`] sink
//! - [`DirectPush`]: per-pixel push to an LED driver collaborator
//!
//! A failed push is reported to the caller and never retried. The frame is
//! only read, so a failure cannot corrupt it.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use derive_more::{Display, Error, From};
use log::debug;
use pianolight_adalight_format::{encode_frame_into, FrameError};
use rgb::RGB8;
use smart_leds::{brightness, SmartLedsWrite};

use crate::layout::Frame;

#[derive(Debug, Display, Error, From)]
pub enum TransportError {
    #[display("write failed: {_0}")]
    Io(io::Error),
    #[display("cannot encode frame: {_0}")]
    Encode(FrameError),
    #[display("LED driver error: {reason}")]
    #[from(ignore)]
    Driver { reason: String },
}

/// Something that can display a whole frame.
pub trait Transport {
    /// Send `frame` to the strip.
    ///
    /// # Errors
    /// Any sink or driver failure.
    fn push(&mut self, frame: &Frame) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn push(&mut self, frame: &Frame) -> Result<(), TransportError> {
        (**self).push(frame)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn push(&mut self, frame: &Frame) -> Result<(), TransportError> {
        (**self).push(frame)
    }
}

/// Writes each frame as one Adalight packet: header, then 3 bytes per LED.
///
/// Colors are scaled by the global brightness (255 = unchanged) the same way
/// `smart-leds` scales them for a directly driven strip.
///
/// `W` should be unbuffered: a `BufWriter` keeps the unsent part of a failed
/// frame and writes it ahead of the next one.
pub struct AdalightTransport<W> {
    writer: W,
    buf: Vec<u8>,
    scaled: Vec<RGB8>,
    brightness: u8,
    frames: u64,
}

impl<W: Write> AdalightTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buf: Vec::new(),
            scaled: Vec::new(),
            brightness: u8::MAX,
            frames: 0,
        }
    }

    #[must_use]
    pub fn with_brightness(mut self, brightness: u8) -> Self {
        self.brightness = brightness;
        self
    }

    /// Frames written successfully so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Transport for AdalightTransport<W> {
    fn push(&mut self, frame: &Frame) -> Result<(), TransportError> {
        if self.brightness == u8::MAX {
            encode_frame_into(&mut self.buf, frame.pixels())?;
        } else {
            self.scaled.clear();
            self.scaled
                .extend(brightness(frame.leds().iter().copied(), self.brightness));
            encode_frame_into(&mut self.buf, self.scaled.iter().map(|c| [c.r, c.g, c.b]))?;
        }
        self.writer.write_all(&self.buf)?;
        self.writer.flush()?;
        self.frames += 1;
        Ok(())
    }
}

impl<W> fmt::Debug for AdalightTransport<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdalightTransport")
            .field("brightness", &self.brightness)
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

/// LED strip driver collaborator for [`DirectPush`].
pub trait LedDriver {
    type Error: fmt::Debug;

    /// Prepare the hardware. Called once before the first frame.
    ///
    /// # Errors
    /// Driver specific.
    fn begin(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Stage one pixel; nothing is visible until [`show`](Self::show).
    ///
    /// # Errors
    /// Driver specific.
    fn set_pixel(&mut self, index: usize, color: RGB8) -> Result<(), Self::Error>;

    /// Latch all staged pixels onto the strip.
    ///
    /// # Errors
    /// Driver specific.
    fn show(&mut self) -> Result<(), Self::Error>;
}

fn driver_error<E: fmt::Debug>(e: E) -> TransportError {
    TransportError::Driver {
        reason: format!("{e:?}"),
    }
}

/// Pushes frames pixel by pixel to an [`LedDriver`].
#[derive(Debug)]
pub struct DirectPush<D> {
    driver: D,
}

impl<D: LedDriver> DirectPush<D> {
    /// Wrap `driver`, calling its `begin()`.
    ///
    /// # Errors
    /// [`TransportError::Driver`] if `begin()` fails.
    pub fn new(mut driver: D) -> Result<Self, TransportError> {
        driver.begin().map_err(driver_error)?;
        Ok(Self { driver })
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }
}

impl<D: LedDriver> Transport for DirectPush<D> {
    fn push(&mut self, frame: &Frame) -> Result<(), TransportError> {
        for (index, &color) in frame.leds().iter().enumerate() {
            self.driver.set_pixel(index, color).map_err(driver_error)?;
        }
        self.driver.show().map_err(driver_error)
    }
}

/// [`LedDriver`] over any `smart-leds` writer, with global brightness.
///
/// Pixels are staged in a buffer and written in one go on `show()`.
pub struct SmartLedsDriver<W> {
    writer: W,
    pixels: Vec<RGB8>,
    brightness: u8,
}

impl<W> SmartLedsDriver<W>
where
    W: SmartLedsWrite<Color = RGB8>,
{
    pub fn new(writer: W, led_count: usize, brightness: u8) -> Self {
        Self {
            writer,
            pixels: vec![RGB8::default(); led_count],
            brightness,
        }
    }

    pub fn set_brightness(&mut self, brightness: u8) {
        debug!("LED brightness set to {brightness}");
        self.brightness = brightness;
    }

    #[must_use]
    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }
}

impl<W> LedDriver for SmartLedsDriver<W>
where
    W: SmartLedsWrite<Color = RGB8>,
    W::Error: fmt::Debug,
{
    type Error = W::Error;

    fn set_pixel(&mut self, index: usize, color: RGB8) -> Result<(), Self::Error> {
        if index >= self.pixels.len() {
            self.pixels.resize(index + 1, RGB8::default());
        }
        self.pixels[index] = color;
        Ok(())
    }

    fn show(&mut self) -> Result<(), Self::Error> {
        self.writer
            .write(brightness(self.pixels.iter().copied(), self.brightness))
    }
}

/// A transport shared between threads; pushes are serialized by the lock.
pub struct SharedTransport<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> SharedTransport<T> {
    pub fn new(transport: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(transport)),
        }
    }

    /// Exclusive access to the inner transport.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        // Each push writes its whole packet or fails, so a poisoned lock
        // still guards a usable transport.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Clone for SharedTransport<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> Transport for SharedTransport<T> {
    fn push(&mut self, frame: &Frame) -> Result<(), TransportError> {
        self.lock().push(frame)
    }
}
