//! Strip geometry and the retained LED frame.

use std::ops::Range;

use rgb::RGB8;

/// How keys map onto the physical strip.
///
/// `led_count = keys * leds_per_key + led_offset`. The first `led_offset`
/// LEDs are never addressed by key logic; key `k` owns the LEDs
/// `led_offset + k * leds_per_key .. led_offset + (k + 1) * leds_per_key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripLayout {
    pub keys: usize,
    pub leds_per_key: usize,
    pub led_offset: usize,
}

impl StripLayout {
    #[must_use]
    pub const fn new(keys: usize, leds_per_key: usize, led_offset: usize) -> Self {
        Self {
            keys,
            leds_per_key,
            led_offset,
        }
    }

    /// Total number of LEDs on the strip, offset LEDs included.
    #[must_use]
    pub const fn led_count(&self) -> usize {
        self.keys * self.leds_per_key + self.led_offset
    }

    /// LED index range owned by `key`, or `None` if the key is out of range.
    #[must_use]
    pub fn key_leds(&self, key: usize) -> Option<Range<usize>> {
        if key >= self.keys {
            return None;
        }
        let start = self.led_offset + key * self.leds_per_key;
        Some(start..start + self.leds_per_key)
    }
}

/// The retained frame: one RGB value per LED, always `layout.led_count()` long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    layout: StripLayout,
    leds: Vec<RGB8>,
}

impl Frame {
    /// An all-black frame for `layout`.
    #[must_use]
    pub fn new(layout: StripLayout) -> Self {
        Self {
            layout,
            leds: vec![RGB8::default(); layout.led_count()],
        }
    }

    #[must_use]
    pub fn layout(&self) -> StripLayout {
        self.layout
    }

    #[must_use]
    pub fn leds(&self) -> &[RGB8] {
        &self.leds
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.leds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leds.is_empty()
    }

    /// Paint every LED owned by `key` with `color`.
    ///
    /// Returns the changed range, or `None` (frame untouched) if `key` is out
    /// of range.
    pub fn fill_key(&mut self, key: usize, color: RGB8) -> Option<Range<usize>> {
        let range = self.layout.key_leds(key)?;
        self.leds[range.clone()].fill(color);
        Some(range)
    }

    /// Set every LED to black.
    pub fn clear(&mut self) {
        self.leds.fill(RGB8::default());
    }

    /// Whether every LED is black.
    #[must_use]
    pub fn is_dark(&self) -> bool {
        self.leds.iter().all(|&led| led == RGB8::default())
    }

    /// Pixels as `[r, g, b]` byte triples, in strip order.
    pub fn pixels(&self) -> impl ExactSizeIterator<Item = [u8; 3]> + '_ {
        self.leds.iter().map(|led| [led.r, led.g, led.b])
    }
}
