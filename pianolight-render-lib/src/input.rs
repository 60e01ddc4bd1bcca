//! Decoding of the two input shapes: dense hex lines and 3-byte MIDI messages.

use derive_more::{Display, Error};

/// MIDI note-on status byte (channel 1).
pub const NOTE_ON: u8 = 0x90;
/// MIDI note-off status byte (channel 1).
pub const NOTE_OFF: u8 = 0x80;

/// Errors decoding an input line or message. All of them are recoverable:
/// the caller reports and skips the input.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum InputError {
    #[display("bad input: {line}")]
    BadLine { line: String },
    #[display("MIDI message must be 3 bytes, got {bytes:02x?}")]
    BadMessage { bytes: Vec<u8> },
    #[display("unknown MIDI status {status:#04x} in {message:02x?}")]
    UnknownStatus { status: u8, message: [u8; 3] },
    #[display("note {note} maps to key {key}, outside 0..{key_count}")]
    KeyOutOfRange {
        note: u8,
        key: i32,
        key_count: usize,
    },
}

/// Byte level (0-255) to normalized intensity.
#[must_use]
pub fn level_to_intensity(level: u8) -> f64 {
    f64::from(level) / 255.0
}

/// MIDI velocity (0-127) to byte level. Velocity 127 gives 254.
#[must_use]
pub fn velocity_to_level(velocity: u8) -> u8 {
    velocity.min(127) * 2
}

/// Validate a dense line and return its hex digits.
///
/// Leading whitespace is skipped, then exactly `keys * 2` hex digits
/// (either case) must follow, ending at the end of the line or at a
/// non-word character.
///
/// # Errors
/// Returns [`InputError::BadLine`] carrying the trimmed line otherwise.
pub fn parse_hex_line(line: &str, keys: usize) -> Result<&str, InputError> {
    let body = line.trim_start();
    let digits = keys * 2;
    let bad = || InputError::BadLine {
        line: line.trim().to_string(),
    };

    let Some(hex) = body.get(..digits) else {
        return Err(bad());
    };
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(bad());
    }
    match body[digits..].chars().next() {
        Some(c) if c.is_alphanumeric() || c == '_' => Err(bad()),
        _ => Ok(hex),
    }
}

/// Decode a dense line into one byte level per key.
///
/// # Errors
/// Returns [`InputError::BadLine`] if the line does not validate.
pub fn parse_levels(line: &str, keys: usize) -> Result<Vec<u8>, InputError> {
    let hex = parse_hex_line(line, keys)?;
    hex::decode(hex).map_err(|_| InputError::BadLine {
        line: line.trim().to_string(),
    })
}

/// A raw 3-byte MIDI message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiMessage {
    pub status: u8,
    pub key: u8,
    pub velocity: u8,
}

impl MidiMessage {
    /// # Errors
    /// Returns [`InputError::BadMessage`] unless `bytes` is exactly 3 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InputError> {
        match *bytes {
            [status, key, velocity] => Ok(Self {
                status,
                key,
                velocity,
            }),
            _ => Err(InputError::BadMessage {
                bytes: bytes.to_vec(),
            }),
        }
    }

    #[must_use]
    pub fn to_bytes(self) -> [u8; 3] {
        [self.status, self.key, self.velocity]
    }
}

/// A single-key change to apply to the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyUpdate {
    pub key: usize,
    pub intensity: f64,
}

impl KeyUpdate {
    /// Byte level this update was built from.
    #[must_use]
    pub fn level(&self) -> u8 {
        // intensity is always level / 255 with level in 0..=255
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let level = (self.intensity * 255.0).round().clamp(0.0, 255.0) as u8;
        level
    }
}

/// Turn a MIDI message into a key update.
///
/// Note-on sets the key to `velocity * 2 / 255` (a velocity of 0 therefore
/// renders black); note-off sets it to 0. The key index is
/// `msg.key - first_key`.
///
/// # Errors
/// [`InputError::UnknownStatus`] for any status other than note-on/off,
/// [`InputError::KeyOutOfRange`] if the key index falls outside `0..key_count`.
pub fn key_update(
    msg: MidiMessage,
    first_key: u8,
    key_count: usize,
) -> Result<KeyUpdate, InputError> {
    let level = match msg.status {
        NOTE_ON => velocity_to_level(msg.velocity),
        NOTE_OFF => 0,
        status => {
            return Err(InputError::UnknownStatus {
                status,
                message: msg.to_bytes(),
            })
        }
    };

    let key = i32::from(msg.key) - i32::from(first_key);
    let index = usize::try_from(key)
        .ok()
        .filter(|&k| k < key_count)
        .ok_or(InputError::KeyOutOfRange {
            note: msg.key,
            key,
            key_count,
        })?;

    Ok(KeyUpdate {
        key: index,
        intensity: level_to_intensity(level),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_line_accepts_exact_length() {
        assert_eq!(parse_hex_line("ff8000", 3), Ok("ff8000"));
        assert_eq!(parse_hex_line("  \tFF80aB\n", 3), Ok("FF80aB"));
        assert_eq!(parse_hex_line("ff8000 trailing words", 3), Ok("ff8000"));
        assert_eq!(parse_hex_line("ff8000-", 3), Ok("ff8000"));
    }

    #[test]
    fn test_hex_line_rejects_wrong_length() {
        // too short
        assert!(parse_hex_line("ff80", 3).is_err());
        // too long: the 7th char is a hex digit, so no word boundary
        assert!(parse_hex_line("ff80001", 3).is_err());
        assert!(parse_hex_line("ff8000ff", 3).is_err());
        assert!(parse_hex_line("", 3).is_err());
    }

    #[test]
    fn test_hex_line_rejects_non_hex() {
        assert!(parse_hex_line("ff80zz", 3).is_err());
        assert!(parse_hex_line("ff8000g", 3).is_err());
        assert!(parse_hex_line("ff8000_", 3).is_err());
        assert!(parse_hex_line("# ff8000", 3).is_err());
    }

    #[test]
    fn test_bad_line_message() {
        let err = parse_levels("  hello world \n", 3).unwrap_err();
        assert_eq!(err.to_string(), "bad input: hello world");
    }

    #[test]
    fn test_parse_levels() {
        assert_eq!(parse_levels("ff8000", 3), Ok(vec![255, 128, 0]));
        assert_eq!(parse_levels(" 00Ff", 2), Ok(vec![0, 255]));
    }

    #[test]
    fn test_multibyte_after_digits_does_not_panic() {
        assert!(parse_hex_line("ff80é", 3).is_err());
        assert!(parse_hex_line("ff8000é", 3).is_err());
        assert_eq!(parse_hex_line("ff8000→", 3), Ok("ff8000"));
    }

    #[test]
    fn test_velocity_mapping() {
        assert_eq!(velocity_to_level(0), 0);
        assert_eq!(velocity_to_level(64), 128);
        assert_eq!(velocity_to_level(127), 254);
        assert!((level_to_intensity(128) - 128.0 / 255.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_message_must_be_three_bytes() {
        assert!(MidiMessage::from_bytes(&[0x90, 40]).is_err());
        assert!(MidiMessage::from_bytes(&[0x90, 40, 64, 0]).is_err());
        let msg = MidiMessage::from_bytes(&[0x90, 40, 64]).unwrap();
        assert_eq!(msg.to_bytes(), [0x90, 40, 64]);
    }

    #[test]
    fn test_note_on_maps_key_and_intensity() {
        let msg = MidiMessage::from_bytes(&[NOTE_ON, 40, 64]).unwrap();
        let update = key_update(msg, 36, 61).unwrap();
        assert_eq!(update.key, 4);
        assert!((update.intensity - 128.0 / 255.0).abs() < f64::EPSILON);
        assert_eq!(update.level(), 128);
    }

    #[test]
    fn test_note_off_and_zero_velocity_are_dark() {
        let off = key_update(
            MidiMessage {
                status: NOTE_OFF,
                key: 40,
                velocity: 64,
            },
            36,
            61,
        )
        .unwrap();
        assert_eq!(off.intensity, 0.0);

        let silent_on = key_update(
            MidiMessage {
                status: NOTE_ON,
                key: 40,
                velocity: 0,
            },
            36,
            61,
        )
        .unwrap();
        assert_eq!(silent_on.intensity, 0.0);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let msg = MidiMessage {
            status: 0xB0,
            key: 7,
            velocity: 100,
        };
        assert_eq!(
            key_update(msg, 36, 61),
            Err(InputError::UnknownStatus {
                status: 0xB0,
                message: [0xB0, 7, 100],
            })
        );
        // Note-on on another channel is not accepted either.
        let msg = MidiMessage {
            status: 0x91,
            key: 40,
            velocity: 100,
        };
        assert!(key_update(msg, 36, 61).is_err());
    }

    #[test]
    fn test_key_out_of_range() {
        let below = MidiMessage {
            status: NOTE_ON,
            key: 35,
            velocity: 1,
        };
        assert_eq!(
            key_update(below, 36, 61),
            Err(InputError::KeyOutOfRange {
                note: 35,
                key: -1,
                key_count: 61,
            })
        );
        let above = MidiMessage {
            status: NOTE_ON,
            key: 97,
            velocity: 1,
        };
        assert!(key_update(above, 36, 61).is_err());
        let last = MidiMessage {
            status: NOTE_ON,
            key: 96,
            velocity: 1,
        };
        assert_eq!(key_update(last, 36, 61).unwrap().key, 60);
    }
}
