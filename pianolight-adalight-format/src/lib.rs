//! Adalight serial frame format.
//!
//! This crate defines the byte layout pushed over a serial line to an
//! Adalight-compatible LED controller. Every frame is self-contained and has
//! no trailing terminator, so a stream of frames is simply the frames
//! concatenated.
//!
//! # Frame Layout
//!
//! ```text
//! [Header: 6 bytes]
//! [Payload: led_count * 3 bytes, R G B per LED, in strip order]
//! ```
//!
//! # Header Format
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 3 | Magic: `Ada` |
//! | 3 | 1 | High byte of `led_count - 1` |
//! | 4 | 1 | Low byte of `led_count - 1` |
//! | 5 | 1 | Checksum: `high ^ low ^ 0x55` |

use deku::prelude::*;
use derive_more::{Display, Error, From};
use std::io::Read;

/// Frame magic bytes: `Ada` (3 bytes).
pub const MAGIC: &[u8; 3] = b"Ada";

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 6;

/// Bytes per LED in the payload.
pub const BYTES_PER_LED: usize = 3;

/// Largest LED count the 16-bit length field can describe.
pub const MAX_LEDS: usize = 1 << 16;

/// Value mixed into the checksum.
const CHECKSUM_SEED: u8 = 0x55;

/// Compute the header checksum for a given `led_count - 1` value.
#[must_use]
pub fn checksum(last_index: u16) -> u8 {
    let [hi, lo] = last_index.to_be_bytes();
    hi ^ lo ^ CHECKSUM_SEED
}

/// 6-byte Adalight frame header.
///
/// The length field stores the index of the last LED (`led_count - 1`) in
/// big-endian order, so the high byte is sent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(magic = b"Ada")]
pub struct AdalightHeader {
    /// Index of the last LED in the frame (`led_count - 1`).
    #[deku(endian = "big")]
    pub last_index: u16,
    /// Checksum byte as found on the wire.
    pub checksum: u8,
}

impl AdalightHeader {
    /// Build a header describing a frame of `led_count` LEDs.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::LedCount`] if `led_count` is zero or larger than
    /// [`MAX_LEDS`].
    pub fn for_led_count(led_count: usize) -> Result<Self, FrameError> {
        let last_index = led_count
            .checked_sub(1)
            .and_then(|n| u16::try_from(n).ok())
            .ok_or(FrameError::LedCount { led_count })?;

        Ok(Self {
            last_index,
            checksum: checksum(last_index),
        })
    }

    /// Number of LEDs described by this header.
    #[must_use]
    pub fn led_count(&self) -> usize {
        usize::from(self.last_index) + 1
    }

    /// Size of the RGB payload following this header.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.led_count() * BYTES_PER_LED
    }

    /// Returns `true` if the stored checksum matches the length field.
    #[must_use]
    pub fn checksum_ok(&self) -> bool {
        self.checksum == checksum(self.last_index)
    }

    /// Serialize the header to its 6-byte wire form.
    #[must_use]
    pub fn to_array(&self) -> [u8; HEADER_SIZE] {
        let [hi, lo] = self.last_index.to_be_bytes();
        [MAGIC[0], MAGIC[1], MAGIC[2], hi, lo, self.checksum]
    }

    /// Parse a header from its 6-byte wire form.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::BadMagic`] if the first three bytes are not
    /// `Ada`, or [`FrameError::BadChecksum`] if the checksum does not match.
    pub fn parse(buf: &[u8; HEADER_SIZE]) -> Result<Self, FrameError> {
        if &buf[..MAGIC.len()] != MAGIC {
            let mut found = [0u8; 3];
            found.copy_from_slice(&buf[..MAGIC.len()]);
            return Err(FrameError::BadMagic { found });
        }

        let (_rest, header) = Self::from_bytes((buf.as_slice(), 0))
            .map_err(|e| FrameError::Malformed { reason: e.to_string() })?;

        if !header.checksum_ok() {
            return Err(FrameError::BadChecksum {
                expected: checksum(header.last_index),
                found: header.checksum,
            });
        }

        Ok(header)
    }

    /// Read and parse a header from a reader.
    ///
    /// Returns `Ok(None)` on a clean EOF before the first byte, so a stream
    /// of frames can be consumed until it ends.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Io`] with `UnexpectedEof` if the header is
    /// truncated, or any error from [`AdalightHeader::parse`].
    pub fn from_reader(reader: &mut impl Read) -> Result<Option<Self>, FrameError> {
        let mut buf = [0u8; HEADER_SIZE];
        if reader.read(&mut buf[..1])? == 0 {
            return Ok(None);
        }
        reader.read_exact(&mut buf[1..])?;
        Self::parse(&buf).map(Some)
    }
}

/// Encode one complete frame into `out`, replacing its contents.
///
/// `pixels` yields one `[r, g, b]` triple per LED in strip order. The
/// capacity of `out` is kept across calls.
///
/// # Errors
///
/// Returns [`FrameError::LedCount`] if the number of pixels cannot be
/// described by the header.
pub fn encode_frame_into<I>(out: &mut Vec<u8>, pixels: I) -> Result<(), FrameError>
where
    I: ExactSizeIterator<Item = [u8; 3]>,
{
    let header = AdalightHeader::for_led_count(pixels.len())?;

    out.clear();
    out.reserve(HEADER_SIZE + header.payload_len());
    out.extend_from_slice(&header.to_array());
    for rgb in pixels {
        out.extend_from_slice(&rgb);
    }

    Ok(())
}

/// Encode one complete frame into a freshly allocated buffer.
///
/// # Errors
///
/// See [`encode_frame_into`].
pub fn encode_frame<I>(pixels: I) -> Result<Vec<u8>, FrameError>
where
    I: ExactSizeIterator<Item = [u8; 3]>,
{
    let mut out = Vec::new();
    encode_frame_into(&mut out, pixels)?;
    Ok(out)
}

/// A decoded Adalight frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdalightFrame {
    /// Parsed header.
    pub header: AdalightHeader,
    /// One `[r, g, b]` triple per LED.
    pub pixels: Vec<[u8; 3]>,
}

impl AdalightFrame {
    /// Indices and colors of every LED that is not black.
    pub fn lit(&self) -> impl Iterator<Item = (usize, [u8; 3])> + '_ {
        self.pixels
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, rgb)| *rgb != [0, 0, 0])
    }
}

/// Iterator over consecutive frames read from a byte stream.
///
/// Stops at a clean EOF on a frame boundary. After yielding an error the
/// stream position is undefined; callers are expected to stop.
pub struct FrameIter<R> {
    reader: R,
    offset: u64,
}

impl<R: Read> FrameIter<R> {
    /// Create a new frame iterator positioned at the start of a frame.
    pub fn new(reader: R) -> Self {
        Self { reader, offset: 0 }
    }

    /// Returns the number of bytes consumed so far.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl<R: Read> Iterator for FrameIter<R> {
    type Item = Result<AdalightFrame, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        let header = match AdalightHeader::from_reader(&mut self.reader) {
            Ok(Some(header)) => header,
            Ok(None) => return None,
            Err(e) => return Some(Err(e.at_offset(self.offset))),
        };

        let mut payload = vec![0u8; header.payload_len()];
        if let Err(e) = self.reader.read_exact(&mut payload) {
            return Some(Err(FrameError::Io(e)));
        }

        self.offset += (HEADER_SIZE + payload.len()) as u64;

        let pixels = payload
            .chunks_exact(BYTES_PER_LED)
            .map(|c| [c[0], c[1], c[2]])
            .collect();

        Some(Ok(AdalightFrame { header, pixels }))
    }
}

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, Display, Error, From)]
pub enum FrameError {
    /// An I/O error from the underlying reader.
    ///
    /// `ErrorKind::UnexpectedEof` indicates a truncated frame.
    #[display("I/O error: {_0}")]
    #[from]
    Io(std::io::Error),
    /// The LED count cannot be expressed in the 16-bit length field.
    #[display("unsupported LED count {led_count} (must be 1..=65536)")]
    LedCount { led_count: usize },
    /// Header does not start with `Ada`.
    #[display("invalid frame magic {found:02x?}")]
    BadMagic { found: [u8; 3] },
    /// Header checksum does not match the length field.
    #[display("bad header checksum 0x{found:02x} (expected 0x{expected:02x})")]
    BadChecksum { expected: u8, found: u8 },
    /// Header bytes could not be decoded.
    #[display("malformed header: {reason}")]
    Malformed { reason: String },
    /// A header error located in a stream.
    #[display("{source} at offset {offset}")]
    AtOffset {
        offset: u64,
        source: Box<FrameError>,
    },
}

impl FrameError {
    fn at_offset(self, offset: u64) -> Self {
        match self {
            Self::Io(_) => self,
            other => Self::AtOffset {
                offset,
                source: Box::new(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn black(n: usize) -> std::vec::IntoIter<[u8; 3]> {
        vec![[0, 0, 0]; n].into_iter()
    }

    #[test]
    fn header_layout_for_122_leds() {
        // 61 keys * 2 LEDs; last index 121 = 0x0079
        let header = AdalightHeader::for_led_count(122).expect("valid count");
        assert_eq!(header.to_array(), [b'A', b'd', b'a', 0x00, 0x79, 0x2c]);
        assert_eq!(header.led_count(), 122);
    }

    #[test]
    fn header_layout_above_255_leds() {
        // last index 299 = 0x012b; 0x01 ^ 0x2b ^ 0x55 = 0x7f
        let header = AdalightHeader::for_led_count(300).expect("valid count");
        assert_eq!(header.to_array(), [b'A', b'd', b'a', 0x01, 0x2b, 0x7f]);
    }

    #[test]
    fn deku_and_manual_serialization_agree() {
        let header = AdalightHeader::for_led_count(176).expect("valid count");
        let via_deku = header.to_bytes().expect("should serialize");
        assert_eq!(via_deku.as_slice(), header.to_array().as_slice());
    }

    #[test]
    fn zero_and_oversized_counts_rejected() {
        assert!(matches!(
            AdalightHeader::for_led_count(0),
            Err(FrameError::LedCount { led_count: 0 })
        ));
        assert!(AdalightHeader::for_led_count(MAX_LEDS).is_ok());
        assert!(AdalightHeader::for_led_count(MAX_LEDS + 1).is_err());
    }

    #[test]
    fn frame_has_no_terminator() {
        let frame = encode_frame([[1, 2, 3], [4, 5, 6]].into_iter()).expect("should encode");
        assert_eq!(frame.len(), HEADER_SIZE + 6);
        assert_eq!(&frame[HEADER_SIZE..], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn encode_into_reuses_buffer() {
        let mut buf = Vec::new();
        encode_frame_into(&mut buf, black(10)).expect("should encode");
        encode_frame_into(&mut buf, black(2)).expect("should encode");
        assert_eq!(buf.len(), HEADER_SIZE + 6);
    }

    #[test]
    fn bad_magic_rejected() {
        let result = AdalightHeader::parse(b"Adb\x00\x00\x55");
        assert!(matches!(result, Err(FrameError::BadMagic { found }) if &found == b"Adb"));
    }

    #[test]
    fn bad_checksum_rejected() {
        let result = AdalightHeader::parse(b"Ada\x00\x79\x00");
        assert!(matches!(
            result,
            Err(FrameError::BadChecksum {
                expected: 0x2c,
                found: 0
            })
        ));
    }

    #[test]
    fn truncated_header_is_unexpected_eof() {
        let result = AdalightHeader::from_reader(&mut b"Ada\x00".as_slice());
        match result {
            Err(FrameError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("expected IO error, got: {other:?}"),
        }
    }

    #[test]
    fn frame_iter_reads_concatenated_frames() {
        let mut stream = encode_frame([[255, 0, 0], [0, 0, 0]].into_iter()).expect("encode");
        stream.extend(encode_frame([[0, 0, 0], [0, 9, 0]].into_iter()).expect("encode"));

        let mut iter = FrameIter::new(stream.as_slice());
        let frames: Vec<_> = iter
            .by_ref()
            .collect::<Result<Vec<_>, _>>()
            .expect("should parse");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].lit().collect::<Vec<_>>(), vec![(0, [255, 0, 0])]);
        assert_eq!(frames[1].lit().collect::<Vec<_>>(), vec![(1, [0, 9, 0])]);
        assert_eq!(iter.offset(), stream.len() as u64);
    }

    #[test]
    fn frame_iter_truncated_payload() {
        let stream = encode_frame(black(4)).expect("encode");
        let result: Result<Vec<_>, _> = FrameIter::new(&stream[..stream.len() - 1]).collect();
        assert!(matches!(result, Err(FrameError::Io(_))));
    }

    #[test]
    fn frame_iter_reports_offset_of_corrupt_header() {
        let mut stream = encode_frame(black(1)).expect("encode");
        stream.extend_from_slice(b"Xda\x00\x00\x55");
        let err = FrameIter::new(stream.as_slice())
            .collect::<Result<Vec<_>, _>>()
            .unwrap_err();
        assert!(matches!(err, FrameError::AtOffset { offset: 9, .. }), "{err}");
    }

    proptest! {
        #[test]
        fn checksum_matches_formula(led_count in 1usize..=MAX_LEDS) {
            let header = AdalightHeader::for_led_count(led_count).unwrap();
            let n = led_count - 1;
            let expected = ((n >> 8) as u8) ^ ((n & 0xff) as u8) ^ 0x55;
            prop_assert_eq!(header.checksum, expected);
        }

        #[test]
        fn decoding_reproduces_count_and_checksum(led_count in 1usize..2000) {
            let bytes = encode_frame(black(led_count)).unwrap();
            let frame = FrameIter::new(bytes.as_slice()).next().unwrap().unwrap();
            prop_assert_eq!(frame.header.led_count(), led_count);
            prop_assert!(frame.header.checksum_ok());
            prop_assert_eq!(frame.pixels.len(), led_count);
        }
    }
}
