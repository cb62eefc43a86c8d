//! # Socket frame parser
//!
//! Incoming socket data is announced by `+IPD,<len>:` followed by exactly `<len>` raw bytes.
//! The payload may contain anything, including further markers or line terminators, so it is
//! never scanned as text.
//!
//! ````
//! use esp_at_control::frame::FrameParser;
//!
//! let mut parser = FrameParser::new();
//! let mut received = vec![];
//!
//! for byte in b"\r\n+IPD,5:ABCDE+IPD,3:XYZ" {
//!     if let Some(frame) = parser.feed(*byte).unwrap() {
//!         received.extend_from_slice(&frame);
//!     }
//! }
//!
//! assert_eq!(b"ABCDEXYZ", received.as_slice());
//! ````
use crate::error::ProtocolError;
use heapless::Vec;
use log::trace;

/// Size of the payload scratch buffer, which bounds the length of a single frame
pub const FRAME_BUFFER_SIZE: usize = 1500;

/// Max. header length, e.g. `+IPD,1500:` plus some headroom
const HEADER_SIZE: usize = 20;

/// Marker introducing a socket frame
pub(crate) const FRAME_MARKER: &[u8] = b"+IPD,";

/// Payload of a single completed frame
pub type Frame = Vec<u8, FRAME_BUFFER_SIZE>;

/// Parser state
#[derive(Clone, Debug)]
pub enum FrameState {
    /// Collecting header bytes until `+IPD,<digits>:` is matched
    SeekingHeader { header: Vec<u8, HEADER_SIZE> },

    /// Copying exactly `expected` raw bytes
    DrainingPayload { expected: usize, payload: Frame },
}

impl Default for FrameState {
    fn default() -> Self {
        Self::SeekingHeader { header: Vec::new() }
    }
}

/// Byte-at-a-time state machine extracting `+IPD` frames from the serial stream
#[derive(Clone, Debug, Default)]
pub struct FrameParser {
    state: FrameState,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes a single byte. Returns the payload once a frame is complete.
    ///
    /// Bytes in front of a header which do not start with `+` are discarded, as are `+` prefixed
    /// lines which turn out not to be a frame marker. Once the marker is matched, anything but
    /// digits followed by `:` is a [ProtocolError::FrameParseError]. The parser is reset in this case.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Frame>, ProtocolError> {
        let result = match &mut self.state {
            FrameState::SeekingHeader { header } => Self::seek_header(header, byte),
            FrameState::DrainingPayload { expected, payload } => {
                // Capacity is checked when the header gets parsed
                let _ = payload.push(byte);

                if payload.len() < *expected {
                    return Ok(None);
                }

                Ok(Some(Transition::Complete))
            }
        };

        match result {
            Ok(None) => Ok(None),
            Ok(Some(Transition::Drain(0))) => {
                self.reset();
                Ok(Some(Frame::new()))
            }
            Ok(Some(Transition::Drain(expected))) => {
                self.state = FrameState::DrainingPayload {
                    expected,
                    payload: Frame::new(),
                };
                Ok(None)
            }
            Ok(Some(Transition::Complete)) => match core::mem::take(&mut self.state) {
                FrameState::DrainingPayload { payload, .. } => Ok(Some(payload)),
                FrameState::SeekingHeader { .. } => Ok(None),
            },
            Err(error) => {
                self.reset();
                Err(error)
            }
        }
    }

    /// Number of bytes which may be read from the stream without passing the current frame boundary
    pub fn wanted(&self) -> usize {
        match &self.state {
            FrameState::SeekingHeader { .. } => 1,
            FrameState::DrainingPayload { expected, payload } => expected - payload.len(),
        }
    }

    /// Returns true if no header or payload is partially processed
    pub fn is_idle(&self) -> bool {
        match &self.state {
            FrameState::SeekingHeader { header } => header.is_empty(),
            FrameState::DrainingPayload { .. } => false,
        }
    }

    /// Returns true while payload bytes of an announced frame are expected
    pub fn is_draining(&self) -> bool {
        matches!(self.state, FrameState::DrainingPayload { .. })
    }

    /// Drops any partial header or payload
    pub fn reset(&mut self) {
        self.state = FrameState::default();
    }

    pub fn state(&self) -> &FrameState {
        &self.state
    }

    fn seek_header(header: &mut Vec<u8, HEADER_SIZE>, byte: u8) -> Result<Option<Transition>, ProtocolError> {
        // Keep going till we start with +
        if header.is_empty() && byte != b'+' {
            return Ok(None);
        }

        if header.len() < FRAME_MARKER.len() {
            if byte != FRAME_MARKER[header.len()] {
                // Some other + prefixed line, maybe the start of the next one
                header.clear();
                if byte == b'+' {
                    let _ = header.push(byte);
                }
            } else {
                let _ = header.push(byte);
            }

            return Ok(None);
        }

        match byte {
            b'0'..=b'9' => {
                header.push(byte).map_err(|_| ProtocolError::FrameParseError)?;
                Ok(None)
            }
            b':' => {
                let length = Self::parse_length(&header[FRAME_MARKER.len()..])?;
                trace!("Frame header: {} bytes", length);
                header.clear();
                Ok(Some(Transition::Drain(length)))
            }
            _ => Err(ProtocolError::FrameParseError),
        }
    }

    fn parse_length(digits: &[u8]) -> Result<usize, ProtocolError> {
        if digits.is_empty() {
            return Err(ProtocolError::FrameParseError);
        }

        let length = core::str::from_utf8(digits)
            .map_err(|_| ProtocolError::FrameParseError)?
            .parse::<usize>()
            .map_err(|_| ProtocolError::FrameParseError)?;

        if length > FRAME_BUFFER_SIZE {
            return Err(ProtocolError::FrameParseError);
        }

        Ok(length)
    }
}

/// State change requested by a processed byte
enum Transition {
    /// Header complete, drain the given number of bytes
    Drain(usize),

    /// Payload complete
    Complete,
}
