//! Length-prefixed framing for the companion serial protocol.
//!
//! Wire form: `[direction:u8][len:u16 LE][payload]`. The decoder never
//! raises an error for noise on the wire; a byte that cannot begin a frame
//! is dropped and the search resumes one byte later (resync).

use bytes::{Buf, BufMut, BytesMut};

/// Which end of the link a frame travels toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to radio.
    ToRadio,
    /// Radio to host.
    FromRadio,
}

impl Direction {
    const TO_RADIO_BYTE: u8 = 0x3C;
    const FROM_RADIO_BYTE: u8 = 0x3E;

    fn as_byte(self) -> u8 {
        match self {
            Direction::ToRadio => Self::TO_RADIO_BYTE,
            Direction::FromRadio => Self::FROM_RADIO_BYTE,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            Self::TO_RADIO_BYTE => Some(Direction::ToRadio),
            Self::FROM_RADIO_BYTE => Some(Direction::FromRadio),
            _ => None,
        }
    }
}

/// One complete frame off (or onto) the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub direction: Direction,
    pub payload: Vec<u8>,
}

/// Encode `payload` as a `ToRadio` frame.
#[must_use]
pub fn build_outgoing(payload: &[u8]) -> Vec<u8> {
    build(Direction::ToRadio, payload)
}

/// Encode `payload` as a frame traveling in `direction`.
#[must_use]
pub fn build(direction: Direction, payload: &[u8]) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(3 + payload.len());
    out.put_u8(direction.as_byte());
    out.put_u16_le(u16::try_from(payload.len()).unwrap_or(u16::MAX));
    out.put_slice(payload);
    out.to_vec()
}

/// Incremental frame accumulator. Feed it bytes as they arrive; drain
/// complete frames with [`FrameDecoder::poll`].
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Append newly-received bytes to the accumulator.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Drain every complete frame currently buffered, in wire order.
    pub fn poll(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = self.poll_one() {
            frames.push(frame);
        }
        frames
    }

    fn poll_one(&mut self) -> Option<Frame> {
        loop {
            if self.buf.len() < 3 {
                return None;
            }
            let Some(direction) = Direction::from_byte(self.buf[0]) else {
                self.buf.advance(1);
                continue;
            };
            let len = u16::from_le_bytes([self.buf[1], self.buf[2]]) as usize;
            if len == 0 {
                self.buf.advance(1);
                continue;
            }
            if self.buf.len() < 3 + len {
                return None;
            }
            self.buf.advance(3);
            let payload = self.buf.split_to(len).to_vec();
            return Some(Frame { direction, payload });
        }
    }

    /// Discard all buffered bytes, e.g. after a serial reconnect.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}
