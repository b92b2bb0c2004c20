//! Wire types and codec for the MeshCore companion serial protocol.
//!
//! This crate owns everything that is pure function of bytes: frame
//! accumulation/resync, encoding, push-notification decoding, and the
//! `SelfInfo` handshake reply. It has no I/O and no knowledge of serial
//! ports, sockets, or the command queue that arbitrates access to them —
//! those live in the bridge binary, which depends on this crate for its
//! vocabulary.

pub mod compass;
pub mod frame;
pub mod identity;
pub mod push;
pub mod self_info;

pub use compass::bearing_to_compass;
pub use frame::{build, build_outgoing, Direction, Frame, FrameDecoder};
pub use identity::{DeviceIdentity, PushEntry};
pub use push::{decode_push, PushEvent};
pub use self_info::decode_self_info;

/// Response codes below this value are solicited replies; at or above it,
/// unsolicited push notifications.
pub const PUSH_THRESHOLD: u8 = 0x80;

/// Response codes that may precede further frames for the same command
/// without releasing the command queue's lock.
pub const STREAMING_CODES: [u8; 4] = [2, 3, 7, 8];

/// `true` if `code` marks a frame as an unsolicited push notification.
#[must_use]
pub fn is_push(code: u8) -> bool {
    code >= PUSH_THRESHOLD
}

/// `true` if `code` is a non-terminal member of a multi-frame reply
/// sequence (the command queue's lock must not be released yet).
#[must_use]
pub fn is_streaming(code: u8) -> bool {
    STREAMING_CODES.contains(&code)
}
