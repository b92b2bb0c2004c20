//! Decoder for the `SelfInfo` (response code `5`) reply, consumed once by
//! the startup sequencer to populate the device identity.

use crate::identity::DeviceIdentity;

const PUBLIC_KEY_OFFSET: usize = 4;
const PUBLIC_KEY_LEN: usize = 32;
const NAME_OFFSET: usize = 58;
const MIN_LEN: usize = 58;

/// Decode a `SelfInfo` payload into a [`DeviceIdentity`]. Returns `None` if
/// the payload is shorter than the fixed fields it must contain.
#[must_use]
pub fn decode_self_info(payload: &[u8]) -> Option<DeviceIdentity> {
    if payload.len() < MIN_LEN {
        return None;
    }
    let public_key = payload[PUBLIC_KEY_OFFSET..PUBLIC_KEY_OFFSET + PUBLIC_KEY_LEN].to_vec();
    let name_bytes = &payload[NAME_OFFSET..];
    let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
    let name = String::from_utf8_lossy(&name_bytes[..end]).into_owned();
    Some(DeviceIdentity { public_key, name })
}
