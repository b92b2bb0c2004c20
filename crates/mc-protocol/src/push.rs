//! Best-effort decoders for unsolicited push notification payloads
//! (response codes `>= 0x80`). Unknown codes, or payloads too short to hold
//! their documented fields, decode to [`PushEvent::Opaque`] rather than
//! erroring — the dispatcher still forwards the raw frame to clients either
//! way.

/// A decoded push notification. `Opaque` carries the original code and
/// payload for forwarding when the shape is unrecognized or truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Advert { public_key: Vec<u8> },
    PathUpdated { public_key: Vec<u8> },
    SendConfirmed { ack_code: u32, round_trip_ms: u32 },
    MsgWaiting,
    RawData { snr: i8, rssi: i8, data: Vec<u8> },
    LogRxData { snr: i8, rssi: i8, raw: Vec<u8> },
    Opaque { code: u8, payload: Vec<u8> },
}

const ADVERT: u8 = 0x80;
const PATH_UPDATED: u8 = 0x81;
const SEND_CONFIRMED: u8 = 0x82;
const MSG_WAITING: u8 = 0x83;
const RAW_DATA: u8 = 0x84;
const LOG_RX_DATA: u8 = 0x88;

/// Decode a push payload. `payload[0]` must already be known to be `>= 0x80`
/// (the caller classified the frame); this only interprets the remainder.
#[must_use]
pub fn decode_push(payload: &[u8]) -> PushEvent {
    let Some(&code) = payload.first() else {
        return PushEvent::Opaque {
            code: 0,
            payload: Vec::new(),
        };
    };
    let opaque = || PushEvent::Opaque {
        code,
        payload: payload.to_vec(),
    };

    match code {
        ADVERT if payload.len() >= 33 => PushEvent::Advert {
            public_key: payload[1..33].to_vec(),
        },
        PATH_UPDATED if payload.len() >= 33 => PushEvent::PathUpdated {
            public_key: payload[1..33].to_vec(),
        },
        SEND_CONFIRMED if payload.len() >= 9 => {
            let ack_code = u32::from_le_bytes(payload[1..5].try_into().unwrap());
            let round_trip_ms = u32::from_le_bytes(payload[5..9].try_into().unwrap());
            PushEvent::SendConfirmed {
                ack_code,
                round_trip_ms,
            }
        }
        MSG_WAITING => PushEvent::MsgWaiting,
        RAW_DATA if payload.len() >= 4 => PushEvent::RawData {
            snr: (payload[1] as i8) / 4,
            rssi: payload[2] as i8,
            data: payload[4..].to_vec(),
        },
        LOG_RX_DATA if payload.len() >= 3 => PushEvent::LogRxData {
            snr: (payload[1] as i8) / 4,
            rssi: payload[2] as i8,
            raw: payload[3..].to_vec(),
        },
        _ => opaque(),
    }
}
