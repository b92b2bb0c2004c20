//! Startup sequencer: a one-shot handshake that runs once per serial
//! session, ahead of the command queue's normal gate.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::warn;

use bytes::{BufMut, BytesMut};
use mc_protocol::DeviceIdentity;

use crate::queue::CommandQueue;

const SETTLE_DELAY: Duration = Duration::from_millis(500);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const APP_START_CMD: u8 = 1;
const SELF_INFO_CODE: u8 = 5;

struct PendingHook {
    expected_code: u8,
    tx: oneshot::Sender<Vec<u8>>,
}

/// Shared out-of-band hook the dispatcher consults before its normal
/// push/response classification, so the startup sequencer's own reply
/// never has to pass through the gated command queue.
#[derive(Clone, Default)]
pub struct StartupGate {
    hook: Arc<Mutex<Option<PendingHook>>>,
}

impl StartupGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn arm(&self, expected_code: u8) -> oneshot::Receiver<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        *self.hook.lock().await = Some(PendingHook { expected_code, tx });
        rx
    }

    /// If a hook is armed and `payload`'s first byte matches it, consume
    /// the hook and deliver the payload. Returns `true` if consumed — the
    /// dispatcher must not also treat the frame as a push or response.
    pub async fn try_consume(&self, payload: &[u8]) -> bool {
        let Some(&code) = payload.first() else {
            return false;
        };
        let mut guard = self.hook.lock().await;
        if guard.as_ref().is_some_and(|h| h.expected_code == code) {
            let hook = guard.take().unwrap();
            let _ = hook.tx.send(payload.to_vec());
            true
        } else {
            false
        }
    }
}

/// Run the handshake: wait for the radio to settle, send `AppStart`
/// directly to serial (bypassing the queue gate), and wait up to 5s for a
/// matching `SelfInfo` reply. Always unlocks the queue afterward, whether
/// or not the identity was obtained — a failed handshake is logged, not
/// fatal.
pub async fn run_startup_sequence(
    serial_tx: &mpsc::UnboundedSender<Vec<u8>>,
    gate: &StartupGate,
    queue: &Arc<CommandQueue>,
    app_name: &str,
) -> Option<DeviceIdentity> {
    tokio::time::sleep(SETTLE_DELAY).await;

    let rx = gate.arm(SELF_INFO_CODE).await;
    let _ = serial_tx.send(mc_protocol::build_outgoing(&build_app_start(app_name)));

    let identity = match tokio::time::timeout(HANDSHAKE_TIMEOUT, rx).await {
        Ok(Ok(payload)) => mc_protocol::decode_self_info(&payload),
        Ok(Err(_)) => {
            warn!("startup hook dropped without a reply");
            None
        }
        Err(_) => {
            warn!("startup handshake timed out after {HANDSHAKE_TIMEOUT:?}");
            None
        }
    };

    queue.mark_startup_complete().await;
    identity
}

fn build_app_start(app_name: &str) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(8 + app_name.len());
    buf.put_u8(APP_START_CMD);
    buf.put_u8(1); // appVer
    buf.put_bytes(0, 6); // reserved
    buf.put_slice(app_name.as_bytes());
    buf.to_vec()
}
