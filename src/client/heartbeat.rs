//! Cooperative heartbeat task
//!
//! An independent task that pings the server while the session is
//! Connected or Publishing. It polls a shared stop flag every 100 ms so
//! cancellation takes effect within one polling slice, and transitions the
//! session to Error after three consecutive send failures.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;

use crate::error::Result;
use crate::protocol::constants::CSID_PROTOCOL_CONTROL;
use crate::protocol::message::{RtmpMessage, UserControlEvent};

use super::session::{ConnectionState, SharedSender, SharedState};

/// Consecutive send failures that error the session
const MAX_FAILURES: u32 = 3;

/// Stop-flag polling granularity
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handle to a running heartbeat task
pub(crate) struct Heartbeat {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    /// Spawn the heartbeat task
    pub(crate) fn spawn(sender: SharedSender, state: SharedState, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = tokio::spawn(run(sender, state, interval, flag));
        tracing::info!(interval_ms = interval.as_millis() as u64, "heartbeat task started");
        Self { stop, handle }
    }

    /// Signal the task to stop and join it
    pub(crate) async fn stop(self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.handle.await;
        tracing::info!("heartbeat task stopped");
    }
}

async fn run(sender: SharedSender, state: SharedState, interval: Duration, stop: Arc<AtomicBool>) {
    let mut failures: u32 = 0;

    'outer: while !stop.load(Ordering::Relaxed) {
        let active = matches!(
            state.get(),
            ConnectionState::Connected | ConnectionState::Publishing
        );

        if active {
            match send_ping(&sender).await {
                Ok(()) => {
                    failures = 0;
                    tracing::debug!("heartbeat sent");
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(error = %e, failures, "heartbeat send failed");
                    if failures >= MAX_FAILURES {
                        state.set_error("heartbeat failed");
                        break;
                    }
                }
            }
        }

        // Sleep the interval in poll-sized slices, re-checking the stop flag
        let slices = (interval.as_millis() / POLL_INTERVAL.as_millis()).max(1);
        for _ in 0..slices {
            if stop.load(Ordering::Relaxed) {
                break 'outer;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Send a UserControl PingRequest stamped with epoch seconds
async fn send_ping(sender: &SharedSender) -> Result<()> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0);

    let msg = RtmpMessage::UserControl(UserControlEvent::PingRequest(timestamp));
    sender
        .lock()
        .await
        .send_message(&msg, CSID_PROTOCOL_CONTROL, 0)
        .await
}
