//! Heartbeat tracking and the heartbeat task.
//!
//! [`HeartbeatState`] is shared between the heartbeat task (writer of
//! the "sent" fields) and the event loop (writer of the "ack" fields).
//! Each field is its own atomic; no invariant spans two fields, so no
//! lock is needed. Timestamps are stored as milliseconds since the
//! state's creation, offset by one so that zero means "never".

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::connection::Frame;
use crate::protocol::GatewayCommand;
use crate::session::Sequence;

/// Stamps have millisecond resolution; the zombie check waits one stamp
/// past the deadline.
const STAMP_RESOLUTION: Duration = Duration::from_millis(1);

/// Liveness tracker for one physical connection.
#[derive(Debug)]
pub struct HeartbeatState {
    epoch: Instant,
    interval: Duration,
    tolerance: Duration,
    next_nonce: AtomicU64,
    last_sent_at: AtomicU64,
    last_sent_nonce: AtomicU64,
    last_ack_at: AtomicU64,
    last_ack_nonce: AtomicU64,
}

impl HeartbeatState {
    /// Create a tracker for the interval from Hello.
    #[must_use]
    pub fn new(interval: Duration, tolerance: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            interval,
            tolerance,
            next_nonce: AtomicU64::new(1),
            last_sent_at: AtomicU64::new(0),
            last_sent_nonce: AtomicU64::new(0),
            last_ack_at: AtomicU64::new(0),
            last_ack_nonce: AtomicU64::new(0),
        }
    }

    /// The heartbeat interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Grace period past the interval before a missing ACK counts.
    #[must_use]
    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Allocate the nonce for the next beat. Strictly increasing.
    pub fn next_nonce(&self) -> u64 {
        self.next_nonce.fetch_add(1, Ordering::Relaxed)
    }

    fn stamp(&self, now: Instant) -> u64 {
        let millis = now.saturating_duration_since(self.epoch).as_millis();
        u64::try_from(millis).unwrap_or(u64::MAX).saturating_add(1)
    }

    /// Record an outgoing heartbeat.
    pub fn record_sent(&self, nonce: u64, now: Instant) {
        self.last_sent_nonce.store(nonce, Ordering::Release);
        self.last_sent_at.store(self.stamp(now), Ordering::Release);
    }

    /// Record a gateway heartbeat ACK.
    ///
    /// Gateway ACKs carry no payload, so the ACK is attributed to the
    /// most recent heartbeat.
    pub fn record_acknowledged(&self, now: Instant) {
        let nonce = self.last_sent_nonce.load(Ordering::Acquire);
        self.last_ack_nonce.store(nonce, Ordering::Release);
        self.last_ack_at.store(self.stamp(now), Ordering::Release);
    }

    /// Record a voice heartbeat ACK carrying an echoed nonce.
    ///
    /// Only an ACK for the most recently sent nonce counts; stale or
    /// unknown nonces are ignored and `false` is returned.
    pub fn record_acknowledged_nonce(&self, nonce: u64, now: Instant) -> bool {
        if nonce != self.last_sent_nonce.load(Ordering::Acquire) {
            trace!(nonce, "Ignoring heartbeat ACK for stale nonce");
            return false;
        }
        self.last_ack_nonce.store(nonce, Ordering::Release);
        self.last_ack_at.store(self.stamp(now), Ordering::Release);
        true
    }

    /// Whether a heartbeat has been sent and not yet acknowledged.
    #[must_use]
    pub fn awaiting_ack(&self) -> bool {
        let sent = self.last_sent_at.load(Ordering::Acquire);
        sent != 0 && self.last_ack_at.load(Ordering::Acquire) < sent
    }

    /// Whether the last heartbeat went unacknowledged for longer than
    /// the interval plus tolerance.
    #[must_use]
    pub fn is_zombied(&self, now: Instant) -> bool {
        if !self.awaiting_ack() {
            return false;
        }
        let sent = self.last_sent_at.load(Ordering::Acquire);
        let elapsed = Duration::from_millis(self.stamp(now).saturating_sub(sent));
        elapsed > self.interval.saturating_add(self.tolerance)
    }

    /// Round-trip time of the last acknowledged heartbeat.
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        let sent = self.last_sent_at.load(Ordering::Acquire);
        let ack = self.last_ack_at.load(Ordering::Acquire);
        (sent != 0 && ack >= sent).then(|| Duration::from_millis(ack.saturating_sub(sent)))
    }

    /// Nonce of the last heartbeat sent (0 if none).
    #[must_use]
    pub fn last_sent_nonce(&self) -> u64 {
        self.last_sent_nonce.load(Ordering::Acquire)
    }

    /// Nonce of the last heartbeat acknowledged (0 if none).
    #[must_use]
    pub fn last_acknowledged_nonce(&self) -> u64 {
        self.last_ack_nonce.load(Ordering::Acquire)
    }
}

/// Everything the heartbeat task needs.
pub(crate) struct HeartbeatTask {
    pub(crate) state: Arc<HeartbeatState>,
    pub(crate) sequence: Arc<Sequence>,
    pub(crate) outbound: mpsc::Sender<Frame>,
    pub(crate) zombie: oneshot::Sender<()>,
    pub(crate) cancel: CancellationToken,
}

/// Encode and queue one heartbeat, recording it as sent.
///
/// Returns `false` if the writer is gone.
pub(crate) async fn send_heartbeat(
    state: &HeartbeatState,
    sequence: &Sequence,
    outbound: &mpsc::Sender<Frame>,
) -> bool {
    let command = GatewayCommand::Heartbeat {
        sequence: sequence.get(),
    };
    let text = match command.encode() {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to encode heartbeat");
            return true;
        },
    };
    let nonce = state.next_nonce();
    debug!(seq = ?sequence.get(), nonce, "Sending heartbeat");
    state.record_sent(nonce, Instant::now());
    outbound.send(Frame::Text(text)).await.is_ok()
}

/// Run the heartbeat loop.
///
/// The first heartbeat is sent after `interval * jitter` (random
/// `0.0..1.0`) so that many shards reconnecting at once do not beat in
/// step. After that a beat is due every `interval`. If the previous beat
/// is still unacknowledged when the next is due, the task waits out the
/// tolerance and fires `zombie` if the state then reports
/// [`HeartbeatState::is_zombied`].
pub(crate) async fn run_heartbeat(task: HeartbeatTask) {
    let HeartbeatTask {
        state,
        sequence,
        outbound,
        zombie,
        cancel,
    } = task;

    let first_delay = state.interval().mul_f64(fastrand::f64());
    debug!(
        interval_ms = state.interval().as_millis(),
        first_delay_ms = first_delay.as_millis(),
        "Heartbeat task started"
    );

    tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        () = tokio::time::sleep(first_delay) => {},
    }

    loop {
        if state.awaiting_ack() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(state.tolerance().saturating_add(STAMP_RESOLUTION)) => {},
            }
            if state.is_zombied(Instant::now()) {
                warn!(
                    nonce = state.last_sent_nonce(),
                    "Heartbeat ACK missed, zombie connection detected"
                );
                let _ = zombie.send(());
                return;
            }
        }

        if !send_heartbeat(&state, &sequence, &outbound).await {
            debug!("Writer closed, heartbeat task exiting");
            return;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("Heartbeat task shutting down");
                return;
            }
            () = tokio::time::sleep(state.interval()) => {},
        }
    }
}
