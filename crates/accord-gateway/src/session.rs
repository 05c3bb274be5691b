//! Session state carried across reconnects.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::protocol::is_valid_resume_url;

/// Last delivered dispatch sequence number.
///
/// Shared with the heartbeat task, which reports it in every beat. Only
/// ever moves forward within a session; zero means "none yet" (Discord
/// sequences start at 1).
#[derive(Debug, Default)]
pub struct Sequence(AtomicU64);

impl Sequence {
    /// An empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// The last sequence number, if any.
    #[must_use]
    pub fn get(&self) -> Option<u64> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            seq => Some(seq),
        }
    }

    /// Move forward to `seq`. Returns `false` (and changes nothing) if
    /// `seq` is not newer than the current value.
    pub fn advance(&self, seq: u64) -> bool {
        self.0.fetch_max(seq, Ordering::AcqRel) < seq
    }

    /// Forget the sequence. Only valid when the session is discarded.
    pub(crate) fn reset(&self) {
        self.0.store(0, Ordering::Release);
    }
}

/// Identity of a gateway session, kept across physical connections.
#[derive(Debug, Default)]
pub struct SessionState {
    session_id: Option<String>,
    resume_url: Option<String>,
    sequence: Arc<Sequence>,
    resume_attempts: u32,
}

impl SessionState {
    /// A state with no session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Session ID from the last `READY`.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Resume URL from the last `READY`.
    #[must_use]
    pub fn resume_url(&self) -> Option<&str> {
        self.resume_url.as_deref()
    }

    /// The shared sequence counter.
    #[must_use]
    pub fn sequence(&self) -> &Arc<Sequence> {
        &self.sequence
    }

    /// Consecutive resume attempts without a completed resume.
    #[must_use]
    pub fn resume_attempts(&self) -> u32 {
        self.resume_attempts
    }

    /// Record a new session from `READY`.
    ///
    /// A resume URL outside the allowed domains is dropped; the session
    /// can then only be resumed through the canonical gateway URL.
    pub fn establish(&mut self, session_id: String, resume_url: &str) {
        self.session_id = Some(session_id);
        if is_valid_resume_url(resume_url) {
            self.resume_url = Some(resume_url.to_owned());
        } else {
            warn!(url = %resume_url, "READY contained invalid resume URL, ignoring");
            self.resume_url = None;
        }
        self.resume_attempts = 0;
    }

    /// Whether a Resume can be sent: a session ID and a sequence exist.
    #[must_use]
    pub fn can_resume(&self) -> bool {
        self.session_id.is_some() && self.sequence.get().is_some()
    }

    /// The `(session_id, seq)` pair to resume with.
    #[must_use]
    pub fn resume_info(&self) -> Option<(String, u64)> {
        Some((self.session_id.clone()?, self.sequence.get()?))
    }

    /// Count a Resume being sent.
    pub fn record_resume_attempt(&mut self) {
        self.resume_attempts = self.resume_attempts.saturating_add(1);
    }

    /// A resume completed.
    pub fn resume_succeeded(&mut self) {
        self.resume_attempts = 0;
    }

    /// Discard the session; the next connection identifies.
    pub fn clear(&mut self) {
        self.session_id = None;
        self.resume_url = None;
        self.sequence.reset();
        self.resume_attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let seq = Sequence::new();
        assert_eq!(seq.get(), None);
        assert!(seq.advance(3));
        assert!(!seq.advance(2));
        assert!(!seq.advance(3));
        assert_eq!(seq.get(), Some(3));
        assert!(seq.advance(4));
        assert_eq!(seq.get(), Some(4));
    }

    #[test]
    fn session_can_resume_needs_id_and_sequence() {
        let mut session = SessionState::new();
        assert!(!session.can_resume());

        session.establish("abc".into(), "wss://gateway-us-east1-b.discord.gg");
        assert!(!session.can_resume());

        session.sequence().advance(1);
        assert!(session.can_resume());
        assert_eq!(session.resume_info(), Some(("abc".into(), 1)));
        assert_eq!(session.resume_url(), Some("wss://gateway-us-east1-b.discord.gg"));
    }

    #[test]
    fn invalid_resume_url_is_dropped() {
        let mut session = SessionState::new();
        session.establish("abc".into(), "wss://evil.example.com");
        assert_eq!(session.session_id(), Some("abc"));
        assert!(session.resume_url().is_none());
    }

    #[test]
    fn clear_discards_everything() {
        let mut session = SessionState::new();
        session.establish("abc".into(), "wss://gateway.discord.gg");
        session.sequence().advance(10);
        session.record_resume_attempt();

        session.clear();

        assert!(session.session_id().is_none());
        assert!(session.resume_url().is_none());
        assert_eq!(session.sequence().get(), None);
        assert_eq!(session.resume_attempts(), 0);
        assert!(!session.can_resume());
    }

    #[test]
    fn resume_attempts_count_and_reset() {
        let mut session = SessionState::new();
        session.record_resume_attempt();
        session.record_resume_attempt();
        assert_eq!(session.resume_attempts(), 2);
        session.resume_succeeded();
        assert_eq!(session.resume_attempts(), 0);
    }

    #[test]
    fn sequence_is_shared_with_clones_of_the_arc() {
        let session = SessionState::new();
        let shared = Arc::clone(session.sequence());
        shared.advance(7);
        assert_eq!(session.sequence().get(), Some(7));
    }
}
