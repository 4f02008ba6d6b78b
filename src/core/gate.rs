//! Controlled-substance gate and license verification state
//!
//! The gate is a pure predicate over outgoing user text. Policy lives in the
//! engine: a restricted message from an unverified user is deferred (stored
//! in [`VerificationState`]) until verification is confirmed, and the
//! dispatch path re-checks the predicate right before the network call as a
//! fallback for replayed or queued messages.

/// Fixed denylist. Matching is a case-insensitive substring check.
const CONTROLLED_SUBSTANCES: [&str; 9] = [
    "morphine",
    "fentanyl",
    "oxycodone",
    "codeine",
    "diazepam",
    "lorazepam",
    "alprazolam",
    "ketamine",
    "buprenorphine",
];

/// True when the message mentions a controlled substance.
pub fn is_restricted(text: &str) -> bool {
    let lower = text.to_lowercase();
    CONTROLLED_SUBSTANCES.iter().any(|term| lower.contains(term))
}

/// Session-scoped verification state: the verified flag plus at most one
/// deferred message. The flag never reverts within a session.
#[derive(Debug, Default)]
pub struct VerificationState {
    verified: bool,
    pending: Option<String>,
}

impl VerificationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// Grant verification. There is no revocation.
    pub fn confirm(&mut self) {
        self.verified = true;
    }

    /// Park a gated message until verification is confirmed. A second gated
    /// message replaces the first; only one slot exists.
    pub fn defer(&mut self, text: impl Into<String>) {
        self.pending = Some(text.into());
    }

    /// Take the deferred message, clearing the slot.
    pub fn take_pending(&mut self) -> Option<String> {
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
