//! Client-generated idempotency tokens for state-changing venue calls.
//!
//! The venue contract has no idempotency parameter, so the guard is on our
//! side: each user request carries one token, and a token that already
//! reached the venue is refused before any further call. A timeout-and-retry
//! of the same request therefore cannot double-submit.

use std::collections::HashSet;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("submission {0} was already sent to the venue")]
pub struct DuplicateSubmission(pub Uuid);

/// Submission token for an inbound chat update. Deterministic: a redelivered
/// update carries the same update id, so its retry maps onto the same token
/// and the guard refuses the second submission.
#[must_use]
pub fn token_for_update(update_id: i64) -> Uuid {
    Uuid::from_u128(u128::from(update_id as u64))
}

#[derive(Default)]
pub struct SubmissionGuard {
    consumed: Mutex<HashSet<Uuid>>,
}

impl SubmissionGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a token. The first claim wins; every later claim of the same
    /// token is rejected.
    ///
    /// # Errors
    /// Returns [`DuplicateSubmission`] for a token already claimed.
    pub fn claim(&self, token: Uuid) -> Result<(), DuplicateSubmission> {
        let mut consumed = self.consumed.lock().unwrap_or_else(|e| e.into_inner());
        if consumed.insert(token) {
            Ok(())
        } else {
            Err(DuplicateSubmission(token))
        }
    }

    /// Releases a token whose submission never reached the venue, so the
    /// caller may retry with the same token.
    pub fn release(&self, token: Uuid) {
        self.consumed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&token);
    }
}
