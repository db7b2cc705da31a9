//! Session identifier generation.
//!
//! An id looks like `1718000000000_Q3xv9LwPz0aKb7Ty`: milliseconds since the
//! Unix epoch, an underscore, then 16 random alphanumeric characters.
//!
//! The time prefix makes ids sort by creation and keeps two ids from the
//! same instant apart only by their suffix. The suffix carries
//! 16 × log2(62) ≈ 95 bits of randomness, which is what makes an id hard to
//! guess.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use passage_protocol::SessionId;
use rand::distr::Alphanumeric;
use rand::Rng;

/// Number of random characters after the time prefix.
pub const SUFFIX_LEN: usize = 16;

/// Produces a new session identifier for each login attempt.
///
/// A trait so tests can swap in predictable ids. Generation never fails.
pub trait SessionIdGenerator: Send + Sync + 'static {
    /// Returns a fresh identifier.
    fn generate(&self) -> SessionId;
}

/// The default generator: time prefix plus random suffix.
///
/// The time prefix never goes backwards within one generator, even if the
/// wall clock is adjusted.
#[derive(Debug, Default)]
pub struct RandomSessionIds {
    last_millis: AtomicU64,
}

impl RandomSessionIds {
    /// Creates a generator.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionIdGenerator for RandomSessionIds {
    fn generate(&self) -> SessionId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        // `fetch_max` returns the previous value; the larger of the two is
        // the prefix we use.
        let millis = self.last_millis.fetch_max(now, Ordering::Relaxed).max(now);

        let suffix: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(SUFFIX_LEN)
            .map(char::from)
            .collect();

        SessionId::new(format!("{millis}_{suffix}"))
    }
}
