//! Client configuration constants.

use std::time::Duration;

/// Attempts per remote call when the transport fails, including the first.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Pause between transport retries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);
