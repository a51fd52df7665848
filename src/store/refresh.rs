//! Proactive refresh policy.
//!
//! A token is refreshed once it is inside the last minute of its lifetime so
//! that clock skew and in-flight requests do not run into an expired token.

use chrono::Utc;

use super::db::TokenRow;

/// Seconds before `expires_at` at which a refresh becomes due.
pub const REFRESH_WINDOW_SECS: i64 = 60;

/// Whether `row` should be refreshed now (wall clock).
pub fn needs_refresh(row: Option<&TokenRow>) -> bool {
    needs_refresh_at(row, Utc::now().timestamp())
}

/// Whether `row` should be refreshed at epoch second `now`.
///
/// Rows without an expiry are treated as non-expiring.
pub fn needs_refresh_at(row: Option<&TokenRow>, now: i64) -> bool {
    match row.and_then(|r| r.expires_at) {
        Some(expires_at) => now >= expires_at - REFRESH_WINDOW_SECS,
        None => false,
    }
}
