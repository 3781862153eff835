// Authentication types

use chrono::Utc;

/// Seconds subtracted from the decoded expiry to force early renewal
pub const EXPIRY_MARGIN_SECS: f64 = 60.0;

/// Cached bearer token together with the instant it stops being served
///
/// Replaced as a whole on every refresh so readers never see a token paired
/// with another token's expiry.
#[derive(Clone)]
pub struct Session {
    pub token: String,
    /// Seconds since the Unix epoch, already reduced by the safety margin
    pub expires_at: f64,
}

impl Session {
    /// Build a session from a token and its decoded expiry claim
    pub fn from_claim(token: String, claim_exp: f64) -> Self {
        Self {
            token,
            expires_at: claim_exp - EXPIRY_MARGIN_SECS,
        }
    }

    pub fn is_valid_at(&self, now: f64) -> bool {
        now < self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_secs())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &token_preview(&self.token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Current wall-clock time as fractional seconds since the Unix epoch
pub fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// First characters of a token, safe to log
pub fn token_preview(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{}...", prefix)
}
