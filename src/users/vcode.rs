use dashmap::DashMap;
use rand::Rng;
use time::{Duration, OffsetDateTime};
use tracing::debug;

#[derive(Debug, Clone)]
struct PendingCode {
    code: String,
    expires_at: OffsetDateTime,
}

/// One-time login codes keyed by phone number.
pub struct VerificationCodes {
    codes: DashMap<String, PendingCode>,
    ttl: Duration,
}

impl VerificationCodes {
    pub fn new(ttl: Duration) -> Self {
        Self {
            codes: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Generate a 6-digit code for `phone`, replacing any pending one.
    pub fn issue(&self, phone: &str) -> String {
        self.purge_expired();
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
        let pending = PendingCode {
            code: code.clone(),
            expires_at: OffsetDateTime::now_utc() + self.ttl,
        };
        self.codes.insert(phone.to_string(), pending);
        debug!(phone, "verification code issued");
        code
    }

    /// Check `code` for `phone`. A matching code is consumed; an expired one is dropped.
    pub fn verify(&self, phone: &str, code: &str) -> bool {
        let now = OffsetDateTime::now_utc();
        let expired = self
            .codes
            .remove_if(phone, |_, pending| now >= pending.expires_at)
            .is_some();
        if expired {
            return false;
        }
        self.codes
            .remove_if(phone, |_, pending| pending.code == code)
            .is_some()
    }

    /// Drop every expired code.
    pub fn purge_expired(&self) {
        let now = OffsetDateTime::now_utc();
        self.codes.retain(|_, pending| now < pending.expires_at);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.codes.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
