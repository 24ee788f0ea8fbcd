//! Credential records and the lazy reset rule
//!
//! A credential is one access token plus its quota accounting. Status
//! transitions:
//! - Active → Exhausted (a limit is met, or forced with a cooldown)
//! - Active → Disabled (forced, e.g. upstream rejected the key)
//! - Exhausted → Active (cooldown elapsed, applied lazily on next touch)
//! - Disabled → Active (forced re-enable only)

use std::collections::HashMap;
use std::fmt;

use tokio::time::Instant;

/// Runtime status of a pooled credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Active,
    Exhausted,
    Disabled,
}

impl CredentialStatus {
    /// Status label for responses and logging.
    pub fn label(self) -> &'static str {
        match self {
            CredentialStatus::Active => "active",
            CredentialStatus::Exhausted => "exhausted",
            CredentialStatus::Disabled => "disabled",
        }
    }
}

/// Priority class used to rank otherwise-eligible candidates.
///
/// Lower `priority()` wins: primary < backup < free-tier < unclassified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tier {
    Primary,
    Backup,
    FreeTier,
    #[default]
    Other,
}

impl Tier {
    pub fn priority(self) -> u8 {
        match self {
            Tier::Primary => 0,
            Tier::Backup => 1,
            Tier::FreeTier => 2,
            Tier::Other => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Primary => "primary",
            Tier::Backup => "backup",
            Tier::FreeTier => "free-tier",
            Tier::Other => "other",
        }
    }
}

/// One access token with its quota accounting.
///
/// `used_calls`/`used_tokens` are windowed counters zeroed by the reset rule;
/// `total_calls`/`total_tokens` are lifetime counters and never reset.
/// A limit of zero is treated as unset.
#[derive(Clone)]
pub struct Credential {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub api_key: String,
    pub status: CredentialStatus,
    pub tier: Tier,
    /// Stricter override for the call budget. Wins over `daily_call_limit`.
    pub max_calls_per_day: Option<u32>,
    /// Legacy call budget, used when no override is set.
    pub daily_call_limit: Option<u32>,
    pub max_tokens_per_day: Option<u64>,
    pub used_calls: u32,
    pub used_tokens: u64,
    pub total_calls: u64,
    pub total_tokens: u64,
    /// When set and elapsed, the next touch zeroes usage and clears
    /// `Exhausted`.
    pub reset_at: Option<Instant>,
    pub last_rotated_at: Option<Instant>,
    pub metadata: HashMap<String, String>,
}

impl Credential {
    pub fn new(
        id: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            model: model.into(),
            api_key: api_key.into(),
            status: CredentialStatus::Active,
            tier: Tier::default(),
            max_calls_per_day: None,
            daily_call_limit: None,
            max_tokens_per_day: None,
            used_calls: 0,
            used_tokens: 0,
            total_calls: 0,
            total_tokens: 0,
            reset_at: None,
            last_rotated_at: None,
            metadata: HashMap::new(),
        }
    }

    /// Call budget used for exhaustion checks: override first, then legacy.
    pub fn effective_call_limit(&self) -> Option<u32> {
        self.max_calls_per_day
            .filter(|&limit| limit > 0)
            .or(self.daily_call_limit.filter(|&limit| limit > 0))
    }

    /// Token budget, zero meaning unset.
    pub fn token_limit(&self) -> Option<u64> {
        self.max_tokens_per_day.filter(|&limit| limit > 0)
    }

    /// Whether usage has reached 90% of either configured budget.
    pub fn near_quota(&self) -> bool {
        if let Some(limit) = self.effective_call_limit()
            && f64::from(self.used_calls) >= 0.9 * f64::from(limit)
        {
            return true;
        }
        if let Some(limit) = self.token_limit()
            && self.used_tokens as f64 >= 0.9 * limit as f64
        {
            return true;
        }
        false
    }

    /// Whether either effective budget is met or exceeded.
    pub fn limit_breached(&self) -> bool {
        if self
            .effective_call_limit()
            .is_some_and(|limit| self.used_calls >= limit)
        {
            return true;
        }
        self.token_limit()
            .is_some_and(|limit| self.used_tokens >= limit)
    }

    /// Lazy reset: once `reset_at` elapses, zero the call window and restore
    /// an exhausted credential to active (token window included). Invoked at
    /// the top of every pool operation that touches this credential, so the
    /// rule lives in exactly one place.
    pub fn auto_reset(&mut self, now: Instant) {
        let Some(reset_at) = self.reset_at else {
            return;
        };
        if now < reset_at {
            return;
        }
        self.used_calls = 0;
        self.reset_at = None;
        if self.status == CredentialStatus::Exhausted {
            self.status = CredentialStatus::Active;
            self.used_tokens = 0;
        }
    }

    /// Whole seconds until the scheduled reset, if one is pending.
    pub fn seconds_until_reset(&self, now: Instant) -> Option<u64> {
        let reset_at = self.reset_at?;
        let remaining = reset_at.saturating_duration_since(now).as_secs();
        if remaining == 0 { None } else { Some(remaining) }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .field("status", &self.status)
            .field("tier", &self.tier)
            .field("used_calls", &self.used_calls)
            .field("used_tokens", &self.used_tokens)
            .finish_non_exhaustive()
    }
}
