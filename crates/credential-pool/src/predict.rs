//! Quota exhaustion forecasting
//!
//! Turns a credential's remaining budget and its observed call rate into an
//! early-warning verdict. This is a heuristic signal for callers who want to
//! slow down or rotate before the hard limit; authoritative exhaustion is
//! enforced by `record_usage` and the selection scan.

use crate::credential::Credential;

/// Verdict for continued use of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaAction {
    /// Budget is comfortable, keep going
    Allow,
    /// Budget is tightening, slow down on this credential
    Throttle,
    /// Budget is (about to be) gone, rotate to another credential
    Switch,
}

impl QuotaAction {
    pub fn label(self) -> &'static str {
        match self {
            QuotaAction::Allow => "allow",
            QuotaAction::Throttle => "throttle",
            QuotaAction::Switch => "switch",
        }
    }
}

/// Forecast whether the caller should keep using `credential`.
///
/// Either budget already spent forces `Switch`. Otherwise the call-rate
/// projection decides when a call limit and a positive rate exist: fewer
/// than 5 minutes of budget left means `Switch`, fewer than 15 `Throttle`.
/// Without a usable rate the token budget ratio decides: at or below 5%
/// remaining `Switch`, at or below 15% `Throttle`.
pub fn predict_action(credential: &Credential, avg_calls_per_minute: f64) -> QuotaAction {
    let remaining_calls = credential
        .effective_call_limit()
        .map(|limit| i64::from(limit) - i64::from(credential.used_calls));
    let remaining_tokens = credential
        .token_limit()
        .map(|limit| limit as i64 - credential.used_tokens as i64);

    if remaining_calls.is_some_and(|r| r <= 0) || remaining_tokens.is_some_and(|r| r <= 0) {
        return QuotaAction::Switch;
    }

    if let Some(remaining) = remaining_calls
        && avg_calls_per_minute > 0.0
    {
        let minutes_left = remaining as f64 / avg_calls_per_minute;
        if minutes_left < 5.0 {
            return QuotaAction::Switch;
        }
        if minutes_left < 15.0 {
            return QuotaAction::Throttle;
        }
        return QuotaAction::Allow;
    }

    if let (Some(remaining), Some(limit)) = (remaining_tokens, credential.token_limit()) {
        let ratio = remaining as f64 / limit as f64;
        if ratio <= 0.05 {
            return QuotaAction::Switch;
        }
        if ratio <= 0.15 {
            return QuotaAction::Throttle;
        }
    }

    QuotaAction::Allow
}
