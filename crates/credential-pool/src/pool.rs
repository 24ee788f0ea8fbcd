//! Pool state machine and rotation-aware credential selection
//!
//! The pool owns the credential set: an insertion-stable rotation order,
//! lookups by id and by token, per-credential rate windows, and one shared
//! rotation cursor. All of it sits behind a single lock so that
//! check-then-mark-exhausted and check-then-advance-cursor stay atomic under
//! concurrent callers.
//!
//! Selection scans the full ring once from the cursor, collects every
//! eligible credential, prefers the ones not flirting with their quota, and
//! ranks the rest by tier then staleness. The cursor lands just past the
//! winner's slot in the original order.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::credential::{Credential, CredentialStatus};
use crate::rate::RateWindow;

/// Cooldown scheduled when a credential crosses a limit during accounting or
/// the selection scan.
const EXHAUSTED_COOLDOWN: Duration = Duration::from_secs(3600);

#[derive(Default)]
struct PoolState {
    /// Rotation order, insertion-stable. Ids, not credentials, so the map
    /// stays the single owner.
    order: Vec<String>,
    credentials: HashMap<String, Credential>,
    token_to_id: HashMap<String, String>,
    cursor: usize,
    rates: HashMap<String, RateWindow>,
}

/// An eligible credential captured during the selection scan.
struct Candidate {
    idx: usize,
    id: String,
    priority: u8,
    last_rotated_at: Option<Instant>,
    near_quota: bool,
}

/// Shared credential pool with quota enforcement and round-robin rotation.
#[derive(Default)]
pub struct CredentialPool {
    state: Mutex<PoolState>,
}

impl CredentialPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace the pool contents.
    ///
    /// Clears the rotation order, both lookup maps, the cursor, and the rate
    /// windows, then registers `credentials` in argument order. Used at
    /// startup and for test isolation, not for incremental membership
    /// changes.
    pub async fn register_all(&self, credentials: Vec<Credential>) {
        let mut state = self.state.lock().await;
        *state = PoolState::default();
        for credential in credentials {
            state
                .token_to_id
                .insert(credential.api_key.clone(), credential.id.clone());
            state.order.push(credential.id.clone());
            state.credentials.insert(credential.id.clone(), credential);
        }
        info!(credentials = state.order.len(), "credential pool registered");
    }

    /// Resolve a credential by its secret token value.
    pub async fn lookup_by_token(&self, token: &str) -> Option<Credential> {
        let mut state = self.state.lock().await;
        let id = state.token_to_id.get(token)?.clone();
        let now = Instant::now();
        let credential = state.credentials.get_mut(&id)?;
        credential.auto_reset(now);
        Some(credential.clone())
    }

    /// Force-set a credential's status.
    ///
    /// `reason` lands in the credential's metadata for operators. With a
    /// `cooldown` the reset is scheduled at `now + cooldown`; without one,
    /// any non-exhausted status clears a pending reset. Unknown ids are a
    /// no-op.
    pub async fn mark_status(
        &self,
        id: &str,
        status: CredentialStatus,
        reason: Option<&str>,
        cooldown: Option<Duration>,
    ) {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let Some(credential) = state.credentials.get_mut(id) else {
            return;
        };
        credential.auto_reset(now);
        credential.status = status;
        if let Some(reason) = reason {
            credential
                .metadata
                .insert("status_reason".into(), reason.into());
        }
        if let Some(cooldown) = cooldown {
            credential.reset_at = Some(now + cooldown);
        } else if status != CredentialStatus::Exhausted {
            credential.reset_at = None;
        }
        info!(credential_id = id, status = status.label(), "credential status set");
    }

    /// `mark_status`, addressed by token instead of id.
    pub async fn mark_status_by_token(
        &self,
        token: &str,
        status: CredentialStatus,
        reason: Option<&str>,
        cooldown: Option<Duration>,
    ) {
        let id = {
            let state = self.state.lock().await;
            state.token_to_id.get(token).cloned()
        };
        if let Some(id) = id {
            self.mark_status(&id, status, reason, cooldown).await;
        }
    }

    /// Account usage against a credential.
    ///
    /// Bumps the windowed and lifetime counters; crossing either effective
    /// budget transitions the credential to `Exhausted` with a one-hour
    /// cooldown, unless a reset is already scheduled. Returns the updated
    /// credential.
    pub async fn record_usage(
        &self,
        id: &str,
        call_count: u32,
        tokens_used: u64,
    ) -> Option<Credential> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let credential = state.credentials.get_mut(id)?;
        credential.auto_reset(now);
        credential.used_calls += call_count;
        credential.used_tokens += tokens_used;
        credential.total_calls += u64::from(call_count);
        credential.total_tokens += tokens_used;
        if credential.limit_breached() {
            credential.status = CredentialStatus::Exhausted;
            credential.reset_at.get_or_insert(now + EXHAUSTED_COOLDOWN);
            warn!(
                credential_id = id,
                used_calls = credential.used_calls,
                used_tokens = credential.used_tokens,
                "credential exhausted by usage"
            );
            metrics::counter!("pool_credentials_exhausted_total").increment(1);
        }
        Some(credential.clone())
    }

    /// Record a call in the credential's rate window and return the current
    /// calls-per-minute estimate. Unknown ids report a zero rate.
    pub async fn observe_call(&self, id: &str) -> f64 {
        let mut state = self.state.lock().await;
        if !state.credentials.contains_key(id) {
            return 0.0;
        }
        let now = Instant::now();
        state.rates.entry(id.to_string()).or_default().observe(now)
    }

    /// Select the next credential for `provider` (and `model`, when given).
    ///
    /// One circular scan from the shared cursor collects every active,
    /// matching credential; anything that turns out to be over a limit is
    /// moved to `Exhausted` on the way past. Candidates clear of the
    /// near-quota line are preferred, with the full candidate set as
    /// fallback so progress never stalls. Ties break by tier priority, then
    /// by least-recently-rotated (never-rotated first). The winner is
    /// stamped and the cursor advances past its original slot.
    pub async fn select_next(&self, provider: &str, model: Option<&str>) -> Option<Credential> {
        let mut state = self.state.lock().await;
        let total = state.order.len();
        if total == 0 {
            return None;
        }
        let now = Instant::now();
        let start = state.cursor;

        let mut candidates: Vec<Candidate> = Vec::new();
        for offset in 0..total {
            let idx = (start + offset) % total;
            let id = state.order[idx].clone();
            let Some(credential) = state.credentials.get_mut(&id) else {
                continue;
            };
            credential.auto_reset(now);
            if credential.provider != provider {
                continue;
            }
            if model.is_some_and(|m| credential.model != m) {
                continue;
            }
            if credential.status != CredentialStatus::Active {
                continue;
            }
            if credential.limit_breached() {
                credential.status = CredentialStatus::Exhausted;
                credential.reset_at.get_or_insert(now + EXHAUSTED_COOLDOWN);
                debug!(credential_id = %id, "credential exhausted during selection scan");
                metrics::counter!("pool_credentials_exhausted_total").increment(1);
                continue;
            }
            candidates.push(Candidate {
                idx,
                id,
                priority: credential.tier.priority(),
                last_rotated_at: credential.last_rotated_at,
                near_quota: credential.near_quota(),
            });
        }

        if candidates.is_empty() {
            debug!(provider, model = model.unwrap_or(""), "no eligible credential");
            return None;
        }

        // Two-phase policy: avoid pinning traffic on a credential about to
        // exhaust, but fall back to the full set when everything is close.
        let any_clear = candidates.iter().any(|c| !c.near_quota);
        let mut eligible: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| !any_clear || !c.near_quota)
            .collect();
        // Stable sort: equal keys keep scan order from the cursor
        eligible.sort_by_key(|c| (c.priority, c.last_rotated_at));

        let winner = eligible.first()?;
        let winner_id = winner.id.clone();
        state.cursor = (winner.idx + 1) % total;
        let credential = state.credentials.get_mut(&winner_id)?;
        credential.last_rotated_at = Some(now);
        debug!(credential_id = %winner_id, provider, "credential selected");
        metrics::counter!("pool_credentials_selected_total", "provider" => provider.to_string())
            .increment(1);
        Some(credential.clone())
    }

    /// Pool summary for the health endpoint.
    ///
    /// Status mapping: all active → healthy, some active → degraded, none
    /// active → unhealthy.
    pub async fn health(&self) -> serde_json::Value {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let order = state.order.clone();

        let mut active = 0usize;
        let mut exhausted = 0usize;
        let mut disabled = 0usize;
        let mut entries = Vec::new();

        for id in &order {
            let Some(credential) = state.credentials.get_mut(id) else {
                continue;
            };
            credential.auto_reset(now);
            match credential.status {
                CredentialStatus::Active => active += 1,
                CredentialStatus::Exhausted => exhausted += 1,
                CredentialStatus::Disabled => disabled += 1,
            }
            let mut entry = serde_json::json!({
                "id": credential.id,
                "provider": credential.provider,
                "model": credential.model,
                "tier": credential.tier.label(),
                "status": credential.status.label(),
                "used_calls": credential.used_calls,
                "used_tokens": credential.used_tokens,
                "total_calls": credential.total_calls,
                "total_tokens": credential.total_tokens,
            });
            if let Some(remaining) = credential.seconds_until_reset(now) {
                entry["reset_in_secs"] = remaining.into();
            }
            if let Some(reason) = credential.metadata.get("status_reason") {
                entry["status_reason"] = reason.as_str().into();
            }
            entries.push(entry);
        }

        let total = order.len();
        let pool_status = if active == total && total > 0 {
            "healthy"
        } else if active > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        serde_json::json!({
            "status": pool_status,
            "credentials_total": total,
            "credentials_active": active,
            "credentials_exhausted": exhausted,
            "credentials_disabled": disabled,
            "credentials": entries,
        })
    }
}
