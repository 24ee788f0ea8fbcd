//! Credential rotation pool with quota tracking and exhaustion forecasting
//!
//! Manages a set of access tokens with independent quotas and priority tiers,
//! selecting the best one to hand out next. Quota state lives entirely in
//! memory; usage windows reset lazily once a credential's cooldown elapses.
//!
//! Credential lifecycle:
//! 1. Pool is populated via `register_all` (startup or test harness)
//! 2. Callers draw tokens with `select_next` round-robin over eligible tiers
//! 3. Usage is accounted with `record_usage`; crossing a limit transitions
//!    the credential to `Exhausted` with a one-hour cooldown
//! 4. `observe_call` + `predict_action` give an early-warning signal before
//!    the hard limit is hit
//! 5. Cooldown expiry restores the credential on the next touch, without
//!    explicit action

pub mod credential;
pub mod pool;
pub mod predict;
pub mod rate;

pub use credential::{Credential, CredentialStatus, Tier};
pub use pool::CredentialPool;
pub use predict::{QuotaAction, predict_action};
pub use rate::RateWindow;
