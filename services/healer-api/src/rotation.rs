//! Previous-credential disposition during token rotation
//!
//! When a caller asks for a replacement token it reports how the old one
//! failed. The failure status decides what happens to the old credential
//! before a new one is selected: auth failures and deprecations disable it,
//! rate limits park it in a cooldown.

use std::time::Duration;

use tracing::info;

use credential_pool::{CredentialPool, CredentialStatus};

/// Cooldown applied when a 429 is reported for the previous credential.
const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);

/// What the rotation decided, echoed to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationAction {
    /// Previous credential stays usable later; a replacement is issued
    RefreshToken,
    /// Previous credential was retired; traffic must move off it
    RotateToken,
}

impl RotationAction {
    pub fn label(self) -> &'static str {
        match self {
            RotationAction::RefreshToken => "refresh_token",
            RotationAction::RotateToken => "rotate_token",
        }
    }
}

/// Apply the reported failure to the previous credential.
///
/// Unknown tokens fall through silently; the caller still gets a fresh
/// credential either way.
pub async fn dispose_previous_token(
    pool: &CredentialPool,
    previous_token: &str,
    failure_status: Option<u16>,
) -> (RotationAction, String) {
    if previous_token.is_empty() {
        return (
            RotationAction::RefreshToken,
            "Issued a standard replacement token.".to_string(),
        );
    }

    match failure_status {
        Some(403) => {
            let reason = "Provider blocked previous credential.";
            pool.mark_status_by_token(
                previous_token,
                CredentialStatus::Disabled,
                Some(reason),
                None,
            )
            .await;
            info!(failure_status = 403, status = "disabled", reason, "previous credential marked");
            (RotationAction::RotateToken, reason.to_string())
        }
        Some(401) => {
            let reason = "Credential rejected due to authentication failure.";
            pool.mark_status_by_token(
                previous_token,
                CredentialStatus::Disabled,
                Some(reason),
                None,
            )
            .await;
            info!(failure_status = 401, status = "disabled", reason, "previous credential marked");
            (RotationAction::RotateToken, reason.to_string())
        }
        Some(429) => {
            let reason = "Rate limit exceeded for credential.";
            pool.mark_status_by_token(
                previous_token,
                CredentialStatus::Exhausted,
                Some(reason),
                Some(RATE_LIMIT_COOLDOWN),
            )
            .await;
            info!(
                failure_status = 429,
                status = "exhausted",
                cooldown_secs = RATE_LIMIT_COOLDOWN.as_secs(),
                "previous credential marked"
            );
            (
                RotationAction::RefreshToken,
                "Previous credential temporarily exhausted. Selecting alternate token.".to_string(),
            )
        }
        Some(410) => {
            let reason = "Region deprecated. Prefer alternative credential.";
            pool.mark_status_by_token(
                previous_token,
                CredentialStatus::Disabled,
                Some(reason),
                None,
            )
            .await;
            info!(failure_status = 410, status = "disabled", reason, "previous credential marked");
            (RotationAction::RotateToken, reason.to_string())
        }
        _ => (
            RotationAction::RefreshToken,
            "Issued a standard replacement token.".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credential_pool::Credential;
    use std::time::Duration;

    async fn pool_with_one() -> CredentialPool {
        let pool = CredentialPool::new();
        pool.register_all(vec![Credential::new("cred-a", "demo", "std", "token-a")])
            .await;
        pool
    }

    #[tokio::test]
    async fn auth_failure_disables_previous() {
        let pool = pool_with_one().await;
        let (action, _) = dispose_previous_token(&pool, "token-a", Some(401)).await;
        assert_eq!(action, RotationAction::RotateToken);

        let cred = pool.lookup_by_token("token-a").await.unwrap();
        assert_eq!(cred.status, CredentialStatus::Disabled);
        assert!(cred.metadata.get("status_reason").unwrap().contains("authentication"));
    }

    #[tokio::test]
    async fn blocked_key_disables_previous() {
        let pool = pool_with_one().await;
        let (action, message) = dispose_previous_token(&pool, "token-a", Some(403)).await;
        assert_eq!(action, RotationAction::RotateToken);
        assert!(message.contains("blocked"));

        let cred = pool.lookup_by_token("token-a").await.unwrap();
        assert_eq!(cred.status, CredentialStatus::Disabled);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_parks_previous_in_cooldown() {
        let pool = pool_with_one().await;
        let (action, _) = dispose_previous_token(&pool, "token-a", Some(429)).await;
        assert_eq!(action, RotationAction::RefreshToken);

        let cred = pool.lookup_by_token("token-a").await.unwrap();
        assert_eq!(cred.status, CredentialStatus::Exhausted);

        tokio::time::advance(RATE_LIMIT_COOLDOWN + Duration::from_secs(1)).await;
        let cred = pool.lookup_by_token("token-a").await.unwrap();
        assert_eq!(cred.status, CredentialStatus::Active);
    }

    #[tokio::test]
    async fn deprecated_region_disables_previous() {
        let pool = pool_with_one().await;
        let (action, _) = dispose_previous_token(&pool, "token-a", Some(410)).await;
        assert_eq!(action, RotationAction::RotateToken);
        let cred = pool.lookup_by_token("token-a").await.unwrap();
        assert_eq!(cred.status, CredentialStatus::Disabled);
    }

    #[tokio::test]
    async fn other_statuses_leave_previous_untouched() {
        let pool = pool_with_one().await;
        for status in [None, Some(500), Some(503)] {
            let (action, _) = dispose_previous_token(&pool, "token-a", status).await;
            assert_eq!(action, RotationAction::RefreshToken);
            let cred = pool.lookup_by_token("token-a").await.unwrap();
            assert_eq!(cred.status, CredentialStatus::Active);
        }
    }

    #[tokio::test]
    async fn empty_and_unknown_tokens_are_no_ops() {
        let pool = pool_with_one().await;
        let (action, _) = dispose_previous_token(&pool, "", Some(403)).await;
        assert_eq!(action, RotationAction::RefreshToken);

        dispose_previous_token(&pool, "ghost-token", Some(403)).await;
        let cred = pool.lookup_by_token("token-a").await.unwrap();
        assert_eq!(cred.status, CredentialStatus::Active);
    }
}
