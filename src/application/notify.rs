//! Outbound notifications (registration, verification and password-reset mail).

use async_trait::async_trait;

use crate::domain::entities::UserRecord;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// `verify_link` is the path of the user's email verification link.
    async fn user_registered(&self, user: &UserRecord, verify_link: &str);

    async fn verification_requested(&self, email: &str, name: &str, verify_link: &str);

    /// `token` is the plain reset token; only its hash is stored.
    async fn password_reset_requested(&self, email: &str, name: &str, token: &str);
}
