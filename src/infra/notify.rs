use async_trait::async_trait;
use tracing::info;

use crate::application::notify::Notifier;
use crate::domain::entities::UserRecord;

/// Writes notifications to the log instead of sending mail.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn user_registered(&self, user: &UserRecord, verify_link: &str) {
        info!(
            target: "schoolboard::notify",
            user_id = %user.id,
            email = %user.email,
            name = %user.name,
            link_len = verify_link.len(),
            "welcome notification queued"
        );
    }

    async fn verification_requested(&self, email: &str, name: &str, verify_link: &str) {
        info!(
            target: "schoolboard::notify",
            email = %email,
            name = %name,
            link_len = verify_link.len(),
            "verification notification queued"
        );
    }

    async fn password_reset_requested(&self, email: &str, name: &str, token: &str) {
        info!(
            target: "schoolboard::notify",
            email = %email,
            name = %name,
            token_len = token.len(),
            "password reset notification queued"
        );
    }
}
