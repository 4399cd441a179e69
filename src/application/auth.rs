//! Personal access tokens, login, email verification and password management.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::application::audit::{Actor, AuditService};
use crate::application::error::AppError;
use crate::application::notify::Notifier;
use crate::application::passwords::{hash_password_blocking, verify_password_blocking};
use crate::application::repos::{AuthRepo, NewAccessToken, RepoError};
use crate::config::AuthSettings;
use crate::domain::entities::{UserCredentials, UserRecord};
use crate::domain::permissions::{Permission, resolve_permissions};
use crate::domain::validation::{
    FieldErrors, check_password, flexible_bool, is_valid_email, required_message,
};

const TOKEN_PREFIX: &str = "pat";
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing access token")]
    Missing,
    #[error("invalid access token")]
    Invalid,
    #[error("expired access token")]
    Expired,
    #[error("revoked access token")]
    Revoked,
    /// The token could not be checked; not the caller's fault.
    #[error("token lookup failed: {0}")]
    Store(#[from] RepoError),
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct AuthPrincipal {
    pub user_id: Uuid,
    pub token_id: Uuid,
    pub name: String,
    pub email: String,
    pub email_verified_at: Option<OffsetDateTime>,
    pub permissions: BTreeSet<Permission>,
}

impl AuthPrincipal {
    pub fn requires(&self, needed: &Permission) -> Result<(), AppError> {
        if self.permissions.contains(needed) {
            Ok(())
        } else {
            Err(AppError::Forbidden(needed.to_string()))
        }
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id, self.email.clone())
    }

    pub fn is_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub remember_me: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: Option<String>,
    #[serde(default)]
    pub new_password: Option<String>,
    #[serde(default)]
    pub new_password_confirmation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_confirmation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub token_type: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub user: SessionUser,
    pub roles: Vec<String>,
    pub permissions: Vec<Permission>,
}

#[derive(Clone)]
pub struct AuthService {
    repo: Arc<dyn AuthRepo>,
    notifier: Arc<dyn Notifier>,
    audit: AuditService,
    settings: AuthSettings,
}

impl AuthService {
    pub fn new(
        repo: Arc<dyn AuthRepo>,
        notifier: Arc<dyn Notifier>,
        audit: AuditService,
        settings: AuthSettings,
    ) -> Self {
        Self {
            repo,
            notifier,
            audit,
            settings,
        }
    }

    pub async fn login(&self, request: LoginRequest) -> Result<LoginOutcome, AppError> {
        let mut errors = FieldErrors::new();
        let email = errors.required("email", request.email);
        let password = errors.required("password", request.password);
        let (Some(email), Some(password)) = (email, password) else {
            return Err(AppError::Validation(errors));
        };

        let credentials = self
            .repo
            .find_credentials_by_email(&email)
            .await?
            .ok_or_else(invalid_credentials)?;
        if !password_matches(&password, &credentials).await? {
            return Err(invalid_credentials());
        }

        let ttl = if request.remember_me.unwrap_or(false) {
            self.settings.remember_ttl
        } else {
            self.settings.token_ttl
        };
        let expires_at = OffsetDateTime::now_utc() + ttl;

        let prefix = generate_prefix();
        let secret = generate_secret();
        let token = format!("{TOKEN_PREFIX}_{prefix}_{secret}");
        self.repo
            .create_token(NewAccessToken {
                user_id: credentials.id,
                prefix,
                hashed_secret: hash_secret(&secret),
                expires_at,
            })
            .await?;

        let snapshot = self.repo.authorization_snapshot(credentials.id).await?;
        let roles = snapshot
            .roles
            .iter()
            .filter(|role| role.active)
            .map(|role| role.name.clone())
            .collect();
        let permissions = resolve_permissions(&snapshot).into_iter().collect();

        self.record(&credentials, "auth.login").await;

        Ok(LoginOutcome {
            token,
            token_type: "Bearer",
            expires_at,
            user: SessionUser {
                id: credentials.id,
                name: credentials.name,
                email: credentials.email,
            },
            roles,
            permissions,
        })
    }

    pub async fn authenticate(&self, token: &str) -> Result<AuthPrincipal, AuthError> {
        let parsed = parse_token(token).ok_or(AuthError::Invalid)?;
        let record = self
            .repo
            .find_token_by_prefix(&parsed.prefix)
            .await?
            .ok_or(AuthError::Invalid)?;

        let now = OffsetDateTime::now_utc();
        if let Some(revoked_at) = record.revoked_at
            && revoked_at <= now
        {
            return Err(AuthError::Revoked);
        }
        if record.expires_at <= now {
            return Err(AuthError::Expired);
        }

        let hashed_input = hash_secret(&parsed.secret);
        if record.hashed_secret.ct_eq(&hashed_input).unwrap_u8() == 0 {
            return Err(AuthError::Invalid);
        }

        let credentials = self
            .repo
            .find_credentials(record.user_id)
            .await?
            .ok_or(AuthError::Invalid)?;
        let snapshot = self.repo.authorization_snapshot(record.user_id).await?;

        // best-effort last_used update; do not block auth
        let repo = self.repo.clone();
        tokio::spawn(async move {
            let _ = repo.touch_token(record.id, now).await;
        });

        Ok(AuthPrincipal {
            user_id: credentials.id,
            token_id: record.id,
            name: credentials.name,
            email: credentials.email,
            email_verified_at: credentials.email_verified_at,
            permissions: resolve_permissions(&snapshot),
        })
    }

    pub async fn logout(&self, principal: &AuthPrincipal) -> Result<(), AppError> {
        self.repo
            .revoke_token(principal.token_id, OffsetDateTime::now_utc())
            .await?;
        self.audit
            .record::<()>(
                &principal.email,
                "auth.logout",
                "user",
                Some(&principal.user_id.to_string()),
                None,
            )
            .await;
        Ok(())
    }

    pub async fn change_password(
        &self,
        principal: &AuthPrincipal,
        request: ChangePasswordRequest,
    ) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        let current = errors.required("current_password", request.current_password);
        let new_password = errors.required("new_password", request.new_password);
        if let Some(new_password) = &new_password {
            check_password("new_password", new_password, &mut errors);
            check_confirmation(
                "new_password",
                new_password,
                request.new_password_confirmation.as_deref(),
                &mut errors,
            );
        }
        let (Some(current), Some(new_password)) = (current, new_password) else {
            return Err(AppError::Validation(errors));
        };
        errors.finish(()).map_err(AppError::Validation)?;

        let credentials = self
            .repo
            .find_credentials(principal.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;
        if !password_matches(&current, &credentials).await? {
            return Err(AppError::Rejected(
                "Current password does not match".to_string(),
            ));
        }

        let hash = hash_password_blocking(new_password)
            .await
            .map_err(|err| AppError::unexpected(err.to_string()))?;
        self.repo.update_password(credentials.id, &hash).await?;
        self.record(&credentials, "auth.change_password").await;
        Ok(())
    }

    /// Store a hashed single-use reset token and hand the plain one to the notifier.
    pub async fn forgot_password(&self, request: ForgotPasswordRequest) -> Result<(), AppError> {
        let credentials = self.existing_user(request.email).await?;

        let token = generate_secret();
        let expires_at = OffsetDateTime::now_utc() + self.settings.password_reset_ttl;
        self.repo
            .create_password_reset(credentials.id, hash_secret(&token), expires_at)
            .await?;

        let notifier = self.notifier.clone();
        let email = credentials.email.clone();
        let name = credentials.name.clone();
        tokio::spawn(async move {
            notifier
                .password_reset_requested(&email, &name, &token)
                .await;
        });

        self.record(&credentials, "auth.forgot_password").await;
        Ok(())
    }

    /// Consumes every reset token of the user and revokes their access tokens
    /// in the same transaction as the password change.
    pub async fn reset_password(&self, request: ResetPasswordRequest) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        let token = errors.required("token", request.token);
        let password = errors.required("password", request.password);
        if let Some(password) = &password {
            check_password("password", password, &mut errors);
            check_confirmation(
                "password",
                password,
                request.password_confirmation.as_deref(),
                &mut errors,
            );
        }
        let credentials = match self.existing_user(request.email).await {
            Ok(credentials) => Some(credentials),
            Err(AppError::Validation(email_errors)) => {
                errors.merge(email_errors);
                None
            }
            Err(other) => return Err(other),
        };
        let (Some(token), Some(password), Some(credentials)) = (token, password, credentials)
        else {
            return Err(AppError::Validation(errors));
        };
        errors.finish(()).map_err(AppError::Validation)?;

        let now = OffsetDateTime::now_utc();
        let hashed = hash_secret(&token);
        let resets = self.repo.password_resets(credentials.id).await?;
        let valid = resets.iter().any(|reset| {
            reset.expires_at > now && reset.hashed_token.ct_eq(&hashed).unwrap_u8() == 1
        });
        if !valid {
            return Err(AppError::Rejected(
                "Invalid or expired password reset token".to_string(),
            ));
        }

        let hash = hash_password_blocking(password)
            .await
            .map_err(|err| AppError::unexpected(err.to_string()))?;
        self.repo
            .complete_password_reset(credentials.id, &hash, now)
            .await?;

        self.record(&credentials, "auth.reset_password").await;
        Ok(())
    }

    /// Fire-and-forget welcome notification carrying a verification link.
    pub fn announce_registration(&self, user: UserRecord) {
        let service = self.clone();
        tokio::spawn(async move {
            match service.issue_verification(user.id).await {
                Ok(link) => service.notifier.user_registered(&user, &link).await,
                Err(err) => warn!(
                    target: "schoolboard::auth",
                    user_id = %user.id,
                    error = %err,
                    "failed to issue email verification"
                ),
            }
        });
    }

    pub async fn verify_email(
        &self,
        principal: &AuthPrincipal,
        user_id: Uuid,
        token: &str,
    ) -> Result<(), AppError> {
        if principal.user_id != user_id {
            return Err(AppError::Forbidden("verification.own".to_string()));
        }
        let credentials = self
            .repo
            .find_credentials(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;
        if credentials.email_verified_at.is_some() {
            return Err(already_verified());
        }

        let now = OffsetDateTime::now_utc();
        let hashed = hash_secret(token);
        let pending = self.repo.email_verifications(user_id).await?;
        let valid = pending.iter().any(|entry| {
            entry.expires_at > now && entry.hashed_token.ct_eq(&hashed).unwrap_u8() == 1
        });
        if !valid {
            return Err(AppError::Forbidden("verification.link".to_string()));
        }

        self.repo.mark_email_verified(user_id, now).await?;
        self.record(&credentials, "auth.verify_email").await;
        Ok(())
    }

    pub async fn resend_verification(&self, principal: &AuthPrincipal) -> Result<(), AppError> {
        let credentials = self
            .repo
            .find_credentials(principal.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;
        if credentials.email_verified_at.is_some() {
            return Err(already_verified());
        }

        let link = self.issue_verification(credentials.id).await?;
        let notifier = self.notifier.clone();
        let email = credentials.email.clone();
        let name = credentials.name.clone();
        tokio::spawn(async move {
            notifier.verification_requested(&email, &name, &link).await;
        });

        self.record(&credentials, "auth.resend_verify_email").await;
        Ok(())
    }

    /// Store a hashed verification token and return the link path carrying the plain one.
    async fn issue_verification(&self, user_id: Uuid) -> Result<String, AppError> {
        let token = generate_secret();
        let expires_at = OffsetDateTime::now_utc() + self.settings.email_verification_ttl;
        self.repo
            .create_email_verification(user_id, hash_secret(&token), expires_at)
            .await?;
        Ok(verification_path(user_id, &token))
    }

    async fn existing_user(&self, email: Option<String>) -> Result<UserCredentials, AppError> {
        let mut errors = FieldErrors::new();
        let Some(email) = errors.required("email", email) else {
            return Err(AppError::Validation(errors));
        };
        if !is_valid_email(&email) {
            errors.add("email", "The email field must be a valid email address.");
            return Err(AppError::Validation(errors));
        }
        match self.repo.find_credentials_by_email(&email).await? {
            Some(credentials) => Ok(credentials),
            None => {
                errors.invalid_selection("email");
                Err(AppError::Validation(errors))
            }
        }
    }

    async fn record(&self, credentials: &UserCredentials, action: &str) {
        self.audit
            .record::<()>(
                &credentials.email,
                action,
                "user",
                Some(&credentials.id.to_string()),
                None,
            )
            .await;
    }
}

fn invalid_credentials() -> AppError {
    AppError::Rejected("Invalid credentials".to_string())
}

fn already_verified() -> AppError {
    AppError::Rejected("Email already verified".to_string())
}

pub fn verification_path(user_id: Uuid, token: &str) -> String {
    format!("/auth/email/verify/{user_id}/{token}")
}

async fn password_matches(
    password: &str,
    credentials: &UserCredentials,
) -> Result<bool, AppError> {
    verify_password_blocking(password.to_string(), credentials.password_hash.clone())
        .await
        .map_err(|err| {
            warn!(
                target: "schoolboard::auth",
                user_id = %credentials.id,
                error = %err,
                "stored password hash is unusable"
            );
            AppError::unexpected(err.to_string())
        })
}

fn check_confirmation(
    field: &str,
    value: &str,
    confirmation: Option<&str>,
    errors: &mut FieldErrors,
) {
    match confirmation {
        Some(confirmation) if confirmation == value => {}
        Some(_) => errors.add(
            field,
            format!(
                "The {} field confirmation does not match.",
                field.replace('_', " ")
            ),
        ),
        None => {
            let confirmation_field = format!("{field}_confirmation");
            errors.add(confirmation_field.clone(), required_message(&confirmation_field));
        }
    }
}

fn hash_secret(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

fn generate_prefix() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

fn generate_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

struct ParsedToken {
    prefix: String,
    secret: String,
}

fn parse_token(token: &str) -> Option<ParsedToken> {
    let mut parts = token.splitn(3, '_');
    if parts.next()? != TOKEN_PREFIX {
        return None;
    }
    let prefix = parts.next()?;
    let secret = parts.next()?;
    if secret.len() < MIN_SECRET_LEN || prefix.is_empty() {
        return None;
    }
    Some(ParsedToken {
        prefix: prefix.to_string(),
        secret: secret.to_string(),
    })
}
