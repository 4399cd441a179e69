use axum::{
    Extension, Router,
    extract::{Path, State},
    response::Response,
    routing::{get, post},
};
use uuid::Uuid;

use crate::application::auth::{
    AuthPrincipal, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest,
    ResetPasswordRequest,
};
use crate::application::error::AppError;

use super::envelope;
use super::form::ResourceForm;
use super::state::AppState;

/// Routes reachable without a token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
}

/// Routes that need a token but not a verified email.
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/change-password", post(change_password))
        .route("/auth/email/verify/{id}/{token}", get(verify_email))
        .route(
            "/auth/email/verification-notification",
            post(resend_verification),
        )
}

async fn login(State(state): State<AppState>, form: ResourceForm) -> Result<Response, AppError> {
    let request: LoginRequest = form.parse()?;
    let outcome = state.auth.login(request).await?;
    Ok(envelope::ok("Login successful", outcome))
}

async fn logout(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthPrincipal>,
) -> Result<Response, AppError> {
    state.auth.logout(&principal).await?;
    Ok(envelope::message("Logout successful"))
}

async fn change_password(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthPrincipal>,
    form: ResourceForm,
) -> Result<Response, AppError> {
    let request: ChangePasswordRequest = form.parse()?;
    state.auth.change_password(&principal, request).await?;
    Ok(envelope::message("Password changed successfully"))
}

async fn forgot_password(
    State(state): State<AppState>,
    form: ResourceForm,
) -> Result<Response, AppError> {
    let request: ForgotPasswordRequest = form.parse()?;
    state.auth.forgot_password(request).await?;
    Ok(envelope::message("Password reset link sent to your email"))
}

async fn reset_password(
    State(state): State<AppState>,
    form: ResourceForm,
) -> Result<Response, AppError> {
    let request: ResetPasswordRequest = form.parse()?;
    state.auth.reset_password(request).await?;
    Ok(envelope::message("Password has been reset successfully"))
}

async fn verify_email(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthPrincipal>,
    Path((id, token)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| AppError::Forbidden("verification.link".to_string()))?;
    state.auth.verify_email(&principal, id, &token).await?;
    Ok(envelope::message("Email verified successfully"))
}

async fn resend_verification(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthPrincipal>,
) -> Result<Response, AppError> {
    state.auth.resend_verification(&principal).await?;
    Ok(envelope::message("Verification email sent successfully"))
}
