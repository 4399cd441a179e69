use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::auth::{AuthError, AuthPrincipal};
use crate::application::error::{AppError, ErrorReport};

use super::state::AppState;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Resolve the bearer token into an [`AuthPrincipal`] request extension.
///
/// A store failure while checking the token is a 500, not a 401.
pub async fn api_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let outcome = match extract_token(request.headers().get(AUTHORIZATION)) {
        Some(token) => state.auth.authenticate(&token).await,
        None => Err(AuthError::Missing),
    };

    match outcome {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(AuthError::Store(err)) => AppError::Repo(err).into_response(),
        Err(err) => {
            let mut response = AppError::Unauthorized.into_response();
            ErrorReport::from_error("infra::http::api_auth", StatusCode::UNAUTHORIZED, &err)
                .attach(&mut response);
            response
        }
    }
}

/// Runs after [`api_auth`]; rejects callers whose email is not verified yet.
pub async fn require_verified(request: Request<Body>, next: Next) -> Response {
    let verified = request
        .extensions()
        .get::<AuthPrincipal>()
        .is_some_and(AuthPrincipal::is_verified);
    if verified {
        next.run(request).await
    } else {
        AppError::Unverified.into_response()
    }
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages, correlation_id) = match report {
            Some(report) => (report.source, report.messages, report.correlation_id),
            None => ("unknown", Vec::new(), None),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target: "schoolboard::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                correlation_id = correlation_id.as_deref().unwrap_or(""),
                "request failed",
            );
        } else {
            warn!(
                target: "schoolboard::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "client request error",
            );
        }
    }

    response
}

fn extract_token(header: Option<&HeaderValue>) -> Option<String> {
    let raw = header?.to_str().ok()?;
    let bearer = raw
        .strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))?;
    let token = bearer.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_tokens_are_extracted() {
        let value = HeaderValue::from_static("Bearer pat_abc_def");
        assert_eq!(extract_token(Some(&value)).as_deref(), Some("pat_abc_def"));

        let basic = HeaderValue::from_static("Basic dXNlcg==");
        assert!(extract_token(Some(&basic)).is_none());
        assert!(extract_token(None).is_none());

        let blank = HeaderValue::from_static("Bearer   ");
        assert!(extract_token(Some(&blank)).is_none());
    }
}
