//! Draft workflow and the unauthenticated news feeds.

use axum::{
    Extension, Router,
    extract::{Path, State},
    response::Response,
    routing::{get, put},
};
use uuid::Uuid;

use crate::application::auth::AuthPrincipal;
use crate::application::error::AppError;
use crate::application::resources::NewsPayload;
use crate::domain::permissions::{Action, Permission};
use crate::domain::types::ResourceKind;

use super::envelope;
use super::form::ResourceForm;
use super::state::AppState;

pub fn draft_routes() -> Router<AppState> {
    Router::new()
        .route("/news/draft", get(list_drafts).post(create_draft))
        .route("/news/draft/{id}", put(publish))
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/news/author/{slug}", get(by_author))
        .route("/news/category/{slug}", get(by_category))
        .route("/news/tag/{slug}", get(by_tag))
        .route("/news/slug/{slug}", get(by_slug))
}

fn require(principal: &AuthPrincipal, action: Action) -> Result<(), AppError> {
    principal.requires(&Permission::of(ResourceKind::News, action))
}

fn feed_message(empty: bool) -> &'static str {
    if empty {
        "No news found"
    } else {
        "News fetched successfully"
    }
}

async fn create_draft(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthPrincipal>,
    form: ResourceForm,
) -> Result<Response, AppError> {
    require(&principal, Action::Create)?;
    let payload: NewsPayload = form.parse()?;
    let record = state
        .news_desk
        .draft(&principal.actor(), payload, form.image)
        .await?;
    Ok(envelope::created("News created successfully", record))
}

async fn list_drafts(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthPrincipal>,
) -> Result<Response, AppError> {
    require(&principal, Action::Read)?;
    let drafts = state.news_desk.drafts().await?;
    Ok(envelope::ok(feed_message(drafts.is_empty()), drafts))
}

async fn publish(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthPrincipal>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    require(&principal, Action::Update)?;
    let id = Uuid::parse_str(&id).map_err(|_| AppError::not_found("News"))?;
    let record = state.news_desk.publish(&principal.actor(), id).await?;
    Ok(envelope::ok("News published successfully", record))
}

async fn by_author(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let entries = state.news_desk.by_author(&slug).await?;
    Ok(envelope::ok(feed_message(entries.is_empty()), entries))
}

async fn by_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let entries = state.news_desk.by_category(&slug).await?;
    Ok(envelope::ok(feed_message(entries.is_empty()), entries))
}

async fn by_tag(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let entries = state.news_desk.by_tag(&slug).await?;
    Ok(envelope::ok(feed_message(entries.is_empty()), entries))
}

async fn by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let entry = state.news_desk.by_slug(&slug).await?;
    Ok(envelope::ok("News fetched successfully", entry))
}
