//! The nine routes every managed resource exposes, each guarded by one permission.

use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    response::Response,
    routing::get,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::application::auth::AuthPrincipal;
use crate::application::error::AppError;
use crate::application::lifecycle::ResourceService;
use crate::application::resource::Resource;
use crate::application::resources::{
    Agendas, Announcements, Categories, Facilities, Galleries, News, Roles, Tags, Users,
};
use crate::domain::permissions::{Action, Permission};

use super::envelope;
use super::form::ResourceForm;
use super::state::AppState;

/// Access to the lifecycle service of one resource type.
pub trait Managed<R: Resource> {
    fn service(&self) -> &ResourceService<R>;

    /// Called after a successful create.
    fn created(&self, _record: &R::Record) {}
}

macro_rules! managed {
    ($resource:ty, $field:ident) => {
        impl Managed<$resource> for AppState {
            fn service(&self) -> &ResourceService<$resource> {
                &self.$field
            }
        }
    };
}

managed!(Categories, categories);
managed!(Tags, tags);
managed!(Agendas, agendas);
managed!(Announcements, announcements);
managed!(Galleries, galleries);
managed!(Facilities, facilities);
managed!(Roles, roles);
managed!(News, news);

impl Managed<Users> for AppState {
    fn service(&self) -> &ResourceService<Users> {
        &self.users
    }

    fn created(&self, record: &<Users as Resource>::Record) {
        self.auth.announce_registration(record.clone());
    }
}

pub fn routes<R>() -> Router<AppState>
where
    R: Resource,
    AppState: Managed<R>,
{
    let base = format!("/{}", R::KIND.plural());
    Router::new()
        .route(&base, get(list::<R>).post(create::<R>))
        .route(&format!("{base}/search"), get(search::<R>))
        .route(&format!("{base}/trashed"), get(trashed::<R>))
        .route(
            &format!("{base}/trashed/{{id}}"),
            axum::routing::put(restore::<R>).delete(force_delete::<R>),
        )
        .route(
            &format!("{base}/{{id}}"),
            get(show::<R>).put(update::<R>).delete(destroy::<R>),
        )
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    q: Option<String>,
}

fn require<R: Resource>(principal: &AuthPrincipal, action: Action) -> Result<(), AppError> {
    principal.requires(&Permission::of(R::KIND, action))
}

/// A malformed identifier cannot name a row.
fn parse_id<R: Resource>(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::not_found(R::KIND.display_name()))
}

async fn list<R>(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthPrincipal>,
) -> Result<Response, AppError>
where
    R: Resource,
    AppState: Managed<R>,
{
    require::<R>(&principal, Action::Read)?;
    let listing = Managed::<R>::service(&state).list().await?;
    Ok(envelope::listing(R::KIND, listing, false))
}

async fn search<R>(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthPrincipal>,
    Query(query): Query<SearchQuery>,
) -> Result<Response, AppError>
where
    R: Resource,
    AppState: Managed<R>,
{
    require::<R>(&principal, Action::Read)?;
    let searched = query.q.as_deref().is_some_and(|q| !q.trim().is_empty());
    let listing = Managed::<R>::service(&state)
        .search(query.q.as_deref())
        .await?;
    Ok(envelope::listing(R::KIND, listing, searched))
}

async fn trashed<R>(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthPrincipal>,
) -> Result<Response, AppError>
where
    R: Resource,
    AppState: Managed<R>,
{
    require::<R>(&principal, Action::Trashed)?;
    let listing = Managed::<R>::service(&state).list_trashed().await?;
    Ok(envelope::listing(R::KIND, listing, false))
}

async fn show<R>(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthPrincipal>,
    Path(id): Path<String>,
) -> Result<Response, AppError>
where
    R: Resource,
    AppState: Managed<R>,
{
    require::<R>(&principal, Action::Read)?;
    let record = Managed::<R>::service(&state).get(parse_id::<R>(&id)?).await?;
    Ok(envelope::ok(
        format!("{} fetched successfully", R::KIND.display_name()),
        record,
    ))
}

async fn create<R>(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthPrincipal>,
    form: ResourceForm,
) -> Result<Response, AppError>
where
    R: Resource,
    AppState: Managed<R>,
{
    require::<R>(&principal, Action::Create)?;
    let payload: R::Payload = form.parse()?;
    let record = Managed::<R>::service(&state)
        .create(&principal.actor(), payload, form.image)
        .await?;
    Managed::<R>::created(&state, &record);
    Ok(envelope::created(
        format!("{} created successfully", R::KIND.display_name()),
        record,
    ))
}

async fn update<R>(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthPrincipal>,
    Path(id): Path<String>,
    form: ResourceForm,
) -> Result<Response, AppError>
where
    R: Resource,
    AppState: Managed<R>,
{
    require::<R>(&principal, Action::Update)?;
    let id = parse_id::<R>(&id)?;
    let payload: R::Payload = form.parse()?;
    let record = Managed::<R>::service(&state)
        .update(&principal.actor(), id, payload, form.image)
        .await?;
    Ok(envelope::ok(
        format!("{} updated successfully", R::KIND.display_name()),
        record,
    ))
}

async fn destroy<R>(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthPrincipal>,
    Path(id): Path<String>,
) -> Result<Response, AppError>
where
    R: Resource,
    AppState: Managed<R>,
{
    require::<R>(&principal, Action::Delete)?;
    let record = Managed::<R>::service(&state)
        .delete(&principal.actor(), parse_id::<R>(&id)?)
        .await?;
    Ok(envelope::ok(
        format!("{} deleted successfully", R::KIND.display_name()),
        record,
    ))
}

async fn restore<R>(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthPrincipal>,
    Path(id): Path<String>,
) -> Result<Response, AppError>
where
    R: Resource,
    AppState: Managed<R>,
{
    require::<R>(&principal, Action::Restore)?;
    let record = Managed::<R>::service(&state)
        .restore(&principal.actor(), parse_id::<R>(&id)?)
        .await?;
    Ok(envelope::ok(
        format!("{} restored successfully", R::KIND.display_name()),
        record,
    ))
}

async fn force_delete<R>(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthPrincipal>,
    Path(id): Path<String>,
) -> Result<Response, AppError>
where
    R: Resource,
    AppState: Managed<R>,
{
    require::<R>(&principal, Action::ForceDelete)?;
    let record = Managed::<R>::service(&state)
        .force_delete(&principal.actor(), parse_id::<R>(&id)?)
        .await?;
    Ok(envelope::ok(
        format!("{} deleted permanently", R::KIND.display_name()),
        record,
    ))
}
