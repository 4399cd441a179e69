//! The JSON API surface.

mod auth;
mod envelope;
mod form;
mod middleware;
mod news;
mod resources;
mod state;
mod uploads;

pub use envelope::Envelope;
pub use form::ResourceForm;
pub use middleware::RequestContext;
pub use resources::Managed;
pub use state::{AppOptions, AppState, Repositories};

use axum::{Router, extract::DefaultBodyLimit, middleware as axum_middleware, routing::get};

use crate::application::resources::{
    Agendas, Announcements, Categories, Facilities, Galleries, News, Roles, Tags, Users,
};

use self::middleware::{api_auth, log_responses, require_verified, set_request_context};

pub fn build_router(state: AppState) -> Router {
    let token_only = auth::protected_routes()
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), api_auth));

    let verified = Router::new()
        .merge(news::draft_routes())
        .merge(resources::routes::<Users>())
        .merge(resources::routes::<Categories>())
        .merge(resources::routes::<Tags>())
        .merge(resources::routes::<Galleries>())
        .merge(resources::routes::<Agendas>())
        .merge(resources::routes::<Announcements>())
        .merge(resources::routes::<Facilities>())
        .merge(resources::routes::<Roles>())
        .merge(resources::routes::<News>())
        .route_layer(axum_middleware::from_fn(require_verified))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), api_auth));

    let public = Router::new()
        .merge(auth::public_routes())
        .merge(news::public_routes())
        .route("/uploads/{*path}", get(uploads::serve_upload));

    let body_limit = state.max_request_bytes;
    verified
        .merge(token_only)
        .merge(public)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
