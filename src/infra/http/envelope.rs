//! The `{code, message, data}` body every endpoint answers with.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::lifecycle::Listing;
use crate::domain::types::ResourceKind;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub code: u16,
    pub message: String,
    pub data: T,
}

pub fn respond<T: Serialize>(status: StatusCode, message: impl Into<String>, data: T) -> Response {
    let body = Envelope {
        code: status.as_u16(),
        message: message.into(),
        data,
    };
    (status, Json(body)).into_response()
}

pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    respond(StatusCode::OK, message, data)
}

pub fn created<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    respond(StatusCode::CREATED, message, data)
}

pub fn message(message: impl Into<String>) -> Response {
    respond(StatusCode::OK, message, ())
}

/// Envelope for a listing; `searched` marks a filtered result.
pub fn listing<T: Serialize>(kind: ResourceKind, listing: Listing<T>, searched: bool) -> Response {
    let text = if listing.items.is_empty() {
        if searched {
            format!("No {} found matching your query", kind.plural())
        } else {
            format!("No {} found", kind.plural())
        }
    } else if listing.from_cache() {
        format!("{} fetched successfully from cache", kind.display_plural())
    } else {
        format!("{} fetched successfully", kind.display_plural())
    };
    ok(text, listing.items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::lifecycle::ListSource;
    use http_body_util::BodyExt;

    async fn json_of(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unit_data_serializes_as_null() {
        let body = json_of(message("Logout successful")).await;
        assert_eq!(body["code"], 200);
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn listing_messages_follow_source_and_emptiness() {
        let cached = Listing {
            items: vec![1, 2],
            source: ListSource::Cache,
        };
        let body = json_of(listing(ResourceKind::Category, cached, false)).await;
        assert_eq!(body["message"], "Categories fetched successfully from cache");

        let empty: Listing<u8> = Listing {
            items: Vec::new(),
            source: ListSource::Store,
        };
        let body = json_of(listing(ResourceKind::Agenda, empty, true)).await;
        assert_eq!(body["message"], "No agendas found matching your query");
        assert_eq!(body["data"], serde_json::json!([]));
    }
}
