//! The JSON API end to end over in-memory storage: authentication,
//! permission checks, envelopes and status codes.

mod support;

use std::time::Duration;

use schoolboard::domain::permissions::{Action, Permission};
use schoolboard::domain::types::ResourceKind;
use serde_json::json;

use support::{TestApp, bare_request, json_request};

const PASSWORD: &str = "rahasia123";

fn category_permissions(actions: &[Action]) -> Vec<Permission> {
    actions
        .iter()
        .map(|action| Permission::of(ResourceKind::Category, *action))
        .collect()
}

fn all_category_permissions() -> Vec<Permission> {
    Action::CRUD
        .iter()
        .chain(Action::LIFECYCLE.iter())
        .map(|action| Permission::of(ResourceKind::Category, *action))
        .collect()
}

async fn admin(app: &TestApp) -> String {
    app.auth
        .add_user("admin@school.test", PASSWORD, all_category_permissions())
        .await;
    app.login("admin@school.test", PASSWORD).await
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = TestApp::new();

    let (status, body) = app.send(bare_request("GET", "/categories", None)).await;
    assert_eq!(status, 401);
    assert_eq!(body["code"], 401);
    assert_eq!(body["message"], "Unauthenticated");
    assert!(body["data"].is_null());

    let (status, _) = app
        .send(bare_request("GET", "/categories", Some("pat_bogus_token")))
        .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn login_rejects_wrong_credentials() {
    let app = TestApp::new();
    app.auth
        .add_user("teacher@school.test", PASSWORD, Vec::new())
        .await;

    let (status, body) = app
        .send(json_request(
            "POST",
            "/auth/login",
            None,
            json!({ "email": "teacher@school.test", "password": "not-the-password" }),
        ))
        .await;
    assert_eq!(status, 422);
    assert_eq!(body["message"], "Invalid credentials");

    let (status, body) = app
        .send(json_request("POST", "/auth/login", None, json!({})))
        .await;
    assert_eq!(status, 422);
    assert_eq!(body["errors"]["email"][0], "The email field is required.");
    assert_eq!(body["errors"]["password"][0], "The password field is required.");
}

#[tokio::test]
async fn login_reports_resolved_permissions() {
    let app = TestApp::new();
    app.auth
        .add_user(
            "editor@school.test",
            PASSWORD,
            category_permissions(&[Action::Read]),
        )
        .await;

    let (status, body) = app
        .send(json_request(
            "POST",
            "/auth/login",
            None,
            json!({ "email": "EDITOR@school.test", "password": PASSWORD, "remember_me": "1" }),
        ))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Login successful");
    assert_eq!(body["data"]["token_type"], "Bearer");
    assert_eq!(body["data"]["user"]["email"], "editor@school.test");
    assert_eq!(body["data"]["permissions"], json!(["category.read"]));
}

#[tokio::test]
async fn missing_permissions_are_forbidden() {
    let app = TestApp::new();
    app.auth
        .add_user(
            "reader@school.test",
            PASSWORD,
            category_permissions(&[Action::Read]),
        )
        .await;
    let token = app.login("reader@school.test", PASSWORD).await;

    let (status, body) = app
        .send(bare_request("GET", "/categories", Some(&token)))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "No categories found");
    assert_eq!(body["data"], json!([]));

    let (status, body) = app
        .send(json_request(
            "POST",
            "/categories",
            Some(&token),
            json!({ "category": "Sports" }),
        ))
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["message"], "This action is unauthorized");

    let (status, _) = app
        .send(bare_request("GET", "/categories/trashed", Some(&token)))
        .await;
    assert_eq!(status, 403);

    let (status, _) = app.send(bare_request("GET", "/tags", Some(&token))).await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn category_lifecycle_over_http() {
    let app = TestApp::new();
    let token = admin(&app).await;

    let (status, body) = app
        .send(json_request(
            "POST",
            "/categories",
            Some(&token),
            json!({ "category": "Sports" }),
        ))
        .await;
    assert_eq!(status, 201, "{body}");
    assert_eq!(body["code"], 201);
    assert_eq!(body["message"], "Category created successfully");
    assert_eq!(body["data"]["slug"], "sports");
    let id = body["data"]["id"].as_str().expect("id").to_string();

    let (_, body) = app
        .send(bare_request("GET", "/categories", Some(&token)))
        .await;
    assert_eq!(body["message"], "Categories fetched successfully");
    assert_eq!(body["data"][0]["category"], "Sports");

    let (_, body) = app
        .send(bare_request("GET", "/categories", Some(&token)))
        .await;
    assert_eq!(body["message"], "Categories fetched successfully from cache");

    let (status, body) = app
        .send(bare_request("GET", &format!("/categories/{id}"), Some(&token)))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Category fetched successfully");

    let (status, body) = app
        .send(json_request(
            "PUT",
            &format!("/categories/{id}"),
            Some(&token),
            json!({ "category": "Athletics" }),
        ))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Category updated successfully");
    assert_eq!(body["data"]["slug"], "athletics");

    let (status, body) = app
        .send(bare_request("DELETE", &format!("/categories/{id}"), Some(&token)))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Category deleted successfully");

    let (status, body) = app
        .send(bare_request("GET", &format!("/categories/{id}"), Some(&token)))
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["message"], "Category not found");

    let (_, body) = app
        .send(bare_request("GET", "/categories/trashed", Some(&token)))
        .await;
    assert_eq!(body["data"][0]["id"], id.as_str());

    let (status, body) = app
        .send(bare_request(
            "PUT",
            &format!("/categories/trashed/{id}"),
            Some(&token),
        ))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Category restored successfully");

    app.send(bare_request("DELETE", &format!("/categories/{id}"), Some(&token)))
        .await;
    let (status, body) = app
        .send(bare_request(
            "DELETE",
            &format!("/categories/trashed/{id}"),
            Some(&token),
        ))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Category deleted permanently");

    let (_, body) = app
        .send(bare_request("GET", "/categories/trashed", Some(&token)))
        .await;
    assert_eq!(body["message"], "No categories found");
}

#[tokio::test]
async fn invalid_payloads_answer_with_field_errors() {
    let app = TestApp::new();
    let token = admin(&app).await;

    let (status, body) = app
        .send(json_request("POST", "/categories", Some(&token), json!({})))
        .await;
    assert_eq!(status, 422);
    assert_eq!(body["message"], "Validation failed");
    assert_eq!(
        body["errors"]["category"][0],
        "The category field is required."
    );

    let (status, body) = app
        .send(json_request(
            "POST",
            "/categories",
            Some(&token),
            json!(["not", "an", "object"]),
        ))
        .await;
    assert_eq!(status, 422);
    assert!(body["errors"]["request"].is_array());
}

#[tokio::test]
async fn malformed_and_unknown_ids_are_not_found() {
    let app = TestApp::new();
    let token = admin(&app).await;

    let (status, body) = app
        .send(bare_request("GET", "/categories/not-a-uuid", Some(&token)))
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["message"], "Category not found");

    let (status, _) = app
        .send(bare_request(
            "PUT",
            &format!("/categories/trashed/{}", uuid::Uuid::new_v4()),
            Some(&token),
        ))
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn search_reports_empty_matches() {
    let app = TestApp::new();
    let token = admin(&app).await;

    app.send(json_request(
        "POST",
        "/categories",
        Some(&token),
        json!({ "category": "Sports" }),
    ))
    .await;

    let (status, body) = app
        .send(bare_request("GET", "/categories/search?q=spo", Some(&token)))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"][0]["slug"], "sports");

    let (_, body) = app
        .send(bare_request("GET", "/categories/search?q=chess", Some(&token)))
        .await;
    assert_eq!(body["message"], "No categories found matching your query");
}

#[tokio::test]
async fn logout_revokes_the_token() {
    let app = TestApp::new();
    let token = admin(&app).await;

    let (status, body) = app
        .send(bare_request("POST", "/auth/logout", Some(&token)))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Logout successful");

    let (status, _) = app
        .send(bare_request("GET", "/categories", Some(&token)))
        .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn password_reset_replaces_the_password_and_revokes_tokens() {
    let app = TestApp::new();
    let token = admin(&app).await;

    let (status, body) = app
        .send(json_request(
            "POST",
            "/auth/forgot-password",
            None,
            json!({ "email": "admin@school.test" }),
        ))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Password reset link sent to your email");

    let mut reset_token = None;
    for _ in 0..100 {
        if let Some((_, token)) = app.notifier.reset_tokens.lock().await.first() {
            reset_token = Some(token.clone());
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let reset_token = reset_token.expect("reset token delivered");

    let (status, body) = app
        .send(json_request(
            "POST",
            "/auth/reset-password",
            None,
            json!({
                "token": "wrong-token",
                "email": "admin@school.test",
                "password": "brand-new-pass",
                "password_confirmation": "brand-new-pass",
            }),
        ))
        .await;
    assert_eq!(status, 422);
    assert_eq!(body["message"], "Invalid or expired password reset token");

    let (status, body) = app
        .send(json_request(
            "POST",
            "/auth/reset-password",
            None,
            json!({
                "token": reset_token,
                "email": "admin@school.test",
                "password": "brand-new-pass",
                "password_confirmation": "brand-new-pass",
            }),
        ))
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["message"], "Password has been reset successfully");
    assert_eq!(app.auth.reset_completions(), 1);

    let (status, _) = app
        .send(bare_request("GET", "/categories", Some(&token)))
        .await;
    assert_eq!(status, 401);

    app.login("admin@school.test", "brand-new-pass").await;
}

#[tokio::test]
async fn public_news_feeds_need_no_token() {
    let app = TestApp::new();

    let (status, body) = app
        .send(bare_request("GET", "/news/author/nobody", None))
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["message"], "Author not found");

    let (status, body) = app
        .send(bare_request("GET", "/news/slug/missing-article", None))
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["message"], "News not found");
}

#[tokio::test]
async fn missing_uploads_are_not_found() {
    let app = TestApp::new();

    let (status, body) = app
        .send(bare_request("GET", "/uploads/categories/2026/01/nothing.png", None))
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["message"], "File not found");
}

#[tokio::test]
async fn token_store_outages_are_server_errors() {
    let app = TestApp::new();
    let token = admin(&app).await;
    app.auth.fail_token_lookups();

    let (status, body) = app
        .send(bare_request("GET", "/categories", Some(&token)))
        .await;
    assert_eq!(status, 500);
    assert_eq!(body["message"], "An error occurred while processing the request");
    let request_id = body["request_id"].as_str().expect("request id");
    assert!(request_id.starts_with("REQ-"));
    assert!(!body.to_string().contains("pool timed out"));
}

#[tokio::test]
async fn storage_faults_answer_with_a_request_id_only() {
    let app = TestApp::new();
    app.auth
        .add_user(
            "curator@school.test",
            PASSWORD,
            vec![Permission::of(ResourceKind::Gallery, Action::Read)],
        )
        .await;
    let token = app.login("curator@school.test", PASSWORD).await;
    app.harness.galleries.fail_reads();

    let (status, body) = app
        .send(bare_request("GET", "/galleries", Some(&token)))
        .await;
    assert_eq!(status, 500);
    assert_eq!(body["code"], 500);
    assert!(body["data"].is_null());
    assert!(
        body["request_id"]
            .as_str()
            .is_some_and(|id| id.starts_with("REQ-"))
    );
    assert!(!body.to_string().contains("10.0.0.5"));
    assert!(body.get("errors").is_none());
}

#[tokio::test]
async fn unverified_users_only_reach_account_routes() {
    let app = TestApp::new();
    app.auth
        .add_unverified_user("new@school.test", PASSWORD, all_category_permissions())
        .await;
    let token = app.login("new@school.test", PASSWORD).await;

    let (status, body) = app
        .send(bare_request("GET", "/categories", Some(&token)))
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["message"], "Your email address is not verified.");

    let (status, _) = app
        .send(json_request(
            "POST",
            "/auth/change-password",
            Some(&token),
            json!({
                "current_password": PASSWORD,
                "new_password": "another-pass",
                "new_password_confirmation": "another-pass",
            }),
        ))
        .await;
    assert_eq!(status, 200);
}

async fn delivered_link(app: &TestApp, email: &str) -> String {
    for _ in 0..100 {
        if let Some((_, link)) = app
            .notifier
            .verify_links
            .lock()
            .await
            .iter()
            .rev()
            .find(|(to, _)| to == email)
        {
            return link.clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no verification link delivered to {email}");
}

#[tokio::test]
async fn resent_verification_links_verify_the_email() {
    let app = TestApp::new();
    let user_id = app
        .auth
        .add_unverified_user("new@school.test", PASSWORD, all_category_permissions())
        .await;
    let token = app.login("new@school.test", PASSWORD).await;

    let (status, body) = app
        .send(bare_request(
            "POST",
            "/auth/email/verification-notification",
            Some(&token),
        ))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Verification email sent successfully");
    assert_eq!(app.auth.verification_count(user_id).await, 1);
    let link = delivered_link(&app, "new@school.test").await;
    assert!(link.starts_with(&format!("/auth/email/verify/{user_id}/")));

    let forged = format!("/auth/email/verify/{user_id}/not-the-token");
    let (status, _) = app.send(bare_request("GET", &forged, Some(&token))).await;
    assert_eq!(status, 403);
    assert!(!app.auth.is_verified(user_id).await);

    let (status, body) = app.send(bare_request("GET", &link, Some(&token))).await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["message"], "Email verified successfully");
    assert!(app.auth.is_verified(user_id).await);
    assert_eq!(app.auth.verification_count(user_id).await, 0);

    let (status, body) = app.send(bare_request("GET", &link, Some(&token))).await;
    assert_eq!(status, 422);
    assert_eq!(body["message"], "Email already verified");

    let (status, _) = app
        .send(bare_request("GET", "/categories", Some(&token)))
        .await;
    assert_eq!(status, 200);
    assert!(
        app.harness
            .audit
            .actions()
            .await
            .contains(&"auth.verify_email".to_string())
    );
}

#[tokio::test]
async fn verification_links_only_work_for_their_owner() {
    let app = TestApp::new();
    let owner = app
        .auth
        .add_unverified_user("owner@school.test", PASSWORD, Vec::new())
        .await;
    app.auth
        .add_unverified_user("other@school.test", PASSWORD, Vec::new())
        .await;
    let owner_token = app.login("owner@school.test", PASSWORD).await;
    let other_token = app.login("other@school.test", PASSWORD).await;

    app.send(bare_request(
        "POST",
        "/auth/email/verification-notification",
        Some(&owner_token),
    ))
    .await;
    let link = delivered_link(&app, "owner@school.test").await;

    let (status, _) = app.send(bare_request("GET", &link, Some(&other_token))).await;
    assert_eq!(status, 403);
    let (status, _) = app.send(bare_request("GET", &link, None)).await;
    assert_eq!(status, 401);
    assert!(!app.auth.is_verified(owner).await);
}

#[tokio::test]
async fn verified_users_cannot_request_another_link() {
    let app = TestApp::new();
    let token = admin(&app).await;

    let (status, body) = app
        .send(bare_request(
            "POST",
            "/auth/email/verification-notification",
            Some(&token),
        ))
        .await;
    assert_eq!(status, 422);
    assert_eq!(body["message"], "Email already verified");
}
