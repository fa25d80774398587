use actix_web::{test, web, App};
use chatstore::api::error::json_error_handler;
use chatstore::api::middleware::auth::ApiKeyStore;
use chatstore::api::middleware::ApiKeyAuth;
use chatstore::api::routes;
use chatstore::config::DatabaseConfig;
use chatstore::db::{get_connection, DbPool};
use serde_json::{json, Value};

const ALICE_KEY: &str = "test-key-alice";
const BOB_KEY: &str = "test-key-bob";

fn test_pool() -> DbPool {
    get_connection(&DatabaseConfig {
        path: ":memory:".to_string(),
    })
    .unwrap()
}

fn test_key_store() -> ApiKeyStore {
    ApiKeyStore::from_entries(&[
        format!("alice:{}", ALICE_KEY),
        format!("bob:{}", BOB_KEY),
    ])
}

macro_rules! init_app {
    () => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(test_pool()))
                .app_data(web::Data::new(test_key_store()))
                .app_data(web::JsonConfig::default().error_handler(json_error_handler))
                .wrap(ApiKeyAuth)
                .configure(routes::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_missing_api_key_is_unauthorized() {
    let app = init_app!();

    let req = test::TestRequest::get()
        .uri("/v1/api/sessions/alice")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 401);

    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["status"], 401);
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(body["message"], "Missing API key");
}

#[actix_web::test]
async fn test_invalid_api_key_is_unauthorized() {
    let app = init_app!();

    let req = test::TestRequest::get()
        .uri("/v1/api/sessions/alice")
        .insert_header(("X-API-KEY", "wrong-key"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 401);

    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["message"], "Invalid API key");
}

#[actix_web::test]
async fn test_create_session_owned_by_authenticated_user() {
    let app = init_app!();

    let req = test::TestRequest::post()
        .uri("/v1/api/sessions")
        .insert_header(("X-API-KEY", ALICE_KEY))
        .set_json(json!({"name": "Quarterly Report"}))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 201);

    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["name"], "Quarterly Report");
    assert_eq!(body["user_id"], "alice");
    assert_eq!(body["favorite"], false);
    assert!(body["id"].as_str().is_some());
}

#[actix_web::test]
async fn test_create_session_name_defaults() {
    let app = init_app!();

    let req = test::TestRequest::post()
        .uri("/v1/api/sessions")
        .insert_header(("X-API-KEY", ALICE_KEY))
        .set_json(json!({}))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 201);

    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["name"], "New Chat");
}

#[actix_web::test]
async fn test_create_session_blank_name_is_bad_request() {
    let app = init_app!();

    let req = test::TestRequest::post()
        .uri("/v1/api/sessions")
        .insert_header(("X-API-KEY", ALICE_KEY))
        .set_json(json!({"name": "   "}))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 400);

    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["status"], 400);
    assert_eq!(body["error"], "Bad Request");
    assert_eq!(body["message"], "name: must not be blank");
}

#[actix_web::test]
async fn test_list_sessions_paginated() {
    let app = init_app!();

    for i in 0..3 {
        let req = test::TestRequest::post()
            .uri("/v1/api/sessions")
            .insert_header(("X-API-KEY", ALICE_KEY))
            .set_json(json!({"name": format!("Chat {}", i)}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 201);
    }

    let req = test::TestRequest::get()
        .uri("/v1/api/sessions/alice?page=0&size=2")
        .insert_header(("X-API-KEY", ALICE_KEY))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["content"].as_array().unwrap().len(), 2);
    assert_eq!(body["page"], 0);
    assert_eq!(body["size"], 2);
    assert_eq!(body["total_elements"], 3);
    assert_eq!(body["total_pages"], 2);

    let req = test::TestRequest::get()
        .uri("/v1/api/sessions/alice?page=1&size=2")
        .insert_header(("X-API-KEY", ALICE_KEY))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["content"].as_array().unwrap().len(), 1);

    // Another user's listing is empty
    let req = test::TestRequest::get()
        .uri("/v1/api/sessions/bob")
        .insert_header(("X-API-KEY", BOB_KEY))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["total_elements"], 0);
}

#[actix_web::test]
async fn test_list_sessions_zero_size_is_bad_request() {
    let app = init_app!();

    let req = test::TestRequest::get()
        .uri("/v1/api/sessions/alice?size=0")
        .insert_header(("X-API-KEY", ALICE_KEY))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 400);
}

#[actix_web::test]
async fn test_rename_and_favorite_session() {
    let app = init_app!();

    let req = test::TestRequest::post()
        .uri("/v1/api/sessions")
        .insert_header(("X-API-KEY", ALICE_KEY))
        .set_json(json!({"name": "Old Name"}))
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let id = created["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::put()
        .uri(&format!("/v1/api/sessions/{}/rename", id))
        .insert_header(("X-API-KEY", ALICE_KEY))
        .set_json(json!({"name": "New Name"}))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 200);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["name"], "New Name");

    let req = test::TestRequest::put()
        .uri(&format!("/v1/api/sessions/{}/favorite", id))
        .insert_header(("X-API-KEY", ALICE_KEY))
        .set_json(json!({"favorite": true}))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 200);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["favorite"], true);
}

#[actix_web::test]
async fn test_rename_missing_session_is_not_found() {
    let app = init_app!();

    let req = test::TestRequest::put()
        .uri("/v1/api/sessions/00000000-0000-0000-0000-000000000000/rename")
        .insert_header(("X-API-KEY", ALICE_KEY))
        .set_json(json!({"name": "whatever"}))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 404);

    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["status"], 404);
    assert_eq!(body["error"], "Not Found");
    assert_eq!(body["message"], "Session not found");
}

#[actix_web::test]
async fn test_delete_session() {
    let app = init_app!();

    let req = test::TestRequest::post()
        .uri("/v1/api/sessions")
        .insert_header(("X-API-KEY", ALICE_KEY))
        .set_json(json!({"name": "Short-lived"}))
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let id = created["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::delete()
        .uri(&format!("/v1/api/sessions/{}", id))
        .insert_header(("X-API-KEY", ALICE_KEY))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 204);

    // A second delete finds nothing
    let req = test::TestRequest::delete()
        .uri(&format!("/v1/api/sessions/{}", id))
        .insert_header(("X-API-KEY", ALICE_KEY))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 404);
}

#[actix_web::test]
async fn test_message_flow() {
    let app = init_app!();

    let req = test::TestRequest::post()
        .uri("/v1/api/sessions")
        .insert_header(("X-API-KEY", ALICE_KEY))
        .set_json(json!({"name": "RAG Chat"}))
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let id = created["id"].as_str().unwrap().to_string();

    // Store a user message with retrieval context
    let req = test::TestRequest::post()
        .uri(&format!("/v1/api/sessions/{}/messages", id))
        .insert_header(("X-API-KEY", ALICE_KEY))
        .set_json(json!({
            "sender": "USER",
            "message": "What does the handbook say about leave?",
            "context": {"documents": ["handbook.pdf"], "chunks": 3}
        }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 201);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["sender"], "USER");
    assert_eq!(body["context"]["chunks"], 3);

    let req = test::TestRequest::post()
        .uri(&format!("/v1/api/sessions/{}/messages", id))
        .insert_header(("X-API-KEY", ALICE_KEY))
        .set_json(json!({
            "sender": "ASSISTANT",
            "message": "Twenty-five days per year."
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    // Oldest first, paged
    let req = test::TestRequest::get()
        .uri(&format!("/v1/api/sessions/{}/messages", id))
        .insert_header(("X-API-KEY", ALICE_KEY))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let content = body["content"].as_array().unwrap();
    assert_eq!(content.len(), 2);
    assert_eq!(content[0]["sender"], "USER");
    assert_eq!(content[1]["sender"], "ASSISTANT");
    assert_eq!(content[1]["context"], Value::Null);
    assert_eq!(body["total_elements"], 2);
}

#[actix_web::test]
async fn test_message_validation_and_missing_session() {
    let app = init_app!();

    // Unknown session
    let req = test::TestRequest::post()
        .uri("/v1/api/sessions/00000000-0000-0000-0000-000000000000/messages")
        .insert_header(("X-API-KEY", ALICE_KEY))
        .set_json(json!({"sender": "USER", "message": "hello"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::get()
        .uri("/v1/api/sessions/00000000-0000-0000-0000-000000000000/messages")
        .insert_header(("X-API-KEY", ALICE_KEY))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    // Blank message body
    let req = test::TestRequest::post()
        .uri("/v1/api/sessions")
        .insert_header(("X-API-KEY", ALICE_KEY))
        .set_json(json!({"name": "Validation"}))
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let id = created["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/v1/api/sessions/{}/messages", id))
        .insert_header(("X-API-KEY", ALICE_KEY))
        .set_json(json!({"sender": "USER", "message": ""}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    // Unknown sender value is rejected by deserialization, as the envelope
    let req = test::TestRequest::post()
        .uri(&format!("/v1/api/sessions/{}/messages", id))
        .insert_header(("X-API-KEY", ALICE_KEY))
        .set_json(json!({"sender": "ROBOT", "message": "beep"}))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 400);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["status"], 400);
    assert_eq!(body["error"], "Bad Request");
}
