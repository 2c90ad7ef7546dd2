//! Hosted table store against an in-process mock of a PostgREST table API.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use commentboard::model::NewComment;
use commentboard::storage::{CommentStore, RestTableConfig, RestTableStore};

#[derive(Clone, Default)]
struct MockTable {
    rows: Arc<Mutex<Vec<Value>>>,
    fail_inserts: bool,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("apikey").and_then(|v| v.to_str().ok()) == Some("test-key")
        && headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer test-key")
}

async fn select(State(t): State<MockTable>, headers: HeaderMap, Query(q): Query<HashMap<String, String>>) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Invalid API key"})));
    }
    assert_eq!(q.get("order").map(String::as_str), Some("created_at.asc"));
    // Stored in insert order, which is also created_at order here.
    (StatusCode::OK, Json(Value::Array(t.rows.lock().clone())))
}

async fn insert(State(t): State<MockTable>, headers: HeaderMap, Json(body): Json<Vec<Value>>) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Invalid API key"})));
    }
    if t.fail_inserts {
        return (StatusCode::BAD_REQUEST, Json(json!({"code": "42P01", "message": "relation \"public.comments\" does not exist"})));
    }
    assert_eq!(headers.get("prefer").and_then(|v| v.to_str().ok()), Some("return=representation"));
    let mut rows = t.rows.lock();
    let mut created = Vec::new();
    for item in body {
        let id = rows.len() as i64 + 1;
        let row = json!({
            "id": id,
            "text": item["text"],
            "author": item["author"],
            "created_at": format!("2024-05-01T10:00:{:02}.123456+00:00", id),
        });
        rows.push(row.clone());
        created.push(row);
    }
    (StatusCode::CREATED, Json(Value::Array(created)))
}

async fn spawn_mock(table: MockTable) -> Result<String> {
    let app = Router::new().route("/rest/v1/comments", get(select).post(insert)).with_state(table);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{}", addr))
}

fn store_for(url: String, key: &str) -> Result<RestTableStore> {
    RestTableStore::new(RestTableConfig { url, api_key: key.into(), table: "comments".into() })
}

#[tokio::test]
async fn insert_and_list_round_trip_through_the_table_api() -> Result<()> {
    let base = spawn_mock(MockTable::default()).await?;
    let store = store_for(base, "test-key")?;

    let first = store.insert(NewComment { text: "hello".into(), author: "a@x.com".into() }).await?;
    assert_eq!(first.id.as_str(), "1");
    assert_eq!(first.text, "hello");
    let second = store.insert(NewComment { text: "again".into(), author: "b@x.com".into() }).await?;

    let all = store.list_ordered().await?;
    assert_eq!(all, vec![first, second]);
    Ok(())
}

#[tokio::test]
async fn service_errors_carry_the_service_message() -> Result<()> {
    let base = spawn_mock(MockTable { fail_inserts: true, ..Default::default() }).await?;
    let store = store_for(base.clone(), "test-key")?;
    let err = store.insert(NewComment { text: "x".into(), author: "a@x.com".into() }).await.unwrap_err();
    assert_eq!(err.message(), "relation \"public.comments\" does not exist");

    let wrong_key = store_for(base, "nope")?;
    let err = wrong_key.list_ordered().await.unwrap_err();
    assert_eq!(err.message(), "Invalid API key");
    Ok(())
}
