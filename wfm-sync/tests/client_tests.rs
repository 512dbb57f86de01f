//! REST client tests against an in-process axum server

use axum::extract::{Multipart, Path};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use wfm_sync::client::{CircularRequest, UploadRequest};
use wfm_sync::{ApiClient, CacheKey, SyncError};

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v == "Bearer tok")
}

async fn dashboard(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "employees": [{"id": 1, "fullName": "Juan Pérez", "role": "employee"}],
        "unreadCounts": {"messages": 2, "documents": 1}
    }))
    .into_response()
}

async fn collect_form(mut multipart: Multipart) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.unwrap();
        let value = match file_name {
            Some(file) => format!("{}:{}", file, bytes.len()),
            None => String::from_utf8_lossy(&bytes).to_string(),
        };
        fields.push((name, value));
    }
    fields
}

async fn circular(multipart: Multipart) -> Json<Value> {
    let fields = collect_form(multipart).await;
    let recipients: Vec<i64> = fields
        .iter()
        .find(|(name, _)| name == "recipientIds")
        .map(|(_, v)| serde_json::from_str(v).unwrap())
        .unwrap_or_default();
    let ids: Vec<i64> = (0..recipients.len() as i64).map(|i| 100 + i).collect();
    Json(json!({"batchId": "batch-1", "documentIds": ids}))
}

async fn upload(multipart: Multipart) -> Json<Value> {
    let fields = collect_form(multipart).await;
    let get = |key: &str| {
        fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };
    Json(json!({
        "id": 9,
        "fileName": get("cleanFileName"),
        "file": get("file"),
        "employeeId": get("employeeId"),
    }))
}

async fn view_url(Path(id): Path<String>) -> Json<Value> {
    Json(json!({"url": format!("/api/documents/{}/view?expires=1&signature=abc", id)}))
}

async fn spawn() -> String {
    let app = Router::new()
        .route("/api/admin/dashboard/summary", get(dashboard))
        .route(
            "/api/work-sessions/active",
            get(|| async { Json(Value::Null) }),
        )
        .route(
            "/api/messages/unread-count",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable") }),
        )
        .route("/api/documents/circular", post(circular))
        .route("/api/documents/upload", post(upload))
        .route("/api/documents/:id/view-url", post(view_url));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_typed_dashboard_summary_with_bearer_token() {
    let url = spawn().await;
    let summary = ApiClient::new(&url, "tok")
        .unwrap()
        .dashboard_summary()
        .await
        .unwrap();
    assert_eq!(summary.employees[0].full_name, "Juan Pérez");
    assert_eq!(summary.unread_counts.messages, 2);

    let err = ApiClient::new(&url, "wrong")
        .unwrap()
        .dashboard_summary()
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Server { status: 401, .. }));
}

#[tokio::test]
async fn test_null_active_session_is_none() {
    let url = spawn().await;
    let client = ApiClient::new(&url, "tok").unwrap();
    assert_eq!(client.active_session().await.unwrap(), None);
    assert_eq!(
        client.fetch_entry(CacheKey::ActiveSession).await.unwrap(),
        Value::Null
    );
}

#[tokio::test]
async fn test_server_error_keeps_plain_text_message() {
    let url = spawn().await;
    let err = ApiClient::new(&url, "tok")
        .unwrap()
        .unread_counts()
        .await
        .unwrap_err();
    match err {
        SyncError::Server { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "database unavailable");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_circular_upload_returns_one_document_per_recipient() {
    let url = spawn().await;
    let receipt = ApiClient::new(&url, "tok")
        .unwrap()
        .send_circular(CircularRequest {
            file_name: "Circular vacaciones.pdf".into(),
            bytes: b"%PDF-1.4".to_vec(),
            recipient_ids: vec![1, 2, 3],
            requires_signature: true,
        })
        .await
        .unwrap();
    assert_eq!(receipt.batch_id, "batch-1");
    assert_eq!(receipt.document_ids, vec!["100", "101", "102"]);
}

#[tokio::test]
async fn test_individual_upload_sends_canonical_name() {
    let url = spawn().await;
    let uploaded = ApiClient::new(&url, "tok")
        .unwrap()
        .upload_document(UploadRequest {
            file_name: "Nomina_Marzo_2025_Juan_Perez.pdf".into(),
            bytes: vec![0u8; 16],
            employee_id: 1,
            clean_file_name: "Nómina Marzo 2025 - Juan Pérez.pdf".into(),
            requires_signature: false,
        })
        .await
        .unwrap();
    assert_eq!(uploaded.id, "9");
    assert_eq!(
        uploaded.file_name.as_deref(),
        Some("Nómina Marzo 2025 - Juan Pérez.pdf")
    );
}

#[tokio::test]
async fn test_view_url() {
    let url = spawn().await;
    let view = ApiClient::new(&url, "tok")
        .unwrap()
        .document_view_url("abc-123")
        .await
        .unwrap();
    assert!(view.starts_with("/api/documents/abc-123/view?"));
    assert!(view.contains("signature="));
}
