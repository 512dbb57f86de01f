//! REST client
//!
//! Thin reqwest wrapper over the server endpoints the synchronization core
//! needs: cache fetchers (GET), time-tracking mutations (POST) and the
//! document upload / circular / delete / view-url calls.

use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use wfm_common::api::{
    BreakPeriod, CompanySettings, DashboardSummary, UnreadCounts, WorkSession,
};

use crate::error::{Result, SyncError};
use crate::keys::CacheKey;

const USER_AGENT: &str = concat!("wfm-sync/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Endpoint that backs a cache entry
pub fn endpoint_for(key: CacheKey) -> &'static str {
    match key {
        CacheKey::AdminDashboard => "/api/admin/dashboard/summary",
        CacheKey::ActiveSession => "/api/work-sessions/active",
        CacheKey::ActiveBreak => "/api/breaks/active",
        CacheKey::RecentSessions => "/api/work-sessions/recent",
        CacheKey::CompanySettings => "/api/settings/company",
        CacheKey::Messages => "/api/messages",
        CacheKey::UnreadMessages => "/api/messages/unread-count",
        CacheKey::Documents => "/api/documents",
        CacheKey::DocumentNotifications => "/api/documents/notifications",
        CacheKey::VacationRequests => "/api/vacation-requests",
        CacheKey::ModificationRequests => "/api/modification-requests",
        CacheKey::WorkReports => "/api/work-reports",
        CacheKey::Reminders => "/api/reminders",
    }
}

/// Accepts both `"abc"` and `42` for server ids
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid id: {}", other))),
    }
}

fn id_strings<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    struct Id(#[serde(deserialize_with = "id_string")] String);
    let ids: Vec<Id> = Vec::deserialize(deserializer)?;
    Ok(ids.into_iter().map(|Id(id)| id).collect())
}

/// Individual upload for one employee
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub employee_id: i64,
    /// Canonical name proposed by the classifier
    pub clean_file_name: String,
    pub requires_signature: bool,
}

/// One file sent to many employees
#[derive(Debug, Clone)]
pub struct CircularRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub recipient_ids: Vec<i64>,
    pub requires_signature: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedDocument {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircularReceipt {
    #[serde(deserialize_with = "id_string")]
    pub batch_id: String,
    #[serde(deserialize_with = "id_strings")]
    pub document_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ViewUrlResponse {
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClockRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

/// Authenticated REST client
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "API request");
        self.http.request(method, url).bearer_auth(&self.token)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .or_else(|| v.get("error"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or(body);
        Err(SyncError::Server {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = Self::check(builder.send().await?).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(serde_json::from_value(Value::Null)?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// GET a path as untyped JSON
    pub async fn get_value(&self, path: &str) -> Result<Value> {
        self.send_json(self.request(Method::GET, path)).await
    }

    /// Data for a cache entry
    pub async fn fetch_entry(&self, key: CacheKey) -> Result<Value> {
        self.get_value(endpoint_for(key)).await
    }

    pub async fn dashboard_summary(&self) -> Result<DashboardSummary> {
        self.send_json(self.request(Method::GET, endpoint_for(CacheKey::AdminDashboard)))
            .await
    }

    pub async fn active_session(&self) -> Result<Option<WorkSession>> {
        self.send_json(self.request(Method::GET, endpoint_for(CacheKey::ActiveSession)))
            .await
    }

    pub async fn active_break(&self) -> Result<Option<BreakPeriod>> {
        self.send_json(self.request(Method::GET, endpoint_for(CacheKey::ActiveBreak)))
            .await
    }

    pub async fn company_settings(&self) -> Result<CompanySettings> {
        self.send_json(self.request(Method::GET, endpoint_for(CacheKey::CompanySettings)))
            .await
    }

    pub async fn unread_counts(&self) -> Result<UnreadCounts> {
        self.send_json(self.request(Method::GET, endpoint_for(CacheKey::UnreadMessages)))
            .await
    }

    pub async fn clock_in(&self) -> Result<WorkSession> {
        self.send_json(
            self.request(Method::POST, "/api/work-sessions/clock-in")
                .json(&ClockRequest { notes: None }),
        )
        .await
    }

    pub async fn clock_out(&self) -> Result<WorkSession> {
        self.send_json(
            self.request(Method::POST, "/api/work-sessions/clock-out")
                .json(&ClockRequest { notes: None }),
        )
        .await
    }

    pub async fn start_break(&self) -> Result<BreakPeriod> {
        self.send_json(self.request(Method::POST, "/api/breaks/start").json(&json!({})))
            .await
    }

    pub async fn end_break(&self) -> Result<BreakPeriod> {
        self.send_json(self.request(Method::POST, "/api/breaks/end").json(&json!({})))
            .await
    }

    /// Individual upload with the classifier's canonical name
    pub async fn upload_document(&self, upload: UploadRequest) -> Result<UploadedDocument> {
        let form = Form::new()
            .part("file", Part::bytes(upload.bytes).file_name(upload.file_name))
            .text("employeeId", upload.employee_id.to_string())
            .text("cleanFileName", upload.clean_file_name)
            .text("requiresSignature", upload.requires_signature.to_string());
        self.send_json(self.request(Method::POST, "/api/documents/upload").multipart(form))
            .await
    }

    /// Fan one file out to many employees
    pub async fn send_circular(&self, circular: CircularRequest) -> Result<CircularReceipt> {
        let recipients = serde_json::to_string(&circular.recipient_ids)?;
        let form = Form::new()
            .part("file", Part::bytes(circular.bytes).file_name(circular.file_name))
            .text("recipientIds", recipients)
            .text("requiresSignature", circular.requires_signature.to_string());
        self.send_json(self.request(Method::POST, "/api/documents/circular").multipart(form))
            .await
    }

    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        let path = format!("/api/documents/{}", document_id);
        Self::check(self.request(Method::DELETE, &path).send().await?).await?;
        Ok(())
    }

    /// Short-lived signed URL for viewing a document
    pub async fn document_view_url(&self, document_id: &str) -> Result<String> {
        let path = format!("/api/documents/{}/view-url", document_id);
        let response: ViewUrlResponse = self
            .send_json(self.request(Method::POST, &path).json(&json!({})))
            .await?;
        Ok(response.url)
    }
}
