//! SQLite-backed document store
//!
//! Owns document records, per-recipient status rows and the artifact
//! references between them. Individual uploads create one record; circular
//! sends store the file once and create one record per recipient, all in a
//! single transaction. Artifacts are garbage collected once the last record
//! pointing at them is deleted.
//!
//! Storing an artifact and inserting the records that reference it happen
//! under the same lock as the collector's reference count and removal, so a
//! concurrent delete never removes a file a pending upload is about to use.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wfm_common::api::SignedViewUrl;
use wfm_common::config::{DocumentsConfig, SigningSecret};

use crate::classify::{doc_type, normalize, DocumentType};
use crate::db;
use crate::error::{DocumentError, Result};
use crate::recipient::{validate_signature, RecipientStatus};
use crate::storage::{ArtifactStorage, FsArtifactStorage};
use crate::upload::PlannedUpload;

const DEFAULT_STORAGE_ROOT: &str = "wfm-artifacts";

const SELECT_DOCUMENT: &str = r#"
    SELECT d.guid, d.owner_user_id, d.artifact_hash, d.batch_id, d.file_name,
           d.original_name, d.file_size, d.document_type, d.requires_signature,
           d.created_at,
           s.user_id AS status_user_id, s.is_viewed, s.viewed_at, s.is_accepted,
           s.accepted_at, s.digital_signature
    FROM documents d
    LEFT JOIN recipient_status s ON s.document_guid = d.guid
"#;

/// One recipient's copy of an uploaded file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    /// None for shared parents without a single owner
    pub owner_user_id: Option<i64>,
    pub batch_id: Option<Uuid>,
    pub artifact_hash: String,
    pub file_name: String,
    pub original_name: String,
    pub file_size: i64,
    pub document_type: DocumentType,
    pub requires_signature: bool,
    pub created_at: DateTime<Utc>,
    pub status: Option<RecipientStatus>,
}

impl Document {
    pub fn is_complete(&self) -> bool {
        self.status
            .as_ref()
            .map_or(false, |s| s.is_complete(self.requires_signature))
    }
}

/// Circular distribution request
#[derive(Debug, Clone)]
pub struct CircularUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub recipient_ids: Vec<i64>,
    pub requires_signature: bool,
    /// Detected from the file name when absent
    pub document_type: Option<DocumentType>,
}

/// Records created by one circular send
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub batch_id: Uuid,
    /// One per recipient, in recipient order
    pub document_ids: Vec<Uuid>,
    pub artifact_hash: String,
}

/// Per-record outcome of a best-effort batch undo
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchUndoReport {
    pub deleted: Vec<Uuid>,
    pub failures: Vec<(Uuid, String)>,
}

impl BatchUndoReport {
    pub fn succeeded(&self) -> usize {
        self.deleted.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Ok with the deleted count, or `PartialBatchFailure`
    pub fn into_result(self) -> Result<usize> {
        if self.failures.is_empty() {
            Ok(self.deleted.len())
        } else {
            Err(DocumentError::PartialBatchFailure {
                succeeded: self.succeeded(),
                failed: self.failed(),
            })
        }
    }
}

/// Viewed / signed counts for a circular batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub total: usize,
    pub viewed: usize,
    pub signed: usize,
    pub completed: usize,
}

impl BatchProgress {
    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| DocumentError::Corrupt(format!("uuid '{}': {}", value, e)))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DocumentError::Corrupt(format!("timestamp '{}': {}", value, e)))
}

fn parse_optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let guid: String = row.try_get("guid")?;
    let batch_id: Option<String> = row.try_get("batch_id")?;
    let document_type: String = row.try_get("document_type")?;
    let created_at: String = row.try_get("created_at")?;

    let status = match row.try_get::<Option<i64>, _>("status_user_id")? {
        Some(user_id) => Some(RecipientStatus {
            user_id,
            is_viewed: row.try_get("is_viewed")?,
            viewed_at: parse_optional_timestamp(row.try_get("viewed_at")?)?,
            is_accepted: row.try_get("is_accepted")?,
            accepted_at: parse_optional_timestamp(row.try_get("accepted_at")?)?,
            digital_signature: row.try_get("digital_signature")?,
        }),
        None => None,
    };

    Ok(Document {
        id: parse_uuid(&guid)?,
        owner_user_id: row.try_get("owner_user_id")?,
        batch_id: batch_id.as_deref().map(parse_uuid).transpose()?,
        artifact_hash: row.try_get("artifact_hash")?,
        file_name: row.try_get("file_name")?,
        original_name: row.try_get("original_name")?,
        file_size: row.try_get("file_size")?,
        document_type: document_type.parse()?,
        requires_signature: row.try_get("requires_signature")?,
        created_at: parse_timestamp(&created_at)?,
        status,
    })
}

/// Recipient ids in first-seen order without duplicates
fn dedup_recipients(ids: &[i64]) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

struct NewRecord<'a> {
    owner_user_id: i64,
    batch_id: Option<Uuid>,
    file_name: &'a str,
    original_name: &'a str,
    document_type: DocumentType,
    requires_signature: bool,
}

#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
    storage: Arc<dyn ArtifactStorage>,
    /// Held across put+insert and across count+remove
    artifact_lock: Arc<Mutex<()>>,
    view_url_ttl: chrono::Duration,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool, storage: Arc<dyn ArtifactStorage>) -> Self {
        Self {
            pool,
            storage,
            artifact_lock: Arc::new(Mutex::new(())),
            view_url_ttl: chrono::Duration::seconds(300),
        }
    }

    /// Open the database and filesystem storage named by `[documents]`
    pub async fn from_config(config: &DocumentsConfig) -> Result<Self> {
        let pool = db::init_database(&config.database_url).await?;
        let root = config
            .storage_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT));
        info!("Artifact storage: {}", root.display());
        Ok(Self::new(pool, Arc::new(FsArtifactStorage::new(root)))
            .with_view_url_ttl(chrono::Duration::seconds(config.view_url_ttl_secs as i64)))
    }

    pub fn with_view_url_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.view_url_ttl = ttl;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Store one planned individual upload
    pub async fn upload(&self, plan: &PlannedUpload, bytes: &[u8]) -> Result<Document> {
        if bytes.is_empty() {
            return Err(DocumentError::InvalidInput(format!(
                "{} is empty",
                plan.original_name
            )));
        }
        let guard = self.artifact_lock.lock().await;
        let artifact = self.storage.put(bytes).await?;
        let record = NewRecord {
            owner_user_id: plan.employee_id,
            batch_id: None,
            file_name: &plan.canonical_name,
            original_name: &plan.original_name,
            document_type: plan.document_type,
            requires_signature: plan.requires_signature,
        };

        let inserted = self
            .insert_records(&artifact.hash, artifact.size as i64, &[record])
            .await;
        let id = match inserted {
            Ok(ids) => ids.into_iter().next(),
            Err(e) => {
                self.collect_unreferenced_quietly(&artifact.hash).await;
                return Err(e);
            }
        };
        drop(guard);
        let id = id.ok_or_else(|| DocumentError::Corrupt("no record inserted".to_string()))?;

        info!(
            document = %id,
            employee = plan.employee_id,
            file = %plan.canonical_name,
            "Uploaded document"
        );
        self.require(id).await
    }

    /// Send one file to many employees
    ///
    /// The artifact is stored once; every recipient gets their own record and
    /// an unviewed, unaccepted status. Duplicate recipient ids are collapsed.
    pub async fn send_circular(&self, upload: CircularUpload) -> Result<BatchResult> {
        let recipients = dedup_recipients(&upload.recipient_ids);
        if recipients.is_empty() {
            return Err(DocumentError::InvalidInput(
                "circular needs at least one recipient".to_string(),
            ));
        }
        if upload.bytes.is_empty() {
            return Err(DocumentError::InvalidInput(format!(
                "{} is empty",
                upload.file_name
            )));
        }

        let document_type = upload.document_type.unwrap_or_else(|| {
            doc_type::detect_type(&normalize::tokenize_file_name(&upload.file_name)).document_type
        });

        let guard = self.artifact_lock.lock().await;
        let artifact = self.storage.put(&upload.bytes).await?;
        let batch_id = Uuid::new_v4();
        let records: Vec<NewRecord<'_>> = recipients
            .iter()
            .map(|recipient| NewRecord {
                owner_user_id: *recipient,
                batch_id: Some(batch_id),
                file_name: &upload.file_name,
                original_name: &upload.file_name,
                document_type,
                requires_signature: upload.requires_signature,
            })
            .collect();

        let document_ids = match self
            .insert_records(&artifact.hash, artifact.size as i64, &records)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                self.collect_unreferenced_quietly(&artifact.hash).await;
                return Err(e);
            }
        };
        drop(guard);

        info!(
            batch = %batch_id,
            recipients = document_ids.len(),
            file = %upload.file_name,
            requires_signature = upload.requires_signature,
            "Sent circular"
        );
        Ok(BatchResult {
            batch_id,
            document_ids,
            artifact_hash: artifact.hash,
        })
    }

    /// Insert artifact reference, records and statuses in one transaction
    async fn insert_records(
        &self,
        hash: &str,
        size: i64,
        records: &[NewRecord<'_>],
    ) -> Result<Vec<Uuid>> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO artifacts (hash, file_size, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(hash)
        .bind(size)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO documents (
                    guid, owner_user_id, artifact_hash, batch_id, file_name,
                    original_name, file_size, document_type, requires_signature, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id.to_string())
            .bind(record.owner_user_id)
            .bind(hash)
            .bind(record.batch_id.map(|b| b.to_string()))
            .bind(record.file_name)
            .bind(record.original_name)
            .bind(size)
            .bind(record.document_type.as_str())
            .bind(record.requires_signature)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO recipient_status (document_guid, user_id, is_viewed, is_accepted)
                VALUES (?, ?, 0, 0)
                "#,
            )
            .bind(id.to_string())
            .bind(record.owner_user_id)
            .execute(&mut *tx)
            .await?;

            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Document>> {
        let row = sqlx::query(&format!("{} WHERE d.guid = ?", SELECT_DOCUMENT))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn require(&self, id: Uuid) -> Result<Document> {
        self.get(id)
            .await?
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))
    }

    /// Documents addressed to `user_id`, newest first
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "{} WHERE d.owner_user_id = ? ORDER BY d.created_at DESC, d.guid",
            SELECT_DOCUMENT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }

    /// Every recipient copy of a circular, by recipient id
    pub async fn list_batch(&self, batch_id: Uuid) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "{} WHERE d.batch_id = ? ORDER BY d.owner_user_id",
            SELECT_DOCUMENT
        ))
        .bind(batch_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }

    pub async fn batch_progress(&self, batch_id: Uuid) -> Result<BatchProgress> {
        let documents = self.list_batch(batch_id).await?;
        if documents.is_empty() {
            return Err(DocumentError::NotFound(format!("batch {}", batch_id)));
        }
        let statuses: Vec<&RecipientStatus> =
            documents.iter().filter_map(|d| d.status.as_ref()).collect();
        Ok(BatchProgress {
            total: documents.len(),
            viewed: statuses.iter().filter(|s| s.is_viewed).count(),
            signed: statuses.iter().filter(|s| s.is_accepted).count(),
            completed: documents.iter().filter(|d| d.is_complete()).count(),
        })
    }

    /// Record that `caller` opened the document
    ///
    /// Returns whether anything changed. Callers other than the recipient
    /// (an admin previewing) and repeat views change nothing.
    pub async fn mark_viewed(&self, id: Uuid, caller: i64) -> Result<bool> {
        let document = self.require(id).await?;
        let Some(status) = document.status else {
            return Ok(false);
        };
        if !status.should_mark_viewed(caller) {
            debug!(document = %id, caller, "View not recorded");
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            UPDATE recipient_status
            SET is_viewed = 1, viewed_at = ?
            WHERE document_guid = ? AND user_id = ? AND is_viewed = 0
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .bind(caller)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Accept the document with `signature`
    ///
    /// Fails with `PreconditionFailed` unless the caller is the recipient,
    /// the document requires a signature, it has been viewed and it is not
    /// already signed.
    pub async fn sign(&self, id: Uuid, caller: i64, signature: &str) -> Result<RecipientStatus> {
        let signature = validate_signature(signature)?;
        let document = self.require(id).await?;
        let mut status = document.status.ok_or_else(|| {
            DocumentError::PreconditionFailed("document has no recipient".to_string())
        })?;
        status.check_can_sign(caller, document.requires_signature)?;

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE recipient_status
            SET is_accepted = 1, accepted_at = ?, digital_signature = ?
            WHERE document_guid = ? AND user_id = ? AND is_viewed = 1 AND is_accepted = 0
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(signature)
        .bind(id.to_string())
        .bind(caller)
        .execute(&self.pool)
        .await?;

        // Lost a race with a concurrent signature
        if result.rows_affected() == 0 {
            return Err(DocumentError::PreconditionFailed(
                "document already signed".to_string(),
            ));
        }

        status.sign(caller, document.requires_signature, signature, now)?;
        info!(document = %id, caller, "Document signed");
        Ok(status)
    }

    /// Fetch contents for `caller`, marking the document viewed if they own it
    pub async fn open_document(&self, id: Uuid, caller: i64) -> Result<(Document, Vec<u8>)> {
        let document = self.require(id).await?;
        let bytes = self.storage.get(&document.artifact_hash).await?;
        if self.mark_viewed(id, caller).await? {
            return Ok((self.require(id).await?, bytes));
        }
        Ok((document, bytes))
    }

    /// Short-lived signed link for viewing a document
    pub async fn issue_view_url(&self, id: Uuid, secret: &SigningSecret) -> Result<SignedViewUrl> {
        self.require(id).await?;
        let url = SignedViewUrl::issue(id, self.view_url_ttl, secret, Utc::now())?;
        Ok(url)
    }

    /// Verify a signed link and open the document it names
    pub async fn open_signed(
        &self,
        url: &SignedViewUrl,
        secret: &SigningSecret,
        caller: i64,
    ) -> Result<(Document, Vec<u8>)> {
        url.verify(secret, Utc::now())?;
        self.open_document(url.document_id, caller).await
    }

    /// Delete one record and its status
    pub async fn delete_document(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let hash: Option<String> =
            sqlx::query_scalar("SELECT artifact_hash FROM documents WHERE guid = ?")
                .bind(id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
        let hash = hash.ok_or_else(|| DocumentError::NotFound(id.to_string()))?;

        sqlx::query("DELETE FROM recipient_status WHERE document_guid = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE guid = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(document = %id, "Deleted document");
        // The record is gone; a failed collection only leaves an orphan blob
        self.collect_artifact_quietly(&hash).await;
        Ok(())
    }

    /// Delete each record independently
    ///
    /// A failure is reported per record and does not stop the rest.
    pub async fn undo_batch(&self, ids: &[Uuid]) -> BatchUndoReport {
        let mut report = BatchUndoReport::default();
        for id in ids {
            match self.delete_document(*id).await {
                Ok(()) => report.deleted.push(*id),
                Err(e) => {
                    warn!(document = %id, "Undo failed: {}", e);
                    report.failures.push((*id, e.to_string()));
                }
            }
        }
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Batch undo completed"
        );
        report
    }

    /// Delete every record of a circular in one transaction
    pub async fn delete_batch(&self, batch_id: Uuid) -> Result<usize> {
        let batch = batch_id.to_string();
        let mut tx = self.pool.begin().await?;

        let hashes: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT artifact_hash FROM documents WHERE batch_id = ?")
                .bind(&batch)
                .fetch_all(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            DELETE FROM recipient_status
            WHERE document_guid IN (SELECT guid FROM documents WHERE batch_id = ?)
            "#,
        )
        .bind(&batch)
        .execute(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM documents WHERE batch_id = ?")
            .bind(&batch)
            .execute(&mut *tx)
            .await?
            .rows_affected() as usize;

        if deleted == 0 {
            tx.rollback().await?;
            return Err(DocumentError::NotFound(format!("batch {}", batch_id)));
        }
        tx.commit().await?;
        info!(batch = %batch_id, deleted, "Deleted circular batch");

        for hash in hashes {
            self.collect_artifact_quietly(&hash).await;
        }
        Ok(deleted)
    }

    /// Drop an artifact no record references anymore
    ///
    /// Returns whether the artifact was removed.
    pub async fn collect_artifact(&self, hash: &str) -> Result<bool> {
        let _guard = self.artifact_lock.lock().await;
        self.collect_unreferenced(hash).await
    }

    /// Collection body; the caller holds `artifact_lock`
    async fn collect_unreferenced(&self, hash: &str) -> Result<bool> {
        let references: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE artifact_hash = ?")
                .bind(hash)
                .fetch_one(&self.pool)
                .await?;
        if references > 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM artifacts WHERE hash = ?")
            .bind(hash)
            .execute(&self.pool)
            .await?;
        self.storage.remove(hash).await?;
        debug!(hash = %hash, "Collected unreferenced artifact");
        Ok(true)
    }

    async fn collect_artifact_quietly(&self, hash: &str) {
        let _guard = self.artifact_lock.lock().await;
        self.collect_unreferenced_quietly(hash).await;
    }

    async fn collect_unreferenced_quietly(&self, hash: &str) {
        if let Err(e) = self.collect_unreferenced(hash).await {
            warn!(hash = %hash, "Failed to collect artifact: {}", e);
        }
    }

    pub async fn artifact_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM artifacts")
            .fetch_one(&self.pool)
            .await?)
    }
}
