//! Upload planning
//!
//! Turns classification results into concrete individual uploads. A
//! confident classification is used as-is; a `Low` one needs a manual
//! override naming the employee, otherwise it is held back for review with
//! `ClassificationAmbiguous`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};
use wfm_common::api::Employee;
use wfm_common::events::{ClientEvent, EventBus};

use crate::classify::rename::{self, NameParts};
use crate::classify::{classify_with_year, ClassificationResult, DetectedDate, DocumentType};
use crate::error::{DocumentError, Result};

/// Manual corrections from the confirmation step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualOverride {
    pub employee_id: Option<i64>,
    pub document_type: Option<DocumentType>,
    pub month: Option<u32>,
    pub year: Option<i32>,
    /// Use this exact name instead of the generated one
    pub file_name: Option<String>,
}

/// One file ready for the individual upload endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedUpload {
    pub original_name: String,
    pub employee_id: i64,
    pub canonical_name: String,
    pub document_type: DocumentType,
    pub requires_signature: bool,
}

fn ambiguous(result: &ClassificationResult) -> DocumentError {
    DocumentError::ClassificationAmbiguous {
        file_name: result.original_name.clone(),
        candidates: result
            .candidates
            .iter()
            .map(|e| e.full_name.clone())
            .collect(),
    }
}

/// Build the upload for one classified file
pub fn plan_upload(
    result: &ClassificationResult,
    manual: Option<&ManualOverride>,
    roster: &[Employee],
    requires_signature: bool,
) -> Result<PlannedUpload> {
    let manual_employee = manual.and_then(|m| m.employee_id);

    let employee = match manual_employee {
        Some(id) => roster
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| DocumentError::InvalidInput(format!("employee {} not in roster", id)))?,
        None if result.needs_review() => return Err(ambiguous(result)),
        None => result
            .detected_employee
            .clone()
            .ok_or_else(|| ambiguous(result))?,
    };

    let Some(manual) = manual else {
        return Ok(PlannedUpload {
            original_name: result.original_name.clone(),
            employee_id: employee.id,
            canonical_name: result.suggested_canonical_name.clone(),
            document_type: result.detected_document_type,
            requires_signature,
        });
    };

    if let Some(month) = manual.month {
        if !(1..=12).contains(&month) {
            return Err(DocumentError::InvalidInput(format!("month {} out of range", month)));
        }
    }

    let document_type = manual.document_type.unwrap_or(result.detected_document_type);
    let date = DetectedDate {
        month: manual.month.or(result.detected_date.month),
        year: manual.year.unwrap_or(result.detected_date.year),
        year_inferred: manual.year.is_none() && result.detected_date.year_inferred,
    };
    let canonical_name = match manual.file_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => rename::canonical_name(&NameParts {
            document_type,
            fiscal_label: result.fiscal_label.as_deref(),
            date: Some(date),
            employee_name: Some(&employee.full_name),
            extension: result.extension.as_deref(),
        }),
    };

    debug!(file = %result.original_name, employee = employee.id, "Applied manual override");
    Ok(PlannedUpload {
        original_name: result.original_name.clone(),
        employee_id: employee.id,
        canonical_name,
        document_type,
        requires_signature,
    })
}

/// Classified batch of files split into ready uploads and files awaiting review
#[derive(Debug, Clone, Default)]
pub struct UploadPlan {
    pub ready: Vec<PlannedUpload>,
    pub needs_review: Vec<ClassificationResult>,
}

impl UploadPlan {
    /// Classify and plan every file; overrides are keyed by original file name
    pub fn build(
        file_names: &[String],
        roster: &[Employee],
        overrides: &HashMap<String, ManualOverride>,
        requires_signature: bool,
        current_year: i32,
    ) -> Result<Self> {
        let mut plan = UploadPlan::default();
        for file_name in file_names {
            let result = classify_with_year(file_name, roster, current_year);
            match plan_upload(&result, overrides.get(file_name), roster, requires_signature) {
                Ok(upload) => plan.ready.push(upload),
                Err(DocumentError::ClassificationAmbiguous { .. }) => {
                    plan.needs_review.push(result)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(plan)
    }

    pub fn is_ready(&self) -> bool {
        self.needs_review.is_empty()
    }

    /// Announce files that need a manual choice
    pub fn notify_pending(&self, bus: &EventBus) {
        for result in &self.needs_review {
            warn!(file = %result.original_name, "Classification needs review");
            bus.emit_lossy(ClientEvent::ClassificationNeedsReview {
                file_name: result.original_name.clone(),
                timestamp: wfm_common::time::now(),
            });
        }
    }
}
