//! Filename classification engine
//!
//! Turns an uploaded file name plus the employee roster into a
//! [`ClassificationResult`]: owning employee, document type, period,
//! confidence and a canonical rename. Results are ephemeral; they seed the
//! upload confirmation step and are never stored.
//!
//! # Confidence
//!
//! | Level    | Rule                                                         |
//! |----------|--------------------------------------------------------------|
//! | `High`   | unique employee match and an explicit type keyword           |
//! | `Medium` | employee and type both present, at least one only inferred   |
//! | `Low`    | employee missing or ambiguous, or no type keyword at all     |
//!
//! `Low` routes the file to manual selection.

pub mod date;
pub mod doc_type;
pub mod employee;
pub mod normalize;
pub mod rename;

use serde::{Deserialize, Serialize};
use wfm_common::api::Employee;

pub use date::DetectedDate;
pub use doc_type::DocumentType;
pub use employee::{EmployeeMatch, MatchTier};

use rename::NameParts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Classification of one uploaded file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub original_name: String,
    pub detected_employee: Option<Employee>,
    /// Roster members tied for the match when it was ambiguous
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<Employee>,
    pub detected_document_type: DocumentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiscal_label: Option<String>,
    pub detected_date: DetectedDate,
    pub confidence: Confidence,
    pub suggested_canonical_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

impl ClassificationResult {
    /// Needs a manual employee/type choice before upload
    pub fn needs_review(&self) -> bool {
        self.confidence == Confidence::Low
    }
}

fn confidence(employee: &EmployeeMatch, type_match: &doc_type::TypeMatch) -> Confidence {
    let employee_ok = employee.employee().is_some();
    if !employee_ok || type_match.is_absent() {
        return Confidence::Low;
    }
    if employee.is_inferred() || type_match.is_inferred() {
        Confidence::Medium
    } else {
        Confidence::High
    }
}

/// Classify against the roster using the current year as the default period
pub fn classify(file_name: &str, roster: &[Employee]) -> ClassificationResult {
    classify_with_year(file_name, roster, wfm_common::time::current_year())
}

/// Classify with an explicit fallback year
pub fn classify_with_year(
    file_name: &str,
    roster: &[Employee],
    current_year: i32,
) -> ClassificationResult {
    let (stem, extension) = normalize::split_extension(file_name);
    let tokens = normalize::tokenize(stem);

    let employee = employee::detect_employee(&tokens, roster);
    let type_match = doc_type::detect_type(&tokens);
    let date = date::extract_date(&tokens, &employee.consumed(), current_year);
    let confidence = confidence(&employee, &type_match);

    let detected_employee = employee.employee().cloned();
    let suggested_canonical_name = rename::canonical_name(&NameParts {
        document_type: type_match.document_type,
        fiscal_label: type_match.fiscal_label.as_deref(),
        date: Some(date),
        employee_name: detected_employee.as_ref().map(|e| e.full_name.as_str()),
        extension: extension.as_deref(),
    });

    let candidates = match employee {
        EmployeeMatch::Ambiguous { candidates } => candidates,
        _ => Vec::new(),
    };

    tracing::debug!(
        file = %file_name,
        employee = ?detected_employee.as_ref().map(|e| e.id),
        document_type = %type_match.document_type,
        confidence = ?confidence,
        "Classified upload"
    );

    ClassificationResult {
        original_name: file_name.to_string(),
        detected_employee,
        candidates,
        detected_document_type: type_match.document_type,
        fiscal_label: type_match.fiscal_label,
        detected_date: date,
        confidence,
        suggested_canonical_name,
        extension,
    }
}
