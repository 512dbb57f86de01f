//! Document type keyword table

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DocumentError;

/// Fixed document categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Dni,
    Payroll,
    Contract,
    Proof,
    Other,
}

const KEYWORDS: &[(DocumentType, &[&str])] = &[
    (
        DocumentType::Dni,
        &["dni", "nie", "identidad", "pasaporte", "passport"],
    ),
    (
        DocumentType::Payroll,
        &["nomina", "nominas", "payroll", "payslip", "salario"],
    ),
    (DocumentType::Contract, &["contrato", "contratos", "contract"]),
    (
        DocumentType::Proof,
        &["justificante", "justificantes", "certificado", "proof"],
    ),
];

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::Dni,
        DocumentType::Payroll,
        DocumentType::Contract,
        DocumentType::Proof,
        DocumentType::Other,
    ];

    /// Storage tag
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Dni => "dni",
            DocumentType::Payroll => "payroll",
            DocumentType::Contract => "contract",
            DocumentType::Proof => "proof",
            DocumentType::Other => "other",
        }
    }

    /// Label used in canonical file names
    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::Dni => "DNI",
            DocumentType::Payroll => "Nómina",
            DocumentType::Contract => "Contrato",
            DocumentType::Proof => "Justificante",
            DocumentType::Other => "Otros",
        }
    }

    /// Identity documents carry no period
    pub fn is_dated(&self) -> bool {
        !matches!(self, DocumentType::Dni)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DocumentError::InvalidInput(format!("unknown document type '{}'", s)))
    }
}

/// Detected type plus the fiscal keyword that qualifies `Other`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMatch {
    pub document_type: DocumentType,
    /// Explicit category keyword found
    pub explicit: bool,
    /// Suffix for fiscal paperwork filed under `Other`, e.g. "IRPF"
    pub fiscal_label: Option<String>,
}

impl TypeMatch {
    /// `Other` qualified by a fiscal keyword is an inferred type
    pub fn is_inferred(&self) -> bool {
        !self.explicit && self.fiscal_label.is_some()
    }

    pub fn is_absent(&self) -> bool {
        !self.explicit && self.fiscal_label.is_none()
    }
}

/// First fiscal keyword in token order
fn fiscal_label(tokens: &[String]) -> Option<String> {
    tokens.iter().enumerate().find_map(|(idx, token)| match token.as_str() {
        "irpf" => Some("IRPF".to_string()),
        "modelo" => tokens
            .get(idx + 1)
            .filter(|next| next.chars().all(|c| c.is_ascii_digit()))
            .map(|number| format!("Modelo {}", number)),
        "renta" => Some("Renta".to_string()),
        "hacienda" => Some("Hacienda".to_string()),
        "declaracion" => Some("Declaración".to_string()),
        "retencion" | "retenciones" => Some("Retenciones".to_string()),
        _ => None,
    })
}

/// Detect the document type from whole tokens; the first keyword wins
pub fn detect_type(tokens: &[String]) -> TypeMatch {
    let explicit = tokens.iter().find_map(|token| {
        KEYWORDS
            .iter()
            .find(|(_, words)| words.contains(&token.as_str()))
            .map(|(kind, _)| *kind)
    });

    match explicit {
        Some(document_type) => TypeMatch {
            document_type,
            explicit: true,
            fiscal_label: None,
        },
        None => TypeMatch {
            document_type: DocumentType::Other,
            explicit: false,
            fiscal_label: fiscal_label(tokens),
        },
    }
}
