//! Canonical document names
//!
//! `"{Type} {Month} {Year} - {Full Name}.{ext}"`, e.g.
//! `"Nómina Marzo 2025 - Juan Pérez.pdf"`. Missing parts are dropped with
//! their separator. Identity documents never carry a period; an inferred
//! year is only kept when a month was found. A fiscal label on an `Otros`
//! document follows the period: `"Otros Marzo 2025 (IRPF) - Juan Pérez.pdf"`.

use super::date::DetectedDate;
use super::doc_type::DocumentType;

const LOWERCASE_PARTICLES: &[&str] = &["de", "del", "la", "las", "los", "y"];

/// Title-case a person's name, keeping particles lowercase after the first word
pub fn capitalize_name(name: &str) -> String {
    name.split_whitespace()
        .enumerate()
        .map(|(idx, word)| {
            let lower = word.to_lowercase();
            if idx > 0 && LOWERCASE_PARTICLES.contains(&lower.as_str()) {
                return lower;
            }
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parts of a canonical name
#[derive(Debug, Clone)]
pub struct NameParts<'a> {
    pub document_type: DocumentType,
    pub fiscal_label: Option<&'a str>,
    pub date: Option<DetectedDate>,
    pub employee_name: Option<&'a str>,
    pub extension: Option<&'a str>,
}

pub fn canonical_name(parts: &NameParts<'_>) -> String {
    let mut head = vec![parts.document_type.label().to_string()];

    if let (true, Some(date)) = (parts.document_type.is_dated(), parts.date) {
        if let Some(month) = date.month_name() {
            head.push(month.to_string());
            head.push(date.year.to_string());
        } else if !date.year_inferred {
            head.push(date.year.to_string());
        }
    }

    if parts.document_type == DocumentType::Other {
        if let Some(label) = parts.fiscal_label {
            head.push(format!("({})", label));
        }
    }

    let mut name = head.join(" ");
    if let Some(employee) = parts.employee_name.filter(|n| !n.trim().is_empty()) {
        name.push_str(" - ");
        name.push_str(&capitalize_name(employee));
    }
    if let Some(ext) = parts.extension {
        name.push('.');
        name.push_str(ext);
    }
    name
}
