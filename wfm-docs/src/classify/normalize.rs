//! Filename normalisation and tokenisation
//!
//! Every matcher works on the same token stream: camelCase and
//! letter/digit boundaries are split, diacritics are folded (`Pérez` →
//! `perez`), everything is lowercased and any non-alphanumeric character is
//! a separator. Matching is always against whole tokens, never substrings.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Split `name` into stem and lowercased extension
///
/// A leading dot (`.env`) or a trailing dot is not an extension.
pub fn split_extension(file_name: &str) -> (&str, Option<String>) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < file_name.len() => {
            let ext = &file_name[idx + 1..];
            if ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                (&file_name[..idx], Some(ext.to_ascii_lowercase()))
            } else {
                (file_name, None)
            }
        }
        _ => (file_name, None),
    }
}

/// Strip diacritics and lowercase
pub fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Insert a space at camelCase and letter/digit boundaries
fn split_boundaries(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if let Some(p) = prev {
            let camel = p.is_lowercase() && c.is_uppercase();
            let digit_edge = (p.is_alphabetic() && c.is_ascii_digit())
                || (p.is_ascii_digit() && c.is_alphabetic());
            if camel || digit_edge {
                out.push(' ');
            }
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

/// Tokenise free text (a filename stem or an employee name)
pub fn tokenize(text: &str) -> Vec<String> {
    fold(&split_boundaries(text))
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tokenise a full filename, dropping the extension
pub fn tokenize_file_name(file_name: &str) -> Vec<String> {
    let (stem, _) = split_extension(file_name);
    tokenize(stem)
}
