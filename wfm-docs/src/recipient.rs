//! Per-recipient document lifecycle
//!
//! ```text
//! unviewed ──MarkViewed(owner)──> viewed ──Sign(owner)──> accepted
//! ```
//!
//! Viewing is idempotent and keeps the first `viewed_at`. Signing needs a
//! prior view and happens at most once. Callers other than the recipient
//! never move the state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DocumentError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientStatus {
    pub user_id: i64,
    pub is_viewed: bool,
    pub viewed_at: Option<DateTime<Utc>>,
    pub is_accepted: bool,
    pub accepted_at: Option<DateTime<Utc>>,
    pub digital_signature: Option<String>,
}

impl RecipientStatus {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            is_viewed: false,
            viewed_at: None,
            is_accepted: false,
            accepted_at: None,
            digital_signature: None,
        }
    }

    /// Done from the recipient's point of view
    pub fn is_complete(&self, requires_signature: bool) -> bool {
        if requires_signature {
            self.is_accepted
        } else {
            self.is_viewed
        }
    }

    /// Would a view by `caller` change anything
    pub fn should_mark_viewed(&self, caller: i64) -> bool {
        caller == self.user_id && !self.is_viewed
    }

    /// Check every signing precondition for `caller`
    pub fn check_can_sign(&self, caller: i64, requires_signature: bool) -> Result<()> {
        if caller != self.user_id {
            return Err(DocumentError::PreconditionFailed(
                "only the recipient can sign this document".to_string(),
            ));
        }
        if !requires_signature {
            return Err(DocumentError::PreconditionFailed(
                "document does not require a signature".to_string(),
            ));
        }
        if !self.is_viewed {
            return Err(DocumentError::PreconditionFailed(
                "document must be viewed before signing".to_string(),
            ));
        }
        if self.is_accepted {
            return Err(DocumentError::PreconditionFailed(
                "document already signed".to_string(),
            ));
        }
        Ok(())
    }

    pub fn mark_viewed(&mut self, caller: i64, at: DateTime<Utc>) -> bool {
        if !self.should_mark_viewed(caller) {
            return false;
        }
        self.is_viewed = true;
        self.viewed_at = Some(at);
        true
    }

    pub fn sign(
        &mut self,
        caller: i64,
        requires_signature: bool,
        signature: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let signature = validate_signature(signature)?;
        self.check_can_sign(caller, requires_signature)?;
        self.is_accepted = true;
        self.accepted_at = Some(at);
        self.digital_signature = Some(signature.to_string());
        Ok(())
    }
}

/// Trimmed, non-empty signature payload
pub fn validate_signature(signature: &str) -> Result<&str> {
    let trimmed = signature.trim();
    if trimmed.is_empty() {
        return Err(DocumentError::InvalidInput(
            "signature payload is empty".to_string(),
        ));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_then_sign() {
        let mut status = RecipientStatus::new(4);
        let t0 = Utc::now();
        assert!(status.mark_viewed(4, t0));
        status.sign(4, true, "firma:abc", t0).unwrap();
        assert!(status.is_accepted);
        assert!(status.is_complete(true));
        assert_eq!(status.digital_signature.as_deref(), Some("firma:abc"));
    }

    #[test]
    fn test_sign_requires_view() {
        let mut status = RecipientStatus::new(4);
        let err = status.sign(4, true, "sig", Utc::now()).unwrap_err();
        assert!(matches!(err, DocumentError::PreconditionFailed(_)));
        assert!(!status.is_accepted);
    }

    #[test]
    fn test_no_resign() {
        let mut status = RecipientStatus::new(4);
        status.mark_viewed(4, Utc::now());
        status.sign(4, true, "first", Utc::now()).unwrap();
        assert!(status.sign(4, true, "second", Utc::now()).is_err());
        assert_eq!(status.digital_signature.as_deref(), Some("first"));
    }

    #[test]
    fn test_view_by_other_user_is_noop() {
        let mut status = RecipientStatus::new(4);
        assert!(!status.mark_viewed(1, Utc::now()));
        assert_eq!(status, RecipientStatus::new(4));
    }

    #[test]
    fn test_second_view_keeps_first_timestamp() {
        let mut status = RecipientStatus::new(4);
        let first = Utc::now();
        status.mark_viewed(4, first);
        assert!(!status.mark_viewed(4, first + chrono::Duration::seconds(60)));
        assert_eq!(status.viewed_at, Some(first));
    }

    #[test]
    fn test_empty_signature_rejected() {
        let mut status = RecipientStatus::new(4);
        status.mark_viewed(4, Utc::now());
        assert!(matches!(
            status.sign(4, true, "   ", Utc::now()),
            Err(DocumentError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_complete_without_signature_after_view() {
        let mut status = RecipientStatus::new(4);
        assert!(!status.is_complete(false));
        status.mark_viewed(4, Utc::now());
        assert!(status.is_complete(false));
        assert!(!status.is_complete(true));
    }
}
