//! Short-lived signed document view URLs
//!
//! Document view/download links carry `expires` and `signature` query
//! parameters instead of the caller's bearer token, so long-lived credentials
//! never end up in browser history or access logs.
//!
//! # Algorithm
//!
//! 1. Canonical string: `"{document_id}:{expires}"` (expires = Unix seconds)
//! 2. HMAC-SHA256 keyed with the signing secret
//! 3. Rendered as 64 lowercase hex characters

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::config::SigningSecret;
use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Signed view URL parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedViewUrl {
    pub document_id: Uuid,
    /// Expiry as Unix seconds
    pub expires: i64,
    pub signature: String,
}

fn keyed_mac(document_id: Uuid, expires: i64, secret: &SigningSecret) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.expose().as_bytes())
        .map_err(|e| Error::Config(format!("Unusable signing secret: {}", e)))?;
    mac.update(format!("{}:{}", document_id, expires).as_bytes());
    Ok(mac)
}

/// Calculate the signature for a document and expiry
pub fn sign(document_id: Uuid, expires: i64, secret: &SigningSecret) -> Result<String> {
    let mac = keyed_mac(document_id, expires, secret)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

impl SignedViewUrl {
    /// Issue a URL valid for `ttl` from `now`
    pub fn issue(
        document_id: Uuid,
        ttl: Duration,
        secret: &SigningSecret,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let expires = (now + ttl).timestamp();
        Ok(Self {
            document_id,
            expires,
            signature: sign(document_id, expires, secret)?,
        })
    }

    /// Render as an absolute URL under `base_url`
    pub fn to_url(&self, base_url: &str) -> String {
        format!(
            "{}/api/documents/{}/view?expires={}&signature={}",
            base_url.trim_end_matches('/'),
            self.document_id,
            self.expires,
            self.signature
        )
    }

    /// Check signature and expiry
    pub fn verify(&self, secret: &SigningSecret, now: DateTime<Utc>) -> Result<()> {
        let provided = hex::decode(&self.signature)
            .map_err(|_| Error::InvalidSignature("signature is not hex".to_string()))?;
        keyed_mac(self.document_id, self.expires, secret)?
            .verify_slice(&provided)
            .map_err(|_| Error::InvalidSignature("signature mismatch".to_string()))?;
        if now.timestamp() > self.expires {
            return Err(Error::InvalidSignature(format!(
                "link expired {}s ago",
                now.timestamp() - self.expires
            )));
        }
        Ok(())
    }
}
