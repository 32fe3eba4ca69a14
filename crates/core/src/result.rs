//! Result record holding the rendered artifacts of a completed job.

use serde::{Deserialize, Serialize};

use crate::job::{result_url_for, RESULT_TTL_SECS};
use crate::types::{JobId, UnixTimestamp};

/// Durable result document, stored in the `results` collection.
///
/// Artifact bytes are base64-encoded inside the JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: JobId,
    pub result_url: String,
    #[serde(with = "base64_bytes")]
    pub pdf_data: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub html_data: Vec<u8>,
    pub created_at: UnixTimestamp,
    pub expires_at: UnixTimestamp,
}

impl ResultRecord {
    pub fn new(job_id: &str, pdf_data: Vec<u8>, html_data: Vec<u8>, now: UnixTimestamp) -> Self {
        Self {
            id: job_id.to_string(),
            result_url: result_url_for(job_id),
            pdf_data,
            html_data,
            created_at: now,
            expires_at: now + RESULT_TTL_SECS,
        }
    }

    pub fn is_expired(&self, now: UnixTimestamp) -> bool {
        self.expires_at > 0 && now > self.expires_at
    }
}

/// Serde adapter storing `Vec<u8>` as a standard base64 string.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
