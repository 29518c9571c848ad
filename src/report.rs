// Report blob format shared by `save_report` and `load_report`.
//
// A report is a JSON envelope around the caller's value. The tag and version
// let `decode` reject blobs that were not written by `encode`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{DriveError, Result};

pub const FORMAT_TAG: &str = "drive-reports/report";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeOut<'a, T: Serialize> {
    format: &'a str,
    version: u32,
    saved_at: DateTime<Utc>,
    value: &'a T,
}

#[derive(Deserialize)]
struct EnvelopeIn<T> {
    format: String,
    version: u32,
    #[allow(dead_code)]
    saved_at: Option<DateTime<Utc>>,
    value: T,
}

/// Serialize `value` into a report blob.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let envelope = EnvelopeOut {
        format: FORMAT_TAG,
        version: FORMAT_VERSION,
        saved_at: Utc::now(),
        value,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Deserialize a report blob produced by [`encode`].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let envelope: EnvelopeIn<T> = serde_json::from_slice(bytes)
        .map_err(|e| DriveError::MalformedReport(e.to_string()))?;
    if envelope.format != FORMAT_TAG {
        return Err(DriveError::MalformedReport(format!(
            "unexpected format tag '{}'",
            envelope.format
        )));
    }
    if envelope.version != FORMAT_VERSION {
        return Err(DriveError::MalformedReport(format!(
            "unsupported version {}",
            envelope.version
        )));
    }
    Ok(envelope.value)
}
