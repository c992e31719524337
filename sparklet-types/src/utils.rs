use std::time::{SystemTime, UNIX_EPOCH};

use crate::{constants::BDSEQ, Metric};

/// Get the current unix timestamp in milliseconds
pub fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Validate a provided name value
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name string must not be empty".into());
    }
    if name.contains(['+', '/', '#']) {
        return Err(format!(
            "name string {name} cannot contain '+', '/' or '#' characters"
        ));
    }
    Ok(())
}

/// Find the session number carried by the `bdSeq` metric of a birth or death certificate
pub fn bdseq_from_metrics(metrics: &[Metric]) -> Option<u64> {
    metrics
        .iter()
        .find(|m| m.name() == Some(BDSEQ))
        .and_then(|m| m.value.as_ref())
        .and_then(|v| v.as_counter())
}
