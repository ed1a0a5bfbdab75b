// SPDX-License-Identifier: Apache-2.0

// Telemetry helpers for JSONL logging when the `telemetry` feature is enabled.
// Manually formats JSON to avoid non-deterministic serde_json dependency.

#[cfg(feature = "telemetry")]
fn ts_micros() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros()
}

/// Emits a calendar-resize telemetry event.
///
/// Logs the old and new bucket counts and the queue size as a JSON line
/// to stdout when the `telemetry` feature is enabled. Best-effort: I/O
/// errors are ignored and timestamps fall back to 0 on clock errors.
#[cfg(feature = "telemetry")]
pub fn calendar_resize(old_buckets: usize, new_buckets: usize, queue_size: usize) {
    use std::io::Write as _;
    // Manually format JSON to avoid serde_json dependency
    let mut out = std::io::stdout().lock();
    let _ = write!(
        out,
        r#"{{"timestamp_micros":{},"event":"calendar_resize","old_buckets":{},"new_buckets":{},"queue_size":{}}}"#,
        ts_micros(),
        old_buckets,
        new_buckets,
        queue_size
    );
    let _ = out.write_all(b"\n");
}

/// Emits a causality cache-rebuild telemetry event.
///
/// Logs the entity short name and the network version being cached
/// against. Best-effort, same as the other emitters.
#[cfg(feature = "telemetry")]
pub fn causality_rebuild(entity: &str, version: u64) {
    use std::io::Write as _;
    // Manually format JSON to avoid serde_json dependency
    let mut out = std::io::stdout().lock();
    let _ = write!(
        out,
        r#"{{"timestamp_micros":{},"event":"causality_rebuild","entity":"{}","version":{}}}"#,
        ts_micros(),
        entity,
        version
    );
    let _ = out.write_all(b"\n");
}

/// Emits a match-found telemetry event with the match size.
///
/// Best-effort, same as the other emitters.
#[cfg(feature = "telemetry")]
pub fn match_found(pairs: usize) {
    use std::io::Write as _;
    // Manually format JSON to avoid serde_json dependency
    let mut out = std::io::stdout().lock();
    let _ = write!(
        out,
        r#"{{"timestamp_micros":{},"event":"match_found","pairs":{}}}"#,
        ts_micros(),
        pairs
    );
    let _ = out.write_all(b"\n");
}
