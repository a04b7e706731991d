//! TM-011: Append-only JSONL provenance event log.

use crate::core::types::{ProvenanceEvent, TimestampedEvent};
use std::io::Write;
use std::path::{Path, PathBuf};

/// ISO 8601 UTC timestamp, second precision.
pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Generate a run ID.
pub fn generate_run_id() -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .unsigned_abs();
    format!("r-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

/// Derive the event log path within the output directory.
pub fn event_log_path(out_dir: &Path) -> PathBuf {
    out_dir.join("events.jsonl")
}

/// Append an event to the output directory's event log.
pub fn append_event(out_dir: &Path, event: ProvenanceEvent) -> Result<(), String> {
    let path = event_log_path(out_dir);
    std::fs::create_dir_all(out_dir).map_err(|e| format!("cannot create output dir: {}", e))?;

    let te = TimestampedEvent {
        ts: now_iso8601(),
        event,
    };
    let json = serde_json::to_string(&te).map_err(|e| format!("JSON serialize error: {}", e))?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("cannot open event log {}: {}", path.display(), e))?;

    writeln!(file, "{}", json).map_err(|e| format!("write error: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tm011_now_iso8601() {
        let ts = now_iso8601();
        assert!(ts.starts_with("20"));
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2026-02-16T14:00:00Z".len());
    }

    #[test]
    fn test_tm011_generate_run_id() {
        let id = generate_run_id();
        assert!(id.starts_with("r-"));
        assert_eq!(id.len(), 14);
    }

    #[test]
    fn test_tm011_event_log_path() {
        assert_eq!(
            event_log_path(Path::new("/out")),
            PathBuf::from("/out/events.jsonl")
        );
    }

    #[test]
    fn test_tm011_append_event() {
        let dir = tempfile::tempdir().unwrap();
        let event = ProvenanceEvent::SynthStarted {
            stack: "TempMonitorStack".to_string(),
            run_id: "r-abc".to_string(),
            tempmon_version: "0.1.0".to_string(),
        };
        append_event(dir.path(), event).unwrap();

        let content = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        assert!(content.contains("synth_started"));
        assert!(content.contains("r-abc"));
    }

    #[test]
    fn test_tm011_append_multiple_parse_back() {
        let dir = tempfile::tempdir().unwrap();
        for id in ["TemperatureDatastore", "TemperatureTable", "TemperatureRule"] {
            let event = ProvenanceEvent::ResourceDeclared {
                stack: "s".to_string(),
                resource: id.to_string(),
                resource_type: "AWS::Timestream::Table".to_string(),
                hash: "blake3:xxx".to_string(),
            };
            append_event(dir.path(), event).unwrap();
        }
        let content = std::fs::read_to_string(event_log_path(dir.path())).unwrap();
        let events: Vec<TimestampedEvent> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[1].event,
            ProvenanceEvent::ResourceDeclared { resource, .. } if resource == "TemperatureTable"
        ));
    }
}
