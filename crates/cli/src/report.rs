//! Rendering of the final run report.

use serde::Serialize;

use leap_core::service::ExportItemInfo;
use leap_core::{AssetRecord, AssetStatus, BatchSummary, ExportSummary};

/// Everything printed with `--json`.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub batch: &'a BatchSummary,
    pub records: Vec<&'a AssetRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<&'a ExportSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exported_files: Vec<ExportItemInfo>,
}

/// Human readable size, e.g. `512 B`, `48.2 KB`, `1.50 MB`.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    let value = bytes as f64;
    if value >= MB {
        format!("{:.2} MB", value / MB)
    } else if value >= KB {
        format!("{:.1} KB", value / KB)
    } else {
        format!("{} B", bytes)
    }
}

/// One line per record.
pub fn record_line(record: &AssetRecord) -> String {
    match record.status {
        AssetStatus::Succeeded => {
            let original = record.original_size_bytes.unwrap_or(0);
            let compressed = record.result_size_bytes.unwrap_or(0);
            match record.reduction_percent() {
                Some(reduction) => format!(
                    "{}: {} -> {} (-{:.0}%)",
                    record.display_name,
                    format_size(original),
                    format_size(compressed),
                    reduction.max(0.0)
                ),
                None => format!("{}: {}", record.display_name, format_size(compressed)),
            }
        }
        AssetStatus::Failed => format!(
            "{}: failed: {}",
            record.display_name,
            record.error_message.as_deref().unwrap_or("unknown error")
        ),
        status => format!("{}: {}", record.display_name, status),
    }
}

/// Closing summary line of a batch.
pub fn summary_line(summary: &BatchSummary) -> String {
    format!(
        "{} compressed, {} failed, {} skipped in {:.1}s (limit {})",
        summary.succeeded,
        summary.failed,
        summary.skipped,
        summary.duration_ms as f64 / 1000.0,
        summary.concurrency_limit
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use leap_core::{AssetData, Locator, PreviewHandle};

    fn succeeded(original: u64, compressed: u64) -> AssetRecord {
        AssetRecord::placeholder(Locator::from("/pics/cat.jpg"))
            .hydrated(original, PreviewHandle::new("data:,"))
            .and_then(|r| r.processing())
            .and_then(|r| {
                r.succeeded(original, compressed, AssetData::new(vec![0; compressed as usize]))
            })
            .unwrap()
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024 / 2), "1.50 MB");
    }

    #[test]
    fn test_record_line_succeeded() {
        let line = record_line(&succeeded(4096, 1024));
        assert_eq!(line, "cat.jpg: 4.0 KB -> 1.0 KB (-75%)");
    }

    #[test]
    fn test_record_line_failed() {
        let record = AssetRecord::placeholder(Locator::from("/pics/cat.jpg"))
            .hydration_failed("Failed to load asset")
            .unwrap();
        assert_eq!(record_line(&record), "cat.jpg: failed: Failed to load asset");
    }

    #[test]
    fn test_json_report_skips_binary_fields() {
        let record = succeeded(4096, 16);
        let batch = BatchSummary::default();
        let report = RunReport {
            batch: &batch,
            records: vec![&record],
            export: None,
            exported_files: Vec::new(),
        };

        let json = serde_json::to_value(&report).unwrap();
        let entry = &json["records"][0];
        assert_eq!(entry["status"], "succeeded");
        assert_eq!(entry["result_size_bytes"], 16);
        assert!(entry.get("result").is_none());
        assert!(entry.get("preview").is_none());
        assert!(json.get("export").is_none());
    }
}
