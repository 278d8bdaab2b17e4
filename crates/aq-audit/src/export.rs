//! Audit Export
//!
//! Renders an already-resolved sequence of audit events as CSV or JSON.
//! Output is produced chunk by chunk (one CSV row or one JSON element per
//! chunk) so a large export never needs a second, encoded copy in memory.

use std::io::Write;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{NaiveDate, SecondsFormat};
use csv::{Terminator, Writer, WriterBuilder};
use futures::stream::{self, BoxStream};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::entity::AuditEvent;
use crate::shared::error::AuditError;

/// Fixed CSV column order
pub const CSV_HEADER: [&str; 15] = [
    "ID",
    "Tenant ID",
    "User ID",
    "User Email",
    "Category",
    "Event Type",
    "Action",
    "Resource Type",
    "Resource ID",
    "Resource Name",
    "IP Address",
    "Severity",
    "Status",
    "Error Message",
    "Created At",
];

/// Supported export encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    /// `audit-export-<YYYY-MM-DD>.<ext>`
    pub fn filename(&self, date: NaiveDate) -> String {
        format!("audit-export-{}.{}", date.format("%Y-%m-%d"), self.extension())
    }

    pub fn content_disposition(&self, date: NaiveDate) -> String {
        format!("attachment; filename=\"{}\"", self.filename(date))
    }
}

impl FromStr for ExportFormat {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(AuditError::validation(format!(
                "Unsupported export format '{}': expected json or csv",
                other
            ))),
        }
    }
}

/// Encoding failure while rendering an export chunk
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV buffer error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExportChunk = Result<Bytes, ExportError>;

/// Chunked rendering of a resolved event sequence
pub struct Export {
    format: ExportFormat,
    chunks: Box<dyn Iterator<Item = ExportChunk> + Send>,
}

impl Export {
    pub fn new(format: ExportFormat, events: Vec<AuditEvent>) -> Self {
        let chunks: Box<dyn Iterator<Item = ExportChunk> + Send> = match format {
            ExportFormat::Csv => Box::new(CsvChunks::new(events)),
            ExportFormat::Json => Box::new(json_chunks(events)),
        };
        Self { format, chunks }
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }

    pub fn into_stream(self) -> BoxStream<'static, ExportChunk> {
        Box::pin(stream::iter(self.chunks))
    }

    /// Render the whole export into one buffer
    pub fn into_bytes(self) -> Result<Vec<u8>, ExportError> {
        let mut out = Vec::new();
        for chunk in self.chunks {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }
}

/// Header record, then one record per event, each flushed as its own chunk
struct CsvChunks {
    builder: WriterBuilder,
    buf: Vec<u8>,
    header_pending: bool,
    events: std::vec::IntoIter<AuditEvent>,
}

impl CsvChunks {
    fn new(events: Vec<AuditEvent>) -> Self {
        let mut builder = WriterBuilder::new();
        builder
            .terminator(Terminator::Any(b'\n'))
            .buffer_capacity(1024);

        Self {
            builder,
            buf: Vec::with_capacity(512),
            header_pending: true,
            events: events.into_iter(),
        }
    }

    fn record<F>(&mut self, write: F) -> ExportChunk
    where
        F: FnOnce(&mut Writer<Vec<u8>>) -> csv::Result<()>,
    {
        let mut writer = self.builder.from_writer(std::mem::take(&mut self.buf));
        write(&mut writer)?;
        let mut buf = writer.into_inner().map_err(|e| e.into_error())?;

        let chunk = Bytes::copy_from_slice(&buf);
        buf.clear();
        self.buf = buf;
        Ok(chunk)
    }
}

impl Iterator for CsvChunks {
    type Item = ExportChunk;

    fn next(&mut self) -> Option<ExportChunk> {
        if self.header_pending {
            self.header_pending = false;
            return Some(self.record(|w| w.write_record(CSV_HEADER)));
        }

        let event = self.events.next()?;
        Some(self.record(|w| write_csv_row(w, &event)))
    }
}

fn json_chunks(events: Vec<AuditEvent>) -> impl Iterator<Item = ExportChunk> + Send {
    let elements = events.into_iter().enumerate().map(|(i, event)| -> ExportChunk {
        let mut buf = Vec::with_capacity(512);
        if i > 0 {
            buf.push(b',');
        }
        serde_json::to_writer(&mut buf, &event)?;
        Ok(Bytes::from(buf))
    });

    std::iter::once(Ok(Bytes::from_static(b"[")))
        .chain(elements)
        .chain(std::iter::once(Ok(Bytes::from_static(b"]"))))
}

/// Write one event in [`CSV_HEADER`] order
pub fn write_csv_row<W: Write>(writer: &mut Writer<W>, event: &AuditEvent) -> csv::Result<()> {
    let created_at = event.created_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    writer.write_record([
        event.id.as_str(),
        event.tenant_id.as_str(),
        or_empty(&event.user_id),
        or_empty(&event.user_email),
        event.category.as_str(),
        event.event_type.as_str(),
        event.action.as_str(),
        or_empty(&event.resource_type),
        or_empty(&event.resource_id),
        or_empty(&event.resource_name),
        event.ip_address.as_str(),
        event.severity.as_str(),
        event.status.as_str(),
        or_empty(&event.error_message),
        created_at.as_str(),
    ])
}

fn or_empty(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{AuditCategory, AuditSeverity};
    use chrono::{TimeZone, Utc};

    fn event(id: &str) -> AuditEvent {
        AuditEvent::new("tenant-1", AuditCategory::DataAccess, "read", "viewed report")
            .with_id(id)
            .with_user("u-1", "ana@example.com")
            .with_ip_address("10.0.0.1")
            .with_created_at(Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap())
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!(" CSV ".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!(matches!(
            "xml".parse::<ExportFormat>(),
            Err(AuditError::Validation { .. })
        ));
        assert!("".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_filename_and_content_type() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 9).unwrap();
        assert_eq!(ExportFormat::Csv.filename(date), "audit-export-2024-07-09.csv");
        assert_eq!(ExportFormat::Json.filename(date), "audit-export-2024-07-09.json");
        assert_eq!(ExportFormat::Csv.content_type(), "text/csv");
        assert_eq!(
            ExportFormat::Json.content_disposition(date),
            "attachment; filename=\"audit-export-2024-07-09.json\""
        );
    }

    #[test]
    fn test_csv_quotes_embedded_quotes_and_newlines() {
        let events = vec![
            event("q").with_resource("note", "n-1", Some("say \"hi\"".to_string())),
            event("n").with_error("line\nbreak"),
        ];
        let out = Export::new(ExportFormat::Csv, events).into_bytes().unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains(",\"say \"\"hi\"\"\",10.0.0.1,"));
        assert!(text.contains(",failure,\"line\nbreak\",2024-02-03T04:05:06Z\n"));
        assert!(!text.contains('\r'));
    }

    #[test]
    fn test_csv_emits_one_chunk_per_record() {
        let mut chunks = CsvChunks::new(vec![event("e1"), event("e2")]);
        let header = chunks.next().unwrap().unwrap();
        assert!(header.starts_with(b"ID,Tenant ID,"));
        assert!(header.ends_with(b"Created At\n"));

        let first = chunks.next().unwrap().unwrap();
        let second = chunks.next().unwrap().unwrap();
        assert!(first.starts_with(b"e1,"));
        assert!(second.starts_with(b"e2,"));
        assert_eq!(first.iter().filter(|b| **b == b'\n').count(), 1);
        assert!(chunks.next().is_none());
    }

    #[test]
    fn test_csv_header_only_for_empty_input() {
        let out = Export::new(ExportFormat::Csv, vec![]).into_bytes().unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert_eq!(text.trim_end().split(',').count(), 15);
        assert!(text.starts_with("ID,Tenant ID,User ID,"));
    }

    #[test]
    fn test_csv_row_count_and_columns() {
        let events = vec![event("e1"), event("e2"), event("e3")];
        let out = Export::new(ExportFormat::Csv, events).into_bytes().unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[1],
            concat!(
                "e1,tenant-1,u-1,ana@example.com,data_access,read,viewed report,",
                ",,,10.0.0.1,info,success,,2024-02-03T04:05:06Z"
            )
        );
    }

    #[test]
    fn test_csv_quotes_error_message_with_comma() {
        let events = vec![
            event("ok"),
            event("bad")
                .with_severity(AuditSeverity::Error)
                .with_error("timeout, retry later"),
        ];
        let out = Export::new(ExportFormat::Csv, events).into_bytes().unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains(",failure,\"timeout, retry later\",2024-02-03T04:05:06Z\n"));
    }

    #[test]
    fn test_json_round_trip_preserves_order() {
        let events = vec![
            event("z").with_details(serde_json::json!({"k": [1, 2]})),
            event("a"),
            event("m").with_resource("report", "r-9", Some("Q1, final".to_string())),
        ];
        let out = Export::new(ExportFormat::Json, events.clone()).into_bytes().unwrap();
        let decoded: Vec<AuditEvent> = serde_json::from_slice(&out).unwrap();
        assert_eq!(decoded, events);
    }

    #[test]
    fn test_json_empty_array() {
        let out = Export::new(ExportFormat::Json, vec![]).into_bytes().unwrap();
        assert_eq!(out, b"[]");
    }

    #[tokio::test]
    async fn test_stream_yields_one_chunk_per_row() {
        use futures::StreamExt;

        let export = Export::new(ExportFormat::Csv, vec![event("e1"), event("e2")]);
        let chunks: Vec<ExportChunk> = export.into_stream().collect().await;
        assert_eq!(chunks.len(), 3);
    }
}
