use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::ElementError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Severe,
}

impl DiagnosticLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticLevel::Info => "info",
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Severe => "severe",
        }
    }
}

/// A non-fatal observation made while building a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub code: &'static str,
    pub message: String,
}

/// Build-scoped collector. Every record goes to the `log` facade, to the optional
/// JSONL sink, and into the list handed back with the document. Counts by code
/// belong to this build only, so builds sharing one sink get their own summary.
pub(crate) struct Diagnostics {
    records: Vec<Diagnostic>,
    counts: BTreeMap<&'static str, u64>,
    sink: Option<DebugLogger>,
    context: String,
}

impl Diagnostics {
    pub fn new(context: impl Into<String>, sink: Option<DebugLogger>) -> Self {
        Self {
            records: Vec::new(),
            counts: BTreeMap::new(),
            sink,
            context: context.into(),
        }
    }

    pub fn info(&mut self, code: &'static str, message: impl Into<String>) {
        self.push(DiagnosticLevel::Info, code, message.into());
    }

    pub fn warn(&mut self, code: &'static str, message: impl Into<String>) {
        self.push(DiagnosticLevel::Warning, code, message.into());
    }

    pub fn severe(&mut self, code: &'static str, message: impl Into<String>) {
        self.push(DiagnosticLevel::Severe, code, message.into());
    }

    pub fn element_dropped(&mut self, err: &ElementError) {
        self.warn("element-dropped", err.to_string());
    }

    fn push(&mut self, level: DiagnosticLevel, code: &'static str, message: String) {
        match level {
            DiagnosticLevel::Info => log::info!("In {}: {}", self.context, message),
            DiagnosticLevel::Warning => log::warn!("In {}: {}", self.context, message),
            DiagnosticLevel::Severe => log::error!("In {}: {}", self.context, message),
        }
        *self.counts.entry(code).or_insert(0) += 1;
        if let Some(sink) = &self.sink {
            sink.diagnostic(&self.context, level, code, &message);
        }
        self.records.push(Diagnostic {
            level,
            code,
            message,
        });
    }

    pub fn finish(self) -> Vec<Diagnostic> {
        if let Some(sink) = &self.sink {
            sink.summary(&self.context, &self.counts);
        }
        self.records
    }
}

/// JSON-lines sink shared by every build of one loader. It only serialises
/// line writes; counting stays with each build.
#[derive(Clone)]
pub(crate) struct DebugLogger {
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }

    pub fn diagnostic(&self, context: &str, level: DiagnosticLevel, code: &str, message: &str) {
        self.write_line(&format!(
            "{{\"type\":\"diagnostic\",\"context\":\"{}\",\"level\":\"{}\",\"code\":\"{}\",\"message\":\"{}\"}}",
            json_escape(context),
            level.as_str(),
            json_escape(code),
            json_escape(message)
        ));
    }

    /// One `build.summary` line with the counts of a single build, then a flush so
    /// the file is complete once the document is returned.
    pub fn summary(&self, context: &str, counts: &BTreeMap<&'static str, u64>) {
        let counts_json = counts
            .iter()
            .map(|(code, n)| format!("\"{}\":{}", json_escape(code), n))
            .collect::<Vec<_>>()
            .join(",");
        self.write_line(&format!(
            "{{\"type\":\"build.summary\",\"context\":\"{}\",\"counts\":{{{}}}}}",
            json_escape(context),
            counts_json
        ));
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }

    fn write_line(&self, line: &str) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{line}");
        }
    }
}

pub(crate) fn json_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "svg_scene_diag_{}_{}.jsonl",
            tag,
            std::process::id()
        ))
    }

    #[test]
    fn escapes_quotes_and_control_chars() {
        assert_eq!(json_escape("a\"b\\c\n"), "a\\\"b\\\\c\\n");
        assert_eq!(json_escape("bell\u{7}"), "bell\\u0007");
    }

    #[test]
    fn records_are_kept_in_order() {
        let mut diags = Diagnostics::new("test", None);
        diags.info("unsupported-element", "first");
        diags.warn("element-dropped", "second");
        let records = diags.finish();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].code, "unsupported-element");
        assert_eq!(records[1].level, DiagnosticLevel::Warning);
    }

    #[test]
    fn sink_writes_lines_and_summary() {
        let path = temp_log_path("sink");
        let logger = DebugLogger::new(&path).expect("create log");
        let mut diags = Diagnostics::new("doc.svg", Some(logger));
        diags.info("unsupported-style", "No support style: filter");
        diags.info("unsupported-style", "No support style: mask");
        diags.finish();

        let text = std::fs::read_to_string(&path).expect("read log");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("\"code\":\"unsupported-style\""));
        assert!(lines[2].contains("\"unsupported-style\":2"));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn interleaved_builds_keep_their_own_summary() {
        let path = temp_log_path("shared");
        let logger = DebugLogger::new(&path).expect("create log");
        let mut a = Diagnostics::new("a.svg", Some(logger.clone()));
        let mut b = Diagnostics::new("b.svg", Some(logger));
        a.info("unsupported-element", "Non supported element: <filter>");
        b.info("unsupported-style", "No support style: 'mask:none'");
        a.info("unsupported-style", "No support style: 'filter:none'");
        b.info("unsupported-style", "No support style: 'clip:auto'");
        a.finish();
        b.finish();

        let text = std::fs::read_to_string(&path).expect("read log");
        let summaries: Vec<&str> = text
            .lines()
            .filter(|line| line.contains("build.summary"))
            .collect();
        assert_eq!(summaries.len(), 2);
        assert!(summaries[0].contains("\"context\":\"a.svg\""));
        assert!(summaries[0].contains("\"counts\":{\"unsupported-element\":1,\"unsupported-style\":1}"));
        assert!(summaries[1].contains("\"context\":\"b.svg\""));
        assert!(summaries[1].contains("\"counts\":{\"unsupported-style\":2}"));
        let _ = std::fs::remove_file(path);
    }
}
