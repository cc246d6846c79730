//! Document ingestion progress reporting.
//!
//! [`crate::ingest::DocumentProcessor`] emits an [`IngestEvent`] before the
//! first file, after each file and at the end. Sinks decide what to do with
//! them: the CLI prints to **stderr** (stdout stays parseable for scripts),
//! the HTTP server feeds a [`crate::jobs::JobTracker`].

use std::io::Write;

/// A single ingestion progress event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestEvent {
    /// Inputs resolved; `total` files will be processed.
    Started { total: u64 },
    /// `n` of `total` files done; `file` produced `chunks` chunks.
    Processed {
        file: String,
        n: u64,
        total: u64,
        chunks: u64,
    },
    /// All files indexed.
    Finished { files: u64, chunks: u64 },
}

/// Receives ingestion progress. Called from the ingest pipeline.
pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestEvent);
}

/// Human-friendly progress on stderr: "ingest  3 / 12 files  resume.pdf (4 chunks)".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestEvent) {
        let line = match &event {
            IngestEvent::Started { total } => {
                format!("ingest  {} files queued\n", format_number(*total))
            }
            IngestEvent::Processed {
                file,
                n,
                total,
                chunks,
            } => format!(
                "ingest  {} / {} files  {} ({} chunks)\n",
                format_number(*n),
                format_number(*total),
                file,
                format_number(*chunks)
            ),
            IngestEvent::Finished { files, chunks } => format!(
                "ingest  done: {} files, {} chunks\n",
                format_number(*files),
                format_number(*chunks)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestEvent) {
        let obj = match &event {
            IngestEvent::Started { total } => serde_json::json!({
                "event": "progress",
                "phase": "started",
                "total": total
            }),
            IngestEvent::Processed {
                file,
                n,
                total,
                chunks,
            } => serde_json::json!({
                "event": "progress",
                "phase": "processed",
                "file": file,
                "n": n,
                "total": total,
                "chunks": chunks
            }),
            IngestEvent::Finished { files, chunks } => serde_json::json!({
                "event": "progress",
                "phase": "finished",
                "files": files,
                "chunks": chunks
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
