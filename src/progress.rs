//! Sync progress reporting.
//!
//! The sync core emits [`SyncProgressEvent`]s and never writes to a display
//! itself. The CLI picks a reporter: human lines or JSON lines on **stderr**
//! (so stdout stays parseable for scripts), or nothing.

use std::io::Write;

/// Remote mutation category currently being applied.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ApplyPhase {
    Deleting,
    Adding,
    Updating,
}

impl ApplyPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyPhase::Deleting => "deleting",
            ApplyPhase::Adding => "adding",
            ApplyPhase::Updating => "updating",
        }
    }
}

/// A single progress event for a sync pass.
#[derive(Clone, Debug)]
pub enum SyncProgressEvent {
    /// The note source is producing a snapshot. Total unknown.
    Extracting,
    /// The change set is known.
    Planned {
        additions: u64,
        updates: u64,
        deletions: u64,
        unchanged: u64,
    },
    /// n items of the current category finished out of total.
    Applying { phase: ApplyPhase, n: u64, total: u64 },
    /// The pass stopped issuing batches after a cancel request.
    Cancelled,
}

/// Receives progress events from the sync core.
pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "sync  adding  12 / 1,204 notes".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Extracting => "sync  extracting notes...\n".to_string(),
            SyncProgressEvent::Planned {
                additions,
                updates,
                deletions,
                unchanged,
            } => format!(
                "sync  planned  {} new, {} changed, {} deleted, {} unchanged\n",
                format_number(*additions),
                format_number(*updates),
                format_number(*deletions),
                format_number(*unchanged)
            ),
            SyncProgressEvent::Applying { phase, n, total } => format!(
                "sync  {}  {} / {} notes\n",
                phase.as_str(),
                format_number(*n),
                format_number(*total)
            ),
            SyncProgressEvent::Cancelled => {
                "sync  cancelled; in-flight notes finished, no new batches issued\n".to_string()
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = match &event {
            SyncProgressEvent::Extracting => serde_json::json!({
                "event": "progress",
                "phase": "extracting"
            }),
            SyncProgressEvent::Planned {
                additions,
                updates,
                deletions,
                unchanged,
            } => serde_json::json!({
                "event": "progress",
                "phase": "planned",
                "additions": additions,
                "updates": updates,
                "deletions": deletions,
                "unchanged": unchanged
            }),
            SyncProgressEvent::Applying { phase, n, total } => serde_json::json!({
                "event": "progress",
                "phase": phase.as_str(),
                "n": n,
                "total": total
            }),
            SyncProgressEvent::Cancelled => serde_json::json!({
                "event": "cancelled"
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

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
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

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
