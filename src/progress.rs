//! Run progress reporting.
//!
//! Reports observable progress during `triage run` so users see which page
//! is being fetched, which issue is being analyzed, and when checkpoints
//! land. Progress is emitted on **stderr** so stdout remains parseable for
//! scripts. Structured `tracing` events are emitted independently of this.

use std::io::Write;

/// A single progress event for a batch run.
#[derive(Clone, Debug, PartialEq)]
pub enum RunProgressEvent {
    /// Listing the issue corpus. Total unknown.
    Fetching { page: u32, fetched: u64 },
    /// Analyzing issue `number`, the `n`-th of `total` targets.
    Analyzing {
        batch: usize,
        number: u64,
        n: u64,
        total: u64,
    },
    /// An issue was recorded as a gap.
    Skipped { number: u64, reason: String },
    /// Batch `batch` was checkpointed.
    Checkpoint { batch: usize, completed: u64, total: u64 },
    /// The run reached a terminal phase.
    Finished {
        phase: String,
        analyzed: u64,
        skipped: u64,
    },
}

/// Reports run progress. Implementations write to stderr (human or JSON).
pub trait RunProgressReporter: Send + Sync {
    fn report(&self, event: RunProgressEvent);
}

/// Human-friendly progress on stderr: "analyze  batch 3  #1234  12 / 340 issues".
pub struct StderrProgress;

impl RunProgressReporter for StderrProgress {
    fn report(&self, event: RunProgressEvent) {
        let line = match &event {
            RunProgressEvent::Fetching { page, fetched } => {
                format!("fetch    page {}  {} issues so far\n", page, format_number(*fetched))
            }
            RunProgressEvent::Analyzing {
                batch,
                number,
                n,
                total,
            } => format!(
                "analyze  batch {}  #{}  {} / {} issues\n",
                batch + 1,
                number,
                format_number(*n),
                format_number(*total)
            ),
            RunProgressEvent::Skipped { number, reason } => {
                format!("skip     #{}  {}\n", number, reason)
            }
            RunProgressEvent::Checkpoint {
                batch,
                completed,
                total,
            } => format!(
                "saved    batch {}  {} / {} issues\n",
                batch + 1,
                format_number(*completed),
                format_number(*total)
            ),
            RunProgressEvent::Finished {
                phase,
                analyzed,
                skipped,
            } => format!(
                "{}  {} analyzed, {} skipped\n",
                phase,
                format_number(*analyzed),
                format_number(*skipped)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl RunProgressReporter for JsonProgress {
    fn report(&self, event: RunProgressEvent) {
        let obj = match &event {
            RunProgressEvent::Fetching { page, fetched } => serde_json::json!({
                "event": "progress",
                "phase": "fetching",
                "page": page,
                "fetched": fetched
            }),
            RunProgressEvent::Analyzing {
                batch,
                number,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "phase": "analyzing",
                "batch": batch,
                "issue": number,
                "n": n,
                "total": total
            }),
            RunProgressEvent::Skipped { number, reason } => serde_json::json!({
                "event": "skipped",
                "issue": number,
                "reason": reason
            }),
            RunProgressEvent::Checkpoint {
                batch,
                completed,
                total,
            } => serde_json::json!({
                "event": "checkpoint",
                "batch": batch,
                "completed": completed,
                "total": total
            }),
            RunProgressEvent::Finished {
                phase,
                analyzed,
                skipped,
            } => serde_json::json!({
                "event": "finished",
                "phase": phase,
                "analyzed": analyzed,
                "skipped": skipped
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl RunProgressReporter for NoProgress {
    fn report(&self, _event: RunProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
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

    pub fn reporter(&self) -> Box<dyn RunProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
