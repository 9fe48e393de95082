use crate::compare::Classification;
use crate::errors::ErrorKind;
use chrono::{DateTime, Local, SecondsFormat};
use std::fmt;
use std::time::{Duration, Instant};

const RULE: &str = "##############################";

/// What happened to a single candidate, as reported to the statistics owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateOutcome {
    /// `None` when the candidate was never classified (force mode, or a
    /// failure before classification finished).
    pub classification: Option<Classification>,
    pub failure: Option<ErrorKind>,
}

impl CandidateOutcome {
    pub fn classified(classification: Classification) -> Self {
        Self {
            classification: Some(classification),
            failure: None,
        }
    }

    pub fn forced() -> Self {
        Self {
            classification: None,
            failure: None,
        }
    }

    pub fn failed(kind: ErrorKind) -> Self {
        Self {
            classification: None,
            failure: Some(kind),
        }
    }

    pub fn with_failure(mut self, kind: ErrorKind) -> Self {
        self.failure = Some(kind);
        self
    }
}

/// Counters and timing for one invocation.
#[derive(Debug, Clone)]
pub struct RunStatistics {
    pub start: DateTime<Local>,
    pub end: Option<DateTime<Local>>,
    pub duration: Duration,
    pub file_count: u64,
    pub new: u64,
    pub changed: u64,
    pub failed: u64,
    pub interrupted: bool,
    started: Instant,
}

impl RunStatistics {
    pub fn start() -> Self {
        Self {
            start: Local::now(),
            end: None,
            duration: Duration::ZERO,
            file_count: 0,
            new: 0,
            changed: 0,
            failed: 0,
            interrupted: false,
            started: Instant::now(),
        }
    }

    pub fn record(&mut self, outcome: CandidateOutcome) {
        self.file_count += 1;
        match outcome.classification {
            Some(Classification::New) => self.new += 1,
            Some(Classification::Changed) => self.changed += 1,
            Some(Classification::Unchanged) | None => {}
        }
        if outcome.failure.is_some() {
            self.failed += 1;
        }
    }

    pub fn finish(&mut self) {
        self.end = Some(Local::now());
        self.duration = self.started.elapsed();
    }

    /// Everything that was neither uploaded as new nor as changed. Failed
    /// and force-uploaded candidates land here too.
    pub fn skipped(&self) -> u64 {
        self.file_count.saturating_sub(self.new + self.changed)
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

fn timestamp(ts: &DateTime<Local>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.end.unwrap_or(self.start);
        writeln!(f, "{RULE}")?;
        writeln!(f, "Start Time: {}", timestamp(&self.start))?;
        writeln!(f, "  End Time: {}", timestamp(&end))?;
        writeln!(f, "  Duration: {:.3?}", self.duration)?;
        writeln!(f)?;
        writeln!(f, "  Total File Count: {}", self.file_count)?;
        writeln!(f, "    Uploaded (New): {}", self.new)?;
        writeln!(f, "Uploaded (Changed): {}", self.changed)?;
        writeln!(f, "           Skipped: {}", self.skipped())?;
        if self.failed > 0 {
            writeln!(f, "            Failed: {}", self.failed)?;
        }
        if self.interrupted {
            writeln!(f, "       Interrupted: yes")?;
        }
        write!(f, "{RULE}")
    }
}
