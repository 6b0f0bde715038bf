use monitor_logging::monitor_warn;
use progress_core::{
    EventKind, FailureKind, LogEntry, Phase, PhaseStatus, ProgressMetrics, SessionSnapshot,
    SessionStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Turns successive snapshots of one session into terminal lines, printing
/// each logged event once and the summary line only when it changes.
#[derive(Debug)]
pub struct Printer {
    format: OutputFormat,
    last_summary: Option<String>,
    last_entry: Option<LogEntry>,
    finished: bool,
}

impl Printer {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            last_summary: None,
            last_entry: None,
            finished: false,
        }
    }

    pub fn render(&mut self, snapshot: &SessionSnapshot) -> Vec<String> {
        match self.format {
            OutputFormat::Json => match serde_json::to_string(snapshot) {
                Ok(line) => vec![line],
                Err(err) => {
                    monitor_warn!(session: &snapshot.session_id, "cannot encode snapshot: {}", err);
                    Vec::new()
                }
            },
            OutputFormat::Text => self.render_text(snapshot),
        }
    }

    fn render_text(&mut self, snapshot: &SessionSnapshot) -> Vec<String> {
        let mut lines: Vec<String> = self
            .unseen(&snapshot.log)
            .iter()
            .map(event_line)
            .collect();
        if let Some(last) = snapshot.log.last() {
            self.last_entry = Some(last.clone());
        }

        let summary = summary(snapshot);
        if self.last_summary.as_deref() != Some(summary.as_str()) {
            lines.push(format!("{summary} | {}", timing(&snapshot.metrics)));
            self.last_summary = Some(summary);
        }

        if snapshot.is_terminal() && !self.finished {
            self.finished = true;
            lines.extend(closing_lines(snapshot));
        }
        lines
    }

    /// Entries logged after the last one already printed. If that entry has
    /// been evicted from the bounded log, everything left is new.
    fn unseen<'a>(&self, log: &'a [LogEntry]) -> &'a [LogEntry] {
        let Some(last) = &self.last_entry else {
            return log;
        };
        match log.iter().rposition(|entry| entry == last) {
            Some(index) => &log[index + 1..],
            None => log,
        }
    }
}

fn event_line(entry: &LogEntry) -> String {
    let event = &entry.event;
    let detail = match &event.kind {
        EventKind::PhaseChange => event.phase.as_ref().map(Phase::label),
        EventKind::ItemExamined => event.payload.current_item.clone(),
        EventKind::Error => event.failure_message().map(str::to_string),
        _ => event.payload.message.clone(),
    };
    let stamp = entry.received_at.format("%H:%M:%S");
    match detail {
        Some(detail) => format!("  {stamp} {:<14} {detail}", event.kind.as_str()),
        None => format!("  {stamp} {}", event.kind.as_str()),
    }
}

fn status_label(status: SessionStatus) -> String {
    match status {
        SessionStatus::Connecting => "connecting".to_string(),
        SessionStatus::Active => "active".to_string(),
        SessionStatus::Reconnecting { attempt } => format!("reconnecting #{attempt}"),
        SessionStatus::Completed => "completed".to_string(),
        SessionStatus::Errored => "errored".to_string(),
        SessionStatus::Closed => "closed".to_string(),
    }
}

fn summary(snapshot: &SessionSnapshot) -> String {
    let metrics = &snapshot.metrics;
    let mut parts = vec![format!("[{}]", status_label(snapshot.status))];

    let current = snapshot
        .phases
        .iter()
        .position(|record| record.status == PhaseStatus::Current);
    if let Some(index) = current {
        parts.push(format!(
            "{} ({}/{})",
            snapshot.phases[index].name,
            index + 1,
            snapshot.phases.len()
        ));
    }

    parts.push(format!("{:>3}%", metrics.percentage));
    if metrics.items_total > 0 {
        parts.push(format!(
            "{}/{} items",
            metrics.items_processed, metrics.items_total
        ));
    }
    for (key, value) in &metrics.counters {
        parts.push(format!("{key}={}", format_counter(*value)));
    }
    parts.join(" ")
}

fn timing(metrics: &ProgressMetrics) -> String {
    match metrics.estimated_remaining_ms {
        Some(eta) => format!(
            "elapsed {} eta {}",
            format_clock(metrics.elapsed_ms),
            format_clock(eta)
        ),
        None => format!("elapsed {}", format_clock(metrics.elapsed_ms)),
    }
}

fn closing_lines(snapshot: &SessionSnapshot) -> Vec<String> {
    let mut lines: Vec<String> = snapshot
        .phases
        .iter()
        .map(|record| {
            let mark = match record.status {
                PhaseStatus::Completed => "[x]",
                PhaseStatus::Current => "[>]",
                PhaseStatus::Pending => "[ ]",
            };
            format!("  {mark} {}", record.name)
        })
        .collect();

    match (&snapshot.failure, snapshot.status) {
        (Some(failure), _) => {
            let kind = match failure.kind {
                FailureKind::Job => "job",
                FailureKind::Transport => "transport",
            };
            lines.push(format!("  {kind} failure: {}", failure.message));
        }
        (None, SessionStatus::Completed) => lines.push(format!(
            "  job completed in {}",
            format_clock(snapshot.metrics.elapsed_ms)
        )),
        (None, _) => lines.push("  monitoring stopped".to_string()),
    }
    lines
}

/// `m:ss`, or `h:mm:ss` past the hour.
pub fn format_clock(ms: u64) -> String {
    let secs = ms / 1_000;
    let (hours, minutes, seconds) = (secs / 3_600, secs / 60 % 60, secs % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

fn format_counter(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value:.2}")
    }
}
