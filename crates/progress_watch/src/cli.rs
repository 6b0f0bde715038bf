use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use progress_core::{JobProfile, Phase, PhaseSpec, SessionConfig};
use progress_engine::{MonitorSettings, SettingsFile};
use url::Url;

use crate::logging::LogDestination;

/// Follow a job's progress event stream until it completes.
#[derive(Debug, Parser)]
#[command(name = "progress_watch", version)]
pub struct Cli {
    /// Event stream URL, e.g. http://localhost:8080/api/progress/<session>
    pub endpoint: String,

    /// Session id; defaults to the last path segment of the endpoint
    #[arg(long)]
    pub session: Option<String>,

    /// Built-in job profile
    #[arg(long, value_enum)]
    pub profile: Option<ProfileArg>,

    /// Custom phase list, in order
    #[arg(long, value_delimiter = ',', conflicts_with = "profile")]
    pub phases: Vec<String>,

    /// RON settings file; a missing file means defaults
    #[arg(long, default_value = "progress_watch.ron")]
    pub config: PathBuf,

    /// Consecutive reconnect attempts before giving up (0 = never give up)
    #[arg(long)]
    pub max_reconnects: Option<u32>,

    /// Treat this many seconds of silence on an open stream as a drop
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Print one JSON snapshot per line instead of text
    #[arg(long)]
    pub json: bool,

    #[arg(long, value_enum, default_value_t = LogDestination::Terminal)]
    pub log: LogDestination,

    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProfileArg {
    Generation,
    Insights,
}

impl ProfileArg {
    fn name(self) -> &'static str {
        match self {
            ProfileArg::Generation => "generation",
            ProfileArg::Insights => "insights",
        }
    }
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        }
    }

    pub fn session_id(&self) -> Result<String> {
        if let Some(id) = &self.session {
            return Ok(id.clone());
        }
        let url = Url::parse(&self.endpoint)
            .with_context(|| format!("invalid endpoint `{}`", self.endpoint))?;
        url.path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("cannot derive a session id from `{}`; pass --session", self.endpoint))
    }

    /// `--phases` wins, then `--profile`, then the settings file.
    pub fn job_profile(&self, file: &SettingsFile) -> Result<JobProfile> {
        let phases: Vec<PhaseSpec> = self
            .phases
            .iter()
            .map(|raw| raw.trim())
            .filter(|raw| !raw.is_empty())
            .map(|raw| PhaseSpec::from(Phase::parse(raw)))
            .collect();
        if !phases.is_empty() {
            return Ok(JobProfile::new("custom", phases));
        }

        let name: &str = self.profile.map_or(file.profile.as_str(), |p| p.name());
        JobProfile::named(name).ok_or_else(|| anyhow!("unknown job profile `{name}`"))
    }

    pub fn session_config(&self, file: &SettingsFile) -> Result<SessionConfig> {
        let mut config = file.session_config(self.session_id()?, self.job_profile(file)?);
        if let Some(max) = self.max_reconnects {
            config.reconnect.max_attempts = (max > 0).then_some(max);
        }
        Ok(config)
    }

    pub fn monitor_settings(&self, file: &SettingsFile) -> MonitorSettings {
        let mut settings = file.monitor_settings();
        if let Some(secs) = self.idle_timeout {
            settings.idle_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        settings
    }
}
