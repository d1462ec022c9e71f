//! Progress reporting for deployments
//!
//! Every orchestration step narrates what it is doing through a
//! [`ProgressSink`]. Sinks never influence control flow; callers must check the
//! deployment result independently of whatever was recorded.

use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Deployment stages that emit progress events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Conflict,
    ImagePull,
    ImageCheck,
    ContainerConfig,
    PortMapping,
    RestartPolicy,
    VolumeBinding,
    ContainerCreate,
    ContainerStart,
    ContainerStarted,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Conflict => "Conflict",
            Stage::ImagePull => "ImagePull",
            Stage::ImageCheck => "ImageCheck",
            Stage::ContainerConfig => "ContainerConfig",
            Stage::PortMapping => "PortMapping",
            Stage::RestartPolicy => "RestartPolicy",
            Stage::VolumeBinding => "VolumeBinding",
            Stage::ContainerCreate => "ContainerCreate",
            Stage::ContainerStart => "ContainerStart",
            Stage::ContainerStarted => "ContainerStarted",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single narrated step. `stage` is `None` for free-form messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub message: String,
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{}: {}", stage, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Receives progress narration from the deployer
pub trait ProgressSink: Send + Sync {
    fn record(&self, stage: Option<Stage>, message: &str);
}

impl<S: ProgressSink + ?Sized> ProgressSink for &S {
    fn record(&self, stage: Option<Stage>, message: &str) {
        (**self).record(stage, message)
    }
}

/// Forwards every event to both sinks
impl<A: ProgressSink, B: ProgressSink> ProgressSink for (A, B) {
    fn record(&self, stage: Option<Stage>, message: &str) {
        self.0.record(stage, message);
        self.1.record(stage, message);
    }
}

/// Drops everything (quiet mode)
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl ProgressSink for DiscardSink {
    fn record(&self, _stage: Option<Stage>, _message: &str) {}
}

/// Emits each event as a structured `tracing` log line
#[derive(Debug, Clone, Default)]
pub struct TracingSink {
    service: String,
}

impl TracingSink {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl ProgressSink for TracingSink {
    fn record(&self, stage: Option<Stage>, message: &str) {
        let stage = stage.map(|s| s.as_str()).unwrap_or("");
        info!(service = %self.service, stage = %stage, "{}", message);
    }
}

/// Writes `Stage: message` lines with a colored stage label
pub struct TerminalSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl TerminalSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> ProgressSink for TerminalSink<W> {
    fn record(&self, stage: Option<Stage>, message: &str) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        // Terminal output is best effort
        let _ = match stage {
            Some(stage) => writeln!(writer, "{}: {}", stage.as_str().green().bold(), message),
            None => writeln!(writer, "{}", message),
        };
    }
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stages recorded so far, skipping unlabeled messages
    pub fn stages(&self) -> Vec<Stage> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|event| event.stage)
            .collect()
    }

    pub fn into_events(self) -> Vec<ProgressEvent> {
        self.events.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgressSink for RecordingSink {
    fn record(&self, stage: Option<Stage>, message: &str) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ProgressEvent {
                stage,
                message: message.to_string(),
            });
    }
}
