//! Process-wide service configuration.
//!
//! Configuration is read once at startup and never changes afterwards. Every
//! value is checked by [`ServiceConfig::validate`] before the runner is started,
//! so a bad setting stops the process instead of failing the first request.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::ConfigError;
use crate::input::InputField;

/// The generation pipeline a service instance is dedicated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    TextToImage,
    ImageToImage,
    SuperResolution,
}

impl TaskKind {
    /// Inputs every request must carry, in the order batch columns are built.
    pub fn required_inputs(&self) -> &'static [InputField] {
        match self {
            TaskKind::TextToImage => &[InputField::Prompt],
            TaskKind::ImageToImage | TaskKind::SuperResolution => &[InputField::Image, InputField::Prompt],
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            TaskKind::TextToImage | TaskKind::ImageToImage => "stabilityai/stable-diffusion-2-1-base",
            TaskKind::SuperResolution => "stabilityai/stable-diffusion-x4-upscaler",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::TextToImage => "text_to_image",
            TaskKind::ImageToImage => "image_to_image",
            TaskKind::SuperResolution => "super_resolution",
        }
    }
}

impl Display for TaskKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text_to_image" => Ok(TaskKind::TextToImage),
            "image_to_image" => Ok(TaskKind::ImageToImage),
            "super_resolution" => Ok(TaskKind::SuperResolution),
            other => Err(ConfigError::UnknownTask(other.to_string())),
        }
    }
}

/// Numeric precision the executor runs the model at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    #[default]
    Fp32,
    Fp16,
    Bf16,
}

impl FromStr for Precision {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fp32" => Ok(Precision::Fp32),
            "fp16" => Ok(Precision::Fp16),
            "bf16" => Ok(Precision::Bf16),
            other => Err(ConfigError::UnknownPrecision(other.to_string())),
        }
    }
}

/// Size/latency policy for batch formation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Batching capacity. Reaching it dispatches immediately.
    pub max_batch_size: usize,

    /// Longest time the oldest queued task waits before a partial batch is
    /// dispatched. Zero dispatches every task as soon as it arrives.
    #[serde(with = "millis")]
    pub max_wait: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 4,
            max_wait: Duration::from_millis(100),
        }
    }
}

/// Parameters handed through to the executor untouched by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Model identity. Empty selects the task's default model.
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub precision: Precision,
    /// Sampling steps per generation.
    pub steps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub task: TaskKind,
    pub batching: BatchConfig,
    pub executor: ExecutorSettings,
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batching.max_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.executor.steps == 0 {
            return Err(ConfigError::ZeroSteps);
        }
        Ok(())
    }

    /// The configured model, falling back to the task default.
    pub fn model(&self) -> &str {
        if self.executor.model.is_empty() {
            self.task.default_model()
        } else {
            &self.executor.model
        }
    }
}

mod millis {
    use std::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
