use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use clap::Parser;
use tandoor::{BatchConfig, ConfigError, ExecutorSettings, Precision, ServiceConfig, TaskKind};

/// Batched image generation over HTTP.
///
/// Every option can also be given through the environment variable shown.
#[derive(Debug, Clone, Parser)]
#[command(name = "tandoor-server")]
#[command(version)]
#[command(about = "Batched image generation over HTTP")]
pub struct Settings {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Address to listen on
    #[arg(long, env = "BIND", default_value = "0.0.0.0:7681")]
    pub bind: SocketAddr,

    /// Prefix for the API routes
    #[arg(long, env = "API_PREFIX", default_value = "/api/v1")]
    pub api_prefix: String,

    /// Name reported by the health endpoint
    #[arg(long, env = "PROJECT_NAME", default_value = "tandoor")]
    pub project_name: String,

    /// One of text_to_image, image_to_image, super_resolution
    #[arg(long, env = "TASK", default_value = "text_to_image")]
    pub task: String,

    /// Model identity; empty picks the task default
    #[arg(long, env = "MODEL_NAME", default_value = "")]
    pub model_name: String,

    /// One of fp32, fp16, bf16
    #[arg(long, env = "MODEL_PRECISION", default_value = "fp16")]
    pub model_precision: String,

    /// Sampling steps per generation
    #[arg(long, env = "N_STEPS", default_value_t = 30)]
    pub n_steps: u32,

    /// Batching capacity
    #[arg(long, env = "MAX_BATCH_SIZE", default_value_t = 4)]
    pub max_batch_size: usize,

    /// Longest time in milliseconds the oldest request waits for a fuller batch
    #[arg(long, env = "MAX_WAIT_MS", default_value_t = 200)]
    pub max_wait_ms: u64,

    /// Simulated milliseconds per sampling step of the preview executor
    #[arg(long, env = "PREVIEW_STEP_MS", default_value_t = 5)]
    pub preview_step_ms: u64,

    #[arg(long, env = "USERNAME")]
    pub username: String,

    #[arg(long, env = "PASSWORD")]
    pub password: String,

    /// Directory results are copied to; unset disables storage
    #[arg(long, env = "STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,
}

impl Settings {
    /// Builds and validates the batching service configuration.
    pub fn service_config(&self) -> Result<ServiceConfig, ConfigError> {
        let config = ServiceConfig {
            task: self.task.parse::<TaskKind>()?,
            batching: BatchConfig {
                max_batch_size: self.max_batch_size,
                max_wait: Duration::from_millis(self.max_wait_ms),
            },
            executor: ExecutorSettings {
                model: self.model_name.clone(),
                precision: self.model_precision.parse::<Precision>()?,
                steps: self.n_steps,
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn preview_step(&self) -> Duration {
        Duration::from_millis(self.preview_step_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Settings {
        let mut argv = vec!["tandoor-server", "--username", "u", "--password", "p"];
        argv.extend_from_slice(args);
        Settings::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_build_valid_config() {
        let config = parse(&[]).service_config().unwrap();
        assert_eq!(config.task, TaskKind::TextToImage);
        assert_eq!(config.batching.max_batch_size, 4);
        assert_eq!(config.batching.max_wait, Duration::from_millis(200));
        assert_eq!(config.executor.precision, Precision::Fp16);
    }

    #[test]
    fn test_unknown_task_rejected() {
        let err = parse(&["--task", "inpainting"]).service_config().unwrap_err();
        assert_eq!(err, ConfigError::UnknownTask("inpainting".to_string()));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = parse(&["--max-batch-size", "0"]).service_config().unwrap_err();
        assert_eq!(err, ConfigError::ZeroBatchSize);
    }

    #[test]
    fn test_zero_wait_accepted() {
        let config = parse(&["--max-wait-ms", "0"]).service_config().unwrap();
        assert_eq!(config.batching.max_wait, Duration::ZERO);
    }
}
