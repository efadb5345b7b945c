//! A stand-in executor that renders placeholder images.
//!
//! Each task gets a small gradient whose colours are derived from a SHA-256 of
//! its inputs, so identical requests render identical images. Runtime scales
//! with the configured step count the way a diffusion pipeline's does.

use std::time::Duration;
use sha2::{Digest, Sha256};
use tandoor::{Batch, Executor, ExecutorError, ExecutorSettings, InputValue};

const SIDE: usize = 64;

/// An encoded image and its media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
}

impl Rendered {
    pub fn extension(&self) -> &'static str {
        match self.media_type {
            "image/png" => "png",
            "image/jpeg" => "jpg",
            _ => "ppm",
        }
    }
}

pub struct PreviewExecutor {
    settings: ExecutorSettings,
    step_cost: Duration,
}

impl PreviewExecutor {
    pub fn new(settings: ExecutorSettings, step_cost: Duration) -> Self {
        Self { settings, step_cost }
    }

    fn render(&self, seed: &[u8; 32]) -> Rendered {
        let header = format!("P6\n{SIDE} {SIDE}\n255\n");
        let mut bytes = Vec::with_capacity(header.len() + SIDE * SIDE * 3);
        bytes.extend_from_slice(header.as_bytes());
        let (from, to) = (&seed[..3], &seed[3..6]);
        for y in 0..SIDE {
            for x in 0..SIDE {
                let t = (x + y) * 255 / (2 * (SIDE - 1));
                for channel in 0..3 {
                    let (a, b) = (from[channel] as usize, to[channel] as usize);
                    bytes.push(((a * (255 - t) + b * t) / 255) as u8);
                }
            }
        }
        Rendered {
            bytes,
            media_type: "image/x-portable-pixmap",
        }
    }
}

impl Executor for PreviewExecutor {
    type Output = Rendered;

    fn execute(&self, batch: Batch, samples_per_task: usize) -> Result<Vec<Rendered>, ExecutorError> {
        if samples_per_task != 1 {
            return Err(ExecutorError::new(format!(
                "preview renders one sample per task, asked for {samples_per_task}"
            )));
        }

        // one pass over the whole batch per step
        std::thread::sleep(self.step_cost * self.settings.steps);

        (0..batch.len())
            .map(|idx| {
                let row = batch.row(idx).ok_or_else(|| ExecutorError::new(format!("row {idx} missing")))?;
                let mut hasher = Sha256::new();
                hasher.update(self.settings.model.as_bytes());
                for (field, value) in row {
                    hasher.update(field.as_str().as_bytes());
                    match value {
                        InputValue::Text(text) => hasher.update(text.as_bytes()),
                        InputValue::Image(bytes) => hasher.update(bytes),
                    }
                }
                let seed: [u8; 32] = hasher.finalize().into();
                Ok(self.render(&seed))
            })
            .collect()
    }
}
