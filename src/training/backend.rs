//! Training backends.
//!
//! The job stages data and validates hyperparameters; fitting the model is
//! delegated to a [`Trainer`]. [`LightGbmCli`] drives the `lightgbm`
//! command-line executable through a generated config file.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use super::params::HyperParameters;

/// Everything a backend needs to fit and save one model.
#[derive(Debug, Clone, Copy)]
pub struct TrainRequest<'a> {
    /// Training CSV with a header row.
    pub train: &'a Path,
    /// Validation CSV with the same header.
    pub validation: &'a Path,
    /// Zero-based index of the label column.
    pub label_column: usize,
    pub params: &'a HyperParameters,
    /// Where the model must be written.
    pub output_model: &'a Path,
    /// Scratch directory the backend may write into.
    pub work_dir: &'a Path,
}

#[derive(Debug, thiserror::Error)]
pub enum TrainerError {
    #[error("cannot write {path}: {source}")]
    WriteConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

pub trait Trainer {
    fn train(&self, request: &TrainRequest<'_>) -> Result<(), TrainerError>;
}

/// Runs `lightgbm config=<work_dir>/train.conf`.
#[derive(Debug, Clone)]
pub struct LightGbmCli {
    executable: PathBuf,
}

impl Default for LightGbmCli {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("lightgbm"),
        }
    }
}

impl LightGbmCli {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Render the LightGBM config file for `request`.
    pub fn render_config(request: &TrainRequest<'_>) -> String {
        let mut conf = String::new();
        let mut line = |key: &str, value: &dyn std::fmt::Display| {
            // Writing into a String cannot fail.
            let _ = writeln!(conf, "{key}={value}");
        };

        line("task", &"train");
        line("data", &request.train.display());
        line("valid", &request.validation.display());
        line("header", &true);
        line("label_column", &request.label_column);
        line("output_model", &request.output_model.display());
        for (key, value) in request.params.to_lightgbm_params() {
            line(key, &value);
        }
        conf
    }
}

impl Trainer for LightGbmCli {
    fn train(&self, request: &TrainRequest<'_>) -> Result<(), TrainerError> {
        let conf_path = request.work_dir.join("train.conf");
        std::fs::write(&conf_path, Self::render_config(request)).map_err(|source| {
            TrainerError::WriteConfig {
                path: conf_path.clone(),
                source,
            }
        })?;

        let program = self.executable.display().to_string();
        tracing::info!(%program, config = %conf_path.display(), "running lightgbm");

        let output = Command::new(&self.executable)
            .arg(format!("config={}", conf_path.display()))
            .current_dir(request.work_dir)
            .output()
            .map_err(|source| TrainerError::Spawn {
                program: program.clone(),
                source,
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::info!(target: "lightgbm", "{line}");
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        for line in stderr.lines() {
            tracing::warn!(target: "lightgbm", "{line}");
        }

        if !output.status.success() {
            return Err(TrainerError::Failed {
                program,
                status: output.status,
                stderr,
            });
        }
        Ok(())
    }
}
