//! The training job entry point.
//!
//! Reads hyperparameters and channel data from the platform's directory
//! layout, stages each channel into a single CSV, delegates fitting to a
//! [`Trainer`] and checks that the model file was written. Failures are
//! reported through `output/failure`, which the platform surfaces as the
//! job's failure reason.

use std::error::Error as _;
use std::fmt::Write as _;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::backend::{TrainRequest, Trainer, TrainerError};
use super::params::{HyperParameterError, HyperParameters};

pub const TRAIN_CHANNEL: &str = "train";
pub const VALIDATION_CHANNEL: &str = "validation";
pub const MODEL_FILE_NAME: &str = "lightgbm-regression-model.txt";
pub const DEFAULT_PREFIX: &str = "/opt/ml";

#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error(transparent)]
    HyperParameters(#[from] HyperParameterError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "There are no files in {path}.\nThis usually indicates that the channel ({channel}) was \
         incorrectly specified,\nthe data specification in S3 was incorrectly specified or the \
         role specified\ndoes not have permission to access the data."
    )]
    EmptyChannel { channel: String, path: PathBuf },

    #[error("{path}: no data rows")]
    NoRows { path: PathBuf },

    #[error("{path}: header {found:?} does not match {expected:?}")]
    HeaderMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("{path}:{line}: expected {expected} fields, got {actual}")]
    RaggedRow {
        path: PathBuf,
        line: usize,
        expected: usize,
        actual: usize,
    },

    #[error("channel {channel} has {columns} column(s); need features and a label")]
    TooFewColumns { channel: String, columns: usize },

    #[error(transparent)]
    Trainer(#[from] TrainerError),

    #[error("trainer finished but did not write {0}")]
    ModelNotWritten(PathBuf),
}

impl TrainingError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| TrainingError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Directory layout of a training container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    prefix: PathBuf,
}

impl Default for JobPaths {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl JobPaths {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn channel_dir(&self, channel: &str) -> PathBuf {
        self.prefix.join("input/data").join(channel)
    }

    pub fn hyperparameters_file(&self) -> PathBuf {
        self.prefix.join("input/config/hyperparameters.json")
    }

    pub fn model_dir(&self) -> PathBuf {
        self.prefix.join("model")
    }

    pub fn model_file(&self) -> PathBuf {
        self.model_dir().join(MODEL_FILE_NAME)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.prefix.join("output")
    }

    pub fn failure_file(&self) -> PathBuf {
        self.output_dir().join("failure")
    }
}

/// The input files of one data channel.
#[derive(Debug, Clone)]
pub struct Channel {
    pub name: String,
    pub files: Vec<PathBuf>,
}

impl Channel {
    /// Every regular file in `dir`, sorted by name.
    pub fn resolve(name: &str, dir: &Path) -> Result<Self, TrainingError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).map_err(TrainingError::io(dir))? {
            let entry = entry.map_err(TrainingError::io(dir))?;
            let path = entry.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(TrainingError::EmptyChannel {
                channel: name.to_string(),
                path: dir.to_path_buf(),
            });
        }
        tracing::info!(channel = name, files = ?files, "found channel files");
        Ok(Self {
            name: name.to_string(),
            files,
        })
    }
}

/// A channel concatenated into one CSV file.
#[derive(Debug, Clone)]
pub struct StagedDataset {
    pub path: PathBuf,
    pub header: Vec<String>,
    pub n_rows: usize,
}

impl StagedDataset {
    pub fn n_columns(&self) -> usize {
        self.header.len()
    }

    /// The label is the last column.
    pub fn label_column(&self) -> usize {
        self.n_columns().saturating_sub(1)
    }
}

fn split_fields(line: &str) -> Vec<String> {
    line.split(',').map(|f| f.trim().to_string()).collect()
}

/// Concatenate the files of `channel` into `dest`.
///
/// Each file starts with a header row; all headers must agree. Blank lines
/// are dropped and every data row must be as wide as the header.
pub fn stage_channel(channel: &Channel, dest: &Path) -> Result<StagedDataset, TrainingError> {
    let out = fs::File::create(dest).map_err(TrainingError::io(dest))?;
    let mut out = BufWriter::new(out);
    let mut header: Option<Vec<String>> = None;
    let mut n_rows = 0;

    for file in &channel.files {
        let content = fs::read_to_string(file).map_err(TrainingError::io(file))?;
        let mut lines = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let Some((_, first)) = lines.next() else {
            continue;
        };
        let file_header = split_fields(first);
        if let Some(expected) = &header {
            if *expected != file_header {
                return Err(TrainingError::HeaderMismatch {
                    path: file.clone(),
                    expected: expected.clone(),
                    found: file_header,
                });
            }
        } else {
            writeln!(out, "{}", file_header.join(",")).map_err(TrainingError::io(dest))?;
            header = Some(file_header);
        }
        let width = header.as_ref().map_or(0, Vec::len);

        for (idx, line) in lines {
            let actual = line.split(',').count();
            if actual != width {
                return Err(TrainingError::RaggedRow {
                    path: file.clone(),
                    line: idx + 1,
                    expected: width,
                    actual,
                });
            }
            writeln!(out, "{}", line.trim_end()).map_err(TrainingError::io(dest))?;
            n_rows += 1;
        }
    }
    out.flush().map_err(TrainingError::io(dest))?;

    let header = header.unwrap_or_default();
    if header.len() < 2 {
        return Err(TrainingError::TooFewColumns {
            channel: channel.name.clone(),
            columns: header.len(),
        });
    }
    if n_rows == 0 {
        return Err(TrainingError::NoRows {
            path: dest.to_path_buf(),
        });
    }

    tracing::info!(channel = %channel.name, rows = n_rows, columns = header.len(), "staged channel");
    Ok(StagedDataset {
        path: dest.to_path_buf(),
        header,
        n_rows,
    })
}

/// One run of the training container.
#[derive(Debug, Clone)]
pub struct TrainingJob<T> {
    paths: JobPaths,
    trainer: T,
}

impl<T: Trainer> TrainingJob<T> {
    pub fn new(paths: JobPaths, trainer: T) -> Self {
        Self { paths, trainer }
    }

    pub fn paths(&self) -> &JobPaths {
        &self.paths
    }

    pub fn trainer(&self) -> &T {
        &self.trainer
    }

    /// Train and save the model, returning its path.
    pub fn run(&self) -> Result<PathBuf, TrainingError> {
        tracing::info!(prefix = %self.paths.prefix().display(), "starting training");

        let params_path = self.paths.hyperparameters_file();
        let params = HyperParameters::from_file(&params_path)?;
        tracing::info!(path = %params_path.display(), ?params, "read hyperparameters");

        let train = Channel::resolve(TRAIN_CHANNEL, &self.paths.channel_dir(TRAIN_CHANNEL))?;
        let validation =
            Channel::resolve(VALIDATION_CHANNEL, &self.paths.channel_dir(VALIDATION_CHANNEL))?;

        let staging = tempfile::tempdir().map_err(TrainingError::io(Path::new("tempdir")))?;
        let train_set = stage_channel(&train, &staging.path().join("train.csv"))?;
        let validation_set = stage_channel(&validation, &staging.path().join("validation.csv"))?;
        if validation_set.header != train_set.header {
            return Err(TrainingError::HeaderMismatch {
                path: validation_set.path,
                expected: train_set.header,
                found: validation_set.header,
            });
        }

        let model_dir = self.paths.model_dir();
        fs::create_dir_all(&model_dir).map_err(TrainingError::io(&model_dir))?;
        let model_file = self.paths.model_file();

        let request = TrainRequest {
            train: &train_set.path,
            validation: &validation_set.path,
            label_column: train_set.label_column(),
            params: &params,
            output_model: &model_file,
            work_dir: staging.path(),
        };
        self.trainer.train(&request)?;

        if !model_file.is_file() {
            return Err(TrainingError::ModelNotWritten(model_file));
        }
        tracing::info!(path = %model_file.display(), "training complete");
        Ok(model_file)
    }

    /// [`run`](Self::run), writing `output/failure` when it fails.
    pub fn run_and_report(&self) -> Result<PathBuf, TrainingError> {
        self.run().inspect_err(|err| {
            let report = failure_report(err);
            tracing::error!(error = %err, "training failed");
            if let Err(write_err) = write_failure(&self.paths, &report) {
                tracing::error!(error = %write_err, "cannot write failure file");
            }
        })
    }
}

/// `Exception during training: <error>` followed by its causes.
pub fn failure_report(err: &TrainingError) -> String {
    let mut report = format!("Exception during training: {err}\n");
    let mut source = err.source();
    while let Some(cause) = source {
        let _ = writeln!(report, "caused by: {cause}");
        source = cause.source();
    }
    report
}

fn write_failure(paths: &JobPaths, report: &str) -> std::io::Result<()> {
    fs::create_dir_all(paths.output_dir())?;
    fs::write(paths.failure_file(), report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn job_paths_follow_container_layout() {
        let paths = JobPaths::default();
        assert_eq!(paths.channel_dir("train"), PathBuf::from("/opt/ml/input/data/train"));
        assert_eq!(
            paths.hyperparameters_file(),
            PathBuf::from("/opt/ml/input/config/hyperparameters.json")
        );
        assert_eq!(
            paths.model_file(),
            PathBuf::from("/opt/ml/model/lightgbm-regression-model.txt")
        );
        assert_eq!(paths.failure_file(), PathBuf::from("/opt/ml/output/failure"));
    }

    #[test]
    fn resolve_sorts_files_and_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("b.csv"), "a,y\n1,2\n");
        write(&dir.path().join("a.csv"), "a,y\n3,4\n");
        fs::create_dir(dir.path().join("nested")).unwrap();

        let channel = Channel::resolve("train", dir.path()).unwrap();
        let names: Vec<_> = channel
            .files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn empty_channel_explains_likely_causes() {
        let dir = tempfile::tempdir().unwrap();
        let err = Channel::resolve("validation", dir.path()).unwrap_err();
        assert!(matches!(err, TrainingError::EmptyChannel { .. }));

        let message = err.to_string();
        assert!(message.starts_with("There are no files in"));
        assert!(message.contains("channel (validation)"));
        assert!(message.contains("does not have permission"));
    }

    #[test]
    fn stage_concatenates_and_drops_repeated_headers() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("in/1.csv"), "x1,x2,y\n1,2,3\n\n4,5,6\n");
        write(&dir.path().join("in/2.csv"), "x1,x2,y\n7,8,9\n");

        let channel = Channel::resolve("train", &dir.path().join("in")).unwrap();
        let staged = stage_channel(&channel, &dir.path().join("train.csv")).unwrap();

        assert_eq!(staged.header, vec!["x1", "x2", "y"]);
        assert_eq!(staged.n_rows, 3);
        assert_eq!(staged.label_column(), 2);
        assert_eq!(
            fs::read_to_string(&staged.path).unwrap(),
            "x1,x2,y\n1,2,3\n4,5,6\n7,8,9\n"
        );
    }

    #[test]
    fn stage_rejects_mismatched_headers_and_ragged_rows() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("h/1.csv"), "a,y\n1,2\n");
        write(&dir.path().join("h/2.csv"), "b,y\n1,2\n");
        let channel = Channel::resolve("train", &dir.path().join("h")).unwrap();
        assert!(matches!(
            stage_channel(&channel, &dir.path().join("h.csv")).unwrap_err(),
            TrainingError::HeaderMismatch { .. }
        ));

        write(&dir.path().join("r/1.csv"), "a,y\n1,2\n3\n");
        let channel = Channel::resolve("train", &dir.path().join("r")).unwrap();
        assert!(matches!(
            stage_channel(&channel, &dir.path().join("r.csv")).unwrap_err(),
            TrainingError::RaggedRow { line: 3, expected: 2, actual: 1, .. }
        ));
    }

    #[test]
    fn stage_needs_a_label_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("one/1.csv"), "y\n1\n");
        let channel = Channel::resolve("train", &dir.path().join("one")).unwrap();
        assert!(matches!(
            stage_channel(&channel, &dir.path().join("one.csv")).unwrap_err(),
            TrainingError::TooFewColumns { columns: 1, .. }
        ));

        write(&dir.path().join("none/1.csv"), "x,y\n");
        let channel = Channel::resolve("train", &dir.path().join("none")).unwrap();
        assert!(matches!(
            stage_channel(&channel, &dir.path().join("none.csv")).unwrap_err(),
            TrainingError::NoRows { .. }
        ));
    }

    #[test]
    fn failure_report_includes_causes() {
        let err = TrainingError::Io {
            path: PathBuf::from("/x"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        let report = failure_report(&err);
        assert!(report.starts_with("Exception during training: /x: gone\n"));
        assert!(report.contains("caused by: gone"));
    }
}
