//! Endpoint status monitor.
//!
//! Polls a hosted endpoint while it is `Updating` or `InService` and logs
//! its status and current instance count on every poll, which makes scaling
//! activity visible from a terminal.

use std::fmt;
use std::process::{Command, ExitStatus};
use std::time::Duration;

use serde::Deserialize;

/// Lifecycle state of a hosted endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointStatus {
    OutOfService,
    Creating,
    Updating,
    SystemUpdating,
    RollingBack,
    InService,
    Deleting,
    Failed,
    UpdateRollbackFailed,
    /// A status this crate does not know, kept verbatim.
    Other(String),
}

impl EndpointStatus {
    /// Whether the monitor keeps polling in this state.
    pub fn is_watched(&self) -> bool {
        matches!(self, EndpointStatus::Updating | EndpointStatus::InService)
    }

    pub fn as_str(&self) -> &str {
        match self {
            EndpointStatus::OutOfService => "OutOfService",
            EndpointStatus::Creating => "Creating",
            EndpointStatus::Updating => "Updating",
            EndpointStatus::SystemUpdating => "SystemUpdating",
            EndpointStatus::RollingBack => "RollingBack",
            EndpointStatus::InService => "InService",
            EndpointStatus::Deleting => "Deleting",
            EndpointStatus::Failed => "Failed",
            EndpointStatus::UpdateRollbackFailed => "UpdateRollbackFailed",
            EndpointStatus::Other(s) => s,
        }
    }
}

impl From<&str> for EndpointStatus {
    fn from(s: &str) -> Self {
        match s {
            "OutOfService" => EndpointStatus::OutOfService,
            "Creating" => EndpointStatus::Creating,
            "Updating" => EndpointStatus::Updating,
            "SystemUpdating" => EndpointStatus::SystemUpdating,
            "RollingBack" => EndpointStatus::RollingBack,
            "InService" => EndpointStatus::InService,
            "Deleting" => EndpointStatus::Deleting,
            "Failed" => EndpointStatus::Failed,
            "UpdateRollbackFailed" => EndpointStatus::UpdateRollbackFailed,
            other => EndpointStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescription {
    pub status: EndpointStatus,
    /// Current instance count of the first production variant.
    pub instance_count: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("cannot run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("describe-endpoint exited with {status}: {stderr}")]
    Command { status: ExitStatus, stderr: String },

    #[error("malformed describe-endpoint output: {0}")]
    Parse(#[from] serde_json::Error),
}

pub trait DescribeEndpoint {
    fn describe(&self, endpoint_name: &str) -> Result<EndpointDescription, MonitorError>;
}

/// Describes endpoints through `aws sagemaker describe-endpoint`.
#[derive(Debug, Clone)]
pub struct AwsCli {
    pub program: String,
    pub region: Option<String>,
    pub profile: Option<String>,
}

impl Default for AwsCli {
    fn default() -> Self {
        Self {
            program: "aws".to_string(),
            region: None,
            profile: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeEndpointOutput {
    endpoint_status: String,
    #[serde(default)]
    production_variants: Vec<ProductionVariant>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProductionVariant {
    current_instance_count: Option<u32>,
}

impl AwsCli {
    /// Command-line arguments for describing `endpoint_name`.
    pub fn args(&self, endpoint_name: &str) -> Vec<String> {
        let mut args: Vec<String> = ["sagemaker", "describe-endpoint", "--endpoint-name"]
            .into_iter()
            .map(String::from)
            .collect();
        args.push(endpoint_name.to_string());
        args.extend(["--output".to_string(), "json".to_string()]);
        if let Some(region) = &self.region {
            args.extend(["--region".to_string(), region.clone()]);
        }
        if let Some(profile) = &self.profile {
            args.extend(["--profile".to_string(), profile.clone()]);
        }
        args
    }

    /// Parse the JSON document printed by `describe-endpoint`.
    pub fn parse_output(json: &[u8]) -> Result<EndpointDescription, MonitorError> {
        let output: DescribeEndpointOutput = serde_json::from_slice(json)?;
        Ok(EndpointDescription {
            status: EndpointStatus::from(output.endpoint_status.as_str()),
            instance_count: output
                .production_variants
                .first()
                .and_then(|v| v.current_instance_count),
        })
    }
}

impl DescribeEndpoint for AwsCli {
    fn describe(&self, endpoint_name: &str) -> Result<EndpointDescription, MonitorError> {
        let output = Command::new(&self.program)
            .args(self.args(endpoint_name))
            .output()
            .map_err(|source| MonitorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(MonitorError::Command {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Self::parse_output(&output.stdout)
    }
}

/// Polls one endpoint until it leaves the watched states.
#[derive(Debug, Clone)]
pub struct Monitor<D> {
    describer: D,
    endpoint_name: String,
    interval: Duration,
    max_polls: Option<usize>,
}

impl<D: DescribeEndpoint> Monitor<D> {
    pub fn new(describer: D, endpoint_name: impl Into<String>) -> Self {
        Self {
            describer,
            endpoint_name: endpoint_name.into(),
            interval: Duration::from_secs(1),
            max_polls: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Stop after this many polls following the first describe.
    pub fn with_max_polls(mut self, max_polls: usize) -> Self {
        self.max_polls = Some(max_polls);
        self
    }

    /// Poll until the endpoint leaves `Updating`/`InService` and return the
    /// last description.
    pub fn run(&self) -> Result<EndpointDescription, MonitorError> {
        self.run_with(|_| {})
    }

    /// [`run`](Self::run), handing every description to `on_poll`.
    pub fn run_with(
        &self,
        mut on_poll: impl FnMut(&EndpointDescription),
    ) -> Result<EndpointDescription, MonitorError> {
        let endpoint = self.endpoint_name.as_str();
        let mut description = self.describer.describe(endpoint)?;
        tracing::info!(endpoint, status = %description.status, "endpoint status");
        on_poll(&description);

        let mut polls = 0;
        while description.status.is_watched() {
            if self.max_polls.is_some_and(|max| polls >= max) {
                tracing::info!(endpoint, polls, "poll limit reached");
                break;
            }
            std::thread::sleep(self.interval);

            description = self.describer.describe(endpoint)?;
            polls += 1;
            tracing::info!(
                endpoint,
                status = %description.status,
                instance_count = description.instance_count,
                "endpoint status"
            );
            on_poll(&description);
        }
        Ok(description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays a fixed sequence of statuses.
    struct Scripted {
        statuses: RefCell<VecDeque<&'static str>>,
        calls: RefCell<Vec<String>>,
    }

    impl Scripted {
        fn new(statuses: &[&'static str]) -> Self {
            Self {
                statuses: RefCell::new(statuses.iter().copied().collect()),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl DescribeEndpoint for Scripted {
        fn describe(&self, endpoint_name: &str) -> Result<EndpointDescription, MonitorError> {
            self.calls.borrow_mut().push(endpoint_name.to_string());
            let status = self.statuses.borrow_mut().pop_front().unwrap_or("Failed");
            Ok(EndpointDescription {
                status: status.into(),
                instance_count: Some(self.calls.borrow().len() as u32),
            })
        }
    }

    #[test]
    fn polls_until_status_leaves_watched_states() {
        let describer = Scripted::new(&["InService", "Updating", "InService", "Deleting"]);
        let monitor = Monitor::new(describer, "ep").with_interval(Duration::ZERO);

        let mut seen = Vec::new();
        let last = monitor.run_with(|d| seen.push(d.status.clone())).unwrap();

        assert_eq!(last.status, EndpointStatus::Deleting);
        assert_eq!(last.instance_count, Some(4));
        assert_eq!(seen.len(), 4);
        assert_eq!(monitor.describer.calls.borrow().as_slice(), ["ep", "ep", "ep", "ep"]);
    }

    #[test]
    fn unwatched_status_stops_after_first_describe() {
        let monitor = Monitor::new(Scripted::new(&["Creating"]), "ep").with_interval(Duration::ZERO);
        let last = monitor.run().unwrap();
        assert_eq!(last.status, EndpointStatus::Creating);
        assert_eq!(monitor.describer.calls.borrow().len(), 1);
    }

    #[test]
    fn poll_limit_stops_a_healthy_endpoint() {
        let monitor = Monitor::new(Scripted::new(&["InService"; 10]), "ep")
            .with_interval(Duration::ZERO)
            .with_max_polls(3);
        let last = monitor.run().unwrap();
        assert_eq!(last.status, EndpointStatus::InService);
        assert_eq!(monitor.describer.calls.borrow().len(), 4);
    }

    #[test]
    fn status_strings_round_trip() {
        for s in ["OutOfService", "Updating", "InService", "UpdateRollbackFailed"] {
            assert_eq!(EndpointStatus::from(s).to_string(), s);
        }
        assert_eq!(EndpointStatus::from("Paused"), EndpointStatus::Other("Paused".into()));
        assert!(!EndpointStatus::from("Paused").is_watched());
    }

    #[test]
    fn parses_describe_endpoint_output() {
        let json = br#"{
            "EndpointName": "lightgbm-reg",
            "EndpointStatus": "Updating",
            "ProductionVariants": [
                {"VariantName": "AllTraffic", "CurrentInstanceCount": 2, "DesiredInstanceCount": 3}
            ]
        }"#;
        let description = AwsCli::parse_output(json).unwrap();
        assert_eq!(description.status, EndpointStatus::Updating);
        assert_eq!(description.instance_count, Some(2));

        let description = AwsCli::parse_output(br#"{"EndpointStatus": "Creating"}"#).unwrap();
        assert_eq!(description.instance_count, None);

        assert!(matches!(AwsCli::parse_output(b"{}"), Err(MonitorError::Parse(_))));
    }

    #[test]
    fn aws_cli_arguments() {
        let cli = AwsCli {
            region: Some("ap-northeast-1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            cli.args("ep"),
            [
                "sagemaker",
                "describe-endpoint",
                "--endpoint-name",
                "ep",
                "--output",
                "json",
                "--region",
                "ap-northeast-1"
            ]
        );
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let cli = AwsCli {
            program: "/nonexistent/aws".to_string(),
            ..Default::default()
        };
        assert!(matches!(cli.describe("ep"), Err(MonitorError::Spawn { .. })));
    }
}
