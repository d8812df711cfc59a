//! Interpreter discovery on the local PATH

use crate::provision::{EnvironmentProvisioner, ProvisionError, ToolchainHandle};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::{error::Elapsed, timeout};
use tracing::{debug, info, warn};

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"Python (\d+\.\d+(?:\.\d+)?)").expect("static regex"))
}

/// Placeholder for the requested release in candidate names
const VERSION_PLACEHOLDER: &str = "{version}";

/// Provisions interpreters already installed on the host
///
/// Candidates are tried in order: `python{version}`, `python3`, `python`. The
/// first one whose `--version` reports the requested release wins.
#[derive(Debug, Clone)]
pub struct LocalProvisioner {
    probe_timeout_secs: u64,
    candidates: Vec<String>,
}

impl Default for LocalProvisioner {
    fn default() -> Self {
        Self::new(10)
    }
}

impl LocalProvisioner {
    pub fn new(probe_timeout_secs: u64) -> Self {
        Self {
            probe_timeout_secs,
            candidates: vec![
                format!("python{}", VERSION_PLACEHOLDER),
                "python3".to_string(),
                "python".to_string(),
            ],
        }
    }

    /// Replace the candidate list; `{version}` is substituted per request
    pub fn with_candidates<I, S>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidates = candidates.into_iter().map(Into::into).collect();
        self
    }

    fn candidates(&self, version: &str) -> Vec<String> {
        self.candidates
            .iter()
            .map(|c| c.replace(VERSION_PLACEHOLDER, version))
            .collect()
    }

    /// Run `<candidate> --version` and return the reported version, if any
    async fn probe(&self, candidate: &str) -> Result<Option<String>, Elapsed> {
        let result = timeout(
            Duration::from_secs(self.probe_timeout_secs),
            Command::new(candidate)
                .arg("--version")
                .kill_on_drop(true)
                .output(),
        )
        .await?;

        let output = match result {
            Ok(output) if output.status.success() => output,
            Ok(_) | Err(_) => return Ok(None),
        };

        // Old interpreters print the version on stderr
        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        Ok(parse_reported_version(&text))
    }
}

/// Extract `3.8.10` from `Python 3.8.10`
pub fn parse_reported_version(text: &str) -> Option<String> {
    version_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Whether a reported version satisfies a requested one (`3.8` accepts `3.8.10`)
pub fn version_matches(requested: &str, reported: &str) -> bool {
    reported == requested || reported.starts_with(&format!("{}.", requested))
}

#[async_trait]
impl EnvironmentProvisioner for LocalProvisioner {
    async fn provision(&self, version: &str) -> Result<ToolchainHandle, ProvisionError> {
        let candidates = self.candidates(version);
        let mut timed_out = false;

        for candidate in &candidates {
            match self.probe(candidate).await {
                Ok(Some(reported)) if version_matches(version, &reported) => {
                    info!("Provisioned Python {} via {} ({})", version, candidate, reported);
                    return Ok(ToolchainHandle::new(version, candidate.as_str()));
                }
                Ok(Some(reported)) => {
                    debug!("{} reports Python {}, wanted {}", candidate, reported, version);
                }
                Ok(None) => debug!("{} is not available", candidate),
                Err(_) => {
                    warn!(
                        "{} --version did not answer within {}s, trying the next candidate",
                        candidate, self.probe_timeout_secs
                    );
                    timed_out = true;
                }
            }
        }

        if timed_out {
            return Err(ProvisionError::Timeout {
                version: version.to_string(),
                secs: self.probe_timeout_secs,
            });
        }

        Err(ProvisionError::NotFound {
            version: version.to_string(),
            tried: candidates.join(", "),
        })
    }
}
