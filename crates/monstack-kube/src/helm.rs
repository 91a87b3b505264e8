//! Release installation through the `helm` binary
//!
//! Every release is submitted as `helm upgrade --install`. Values and the
//! kubeconfig are handed over through private temporary files so that
//! nothing secret appears on a command line or in a log event.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use monstack_core::{ReleaseState, ReleaseStatus, RepositoryOpts, ResolvedRelease};
use serde::Deserialize;
use tempfile::{NamedTempFile, TempDir};
use tokio::process::Command;

use crate::error::{KubeError, Result};

/// Default helm binary, looked up on `PATH`
pub const DEFAULT_HELM_BINARY: &str = "helm";

/// Driver for the `helm` command line
#[derive(Debug, Clone)]
pub struct HelmCli {
    binary: PathBuf,
}

impl Default for HelmCli {
    fn default() -> Self {
        Self::new(DEFAULT_HELM_BINARY)
    }
}

impl HelmCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Install or upgrade `release` and return its status
    pub async fn install(
        &self,
        release: &ResolvedRelease,
        kubeconfig: Option<&str>,
    ) -> Result<ReleaseStatus> {
        let kubeconfig_file = kubeconfig.map(write_temp).transpose()?;
        let kubeconfig_path = kubeconfig_file.as_ref().map(NamedTempFile::path);

        let values_yaml = release.values.values().to_yaml()?;
        let values_file = write_temp(&values_yaml)?;

        if let Some(repo) = release.repository.as_ref().filter(|r| r.name.is_some()) {
            self.repo_add(repo).await?;
        }

        if release.flags.lint {
            self.lint(release, values_file.path()).await?;
        }

        tracing::info!(
            release = %release.name,
            chart = %release.chart,
            version = %release.version,
            namespace = %release.namespace,
            "installing release"
        );
        let args = upgrade_args(release, values_file.path(), kubeconfig_path);
        self.run("upgrade", args).await?;

        self.status(&release.name, &release.namespace, kubeconfig_path)
            .await
    }

    /// Register the repository under its alias
    pub async fn repo_add(&self, repo: &RepositoryOpts) -> Result<()> {
        let Some(name) = repo.name.as_deref() else {
            return Ok(());
        };
        let args: Vec<OsString> = vec![
            "repo".into(),
            "add".into(),
            name.into(),
            repo.url.clone().into(),
            "--force-update".into(),
        ];
        self.run("repo add", args).await?;
        self.run("repo update", vec!["repo".into(), "update".into(), name.into()])
            .await?;
        Ok(())
    }

    /// Pull the chart and lint it against the release values
    pub async fn lint(&self, release: &ResolvedRelease, values_file: &Path) -> Result<()> {
        let workdir = TempDir::new()?;

        let mut pull: Vec<OsString> = vec!["pull".into()];
        pull.extend(chart_args(release));
        pull.extend(["--untar".into(), "--untardir".into(), workdir.path().into()]);
        self.run("pull", pull).await?;

        let chart_dir = workdir.path().join(&release.chart);
        let lint: Vec<OsString> = vec![
            "lint".into(),
            chart_dir.into_os_string(),
            "--values".into(),
            values_file.into(),
        ];
        self.run("lint", lint).await?;
        Ok(())
    }

    /// Current status of a release
    pub async fn status(
        &self,
        name: &str,
        namespace: &str,
        kubeconfig: Option<&Path>,
    ) -> Result<ReleaseStatus> {
        let mut args: Vec<OsString> = vec![
            "status".into(),
            name.into(),
            "--namespace".into(),
            namespace.into(),
            "--output".into(),
            "json".into(),
        ];
        if let Some(path) = kubeconfig {
            args.extend(["--kubeconfig".into(), path.into()]);
        }
        let stdout = self.run("status", args).await?;
        parse_status(&stdout)
    }

    async fn run(&self, command: &str, args: Vec<OsString>) -> Result<String> {
        tracing::debug!(helm = %self.binary.display(), ?args, "running helm");

        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .await
            .map_err(|e| KubeError::HelmUnavailable {
                binary: self.binary.display().to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!(command, %stderr, "helm failed");
            return Err(KubeError::Helm {
                command: command.to_string(),
                stderr,
            });
        }

        String::from_utf8(output.stdout)
            .map_err(|e| KubeError::Serialization(format!("helm {} output: {}", command, e)))
    }
}

/// Chart reference and source arguments shared by `pull` and `upgrade`
fn chart_args(release: &ResolvedRelease) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    match &release.repository {
        Some(RepositoryOpts {
            name: Some(alias), ..
        }) => args.push(format!("{}/{}", alias, release.chart).into()),
        Some(RepositoryOpts { name: None, url }) => {
            args.push(release.chart.clone().into());
            args.extend(["--repo".into(), url.into()]);
        }
        None => args.push(release.chart.clone().into()),
    }
    if !release.version.is_empty() {
        args.extend(["--version".into(), release.version.clone().into()]);
    }
    args
}

/// Arguments of `helm upgrade --install` for a release
pub fn upgrade_args(
    release: &ResolvedRelease,
    values_file: &Path,
    kubeconfig: Option<&Path>,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "upgrade".into(),
        "--install".into(),
        release.name.clone().into(),
    ];
    args.extend(chart_args(release));
    args.extend([
        "--namespace".into(),
        release.namespace.clone().into(),
        "--values".into(),
        values_file.into(),
        "--timeout".into(),
        format!("{}s", release.timeout.as_secs()).into(),
    ]);

    if !release.flags.skip_await {
        args.push("--wait".into());
    }
    if release.flags.cleanup_on_fail {
        args.push("--cleanup-on-fail".into());
    }
    if release.flags.force_update {
        args.push("--force".into());
    }
    if let Some(path) = kubeconfig {
        args.extend(["--kubeconfig".into(), path.into()]);
    }
    args
}

#[derive(Debug, Deserialize)]
struct HelmStatus {
    name: String,
    namespace: String,
    version: u32,
    info: HelmStatusInfo,
    chart: Option<HelmChart>,
}

#[derive(Debug, Deserialize)]
struct HelmStatusInfo {
    status: String,
}

#[derive(Debug, Deserialize)]
struct HelmChart {
    metadata: HelmChartMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HelmChartMetadata {
    name: String,
    version: String,
    app_version: Option<String>,
}

/// Parse the output of `helm status --output json`
pub fn parse_status(json: &str) -> Result<ReleaseStatus> {
    let status: HelmStatus = serde_json::from_str(json)?;
    let (chart, version, app_version) = match status.chart {
        Some(chart) => (
            chart.metadata.name,
            chart.metadata.version,
            chart.metadata.app_version,
        ),
        None => (String::new(), String::new(), None),
    };

    Ok(ReleaseStatus {
        name: status.name,
        namespace: status.namespace,
        revision: status.version,
        status: ReleaseState::parse(&status.info.status),
        chart,
        version,
        app_version,
    })
}

fn write_temp(content: &str) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(file)
}
