//! CLI commands

pub mod config;
pub mod outputs;
pub mod preview;
pub mod up;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use monstack_core::{
    CONFIG_NAMESPACE, FileBackend, ProgramContext, StackConfig, StackRef, project_name_from_dir,
};

use crate::error::{CliError, Result};

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Project directory holding Pulumi.yaml
    #[arg(short = 'C', long, global = true, env = "MONSTACK_PROJECT_DIR", default_value = ".")]
    pub project_dir: PathBuf,

    /// Stack name, shared with the referenced stacks
    #[arg(short, long, global = true, env = "MONSTACK_STACK", default_value = "dev")]
    pub stack: String,

    /// Owner (organization) of every stack
    #[arg(long, global = true, env = "MONSTACK_OWNER", default_value = "organization")]
    pub owner: String,

    /// Directory holding stack state [default: <data dir>/monstack/stacks]
    #[arg(long, global = true, env = "MONSTACK_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Helm binary used to install releases
    #[arg(long, global = true, env = "MONSTACK_HELM", default_value = "helm")]
    pub helm: PathBuf,

    /// Override a config value for this run (key=value, repeatable)
    #[arg(short = 'c', long = "config", global = true, value_name = "KEY=VALUE")]
    pub config: Vec<String>,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,
}

impl GlobalArgs {
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("monstack")
                .join("stacks")
        })
    }

    /// Project directory, made absolute
    pub fn project_dir(&self) -> Result<PathBuf> {
        std::fs::canonicalize(&self.project_dir).map_err(|e| {
            CliError::config_with_help(
                format!(
                    "project directory {} is not accessible: {}",
                    self.project_dir.display(),
                    e
                ),
                "Pass --project-dir or run from the project directory",
            )
        })
    }

    /// Stack config with `--config` overrides applied
    pub fn stack_config(&self) -> Result<StackConfig> {
        let mut config = StackConfig::load(&self.project_dir()?, &self.stack)?;
        config.apply_overrides(&self.config, CONFIG_NAMESPACE)?;
        Ok(config)
    }

    /// This project's own stack
    pub fn own_stack(&self) -> Result<StackRef> {
        let project = project_name_from_dir(&self.project_dir()?)?;
        Ok(StackRef::new(&self.owner, project, &self.stack))
    }

    /// Everything the program needs to declare itself
    pub fn program_context(&self) -> Result<ProgramContext> {
        Ok(ProgramContext {
            project_dir: self.project_dir()?,
            owner: self.owner.clone(),
            stack: self.stack.clone(),
            config: self.stack_config()?,
            backend: Arc::new(FileBackend::new(self.state_dir())),
        })
    }
}
