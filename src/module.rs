//! Loader for on-disk shell modules: a directory holding a bash init file
//! and a JSON config describing the commands the module provides.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::command::CommandSpec;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("module or bash file doesn't exist")]
    MissingFiles,
    #[error("failed to read module config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse module config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Where a command argument's value comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum ArgKind {
    #[serde(rename = "Environment")]
    EnvVar,
    StringLiteral,
    BuiltIn,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ModuleArg {
    pub kind: ArgKind,
    pub value: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ModuleCommand {
    pub description: String,
    pub args: BTreeMap<String, ModuleArg>,
    pub vars: BTreeMap<String, ModuleArg>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub commands: BTreeMap<String, ModuleCommand>,
}

/// Resolves module names under a data directory. A module `m` lives at
/// `<data_dir>/m/` and must provide both `m.sh` and `m.env`.
pub struct ModuleLoader {
    data_dir: PathBuf,
}

impl ModuleLoader {
    pub fn new(data_dir: impl Into<PathBuf>) -> ModuleLoader {
        ModuleLoader {
            data_dir: data_dir.into(),
        }
    }

    pub fn load<'a>(&self, name: &str) -> Result<ModuleInstance<'a>, ModuleError> {
        let root = self.data_dir.join(name);
        let bash_file = root.join(format!("{name}.sh"));
        let env_file = root.join(format!("{name}.env"));
        if !bash_file.is_file() || !env_file.is_file() {
            return Err(ModuleError::MissingFiles);
        }
        let raw = fs::read_to_string(&env_file)?;
        let config: ModuleConfig = serde_json::from_str(&raw)?;
        let cwd = env::current_dir()?;
        let command = CommandSpec::new("bash")
            .arg("--init-file")
            .arg(bash_file.to_string_lossy().into_owned())
            .current_dir(cwd);
        Ok(ModuleInstance { config, command })
    }
}

/// A loaded module: its parsed config plus a command prepared to start an
/// interactive shell initialized by the module's bash file.
pub struct ModuleInstance<'a> {
    config: ModuleConfig,
    command: CommandSpec<'a>,
}

impl<'a> ModuleInstance<'a> {
    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn command(&self) -> &CommandSpec<'a> {
        &self.command
    }

    /// Release the prepared command for further configuration and running.
    pub fn into_command(self) -> CommandSpec<'a> {
        self.command
    }
}
