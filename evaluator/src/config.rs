pub mod descriptors;
pub mod loader;
pub mod processors;


use descriptors::ValidationError;
use itertools::Itertools;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_yaml::Value;
use std::{io, path::PathBuf};
use thiserror::Error;

/// Top level key injected by the loader, components must not declare it
pub const GENERAL_KEY: &str = "general";

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Component schema must not declare the reserved key '{0}'")]
    ReservedKey(String),
    #[error("Component '{0}' was registered more than once")]
    DuplicateComponent(String),
    #[error("The root schema must be a dictionary")]
    RootNotDictionary,
    #[error("Failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Globs were invalid")]
    InvalidGlobs(#[from] globset::Error),
    #[error("Configuration is invalid:\n{}", .0.iter().join("\n"))]
    Invalid(Vec<ValidationError>),
    #[error("Section '{section}' could not be interpreted")]
    Section {
        section: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Failed to resolve the working directory")]
    WorkingDirectory(#[source] io::Error),
}

/// Settings of the reserved `general` section
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    // resolved auxiliary config files, in the order they were merged
    #[serde(default)]
    pub config_files: Vec<PathBuf>,
    // seconds
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            config_files: Vec::new(),
            lock_timeout: default_lock_timeout(),
        }
    }
}

fn default_lock_timeout() -> u64 {
    10
}

/// Fully loaded and defaulted configuration tree
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    tree: Value,
}

impl Config {
    pub fn new(tree: Value) -> Self {
        Self { tree }
    }

    pub fn tree(&self) -> &Value {
        &self.tree
    }

    pub fn into_tree(self) -> Value {
        self.tree
    }

    /// raw subtree of a top level section, `Null` if missing
    pub fn raw(&self, section: &str) -> &Value {
        self.tree.get(section).unwrap_or(&Value::Null)
    }

    /// interpret a top level section as a typed structure
    pub fn section<T: DeserializeOwned>(&self, section: &str) -> Result<T, ConfigErrors> {
        serde_yaml::from_value(self.raw(section).clone()).map_err(|source| ConfigErrors::Section {
            section: section.to_string(),
            source,
        })
    }

    pub fn general(&self) -> Result<GeneralConfig, ConfigErrors> {
        self.section(GENERAL_KEY)
    }
}
