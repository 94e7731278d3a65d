// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Runtime configuration.
//!
//! Built fluently through [`Builder`] or loaded from a TOML document:
//!
//! ```toml
//! max_routines = 10000
//! preallocate = 256
//! drain_on_exit = true
//! seed = 42
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::Error;
use crate::green::scheduler::Runtime;

/// Knobs for one [`Runtime`] instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Upper bound on live routines. `None` means unbounded.
    pub max_routines: Option<usize>,
    /// Routine table slots reserved before the first spawn.
    pub preallocate: usize,
    /// Keep running runnable routines after the root routine returns.
    pub drain_on_exit: bool,
    /// Seed for select's random clause choice. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_routines: None,
            preallocate: 0,
            drain_on_exit: true,
            seed: None,
        }
    }
}

impl RuntimeConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(src: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(src).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            tracing::warn!("Failed to read runtime config at {:?}: {}", path, e);
            Error::Config(format!("{}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content).inspect_err(|e| {
            tracing::warn!("Failed to parse runtime config at {:?}: {}", path, e);
        })
    }

    fn validate(&self) -> Result<(), Error> {
        if self.max_routines == Some(0) {
            return Err(Error::Config(
                "max_routines must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fluent construction of a [`Runtime`].
#[derive(Debug, Default)]
pub struct Builder {
    config: RuntimeConfig,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: RuntimeConfig) -> Self {
        Self { config }
    }

    pub fn max_routines(mut self, limit: usize) -> Self {
        self.config.max_routines = Some(limit);
        self
    }

    pub fn preallocate(mut self, slots: usize) -> Self {
        self.config.preallocate = slots;
        self
    }

    pub fn drain_on_exit(mut self, drain: bool) -> Self {
        self.config.drain_on_exit = drain;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<Runtime, Error> {
        self.config.validate()?;
        Ok(Runtime::with_config(self.config))
    }
}
