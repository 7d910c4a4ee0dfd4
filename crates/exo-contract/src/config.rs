//! # Contract Configuration
//!
//! Deployment-time settings, loaded from YAML:
//!
//! ```yaml
//! owner: "0:5f2a…"          # required, raw form
//! key_bits: 267              # dictionary key length
//! limits:
//!   max_cells: 4096          # cells per proof or update
//!   max_depth: 1023          # cell depth ceiling
//! unknown_request: ignore    # or `reject` (exit code 0xffff)
//! ```
//!
//! The owner is read once at deployment and never changes.

use std::path::Path;

use exo_cell::{DecodeLimits, MAX_CELL_DEPTH};
use exo_core::{Address, ContractError};
use exo_merkle::{DEFAULT_KEY_BITS, MAX_KEY_BITS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What to do with a request whose op code is not recognized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownRequestPolicy {
    /// Accept the message with no effect and no reply.
    #[default]
    Ignore,
    /// Abort with the unknown-op exit code.
    Reject,
}

/// Contract configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContractConfig {
    /// The only sender allowed to relay.
    pub owner: Address,
    /// Key length of the proved dictionaries.
    #[serde(default = "default_key_bits")]
    pub key_bits: usize,
    /// Decoding ceilings for proofs and updates.
    #[serde(default)]
    pub limits: DecodeLimits,
    /// Handling of unrecognized op codes.
    #[serde(default)]
    pub unknown_request: UnknownRequestPolicy,
}

/// Largest accepted `limits.max_cells`.
pub const MAX_LIMIT_CELLS: usize = 1 << 16;

fn default_key_bits() -> usize {
    DEFAULT_KEY_BITS
}

/// Error loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// Offending path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not a valid configuration document.
    #[error("invalid YAML in {path}: {reason}")]
    Parse {
        /// Offending path.
        path: String,
        /// Parser message.
        reason: String,
    },
    /// The document parsed but its values are out of range.
    #[error(transparent)]
    Invalid(#[from] ContractError),
}

impl ContractConfig {
    /// Configuration with defaults for everything but the owner.
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            key_bits: DEFAULT_KEY_BITS,
            limits: DecodeLimits::default(),
            unknown_request: UnknownRequestPolicy::default(),
        }
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, "<inline>")
    }

    /// Load and validate a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let label = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: label.clone(),
            source,
        })?;
        let config = Self::parse(&content, &label)?;
        tracing::debug!(path = %label, owner = %config.owner, "loaded contract config");
        Ok(config)
    }

    /// Parse and validate `content`, naming `path` in errors.
    fn parse(content: &str, path: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.key_bits == 0 || self.key_bits > MAX_KEY_BITS {
            return Err(ContractError::Config(format!(
                "key_bits must be in 1..={MAX_KEY_BITS}, got {}",
                self.key_bits
            )));
        }
        if self.limits.max_depth >= MAX_CELL_DEPTH {
            return Err(ContractError::Config(format!(
                "limits.max_depth must be at most {}, got {}",
                MAX_CELL_DEPTH - 1,
                self.limits.max_depth
            )));
        }
        if self.limits.max_cells == 0 || self.limits.max_cells > MAX_LIMIT_CELLS {
            return Err(ContractError::Config(format!(
                "limits.max_cells must be in 1..={MAX_LIMIT_CELLS}, got {}",
                self.limits.max_cells
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "0:1111111111111111111111111111111111111111111111111111111111111111";

    #[test]
    fn test_minimal_yaml_gets_defaults() {
        let config = ContractConfig::from_yaml(&format!("owner: \"{OWNER}\"\n")).unwrap();
        assert_eq!(config.owner, OWNER.parse::<Address>().unwrap());
        assert_eq!(config.key_bits, 267);
        assert_eq!(config.limits, DecodeLimits::default());
        assert_eq!(config.unknown_request, UnknownRequestPolicy::Ignore);
    }

    #[test]
    fn test_full_yaml() {
        let yaml = format!(
            "owner: \"{OWNER}\"\nkey_bits: 16\nlimits:\n  max_cells: 64\nunknown_request: reject\n"
        );
        let config = ContractConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.key_bits, 16);
        assert_eq!(config.limits.max_cells, 64);
        assert_eq!(config.limits.max_depth, 1023);
        assert_eq!(config.unknown_request, UnknownRequestPolicy::Reject);
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        for extra in [
            "key_bits: 0",
            "key_bits: 1024",
            "limits:\n  max_depth: 1024",
            "limits:\n  max_cells: 0",
            "limits:\n  max_cells: 65537",
        ] {
            let yaml = format!("owner: \"{OWNER}\"\n{extra}\n");
            assert!(
                matches!(ContractConfig::from_yaml(&yaml), Err(ConfigError::Invalid(_))),
                "accepted {extra}"
            );
        }
    }

    #[test]
    fn test_missing_owner_and_unknown_fields_rejected() {
        assert!(matches!(
            ContractConfig::from_yaml("key_bits: 267\n"),
            Err(ConfigError::Parse { .. })
        ));
        let yaml = format!("owner: \"{OWNER}\"\nadmin: true\n");
        assert!(matches!(ContractConfig::from_yaml(&yaml), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_misspelled_limit_rejected() {
        let yaml = format!("owner: \"{OWNER}\"\nlimits:\n  max_cels: 5\n");
        assert!(matches!(ContractConfig::from_yaml(&yaml), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contract.yaml");
        std::fs::write(&path, format!("owner: \"{OWNER}\"\n")).unwrap();
        assert_eq!(ContractConfig::load(&path).unwrap(), ContractConfig::new(OWNER.parse::<Address>().unwrap()));

        let broken = dir.path().join("broken.yaml");
        std::fs::write(&broken, "key_bits: 267\n").unwrap();
        match ContractConfig::load(&broken) {
            Err(ConfigError::Parse { path, .. }) => assert!(path.ends_with("broken.yaml")),
            other => panic!("expected a parse error, got {other:?}"),
        }

        let missing = dir.path().join("absent.yaml");
        assert!(matches!(ContractConfig::load(&missing), Err(ConfigError::Read { .. })));
    }
}
