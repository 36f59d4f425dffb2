//! Run configuration, read from TOML.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration apart from the input source, which must be named exactly
//! once.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use fluxgrid_core::engine::EngineConfig;
use fluxgrid_core::numeric::NumericType;
use fluxgrid_core::rng::DEFAULT_SEED;

/// Errors from building a [`RunConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    #[error("both an input description and a save file were given")]
    ConflictingInputs,

    #[error("no input given, expected an input description or a save file")]
    MissingInput,

    #[error("save rate must be positive")]
    ZeroSaveRate,

    #[error("thread count must be positive")]
    ZeroThreads,

    #[error("state fraction bits {0} out of range, expected at most 64")]
    InvalidFracBits(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Everything the driver needs to run a simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Text description to start from.
    pub input: Option<PathBuf>,
    /// Binary save to resume from.
    pub save_file: Option<PathBuf>,
    pub save_dir: PathBuf,
    /// Save whenever the tick count is a multiple of this.
    pub save_rate: u32,
    pub max_iterations: u64,
    /// Suppress per-tick field output.
    pub quiet: bool,
    pub threads: usize,
    pub seed: u64,
    pub p_type: NumericType,
    pub v_type: NumericType,
    pub v_flow_type: NumericType,
    /// Fractional bits of raw values in save files.
    pub state_frac_bits: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input: None,
            save_file: None,
            save_dir: PathBuf::from("./save"),
            save_rate: 100,
            max_iterations: 10_000,
            quiet: false,
            threads: 1,
            seed: DEFAULT_SEED,
            p_type: NumericType::default(),
            v_type: NumericType::default(),
            v_flow_type: NumericType::default(),
            state_frac_bits: 16,
        }
    }
}

impl RunConfig {
    /// Parse TOML text. `file` is only used in error messages.
    pub fn from_toml_str(text: &str, file: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e: toml::de::Error| ConfigError::Parse {
            file: file.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Check the cross-field rules. Run after command-line overrides.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (&self.input, &self.save_file) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingInputs),
            (None, None) => return Err(ConfigError::MissingInput),
            _ => {}
        }
        if self.save_rate == 0 {
            return Err(ConfigError::ZeroSaveRate);
        }
        if self.threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if self.state_frac_bits > 64 {
            return Err(ConfigError::InvalidFracBits(self.state_frac_bits));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            threads: self.threads,
            seed: self.seed,
        }
    }
}

/// Read and parse a TOML configuration file.
pub fn load_config(path: &Path) -> Result<RunConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config = RunConfig::from_toml_str(&text, path)?;
    log::info!("loaded configuration from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<RunConfig, ConfigError> {
        RunConfig::from_toml_str(text, Path::new("test.toml"))
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.save_dir, PathBuf::from("./save"));
        assert_eq!(config.save_rate, 100);
        assert_eq!(config.max_iterations, 10_000);
        assert_eq!(config.seed, 1337);
        assert_eq!(config.p_type, NumericType::Fixed { bits: 32, frac: 16 });
    }

    #[test]
    fn parses_every_field() {
        let config = parse(
            r#"
            input = "tank.txt"
            save_dir = "out"
            save_rate = 5
            max_iterations = 20
            quiet = true
            threads = 4
            seed = 7
            p_type = "double"
            v_type = "FAST_FIXED(64, 32)"
            v_flow_type = "float"
            state_frac_bits = 32
            "#,
        )
        .unwrap();
        assert_eq!(config.input, Some(PathBuf::from("tank.txt")));
        assert_eq!(config.save_dir, PathBuf::from("out"));
        assert_eq!(config.save_rate, 5);
        assert!(config.quiet);
        assert_eq!(config.p_type, NumericType::Double);
        assert_eq!(config.v_type, NumericType::FastFixed { bits: 64, frac: 32 });
        assert_eq!(config.v_flow_type, NumericType::Float);
        assert_eq!(
            config.engine_config(),
            EngineConfig {
                threads: 4,
                seed: 7
            }
        );
        config.validate().unwrap();
    }

    #[test]
    fn bad_type_is_a_parse_error() {
        let err = parse(r#"p_type = "decimal""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn unknown_key_is_a_parse_error() {
        assert!(matches!(
            parse("speed = 3"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn validation_rules() {
        let mut config = RunConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingInput)));

        config.input = Some("a.txt".into());
        config.save_file = Some("save/10".into());
        assert!(matches!(config.validate(), Err(ConfigError::ConflictingInputs)));

        config.save_file = None;
        config.save_rate = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroSaveRate)));

        config.save_rate = 1;
        config.threads = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroThreads)));

        config.threads = 2;
        config.state_frac_bits = 70;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFracBits(70))));

        config.state_frac_bits = 16;
        config.validate().unwrap();
    }

    #[test]
    fn load_missing_file() {
        assert!(matches!(
            load_config(Path::new("/nonexistent/fluxgrid.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
