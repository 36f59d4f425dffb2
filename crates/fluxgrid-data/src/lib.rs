//! File formats around the fluxgrid engine: text scenario descriptions,
//! binary run-state saves and the TOML run configuration.

pub mod config;
pub mod description;
pub mod save;

pub use config::{ConfigError, RunConfig, load_config};
pub use description::{DescriptionError, load_description, parse_description};
pub use save::{SaveError, load_state_file, read_state, save_to_dir, write_state};
