//! Command-line parsing.

use std::path::PathBuf;

use clap::Parser;
use fluxgrid_core::numeric::NumericType;
use fluxgrid_data::RunConfig;

/// Run a grid fluid simulation from a text description or a binary save.
///
/// Types are `double`, `float`, `fixed(N,K)` or `fast_fixed(N,K)`.
/// Command-line values override the configuration file.
#[derive(Debug, Default, PartialEq, Parser)]
#[command(name = "fluxgrid")]
pub struct Cli {
    /// TOML run configuration.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Text grid description to start from.
    #[arg(short, long, value_name = "FILE", conflicts_with = "save_file")]
    pub input: Option<PathBuf>,

    /// Binary save to resume from.
    #[arg(short = 's', long = "save", value_name = "FILE")]
    pub save_file: Option<PathBuf>,

    /// Directory for periodic saves.
    #[arg(short = 'd', long, value_name = "DIR")]
    pub save_dir: Option<PathBuf>,

    /// Save when the tick count is a multiple of this.
    #[arg(
        short = 'r',
        long,
        value_name = "TICKS",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub save_rate: Option<u32>,

    /// Number of ticks to run.
    #[arg(short, long, value_name = "N")]
    pub max_iterations: Option<u64>,

    /// Worker threads for the gravity phase.
    #[arg(short, long, value_name = "N")]
    pub threads: Option<usize>,

    /// Do not print the field.
    #[arg(short, long)]
    pub quiet: bool,

    /// Random seed.
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Pressure type.
    #[arg(short, long, value_name = "TYPE")]
    pub p_type: Option<NumericType>,

    /// Velocity type.
    #[arg(short, long, value_name = "TYPE")]
    pub v_type: Option<NumericType>,

    /// Velocity flow type.
    #[arg(short = 'f', long, value_name = "TYPE")]
    pub v_flow_type: Option<NumericType>,
}

impl Cli {
    /// Overlay these values onto `config`.
    ///
    /// An input source on the command line replaces both sources from the
    /// file, so `-i` can override a configured `save_file` and vice versa.
    pub fn apply(self, config: &mut RunConfig) {
        if self.input.is_some() || self.save_file.is_some() {
            config.input = self.input;
            config.save_file = self.save_file;
        }
        if let Some(dir) = self.save_dir {
            config.save_dir = dir;
        }
        if let Some(rate) = self.save_rate {
            config.save_rate = rate;
        }
        if let Some(n) = self.max_iterations {
            config.max_iterations = n;
        }
        if let Some(n) = self.threads {
            config.threads = n;
        }
        config.quiet |= self.quiet;
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(ty) = self.p_type {
            config.p_type = ty;
        }
        if let Some(ty) = self.v_type {
            config.v_type = ty;
        }
        if let Some(ty) = self.v_flow_type {
            config.v_flow_type = ty;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("fluxgrid").chain(args.iter().copied()))
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn empty_command_line() {
        assert_eq!(parse(&[]).unwrap(), Cli::default());
    }

    #[test]
    fn short_and_long_flags() {
        let cli = parse(&[
            "-i",
            "tank.txt",
            "--save-rate",
            "5",
            "-q",
            "--p-type=double",
            "-v",
            "fast_fixed(64,32)",
            "--seed",
            "42",
            "-t",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.input, Some(PathBuf::from("tank.txt")));
        assert_eq!(cli.save_rate, Some(5));
        assert!(cli.quiet);
        assert_eq!(cli.p_type, Some(NumericType::Double));
        assert_eq!(cli.v_type, Some(NumericType::FastFixed { bits: 64, frac: 32 }));
        assert_eq!(cli.seed, Some(42));
        assert_eq!(cli.threads, Some(4));
    }

    #[test]
    fn save_flag_names_resume_file() {
        let cli = parse(&["-s", "save/100", "-d", "out", "-f", "float"]).unwrap();
        assert_eq!(cli.save_file, Some(PathBuf::from("save/100")));
        assert_eq!(cli.save_dir, Some(PathBuf::from("out")));
        assert_eq!(cli.v_flow_type, Some(NumericType::Float));
    }

    #[test]
    fn help_is_reported() {
        let err = parse(&["-i", "x", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn errors() {
        assert_eq!(parse(&["--bogus"]).unwrap_err().kind(), ErrorKind::UnknownArgument);
        assert!(parse(&["-m"]).is_err());
        assert_eq!(parse(&["-r", "often"]).unwrap_err().kind(), ErrorKind::ValueValidation);
        assert_eq!(parse(&["-r", "0"]).unwrap_err().kind(), ErrorKind::ValueValidation);
        assert_eq!(
            parse(&["-f", "fixed(12,4)"]).unwrap_err().kind(),
            ErrorKind::ValueValidation
        );
        assert_eq!(
            parse(&["-i", "a", "-s", "b"]).unwrap_err().kind(),
            ErrorKind::ArgumentConflict
        );
    }

    #[test]
    fn overrides_config() {
        let mut config = RunConfig {
            save_file: Some("save/100".into()),
            threads: 2,
            ..RunConfig::default()
        };
        parse(&["-i", "tank.txt", "-m", "50"]).unwrap().apply(&mut config);
        assert_eq!(config.input, Some(PathBuf::from("tank.txt")));
        assert_eq!(config.save_file, None);
        assert_eq!(config.max_iterations, 50);
        assert_eq!(config.threads, 2);
        config.validate().unwrap();
    }
}
