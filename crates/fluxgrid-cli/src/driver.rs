//! The driving loop: load, dispatch, tick, render, save.

use std::io::{self, Write};

use fluxgrid_core::engine::{SimError, Simulation};
use fluxgrid_core::registry::{DispatchError, EngineRegistry, FactoryContext};
use fluxgrid_core::state::SimulationState;
use fluxgrid_data::{
    ConfigError, DescriptionError, RunConfig, SaveError, load_description, load_state_file,
    save_to_dir,
};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot load description: {0}")]
    Description(#[from] DescriptionError),
    #[error("save failed: {0}")]
    Save(#[from] SaveError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("simulation failed: {0}")]
    Sim(#[from] SimError),
    #[error("cannot write output: {0}")]
    Output(#[from] io::Error),
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Loop iterations executed.
    pub iterations: u64,
    /// Ticks on which something moved, including those before a resume.
    pub tick_count: u32,
    pub saves: usize,
    pub state_hash: u64,
}

/// Load the starting state named by `config`.
pub fn initial_state(config: &RunConfig) -> Result<SimulationState, RunError> {
    match (&config.input, &config.save_file) {
        (Some(input), None) => {
            let desc = load_description(input)?;
            Ok(SimulationState::from_description(&desc)?)
        }
        (None, Some(save)) => Ok(load_state_file(save, config.state_frac_bits)?),
        (Some(_), Some(_)) => Err(ConfigError::ConflictingInputs.into()),
        (None, None) => Err(ConfigError::MissingInput.into()),
    }
}

/// Run the simulation described by `config`, writing rendered fields to
/// `out`.
pub fn run<W: Write>(config: &RunConfig, out: &mut W) -> Result<RunSummary, RunError> {
    config.validate()?;
    let state = initial_state(config)?;
    let engine_config = config.engine_config();

    let registry = EngineRegistry::standard();
    let mut sim = registry.build(&FactoryContext {
        p_type: config.p_type,
        v_type: config.v_type,
        v_flow_type: config.v_flow_type,
        state: &state,
        config: &engine_config,
    })?;
    log::info!(
        "running up to {} iterations with {} thread(s), saving every {} ticks to {}",
        config.max_iterations,
        config.threads,
        config.save_rate,
        config.save_dir.display()
    );

    let mut saves = 0;
    for i in 0..config.max_iterations {
        if !sim.step()? {
            continue;
        }
        if !config.quiet {
            writeln!(out, "Tick {i}:")?;
            out.write_all(sim.render_field().as_bytes())?;
        }
        if sim.tick_count() % config.save_rate == 0 {
            save_to_dir(&config.save_dir, &sim.state(), config.state_frac_bits)?;
            saves += 1;
        }
    }
    out.flush()?;

    let summary = RunSummary {
        iterations: config.max_iterations,
        tick_count: sim.tick_count(),
        saves,
        state_hash: sim.state().state_hash(),
    };
    log::info!(
        "finished: {} iterations, tick count {}, {} save(s), state hash {:016x}",
        summary.iterations,
        summary.tick_count,
        summary.saves,
        summary.state_hash
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::{Path, PathBuf};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fluxgrid_driver_{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    // Water resting on air, with a pillar in the air pocket.
    const SCENARIO: &str = "\
0.1
3
  0.01
. 1000
o 50
5 6
######
#..  #
# ## #
#    #
######
";

    fn config_for(dir: &Path) -> RunConfig {
        let input = dir.join("scenario.txt");
        fs::write(&input, SCENARIO).unwrap();
        RunConfig {
            input: Some(input),
            save_dir: dir.join("save"),
            save_rate: 1,
            max_iterations: 20,
            p_type: "fixed(64,32)".parse().unwrap(),
            ..RunConfig::default()
        }
    }

    #[test]
    fn renders_moving_ticks_and_saves_them() {
        let dir = temp_dir("render");
        let config = config_for(&dir);

        let mut out = Vec::new();
        let summary = run(&config, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(text.matches("Tick ").count(), summary.tick_count as usize);
        assert_eq!(summary.saves, summary.tick_count as usize);
        if summary.tick_count > 0 {
            assert!(text.starts_with("Tick "));
            assert!(text.contains("######\n"));
            let last = config.save_dir.join(summary.tick_count.to_string());
            let saved = load_state_file(&last, 16).unwrap();
            assert_eq!(saved.tick_count, summary.tick_count);
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn quiet_run_prints_nothing_and_is_repeatable() {
        let dir = temp_dir("quiet");
        let config = RunConfig {
            quiet: true,
            save_rate: 1000,
            ..config_for(&dir)
        };

        let mut out = Vec::new();
        let a = run(&config, &mut out).unwrap();
        assert!(out.is_empty());
        let b = run(&config, &mut Vec::new()).unwrap();
        assert_eq!(a, b);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn input_source_errors() {
        let dir = temp_dir("resume");
        let mut config = config_for(&dir);
        config.quiet = true;
        config.save_file = Some(dir.join("missing"));
        assert!(matches!(
            run(&config, &mut Vec::new()),
            Err(RunError::Config(ConfigError::ConflictingInputs))
        ));

        config.input = None;
        assert!(matches!(
            run(&config, &mut Vec::new()),
            Err(RunError::Save(SaveError::Io(_)))
        ));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unsupported_type_is_reported() {
        let dir = temp_dir("dispatch");
        let config = RunConfig {
            v_type: "fixed(16,8)".parse().unwrap(),
            ..config_for(&dir)
        };
        assert!(matches!(
            run(&config, &mut Vec::new()),
            Err(RunError::Dispatch(DispatchError::UnsupportedType { .. }))
        ));
        let _ = fs::remove_dir_all(&dir);
    }
}
