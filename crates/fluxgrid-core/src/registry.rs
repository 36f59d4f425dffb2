//! Runtime selection of engine instantiations.
//!
//! The registry maps a `(pressure, velocity, flow)` triple of
//! [`NumericType`]s to a constructor closure producing a boxed
//! [`Simulation`]. The supported menu is explicit and fixed at startup so the
//! number of monomorphized engines stays bounded.

use std::collections::HashMap;
use std::fmt;

use crate::engine::{EngineConfig, FluidEngine, SimError, Simulation};
use crate::fixed::{FastFixed, Fixed};
use crate::numeric::NumericType;
use crate::scalar::Scalar;
use crate::state::SimulationState;

/// The three independently chosen numeric roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeRole {
    Pressure,
    Velocity,
    VelocityFlow,
}

impl fmt::Display for TypeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TypeRole::Pressure => "pressure",
            TypeRole::Velocity => "velocity",
            TypeRole::VelocityFlow => "velocity flow",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unsupported {role} type {ty}")]
    UnsupportedType { role: TypeRole, ty: NumericType },
    #[error("failed to build engine: {0}")]
    Engine(#[from] SimError),
}

/// Everything needed to construct an engine.
#[derive(Debug, Clone, Copy)]
pub struct FactoryContext<'a> {
    pub p_type: NumericType,
    pub v_type: NumericType,
    pub v_flow_type: NumericType,
    pub state: &'a SimulationState,
    pub config: &'a EngineConfig,
}

type Key = (NumericType, NumericType, NumericType);

type Constructor =
    Box<dyn Fn(&SimulationState, &EngineConfig) -> Result<Box<dyn Simulation>, SimError> + Send + Sync>;

/// Invoke `$f::<$pre.., T>(descriptor, $args..)` once for every scalar type on
/// the standard menu.
macro_rules! each_scalar {
    ($f:ident :: < $($pre:ty),* > ( $($arg:expr),* )) => {
        $f::<$($pre,)* f64>(NumericType::Double $(, $arg)*);
        $f::<$($pre,)* f32>(NumericType::Float $(, $arg)*);
        $f::<$($pre,)* Fixed<32, 16>>(NumericType::Fixed { bits: 32, frac: 16 } $(, $arg)*);
        $f::<$($pre,)* Fixed<64, 32>>(NumericType::Fixed { bits: 64, frac: 32 } $(, $arg)*);
        $f::<$($pre,)* FastFixed<32, 16>>(NumericType::FastFixed { bits: 32, frac: 16 } $(, $arg)*);
        $f::<$($pre,)* FastFixed<64, 32>>(NumericType::FastFixed { bits: 64, frac: 32 } $(, $arg)*);
    };
}

/// Table of engine constructors keyed by numeric type triple.
pub struct EngineRegistry {
    constructors: HashMap<Key, Constructor>,
    menu: Vec<NumericType>,
}

impl EngineRegistry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
            menu: Vec::new(),
        }
    }

    /// Every combination of `double`, `float`, `fixed(32,16)`,
    /// `fixed(64,32)`, `fast_fixed(32,16)` and `fast_fixed(64,32)`.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        each_scalar!(register_pressure::<>(&mut registry));
        registry
    }

    /// Register the engine for one concrete `(P, V, VF)` triple.
    pub fn register<P: Scalar, V: Scalar, VF: Scalar>(&mut self, key: Key) {
        for ty in [key.0, key.1, key.2] {
            if !self.menu.contains(&ty) {
                self.menu.push(ty);
            }
        }
        self.constructors.insert(
            key,
            Box::new(|state: &SimulationState, config: &EngineConfig| {
                let engine = FluidEngine::<P, V, VF>::new(state, config)?;
                Ok(Box::new(engine) as Box<dyn Simulation>)
            }),
        );
    }

    /// Number of registered triples.
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// Types that appear in at least one registered triple.
    pub fn menu(&self) -> &[NumericType] {
        &self.menu
    }

    pub fn supports(&self, p: NumericType, v: NumericType, vf: NumericType) -> bool {
        self.constructors.contains_key(&(p, v, vf))
    }

    /// Construct the engine matching the context's type triple.
    pub fn build(&self, ctx: &FactoryContext<'_>) -> Result<Box<dyn Simulation>, DispatchError> {
        for (role, ty) in [
            (TypeRole::Pressure, ctx.p_type),
            (TypeRole::Velocity, ctx.v_type),
            (TypeRole::VelocityFlow, ctx.v_flow_type),
        ] {
            if !self.menu.contains(&ty) {
                return Err(DispatchError::UnsupportedType { role, ty });
            }
        }

        let key = (ctx.p_type, ctx.v_type, ctx.v_flow_type);
        let constructor = self
            .constructors
            .get(&key)
            .ok_or(DispatchError::UnsupportedType {
                role: TypeRole::Pressure,
                ty: ctx.p_type,
            })?;

        log::info!(
            "building engine: pressure={} velocity={} flow={} on {}x{} grid",
            ctx.p_type,
            ctx.v_type,
            ctx.v_flow_type,
            ctx.state.height,
            ctx.state.width
        );
        Ok(constructor(ctx.state, ctx.config)?)
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("menu", &self.menu)
            .field("engines", &self.constructors.len())
            .finish()
    }
}

fn register_pressure<P: Scalar>(p: NumericType, registry: &mut EngineRegistry) {
    each_scalar!(register_velocity::<P>(registry, p));
}

fn register_velocity<P: Scalar, V: Scalar>(v: NumericType, registry: &mut EngineRegistry, p: NumericType) {
    each_scalar!(register_flow::<P, V>(registry, p, v));
}

fn register_flow<P: Scalar, V: Scalar, VF: Scalar>(
    vf: NumericType,
    registry: &mut EngineRegistry,
    p: NumericType,
    v: NumericType,
) {
    registry.register::<P, V, VF>((p, v, vf));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::SimFixed;
    use crate::grid::{PLAIN_FLUID, RHO_SIZE};
    use crate::state::SimulationDescription;

    fn state() -> SimulationState {
        let mut rho = [SimFixed::zero(); RHO_SIZE];
        rho[PLAIN_FLUID as usize] = SimFixed::from_int(1);
        let desc =
            SimulationDescription::from_rows(SimFixed::from_f64(0.1), rho, &["####", "#..#", "####"])
                .unwrap();
        SimulationState::from_description(&desc).unwrap()
    }

    fn ctx<'a>(
        p: &str,
        v: &str,
        vf: &str,
        state: &'a SimulationState,
        config: &'a EngineConfig,
    ) -> FactoryContext<'a> {
        FactoryContext {
            p_type: p.parse().unwrap(),
            v_type: v.parse().unwrap(),
            v_flow_type: vf.parse().unwrap(),
            state,
            config,
        }
    }

    #[test]
    fn standard_menu_has_every_combination() {
        let registry = EngineRegistry::standard();
        assert_eq!(registry.menu().len(), 6);
        assert_eq!(registry.len(), 216);
        assert!(registry.supports(
            NumericType::Double,
            NumericType::Fixed { bits: 32, frac: 16 },
            NumericType::FastFixed { bits: 64, frac: 32 },
        ));
    }

    #[test]
    fn builds_mixed_engine() {
        let registry = EngineRegistry::standard();
        let (s, config) = (state(), EngineConfig::default());
        let mut sim = registry
            .build(&ctx("fixed(32,16)", "double", "fast_fixed(64,32)", &s, &config))
            .unwrap();
        sim.step().unwrap();
        assert_eq!(sim.state().field, s.field);
    }

    #[test]
    fn unsupported_role_is_reported() {
        let registry = EngineRegistry::standard();
        let (s, config) = (state(), EngineConfig::default());
        let err = registry
            .build(&ctx("double", "fixed(16,8)", "double", &s, &config))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            DispatchError::UnsupportedType {
                role: TypeRole::Velocity,
                ty: NumericType::Fixed { bits: 16, frac: 8 }
            }
        ));
        assert_eq!(err.to_string(), "unsupported velocity type fixed(16,8)");
    }

    #[test]
    fn engine_errors_surface() {
        let registry = EngineRegistry::standard();
        let mut s = state();
        s.dirs.pop();
        let config = EngineConfig::default();
        let err = registry
            .build(&ctx("double", "double", "double", &s, &config))
            .err()
            .unwrap();
        assert!(matches!(err, DispatchError::Engine(SimError::DimensionMismatch { .. })));
    }

    #[test]
    fn custom_registry_only_knows_what_it_registered() {
        let mut registry = EngineRegistry::empty();
        assert!(registry.is_empty());
        registry.register::<f64, f64, f32>((NumericType::Double, NumericType::Double, NumericType::Float));
        assert_eq!(registry.len(), 1);

        let (s, config) = (state(), EngineConfig::default());
        assert!(registry.build(&ctx("double", "double", "float", &s, &config)).is_ok());
        // Every role is on the menu, but this triple was never registered.
        assert!(registry.build(&ctx("float", "double", "double", &s, &config)).is_err());
    }
}
