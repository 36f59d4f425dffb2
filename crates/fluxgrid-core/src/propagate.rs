//! Recursive traversals over the grid: flow augmentation (phase C) and
//! chained particle relocation (phase E).
//!
//! Both use the generation counter instead of visited sets. Within one
//! generation `ut`:
//!
//! - `last_use == ut - 1` marks a cell that is on the current recursion path
//!   (or, for movement, the cell the chain started from);
//! - `last_use == ut` marks a cell finished for this generation;
//! - anything lower is unvisited.

use crate::fixed::SimFixed;
use crate::grid::{Cell, Direction, Grid};
use crate::rng::SimRng;
use crate::scalar::Scalar;

/// Outcome of one [`Grid::propagate_flow`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FlowStep {
    /// Flow committed below this call.
    pub amount: SimFixed,
    /// Whether an augmenting path is still being unwound to the caller.
    pub augmented: bool,
    /// Cell where the augmenting path closed.
    pub end: Cell,
}

impl<P: Scalar, V: Scalar, VF: Scalar> Grid<P, V, VF> {
    /// Search for one augmenting path starting at `cell`, pushing at most
    /// `limit` along it.
    pub(crate) fn propagate_flow(&mut self, cell: Cell, limit: SimFixed) -> FlowStep {
        let ut = self.ut;
        self.last_use[cell] = ut - 1;
        let mut total = SimFixed::zero();

        for dir in Direction::ALL {
            let Some(next) = self.open_neighbour(cell, dir) else {
                continue;
            };
            if self.last_use[next] >= ut {
                continue;
            }

            let d = dir.index();
            let Some(push) = headroom(self.flow[cell][d], self.velocity[cell][d], limit.cast())
            else {
                continue;
            };
            if self.last_use[next] == ut - 1 {
                self.flow[cell][d] += push;
                self.last_use[cell] = ut;
                return FlowStep {
                    amount: push.cast(),
                    augmented: true,
                    end: next,
                };
            }

            let step = self.propagate_flow(next, push.cast());
            total += step.amount;
            if step.augmented {
                self.flow[cell][d] += step.amount.cast::<VF>();
                self.last_use[cell] = ut;
                return FlowStep {
                    amount: step.amount,
                    augmented: step.end != cell,
                    end: step.end,
                };
            }
        }

        self.last_use[cell] = ut;
        FlowStep {
            amount: total,
            augmented: false,
            end: cell,
        }
    }

    /// Sum of the positive velocity toward open neighbours not yet finished
    /// this generation.
    pub(crate) fn move_probability(&self, cell: Cell) -> SimFixed {
        let mut sum = SimFixed::zero();
        for dir in Direction::ALL {
            let Some(next) = self.open_neighbour(cell, dir) else {
                continue;
            };
            if self.last_use[next] == self.ut {
                continue;
            }
            let v = self.velocity[cell][dir.index()];
            if v > V::zero() {
                sum += v.cast::<SimFixed>();
            }
        }
        sum
    }

    /// Mark `cell` finished and cascade into neighbours that have nowhere else
    /// to go. Unless `force` is set, a cell that still has positive velocity
    /// toward an unvisited open neighbour is left alone.
    pub(crate) fn propagate_stop(&mut self, cell: Cell, force: bool) {
        let ut = self.ut;
        if !force {
            for dir in Direction::ALL {
                if let Some(next) = self.open_neighbour(cell, dir) {
                    if self.last_use[next] < ut - 1
                        && self.velocity[cell][dir.index()] > V::zero()
                    {
                        return;
                    }
                }
            }
        }

        self.last_use[cell] = ut;
        for dir in Direction::ALL {
            let Some(next) = self.open_neighbour(cell, dir) else {
                continue;
            };
            if self.last_use[next] == ut || self.velocity[cell][dir.index()] > V::zero() {
                continue;
            }
            self.propagate_stop(next, false);
        }
    }

    /// Try to move the particle at `cell` along a randomly chosen direction,
    /// weighted by positive velocity. A chain succeeds when it returns to the
    /// cell it started from; every non-first cell on a successful chain swaps
    /// its contents forward.
    pub(crate) fn propagate_move(&mut self, cell: Cell, is_first: bool, rng: &mut SimRng) -> bool {
        let ut = self.ut;
        self.last_use[cell] = if is_first { ut - 1 } else { ut };

        let mut excluded = [false; 4];
        let mut target = None;
        loop {
            let mut cumulative = [SimFixed::zero(); 4];
            let mut sum = SimFixed::zero();
            for dir in Direction::ALL {
                let d = dir.index();
                if !excluded[d] {
                    if let Some(next) = self.open_neighbour(cell, dir) {
                        let v = self.velocity[cell][d];
                        if self.last_use[next] != ut && v > V::zero() {
                            sum += v.cast::<SimFixed>();
                        }
                    }
                }
                cumulative[d] = sum;
            }

            if sum <= SimFixed::zero() {
                break;
            }

            let threshold = rng.fraction() * sum;
            let Some(dir) = Direction::ALL
                .into_iter()
                .find(|dir| cumulative[dir.index()] > threshold)
            else {
                break;
            };
            let Some(next) = self.open_neighbour(cell, dir) else {
                break;
            };

            if self.last_use[next] == ut - 1 || self.propagate_move(next, false, rng) {
                target = Some(next);
                break;
            }
            excluded[dir.index()] = true;
        }

        self.last_use[cell] = ut;
        for dir in Direction::ALL {
            let Some(next) = self.open_neighbour(cell, dir) else {
                continue;
            };
            if self.last_use[next] < ut - 1 && self.velocity[cell][dir.index()] < V::zero() {
                self.propagate_stop(next, false);
            }
        }

        match target {
            Some(next) => {
                if !is_first {
                    self.swap_contents(cell, next);
                }
                true
            }
            None => false,
        }
    }
}

/// The largest amount up to `want` that can be added to `flow` while the sum,
/// read back in the velocity type, stays within `cap`. `None` when nothing
/// positive fits.
///
/// The bound is checked on the committed value because `cap` may round up
/// when it is converted into the flow type.
fn headroom<V: Scalar, VF: Scalar>(flow: VF, cap: V, want: VF) -> Option<VF> {
    let cap_vf: VF = cap.cast();
    if !(flow < cap_vf) {
        return None;
    }
    let half = VF::from_f64(0.5);
    let mut push = want.min_of(cap_vf - flow);
    while push > VF::zero() {
        if (flow + push).cast::<V>() <= cap {
            return Some(push);
        }
        push *= half;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{PLAIN_FLUID, RHO_SIZE};
    use crate::state::{SimulationDescription, SimulationState};

    type G = Grid<SimFixed, SimFixed, SimFixed>;

    fn grid(rows: &[&str]) -> G {
        let mut rho = [SimFixed::zero(); RHO_SIZE];
        rho[PLAIN_FLUID as usize] = SimFixed::from_int(1);
        rho[b'o' as usize] = SimFixed::from_int(1);
        let desc = SimulationDescription::from_rows(SimFixed::zero(), rho, rows).unwrap();
        Grid::from_state(&SimulationState::from_description(&desc).unwrap()).unwrap()
    }

    fn fx(v: f64) -> SimFixed {
        SimFixed::from_f64(v)
    }

    const RIGHT: usize = 3;
    const LEFT: usize = 2;

    #[test]
    fn flow_closes_two_cell_cycle_at_bottleneck() {
        let mut g = grid(&["####", "#..#", "####"]);
        g.velocity[(1, 1)][RIGHT] = fx(0.5);
        g.velocity[(1, 2)][LEFT] = fx(0.25);
        g.ut = 2;

        let step = g.propagate_flow((1, 1), SimFixed::from_int(1));
        // (1,1) -> (1,2) -> back to (1,1): bottleneck is the 0.25 edge.
        assert_eq!(step.amount, fx(0.25));
        assert!(!step.augmented);
        assert_eq!(g.flow[(1, 2)][LEFT], fx(0.25));
        assert_eq!(g.flow[(1, 1)][RIGHT], fx(0.25));
        assert_eq!(g.last_use[(1, 1)], 2);
        assert_eq!(g.last_use[(1, 2)], 2);
    }

    #[test]
    fn flow_respects_limit() {
        let mut g = grid(&["####", "#..#", "####"]);
        g.velocity[(1, 1)][RIGHT] = fx(3.0);
        g.velocity[(1, 2)][LEFT] = fx(3.0);
        g.ut = 2;

        let step = g.propagate_flow((1, 1), SimFixed::from_int(1));
        assert_eq!(step.amount, SimFixed::from_int(1));
        assert_eq!(g.flow[(1, 1)][RIGHT], SimFixed::from_int(1));
    }

    #[test]
    fn flow_skips_saturated_edges() {
        let mut g = grid(&["####", "#..#", "####"]);
        g.velocity[(1, 1)][RIGHT] = fx(0.5);
        g.ut = 2;

        let step = g.propagate_flow((1, 1), SimFixed::from_int(1));
        // No edge back from (1,2), so nothing closes.
        assert_eq!(step.amount, SimFixed::zero());
        assert!(g.flow.iter().all(|f| f.iter().all(|v| *v == SimFixed::zero())));
    }

    #[test]
    fn move_probability_sums_positive_open_velocity() {
        let mut g = grid(&["####", "#..#", "####"]);
        g.velocity[(1, 1)] = [fx(1.0), fx(1.0), fx(-1.0), fx(0.5)];
        g.ut = 4;
        // Up, down and left are walls; only right counts.
        assert_eq!(g.move_probability((1, 1)), fx(0.5));

        g.last_use[(1, 2)] = 4;
        assert_eq!(g.move_probability((1, 1)), SimFixed::zero());
    }

    #[test]
    fn two_cell_cycle_swaps_contents() {
        let mut g = grid(&["####", "#.o#", "####"]);
        g.velocity[(1, 1)][RIGHT] = fx(1.0);
        g.velocity[(1, 2)][LEFT] = fx(1.0);
        g.p[(1, 1)] = fx(2.0);
        g.ut = 2;

        let mut rng = SimRng::new(9);
        assert!(g.propagate_move((1, 1), true, &mut rng));
        assert_eq!(g.render_field(), "####\n#o.#\n####\n");
        assert_eq!(g.p[(1, 2)], fx(2.0));
        assert_eq!(g.last_use[(1, 1)], 2);
        assert_eq!(g.last_use[(1, 2)], 2);
    }

    #[test]
    fn move_without_cycle_fails_and_keeps_field() {
        let mut g = grid(&["#####", "#.o.#", "#####"]);
        g.velocity[(1, 1)][RIGHT] = fx(1.0);
        g.velocity[(1, 2)][RIGHT] = fx(1.0);
        g.ut = 2;

        let mut rng = SimRng::new(3);
        assert!(!g.propagate_move((1, 1), true, &mut rng));
        assert_eq!(g.render_field(), "#####\n#.o.#\n#####\n");
        assert!(g.last_use.iter().all(|&u| u == 0 || u == 2));
    }

    #[test]
    fn stop_cascades_through_non_positive_edges() {
        let mut g = grid(&["#####", "#...#", "#####"]);
        g.ut = 2;
        g.propagate_stop((1, 1), true);
        assert_eq!(g.last_use[(1, 1)], 2);
        assert_eq!(g.last_use[(1, 2)], 2);
        assert_eq!(g.last_use[(1, 3)], 2);
    }

    #[test]
    fn stop_leaves_cells_that_can_still_move() {
        let mut g = grid(&["#####", "#...#", "#####"]);
        g.velocity[(1, 2)][RIGHT] = fx(1.0);
        g.ut = 2;
        g.propagate_stop((1, 1), true);
        assert_eq!(g.last_use[(1, 1)], 2);
        assert_eq!(g.last_use[(1, 2)], 0);
        assert_eq!(g.last_use[(1, 3)], 0);
    }

    #[test]
    fn headroom_never_rounds_past_capacity() {
        // 0.1 in f32 is slightly above 0.1 in f64.
        let cap = 0.1f64;
        assert!((cap as f32) as f64 > cap);
        let push = headroom(0.0f32, cap, 1.0f32).unwrap();
        assert!(push > 0.0);
        assert!((push as f64) <= cap);

        let flow = 0.05f32;
        let push = headroom(flow, cap, 1.0f32).unwrap();
        assert!(((flow + push) as f64) <= cap);
    }

    #[test]
    fn headroom_is_none_when_saturated() {
        assert_eq!(headroom(0.5f32, 0.5f64, 1.0f32), None);
        assert_eq!(headroom(fx(0.5), fx(0.25), fx(1.0)), None);
        assert_eq!(headroom(fx(0.25), fx(0.5), fx(1.0)), Some(fx(0.25)));
        assert_eq!(headroom(fx(0.25), fx(0.5), fx(0.125)), Some(fx(0.125)));
    }

    #[test]
    fn zero_probability_cell_is_never_relocated() {
        let mut g = grid(&["#####", "#.o.#", "#####"]);
        // Only non-positive velocities: nothing to move along.
        g.velocity[(1, 2)] = [fx(0.0), fx(0.0), fx(-1.0), fx(0.0)];
        g.ut = 2;
        assert_eq!(g.move_probability((1, 2)), SimFixed::zero());

        let mut rng = SimRng::new(5);
        for _ in 0..100 {
            assert!(!(rng.fraction() < g.move_probability((1, 2))));
        }
        assert!(!g.propagate_move((1, 2), true, &mut rng));
        assert_eq!(g.render_field(), "#####\n#.o.#\n#####\n");
    }
}
