use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::analysis::constraints::{Component, ConstraintSystem};
use crate::*;

/// Components at or below this size are enumerated by exhaustive bitmask
/// scan; larger ones go through backtracking with unit propagation.
pub const SMALL_ENUMERATION_LIMIT: usize = 20;

/// Solution count and per-variable mine marginals for one component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Enumeration {
    pub solutions: u64,
    pub marginals: BTreeMap<Coord2, f64>,
    /// The solution cap was hit; marginals cover only the enumerated prefix.
    pub truncated: bool,
}

impl Enumeration {
    pub fn require_complete(&self) -> Result<&Self> {
        if self.truncated {
            Err(InferenceError::EnumerationTruncated)
        } else {
            Ok(self)
        }
    }
}

/// Counts satisfying assignments of a component and the per-variable mine
/// totals. Returns `None` when the component admits no solution at all.
pub fn enumerate_component(
    system: &ConstraintSystem,
    component: &Component,
    max_solutions: u64,
) -> Option<Enumeration> {
    Enumerator::new(system, component, max_solutions).run()
}

/// Strict variant for callers that need reliable marginals: unsatisfiable
/// components and capped enumerations become errors.
pub fn exact_marginals(
    system: &ConstraintSystem,
    component: &Component,
    max_solutions: u64,
) -> Result<BTreeMap<Coord2, f64>> {
    match enumerate_component(system, component, max_solutions) {
        None => Err(InferenceError::ImpossibleObservation),
        Some(enumeration) => {
            enumeration.require_complete()?;
            Ok(enumeration.marginals)
        }
    }
}

pub(crate) type LocalVars = SmallVec<[usize; 8]>;

pub(crate) struct LocalConstraint {
    pub vars: LocalVars,
    pub count: u8,
}

/// Per-constraint search state: assigned mines and still-open variables.
/// Counters are bounded by the 8-neighborhood.
#[derive(Copy, Clone)]
pub(crate) struct ConstraintState {
    pub ones: u8,
    pub open: u8,
}

/// One component re-indexed to dense local variable ids, shared by the exact
/// enumerator and the randomized sampler.
pub(crate) struct LocalProblem {
    pub positions: Vec<Coord2>,
    pub constraints: Vec<LocalConstraint>,
    pub var_to_constraints: Vec<LocalVars>,
}

impl LocalProblem {
    pub(crate) fn new(system: &ConstraintSystem, component: &Component) -> Self {
        let positions: Vec<Coord2> = component
            .variable_ids
            .iter()
            .map(|&var_id| system.position_of(var_id))
            .collect();
        let local_ids: HashMap<usize, usize> = component
            .variable_ids
            .iter()
            .enumerate()
            .map(|(local, &global)| (global, local))
            .collect();

        let constraints: Vec<LocalConstraint> = component
            .constraint_ids
            .iter()
            .map(|&constraint_id| {
                let constraint = &system.constraints[constraint_id];
                LocalConstraint {
                    vars: constraint.vars.iter().map(|global| local_ids[global]).collect(),
                    count: constraint.count,
                }
            })
            .collect();

        let mut var_to_constraints = vec![LocalVars::new(); positions.len()];
        for (index, constraint) in constraints.iter().enumerate() {
            for &local in &constraint.vars {
                var_to_constraints[local].push(index);
            }
        }

        Self {
            positions,
            constraints,
            var_to_constraints,
        }
    }

    pub(crate) fn var_count(&self) -> usize {
        self.positions.len()
    }

    pub(crate) fn initial_states(&self) -> Vec<ConstraintState> {
        self.constraints
            .iter()
            .map(|constraint| ConstraintState {
                ones: 0,
                open: constraint.vars.len() as u8,
            })
            .collect()
    }

    pub(crate) fn assign(
        &self,
        var: usize,
        value: u8,
        assignment: &mut [Option<u8>],
        states: &mut [ConstraintState],
    ) {
        assignment[var] = Some(value);
        for &index in &self.var_to_constraints[var] {
            states[index].open -= 1;
            if value == 1 {
                states[index].ones += 1;
            }
        }
    }

    /// Unit propagation to fixpoint: a constraint at its count clears its
    /// open variables, a constraint needing all of them sets them.
    pub(crate) fn propagate(
        &self,
        assignment: &mut [Option<u8>],
        states: &mut [ConstraintState],
    ) -> bool {
        loop {
            let mut changed = false;
            for index in 0..self.constraints.len() {
                let ConstraintState { ones, open } = states[index];
                let count = self.constraints[index].count;
                if open == 0 {
                    if ones != count {
                        return false;
                    }
                    continue;
                }
                if count < ones || count > ones + open {
                    return false;
                }
                if count == ones || count == ones + open {
                    let value = if count == ones { 0 } else { 1 };
                    let pending: LocalVars = self.constraints[index]
                        .vars
                        .iter()
                        .copied()
                        .filter(|&local| assignment[local].is_none())
                        .collect();
                    for local in pending {
                        self.assign(local, value, assignment, states);
                    }
                    changed = true;
                }
            }
            if !changed {
                return true;
            }
        }
    }

    pub(crate) fn feasible(&self, states: &[ConstraintState]) -> bool {
        self.constraints
            .iter()
            .zip(states)
            .all(|(constraint, state)| {
                state.ones <= constraint.count && constraint.count <= state.ones + state.open
            })
    }

    pub(crate) fn marginals(&self, true_counts: &[u64], solutions: u64) -> BTreeMap<Coord2, f64> {
        self.positions
            .iter()
            .zip(true_counts)
            .map(|(&position, &count)| (position, count as f64 / solutions as f64))
            .collect()
    }
}

struct Enumerator {
    problem: LocalProblem,
    max_solutions: u64,
    solutions: u64,
    true_counts: Vec<u64>,
    truncated: bool,
}

impl Enumerator {
    fn new(system: &ConstraintSystem, component: &Component, max_solutions: u64) -> Self {
        let problem = LocalProblem::new(system, component);
        Self {
            true_counts: vec![0; problem.var_count()],
            problem,
            max_solutions,
            solutions: 0,
            truncated: false,
        }
    }

    fn run(mut self) -> Option<Enumeration> {
        if self.problem.var_count() <= SMALL_ENUMERATION_LIMIT {
            self.run_naive();
        } else {
            self.run_search();
        }

        if self.solutions == 0 {
            return None;
        }

        log::trace!(
            "enumerated {} solutions over {} vars (truncated: {})",
            self.solutions,
            self.problem.var_count(),
            self.truncated
        );

        Some(Enumeration {
            solutions: self.solutions,
            marginals: self.problem.marginals(&self.true_counts, self.solutions),
            truncated: self.truncated,
        })
    }

    /// Exhaustive scan of all `2^n` assignments with a leaf check per
    /// constraint. Robust and bookkeeping-free for small components.
    fn run_naive(&mut self) {
        let var_count = self.problem.var_count();
        let masks: Vec<(u32, u32)> = self
            .problem
            .constraints
            .iter()
            .map(|constraint| {
                let mask = constraint
                    .vars
                    .iter()
                    .fold(0u32, |acc, &local| acc | 1 << local);
                (mask, u32::from(constraint.count))
            })
            .collect();

        for assignment in 0u32..1 << var_count {
            if self.truncated {
                return;
            }
            if masks
                .iter()
                .all(|&(mask, count)| (assignment & mask).count_ones() == count)
            {
                self.solutions += 1;
                for local in 0..var_count {
                    if assignment & (1 << local) != 0 {
                        self.true_counts[local] += 1;
                    }
                }
                if self.solutions >= self.max_solutions {
                    self.truncated = true;
                }
            }
        }
    }

    fn run_search(&mut self) {
        let mut assignment: Vec<Option<u8>> = vec![None; self.problem.var_count()];
        let mut states = self.problem.initial_states();
        self.search(&mut assignment, &mut states);
    }

    fn search(&mut self, assignment: &mut Vec<Option<u8>>, states: &mut Vec<ConstraintState>) {
        if self.truncated {
            return;
        }
        if !self.problem.propagate(assignment, states) {
            return;
        }

        if assignment.iter().all(Option::is_some) {
            self.solutions += 1;
            for (local, value) in assignment.iter().enumerate() {
                if *value == Some(1) {
                    self.true_counts[local] += 1;
                }
            }
            if self.solutions >= self.max_solutions {
                self.truncated = true;
            }
            return;
        }

        let Some(var) = self.select_variable(assignment) else {
            return;
        };

        let saved_assignment = assignment.clone();
        let saved_states = states.clone();
        for value in [0u8, 1u8] {
            self.problem.assign(var, value, assignment, states);
            if self.problem.feasible(states) {
                self.search(assignment, states);
            }
            assignment.copy_from_slice(&saved_assignment);
            states.copy_from_slice(&saved_states);
            if self.truncated {
                return;
            }
        }
    }

    /// Maximum static degree among unassigned variables.
    fn select_variable(&self, assignment: &[Option<u8>]) -> Option<usize> {
        let mut best = None;
        let mut best_degree = 0;
        for (local, value) in assignment.iter().enumerate() {
            if value.is_some() {
                continue;
            }
            let degree = self.problem.var_to_constraints[local].len();
            if best.is_none() || degree > best_degree {
                best = Some(local);
                best_degree = degree;
            }
        }
        best
    }
}
