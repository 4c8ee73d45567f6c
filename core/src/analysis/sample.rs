use alloc::vec;
use alloc::vec::Vec;

use rand::rngs::SmallRng;
use rand::{RngExt, SeedableRng};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::analysis::constraints::{Component, ConstraintSystem};
use crate::analysis::enumerate::{ConstraintState, Enumeration, LocalProblem, LocalVars};

/// Budget for one randomized estimation run. The seed makes the estimate a
/// deterministic function of the inputs; there is no wall-clock bound.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub max_samples: u64,
    pub max_nodes: u64,
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            max_samples: 2000,
            max_nodes: 100_000,
            seed: 0,
        }
    }
}

/// Estimates mine marginals on a component by randomized backtracking with
/// forward-checking, stopping after `max_samples` accepted solutions or
/// `max_nodes` expansions. Returns `None` when no solution was found within
/// the budget.
pub fn sample_component(
    system: &ConstraintSystem,
    component: &Component,
    config: SamplerConfig,
) -> Option<Enumeration> {
    RandomizedSampler::new(system, component, config).run()
}

struct RandomizedSampler {
    problem: LocalProblem,
    config: SamplerConfig,
    rng: SmallRng,
    samples: u64,
    nodes: u64,
    true_counts: Vec<u64>,
    capped: bool,
}

impl RandomizedSampler {
    fn new(system: &ConstraintSystem, component: &Component, config: SamplerConfig) -> Self {
        let problem = LocalProblem::new(system, component);
        Self {
            true_counts: vec![0; problem.var_count()],
            rng: SmallRng::seed_from_u64(config.seed),
            problem,
            config,
            samples: 0,
            nodes: 0,
            capped: false,
        }
    }

    fn run(mut self) -> Option<Enumeration> {
        let mut assignment: Vec<Option<u8>> = vec![None; self.problem.var_count()];
        let mut states = self.problem.initial_states();
        self.search(&mut assignment, &mut states);

        if self.samples == 0 {
            return None;
        }

        log::trace!(
            "sampled {} solutions over {} nodes (capped: {})",
            self.samples,
            self.nodes,
            self.capped
        );

        Some(Enumeration {
            solutions: self.samples,
            marginals: self.problem.marginals(&self.true_counts, self.samples),
            truncated: self.capped,
        })
    }

    fn search(&mut self, assignment: &mut Vec<Option<u8>>, states: &mut Vec<ConstraintState>) {
        if self.out_of_budget() {
            return;
        }
        self.nodes += 1;

        if !self.problem.propagate(assignment, states) {
            return;
        }

        if assignment.iter().all(Option::is_some) {
            self.samples += 1;
            for (local, value) in assignment.iter().enumerate() {
                if *value == Some(1) {
                    self.true_counts[local] += 1;
                }
            }
            return;
        }

        let Some(var) = self.select_variable(assignment) else {
            return;
        };

        let first: u8 = if self.rng.random() { 1 } else { 0 };
        let saved_assignment = assignment.clone();
        let saved_states = states.clone();
        for value in [first, 1 - first] {
            self.problem.assign(var, value, assignment, states);
            if self.problem.feasible(states) {
                self.search(assignment, states);
            }
            assignment.copy_from_slice(&saved_assignment);
            states.copy_from_slice(&saved_states);
            if self.out_of_budget() {
                return;
            }
        }
    }

    /// Random choice among the minimum-degree unassigned variables.
    fn select_variable(&mut self, assignment: &[Option<u8>]) -> Option<usize> {
        let mut best_degree = usize::MAX;
        let mut candidates: LocalVars = SmallVec::new();
        for (local, value) in assignment.iter().enumerate() {
            if value.is_some() {
                continue;
            }
            let degree = self.problem.var_to_constraints[local].len();
            if degree < best_degree {
                best_degree = degree;
                candidates.clear();
                candidates.push(local);
            } else if degree == best_degree {
                candidates.push(local);
            }
        }

        if candidates.is_empty() {
            None
        } else {
            Some(candidates[self.rng.random_range(0..candidates.len())])
        }
    }

    fn out_of_budget(&mut self) -> bool {
        if self.samples >= self.config.max_samples || self.nodes >= self.config.max_nodes {
            self.capped = true;
            true
        } else {
            false
        }
    }
}
