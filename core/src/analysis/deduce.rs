use alloc::vec;
use alloc::vec::Vec;

use crate::analysis::constraints::{Component, ConstraintSystem};
use crate::analysis::propagate::Domain;

/// Variables proven to hold a single value across all satisfying assignments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProvenValues {
    pub safe: Vec<usize>,
    pub mines: Vec<usize>,
}

/// Proves forced values that bound-consistency alone cannot reach.
///
/// For every undecided variable, both polarities are tested against the rest
/// of its component: if only one extends to a satisfying assignment, the
/// variable is forced. A variable where neither extends is an observation
/// error; it yields no deduction and the caller defers to risk.
pub struct CertaintyProver<'a> {
    system: &'a ConstraintSystem,
    domains: &'a [Domain],
}

impl<'a> CertaintyProver<'a> {
    pub fn new(system: &'a ConstraintSystem, domains: &'a [Domain]) -> Self {
        Self { system, domains }
    }

    pub fn prove(&self) -> ProvenValues {
        let mut proven = ProvenValues::default();

        for component in &self.system.components {
            for &var_id in &component.variable_ids {
                if self.domains[var_id].forced().is_some() {
                    continue;
                }

                let can_be_safe = self.extensible(component, var_id, 0);
                let can_be_mine = self.extensible(component, var_id, 1);
                match (can_be_safe, can_be_mine) {
                    (true, false) => proven.safe.push(var_id),
                    (false, true) => proven.mines.push(var_id),
                    (false, false) => log::debug!(
                        "no polarity of {:?} is satisfiable, deferring to risk",
                        self.system.position_of(var_id)
                    ),
                    (true, true) => {}
                }
            }
        }

        proven
    }

    /// Whether fixing `var_id = value` extends to a full assignment of the
    /// component satisfying every constraint.
    fn extensible(&self, component: &Component, var_id: usize, value: u8) -> bool {
        let mut assignment: Vec<Option<u8>> = vec![None; self.system.variables.len()];
        for &other in &component.variable_ids {
            assignment[other] = self.domains[other].forced();
        }
        assignment[var_id] = Some(value);

        if !self.feasible(component, &assignment) {
            return false;
        }

        let unassigned: Vec<usize> = component
            .variable_ids
            .iter()
            .copied()
            .filter(|&other| assignment[other].is_none())
            .collect();
        self.backtrack(component, &mut assignment, unassigned)
    }

    fn backtrack(
        &self,
        component: &Component,
        assignment: &mut Vec<Option<u8>>,
        unassigned: Vec<usize>,
    ) -> bool {
        if unassigned.is_empty() {
            // With nothing left unassigned, feasibility is exact satisfaction.
            return self.feasible(component, assignment);
        }

        let var_id = self.select_variable(component, assignment, &unassigned);
        let rest: Vec<usize> = unassigned
            .iter()
            .copied()
            .filter(|&other| other != var_id)
            .collect();

        for value in [0u8, 1u8] {
            if !self.domains[var_id].allows(value) {
                continue;
            }
            assignment[var_id] = Some(value);
            if self.feasible(component, assignment)
                && self.backtrack(component, assignment, rest.clone())
            {
                assignment[var_id] = None;
                return true;
            }
            assignment[var_id] = None;
        }

        false
    }

    /// MRV with degree tie-break: fewest feasible values first, then the
    /// variable sharing constraints with the most still-unassigned peers.
    fn select_variable(
        &self,
        component: &Component,
        assignment: &mut Vec<Option<u8>>,
        unassigned: &[usize],
    ) -> usize {
        let mut best = unassigned[0];
        let mut best_legal = usize::MAX;
        let mut best_degree = 0;

        for &var_id in unassigned {
            let mut legal = 0;
            for value in [0u8, 1u8] {
                if !self.domains[var_id].allows(value) {
                    continue;
                }
                assignment[var_id] = Some(value);
                if self.feasible(component, assignment) {
                    legal += 1;
                }
                assignment[var_id] = None;
            }

            let degree = self.degree(var_id, assignment);
            if legal < best_legal || (legal == best_legal && degree > best_degree) {
                best = var_id;
                best_legal = legal;
                best_degree = degree;
            }
        }

        best
    }

    fn degree(&self, var_id: usize, assignment: &[Option<u8>]) -> usize {
        self.system.var_to_constraints[var_id]
            .iter()
            .map(|&constraint_id| {
                self.system.constraints[constraint_id]
                    .vars
                    .iter()
                    .filter(|&&other| other != var_id && assignment[other].is_none())
                    .count()
            })
            .sum()
    }

    /// Feasibility of a partial assignment: every constraint must be able to
    /// reach its count with the variables still open.
    fn feasible(&self, component: &Component, assignment: &[Option<u8>]) -> bool {
        for &constraint_id in &component.constraint_ids {
            let constraint = &self.system.constraints[constraint_id];
            let mut assigned_ones = 0u8;
            let mut open = 0u8;
            for &var_id in &constraint.vars {
                match assignment[var_id] {
                    Some(1) => assigned_ones += 1,
                    Some(_) => {}
                    None => open += 1,
                }
            }
            if constraint.count < assigned_ones || constraint.count > assigned_ones + open {
                return false;
            }
        }
        true
    }
}
