use alloc::collections::BTreeSet;
use alloc::vec;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

pub use constraints::{
    build_constraints, Component, Constraint, ConstraintSystem, SystemStats, Variable,
};
pub use deduce::{CertaintyProver, ProvenValues};
pub use enumerate::{
    enumerate_component, exact_marginals, Enumeration, SMALL_ENUMERATION_LIMIT,
};
pub use propagate::{forced_partition, propagate, Consistency, Domain};
pub use risk::{risk, RiskConfig};
pub use sample::{sample_component, SamplerConfig};

pub mod constraints;
pub mod deduce;
pub mod enumerate;
pub mod propagate;
pub mod risk;
pub mod sample;

use crate::*;

/// Risk values within this distance of the minimum count as tied.
pub const RISK_TIE_EPSILON: f64 = 1e-12;

/// Cells proven safe or mined across all assignments consistent with the
/// current knowledge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deduction {
    pub safe: BTreeSet<Coord2>,
    pub mines: BTreeSet<Coord2>,
}

impl Deduction {
    pub fn is_empty(&self) -> bool {
        self.safe.is_empty() && self.mines.is_empty()
    }
}

/// What the driver should do next.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    FlagAll(Vec<Coord2>),
    RevealAllSafe(Vec<Coord2>),
    Reveal(Coord2),
    NoMove,
}

/// Runs the deductive stack: constraint build, bound-consistency pruning,
/// then per-variable certainty proofs on whatever is left undecided.
///
/// A globally unsatisfiable constraint set means some earlier observation or
/// flag was wrong and is surfaced as [`InferenceError::ImpossibleObservation`].
pub fn infer(knowledge: &Knowledge, known_mines: &BTreeSet<Coord2>) -> Result<Deduction> {
    let system = build_constraints(knowledge, known_mines)?;
    let mut domains = vec![Domain::BOTH; system.variables.len()];
    if !propagate(&system, &mut domains).is_consistent() {
        return Err(InferenceError::ImpossibleObservation);
    }

    let mut deduction = Deduction::default();
    let (gac_safe, gac_mines) = forced_partition(&domains);
    deduction
        .safe
        .extend(gac_safe.iter().map(|&var_id| system.position_of(var_id)));
    deduction
        .mines
        .extend(gac_mines.iter().map(|&var_id| system.position_of(var_id)));

    let proven = CertaintyProver::new(&system, &domains).prove();
    deduction
        .safe
        .extend(proven.safe.iter().map(|&var_id| system.position_of(var_id)));
    deduction
        .mines
        .extend(proven.mines.iter().map(|&var_id| system.position_of(var_id)));

    Ok(deduction)
}

/// Picks the next move: flag every provable mine, else reveal every provable
/// safe, else reveal the minimum-risk unknown cell.
pub fn choose_action(
    knowledge: &Knowledge,
    moves_made: &BTreeSet<Coord2>,
    known_mines: &BTreeSet<Coord2>,
    total_mines: Option<CellCount>,
    config: &RiskConfig,
) -> Result<Action> {
    let deduction = infer(knowledge, known_mines)?;

    let to_flag: Vec<Coord2> = deduction
        .mines
        .iter()
        .copied()
        .filter(|&position| {
            knowledge.cell_at(position).is_unknown()
                && !known_mines.contains(&position)
                && !moves_made.contains(&position)
        })
        .collect();
    if !to_flag.is_empty() {
        return Ok(Action::FlagAll(to_flag));
    }

    let to_reveal: Vec<Coord2> = deduction
        .safe
        .iter()
        .copied()
        .filter(|&position| {
            knowledge.cell_at(position).is_unknown() && !moves_made.contains(&position)
        })
        .collect();
    if !to_reveal.is_empty() {
        return Ok(Action::RevealAllSafe(to_reveal));
    }

    let probs = risk::risk(knowledge, known_mines, total_mines, config)?;
    let forbidden =
        |position: &Coord2| moves_made.contains(position) || known_mines.contains(position);

    let mut minimum = f64::INFINITY;
    for (position, &p) in &probs {
        if !forbidden(position) && p < minimum {
            minimum = p;
        }
    }

    if minimum.is_finite() {
        // Among the tied minimum-risk cells, prefer the one whose reveal
        // promises the most information; remaining ties fall back to
        // row-major order via the map's iteration order.
        let mut best: Option<(Coord2, usize)> = None;
        for (&position, &p) in &probs {
            if forbidden(&position) || (p - minimum).abs() > RISK_TIE_EPSILON {
                continue;
            }
            let info = informativeness(knowledge, position);
            let better = match best {
                None => true,
                Some((_, best_info)) => info > best_info,
            };
            if better {
                best = Some((position, info));
            }
        }
        if let Some((position, _)) = best {
            return Ok(Action::Reveal(position));
        }
    }

    // No scored candidate (empty frontier with no mine budget, or everything
    // forbidden): first open cell in row-major order, if any.
    for position in knowledge.iter_positions() {
        if knowledge.cell_at(position).is_unknown() && !forbidden(&position) {
            return Ok(Action::Reveal(position));
        }
    }
    Ok(Action::NoMove)
}

/// Number of unrevealed neighbors a reveal at `position` would inform.
fn informativeness(knowledge: &Knowledge, position: Coord2) -> usize {
    knowledge
        .iter_neighbors(position)
        .filter(|&neighbor| knowledge.cell_at(neighbor).is_unknown())
        .count()
}
