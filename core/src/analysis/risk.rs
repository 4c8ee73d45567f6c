use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::analysis::constraints::{build_constraints, counts_as_mine, is_candidate};
use crate::analysis::enumerate::enumerate_component;
use crate::analysis::sample::{sample_component, SamplerConfig};
use crate::*;

/// Tuning for one risk evaluation. Travels with the call; there is no global
/// configuration.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Components above this size skip exact enumeration.
    pub max_vars_exact: usize,
    /// Solution cap for exact enumeration.
    pub max_solutions: u64,
    /// Weight of local pressure when blending heuristic cells.
    pub alpha: f64,
    /// Enables soft calibration of heuristic cells against the mine budget.
    pub calibrate: bool,
    /// Optional randomized estimation for oversized components.
    pub sampler: Option<SamplerConfig>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_vars_exact: 22,
            max_solutions: 200_000,
            alpha: 0.7,
            calibrate: true,
            sampler: None,
        }
    }
}

/// Computes `P(mine)` for every current unknown cell.
///
/// Small frontier components get exact marginals, which are pinned and never
/// blended or rescaled. Everything else starts from a budget-derived prior,
/// is pulled toward the local-pressure heuristic, and is softly rescaled so
/// the heuristic mass approaches the remaining mine budget.
pub fn risk(
    knowledge: &Knowledge,
    known_mines: &BTreeSet<Coord2>,
    total_mines: Option<CellCount>,
    config: &RiskConfig,
) -> Result<BTreeMap<Coord2, f64>> {
    let system = build_constraints(knowledge, known_mines)?;

    let unknown: Vec<Coord2> = knowledge
        .iter_positions()
        .filter(|&position| is_candidate(knowledge, known_mines, position))
        .collect();
    if unknown.is_empty() {
        return Ok(BTreeMap::new());
    }

    let mines_remaining: Option<f64> =
        total_mines.map(|mines| (f64::from(mines) - known_mines.len() as f64).max(0.0));
    let fallback_prior = match mines_remaining {
        Some(remaining) => remaining / unknown.len() as f64,
        None => 0.5,
    };

    let mut probs: BTreeMap<Coord2, f64> = BTreeMap::new();
    let mut pinned: HashSet<Coord2> = HashSet::new();

    for component in &system.components {
        let var_count = component.variable_ids.len();
        let mut estimate = None;
        if var_count <= config.max_vars_exact {
            match enumerate_component(&system, component, config.max_solutions) {
                Some(enumeration) if !enumeration.truncated => estimate = Some(enumeration),
                Some(_) => log::debug!(
                    "enumeration truncated on a {var_count}-var component, using the prior"
                ),
                None => log::debug!(
                    "{var_count}-var component admits no solutions, using the prior"
                ),
            }
        } else if let Some(sampler_config) = config.sampler {
            estimate = sample_component(&system, component, sampler_config);
        }

        match estimate {
            Some(enumeration) => {
                for (position, p) in enumeration.marginals {
                    pinned.insert(position);
                    probs.insert(position, p);
                }
            }
            None => {
                for &var_id in &component.variable_ids {
                    probs.insert(system.position_of(var_id), fallback_prior);
                }
            }
        }
    }

    // Cells outside the frontier share whatever budget the frontier has not
    // already committed in expectation.
    let frontier: HashSet<Coord2> = system
        .variables
        .iter()
        .map(|variable| variable.position)
        .collect();
    let outside: Vec<Coord2> = unknown
        .iter()
        .copied()
        .filter(|position| !frontier.contains(position))
        .collect();
    if !outside.is_empty() {
        let outside_prior = match mines_remaining {
            Some(remaining) => {
                let committed: f64 = system
                    .variables
                    .iter()
                    .map(|variable| probs[&variable.position])
                    .sum();
                ((remaining - committed) / outside.len() as f64).clamp(0.0, 1.0)
            }
            None => fallback_prior,
        };
        for &position in &outside {
            probs.insert(position, outside_prior);
        }
    }

    for &position in &unknown {
        if pinned.contains(&position) {
            continue;
        }
        if let Some(pressure) = local_pressure(knowledge, known_mines, position) {
            let blended = (1.0 - config.alpha) * probs[&position] + config.alpha * pressure;
            probs.insert(position, blended);
        }
    }

    if config.calibrate
        && let Some(remaining) = mines_remaining
    {
        calibrate(&mut probs, &unknown, &pinned, remaining);
    }

    Ok(probs)
}

/// Mean over the revealed neighbors of `position` of the ratio between the
/// mines they still need and the unknowns they can place them on.
fn local_pressure(
    knowledge: &Knowledge,
    known_mines: &BTreeSet<Coord2>,
    position: Coord2,
) -> Option<f64> {
    let mut sum = 0.0;
    let mut clues = 0u32;

    for clue in knowledge.iter_neighbors(position) {
        let Cell::Revealed(value) = knowledge.cell_at(clue) else {
            continue;
        };

        let mut mines_around = 0u32;
        let mut unknowns_around = 0u32;
        for neighbor in knowledge.iter_neighbors(clue) {
            if counts_as_mine(knowledge, known_mines, neighbor) {
                mines_around += 1;
            } else if is_candidate(knowledge, known_mines, neighbor) {
                unknowns_around += 1;
            }
        }

        let need = u32::from(value).saturating_sub(mines_around);
        let ratio = (f64::from(need) / f64::from(unknowns_around.max(1))).clamp(0.0, 1.0);
        sum += ratio;
        clues += 1;
    }

    (clues > 0).then(|| sum / f64::from(clues))
}

/// Rescales the non-pinned cells toward the leftover budget, but only when
/// the discrepancy is large. Pinned marginals are trusted and never touched.
fn calibrate(
    probs: &mut BTreeMap<Coord2, f64>,
    unknown: &[Coord2],
    pinned: &HashSet<Coord2>,
    mines_remaining: f64,
) {
    let flex: Vec<Coord2> = unknown
        .iter()
        .copied()
        .filter(|position| !pinned.contains(position))
        .collect();
    if flex.is_empty() {
        return;
    }

    let pinned_sum: f64 = unknown
        .iter()
        .filter(|position| pinned.contains(*position))
        .map(|position| probs[position])
        .sum();
    let flex_sum: f64 = flex.iter().map(|position| probs[position]).sum();
    let target = (mines_remaining - pinned_sum).max(0.0);
    let tolerance = 0.10 * target.max(1.0);

    if flex_sum > 0.0 && (flex_sum - target).abs() > tolerance {
        let scale = target / flex_sum;
        log::debug!(
            "soft calibration: scaling {} heuristic cells by {scale:.3}",
            flex.len()
        );
        for position in flex {
            let scaled = (probs[&position] * scale).clamp(0.0, 1.0);
            probs.insert(position, scaled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::parse_grid;

    fn no_mines() -> BTreeSet<Coord2> {
        BTreeSet::new()
    }

    fn corners_grid() -> Knowledge {
        parse_grid(&["1??", "???", "??1"])
    }

    #[test]
    fn exact_marginals_flow_through_unblended() {
        let probs = risk(&corners_grid(), &no_mines(), Some(3), &RiskConfig::default()).unwrap();

        assert!((probs[&(1, 1)] - 0.2).abs() < 1e-12);
        for position in [(0, 1), (1, 0), (1, 2), (2, 1)] {
            assert!((probs[&position] - 0.4).abs() < 1e-12);
        }
        // Off-frontier cells split what the frontier has not committed.
        for position in [(0, 2), (2, 0)] {
            assert!((probs[&position] - 0.6).abs() < 1e-12);
        }
    }

    #[test]
    fn single_cell_board_follows_the_budget() {
        let knowledge = Knowledge::new(1, 1);

        let zero = risk(&knowledge, &no_mines(), Some(0), &RiskConfig::default()).unwrap();
        assert_eq!(zero[&(0, 0)], 0.0);

        let one = risk(&knowledge, &no_mines(), Some(1), &RiskConfig::default()).unwrap();
        assert_eq!(one[&(0, 0)], 1.0);
    }

    #[test]
    fn empty_frontier_spreads_the_budget_uniformly() {
        let knowledge = parse_grid(&["???", "???", "???"]);

        let probs = risk(&knowledge, &no_mines(), Some(3), &RiskConfig::default()).unwrap();

        assert_eq!(probs.len(), 9);
        for &p in probs.values() {
            assert!((p - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn unknown_budget_defaults_to_even_odds() {
        let knowledge = parse_grid(&["??", "??"]);

        let probs = risk(&knowledge, &no_mines(), None, &RiskConfig::default()).unwrap();

        for &p in probs.values() {
            assert_eq!(p, 0.5);
        }
    }

    #[test]
    fn oversized_component_falls_back_to_blended_prior() {
        let config = RiskConfig {
            max_vars_exact: 4,
            ..Default::default()
        };

        let probs = risk(&corners_grid(), &no_mines(), Some(3), &config).unwrap();

        // Five frontier vars exceed the limit, so the center is heuristic now
        // and calibration pulls the total back onto the budget.
        assert!((probs[&(1, 1)] - 0.2).abs() > 0.1);
        let total: f64 = probs.values().sum();
        assert!((total - 3.0).abs() < 1e-9);
    }

    #[test]
    fn exact_component_at_the_threshold_still_enumerates() {
        let config = RiskConfig {
            max_vars_exact: 5,
            ..Default::default()
        };

        let probs = risk(&corners_grid(), &no_mines(), Some(3), &config).unwrap();

        assert!((probs[&(1, 1)] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn disabling_calibration_leaves_heuristic_mass_alone() {
        let config = RiskConfig {
            max_vars_exact: 4,
            calibrate: false,
            ..Default::default()
        };

        let probs = risk(&corners_grid(), &no_mines(), Some(3), &config).unwrap();

        let total: f64 = probs.values().sum();
        assert!((total - 8.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn calibrated_total_respects_the_budget_tolerance() {
        let knowledge = parse_grid(&["1??", "1??", "111"]);

        let probs = risk(&knowledge, &no_mines(), Some(2), &RiskConfig::default()).unwrap();

        let total: f64 = probs.values().sum();
        assert!((1.8..=2.2).contains(&total));
        for &p in probs.values() {
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn known_mine_outside_a_component_leaves_its_marginals_alone() {
        let baseline = risk(&corners_grid(), &no_mines(), Some(3), &RiskConfig::default()).unwrap();

        let known_mines = BTreeSet::from([(0, 2)]);
        let updated = risk(&corners_grid(), &known_mines, Some(3), &RiskConfig::default()).unwrap();

        for position in [(0, 1), (1, 0), (1, 1), (1, 2), (2, 1)] {
            assert_eq!(baseline[&position], updated[&position]);
        }
        assert!(!updated.contains_key(&(0, 2)));
    }

    #[test]
    fn sampler_estimates_oversized_components_when_enabled() {
        let config = RiskConfig {
            max_vars_exact: 4,
            sampler: Some(SamplerConfig::default()),
            ..Default::default()
        };

        let probs = risk(&corners_grid(), &no_mines(), Some(3), &config).unwrap();

        // The default budget exhausts this tiny component, so the pinned
        // estimate matches exact enumeration instead of the blended prior.
        assert!((probs[&(1, 1)] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn unsatisfiable_component_recovers_with_the_prior() {
        let knowledge = parse_grid(&["02", "??"]);

        let probs = risk(&knowledge, &no_mines(), Some(2), &RiskConfig::default()).unwrap();

        // Both cells demote to the prior, blend with local pressure, and
        // calibration stretches them onto the two-mine budget.
        assert!((probs[&(1, 0)] - 1.0).abs() < 1e-9);
        assert!((probs[&(1, 1)] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn map_covers_exactly_the_open_cells() {
        let knowledge = parse_grid(&["1??", "?F?", "??1"]);
        let known_mines = BTreeSet::from([(2, 0)]);

        let probs = risk(&knowledge, &known_mines, Some(3), &RiskConfig::default()).unwrap();

        let expected = BTreeSet::from([(0, 1), (0, 2), (1, 0), (1, 2), (2, 1)]);
        let scored: BTreeSet<Coord2> = probs.keys().copied().collect();
        assert_eq!(scored, expected);
        for &p in probs.values() {
            assert!(p.is_finite() && (0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn flagged_cells_are_not_scored() {
        let knowledge = parse_grid(&["1F", "??"]);

        let probs = risk(&knowledge, &no_mines(), Some(2), &RiskConfig::default()).unwrap();

        assert!(!probs.contains_key(&(0, 1)));
        assert!(probs.contains_key(&(1, 0)) && probs.contains_key(&(1, 1)));
    }
}
