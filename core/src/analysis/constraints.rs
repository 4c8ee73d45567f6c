use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::*;

/// Index list sized for the 8-neighborhood; sum constraints rarely outgrow it.
pub type VarList = SmallVec<[usize; 8]>;

/// Boolean 0/1 variable standing for one unknown frontier cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub id: usize,
    pub position: Coord2,
}

/// "Exactly `count` of `vars` are mines", derived from one revealed clue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub id: usize,
    pub clue: Coord2,
    pub vars: VarList,
    pub count: u8,
}

/// Maximal set of variables connected by co-occurrence in a constraint,
/// together with every constraint mentioning one of them. Components are
/// independent and are solved in isolation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub variable_ids: Vec<usize>,
    pub constraint_ids: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStats {
    pub variable_count: usize,
    pub constraint_count: usize,
    pub component_count: usize,
    pub max_component_variables: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSystem {
    pub variables: Vec<Variable>,
    pub constraints: Vec<Constraint>,
    /// Arena-style adjacency: for each variable id, the constraints naming it.
    pub var_to_constraints: Vec<VarList>,
    pub components: Vec<Component>,
}

impl ConstraintSystem {
    pub fn position_of(&self, var_id: usize) -> Coord2 {
        self.variables[var_id].position
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn stats(&self) -> SystemStats {
        SystemStats {
            variable_count: self.variables.len(),
            constraint_count: self.constraints.len(),
            component_count: self.components.len(),
            max_component_variables: self
                .components
                .iter()
                .map(|component| component.variable_ids.len())
                .max()
                .unwrap_or(0),
        }
    }
}

/// Whether `position` is treated as a mine when discharging a clue.
pub(crate) fn counts_as_mine(
    knowledge: &Knowledge,
    known_mines: &BTreeSet<Coord2>,
    position: Coord2,
) -> bool {
    knowledge.cell_at(position).is_flagged() || known_mines.contains(&position)
}

/// Whether `position` is an open question, i.e. a variable candidate.
pub(crate) fn is_candidate(
    knowledge: &Knowledge,
    known_mines: &BTreeSet<Coord2>,
    position: Coord2,
) -> bool {
    knowledge.cell_at(position).is_unknown() && !known_mines.contains(&position)
}

/// Translates the visible board into sum constraints over frontier variables.
///
/// Every revealed `k` whose neighborhood still contains unknowns yields one
/// constraint with `count = clamp(k - adjacent known mines, 0, |vars|)`.
/// Zero-count constraints are kept; they are what drives safe-neighbor
/// propagation later.
pub fn build_constraints(
    knowledge: &Knowledge,
    known_mines: &BTreeSet<Coord2>,
) -> Result<ConstraintSystem> {
    knowledge.validate()?;
    for &position in known_mines {
        knowledge.validate_position(position)?;
    }

    let mut variables = Vec::new();
    let mut constraints: Vec<Constraint> = Vec::new();
    let mut var_ids: HashMap<Coord2, usize> = HashMap::new();

    for clue in knowledge.iter_positions() {
        let Cell::Revealed(value) = knowledge.cell_at(clue) else {
            continue;
        };

        let mut adjacent_mines: u8 = 0;
        let mut vars = VarList::new();
        for neighbor in knowledge.iter_neighbors(clue) {
            if counts_as_mine(knowledge, known_mines, neighbor) {
                adjacent_mines += 1;
            } else if is_candidate(knowledge, known_mines, neighbor) {
                let next_id = variables.len();
                let var_id = *var_ids.entry(neighbor).or_insert_with(|| {
                    variables.push(Variable {
                        id: next_id,
                        position: neighbor,
                    });
                    next_id
                });
                vars.push(var_id);
            }
        }

        if vars.is_empty() {
            continue;
        }

        let count = value
            .saturating_sub(adjacent_mines)
            .min(vars.len() as u8);
        constraints.push(Constraint {
            id: constraints.len(),
            clue,
            vars,
            count,
        });
    }

    let mut var_to_constraints = alloc::vec![VarList::new(); variables.len()];
    for constraint in &constraints {
        for &var_id in &constraint.vars {
            var_to_constraints[var_id].push(constraint.id);
        }
    }

    let components = build_components(variables.len(), &constraints);

    let system = ConstraintSystem {
        variables,
        constraints,
        var_to_constraints,
        components,
    };
    log::trace!(
        "constraint system: {} vars, {} constraints, {} components",
        system.variables.len(),
        system.constraints.len(),
        system.components.len()
    );
    Ok(system)
}

fn build_components(variable_count: usize, constraints: &[Constraint]) -> Vec<Component> {
    let mut dsu = Dsu::new(variable_count);

    for constraint in constraints {
        if let Some((&first, rest)) = constraint.vars.split_first() {
            for &var in rest {
                dsu.union(first, var);
            }
        }
    }

    let mut root_to_component = BTreeMap::new();
    let mut components = Vec::new();

    for var in 0..variable_count {
        let root = dsu.find(var);
        let component_idx = *root_to_component.entry(root).or_insert_with(|| {
            components.push(Component {
                variable_ids: Vec::new(),
                constraint_ids: Vec::new(),
            });
            components.len() - 1
        });
        components[component_idx].variable_ids.push(var);
    }

    for constraint in constraints {
        let mut roots = BTreeSet::new();
        for &var in &constraint.vars {
            roots.insert(dsu.find(var));
        }
        for root in roots {
            if let Some(&component_idx) = root_to_component.get(&root) {
                components[component_idx].constraint_ids.push(constraint.id);
            }
        }
    }

    for component in &mut components {
        component.variable_ids.sort_unstable();
        component.constraint_ids.sort_unstable();
        component.constraint_ids.dedup();
    }

    components
}

#[derive(Clone, Debug)]
struct Dsu {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl Dsu {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: alloc::vec![0; size],
        }
    }

    fn find(&mut self, value: usize) -> usize {
        let mut root = value;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cursor = value;
        while self.parent[cursor] != root {
            let next = self.parent[cursor];
            self.parent[cursor] = root;
            cursor = next;
        }
        root
    }

    fn union(&mut self, left: usize, right: usize) {
        let mut left_root = self.find(left);
        let mut right_root = self.find(right);

        if left_root == right_root {
            return;
        }

        if self.rank[left_root] < self.rank[right_root] {
            core::mem::swap(&mut left_root, &mut right_root);
        }

        self.parent[right_root] = left_root;
        if self.rank[left_root] == self.rank[right_root] {
            self.rank[left_root] += 1;
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

    #[test]
    fn revealed_clue_yields_constraint_over_unknown_neighbors() {
        let knowledge = parse_grid(&["1?", "??"]);

        let system = build_constraints(&knowledge, &no_mines()).unwrap();

        assert_eq!(system.constraints.len(), 1);
        let constraint = &system.constraints[0];
        assert_eq!(constraint.clue, (0, 0));
        assert_eq!(constraint.count, 1);
        assert_eq!(constraint.vars.len(), 3);
        assert_eq!(system.variables.len(), 3);
    }

    #[test]
    fn flags_and_known_mines_discharge_the_clue() {
        let knowledge = parse_grid(&["2F", "??"]);
        let known_mines = BTreeSet::from([(1, 0)]);

        let system = build_constraints(&knowledge, &known_mines).unwrap();

        // Both mines accounted for; only (1, 1) remains, needing zero.
        assert_eq!(system.constraints.len(), 1);
        assert_eq!(system.constraints[0].count, 0);
        assert_eq!(system.variables[system.constraints[0].vars[0]].position, (1, 1));
    }

    #[test]
    fn count_is_clamped_into_valid_range() {
        // A clue of 8 with one unknown neighbor clamps down to 1; a clue of 0
        // next to a flag would go negative and clamps up to 0.
        let knowledge = parse_grid(&["8?", "0F"]);

        let system = build_constraints(&knowledge, &no_mines()).unwrap();

        for constraint in &system.constraints {
            assert!(usize::from(constraint.count) <= constraint.vars.len());
        }
    }

    #[test]
    fn zero_clue_emits_trivial_constraint() {
        let knowledge = parse_grid(&["0?"]);

        let system = build_constraints(&knowledge, &no_mines()).unwrap();

        assert_eq!(system.constraints.len(), 1);
        assert_eq!(system.constraints[0].count, 0);
    }

    #[test]
    fn splits_independent_components() {
        // Two clues far enough apart that their variables never co-occur.
        let knowledge = parse_grid(&["?1???1?"]);

        let system = build_constraints(&knowledge, &no_mines()).unwrap();

        assert_eq!(system.components.len(), 2);
        for component in &system.components {
            assert_eq!(component.variable_ids.len(), 2);
            assert_eq!(component.constraint_ids.len(), 1);
        }
    }

    #[test]
    fn component_carries_every_constraint_touching_its_variables() {
        let knowledge = parse_grid(&["1??", "???", "??1"]);

        let system = build_constraints(&knowledge, &no_mines()).unwrap();

        assert_eq!(system.components.len(), 1);
        let component = &system.components[0];
        assert_eq!(component.variable_ids.len(), 5);
        assert_eq!(component.constraint_ids.len(), 2);

        let stats = system.stats();
        assert_eq!(stats.variable_count, 5);
        assert_eq!(stats.max_component_variables, 5);
    }

    #[test]
    fn out_of_bounds_known_mine_is_rejected() {
        let knowledge = parse_grid(&["1?"]);
        let known_mines = BTreeSet::from([(5, 5)]);

        assert_eq!(
            build_constraints(&knowledge, &known_mines),
            Err(InferenceError::OutOfBounds { position: (5, 5) })
        );
    }
}
