use crate::Point;
use crate::board::{BoardSnapshot, Cell};
use anyhow::{Result, anyhow};
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use varisat::{ExtendFormula, Lit, Solver, Var};

/// Constraints at or below this arity are encoded with plain combination
/// clauses; larger ones get the sequential-counter encoding.
const NAIVE_ENCODING_LIMIT: usize = 10;

/// One frontier cell's equality constraint: exactly `required` of the
/// listed variables are mines.
#[derive(Debug, Clone)]
pub struct CellConstraint {
    pub cell: Point,
    /// Indices into `ConstraintSystem::variables`.
    pub variables: Vec<usize>,
    pub required: usize,
}

/// Boolean constraint system over the unopened cells bordering the
/// frontier.
///
/// Variables are deduplicated: a cell adjacent to several frontier cells
/// gets exactly one variable. The same system feeds both the
/// linear-relaxation estimator and the exhaustive enumeration.
#[derive(Debug, Clone)]
pub struct ConstraintSystem {
    /// Decision variables; the index doubles as the matrix column and the
    /// SAT variable number.
    pub variables: Vec<Point>,
    pub constraints: Vec<CellConstraint>,
    /// Global bound on asserted mines, when the remaining-mine count is
    /// known.
    pub max_mines: Option<usize>,
}

impl ConstraintSystem {
    /// Builds the system from the current snapshot and frontier.
    ///
    /// `known_mines` (flagged or queued positions) count toward each
    /// clue's satisfied part rather than becoming variables; positions in
    /// `pending_safes` are excluded outright.
    pub fn build(
        snapshot: &BoardSnapshot,
        frontier: &[Point],
        known_mines: &HashSet<Point>,
        pending_safes: &HashSet<Point>,
    ) -> ConstraintSystem {
        let (rows, cols) = (snapshot.rows(), snapshot.cols());
        let indicator = snapshot.mine_indicator();

        let mut variables: Vec<Point> = Vec::new();
        let mut index: HashMap<Point, usize> = HashMap::new();
        let mut constraints = Vec::new();

        for &cell in frontier {
            let Cell::Opened(clue) = snapshot.cell(cell) else {
                continue;
            };

            let mut vars = Vec::new();
            let mut known = 0usize;
            for neighbor in cell.neighbors(rows, cols) {
                match indicator[neighbor.row][neighbor.col] {
                    Some(1) => known += 1,
                    Some(_) => {}
                    None if known_mines.contains(&neighbor) => known += 1,
                    None if pending_safes.contains(&neighbor) => {}
                    None => {
                        let slot = *index.entry(neighbor).or_insert_with(|| {
                            variables.push(neighbor);
                            variables.len() - 1
                        });
                        vars.push(slot);
                    }
                }
            }
            if vars.is_empty() {
                continue;
            }
            constraints.push(CellConstraint {
                cell,
                variables: vars,
                required: (clue as usize).saturating_sub(known),
            });
        }

        ConstraintSystem {
            variables,
            constraints,
            max_mines: snapshot.remaining_mines(),
        }
    }
}

/// Verdict of the enumeration stage.
#[derive(Debug, PartialEq, Eq)]
pub enum CspVerdict {
    /// Consensus across every enumerated solution: variables assigned the
    /// same value in all of them.
    Resolved {
        mines: Vec<Point>,
        safes: Vec<Point>,
        solutions: usize,
    },
    /// The deadline elapsed before the minimum sample size was reached;
    /// the partial consensus is not trusted.
    Timeout,
    /// No satisfying assignment exists for the observed board.
    Inconsistent,
}

/// Enumerates every satisfying assignment of `system`, up to `deadline`,
/// and reconciles them.
///
/// The first solution is the baseline; a variable that disagrees with it
/// in any later solution is ambiguous for the rest of the run, and the
/// enumeration stops early once every variable is. Successive solutions
/// are obtained by blocking the previous assignment over the decision
/// variables, so no duplicate assignment is ever visited. The deadline is
/// checked between solver calls.
pub fn solve_system(
    system: &ConstraintSystem,
    deadline: Duration,
    min_solutions: usize,
) -> Result<CspVerdict> {
    let started = Instant::now();
    let count = system.variables.len();

    let mut solver = Solver::new();
    let vars: Vec<Var> = (0..count).map(|_| solver.new_var()).collect();

    for constraint in &system.constraints {
        let lits: Vec<Lit> = constraint
            .variables
            .iter()
            .map(|&slot| Lit::from_var(vars[slot], true))
            .collect();
        encode_exactly(&mut solver, &lits, constraint.required);
    }
    if let Some(bound) = system.max_mines {
        let all: Vec<Lit> = vars.iter().map(|&v| Lit::from_var(v, true)).collect();
        encode_at_most(&mut solver, &all, bound);
    }

    let mut baseline: Option<Vec<bool>> = None;
    let mut ambiguous = vec![false; count];
    let mut solutions = 0usize;
    let mut deadline_hit = false;

    loop {
        if started.elapsed() >= deadline {
            deadline_hit = true;
            break;
        }
        if !solver.solve()? {
            break;
        }
        let model = solver
            .model()
            .ok_or_else(|| anyhow!("satisfiable formula produced no model"))?;
        let assignment: Vec<bool> = vars
            .iter()
            .map(|&v| model.contains(&Lit::from_var(v, true)))
            .collect();
        solutions += 1;

        match &baseline {
            None => baseline = Some(assignment.clone()),
            Some(base) => {
                for slot in 0..count {
                    if assignment[slot] != base[slot] {
                        ambiguous[slot] = true;
                    }
                }
            }
        }
        if ambiguous.iter().all(|&a| a) {
            // Every variable already disagrees somewhere; nothing further
            // to learn.
            break;
        }

        let blocking: Vec<Lit> = vars
            .iter()
            .zip(&assignment)
            .map(|(&v, &value)| Lit::from_var(v, !value))
            .collect();
        solver.add_clause(&blocking);
    }

    if solutions == 0 {
        return Ok(if deadline_hit {
            CspVerdict::Timeout
        } else {
            CspVerdict::Inconsistent
        });
    }
    if deadline_hit && solutions < min_solutions {
        return Ok(CspVerdict::Timeout);
    }

    let base = baseline.expect("baseline recorded with the first solution");
    let mut mines = Vec::new();
    let mut safes = Vec::new();
    for slot in 0..count {
        if ambiguous[slot] {
            continue;
        }
        if base[slot] {
            mines.push(system.variables[slot]);
        } else {
            safes.push(system.variables[slot]);
        }
    }
    Ok(CspVerdict::Resolved {
        mines,
        safes,
        solutions,
    })
}

/// Exactly `k` of `lits` are true.
fn encode_exactly(solver: &mut Solver, lits: &[Lit], k: usize) {
    encode_at_most(solver, lits, k);
    encode_at_least(solver, lits, k);
}

/// At most `k` of `lits` are true.
fn encode_at_most(solver: &mut Solver, lits: &[Lit], k: usize) {
    if k >= lits.len() {
        return;
    }
    if k == 0 {
        for &lit in lits {
            solver.add_clause(&[!lit]);
        }
        return;
    }
    if lits.len() <= NAIVE_ENCODING_LIMIT {
        // Forbid every way of picking k + 1 true literals.
        for combo in lits.iter().copied().combinations(k + 1) {
            let clause: Vec<Lit> = combo.into_iter().map(|lit| !lit).collect();
            solver.add_clause(&clause);
        }
    } else {
        encode_counter_at_most(solver, lits, k);
    }
}

/// At least `k` of `lits` are true.
fn encode_at_least(solver: &mut Solver, lits: &[Lit], k: usize) {
    if k == 0 {
        return;
    }
    if k > lits.len() {
        solver.add_clause(&[]);
        return;
    }
    // At least k true is at most (n - k) false.
    let negated: Vec<Lit> = lits.iter().map(|&lit| !lit).collect();
    encode_at_most(solver, &negated, lits.len() - k);
}

/// Sequential-counter encoding of "at most k" (Sinz). Register variable
/// `s[i][j]` asserts that at least `j + 1` of the first `i + 1` literals
/// are true; the overflow clauses forbid exceeding `k`.
fn encode_counter_at_most(solver: &mut Solver, lits: &[Lit], k: usize) {
    let n = lits.len();
    debug_assert!(n > 1 && k >= 1 && k < n);

    let registers: Vec<Vec<Lit>> = (0..n - 1)
        .map(|_| (0..k).map(|_| solver.new_lit()).collect())
        .collect();

    // First literal seeds the first register column.
    solver.add_clause(&[!lits[0], registers[0][0]]);
    for j in 1..k {
        solver.add_clause(&[!registers[0][j]]);
    }

    for i in 1..n - 1 {
        // Counts carry forward.
        solver.add_clause(&[!lits[i], registers[i][0]]);
        solver.add_clause(&[!registers[i - 1][0], registers[i][0]]);
        for j in 1..k {
            solver.add_clause(&[!lits[i], !registers[i - 1][j - 1], registers[i][j]]);
            solver.add_clause(&[!registers[i - 1][j], registers[i][j]]);
        }
        // A true literal on a full register would overflow.
        solver.add_clause(&[!lits[i], !registers[i - 1][k - 1]]);
    }
    solver.add_clause(&[!lits[n - 1], !registers[n - 2][k - 1]]);
}
