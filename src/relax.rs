use crate::Point;
use crate::csp::ConstraintSystem;
use ndarray::{Array1, Array2};

/// A relaxed value is accepted only when it sits this close to 0 or 1.
/// The tolerance absorbs floating-point slack, not genuine ambiguity.
const ROUND_TOLERANCE: f64 = 1e-3;

/// Ridge term keeping the normal matrix invertible when the constraint
/// system is under-determined. Orders of magnitude below the rounding
/// tolerance, so it cannot flip an accepted value.
const RIDGE: f64 = 1e-9;

/// Variables pinned down by the relaxed solve.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Relaxation {
    pub mines: Vec<Point>,
    pub safes: Vec<Point>,
}

impl Relaxation {
    pub fn is_empty(&self) -> bool {
        self.mines.is_empty() && self.safes.is_empty()
    }
}

/// Least-squares estimate over the relaxed, real-valued constraint
/// system.
///
/// One row per frontier cell constraint, one column per variable; the
/// system is usually under- or over-determined, so it is solved in the
/// least-squares sense rather than exactly. A variable is accepted only
/// when its value rounds to 0 or 1 within `ROUND_TOLERANCE`; everything
/// else is left for the exhaustive fallback. Pure function of the
/// system, so re-solving an already-resolved system reproduces the same
/// accepted set.
pub fn estimate(system: &ConstraintSystem) -> Relaxation {
    let columns = system.variables.len();
    let rows = system.constraints.len();
    if columns == 0 || rows == 0 {
        return Relaxation::default();
    }

    let mut coefficients = Array2::<f64>::zeros((rows, columns));
    let mut targets = Array1::<f64>::zeros(rows);
    for (row, constraint) in system.constraints.iter().enumerate() {
        for &column in &constraint.variables {
            coefficients[[row, column]] = 1.0;
        }
        targets[row] = constraint.required as f64;
    }

    let solution = least_squares(&coefficients, &targets);

    let mut accepted = Relaxation::default();
    for (column, &value) in solution.iter().enumerate() {
        let rounded = value.round();
        if (value - rounded).abs() > ROUND_TOLERANCE {
            continue;
        }
        if rounded == 1.0 {
            accepted.mines.push(system.variables[column]);
        } else if rounded == 0.0 {
            accepted.safes.push(system.variables[column]);
        }
    }
    accepted
}

/// Minimum-norm least-squares solution of `a x = b` through
/// ridge-stabilized normal equations.
fn least_squares(a: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let transposed = a.t();
    let mut normal = transposed.dot(a);
    for i in 0..normal.nrows() {
        normal[[i, i]] += RIDGE;
    }
    let rhs = transposed.dot(b);
    solve_linear(normal, rhs)
}

/// Gaussian elimination with partial pivoting. The ridge makes the
/// normal matrix positive definite, so a vanishing pivot cannot occur.
fn solve_linear(mut m: Array2<f64>, mut rhs: Array1<f64>) -> Array1<f64> {
    let n = rhs.len();

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&a, &b| m[[a, col]].abs().total_cmp(&m[[b, col]].abs()))
            .expect("non-empty pivot range");
        if pivot != col {
            for k in 0..n {
                m.swap([pivot, k], [col, k]);
            }
            rhs.swap(pivot, col);
        }

        let diagonal = m[[col, col]];
        for row in col + 1..n {
            let factor = m[[row, col]] / diagonal;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                m[[row, k]] -= factor * m[[col, k]];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut solution = Array1::<f64>::zeros(n);
    for col in (0..n).rev() {
        let mut value = rhs[col];
        for k in col + 1..n {
            value -= m[[col, k]] * solution[k];
        }
        solution[col] = value / m[[col, col]];
    }
    solution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csp::CellConstraint;

    fn system(variables: Vec<Point>, constraints: Vec<(Vec<usize>, usize)>) -> ConstraintSystem {
        ConstraintSystem {
            variables,
            constraints: constraints
                .into_iter()
                .map(|(vars, required)| CellConstraint {
                    cell: Point::new(0, 0),
                    variables: vars,
                    required,
                })
                .collect(),
            max_mines: None,
        }
    }

    #[test]
    fn test_fully_determined_system_is_accepted() {
        // x0 = 1 and x1 + x2 = 0 pin every variable.
        let sys = system(
            vec![Point::new(0, 0), Point::new(0, 1), Point::new(0, 2)],
            vec![(vec![0], 1), (vec![1, 2], 0)],
        );
        let relaxed = estimate(&sys);
        assert_eq!(relaxed.mines, vec![Point::new(0, 0)]);
        assert_eq!(relaxed.safes, vec![Point::new(0, 1), Point::new(0, 2)]);
    }

    #[test]
    fn test_ambiguous_variables_are_left_alone() {
        // One mine between two cells relaxes to one half each.
        let sys = system(
            vec![Point::new(0, 0), Point::new(0, 1)],
            vec![(vec![0, 1], 1)],
        );
        assert!(estimate(&sys).is_empty());
    }

    #[test]
    fn test_difference_of_overlapping_clues() {
        // x0 + x1 = 1 and x0 + x1 + x2 = 2 determine x2 = 1 while x0 and
        // x1 stay split.
        let sys = system(
            vec![Point::new(0, 0), Point::new(0, 1), Point::new(0, 2)],
            vec![(vec![0, 1], 1), (vec![0, 1, 2], 2)],
        );
        let relaxed = estimate(&sys);
        assert_eq!(relaxed.mines, vec![Point::new(0, 2)]);
        assert!(relaxed.safes.is_empty());
    }

    #[test]
    fn test_estimate_is_idempotent() {
        let sys = system(
            vec![Point::new(0, 0), Point::new(0, 1), Point::new(0, 2)],
            vec![(vec![0, 1], 1), (vec![0, 1, 2], 2)],
        );
        assert_eq!(estimate(&sys), estimate(&sys));
    }

    #[test]
    fn test_empty_system_yields_nothing() {
        let sys = system(vec![], vec![]);
        assert!(estimate(&sys).is_empty());
    }
}
