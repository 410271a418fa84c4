use crate::Point;
use crate::board::{BoardSnapshot, Cell};
use std::collections::HashSet;

/// Positions of opened cells that still border at least one unopened cell.
///
/// Rebuilt in full from every snapshot; the board can change arbitrarily
/// between polls, so nothing is carried across iterations. Opened `0`
/// cells qualify too: their clue is trivially satisfied, which is exactly
/// what lets the safe rule clear their neighborhood.
pub fn frontier(snapshot: &BoardSnapshot) -> Vec<Point> {
    let (rows, cols) = (snapshot.rows(), snapshot.cols());
    let mut cells = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            let position = Point::new(row, col);
            if !matches!(snapshot.cell(position), Cell::Opened(_)) {
                continue;
            }
            if position
                .neighbors(rows, cols)
                .any(|n| snapshot.cell(n).is_unknown())
            {
                cells.push(position);
            }
        }
    }
    cells
}

/// Positions newly deduced by one pass of the local rules.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Deductions {
    pub mines: Vec<Point>,
    pub safes: Vec<Point>,
}

impl Deductions {
    pub fn is_empty(&self) -> bool {
        self.mines.is_empty() && self.safes.is_empty()
    }
}

/// One pass of the two saturating inference rules over the frontier.
///
/// For a frontier cell with clue `n`:
/// - mine rule: if the unopened neighbors plus the already-known adjacent
///   mines number exactly `n`, every unopened neighbor is a mine;
/// - safe rule: if the already-known adjacent mines alone number `n`, the
///   clue is satisfied and every unopened neighbor is safe.
///
/// `known_mines` holds every position already held to be a mine (flagged
/// or queued for flagging); `pending_safes` every position already queued
/// for opening. The function is a pure transform: it only reports new
/// positions, guaranteed to be in neither input set, and never removes
/// anything.
pub fn deduce_direct(
    snapshot: &BoardSnapshot,
    frontier: &[Point],
    known_mines: &HashSet<Point>,
    pending_safes: &HashSet<Point>,
) -> Deductions {
    let (rows, cols) = (snapshot.rows(), snapshot.cols());
    let mut found = Deductions::default();

    for &cell in frontier {
        let Cell::Opened(clue) = snapshot.cell(cell) else {
            continue;
        };
        let clue = clue as usize;

        let mut unknowns = Vec::new();
        let mut mines = 0usize;
        for neighbor in cell.neighbors(rows, cols) {
            match snapshot.cell(neighbor) {
                Cell::Mine | Cell::FlaggedMine => mines += 1,
                Cell::Unknown if known_mines.contains(&neighbor) => mines += 1,
                Cell::Unknown => unknowns.push(neighbor),
                Cell::Opened(_) => {}
            }
        }
        if unknowns.is_empty() {
            continue;
        }

        if mines + unknowns.len() == clue {
            // All remaining capacity is mines.
            for position in unknowns {
                if !pending_safes.contains(&position)
                    && !found.mines.contains(&position)
                    && !found.safes.contains(&position)
                {
                    found.mines.push(position);
                }
            }
        } else if mines == clue {
            // Clue fully satisfied; the remainder is safe.
            for position in unknowns {
                if !pending_safes.contains(&position)
                    && !found.safes.contains(&position)
                    && !found.mines.contains(&position)
                {
                    found.safes.push(position);
                }
            }
        }
    }

    found
}
