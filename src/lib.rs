pub mod board;
pub mod channel;
pub mod config;
pub mod csp;
pub mod deduce;
pub mod diag;
pub mod engine;
pub mod relax;

pub use board::{BoardSnapshot, Cell, ParseOutcome};
pub use channel::{Action, Command, Intent};
pub use config::{FinishPolicy, SolverConfig};
pub use diag::RunLog;
pub use engine::Engine;

/// A 2D coordinate on the board, zero-indexed.
///
/// The wire format of the command channel is one-indexed; the conversion
/// happens at serialization time and nowhere else.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct Point {
    pub row: usize,
    pub col: usize,
}

impl Point {
    pub fn new(row: usize, col: usize) -> Self {
        Point { row, col }
    }

    /// The up-to-8 neighbors of this point on a `rows` x `cols` board,
    /// clipped at the edges.
    pub fn neighbors(self, rows: usize, cols: usize) -> impl Iterator<Item = Point> {
        (-1..=1).flat_map(move |dr: isize| {
            (-1..=1).filter_map(move |dc: isize| {
                // Skip the point itself.
                if dr == 0 && dc == 0 {
                    return None;
                }

                let nr = self.row as isize + dr;
                let nc = self.col as isize + dc;

                if nr >= 0 && nr < rows as isize && nc >= 0 && nc < cols as isize {
                    Some(Point {
                        row: nr as usize,
                        col: nc as usize,
                    })
                } else {
                    None
                }
            })
        })
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// The current state of a game, as observed from the board channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Playing,
    Won,
    Lost,
}
