use crate::Point;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which condition ends a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishPolicy {
    /// Any exposed, unflagged mine loses immediately. Primary policy.
    MineTerminates,
    /// Play continues until no unopened cell remains; the game is won iff
    /// no mine was exposed along the way.
    BoardExhausted,
}

/// Every option the agent recognizes, with its default.
///
/// Loadable from a JSON file; omitted fields keep their defaults and
/// unknown fields are rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    /// File the game process publishes the board to.
    pub board_path: PathBuf,
    /// File this agent publishes commands to.
    pub command_path: PathBuf,
    /// Append-only per-game outcome record.
    pub result_path: PathBuf,
    /// Opening move, zero-indexed. `None` lets the scheduler pick.
    pub first_move: Option<Point>,
    /// Whether the linear-relaxation estimator runs when direct deduction
    /// stalls.
    pub use_relaxation: bool,
    /// Whether the exhaustive constraint enumeration runs when the
    /// relaxation stalls too.
    pub use_csp: bool,
    /// Wall-clock budget for one constraint enumeration.
    pub csp_deadline_ms: u64,
    /// Minimum enumerated solutions for a timed-out enumeration to still
    /// be trusted.
    pub csp_min_solutions: usize,
    /// Pause after each emitted command.
    pub move_delay_ms: u64,
    /// Initial sleep between board polls; backs off from there.
    pub poll_interval_ms: u64,
    /// How long the board channel may stay silent before the peer is
    /// considered gone. `None` waits forever.
    pub poll_timeout_ms: Option<u64>,
    /// Total mines on the board, for protocol variants whose board header
    /// does not carry a remaining-mine count.
    pub total_mines: Option<usize>,
    /// Accept only the exact expected iteration tag instead of any newer
    /// one.
    pub strict_iteration: bool,
    pub finish_policy: FinishPolicy,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            board_path: PathBuf::from("board.out"),
            command_path: PathBuf::from("command.inp"),
            result_path: PathBuf::from("result.txt"),
            first_move: None,
            use_relaxation: true,
            use_csp: true,
            csp_deadline_ms: 20_000,
            csp_min_solutions: 20,
            move_delay_ms: 0,
            poll_interval_ms: 10,
            poll_timeout_ms: Some(60_000),
            total_mines: None,
            strict_iteration: false,
            finish_policy: FinishPolicy::MineTerminates,
        }
    }
}

impl SolverConfig {
    pub fn load(path: &Path) -> Result<SolverConfig> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing configuration {}", path.display()))
    }

    pub fn csp_deadline(&self) -> Duration {
        Duration::from_millis(self.csp_deadline_ms)
    }

    pub fn move_delay(&self) -> Duration {
        Duration::from_millis(self.move_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_ms.map(Duration::from_millis)
    }
}
