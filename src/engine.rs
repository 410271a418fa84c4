use crate::board::{BoardSnapshot, Cell};
use crate::channel::{Action, BoardChannel, Command, CommandChannel, Intent, OutcomeRecord};
use crate::config::{FinishPolicy, SolverConfig};
use crate::csp::{ConstraintSystem, CspVerdict, solve_system};
use crate::deduce;
use crate::diag::RunLog;
use crate::relax;
use crate::{GameState, Point};
use anyhow::{Context, Result, bail};
use rand::prelude::IndexedRandom;
use rand::rngs::ThreadRng;
use std::collections::{HashSet, VecDeque};
use std::thread;

/// Evaluates the outcome state machine against a fresh snapshot.
///
/// Under the primary policy an exposed mine is terminal the instant it is
/// observed; the variant policy plays the board out and judges at the
/// end.
pub fn game_state(snapshot: &BoardSnapshot, policy: FinishPolicy) -> GameState {
    let mine_exposed = snapshot.has_exposed_mine();
    let unknown_left = snapshot.has_unknown();
    match policy {
        FinishPolicy::MineTerminates => {
            if mine_exposed {
                GameState::Lost
            } else if unknown_left {
                GameState::Playing
            } else {
                GameState::Won
            }
        }
        FinishPolicy::BoardExhausted => {
            if unknown_left {
                GameState::Playing
            } else if mine_exposed {
                GameState::Lost
            } else {
                GameState::Won
            }
        }
    }
}

/// The inference and decision engine for one game.
///
/// Owns every piece of cross-iteration solver state: the pending mark and
/// safe queues, the set of flags already placed, and the channel
/// endpoints. One snapshot is consumed and exactly one command emitted
/// per protocol round.
pub struct Engine {
    config: SolverConfig,
    board: BoardChannel,
    commands: CommandChannel,
    record: OutcomeRecord,
    log: RunLog,
    /// Pending flag actions, oldest deduction first.
    marks: VecDeque<Point>,
    /// Pending open actions, oldest deduction first.
    safes: VecDeque<Point>,
    /// Mirrors of the queues for constant-time membership checks.
    queued_marks: HashSet<Point>,
    queued_safes: HashSet<Point>,
    /// Flags already sent to the game process.
    flagged: HashSet<Point>,
    /// Configured opening move, consumed by the first action.
    first_move: Option<Point>,
    rng: ThreadRng,
}

impl Engine {
    pub fn new(config: SolverConfig, log: RunLog) -> Self {
        let board = BoardChannel::new(
            config.board_path.clone(),
            config.poll_interval(),
            config.poll_timeout(),
            config.strict_iteration,
        );
        let commands = CommandChannel::new(config.command_path.clone());
        let record = OutcomeRecord::new(config.result_path.clone());
        let first_move = config.first_move;
        Engine {
            config,
            board,
            commands,
            record,
            log,
            marks: VecDeque::new(),
            safes: VecDeque::new(),
            queued_marks: HashSet::new(),
            queued_safes: HashSet::new(),
            flagged: HashSet::new(),
            first_move,
            rng: rand::rng(),
        }
    }

    /// Plays one game to completion: reads snapshots, deduces, emits one
    /// command per round, and appends the outcome exactly once.
    pub fn run(&mut self) -> Result<GameState> {
        let mut expected: u64 = 1;
        loop {
            let snapshot = self
                .board
                .read(expected, &self.flagged, self.config.total_mines)?;
            self.log.round(snapshot.iteration());

            let state = game_state(&snapshot, self.config.finish_policy);
            if state != GameState::Playing {
                let won = state == GameState::Won;
                self.record
                    .append(won)
                    .context("recording the game outcome")?;
                self.log.outcome(won);
                return Ok(state);
            }

            self.extend_queues(&snapshot);
            let action = self.next_action(&snapshot)?;
            if action.intent == Intent::Flag {
                self.flagged.insert(action.target);
            }
            self.commands.write(&Command {
                iteration: snapshot.iteration(),
                action,
            })?;
            self.log.action(snapshot.iteration(), &action);

            expected = snapshot.iteration() + 1;
            let delay = self.config.move_delay();
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
    }

    /// Every position currently held to be a mine: flags already placed
    /// plus queued marks.
    fn known_mines(&self) -> HashSet<Point> {
        self.flagged.union(&self.queued_marks).copied().collect()
    }

    /// Runs the deduction pipeline for this snapshot, appending whatever
    /// it proves to the queues. The fallback stages only run when direct
    /// deduction found nothing and no action is already pending.
    fn extend_queues(&mut self, snapshot: &BoardSnapshot) {
        let iteration = snapshot.iteration();
        let frontier = deduce::frontier(snapshot);

        let known = self.known_mines();
        let direct = deduce::deduce_direct(snapshot, &frontier, &known, &self.queued_safes);
        self.log
            .deductions(iteration, "direct deduction", direct.mines.len(), direct.safes.len());
        self.absorb(direct.mines, direct.safes);

        if !(self.marks.is_empty() && self.safes.is_empty()) || frontier.is_empty() {
            return;
        }

        let system = ConstraintSystem::build(snapshot, &frontier, &known, &self.queued_safes);
        if system.variables.is_empty() {
            return;
        }

        if self.config.use_relaxation {
            let relaxed = relax::estimate(&system);
            self.log
                .deductions(iteration, "linear relaxation", relaxed.mines.len(), relaxed.safes.len());
            self.absorb(relaxed.mines, relaxed.safes);
        }

        if self.marks.is_empty() && self.safes.is_empty() && self.config.use_csp {
            match solve_system(
                &system,
                self.config.csp_deadline(),
                self.config.csp_min_solutions,
            ) {
                Ok(CspVerdict::Resolved {
                    mines,
                    safes,
                    solutions,
                }) => {
                    self.log.note(
                        iteration,
                        &format!("constraint enumeration visited {solutions} solution(s)"),
                    );
                    self.log
                        .deductions(iteration, "constraint enumeration", mines.len(), safes.len());
                    self.absorb(mines, safes);
                }
                Ok(CspVerdict::Timeout) => self.log.note(
                    iteration,
                    "constraint enumeration hit its deadline below the sample threshold",
                ),
                Ok(CspVerdict::Inconsistent) => self.log.note(
                    iteration,
                    "constraint system admits no solution; falling back to guessing",
                ),
                Err(err) => self
                    .log
                    .warning(iteration, &format!("constraint engine failed: {err:#}")),
            }
        }
    }

    /// Appends deduced positions to the queues, keeping both deduplicated
    /// and mutually disjoint.
    fn absorb(&mut self, mines: Vec<Point>, safes: Vec<Point>) {
        for position in mines {
            if !self.queued_marks.contains(&position)
                && !self.queued_safes.contains(&position)
                && !self.flagged.contains(&position)
            {
                self.queued_marks.insert(position);
                self.marks.push_back(position);
            }
        }
        for position in safes {
            if !self.queued_safes.contains(&position)
                && !self.queued_marks.contains(&position)
                && !self.flagged.contains(&position)
            {
                self.queued_safes.insert(position);
                self.safes.push_back(position);
            }
        }
    }

    /// Chooses the next action: configured first move, then pending
    /// marks, then pending safe opens, then a uniformly random unopened
    /// cell. Queue entries that the game resolved in the meantime are
    /// dropped on pop.
    fn next_action(&mut self, snapshot: &BoardSnapshot) -> Result<Action> {
        if let Some(position) = self.first_move.take() {
            return Ok(Action::open(position));
        }

        while let Some(position) = self.marks.pop_front() {
            self.queued_marks.remove(&position);
            if snapshot.cell(position).is_unknown() {
                return Ok(Action::flag(position));
            }
        }
        while let Some(position) = self.safes.pop_front() {
            self.queued_safes.remove(&position);
            if snapshot.cell(position).is_unknown() {
                return Ok(Action::open(position));
            }
        }

        let unknowns = snapshot.unknown_positions();
        match unknowns.choose(&mut self.rng) {
            Some(&position) => Ok(Action::open(position)),
            // Unreachable while the game is in play: a playing state
            // implies at least one unopened cell.
            None => bail!("no unopened cell left to act on"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::ParseOutcome;
    use std::fs;
    use std::time::Duration;

    fn snap(text: &str) -> BoardSnapshot {
        match BoardSnapshot::parse(text, &HashSet::new(), None) {
            ParseOutcome::Ready(snapshot) => snapshot,
            ParseOutcome::NotReady => panic!("expected a well-formed board"),
        }
    }

    fn test_config(dir: &tempfile::TempDir) -> SolverConfig {
        SolverConfig {
            board_path: dir.path().join("board.out"),
            command_path: dir.path().join("command.inp"),
            result_path: dir.path().join("result.txt"),
            poll_interval_ms: 1,
            poll_timeout_ms: Some(2_000),
            ..SolverConfig::default()
        }
    }

    fn test_engine(dir: &tempfile::TempDir) -> Engine {
        Engine::new(test_config(dir), RunLog::new("test"))
    }

    #[test]
    fn test_exposed_mine_loses_immediately() {
        let snapshot = snap("1\nV,1\n , \n");
        assert_eq!(
            game_state(&snapshot, FinishPolicy::MineTerminates),
            GameState::Lost
        );
        // The variant policy keeps playing while unopened cells remain.
        assert_eq!(
            game_state(&snapshot, FinishPolicy::BoardExhausted),
            GameState::Playing
        );
    }

    #[test]
    fn test_fully_opened_board_wins() {
        let snapshot = snap("4\n0,0\n0,0\n");
        assert_eq!(
            game_state(&snapshot, FinishPolicy::MineTerminates),
            GameState::Won
        );
        assert_eq!(
            game_state(&snapshot, FinishPolicy::BoardExhausted),
            GameState::Won
        );
    }

    #[test]
    fn test_exhausted_board_with_mine_loses_under_both_policies() {
        let snapshot = snap("4\n0,V\n0,0\n");
        assert_eq!(
            game_state(&snapshot, FinishPolicy::MineTerminates),
            GameState::Lost
        );
        assert_eq!(
            game_state(&snapshot, FinishPolicy::BoardExhausted),
            GameState::Lost
        );
    }

    #[test]
    fn test_scheduler_prefers_marks_then_safes_in_fifo_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = test_engine(&dir);
        let snapshot = snap("1\n , \n , \n");

        engine.absorb(
            vec![Point::new(0, 0), Point::new(0, 1)],
            vec![Point::new(1, 0)],
        );

        let first = engine.next_action(&snapshot).unwrap();
        assert_eq!(first, Action::flag(Point::new(0, 0)));
        let second = engine.next_action(&snapshot).unwrap();
        assert_eq!(second, Action::flag(Point::new(0, 1)));
        let third = engine.next_action(&snapshot).unwrap();
        assert_eq!(third, Action::open(Point::new(1, 0)));

        // Queues drained: the scheduler falls back to a random unopened
        // cell.
        let fourth = engine.next_action(&snapshot).unwrap();
        assert_eq!(fourth.intent, Intent::Open);
        assert!(snapshot.cell(fourth.target).is_unknown());
    }

    #[test]
    fn test_scheduler_drops_entries_the_game_already_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = test_engine(&dir);

        engine.absorb(vec![], vec![Point::new(0, 0), Point::new(0, 1)]);

        // The game opened (0,0) through a cascade before we acted on it.
        let snapshot = snap("2\n1, \n , \n");
        let action = engine.next_action(&snapshot).unwrap();
        assert_eq!(action, Action::open(Point::new(0, 1)));
    }

    #[test]
    fn test_absorb_keeps_queues_disjoint_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = test_engine(&dir);

        engine.absorb(vec![Point::new(0, 0)], vec![Point::new(0, 1)]);
        // A later stage reports overlapping conclusions.
        engine.absorb(
            vec![Point::new(0, 0), Point::new(0, 1)],
            vec![Point::new(0, 0), Point::new(0, 1)],
        );

        assert_eq!(engine.marks, VecDeque::from([Point::new(0, 0)]));
        assert_eq!(engine.safes, VecDeque::from([Point::new(0, 1)]));
    }

    #[test]
    fn test_configured_first_move_takes_priority() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.first_move = Some(Point::new(2, 2));
        let mut engine = Engine::new(config, RunLog::new("test"));
        engine.absorb(vec![Point::new(0, 0)], vec![]);

        let snapshot = snap("1\n , , \n , , \n , , \n");
        assert_eq!(
            engine.next_action(&snapshot).unwrap(),
            Action::open(Point::new(2, 2))
        );
        // Consumed: the pending mark is next.
        assert_eq!(
            engine.next_action(&snapshot).unwrap(),
            Action::flag(Point::new(0, 0))
        );
    }

    #[test]
    fn test_corner_mine_scenario_deduces_and_flags() {
        // 3x3 board, one mine at (0,0), everything else opened with its
        // adjacent count. The engine must flag (0,0) without guessing.
        let dir = tempfile::tempdir().unwrap();
        let mut engine = test_engine(&dir);
        let snapshot = snap("1\n ,1,0\n1,1,0\n0,0,0\n");

        engine.extend_queues(&snapshot);
        let action = engine.next_action(&snapshot).unwrap();
        assert_eq!(action, Action::flag(Point::new(0, 0)));
    }

    #[test]
    fn test_won_game_appends_a_single_one() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        fs::write(&config.board_path, "1\n0,0\n0,0\n").unwrap();

        let mut engine = Engine::new(config.clone(), RunLog::new("test"));
        assert_eq!(engine.run().unwrap(), GameState::Won);
        assert_eq!(fs::read_to_string(&config.result_path).unwrap(), "1\n");
        // No command was issued for the terminal snapshot.
        assert!(!config.command_path.exists());
    }

    #[test]
    fn test_lost_game_appends_a_single_zero() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        fs::write(&config.board_path, "1\nV,1\n , \n").unwrap();

        let mut engine = Engine::new(config.clone(), RunLog::new("test"));
        assert_eq!(engine.run().unwrap(), GameState::Lost);
        assert_eq!(fs::read_to_string(&config.result_path).unwrap(), "0\n");
        assert!(!config.command_path.exists());
    }

    #[test]
    fn test_full_round_trip_with_a_cooperating_peer() {
        // One complete rendezvous: the engine answers board 1 with a
        // forced safe open, the peer replies with a fully opened board 2,
        // and the game ends won.
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        fs::write(&config.board_path, "1\n0,0\n0, \n").unwrap();

        let board_path = config.board_path.clone();
        let command_path = config.command_path.clone();
        let peer = std::thread::spawn(move || {
            loop {
                if let Ok(text) = fs::read_to_string(&command_path)
                    && let Some(command) = Command::parse(&text)
                {
                    assert_eq!(command.iteration, 1);
                    assert_eq!(command.action, Action::open(Point::new(1, 1)));
                    fs::write(&board_path, "2\n0,0\n0,0\n").unwrap();
                    return;
                }
                std::thread::sleep(Duration::from_millis(2));
            }
        });

        let mut engine = Engine::new(config.clone(), RunLog::new("test"));
        assert_eq!(engine.run().unwrap(), GameState::Won);
        peer.join().unwrap();
        assert_eq!(fs::read_to_string(&config.result_path).unwrap(), "1\n");
    }
}
