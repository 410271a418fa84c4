use crate::Point;
use crate::board::{BoardSnapshot, ParseOutcome};
use anyhow::{Context, Result, bail};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

/// Sleep interval growth is capped so a slow peer is still observed
/// promptly once it catches up.
const MAX_POLL_BACKOFF: Duration = Duration::from_millis(200);

/// What the agent wants done at a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Open,
    Flag,
}

/// A position plus an intent. Exactly one action is emitted per protocol
/// round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    pub target: Point,
    pub intent: Intent,
}

impl Action {
    pub fn open(target: Point) -> Self {
        Action {
            target,
            intent: Intent::Open,
        }
    }

    pub fn flag(target: Point) -> Self {
        Action {
            target,
            intent: Intent::Flag,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.intent {
            Intent::Open => write!(f, "open {}", self.target),
            Intent::Flag => write!(f, "flag {}", self.target),
        }
    }
}

/// An iteration-tagged action, the unit exchanged on the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub iteration: u64,
    pub action: Action,
}

impl Command {
    /// Wire form: the iteration tag on its own line, then the one-indexed
    /// position, with a trailing `M` for a flag.
    pub fn to_wire(&self) -> String {
        let Point { row, col } = self.action.target;
        match self.action.intent {
            Intent::Open => format!("{}\n{} {}\n", self.iteration, row + 1, col + 1),
            Intent::Flag => format!("{}\n{} {} M\n", self.iteration, row + 1, col + 1),
        }
    }

    /// Parses the wire form back into a command. Used by the game side of
    /// the protocol and by the round-trip tests.
    pub fn parse(text: &str) -> Option<Command> {
        let mut lines = text.lines();
        let iteration = lines.next()?.trim().parse::<u64>().ok()?;
        let mut fields = lines.next()?.split_whitespace();
        let row = fields.next()?.parse::<usize>().ok()?;
        let col = fields.next()?.parse::<usize>().ok()?;
        if row == 0 || col == 0 {
            return None;
        }
        let target = Point::new(row - 1, col - 1);
        let action = match fields.next() {
            None => Action::open(target),
            Some("M") => Action::flag(target),
            Some(_) => return None,
        };
        if fields.next().is_some() {
            return None;
        }
        Some(Command { iteration, action })
    }
}

/// Reader side of the board mailbox.
///
/// The file is overwritten in place by the game process; this reader polls
/// it with bounded backoff until it sees a well-formed snapshot carrying
/// the expected iteration tag. Stale tags and torn writes are discarded,
/// never treated as errors.
pub struct BoardChannel {
    path: PathBuf,
    poll_interval: Duration,
    poll_timeout: Option<Duration>,
    strict_iteration: bool,
}

impl BoardChannel {
    pub fn new(
        path: PathBuf,
        poll_interval: Duration,
        poll_timeout: Option<Duration>,
        strict_iteration: bool,
    ) -> Self {
        BoardChannel {
            path,
            poll_interval,
            poll_timeout,
            strict_iteration,
        }
    }

    /// Blocks until a snapshot tagged `expected` (or newer, unless the
    /// strict variant is configured) is visible, or the poll timeout
    /// elapses.
    pub fn read(
        &self,
        expected: u64,
        flagged: &HashSet<Point>,
        total_mines: Option<usize>,
    ) -> Result<BoardSnapshot> {
        let started = Instant::now();
        let mut backoff = self.poll_interval.max(Duration::from_millis(1));
        loop {
            if let Some(snapshot) = self.try_read(expected, flagged, total_mines) {
                return Ok(snapshot);
            }
            if let Some(limit) = self.poll_timeout
                && started.elapsed() >= limit
            {
                bail!(
                    "board channel {} stayed silent for {:.1?} waiting for iteration {}",
                    self.path.display(),
                    limit,
                    expected
                );
            }
            thread::sleep(backoff);
            backoff = (backoff * 2).min(MAX_POLL_BACKOFF);
        }
    }

    /// One non-blocking poll. A missing file, a parse failure, or a stale
    /// iteration tag all mean "not yet".
    fn try_read(
        &self,
        expected: u64,
        flagged: &HashSet<Point>,
        total_mines: Option<usize>,
    ) -> Option<BoardSnapshot> {
        let text = fs::read_to_string(&self.path).ok()?;
        match BoardSnapshot::parse(&text, flagged, total_mines) {
            ParseOutcome::Ready(snapshot) => {
                let accepted = if self.strict_iteration {
                    snapshot.iteration() == expected
                } else {
                    snapshot.iteration() >= expected
                };
                accepted.then_some(snapshot)
            }
            ParseOutcome::NotReady => None,
        }
    }
}

/// Writer side of the command mailbox.
pub struct CommandChannel {
    path: PathBuf,
}

impl CommandChannel {
    pub fn new(path: PathBuf) -> Self {
        CommandChannel { path }
    }

    /// Publishes the command, replacing whatever the mailbox held.
    pub fn write(&self, command: &Command) -> Result<()> {
        let mut file = fs::File::create(&self.path)
            .with_context(|| format!("opening command channel {}", self.path.display()))?;
        file.write_all(command.to_wire().as_bytes())
            .with_context(|| format!("writing command channel {}", self.path.display()))?;
        file.sync_all()
            .with_context(|| format!("flushing command channel {}", self.path.display()))?;
        Ok(())
    }
}

/// Append-only record of finished games: one line per game, `1` for a win
/// and `0` for a loss.
pub struct OutcomeRecord {
    path: PathBuf,
}

impl OutcomeRecord {
    pub fn new(path: PathBuf) -> Self {
        OutcomeRecord { path }
    }

    pub fn append(&self, won: bool) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening outcome record {}", self.path.display()))?;
        writeln!(file, "{}", if won { 1 } else { 0 })
            .with_context(|| format!("appending to outcome record {}", self.path.display()))?;
        Ok(())
    }
}
