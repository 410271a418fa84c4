use crate::Point;
use std::collections::HashSet;

/// The visible state of a single cell, as read from the board channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    /// Not yet opened or flagged.
    Unknown,
    /// Opened by the game, showing the number of adjacent mines.
    Opened(u8),
    /// A mine exposed by the game process. Terminal under the primary
    /// finish policy.
    Mine,
    /// A position this agent has flagged. The game has not confirmed it,
    /// so it is treated as a known mine but never as a loss.
    FlaggedMine,
}

impl Cell {
    pub fn is_unknown(self) -> bool {
        self == Cell::Unknown
    }
}

/// One parsed publication of the board channel.
///
/// Immutable once constructed and owned by a single solve iteration; each
/// read replaces the previous snapshot wholesale.
#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    grid: Vec<Vec<Cell>>,
    iteration: u64,
    remaining_mines: Option<usize>,
}

/// Outcome of one parse attempt against the board file.
///
/// A file that is missing, mid-write, or otherwise malformed parses as
/// `NotReady`; only a well-formed header plus rectangular grid is `Ready`.
/// Not-readiness is data for the polling loop, not an error.
#[derive(Debug)]
pub enum ParseOutcome {
    Ready(BoardSnapshot),
    NotReady,
}

impl BoardSnapshot {
    /// Parses the raw text of the board file.
    ///
    /// The header line carries the iteration tag and, in later protocol
    /// variants, a remaining-mine count (`tag` or `tag,remaining`). Each
    /// following line is one board row, cells comma-separated: a blank
    /// token is unopened, `V` or `M` is a mine, a digit 0-8 is an opened
    /// count.
    ///
    /// `flagged` is the set of positions this agent has flagged so far.
    /// The wire cannot distinguish a flag echo from a genuine reveal, so a
    /// flagged position is classified `FlaggedMine` whether the game
    /// echoes the flag or still shows the cell as unopened; an opened
    /// digit always wins. `total_mines`, when configured, backs the
    /// remaining-mine count for protocol variants whose header omits it.
    pub fn parse(
        text: &str,
        flagged: &HashSet<Point>,
        total_mines: Option<usize>,
    ) -> ParseOutcome {
        let mut lines = text.lines();

        // --- Header ---
        let Some(header) = lines.next() else {
            return ParseOutcome::NotReady;
        };
        let mut fields = header.split(',');
        let iteration = match fields.next().map(|f| f.trim().parse::<u64>()) {
            Some(Ok(tag)) => tag,
            _ => return ParseOutcome::NotReady,
        };
        let declared_remaining = match fields.next() {
            Some(field) => match field.trim().parse::<usize>() {
                Ok(count) => Some(count),
                Err(_) => return ParseOutcome::NotReady,
            },
            None => None,
        };
        if fields.next().is_some() {
            return ParseOutcome::NotReady;
        }

        // --- Rows ---
        let mut body: Vec<&str> = lines.collect();
        while body.last().is_some_and(|line| line.trim().is_empty()) {
            body.pop();
        }
        if body.is_empty() {
            return ParseOutcome::NotReady;
        }

        let mut grid: Vec<Vec<Cell>> = Vec::with_capacity(body.len());
        for (row, line) in body.iter().enumerate() {
            let mut cells = Vec::new();
            for (col, token) in line.split(',').enumerate() {
                let Some(symbol) = parse_symbol(token) else {
                    return ParseOutcome::NotReady;
                };
                let cell = match symbol {
                    // Agent-side flag knowledge overrides the wire symbol,
                    // except when the game has since opened the cell.
                    Cell::Opened(_) => symbol,
                    _ if flagged.contains(&Point::new(row, col)) => Cell::FlaggedMine,
                    _ => symbol,
                };
                cells.push(cell);
            }
            if let Some(first) = grid.first()
                && cells.len() != first.len()
            {
                // A ragged grid is a write in progress.
                return ParseOutcome::NotReady;
            }
            grid.push(cells);
        }

        let remaining_mines =
            declared_remaining.or_else(|| total_mines.map(|t| t.saturating_sub(flagged.len())));

        ParseOutcome::Ready(BoardSnapshot {
            grid,
            iteration,
            remaining_mines,
        })
    }

    pub fn rows(&self) -> usize {
        self.grid.len()
    }

    pub fn cols(&self) -> usize {
        self.grid[0].len()
    }

    /// The iteration tag this snapshot was published under.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Mines not yet accounted for, when the protocol or configuration
    /// makes that count known.
    pub fn remaining_mines(&self) -> Option<usize> {
        self.remaining_mines
    }

    /// The cell at `position`. Panics if the position is off the board,
    /// which can only happen through a neighbor-clipping bug.
    pub fn cell(&self, position: Point) -> Cell {
        self.grid[position.row][position.col]
    }

    pub fn has_unknown(&self) -> bool {
        self.grid
            .iter()
            .any(|row| row.iter().any(|cell| cell.is_unknown()))
    }

    pub fn has_exposed_mine(&self) -> bool {
        self.grid
            .iter()
            .any(|row| row.iter().any(|&cell| cell == Cell::Mine))
    }

    /// Every unopened, unflagged position, in row-major order.
    pub fn unknown_positions(&self) -> Vec<Point> {
        let mut positions = Vec::new();
        for (row, cells) in self.grid.iter().enumerate() {
            for (col, cell) in cells.iter().enumerate() {
                if cell.is_unknown() {
                    positions.push(Point::new(row, col));
                }
            }
        }
        positions
    }

    /// Derived mine-indicator view: mines (exposed or flagged) map to
    /// `Some(1)`, opened cells to `Some(0)`, unopened cells stay `None`
    /// for later variable substitution.
    pub fn mine_indicator(&self) -> Vec<Vec<Option<u8>>> {
        self.grid
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| match cell {
                        Cell::Mine | Cell::FlaggedMine => Some(1),
                        Cell::Opened(_) => Some(0),
                        Cell::Unknown => None,
                    })
                    .collect()
            })
            .collect()
    }
}

fn parse_symbol(token: &str) -> Option<Cell> {
    let symbol = token.trim();
    match symbol {
        "" => Some(Cell::Unknown),
        "V" | "M" => Some(Cell::Mine),
        _ => match symbol.parse::<u8>() {
            Ok(count) if count <= 8 => Some(Cell::Opened(count)),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_flags() -> HashSet<Point> {
        HashSet::new()
    }

    fn ready(text: &str) -> BoardSnapshot {
        match BoardSnapshot::parse(text, &no_flags(), None) {
            ParseOutcome::Ready(snapshot) => snapshot,
            ParseOutcome::NotReady => panic!("expected a well-formed board"),
        }
    }

    #[test]
    fn test_parse_basic_board() {
        let snapshot = ready("3\n0,1, \n1,2,V\n , ,1\n");
        assert_eq!(snapshot.iteration(), 3);
        assert_eq!(snapshot.remaining_mines(), None);
        assert_eq!(snapshot.rows(), 3);
        assert_eq!(snapshot.cols(), 3);
        assert_eq!(snapshot.cell(Point::new(0, 0)), Cell::Opened(0));
        assert_eq!(snapshot.cell(Point::new(0, 2)), Cell::Unknown);
        assert_eq!(snapshot.cell(Point::new(1, 2)), Cell::Mine);
        assert!(snapshot.has_exposed_mine());
        assert!(snapshot.has_unknown());
    }

    #[test]
    fn test_parse_header_with_remaining_mines() {
        let snapshot = ready("7,4\n1, \n , \n");
        assert_eq!(snapshot.iteration(), 7);
        assert_eq!(snapshot.remaining_mines(), Some(4));
    }

    #[test]
    fn test_remaining_mines_falls_back_to_configured_total() {
        let mut flagged = HashSet::new();
        flagged.insert(Point::new(0, 0));
        let ParseOutcome::Ready(snapshot) =
            BoardSnapshot::parse("2\n , \n1,1\n", &flagged, Some(3))
        else {
            panic!("expected a well-formed board");
        };
        // One flag placed out of three mines total.
        assert_eq!(snapshot.remaining_mines(), Some(2));
    }

    #[test]
    fn test_flagged_positions_are_not_exposed_mines() {
        let mut flagged = HashSet::new();
        flagged.insert(Point::new(0, 1));

        // Whether the game echoes the flag as a mine symbol or keeps the
        // cell blank, the snapshot must not read as a loss.
        for text in ["1\n1,M\n", "1\n1, \n"] {
            let ParseOutcome::Ready(snapshot) = BoardSnapshot::parse(text, &flagged, None) else {
                panic!("expected a well-formed board");
            };
            assert_eq!(snapshot.cell(Point::new(0, 1)), Cell::FlaggedMine);
            assert!(!snapshot.has_exposed_mine());
        }
    }

    #[test]
    fn test_opened_cell_wins_over_stale_flag() {
        let mut flagged = HashSet::new();
        flagged.insert(Point::new(0, 0));
        let ParseOutcome::Ready(snapshot) = BoardSnapshot::parse("1\n2,1\n", &flagged, None) else {
            panic!("expected a well-formed board");
        };
        assert_eq!(snapshot.cell(Point::new(0, 0)), Cell::Opened(2));
    }

    #[test]
    fn test_malformed_input_is_not_ready() {
        // Missing header, garbage header, bad symbol, ragged rows, no rows.
        for text in [
            "",
            "not-a-number\n1,1\n",
            "4,x\n1,1\n",
            "1\n1,9\n",
            "1\nQ,1\n",
            "1\n1,1\n1\n",
            "5\n",
        ] {
            assert!(
                matches!(
                    BoardSnapshot::parse(text, &HashSet::new(), None),
                    ParseOutcome::NotReady
                ),
                "expected NotReady for {text:?}"
            );
        }
    }

    #[test]
    fn test_unknown_positions_row_major() {
        let snapshot = ready("1\n ,1\n1, \n");
        assert_eq!(
            snapshot.unknown_positions(),
            vec![Point::new(0, 0), Point::new(1, 1)]
        );
    }

    #[test]
    fn test_mine_indicator() {
        let snapshot = ready("1\nV,2\n , \n");
        let indicator = snapshot.mine_indicator();
        assert_eq!(indicator[0][0], Some(1));
        assert_eq!(indicator[0][1], Some(0));
        assert_eq!(indicator[1][0], None);
    }
}
