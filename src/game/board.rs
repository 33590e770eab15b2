//! Board Model
//!
//! Nine cells in row-major order plus win/draw evaluation.
//! All operations are pure: a move produces a new board, a rejected move
//! leaves the original untouched.

use std::fmt;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::role::{Mark, Role};

/// Number of cells on the board.
pub const BOARD_CELLS: usize = 9;

/// Winning lines in scan order: rows, then columns, then diagonals.
pub const WINNING_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// A single board cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    /// Unclaimed.
    #[default]
    Empty,
    /// Claimed by the role owning the mark.
    Marked(Mark),
}

impl Cell {
    /// Check if the cell is unclaimed.
    #[inline]
    pub fn is_empty(self) -> bool {
        self == Cell::Empty
    }

    /// Mark on the cell, if any.
    #[inline]
    pub fn mark(self) -> Option<Mark> {
        match self {
            Cell::Empty => None,
            Cell::Marked(mark) => Some(mark),
        }
    }
}

/// Classification of a board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// No line completed and at least one empty cell.
    InProgress,
    /// A role completed a line.
    Won(Role),
    /// Board full without a completed line.
    Draw,
}

impl Outcome {
    /// Check if the round is decided.
    #[inline]
    pub fn is_over(self) -> bool {
        !matches!(self, Outcome::InProgress)
    }
}

/// Rejected board mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IllegalMove {
    /// Index outside 0-8.
    #[error("cell {0} is outside the board")]
    OutOfRange(usize),

    /// Target cell already claimed.
    #[error("cell {0} is already occupied")]
    Occupied(usize),

    /// Board already won or drawn.
    #[error("round is already decided")]
    RoundOver,
}

/// 3x3 game board.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    cells: [Cell; BOARD_CELLS],
}

impl Board {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a board from raw cells.
    pub fn from_cells(cells: [Cell; BOARD_CELLS]) -> Self {
        Self { cells }
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> &[Cell; BOARD_CELLS] {
        &self.cells
    }

    /// Cell at `index`, or `None` when out of range.
    pub fn get(&self, index: usize) -> Option<Cell> {
        self.cells.get(index).copied()
    }

    /// Number of claimed cells.
    pub fn marked_count(&self) -> usize {
        self.cells.iter().filter(|c| !c.is_empty()).count()
    }

    /// Check if every cell is claimed.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|c| !c.is_empty())
    }

    /// Place `mark` at `index`, returning the resulting board.
    pub fn apply_mark(&self, index: usize, mark: Mark) -> Result<Board, IllegalMove> {
        let cell = self.get(index).ok_or(IllegalMove::OutOfRange(index))?;
        if !cell.is_empty() {
            return Err(IllegalMove::Occupied(index));
        }
        if self.evaluate().is_over() {
            return Err(IllegalMove::RoundOver);
        }

        let mut next = *self;
        next.cells[index] = Cell::Marked(mark);
        Ok(next)
    }

    /// Classify the board.
    pub fn evaluate(&self) -> Outcome {
        if let Some((mark, _)) = self.completed_line() {
            return Outcome::Won(mark.owner());
        }
        if self.is_full() {
            Outcome::Draw
        } else {
            Outcome::InProgress
        }
    }

    /// First completed line in scan order.
    pub fn winning_line(&self) -> Option<[usize; 3]> {
        self.completed_line().map(|(_, line)| line)
    }

    fn completed_line(&self) -> Option<(Mark, [usize; 3])> {
        WINNING_LINES.iter().find_map(|&[a, b, c]| {
            let mark = self.cells[a].mark()?;
            if self.cells[b] == self.cells[a] && self.cells[c] == self.cells[a] {
                Some((mark, [a, b, c]))
            } else {
                None
            }
        })
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, cells) in self.cells.chunks(3).enumerate() {
            if row > 0 {
                writeln!(f)?;
            }
            for (col, cell) in cells.iter().enumerate() {
                if col > 0 {
                    f.write_str(" ")?;
                }
                match cell {
                    Cell::Empty => f.write_str(".")?,
                    Cell::Marked(mark) => write!(f, "{}", mark)?,
                }
            }
        }
        Ok(())
    }
}
