//! Move payloads exchanged during a match.
//!
//! The lobby and the agent never judge whether a move is legal; that belongs
//! to the game engine.  They only agree on the textual grammar:
//!
//! ```text
//! move   = square ( ">" square )+
//! square = row "," col          ; row, col in 0..=7
//! ```
//!
//! `2,3>3,4` is a simple step, `5,0>3,2>1,4` a double jump.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::DomainError;

/// Number of rows and columns on the board.
pub const BOARD_SIZE: u8 = 8;

/// A single board square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Square {
    pub row: u8,
    pub col: u8,
}

impl Square {
    /// Creates a square, returning `None` when it lies off the board.
    pub fn new(row: u8, col: u8) -> Option<Self> {
        (row < BOARD_SIZE && col < BOARD_SIZE).then_some(Self { row, col })
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.row, self.col)
    }
}

/// A move: the path a piece travels, from its starting square to its final square.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    path: Vec<Square>,
}

impl Move {
    /// Builds a move from a path of at least two squares.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::MalformedMove`] for paths shorter than two.
    pub fn new(path: Vec<Square>) -> Result<Self, DomainError> {
        if path.len() < 2 {
            return Err(DomainError::MalformedMove(format!(
                "path needs at least 2 squares, got {}",
                path.len()
            )));
        }
        Ok(Self { path })
    }

    /// Every square visited, in order.
    pub fn path(&self) -> &[Square] {
        &self.path
    }

    /// Renders the move in wire form.
    pub fn to_sendable(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, square) in self.path.iter().enumerate() {
            if i > 0 {
                f.write_str(">")?;
            }
            write!(f, "{square}")?;
        }
        Ok(())
    }
}

impl FromStr for Move {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || DomainError::MalformedMove(s.to_string());

        let path = s
            .split('>')
            .map(|square| {
                let (row, col) = square.split_once(',').ok_or_else(malformed)?;
                let row: u8 = row.parse().map_err(|_| malformed())?;
                let col: u8 = col.parse().map_err(|_| malformed())?;
                Square::new(row, col).ok_or_else(malformed)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(path).map_err(|_| malformed())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
