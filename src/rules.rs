//! The chess rules capability. spec.md keeps legal-move generation, FEN/EPD parsing and
//! game-termination detection out of the core's scope and has it consume a `ChessRules`
//! capability instead ("Templated color dispatch in the rules library is not part of this
//! spec; the core only consumes a rules capability and a generic move type" — spec.md §9).
//! This crate backs that capability with `shakmaty` rather than a home-grown rules engine.

use std::fmt;

use anyhow::{anyhow, Context};
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color as ShakColor, EnPassantMode, Position};

use crate::error::Res;

pub const STANDARD_STARTPOS_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stm {
    White,
    Black,
}

impl Stm {
    pub fn other(self) -> Stm {
        match self {
            Stm::White => Stm::Black,
            Stm::Black => Stm::White,
        }
    }
}

impl From<ShakColor> for Stm {
    fn from(c: ShakColor) -> Self {
        match c {
            ShakColor::White => Stm::White,
            ShakColor::Black => Stm::Black,
        }
    }
}

/// Why the rules collaborator thinks the game is over. Maps directly onto the subset of
/// `TerminationReason` that is rules-detected rather than adjudicated or protocol-level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    ThreefoldRepetition,
    FiftyMoveRule,
}

/// A live chess position plus enough history to detect threefold repetition, which `shakmaty`'s
/// `Chess` itself does not track (it only ever represents the current position).
#[derive(Debug, Clone)]
pub struct Board {
    position: Chess,
    /// Repetition keys (board + side to move + castling rights + en passant square, with move
    /// counters stripped) for every position reached so far, including the current one.
    history: Vec<String>,
}

impl Board {
    pub fn startpos() -> Self {
        let position = Chess::new();
        let mut board = Self { position, history: Vec::new() };
        board.push_history();
        board
    }

    pub fn from_fen(fen: &str) -> Res<Self> {
        let fen: Fen = fen.parse().with_context(|| format!("invalid FEN '{fen}'"))?;
        let position: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| anyhow!("illegal starting position: {e}"))?;
        let mut board = Self { position, history: Vec::new() };
        board.push_history();
        Ok(board)
    }

    fn push_history(&mut self) {
        let fen = Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string();
        // Strip the halfmove/fullmove counters (last two fields): repetition compares position
        // and rights only, not the move clocks.
        let key: String = fen.rsplitn(3, ' ').nth(2).unwrap_or(&fen).to_string();
        self.history.push(key);
    }

    pub fn stm(&self) -> Stm {
        self.position.turn().into()
    }

    pub fn ply_count(&self) -> usize {
        self.history.len().saturating_sub(1)
    }

    /// Applies a move already known to be legal (from the opening book prefix). Fatal if it
    /// isn't, per spec.md §4.5 step 2 ("any illegal move in the book is fatal").
    pub fn push_uci_unchecked(&mut self, uci: &str) -> Res<()> {
        let mv: UciMove = uci.parse().with_context(|| format!("malformed UCI move '{uci}'"))?;
        let mv = mv
            .to_move(&self.position)
            .map_err(|e| anyhow!("illegal move '{uci}' in opening book: {e}"))?;
        self.position.play_unchecked(&mv);
        self.push_history();
        Ok(())
    }

    /// Returns the move's SAN (for PGN persistence) if legal, applying it in place.
    pub fn try_push_uci(&mut self, uci: &str) -> Option<String> {
        let mv: UciMove = uci.parse().ok()?;
        let mv = mv.to_move(&self.position).ok()?;
        let san = San::from_move(&self.position, &mv).to_string();
        self.position.play_unchecked(&mv);
        self.push_history();
        Some(san)
    }

    /// Resolves a SAN token (as found in PGN movetext) against the current position, returning
    /// its UCI form without applying it.
    pub fn san_to_uci(&self, san: &str) -> Option<String> {
        let san: San = san.parse().ok()?;
        let mv = san.to_move(&self.position).ok()?;
        Some(mv.to_uci(CastlingMode::Standard).to_string())
    }

    pub fn is_legal_uci(&self, uci: &str) -> bool {
        let Ok(mv) = uci.parse::<UciMove>() else { return false };
        mv.to_move(&self.position).is_ok()
    }

    fn repetition_count(&self) -> usize {
        let Some(current) = self.history.last() else { return 1 };
        self.history.iter().filter(|k| *k == current).count()
    }

    /// `Some(reason)` when the rules collaborator considers the game over. Checked before every
    /// move, per spec.md §4.5 step 2.
    pub fn game_over(&self) -> Option<Termination> {
        if self.position.is_checkmate() {
            return Some(Termination::Checkmate);
        }
        if self.position.is_stalemate() {
            return Some(Termination::Stalemate);
        }
        if self.position.is_insufficient_material() {
            return Some(Termination::InsufficientMaterial);
        }
        if self.repetition_count() >= 3 {
            return Some(Termination::ThreefoldRepetition);
        }
        if self.position.halfmoves() >= 100 {
            return Some(Termination::FiftyMoveRule);
        }
        None
    }

    pub fn fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }

    /// Whether `fen` denotes the standard starting position, used to decide between
    /// `position startpos` and `position fen <fen>` when talking to an engine.
    pub fn is_standard_startpos(fen: &str) -> bool {
        fen.split_whitespace().next() == STANDARD_STARTPOS_FEN.split_whitespace().next()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fen())
    }
}
