//! Error handling split in two, mirroring the crate this driver is descended from:
//! fatal/setup failures go through [`Res`] (an `anyhow` alias), while per-game,
//! engine-caused failures are reported as [`TerminationReason`] values attached
//! to a finished game record instead of being thrown.

use std::fmt;

/// Alias used throughout for fallible setup and I/O, exactly like `gears::general::common::Res`.
pub type Res<T> = anyhow::Result<T>;

/// Why a game ended. Carried in [`crate::match_runner::GameRecord`], never propagated as an
/// exception: the turn loop matches on these and routes them to a result, it doesn't unwind.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum TerminationReason {
    EngineStartFailed,
    Disconnect,
    Handshake,
    Protocol,
    Timeout,
    IllegalMove,
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    ThreefoldRepetition,
    FiftyMoveRule,
    DrawAdjudication,
    ResignAdjudication,
    Aborted,
}

impl TerminationReason {
    /// Whether this reason ends the game in a draw rather than a decisive result.
    pub fn is_draw(self) -> bool {
        matches!(
            self,
            TerminationReason::Stalemate
                | TerminationReason::InsufficientMaterial
                | TerminationReason::ThreefoldRepetition
                | TerminationReason::FiftyMoveRule
                | TerminationReason::DrawAdjudication
        )
    }

    /// The string tag persisted in a `GameRecord` and printed in user-visible output.
    pub fn tag(self) -> &'static str {
        match self {
            TerminationReason::EngineStartFailed => "engine_start_failed",
            TerminationReason::Disconnect => "disconnect",
            TerminationReason::Handshake => "handshake",
            TerminationReason::Protocol => "protocol",
            TerminationReason::Timeout => "timeout",
            TerminationReason::IllegalMove => "illegal_move",
            TerminationReason::Checkmate => "checkmate",
            TerminationReason::Stalemate => "stalemate",
            TerminationReason::InsufficientMaterial => "insufficient_material",
            TerminationReason::ThreefoldRepetition => "threefold_repetition",
            TerminationReason::FiftyMoveRule => "fifty_move_rule",
            TerminationReason::DrawAdjudication => "draw_adjudication",
            TerminationReason::ResignAdjudication => "resign_adjudication",
            TerminationReason::Aborted => "aborted",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Process exit codes. Distinguished by failure class rather than a single generic nonzero,
/// following the convention the wider corpus uses for CLI binaries.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExitCode {
    Ok = 0,
    Config = 1,
    Fatal = 2,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}
