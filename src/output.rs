//! Output is a capability injected at construction, not a global. Grounded on
//! `gears::output`'s `Output`/`OutputBuilder`/`Message` trio (`examples/toanth-motors/gears/src/
//! output.rs`) and `monitors`'s convention of auto-adding a second, structured "logger" output
//! when `args.debug` is set: the default prints the cutechess-style interval/game lines from
//! spec.md §7, the logger additionally appends every line to a file when `-debug`/`-log` names
//! one.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

use crate::match_runner::GameRecord;
use crate::scheduler::TournamentState;
use crate::sprt::SprtDecision;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    Info,
    Warning,
    Error,
}

impl Message {
    fn prefix(self) -> &'static str {
        match self {
            Message::Info => "",
            Message::Warning => "Warning: ",
            Message::Error => "Error: ",
        }
    }
}

/// Capability consumed by the scheduler on every reporting event (spec.md §9's "output is a
/// capability the scheduler holds; implementations are chosen by config and injected at
/// construction").
pub trait Output: Send + Sync {
    fn display_message(&self, typ: Message, message: &str);

    fn game_finished(&self, record: &GameRecord) {
        let reason = &record.termination_reason;
        let score = match (record.white_result, record.black_result) {
            (crate::match_runner::PlayerOutcome::Win, _) => "1-0",
            (_, crate::match_runner::PlayerOutcome::Win) => "0-1",
            _ => "1/2-1/2",
        };
        self.display_message(
            Message::Info,
            &format!(
                "Finished game {} ({} vs {}): {score} {{{reason}}}",
                record.game_id, record.white_name, record.black_name
            ),
        );
    }

    fn game_restarted(&self, record: &GameRecord) {
        self.display_message(
            Message::Warning,
            &format!("Game {} disconnected, re-enqueuing ({})", record.game_id, record.termination_reason),
        );
    }

    fn rating_interval(&self, state: &TournamentState) {
        for ((a, b), stats) in state.stats.snapshot() {
            let mut line = format!(
                "{a} vs {b}: {}-{}-{} (w-l-d), elo {:+.1}, los {:.1}%, draw ratio {:.1}%",
                stats.wins,
                stats.losses,
                stats.draws,
                stats.elo_diff(),
                stats.los() * 100.0,
                stats.draw_ratio() * 100.0,
            );
            if state.options.report_penta {
                line.push_str(&format!(
                    ", penta [{}, {}, {}, {}, {}]",
                    stats.ll, stats.ld, stats.wl_or_dd, stats.wd, stats.ww
                ));
            }
            if state.options.sprt.enabled {
                let sprt = crate::sprt::SprtState {
                    alpha: state.options.sprt.alpha,
                    beta: state.options.sprt.beta,
                    elo0: state.options.sprt.elo0,
                    elo1: state.options.sprt.elo1,
                    model: state.options.sprt.model,
                };
                let (llr, _) = sprt.evaluate(&stats, state.options.report_penta);
                line.push_str(&format!(
                    ", llr {llr:.3} [{:.3}, {:.3}]",
                    sprt.lower_bound(),
                    sprt.upper_bound()
                ));
            }
            self.display_message(Message::Info, &line);
        }
    }

    fn score_interval(&self, state: &TournamentState) {
        let completed = state.match_count.load(std::sync::atomic::Ordering::SeqCst);
        self.display_message(Message::Info, &format!("{completed}/{} games played", state.expected_total));
    }

    fn sprt_concluded(&self, llr: f64, decision: SprtDecision) {
        let verdict = match decision {
            SprtDecision::AcceptH0 => "H0 accepted",
            SprtDecision::AcceptH1 => "H1 accepted",
            SprtDecision::Continue => "inconclusive",
        };
        self.display_message(Message::Info, &format!("SPRT: llr={llr:.3} ({verdict})"));
    }

    fn tournament_finished(&self, state: &TournamentState) {
        let completed = state.match_count.load(std::sync::atomic::Ordering::SeqCst);
        self.display_message(Message::Info, &format!("Tournament finished: {completed} games played"));
        self.rating_interval(state);
    }
}

/// Prints every message to stdout (errors/warnings also to stderr), the default used whenever no
/// `-debug`/`-log` flag names a file.
#[derive(Debug, Default)]
pub struct ConsoleOutput;

impl Output for ConsoleOutput {
    fn display_message(&self, typ: Message, message: &str) {
        match typ {
            Message::Error | Message::Warning => eprintln!("{}{message}", typ.prefix()),
            Message::Info => println!("{}{message}", typ.prefix()),
        }
    }
}

/// Appends every message, console-formatted, to a log file in addition to printing it — the
/// "logger output gets auto-added when `args.debug`" behavior carried over from `monitors`.
pub struct LoggerOutput {
    console: ConsoleOutput,
    file: Mutex<File>,
}

impl LoggerOutput {
    pub fn open(path: &std::path::Path) -> crate::error::Res<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { console: ConsoleOutput, file: Mutex::new(file) })
    }
}

impl Output for LoggerOutput {
    fn display_message(&self, typ: Message, message: &str) {
        self.console.display_message(typ, message);
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "{}{message}", typ.prefix());
        }
    }
}

/// Discards every message; used by tests that only care about game outcomes.
#[derive(Debug, Default)]
pub struct NullOutput;

impl Output for NullOutput {
    fn display_message(&self, _typ: Message, _message: &str) {}
}

/// Fans a message out to every registered output, mirroring `monitors`'s support for more than
/// one simultaneous `Output` (console + logger).
#[derive(Default)]
pub struct OutputSet {
    outputs: Vec<Box<dyn Output>>,
}

impl OutputSet {
    pub fn new(outputs: Vec<Box<dyn Output>>) -> Self {
        Self { outputs }
    }
}

impl Output for OutputSet {
    fn display_message(&self, typ: Message, message: &str) {
        for out in &self.outputs {
            out.display_message(typ, message);
        }
    }

    fn game_finished(&self, record: &GameRecord) {
        for out in &self.outputs {
            out.game_finished(record);
        }
    }

    fn game_restarted(&self, record: &GameRecord) {
        for out in &self.outputs {
            out.game_restarted(record);
        }
    }

    fn rating_interval(&self, state: &TournamentState) {
        for out in &self.outputs {
            out.rating_interval(state);
        }
    }

    fn score_interval(&self, state: &TournamentState) {
        for out in &self.outputs {
            out.score_interval(state);
        }
    }

    fn sprt_concluded(&self, llr: f64, decision: SprtDecision) {
        for out in &self.outputs {
            out.sprt_concluded(llr, decision);
        }
    }

    fn tournament_finished(&self, state: &TournamentState) {
        for out in &self.outputs {
            out.tournament_finished(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_prefix_is_empty_for_info() {
        assert_eq!(Message::Info.prefix(), "");
        assert_eq!(Message::Warning.prefix(), "Warning: ");
    }

    #[test]
    fn null_output_accepts_every_call_without_panicking() {
        let out = NullOutput;
        out.display_message(Message::Error, "ignored");
    }
}
