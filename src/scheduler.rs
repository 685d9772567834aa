//! Enumerates the pairing x round x game task list, dispatches onto the worker pool, and drives
//! completion bookkeeping. Grounded on `original_source/app/src/matchmaking/tournament/
//! roundrobin/roundrobin.cpp` (`RoundRobin::create`/`start`/`updateSprtStatus`): the `i < j`
//! double loop, per-round opening fetch shared by both games of a pair, `game_id = round_id *
//! games + (g+1)` numbering, and the scoreinterval/ratinginterval/autosave split are all carried
//! over in semantics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{EngineConfiguration, TournamentOptions};
use crate::match_runner::{GameRecord, MatchRunner, MatchRunnerConfig, PlayerOutcome};
use crate::opening_book::{Opening, OpeningBook};
use crate::output::Output;
use crate::persist::{save_snapshot, PgnWriter};
use crate::sprt::{SprtDecision, SprtState};
use crate::rules::Stm;
use crate::stats::{GameOutcome, StatsMap};
use crate::uci_engine::UciEngine;
use crate::worker_pool::WorkerPool;

/// Shared, process-wide tournament state. Counters are atomics; `stats`/`pending_pairs` are
/// guarded by their own locks; everything else is read-only once built (spec.md §5).
pub struct TournamentState {
    pub engines: Vec<EngineConfiguration>,
    pub options: TournamentOptions,
    pub book: OpeningBook,
    pub stats: StatsMap,
    /// First-half result of a paired (games=2) round, keyed by (engine_i, engine_j, round_id),
    /// until its second half completes and the pair can be folded via `Stats::record_pair`.
    pending_pairs: Mutex<HashMap<(String, String, u32), GameOutcome>>,
    pub match_count: AtomicU64,
    /// Number of (pair, round) slots the scheduler has dispatched so far, across every pairing
    /// (spec.md §5).
    pub round_count: AtomicU64,
    pub timeout_count: AtomicU64,
    pub stop_flag: Arc<AtomicBool>,
    pub output: Box<dyn Output>,
    pub pgn: Mutex<Option<PgnWriter>>,
    pub expected_total: u64,
}

fn grace_period() -> Duration {
    Duration::from_millis(1000)
}

pub struct Scheduler {
    state: Arc<TournamentState>,
    pool: WorkerPool,
}

impl Scheduler {
    pub fn new(
        engines: Vec<EngineConfiguration>,
        options: TournamentOptions,
        book: OpeningBook,
        output: Box<dyn Output>,
        pgn: Option<PgnWriter>,
    ) -> Self {
        let n = engines.len() as u64;
        let expected_total = n * n.saturating_sub(1) / 2 * options.rounds as u64 * options.games as u64;
        let stop_flag = Arc::new(AtomicBool::new(false));
        let concurrency = options.concurrency;
        let state = Arc::new(TournamentState {
            engines,
            options,
            book,
            stats: StatsMap::new(),
            pending_pairs: Mutex::new(HashMap::new()),
            match_count: AtomicU64::new(0),
            round_count: AtomicU64::new(0),
            timeout_count: AtomicU64::new(0),
            stop_flag: stop_flag.clone(),
            output,
            pgn: Mutex::new(pgn),
            expected_total,
        });
        Self { state, pool: WorkerPool::new(concurrency, stop_flag) }
    }

    /// Builds and dispatches the full `i < j` x round x game task list, per spec.md §4.7.
    pub fn run(&self) {
        let n = self.state.engines.len();
        'pairs: for i in 0..n {
            for j in (i + 1)..n {
                for round_id in 0..self.state.options.rounds {
                    if self.state.stop_flag.load(Ordering::SeqCst) {
                        break 'pairs;
                    }
                    let opening_id = self.state.book.next_id();
                    let opening = self.state.book.fetch(opening_id).clone();
                    self.state.round_count.fetch_add(1, Ordering::SeqCst);
                    for g in 0..self.state.options.games {
                        if self.state.stop_flag.load(Ordering::SeqCst) {
                            break 'pairs;
                        }
                        let game_id = round_id as u64 * self.state.options.games as u64 + (g as u64 + 1);
                        self.dispatch(i, j, g, round_id, game_id, opening.clone());
                    }
                }
            }
        }
        self.pool.join();
        self.state.output.tournament_finished(&self.state);
    }

    fn dispatch(&self, i: usize, j: usize, g: u32, round_id: u32, game_id: u64, opening: Opening) {
        let state = self.state.clone();
        self.pool.execute(move || {
            run_one_game(state, i, j, g, round_id, game_id, opening);
        });
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.state.stop_flag.clone()
    }
}

/// `i`/`j` are the canonical pair from the outer loop and never swap in the dispatched task list;
/// only white/black assignment swaps, on two independent triggers: odd `g` ("the same opening is
/// played twice with colors swapped" — spec.md §4.7) and the book line's own side to move
/// (`opening.stm`, spec.md:129 — a book entry with Black to move hands the first-mover role to
/// whichever engine is about to control that color). Reporting then normalizes back out the
/// `opening.stm` flip only, so stats/output always read from the same `(i, j)` orientation
/// regardless of which book line produced the game (spec.md:182).
fn run_one_game(
    state: Arc<TournamentState>,
    i: usize,
    j: usize,
    g: u32,
    round_id: u32,
    game_id: u64,
    opening: Opening,
) {
    if state.stop_flag.load(Ordering::SeqCst) {
        return;
    }
    let stm_swap = opening.stm == Stm::Black;
    let (white_idx, black_idx) = white_black_indices(i, j, g, stm_swap);
    let white_config = state.engines[white_idx].clone();
    let black_config = state.engines[black_idx].clone();

    let (Ok(white_engine), Ok(black_engine)) =
        (UciEngine::new(&white_config, grace_period()), UciEngine::new(&black_config, grace_period()))
    else {
        return;
    };

    let runner_cfg = MatchRunnerConfig {
        round_id,
        game_id,
        ping_time_ms: crate::uci_engine::PING_TIME_MS,
        draw: state.options.draw,
        resign: state.options.resign,
    };
    let runner = MatchRunner::new(white_engine, white_config.clone(), black_engine, black_config.clone(), runner_cfg);
    let mut record = runner.run(&opening);

    if record.needs_restart {
        // Crash recovery: re-enqueue this exact pairing/round/game.
        let state2 = state.clone();
        let opening2 = opening.clone();
        state.output.game_restarted(&record);
        std::thread::spawn(move || {
            run_one_game(state2, i, j, g, round_id, game_id, opening2);
        });
        return;
    }

    let (pair_i, pair_j) = normalized_pair(i, j, stm_swap);
    let i_outcome =
        if white_idx == pair_i { outcome_from(record.white_result) } else { outcome_from(record.black_result) };
    fold_stats(&state, pair_i, pair_j, g, round_id, i_outcome);
    on_completion(&state, &mut record, pair_i, pair_j);
}

/// Which index plays white, combining the paired-round color swap (`g % 2 == 1`) with the book
/// line's side to move (`stm_swap`, true when `opening.stm == Black`) — two independent triggers
/// for the same flip (spec.md §4.7, spec.md:129).
fn white_black_indices(i: usize, j: usize, g: u32, stm_swap: bool) -> (usize, usize) {
    let parity_swap = g % 2 == 1;
    if parity_swap ^ stm_swap {
        (j, i)
    } else {
        (i, j)
    }
}

/// Undoes only the `opening.stm` half of the flip above, so a given `(i, j)` pair's stats/output
/// always read from the same orientation regardless of which book line produced the game
/// (spec.md:182).
fn normalized_pair(i: usize, j: usize, stm_swap: bool) -> (usize, usize) {
    if stm_swap {
        (j, i)
    } else {
        (i, j)
    }
}

fn outcome_from(result: PlayerOutcome) -> GameOutcome {
    match result {
        PlayerOutcome::Win => GameOutcome::Win,
        PlayerOutcome::Draw => GameOutcome::Draw,
        // Aborted/unfinished games never reach the stats map under the spec's crash-recovery
        // contract (needs_restart is checked before this point); treat defensively as a loss.
        PlayerOutcome::Loss | PlayerOutcome::None => GameOutcome::Loss,
    }
}

/// Folds `i`'s outcome into the shared stats map: single-game accounting when `games == 1` or
/// pentanomial pairing is off, otherwise buffers the first half of a pair and folds both halves
/// together via `Stats::record_pair` once the second half arrives (spec.md §4.6/§9 — partial
/// pairs are never fed to SPRT).
fn fold_stats(state: &Arc<TournamentState>, i: usize, j: usize, g: u32, round_id: u32, i_outcome: GameOutcome) {
    let i_name = state.engines[i].name.clone();
    let j_name = state.engines[j].name.clone();

    if state.options.games < 2 || !state.options.report_penta {
        state.stats.record_single(&i_name, &j_name, i_outcome);
        return;
    }

    let key = (i_name.clone(), j_name.clone(), round_id);
    let mut pending = state.pending_pairs.lock().unwrap();
    if g == 0 {
        pending.insert(key, i_outcome);
    } else if let Some(first) = pending.remove(&key) {
        state.stats.record_pair(&i_name, &j_name, first, i_outcome);
    } else {
        // The first half hasn't landed yet (raced past it) or `games` exceeds 2; fall back to
        // single-game accounting rather than drop the result.
        state.stats.record_single(&i_name, &j_name, i_outcome);
    }
}

fn on_completion(state: &Arc<TournamentState>, record: &mut GameRecord, i: usize, j: usize) {
    let i_name = state.engines[i].name.clone();
    let j_name = state.engines[j].name.clone();

    let white_name = record.white_name.clone();
    let black_name = record.black_name.clone();
    if let Some(pgn) = state.pgn.lock().unwrap().as_mut() {
        let _ = pgn.append(record, &white_name, &black_name);
    }

    let completed = state.match_count.fetch_add(1, Ordering::SeqCst) + 1;
    state.output.game_finished(record);

    if state.options.ratinginterval > 0 && completed % state.options.ratinginterval == 0 {
        state.output.rating_interval(state);
    }
    if state.options.scoreinterval > 0 && completed % state.options.scoreinterval == 0 {
        state.output.score_interval(state);
    }

    if state.options.sprt.enabled {
        let pair_stats = state.stats.get(&i_name, &j_name);
        let sprt = SprtState {
            alpha: state.options.sprt.alpha,
            beta: state.options.sprt.beta,
            elo0: state.options.sprt.elo0,
            elo1: state.options.sprt.elo1,
            model: state.options.sprt.model,
        };
        let (llr, decision) = sprt.evaluate(&pair_stats, state.options.report_penta);
        if decision != SprtDecision::Continue {
            state.stop_flag.store(true, Ordering::SeqCst);
            state.output.sprt_concluded(llr, decision);
        }
    }

    if state.options.autosaveinterval > 0 && completed % state.options.autosaveinterval == 0 {
        let snapshot = state.stats.snapshot();
        let _ = save_snapshot(&snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfiguration, Limits, TimeControl};
    use crate::output::NullOutput;
    use crate::rules::Stm;
    use std::io::Write;
    use std::path::PathBuf;

    fn null_engine_config(name: &str, script_path: &std::path::Path) -> EngineConfiguration {
        EngineConfiguration {
            name: name.to_string(),
            command: PathBuf::from("/bin/sh"),
            args: vec![script_path.to_string_lossy().to_string()],
            working_dir: None,
            options: vec![],
            limits: Limits { nodes: 0, depth: 1, fixed_time_ms: 0, tc: TimeControl::default() },
            recover: false,
        }
    }

    /// A tiny shell-scripted "null engine" that always replies `bestmove 0000` (never a legal
    /// move): scenario 1 from spec.md §8 — the game should terminate `illegal_move` with a loss
    /// for white.
    fn write_null_engine_script(path: &std::path::Path) {
        let script = r#"#!/bin/sh
while IFS= read -r line; do
  case "$line" in
    uci) echo "id name null"; echo "uciok" ;;
    isready) echo "readyok" ;;
    ucinewgame) : ;;
    go*) echo "bestmove 0000" ;;
    quit) exit 0 ;;
  esac
done
"#;
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(script.as_bytes()).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(path, perms).unwrap();
        }
    }

    #[test]
    fn null_engines_lose_on_illegal_move() {
        let script = std::env::temp_dir().join("tourney_null_engine_test.sh");
        write_null_engine_script(&script);

        let white = null_engine_config("white_null", &script);
        let black = null_engine_config("black_null", &script);
        let opening =
            Opening { fen: crate::rules::STANDARD_STARTPOS_FEN.to_string(), moves: vec![], stm: Stm::White };

        let runner_cfg = MatchRunnerConfig {
            round_id: 0,
            game_id: 1,
            ping_time_ms: 2000,
            draw: Default::default(),
            resign: Default::default(),
        };
        let white_engine = UciEngine::new(&white, Duration::from_millis(100)).unwrap();
        let black_engine = UciEngine::new(&black, Duration::from_millis(100)).unwrap();
        let runner = MatchRunner::new(white_engine, white.clone(), black_engine, black.clone(), runner_cfg);
        let record = runner.run(&opening);

        assert_eq!(record.termination_reason, "illegal_move");
        assert_eq!(record.white_result, PlayerOutcome::Loss);
        assert_eq!(record.black_result, PlayerOutcome::Win);
    }

    fn test_state(games: u32, report_penta: bool) -> Arc<TournamentState> {
        let engines = vec![
            EngineConfiguration {
                name: "a".to_string(),
                command: PathBuf::new(),
                args: vec![],
                working_dir: None,
                options: vec![],
                limits: Limits::default(),
                recover: false,
            },
            EngineConfiguration {
                name: "b".to_string(),
                command: PathBuf::new(),
                args: vec![],
                working_dir: None,
                options: vec![],
                limits: Limits::default(),
                recover: false,
            },
        ];
        let mut options = TournamentOptions::default();
        options.games = games;
        options.report_penta = report_penta;
        Arc::new(TournamentState {
            engines,
            options,
            book: OpeningBook::from_entries(vec![Opening {
                fen: crate::rules::STANDARD_STARTPOS_FEN.to_string(),
                moves: vec![],
                stm: Stm::White,
            }]),
            stats: StatsMap::new(),
            pending_pairs: Mutex::new(HashMap::new()),
            match_count: AtomicU64::new(0),
            round_count: AtomicU64::new(0),
            timeout_count: AtomicU64::new(0),
            stop_flag: Arc::new(AtomicBool::new(false)),
            output: Box::new(NullOutput),
            pgn: Mutex::new(None),
            expected_total: games as u64,
        })
    }

    #[test]
    fn pentanomial_pairing_folds_both_halves_of_a_round() {
        let state = test_state(2, true);
        fold_stats(&state, 0, 1, 0, 0, GameOutcome::Win);
        fold_stats(&state, 0, 1, 1, 0, GameOutcome::Draw);
        let stats = state.stats.get("a", "b");
        assert_eq!(stats.wd, 1);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.draws, 1);
    }

    #[test]
    fn single_game_mode_records_immediately() {
        let state = test_state(1, false);
        fold_stats(&state, 0, 1, 0, 0, GameOutcome::Loss);
        let stats = state.stats.get("a", "b");
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.total(), 1);
    }

    #[test]
    fn white_black_indices_combines_parity_and_stm_swaps() {
        assert_eq!(white_black_indices(0, 1, 0, false), (0, 1));
        assert_eq!(white_black_indices(0, 1, 1, false), (1, 0));
        assert_eq!(white_black_indices(0, 1, 0, true), (1, 0));
        // Both flips active cancel out.
        assert_eq!(white_black_indices(0, 1, 1, true), (0, 1));
    }

    #[test]
    fn normalized_pair_undoes_only_the_stm_flip() {
        assert_eq!(normalized_pair(0, 1, false), (0, 1));
        assert_eq!(normalized_pair(0, 1, true), (1, 0));
    }
}
