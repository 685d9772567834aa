//! Plain, validated-at-parse-time configuration structs. There is no file-based config format
//! here, mirroring the teacher and the original: this whole tool is driven by CLI flags, so
//! `EngineConfiguration`/`TournamentOptions` are just the typed result of parsing `cli::parse_cli`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::sprt::SprtModel;

/// Time control for one side. Invariant (spec.md §3): exactly one of `fixed_time_ms` or
/// `time_ms` is nonzero for a time-based limit, or neither when node/depth-limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeControl {
    /// Moves per control period; 0 means sudden death (no period resets).
    pub moves: u32,
    pub time_ms: u64,
    pub increment_ms: u64,
    pub timemargin_ms: u64,
    pub fixed_time_ms: u64,
}

impl TimeControl {
    pub fn is_clock_based(&self) -> bool {
        self.fixed_time_ms != 0 || self.time_ms != 0
    }
}

/// Engine search limits, in priority order as consumed by `UciEngine::go` (nodes, then depth,
/// then fixed time, else the clock).
#[derive(Debug, Clone, Copy, Default)]
pub struct Limits {
    pub nodes: u64,
    pub depth: u32,
    pub fixed_time_ms: u64,
    pub tc: TimeControl,
}

/// Immutable per-engine configuration, built once at startup and shared read-only across every
/// game that engine plays.
#[derive(Debug, Clone)]
pub struct EngineConfiguration {
    /// Unique across the tournament; used as the key half of a `stats_map` entry and in PGN tags.
    pub name: String,
    pub command: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// `setoption name X value Y` commands are sent in this order during the handshake.
    pub options: Vec<(String, String)>,
    pub limits: Limits,
    /// If true, a broken pipe mid-game re-enqueues the game instead of ending the run.
    pub recover: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookFormat {
    Epd,
    Pgn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookOrder {
    Sequential,
    Random,
}

#[derive(Debug, Clone)]
pub struct OpeningBookOptions {
    pub file: PathBuf,
    pub format: BookFormat,
    pub order: BookOrder,
    /// `initial_matchcount`: the opening-index offset a fresh or resumed run starts counting from.
    pub start: u64,
    /// Mirrors `TournamentOptions.seed`; used directly by the shuffle when `order == Random`.
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DrawAdjudicationOptions {
    pub enabled: bool,
    pub move_number: usize,
    pub move_count: usize,
    pub score_cp: i32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResignAdjudicationOptions {
    pub enabled: bool,
    pub move_count: usize,
    pub score_cp: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct SprtOptions {
    pub enabled: bool,
    pub alpha: f64,
    pub beta: f64,
    pub elo0: f64,
    pub elo1: f64,
    pub model: SprtModel,
}

impl Default for SprtOptions {
    fn default() -> Self {
        Self { enabled: false, alpha: 0.05, beta: 0.05, elo0: 0.0, elo1: 5.0, model: SprtModel::Normalized }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Standard,
    Frc,
}

/// Everything the scheduler needs besides the list of `EngineConfiguration`s.
#[derive(Debug, Clone)]
pub struct TournamentOptions {
    pub concurrency: usize,
    pub rounds: u32,
    /// Games per round, either 1 or 2 (`-repeat`/`games=2` pair the same opening with colors
    /// swapped, feeding pentanomial stats).
    pub games: u32,
    pub recover: bool,
    pub report_penta: bool,
    pub ratinginterval: u64,
    pub scoreinterval: u64,
    pub autosaveinterval: u64,
    pub seed: u64,
    pub opening: OpeningBookOptions,
    pub draw: DrawAdjudicationOptions,
    pub resign: ResignAdjudicationOptions,
    pub sprt: SprtOptions,
    pub variant: Variant,
    pub pgn_out: Option<PathBuf>,
    pub epd_out: Option<PathBuf>,
    pub event: Option<String>,
    pub site: Option<String>,
    pub debug: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for TournamentOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            rounds: 1,
            games: 1,
            recover: false,
            report_penta: false,
            ratinginterval: 10,
            scoreinterval: 10,
            autosaveinterval: 0,
            seed: 0,
            opening: OpeningBookOptions {
                file: PathBuf::new(),
                format: BookFormat::Epd,
                order: BookOrder::Sequential,
                start: 0,
                seed: 0,
            },
            draw: DrawAdjudicationOptions::default(),
            resign: ResignAdjudicationOptions::default(),
            sprt: SprtOptions::default(),
            variant: Variant::Standard,
            pgn_out: None,
            epd_out: None,
            event: None,
            site: None,
            debug: false,
            log_file: None,
        }
    }
}

/// Looked up by name when reporting a completed pair; kept ordered for deterministic iteration
/// over the `stats_map` when printing a final summary.
pub type EngineIndex = BTreeMap<String, usize>;

pub fn build_index(engines: &[EngineConfiguration]) -> EngineIndex {
    engines
        .iter()
        .enumerate()
        .map(|(i, e)| (e.name.clone(), i))
        .collect()
}
