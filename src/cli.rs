//! A hand-rolled single-dash argument parser in the style of `monitors::cli`: "clap doesn't
//! handle long arguments with a single `-`, but cutechess (and fastchess) use that format." This
//! fills in every tournament flag `monitors::cli` stubbed as `todo!()` (`-engine`/`-each`,
//! `-rounds`, `-games`/`-repeat`, `-sprt`, `-ratinginterval`/`-outcomeinterval`, `-openings`,
//! `-pgnout`, `-epdout`/`-fenout`, `-seeds`, `-startpos`, ...), keeping the same `key=value`
//! sub-block idiom and a flat token cursor instead of `gears::cli`'s helpers.

use std::path::PathBuf;

use anyhow::{anyhow, bail};

use crate::config::{
    BookFormat, BookOrder, DrawAdjudicationOptions, EngineConfiguration, Limits,
    OpeningBookOptions, ResignAdjudicationOptions, SprtOptions, TimeControl, TournamentOptions,
    Variant,
};
use crate::error::Res;
use crate::sprt::SprtModel;

type Cursor = std::iter::Peekable<std::vec::IntoIter<String>>;

fn parse_key_equals_value(arg: &str) -> Res<(&str, &str)> {
    arg.split_once('=').ok_or_else(|| anyhow!("expected 'key=value' but got '{arg}'"))
}

fn next_value(cursor: &mut Cursor, what: &str) -> Res<String> {
    cursor.next().ok_or_else(|| anyhow!("expected an argument after '{what}'"))
}

/// True while the next token is a `key=value` pair belonging to the current sub-block, i.e. it
/// doesn't start a new top-level `-flag`.
fn in_block(cursor: &mut Cursor) -> bool {
    cursor.peek().is_some_and(|a| !a.starts_with('-'))
}

/// Parses `N/S+I`, `S+I`, or bare `S` (seconds, float) into a [`TimeControl`]. Grounded on
/// cutechess's `tc=moves/time+increment` convention.
fn parse_tc(value: &str) -> Res<TimeControl> {
    let (moves, rest) = match value.split_once('/') {
        Some((m, rest)) => (m.parse::<u32>().map_err(|_| anyhow!("invalid move count '{m}' in tc"))?, rest),
        None => (0, value),
    };
    let (time_part, inc_part) = rest.split_once('+').unwrap_or((rest, "0"));
    let time_s: f64 = time_part.parse().map_err(|_| anyhow!("invalid time '{time_part}' in tc"))?;
    let inc_s: f64 = inc_part.parse().map_err(|_| anyhow!("invalid increment '{inc_part}' in tc"))?;
    Ok(TimeControl {
        moves,
        time_ms: (time_s * 1000.0).round() as u64,
        increment_ms: (inc_s * 1000.0).round() as u64,
        timemargin_ms: 100,
        fixed_time_ms: 0,
    })
}

/// Parses one `-engine`/`-each` sub-block: `key=value` tokens until the next `-flag`.
fn parse_engine_block(cursor: &mut Cursor) -> Res<EngineConfiguration> {
    let mut name = String::new();
    let mut command = PathBuf::new();
    let mut engine_args = Vec::new();
    let mut working_dir = None;
    let mut options = Vec::new();
    let mut tc = TimeControl::default();
    let mut fixed_time_ms = 0u64;
    let mut depth = 0u32;
    let mut nodes = 0u64;
    let mut recover = false;

    while in_block(cursor) {
        let arg = cursor.next().unwrap();
        let (key, value) = parse_key_equals_value(&arg)?;
        match key {
            "name" => name = value.to_string(),
            "cmd" => command = PathBuf::from(value),
            "dir" => working_dir = Some(PathBuf::from(value)),
            "arg" => engine_args.push(value.to_string()),
            "tc" => tc = parse_tc(value)?,
            "st" => {
                let secs: f64 = value.parse().map_err(|_| anyhow!("invalid 'st' value '{value}'"))?;
                fixed_time_ms = (secs * 1000.0).round() as u64;
            }
            "depth" => depth = value.parse().map_err(|_| anyhow!("invalid 'depth' value '{value}'"))?,
            "nodes" => nodes = value.parse().map_err(|_| anyhow!("invalid 'nodes' value '{value}'"))?,
            "timemargin" => {
                tc.timemargin_ms = value.parse().map_err(|_| anyhow!("invalid 'timemargin' value '{value}'"))?
            }
            "restart" => recover = true,
            x => match x.strip_prefix("option.") {
                Some(opt) => options.push((opt.to_string(), value.to_string())),
                None => bail!("unknown engine option '{x}'"),
            },
        }
    }
    if name.is_empty() {
        name = command.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    }
    Ok(EngineConfiguration {
        name,
        command,
        args: engine_args,
        working_dir,
        options,
        limits: Limits { nodes, depth, fixed_time_ms, tc },
        recover,
    })
}

/// Fills in an engine's unset fields from `-each`'s block, the cutechess convention for sharing
/// common settings across every `-engine` entry.
fn apply_each(engine: &mut EngineConfiguration, each: &EngineConfiguration) {
    if engine.command.as_os_str().is_empty() {
        engine.command = each.command.clone();
    }
    if engine.args.is_empty() {
        engine.args = each.args.clone();
    }
    engine.working_dir = engine.working_dir.clone().or_else(|| each.working_dir.clone());
    for (k, v) in &each.options {
        if !engine.options.iter().any(|(ek, _)| ek == k) {
            engine.options.push((k.clone(), v.clone()));
        }
    }
    if engine.limits.tc == TimeControl::default() {
        engine.limits.tc = each.limits.tc;
    }
    if engine.limits.fixed_time_ms == 0 {
        engine.limits.fixed_time_ms = each.limits.fixed_time_ms;
    }
    if engine.limits.depth == 0 {
        engine.limits.depth = each.limits.depth;
    }
    if engine.limits.nodes == 0 {
        engine.limits.nodes = each.limits.nodes;
    }
    engine.recover |= each.recover;
}

fn parse_openings(cursor: &mut Cursor) -> Res<OpeningBookOptions> {
    let mut opts = OpeningBookOptions {
        file: PathBuf::new(),
        format: BookFormat::Epd,
        order: BookOrder::Sequential,
        start: 0,
        seed: 0,
    };
    while in_block(cursor) {
        let arg = cursor.next().unwrap();
        let (key, value) = parse_key_equals_value(&arg)?;
        match key {
            "file" => opts.file = PathBuf::from(value),
            "format" => {
                opts.format = match value.to_ascii_lowercase().as_str() {
                    "epd" => BookFormat::Epd,
                    "pgn" => BookFormat::Pgn,
                    x => bail!("unknown opening book format '{x}'"),
                }
            }
            "order" => {
                opts.order = match value.to_ascii_lowercase().as_str() {
                    "sequential" => BookOrder::Sequential,
                    "random" => BookOrder::Random,
                    x => bail!("unknown opening book order '{x}'"),
                }
            }
            "start" => opts.start = value.parse()?,
            x => bail!("unknown opening book key '{x}'"),
        }
    }
    if opts.file.as_os_str().is_empty() {
        bail!("'-openings' requires a 'file=' key");
    }
    Ok(opts)
}

fn parse_draw(cursor: &mut Cursor) -> Res<DrawAdjudicationOptions> {
    let mut opts = DrawAdjudicationOptions { enabled: true, ..Default::default() };
    while in_block(cursor) {
        let arg = cursor.next().unwrap();
        let (key, value) = parse_key_equals_value(&arg)?;
        match key {
            "movenumber" => opts.move_number = value.parse()?,
            "movecount" => opts.move_count = value.parse()?,
            "score" => opts.score_cp = value.parse()?,
            x => bail!("unknown draw adjudication key '{x}'"),
        }
    }
    Ok(opts)
}

fn parse_resign(cursor: &mut Cursor) -> Res<ResignAdjudicationOptions> {
    let mut opts = ResignAdjudicationOptions { enabled: true, ..Default::default() };
    while in_block(cursor) {
        let arg = cursor.next().unwrap();
        let (key, value) = parse_key_equals_value(&arg)?;
        match key {
            "movecount" => opts.move_count = value.parse()?,
            "score" => opts.score_cp = value.parse()?,
            x => bail!("unknown resign adjudication key '{x}'"),
        }
    }
    Ok(opts)
}

fn parse_sprt(cursor: &mut Cursor) -> Res<SprtOptions> {
    let mut opts = SprtOptions { enabled: true, ..Default::default() };
    while in_block(cursor) {
        let arg = cursor.next().unwrap();
        let (key, value) = parse_key_equals_value(&arg)?;
        match key {
            "elo0" => opts.elo0 = value.parse()?,
            "elo1" => opts.elo1 = value.parse()?,
            "alpha" => opts.alpha = value.parse()?,
            "beta" => opts.beta = value.parse()?,
            "model" => {
                opts.model = match value.to_ascii_lowercase().as_str() {
                    "normalized" => SprtModel::Normalized,
                    "bayeselo" => SprtModel::BayesElo,
                    "logistic" => SprtModel::Logistic,
                    x => bail!("unknown sprt model '{x}'"),
                }
            }
            x => bail!("unknown sprt key '{x}'"),
        }
    }
    Ok(opts)
}

pub struct ParsedCli {
    pub engines: Vec<EngineConfiguration>,
    pub options: TournamentOptions,
}

/// Parses the full argument list (excluding argv[0]).
pub fn parse_cli<I: IntoIterator<Item = String>>(raw_args: I) -> Res<ParsedCli> {
    let tokens: Vec<String> = raw_args.into_iter().collect();
    let mut cursor: Cursor = tokens.into_iter().peekable();

    let mut engines: Vec<EngineConfiguration> = Vec::new();
    let mut each = EngineConfiguration {
        name: String::new(),
        command: PathBuf::new(),
        args: Vec::new(),
        working_dir: None,
        options: Vec::new(),
        limits: Limits::default(),
        recover: false,
    };
    let mut options = TournamentOptions::default();
    let mut repeat = false;

    while let Some(arg) = cursor.next() {
        let arg = arg.strip_prefix("--").unwrap_or(&arg).to_string();
        match arg.as_str() {
            "-engine" => engines.push(parse_engine_block(&mut cursor)?),
            "-each" => each = parse_engine_block(&mut cursor)?,
            "-concurrency" => options.concurrency = next_value(&mut cursor, "concurrency")?.parse()?,
            "-rounds" => options.rounds = next_value(&mut cursor, "rounds")?.parse()?,
            "-games" => options.games = next_value(&mut cursor, "games")?.parse()?,
            "-repeat" => repeat = true,
            "-recover" => options.recover = true,
            "-reportpenta" => options.report_penta = true,
            "-ratinginterval" => options.ratinginterval = next_value(&mut cursor, "ratinginterval")?.parse()?,
            "-outcomeinterval" | "-scoreinterval" => {
                options.scoreinterval = next_value(&mut cursor, "scoreinterval")?.parse()?
            }
            "-autosaveinterval" => {
                options.autosaveinterval = next_value(&mut cursor, "autosaveinterval")?.parse()?
            }
            "-seeds" | "-srand" => options.seed = next_value(&mut cursor, "seeds")?.parse()?,
            "-openings" => options.opening = parse_openings(&mut cursor)?,
            "-draw" => options.draw = parse_draw(&mut cursor)?,
            "-resign" => options.resign = parse_resign(&mut cursor)?,
            "-sprt" => options.sprt = parse_sprt(&mut cursor)?,
            "-pgnout" => options.pgn_out = Some(PathBuf::from(next_value(&mut cursor, "pgnout")?)),
            "-epdout" | "-fenout" => options.epd_out = Some(PathBuf::from(next_value(&mut cursor, "epdout")?)),
            "-event" => options.event = Some(next_value(&mut cursor, "event")?),
            "-site" => options.site = Some(next_value(&mut cursor, "site")?),
            "-debug" | "-d" => options.debug = true,
            "-log" => options.log_file = Some(PathBuf::from(next_value(&mut cursor, "log")?)),
            "-variant" => {
                let v = next_value(&mut cursor, "variant")?;
                options.variant = match v.to_ascii_lowercase().as_str() {
                    "standard" => Variant::Standard,
                    "frc" | "fischerandom" | "chess960" => Variant::Frc,
                    x => bail!("unknown variant '{x}'"),
                };
            }
            x => bail!("unrecognized option '{x}'"),
        }
    }

    if repeat {
        options.games = 2;
    }
    // '-seeds'/'-openings' can appear in either order; the book's seed always mirrors the
    // tournament seed once the whole command line has been read.
    options.opening.seed = options.seed;
    for engine in &mut engines {
        apply_each(engine, &each);
    }
    if engines.len() < 2 {
        bail!("a tournament needs at least two '-engine' definitions");
    }
    let mut seen = std::collections::HashSet::new();
    for e in &engines {
        if !seen.insert(e.name.clone()) {
            bail!("duplicate engine name '{}': names must be unique", e.name);
        }
    }
    Ok(ParsedCli { engines, options })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(s: &str) -> Vec<String> {
        s.split_whitespace().map(|t| t.to_string()).collect()
    }

    #[test]
    fn parses_two_engines_with_shared_each_tc() {
        let parsed = parse_cli(tokens(
            "-each tc=40/60+0.6 -engine cmd=./a name=A -engine cmd=./b name=B -rounds 5 -games 2",
        ))
        .unwrap();
        assert_eq!(parsed.engines.len(), 2);
        assert_eq!(parsed.engines[0].name, "A");
        assert_eq!(parsed.engines[0].limits.tc.time_ms, 60_000);
        assert_eq!(parsed.engines[0].limits.tc.moves, 40);
        assert_eq!(parsed.options.rounds, 5);
        assert_eq!(parsed.options.games, 2);
    }

    #[test]
    fn repeat_flag_is_equivalent_to_games_equals_two() {
        let parsed = parse_cli(tokens("-each cmd=./a -engine name=A -engine name=B -repeat")).unwrap();
        assert_eq!(parsed.options.games, 2);
    }

    #[test]
    fn rejects_duplicate_engine_names() {
        let err = parse_cli(tokens("-each cmd=./a -engine name=A -engine name=A")).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn rejects_single_engine_tournament() {
        let err = parse_cli(tokens("-engine cmd=./a name=A")).unwrap_err();
        assert!(err.to_string().contains("at least two"));
    }

    #[test]
    fn parses_sprt_block() {
        let parsed = parse_cli(tokens(
            "-each cmd=./a -engine name=A -engine name=B -sprt elo0=0 elo1=5 alpha=0.05 beta=0.05 model=normalized",
        ))
        .unwrap();
        assert!(parsed.options.sprt.enabled);
        assert_eq!(parsed.options.sprt.elo1, 5.0);
    }

    #[test]
    fn parses_openings_block() {
        let parsed = parse_cli(tokens(
            "-each cmd=./a -engine name=A -engine name=B -openings file=book.epd format=epd order=random start=4",
        ))
        .unwrap();
        assert_eq!(parsed.options.opening.file, PathBuf::from("book.epd"));
        assert_eq!(parsed.options.opening.order, BookOrder::Random);
        assert_eq!(parsed.options.opening.start, 4);
    }
}
