//! Entry point: parse CLI args, load the opening book, wire the configured `Output`s, and hand
//! everything to the scheduler. Exit codes follow `error::ExitCode` (0 normal, 1 config error, 2
//! fatal infrastructure error).

use config::TournamentOptions;
use error::ExitCode;
use opening_book::OpeningBook;
use output::{ConsoleOutput, LoggerOutput, Output, OutputSet};
use persist::PgnWriter;
use scheduler::Scheduler;

mod adjudication;
mod cli;
mod config;
mod error;
mod match_runner;
mod opening_book;
mod output;
mod persist;
mod player;
mod process_pipe;
mod rules;
mod scheduler;
mod sprt;
mod stats;
mod uci_engine;
mod worker_pool;

fn main() {
    std::process::exit(run().code());
}

fn run() -> ExitCode {
    let args = std::env::args().skip(1);
    let parsed = match cli::parse_cli(args) {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("Error parsing command line arguments: {err}");
            return ExitCode::Config;
        }
    };

    let book = match OpeningBook::load(&parsed.options.opening) {
        Ok(book) => book,
        Err(err) => {
            eprintln!("Error loading opening book: {err}");
            return ExitCode::Config;
        }
    };

    let output = match build_output(&parsed.options) {
        Ok(output) => output,
        Err(err) => {
            eprintln!("Error opening log file: {err}");
            return ExitCode::Fatal;
        }
    };

    let pgn = parsed.options.pgn_out.as_deref().map(PgnWriter::create);

    let scheduler = Scheduler::new(parsed.engines, parsed.options, book, output, pgn);

    // Ctrl+C sets the shared stop flag so in-flight games finish and the pool drains cleanly,
    // rather than killing subprocess engines mid-game.
    let stop_flag = scheduler.stop_flag();
    if let Err(err) = ctrlc::set_handler(move || {
        stop_flag.store(true, std::sync::atomic::Ordering::SeqCst);
    }) {
        eprintln!("Warning: could not install Ctrl+C handler: {err}");
    }

    scheduler.run();
    ExitCode::Ok
}

fn build_output(options: &TournamentOptions) -> error::Res<Box<dyn Output>> {
    let mut outputs: Vec<Box<dyn Output>> = vec![Box::new(ConsoleOutput)];
    if let Some(path) = &options.log_file {
        outputs.push(Box::new(LoggerOutput::open(path)?));
    } else if options.debug {
        outputs.push(Box::new(LoggerOutput::open(std::path::Path::new("tourney.log"))?));
    }
    if outputs.len() == 1 {
        Ok(outputs.pop().unwrap())
    } else {
        Ok(Box::new(OutputSet::new(outputs)))
    }
}
