//! Line-oriented front-end: reads commands on stdin, answers on stdout.
//!
//! Commands: `new`, `play <move>`, `genmove`, `show`, `result`, `quit`.
//! Anything malformed is a protocol error: one line on stderr, exit 1.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use clap::Parser;

use yinsh_mcts::moves::MoveList;
use yinsh_mcts::notation::{format_move, parse_move};
use yinsh_mcts::{BoardState, GameResult, Mcts, NextAction, SearchLimit};

#[derive(Parser)]
#[command(name = "yinsh-mcts", about = "Yinsh engine speaking a line protocol on stdin/stdout")]
struct Args {
    /// Node arena size in mebibytes.
    #[arg(long, default_value_t = 512)]
    memory_mb: usize,

    /// Search worker threads.
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// Wall-clock budget per move in seconds.
    #[arg(long, default_value_t = 5.0, conflicts_with = "iterations")]
    seconds: f32,

    /// Per-worker iteration budget instead of a time budget.
    #[arg(long)]
    iterations: Option<u64>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let limit = match args.iterations {
        Some(iterations) => SearchLimit::Iterations(iterations),
        None => SearchLimit::Seconds(args.seconds),
    };

    let mut engine = Mcts::new(args.memory_mb * 1024 * 1024);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("error: failed to read stdin: {e}");
                return ExitCode::FAILURE;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "quit" => return ExitCode::SUCCESS,
            "new" => {
                engine.set_board(BoardState::new());
            }
            "show" => {
                let _ = write!(stdout, "{}", engine.board());
            }
            "result" => {
                if engine.board().next_action() != NextAction::Done {
                    eprintln!("error: game is not finished");
                    return ExitCode::FAILURE;
                }
                let text = match engine.board().game_result() {
                    GameResult::Draw => "draw",
                    GameResult::WhiteWon => "white",
                    GameResult::BlackWon => "black",
                };
                let _ = writeln!(stdout, "{text}");
            }
            "play" => {
                let mv = match parse_move(rest) {
                    Ok(mv) => mv,
                    Err(e) => {
                        eprintln!("error: {e}");
                        return ExitCode::FAILURE;
                    }
                };

                if engine.board().next_action() == NextAction::Done {
                    eprintln!("error: game is already finished");
                    return ExitCode::FAILURE;
                }

                let mut legal = MoveList::new();
                engine.board().generate_moves(&mut legal);
                if !legal.iter().any(|&legal_move| legal_move == mv) {
                    eprintln!("error: illegal move: {rest}");
                    return ExitCode::FAILURE;
                }

                engine.apply_move(mv);
            }
            "genmove" => {
                if engine.board().next_action() == NextAction::Done {
                    eprintln!("error: game is already finished");
                    return ExitCode::FAILURE;
                }

                let mv = engine.search(limit, args.threads).join();
                let _ = writeln!(stdout, "{}", format_move(mv));
                engine.apply_move(mv);
            }
            _ => {
                eprintln!("error: unknown command: {command}");
                return ExitCode::FAILURE;
            }
        }

        let _ = stdout.flush();
    }

    ExitCode::SUCCESS
}
