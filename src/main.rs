use anyhow::Result;
use minebot::{Engine, GameState, RunLog, SolverConfig};
use std::env;
use std::path::Path;

fn main() -> Result<()> {
    env_logger::init();

    // --- Configuration ---
    // Optional single argument: path to a JSON configuration file.
    let config = match env::args().nth(1) {
        Some(path) => SolverConfig::load(Path::new(&path))?,
        None => SolverConfig::default(),
    };

    // --- One game against the shared channels ---
    let log = RunLog::new(config.board_path.display().to_string());
    let mut engine = Engine::new(config, log);
    let state = engine.run()?;

    match state {
        GameState::Won => println!("Result: the agent cleared the board."),
        GameState::Lost => println!("Result: the agent hit a mine."),
        GameState::Playing => println!("Result: the game ended unexpectedly."),
    }
    Ok(())
}
