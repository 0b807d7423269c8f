mod action;
mod classifier;
mod config;
mod controllers;
mod dispatcher;
mod landmarks;
mod pipeline;
mod profile;
mod source;
mod stabilizer;
mod stats;

use std::error::Error;
use std::io::{BufReader, stdin};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::action::ControllerKind;
use crate::config::Config;
use crate::controllers::ControllerRegistry;
use crate::controllers::keyboard::KeyboardController;
use crate::controllers::pointer::PointerController;
use crate::controllers::shell::ShellController;
use crate::controllers::window::WindowController;
use crate::pipeline::{PipelineContext, run_pipeline, run_replay};
use crate::profile::Profile;

#[derive(Parser)]
#[command(about = "Turn hand landmarks into desktop input")]
struct Cli {
    /// Path to config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Profile file, overriding the configured one
    #[arg(short, long)]
    profile: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a recorded landmark session instead of reading stdin
    Replay { path: PathBuf },
}

/// Register every controller that comes up. A failed one is reported and
/// skipped; its actions will surface as unavailable results.
fn build_registry(config: &Config) -> ControllerRegistry {
    let mut registry = ControllerRegistry::new();
    match PointerController::new(config.pointer.clone()) {
        Ok(pointer) => registry.register(ControllerKind::Pointer, Box::new(pointer)),
        Err(e) => eprintln!("[PIPELINE] pointer controller unavailable: {}", e),
    }
    match KeyboardController::new(config.keyboard.clone()) {
        Ok(keyboard) => registry.register(ControllerKind::Keyboard, Box::new(keyboard)),
        Err(e) => eprintln!("[PIPELINE] keyboard controller unavailable: {}", e),
    }
    registry.register(
        ControllerKind::Shell,
        Box::new(ShellController::new(config.shell.clone())),
    );
    if WindowController::probe(&config.shell) {
        registry.register(
            ControllerKind::Window,
            Box::new(WindowController::new(config.shell.clone())),
        );
    } else {
        eprintln!("[PIPELINE] wmctrl not found, window controller disabled");
    }
    registry
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let profile_path = cli
        .profile
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.profile.path));
    let profile = match Profile::load(&profile_path) {
        Ok(profile) => profile,
        Err(e) => {
            eprintln!("[CONFIG] {:#}, using builtin mappings", e);
            Profile::builtin("builtin".to_string())
        }
    };

    let registry = build_registry(&config);
    let ctx = PipelineContext {
        config,
        profile,
        registry,
    };

    match cli.command {
        Some(Command::Replay { path }) => run_replay(ctx, &path),
        None => run_pipeline(ctx, BufReader::new(stdin())),
    }
}
