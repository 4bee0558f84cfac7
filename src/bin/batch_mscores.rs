// Binary that evaluates every 'grid_<id>.txt' file of a folder, to get a quick
// overview of a generated dataset: how many trajectory lengths each grid
// offers, and whether any of them has an m-score of 0.

use clap::{Parser};
use env_logger::Env;
use lazy_static::lazy_static;
use log::{error, warn};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;

use gridworld_mscores::error::ConfigurationError;
use gridworld_mscores::grid::Grid;
use gridworld_mscores::search::{ScoreSearch, SearchConfig};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Folder containing grid_<id>.txt files.
    directory: PathBuf,

    /// Skip dominated search nodes (same scores, faster).
    #[arg(long)]
    prune_dominated: bool,
}

#[derive(Debug, Clone)]
struct SavedGrid {
    id: String,
    path: PathBuf,
}

#[derive(Error, Debug)]
enum GridEvalError {
    #[error("Failed reading the saved grid")]
    ReadError(#[from] std::io::Error),
    #[error("Failed parsing the saved grid")]
    ParseError(#[from] ConfigurationError),
}

struct Evaluation {
    trajectory_lengths: usize,
    zero_m_scores: usize,
}

fn read_saved_grids(directory: &Path) -> Result<Vec<SavedGrid>, std::io::Error> {
    lazy_static! {
        static ref GRID_PATH: Regex = Regex::new(r"^grid_(\w+)\.txt$")
            .expect("valid grid file pattern");
    }
    let mut out = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let path = entry?.path();
        let id = path.file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| GRID_PATH.captures(name))
            .and_then(|caps| caps.get(1))
            .map(|id| id.as_str().to_string());
        if let Some(id) = id {
            out.push(SavedGrid { id, path });
        }
    }
    out.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(out)
}

fn evaluate_grid(
    saved_grid: &SavedGrid, config: &SearchConfig
    ) -> Result<Evaluation, GridEvalError> {
    let grid_data = std::fs::read_to_string(&saved_grid.path)?;
    let grid = Grid::parse(&grid_data)?;
    let table = ScoreSearch::new(&grid, config.clone()).run();
    Ok(Evaluation {
        trajectory_lengths: table.len(),
        zero_m_scores: table.iter().filter(|(_, m)| m.score == 0).count(),
    })
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = SearchConfig {
        prune_dominated: cli.prune_dominated,
        ..Default::default()
    };
    let saved_grids = match read_saved_grids(&cli.directory) {
        Ok(saved_grids) => saved_grids,
        Err(err) => {
            error!("Failed listing {:?}: {}", cli.directory, err);
            return ExitCode::FAILURE;
        },
    };
    if saved_grids.is_empty() {
        warn!("No grid_<id>.txt files in {:?}", cli.directory);
        return ExitCode::SUCCESS;
    }

    let mut lengths: Vec<usize> = Vec::new();
    let mut with_zero_m = 0;
    println!("{} grid(s)", saved_grids.len());
    for saved_grid in &saved_grids {
        match evaluate_grid(saved_grid, &config) {
            Ok(evaluation) => {
                println!("  grid {}: {} trajectory lengths, {} with m = 0",
                         saved_grid.id, evaluation.trajectory_lengths,
                         evaluation.zero_m_scores);
                lengths.push(evaluation.trajectory_lengths);
                if evaluation.zero_m_scores > 0 {
                    with_zero_m += 1;
                }
            },
            Err(err) => println!("  grid {}: error: {err:?}", saved_grid.id),
        }
    }

    if let (Some(min), Some(max)) = (lengths.iter().min(), lengths.iter().max()) {
        let avg = (lengths.iter().sum::<usize>() as f32) / (lengths.len() as f32);
        println!("Trajectory lengths stats:");
        println!("  #: {}", lengths.len());
        println!("Min: {}", min);
        println!("Max: {}", max);
        println!("Avg: {:.1}", avg);
        println!("Grids with some m = 0: {}", with_zero_m);
    }
    if lengths.len() == saved_grids.len() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
