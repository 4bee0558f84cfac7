use clap::{Parser};
use env_logger::Env;
use log::{error, info};
use std::error::Error as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;

use gridworld_mscores::error::ConfigurationError;
use gridworld_mscores::grid::Grid;
use gridworld_mscores::search::{MScoreTable, ScoreSearch, SearchConfig};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Grid file: episode length on the first line, then rows of tiles.
    grid: PathBuf,

    /// JSON file with search settings. The flags below take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip search nodes dominated by a cheaper one over the same objects.
    #[arg(long)]
    prune_dominated: bool,

    /// Give up after expanding this many search nodes (incomplete results).
    #[arg(long)]
    max_expansions: Option<usize>,

    /// Threads used to build each object graph.
    #[arg(long)]
    graph_threads: Option<usize>,

    /// Print the m-score table as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("Failed reading {path:?}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("Invalid grid")]
    Grid(#[from] ConfigurationError),
    #[error("Invalid JSON")]
    Json(#[from] serde_json::Error),
}

fn read_file(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path)
        .map_err(|source| CliError::Read { path: path.to_path_buf(), source })
}

fn search_config(cli: &Cli) -> Result<SearchConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading search config from {path:?}");
            serde_json::from_str(&read_file(path)?)?
        },
        None => SearchConfig::default(),
    };
    if cli.prune_dominated {
        config.prune_dominated = true;
    }
    if let Some(max_expansions) = cli.max_expansions {
        config.max_expansions = Some(max_expansions);
    }
    if let Some(graph_threads) = cli.graph_threads {
        config.graph_threads = graph_threads;
    }
    Ok(config)
}

fn print_table(table: &MScoreTable) {
    println!(" ----- RESULTS: -----");
    println!("   Number of different trajectory lengths: {}", table.len());
    for (length, m_score) in table.iter() {
        let path: Vec<String> = m_score.path.iter().map(|o| o.to_string())
            .collect();
        println!("    > m{length} = {score}    [{path}]",
                 score = m_score.score, path = path.join(" -> "));
    }
    if !table.is_complete() {
        println!("   (search stopped early, results are incomplete)");
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let config = search_config(cli)?;
    let grid = Grid::parse(&read_file(&cli.grid)?)?;
    info!("Loaded {}x{} grid with {} objects, episode length {}",
          grid.width(), grid.height(), grid.objects().len(),
          grid.episode_length());

    let table = ScoreSearch::new(&grid, config).run();
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&table)?);
    } else {
        print_table(&table);
    }
    Ok(())
}

fn main() -> ExitCode {
    // Load .env file
    dotenvy::dotenv().ok();
    // Init logger with default value of info
    // This can be overriden with RUST_LOG env var
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Error while computing m-scores:");
            error!("  {}", err);
            let mut source = err.source();
            while let Some(cause) = source {
                error!("  caused by: {}", cause);
                source = cause.source();
            }
            ExitCode::FAILURE
        },
    }
}
