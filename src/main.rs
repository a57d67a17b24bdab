mod api;
mod cache;
mod config;
mod models;
mod repository;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use api::RickMortyClient;
use cache::{CacheStorage, SqliteStorage};
use models::{Character, Episode};
use repository::{CharacterRepository, EpisodeRepository, RepoError};

type Repository = CharacterRepository<SqliteStorage, RickMortyClient>;

#[derive(Parser, Debug)]
#[command(name = "rmcache")]
#[command(about = "Offline-first browser for the Rick and Morty catalog")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/rmcache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List cached characters, fetching the first page if the cache is empty
  List,
  /// Fetch the next page of characters into the cache
  More,
  /// Show a character with its episodes
  Show { id: i64 },
  /// List the episodes a character appears in
  Episodes { id: i64 },
  /// Show cache row counts and pagination state
  Status,
}

/// Initialize file logging in `log_dir`. Stdout stays clean for command output.
fn init_tracing(log_dir: &Path, default_filter: &str) -> WorkerGuard {
  let appender = tracing_appender::rolling::daily(log_dir, "rmcache.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  // RUST_LOG wins over the configured level
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .with(filter)
    .init();

  guard
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let db_path = config.database_path()?;

  let log_dir = db_path
    .parent()
    .map(Path::to_path_buf)
    .unwrap_or_else(|| PathBuf::from("."));
  let _guard = init_tracing(&log_dir, config.log_level.as_deref().unwrap_or("info"));
  info!(db = %db_path.display(), "rmcache starting");

  let storage = Arc::new(SqliteStorage::open(&db_path)?);
  let remote = Arc::new(RickMortyClient::new(&config.api)?);
  let episodes = EpisodeRepository::new(Arc::clone(&storage), Arc::clone(&remote));
  let (loads_tx, loads_rx) = mpsc::unbounded_channel();
  let characters = CharacterRepository::new(Arc::clone(&storage), remote, episodes, loads_tx);

  match args.command {
    Command::List => list(&characters, loads_rx).await?,
    Command::More => {
      characters.load_next_page().await?;
      print_status(storage.as_ref())?;
    }
    Command::Show { id } => print_character(&characters.get_character(id).await?),
    Command::Episodes { id } => {
      for episode in characters.get_episodes(id).await? {
        print_episode(&episode);
      }
    }
    Command::Status => print_status(storage.as_ref())?,
  }

  Ok(())
}

/// Print the cached list, waiting for the background fetch when it starts out empty.
async fn list(
  characters: &Repository,
  mut loads: mpsc::UnboundedReceiver<Result<(), RepoError>>,
) -> Result<()> {
  let mut rx = characters.observe_characters();

  let current = rx.borrow_and_update().clone();
  let list = if current.is_empty() {
    let loaded = tokio::select! {
      changed = rx.wait_for(|list| !list.is_empty()) => Some(changed?.clone()),
      Some(outcome) = loads.recv() => {
        outcome.map_err(|e| eyre!("Failed to load characters: {}", e))?;
        None
      }
    };
    // A finished load may have stored nothing (empty page or exhausted listing)
    match loaded {
      Some(list) => list,
      None => rx.borrow().clone(),
    }
  } else {
    current
  };

  if list.is_empty() {
    println!("No characters cached.");
  }

  for character in &list {
    println!(
      "{:>5}  {:<32} {:<8} {}",
      character.id, character.name, character.status, character.species
    );
  }
  Ok(())
}

fn print_character(character: &Character) {
  println!("#{} {}", character.id, character.name);
  println!("  status:  {}", character.status);
  println!("  species: {}", character.species);
  println!("  origin:  {}", character.origin);
  println!("  image:   {}", character.image_url);
  println!("  episodes ({}):", character.episodes.len());
  for episode in &character.episodes {
    print!("    ");
    print_episode(episode);
  }
}

fn print_episode(episode: &Episode) {
  println!(
    "{:<7} {:<40} {}",
    episode.episode_code, episode.name, episode.air_date
  );
}

fn print_status(storage: &impl CacheStorage) -> Result<()> {
  let stats = storage.stats()?;
  println!("characters: {}", stats.characters);
  println!("episodes:   {}", stats.episodes);
  println!("links:      {}", stats.links);
  match stats.cursor_updated_at {
    Some(at) => println!("next page:  {} (updated {})", stats.cursor, at.format("%Y-%m-%d %H:%M")),
    None => println!("next page:  {}", stats.cursor),
  }
  Ok(())
}
