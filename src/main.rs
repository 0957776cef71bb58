mod config;
mod db;
mod entities;
mod error;
mod models;
mod omdb;
mod routes;
mod store;
mod sync;
mod tasks;

use std::{sync::Arc, time::Duration};

use axum::{Router, routing::get};
use clap::{Parser, Subcommand};
use tower_http::trace::TraceLayer;

use crate::{
    config::Config,
    omdb::OmdbClient,
    store::MovieStore,
    sync::{FillOutcome, SearchOutcome},
    tasks::TaskQueue,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: MovieStore,
    pub omdb: Arc<OmdbClient>,
    pub tasks: TaskQueue,
}

#[derive(Debug, Parser)]
#[command(version, about = "Search OMDb and keep the results in a local catalog")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the web server (default).
    Serve,
    /// Search OMDb and store the results as partial records.
    Search {
        #[arg(required = true)]
        words: Vec<String>,
    },
    /// Fetch full details for one stored movie.
    FetchDetails { imdb_id: String },
    /// Fetch full details for stored partial records.
    FillPartial {
        #[arg(long, default_value_t = 50)]
        limit: u64,
    },
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/search", get(routes::search))
        .route("/search_wait/{result_uuid}", get(routes::search_wait))
        .route("/search_results", get(routes::search_results))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,movie_search=debug,sqlx=warn".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::from_env()?);

    let http = reqwest::Client::builder()
        .user_agent("movie-search/0.1")
        .timeout(Duration::from_secs(30))
        .build()?;

    let db = db::connect_and_migrate(&config.database_url).await?;
    let store = MovieStore::new(db);

    let omdb = OmdbClient::new(
        http,
        config.omdb_api_key.clone(),
        config.omdb_base_url.clone(),
        config.omdb_rps,
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let state = Arc::new(AppState {
                config: config.clone(),
                store,
                omdb: Arc::new(omdb),
                tasks: TaskQueue::new(),
            });

            let listener = tokio::net::TcpListener::bind(config.addr).await?;
            tracing::info!(addr = %config.addr, "listening");
            axum::serve(listener, app(state)).await?;
        },
        Command::Search { words } => {
            let query = words.join(" ");
            match sync::search_and_save(&store, &omdb, &query).await? {
                SearchOutcome::Throttled => tracing::info!(query = %query, "search skipped"),
                SearchOutcome::Completed { seen, created } => {
                    tracing::info!(query = %query, seen, created, "search stored")
                },
            }
        },
        Command::FetchDetails { imdb_id } => {
            let Some(mut movie) = store.find_movie(&imdb_id).await? else {
                tracing::error!(imdb_id = %imdb_id, "movie with this IMDb id was not found");
                return Ok(());
            };
            if sync::fill_movie_details(&store, &omdb, &mut movie).await? == FillOutcome::Filled {
                let genres = store.genre_names(&movie).await?;
                tracing::info!(
                    imdb_id = %imdb_id,
                    title = %movie.title,
                    genres = ?genres,
                    "details stored"
                );
            }
        },
        Command::FillPartial { limit } => {
            let filled = sync::fill_partial_movies(&store, &omdb, limit).await?;
            tracing::info!(filled, "partial records filled");
        },
    }

    Ok(())
}
