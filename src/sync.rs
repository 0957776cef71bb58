use std::pin::pin;

use futures::TryStreamExt;
use tracing::{debug, info, warn};

use crate::{entities::movie, error::AppResult, omdb::OmdbClient, store::MovieStore};

/// Repeat searches for the same normalized term inside this window are skipped.
pub const THROTTLE_WINDOW_SECS: i64 = 86_400;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FillOutcome {
    Filled,
    AlreadyFull,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SearchOutcome {
    Throttled,
    Completed { seen: usize, created: usize },
}

/// Collapses whitespace runs to single spaces, trims and lower-cases.
pub fn normalize_term(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Upgrades a partial record to a full one. `movie` is updated in place
/// with what was saved, so a second call on it is a no-op.
pub async fn fill_movie_details(
    store: &MovieStore,
    omdb: &OmdbClient,
    movie: &mut movie::Model,
) -> AppResult<FillOutcome> {
    if movie.is_full_record {
        warn!(imdb_id = %movie.imdb_id, title = %movie.title, "already a full record");
        return Ok(FillOutcome::AlreadyFull);
    }

    let detail = omdb.get_by_imdb_id(&movie.imdb_id).await?;
    *movie = store.save_full_movie(&movie.imdb_id, &detail).await?;

    info!(
        imdb_id = %movie.imdb_id,
        title = %movie.title,
        genres = detail.genres.len(),
        "filled movie details"
    );

    Ok(FillOutcome::Filled)
}

/// Fills up to `limit` partial records, stopping at the first failure.
pub async fn fill_partial_movies(
    store: &MovieStore,
    omdb: &OmdbClient,
    limit: u64,
) -> AppResult<usize> {
    let movies = store.partial_movies(limit).await?;
    debug!(partial_movies = movies.len(), "filling partial records");

    let mut filled = 0;
    for mut movie in movies {
        if fill_movie_details(store, omdb, &mut movie).await? == FillOutcome::Filled {
            filled += 1;
        }
    }

    Ok(filled)
}

/// Searches OMDb for `query` and stores every result as a partial record,
/// unless the same normalized term completed a search within the throttle
/// window. The term's timestamp is only written after the last page.
pub async fn search_and_save(
    store: &MovieStore,
    omdb: &OmdbClient,
    query: &str,
) -> AppResult<SearchOutcome> {
    let term = normalize_term(query);

    if let Some(existing) = store.find_search_term(&term).await? {
        let age = now_sec().saturating_sub(existing.last_search);
        if age < THROTTLE_WINDOW_SECS {
            warn!(
                term = %term,
                age_secs = age,
                "searched in the past 24 hours, not searching again"
            );
            return Ok(SearchOutcome::Throttled);
        }
    }

    let mut results = pin!(omdb.search(query));
    let mut seen = 0;
    let mut created = 0;

    while let Some(result) = results.try_next().await? {
        seen += 1;
        debug!(imdb_id = %result.imdb_id, title = %result.title, "saving movie");
        if store.create_partial_movie(&result).await? {
            created += 1;
            info!(imdb_id = %result.imdb_id, title = %result.title, "movie created");
        }
    }

    store.touch_search_term(&term, now_sec()).await?;
    info!(term = %term, seen = seen, created = created, "search complete");

    Ok(SearchOutcome::Completed { seen, created })
}

fn now_sec() -> i64 {
    jiff::Timestamp::now().as_second()
}
