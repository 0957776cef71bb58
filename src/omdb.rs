use std::{num::NonZeroU32, sync::Arc};

use futures::{Stream, TryStreamExt, stream};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde_json::Value;
use tracing::debug;

use crate::{
    error::OmdbError,
    models::{MovieDetail, RawDetail, RawSearchPage, SearchResult},
};

/// OMDb answers an exhausted or empty search with this error message.
const NOT_FOUND: &str = "Movie not found!";

pub struct OmdbClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

struct SearchState {
    query: String,
    page: u32,
    yielded: u64,
    total: Option<u64>,
}

impl OmdbClient {
    pub fn new(client: reqwest::Client, api_key: String, base_url: String, rps: u32) -> Self {
        if api_key.trim().is_empty() {
            tracing::warn!("no OMDB_API_KEY provided, OMDb will reject requests");
        }

        let rps = NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));
        Self { client, api_key, base_url, limiter }
    }

    pub async fn get_by_imdb_id(&self, imdb_id: &str) -> Result<MovieDetail, OmdbError> {
        debug!(imdb_id = %imdb_id, "fetching movie detail");

        let body = self.get_json(&[("i", imdb_id)]).await?;
        if let Some(message) = rejection(&body) {
            return Err(OmdbError::Api(message));
        }

        let raw: RawDetail = serde_json::from_value(body)?;
        raw.try_into()
    }

    /// Lazily walks every result page for `query`. Pages are requested only
    /// as the stream is polled, starting from page 1 on every call.
    pub fn search(&self, query: &str) -> impl Stream<Item = Result<SearchResult, OmdbError>> + '_ {
        let state = SearchState { query: query.to_string(), page: 1, yielded: 0, total: None };

        stream::try_unfold(state, move |state| self.next_page(state))
            .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, OmdbError>)))
            .try_flatten()
    }

    async fn next_page(
        &self,
        mut state: SearchState,
    ) -> Result<Option<(Vec<SearchResult>, SearchState)>, OmdbError> {
        if state.total.is_some_and(|total| state.yielded >= total) {
            return Ok(None);
        }

        debug!(query = %state.query, page = state.page, "fetching search page");

        let page = state.page.to_string();
        let body = self
            .get_json(&[("s", state.query.as_str()), ("type", "movie"), ("page", page.as_str())])
            .await?;

        if let Some(message) = rejection(&body) {
            if message == NOT_FOUND {
                debug!(query = %state.query, page = state.page, "no more search results");
                return Ok(None);
            }
            return Err(OmdbError::Api(message));
        }

        let raw: RawSearchPage = serde_json::from_value(body)?;

        if state.total.is_none() {
            let total = raw.total_results.trim().parse::<u64>().map_err(|_| {
                OmdbError::DataFormat(format!(
                    "expected integer totalResults, got {:?}",
                    raw.total_results
                ))
            })?;
            debug!(query = %state.query, total_results = total, "search total");
            state.total = Some(total);
        }

        // A short server must not keep us paging forever.
        if raw.search.is_empty() {
            return Ok(None);
        }

        let items =
            raw.search.into_iter().map(SearchResult::try_from).collect::<Result<Vec<_>, _>>()?;

        state.yielded += items.len() as u64;
        state.page += 1;

        Ok(Some((items, state)))
    }

    async fn get_json(&self, params: &[(&str, &str)]) -> Result<Value, OmdbError> {
        self.limiter.until_ready().await;

        let url = format!("{}/", self.base_url.trim_end_matches('/'));
        let body = self
            .client
            .get(url)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(serde_json::from_str(&body)?)
    }
}

fn rejection(body: &Value) -> Option<String> {
    if body.get("Response").and_then(Value::as_str) != Some("False") {
        return None;
    }
    let message = body.get("Error").and_then(Value::as_str).unwrap_or("unknown error");
    Some(message.to_string())
}
