use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::AppResult, sync, tasks::TaskOutcome};

const PENDING: &str = "Task pending, please refresh.";

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    search_term: String,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SearchQuery>,
) -> AppResult<Response> {
    let search_term = q.search_term;

    let store = state.store.clone();
    let omdb = state.omdb.clone();
    let query = search_term.clone();
    let mut handle = state.tasks.submit(async move {
        sync::search_and_save(&store, &omdb, &query).await.map(|_| ())
    });

    match handle.wait(state.config.search_wait).await {
        None => {
            tracing::debug!(task_id = %handle.id(), "search still running, redirecting to wait");
            let url = format!(
                "/search_wait/{}?search_term={}",
                handle.id(),
                urlencoding::encode(&search_term)
            );
            Ok(Redirect::to(&url).into_response())
        },
        Some(outcome) => finished(outcome, &search_term),
    }
}

pub async fn search_wait(
    State(state): State<Arc<AppState>>,
    Path(result_uuid): Path<Uuid>,
    Query(q): Query<SearchQuery>,
) -> AppResult<Response> {
    let Some(handle) = state.tasks.get(result_uuid) else {
        return Ok((StatusCode::NOT_FOUND, format!("unknown task {result_uuid}")).into_response());
    };

    match handle.try_outcome() {
        None => Ok(PENDING.into_response()),
        Some(outcome) => finished(outcome, &q.search_term),
    }
}

pub async fn search_results(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SearchQuery>,
) -> AppResult<String> {
    let titles = state.store.titles_matching(&q.search_term).await?;
    Ok(titles.join("\n"))
}

fn finished(outcome: TaskOutcome, search_term: &str) -> AppResult<Response> {
    outcome.map_err(|message| anyhow::anyhow!(message))?;
    let url = format!("/search_results?search_term={}", urlencoding::encode(search_term));
    Ok(Redirect::to(&url).into_response())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use serde_json::json;
    use tower::ServiceExt;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers::method};

    use super::*;
    use crate::{
        app, config::Config, db, models::SearchResult, omdb::OmdbClient, store::MovieStore,
        tasks::TaskQueue,
    };

    async fn state(server: &MockServer, search_wait: Duration) -> Arc<AppState> {
        let config = Config {
            addr: "127.0.0.1:0".parse().unwrap(),
            omdb_api_key: "test-key".to_string(),
            omdb_base_url: server.uri(),
            database_url: "sqlite::memory:".to_string(),
            omdb_rps: 1_000,
            search_wait,
        };
        let omdb = OmdbClient::new(
            reqwest::Client::new(),
            config.omdb_api_key.clone(),
            config.omdb_base_url.clone(),
            config.omdb_rps,
        );
        Arc::new(AppState {
            config: Arc::new(config),
            store: MovieStore::new(db::memory().await),
            omdb: Arc::new(omdb),
            tasks: TaskQueue::new(),
        })
    }

    async fn get(state: Arc<AppState>, uri: &str) -> Response {
        app(state).oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap()
    }

    async fn body_text(resp: Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(resp: &Response) -> &str {
        resp.headers().get(header::LOCATION).unwrap().to_str().unwrap()
    }

    #[tokio::test]
    async fn completed_search_redirects_to_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Search": [{ "imdbID": "tt0372784", "Title": "Batman Begins", "Year": "2005" }],
                "totalResults": "1",
                "Response": "True"
            })))
            .mount(&server)
            .await;
        let state = state(&server, Duration::from_secs(5)).await;

        let resp = get(state.clone(), "/search?search_term=batman%20begins").await;

        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/search_results?search_term=batman%20begins");

        let resp = get(state, "/search_results?search_term=BEGINS").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "Batman Begins");
    }

    #[tokio::test]
    async fn slow_search_redirects_to_wait_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "Response": "False", "Error": "Movie not found!" }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;
        let state = state(&server, Duration::from_millis(50)).await;

        let resp = get(state.clone(), "/search?search_term=batman").await;

        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let wait_url = location(&resp).to_string();
        assert!(wait_url.starts_with("/search_wait/"));
        assert!(wait_url.ends_with("?search_term=batman"));

        let resp = get(state, &wait_url).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, PENDING);
    }

    #[tokio::test]
    async fn wait_page_redirects_once_done() {
        let server = MockServer::start().await;
        let state = state(&server, Duration::from_secs(1)).await;
        let mut handle = state.tasks.submit(async { Ok(()) });
        handle.wait(Duration::from_secs(5)).await;

        let uri = format!("/search_wait/{}?search_term=star%20wars", handle.id());
        let resp = get(state, &uri).await;

        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/search_results?search_term=star%20wars");
    }

    #[tokio::test]
    async fn failed_search_is_a_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let state = state(&server, Duration::from_secs(5)).await;

        let resp = get(state, "/search?search_term=batman").await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn wait_page_reports_a_failed_search() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(200)))
            .mount(&server)
            .await;
        let state = state(&server, Duration::from_millis(20)).await;

        let resp = get(state.clone(), "/search?search_term=batman").await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let wait_url = location(&resp).to_string();
        let id = wait_url.trim_start_matches("/search_wait/").split('?').next().unwrap();
        let mut handle = state.tasks.get(Uuid::parse_str(id).unwrap()).unwrap();
        assert!(matches!(handle.wait(Duration::from_secs(5)).await, Some(Err(_))));

        let resp = get(state, &wait_url).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn wait_page_reports_a_panicked_task() {
        async fn explode() -> AppResult<()> {
            panic!("db exploded")
        }

        let server = MockServer::start().await;
        let state = state(&server, Duration::from_secs(1)).await;
        let mut handle = state.tasks.submit(explode());
        handle.wait(Duration::from_secs(5)).await;

        let uri = format!("/search_wait/{}?search_term=batman", handle.id());
        let resp = get(state, &uri).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let server = MockServer::start().await;
        let state = state(&server, Duration::from_secs(1)).await;

        let resp =
            get(state, &format!("/search_wait/{}?search_term=batman", Uuid::new_v4())).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn results_are_plain_text_lines() {
        let server = MockServer::start().await;
        let state = state(&server, Duration::from_secs(1)).await;
        for (id, title) in [("tt0372784", "Batman Begins"), ("tt0103776", "Batman Returns")] {
            let result =
                SearchResult { imdb_id: id.to_string(), title: title.to_string(), year: 2000 };
            state.store.create_partial_movie(&result).await.unwrap();
        }

        let resp = get(state, "/search_results?search_term=batman").await;

        let content_type = resp.headers().get(header::CONTENT_TYPE).unwrap();
        assert_eq!(content_type, "text/plain; charset=utf-8");
        assert_eq!(body_text(resp).await, "Batman Begins\nBatman Returns");
    }

    #[tokio::test]
    async fn results_match_wildcard_characters_literally() {
        let server = MockServer::start().await;
        let state = state(&server, Duration::from_secs(1)).await;
        for (id, title) in [("tt0372784", "Batman Begins"), ("tt0120577", "100% Wolf")] {
            let result =
                SearchResult { imdb_id: id.to_string(), title: title.to_string(), year: 2000 };
            state.store.create_partial_movie(&result).await.unwrap();
        }

        let resp = get(state.clone(), "/search_results?search_term=%25").await;
        assert_eq!(body_text(resp).await, "100% Wolf");

        let resp = get(state, "/search_results?search_term=_").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "");
    }

    #[tokio::test]
    async fn missing_search_term_is_rejected() {
        let server = MockServer::start().await;
        let state = state(&server, Duration::from_secs(1)).await;

        let resp = get(state, "/search_results").await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
