use serde::Deserialize;

use crate::error::OmdbError;

/// One entry of an OMDb search page. Only id, title and year are known.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchResult {
    pub imdb_id: String,
    pub title: String,
    pub year: i32,
}

/// A movie as returned by an OMDb id lookup.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MovieDetail {
    pub imdb_id: String,
    pub title: String,
    pub year: i32,
    pub runtime_minutes: i32,
    pub genres: Vec<String>,
    pub plot: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSearchItem {
    #[serde(rename = "imdbID")]
    imdb_id: String,
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Year")]
    year: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSearchPage {
    #[serde(rename = "totalResults")]
    pub(crate) total_results: String,
    #[serde(rename = "Search", default)]
    pub(crate) search: Vec<RawSearchItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawDetail {
    #[serde(rename = "imdbID")]
    imdb_id: String,
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Year")]
    year: String,
    #[serde(rename = "Runtime")]
    runtime: String,
    #[serde(rename = "Genre")]
    genre: String,
    #[serde(rename = "Plot")]
    plot: String,
}

impl TryFrom<RawSearchItem> for SearchResult {
    type Error = OmdbError;

    fn try_from(raw: RawSearchItem) -> Result<Self, Self::Error> {
        Ok(Self { year: parse_year(&raw.year)?, imdb_id: raw.imdb_id, title: raw.title })
    }
}

impl TryFrom<RawDetail> for MovieDetail {
    type Error = OmdbError;

    fn try_from(raw: RawDetail) -> Result<Self, Self::Error> {
        Ok(Self {
            year: parse_year(&raw.year)?,
            runtime_minutes: parse_runtime(&raw.runtime)?,
            genres: split_genres(&raw.genre),
            imdb_id: raw.imdb_id,
            title: raw.title,
            plot: raw.plot,
        })
    }
}

pub fn parse_year(raw: &str) -> Result<i32, OmdbError> {
    raw.trim()
        .parse()
        .map_err(|_| OmdbError::DataFormat(format!("expected an integer year, got {raw:?}")))
}

/// Parses `"<n> min"` with `n` a non-negative integer. Any other unit or shape is rejected.
pub fn parse_runtime(raw: &str) -> Result<i32, OmdbError> {
    let mut parts = raw.split_whitespace();
    let (Some(value), Some(units), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(OmdbError::DataFormat(format!("expected runtime as \"<n> min\", got {raw:?}")));
    };
    if units != "min" {
        return Err(OmdbError::DataFormat(format!(
            "expected units 'min' for runtime, got {units:?}"
        )));
    }
    let invalid = || OmdbError::DataFormat(format!("expected integer runtime, got {value:?}"));
    // `str::parse` would accept a sign.
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    value.parse().map_err(|_| invalid())
}

pub fn split_genres(raw: &str) -> Vec<String> {
    raw.split(", ").map(str::to_string).collect()
}
