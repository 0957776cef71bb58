use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Failures talking to the OMDb API.
#[derive(Debug, thiserror::Error)]
pub enum OmdbError {
    /// Connection failure or non-2xx status.
    #[error("OMDb request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The body was not the JSON shape we expect.
    #[error("malformed OMDb response: {0}")]
    DataFormat(String),
    /// OMDb answered with `"Response": "False"`.
    #[error("OMDb rejected the request: {0}")]
    Api(String),
}

impl From<serde_json::Error> for OmdbError {
    fn from(err: serde_json::Error) -> Self {
        Self::DataFormat(err.to_string())
    }
}

#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl AppError {
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self(err)
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self(anyhow::Error::new(err))
    }
}

impl From<OmdbError> for AppError {
    fn from(err: OmdbError) -> Self {
        Self(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
