use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use khrate::RateScraper;
use khrate::ScraperError;
use khrate::types::{NbcRates, NssfRate, TaxExchangeRate};
use khrate::utils::today;
use serde::Deserialize;
use serde_json::json;

#[derive(Clone)]
pub struct AppState {
    scraper: RateScraper,
}

impl AppState {
    pub fn new(scraper: RateScraper) -> Self {
        Self { scraper }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/nbc-rate", get(nbc_rate))
        .route("/nssf-exr-rate", get(nssf_rate))
        .route("/exr-rate", get(tax_rate))
        .route("/health", get(health))
        .with_state(state)
}

/// Short, machine-readable failure categories. Every failure is a 500; the
/// category is all a caller gets to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiError {
    Timeout,
    FrameDetached,
    Extraction,
    Internal,
}

impl ApiError {
    /// Classification for `/nbc-rate`, which singles out detached frames.
    pub fn central_bank(err: &ScraperError) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_frame_detached() {
            ApiError::FrameDetached
        } else {
            ApiError::Internal
        }
    }

    /// Classification for the NSSF and tax endpoints.
    pub fn rate_source(err: &ScraperError) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_extraction() {
            ApiError::Extraction
        } else {
            ApiError::Internal
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ApiError::Timeout => "Timeout Error",
            ApiError::FrameDetached => "Frame detached error",
            ApiError::Extraction => "Extraction Error",
            ApiError::Internal => "Internal Server Error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.message() })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct NbcQuery {
    pub date: Option<String>,
}

async fn nbc_rate(
    State(state): State<AppState>,
    Query(query): Query<NbcQuery>,
) -> Result<Json<NbcRates>, ApiError> {
    let date = query.date.filter(|d| !d.is_empty()).unwrap_or_else(today);

    state
        .scraper
        .fetch_nbc_rates(&date)
        .await
        .map(Json)
        .map_err(|e| {
            log::error!("Failed to fetch NBC rates for {date}: {e}");
            ApiError::central_bank(&e)
        })
}

async fn nssf_rate(State(state): State<AppState>) -> Result<Json<NssfRate>, ApiError> {
    state.scraper.fetch_nssf_rate().await.map(Json).map_err(|e| {
        log::error!("Failed to fetch NSSF rate: {e}");
        ApiError::rate_source(&e)
    })
}

async fn tax_rate(State(state): State<AppState>) -> Result<Json<TaxExchangeRate>, ApiError> {
    state.scraper.fetch_tax_rates().await.map(Json).map_err(|e| {
        log::error!("Failed to fetch tax rates: {e}");
        ApiError::rate_source(&e)
    })
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
