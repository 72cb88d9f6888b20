use axum::{
    async_trait,
    body::HttpBody,
    extract::{FromRequest, Path, Query, State},
    http::{header::RETRY_AFTER, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    BoxError, Json,
};
use common::{
    models::{MarketSnapshot, Portfolio, PriceHistory, TrendingCoin, Watchlist},
    valuation::PortfolioStats,
    Error as CommonError,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::{auth::CurrentUser, state::AppState};

// Wrapper so common::Error can be returned from handlers
pub struct ApiError(CommonError);

impl From<CommonError> for ApiError {
    fn from(err: CommonError) -> Self {
        ApiError(err)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    message: String,
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CommonError::LocalRateLimited { .. } | CommonError::UpstreamRateLimited { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            CommonError::UpstreamTimeout => StatusCode::REQUEST_TIMEOUT,
            CommonError::CoinNotFound { .. }
            | CommonError::InvalidIndex { .. }
            | CommonError::UserNotFound(_) => StatusCode::NOT_FOUND,
            CommonError::InvalidInput(_) | CommonError::UnverifiedCoin { .. } => {
                StatusCode::BAD_REQUEST
            }
            CommonError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CommonError::UpstreamError { .. }
            | CommonError::UpstreamMalformed(_)
            | CommonError::HttpError(_)
            | CommonError::ConfigError(_)
            | CommonError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            debug!("Request rejected: {}", self.0);
        }

        let message = match &self.0 {
            CommonError::CoinNotFound { requested_id, .. } => format!(
                "Cryptocurrency '{}' not found. Try using the full name (e.g. 'bitcoin' instead of 'BTC').",
                requested_id
            ),
            CommonError::InvalidIndex { .. } => "Portfolio entry not found".to_string(),
            CommonError::LocalRateLimited { .. } | CommonError::UpstreamRateLimited { .. } => {
                "Rate limit exceeded. Please try again later.".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            message,
            error: self.0.kind(),
            retry_after: self.0.retry_after(),
            suggestion: self
                .0
                .suggested_id()
                .map(|id| format!("Did you mean '{}'?", id)),
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = self.0.retry_after() {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// `Json` whose rejections come back as the usual 400 error body
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S, B> FromRequest<S, B> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    B: HttpBody + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(CommonError::InvalidInput(format!(
                "Invalid request body: {}",
                rejection.body_text()
            ))
            .into()),
        }
    }
}

/// A number that clients may send either as a JSON number or a numeric string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NumericInput {
    Number(f64),
    Text(String),
}

impl NumericInput {
    fn parse(&self, field: &str) -> Result<f64, CommonError> {
        match self {
            NumericInput::Number(n) => Ok(*n),
            NumericInput::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| CommonError::InvalidInput(format!("{} must be a number", field))),
        }
    }
}

fn required<T>(value: Option<T>) -> Result<T, CommonError> {
    value.ok_or_else(|| CommonError::InvalidInput("All fields are required".to_string()))
}

fn parse_index(raw: &str) -> Result<usize, CommonError> {
    raw.trim()
        .parse()
        .map_err(|_| CommonError::InvalidInput(format!("Invalid portfolio index: '{}'", raw)))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn top_coins(State(state): State<AppState>) -> ApiResult<Json<Vec<MarketSnapshot>>> {
    Ok(Json(state.service.top_coins().await?))
}

pub async fn trending(State(state): State<AppState>) -> ApiResult<Json<Vec<TrendingCoin>>> {
    Ok(Json(state.service.trending().await?))
}

pub async fn coin_detail(
    State(state): State<AppState>,
    Path(coin_id): Path<String>,
) -> ApiResult<Json<MarketSnapshot>> {
    Ok(Json(state.service.coin_detail(&coin_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub days: Option<u32>,
}

pub async fn price_history(
    State(state): State<AppState>,
    Path(coin_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<PriceHistory>> {
    Ok(Json(state.service.price_history(&coin_id, query.days).await?))
}

pub async fn get_watchlist(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<Json<Watchlist>> {
    Ok(Json(state.service.watchlist(&user_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistRequest {
    pub coin_id: Option<String>,
}

pub async fn add_to_watchlist(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    JsonBody(body): JsonBody<WatchlistRequest>,
) -> ApiResult<Json<Watchlist>> {
    let coin_id = required(body.coin_id)?;
    Ok(Json(state.service.add_to_watchlist(&user_id, &coin_id).await?))
}

pub async fn remove_from_watchlist(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(coin_id): Path<String>,
) -> ApiResult<Json<Watchlist>> {
    Ok(Json(
        state
            .service
            .remove_from_watchlist(&user_id, &coin_id)
            .await?,
    ))
}

pub async fn get_portfolio(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<Json<Portfolio>> {
    Ok(Json(state.service.portfolio(&user_id).await?))
}

pub async fn portfolio_stats(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<Json<PortfolioStats>> {
    Ok(Json(state.service.portfolio_stats(&user_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddHoldingRequest {
    pub coin_id: Option<String>,
    pub amount: Option<NumericInput>,
    pub purchase_price: Option<NumericInput>,
}

pub async fn add_to_portfolio(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    JsonBody(body): JsonBody<AddHoldingRequest>,
) -> ApiResult<(StatusCode, Json<Portfolio>)> {
    let coin_id = required(body.coin_id)?;
    let amount = required(body.amount)?.parse("amount")?;
    let purchase_price = required(body.purchase_price)?.parse("purchasePrice")?;

    let portfolio = state
        .service
        .add_to_portfolio(&user_id, &coin_id, amount, purchase_price)
        .await?;
    Ok((StatusCode::CREATED, Json(portfolio)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateHoldingRequest {
    pub amount: Option<NumericInput>,
    pub purchase_price: Option<NumericInput>,
}

pub async fn update_portfolio_entry(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(index): Path<String>,
    JsonBody(body): JsonBody<UpdateHoldingRequest>,
) -> ApiResult<Json<Portfolio>> {
    let index = parse_index(&index)?;
    let amount = required(body.amount)?.parse("amount")?;
    let purchase_price = required(body.purchase_price)?.parse("purchasePrice")?;

    Ok(Json(
        state
            .service
            .update_portfolio_entry(&user_id, index, amount, purchase_price)
            .await?,
    ))
}

pub async fn remove_from_portfolio(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(index): Path<String>,
) -> ApiResult<Json<Portfolio>> {
    let index = parse_index(&index)?;
    Ok(Json(
        state
            .service
            .remove_from_portfolio(&user_id, index)
            .await?,
    ))
}
