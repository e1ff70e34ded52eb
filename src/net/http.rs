use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::Registry;
use crate::error::{AppResult, ErrorCode, InfraError};
use crate::models::types::PlayerId;
use crate::rpc::{self, RpcError};

/// Header carrying the caller, resolved by the gateway in front of us
pub const PLAYER_HEADER: &str = "x-player-id";

#[derive(Clone)]
struct HttpAppCtx {
    registry: Arc<Registry>,
}

pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/rpc/{name}", post(rpc_call))
        .with_state(HttpAppCtx { registry })
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

/// Run the HTTP server with the RPC endpoint
pub async fn serve(addr: std::net::SocketAddr, registry: Arc<Registry>) -> AppResult<()> {
    let app = router(registry);

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(InfraError::from)?;
    axum::serve(listener, app).await.map_err(InfraError::from)?;
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn rpc_call(
    State(ctx): State<HttpAppCtx>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Some(player_id) = player_from_headers(&headers) else {
        let err = RpcError::new(ErrorCode::InvalidArgument, format!("missing or invalid {PLAYER_HEADER} header"));
        return (StatusCode::UNAUTHORIZED, Json(err)).into_response();
    };

    match rpc::dispatch(&ctx.registry, player_id, &name, &body).await {
        Ok(json) => (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], json).into_response(),
        Err(err) => (status_for(err.code), Json(err)).into_response(),
    }
}

fn player_from_headers(headers: &HeaderMap) -> Option<PlayerId> {
    headers.get(PLAYER_HEADER)?.to_str().ok()?.trim().parse().ok()
}

pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::FailedPrecondition => StatusCode::CONFLICT,
        ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn player_header_must_be_a_uuid() {
        let mut headers = HeaderMap::new();
        assert!(player_from_headers(&headers).is_none());

        headers.insert(PLAYER_HEADER, HeaderValue::from_static("bob"));
        assert!(player_from_headers(&headers).is_none());

        let id = PlayerId::new();
        headers.insert(PLAYER_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());
        assert_eq!(player_from_headers(&headers), Some(id));
    }

    #[test]
    fn retryable_codes_map_to_5xx() {
        assert_eq!(status_for(ErrorCode::Unavailable), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(ErrorCode::DeadlineExceeded), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(ErrorCode::FailedPrecondition), StatusCode::CONFLICT);
    }
}
