//! HTTP front door
//!
//! Serves the discovery document at [`SERVICES_PATH`]; every other path is
//! a bare 404.

use axum::Router;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use http::StatusCode;
use tracing::Instrument;

use crate::services::discovery;
use crate::services::store::KvStore;

pub const SERVICES_PATH: &str = "/services";

// 每个请求共享的只读状态
#[derive(Debug, Clone)]
struct DiscoveryState<S> {
    store: S,
    prefix: String,
    span: tracing::Span,
}

/// 构建从 `store` 读取数据响应服务发现请求的路由
pub fn router<S: KvStore>(store: S, prefix: impl Into<String>) -> Router {
    let prefix = prefix.into();
    let span = tracing::info_span!("discovery_http", prefix = %prefix);
    let state = DiscoveryState {
        store,
        prefix,
        span,
    };

    Router::new()
        .route(SERVICES_PATH, any(list_services::<S>))
        .fallback(not_found)
        .with_state(state)
}

async fn list_services<S: KvStore>(State(state): State<DiscoveryState<S>>) -> Response {
    let span = state.span.clone();
    async move {
        match discovery::list(&state.store, &state.prefix).await {
            Ok(groups) => {
                tracing::debug!(groups = groups.len(), "Serving discovery document");
                axum::Json(groups).into_response()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Discovery listing failed");
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
