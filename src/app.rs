use std::net::SocketAddr;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::get,
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{auth, error::AppError, state::AppState};

fn cors_layer(origin: &str) -> CorsLayer {
    let allow_origin = if origin.trim() == "*" {
        AllowOrigin::mirror_request()
    } else {
        match HeaderValue::from_str(origin.trim()) {
            Ok(value) => AllowOrigin::exact(value),
            Err(e) => {
                tracing::warn!(error = %e, %origin, "invalid CORS_ORIGIN; cross-origin requests disabled");
                AllowOrigin::list(Vec::<HeaderValue>::new())
            }
        }
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
}

pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origin);
    let json_limit = state.config.json_body_limit;

    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .nest("/users", auth::router(&state))
                .route("/health", get(|| async { "ok" })),
        )
        .fallback(|| async { AppError::NotFound("Route not found".into()) })
        .with_state(state)
        .layer(DefaultBodyLimit::max(json_limit))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, ?latency, "response");
                        } else {
                            tracing::info!(%status, ?latency, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8000".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
