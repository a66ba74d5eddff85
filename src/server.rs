//! HTTP surface: the axum service that feeds webhook requests into an
//! [`InteractionRouter`].

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::router::{InteractionRouter, RouterReply};

/// Build the axum application. The endpoint is mounted at both `/` and
/// `/interactions`.
pub fn app(router: InteractionRouter) -> Router {
    Router::new()
        .route("/", post(interactions))
        .route("/interactions", post(interactions))
        .layer(TraceLayer::new_for_http())
        .with_state(router)
}

async fn interactions(
    State(router): State<InteractionRouter>,
    headers: HeaderMap,
    body: Bytes,
) -> RouterReply {
    router.handle(&headers, &body).await
}

impl IntoResponse for RouterReply {
    fn into_response(self) -> Response {
        match self {
            RouterReply::Respond(response) => (StatusCode::OK, Json(response)).into_response(),
            // Rejections carry no body; the status is the whole answer.
            reply => reply.status().into_response(),
        }
    }
}

/// Bind `addr` and serve until ctrl-c.
pub async fn serve(router: InteractionRouter, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %listener.local_addr()?, "Interaction endpoint listening");

    let shutdown_signal = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
        }
    };

    axum::serve(listener, app(router))
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
