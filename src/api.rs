use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::ToSocketAddrs;

use crate::discovery::ContainerManager;
use crate::persistence;

/// The registry in the persisted state format.
async fn list_containers(manager: State<Arc<ContainerManager>>) -> Response {
    let containers = manager.registry().snapshot();
    match persistence::encode(containers.values().map(|info| info.as_ref())) {
        Ok(json) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            json,
        )
            .into_response(),
        Err(err) => {
            log::error!("Failed to encode containers: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to list containers",
            )
                .into_response()
        }
    }
}

async fn list_configs(manager: State<Arc<ContainerManager>>) -> Response {
    (StatusCode::OK, Json(manager.summaries())).into_response()
}

pub struct APIServer {
    router: axum::Router,
}

impl APIServer {
    pub fn new(manager: Arc<ContainerManager>) -> Self {
        let router = axum::Router::new()
            .route("/containers", get(list_containers))
            .route("/configs", get(list_configs))
            .with_state(manager);
        Self { router }
    }

    /// Serves the API until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns the I/O error of binding or serving.
    pub async fn listen(self, addr: impl ToSocketAddrs) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("API listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router.into_make_service()).await
    }
}
