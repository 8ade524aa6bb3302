use axum::{extract::State, routing::get, Json, Router};
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::error::MasterResult;
use crate::status::{StatusBoard, StatusSnapshot};

pub fn router(board: Arc<StatusBoard>) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .with_state(board)
}

pub async fn start_status_server(board: Arc<StatusBoard>, port: u16) -> MasterResult<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Status endpoint at http://{}/status", addr);
    axum::serve(listener, router(board)).await?;
    Ok(())
}

async fn status_handler(State(board): State<Arc<StatusBoard>>) -> Json<StatusSnapshot> {
    Json(board.snapshot())
}
