use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Status {
    name: String,
    status: String,
}

#[utoipa::path(
    get,
    path = "/api/status",
    responses (
        (status = 200, description = "Dashboard status", body = Status),
        (status = 401, description = "No session, unless listed in the unauthenticated routes")
    ),
    tag = "session",
)]
pub async fn status() -> impl IntoResponse {
    Json(Status {
        name: env!("CARGO_PKG_NAME").to_string(),
        status: "available".to_string(),
    })
}
