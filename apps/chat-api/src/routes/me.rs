use axum::routing::get;
use axum::{Json, Router};
use coursechat_common::api::MeResponse;

use crate::auth::middleware::AuthUser;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/me", get(me))
}

async fn me(auth: AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        success: true,
        user: auth.0.sender(),
    })
}
