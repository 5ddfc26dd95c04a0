//! The `/v0` REST admin surface (spec §6).

mod admin;
mod groups;
mod prompts;
mod servers;
mod tools;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(servers::router())
        .merge(tools::router())
        .merge(prompts::router())
        .merge(groups::router())
        .merge(admin::router())
}
