use axum::{routing::post, Router};

use crate::state::AppState;

pub mod dto;
pub mod slack;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/integrations/slack", post(slack::slash_command))
        .route("/integrations/slack.action", post(slack::button_action))
        .route("/integrations/slack.event", post(slack::event))
}
