use axum::{
    extract::{rejection::FormRejection, rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Form, Json,
};
use tracing::{error, info, instrument, warn};

use super::dto::{
    parse_callback_id, ActionForm, SlackActionPayload, SlackArguments, SlackChallenge, SlackEvent, SlackMessage,
    ACTION_CANCEL, ACTION_POST, ACTION_SHUFFLE,
};
use crate::error::{AppError, AppResult};
use crate::model::content_rating;
use crate::model::image::{self, Image};
use crate::model::search;
use crate::model::search_history::{self, NewSearchHistory, SOURCE_SLACK};
use crate::model::slack_team;
use crate::state::AppState;

pub const ERROR_INVALID_QUERY: &str = "Please type at least (3) characters.";
pub const ERROR_BAD_PAYLOAD: &str = "There was an error processing a payload from slack. Saddness.";
pub const ERROR_INVALID_ACTION: &str = "An invalid action was passed to the button handler.";
pub const ERROR_INVALID_CALLBACK_STATE: &str = "An invalid callback state was passed to the button handler.";
pub const ERROR_INTERNAL: &str = "There was an error processing your request. Sadness.";
pub const ERROR_TEAM_DISABLED: &str = "Your team has been disabled; contact the integration owner to re-enable.";

const IMAGE_PREFIX: &str = "img:";

fn text(message: impl Into<String>) -> Response {
    message.into().into_response()
}

fn no_results(base_url: &str) -> String {
    format!("Giffy couldn't find what you were looking for; maybe add it here? {base_url}/add_image")
}

/// Errors are logged and answered with the generic chat line.
fn or_internal(result: anyhow::Result<Response>) -> Response {
    result.unwrap_or_else(|e| {
        error!(error = %e, "slack request failed");
        text(ERROR_INTERNAL)
    })
}

fn title_for(found: &Image, fallback: impl FnOnce() -> String) -> String {
    found
        .top_tag_value()
        .map(str::to_string)
        .or_else(|| found.display_name.clone().filter(|n| !n.is_empty()))
        .unwrap_or_else(fallback)
}

/// Writes the search history row off the request path.
fn record_search(state: &AppState, entry: NewSearchHistory) {
    let db = state.db.clone();
    tokio::spawn(async move {
        if let Err(e) = search_history::create(&db, &entry).await {
            error!(error = %e, "failed to record search history");
        }
    });
}

/// Unknown teams search with the default filter; `None` means the team is disabled.
async fn rating_filter_for_team(state: &AppState, team_id: &str) -> anyhow::Result<Option<i32>> {
    match slack_team::by_team_id(&state.db, team_id).await? {
        Some(team) if !team.is_enabled => Ok(None),
        Some(team) => Ok(Some(team.content_rating)),
        None => Ok(Some(content_rating::FILTER_DEFAULT)),
    }
}

#[instrument(skip(state, args), fields(team = %args.team_name, query = %args.query))]
pub async fn slash_command(State(state): State<AppState>, Form(args): Form<SlackArguments>) -> Response {
    if args.query.chars().count() < 3 {
        return text(ERROR_INVALID_QUERY);
    }
    or_internal(search_for_command(&state, &args).await)
}

async fn search_for_command(state: &AppState, args: &SlackArguments) -> anyhow::Result<Response> {
    let Some(filter) = rating_filter_for_team(state, &args.team_id).await? else {
        return Ok(text(ERROR_TEAM_DISABLED));
    };

    let image_uuid = args.query.strip_prefix(IMAGE_PREFIX).map(str::trim);
    let found = match image_uuid {
        Some(uuid) => image::by_uuid(&state.db, uuid).await?,
        None => search::search_images_best_result(&state.db, &args.query, &[], filter).await?,
    };

    if !args.team_name.is_empty() {
        record_search(
            state,
            NewSearchHistory {
                source: SOURCE_SLACK.into(),
                source_team_identifier: Some(args.team_id.clone()),
                source_team_name: Some(args.team_name.clone()),
                source_channel_identifier: Some(args.channel_id.clone()),
                source_channel_name: Some(args.channel_name.clone()),
                source_user_identifier: Some(args.user_id.clone()),
                source_user_name: Some(args.user_name.clone()),
                search_query: args.query.clone(),
                did_find_match: found.is_some(),
                image_id: found.as_ref().map(|i| i.id),
                tag_id: found.as_ref().and_then(|i| i.tags.first()).map(|t| t.id),
            },
        );
    }

    let Some(found) = found else {
        info!("no slack result");
        return Ok(text(no_results(&state.config.base_url)));
    };
    let image_url = found.s3_read_url.clone().unwrap_or_default();

    let message = if image_uuid.is_some() {
        SlackMessage::in_channel(&args.user_name, args.query.clone(), image_url)
    } else {
        let title = title_for(&found, || format!("search: `{}`", args.query));
        SlackMessage::ephemeral(&args.query, &found.uuid, title, image_url)
    };
    Ok(Json(message).into_response())
}

fn parse_payload(form: Result<Form<ActionForm>, FormRejection>) -> anyhow::Result<SlackActionPayload> {
    let Form(form) = form?;
    Ok(serde_json::from_str(&form.payload)?)
}

#[instrument(skip_all)]
pub async fn button_action(
    State(state): State<AppState>,
    form: Result<Form<ActionForm>, FormRejection>,
) -> Response {
    let payload = match parse_payload(form) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "bad slack action payload");
            return text(ERROR_BAD_PAYLOAD);
        }
    };

    match payload.action() {
        Some(ACTION_SHUFFLE) => or_internal(shuffle(&state, &payload).await),
        Some(ACTION_POST) => or_internal(post(&state, &payload).await),
        Some(ACTION_CANCEL) => Json(SlackMessage::delete_original()).into_response(),
        _ => text(ERROR_INVALID_ACTION),
    }
}

async fn shuffle(state: &AppState, payload: &SlackActionPayload) -> anyhow::Result<Response> {
    let Some((query, current_uuid)) = parse_callback_id(&payload.callback_id) else {
        return Ok(text(ERROR_INVALID_CALLBACK_STATE));
    };
    let Some(filter) = rating_filter_for_team(state, &payload.team.id).await? else {
        return Ok(text(ERROR_TEAM_DISABLED));
    };

    let excludes = [current_uuid];
    let Some(found) = search::search_images_best_result(&state.db, &query, &excludes, filter).await? else {
        return Ok(text(no_results(&state.config.base_url)));
    };

    let title = title_for(&found, || format!("search: `{}`", query));
    let image_url = found.s3_read_url.clone().unwrap_or_default();
    Ok(Json(SlackMessage::ephemeral(&query, &found.uuid, title, image_url)).into_response())
}

async fn post(state: &AppState, payload: &SlackActionPayload) -> anyhow::Result<Response> {
    let Some((query, image_uuid)) = parse_callback_id(&payload.callback_id) else {
        return Ok(text(ERROR_INVALID_CALLBACK_STATE));
    };

    let found = image::by_uuid(&state.db, &image_uuid).await?;
    if !payload.team.name.is_empty() {
        record_search(
            state,
            NewSearchHistory {
                source: SOURCE_SLACK.into(),
                source_team_identifier: Some(payload.team.id.clone()),
                source_team_name: Some(payload.team.name.clone()),
                source_channel_identifier: Some(payload.channel.id.clone()),
                source_channel_name: Some(payload.channel.name.clone()),
                source_user_identifier: Some(payload.user.id.clone()),
                source_user_name: Some(payload.user.name.clone()),
                search_query: query.clone(),
                did_find_match: found.is_some(),
                image_id: found.as_ref().map(|i| i.id),
                tag_id: found.as_ref().and_then(|i| i.tags.first()).map(|t| t.id),
            },
        );
    }

    let Some(found) = found else {
        return Ok(text(no_results(&state.config.base_url)));
    };
    let title = title_for(&found, || format!("search: `{}`", query));
    let image_url = found.s3_read_url.clone().unwrap_or_default();
    Ok(Json(SlackMessage::in_channel(&payload.user.name, title, image_url)).into_response())
}

#[instrument(skip_all)]
pub async fn event(body: Result<Json<SlackEvent>, JsonRejection>) -> AppResult<Response> {
    let Json(event) = body.map_err(|e| AppError::bad_request(e.body_text()))?;
    if event.kind == "url_verification" {
        return Ok(Json(SlackChallenge {
            challenge: event.challenge,
        })
        .into_response());
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tag::Tag;

    #[test]
    fn titles_prefer_top_tag_then_display_name() {
        let mut img = Image::new(1);
        assert_eq!(title_for(&img, || "fallback".into()), "fallback");

        img.display_name = Some("Dancing".into());
        assert_eq!(title_for(&img, || "fallback".into()), "Dancing");

        img.tags.push(Tag::new(1, "dance"));
        assert_eq!(title_for(&img, || "fallback".into()), "dance");
    }

    #[test]
    fn no_results_points_at_the_upload_page() {
        assert_eq!(
            no_results("https://giffy.example"),
            "Giffy couldn't find what you were looking for; maybe add it here? https://giffy.example/add_image"
        );
    }
}
