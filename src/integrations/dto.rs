use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

pub const ACTION_SHUFFLE: &str = "shuffle";
pub const ACTION_POST: &str = "post";
pub const ACTION_CANCEL: &str = "cancel";

/// Form fields of a slash command.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SlackArguments {
    pub team_id: String,
    pub channel_id: String,
    pub user_id: String,
    #[serde(rename = "team_domain")]
    pub team_name: String,
    pub channel_name: String,
    pub user_name: String,
    #[serde(rename = "text")]
    pub query: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ActionForm {
    pub payload: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackIdentifier {
    pub id: String,
    pub name: String,
}

/// The JSON a button press posts back in the `payload` form field.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SlackActionPayload {
    pub actions: Vec<SlackAction>,
    pub callback_id: String,
    pub team: SlackIdentifier,
    pub channel: SlackIdentifier,
    pub user: SlackIdentifier,
    pub response_url: String,
}

impl SlackActionPayload {
    pub fn action(&self) -> Option<&str> {
        self.actions.first().map(|a| a.value.as_str())
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackAction {
    pub name: String,
    pub text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub style: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl SlackAction {
    fn button(text: &str, value: &str) -> Self {
        Self {
            name: "action".into(),
            text: text.into(),
            style: String::new(),
            kind: "button".into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SlackImageAttachment {
    pub title: String,
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlackActionAttachment {
    pub text: String,
    pub fallback: String,
    pub callback_id: String,
    pub attachment_type: String,
    pub actions: Vec<SlackAction>,
}

impl SlackActionAttachment {
    /// Shuffle / Post / Cancel buttons for an ephemeral result.
    pub fn buttons(query: &str, image_uuid: &str) -> Self {
        let mut post = SlackAction::button("Post", ACTION_POST);
        post.style = "primary".into();
        Self {
            text: "Hit either `Post` or `Shuffle` (for a new image).".into(),
            fallback: "Unable to do image things.".into(),
            callback_id: create_callback_id(query, image_uuid),
            attachment_type: "default".into(),
            actions: vec![
                SlackAction::button("Shuffle", ACTION_SHUFFLE),
                post,
                SlackAction::button("Cancel", ACTION_CANCEL),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SlackAttachment {
    Image(SlackImageAttachment),
    Actions(SlackActionAttachment),
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SlackMessage {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub author_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub response_type: String,
    pub replace_original: bool,
    pub delete_original: bool,
    pub as_user: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<SlackAttachment>,
}

impl SlackMessage {
    /// Visible to the whole channel, replacing the ephemeral preview.
    pub fn in_channel(author_name: &str, title: String, image_url: String) -> Self {
        Self {
            author_name: author_name.to_string(),
            response_type: "in_channel".into(),
            delete_original: true,
            as_user: true,
            attachments: vec![SlackAttachment::Image(SlackImageAttachment { title, image_url })],
            ..Self::default()
        }
    }

    /// Only the searching user sees it, with buttons to shuffle or post.
    pub fn ephemeral(query: &str, image_uuid: &str, title: String, image_url: String) -> Self {
        Self {
            response_type: "ephemeral".into(),
            replace_original: true,
            attachments: vec![
                SlackAttachment::Image(SlackImageAttachment { title, image_url }),
                SlackAttachment::Actions(SlackActionAttachment::buttons(query, image_uuid)),
            ],
            ..Self::default()
        }
    }

    pub fn delete_original() -> Self {
        Self {
            delete_original: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SlackEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub challenge: String,
}

#[derive(Debug, Serialize)]
pub struct SlackChallenge {
    pub challenge: String,
}

/// `base64(query)||uuid`, carried through the buttons.
pub fn create_callback_id(query: &str, image_uuid: &str) -> String {
    format!("{}||{}", STANDARD.encode(query), image_uuid)
}

/// Query and uuid from a callback id; `None` when either is missing.
pub fn parse_callback_id(callback_id: &str) -> Option<(String, String)> {
    let (encoded, uuid) = callback_id.split_once("||")?;
    let query = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
    if query.is_empty() || uuid.is_empty() {
        return None;
    }
    Some((query, uuid.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_id_carries_query_and_uuid() {
        let id = create_callback_id("funny cats", "abc123");
        assert_eq!(id, "ZnVubnkgY2F0cw==||abc123");
        assert_eq!(parse_callback_id(&id), Some(("funny cats".into(), "abc123".into())));
    }

    #[test]
    fn malformed_callback_ids_are_rejected() {
        assert_eq!(parse_callback_id(""), None);
        assert_eq!(parse_callback_id("no-separator"), None);
        assert_eq!(parse_callback_id("ZnVubnk=||"), None);
        assert_eq!(parse_callback_id("%%%||abc"), None);
    }

    #[test]
    fn ephemeral_message_has_image_then_buttons() {
        let msg = SlackMessage::ephemeral("cats", "u1", "cats".into(), "https://img/1.gif".into());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["response_type"], "ephemeral");
        assert_eq!(json["replace_original"], true);
        assert_eq!(json["attachments"][0]["image_url"], "https://img/1.gif");
        let actions = &json["attachments"][1]["actions"];
        assert_eq!(actions[0]["value"], ACTION_SHUFFLE);
        assert_eq!(actions[1]["style"], "primary");
        assert_eq!(actions[2]["type"], "button");
        assert!(actions[0].get("style").is_none());
    }

    #[test]
    fn action_payload_reads_first_button() {
        let payload: SlackActionPayload = serde_json::from_str(
            r#"{"actions":[{"name":"action","value":"post"}],"callback_id":"x","team":{"id":"T1"}}"#,
        )
        .unwrap();
        assert_eq!(payload.action(), Some(ACTION_POST));
        assert_eq!(payload.team.id, "T1");
        assert_eq!(payload.team.name, "");
    }
}
