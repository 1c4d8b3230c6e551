use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::model::user::User;

#[derive(Debug, Serialize, Deserialize)]
pub struct Meta {
    #[serde(rename = "StatusCode")]
    pub status_code: u16,
    #[serde(rename = "Message", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Wrapper every `/api` response is sent in.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "Meta")]
    pub meta: Meta,
    #[serde(rename = "Response", skip_serializing_if = "Option::is_none")]
    pub response: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(response: T) -> Self {
        Self {
            meta: Meta {
                status_code: StatusCode::OK.as_u16(),
                message: None,
            },
            response: Some(response),
        }
    }

    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            meta: Meta {
                status_code: status.as_u16(),
                message: Some(message.into()),
            },
            response: None,
        }
    }
}

impl Envelope<()> {
    pub fn empty() -> Self {
        Self {
            meta: Meta {
                status_code: StatusCode::OK.as_u16(),
                message: None,
            },
            response: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CurrentUser {
    pub is_logged_in: bool,
    #[serde(default)]
    pub user_uuid: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_moderator: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub login_url: Option<String>,
}

impl CurrentUser {
    pub fn logged_in(user: &User) -> Self {
        Self {
            is_logged_in: true,
            user_uuid: user.uuid.clone(),
            username: user.username.clone(),
            is_admin: user.is_admin,
            is_moderator: user.is_moderator,
            login_url: None,
        }
    }

    pub fn logged_out(login_url: String) -> Self {
        Self {
            login_url: Some(login_url),
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTag {
    pub tag_value: String,
}

/// `POST /api/tags` accepts one tag object or a list of values.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CreateTagArgs {
    One(CreateTag),
    Many(Vec<String>),
}

impl CreateTagArgs {
    pub fn into_values(self) -> Vec<String> {
        match self {
            CreateTagArgs::One(t) => vec![t.tag_value],
            CreateTagArgs::Many(values) => values,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateImage {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub content_rating: Option<i32>,
}

/// Mutable user fields; identity fields in the body are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateUser {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_address: Option<String>,
    pub is_email_verified: bool,
    pub is_admin: bool,
    pub is_moderator: bool,
    pub is_banned: bool,
}

impl UpdateUser {
    pub fn apply_to(self, existing: &User) -> User {
        User {
            first_name: self.first_name,
            last_name: self.last_name,
            email_address: self.email_address,
            is_email_verified: self.is_email_verified,
            is_admin: self.is_admin,
            is_moderator: self.is_moderator,
            is_banned: self.is_banned,
            ..existing.clone()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateTeam {
    pub is_enabled: bool,
    pub content_rating: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_uses_pascal_case_keys() {
        let json = serde_json::to_value(Envelope::ok(vec![1, 2])).unwrap();
        assert_eq!(json["Meta"]["StatusCode"], 200);
        assert!(json["Meta"].get("Message").is_none());
        assert_eq!(json["Response"], serde_json::json!([1, 2]));

        let json = serde_json::to_value(Envelope::<()>::error(StatusCode::NOT_FOUND, "not found")).unwrap();
        assert_eq!(json["Meta"]["StatusCode"], 404);
        assert_eq!(json["Meta"]["Message"], "not found");
        assert!(json.get("Response").is_none());
    }

    #[test]
    fn create_tag_args_accepts_both_shapes() {
        let one: CreateTagArgs = serde_json::from_str(r#"{"tag_value":"cats"}"#).unwrap();
        assert_eq!(one.into_values(), vec!["cats"]);
        let many: CreateTagArgs = serde_json::from_str(r#"["cats","dogs"]"#).unwrap();
        assert_eq!(many.into_values(), vec!["cats", "dogs"]);
    }

    #[test]
    fn update_user_keeps_identity() {
        let existing = User::new("someone@example.com");
        let posted: UpdateUser = serde_json::from_str(
            r#"{"uuid":"other","username":"hijack","is_moderator":true,"first_name":"S"}"#,
        )
        .unwrap();
        let updated = posted.apply_to(&existing);
        assert_eq!(updated.uuid, existing.uuid);
        assert_eq!(updated.username, "someone@example.com");
        assert!(updated.is_moderator);
        assert_eq!(updated.first_name.as_deref(), Some("S"));
    }

    #[test]
    fn logged_out_user_carries_login_url() {
        let json = serde_json::to_value(CurrentUser::logged_out("https://login".into())).unwrap();
        assert_eq!(json["is_logged_in"], false);
        assert_eq!(json["login_url"], "https://login");
    }
}
