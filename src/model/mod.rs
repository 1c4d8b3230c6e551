//! Data access, one module per table. Everything here returns `anyhow::Result`
//! and leaves HTTP concerns to the callers.

pub mod content_rating;
pub mod error_log;
pub mod image;
pub mod moderation;
pub mod search;
pub mod search_history;
pub mod slack_team;
pub mod stats;
pub mod tag;
pub mod user;
pub mod user_auth;
pub mod user_session;
pub mod vote;
pub mod vote_summary;

/// Serializes raw bytes (md5 digests) as standard base64.
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }
}
