use serde::{Deserialize, Serialize};

use crate::database::TermDescriptor;
use crate::diff::manager::DiffPayload;
use crate::diff::Tree;

/// Query string of `GET /courses`. `since` stays a string so that a
/// malformed value surfaces as an envelope error rather than an axum
/// rejection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursesQuery {
    #[serde(default)]
    pub scraper: Option<String>,
    #[serde(default)]
    pub current_term: Option<String>,
    #[serde(default)]
    pub requested_term: Option<String>,
    #[serde(default)]
    pub since: Option<String>,
}

/// Success envelope of `GET /courses`. `courses` is the full snapshot when
/// `full` is set and a diff otherwise; `until` is the age to pass back as
/// `since` on the next poll.
#[derive(Debug, Serialize)]
pub struct CoursesResponse {
    pub error: Option<String>,
    pub courses: DiffPayload,
    pub until: i64,
    pub full: bool,
    pub term: TermDescriptor,
}

/// Success envelope of `POST /courses`.
#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub error: Option<String>,
}

/// A validated `POST /courses` body.
#[derive(Debug, Clone)]
pub struct CoursesUpdate {
    pub scraper: String,
    pub term: TermDescriptor,
    pub courses: Tree,
}
