use time::OffsetDateTime;

use crate::error::AppError;
use crate::timestamps::parse_millis;

pub const MAX_PAGE_SIZE: i64 = 50;
const SNIPPET_CHARS: usize = 50;

/// Page size actually served for a requested `limit`.
pub fn clamp_limit(limit: i32) -> i64 {
    i64::from(limit).clamp(1, MAX_PAGE_SIZE)
}

pub fn parse_cursor(cursor: Option<&str>) -> Result<Option<OffsetDateTime>, AppError> {
    match cursor {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_millis(raw)
            .map(Some)
            .ok_or_else(|| AppError::BadRequest("invalid cursor".into())),
    }
}

pub fn text_snippet(text: &str) -> String {
    text.chars().take(SNIPPET_CHARS).collect()
}

pub fn validate_post_input(title: &str, text: &str) -> Result<(), AppError> {
    if title.trim().is_empty() {
        return Err(AppError::BadRequest("title must not be empty".into()));
    }
    if text.trim().is_empty() {
        return Err(AppError::BadRequest("text must not be empty".into()));
    }
    Ok(())
}

/// Votes are stored as +1 / -1; anything other than -1 counts as an upvote.
pub fn normalize_vote(value: i32) -> i32 {
    if value == -1 {
        -1
    } else {
        1
    }
}

/// What a vote does to the updoot row and the post's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VotePlan {
    Insert { value: i32, delta: i32 },
    Flip { value: i32, delta: i32 },
    Unchanged,
}

pub fn plan_vote(existing: Option<i32>, value: i32) -> VotePlan {
    match existing {
        None => VotePlan::Insert {
            value,
            delta: value,
        },
        Some(prev) if prev != value => VotePlan::Flip {
            value,
            delta: 2 * value,
        },
        Some(_) => VotePlan::Unchanged,
    }
}
