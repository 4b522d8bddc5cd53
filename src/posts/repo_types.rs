use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    pub id: i32,
    pub title: String,
    pub text: String,
    pub points: i32,
    pub creator_id: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// One user's vote on one post.
#[derive(Debug, Clone, Copy, FromRow, PartialEq, Eq)]
pub struct UpdootRow {
    pub user_id: i32,
    pub post_id: i32,
    pub value: i32,
}
