use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use tracing::debug;

use crate::error::AppError;
use crate::posts::repo_types::{PostRow, UpdootRow};
use crate::posts::services::{plan_vote, VotePlan};

const POST_COLUMNS: &str = "id, title, text, points, creator_id, created_at, updated_at";

/// Newest first, strictly older than `cursor` when given.
///
/// Returns the first `limit` rows plus any further rows sharing the last
/// row's `created_at`, so a page never splits a group of equal timestamps and
/// the next cursor cannot skip one.
pub async fn list_page(
    db: &PgPool,
    limit: i64,
    cursor: Option<OffsetDateTime>,
) -> Result<Vec<PostRow>, AppError> {
    let rows = sqlx::query_as::<_, PostRow>(&format!(
        r#"
        WITH page AS (
            SELECT created_at
              FROM posts
             WHERE ($2::timestamptz IS NULL OR created_at < $2)
             ORDER BY created_at DESC
             LIMIT $1
        )
        SELECT {POST_COLUMNS}
          FROM posts
         WHERE ($2::timestamptz IS NULL OR created_at < $2)
           AND created_at >= (SELECT min(created_at) FROM page)
         ORDER BY created_at DESC, id DESC
        "#
    ))
    .bind(limit)
    .bind(cursor)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Whether any post is strictly older than `before`.
pub async fn has_older(db: &PgPool, before: OffsetDateTime) -> Result<bool, AppError> {
    let more = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM posts WHERE created_at < $1)",
    )
    .bind(before)
    .fetch_one(db)
    .await?;
    Ok(more)
}

pub async fn find_by_id(db: &PgPool, id: i32) -> Result<Option<PostRow>, AppError> {
    let post = sqlx::query_as::<_, PostRow>(&format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(post)
}

pub async fn create(
    db: &PgPool,
    creator_id: i32,
    title: &str,
    text: &str,
) -> Result<PostRow, AppError> {
    let post = sqlx::query_as::<_, PostRow>(&format!(
        r#"
        INSERT INTO posts (title, text, creator_id)
        VALUES ($1, $2, $3)
        RETURNING {POST_COLUMNS}
        "#
    ))
    .bind(title)
    .bind(text)
    .bind(creator_id)
    .fetch_one(db)
    .await?;
    Ok(post)
}

/// Update a post owned by `creator_id`. `None` when it does not exist or is
/// someone else's.
pub async fn update_owned(
    db: &PgPool,
    id: i32,
    creator_id: i32,
    title: &str,
    text: &str,
) -> Result<Option<PostRow>, AppError> {
    let post = sqlx::query_as::<_, PostRow>(&format!(
        r#"
        UPDATE posts
           SET title = $3, text = $4, updated_at = now()
         WHERE id = $1 AND creator_id = $2
        RETURNING {POST_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(creator_id)
    .bind(title)
    .bind(text)
    .fetch_optional(db)
    .await?;
    Ok(post)
}

/// Delete a post owned by `creator_id`; its updoots go with it.
pub async fn delete_owned(db: &PgPool, id: i32, creator_id: i32) -> Result<bool, AppError> {
    let res = sqlx::query("DELETE FROM posts WHERE id = $1 AND creator_id = $2")
        .bind(id)
        .bind(creator_id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Batch lookup of `(post_id, user_id)` pairs used by the updoot loader.
pub async fn find_updoots(
    db: &PgPool,
    pairs: &[(i32, i32)],
) -> Result<Vec<UpdootRow>, sqlx::Error> {
    let (post_ids, user_ids): (Vec<i32>, Vec<i32>) = pairs.iter().copied().unzip();
    sqlx::query_as::<_, UpdootRow>(
        r#"
        SELECT u.user_id, u.post_id, u.value
          FROM updoots u
          JOIN UNNEST($1::int4[], $2::int4[]) AS k(post_id, user_id)
            ON u.post_id = k.post_id AND u.user_id = k.user_id
        "#,
    )
    .bind(post_ids)
    .bind(user_ids)
    .fetch_all(db)
    .await
}

/// Record `value` as `user_id`'s vote on `post_id` and keep `points` in step,
/// in one transaction. The post row lock serialises concurrent votes on the
/// same post.
pub async fn vote(db: &PgPool, user_id: i32, post_id: i32, value: i32) -> Result<VotePlan, AppError> {
    let mut tx = db.begin().await.context("begin tx")?;

    let locked = sqlx::query_scalar::<_, i32>("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await?;
    if locked.is_none() {
        return Err(AppError::NotFound("post"));
    }

    let existing = sqlx::query_scalar::<_, i32>(
        "SELECT value FROM updoots WHERE user_id = $1 AND post_id = $2",
    )
    .bind(user_id)
    .bind(post_id)
    .fetch_optional(&mut *tx)
    .await?;

    let plan = plan_vote(existing, value);
    match plan {
        VotePlan::Insert { value, delta } => {
            sqlx::query("INSERT INTO updoots (user_id, post_id, value) VALUES ($1, $2, $3)")
                .bind(user_id)
                .bind(post_id)
                .bind(value)
                .execute(&mut *tx)
                .await?;
            add_points(&mut tx, post_id, delta).await?;
        }
        VotePlan::Flip { value, delta } => {
            sqlx::query("UPDATE updoots SET value = $3 WHERE user_id = $1 AND post_id = $2")
                .bind(user_id)
                .bind(post_id)
                .bind(value)
                .execute(&mut *tx)
                .await?;
            add_points(&mut tx, post_id, delta).await?;
        }
        VotePlan::Unchanged => {}
    }

    tx.commit().await.context("commit tx")?;
    debug!(user_id, post_id, ?plan, "vote applied");
    Ok(plan)
}

async fn add_points(
    tx: &mut Transaction<'_, Postgres>,
    post_id: i32,
    delta: i32,
) -> Result<(), AppError> {
    sqlx::query("UPDATE posts SET points = points + $2 WHERE id = $1")
        .bind(post_id)
        .bind(delta)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamps::{parse_millis, to_millis_string};

    async fn user(db: &PgPool, name: &str) -> i32 {
        crate::auth::repo::create(db, name, &format!("{name}@example.com"), "hash")
            .await
            .unwrap()
            .id
    }

    async fn post_at(db: &PgPool, creator_id: i32, title: &str, created_at: &str) -> i32 {
        sqlx::query_scalar::<_, i32>(
            "INSERT INTO posts (title, text, creator_id, created_at) \
             VALUES ($1, 'body', $2, $3::timestamptz) RETURNING id",
        )
        .bind(title)
        .bind(creator_id)
        .bind(created_at)
        .fetch_one(db)
        .await
        .unwrap()
    }

    async fn points_and_sum(db: &PgPool, post_id: i32) -> (i32, i64) {
        sqlx::query_as::<_, (i32, i64)>(
            "SELECT p.points, COALESCE(SUM(u.value), 0)::int8 \
               FROM posts p LEFT JOIN updoots u ON u.post_id = p.id \
              WHERE p.id = $1 GROUP BY p.points",
        )
        .bind(post_id)
        .fetch_one(db)
        .await
        .unwrap()
    }

    fn titles(rows: &[PostRow]) -> Vec<&str> {
        rows.iter().map(|r| r.title.as_str()).collect()
    }

    #[sqlx::test]
    async fn vote_inserts_flips_and_ignores_repeats(db: PgPool) {
        let alice = user(&db, "alice").await;
        let post = create(&db, alice, "hello", "world").await.unwrap().id;

        assert_eq!(
            vote(&db, alice, post, 1).await.unwrap(),
            VotePlan::Insert { value: 1, delta: 1 }
        );
        assert_eq!(points_and_sum(&db, post).await, (1, 1));

        assert_eq!(vote(&db, alice, post, 1).await.unwrap(), VotePlan::Unchanged);
        assert_eq!(points_and_sum(&db, post).await, (1, 1));

        assert_eq!(
            vote(&db, alice, post, -1).await.unwrap(),
            VotePlan::Flip { value: -1, delta: -2 }
        );
        assert_eq!(points_and_sum(&db, post).await, (-1, -1));
    }

    #[sqlx::test]
    async fn vote_on_missing_post_is_not_found(db: PgPool) {
        let alice = user(&db, "alice").await;
        let err = vote(&db, alice, 4242, 1).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");

        let count = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM updoots")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[sqlx::test]
    async fn concurrent_votes_keep_points_equal_to_vote_sum(db: PgPool) {
        let owner = user(&db, "owner").await;
        let post = create(&db, owner, "busy", "post").await.unwrap().id;
        let mut voters = Vec::new();
        for i in 0..20 {
            voters.push(user(&db, &format!("voter{i}")).await);
        }

        // Everyone votes, then every third voter changes their mind, all at once.
        let mut tasks = Vec::new();
        for (i, &voter) in voters.iter().enumerate() {
            let db = db.clone();
            let first = if i % 2 == 0 { 1 } else { -1 };
            tasks.push(tokio::spawn(async move {
                vote(&db, voter, post, first).await.unwrap();
                if i % 3 == 0 {
                    vote(&db, voter, post, -first).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let (points, sum) = points_and_sum(&db, post).await;
        assert_eq!(i64::from(points), sum);
    }

    #[sqlx::test]
    async fn pages_do_not_skip_posts_within_one_millisecond(db: PgPool) {
        let alice = user(&db, "alice").await;
        post_at(&db, alice, "A", "2020-01-01T00:00:00.456900Z").await;
        post_at(&db, alice, "B", "2020-01-01T00:00:00.456100Z").await;
        post_at(&db, alice, "C", "2019-06-01T00:00:00Z").await;

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = list_page(&db, 1, cursor).await.unwrap();
            let Some(last) = page.last() else { break };
            cursor = parse_millis(&to_millis_string(last.created_at));
            seen.extend(page.iter().map(|r| r.title.clone()));
        }
        assert_eq!(seen, vec!["A", "B", "C"]);
    }

    #[sqlx::test]
    async fn page_keeps_equal_timestamps_together(db: PgPool) {
        let alice = user(&db, "alice").await;
        post_at(&db, alice, "first", "2020-01-01T00:00:00.456Z").await;
        post_at(&db, alice, "second", "2020-01-01T00:00:00.456Z").await;
        post_at(&db, alice, "older", "2019-06-01T00:00:00Z").await;

        let page = list_page(&db, 1, None).await.unwrap();
        assert_eq!(titles(&page), vec!["second", "first"]);
        let last = page.last().unwrap().created_at;
        assert_eq!(to_millis_string(last), "1577836800456");
        assert!(has_older(&db, last).await.unwrap());

        let cursor = parse_millis(&to_millis_string(last));
        let page = list_page(&db, 5, cursor).await.unwrap();
        assert_eq!(titles(&page), vec!["older"]);
        assert!(!has_older(&db, page[0].created_at).await.unwrap());

        assert!(list_page(&db, 5, parse_millis("0")).await.unwrap().is_empty());
    }

    #[sqlx::test]
    async fn updates_and_deletes_are_owner_scoped(db: PgPool) {
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;
        let post = create(&db, alice, "mine", "text").await.unwrap().id;
        vote(&db, bob, post, 1).await.unwrap();

        assert!(update_owned(&db, post, bob, "x", "y").await.unwrap().is_none());
        let updated = update_owned(&db, post, alice, "new", "body").await.unwrap().unwrap();
        assert_eq!(updated.title, "new");

        assert!(!delete_owned(&db, post, bob).await.unwrap());
        assert!(delete_owned(&db, post, alice).await.unwrap());
        assert!(find_by_id(&db, post).await.unwrap().is_none());
        assert!(find_updoots(&db, &[(post, bob)]).await.unwrap().is_empty());
    }
}
