//! Demo content for local development, enabled with `SEED_DEMO_DATA=true`.

use anyhow::Context;
use sqlx::PgPool;
use tracing::info;

use crate::auth::{self, password::hash_password};

const DEMO_USERNAME: &str = "demo";
const DEMO_EMAIL: &str = "demo@example.com";
const DEMO_PASSWORD: &str = "demo";

const DEMO_POSTS: &[(&str, &str, &str)] = &[
    (
        "Into the Sun",
        "In hac habitasse platea dictumst. Etiam faucibus cursus urna. Ut tellus.",
        "2020-04-27T13:52:11Z",
    ),
    (
        "They Were Expendable",
        "Curabitur gravida nisi at nibh. In hac habitasse platea dictumst.",
        "2019-09-29T05:00:24Z",
    ),
    (
        "Good Doctor, The",
        "Integer ac leo. Pellentesque ultrices mattis odio. Donec vitae nisi.",
        "2019-10-23T19:13:42Z",
    ),
    (
        "We Always Lie to Strangers",
        "Vestibulum quam sapien, varius ut, blandit non, interdum in, ante.",
        "2020-02-11T08:27:36Z",
    ),
    (
        "Rent: Filmed Live on Broadway",
        "Maecenas ut massa quis augue luctus tincidunt. Nulla mollis molestie lorem.",
        "2020-06-03T21:40:55Z",
    ),
    (
        "Bad Day at Black Rock",
        "Sed sagittis. Nam congue, risus semper porta volutpat, quam pede lobortis ligula.",
        "2019-12-18T02:15:09Z",
    ),
    (
        "Climb, The",
        "Phasellus in felis. Donec semper sapien a libero. Nam dui.",
        "2020-01-30T17:03:48Z",
    ),
    (
        "Ping Pong",
        "Aliquam quis turpis eget elit sodales scelerisque. Mauris sit amet eros.",
        "2020-07-21T11:58:27Z",
    ),
];

/// Creates the demo user and its posts. Does nothing once any post exists.
/// Returns the number of posts inserted.
pub async fn demo_posts(db: &PgPool) -> anyhow::Result<usize> {
    let existing = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM posts")
        .fetch_one(db)
        .await
        .context("count posts")?;
    if existing > 0 {
        info!(existing, "posts present, skipping demo seed");
        return Ok(0);
    }

    let creator_id = match auth::repo::find_by_username(db, DEMO_USERNAME).await? {
        Some(user) => user.id,
        None => {
            let hash = hash_password(DEMO_PASSWORD)?;
            auth::repo::create(db, DEMO_USERNAME, DEMO_EMAIL, &hash).await?.id
        }
    };

    let mut tx = db.begin().await.context("begin tx")?;
    for (title, text, created_at) in DEMO_POSTS {
        sqlx::query(
            "INSERT INTO posts (title, text, creator_id, created_at) \
             VALUES ($1, $2, $3, $4::timestamptz)",
        )
        .bind(title)
        .bind(text)
        .bind(creator_id)
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .context("insert demo post")?;
    }
    tx.commit().await.context("commit tx")?;

    info!(count = DEMO_POSTS.len(), creator_id, "demo posts seeded");
    Ok(DEMO_POSTS.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test]
    async fn seeds_once_under_demo_user(db: PgPool) {
        assert_eq!(demo_posts(&db).await.unwrap(), DEMO_POSTS.len());
        assert_eq!(demo_posts(&db).await.unwrap(), 0);

        let demo = auth::repo::find_by_username(&db, DEMO_USERNAME)
            .await
            .unwrap()
            .unwrap();
        let page = crate::posts::repo::list_page(&db, 50, None).await.unwrap();
        assert_eq!(page.len(), DEMO_POSTS.len());
        assert!(page.iter().all(|p| p.creator_id == demo.id));
        assert_eq!(page[0].title, "Ping Pong");
    }
}
