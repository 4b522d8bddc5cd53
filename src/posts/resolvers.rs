use async_graphql::{Context, Object, Result};
use tracing::{info, instrument};

use crate::{
    error::IntoGqlResult,
    posts::{
        dto::{PaginatedPosts, Post, PostInput},
        repo,
        services::{clamp_limit, normalize_vote, parse_cursor, validate_post_input},
    },
    session::Session,
    state::AppState,
};

#[derive(Default)]
pub struct PostQuery;

#[Object]
impl PostQuery {
    /// Newest posts first. `cursor` is the `createdAt` of the last post seen.
    #[instrument(skip(self, ctx))]
    async fn posts(
        &self,
        ctx: &Context<'_>,
        limit: i32,
        cursor: Option<String>,
    ) -> Result<PaginatedPosts> {
        let state = ctx.data::<AppState>()?;
        let limit = clamp_limit(limit);
        let cursor = parse_cursor(cursor.as_deref()).gql()?;

        let rows = repo::list_page(&state.db, limit, cursor).await.gql()?;
        let has_more = match rows.last() {
            Some(last) => repo::has_older(&state.db, last.created_at).await.gql()?,
            None => false,
        };

        Ok(PaginatedPosts {
            posts: rows.into_iter().map(Post::from).collect(),
            has_more,
        })
    }

    #[instrument(skip(self, ctx))]
    async fn post(&self, ctx: &Context<'_>, id: i32) -> Result<Option<Post>> {
        let state = ctx.data::<AppState>()?;
        let post = repo::find_by_id(&state.db, id).await.gql()?;
        Ok(post.map(Post::from))
    }
}

#[derive(Default)]
pub struct PostMutation;

#[Object]
impl PostMutation {
    #[instrument(skip(self, ctx, input))]
    async fn create_post(&self, ctx: &Context<'_>, input: PostInput) -> Result<Post> {
        let state = ctx.data::<AppState>()?;
        let user_id = ctx.data::<Session>()?.require_user().gql()?;
        validate_post_input(&input.title, &input.text).gql()?;

        let post = repo::create(&state.db, user_id, &input.title, &input.text)
            .await
            .gql()?;
        info!(user_id, post_id = post.id, "post created");
        Ok(post.into())
    }

    /// Only the creator may edit; anyone else gets null.
    #[instrument(skip(self, ctx, title, text))]
    async fn update_post(
        &self,
        ctx: &Context<'_>,
        id: i32,
        title: String,
        text: String,
    ) -> Result<Option<Post>> {
        let state = ctx.data::<AppState>()?;
        let user_id = ctx.data::<Session>()?.require_user().gql()?;
        validate_post_input(&title, &text).gql()?;

        let post = repo::update_owned(&state.db, id, user_id, &title, &text)
            .await
            .gql()?;
        Ok(post.map(Post::from))
    }

    /// True when the caller's post was deleted.
    #[instrument(skip(self, ctx))]
    async fn delete_post(&self, ctx: &Context<'_>, id: i32) -> Result<bool> {
        let state = ctx.data::<AppState>()?;
        let user_id = ctx.data::<Session>()?.require_user().gql()?;

        let deleted = repo::delete_owned(&state.db, id, user_id).await.gql()?;
        if deleted {
            info!(user_id, post_id = id, "post deleted");
        }
        Ok(deleted)
    }

    #[instrument(skip(self, ctx))]
    async fn vote(&self, ctx: &Context<'_>, post_id: i32, value: i32) -> Result<bool> {
        let state = ctx.data::<AppState>()?;
        let user_id = ctx.data::<Session>()?.require_user().gql()?;

        repo::vote(&state.db, user_id, post_id, normalize_vote(value))
            .await
            .gql()?;
        Ok(true)
    }
}
