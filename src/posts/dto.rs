use async_graphql::{
    dataloader::{DataLoader, HashMapCache},
    ComplexObject, Context, InputObject, SimpleObject,
};

use crate::auth::dto::User;
use crate::error::{AppError, IntoGqlResult};
use crate::graphql::loaders::{UpdootKey, UpdootLoader, UserLoader};
use crate::posts::repo_types::PostRow;
use crate::posts::services::text_snippet;
use crate::session::Session;
use crate::timestamps::to_millis_string;

#[derive(Debug, Clone, SimpleObject)]
#[graphql(complex)]
pub struct Post {
    pub id: i32,
    pub title: String,
    pub text: String,
    pub points: i32,
    pub creator_id: i32,
    pub created_at: String,
    pub updated_at: String,
}

#[ComplexObject]
impl Post {
    /// First 50 characters of the body.
    async fn text_snippet(&self) -> String {
        text_snippet(&self.text)
    }

    async fn creator(&self, ctx: &Context<'_>) -> async_graphql::Result<User> {
        let loader = ctx.data::<DataLoader<UserLoader, HashMapCache>>()?;
        let user = loader
            .load_one(self.creator_id)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("load creator: {e}")))
            .gql()?;
        user.ok_or(AppError::NotFound("user")).gql()
    }

    /// The current user's vote on this post: 1, -1, or null.
    async fn vote_status(&self, ctx: &Context<'_>) -> async_graphql::Result<Option<i32>> {
        let Some(user_id) = ctx.data::<Session>()?.user_id() else {
            return Ok(None);
        };
        let loader = ctx.data::<DataLoader<UpdootLoader, HashMapCache>>()?;
        loader
            .load_one(UpdootKey {
                post_id: self.id,
                user_id,
            })
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("load vote status: {e}")))
            .gql()
    }
}

impl From<PostRow> for Post {
    fn from(r: PostRow) -> Self {
        Self {
            id: r.id,
            title: r.title,
            text: r.text,
            points: r.points,
            creator_id: r.creator_id,
            created_at: to_millis_string(r.created_at),
            updated_at: to_millis_string(r.updated_at),
        }
    }
}

#[derive(Debug, SimpleObject)]
pub struct PaginatedPosts {
    pub posts: Vec<Post>,
    pub has_more: bool,
}

#[derive(Debug, Clone, InputObject)]
pub struct PostInput {
    pub title: String,
    pub text: String,
}
