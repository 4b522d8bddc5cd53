use async_graphql::{ComplexObject, Context, InputObject, SimpleObject};

use crate::auth::repo_types::UserRow;
use crate::session::Session;
use crate::timestamps::to_millis_string;

/// Public view of a user.
#[derive(Debug, Clone, SimpleObject)]
#[graphql(complex)]
pub struct User {
    pub id: i32,
    pub username: String,
    #[graphql(skip)]
    pub email: String,
    pub created_at: String,
    pub updated_at: String,
}

#[ComplexObject]
impl User {
    /// Only visible to the user themselves; everyone else gets an empty string.
    async fn email(&self, ctx: &Context<'_>) -> async_graphql::Result<String> {
        let session = ctx.data::<Session>()?;
        if session.user_id() == Some(self.id) {
            Ok(self.email.clone())
        } else {
            Ok(String::new())
        }
    }
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            username: r.username,
            email: r.email,
            created_at: to_millis_string(r.created_at),
            updated_at: to_millis_string(r.updated_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, SimpleObject)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Outcome of register / login / changePassword: either field errors or a user.
#[derive(Debug, Default, SimpleObject)]
pub struct UserResponse {
    pub errors: Option<Vec<FieldError>>,
    pub user: Option<User>,
}

impl UserResponse {
    pub fn failed(errors: Vec<FieldError>) -> Self {
        Self {
            errors: Some(errors),
            user: None,
        }
    }

    pub fn field_error(field: &str, message: &str) -> Self {
        Self::failed(vec![FieldError::new(field, message)])
    }

    pub fn ok(user: User) -> Self {
        Self {
            errors: None,
            user: Some(user),
        }
    }
}

/// Request body for registration.
#[derive(Debug, Clone, InputObject)]
pub struct UsernamePasswordInput {
    pub username: String,
    pub email: String,
    pub password: String,
}
