use async_graphql::{Context, Object, Result};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{User, UserResponse, UsernamePasswordInput},
        password::{hash_password, verify_password},
        repo,
        services::{
            forget_password_key, normalize_email, send_reset_email, validate_password,
            validate_register, FORGET_PASSWORD_TTL_SECS,
        },
    },
    error::{AppError, IntoGqlResult},
    session::Session,
    state::AppState,
};

#[derive(Default)]
pub struct UserQuery;

#[Object]
impl UserQuery {
    /// The logged-in user, or null.
    #[instrument(skip(self, ctx))]
    async fn me(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        let session = ctx.data::<Session>()?;
        let Some(user_id) = session.user_id() else {
            return Ok(None);
        };
        let state = ctx.data::<AppState>()?;
        let user = repo::find_by_id(&state.db, user_id).await.gql()?;
        Ok(user.map(User::from))
    }
}

#[derive(Default)]
pub struct UserMutation;

#[Object]
impl UserMutation {
    #[instrument(skip(self, ctx, options), fields(username = %options.username))]
    async fn register(
        &self,
        ctx: &Context<'_>,
        options: UsernamePasswordInput,
    ) -> Result<UserResponse> {
        let state = ctx.data::<AppState>()?;
        let session = ctx.data::<Session>()?;

        let errors = validate_register(&options);
        if !errors.is_empty() {
            warn!(count = errors.len(), "registration rejected");
            return Ok(UserResponse::failed(errors));
        }

        let hash = hash_password(&options.password).gql()?;
        let email = normalize_email(&options.email);

        match repo::create(&state.db, &options.username, &email, &hash).await {
            Ok(user) => {
                session.login(user.id);
                info!(user_id = user.id, "user registered");
                Ok(UserResponse::ok(user.into()))
            }
            Err(e) => match e.unique_violation().map(str::to_owned).as_deref() {
                Some("users_email_key") => {
                    Ok(UserResponse::field_error("email", "email already taken"))
                }
                Some(_) => Ok(UserResponse::field_error(
                    "username",
                    "username already taken",
                )),
                None => Err(e).gql(),
            },
        }
    }

    #[instrument(skip(self, ctx, password))]
    async fn login(
        &self,
        ctx: &Context<'_>,
        username_or_email: String,
        password: String,
    ) -> Result<UserResponse> {
        let state = ctx.data::<AppState>()?;
        let session = ctx.data::<Session>()?;

        let lookup = if username_or_email.contains('@') {
            repo::find_by_email(&state.db, &normalize_email(&username_or_email)).await
        } else {
            repo::find_by_username(&state.db, &username_or_email).await
        };
        let found = lookup.gql()?;

        let Some(user) = found else {
            warn!("login unknown user");
            return Ok(UserResponse::field_error(
                "usernameOrEmail",
                "that username doesn't exist",
            ));
        };

        if !verify_password(&password, &user.password_hash).gql()? {
            warn!(user_id = user.id, "login invalid password");
            return Ok(UserResponse::field_error("password", "incorrect password"));
        }

        session.login(user.id);
        info!(user_id = user.id, "user logged in");
        Ok(UserResponse::ok(user.into()))
    }

    /// Ends the session. False when the session store could not be updated.
    #[instrument(skip(self, ctx))]
    async fn logout(&self, ctx: &Context<'_>) -> Result<bool> {
        let state = ctx.data::<AppState>()?;
        let session = ctx.data::<Session>()?;
        let user_id = session.user_id();
        match state.sessions.destroy(session).await {
            Ok(()) => {
                info!(?user_id, "user logged out");
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "session destroy failed");
                Ok(false)
            }
        }
    }

    /// Always true, whether or not the address belongs to an account.
    #[instrument(skip(self, ctx, email))]
    async fn forgot_password(&self, ctx: &Context<'_>, email: String) -> Result<bool> {
        let state = ctx.data::<AppState>()?;

        let Some(user) = repo::find_by_email(&state.db, &normalize_email(&email))
            .await
            .gql()?
        else {
            return Ok(true);
        };

        let token = Uuid::new_v4().to_string();
        state
            .kv
            .set_ex(
                &forget_password_key(&token),
                &user.id.to_string(),
                FORGET_PASSWORD_TTL_SECS,
            )
            .await
            .map_err(AppError::Internal)
            .gql()?;

        send_reset_email(
            state.mailer.as_ref(),
            &state.config.frontend_url,
            &user.email,
            &token,
        )
        .await
        .map_err(AppError::Internal)
        .gql()?;

        info!(user_id = user.id, "password reset requested");
        Ok(true)
    }

    #[instrument(skip(self, ctx, token, new_password))]
    async fn change_password(
        &self,
        ctx: &Context<'_>,
        token: String,
        new_password: String,
    ) -> Result<UserResponse> {
        let state = ctx.data::<AppState>()?;
        let session = ctx.data::<Session>()?;

        if let Some(error) = validate_password("newPassword", &new_password) {
            return Ok(UserResponse::failed(vec![error]));
        }

        let key = forget_password_key(&token);
        let stored = state.kv.get(&key).await.map_err(AppError::Internal).gql()?;
        let Some(user_id) = stored.and_then(|v| v.parse::<i32>().ok()) else {
            return Ok(UserResponse::field_error("token", "token expired"));
        };

        let hash = hash_password(&new_password).gql()?;
        let Some(user) = repo::update_password(&state.db, user_id, &hash)
            .await
            .gql()?
        else {
            return Ok(UserResponse::field_error("token", "user no longer exists"));
        };

        state.kv.del(&key).await.map_err(AppError::Internal).gql()?;

        session.login(user.id);
        info!(user_id = user.id, "password changed");
        Ok(UserResponse::ok(user.into()))
    }
}
