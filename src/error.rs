use async_graphql::ErrorExtensions;
use tracing::error;

/// Failures surfaced by resolvers and repositories.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "UNAUTHENTICATED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_USER_INPUT",
            AppError::Database(_) | AppError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Postgres unique violation, with the constraint that fired.
    pub fn unique_violation(&self) -> Option<&str> {
        match self {
            AppError::Database(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => {
                Some(db.constraint().unwrap_or_default())
            }
            _ => None,
        }
    }
}

impl ErrorExtensions for AppError {
    fn extend(&self) -> async_graphql::Error {
        let message = match self {
            AppError::Database(e) => {
                error!(error = %e, "database error");
                "internal server error".to_string()
            }
            AppError::Internal(e) => {
                error!(error = ?e, "internal error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        async_graphql::Error::new(message).extend_with(|_, ext| ext.set("code", self.code()))
    }
}

/// Shorthand used at the resolver boundary.
pub trait IntoGqlResult<T> {
    fn gql(self) -> async_graphql::Result<T>;
}

impl<T> IntoGqlResult<T> for Result<T, AppError> {
    fn gql(self) -> async_graphql::Result<T> {
        self.map_err(|e| e.extend())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_variants() {
        assert_eq!(AppError::Unauthenticated.code(), "UNAUTHENTICATED");
        assert_eq!(AppError::NotFound("post").code(), "NOT_FOUND");
        assert_eq!(AppError::BadRequest("x".into()).code(), "BAD_USER_INPUT");
        assert_eq!(
            AppError::Internal(anyhow::anyhow!("boom")).code(),
            "INTERNAL_SERVER_ERROR"
        );
    }

    #[test]
    fn internal_detail_is_hidden() {
        let err = AppError::Internal(anyhow::anyhow!("redis exploded")).extend();
        assert_eq!(err.message, "internal server error");
    }

    #[test]
    fn not_found_message_names_the_entity() {
        let err = AppError::NotFound("post")
            .extend()
            .into_server_error(async_graphql::Pos { line: 1, column: 1 });
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["message"], "post not found");
        assert_eq!(json["extensions"]["code"], "NOT_FOUND");
    }

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert!(AppError::NotFound("user").unique_violation().is_none());
    }
}
