//! GraphQL schema assembly and the HTTP entry point.

pub mod loaders;

use async_graphql::{
    http::{playground_source, GraphQLPlaygroundConfig},
    BatchRequest, EmptySubscription, MergedObject, Object, Schema,
};
use async_graphql_axum::{rejection::GraphQLRejection, GraphQLBatchRequest, GraphQLResponse};
use axum::{
    extract::{Extension, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};
use tracing::error;

use crate::{
    auth::resolvers::{UserMutation, UserQuery},
    posts::resolvers::{PostMutation, PostQuery},
    state::AppState,
};

#[derive(Default)]
pub struct HelloQuery;

#[Object]
impl HelloQuery {
    async fn hello(&self) -> &'static str {
        "hello world"
    }
}

#[derive(MergedObject, Default)]
pub struct QueryRoot(HelloQuery, PostQuery, UserQuery);

#[derive(MergedObject, Default)]
pub struct MutationRoot(PostMutation, UserMutation);

pub type AppSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub fn build_schema(state: AppState) -> AppSchema {
    Schema::build(QueryRoot::default(), MutationRoot::default(), EmptySubscription)
        .data(state)
        .finish()
}

/// POST /graphql
pub async fn graphql_handler(
    State(state): State<AppState>,
    Extension(schema): Extension<AppSchema>,
    headers: HeaderMap,
    request: GraphQLBatchRequest,
) -> Response {
    execute(&state, &schema, &headers, request.into_inner()).await
}

/// GET /graphql: a query string is executed like a POST body. Without one
/// the playground is served in debug builds.
pub async fn graphql_get(
    State(state): State<AppState>,
    Extension(schema): Extension<AppSchema>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    request: Result<GraphQLBatchRequest, GraphQLRejection>,
) -> Response {
    match (query, request) {
        (None, _) => graphql_playground().await,
        (Some(_), Ok(request)) => execute(&state, &schema, &headers, request.into_inner()).await,
        (Some(_), Err(rejection)) => rejection.into_response(),
    }
}

/// Loads the session, attaches it together with fresh loaders to every
/// operation, executes, then commits session changes into `Set-Cookie`.
async fn execute(
    state: &AppState,
    schema: &AppSchema,
    headers: &HeaderMap,
    batch: BatchRequest,
) -> Response {
    let session = state.sessions.load(headers).await;
    let attach = |request: async_graphql::Request| {
        let (users, updoots) = loaders::request_loaders(&state.db);
        request.data(session.clone()).data(users).data(updoots)
    };
    let batch = match batch {
        BatchRequest::Single(request) => BatchRequest::Single(attach(request)),
        BatchRequest::Batch(requests) => {
            BatchRequest::Batch(requests.into_iter().map(attach).collect())
        }
    };

    let mut response = GraphQLResponse::from(schema.execute_batch(batch).await).into_response();
    match state.sessions.commit(&session).await {
        Ok(Some(cookie)) => {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = ?e, "session commit failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "session store unavailable").into_response();
        }
    }
    response
}

/// Playground in debug builds only.
pub async fn graphql_playground() -> Response {
    if cfg!(debug_assertions) {
        Html(playground_source(GraphQLPlaygroundConfig::new("/graphql"))).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}
