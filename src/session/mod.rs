//! Cookie-backed sessions.
//!
//! A [`Session`] is the per-request handle resolvers read and mutate; the
//! [`SessionStore`] loads it from the `Cookie` header before execution and
//! writes changes back (store + `Set-Cookie`) once the response is ready.

mod store;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub use store::SessionStore;

/// What gets persisted under `sess:<id>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionData {
    pub user_id: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionStatus {
    #[default]
    Unchanged,
    Modified,
    Destroyed,
}

#[derive(Debug, Default)]
struct SessionState {
    id: Option<String>,
    user_id: Option<i32>,
    status: SessionStatus,
}

/// Request-scoped session handle, shared between the handler and resolvers.
#[derive(Debug, Clone, Default)]
pub struct Session(Arc<Mutex<SessionState>>);

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn restored(id: String, data: SessionData) -> Self {
        Self(Arc::new(Mutex::new(SessionState {
            id: Some(id),
            user_id: Some(data.user_id),
            status: SessionStatus::Unchanged,
        })))
    }

    pub fn id(&self) -> Option<String> {
        self.0.lock().id.clone()
    }

    pub fn user_id(&self) -> Option<i32> {
        self.0.lock().user_id
    }

    pub fn require_user(&self) -> Result<i32, AppError> {
        self.user_id().ok_or(AppError::Unauthenticated)
    }

    pub fn status(&self) -> SessionStatus {
        self.0.lock().status
    }

    /// Bind the session to `user_id`; persisted on commit.
    pub fn login(&self, user_id: i32) {
        let mut state = self.0.lock();
        state.user_id = Some(user_id);
        state.status = SessionStatus::Modified;
    }

    fn mark_destroyed(&self) -> Option<String> {
        let mut state = self.0.lock();
        state.user_id = None;
        state.status = SessionStatus::Destroyed;
        state.id.take()
    }

    fn assign_id(&self, id: String) {
        self.0.lock().id = Some(id);
    }
}
