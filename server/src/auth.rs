// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::database;
use crate::errors::{AppError, TaskError};
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::User;

/// Header carrying the id of the signed-in user.
pub const USER_HEADER: &str = "x-user-id";

/// The authenticated caller, resolved from `x-user-id` against the users table.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn id(&self) -> i64 {
        self.0.id
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .ok_or(TaskError::NotAuthenticated)?;

        let user = database::find_user(&state.pool, user_id)
            .await?
            .ok_or(TaskError::NotAuthenticated)?;

        Ok(CurrentUser(user))
    }
}
