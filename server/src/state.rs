// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::daily::TriggerPolicy;
use crate::events::ChangeFeed;
use crate::storage::BlobStore;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared handles passed to every handler and background job.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub storage: Arc<BlobStore>,
    pub changes: ChangeFeed,
    pub daily_trigger: TriggerPolicy,
}

impl AppState {
    pub fn new(pool: SqlitePool, storage: BlobStore) -> Self {
        Self {
            pool,
            storage: Arc::new(storage),
            changes: ChangeFeed::default(),
            daily_trigger: TriggerPolicy::default(),
        }
    }

    pub fn with_daily_trigger(mut self, policy: TriggerPolicy) -> Self {
        self.daily_trigger = policy;
        self
    }
}
