//! In-process session store for single-node deployments and tests.

use anyhow::Result;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

use super::{SessionData, SessionKey, SessionStore};
use crate::BoxFuture;

struct Entry {
    data: SessionData,
    expires_at: Instant,
}

#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<SessionKey, Entry>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.len()
    }
}

impl SessionStore for MemorySessionStore {
    fn load<'a>(&'a self, key: &'a SessionKey) -> BoxFuture<'a, Result<Option<SessionData>>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let now = Instant::now();
            entries.retain(|_, entry| entry.expires_at > now);
            Ok(entries.get(key).map(|entry| entry.data.clone()))
        })
    }

    fn save<'a>(
        &'a self,
        key: &'a SessionKey,
        data: &'a SessionData,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            entries.insert(
                key.clone(),
                Entry {
                    data: data.clone(),
                    expires_at: Instant::now() + ttl,
                },
            );
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a SessionKey) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.entries.lock().await.remove(key);
            Ok(())
        })
    }
}
