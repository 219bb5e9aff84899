//! Unique application names
//!
//! Owned by process bootstrap and handed to every [`AppClient`](crate::AppClient).
//! A name is released when its client is dropped.

use crate::error::{AppError, AppResult};
use dashmap::DashSet;
use std::sync::Arc;
use tracing::debug;

/// Shared set of registered application names
#[derive(Debug, Clone, Default)]
pub struct AppRegistry {
    names: Arc<DashSet<String>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name`; fails if it is already taken
    pub fn register(&self, name: &str) -> AppResult<()> {
        if !self.names.insert(name.to_string()) {
            return Err(AppError::DuplicateName(name.to_string()));
        }
        debug!("Registered application {}", name);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.names.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
