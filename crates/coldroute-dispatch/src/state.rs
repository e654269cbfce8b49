//! Shared state for the dispatch process.
//!
//! Cheaply cloneable (Arc inside); the store handle and the immutable
//! planner configuration are shared by the submitting side and the worker
//! pool.

use std::path::Path;
use std::sync::Arc;

use coldroute_lib::{PlannerConfig, Result, Store};

/// Shared dispatch state.
#[derive(Clone)]
pub struct DispatchState {
    inner: Arc<Inner>,
}

struct Inner {
    store: Store,
    config: PlannerConfig,
}

impl DispatchState {
    /// Open the store at `db_path` and wrap it with the given configuration.
    pub fn open(db_path: impl AsRef<Path>, config: PlannerConfig) -> Result<Self> {
        config.validate()?;
        let store = Store::open(db_path.as_ref())?;
        Ok(Self::from_parts(store, config))
    }

    /// Build state from pre-opened components (used by tests).
    pub fn from_parts(store: Store, config: PlannerConfig) -> Self {
        Self {
            inner: Arc::new(Inner { store, config }),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for DispatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchState")
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_store() {
        let state = DispatchState::from_parts(
            Store::open_in_memory().unwrap(),
            PlannerConfig::default(),
        );
        let clone = state.clone();

        assert_eq!(
            state.store().snapshot_counts().unwrap(),
            clone.store().snapshot_counts().unwrap()
        );
        assert_eq!(state.config(), clone.config());
    }
}
