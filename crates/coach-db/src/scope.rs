// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::path::PathBuf;

use coach_app::CoachResult;
use tracing::{debug, warn};

use crate::Store;

/// A database handle that lives for one request at most.
///
/// The first [`acquire`](Self::acquire) opens the store and runs
/// [`Store::ensure_ready`]; later calls in the same scope reuse that handle.
/// The handle is closed on [`release`](Self::release) or when the scope drops,
/// whichever comes first.
pub struct RequestScope {
    path: PathBuf,
    store: Option<Store>,
}

impl RequestScope {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            store: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.store.is_some()
    }

    pub fn acquire(&mut self) -> CoachResult<&Store> {
        let store = match self.store.take() {
            Some(store) => store,
            None => {
                let store = Store::open(&self.path)?;
                store.ensure_ready()?;
                store
            }
        };
        Ok(self.store.insert(store))
    }

    pub fn release(&mut self) {
        let Some(store) = self.store.take() else {
            return;
        };
        match store.close() {
            Ok(()) => debug!(path = %self.path.display(), "database connection closed"),
            Err(error) => warn!(
                path = %self.path.display(),
                error = %error,
                "database connection did not close cleanly"
            ),
        }
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.release();
    }
}
