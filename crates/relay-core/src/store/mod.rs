//! Flat-file persistent stores.
//!
//! Every store wraps one JSON document and one async mutex. Each public store
//! operation takes the mutex for its whole load/modify/save cycle, so two
//! concurrent mutators of the same document never interleave. There is no
//! transaction spanning two stores.

use std::{marker::PhantomData, path::PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

use crate::{config::Config, errors::Error, Result};

pub mod bindings;
pub mod policy_config;
pub mod routes;
pub mod seen;

pub use bindings::{Binding, BindingStore};
pub use policy_config::{ConfigStore, PolicyConfig};
pub use routes::ThreadRouter;
pub use seen::{SeenProfile, SeenRegistry};

/// A JSON document on disk guarded by its own lock.
///
/// A missing or blank file reads as `T::default()`, which is written back so
/// the file exists after first use.
pub(crate) struct JsonDocument<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _doc: PhantomData,
        }
    }

    /// Read the document under the lock.
    pub(crate) async fn read(&self) -> Result<T> {
        let _guard = self.lock.lock().await;
        self.load_or_bootstrap().await
    }

    /// Read, apply `f`, then persist, all under one critical section.
    pub(crate) async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load_or_bootstrap().await?;
        let out = f(&mut doc);
        self.write(&doc).await?;
        Ok(out)
    }

    /// Like `update`, but the closure may refuse the change; nothing is written
    /// on error.
    pub(crate) async fn try_update<R>(&self, f: impl FnOnce(&mut T) -> Result<R>) -> Result<R> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load_or_bootstrap().await?;
        let out = f(&mut doc)?;
        self.write(&doc).await?;
        Ok(out)
    }

    /// Overwrite the document.
    pub(crate) async fn replace(&self, doc: &T) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.write(doc).await
    }

    async fn load_or_bootstrap(&self) -> Result<T> {
        let txt = match tokio::fs::read_to_string(&self.path).await {
            Ok(txt) => txt,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(Error::Io(e)),
        };

        if txt.trim().is_empty() {
            tracing::info!(path = %self.path.display(), "bootstrapping store with defaults");
            let doc = T::default();
            self.write(&doc).await?;
            return Ok(doc);
        }

        serde_json::from_str(&txt).map_err(|e| Error::Document {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    async fn write(&self, doc: &T) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let txt = serde_json::to_string_pretty(doc)?;
        // Write-then-rename: readers never observe a half-written document.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, txt).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// All persistent stores of the relay, opened from one data directory.
pub struct Stores {
    pub config: ConfigStore,
    pub bindings: BindingStore,
    pub routes: ThreadRouter,
    pub seen: SeenRegistry,
}

impl Stores {
    pub fn open(cfg: &Config) -> Self {
        Self {
            config: ConfigStore::new(cfg.config_file()),
            bindings: BindingStore::new(cfg.mappings_file()),
            routes: ThreadRouter::new(cfg.threads_file()),
            seen: SeenRegistry::new(cfg.seen_file()),
        }
    }

    /// Make sure every document exists on disk.
    pub async fn ensure_files(&self) -> Result<()> {
        self.config.load().await?;
        self.bindings.list_all().await?;
        self.routes.len().await?;
        self.seen.len().await?;
        Ok(())
    }
}
