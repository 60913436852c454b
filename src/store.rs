#[cfg(test)]
use std::collections::BTreeMap;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::fs;
#[cfg(test)]
use tokio::sync::Mutex;

use crate::{
    accumulator::state::StateDocument,
    catalog::{Migration, ProviderId},
    prelude::*,
};

/// Key-value persistence for accumulator state, keyed by provider.
#[async_trait]
pub trait Store: Send + Sync {
    async fn load(&self, key: &ProviderId) -> Result<Option<StateDocument>>;

    async fn save(&self, key: &ProviderId, document: &StateDocument) -> Result;

    /// Move the document from one key to another, never overwriting an existing one.
    async fn rename(&self, from: &ProviderId, to: &ProviderId) -> Result<Rename>;
}

#[must_use]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Rename {
    Moved,
    SourceMissing,
    TargetExists,
}

/// Move the state of a retired provider over to its successor.
#[instrument(skip_all, fields(from = %migration.from, to = %migration.to))]
pub async fn migrate(store: &impl Store, migration: &Migration) -> Result {
    match store.rename(&migration.from, &migration.to).await? {
        Rename::Moved => info!("moved the state to the successor"),
        Rename::SourceMissing => debug!("nothing to migrate"),
        Rename::TargetExists => warn!("the successor already has its own state, skipping"),
    }
    Ok(())
}

/// JSON documents named `nettleie_{provider}.json` in a directory.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_of(&self, key: &ProviderId) -> PathBuf {
        self.root.join(format!("nettleie_{key}.json"))
    }
}

#[async_trait]
impl Store for FileStore {
    #[instrument(skip_all, fields(key = %key))]
    async fn load(&self, key: &ProviderId) -> Result<Option<StateDocument>> {
        let path = self.path_of(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no state yet");
                return Ok(None);
            }
            Err(error) => {
                return Err(error).with_context(|| format!("failed to read `{}`", path.display()));
            }
        };
        let document = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse `{}`", path.display()))?;
        Ok(Some(document))
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn save(&self, key: &ProviderId, document: &StateDocument) -> Result {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create `{}`", self.root.display()))?;
        let path = self.path_of(key);
        let temporary_path = path.with_extension("json.tmp");
        write_then_rename(&temporary_path, &path, &serde_json::to_vec_pretty(document)?)
            .await
            .with_context(|| format!("failed to write `{}`", path.display()))?;
        trace!(path = %path.display(), "saved");
        Ok(())
    }

    async fn rename(&self, from: &ProviderId, to: &ProviderId) -> Result<Rename> {
        let source = self.path_of(from);
        let target = self.path_of(to);
        if !fs::try_exists(&source).await? {
            return Ok(Rename::SourceMissing);
        }
        if fs::try_exists(&target).await? {
            return Ok(Rename::TargetExists);
        }
        fs::rename(&source, &target)
            .await
            .with_context(|| format!("failed to move `{}`", source.display()))?;
        Ok(Rename::Moved)
    }
}

async fn write_then_rename(temporary_path: &Path, path: &Path, contents: &[u8]) -> Result {
    fs::write(temporary_path, contents).await?;
    fs::rename(temporary_path, path).await?;
    Ok(())
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore(Mutex<BTreeMap<ProviderId, StateDocument>>);

#[cfg(test)]
#[async_trait]
impl Store for MemoryStore {
    async fn load(&self, key: &ProviderId) -> Result<Option<StateDocument>> {
        Ok(self.0.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &ProviderId, document: &StateDocument) -> Result {
        self.0.lock().await.insert(key.clone(), document.clone());
        Ok(())
    }

    async fn rename(&self, from: &ProviderId, to: &ProviderId) -> Result<Rename> {
        let mut documents = self.0.lock().await;
        if !documents.contains_key(from) {
            return Ok(Rename::SourceMissing);
        }
        if documents.contains_key(to) {
            return Ok(Rename::TargetExists);
        }
        if let Some(document) = documents.remove(from) {
            documents.insert(to.clone(), document);
        }
        Ok(Rename::Moved)
    }
}
