//! Artifact repository abstraction.
//!
//! A repository is a versioned key-value store of `path -> bytes` holding the
//! declarative artifact definitions for one instance. Two backends are
//! provided: [`MemoryRepo`] for tests and development, and [`FsRepo`] backed
//! by a project directory on local disk.
//!
//! Artifacts live under a fixed namespace convention:
//!
//! - `sources/<name>.yaml`: source extracts
//! - `models/<name>.sql`: transform models
//! - `dashboards/<name>.yaml`: metrics-view definitions

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// The kind of artifact a repository path holds, derived from its namespace
/// directory and extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// A source extract definition (`sources/<name>.yaml`).
    Source,
    /// A transform model (`models/<name>.sql`).
    Model,
    /// A metrics-view definition (`dashboards/<name>.yaml`).
    MetricsView,
}

/// Classifies a repository path by the artifact namespace convention.
///
/// Returns the kind and the object name (file stem), or `None` for paths
/// outside the convention (e.g. project config files), which reconciliation
/// ignores.
#[must_use]
pub fn classify_path(path: &str) -> Option<(ArtifactKind, String)> {
    let (dir, file) = path.split_once('/')?;
    if file.contains('/') {
        return None;
    }
    let (kind, ext) = match dir {
        "sources" => (ArtifactKind::Source, ".yaml"),
        "models" => (ArtifactKind::Model, ".sql"),
        "dashboards" => (ArtifactKind::MetricsView, ".yaml"),
        _ => return None,
    };
    let name = file.strip_suffix(ext)?;
    if name.is_empty() {
        return None;
    }
    Some((kind, name.to_string()))
}

/// Returns the conventional repository path for an artifact.
#[must_use]
pub fn artifact_path(kind: ArtifactKind, name: &str) -> String {
    match kind {
        ArtifactKind::Source => format!("sources/{name}.yaml"),
        ArtifactKind::Model => format!("models/{name}.sql"),
        ArtifactKind::MetricsView => format!("dashboards/{name}.yaml"),
    }
}

/// Metadata about a stored artifact.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Repository path.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification timestamp.
    pub updated_on: DateTime<Utc>,
}

/// Repository of artifact definitions for one or more instances.
///
/// All paths are relative, `/`-separated, and interpreted under the
/// instance's root. `list` returns paths in lexicographic order so repeated
/// scans over unchanged content are deterministic.
#[async_trait]
pub trait RepoStore: Send + Sync + 'static {
    /// Reads an artifact's content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no artifact exists at `path`.
    async fn get(&self, instance_id: &str, path: &str) -> Result<Bytes>;

    /// Returns metadata for an artifact without reading its content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no artifact exists at `path`.
    async fn stat(&self, instance_id: &str, path: &str) -> Result<ObjectMeta>;

    /// Writes an artifact, replacing any existing content at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the write fails.
    async fn put(&self, instance_id: &str, path: &str, blob: Bytes) -> Result<()>;

    /// Deletes an artifact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no artifact exists at `path`.
    async fn delete(&self, instance_id: &str, path: &str) -> Result<()>;

    /// Lists all artifact paths for an instance in lexicographic order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the listing fails.
    async fn list(&self, instance_id: &str) -> Result<Vec<String>>;
}

/// In-memory repository for tests and development.
///
/// Thread-safe via a single `RwLock`; tracks a per-path modification
/// timestamp so rename-detection heuristics can be exercised in tests.
#[derive(Debug, Default)]
pub struct MemoryRepo {
    state: RwLock<HashMap<String, HashMap<String, (Bytes, DateTime<Utc>)>>>,
}

impl MemoryRepo {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the modification timestamp of an existing artifact.
    ///
    /// Test hook for exercising the rename-detection time window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the artifact does not exist.
    pub fn set_updated_on(
        &self,
        instance_id: &str,
        path: &str,
        updated_on: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let files = state
            .get_mut(instance_id)
            .ok_or_else(|| Error::not_found("artifact", path))?;
        let entry = files
            .get_mut(path)
            .ok_or_else(|| Error::not_found("artifact", path))?;
        entry.1 = updated_on;
        Ok(())
    }
}

fn poisoned() -> Error {
    Error::storage("repository lock poisoned")
}

#[async_trait]
impl RepoStore for MemoryRepo {
    async fn get(&self, instance_id: &str, path: &str) -> Result<Bytes> {
        let state = self.state.read().map_err(|_| poisoned())?;
        state
            .get(instance_id)
            .and_then(|files| files.get(path))
            .map(|(blob, _)| blob.clone())
            .ok_or_else(|| Error::not_found("artifact", path))
    }

    async fn stat(&self, instance_id: &str, path: &str) -> Result<ObjectMeta> {
        let state = self.state.read().map_err(|_| poisoned())?;
        state
            .get(instance_id)
            .and_then(|files| files.get(path))
            .map(|(blob, updated_on)| ObjectMeta {
                path: path.to_string(),
                size: blob.len() as u64,
                updated_on: *updated_on,
            })
            .ok_or_else(|| Error::not_found("artifact", path))
    }

    async fn put(&self, instance_id: &str, path: &str, blob: Bytes) -> Result<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state
            .entry(instance_id.to_string())
            .or_default()
            .insert(path.to_string(), (blob, Utc::now()));
        Ok(())
    }

    async fn delete(&self, instance_id: &str, path: &str) -> Result<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let removed = state
            .get_mut(instance_id)
            .and_then(|files| files.remove(path));
        if removed.is_none() {
            return Err(Error::not_found("artifact", path));
        }
        Ok(())
    }

    async fn list(&self, instance_id: &str) -> Result<Vec<String>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut paths: Vec<String> = state
            .get(instance_id)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        Ok(paths)
    }
}

/// Filesystem-backed repository rooted at a local project directory.
///
/// Each instance maps to `<root>/<instance_id>`. Relative paths are validated
/// against traversal before touching the filesystem.
#[derive(Debug)]
pub struct FsRepo {
    root: PathBuf,
}

impl FsRepo {
    /// Creates a repository rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, instance_id: &str, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        let safe = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || instance_id.contains(['/', '\\']) {
            return Err(Error::validation(format!(
                "repository path escapes project root: {path}"
            )));
        }
        Ok(self.root.join(instance_id).join(rel))
    }
}

#[async_trait]
impl RepoStore for FsRepo {
    async fn get(&self, instance_id: &str, path: &str) -> Result<Bytes> {
        let full = self.resolve(instance_id, path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found("artifact", path))
            }
            Err(e) => Err(Error::storage_with_source(
                format!("reading {path}"),
                e,
            )),
        }
    }

    async fn stat(&self, instance_id: &str, path: &str) -> Result<ObjectMeta> {
        let full = self.resolve(instance_id, path)?;
        let meta = match tokio::fs::metadata(&full).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found("artifact", path));
            }
            Err(e) => {
                return Err(Error::storage_with_source(format!("stat {path}"), e));
            }
        };
        let updated_on = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(ObjectMeta {
            path: path.to_string(),
            size: meta.len(),
            updated_on,
        })
    }

    async fn put(&self, instance_id: &str, path: &str, blob: Bytes) -> Result<()> {
        let full = self.resolve(instance_id, path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage_with_source(format!("writing {path}"), e))?;
        }
        tokio::fs::write(&full, &blob)
            .await
            .map_err(|e| Error::storage_with_source(format!("writing {path}"), e))
    }

    async fn delete(&self, instance_id: &str, path: &str) -> Result<()> {
        let full = self.resolve(instance_id, path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found("artifact", path))
            }
            Err(e) => Err(Error::storage_with_source(
                format!("deleting {path}"),
                e,
            )),
        }
    }

    async fn list(&self, instance_id: &str) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        for dir in ["sources", "models", "dashboards"] {
            let full = self.root.join(instance_id).join(dir);
            let mut entries = match tokio::fs::read_dir(&full).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(Error::storage_with_source(format!("listing {dir}"), e));
                }
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Error::storage_with_source(format!("listing {dir}"), e))?
            {
                if let Some(name) = entry.file_name().to_str() {
                    paths.push(format!("{dir}/{name}"));
                }
            }
        }
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_follows_namespace_convention() {
        assert_eq!(
            classify_path("sources/orders.yaml"),
            Some((ArtifactKind::Source, "orders".to_string()))
        );
        assert_eq!(
            classify_path("models/revenue.sql"),
            Some((ArtifactKind::Model, "revenue".to_string()))
        );
        assert_eq!(
            classify_path("dashboards/revenue_dash.yaml"),
            Some((ArtifactKind::MetricsView, "revenue_dash".to_string()))
        );
    }

    #[test]
    fn classify_rejects_unknown_paths() {
        assert_eq!(classify_path("project.yaml"), None);
        assert_eq!(classify_path("sources/orders.sql"), None);
        assert_eq!(classify_path("sources/nested/orders.yaml"), None);
        assert_eq!(classify_path("data/orders.yaml"), None);
        assert_eq!(classify_path("sources/.yaml"), None);
    }

    #[test]
    fn artifact_path_roundtrips_through_classify() {
        for kind in [
            ArtifactKind::Source,
            ArtifactKind::Model,
            ArtifactKind::MetricsView,
        ] {
            let path = artifact_path(kind, "orders");
            assert_eq!(classify_path(&path), Some((kind, "orders".to_string())));
        }
    }

    #[tokio::test]
    async fn memory_repo_put_get_list_delete() {
        let repo = MemoryRepo::new();
        repo.put("inst", "sources/b.yaml", Bytes::from_static(b"b"))
            .await
            .unwrap();
        repo.put("inst", "sources/a.yaml", Bytes::from_static(b"a"))
            .await
            .unwrap();

        assert_eq!(
            repo.get("inst", "sources/a.yaml").await.unwrap(),
            Bytes::from_static(b"a")
        );
        // Listing is sorted, not insertion-ordered.
        assert_eq!(
            repo.list("inst").await.unwrap(),
            vec!["sources/a.yaml", "sources/b.yaml"]
        );

        repo.delete("inst", "sources/a.yaml").await.unwrap();
        assert!(repo
            .get("inst", "sources/a.yaml")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn memory_repo_isolates_instances() {
        let repo = MemoryRepo::new();
        repo.put("a", "models/m.sql", Bytes::from_static(b"select 1"))
            .await
            .unwrap();
        assert!(repo.list("b").await.unwrap().is_empty());
        assert!(repo.get("b", "models/m.sql").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn fs_repo_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsRepo::new(dir.path());
        let err = repo.get("inst", "../outside.yaml").await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn fs_repo_roundtrip_and_stat() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsRepo::new(dir.path());
        repo.put("inst", "sources/orders.yaml", Bytes::from_static(b"type: local_file"))
            .await
            .unwrap();

        let meta = repo.stat("inst", "sources/orders.yaml").await.unwrap();
        assert_eq!(meta.size, 16);
        assert_eq!(repo.list("inst").await.unwrap(), vec!["sources/orders.yaml"]);

        repo.delete("inst", "sources/orders.yaml").await.unwrap();
        assert!(repo.list("inst").await.unwrap().is_empty());
    }
}
