//! Durable storage for whole trees.
//!
//! A store keeps one flat node list per mind map. Loads validate the list
//! into a [`Tree`]; saves replace the stored list wholesale.

use crate::error::{CollabError, Result};
use async_trait::async_trait;
use mm_core::id::MindMapId;
use mm_core::model::{Node, Tree};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Load and validate a mind map. [`CollabError::NotFound`] if the store
    /// has never seen it.
    async fn load_tree(&self, mind_map: &MindMapId) -> Result<Tree>;

    async fn save_tree(&self, mind_map: &MindMapId, tree: &Tree) -> Result<()>;
}

// ─── In memory ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    maps: RwLock<HashMap<MindMapId, Vec<Node>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw node list without validating it.
    pub async fn put_nodes(&self, mind_map: MindMapId, nodes: Vec<Node>) {
        self.maps.write().await.insert(mind_map, nodes);
    }

    pub async fn nodes(&self, mind_map: &MindMapId) -> Option<Vec<Node>> {
        self.maps.read().await.get(mind_map).cloned()
    }
}

#[async_trait]
impl TreeStore for MemoryStore {
    async fn load_tree(&self, mind_map: &MindMapId) -> Result<Tree> {
        let nodes = self
            .nodes(mind_map)
            .await
            .ok_or_else(|| CollabError::NotFound(mind_map.clone()))?;
        Ok(Tree::from_nodes(nodes)?)
    }

    async fn save_tree(&self, mind_map: &MindMapId, tree: &Tree) -> Result<()> {
        self.put_nodes(mind_map.clone(), tree.to_nodes()).await;
        Ok(())
    }
}

// ─── JSON files ──────────────────────────────────────────────────────────

/// One `<mind map id>.json` file per mind map under a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, mind_map: &MindMapId) -> Result<PathBuf> {
        let id = mind_map.as_str();
        let safe = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(CollabError::NotFound(mind_map.clone()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

#[async_trait]
impl TreeStore for JsonFileStore {
    async fn load_tree(&self, mind_map: &MindMapId) -> Result<Tree> {
        let path = self.path_for(mind_map)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CollabError::NotFound(mind_map.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        let nodes: Vec<Node> = serde_json::from_slice(&bytes)?;
        Ok(Tree::from_nodes(nodes)?)
    }

    async fn save_tree(&self, mind_map: &MindMapId, tree: &Tree) -> Result<()> {
        let path = self.path_for(mind_map)?;
        let json = serde_json::to_vec_pretty(&tree.to_nodes())?;
        tokio::fs::create_dir_all(&self.dir).await?;
        // Write then rename so a crash never leaves a half-written file.
        // Each write gets its own temp file; concurrent saves of one map
        // race only on the final rename.
        let tmp = self
            .dir
            .join(format!(".{mind_map}.{}.tmp", uuid::Uuid::new_v4()));
        let written = match tokio::fs::write(&tmp, json).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                log::debug!("could not remove {}: {cleanup}", tmp.display());
            }
            return Err(e.into());
        }
        log::debug!("saved {mind_map} ({} nodes) to {}", tree.len(), path.display());
        Ok(())
    }
}
