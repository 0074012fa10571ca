//! Entity persistence
//!
//! The engine never touches storage. Callers load a snapshot through an
//! [`EntityStore`], hand it to the engine, and write the changed entities
//! back.
//!
//! [`YamlDirStore`] keeps one YAML document per entity:
//!
//! ```text
//! <root>/
//!   requirement/req-001-user-login.yaml
//!   plan/pln-001-auth.yaml
//!   component/cmp-001-session-store.yaml
//! ```

use parking_lot::RwLock;
use specgraph_model::{Entity, EntityId, EntityKind, EntitySnapshot, SubItem, SubItemKind};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Document could not be (de)serialized
    #[error("YAML error in {path}: {source}")]
    Yaml {
        /// Document path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_yaml::Error,
    },

    /// Document content does not match its location
    #[error("invalid entity file {path}: {reason}")]
    Invalid {
        /// Document path
        path: PathBuf,
        /// What is wrong
        reason: String,
    },

    /// Entity does not exist in the store
    #[error("entity not found: {0}")]
    NotFound(EntityId),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn yaml(path: &Path, source: serde_yaml::Error) -> Self {
        Self::Yaml {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Source and sink of entity snapshots
#[async_trait::async_trait]
pub trait EntityStore: Send + Sync {
    /// Load every entity
    async fn load_all_entities(&self) -> Result<EntitySnapshot, StoreError>;

    /// Create or replace one entity
    async fn save_entity(&self, entity: &Entity) -> Result<(), StoreError>;

    /// Replace one sub-item collection of an existing entity
    async fn save_collection(
        &self,
        parent: &EntityId,
        kind: SubItemKind,
        items: &[SubItem],
    ) -> Result<(), StoreError>;

    /// Save every entity of `next` that differs from `previous`; returns the count saved
    async fn save_changes(&self, previous: &EntitySnapshot, next: &EntitySnapshot) -> Result<usize, StoreError> {
        let mut saved = 0;
        for entity in next.iter() {
            if previous.get(&entity.id) != Some(entity) {
                self.save_entity(entity).await?;
                saved += 1;
            }
        }
        Ok(saved)
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: RwLock<BTreeMap<EntityId, Entity>>,
}

impl MemoryStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `snapshot`
    #[must_use]
    pub fn with_snapshot(snapshot: EntitySnapshot) -> Self {
        let entities = snapshot
            .into_entities()
            .into_iter()
            .map(|e| (e.id.clone(), e))
            .collect();
        Self {
            entities: RwLock::new(entities),
        }
    }

    /// Current contents
    #[must_use]
    pub fn snapshot(&self) -> EntitySnapshot {
        self.entities.read().values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl EntityStore for MemoryStore {
    async fn load_all_entities(&self) -> Result<EntitySnapshot, StoreError> {
        Ok(self.snapshot())
    }

    async fn save_entity(&self, entity: &Entity) -> Result<(), StoreError> {
        self.entities.write().insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    async fn save_collection(
        &self,
        parent: &EntityId,
        kind: SubItemKind,
        items: &[SubItem],
    ) -> Result<(), StoreError> {
        let mut entities = self.entities.write();
        let entity = entities
            .get_mut(parent)
            .ok_or_else(|| StoreError::NotFound(parent.clone()))?;
        entity.collections.insert(kind, items.to_vec());
        Ok(())
    }
}

/// One YAML file per entity under `<root>/<kind>/<id>.yaml`
#[derive(Debug, Clone)]
pub struct YamlDirStore {
    root: PathBuf,
}

impl YamlDirStore {
    /// Store rooted at `root`; directories are created on first save
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding `id`
    #[must_use]
    pub fn path_for(&self, id: &EntityId) -> PathBuf {
        self.root.join(id.kind().as_str()).join(format!("{id}.yaml"))
    }

    async fn read_entity(&self, path: &Path) -> Result<Entity, StoreError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        serde_yaml::from_str(&text).map_err(|e| StoreError::yaml(path, e))
    }

    async fn load_kind(&self, kind: EntityKind, snapshot: &mut EntitySnapshot) -> Result<(), StoreError> {
        let dir = self.root.join(kind.as_str());
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::io(&dir, e))? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("yaml") {
                continue;
            }
            let entity = self.read_entity(&path).await?;
            if path != self.path_for(&entity.id) {
                return Err(StoreError::Invalid {
                    path,
                    reason: format!("document holds {} which belongs in {}", entity.id, self.path_for(&entity.id).display()),
                });
            }
            snapshot.insert(entity);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl EntityStore for YamlDirStore {
    async fn load_all_entities(&self) -> Result<EntitySnapshot, StoreError> {
        let mut snapshot = EntitySnapshot::new();
        for kind in EntityKind::ALL {
            self.load_kind(kind, &mut snapshot).await?;
        }
        tracing::debug!(root = %self.root.display(), entities = snapshot.len(), "loaded entities");
        Ok(snapshot)
    }

    async fn save_entity(&self, entity: &Entity) -> Result<(), StoreError> {
        let path = self.path_for(&entity.id);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::io(dir, e))?;
        }

        let text = serde_yaml::to_string(entity).map_err(|e| StoreError::yaml(&path, e))?;
        let staging = path.with_extension("yaml.tmp");
        tokio::fs::write(&staging, text)
            .await
            .map_err(|e| StoreError::io(&staging, e))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        tracing::debug!(entity = %entity.id, path = %path.display(), "saved entity");
        Ok(())
    }

    async fn save_collection(
        &self,
        parent: &EntityId,
        kind: SubItemKind,
        items: &[SubItem],
    ) -> Result<(), StoreError> {
        let path = self.path_for(parent);
        if !tokio::fs::try_exists(&path).await.map_err(|e| StoreError::io(&path, e))? {
            return Err(StoreError::NotFound(parent.clone()));
        }
        let mut entity = self.read_entity(&path).await?;
        entity.collections.insert(kind, items.to_vec());
        self.save_entity(&entity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specgraph_model::SubItemId;

    fn plan() -> Entity {
        Entity::new(EntityKind::Plan, 1, "auth", "Auth")
            .unwrap()
            .with_item(SubItem::new(SubItemId::new(SubItemKind::Task, 1)))
            .unwrap()
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryStore::new();
        store.save_entity(&plan()).await.unwrap();

        let snapshot = store.load_all_entities().await.unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn memory_store_replaces_collection() {
        let store = MemoryStore::with_snapshot(EntitySnapshot::from_entities([plan()]));
        let id = plan().id;
        let items = vec![
            SubItem::new(SubItemId::new(SubItemKind::Task, 1)),
            SubItem::new(SubItemId::new(SubItemKind::Task, 2)),
        ];
        store.save_collection(&id, SubItemKind::Task, &items).await.unwrap();

        assert_eq!(store.snapshot().get(&id).unwrap().items(SubItemKind::Task).len(), 2);
    }

    #[tokio::test]
    async fn memory_store_collection_needs_parent() {
        let store = MemoryStore::new();
        let err = store
            .save_collection(&plan().id, SubItemKind::Task, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn yaml_store_uses_kind_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = YamlDirStore::new(dir.path());
        store.save_entity(&plan()).await.unwrap();

        assert!(dir.path().join("plan").join("pln-001-auth.yaml").exists());
        let snapshot = store.load_all_entities().await.unwrap();
        assert_eq!(snapshot.get(&plan().id), Some(&plan()));
    }

    #[tokio::test]
    async fn yaml_store_empty_root_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = YamlDirStore::new(dir.path().join("missing"))
            .load_all_entities()
            .await
            .unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn yaml_store_rejects_misplaced_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = YamlDirStore::new(dir.path());
        store.save_entity(&plan()).await.unwrap();
        std::fs::rename(
            dir.path().join("plan").join("pln-001-auth.yaml"),
            dir.path().join("plan").join("pln-002-other.yaml"),
        )
        .unwrap();

        let err = store.load_all_entities().await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid { .. }));
    }
}
