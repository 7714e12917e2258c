//! JSON file-backed entity store.
//!
//! An in-memory id-to-entity map mirrored to one JSON file per entity.
//! Every mutation is written through to disk immediately: serialize to a
//! temp file, fsync, then atomically rename over the entity file. A crash
//! mid-write leaves at worst a stale `.tmp` file, never a corrupt entity.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::domain::errors::DomainError;

/// Errors raised by the entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

/// An id-indexed entity registry persisted as one JSON file per entity.
#[derive(Debug)]
pub struct JsonEntityStore<T> {
    dir: PathBuf,
    entities: RwLock<HashMap<Uuid, T>>,
}

impl<T> JsonEntityStore<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    /// Open a store rooted at `dir`, creating the directory if needed and
    /// loading any entity files already present.
    ///
    /// Unreadable or unparsable entity files are skipped with a warning;
    /// leftover `.tmp` files from an interrupted write are ignored.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut entities = HashMap::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = entity_id_from_path(&path) else {
                continue;
            };
            match fs::read_to_string(&path).map_err(StoreError::from).and_then(|raw| {
                serde_json::from_str::<T>(&raw).map_err(StoreError::from)
            }) {
                Ok(entity) => {
                    entities.insert(id, entity);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Skipping unreadable entity file");
                }
            }
        }

        Ok(Self {
            dir,
            entities: RwLock::new(entities),
        })
    }

    /// Insert an entity and write its file.
    pub fn insert(&self, id: Uuid, entity: T) -> Result<(), StoreError> {
        let mut entities = self.entities.write().expect("store lock poisoned");
        self.persist(id, &entity)?;
        entities.insert(id, entity);
        Ok(())
    }

    /// Fetch a clone of an entity.
    pub fn get(&self, id: Uuid) -> Option<T> {
        self.entities
            .read()
            .expect("store lock poisoned")
            .get(&id)
            .cloned()
    }

    /// Whether an entity exists.
    pub fn contains(&self, id: Uuid) -> bool {
        self.entities
            .read()
            .expect("store lock poisoned")
            .contains_key(&id)
    }

    /// Mutate an entity in place and write its file.
    ///
    /// Returns the updated entity, or `None` when the id is unknown. The
    /// mutation and the disk write happen under the write lock, so readers
    /// never observe a state that is not on disk.
    pub fn update<F>(&self, id: Uuid, mutate: F) -> Result<Option<T>, StoreError>
    where
        F: FnOnce(&mut T),
    {
        let mut entities = self.entities.write().expect("store lock poisoned");
        let Some(entity) = entities.get_mut(&id) else {
            return Ok(None);
        };
        mutate(entity);
        let updated = entity.clone();
        self.persist(id, &updated)?;
        Ok(Some(updated))
    }

    /// Clones of all entities, in unspecified order.
    pub fn list(&self) -> Vec<T> {
        self.entities
            .read()
            .expect("store lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.read().expect("store lock poisoned").len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write-to-temp, fsync, rename. The rename makes the update atomic on
    /// POSIX filesystems.
    fn persist(&self, id: Uuid, entity: &T) -> Result<(), StoreError> {
        let final_path = self.dir.join(format!("{id}.json"));
        let temp_path = self.dir.join(format!("{id}.json.tmp"));

        let json = serde_json::to_vec(entity)?;
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&temp_path, &final_path)?;
        Ok(())
    }
}

fn entity_id_from_path(path: &Path) -> Option<Uuid> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}
