//! Resource-group persistence.
//!
//! Groups live in a single YAML document (`<data_dir>/groups.yaml`) that is
//! rewritten atomically on every mutation. Ids are sequential decimal
//! strings handed out by the repository.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, ToggleError};
use crate::io;
use crate::types::{ResourceBinding, ResourceGroup};

pub const GROUPS_FILE: &str = "groups.yaml";

/// Input for creating a group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewGroup {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub resources: Vec<ResourceBinding>,
}

/// Read side consumed by the orchestrator plus the CRUD used by the API.
pub trait GroupRepository: Send + Sync {
    fn get_group(&self, id: &str) -> Result<ResourceGroup>;

    fn get_bindings(&self, id: &str) -> Result<Vec<ResourceBinding>> {
        Ok(self.get_group(id)?.resources)
    }

    fn list_groups(&self) -> Result<Vec<ResourceGroup>>;

    fn add_group(&self, group: NewGroup) -> Result<ResourceGroup>;

    fn delete_group(&self, id: &str) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GroupsDocument {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    groups: Vec<ResourceGroup>,
}

pub struct FileGroupRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileGroupRepository {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(GROUPS_FILE),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<GroupsDocument> {
        if !self.path.exists() {
            return Ok(GroupsDocument::default());
        }
        let data = std::fs::read_to_string(&self.path)?;
        if data.trim().is_empty() {
            return Ok(GroupsDocument::default());
        }
        Ok(serde_yaml::from_str(&data)?)
    }

    fn save(&self, doc: &GroupsDocument) -> Result<()> {
        let data = serde_yaml::to_string(doc)?;
        io::atomic_write(&self.path, data.as_bytes())
    }
}

impl GroupRepository for FileGroupRepository {
    fn get_group(&self, id: &str) -> Result<ResourceGroup> {
        self.load()?
            .groups
            .into_iter()
            .find(|g| g.id == id)
            .ok_or_else(|| ToggleError::GroupNotFound(id.to_string()))
    }

    fn list_groups(&self) -> Result<Vec<ResourceGroup>> {
        Ok(self.load()?.groups)
    }

    fn add_group(&self, group: NewGroup) -> Result<ResourceGroup> {
        if group.name.trim().is_empty() {
            return Err(ToggleError::Validation("group name is required".into()));
        }
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = self.load()?;
        doc.next_id += 1;
        let created = ResourceGroup {
            id: doc.next_id.to_string(),
            name: group.name,
            status: group.status,
            resources: group.resources,
        };
        doc.groups.push(created.clone());
        self.save(&doc)?;
        Ok(created)
    }

    fn delete_group(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = self.load()?;
        let before = doc.groups.len();
        doc.groups.retain(|g| g.id != id);
        if doc.groups.len() == before {
            return Err(ToggleError::GroupNotFound(id.to_string()));
        }
        self.save(&doc)
    }
}
