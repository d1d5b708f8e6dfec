//! Persisted stack state
//!
//! Manages `<state-dir>/<stack>.state.json`, which maps every logical
//! resource of a stack to what was provisioned for it. Property values are
//! never stored; only a SHA-256 fingerprint of the resolved properties.

use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use stackflow_core::ResolvedResource;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;

/// Default state directory, relative to the template
pub const STATE_DIR: &str = ".stackflow";

/// Persisted state of one stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackState {
    /// State file version
    pub version: u32,

    /// Stack name
    pub stack_name: String,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Resources by logical name
    #[serde(default)]
    pub resources: IndexMap<String, ResourceRecord>,

    /// Outputs projected by the last fully successful apply
    #[serde(default)]
    pub outputs: IndexMap<String, serde_json::Value>,
}

impl StackState {
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            version: STATE_VERSION,
            stack_name: stack_name.into(),
            updated_at: Utc::now(),
            resources: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }

    /// Add or update a resource
    pub fn set_resource(&mut self, name: impl Into<String>, record: ResourceRecord) {
        self.resources.insert(name.into(), record);
        self.updated_at = Utc::now();
    }

    /// Remove a resource
    pub fn remove_resource(&mut self, name: &str) -> Option<ResourceRecord> {
        let result = self.resources.shift_remove(name);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    pub fn get_resource(&self, name: &str) -> Option<&ResourceRecord> {
        self.resources.get(name)
    }

    /// Available resources as seen by expressions
    pub fn resolved_resources(&self) -> HashMap<String, ResolvedResource> {
        self.resources
            .iter()
            .filter(|(_, record)| record.status == ResourceStatus::Available)
            .map(|(name, record)| (name.clone(), record.resolved()))
            .collect()
    }
}

/// What was provisioned for one logical resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Provider-assigned identifier
    pub physical_id: String,

    /// Resource kind
    pub kind: String,

    /// Current status
    pub status: ResourceStatus,

    /// SHA-256 of the resolved properties last sent to the provider
    pub fingerprint: String,

    /// Topological position (wave by wave) when the resource was last applied
    #[serde(default)]
    pub order: usize,

    /// Resources this one depended on when it was last applied
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    /// Resource attributes (endpoint, ARN, etc.)
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the resource was created
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ResourceRecord {
    pub fn new(physical_id: impl Into<String>, kind: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            physical_id: physical_id.into(),
            kind: kind.into(),
            status: ResourceStatus::Pending,
            fingerprint: String::new(),
            order: 0,
            dependencies: Vec::new(),
            attributes: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Move to `next` along the lifecycle; illegal transitions are refused
    pub fn transition(mut self, next: ResourceStatus) -> Self {
        if self.status.can_transition_to(next) {
            self.status = next;
            self.updated_at = Utc::now();
        } else {
            tracing::warn!(
                physical_id = %self.physical_id,
                from = %self.status,
                to = %next,
                "Refusing illegal status transition"
            );
        }
        self
    }

    pub fn resolved(&self) -> ResolvedResource {
        ResolvedResource {
            physical_id: self.physical_id.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

/// Lifecycle status of a resource within a run
///
/// ```text
/// Pending ─► Reconciling ─► Available ─► Deleting ─► Deleted
///    │            │                         │
///    ▼            ▼                         ▼
/// Skipped       Failed ◄────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Not yet processed
    Pending,
    /// Provider calls in flight
    Reconciling,
    /// Matches its declared state
    Available,
    /// Provider reported a permanent failure or retries ran out
    Failed,
    /// Not attempted because something it relies on failed
    Skipped,
    /// Delete in flight
    Deleting,
    /// Gone (or forgotten)
    Deleted,
}

impl ResourceStatus {
    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: ResourceStatus) -> bool {
        use ResourceStatus::*;
        matches!(
            (self, next),
            (Pending, Reconciling)
                | (Pending, Skipped)
                | (Pending, Deleting)
                | (Reconciling, Available)
                | (Reconciling, Failed)
                | (Available, Reconciling)
                | (Available, Deleting)
                | (Failed, Reconciling)
                | (Failed, Deleting)
                | (Deleting, Deleted)
                | (Deleting, Failed)
        )
    }

    /// No further transition happens in the current run
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ResourceStatus::Available
                | ResourceStatus::Failed
                | ResourceStatus::Skipped
                | ResourceStatus::Deleted
        )
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Pending => write!(f, "pending"),
            ResourceStatus::Reconciling => write!(f, "reconciling"),
            ResourceStatus::Available => write!(f, "available"),
            ResourceStatus::Failed => write!(f, "failed"),
            ResourceStatus::Skipped => write!(f, "skipped"),
            ResourceStatus::Deleting => write!(f, "deleting"),
            ResourceStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// Order resources no longer declared for deletion
///
/// A resource is deleted only after every other orphan that depended on it.
/// Otherwise the latest topological position goes first.
pub fn deletion_order(mut orphans: Vec<(String, ResourceRecord)>) -> Vec<(String, ResourceRecord)> {
    orphans.sort_by(|a, b| b.1.order.cmp(&a.1.order));

    let mut ordered = Vec::with_capacity(orphans.len());
    while !orphans.is_empty() {
        let next = orphans
            .iter()
            .position(|(name, _)| {
                !orphans
                    .iter()
                    .any(|(_, other)| other.dependencies.iter().any(|d| d == name))
            })
            .unwrap_or(0);
        ordered.push(orphans.remove(next));
    }
    ordered
}

/// SHA-256 of the canonical JSON form of resolved properties
///
/// Object keys are sorted, so two property sets that differ only in key
/// order share a fingerprint.
pub fn fingerprint(properties: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(properties).as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::Value::String(k.clone()),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        serde_json::Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

/// State manager for reading/writing stack state files
pub struct StateManager {
    state_dir: PathBuf,
}

impl StateManager {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
        }
    }

    /// State manager using the default directory next to `template`
    pub fn for_template(template: impl AsRef<Path>) -> Self {
        let base = template
            .as_ref()
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::new(base.join(STATE_DIR))
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Get the state file path of a stack
    pub fn state_path(&self, stack_name: &str) -> PathBuf {
        self.state_dir.join(format!("{}.state.json", stack_name))
    }

    fn backup_path(&self, stack_name: &str) -> PathBuf {
        self.state_dir
            .join(format!("{}.state.json.backup", stack_name))
    }

    fn lock_path(&self, stack_name: &str) -> PathBuf {
        self.state_dir.join(format!("{}.lock.json", stack_name))
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir).await?;
            tracing::debug!("Created state directory: {}", self.state_dir.display());
        }
        Ok(())
    }

    /// Load the state of a stack; a missing file yields an empty state
    pub async fn load(&self, stack_name: &str) -> Result<StackState> {
        let path = self.state_path(stack_name);
        if !path.exists() {
            tracing::debug!(stack = stack_name, "State file not found, returning empty state");
            return Ok(StackState::new(stack_name));
        }

        let content = fs::read_to_string(&path).await?;
        let state: StackState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }
        if state.stack_name != stack_name {
            return Err(CloudError::StateError(format!(
                "{} belongs to stack '{}', not '{}'",
                path.display(),
                state.stack_name,
                stack_name
            )));
        }

        tracing::debug!(
            stack = stack_name,
            "Loaded state with {} resources",
            state.resources.len()
        );
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    pub async fn save(&self, state: &StackState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path(&state.stack_name);
        let backup = self.backup_path(&state.stack_name);

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created state backup");
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!(
            stack = %state.stack_name,
            "Saved state with {} resources",
            state.resources.len()
        );
        Ok(())
    }

    /// Acquire a lock for exclusive access to a stack
    pub async fn acquire_lock(&self, stack_name: &str) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path(stack_name);

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // Locks older than an hour are considered abandoned
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::LockError(format!(
                    "Stack '{}' is locked by {} since {}",
                    stack_name, lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!(stack = stack_name, "Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for a stack lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = StackState::new("web");
        state.set_resource(
            "Database",
            ResourceRecord::new("dbinstance-000001", "AWS::RDS::DBInstance")
                .with_status(ResourceStatus::Available)
                .with_fingerprint("abc")
                .with_attribute("Endpoint.Address", json!("db.example.internal")),
        );
        state.set_resource(
            "Cluster",
            ResourceRecord::new("cluster-000002", "AWS::ECS::Cluster")
                .with_status(ResourceStatus::Available)
                .with_order(1),
        );
        state.outputs.insert("Url".to_string(), json!("http://lb"));

        manager.save(&state).await.unwrap();
        assert!(temp_dir.path().join("web.state.json").exists());

        let loaded = manager.load("web").await.unwrap();
        assert_eq!(
            loaded.resources.keys().collect::<Vec<_>>(),
            vec!["Database", "Cluster"]
        );
        assert_eq!(
            loaded.resources["Database"].attributes["Endpoint.Address"],
            json!("db.example.internal")
        );
        assert_eq!(loaded.outputs["Url"], json!("http://lb"));
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let state = manager.load("web").await.unwrap();
        assert!(state.resources.is_empty());
        assert_eq!(state.stack_name, "web");
    }

    #[tokio::test]
    async fn test_save_keeps_backup() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = StackState::new("web");
        manager.save(&state).await.unwrap();
        state.set_resource("Cluster", ResourceRecord::new("c-1", "AWS::ECS::Cluster"));
        manager.save(&state).await.unwrap();

        let backup = temp_dir.path().join("web.state.json.backup");
        let previous: StackState =
            serde_json::from_str(&std::fs::read_to_string(backup).unwrap()).unwrap();
        assert!(previous.resources.is_empty());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_until_released() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock("web").await.unwrap();
        assert!(matches!(
            manager.acquire_lock("web").await,
            Err(CloudError::LockError(_))
        ));
        // Other stacks are independent
        let other = manager.acquire_lock("api").await.unwrap();

        lock.release().await.unwrap();
        drop(other);
        manager.acquire_lock("web").await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_lock_is_replaced() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        let stale = LockInfo {
            holder: "old-host".to_string(),
            acquired_at: Utc::now() - chrono::Duration::hours(2),
        };
        std::fs::write(
            temp_dir.path().join("web.lock.json"),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        assert!(manager.acquire_lock("web").await.is_ok());
    }

    #[test]
    fn test_fingerprint_ignores_key_order() {
        let a = json!({ "Engine": "MySQL", "Storage": { "Size": 20, "Type": "gp3" } });
        let b = json!({ "Storage": { "Type": "gp3", "Size": 20 }, "Engine": "MySQL" });
        let c = json!({ "Engine": "MySQL", "Storage": { "Size": 21, "Type": "gp3" } });

        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&c));
        assert_eq!(fingerprint(&a).len(), 64);
    }

    #[test]
    fn test_status_transitions() {
        use ResourceStatus::*;
        assert!(Pending.can_transition_to(Reconciling));
        assert!(Reconciling.can_transition_to(Available));
        assert!(Reconciling.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Skipped));
        assert!(Available.can_transition_to(Deleting));
        assert!(Deleting.can_transition_to(Deleted));

        assert!(!Pending.can_transition_to(Available));
        assert!(!Skipped.can_transition_to(Reconciling));
        assert!(!Deleted.can_transition_to(Available));
        assert!(!Available.can_transition_to(Deleted));
    }

    #[test]
    fn test_record_refuses_illegal_transition() {
        let record = ResourceRecord::new("db-1", "AWS::RDS::DBInstance")
            .transition(ResourceStatus::Reconciling)
            .transition(ResourceStatus::Available);
        assert_eq!(record.status, ResourceStatus::Available);

        let record = record.transition(ResourceStatus::Deleted);
        assert_eq!(record.status, ResourceStatus::Available);

        let record = record
            .transition(ResourceStatus::Deleting)
            .transition(ResourceStatus::Deleted);
        assert_eq!(record.status, ResourceStatus::Deleted);
    }

    #[test]
    fn test_deletion_order_follows_dependencies() {
        let record = |order: usize, dependencies: &[&str]| {
            ResourceRecord::new("id", "T::R")
                .with_order(order)
                .with_dependencies(dependencies.iter().map(|d| d.to_string()).collect())
        };
        // Positions recorded by declaration would delete Db first
        let orphans = vec![
            ("App".to_string(), record(0, &["Db"])),
            ("Db".to_string(), record(1, &[])),
            ("Queue".to_string(), record(2, &[])),
            ("Worker".to_string(), record(3, &["App", "Queue"])),
        ];

        let names: Vec<_> = deletion_order(orphans)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["Worker", "Queue", "App", "Db"]);
    }

    #[test]
    fn test_state_path_for_template() {
        let manager = StateManager::for_template("infra/stack.yaml");
        assert_eq!(
            manager.state_path("web"),
            PathBuf::from("infra/.stackflow/web.state.json")
        );
        let manager = StateManager::for_template("stack.yaml");
        assert_eq!(manager.state_dir(), Path::new("./.stackflow"));
    }
}
