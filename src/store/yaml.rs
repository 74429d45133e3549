//! YAML-backed moderation store
//!
//! Tables live in [`DashMap`]s and every mutation rewrites the affected YAML
//! file. Atomic operations hold the map entry for the whole read-modify-count
//! step and release it before any file I/O is awaited. A mutation whose file
//! write fails is undone in memory.

use super::{
    AuditRecord, ChatPolicy, DEFAULT_WARNING_THRESHOLD, ModerationStore, PolicyUpdate,
    StoreError, StoreResult, Warning, WarningTally,
};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const WARNINGS_FILE: &str = "warnings.yaml";
const POLICIES_FILE: &str = "policies.yaml";
const AUDIT_FILE: &str = "audit.yaml";

/// Moderation store persisted as YAML files in a data directory
#[derive(Clone)]
pub struct YamlStore {
    inner: Arc<YamlStoreInner>,
}

struct YamlStoreInner {
    // None keeps everything in memory
    data_dir: Option<PathBuf>,
    // (chat_id, user_id) -> warnings in creation order
    warnings: DashMap<(u64, u64), WarningHistory>,
    // chat_id -> policy
    policies: DashMap<u64, ChatPolicy>,
    // chat_id -> audit records in creation order
    audit: DashMap<u64, Vec<AuditRecord>>,
    // Serializes file writes so a stale snapshot never overwrites a newer one
    write_lock: Mutex<()>,
}

#[derive(Debug, Default)]
struct WarningHistory {
    rows: Vec<Warning>,
    // Threshold in force when the pair crossed it, cleared once the count
    // drops below it again
    escalated_at: Option<u32>,
}

impl WarningHistory {
    fn count(&self) -> u32 {
        u32::try_from(self.rows.len()).unwrap_or(u32::MAX)
    }

    fn settle_escalation(&mut self) {
        if let Some(threshold) = self.escalated_at {
            if self.count() < threshold {
                self.escalated_at = None;
            }
        }
    }
}

impl std::fmt::Debug for YamlStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YamlStore")
            .field("data_dir", &self.inner.data_dir)
            .field("warnings", &self.inner.warnings.len())
            .field("policies", &self.inner.policies.len())
            .field("audit", &self.inner.audit.len())
            .finish()
    }
}

impl YamlStore {
    /// Create a store that never touches the filesystem
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_dir(None)
    }

    fn with_dir(data_dir: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(YamlStoreInner {
                data_dir,
                warnings: DashMap::new(),
                policies: DashMap::new(),
                audit: DashMap::new(),
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Load the store from a data directory
    ///
    /// Missing files are treated as empty tables. The directory is created if it
    /// does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or a data file exists
    /// but cannot be read or parsed.
    pub async fn load(data_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&data_dir).await?;

        let store = Self::with_dir(Some(data_dir.clone()));

        let warnings: Vec<Warning> = read_table(&data_dir.join(WARNINGS_FILE)).await?;
        for warning in warnings {
            store
                .inner
                .warnings
                .entry((warning.chat_id, warning.user_id))
                .or_default()
                .rows
                .push(warning);
        }

        let policies: Vec<ChatPolicy> = read_table(&data_dir.join(POLICIES_FILE)).await?;
        for policy in policies {
            store.inner.policies.insert(policy.chat_id, policy);
        }

        // Pairs already at their threshold were dealt with before the restart
        for mut history in store.inner.warnings.iter_mut() {
            let chat_id = history.key().0;
            let threshold = store
                .inner
                .policies
                .get(&chat_id)
                .map_or(DEFAULT_WARNING_THRESHOLD, |policy| policy.warning_threshold);
            if history.count() >= threshold {
                history.escalated_at = Some(threshold);
            }
        }

        let records: Vec<AuditRecord> = read_table(&data_dir.join(AUDIT_FILE)).await?;
        for record in records {
            store
                .inner
                .audit
                .entry(record.chat_id)
                .or_default()
                .push(record);
        }

        info!(
            data_dir = %data_dir.display(),
            warning_pairs = store.inner.warnings.len(),
            policies = store.inner.policies.len(),
            "Moderation store loaded"
        );

        Ok(store)
    }

    /// Write every table to disk
    ///
    /// # Errors
    ///
    /// Returns an error if any table cannot be serialized or written.
    pub async fn save(&self) -> StoreResult<()> {
        self.persist_warnings().await?;
        self.persist_policies().await?;
        self.persist_audit().await
    }

    async fn persist_warnings(&self) -> StoreResult<()> {
        let Some(dir) = &self.inner.data_dir else {
            return Ok(());
        };
        let _guard = self.inner.write_lock.lock().await;
        let rows: Vec<Warning> = self
            .inner
            .warnings
            .iter()
            .flat_map(|entry| entry.value().rows.clone())
            .collect();
        write_table(&dir.join(WARNINGS_FILE), &rows).await
    }

    async fn persist_policies(&self) -> StoreResult<()> {
        let Some(dir) = &self.inner.data_dir else {
            return Ok(());
        };
        let _guard = self.inner.write_lock.lock().await;
        let rows: Vec<ChatPolicy> = self
            .inner
            .policies
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        write_table(&dir.join(POLICIES_FILE), &rows).await
    }

    async fn persist_audit(&self) -> StoreResult<()> {
        let Some(dir) = &self.inner.data_dir else {
            return Ok(());
        };
        let _guard = self.inner.write_lock.lock().await;
        let rows: Vec<AuditRecord> = self
            .inner
            .audit
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        write_table(&dir.join(AUDIT_FILE), &rows).await
    }
}

async fn read_table<T: DeserializeOwned>(path: &Path) -> StoreResult<Vec<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
        Ok(content) => Ok(serde_yaml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Data file missing, starting empty");
            Ok(Vec::new())
        }
        Err(e) => Err(StoreError::Io(e)),
    }
}

async fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> StoreResult<()> {
    let yaml = serde_yaml::to_string(rows)?;
    // Write then rename so a crash never leaves a half-written table
    let tmp = path.with_extension("yaml.tmp");
    tokio::fs::write(&tmp, yaml).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl ModerationStore for YamlStore {
    async fn insert_warning_and_count(
        &self,
        warning: Warning,
        threshold: u32,
    ) -> StoreResult<WarningTally> {
        let key = (warning.chat_id, warning.user_id);
        let warning_id = warning.id.clone();
        let tally = {
            let mut history = self.inner.warnings.entry(key).or_default();
            history.rows.push(warning);
            let count = history.count();
            let crossed = count >= threshold
                && history.escalated_at.is_none_or(|previous| threshold > previous);
            if crossed {
                history.escalated_at = Some(threshold);
            }
            WarningTally { count, crossed }
        };

        if let Err(e) = self.persist_warnings().await {
            if let Some(mut history) = self.inner.warnings.get_mut(&key) {
                history.rows.retain(|row| row.id != warning_id);
                if tally.crossed {
                    history.escalated_at = None;
                }
                history.settle_escalation();
            }
            warn!(%warning_id, error = %e, "Warning not persisted, rolled back");
            return Err(e);
        }
        Ok(tally)
    }

    async fn reset_escalation(&self, chat_id: u64, user_id: u64) -> StoreResult<()> {
        if let Some(mut history) = self.inner.warnings.get_mut(&(chat_id, user_id)) {
            history.escalated_at = None;
        }
        Ok(())
    }

    async fn remove_latest_warning(
        &self,
        chat_id: u64,
        user_id: u64,
    ) -> StoreResult<Option<(Warning, u32)>> {
        let key = (chat_id, user_id);
        let removed = match self.inner.warnings.get_mut(&key) {
            Some(mut history) => {
                let escalated_at = history.escalated_at;
                match history.rows.pop() {
                    Some(warning) => {
                        history.settle_escalation();
                        Some((warning, history.count(), escalated_at))
                    }
                    None => None,
                }
            }
            None => None,
        };
        let Some((warning, remaining, escalated_at)) = removed else {
            return Ok(None);
        };

        if let Err(e) = self.persist_warnings().await {
            if let Some(mut history) = self.inner.warnings.get_mut(&key) {
                // Put it back in creation order; newer warnings may have landed meanwhile
                let at = history
                    .rows
                    .partition_point(|row| row.created_at <= warning.created_at);
                history.rows.insert(at, warning.clone());
                history.escalated_at = escalated_at;
            }
            warn!(warning_id = %warning.id, error = %e, "Warning removal not persisted, rolled back");
            return Err(e);
        }
        Ok(Some((warning, remaining)))
    }

    async fn count_warnings(&self, chat_id: u64, user_id: u64) -> StoreResult<u32> {
        Ok(self
            .inner
            .warnings
            .get(&(chat_id, user_id))
            .map_or(0, |history| history.count()))
    }

    async fn list_warnings(&self, chat_id: u64, user_id: u64) -> StoreResult<Vec<Warning>> {
        Ok(self
            .inner
            .warnings
            .get(&(chat_id, user_id))
            .map(|history| history.rows.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_policy(&self, chat_id: u64) -> StoreResult<Option<ChatPolicy>> {
        Ok(self
            .inner
            .policies
            .get(&chat_id)
            .map(|entry| entry.value().clone()))
    }

    async fn update_policy(&self, chat_id: u64, update: PolicyUpdate) -> StoreResult<ChatPolicy> {
        let (previous, policy) = match self.inner.policies.entry(chat_id) {
            Entry::Occupied(mut entry) => {
                let previous = entry.get().clone();
                entry.get_mut().apply(update);
                (Some(previous), entry.get().clone())
            }
            Entry::Vacant(entry) => {
                let mut policy = ChatPolicy::new(chat_id);
                policy.apply(update);
                entry.insert(policy.clone());
                (None, policy)
            }
        };

        if let Err(e) = self.persist_policies().await {
            // A row created by this update goes away with it
            match previous {
                Some(previous) => {
                    self.inner.policies.insert(chat_id, previous);
                }
                None => {
                    self.inner.policies.remove(&chat_id);
                }
            }
            warn!(chat_id, error = %e, "Policy update not persisted, rolled back");
            return Err(e);
        }
        Ok(policy)
    }

    async fn append_audit(&self, record: AuditRecord) -> StoreResult<()> {
        let chat_id = record.chat_id;
        let record_id = record.id.clone();
        self.inner.audit.entry(chat_id).or_default().push(record);

        if let Err(e) = self.persist_audit().await {
            if let Some(mut records) = self.inner.audit.get_mut(&chat_id) {
                records.retain(|record| record.id != record_id);
            }
            warn!(chat_id, %record_id, error = %e, "Audit record not persisted, rolled back");
            return Err(e);
        }
        Ok(())
    }

    async fn list_audit(&self, chat_id: u64) -> StoreResult<Vec<AuditRecord>> {
        Ok(self
            .inner
            .audit
            .get(&chat_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}
