//! Snapshot files: writing, listing and loading backups.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use curator_engine::{
    backup_file_name, is_backup_file_name, next_sequence, RecordId, RefCollection, Snapshot,
};
use serde::Serialize;
use tokio::fs;

use crate::db::{self, content, StorageDriver, Tables};
use crate::error::{AppError, Result};
use crate::files;

/// Which records a snapshot covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotScope {
    /// Every record of every kind
    All,
    /// Only these ids; ids that do not exist are skipped
    Selected(Vec<RecordId>),
}

/// A snapshot named by file, or the most recently modified one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotRef {
    Latest,
    Named(String),
}

impl SnapshotRef {
    /// `None`, empty and `"latest"` select the newest backup.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let raw = raw.map(str::trim).unwrap_or_default();
        if raw.is_empty() || raw.eq_ignore_ascii_case("latest") {
            return Ok(SnapshotRef::Latest);
        }

        let unsafe_name = raw.contains('/') || raw.contains('\\') || raw.contains("..");
        if unsafe_name || !raw.ends_with(".json") {
            return Err(AppError::Validation(format!(
                "invalid snapshot name: {raw}"
            )));
        }
        Ok(SnapshotRef::Named(raw.to_string()))
    }
}

/// Result of writing a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub file_name: String,
    pub records: usize,
    pub references: usize,
    pub timestamp: i64,
}

/// A backup file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Directory of snapshot files.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
    prefix: String,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Export records and their reference rows to a new file.
    pub async fn snapshot(
        &self,
        driver: &dyn StorageDriver,
        tables: &Tables,
        scope: SnapshotScope,
    ) -> Result<BackupInfo> {
        let selected = match scope {
            SnapshotScope::All => None,
            SnapshotScope::Selected(ids) if ids.is_empty() => {
                return Err(AppError::Validation("no records selected".into()))
            }
            SnapshotScope::Selected(ids) => Some(ids),
        };

        let mut tx = driver.begin().await?;
        let result = async {
            let records = content::fetch_records(tx.as_mut(), tables, selected.as_deref()).await?;
            let ids: Vec<RecordId> = records.iter().map(|r| r.id).collect();

            let mut references = Vec::new();
            for collection in RefCollection::ALL {
                let rows = content::fetch_references(tx.as_mut(), tables, collection, &ids).await?;
                references.extend(rows);
            }
            Ok::<_, AppError>((records, references))
        }
        .await;
        let (records, references) = db::finish(tx, result).await?;

        let snapshot = Snapshot::new(records, references, Utc::now().timestamp());
        let json = snapshot.to_json_pretty()?;

        let day = Local::now().format("%Y%m%d").to_string();
        let existing = self.file_names().await?;
        let sequence = next_sequence(&self.prefix, &day, existing.iter().map(String::as_str));
        let file_name = backup_file_name(&self.prefix, &day, sequence);

        files::write_atomic(&self.dir.join(&file_name), json.as_bytes()).await?;

        let info = BackupInfo {
            file_name,
            records: snapshot.records.len(),
            references: snapshot.reference_rows.len(),
            timestamp: snapshot.timestamp,
        };
        tracing::info!(
            "Wrote backup {} ({} records, {} reference rows)",
            info.file_name,
            info.records,
            info.references
        );
        Ok(info)
    }

    /// Backups in the directory, newest first.
    pub async fn list(&self) -> Result<Vec<BackupEntry>> {
        let mut entries = Vec::new();
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(err) => return Err(err.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_backup_file_name(&self.prefix, &name) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            entries.push(BackupEntry {
                name,
                size: metadata.len(),
                modified: DateTime::<Utc>::from(metadata.modified()?),
            });
        }

        entries.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
        Ok(entries)
    }

    /// File name a reference points at; the file must exist.
    pub async fn resolve(&self, reference: &SnapshotRef) -> Result<String> {
        match reference {
            SnapshotRef::Latest => self
                .list()
                .await?
                .into_iter()
                .next()
                .map(|entry| entry.name)
                .ok_or_else(|| AppError::NotFound("no backups available".into())),
            SnapshotRef::Named(name) => {
                if fs::try_exists(self.dir.join(name)).await? {
                    Ok(name.clone())
                } else {
                    Err(AppError::NotFound(format!("backup {name}")))
                }
            }
        }
    }

    /// Read and validate a snapshot, returning its resolved file name.
    pub async fn load(&self, reference: &SnapshotRef) -> Result<(String, Snapshot)> {
        let name = self.resolve(reference).await?;
        let json = files::read_optional(&self.dir.join(&name))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("backup {name}")))?;
        let snapshot = Snapshot::from_json(&json)?;
        Ok((name, snapshot))
    }

    async fn file_names(&self) -> Result<Vec<String>> {
        Ok(self.list().await?.into_iter().map(|e| e.name).collect())
    }
}
