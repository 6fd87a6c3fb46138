/*
    Snapshot persistence

    The store treats persistence as an opaque collaborator: one snapshot per
    data type, loaded at startup and saved periodically.

    FileSnapshotPersistence writes `<data_dir>/<type_name>.snapshot`:
    - bincode encoded `SnapshotFile` (version + wire entries)
    - written to a temp file, fsynced, then renamed over the old snapshot

    Pruning (expiry, revoked privileged keys, size cap) happens in the store
    when a snapshot is restored, not here.
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::codec::{from_bytes, to_bytes, PayloadCodec, WireEntry};
use super::entry::VersionedEntry;
use super::errors::PersistenceError;

const SNAPSHOT_VERSION: u32 = 1;
const SNAPSHOT_EXTENSION: &str = "snapshot";

#[async_trait]
pub trait SnapshotPersistence: Send + Sync {
    /// Entries of one data type. An absent snapshot yields no entries.
    async fn load_snapshot(&self, type_name: &str) -> Result<Vec<VersionedEntry>, PersistenceError>;

    async fn save_snapshot(
        &self,
        type_name: &str,
        entries: &[Arc<VersionedEntry>],
    ) -> Result<(), PersistenceError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub version: u32,
    pub type_name: String,
    pub entries: Vec<WireEntry>,
}

/// Leading fields of a `SnapshotFile`, decodable without the entries
#[derive(Debug, Deserialize)]
struct SnapshotHeader {
    version: u32,
    type_name: String,
}

fn encode_snapshot(
    codec: &PayloadCodec,
    type_name: &str,
    entries: &[Arc<VersionedEntry>],
) -> Result<Vec<u8>, PersistenceError> {
    let file = SnapshotFile {
        version: SNAPSHOT_VERSION,
        type_name: type_name.to_string(),
        entries: entries.iter().map(|entry| codec.encode_entry(entry)).collect(),
    };
    Ok(to_bytes(&file)?)
}

fn decode_snapshot(
    codec: &PayloadCodec,
    type_name: &str,
    bytes: &[u8],
) -> Result<Vec<VersionedEntry>, PersistenceError> {
    let file: SnapshotFile =
        from_bytes(bytes).map_err(|e| PersistenceError::Corrupted(format!("{}: {}", type_name, e)))?;

    if file.version != SNAPSHOT_VERSION {
        return Err(PersistenceError::Corrupted(format!(
            "{}: unsupported snapshot version {}",
            type_name, file.version
        )));
    }
    if file.type_name != type_name {
        return Err(PersistenceError::Corrupted(format!(
            "snapshot for {} found in place of {}",
            file.type_name, type_name
        )));
    }

    let mut entries = Vec::with_capacity(file.entries.len());
    for wire in file.entries {
        let map_key = wire.map_key;
        match codec.decode_entry(wire) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(map_key = %map_key, type_name, "Skipping undecodable snapshot entry: {}", e),
        }
    }
    Ok(entries)
}

/// One bincode file per data type
pub struct FileSnapshotPersistence {
    dir: PathBuf,
    codec: Arc<PayloadCodec>,
}

impl FileSnapshotPersistence {
    pub fn new(dir: impl Into<PathBuf>, codec: Arc<PayloadCodec>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(FileSnapshotPersistence { dir, codec })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_path(&self, type_name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", file_stem(type_name), SNAPSHOT_EXTENSION))
    }

    /// Type names of the snapshots in the directory, read from each file header.
    /// Files without a readable header are skipped.
    pub fn list_snapshots(&self) -> Result<Vec<String>, PersistenceError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SNAPSHOT_EXTENSION) {
                continue;
            }
            match read_header(&path) {
                Ok(header) if header.version == SNAPSHOT_VERSION => names.push(header.type_name),
                Ok(header) => {
                    warn!(path = %path.display(), version = header.version, "Skipping snapshot with unsupported version")
                }
                Err(e) => warn!(path = %path.display(), "Skipping unreadable snapshot: {}", e),
            }
        }
        names.sort();
        Ok(names)
    }
}

fn read_header(path: &Path) -> Result<SnapshotHeader, PersistenceError> {
    let reader = BufReader::new(File::open(path)?);
    bincode::deserialize_from(reader).map_err(|e| PersistenceError::Corrupted(format!("{}: {}", path.display(), e)))
}

/// Keep file names to a safe character set
fn file_stem(type_name: &str) -> String {
    type_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

#[async_trait]
impl SnapshotPersistence for FileSnapshotPersistence {
    async fn load_snapshot(&self, type_name: &str) -> Result<Vec<VersionedEntry>, PersistenceError> {
        let path = self.snapshot_path(type_name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let entries = decode_snapshot(&self.codec, type_name, &bytes)?;
        debug!(type_name, entries = entries.len(), path = %path.display(), "Read snapshot");
        Ok(entries)
    }

    async fn save_snapshot(
        &self,
        type_name: &str,
        entries: &[Arc<VersionedEntry>],
    ) -> Result<(), PersistenceError> {
        let data = encode_snapshot(&self.codec, type_name, entries)?;
        let final_path = self.snapshot_path(type_name);
        let temp_path = final_path.with_extension("tmp");

        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp_path, &final_path).await?;
        debug!(type_name, entries = entries.len(), bytes = data.len(), "Wrote snapshot");
        Ok(())
    }
}

/// Keeps encoded snapshots in memory
pub struct MemorySnapshotPersistence {
    codec: Arc<PayloadCodec>,
    snapshots: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySnapshotPersistence {
    pub fn new(codec: Arc<PayloadCodec>) -> Self {
        MemorySnapshotPersistence { codec, snapshots: Mutex::new(HashMap::new()) }
    }

    /// Raw encoded snapshot of a type
    pub fn raw(&self, type_name: &str) -> Option<Vec<u8>> {
        self.snapshots.lock().get(type_name).cloned()
    }

    pub fn insert_raw(&self, type_name: &str, bytes: Vec<u8>) {
        self.snapshots.lock().insert(type_name.to_string(), bytes);
    }
}

#[async_trait]
impl SnapshotPersistence for MemorySnapshotPersistence {
    async fn load_snapshot(&self, type_name: &str) -> Result<Vec<VersionedEntry>, PersistenceError> {
        match self.raw(type_name) {
            Some(bytes) => decode_snapshot(&self.codec, type_name, &bytes),
            None => Ok(Vec::new()),
        }
    }

    async fn save_snapshot(
        &self,
        type_name: &str,
        entries: &[Arc<VersionedEntry>],
    ) -> Result<(), PersistenceError> {
        let data = encode_snapshot(&self.codec, type_name, entries)?;
        self.insert_raw(type_name, data);
        Ok(())
    }
}
