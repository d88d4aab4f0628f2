//! Component B — `BlobStore`: the pluggable backend interface for opaque
//! byte I/O (spec §4.B). Local disks, object stores, and SaaS connectors all
//! implement this one trait; the VFS facade only ever talks to a `dyn
//! BlobStore` chosen by the mount table (component F).

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use agentfs_std::{AgentFsError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

/// A boxed, unpinned async byte stream — the only shape the core needs on
/// its critical path (spec §4.B: "the core uses only seek-less streaming
/// read/write").
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Turns an in-memory buffer into a [`ByteStream`].
pub fn stream_from_bytes(bytes: Vec<u8>) -> ByteStream {
    Box::pin(std::io::Cursor::new(bytes))
}

/// Reads a [`ByteStream`] to completion. Used by backends and by tests; the
/// core itself only does this for small, already-bounded data (e.g. staged
/// content below the smart-hash threshold).
pub async fn read_to_vec(mut stream: ByteStream) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Declares what a backend can do beyond the baseline streaming contract
/// (spec §4.B: "Backends MAY report capability flags").
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    /// The backend can seek within a blob without re-reading from the start.
    pub seekable: bool,
    /// The backend can serve byte-range reads natively.
    pub range_read: bool,
    /// The backend supports appending to an existing object.
    pub append: bool,
}

/// Component B's contract (spec §4.B).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Reads the object at `key`, optionally restricted to a byte range.
    /// Returns `NotFound` if the key is absent.
    async fn read(&self, key: &str, range: Option<Range<u64>>) -> Result<ByteStream>;

    /// Writes `stream` to `key`, atomically at the object level: either the
    /// whole blob becomes visible or none of it does. Returns the number of
    /// bytes written.
    async fn write(&self, key: &str, stream: ByteStream) -> Result<u64>;

    /// Removes the object at `key`. Not an error if already absent.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Whether an object exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Lists up to `limit` keys under `prefix`.
    async fn list(&self, prefix: &str, limit: usize) -> Result<Vec<String>>;

    /// This backend's capability flags; defaults to "none" (a minimal,
    /// purely streaming backend).
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}

/// An in-process [`BlobStore`] backed by a map of byte vectors. Used for
/// tests and for ephemeral mounts (e.g. the `dummy`/staging areas other
/// components exercise before a real backend is configured).
#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: DashMap<String, Vec<u8>>,
    quota_bytes: Option<u64>,
}

impl InMemoryBlobStore {
    /// Creates an unbounded in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an in-memory store that rejects writes once its aggregate
    /// size would exceed `quota_bytes` (spec §4.B, `QuotaExceeded`).
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            objects: DashMap::new(),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn total_bytes(&self) -> u64 {
        self.objects.iter().map(|e| e.value().len() as u64).sum()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn read(&self, key: &str, range: Option<Range<u64>>) -> Result<ByteStream> {
        let entry = self
            .objects
            .get(key)
            .ok_or_else(|| AgentFsError::NotFound(format!("blob {key}")))?;
        let bytes = match range {
            Some(r) => {
                let start = r.start.min(entry.len() as u64) as usize;
                let end = r.end.min(entry.len() as u64) as usize;
                entry[start..end.max(start)].to_vec()
            }
            None => entry.clone(),
        };
        Ok(stream_from_bytes(bytes))
    }

    async fn write(&self, key: &str, stream: ByteStream) -> Result<u64> {
        let bytes = read_to_vec(stream)
            .await
            .map_err(|e| AgentFsError::Unavailable(e.to_string()))?;
        if let Some(quota) = self.quota_bytes {
            let existing = self.objects.get(key).map(|e| e.len() as u64).unwrap_or(0);
            let projected = self.total_bytes() - existing + bytes.len() as u64;
            if projected > quota {
                return Err(AgentFsError::QuotaExceeded(format!(
                    "writing {key} would use {projected} bytes, quota is {quota}"
                )));
            }
        }
        let len = bytes.len() as u64;
        self.objects.insert(key.to_string(), bytes);
        Ok(len)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.contains_key(key))
    }

    async fn list(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| k.starts_with(prefix))
            .collect();
        keys.sort();
        keys.truncate(limit);
        Ok(keys)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            seekable: true,
            range_read: true,
            append: false,
        }
    }
}

/// A [`BlobStore`] backed by a directory on the local filesystem. Each key
/// maps to a file under `root`, with the key's path separators preserved so
/// `blob/{hash}` and `staging/{uuid}` land in predictable subdirectories
/// (spec §6).
pub struct LocalDiskBlobStore {
    root: PathBuf,
}

impl LocalDiskBlobStore {
    /// Opens (creating if necessary) a local-disk blob store rooted at
    /// `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl BlobStore for LocalDiskBlobStore {
    async fn read(&self, key: &str, range: Option<Range<u64>>) -> Result<ByteStream> {
        use tokio::io::AsyncSeekExt;

        let path = self.path_for(key);
        let mut file = tokio::fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AgentFsError::NotFound(format!("blob {key}"))
            } else {
                AgentFsError::from(e)
            }
        })?;

        let bytes = if let Some(r) = range {
            file.seek(std::io::SeekFrom::Start(r.start)).await?;
            let mut buf = vec![0u8; (r.end - r.start) as usize];
            file.read_exact(&mut buf).await?;
            buf
        } else {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf).await?;
            buf
        };
        Ok(stream_from_bytes(bytes))
    }

    async fn write(&self, key: &str, stream: ByteStream) -> Result<u64> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Atomic at the object level: write to a staging file in the same
        // directory, then rename into place (spec §4.B).
        let staging = path.with_extension(format!("tmp-{}", fastrand::u64(..)));
        let bytes = read_to_vec(stream)
            .await
            .map_err(|e| AgentFsError::Unavailable(e.to_string()))?;
        let len = bytes.len() as u64;
        {
            let mut file = tokio::fs::File::create(&staging).await?;
            file.write_all(&bytes).await?;
            file.flush().await?;
        }
        tokio::fs::rename(&staging, &path).await?;
        Ok(len)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::metadata(self.path_for(key)).await.is_ok())
    }

    async fn list(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let dir = self.path_for(prefix);
        let base = dir.parent().unwrap_or(&self.root);
        if !base.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                if let Ok(rel) = path.strip_prefix(&self.root) {
                    if let Some(key) = rel.to_str() {
                        if key.starts_with(prefix) {
                            keys.push(key.to_string());
                        }
                    }
                }
            }
        }
        keys.sort();
        keys.truncate(limit);
        Ok(keys)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            seekable: true,
            range_read: true,
            append: false,
        }
    }
}

/// Splits an opaque key into a canonical filesystem-safe relative path.
/// Exposed for backends that need to mirror the same layout convention.
pub fn key_to_relative_path(key: &str) -> &Path {
    Path::new(key)
}
