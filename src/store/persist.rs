//! File-backed persistence of a store document.
//!
//! Writes go to a uniquely named sibling temp file which is then renamed over
//! the target, so a concurrent reader sees either the old or the new document.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{CfgError, Result};
use crate::model::{generate_id, Document};

pub struct Persistence;

impl Persistence {
    /// Create an empty, valid document at `path`. Never overwrites a non-empty file.
    pub async fn initialize(path: &Path) -> Result<Document> {
        match fs::metadata(path).await {
            Ok(meta) if meta.len() > 0 => return Err(CfgError::AlreadyExists(path.to_path_buf())),
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(CfgError::storage(path, err)),
        }

        if let Some(dir) = Self::parent_dir(path) {
            fs::create_dir_all(dir)
                .await
                .map_err(|err| CfgError::storage(dir, err))?;
        }

        let document = Document::empty();
        Self::store(path, &document).await?;
        log::info!("Initialized empty configuration store at {}", path.display());
        Ok(document)
    }

    /// Read the document at `path`.
    ///
    /// A missing file is an error (`DocumentMissing`); callers initialize and
    /// retry. A file that does not parse as a document is replaced, in memory
    /// only, by an empty one.
    pub async fn load(path: &Path) -> Result<Document> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(CfgError::DocumentMissing(path.to_path_buf()))
            }
            Err(err) => return Err(CfgError::storage(path, err)),
        };

        match Self::parse(path, &bytes) {
            Ok(document) => Ok(document),
            Err(err) => {
                log::info!("{}; continuing with an empty store", err);
                Ok(Document::empty())
            }
        }
    }

    fn parse(path: &Path, bytes: &[u8]) -> Result<Document> {
        serde_json::from_slice(bytes).map_err(|err| CfgError::CorruptDocument {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }

    /// Serialized form of `document`. Same content, same bytes.
    pub fn serialize(document: &Document) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(document)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Durably replace the document at `path` with `document`
    pub async fn store(path: &Path, document: &Document) -> Result<()> {
        let bytes = Self::serialize(document)?;
        Self::write_atomic(path, &bytes, |from, to| async move { fs::rename(from, to).await })
            .await?;
        log::debug!("Stored {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    /// Write `contents` to a temp file next to `path`, carry over the existing
    /// file's permissions, then `replace` the temp file onto `path`. On failure
    /// the temp file is removed and `path` is left as it was.
    async fn write_atomic<F, Fut>(path: &Path, contents: &[u8], replace: F) -> Result<()>
    where
        F: FnOnce(PathBuf, PathBuf) -> Fut,
        Fut: Future<Output = io::Result<()>>,
    {
        let temp = Self::temp_path(path);
        let temp_for_write = temp.clone();
        let target = path.to_path_buf();

        let written = async move {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_for_write)
                .await?;
            file.write_all(contents).await?;
            file.sync_all().await?;
            drop(file);

            match fs::metadata(&target).await {
                Ok(meta) => fs::set_permissions(&temp_for_write, meta.permissions()).await?,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }

            replace(temp_for_write, target).await
        }
        .await;

        if let Err(err) = written {
            if let Err(cleanup) = fs::remove_file(&temp).await {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    log::warn!("Could not remove temp file {}: {}", temp.display(), cleanup);
                }
            }
            return Err(CfgError::storage(path, err));
        }

        Self::sync_dir(path).await;
        Ok(())
    }

    /// Unique per call so overlapping saves never share a temp file
    fn temp_path(path: &Path) -> PathBuf {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cfgmgr".to_string());
        let temp_name = format!(".{}.{}.tmp", file_name, generate_id().simple());
        match Self::parent_dir(path) {
            Some(dir) => dir.join(temp_name),
            None => PathBuf::from(temp_name),
        }
    }

    fn parent_dir(path: &Path) -> Option<&Path> {
        path.parent().filter(|dir| !dir.as_os_str().is_empty())
    }

    #[cfg(unix)]
    async fn sync_dir(path: &Path) {
        let dir = Self::parent_dir(path).unwrap_or_else(|| Path::new("."));
        let synced = match fs::File::open(dir).await {
            Ok(handle) => handle.sync_all().await,
            Err(err) => Err(err),
        };
        if let Err(err) = synced {
            log::debug!("Could not sync directory {}: {}", dir.display(), err);
        }
    }

    #[cfg(not(unix))]
    async fn sync_dir(_path: &Path) {}
}
