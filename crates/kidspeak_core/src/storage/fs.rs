//! Filesystem-backed object storage.
//!
//! Objects live at `{root}/{bucket}/{path}` and are published under
//! `{public_base_url}/{bucket}/{path}`.

use super::{validate_object_path, ObjectStorage, StorageError, StorageResult};
use crate::model::AssetBucket;
use log::{error, info};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub struct FsObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl FsObjectStorage {
    /// Creates storage rooted at `root`, creating bucket directories.
    pub fn open(root: impl AsRef<Path>, public_base_url: &str) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        for bucket in [AssetBucket::Photos, AssetBucket::Voices] {
            fs::create_dir_all(root.join(bucket.as_str()))?;
        }
        Ok(Self {
            root,
            public_base_url: public_base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_file(&self, bucket: AssetBucket, path: &str) -> StorageResult<PathBuf> {
        validate_object_path(path)?;
        let mut file = self.root.join(bucket.as_str());
        for segment in path.split('/') {
            file.push(segment);
        }
        Ok(file)
    }
}

impl ObjectStorage for FsObjectStorage {
    fn put(&self, bucket: AssetBucket, path: &str, bytes: &[u8]) -> StorageResult<String> {
        let file = self.object_file(bucket, path)?;
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write-then-rename keeps readers from ever seeing a partial object.
        let staging = file.with_extension("part");
        let written = fs::write(&staging, bytes).and_then(|()| fs::rename(&staging, &file));
        if let Err(err) = written {
            let _ = fs::remove_file(&staging);
            error!(
                "event=storage_put module=storage status=error bucket={} bytes={} error={}",
                bucket.as_str(),
                bytes.len(),
                err
            );
            return Err(err.into());
        }

        info!(
            "event=storage_put module=storage status=ok bucket={} bytes={}",
            bucket.as_str(),
            bytes.len()
        );
        Ok(path.to_string())
    }

    fn get(&self, bucket: AssetBucket, path: &str) -> StorageResult<Vec<u8>> {
        let file = self.object_file(bucket, path)?;
        fs::read(&file).map_err(|err| match err.kind() {
            ErrorKind::NotFound => StorageError::NotFound {
                bucket,
                path: path.to_string(),
            },
            _ => StorageError::Io(err),
        })
    }

    fn remove(&self, bucket: AssetBucket, path: &str) -> StorageResult<()> {
        let file = self.object_file(bucket, path)?;
        match fs::remove_file(&file) {
            Ok(()) => {
                info!(
                    "event=storage_remove module=storage status=ok bucket={}",
                    bucket.as_str()
                );
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn public_url(&self, bucket: AssetBucket, path: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, bucket.as_str(), path)
    }

    fn resolve_url(&self, url: &str) -> Option<(AssetBucket, String)> {
        let rest = url.strip_prefix(self.public_base_url.as_str())?;
        let rest = rest.strip_prefix('/')?;
        let (bucket_text, path) = rest.split_once('/')?;
        let bucket = AssetBucket::parse(bucket_text)?;
        validate_object_path(path).ok()?;
        Some((bucket, path.to_string()))
    }
}
