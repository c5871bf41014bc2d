use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncRead;
use tracing::{debug, info};

/// Bucket holding the uploaded sound files.
pub const BUCKET_SOUNDS: &str = "sounds";

pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object {bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    #[error("invalid object key '{0}'")]
    InvalidKey(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Read access to stored objects.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Opens an object for streaming and returns it with its size in bytes.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<(ObjectReader, u64), StorageError>;
}

/// [`Storage`] over a local directory, one subdirectory per bucket.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base: PathBuf,
}

impl FileStorage {
    /// Creates the base directory if it does not exist.
    pub async fn new(base: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base = base.into();
        fs::create_dir_all(&base).await?;
        info!("📁 Storage inicializado en: {}", base.display());
        Ok(Self { base })
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        for name in [bucket, key] {
            if !is_plain_name(name) {
                return Err(StorageError::InvalidKey(name.to_string()));
            }
        }
        Ok(self.base.join(bucket).join(key))
    }
}

/// A single normal path component: no separators, no `..`, not empty.
fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

#[async_trait]
impl Storage for FileStorage {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<(ObjectReader, u64), StorageError> {
        let path = self.object_path(bucket, key)?;

        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();

        debug!(bucket, key, size, "Objeto abierto");
        let reader: ObjectReader = Box::new(file);
        Ok((reader, size))
    }
}
