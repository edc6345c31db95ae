//! Image storage
//!
//! Implementations:
//! - `FileGalleryRepository` - JSON metadata plus image files on disk

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use gallery_model::Image;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("image {0} does not exist")]
    NotFound(Uuid),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt image metadata: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// A stored image and its owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: Uuid,
    pub title: String,
    pub file_name: String,
    /// `sub` of the user who owns the image
    pub owner_id: String,
}

impl From<ImageRecord> for Image {
    fn from(record: ImageRecord) -> Self {
        Image {
            id: record.id,
            title: record.title,
            file_name: record.file_name,
        }
    }
}

#[async_trait]
pub trait GalleryRepository: Send + Sync {
    /// Images owned by `owner_id`, ordered by title
    async fn images_for_owner(&self, owner_id: &str) -> Result<Vec<ImageRecord>>;

    async fn image(&self, id: Uuid) -> Result<Option<ImageRecord>>;

    async fn image_exists(&self, id: Uuid) -> Result<bool>;

    async fn is_image_owner(&self, id: Uuid, owner_id: &str) -> Result<bool>;

    /// Store the bytes under a fresh file name and record the image
    async fn add_image(&self, owner_id: &str, title: &str, bytes: &[u8]) -> Result<ImageRecord>;

    async fn update_image(&self, id: Uuid, title: &str) -> Result<()>;

    /// Remove the record and its file
    async fn delete_image(&self, id: Uuid) -> Result<()>;

    /// Raw bytes of a stored file, `None` when there is no such file
    async fn image_bytes(&self, file_name: &str) -> Result<Option<Vec<u8>>>;
}

/// Metadata in `<data>/images.json`, bytes in `<data>/images/<uuid>.jpg`
pub struct FileGalleryRepository {
    data_path: PathBuf,
    records: RwLock<Vec<ImageRecord>>,
}

impl FileGalleryRepository {
    /// Open (or create) a repository in `data_path`, seeding it when empty
    pub async fn open(data_path: impl AsRef<Path>) -> Result<Self> {
        let data_path = data_path.as_ref().to_path_buf();
        tokio::fs::create_dir_all(data_path.join("images")).await?;

        let metadata = data_path.join("images.json");
        let records = if tokio::fs::try_exists(&metadata).await? {
            let content = tokio::fs::read_to_string(&metadata).await?;
            serde_json::from_str(&content)?
        } else {
            Vec::new()
        };

        let repository = Self {
            data_path,
            records: RwLock::new(records),
        };
        repository.seed_if_empty().await?;
        Ok(repository)
    }

    async fn seed_if_empty(&self) -> Result<()> {
        let mut records = self.records.write().await;
        if !records.is_empty() {
            return Ok(());
        }

        for (owner, title) in SEED_IMAGES {
            let id = Uuid::new_v4();
            records.push(ImageRecord {
                id,
                title: title.to_string(),
                file_name: format!("{}.jpg", id),
                owner_id: owner.to_string(),
            });
        }
        self.persist(&records).await?;
        tracing::info!("Seeded {} images", records.len());
        Ok(())
    }

    /// Write the metadata file; callers hold the write lock and only update
    /// the in-memory records once this succeeds
    async fn persist(&self, records: &[ImageRecord]) -> Result<()> {
        let content = serde_json::to_string_pretty(records)?;
        let path = self.data_path.join("images.json");
        let tmp = self.data_path.join("images.json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Only plain file names map into the images directory
    fn image_path(&self, file_name: &str) -> Option<PathBuf> {
        let plain = !file_name.is_empty()
            && !file_name.starts_with('.')
            && !file_name.contains(['/', '\\']);
        plain.then(|| self.data_path.join("images").join(file_name))
    }
}

/// Metadata-only seed: the titles the gallery starts out with
const SEED_IMAGES: &[(&str, &str)] = &[
    ("818727", "An image by Frank"),
    ("818727", "Another image by Frank"),
    ("818727", "A third image by Frank"),
    ("88421113", "An image by Claire"),
    ("88421113", "Another image by Claire"),
];

#[async_trait]
impl GalleryRepository for FileGalleryRepository {
    async fn images_for_owner(&self, owner_id: &str) -> Result<Vec<ImageRecord>> {
        let records = self.records.read().await;
        let mut images: Vec<ImageRecord> = records
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        images.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(images)
    }

    async fn image(&self, id: Uuid) -> Result<Option<ImageRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn image_exists(&self, id: Uuid) -> Result<bool> {
        let records = self.records.read().await;
        Ok(records.iter().any(|r| r.id == id))
    }

    async fn is_image_owner(&self, id: Uuid, owner_id: &str) -> Result<bool> {
        let records = self.records.read().await;
        Ok(records.iter().any(|r| r.id == id && r.owner_id == owner_id))
    }

    async fn add_image(&self, owner_id: &str, title: &str, bytes: &[u8]) -> Result<ImageRecord> {
        let id = Uuid::new_v4();
        let record = ImageRecord {
            id,
            title: title.to_string(),
            file_name: format!("{}.jpg", id),
            owner_id: owner_id.to_string(),
        };

        let file_path = self.data_path.join("images").join(&record.file_name);
        tokio::fs::write(&file_path, bytes).await?;

        let mut records = self.records.write().await;
        let mut next = records.clone();
        next.push(record.clone());
        if let Err(e) = self.persist(&next).await {
            if let Err(cleanup) = tokio::fs::remove_file(&file_path).await {
                tracing::warn!(image = %id, "Failed to remove orphaned image file: {}", cleanup);
            }
            return Err(e);
        }
        *records = next;
        tracing::info!(image = %id, owner = owner_id, "Added image");
        Ok(record)
    }

    async fn update_image(&self, id: Uuid, title: &str) -> Result<()> {
        let mut records = self.records.write().await;
        let mut next = records.clone();
        let record = next
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(RepositoryError::NotFound(id))?;
        record.title = title.to_string();
        self.persist(&next).await?;
        *records = next;
        Ok(())
    }

    async fn delete_image(&self, id: Uuid) -> Result<()> {
        let mut records = self.records.write().await;
        let index = records
            .iter()
            .position(|r| r.id == id)
            .ok_or(RepositoryError::NotFound(id))?;
        let mut next = records.clone();
        let removed = next.remove(index);
        self.persist(&next).await?;
        *records = next;
        drop(records);

        if let Some(path) = self.image_path(&removed.file_name) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                // Seeded records have no file
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        tracing::info!(image = %id, "Deleted image");
        Ok(())
    }

    async fn image_bytes(&self, file_name: &str) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.image_path(file_name) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_seeds_empty_repository() {
        let dir = TempDir::new().unwrap();
        let repo = FileGalleryRepository::open(dir.path()).await.unwrap();

        let frank = repo.images_for_owner("818727").await.unwrap();
        assert_eq!(frank.len(), 3);
        assert!(frank.windows(2).all(|w| w[0].title <= w[1].title));
        assert_eq!(repo.images_for_owner("88421113").await.unwrap().len(), 2);
        assert!(dir.path().join("images.json").exists());
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let added = {
            let repo = FileGalleryRepository::open(dir.path()).await.unwrap();
            repo.add_image("818727", "Fresh", b"jpeg").await.unwrap()
        };

        let repo = FileGalleryRepository::open(dir.path()).await.unwrap();
        assert_eq!(repo.image(added.id).await.unwrap(), Some(added.clone()));
        assert_eq!(
            repo.image_bytes(&added.file_name).await.unwrap(),
            Some(b"jpeg".to_vec())
        );
    }

    #[tokio::test]
    async fn test_ownership() {
        let dir = TempDir::new().unwrap();
        let repo = FileGalleryRepository::open(dir.path()).await.unwrap();
        let image = repo.add_image("88421113", "Mine", b"x").await.unwrap();

        assert!(repo.is_image_owner(image.id, "88421113").await.unwrap());
        assert!(!repo.is_image_owner(image.id, "818727").await.unwrap());
        assert!(!repo.is_image_owner(Uuid::new_v4(), "88421113").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let dir = TempDir::new().unwrap();
        let repo = FileGalleryRepository::open(dir.path()).await.unwrap();
        let image = repo.add_image("818727", "Old", b"x").await.unwrap();

        repo.update_image(image.id, "New").await.unwrap();
        assert_eq!(repo.image(image.id).await.unwrap().unwrap().title, "New");

        repo.delete_image(image.id).await.unwrap();
        assert!(!repo.image_exists(image.id).await.unwrap());
        assert_eq!(repo.image_bytes(&image.file_name).await.unwrap(), None);

        let err = repo.delete_image(image.id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_records_unchanged() {
        let dir = TempDir::new().unwrap();
        let repo = FileGalleryRepository::open(dir.path()).await.unwrap();
        let frank = repo.images_for_owner("818727").await.unwrap();
        let first = frank[0].clone();

        // A directory in the way of the temp file makes every write fail
        std::fs::create_dir(dir.path().join("images.json.tmp")).unwrap();

        assert!(repo.add_image("818727", "Lost", b"x").await.is_err());
        assert!(repo.update_image(first.id, "Renamed").await.is_err());
        assert!(repo.delete_image(first.id).await.is_err());

        assert_eq!(repo.images_for_owner("818727").await.unwrap(), frank);
        let files = std::fs::read_dir(dir.path().join("images")).unwrap().count();
        assert_eq!(files, 0);

        std::fs::remove_dir(dir.path().join("images.json.tmp")).unwrap();
        let reopened = FileGalleryRepository::open(dir.path()).await.unwrap();
        assert_eq!(reopened.images_for_owner("818727").await.unwrap(), frank);
    }

    #[tokio::test]
    async fn test_image_bytes_rejects_paths() {
        let dir = TempDir::new().unwrap();
        let repo = FileGalleryRepository::open(dir.path()).await.unwrap();
        assert_eq!(repo.image_bytes("../images.json").await.unwrap(), None);
        assert_eq!(repo.image_bytes(".hidden").await.unwrap(), None);
    }
}
