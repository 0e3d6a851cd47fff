//! Local directory backend: one JPEG file per stored face.

use crate::{convert, encode_jpeg, ColorConversion, FaceStore, StoreError, StoredFace};
use chrono::{DateTime, Utc};
use image::RgbImage;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Stores faces as `<timestamp>_<random>.jpg` inside a fixed directory.
///
/// The file name is the identifier.
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Open (and create if needed) the storage directory.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        tracing::info!(dir = %dir.display(), "local face store opened");
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn new_id() -> String {
        format!(
            "{}_{}.jpg",
            Utc::now().format("%Y%m%dT%H%M%S%3f"),
            uuid::Uuid::new_v4().simple()
        )
    }

    /// Resolve an identifier to a path inside the store directory.
    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        let is_plain_name = !id.is_empty()
            && id != "."
            && id != ".."
            && !id.contains(['/', '\\'])
            && Path::new(id).file_name().map_or(false, |n| n == id);
        if !is_plain_name {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(id))
    }

    /// Write a new file named `id` in full or not at all.
    ///
    /// Content goes to a hidden staging file that only becomes `id` once it
    /// is complete and synced; on any failure the staging file is removed.
    fn write_new<F>(&self, id: &str, fill: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut File) -> std::io::Result<()>,
    {
        let mut staged = tempfile::Builder::new()
            .prefix(".incoming-")
            .tempfile_in(&self.dir)?;
        fill(staged.as_file_mut())?;
        staged.as_file().sync_all()?;
        staged
            .persist_noclobber(self.dir.join(id))
            .map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn image_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && image::ImageFormat::from_path(path).is_ok())
            .collect();
        paths.sort();
        Ok(paths)
    }
}

impl FaceStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    fn store(&self, crop: &RgbImage) -> Result<String, StoreError> {
        let bytes = encode_jpeg(crop)?;
        let id = Self::new_id();
        self.write_new(&id, |file| file.write_all(&bytes))?;

        tracing::debug!(id = %id, bytes = bytes.len(), "face written");
        Ok(id)
    }

    fn load_all(&self, conversion: Option<ColorConversion>) -> Vec<StoredFace> {
        let paths = match self.image_files() {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(
                    dir = %self.dir.display(),
                    error = %e,
                    "failed to list stored faces"
                );
                return Vec::new();
            }
        };

        let mut faces = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(id) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            match image::open(&path) {
                Ok(img) => faces.push(StoredFace {
                    id,
                    image: convert(img, conversion),
                }),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable stored face"
                    );
                }
            }
        }

        tracing::info!(count = faces.len(), "loaded stored faces from disk");
        faces
    }

    fn ping(&self) -> bool {
        match std::fs::metadata(&self.dir) {
            Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => true,
            Ok(_) => {
                tracing::warn!(
                    dir = %self.dir.display(),
                    "storage path is not a writable directory"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    dir = %self.dir.display(),
                    error = %e,
                    "storage directory unavailable"
                );
                false
            }
        }
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        std::fs::remove_file(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(id.to_string()),
            _ => StoreError::Io(e),
        })?;
        tracing::info!(id, "stored face deleted");
        Ok(())
    }

    fn info(&self, id: &str) -> Result<serde_json::Value, StoreError> {
        let path = self.path_for(id)?;
        let meta = std::fs::metadata(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(id.to_string()),
            _ => StoreError::Io(e),
        })?;
        let (width, height) = image::image_dimensions(&path)?;
        let modified = meta.modified().ok().map(|t| DateTime::<Utc>::from(t).to_rfc3339());

        Ok(serde_json::json!({
            "id": id,
            "path": path.display().to_string(),
            "size": meta.len(),
            "width": width,
            "height": height,
            "modified": modified,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb};

    fn crop(shade: u8) -> RgbImage {
        RgbImage::from_fn(40, 48, |x, y| Rgb([shade, (x * 5) as u8, (y * 5) as u8]))
    }

    #[test]
    fn test_store_writes_jpeg_named_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();

        let id = store.store(&crop(100)).unwrap();
        assert!(id.ends_with(".jpg"));

        let path = dir.path().join(&id);
        assert!(path.is_file());
        assert_eq!(image::image_dimensions(&path).unwrap(), (40, 48));
    }

    #[test]
    fn test_ids_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let a = store.store(&crop(1)).unwrap();
        let b = store.store(&crop(1)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_open_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("faces");
        let store = LocalStore::open(&nested).unwrap();
        assert!(nested.is_dir());
        assert!(store.ping());
    }

    #[test]
    fn test_load_all_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        assert!(store.load_all(None).is_empty());
    }

    #[test]
    fn test_load_all_returns_stored_with_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let id = store.store(&crop(50)).unwrap();
        std::fs::write(dir.path().join("readme.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("broken.jpg"), b"not a jpeg").unwrap();

        let faces = store.load_all(Some(ColorConversion::Grayscale));
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].id, id);
        assert!(matches!(faces[0].image, DynamicImage::ImageLuma8(_)));

        let faces = store.load_all(None);
        assert!(matches!(faces[0].image, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn test_load_all_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(&dir.path().join("faces")).unwrap();
        std::fs::remove_dir(store.dir()).unwrap();
        assert!(store.load_all(None).is_empty());
        assert!(!store.ping());
    }

    #[test]
    fn test_delete_and_info() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let id = store.store(&crop(7)).unwrap();

        let info = store.info(&id).unwrap();
        assert_eq!(info["id"], id.as_str());
        assert_eq!(info["width"], 40);
        assert_eq!(info["height"], 48);

        store.delete(&id).unwrap();
        assert!(store.load_all(None).is_empty());
        assert!(matches!(store.delete(&id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.info(&id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();

        let result = store.write_new("half.jpg", |file| {
            file.write_all(&[0xFF, 0xD8, 0xFF])?;
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        });

        assert!(matches!(result, Err(StoreError::Io(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(store.load_all(None).is_empty());
    }

    #[test]
    fn test_existing_id_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("taken.jpg"), b"original").unwrap();

        let result = store.write_new("taken.jpg", |file| file.write_all(b"replacement"));

        assert!(result.is_err());
        assert_eq!(std::fs::read(dir.path().join("taken.jpg")).unwrap(), b"original");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        for id in ["../etc/passwd", "..", "", "a/b.jpg"] {
            assert!(matches!(store.delete(id), Err(StoreError::InvalidId(_))), "{id}");
        }
    }
}
