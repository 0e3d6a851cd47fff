//! facewatch-store: persistence gateway for accepted faces.
//!
//! Two interchangeable backends behind [`FaceStore`]: a local directory of
//! JPEG files and a remote REST image API. Every backend failure is turned
//! into a [`StoreError`] value (or an empty result for bulk loads) at this
//! boundary.

pub mod local;
pub mod remote;

pub use local::LocalStore;
pub use remote::RemoteStore;

use facewatch_core::config::{Backend, StorageConfig};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage};
use std::time::Duration;
use thiserror::Error;

/// JPEG quality used for stored crops.
const JPEG_QUALITY: u8 = 95;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("backend rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("image not found: {0}")]
    NotFound(String),
    #[error("invalid image identifier: {0:?}")]
    InvalidId(String),
    #[error("malformed backend response: {0}")]
    Malformed(String),
    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
}

/// Optional conversion applied while loading stored images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorConversion {
    Grayscale,
}

/// A previously stored face as returned by [`FaceStore::load_all`].
#[derive(Debug, Clone)]
pub struct StoredFace {
    pub id: String,
    pub image: DynamicImage,
}

/// "Store a face, get an identifier back" and "give me every stored face".
pub trait FaceStore {
    /// Backend name for logs ("local", "remote").
    fn name(&self) -> &'static str;

    /// Persist a color crop at its original resolution as JPEG.
    fn store(&self, crop: &RgbImage) -> Result<String, StoreError>;

    /// Every stored image. Any backend failure yields an empty list.
    fn load_all(&self, conversion: Option<ColorConversion>) -> Vec<StoredFace>;

    /// Whether the backend is reachable and writable.
    fn ping(&self) -> bool;

    /// Remove a stored image. Administrative; the capture loop never calls it.
    fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Backend metadata for a stored image.
    fn info(&self, id: &str) -> Result<serde_json::Value, StoreError>;
}

/// Build the backend selected by the configuration.
pub fn open(config: &StorageConfig) -> Result<Box<dyn FaceStore>, StoreError> {
    match config.backend {
        Backend::Local => Ok(Box::new(LocalStore::open(&config.local_dir)?)),
        Backend::Remote => {
            let url = config
                .api_url
                .as_deref()
                .ok_or_else(|| StoreError::Unavailable("remote backend has no API URL".into()))?;
            let token = config
                .api_token
                .as_deref()
                .ok_or_else(|| StoreError::Unavailable("remote backend has no API token".into()))?;
            if config.accept_invalid_certs {
                tracing::warn!("TLS certificate verification DISABLED for the remote image store");
            }
            Ok(Box::new(RemoteStore::new(
                url,
                token,
                Duration::from_secs(config.timeout_secs),
                config.accept_invalid_certs,
            )?))
        }
    }
}

/// Encode a crop as JPEG.
pub fn encode_jpeg(crop: &RgbImage) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY).encode_image(crop)?;
    Ok(bytes)
}

/// Apply the requested load-time conversion.
pub fn convert(image: DynamicImage, conversion: Option<ColorConversion>) -> DynamicImage {
    match conversion {
        Some(ColorConversion::Grayscale) => DynamicImage::ImageLuma8(image.to_luma8()),
        None => image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_encode_jpeg_roundtrips_dimensions() {
        let crop = RgbImage::from_pixel(37, 21, Rgb([200, 40, 90]));
        let bytes = encode_jpeg(&crop).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (37, 21));
    }

    #[test]
    fn test_convert_grayscale() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([10, 20, 30])));
        assert!(matches!(
            convert(img.clone(), Some(ColorConversion::Grayscale)),
            DynamicImage::ImageLuma8(_)
        ));
        assert!(matches!(convert(img, None), DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn test_open_local_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            local_dir: dir.path().join("faces"),
            ..StorageConfig::default()
        };
        let store = open(&config).unwrap();
        assert_eq!(store.name(), "local");
        assert!(dir.path().join("faces").is_dir());
    }

    #[test]
    fn test_open_remote_requires_url() {
        let config = StorageConfig {
            backend: Backend::Remote,
            api_token: Some("tok".into()),
            ..StorageConfig::default()
        };
        assert!(open(&config).is_err());
    }
}
