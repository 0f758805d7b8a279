//! Local pre-processing that shrinks an input before upload
//!
//! Decoding a camera-sized JPEG can take a noticeable amount of time, so the
//! work runs on the blocking pool and the caller simply awaits the result.

use crate::{
    error::{PipelineError, Result},
    store::{encode_png, strip_extension, ImageStore},
    types::ImageHandle,
};
use async_trait::async_trait;
use std::path::PathBuf;

/// Produces a re-encoded candidate for an input image
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Create a new handle holding a re-encoded copy of `image`
    ///
    /// The original file is never modified.
    ///
    /// # Errors
    /// - `PipelineError::Decode` when the input cannot be decoded
    /// - I/O errors while writing the candidate
    async fn compress(&self, image: &ImageHandle) -> Result<ImageHandle>;
}

/// Lossless PNG re-encoder writing working copies into the project store
#[derive(Debug, Clone)]
pub struct PngCompressor {
    store: ImageStore,
}

impl PngCompressor {
    #[must_use]
    pub fn new(store: ImageStore) -> Self {
        Self { store }
    }

    /// Working copy name: `<stem>-<yyyy-MM-dd HH-mm-ss-SSS>-compressed`
    #[must_use]
    pub fn working_name(input: &ImageHandle) -> String {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H-%M-%S-%3f");
        format!(
            "{}-{}-compressed",
            strip_extension(&input.file_name()),
            timestamp
        )
    }
}

#[async_trait]
impl Compressor for PngCompressor {
    async fn compress(&self, image: &ImageHandle) -> Result<ImageHandle> {
        let source: PathBuf = image.path.clone();
        let encoded = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let decoded = image::open(&source).map_err(|e| {
                PipelineError::decode(format!("Failed to decode '{}': {}", source.display(), e))
            })?;
            encode_png(&decoded)
        })
        .await
        .map_err(|e| PipelineError::internal(format!("Compression task failed: {}", e)))??;

        let handle = self.store.save(&Self::working_name(image), &encoded).await?;
        log::debug!(
            "Compressed {} ({} bytes) -> {} ({} bytes)",
            image.path.display(),
            image.size_bytes,
            handle.path.display(),
            handle.size_bytes
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use tempfile::tempdir;

    fn write_bmp(path: &std::path::Path) -> u64 {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([10, 200, 30])));
        img.save_with_format(path, image::ImageFormat::Bmp).unwrap();
        std::fs::metadata(path).unwrap().len()
    }

    #[tokio::test]
    async fn test_compress_produces_new_handle() {
        let temp_dir = tempdir().unwrap();
        let input_path = temp_dir.path().join("flat.bmp");
        let original_len = write_bmp(&input_path);
        let input = ImageHandle::new(&input_path, original_len);

        let store = ImageStore::new(temp_dir.path().join("project"));
        let compressor = PngCompressor::new(store);
        let output = compressor.compress(&input).await.unwrap();

        assert_ne!(output.path, input.path);
        assert!(output.file_name().starts_with("flat-"));
        assert!(output.file_name().ends_with("-compressed.png"));
        // A flat-colour bitmap compresses far below its raw size
        assert!(output.size_bytes < original_len);
        assert_eq!(std::fs::metadata(&input_path).unwrap().len(), original_len);

        let decoded = image::open(&output.path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[tokio::test]
    async fn test_compress_reports_decode_error() {
        let temp_dir = tempdir().unwrap();
        let input_path = temp_dir.path().join("corrupt.jpg");
        std::fs::write(&input_path, b"definitely not a jpeg").unwrap();
        let input = ImageHandle::new(&input_path, 21);

        let compressor = PngCompressor::new(ImageStore::new(temp_dir.path().join("project")));
        let result = compressor.compress(&input).await;
        assert!(matches!(result, Err(PipelineError::Decode(_))));
    }
}
