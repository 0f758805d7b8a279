//! Project directory persistence for working copies, outputs and exports
//!
//! Every file the pipeline produces lives under one project directory:
//!
//! ```text
//! <project>/
//! ├── beach-<timestamp>-compressed.png   working copy (removed unless kept)
//! ├── beach-no-bg.png                    output, overwritten on reprocess
//! └── shared/
//!     └── shared-no-bg.png               single ad-hoc export
//! ```

use crate::{
    error::{PipelineError, Result},
    types::ImageHandle,
};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Suffix marking an image whose background has already been removed
pub const PROCESSED_MARKER: &str = "-no-bg";

/// Subdirectory holding the single shared export
pub const SHARED_DIR_NAME: &str = "shared";

/// Base name of the shared export file
pub const SHARED_FILE_NAME: &str = "shared-no-bg";

/// Filesystem store rooted at a project directory
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    /// Create a store; the directory itself is created on first save
    #[must_use]
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Project directory this store writes into
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a given name resolves to (`<root>/<name>.png`)
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.png", name))
    }

    /// Write `bytes` to `<root>/<name>.png`, overwriting any existing file
    ///
    /// The handle is returned only after the data has been flushed and
    /// synced to disk.
    pub async fn save(&self, name: &str, bytes: &[u8]) -> Result<ImageHandle> {
        let path = self.path_for(name);
        write_durably(&path, bytes).await?;
        log::debug!("Saved {} bytes to {}", bytes.len(), path.display());
        Ok(ImageHandle::new(path, bytes.len() as u64))
    }

    /// Encode `image` as lossless PNG and save it under `name`
    pub async fn save_image(&self, name: &str, image: DynamicImage) -> Result<ImageHandle> {
        let bytes = tokio::task::spawn_blocking(move || encode_png(&image))
            .await
            .map_err(|e| PipelineError::internal(format!("PNG encoder task failed: {}", e)))??;
        self.save(name, &bytes).await
    }

    /// Build a handle for an existing file from its metadata
    pub async fn handle_for<P: AsRef<Path>>(path: P) -> Result<ImageHandle> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| PipelineError::file_io_error("read image metadata", path, &e))?;
        if !metadata.is_file() {
            return Err(PipelineError::file_io_error(
                "read image",
                path,
                &std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        Ok(ImageHandle::new(path, metadata.len()))
    }

    /// Delete a working copy; a file that is already gone is not an error
    pub async fn remove(&self, handle: &ImageHandle) -> Result<()> {
        match tokio::fs::remove_file(&handle.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::file_io_error(
                "remove working copy",
                &handle.path,
                &e,
            )),
        }
    }

    /// Re-encode `image` as PNG to `<root>/shared/shared-no-bg.png`
    ///
    /// The export is overwritten every time and is not part of any run's
    /// state.
    pub async fn export_shared(&self, image: &ImageHandle) -> Result<ImageHandle> {
        let source = image.path.clone();
        let bytes = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let decoded = image::open(&source).map_err(|e| {
                PipelineError::decode(format!("Failed to decode '{}': {}", source.display(), e))
            })?;
            encode_png(&decoded)
        })
        .await
        .map_err(|e| PipelineError::internal(format!("Export task failed: {}", e)))??;

        let path = self
            .root
            .join(SHARED_DIR_NAME)
            .join(format!("{}.png", SHARED_FILE_NAME));
        write_durably(&path, &bytes).await?;
        log::info!("Exported {} to {}", image.path.display(), path.display());
        Ok(ImageHandle::new(path, bytes.len() as u64))
    }
}

/// Strip one extension from the input's file name and append the marker
///
/// Only the final path component is used. The extension is whatever follows
/// the last `.`, provided that dot is neither the first nor the last
/// character; otherwise the name is kept whole.
///
/// ```rust
/// use bg_remover::store::resolve_output_name;
///
/// assert_eq!(resolve_output_name("beach.jpg"), "beach-no-bg");
/// assert_eq!(resolve_output_name("a.b.c.png"), "a.b.c-no-bg");
/// assert_eq!(resolve_output_name("README"), "README-no-bg");
/// ```
#[must_use]
pub fn resolve_output_name(input_name: &str) -> String {
    format!("{}{}", strip_extension(input_name), PROCESSED_MARKER)
}

/// Whether `name` already carries the processed marker
#[must_use]
pub fn is_already_processed(name: &str) -> bool {
    name.contains(PROCESSED_MARKER)
}

/// Final path component with a single trailing extension removed
#[must_use]
pub fn strip_extension(input_name: &str) -> &str {
    let file_name = input_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(input_name);
    match file_name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < file_name.len() => file_name.get(..dot).unwrap_or(file_name),
        _ => file_name,
    }
}

/// Lossless PNG with the strongest compression the encoder offers
pub(crate) fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, FilterType::Adaptive);
    image.write_with_encoder(encoder)?;
    Ok(buffer)
}

async fn write_durably(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::file_io_error("create project directory", parent, &e))?;
    }

    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| PipelineError::file_io_error("create file", path, &e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| PipelineError::file_io_error("write to file", path, &e))?;
    file.flush()
        .await
        .map_err(|e| PipelineError::file_io_error("flush file", path, &e))?;
    file.sync_all()
        .await
        .map_err(|e| PipelineError::file_io_error("sync file", path, &e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::tempdir;

    #[test]
    fn test_resolve_output_name() {
        assert_eq!(resolve_output_name("beach.jpg"), "beach-no-bg");
        assert_eq!(resolve_output_name("photo"), "photo-no-bg");
        assert_eq!(resolve_output_name("a.b.c.png"), "a.b.c-no-bg");
        assert_eq!(resolve_output_name(".hidden"), ".hidden-no-bg");
        assert_eq!(resolve_output_name("trailing."), "trailing.-no-bg");
        assert_eq!(resolve_output_name("/sd/Camera/beach.jpg"), "beach-no-bg");
        assert_eq!(resolve_output_name("dir.d/photo"), "photo-no-bg");
    }

    #[test]
    fn test_is_already_processed() {
        assert!(is_already_processed("beach-no-bg"));
        assert!(is_already_processed("beach-no-bg.png"));
        assert!(!is_already_processed("beach.jpg"));
        assert!(!is_already_processed("no-bg.jpg"));
    }

    #[tokio::test]
    async fn test_save_creates_directory_and_overwrites() {
        let temp_dir = tempdir().unwrap();
        let store = ImageStore::new(temp_dir.path().join("nested").join("project"));

        let first = store.save("beach-no-bg", b"first").await.unwrap();
        assert!(first.path.exists());
        assert_eq!(first.size_bytes, 5);

        let second = store.save("beach-no-bg", b"second!").await.unwrap();
        assert_eq!(first.path, second.path);
        assert_eq!(std::fs::read(&second.path).unwrap(), b"second!");

        let entries: Vec<_> = std::fs::read_dir(store.root()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_handle_for_reads_size() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("input.jpg");
        std::fs::write(&path, vec![0u8; 42]).unwrap();

        let handle = ImageStore::handle_for(&path).await.unwrap();
        assert_eq!(handle.size_bytes, 42);
        assert_eq!(handle.mime_hint.as_deref(), Some("image/jpeg"));

        assert!(ImageStore::handle_for(temp_dir.path().join("missing.jpg"))
            .await
            .is_err());
        assert!(ImageStore::handle_for(temp_dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let store = ImageStore::new(temp_dir.path());
        let handle = store.save("work", b"bytes").await.unwrap();

        store.remove(&handle).await.unwrap();
        assert!(!handle.path.exists());
        store.remove(&handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_export_shared_overwrites_single_file() {
        let temp_dir = tempdir().unwrap();
        let store = ImageStore::new(temp_dir.path());

        let red = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255])));
        let blue = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 0])));
        let red_handle = store.save_image("red-no-bg", red).await.unwrap();
        let blue_handle = store.save_image("blue-no-bg", blue).await.unwrap();

        let first = store.export_shared(&red_handle).await.unwrap();
        let second = store.export_shared(&blue_handle).await.unwrap();
        assert_eq!(first.path, second.path);
        assert!(second.path.ends_with("shared/shared-no-bg.png"));

        let exported = image::open(&second.path).unwrap();
        assert_eq!(exported.width(), 2);
        let shared_entries: Vec<_> = std::fs::read_dir(store.root().join(SHARED_DIR_NAME))
            .unwrap()
            .collect();
        assert_eq!(shared_entries.len(), 1);
    }

    #[tokio::test]
    async fn test_export_shared_rejects_garbage() {
        let temp_dir = tempdir().unwrap();
        let store = ImageStore::new(temp_dir.path());
        let junk = store.save("junk", b"not an image").await.unwrap();
        assert!(matches!(
            store.export_shared(&junk).await,
            Err(PipelineError::Decode(_))
        ));
    }
}
