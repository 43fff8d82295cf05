//! Image storage collaborators.
//!
//! Annotated images are handed to an `ImageStore`, which files them under an album and
//! reports the stored name. The filesystem store claims its file name up front with an
//! empty placeholder, writes to a temporary file and renames it over the claim. The final
//! name holds either that empty placeholder or the complete PNG, never a partial one.

use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, RgbaImage};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Where an image ended up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredImage {
    /// File name as recorded in the detection log, e.g. `pothole_1700000000000.png`.
    pub name: String,
    pub location: PathBuf,
}

pub trait ImageStore: Send + Sync {
    fn store(&self, image: &RgbaImage, prefix: &str, album: &str) -> Result<StoredImage>;
}

fn file_stem(prefix: &str) -> Result<String> {
    Ok(format!("{}_{}", prefix, crate::now_ms()?))
}

/// Stores PNG files under `<root>/<album>/`.
#[derive(Debug, Clone)]
pub struct FilesystemImageStore {
    root: PathBuf,
}

impl FilesystemImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Claim the first free `<stem>.png`, then `<stem>-1.png`, `<stem>-2.png`, ... by
    /// creating an empty placeholder, so concurrent writers never pick the same name.
    fn reserve_name(dir: &Path, stem: &str) -> Result<String> {
        let mut name = format!("{}.png", stem);
        let mut n = 1u32;
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(dir.join(&name))
            {
                Ok(_) => return Ok(name),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    name = format!("{}-{}.png", stem, n);
                    n += 1;
                }
                Err(err) => {
                    return Err(anyhow!("failed to create {}: {}", dir.join(&name).display(), err))
                }
            }
        }
    }
}

impl ImageStore for FilesystemImageStore {
    fn store(&self, image: &RgbaImage, prefix: &str, album: &str) -> Result<StoredImage> {
        let dir = self.root.join(album);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create album directory {}", dir.display()))?;

        let name = Self::reserve_name(&dir, &file_stem(prefix)?)?;
        let location = dir.join(&name);
        let tmp = dir.join(format!(".{}.tmp", name));

        let written = image
            .save_with_format(&tmp, ImageFormat::Png)
            .with_context(|| format!("failed to encode {}", tmp.display()))
            .and_then(|()| {
                std::fs::rename(&tmp, &location).with_context(|| {
                    format!("failed to move image into {}", location.display())
                })
            });
        if let Err(err) = written {
            let _ = std::fs::remove_file(&tmp);
            let _ = std::fs::remove_file(&location);
            return Err(err);
        }
        log::debug!("stored image {}", location.display());
        Ok(StoredImage { name, location })
    }
}

/// Keeps images in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryImageStore {
    images: Mutex<Vec<(StoredImage, RgbaImage)>>,
}

impl InMemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.images.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stored(&self) -> Vec<(StoredImage, RgbaImage)> {
        self.images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ImageStore for InMemoryImageStore {
    fn store(&self, image: &RgbaImage, prefix: &str, album: &str) -> Result<StoredImage> {
        let mut images = self.images.lock().unwrap_or_else(PoisonError::into_inner);
        let stem = file_stem(prefix)?;
        let taken = |name: &str| images.iter().any(|(s, _)| s.name == name);
        let mut name = format!("{}.png", stem);
        let mut n = 1u32;
        while taken(&name) {
            name = format!("{}-{}.png", stem, n);
            n += 1;
        }
        let stored = StoredImage {
            location: PathBuf::from(album).join(&name),
            name,
        };
        images.push((stored.clone(), image.clone()));
        Ok(stored)
    }
}
