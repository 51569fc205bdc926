//! Icon decoding for the marker that wins a shared load
//!
//! The registry never decodes anything itself. Whoever gets `true` from
//! [`SharedIcon::should_load_image`] runs an [`IconDecoder`] on a blocking
//! worker and reports the result back with `update_icon`. A failed decode
//! leaves the entry claimed and empty: no other marker retries it until the
//! entry is evicted and created again.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tokio::task;

use crate::{
    error::{IconError, Result},
    icon::SharedIcon,
    types::{IconSource, SourceKind},
};

/// Turns an image source into the SDK descriptor plus its bitmap
pub trait IconDecoder<D>: Send + Sync + 'static {
    fn decode(&self, source: &IconSource) -> Result<(D, DynamicImage)>;
}

/// Descriptor produced by [`FileIconDecoder`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconDescriptor {
    pub uri: String,
    pub width: u32,
    pub height: u32,
}

/// Decodes local files and bundled resources with the `image` crate.
///
/// Resource names are looked up under the resource root, with `.png`
/// appended when the name has no extension. Remote sources are rejected.
#[derive(Debug, Clone, Default)]
pub struct FileIconDecoder {
    resource_root: Option<PathBuf>,
}

impl FileIconDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the directory bundled resource names resolve against
    pub fn with_resource_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.resource_root = Some(root.into());
        self
    }

    fn resolve(&self, source: &IconSource) -> Result<PathBuf> {
        match source.kind() {
            SourceKind::File => source
                .path()
                .ok_or_else(|| IconError::UnsupportedSource(source.uri().to_string())),
            SourceKind::Resource => {
                let root = self
                    .resource_root
                    .as_ref()
                    .ok_or_else(|| IconError::UnsupportedSource(source.uri().to_string()))?;
                let mut path = root.join(source.uri());
                if path.extension().is_none() {
                    path.set_extension("png");
                }
                Ok(path)
            }
            SourceKind::Remote => Err(IconError::UnsupportedSource(source.uri().to_string())),
        }
    }
}

impl IconDecoder<IconDescriptor> for FileIconDecoder {
    fn decode(&self, source: &IconSource) -> Result<(IconDescriptor, DynamicImage)> {
        let path = self.resolve(source)?;
        let image = open_image(&path)?;
        let descriptor = IconDescriptor {
            uri: source.uri().to_string(),
            width: image.width(),
            height: image.height(),
        };
        Ok((descriptor, image))
    }
}

fn open_image(path: &Path) -> Result<DynamicImage> {
    if !path.is_file() {
        return Err(IconError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("icon file not found: {}", path.display()),
        )));
    }
    let image = image::open(path)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(IconError::Decode(format!("empty image: {}", path.display())));
    }
    Ok(image)
}

/// Decode `source` on a blocking worker and publish it to `icon`.
///
/// For callers that already won `should_load_image` (for example through
/// [`crate::binding::ImageRequest::Load`]). Errors are logged and returned;
/// the entry stays without an icon.
pub async fn decode_into<D, T>(
    icon: &SharedIcon<D>,
    source: IconSource,
    decoder: Arc<T>,
) -> Result<()>
where
    D: Send + 'static,
    T: IconDecoder<D> + ?Sized,
{
    let uri = source.uri().to_string();
    let decoded = task::spawn_blocking(move || decoder.decode(&source)).await?;

    match decoded {
        Ok((descriptor, image)) => {
            icon.update_icon_rgba(descriptor, image.into_rgba8());
            log::debug!("Loaded shared marker icon '{}'", uri);
            Ok(())
        }
        Err(e) => {
            log::warn!("Failed to load marker icon '{}': {}", uri, e);
            Err(e)
        }
    }
}

/// Claim the load for `icon` and, if this caller won, decode it.
///
/// Returns `Ok(false)` without decoding when another caller already owns
/// the load.
pub async fn load_shared_icon<D, T>(
    icon: &SharedIcon<D>,
    source: IconSource,
    decoder: Arc<T>,
) -> Result<bool>
where
    D: Send + 'static,
    T: IconDecoder<D> + ?Sized,
{
    if !icon.should_load_image() {
        return Ok(false);
    }
    decode_into(icon, source, decoder).await?;
    Ok(true)
}
