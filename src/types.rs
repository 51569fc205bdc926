//! Core types for the marker icon registry

use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Registry key: the normalized image-source URI.
///
/// Owned by the registry entry and released with it.
pub type IconKey = Arc<str>;

/// Where an image-source property points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// `http://` or `https://` URI
    Remote,
    /// `file://` URI or absolute filesystem path
    File,
    /// Named asset bundled with the application
    Resource,
}

impl SourceKind {
    /// Get a human-readable name for the source kind
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Remote => "Remote",
            SourceKind::File => "File",
            SourceKind::Resource => "Resource",
        }
    }
}

/// A normalized marker image source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IconSource {
    uri: String,
    kind: SourceKind,
}

impl IconSource {
    /// Classify an `image`/`icon` property value.
    ///
    /// Absent or blank values mean "no custom icon" and yield `None`.
    pub fn parse(source: Option<&str>) -> Option<Self> {
        let uri = source?.trim();
        if uri.is_empty() {
            return None;
        }

        let lower = uri.to_ascii_lowercase();
        let kind = if lower.starts_with("http://") || lower.starts_with("https://") {
            SourceKind::Remote
        } else if lower.starts_with("file://") || uri.starts_with('/') {
            SourceKind::File
        } else {
            SourceKind::Resource
        };

        Some(Self {
            uri: uri.to_string(),
            kind,
        })
    }

    /// The normalized URI, used as the registry key
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Filesystem path for `File` sources
    pub fn path(&self) -> Option<PathBuf> {
        if self.kind != SourceKind::File {
            return None;
        }
        let path = self
            .uri
            .get(..7)
            .filter(|scheme| scheme.eq_ignore_ascii_case("file://"))
            .map_or(self.uri.as_str(), |_| &self.uri[7..]);
        Some(PathBuf::from(path))
    }
}

/// A decoded icon as handed to markers
///
/// `descriptor` is the mapping SDK's handle for the icon; `bitmap` is the
/// registry's private RGBA copy of the decoded pixels and is never mutated
/// once shared.
#[derive(Debug)]
pub struct IconArtifact<D> {
    pub descriptor: D,
    pub bitmap: Arc<RgbaImage>,
}

impl<D: Clone> Clone for IconArtifact<D> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            bitmap: Arc::clone(&self.bitmap),
        }
    }
}

impl<D> IconArtifact<D> {
    /// Width and height of the shared bitmap
    pub fn dimensions(&self) -> (u32, u32) {
        self.bitmap.dimensions()
    }
}

/// A marker view that wants the shared icon for its image source.
///
/// Called with the entry lock held, so implementations must not call back
/// into the same [`crate::SharedIcon`] or into the registry that owns it.
pub trait IconSubscriber<D>: Send + Sync {
    /// Receive the decoded icon (the SDK's `setIcon` equivalent)
    fn set_icon(&self, artifact: &IconArtifact<D>);
}

/// Snapshot of registry state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStatistics {
    /// Entries currently held by the registry
    pub entries: usize,
    /// Live subscribers summed over all entries
    pub live_subscribers: usize,
    /// Entries that already hold a decoded icon
    pub loaded_entries: usize,
    /// Entries whose load was claimed but has not reported back
    pub pending_loads: usize,
    /// Entries created since the registry was constructed
    pub entries_created: u64,
    /// Entries removed by `remove_if_empty`
    pub entries_evicted: u64,
}
