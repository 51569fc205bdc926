//! Per-marker image-source state
//!
//! A marker view owns one [`MarkerIconBinding`] and forwards its `image` /
//! `icon` property to [`MarkerIconBinding::set_image`]. The binding moves
//! the marker between registry entries and says whether this marker must
//! perform the decode.

use std::sync::Arc;

use crate::{
    icon::SharedIcon,
    registry::SharedIconRegistry,
    types::{IconSource, IconSubscriber},
};

/// What the marker has to do after an image-source change
pub enum ImageRequest<D> {
    /// Same source as before; nothing changed
    Unchanged,
    /// Source removed; the marker should fall back to its default pin
    Cleared,
    /// Another marker is decoding this source. The icon arrives through
    /// `set_icon`, or already has if it was decoded earlier.
    Pending { icon: Arc<SharedIcon<D>> },
    /// This marker won the load and must decode `source`, then report it
    /// with [`SharedIcon::update_icon`] (see [`crate::loader::decode_into`]).
    Load {
        icon: Arc<SharedIcon<D>>,
        source: IconSource,
    },
}

impl<D> ImageRequest<D> {
    /// Whether the caller is responsible for decoding
    pub fn needs_load(&self) -> bool {
        matches!(self, ImageRequest::Load { .. })
    }
}

/// Tracks which shared icon a single marker is subscribed to
pub struct MarkerIconBinding<D> {
    current: Option<(IconSource, Arc<SharedIcon<D>>)>,
}

impl<D> Default for MarkerIconBinding<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> MarkerIconBinding<D> {
    pub fn new() -> Self {
        Self { current: None }
    }

    /// The source the marker is currently subscribed to
    pub fn source(&self) -> Option<&IconSource> {
        self.current.as_ref().map(|(source, _)| source)
    }

    /// Registry key (normalized URI) the marker is currently subscribed to
    pub fn current_key(&self) -> Option<&str> {
        self.source().map(IconSource::uri)
    }

    /// The entry the marker is currently subscribed to
    pub fn icon(&self) -> Option<&Arc<SharedIcon<D>>> {
        self.current.as_ref().map(|(_, icon)| icon)
    }
}

impl<D: 'static> MarkerIconBinding<D> {
    /// Apply a new `image` property value.
    ///
    /// Leaves the previous entry (evicting it if this was its last marker),
    /// subscribes to the new one and claims its load if nobody has yet.
    pub fn set_image<M>(
        &mut self,
        registry: &SharedIconRegistry<D>,
        marker: &Arc<M>,
        source: Option<&str>,
    ) -> ImageRequest<D>
    where
        M: IconSubscriber<D> + 'static,
    {
        let next = IconSource::parse(source);
        if next.as_ref().map(IconSource::uri) == self.source().map(IconSource::uri) {
            return ImageRequest::Unchanged;
        }

        self.clear(registry, marker);
        let Some(next) = next else {
            return ImageRequest::Cleared;
        };

        let icon = registry.subscribe(next.uri(), marker);
        self.current = Some((next.clone(), Arc::clone(&icon)));

        if icon.should_load_image() {
            log::debug!("Marker claimed {} icon load for '{}'", next.kind().name(), next.uri());
            ImageRequest::Load { icon, source: next }
        } else {
            ImageRequest::Pending { icon }
        }
    }

    /// Leave the current entry, if any. Call when the marker is destroyed.
    ///
    /// Returns `true` if the marker was subscribed to something.
    pub fn clear<M>(&mut self, registry: &SharedIconRegistry<D>, marker: &Arc<M>) -> bool
    where
        M: IconSubscriber<D> + 'static,
    {
        let Some((source, icon)) = self.current.take() else {
            return false;
        };
        icon.remove_marker(marker);
        registry.remove_if_empty(source.uri());
        true
    }
}
