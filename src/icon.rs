//! Per-key shared icon entry
//!
//! A [`SharedIcon`] tracks every marker currently showing one image source,
//! hands out the single right to decode that image, and fans the decoded
//! result out to its subscribers. All state sits behind one entry-level
//! lock; the registry's shard locks are only taken above it, never below.

use std::sync::{Arc, Weak};

use ahash::AHashMap;
use image::{DynamicImage, RgbaImage};
use parking_lot::Mutex;

use crate::types::{IconArtifact, IconSubscriber};

type SubscriberId = usize;

fn subscriber_id<T: ?Sized>(ptr: *const T) -> SubscriberId {
    ptr as *const () as usize
}

struct IconState<D> {
    artifact: Option<IconArtifact<D>>,
    /// Keyed by allocation address; a stale entry whose address got reused
    /// is overwritten on insert.
    subscribers: AHashMap<SubscriberId, Weak<dyn IconSubscriber<D>>>,
    load_started: bool,
    /// Set once the registry has dropped this entry. No new subscribers.
    retired: bool,
}

impl<D> IconState<D> {
    fn prune_dead(&mut self) {
        self.subscribers.retain(|_, marker| marker.strong_count() > 0);
    }

    fn live_count(&self) -> usize {
        self.subscribers
            .values()
            .filter(|marker| marker.strong_count() > 0)
            .count()
    }
}

/// Icon shared by every marker that uses the same image source
pub struct SharedIcon<D> {
    state: Mutex<IconState<D>>,
}

impl<D> Default for SharedIcon<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> SharedIcon<D> {
    /// Create an empty entry: no icon, no subscribers, load not started
    pub fn new() -> Self {
        Self {
            state: Mutex::new(IconState {
                artifact: None,
                subscribers: AHashMap::new(),
                load_started: false,
                retired: false,
            }),
        }
    }

    /// Claim the right to load this icon.
    ///
    /// Returns `true` to exactly one caller over the entry's lifetime. That
    /// caller must decode the image and report it through
    /// [`update_icon`](Self::update_icon); everyone else gets `false` and is
    /// served by the fan-out once they have called
    /// [`add_marker`](Self::add_marker).
    pub fn should_load_image(&self) -> bool {
        let mut state = self.state.lock();
        if state.load_started {
            return false;
        }
        state.load_started = true;
        true
    }

    /// Unsubscribe `marker`. No-op if it was never subscribed.
    ///
    /// Does not evict the entry; follow up with
    /// [`SharedIconRegistry::remove_if_empty`](crate::SharedIconRegistry::remove_if_empty).
    pub fn remove_marker<M>(&self, marker: &Arc<M>)
    where
        M: IconSubscriber<D> + 'static,
    {
        let mut state = self.state.lock();
        state.subscribers.remove(&subscriber_id(Arc::as_ptr(marker)));
        state.prune_dead();
    }

    /// Whether any live marker is still subscribed.
    ///
    /// `true` means the entry must be kept. Markers dropped without
    /// unsubscribing do not count.
    pub fn has_subscribers(&self) -> bool {
        let state = self.state.lock();
        state
            .subscribers
            .values()
            .any(|marker| marker.strong_count() > 0)
    }

    /// Number of live subscribed markers
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().live_count()
    }

    /// Whether a load has been claimed through `should_load_image`
    pub fn load_started(&self) -> bool {
        self.state.lock().load_started
    }

    /// Whether a decoded icon has been reported
    pub fn is_loaded(&self) -> bool {
        self.state.lock().artifact.is_some()
    }

    /// Whether the registry has evicted this entry
    pub fn is_retired(&self) -> bool {
        self.state.lock().retired
    }

    /// Mark the entry retired if it has no live subscribers.
    ///
    /// Called by the registry while it holds the shard lock for this key, so
    /// the check and the eviction are atomic with respect to `add_marker`.
    #[cfg(test)]
    pub(crate) fn stored_subscribers(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    pub(crate) fn retire_if_empty(&self) -> bool {
        let mut state = self.state.lock();
        state.prune_dead();
        if !state.subscribers.is_empty() {
            return false;
        }
        state.retired = true;
        true
    }
}

impl<D: Clone> SharedIcon<D> {
    /// The decoded icon, if one has been reported
    pub fn artifact(&self) -> Option<IconArtifact<D>> {
        self.state.lock().artifact.clone()
    }
}

impl<D: 'static> SharedIcon<D> {
    /// Subscribe `marker` to this icon.
    ///
    /// If the icon is already decoded the marker receives it before this
    /// returns. Subscribing twice is a no-op apart from that delivery.
    ///
    /// Returns `false` without subscribing if the registry has already
    /// evicted this entry; the caller must fetch a fresh entry.
    /// [`SharedIconRegistry::subscribe`](crate::SharedIconRegistry::subscribe)
    /// does that retry.
    pub fn add_marker<M>(&self, marker: &Arc<M>) -> bool
    where
        M: IconSubscriber<D> + 'static,
    {
        let mut state = self.state.lock();
        if state.retired {
            return false;
        }

        // Drop markers that went away without unsubscribing
        state.prune_dead();

        let weak: Weak<M> = Arc::downgrade(marker);
        let weak: Weak<dyn IconSubscriber<D>> = weak;
        state
            .subscribers
            .insert(subscriber_id(Arc::as_ptr(marker)), weak);

        if let Some(artifact) = &state.artifact {
            marker.set_icon(artifact);
        }
        true
    }

    /// Store a decoded icon and deliver it to every current subscriber.
    ///
    /// The entry keeps its own RGBA copy of `bitmap`; the caller's image is
    /// not retained.
    pub fn update_icon(&self, descriptor: D, bitmap: &DynamicImage) {
        self.publish(IconArtifact {
            descriptor,
            bitmap: Arc::new(bitmap.to_rgba8()),
        });
    }

    /// Like [`update_icon`](Self::update_icon) but takes ownership of an
    /// already-converted bitmap instead of copying it.
    pub fn update_icon_rgba(&self, descriptor: D, bitmap: RgbaImage) {
        self.publish(IconArtifact {
            descriptor,
            bitmap: Arc::new(bitmap),
        });
    }

    fn publish(&self, artifact: IconArtifact<D>) {
        let mut state = self.state.lock();
        let state = &mut *state;
        let artifact = state.artifact.insert(artifact);

        let mut delivered = 0usize;
        state.subscribers.retain(|_, marker| match marker.upgrade() {
            Some(marker) => {
                marker.set_icon(artifact);
                delivered += 1;
                true
            }
            None => false,
        });

        log::trace!("Shared icon delivered to {} markers", delivered);
    }
}
