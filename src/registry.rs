//! Process-wide registry of shared marker icons
//!
//! Maps an image-source URI to the [`SharedIcon`] every marker using that
//! URI subscribes to. Entries are created on first use and evicted, key
//! included, once their last subscriber leaves.
//!
//! Lock order is always registry shard, then entry. Entry operations never
//! take a shard lock, so a marker holding an `Arc<SharedIcon>` never
//! contends with unrelated keys.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::RandomState;
use dashmap::DashMap;

use crate::{
    config::SharedIconConfig,
    icon::SharedIcon,
    types::{IconKey, IconSubscriber, RegistryStatistics},
};

/// Registry of shared icons keyed by image URI
pub struct SharedIconRegistry<D> {
    entries: DashMap<IconKey, Arc<SharedIcon<D>>, RandomState>,

    entries_created: AtomicU64,
    entries_evicted: AtomicU64,
}

impl<D> Default for SharedIconRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> SharedIconRegistry<D> {
    /// Create a registry with the default configuration
    pub fn new() -> Self {
        Self::with_config(&SharedIconConfig::default())
    }

    /// Create a registry with explicit sizing
    pub fn with_config(config: &SharedIconConfig) -> Self {
        log::debug!(
            "Creating shared icon registry (capacity {}, {} shards)",
            config.initial_capacity,
            config.shard_amount
        );

        Self {
            entries: DashMap::with_capacity_and_hasher_and_shard_amount(
                config.initial_capacity,
                RandomState::new(),
                config.shard_amount,
            ),
            entries_created: AtomicU64::new(0),
            entries_evicted: AtomicU64::new(0),
        }
    }

    /// Get the entry for `uri`, creating it if this is the first request.
    ///
    /// Concurrent first requests for the same URI all receive the same
    /// entry. A freshly created entry has not started loading; whoever wins
    /// [`SharedIcon::should_load_image`] must decode it.
    pub fn get_or_create(&self, uri: &str) -> Arc<SharedIcon<D>> {
        // Read-locked fast path for the common case of an existing entry
        if let Some(icon) = self.entries.get(uri) {
            return Arc::clone(icon.value());
        }

        // `entry` holds the shard write lock, so the absence check and the
        // insert happen as one step
        let icon = self.entries.entry(IconKey::from(uri)).or_insert_with(|| {
            self.entries_created.fetch_add(1, Ordering::Relaxed);
            log::debug!("Created shared icon entry for '{}'", uri);
            Arc::new(SharedIcon::new())
        });
        Arc::clone(icon.value())
    }

    /// Get the entry for `uri` without creating one
    pub fn get(&self, uri: &str) -> Option<Arc<SharedIcon<D>>> {
        self.entries.get(uri).map(|icon| Arc::clone(icon.value()))
    }

    /// Whether an entry for `uri` is currently registered
    pub fn contains(&self, uri: &str) -> bool {
        self.entries.contains_key(uri)
    }

    /// Evict the entry for `uri` if no live marker is subscribed to it.
    ///
    /// Returns `true` if an entry was removed. The final emptiness check
    /// runs under both the shard lock and the entry lock, and the removed
    /// entry is retired so a marker still holding it cannot subscribe to it
    /// afterwards.
    pub fn remove_if_empty(&self, uri: &str) -> bool {
        let in_use = match self.entries.get(uri) {
            Some(icon) => icon.has_subscribers(),
            None => return false,
        };
        if in_use {
            return false;
        }

        let removed = self
            .entries
            .remove_if(uri, |_, icon| icon.retire_if_empty())
            .is_some();

        if removed {
            self.entries_evicted.fetch_add(1, Ordering::Relaxed);
            log::debug!("Evicted shared icon entry for '{}'", uri);
        }
        removed
    }

    /// Number of registered entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys of the currently registered entries
    pub fn keys(&self) -> Vec<IconKey> {
        self.entries.iter().map(|entry| IconKey::clone(entry.key())).collect()
    }

    /// Snapshot of the registry's current state
    pub fn statistics(&self) -> RegistryStatistics {
        let mut stats = RegistryStatistics {
            entries_created: self.entries_created.load(Ordering::Relaxed),
            entries_evicted: self.entries_evicted.load(Ordering::Relaxed),
            ..RegistryStatistics::default()
        };

        for entry in self.entries.iter() {
            let icon = entry.value();
            stats.entries += 1;
            stats.live_subscribers += icon.subscriber_count();
            if icon.is_loaded() {
                stats.loaded_entries += 1;
            } else if icon.load_started() {
                stats.pending_loads += 1;
            }
        }

        stats
    }
}

impl<D: 'static> SharedIconRegistry<D> {
    /// Subscribe `marker` to the entry for `uri` and return that entry.
    ///
    /// This is `get_or_create` followed by `add_marker`, retried on a fresh
    /// entry if the first one was evicted in between. The marker is always
    /// registered on the entry the registry currently holds for `uri`.
    pub fn subscribe<M>(&self, uri: &str, marker: &Arc<M>) -> Arc<SharedIcon<D>>
    where
        M: IconSubscriber<D> + 'static,
    {
        loop {
            let icon = self.get_or_create(uri);
            if icon.add_marker(marker) {
                return icon;
            }
            log::trace!("Shared icon for '{}' evicted during subscribe, retrying", uri);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IconArtifact;
    use image::{DynamicImage, RgbaImage};
    use parking_lot::Mutex;
    use std::sync::Barrier;

    #[derive(Default)]
    struct RecordingMarker {
        received: Mutex<Vec<u32>>,
    }

    impl IconSubscriber<u32> for RecordingMarker {
        fn set_icon(&self, artifact: &IconArtifact<u32>) {
            self.received.lock().push(artifact.descriptor);
        }
    }

    fn bitmap() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::new(2, 2))
    }

    #[test]
    fn test_get_or_create_returns_same_entry() {
        let registry = SharedIconRegistry::<u32>::new();
        let first = registry.get_or_create("pin.png");
        let second = registry.get_or_create("pin.png");
        let other = registry.get_or_create("flag.png");

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("pin.png"));
        assert!(!registry.contains("missing.png"));
        assert!(registry.get("missing.png").is_none());
    }

    #[test]
    fn test_concurrent_get_or_create_single_entry() {
        const THREADS: usize = 16;
        let registry = SharedIconRegistry::<u32>::new();
        let barrier = Barrier::new(THREADS);

        let icons: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        registry.get_or_create("pin.png")
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(icons.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.statistics().entries_created, 1);
    }

    #[test]
    fn test_remove_if_empty() {
        let registry = SharedIconRegistry::<u32>::new();
        assert!(!registry.remove_if_empty("never-seen.png"));

        let marker = Arc::new(RecordingMarker::default());
        let icon = registry.subscribe("pin.png", &marker);
        assert!(!registry.remove_if_empty("pin.png"));
        assert!(registry.contains("pin.png"));

        icon.remove_marker(&marker);
        assert!(!icon.has_subscribers());
        assert!(registry.remove_if_empty("pin.png"));
        assert!(!registry.contains("pin.png"));
        assert!(icon.is_retired());
        assert!(!registry.remove_if_empty("pin.png"));
        assert_eq!(registry.statistics().entries_evicted, 1);
    }

    #[test]
    fn test_evicted_keys_are_released() {
        let registry = SharedIconRegistry::<u32>::new();
        for i in 0..10_000 {
            let uri = format!("https://tiles.example.com/pin.png?sig={i}");
            registry.get_or_create(&uri);
            assert!(registry.remove_if_empty(&uri));
        }
        assert!(registry.is_empty());
        assert!(registry.keys().is_empty());

        let marker = Arc::new(RecordingMarker::default());
        let icon = registry.subscribe("pin.png", &marker);
        let keys = registry.keys();
        assert_eq!(keys.len(), 1);
        let key = IconKey::clone(&keys[0]);
        drop(keys);
        assert_eq!(&*key, "pin.png");
        assert_eq!(Arc::strong_count(&key), 2);

        icon.remove_marker(&marker);
        assert!(registry.remove_if_empty("pin.png"));
        assert_eq!(Arc::strong_count(&key), 1);
    }

    #[test]
    fn test_dropped_marker_allows_eviction() {
        let registry = SharedIconRegistry::<u32>::new();
        let marker = Arc::new(RecordingMarker::default());
        registry.subscribe("pin.png", &marker);
        drop(marker);

        assert!(registry.remove_if_empty("pin.png"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_subscribe_after_eviction_uses_fresh_entry() {
        let registry = SharedIconRegistry::<u32>::new();
        let stale = registry.get_or_create("pin.png");
        assert!(stale.should_load_image());
        assert!(registry.remove_if_empty("pin.png"));

        let marker = Arc::new(RecordingMarker::default());
        assert!(!stale.add_marker(&marker));

        let fresh = registry.subscribe("pin.png", &marker);
        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert!(fresh.has_subscribers());
        assert!(fresh.should_load_image());
    }

    #[test]
    fn test_shared_load_scenario() {
        let registry = SharedIconRegistry::<u32>::new();
        let marker_a = Arc::new(RecordingMarker::default());
        let marker_b = Arc::new(RecordingMarker::default());

        let entry_a = registry.get_or_create("pin.png");
        assert!(entry_a.should_load_image());
        entry_a.add_marker(&marker_a);

        let entry_b = registry.get_or_create("pin.png");
        assert!(Arc::ptr_eq(&entry_a, &entry_b));
        assert!(!entry_b.should_load_image());
        entry_b.add_marker(&marker_b);

        entry_a.update_icon(11, &bitmap());

        assert_eq!(*marker_a.received.lock(), vec![11]);
        assert_eq!(*marker_b.received.lock(), vec![11]);
        assert!(!registry.get_or_create("pin.png").should_load_image());
    }

    #[test]
    fn test_statistics() {
        let registry = SharedIconRegistry::<u32>::new();
        let marker = Arc::new(RecordingMarker::default());

        registry.subscribe("loaded.png", &marker).update_icon(1, &bitmap());
        registry.subscribe("pending.png", &marker).should_load_image();
        registry.get_or_create("idle.png");

        let stats = registry.statistics();
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.live_subscribers, 2);
        assert_eq!(stats.loaded_entries, 1);
        assert_eq!(stats.pending_loads, 1);
        assert_eq!(stats.entries_created, 3);
        assert_eq!(stats.entries_evicted, 0);
    }
}
