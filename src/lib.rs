//! Shared icon cache for native map-marker views
//!
//! Many markers on a map usually show the same handful of images. This
//! crate lets every marker that uses one image source subscribe to a single
//! [`SharedIcon`], makes sure only one of them decodes the image, and hands
//! the decoded icon to all of them, including markers that show up after
//! the decode finished.
//!
//! The [`SharedIconRegistry`] is an ordinary value: construct one per map
//! view manager (or per test) and pass it to the markers that need it.

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod binding;
pub mod config;
pub mod error;
pub mod icon;
pub mod loader;
pub mod registry;
pub mod types;

pub use binding::{ImageRequest, MarkerIconBinding};
pub use config::SharedIconConfig;
pub use error::{IconError, Result};
pub use icon::SharedIcon;
pub use loader::{FileIconDecoder, IconDecoder, IconDescriptor, decode_into, load_shared_icon};
pub use registry::SharedIconRegistry;
pub use types::{IconArtifact, IconKey, IconSource, IconSubscriber, RegistryStatistics, SourceKind};

/// Install `env_logger` as the `log` backend.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::try_init();
}
