//! Fleet telemetry normalization.
//!
//! Turns the raw, dialect-laden device payloads that Windows and macOS
//! collectors upload into one canonical device record for the dashboard.
//! Entry point is [`Normalizer`].

pub mod applications;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod hardware;
pub mod installs;
pub mod network;
pub mod normalizer;
pub mod policy;
pub mod profiles;
pub mod reconcile;
pub mod registry;
pub mod security;
pub mod system;
pub mod timestamp;
pub mod units;
pub mod usage;

pub use config::{NormalizeConfig, CONFIG_FILE};
pub use device::{derive_status, CanonicalDevice, DeviceStatus};
pub use error::{FleetError, Result};
pub use normalizer::Normalizer;
pub use registry::{ModuleKind, ModuleRegistry};
pub use system::Platform;
pub use timestamp::{CompactRelativeTime, RelativeTimeFormatter};
