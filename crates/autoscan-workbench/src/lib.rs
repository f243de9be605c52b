#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod error;
pub use error::WorkbenchError;

/// Frame sources, the live frame bridge and continuous capture.
pub mod acquisition;

/// Serial style actuator commands.
pub mod actuator;

/// Persisted workbench settings.
pub mod config;

/// Registry elements and their payloads.
pub mod element;

/// Stage orchestration over the selected elements.
pub mod pipeline;

/// The ordered element registry.
pub mod registry;

/// Rendering seam.
pub mod render;

/// Point cloud file storage.
pub mod store;

mod workbench;
pub use workbench::{Strategies, Workbench};
