#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod error;
pub use error::ProcessingError;

/// Feature descriptors, matching and correspondence rejection.
pub mod correspondence;

/// Point cloud filters.
pub mod filter;

/// Keypoint detectors.
pub mod keypoint;

/// Surface reconstruction.
pub mod reconstruction;

/// Point cloud registration.
pub mod registration;

/// Rigid transform estimation and robust fitting.
pub mod rigid;
