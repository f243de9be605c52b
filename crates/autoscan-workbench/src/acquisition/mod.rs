//! Frame delivery from a grabber into the workbench.
//!
//! A grabber ([`AcquisitionSource`]) pushes frames from its own thread to registered
//! [`FrameObserver`]s. The [`FrameBridge`] is the workbench observer: it keeps the latest frame
//! for "keep one frame" and forwards throttled frames to the consumer while continuous capture
//! is active.

mod bridge;
pub use bridge::{CapturedFrame, FrameBridge};

mod replay;
pub use replay::ReplaySource;

mod throttle;
pub use throttle::FrameThrottle;

use std::{sync::Arc, time::Duration};

use autoscan_3d::pointcloud::PointCloud;

/// Error types for the acquisition sources.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AcquisitionError {
    /// No grabber is running.
    #[error("No active grabber")]
    NoActiveGrabber,

    /// The grabber is already streaming.
    #[error("Grabber is already running")]
    AlreadyRunning,

    /// The capture thread could not be started.
    #[error("Failed to spawn the capture thread")]
    Spawn(#[from] std::io::Error),
}

/// A frame as delivered by a grabber.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The captured cloud, shared with every observer.
    pub cloud: Arc<PointCloud>,
    /// Capture time on the producer's monotonic clock.
    pub timestamp: Duration,
}

/// Receives frames on the producer thread.
pub trait FrameObserver: Send + Sync {
    /// Called once per delivered frame. Must not block.
    fn on_frame(&self, frame: Frame);
}

/// Handle returned by [`AcquisitionSource::register_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// A camera grabber.
pub trait AcquisitionSource: Send {
    /// Subscribe an observer to the frame stream.
    fn register_observer(&mut self, observer: Arc<dyn FrameObserver>) -> ObserverId;

    /// Detach an observer. Returns whether it was registered.
    fn unregister_observer(&mut self, id: ObserverId) -> bool;

    /// Start streaming frames.
    fn start(&mut self) -> Result<(), AcquisitionError>;

    /// Stop streaming frames and release the device.
    fn stop(&mut self) -> Result<(), AcquisitionError>;

    /// Set the minimum depth confidence of the delivered points.
    fn set_depth_confidence(&mut self, value: i32) -> Result<(), AcquisitionError>;
}
