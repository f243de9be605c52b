use std::{sync::Arc, time::Duration};

use autoscan_3d::pointcloud::PointCloud;
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use super::{Frame, FrameObserver, FrameThrottle};
use crate::WorkbenchError;

/// A frame accepted during continuous capture, named `"<base>_<sequence>"`.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// The element name for this frame.
    pub name: String,
    /// The captured cloud.
    pub cloud: Arc<PointCloud>,
}

#[derive(Debug)]
struct CaptureState {
    base_name: Option<String>,
    sequence: usize,
    throttle: FrameThrottle,
}

/// Observer connecting a grabber thread to the workbench.
///
/// Both locks are held for a single read or write only.
#[derive(Debug)]
pub struct FrameBridge {
    current: Mutex<Option<Arc<PointCloud>>>,
    capture: Mutex<CaptureState>,
    sender: Sender<CapturedFrame>,
}

impl FrameBridge {
    /// Create a bridge and the receiving end of its capture queue.
    ///
    /// # Arguments
    ///
    /// * `pitch` - Minimum spacing between frames kept during continuous capture.
    /// * `capacity` - Capacity of the capture queue. Frames are dropped when it is full.
    pub fn new(pitch: Duration, capacity: usize) -> (Arc<Self>, Receiver<CapturedFrame>) {
        let (sender, receiver) = bounded(capacity);
        let bridge = Self {
            current: Mutex::new(None),
            capture: Mutex::new(CaptureState {
                base_name: None,
                sequence: 0,
                throttle: FrameThrottle::new(pitch),
            }),
            sender,
        };
        (Arc::new(bridge), receiver)
    }

    /// The latest delivered frame, if any.
    pub fn current_frame(&self) -> Option<Arc<PointCloud>> {
        self.current.lock().clone()
    }

    /// Forget the latest frame.
    pub fn clear_current_frame(&self) {
        *self.current.lock() = None;
    }

    /// Enter continuous capture. The sequence restarts at 0 and the throttle is re-armed.
    ///
    /// # Errors
    ///
    /// Returns [`WorkbenchError::DuplicateOrEmptyName`] for an empty base name.
    pub fn begin(&self, base_name: &str) -> Result<(), WorkbenchError> {
        if base_name.is_empty() {
            return Err(WorkbenchError::DuplicateOrEmptyName(String::new()));
        }
        let mut state = self.capture.lock();
        state.base_name = Some(base_name.to_string());
        state.sequence = 0;
        state.throttle.rearm();
        log::info!("continuous capture started as {base_name:?}");
        Ok(())
    }

    /// Leave continuous capture. Returns whether it was active.
    pub fn end(&self) -> bool {
        let mut state = self.capture.lock();
        let was_active = state.base_name.take().is_some();
        if was_active {
            log::info!("continuous capture stopped after {} frames", state.sequence);
        }
        was_active
    }

    /// Whether continuous capture is active.
    pub fn is_capturing(&self) -> bool {
        self.capture.lock().base_name.is_some()
    }

    /// Number of frames forwarded since the last [`FrameBridge::begin`].
    pub fn sequence(&self) -> usize {
        self.capture.lock().sequence
    }
}

impl FrameObserver for FrameBridge {
    fn on_frame(&self, frame: Frame) {
        *self.current.lock() = Some(Arc::clone(&frame.cloud));

        let mut state = self.capture.lock();
        let Some(base_name) = state.base_name.as_deref() else {
            return;
        };
        let name = format!("{base_name}_{}", state.sequence);
        if !state.throttle.is_due(frame.timestamp) {
            log::trace!("dropping frame at {:?}", frame.timestamp);
            return;
        }

        // a frame that does not fit in the queue leaves the throttle and the sequence untouched
        match self.sender.try_send(CapturedFrame {
            name,
            cloud: frame.cloud,
        }) {
            Ok(()) => {
                state.throttle.mark(frame.timestamp);
                state.sequence += 1;
            }
            Err(TrySendError::Full(dropped)) => {
                log::warn!("capture queue full, dropping {:?}", dropped.name)
            }
            Err(TrySendError::Disconnected(_)) => log::debug!("capture queue closed"),
        }
    }
}
