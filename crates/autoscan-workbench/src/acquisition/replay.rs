use std::{
    sync::{
        atomic::{AtomicBool, AtomicI32, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use autoscan_3d::pointcloud::PointCloud;
use parking_lot::Mutex;

use super::{AcquisitionError, AcquisitionSource, Frame, FrameObserver, ObserverId};

type Observers = Arc<Mutex<Vec<(ObserverId, Arc<dyn FrameObserver>)>>>;

/// A grabber that replays recorded clouds from its own thread at a fixed interval.
pub struct ReplaySource {
    frames: Arc<Vec<Arc<PointCloud>>>,
    interval: Duration,
    looping: bool,
    observers: Observers,
    next_observer: u64,
    running: Arc<AtomicBool>,
    depth_confidence: Arc<AtomicI32>,
    handle: Option<JoinHandle<()>>,
}

impl ReplaySource {
    /// Create a replay source.
    ///
    /// # Arguments
    ///
    /// * `frames` - The clouds to deliver, in order.
    /// * `interval` - Time between two deliveries.
    /// * `looping` - Whether to start over after the last frame.
    pub fn new(frames: Vec<PointCloud>, interval: Duration, looping: bool) -> Self {
        Self {
            frames: Arc::new(frames.into_iter().map(Arc::new).collect()),
            interval,
            looping,
            observers: Arc::new(Mutex::new(Vec::new())),
            next_observer: 0,
            running: Arc::new(AtomicBool::new(false)),
            depth_confidence: Arc::new(AtomicI32::new(0)),
            handle: None,
        }
    }

    /// Whether the replay thread is delivering frames.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The configured depth confidence.
    pub fn depth_confidence(&self) -> i32 {
        self.depth_confidence.load(Ordering::Relaxed)
    }

    /// Wait until every frame has been delivered. Returns immediately for looping replays.
    pub fn join(&mut self) {
        if self.looping {
            return;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.running.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for ReplaySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplaySource")
            .field("frames", &self.frames.len())
            .field("interval", &self.interval)
            .field("looping", &self.looping)
            .field("running", &self.is_running())
            .finish()
    }
}

impl AcquisitionSource for ReplaySource {
    fn register_observer(&mut self, observer: Arc<dyn FrameObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.lock().push((id, observer));
        id
    }

    fn unregister_observer(&mut self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(other, _)| *other != id);
        observers.len() != before
    }

    fn start(&mut self) -> Result<(), AcquisitionError> {
        if self.is_running() {
            return Err(AcquisitionError::AlreadyRunning);
        }
        // reap a replay that ran to completion
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }

        self.running.store(true, Ordering::Release);
        let frames = Arc::clone(&self.frames);
        let observers = Arc::clone(&self.observers);
        let running = Arc::clone(&self.running);
        let (interval, looping) = (self.interval, self.looping);

        let spawned = std::thread::Builder::new()
            .name("replay-source".into())
            .spawn(move || {
                let clock = Instant::now();
                let mut delivered = 0usize;
                'replay: loop {
                    for cloud in frames.iter() {
                        if !running.load(Ordering::Acquire) {
                            break 'replay;
                        }
                        let frame = Frame {
                            cloud: Arc::clone(cloud),
                            timestamp: clock.elapsed(),
                        };
                        // deliver outside of the observer lock
                        let targets: Vec<_> =
                            observers.lock().iter().map(|(_, o)| Arc::clone(o)).collect();
                        targets.iter().for_each(|o| o.on_frame(frame.clone()));
                        delivered += 1;
                        std::thread::sleep(interval);
                    }
                    if !looping || frames.is_empty() {
                        break;
                    }
                }
                running.store(false, Ordering::Release);
                log::debug!("replay finished after {delivered} frames");
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                log::info!("replay started with {} frames", self.frames.len());
                Ok(())
            }
            Err(err) => {
                self.running.store(false, Ordering::Release);
                Err(err.into())
            }
        }
    }

    fn stop(&mut self) -> Result<(), AcquisitionError> {
        let handle = self.handle.take().ok_or(AcquisitionError::NoActiveGrabber)?;
        self.running.store(false, Ordering::Release);
        let _ = handle.join();
        log::info!("replay stopped");
        Ok(())
    }

    fn set_depth_confidence(&mut self, value: i32) -> Result<(), AcquisitionError> {
        self.depth_confidence.store(value, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for ReplaySource {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingObserver {
        frames: AtomicUsize,
    }

    impl FrameObserver for CountingObserver {
        fn on_frame(&self, _frame: Frame) {
            self.frames.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_replay_delivers_every_frame() -> Result<(), AcquisitionError> {
        let clouds = vec![PointCloud::from_points(vec![[0.0; 3]]); 5];
        let mut source = ReplaySource::new(clouds, Duration::from_millis(1), false);
        let observer = Arc::new(CountingObserver::default());
        let detached = Arc::new(CountingObserver::default());

        source.register_observer(observer.clone());
        let id = source.register_observer(detached.clone());
        assert!(source.unregister_observer(id));
        assert!(!source.unregister_observer(id));

        source.start()?;
        source.join();

        assert_eq!(observer.frames.load(Ordering::SeqCst), 5);
        assert_eq!(detached.frames.load(Ordering::SeqCst), 0);
        assert!(!source.is_running());
        Ok(())
    }

    #[test]
    fn test_stop_without_start() -> Result<(), AcquisitionError> {
        let mut source = ReplaySource::new(Vec::new(), Duration::from_millis(1), true);
        assert!(matches!(source.stop(), Err(AcquisitionError::NoActiveGrabber)));

        source.set_depth_confidence(42)?;
        assert_eq!(source.depth_confidence(), 42);

        source.start()?;
        source.stop()?;
        assert!(!source.is_running());
        Ok(())
    }
}
