use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use autoscan_3d::pointcloud::PointCloud;
use autoscan_processing::{
    correspondence::{Correspondence, CorrespondenceFactory},
    filter::FilterFactory,
    keypoint::KeypointFactory,
    reconstruction::ReconstructionFactory,
    registration::RegistrationFactory,
};
use crossbeam::channel::Receiver;

use crate::{
    acquisition::{AcquisitionError, AcquisitionSource, CapturedFrame, FrameBridge, ObserverId},
    actuator::{Actuator, ActuatorLink},
    config::WorkbenchConfig,
    element::ElementId,
    pipeline,
    registry::ElementRegistry,
    render::Renderer,
    store::{output_paths, FileFormat, PointCloudStore},
    WorkbenchError,
};

/// The strategy factories of every processing family.
#[derive(Debug, Clone, Default)]
pub struct Strategies {
    /// Filters.
    pub filter: FilterFactory,
    /// Keypoint detectors.
    pub keypoint: KeypointFactory,
    /// Correspondence estimators.
    pub correspondence: CorrespondenceFactory,
    /// Registrations.
    pub registration: RegistrationFactory,
    /// Surface reconstructions.
    pub reconstruction: ReconstructionFactory,
}

impl Strategies {
    /// Build every factory from its persisted configuration.
    pub fn from_config(config: &WorkbenchConfig) -> Self {
        Self {
            filter: FilterFactory::from_config(&config.filter),
            keypoint: KeypointFactory::from_config(&config.keypoint),
            correspondence: CorrespondenceFactory::from_config(&config.correspondence),
            registration: RegistrationFactory::from_config(&config.registration),
            reconstruction: ReconstructionFactory::from_config(&config.reconstruction),
        }
    }
}

struct ActiveGrabber {
    source: Box<dyn AcquisitionSource>,
    observer: ObserverId,
}

/// The user facing workbench: registry, strategies, collaborators and the live frame bridge.
///
/// Every action that changes the registry ends with exactly one render. Rejected actions do
/// not render.
pub struct Workbench {
    config: WorkbenchConfig,
    registry: ElementRegistry,
    strategies: Strategies,
    renderer: Box<dyn Renderer>,
    store: Box<dyn PointCloudStore>,
    bridge: Arc<FrameBridge>,
    captures: Receiver<CapturedFrame>,
    grabber: Option<ActiveGrabber>,
    last_correspondences: Vec<Correspondence>,
}

impl Workbench {
    /// Create a workbench with an empty registry.
    pub fn new(
        config: WorkbenchConfig,
        renderer: Box<dyn Renderer>,
        store: Box<dyn PointCloudStore>,
    ) -> Self {
        let (bridge, captures) =
            FrameBridge::new(config.frame_pitch(), config.capture_queue_capacity.max(1));
        Self {
            strategies: Strategies::from_config(&config),
            config,
            registry: ElementRegistry::new(),
            renderer,
            store,
            bridge,
            captures,
            grabber: None,
            last_correspondences: Vec::new(),
        }
    }

    /// The current settings, including the strategy parameters.
    pub fn config(&self) -> WorkbenchConfig {
        WorkbenchConfig {
            filter: self.strategies.filter.to_config(),
            keypoint: self.strategies.keypoint.to_config(),
            correspondence: self.strategies.correspondence.to_config(),
            registration: self.strategies.registration.to_config(),
            reconstruction: self.strategies.reconstruction.to_config(),
            ..self.config.clone()
        }
    }

    /// The element registry.
    pub fn registry(&self) -> &ElementRegistry {
        &self.registry
    }

    /// The strategy factories.
    pub fn strategies(&self) -> &Strategies {
        &self.strategies
    }

    /// Mutable access to the strategy factories, to switch variants or change parameters.
    pub fn strategies_mut(&mut self) -> &mut Strategies {
        &mut self.strategies
    }

    /// The frame bridge, shared with the grabber thread.
    pub fn bridge(&self) -> &Arc<FrameBridge> {
        &self.bridge
    }

    /// Correspondences of the last successful correspondence stage.
    pub fn last_correspondences(&self) -> &[Correspondence] {
        &self.last_correspondences
    }

    /// Wrap a device in a link using the configured settle delay.
    pub fn actuator_link<A: Actuator>(&self, actuator: A) -> ActuatorLink<A> {
        ActuatorLink::new(actuator, self.config.actuator_settle())
    }

    fn render(&mut self) {
        let items = self.registry.render_items();
        self.renderer.render(&items);
    }

    fn render_if_added(&mut self, ids: Vec<ElementId>) -> Vec<ElementId> {
        if !ids.is_empty() {
            self.render();
        }
        ids
    }

    /// Load files as new cloud elements named after their path.
    ///
    /// When `format` is `None` it is derived from each file extension. Nothing is added if any
    /// file fails to load.
    pub fn open_files(
        &mut self,
        paths: &[PathBuf],
        format: Option<FileFormat>,
    ) -> Result<Vec<ElementId>, WorkbenchError> {
        let clouds = paths
            .iter()
            .map(|path| -> Result<(String, PointCloud), WorkbenchError> {
                let format = format
                    .or_else(|| FileFormat::from_path(path))
                    .ok_or_else(|| crate::store::StoreError::UnknownFormat(path.clone()))?;
                Ok((path.display().to_string(), self.store.load(path, format)?))
            })
            .collect::<Result<Vec<_>, WorkbenchError>>()?;

        log::info!("opened {} files", clouds.len());
        let ids = clouds
            .into_iter()
            .map(|(name, cloud)| self.registry.add(cloud, name))
            .collect();
        Ok(self.render_if_added(ids))
    }

    /// Save every selected element under `base`, see [`output_paths`]. Returns the written
    /// paths.
    pub fn save_selected(
        &self,
        base: &Path,
        format: FileFormat,
    ) -> Result<Vec<PathBuf>, WorkbenchError> {
        let selected = self.registry.selected();
        let paths = output_paths(base, format, selected.len());
        for (element, path) in selected.iter().zip(paths.iter()) {
            self.store.save(path, format, element.payload())?;
        }
        log::info!("saved {} elements", paths.len());
        Ok(paths)
    }

    /// Replace the active grabber with `source`, subscribe the bridge and start streaming.
    pub fn start_grabber(
        &mut self,
        mut source: Box<dyn AcquisitionSource>,
    ) -> Result<(), WorkbenchError> {
        self.stop_grabber();

        let observer = source.register_observer(self.bridge.clone());
        if let Err(err) = source.start() {
            source.unregister_observer(observer);
            return Err(err.into());
        }
        self.grabber = Some(ActiveGrabber { source, observer });
        Ok(())
    }

    /// Stop the active grabber and forget the live frame. Does nothing without a grabber.
    pub fn stop_grabber(&mut self) {
        let Some(mut grabber) = self.grabber.take() else {
            log::debug!("stop requested: {}", AcquisitionError::NoActiveGrabber);
            return;
        };
        if let Err(err) = grabber.source.stop() {
            log::warn!("failed to stop grabber: {err}");
        }
        grabber.source.unregister_observer(grabber.observer);
        self.bridge.end();
        self.bridge.clear_current_frame();
        self.render();
    }

    /// Whether a grabber is running.
    pub fn has_grabber(&self) -> bool {
        self.grabber.is_some()
    }

    /// Forward a depth confidence to the grabber. Does nothing without a grabber.
    pub fn set_depth_confidence(&mut self, value: i32) {
        match self.grabber.as_mut() {
            Some(grabber) => {
                if let Err(err) = grabber.source.set_depth_confidence(value) {
                    log::warn!("failed to set depth confidence: {err}");
                }
            }
            None => log::debug!("depth confidence ignored: {}", AcquisitionError::NoActiveGrabber),
        }
    }

    /// Copy the live frame into the registry as `name`.
    ///
    /// Returns `Ok(None)` without a grabber or before the first frame arrived.
    ///
    /// # Errors
    ///
    /// Returns [`WorkbenchError::DuplicateOrEmptyName`] if `name` is empty or already used.
    pub fn keep_one_frame(&mut self, name: &str) -> Result<Option<ElementId>, WorkbenchError> {
        if self.grabber.is_none() {
            log::debug!("keep frame ignored: {}", AcquisitionError::NoActiveGrabber);
            return Ok(None);
        }
        let Some(frame) = self.bridge.current_frame() else {
            log::debug!("keep frame ignored: no frame yet");
            return Ok(None);
        };

        let id = self.registry.add_from_capture((*frame).clone(), name)?;
        self.render();
        Ok(Some(id))
    }

    /// Enter continuous capture under `base_name`. Does nothing without a grabber.
    pub fn begin_continuous_capture(&mut self, base_name: &str) -> Result<(), WorkbenchError> {
        if self.grabber.is_none() {
            log::debug!("continuous capture ignored: {}", AcquisitionError::NoActiveGrabber);
            return Ok(());
        }
        self.bridge.begin(base_name)
    }

    /// Leave continuous capture and keep the frames accepted so far.
    pub fn end_continuous_capture(&mut self) -> Vec<ElementId> {
        self.bridge.end();
        self.process_captured_frames()
    }

    /// Enter continuous capture when idle, leave it otherwise. Returns whether it is active.
    pub fn toggle_continuous_capture(&mut self, base_name: &str) -> Result<bool, WorkbenchError> {
        if self.bridge.is_capturing() {
            self.end_continuous_capture();
        } else {
            self.begin_continuous_capture(base_name)?;
        }
        Ok(self.bridge.is_capturing())
    }

    /// Move every frame accepted by continuous capture into the registry.
    ///
    /// Frames whose name is already used are dropped with a warning.
    pub fn process_captured_frames(&mut self) -> Vec<ElementId> {
        let frames: Vec<CapturedFrame> = self.captures.try_iter().collect();
        let ids = frames
            .into_iter()
            .filter_map(|frame| {
                match self
                    .registry
                    .add_from_capture((*frame.cloud).clone(), &frame.name)
                {
                    Ok(id) => Some(id),
                    Err(err) => {
                        log::warn!("dropping captured frame: {err}");
                        None
                    }
                }
            })
            .collect();
        self.render_if_added(ids)
    }

    /// Show the latest live frame on the renderer, if any, and move the frames captured so
    /// far into the registry.
    ///
    /// Call it on every tick while capturing so the capture queue never fills up.
    pub fn refresh_live_view(&mut self) -> Vec<ElementId> {
        if let Some(frame) = self.bridge.current_frame() {
            self.renderer.show_live_frame(&frame);
        }
        self.process_captured_frames()
    }

    /// Remove the selected elements.
    pub fn remove_selected(&mut self) -> usize {
        let removed = self.registry.remove_selected();
        self.render();
        removed
    }

    /// Remove every element.
    pub fn remove_all(&mut self) -> usize {
        let removed = self.registry.remove_all();
        self.render();
        removed
    }

    /// Select every element.
    pub fn select_all(&mut self) {
        self.registry.select_all();
        self.render();
    }

    /// Unselect every element.
    pub fn unselect_all(&mut self) {
        self.registry.unselect_all();
        self.render();
    }

    /// Set the selection of one row. An out of range row is ignored without rendering.
    pub fn set_selected(&mut self, index: usize, selected: bool) {
        let in_range = index < self.registry.count();
        self.registry.set_selected(index, selected);
        if in_range {
            self.render();
        }
    }

    /// Run the active filter on the selection.
    pub fn run_filter(&mut self) -> Result<Vec<ElementId>, WorkbenchError> {
        let ids = pipeline::run_filter(&mut self.registry, self.strategies.filter.active())?;
        Ok(self.render_if_added(ids))
    }

    /// Run the active keypoint detector on the selection.
    pub fn run_keypoint(&mut self) -> Result<Vec<ElementId>, WorkbenchError> {
        let ids = pipeline::run_keypoint(&mut self.registry, self.strategies.keypoint.active())?;
        Ok(self.render_if_added(ids))
    }

    /// Run the active keypoint detector and correspondence estimator on the selected pair.
    pub fn run_correspondence(&mut self) -> Result<ElementId, WorkbenchError> {
        let (id, correspondences) = pipeline::run_correspondence(
            &mut self.registry,
            self.strategies.keypoint.active(),
            self.strategies.correspondence.active(),
        )?;
        self.last_correspondences = correspondences;
        self.render();
        Ok(id)
    }

    /// Register the first selected element onto the second one.
    pub fn run_registration(&mut self) -> Result<ElementId, WorkbenchError> {
        let id =
            pipeline::run_registration(&mut self.registry, self.strategies.registration.active())?;
        self.render();
        Ok(id)
    }

    /// Chain registrations through the selection.
    pub fn run_chained_registration(&mut self) -> Result<Vec<ElementId>, WorkbenchError> {
        let ids = pipeline::run_chained_registration(
            &mut self.registry,
            self.strategies.registration.active(),
        )?;
        Ok(self.render_if_added(ids))
    }

    /// Reconstruct a surface for every selected element.
    pub fn run_reconstruction(&mut self) -> Result<Vec<ElementId>, WorkbenchError> {
        let ids = pipeline::run_reconstruction(
            &mut self.registry,
            self.strategies.reconstruction.active(),
        )?;
        Ok(self.render_if_added(ids))
    }

    /// Stop the grabber and detach the bridge. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.grabber.is_some() {
            log::info!("shutting down grabber");
            self.stop_grabber();
        }
    }
}

impl Drop for Workbench {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Workbench {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workbench")
            .field("elements", &self.registry.count())
            .field("grabber", &self.grabber.is_some())
            .field("capturing", &self.bridge.is_capturing())
            .finish()
    }
}
