//! Stage triggers over the selected registry elements.
//!
//! Every stage reads the selection, computes all of its outputs and only then appends them
//! to the registry. A failing stage leaves the registry untouched.

use autoscan_3d::pointcloud::PointCloud;
use autoscan_processing::{
    correspondence::{Correspondence, CorrespondenceEstimator},
    filter::CloudFilter,
    keypoint::KeypointDetector,
    reconstruction::SurfaceReconstructor,
    registration::CloudRegistration,
    ProcessingError,
};

use crate::{
    element::{Element, ElementId, ElementPayload},
    registry::ElementRegistry,
    WorkbenchError,
};

/// The processing stages a user can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Per-element filtering.
    Filter,
    /// Per-element keypoint detection.
    Keypoint,
    /// Keypoint correspondences between two elements.
    Correspondence,
    /// ICP between two elements.
    Registration,
    /// ICP chained through every selected element.
    ChainedRegistration,
    /// Per-element surface reconstruction.
    Reconstruction,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Filter => "filter",
            Stage::Keypoint => "keypoint",
            Stage::Correspondence => "correspondence",
            Stage::Registration => "registration",
            Stage::ChainedRegistration => "keypoint to icp",
            Stage::Reconstruction => "reconstruction",
        };
        f.write_str(name)
    }
}

fn commit(registry: &mut ElementRegistry, outputs: Vec<(String, ElementPayload)>) -> Vec<ElementId> {
    outputs
        .into_iter()
        .map(|(name, payload)| registry.add(payload, name))
        .collect()
}

fn map_selected<F>(
    registry: &mut ElementRegistry,
    stage: Stage,
    suffix: &str,
    f: F,
) -> Result<Vec<ElementId>, WorkbenchError>
where
    F: Fn(&PointCloud) -> Result<ElementPayload, ProcessingError>,
{
    let outputs = registry
        .selected()
        .into_iter()
        .map(|element| {
            log::debug!("{stage}: processing {:?}", element.name());
            f(element.point_cloud()).map(|payload| (format!("{}{suffix}", element.name()), payload))
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(WorkbenchError::computation(stage))?;

    log::info!("{stage}: {} new elements", outputs.len());
    Ok(commit(registry, outputs))
}

fn selected_pair(
    registry: &ElementRegistry,
    stage: Stage,
) -> Result<(&Element, &Element), WorkbenchError> {
    match registry.selected().as_slice() {
        [first, second] => Ok((*first, *second)),
        other => Err(WorkbenchError::InvalidSelection {
            stage,
            expected: 2,
            found: other.len(),
        }),
    }
}

/// Filter every selected element into a new `"<name>_Filter"` cloud.
pub fn run_filter(
    registry: &mut ElementRegistry,
    filter: &dyn CloudFilter,
) -> Result<Vec<ElementId>, WorkbenchError> {
    map_selected(registry, Stage::Filter, "_Filter", |cloud| {
        filter.process(cloud).map(ElementPayload::Cloud)
    })
}

/// Detect keypoints of every selected element into a new `"<name>_Keypoint"` cloud.
pub fn run_keypoint(
    registry: &mut ElementRegistry,
    detector: &dyn KeypointDetector,
) -> Result<Vec<ElementId>, WorkbenchError> {
    map_selected(registry, Stage::Keypoint, "_Keypoint", |cloud| {
        detector.process(cloud).map(ElementPayload::Cloud)
    })
}

/// Estimate correspondences between exactly two selected elements.
///
/// Keypoints of both elements are detected first. The source moved onto the target is added
/// as `"<first>__Correspondence"`; the surviving correspondences are returned with its id.
///
/// # Errors
///
/// Returns [`WorkbenchError::InvalidSelection`] unless exactly two elements are selected.
pub fn run_correspondence(
    registry: &mut ElementRegistry,
    detector: &dyn KeypointDetector,
    estimator: &dyn CorrespondenceEstimator,
) -> Result<(ElementId, Vec<Correspondence>), WorkbenchError> {
    let stage = Stage::Correspondence;
    let (source, target) = selected_pair(registry, stage)?;

    let run = || {
        let source_keypoints = detector.process(source.point_cloud())?;
        let target_keypoints = detector.process(target.point_cloud())?;
        log::debug!(
            "{stage}: {} source and {} target keypoints",
            source_keypoints.len(),
            target_keypoints.len()
        );
        estimator.process(
            source.point_cloud(),
            &source_keypoints,
            target.point_cloud(),
            &target_keypoints,
        )
    };
    let result = run().map_err(WorkbenchError::computation(stage))?;
    let name = format!("{}__Correspondence", source.name());

    log::info!("{stage}: {} correspondences", result.correspondences.len());
    let id = registry.add(result.cloud, name);
    Ok((id, result.correspondences))
}

/// Register the first selected element onto the second one.
///
/// The aligned cloud is added as `"<first>_<second>_Regestration"`.
///
/// # Errors
///
/// Returns [`WorkbenchError::InvalidSelection`] unless exactly two elements are selected.
pub fn run_registration(
    registry: &mut ElementRegistry,
    registration: &dyn CloudRegistration,
) -> Result<ElementId, WorkbenchError> {
    let stage = Stage::Registration;
    let (source, target) = selected_pair(registry, stage)?;

    let result = registration
        .process(source.point_cloud(), target.point_cloud())
        .map_err(WorkbenchError::computation(stage))?;
    let name = format!("{}_{}_Regestration", source.name(), target.name());

    log::info!(
        "{stage}: {} iterations, rmse {:.6}, converged {}",
        result.num_iterations,
        result.rmse,
        result.converged
    );
    Ok(registry.add(result.aligned, name))
}

/// Chain registrations through the selection.
///
/// Step `i` registers the output of step `i - 1` (the first selected element for step 1)
/// onto selected element `i` and adds the result as `"Process<i>"`. Fewer than two selected
/// elements is a no-op.
pub fn run_chained_registration(
    registry: &mut ElementRegistry,
    registration: &dyn CloudRegistration,
) -> Result<Vec<ElementId>, WorkbenchError> {
    let stage = Stage::ChainedRegistration;
    let selected = registry.selected();
    let Some((first, targets)) = selected.split_first().filter(|(_, rest)| !rest.is_empty())
    else {
        log::warn!("{stage}: needs at least two selected point clouds");
        return Ok(Vec::new());
    };

    let mut outputs: Vec<(String, PointCloud)> = Vec::with_capacity(targets.len());
    for (i, target) in targets.iter().enumerate() {
        let source = outputs
            .last()
            .map_or(first.point_cloud(), |(_, aligned)| aligned);
        let result = registration
            .process(source, target.point_cloud())
            .map_err(WorkbenchError::computation(stage))?;
        log::debug!(
            "{stage}: step {} onto {:?}, rmse {:.6}",
            i + 1,
            target.name(),
            result.rmse
        );
        outputs.push((format!("Process{}", i + 1), result.aligned));
    }

    log::info!("{stage}: {} new elements", outputs.len());
    let outputs = outputs
        .into_iter()
        .map(|(name, cloud)| (name, ElementPayload::Cloud(cloud)))
        .collect();
    Ok(commit(registry, outputs))
}

/// Reconstruct a surface for every selected element as `"<name>__Reconstruct"`.
pub fn run_reconstruction(
    registry: &mut ElementRegistry,
    reconstructor: &dyn SurfaceReconstructor,
) -> Result<Vec<ElementId>, WorkbenchError> {
    map_selected(registry, Stage::Reconstruction, "__Reconstruct", |cloud| {
        reconstructor.process(cloud).map(ElementPayload::Surface)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoscan_3d::mesh::PolygonMesh;
    use autoscan_processing::{
        correspondence::{CorrespondenceKind, CorrespondenceResult},
        filter::{FilterKind, VoxelGrid},
        keypoint::KeypointKind,
        reconstruction::ReconstructionKind,
        registration::{Icp, RegistrationKind, RegistrationResult},
    };
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::cell::RefCell;

    fn marker(x: f64) -> PointCloud {
        PointCloud::from_points(vec![[x, 0.0, 0.0]])
    }

    fn registry_with(names: &[&str]) -> ElementRegistry {
        let mut registry = ElementRegistry::new();
        for (i, name) in names.iter().enumerate() {
            registry.add(marker(10f64.powi(i as i32)), *name);
        }
        registry
    }

    /// Records every call and returns the sum of the first points as the aligned cloud.
    #[derive(Default)]
    struct SumRegistration {
        calls: RefCell<Vec<(f64, f64)>>,
        fail_on_call: Option<usize>,
    }

    impl CloudRegistration for SumRegistration {
        fn kind(&self) -> RegistrationKind {
            RegistrationKind::Icp
        }

        fn process(
            &self,
            source: &PointCloud,
            target: &PointCloud,
        ) -> Result<RegistrationResult, ProcessingError> {
            let (s, t) = (source.points()[0][0], target.points()[0][0]);
            self.calls.borrow_mut().push((s, t));
            if self.fail_on_call == Some(self.calls.borrow().len()) {
                return Err(ProcessingError::NoCorrespondences);
            }
            Ok(RegistrationResult {
                aligned: marker(s + t),
                rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
                translation: [t, 0.0, 0.0],
                num_iterations: 1,
                rmse: 0.0,
                converged: true,
            })
        }
    }

    /// Returns the first point as the only keypoint and records the clouds it saw.
    #[derive(Default)]
    struct FirstPointDetector {
        calls: RefCell<Vec<f64>>,
    }

    impl KeypointDetector for FirstPointDetector {
        fn kind(&self) -> KeypointKind {
            KeypointKind::Harris
        }

        fn process(&self, cloud: &PointCloud) -> Result<PointCloud, ProcessingError> {
            let x = cloud.points()[0][0];
            self.calls.borrow_mut().push(x);
            Ok(marker(x))
        }
    }

    /// Pairs the keypoints and moves the source onto the target keypoint.
    #[derive(Default)]
    struct PairingEstimator {
        keypoints: RefCell<Option<(f64, f64)>>,
    }

    impl CorrespondenceEstimator for PairingEstimator {
        fn kind(&self) -> CorrespondenceKind {
            CorrespondenceKind::Fpfh
        }

        fn process(
            &self,
            source: &PointCloud,
            source_keypoints: &PointCloud,
            _target: &PointCloud,
            target_keypoints: &PointCloud,
        ) -> Result<CorrespondenceResult, ProcessingError> {
            let (s, t) = (source_keypoints.points()[0][0], target_keypoints.points()[0][0]);
            *self.keypoints.borrow_mut() = Some((s, t));
            Ok(CorrespondenceResult {
                cloud: marker(source.points()[0][0] + t - s),
                correspondences: vec![Correspondence {
                    source_index: 0,
                    target_index: 0,
                    distance: 0.25,
                }],
                rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
                translation: [t - s, 0.0, 0.0],
            })
        }
    }

    struct CountingFilter;

    impl CloudFilter for CountingFilter {
        fn kind(&self) -> FilterKind {
            FilterKind::VoxelGrid
        }

        fn process(&self, cloud: &PointCloud) -> Result<PointCloud, ProcessingError> {
            if cloud.points()[0][0] > 50.0 {
                return Err(ProcessingError::EmptyInput);
            }
            Ok(marker(-cloud.points()[0][0]))
        }
    }

    struct FlatReconstruction;

    impl SurfaceReconstructor for FlatReconstruction {
        fn kind(&self) -> ReconstructionKind {
            ReconstructionKind::GreedyProjection
        }

        fn process(&self, cloud: &PointCloud) -> Result<PolygonMesh, ProcessingError> {
            let x = cloud.points()[0][0];
            let vertices = PointCloud::from_points(vec![[x, 0.0, 0.0], [x, 1.0, 0.0], [x, 0.0, 1.0]]);
            Ok(PolygonMesh::new(vertices, vec![[0, 1, 2]])?)
        }
    }

    #[test]
    fn test_filter_adds_one_element_per_selection() -> Result<(), WorkbenchError> {
        let mut registry = registry_with(&["a", "b", "c"]);
        registry.set_selected(0, true);
        registry.set_selected(2, true);
        let before: Vec<Element> = registry.iter().cloned().collect();

        let ids = run_filter(&mut registry, &CountingFilter)?;

        assert_eq!(ids.len(), 2);
        assert_eq!(registry.count(), 5);
        assert_eq!(registry.name_at(3), Some("a_Filter"));
        assert_eq!(registry.name_at(4), Some("c_Filter"));
        assert_eq!(registry.get(4).map(|e| e.point_cloud().points()[0][0]), Some(-100.0));
        assert!(before.iter().zip(registry.iter()).all(|(old, new)| old == new));
        Ok(())
    }

    #[test]
    fn test_failing_filter_commits_nothing() {
        let mut registry = registry_with(&["a", "b", "c"]);
        registry.select_all();

        let res = run_filter(&mut registry, &CountingFilter);
        assert!(matches!(
            res,
            Err(WorkbenchError::StrategyComputationFailure {
                stage: Stage::Filter,
                source: ProcessingError::EmptyInput
            })
        ));
        assert_eq!(registry.count(), 3);
    }

    #[test]
    fn test_pair_stages_need_two_selected() {
        for selected in [0usize, 1, 3] {
            let mut registry = registry_with(&["a", "b", "c"]);
            (0..selected).for_each(|i| registry.set_selected(i, true));

            let res = run_registration(&mut registry, &SumRegistration::default());
            assert!(matches!(
                res,
                Err(WorkbenchError::InvalidSelection { stage: Stage::Registration, expected: 2, found })
                    if found == selected
            ));

            let detector = autoscan_processing::keypoint::Sift::default();
            let estimator = autoscan_processing::correspondence::FeatureCorrespondence::with_kind(
                autoscan_processing::correspondence::CorrespondenceKind::Fpfh,
            );
            let res = run_correspondence(&mut registry, &detector, &estimator);
            assert!(matches!(
                res,
                Err(WorkbenchError::InvalidSelection { stage: Stage::Correspondence, .. })
            ));
            assert_eq!(registry.count(), 3);
        }
    }

    #[test]
    fn test_correspondence_stage_output() -> Result<(), WorkbenchError> {
        let mut registry = registry_with(&["a", "b", "c"]);
        registry.set_selected(1, true);
        registry.set_selected(2, true);

        let detector = FirstPointDetector::default();
        let estimator = PairingEstimator::default();
        let (id, correspondences) = run_correspondence(&mut registry, &detector, &estimator)?;

        // keypoints of the first selected element are computed first
        assert_eq!(*detector.calls.borrow(), [10.0, 100.0]);
        assert_eq!(*estimator.keypoints.borrow(), Some((10.0, 100.0)));
        assert_eq!(
            correspondences,
            [Correspondence {
                source_index: 0,
                target_index: 0,
                distance: 0.25
            }]
        );

        assert_eq!(registry.count(), 4);
        let element = registry.find(id).ok_or(WorkbenchError::DuplicateOrEmptyName("missing".into()))?;
        assert_eq!(element.name(), "b__Correspondence");
        assert_eq!(element.point_cloud().points()[0][0], 100.0);
        Ok(())
    }

    #[test]
    fn test_registration_name() -> Result<(), WorkbenchError> {
        let mut registry = registry_with(&["left", "right"]);
        registry.select_all();

        let id = run_registration(&mut registry, &SumRegistration::default())?;
        let element = registry.find(id).ok_or(WorkbenchError::DuplicateOrEmptyName("missing".into()))?;
        assert_eq!(element.name(), "left_right_Regestration");
        assert_eq!(element.point_cloud().points()[0][0], 11.0);
        Ok(())
    }

    #[test]
    fn test_chained_registration_uses_previous_output() -> Result<(), WorkbenchError> {
        let mut registry = registry_with(&["A", "B", "C"]);
        registry.select_all();
        let registration = SumRegistration::default();

        let ids = run_chained_registration(&mut registry, &registration)?;

        assert_eq!(ids.len(), 2);
        assert_eq!(*registration.calls.borrow(), [(1.0, 10.0), (11.0, 100.0)]);
        assert_eq!(registry.name_at(3), Some("Process1"));
        assert_eq!(registry.name_at(4), Some("Process2"));
        assert_eq!(registry.get(4).map(|e| e.point_cloud().points()[0][0]), Some(111.0));
        Ok(())
    }

    #[test]
    fn test_chained_registration_edge_cases() -> Result<(), WorkbenchError> {
        let mut registry = registry_with(&["A", "B", "C"]);
        registry.set_selected(1, true);
        assert!(run_chained_registration(&mut registry, &SumRegistration::default())?.is_empty());
        assert_eq!(registry.count(), 3);

        registry.select_all();
        let failing = SumRegistration {
            fail_on_call: Some(2),
            ..Default::default()
        };
        assert!(run_chained_registration(&mut registry, &failing).is_err());
        assert_eq!(registry.count(), 3);
        Ok(())
    }

    #[test]
    fn test_reconstruction_uses_each_name() -> Result<(), WorkbenchError> {
        let mut registry = registry_with(&["a", "b"]);
        registry.select_all();

        run_reconstruction(&mut registry, &FlatReconstruction)?;

        assert_eq!(registry.name_at(2), Some("a__Reconstruct"));
        assert_eq!(registry.name_at(3), Some("b__Reconstruct"));
        assert!(registry.iter().skip(2).all(|e| e.payload().is_surface()));
        Ok(())
    }

    #[test]
    fn test_voxel_filter_and_icp_end_to_end() -> Result<(), WorkbenchError> {
        let mut rng = StdRng::seed_from_u64(3);
        let points: Vec<[f64; 3]> = (0..300)
            .map(|_| [rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>()])
            .collect();
        let shifted: Vec<[f64; 3]> = points.iter().map(|p| [p[0] + 0.01, p[1], p[2]]).collect();

        let mut registry = ElementRegistry::new();
        registry.add(PointCloud::from_points(points), "scan_0");
        registry.add(PointCloud::from_points(shifted.clone()), "scan_1");
        registry.select_all();

        run_filter(&mut registry, &VoxelGrid::default())?;
        assert_eq!(registry.count(), 4);

        registry.unselect_all();
        registry.set_selected(0, true);
        registry.set_selected(1, true);
        let id = run_registration(&mut registry, &Icp::default())?;

        let aligned = registry.find(id).map(|e| e.point_cloud().points()[0]);
        let aligned = aligned.ok_or(WorkbenchError::DuplicateOrEmptyName("missing".into()))?;
        approx::assert_relative_eq!(aligned[0], shifted[0][0], epsilon = 1e-3);
        Ok(())
    }
}
