mod icp;
pub use icp::{Icp, IcpParams};

use autoscan_3d::pointcloud::PointCloud;
use serde::{Deserialize, Serialize};

use crate::ProcessingError;

/// Identifier of a registration variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RegistrationKind {
    /// Iterative closest point.
    #[default]
    Icp,
}

/// Output of a registration.
///
/// The transformation is from the source to the target frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationResult {
    /// The source cloud moved onto the target.
    pub aligned: PointCloud,
    /// Estimated rotation matrix.
    pub rotation: [[f64; 3]; 3],
    /// Estimated translation vector.
    pub translation: [f64; 3],
    /// The total number of iterations performed.
    pub num_iterations: usize,
    /// Last computed RMSE of the kept matches.
    pub rmse: f64,
    /// Whether the incremental transform fell below the convergence threshold.
    pub converged: bool,
}

/// Aligns a source cloud onto a target cloud.
pub trait CloudRegistration {
    /// The variant implemented by this registration.
    fn kind(&self) -> RegistrationKind;

    /// Register `source` onto `target`.
    fn process(
        &self,
        source: &PointCloud,
        target: &PointCloud,
    ) -> Result<RegistrationResult, ProcessingError>;
}

/// Persisted state of a [`RegistrationFactory`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// The active variant.
    pub active: RegistrationKind,
    /// ICP parameters.
    pub icp: IcpParams,
}

/// Owns one instance of every registration variant and tracks the active one.
#[derive(Debug, Clone, Default)]
pub struct RegistrationFactory {
    active: RegistrationKind,
    icp: Icp,
}

impl RegistrationFactory {
    /// Build a factory from a persisted configuration.
    pub fn from_config(config: &RegistrationConfig) -> Self {
        Self {
            active: config.active,
            icp: Icp::from_params_unchecked(config.icp.clone()),
        }
    }

    /// Snapshot the factory state.
    pub fn to_config(&self) -> RegistrationConfig {
        RegistrationConfig {
            active: self.active,
            icp: self.icp.params().clone(),
        }
    }

    /// Make `kind` the active variant.
    pub fn select(&mut self, kind: RegistrationKind) {
        self.active = kind;
    }

    /// The active variant.
    pub fn active_kind(&self) -> RegistrationKind {
        self.active
    }

    /// The active registration.
    pub fn active(&self) -> &dyn CloudRegistration {
        match self.active {
            RegistrationKind::Icp => &self.icp,
        }
    }

    /// The ICP instance.
    pub fn icp(&self) -> &Icp {
        &self.icp
    }

    /// Mutable access to the ICP instance.
    pub fn icp_mut(&mut self) -> &mut Icp {
        &mut self.icp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_config() -> Result<(), Box<dyn std::error::Error>> {
        let mut factory = RegistrationFactory::default();
        factory.icp_mut().set_params(IcpParams {
            max_iterations: 7,
            ..Default::default()
        })?;
        assert_eq!(factory.active().kind(), RegistrationKind::Icp);

        let json = serde_json::to_string(&factory.to_config())?;
        let restored = RegistrationFactory::from_config(&serde_json::from_str(&json)?);
        assert_eq!(restored.icp().params().max_iterations, 7);
        Ok(())
    }
}
