use std::path::{Path, PathBuf};

use autoscan_3d::{
    io::{
        obj::{self, ObjError},
        pcd::{self, PcdError},
        ply::{self, PlyError},
    },
    pointcloud::PointCloud,
};
use serde::{Deserialize, Serialize};

use crate::element::ElementPayload;

/// Error types for the file store.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// OBJ reading or writing failed.
    #[error(transparent)]
    Obj(#[from] ObjError),

    /// PLY reading or writing failed.
    #[error(transparent)]
    Ply(#[from] PlyError),

    /// PCD reading or writing failed.
    #[error(transparent)]
    Pcd(#[from] PcdError),

    /// The format could not be derived from the file extension.
    #[error("Unknown point cloud format: {0}")]
    UnknownFormat(PathBuf),
}

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileFormat {
    /// Wavefront OBJ.
    Obj,
    /// ASCII PLY.
    Ply,
    /// Binary PCD.
    Pcd,
}

impl FileFormat {
    /// All formats in display order.
    pub const ALL: [FileFormat; 3] = [FileFormat::Obj, FileFormat::Ply, FileFormat::Pcd];

    /// The file extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Obj => "obj",
            FileFormat::Ply => "ply",
            FileFormat::Pcd => "pcd",
        }
    }

    /// Guess the format from the extension of `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }
}

impl std::str::FromStr for FileFormat {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.extension() == lower)
            .ok_or_else(|| StoreError::UnknownFormat(PathBuf::from(s)))
    }
}

/// Loads and saves element payloads.
pub trait PointCloudStore {
    /// Load a cloud. Meshes are loaded as their vertex cloud.
    fn load(&self, path: &Path, format: FileFormat) -> Result<PointCloud, StoreError>;

    /// Save a payload. Formats without faces only store the points.
    fn save(&self, path: &Path, format: FileFormat, payload: &ElementPayload)
        -> Result<(), StoreError>;
}

/// Store backed by the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileStore;

impl PointCloudStore for FileStore {
    fn load(&self, path: &Path, format: FileFormat) -> Result<PointCloud, StoreError> {
        log::debug!("loading {} as {:?}", path.display(), format);
        let cloud = match format {
            FileFormat::Obj => obj::read_obj(path)?.vertices().clone(),
            FileFormat::Ply => ply::read_ply_ascii(path)?.vertices().clone(),
            FileFormat::Pcd => pcd::read_pcd_binary(path)?,
        };
        Ok(cloud)
    }

    fn save(
        &self,
        path: &Path,
        format: FileFormat,
        payload: &ElementPayload,
    ) -> Result<(), StoreError> {
        log::debug!("saving {} as {:?}", path.display(), format);
        let cloud = payload.point_cloud();
        match format {
            FileFormat::Obj => obj::write_obj(path, cloud, payload.triangles())?,
            FileFormat::Ply => ply::write_ply_ascii(path, cloud, payload.triangles())?,
            FileFormat::Pcd => pcd::write_pcd_binary(path, cloud)?,
        }
        Ok(())
    }
}

/// Output paths for saving `count` elements under `base`.
///
/// Any extension on `base` is replaced. A single element is written to `<base>.<ext>`,
/// several to `<base>_<i>.<ext>`.
pub fn output_paths(base: &Path, format: FileFormat, count: usize) -> Vec<PathBuf> {
    let stem = base.with_extension("");
    if count == 1 {
        return vec![stem.with_extension(format.extension())];
    }
    (0..count)
        .map(|i| {
            let mut name = stem.clone().into_os_string();
            name.push(format!("_{i}.{}", format.extension()));
            PathBuf::from(name)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_path() {
        assert_eq!(FileFormat::from_path("scan.PLY"), Some(FileFormat::Ply));
        assert_eq!(FileFormat::from_path("a/b/c.pcd"), Some(FileFormat::Pcd));
        assert_eq!(FileFormat::from_path("mesh.stl"), None);
        assert_eq!(FileFormat::from_path("noext"), None);
        assert!(matches!("obj".parse::<FileFormat>(), Ok(FileFormat::Obj)));
    }

    #[test]
    fn test_output_paths() {
        let single = output_paths(Path::new("out/scan.ply"), FileFormat::Pcd, 1);
        assert_eq!(single, [PathBuf::from("out/scan.pcd")]);

        let many = output_paths(Path::new("out/scan"), FileFormat::Obj, 2);
        assert_eq!(
            many,
            [PathBuf::from("out/scan_0.obj"), PathBuf::from("out/scan_1.obj")]
        );
    }

    #[test]
    fn test_file_store_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let cloud = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [0.25, 0.5, 1.0]],
            Some(vec![[1, 2, 3], [4, 5, 6]]),
            None,
        );
        let payload = ElementPayload::Cloud(cloud.clone());

        for format in FileFormat::ALL {
            let path = dir.path().join(format!("cloud.{}", format.extension()));
            FileStore.save(&path, format, &payload)?;
            assert_eq!(FileStore.load(&path, format)?, cloud);
        }
        Ok(())
    }
}
