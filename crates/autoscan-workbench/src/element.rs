use autoscan_3d::{mesh::PolygonMesh, pointcloud::PointCloud};

/// Registry-assigned identifier of an element. Never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub(crate) u64);

impl ElementId {
    /// The raw identifier value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The data owned by an element.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementPayload {
    /// A point cloud, captured, loaded or produced by a cloud stage.
    Cloud(PointCloud),
    /// A reconstructed surface.
    Surface(PolygonMesh),
}

impl ElementPayload {
    /// The cloud of a cloud payload, or the vertices of a surface.
    pub fn point_cloud(&self) -> &PointCloud {
        match self {
            ElementPayload::Cloud(cloud) => cloud,
            ElementPayload::Surface(mesh) => mesh.vertices(),
        }
    }

    /// The triangles of a surface; empty for clouds.
    pub fn triangles(&self) -> &[[u32; 3]] {
        match self {
            ElementPayload::Cloud(_) => &[],
            ElementPayload::Surface(mesh) => mesh.triangles(),
        }
    }

    /// Whether this payload is a surface.
    pub fn is_surface(&self) -> bool {
        matches!(self, ElementPayload::Surface(_))
    }
}

impl From<PointCloud> for ElementPayload {
    fn from(cloud: PointCloud) -> Self {
        ElementPayload::Cloud(cloud)
    }
}

impl From<PolygonMesh> for ElementPayload {
    fn from(mesh: PolygonMesh) -> Self {
        ElementPayload::Surface(mesh)
    }
}

/// A named entry of the registry.
///
/// The payload is owned and immutable; only the selection flag changes after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    id: ElementId,
    name: String,
    selected: bool,
    payload: ElementPayload,
}

impl Element {
    pub(crate) fn new(id: ElementId, name: String, payload: ElementPayload) -> Self {
        Self {
            id,
            name,
            selected: false,
            payload,
        }
    }

    /// The registry identifier.
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// The display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the element takes part in the next stage and is drawn.
    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub(crate) fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    /// The owned payload.
    pub fn payload(&self) -> &ElementPayload {
        &self.payload
    }

    /// The point cloud view of the payload, see [`ElementPayload::point_cloud`].
    pub fn point_cloud(&self) -> &PointCloud {
        self.payload.point_cloud()
    }
}
