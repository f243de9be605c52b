use autoscan_3d::pointcloud::PointCloud;

use crate::element::ElementPayload;

/// One registry entry as seen by a renderer.
#[derive(Debug, Clone, Copy)]
pub struct RenderItem<'a> {
    /// The element name.
    pub name: &'a str,
    /// The element payload.
    pub payload: &'a ElementPayload,
    /// Whether the element should be drawn.
    pub visible: bool,
}

/// Draws the registry contents.
///
/// The workbench calls [`Renderer::render`] once after every registry mutation. Implementors
/// should only draw the visible items.
pub trait Renderer {
    /// Redraw the scene from the full registry listing.
    fn render(&mut self, items: &[RenderItem<'_>]);

    /// Preview the latest live frame. Does nothing by default.
    fn show_live_frame(&mut self, _frame: &PointCloud) {}
}

/// A renderer that draws nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&mut self, _items: &[RenderItem<'_>]) {}
}
