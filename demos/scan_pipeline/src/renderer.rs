use autoscan::workbench::render::Renderer;

#[cfg(feature = "rerun")]
pub fn spawn_rerun() -> Result<Box<dyn Renderer>, Box<dyn std::error::Error>> {
    let rec = rerun::RecordingStreamBuilder::new("autoscan").spawn()?;
    Ok(Box::new(rerun_renderer::RerunRenderer { rec }))
}

#[cfg(not(feature = "rerun"))]
pub fn spawn_rerun() -> Result<Box<dyn Renderer>, Box<dyn std::error::Error>> {
    Err("scan_pipeline was built without the `rerun` feature".into())
}

#[cfg(feature = "rerun")]
mod rerun_renderer {
    use autoscan::k3d::pointcloud::PointCloud;
    use autoscan::workbench::render::{RenderItem, Renderer};

    pub struct RerunRenderer {
        pub rec: rerun::RecordingStream,
    }

    fn positions(cloud: &PointCloud) -> Vec<rerun::Position3D> {
        cloud
            .points()
            .iter()
            .map(|p| rerun::Position3D::new(p[0] as f32, p[1] as f32, p[2] as f32))
            .collect()
    }

    fn colors(cloud: &PointCloud) -> Vec<rerun::Color> {
        cloud.colors().map_or(vec![], |colors| {
            colors
                .iter()
                .map(|c| rerun::Color::from_rgb(c[0], c[1], c[2]))
                .collect()
        })
    }

    impl RerunRenderer {
        fn log_items(&self, items: &[RenderItem<'_>]) -> Result<(), rerun::RecordingStreamError> {
            self.rec.log("elements", &rerun::Clear::recursive())?;
            for (i, item) in items.iter().enumerate().filter(|(_, item)| item.visible) {
                let path = format!("elements/{i}");
                let cloud = item.payload.point_cloud();
                if item.payload.is_surface() {
                    self.rec.log(
                        path,
                        &rerun::Mesh3D::new(positions(cloud))
                            .with_triangle_indices(item.payload.triangles().iter().copied()),
                    )?;
                } else {
                    self.rec.log(
                        path,
                        &rerun::Points3D::new(positions(cloud)).with_colors(colors(cloud)),
                    )?;
                }
            }
            Ok(())
        }
    }

    impl Renderer for RerunRenderer {
        fn render(&mut self, items: &[RenderItem<'_>]) {
            if let Err(err) = self.log_items(items) {
                log::warn!("failed to log elements: {err}");
            }
        }

        fn show_live_frame(&mut self, frame: &PointCloud) {
            let points = rerun::Points3D::new(positions(frame)).with_colors(colors(frame));
            if let Err(err) = self.rec.log("live", &points) {
                log::warn!("failed to log live frame: {err}");
            }
        }
    }
}
