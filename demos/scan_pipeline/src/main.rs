use argh::FromArgs;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use autoscan::k3d::pointcloud::PointCloud;
use autoscan::workbench::{
    acquisition::ReplaySource,
    config::WorkbenchConfig,
    element::ElementId,
    render::{RenderItem, Renderer},
    store::{FileFormat, FileStore},
    Workbench,
};

mod renderer;

#[derive(FromArgs)]
/// Capture a synthetic turntable scan, then filter, register and reconstruct it
struct Args {
    /// path to a JSON workbench configuration
    #[argh(option)]
    config: Option<PathBuf>,

    /// number of turntable frames to replay
    #[argh(option, default = "6")]
    frames: usize,

    /// turntable step between two frames, in degrees
    #[argh(option, default = "4.0")]
    step_degrees: f64,

    /// base path to save the reconstructed surfaces to
    #[argh(option)]
    output: Option<PathBuf>,

    /// output file format: obj, ply or pcd
    #[argh(option, default = "FileFormat::Ply")]
    format: FileFormat,

    /// log the registry to a spawned Rerun viewer
    #[argh(switch)]
    rerun: bool,
}

/// Prints the visible elements after every registry change.
struct ConsoleRenderer;

impl Renderer for ConsoleRenderer {
    fn render(&mut self, items: &[RenderItem<'_>]) {
        let visible = items.iter().filter(|item| item.visible).count();
        println!("registry: {} elements, {} selected", items.len(), visible);
    }
}

/// A bumpy surface patch seen from a turntable rotated by `angle` radians.
fn turntable_frame(rng: &mut StdRng, angle: f64) -> PointCloud {
    let (sin, cos) = angle.sin_cos();
    let mut points = Vec::with_capacity(40 * 40);
    for i in 0..40 {
        for j in 0..40 {
            let x = i as f64 * 0.025 - 0.5;
            let y = j as f64 * 0.025 - 0.5;
            let z = 0.1 * (3.0 * x).sin() * (2.0 * y).cos() + rng.random_range(-1e-3..1e-3);
            points.push([cos * x - sin * y, sin * x + cos * y, z]);
        }
    }
    PointCloud::from_points(points)
}

/// Select exactly the elements in `ids`.
fn select_only(workbench: &mut Workbench, ids: &[ElementId]) {
    workbench.unselect_all();
    let rows: Vec<usize> = workbench
        .registry()
        .iter()
        .enumerate()
        .filter(|(_, e)| ids.contains(&e.id()))
        .map(|(i, _)| i)
        .collect();
    for row in rows {
        workbench.set_selected(row, true);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => WorkbenchConfig::from_json_file(path)?,
        None => WorkbenchConfig::default(),
    };

    let renderer: Box<dyn Renderer> = if args.rerun {
        renderer::spawn_rerun()?
    } else {
        Box::new(ConsoleRenderer)
    };
    let mut workbench = Workbench::new(config, renderer, Box::new(FileStore));

    let mut rng = StdRng::seed_from_u64(7);
    let frames = (0..args.frames)
        .map(|i| turntable_frame(&mut rng, (i as f64 * args.step_degrees).to_radians()))
        .collect::<Vec<_>>();

    // replay slower than the capture pitch so every frame is kept
    let interval = workbench.config().frame_pitch() + Duration::from_millis(20);
    workbench.start_grabber(Box::new(ReplaySource::new(frames, interval, false)))?;
    workbench.begin_continuous_capture("frame")?;

    // drain every tick so long captures never fill the queue
    let mut captured = Vec::new();
    let deadline = Instant::now() + interval * (args.frames as u32 + 10);
    while workbench.bridge().sequence() < args.frames && Instant::now() < deadline {
        captured.extend(workbench.refresh_live_view());
        std::thread::sleep(Duration::from_millis(10));
    }
    captured.extend(workbench.end_continuous_capture());
    workbench.stop_grabber();
    println!("captured {} frames", captured.len());

    select_only(&mut workbench, &captured);
    let filtered = workbench.run_filter()?;

    select_only(&mut workbench, &filtered[..filtered.len().min(2)]);
    if filtered.len() >= 2 {
        workbench.run_correspondence()?;
        println!(
            "{} correspondences between the first two frames",
            workbench.last_correspondences().len()
        );
    }

    select_only(&mut workbench, &filtered);
    let registered = workbench.run_chained_registration()?;
    println!("registered {} frames", registered.len());

    select_only(&mut workbench, &registered);
    let surfaces = workbench.run_reconstruction()?;

    if let Some(output) = &args.output {
        select_only(&mut workbench, &surfaces);
        for path in workbench.save_selected(output, args.format)? {
            println!("saved {}", path.display());
        }
    }

    workbench.shutdown();

    Ok(())
}
