use std::io::{BufRead, Write};
use std::path::Path;

use crate::{mesh::PolygonMesh, pointcloud::PointCloud, GeometryError};

/// Error types for the OBJ module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ObjError {
    /// Failed to read or write the OBJ file.
    #[error("Failed to access OBJ file")]
    Io(#[from] std::io::Error),

    /// A statement could not be parsed.
    #[error("Malformed OBJ statement at line {0}")]
    MalformedData(usize),

    /// The faces reference missing vertices.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

// OBJ indices are 1-based; negative values count back from the last vertex.
fn resolve_index(token: &str, num_vertices: usize, line_no: usize) -> Result<u32, ObjError> {
    let first = token.split('/').next().unwrap_or_default();
    let index: i64 = first.parse().map_err(|_| ObjError::MalformedData(line_no))?;
    let resolved = match index {
        0 => return Err(ObjError::MalformedData(line_no)),
        i if i < 0 => num_vertices as i64 + i,
        i => i - 1,
    };
    u32::try_from(resolved).map_err(|_| ObjError::MalformedData(line_no))
}

/// Read a Wavefront OBJ file into a mesh.
///
/// `v` statements may carry a trailing `r g b` color in `[0, 1]`. Vertex normals are kept only
/// when the file has exactly one `vn` per `v`. Polygons are split into triangle fans.
pub fn read_obj(path: impl AsRef<Path>) -> Result<PolygonMesh, ObjError> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);

    let mut points = Vec::new();
    let mut colors = Vec::new();
    let mut normals = Vec::new();
    let mut triangles = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = i + 1;
        let mut parts = line.split_whitespace();
        let parse_floats = |parts: std::str::SplitWhitespace| {
            parts
                .map(|v| v.parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ObjError::MalformedData(line_no))
        };

        match parts.next() {
            Some("v") => {
                let values = parse_floats(parts)?;
                if values.len() < 3 {
                    return Err(ObjError::MalformedData(line_no));
                }
                points.push([values[0], values[1], values[2]]);
                if values.len() >= 6 {
                    colors.push([
                        (values[3].clamp(0.0, 1.0) * 255.0).round() as u8,
                        (values[4].clamp(0.0, 1.0) * 255.0).round() as u8,
                        (values[5].clamp(0.0, 1.0) * 255.0).round() as u8,
                    ]);
                }
            }
            Some("vn") => {
                let values = parse_floats(parts)?;
                if values.len() != 3 {
                    return Err(ObjError::MalformedData(line_no));
                }
                normals.push([values[0], values[1], values[2]]);
            }
            Some("f") => {
                let indices = parts
                    .map(|token| resolve_index(token, points.len(), line_no))
                    .collect::<Result<Vec<_>, _>>()?;
                for k in 1..indices.len().saturating_sub(1) {
                    triangles.push([indices[0], indices[k], indices[k + 1]]);
                }
            }
            _ => {}
        }
    }

    let colors = (!colors.is_empty() && colors.len() == points.len()).then_some(colors);
    let normals = (!normals.is_empty() && normals.len() == points.len()).then_some(normals);
    Ok(PolygonMesh::new(
        PointCloud::new(points, colors, normals),
        triangles,
    )?)
}

/// Write a cloud, and optionally its triangles, as a Wavefront OBJ file.
pub fn write_obj(
    path: impl AsRef<Path>,
    cloud: &PointCloud,
    triangles: &[[u32; 3]],
) -> Result<(), ObjError> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);

    for (i, p) in cloud.points().iter().enumerate() {
        write!(writer, "v {} {} {}", p[0], p[1], p[2])?;
        if let Some(colors) = cloud.colors() {
            let c = colors[i];
            write!(
                writer,
                " {} {} {}",
                c[0] as f64 / 255.0,
                c[1] as f64 / 255.0,
                c[2] as f64 / 255.0
            )?;
        }
        writeln!(writer)?;
    }
    if let Some(normals) = cloud.normals() {
        for n in normals {
            writeln!(writer, "vn {} {} {}", n[0], n[1], n[2])?;
        }
    }

    let with_normals = cloud.normals().is_some();
    for t in triangles {
        let [a, b, c] = t.map(|i| i + 1);
        if with_normals {
            writeln!(writer, "f {a}//{a} {b}//{b} {c}//{c}")?;
        } else {
            writeln!(writer, "f {a} {b} {c}")?;
        }
    }

    writer.flush()?;
    Ok(())
}
