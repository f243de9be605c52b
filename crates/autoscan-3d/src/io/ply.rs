use std::io::{BufRead, Write};
use std::path::Path;

use crate::{mesh::PolygonMesh, pointcloud::PointCloud, GeometryError};

/// Error types for the PLY module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PlyError {
    /// Failed to read or write the PLY file.
    #[error("Failed to access PLY file")]
    Io(#[from] std::io::Error),

    /// The header declares something this reader does not handle.
    #[error("Unsupported PLY property")]
    UnsupportedProperty,

    /// A body line does not match the header.
    #[error("Malformed PLY data at line {0}")]
    MalformedData(usize),

    /// The faces reference missing vertices.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

struct PlyElement {
    name: String,
    count: usize,
    properties: Vec<String>,
}

fn parse_header<R: BufRead>(reader: &mut R) -> Result<(Vec<PlyElement>, usize), PlyError> {
    let mut line = String::new();
    let mut elements: Vec<PlyElement> = Vec::new();
    let mut is_ply = false;
    let mut is_ascii = false;
    let mut line_no = 0;

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(PlyError::UnsupportedProperty);
        }
        line_no += 1;
        let trimmed = line.trim();
        let parts: Vec<&str> = trimmed.split_whitespace().collect();

        match parts.as_slice() {
            ["ply"] => is_ply = true,
            ["end_header"] => break,
            ["format", "ascii", _] => is_ascii = true,
            ["element", name, count] => elements.push(PlyElement {
                name: name.to_string(),
                count: count.parse().map_err(|_| PlyError::UnsupportedProperty)?,
                properties: Vec::new(),
            }),
            ["property", "list", _, _, name] | ["property", _, name] => {
                let element = elements.last_mut().ok_or(PlyError::UnsupportedProperty)?;
                element.properties.push(name.to_string());
            }
            _ => {}
        }
    }

    if !is_ply || !is_ascii {
        return Err(PlyError::UnsupportedProperty);
    }
    Ok((elements, line_no))
}

/// Read an ASCII PLY file into a mesh.
///
/// Vertex `x/y/z` are required; `nx/ny/nz` and `red/green/blue` are picked up when present.
/// Faces with more than three vertices are split into a triangle fan. A file without a face
/// element yields a mesh without triangles.
pub fn read_ply_ascii(path: impl AsRef<Path>) -> Result<PolygonMesh, PlyError> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let (elements, mut line_no) = parse_header(&mut reader)?;

    let mut points = Vec::new();
    let mut colors = Vec::new();
    let mut normals = Vec::new();
    let mut triangles = Vec::new();
    let mut has_colors = false;
    let mut has_normals = false;

    let mut lines = reader.lines();
    for element in elements.iter() {
        let column = |name: &str| element.properties.iter().position(|p| p == name);

        for _ in 0..element.count {
            let line = lines.next().ok_or(PlyError::MalformedData(line_no + 1))??;
            line_no += 1;
            let values: Vec<f64> = line
                .split_whitespace()
                .map(|v| v.parse::<f64>())
                .collect::<Result<_, _>>()
                .map_err(|_| PlyError::MalformedData(line_no))?;
            let value = |i: usize| values.get(i).copied().ok_or(PlyError::MalformedData(line_no));

            match element.name.as_str() {
                "vertex" => {
                    let (x, y, z) = match (column("x"), column("y"), column("z")) {
                        (Some(x), Some(y), Some(z)) => (x, y, z),
                        _ => return Err(PlyError::UnsupportedProperty),
                    };
                    points.push([value(x)?, value(y)?, value(z)?]);

                    if let (Some(nx), Some(ny), Some(nz)) = (column("nx"), column("ny"), column("nz")) {
                        has_normals = true;
                        normals.push([value(nx)?, value(ny)?, value(nz)?]);
                    }
                    if let (Some(r), Some(g), Some(b)) =
                        (column("red"), column("green"), column("blue"))
                    {
                        has_colors = true;
                        colors.push([value(r)? as u8, value(g)? as u8, value(b)? as u8]);
                    }
                }
                "face" => {
                    let n = value(0)? as usize;
                    let indices = (1..=n)
                        .map(|i| value(i).map(|v| v as u32))
                        .collect::<Result<Vec<_>, _>>()?;
                    for k in 1..n.saturating_sub(1) {
                        triangles.push([indices[0], indices[k], indices[k + 1]]);
                    }
                }
                _ => {}
            }
        }
    }

    let cloud = PointCloud::new(
        points,
        has_colors.then_some(colors),
        has_normals.then_some(normals),
    );
    Ok(PolygonMesh::new(cloud, triangles)?)
}

/// Write a cloud, and optionally its triangles, as an ASCII PLY file.
pub fn write_ply_ascii(
    path: impl AsRef<Path>,
    cloud: &PointCloud,
    triangles: &[[u32; 3]],
) -> Result<(), PlyError> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);

    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "element vertex {}", cloud.len())?;
    for axis in ["x", "y", "z"] {
        writeln!(writer, "property double {axis}")?;
    }
    if cloud.normals().is_some() {
        for axis in ["nx", "ny", "nz"] {
            writeln!(writer, "property double {axis}")?;
        }
    }
    if cloud.colors().is_some() {
        for channel in ["red", "green", "blue"] {
            writeln!(writer, "property uchar {channel}")?;
        }
    }
    if !triangles.is_empty() {
        writeln!(writer, "element face {}", triangles.len())?;
        writeln!(writer, "property list uchar int vertex_indices")?;
    }
    writeln!(writer, "end_header")?;

    for (i, p) in cloud.points().iter().enumerate() {
        write!(writer, "{} {} {}", p[0], p[1], p[2])?;
        if let Some(normals) = cloud.normals() {
            let n = normals[i];
            write!(writer, " {} {} {}", n[0], n[1], n[2])?;
        }
        if let Some(colors) = cloud.colors() {
            let c = colors[i];
            write!(writer, " {} {} {}", c[0], c[1], c[2])?;
        }
        writeln!(writer)?;
    }
    for t in triangles {
        writeln!(writer, "3 {} {} {}", t[0], t[1], t[2])?;
    }

    writer.flush()?;
    Ok(())
}
