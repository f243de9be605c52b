use std::collections::HashMap;
use std::io::{BufRead, Read, Write};
use std::path::Path;

use crate::pointcloud::PointCloud;

const MAX_POINT_STEP: usize = 1024;
const MAX_POINTS: usize = 50_000_000;

/// Error types for the PCD module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PcdError {
    /// Failed to read or write the PCD file.
    #[error("Failed to access PCD file")]
    Io(#[from] std::io::Error),

    /// A field has a layout this reader does not handle.
    #[error("Unsupported PCD property")]
    UnsupportedProperty,

    /// The header is incomplete or inconsistent.
    #[error("Malformed PCD header")]
    MalformedHeader,
}

#[derive(Debug)]
struct PcdField {
    offset: usize,
}

#[derive(Debug)]
struct PcdLayout {
    fields: HashMap<String, PcdField>,
    point_step: usize,
    num_points: usize,
}

impl PcdLayout {
    fn offset(&self, name: &str) -> Option<usize> {
        self.fields.get(name).map(|f| f.offset)
    }
}

#[inline]
fn read_f32(buf: &[u8], offset: usize) -> Result<f32, PcdError> {
    let slice = buf
        .get(offset..offset + 4)
        .ok_or(PcdError::UnsupportedProperty)?;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(slice);
    Ok(f32::from_le_bytes(bytes))
}

#[inline]
fn read_u32(buf: &[u8], offset: usize) -> Result<u32, PcdError> {
    let slice = buf
        .get(offset..offset + 4)
        .ok_or(PcdError::UnsupportedProperty)?;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(slice);
    Ok(u32::from_le_bytes(bytes))
}

fn parse_usizes<'a>(it: impl Iterator<Item = &'a str>) -> Result<Vec<usize>, PcdError> {
    it.map(|v| v.parse::<usize>().map_err(|_| PcdError::MalformedHeader))
        .collect()
}

fn parse_pcd_layout<R: BufRead>(reader: &mut R) -> Result<PcdLayout, PcdError> {
    let mut names: Vec<String> = Vec::new();
    let mut sizes = Vec::new();
    let mut types = Vec::new();
    let mut counts = Vec::new();
    let mut num_points = 0usize;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(PcdError::MalformedHeader);
        }
        let line = line.trim();

        if line.starts_with("DATA") {
            if line != "DATA binary" {
                return Err(PcdError::UnsupportedProperty);
            }
            break;
        }

        let mut it = line.split_whitespace();
        match it.next() {
            Some("FIELDS") => names = it.map(String::from).collect(),
            Some("SIZE") => sizes = parse_usizes(it)?,
            Some("COUNT") => counts = parse_usizes(it)?,
            Some("TYPE") => {
                types = it
                    .map(|v| v.chars().next().ok_or(PcdError::MalformedHeader))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Some("POINTS") => {
                num_points = it
                    .next()
                    .and_then(|v| v.parse::<usize>().ok())
                    .ok_or(PcdError::MalformedHeader)?;
            }
            _ => {}
        }
    }

    if names.is_empty()
        || sizes.len() != names.len()
        || types.len() != names.len()
        || (!counts.is_empty() && counts.len() != names.len())
    {
        return Err(PcdError::MalformedHeader);
    }

    let mut offset = 0usize;
    let mut fields = HashMap::new();
    for (i, name) in names.iter().enumerate() {
        // a missing COUNT line means one element per field
        let count = counts.get(i).copied().unwrap_or(1);
        let (size, kind) = (sizes[i], types[i]);

        match name.as_str() {
            "x" | "y" | "z" | "normal_x" | "normal_y" | "normal_z" => {
                if !(size == 4 && count == 1 && kind == 'F') {
                    return Err(PcdError::UnsupportedProperty);
                }
            }
            "rgb" => {
                if !(size == 4 && count == 1 && matches!(kind, 'U' | 'I' | 'F')) {
                    return Err(PcdError::UnsupportedProperty);
                }
            }
            _ => {}
        }

        if fields.insert(name.clone(), PcdField { offset }).is_some() {
            return Err(PcdError::MalformedHeader);
        }

        offset = size
            .checked_mul(count)
            .and_then(|bytes| offset.checked_add(bytes))
            .ok_or(PcdError::MalformedHeader)?;
        if offset > MAX_POINT_STEP {
            return Err(PcdError::MalformedHeader);
        }
    }

    if num_points > MAX_POINTS {
        return Err(PcdError::MalformedHeader);
    }

    Ok(PcdLayout {
        fields,
        point_step: offset,
        num_points,
    })
}

/// Read a binary PCD file.
///
/// Supports XYZ clouds with optional packed `rgb` and `normal_x/y/z` fields.
pub fn read_pcd_binary(path: impl AsRef<Path>) -> Result<PointCloud, PcdError> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let layout = parse_pcd_layout(&mut reader)?;

    let (fx, fy, fz) = match (layout.offset("x"), layout.offset("y"), layout.offset("z")) {
        (Some(fx), Some(fy), Some(fz)) => (fx, fy, fz),
        _ => return Err(PcdError::UnsupportedProperty),
    };
    let frgb = layout.offset("rgb");
    let fnormal = match (
        layout.offset("normal_x"),
        layout.offset("normal_y"),
        layout.offset("normal_z"),
    ) {
        (Some(nx), Some(ny), Some(nz)) => Some((nx, ny, nz)),
        _ => None,
    };

    let mut buffer = vec![0u8; layout.point_step];
    let mut points = Vec::with_capacity(layout.num_points);
    let mut colors = Vec::new();
    let mut normals = Vec::new();

    for _ in 0..layout.num_points {
        reader.read_exact(&mut buffer)?;

        points.push([
            read_f32(&buffer, fx)? as f64,
            read_f32(&buffer, fy)? as f64,
            read_f32(&buffer, fz)? as f64,
        ]);

        if let Some(off) = frgb {
            let rgb = read_u32(&buffer, off)?;
            colors.push([
                ((rgb >> 16) & 0xFF) as u8,
                ((rgb >> 8) & 0xFF) as u8,
                (rgb & 0xFF) as u8,
            ]);
        }

        if let Some((ox, oy, oz)) = fnormal {
            normals.push([
                read_f32(&buffer, ox)? as f64,
                read_f32(&buffer, oy)? as f64,
                read_f32(&buffer, oz)? as f64,
            ]);
        }
    }

    Ok(PointCloud::new(
        points,
        frgb.map(|_| colors),
        fnormal.map(|_| normals),
    ))
}

/// Write a point cloud as a binary PCD file.
///
/// Colors are packed into a single `rgb` field; normals are stored as `normal_x/y/z`.
pub fn write_pcd_binary(path: impl AsRef<Path>, cloud: &PointCloud) -> Result<(), PcdError> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);

    let mut fields = vec!["x", "y", "z"];
    let mut types = vec!["F", "F", "F"];
    if cloud.colors().is_some() {
        fields.push("rgb");
        types.push("U");
    }
    if cloud.normals().is_some() {
        fields.extend(["normal_x", "normal_y", "normal_z"]);
        types.extend(["F", "F", "F"]);
    }

    writeln!(writer, "# .PCD v0.7 - Point Cloud Data file format")?;
    writeln!(writer, "VERSION 0.7")?;
    writeln!(writer, "FIELDS {}", fields.join(" "))?;
    writeln!(writer, "SIZE {}", vec!["4"; fields.len()].join(" "))?;
    writeln!(writer, "TYPE {}", types.join(" "))?;
    writeln!(writer, "COUNT {}", vec!["1"; fields.len()].join(" "))?;
    writeln!(writer, "WIDTH {}", cloud.len())?;
    writeln!(writer, "HEIGHT 1")?;
    writeln!(writer, "VIEWPOINT 0 0 0 1 0 0 0")?;
    writeln!(writer, "POINTS {}", cloud.len())?;
    writeln!(writer, "DATA binary")?;

    for (i, p) in cloud.points().iter().enumerate() {
        for v in p {
            writer.write_all(&(*v as f32).to_le_bytes())?;
        }
        if let Some(colors) = cloud.colors() {
            let [r, g, b] = colors[i];
            let packed = ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
            writer.write_all(&packed.to_le_bytes())?;
        }
        if let Some(normals) = cloud.normals() {
            for v in normals[i] {
                writer.write_all(&(v as f32).to_le_bytes())?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_rejects_ascii_data() {
        let data = b"FIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nCOUNT 1 1 1\nPOINTS 1\nDATA ascii\n";
        let mut reader = Cursor::new(&data[..]);
        assert!(matches!(
            parse_pcd_layout(&mut reader),
            Err(PcdError::UnsupportedProperty)
        ));
    }

    #[test]
    fn test_parses_binary_header() -> Result<(), PcdError> {
        let data = b"FIELDS x y z rgb\nSIZE 4 4 4 4\nTYPE F F F U\nPOINTS 10\nDATA binary\n";
        let mut reader = Cursor::new(&data[..]);
        let layout = parse_pcd_layout(&mut reader)?;
        assert_eq!(layout.num_points, 10);
        assert_eq!(layout.point_step, 16);
        assert_eq!(layout.offset("rgb"), Some(12));
        Ok(())
    }

    #[test]
    fn test_rejects_integer_xyz() {
        let data = b"FIELDS x y z\nSIZE 4 4 4\nTYPE I I I\nPOINTS 5\nDATA binary\n";
        let mut reader = Cursor::new(&data[..]);
        assert!(parse_pcd_layout(&mut reader).is_err());
    }

    #[test]
    fn test_write_then_read() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cloud.pcd");
        let cloud = PointCloud::new(
            vec![[0.5, -1.0, 2.0], [1.25, 0.0, -3.5]],
            Some(vec![[255, 10, 0], [1, 2, 3]]),
            Some(vec![[0.0, 0.0, 1.0], [1.0, 0.0, 0.0]]),
        );

        write_pcd_binary(&path, &cloud)?;
        let read = read_pcd_binary(&path)?;

        // every value above is exactly representable in f32
        assert_eq!(read, cloud);
        Ok(())
    }
}
