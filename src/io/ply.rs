//! ASCII PLY reading and writing.
//!
//! Supports the minimal dialect the pipeline exchanges: a vertex element
//! with `x y z` and optionally `nx ny nz` float properties, one vertex per
//! line after `end_header`. Normals are renormalized on load.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::core::types::PointCloud;
use crate::error::{MatchError, Result};

/// Read an ASCII PLY file into a point cloud.
///
/// The header must declare `element vertex N`; the vertex rows must carry
/// 3 or 6 floats. Anything else fails with
/// [`MatchError::InvalidLayout`].
pub fn read_ply<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut vertex_count: usize = 0;
    let mut has_normals = false;
    let mut property_count = 0usize;
    let mut in_vertex_element = false;

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(MatchError::ShortRead("ply header"));
        }
        let trimmed = line.trim();
        if trimmed == "end_header" {
            break;
        }
        let mut fields = trimmed.split_whitespace();
        match fields.next() {
            Some("element") => {
                let kind = fields.next().unwrap_or_default();
                in_vertex_element = kind == "vertex";
                if in_vertex_element {
                    vertex_count = fields
                        .next()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                }
            }
            Some("property") if in_vertex_element => {
                property_count += 1;
                if let Some(name) = fields.nth(1) {
                    if name == "nx" {
                        has_normals = true;
                    }
                }
            }
            _ => {}
        }
    }

    if property_count != 3 && property_count != 6 {
        return Err(MatchError::InvalidLayout {
            found: property_count,
        });
    }

    let mut cloud = PointCloud::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(MatchError::ShortRead("ply vertex rows"));
        }
        let values: Vec<f32> = line
            .split_whitespace()
            .map(|v| v.parse::<f32>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| MatchError::InvalidLayout { found: 0 })?;

        match (values.len(), has_normals) {
            (3, false) => cloud.push([values[0], values[1], values[2]]),
            (6, true) => {
                let mut n = [values[3] as f64, values[4] as f64, values[5] as f64];
                let norm = crate::core::math::norm3(&n);
                if norm > 1e-5 {
                    n = [n[0] / norm, n[1] / norm, n[2] / norm];
                }
                cloud.push_with_normal(
                    [values[0], values[1], values[2]],
                    [n[0] as f32, n[1] as f32, n[2] as f32],
                );
            }
            (found, _) => return Err(MatchError::InvalidLayout { found }),
        }
    }
    Ok(cloud)
}

/// Write a point cloud as ASCII PLY, mirroring the reader's dialect.
pub fn write_ply<P: AsRef<Path>>(cloud: &PointCloud, path: P) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "element vertex {}", cloud.len())?;
    writeln!(writer, "property float x")?;
    writeln!(writer, "property float y")?;
    writeln!(writer, "property float z")?;
    if cloud.has_normals() {
        writeln!(writer, "property float nx")?;
        writeln!(writer, "property float ny")?;
        writeln!(writer, "property float nz")?;
    }
    writeln!(writer, "end_header")?;

    for (point, normal) in cloud.iter() {
        match normal {
            Some(n) => writeln!(
                writer,
                "{} {} {} {} {} {}",
                point[0], point[1], point[2], n[0], n[1], n[2]
            )?,
            None => writeln!(writer, "{} {} {}", point[0], point[1], point[2])?,
        }
    }
    writer.flush()?;
    Ok(())
}
