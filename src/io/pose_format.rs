//! Binary pose and pose cluster records.
//!
//! Little-endian layout, one record per pose:
//!
//! ```text
//! u32     magic = 7673
//! f64     angle
//! i32     num_votes
//! i32     model_index
//! f64[16] pose
//! f64[3]  t
//! f64[4]  q
//! f64     residual
//! ```
//!
//! A cluster record is `magic = 8462597, id, num_votes, num_poses` followed
//! by that many pose records. Readers validate the magic word first and
//! report truncation as [`MatchError::ShortRead`].

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::core::types::{Pose3D, PoseCluster3D};
use crate::error::{MatchError, Result};

/// Magic word opening a pose record.
pub const POSE_MAGIC: u32 = 7673;

/// Magic word opening a pose cluster record.
pub const POSE_CLUSTER_MAGIC: u32 = 8_462_597;

/// Serialize one pose record.
pub fn write_pose<W: Write>(writer: &mut W, pose: &Pose3D) -> Result<()> {
    writer.write_all(&POSE_MAGIC.to_le_bytes())?;
    writer.write_all(&pose.angle.to_le_bytes())?;
    writer.write_all(&(pose.num_votes as i32).to_le_bytes())?;
    writer.write_all(&(pose.model_index as i32).to_le_bytes())?;
    for v in &pose.pose {
        writer.write_all(&v.to_le_bytes())?;
    }
    for v in &pose.t {
        writer.write_all(&v.to_le_bytes())?;
    }
    for v in &pose.q {
        writer.write_all(&v.to_le_bytes())?;
    }
    writer.write_all(&pose.residual.to_le_bytes())?;
    Ok(())
}

/// Deserialize one pose record.
pub fn read_pose<R: Read>(reader: &mut R) -> Result<Pose3D> {
    let magic = read_u32(reader, "pose magic")?;
    if magic != POSE_MAGIC {
        return Err(MatchError::BadMagic {
            expected: POSE_MAGIC,
            found: magic,
        });
    }

    let mut pose = Pose3D::new();
    pose.angle = read_f64(reader, "pose angle")?;
    pose.num_votes = read_i32(reader, "pose votes")?.max(0) as u32;
    pose.model_index = read_i32(reader, "pose model index")?.max(0) as usize;
    for v in &mut pose.pose {
        *v = read_f64(reader, "pose matrix")?;
    }
    for v in &mut pose.t {
        *v = read_f64(reader, "pose translation")?;
    }
    for v in &mut pose.q {
        *v = read_f64(reader, "pose quaternion")?;
    }
    pose.residual = read_f64(reader, "pose residual")?;
    Ok(pose)
}

/// Serialize a cluster record: header plus every member pose.
pub fn write_cluster<W: Write>(writer: &mut W, cluster: &PoseCluster3D) -> Result<()> {
    writer.write_all(&POSE_CLUSTER_MAGIC.to_le_bytes())?;
    writer.write_all(&cluster.id.to_le_bytes())?;
    writer.write_all(&(cluster.num_votes as i32).to_le_bytes())?;
    writer.write_all(&(cluster.poses.len() as i32).to_le_bytes())?;
    for pose in &cluster.poses {
        write_pose(writer, pose)?;
    }
    Ok(())
}

/// Deserialize a cluster record.
pub fn read_cluster<R: Read>(reader: &mut R) -> Result<PoseCluster3D> {
    let magic = read_u32(reader, "cluster magic")?;
    if magic != POSE_CLUSTER_MAGIC {
        return Err(MatchError::BadMagic {
            expected: POSE_CLUSTER_MAGIC,
            found: magic,
        });
    }

    let id = read_i32(reader, "cluster id")?;
    let num_votes = read_i32(reader, "cluster votes")?.max(0) as u32;
    let num_poses = read_i32(reader, "cluster size")?.max(0) as usize;

    let mut poses = Vec::with_capacity(num_poses);
    for _ in 0..num_poses {
        poses.push(read_pose(reader)?);
    }
    Ok(PoseCluster3D {
        poses,
        num_votes,
        id,
    })
}

/// Write a pose record to a file.
pub fn save_pose<P: AsRef<Path>>(pose: &Pose3D, path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_pose(&mut writer, pose)?;
    writer.flush()?;
    Ok(())
}

/// Read a pose record from a file.
pub fn load_pose<P: AsRef<Path>>(path: P) -> Result<Pose3D> {
    read_pose(&mut BufReader::new(File::open(path)?))
}

/// Write a cluster record to a file.
pub fn save_cluster<P: AsRef<Path>>(cluster: &PoseCluster3D, path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_cluster(&mut writer, cluster)?;
    writer.flush()?;
    Ok(())
}

/// Read a cluster record from a file.
pub fn load_cluster<P: AsRef<Path>>(path: P) -> Result<PoseCluster3D> {
    read_cluster(&mut BufReader::new(File::open(path)?))
}

fn read_exact_or_short<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    context: &'static str,
) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            MatchError::ShortRead(context)
        } else {
            MatchError::Io(e)
        }
    })
}

fn read_u32<R: Read>(reader: &mut R, context: &'static str) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact_or_short(reader, &mut buf, context)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32<R: Read>(reader: &mut R, context: &'static str) -> Result<i32> {
    let mut buf = [0u8; 4];
    read_exact_or_short(reader, &mut buf, context)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f64<R: Read>(reader: &mut R, context: &'static str) -> Result<f64> {
    let mut buf = [0u8; 8];
    read_exact_or_short(reader, &mut buf, context)?;
    Ok(f64::from_le_bytes(buf))
}
