//! Binary grid files.
//!
//! Layout, all big-endian:
//! `i32 size`, `i32 count` + `count` x `f32` heights, `i32 count` + `count` x `f32` water.
//! Loading validates everything before a field is built, so a short or
//! inconsistent file never produces a partially populated grid.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Result, TerrainError};
use crate::heightfield::{HeightField, MAX_SIZE};

/// Up-front reservation cap; larger grids grow as their bytes actually arrive.
const MAX_RESERVE_BYTES: usize = 1 << 20;

/// Write `field` in the grid format.
pub fn write_to<W: Write>(field: &HeightField, mut writer: W) -> Result<()> {
    writer.write_all(&(field.size() as i32).to_be_bytes())?;
    write_floats(&mut writer, field.heights())?;
    write_floats(&mut writer, field.water())?;
    writer.flush()?;
    Ok(())
}

/// Read a field written by [`write_to`]. Negative water values are clamped to 0.
pub fn read_from<R: Read>(mut reader: R) -> Result<HeightField> {
    let size = read_i32(&mut reader)?;
    if size <= 0 || size as usize > MAX_SIZE {
        return Err(TerrainError::CorruptData(format!("bad grid size {}", size)));
    }
    let size = size as usize;
    let cells = size * size;

    let height = read_floats(&mut reader, cells, "heights")?;
    let water = read_floats(&mut reader, cells, "water")?;
    let mut field = HeightField::from_grids(size, height, water)?;
    field.mark_dirty();
    Ok(field)
}

/// Save to a file, replacing it if it exists.
pub fn save<P: AsRef<Path>>(field: &HeightField, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write_to(field, BufWriter::new(file))?;
    log::info!("Saved {}x{} grid to {}", field.size(), field.size(), path.as_ref().display());
    Ok(())
}

pub fn load<P: AsRef<Path>>(path: P) -> Result<HeightField> {
    let file = File::open(path.as_ref())?;
    let field = read_from(BufReader::new(file))?;
    log::info!("Loaded {}x{} grid from {}", field.size(), field.size(), path.as_ref().display());
    Ok(field)
}

fn write_floats<W: Write>(writer: &mut W, values: &[f32]) -> io::Result<()> {
    writer.write_all(&(values.len() as i32).to_be_bytes())?;
    for v in values {
        writer.write_all(&v.to_be_bytes())?;
    }
    Ok(())
}

fn read_i32<R: Read>(reader: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(i32::from_be_bytes(buf)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(TerrainError::Truncated { expected: 1, actual: 0 })
        }
        Err(e) => Err(e.into()),
    }
}

fn read_floats<R: Read>(reader: &mut R, expected: usize, what: &str) -> Result<Vec<f32>> {
    let count = read_i32(reader)?;
    if count < 0 || count as usize != expected {
        return Err(TerrainError::CorruptData(format!(
            "{} count {} does not match {} cells",
            what, count, expected
        )));
    }

    let byte_len = expected * 4;
    let mut bytes = Vec::with_capacity(byte_len.min(MAX_RESERVE_BYTES));
    reader.take(byte_len as u64).read_to_end(&mut bytes)?;
    if bytes.len() < byte_len {
        return Err(TerrainError::Truncated { expected, actual: bytes.len() / 4 });
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
