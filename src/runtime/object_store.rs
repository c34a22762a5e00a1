//! Block storage with a memory cap and spilling to local disk.

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};
use ndarray::{Array, IxDyn};
use parking_lot::Mutex;
use crate::common::{Record, Value};
use crate::error::DetectError;
use crate::utils::human_bytes;

/// Distinguishes stores sharing one spill directory within a process.
static STORE_SEQ: AtomicU64 = AtomicU64::new(0);

/// A partition of the dataset as held by the object store.
pub type Block = Vec<Record>;

/// Handle to a block put into the store. Consumed by `take`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(u64);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub in_memory_bytes: usize,
    pub in_memory_blocks: usize,
    pub spilled_blocks: usize,
    pub total_spilled: usize,
    pub total_restored: usize,
}

#[derive(Debug, Default)]
struct StoreState {
    in_memory: HashMap<ObjectRef, (Block, usize)>,
    spilled: HashMap<ObjectRef, PathBuf>,
    used: usize,
    total_spilled: usize,
    total_restored: usize,
}

#[derive(Debug)]
pub struct ObjectStore {
    capacity: usize,
    spill_dir: PathBuf,
    prefix: String,
    next_id: AtomicU64,
    state: Mutex<StoreState>,
}

impl ObjectStore {
    /// Creates the store and its spill directory.
    pub fn new(capacity: usize, spill_dir: &Path) -> Result<Self, DetectError> {
        fs::create_dir_all(spill_dir)?;
        Ok(Self {
            capacity,
            spill_dir: spill_dir.to_path_buf(),
            prefix: format!(
                "spill-{}-{}",
                std::process::id(),
                STORE_SEQ.fetch_add(1, Ordering::Relaxed)
            ),
            next_id: AtomicU64::new(0),
            state: Mutex::new(StoreState::default()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn spill_dir(&self) -> &Path {
        &self.spill_dir
    }

    /// Stores a block, spilling it to disk if it does not fit under the memory cap.
    pub fn put(&self, block: Block) -> Result<ObjectRef, DetectError> {
        let id = ObjectRef(self.next_id.fetch_add(1, Ordering::Relaxed));
        let size: usize = block.iter().map(Record::nbytes).sum();

        {
            let mut state = self.state.lock();
            if state.used + size <= self.capacity {
                state.used += size;
                state.in_memory.insert(id, (block, size));
                return Ok(id);
            }
        }

        // Encode outside the lock; other workers keep taking blocks meanwhile.
        let path = self.spill_dir.join(format!("{}-{:08}.block", self.prefix, id.0));
        write_block(&path, &block)?;
        log::debug!(
            "Spilled block {} ({}) to {}",
            id.0,
            human_bytes(size as f64),
            path.display()
        );

        let mut state = self.state.lock();
        state.spilled.insert(id, path);
        state.total_spilled += 1;
        Ok(id)
    }

    /// Removes a block from the store and returns it, restoring it from disk if spilled.
    pub fn take(&self, id: ObjectRef) -> Result<Block, DetectError> {
        let spilled = {
            let mut state = self.state.lock();
            if let Some((block, size)) = state.in_memory.remove(&id) {
                state.used -= size;
                return Ok(block);
            }
            state.spilled.remove(&id)
        };

        let path = spilled.ok_or_else(|| {
            DetectError::Spill(io::Error::new(
                io::ErrorKind::NotFound,
                format!("unknown object {:?}", id),
            ))
        })?;
        let block = read_block(&path)?;
        fs::remove_file(&path)?;
        self.state.lock().total_restored += 1;
        Ok(block)
    }

    /// Drops a block without reading it back.
    pub fn release(&self, id: ObjectRef) {
        let mut state = self.state.lock();
        if let Some((_, size)) = state.in_memory.remove(&id) {
            state.used -= size;
        }
        if let Some(path) = state.spilled.remove(&id) {
            if let Err(err) = fs::remove_file(&path) {
                log::warn!("Failed to remove spill file {}: {}", path.display(), err);
            }
        }
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.state.lock();
        StoreStats {
            in_memory_bytes: state.used,
            in_memory_blocks: state.in_memory.len(),
            spilled_blocks: state.spilled.len(),
            total_spilled: state.total_spilled,
            total_restored: state.total_restored,
        }
    }
}

impl Drop for ObjectStore {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for (_, path) in state.spilled.drain() {
            let _ = fs::remove_file(path);
        }
    }
}

// Spill file layout, all integers little endian:
//   u32 record count
//   per record: u32 column count, then per column: u32 name len, name, u8 tag, payload
//   tag 0 image: u8 color, u32 width, u32 height, u64 byte len, bytes
//   tag 1 tensor: u32 ndim, u64 dims.., f32 values..
//   tag 2 text: u64 len, utf8 bytes
const TAG_IMAGE: u8 = 0;
const TAG_TENSOR: u8 = 1;
const TAG_TEXT: u8 = 2;

const COLOR_L8: u8 = 0;
const COLOR_LA8: u8 = 1;
const COLOR_RGB8: u8 = 2;
const COLOR_RGBA8: u8 = 3;

fn write_block(path: &Path, block: &Block) -> io::Result<()> {
    let mut w = BufWriter::new(fs::File::create(path)?);
    w.write_all(&(block.len() as u32).to_le_bytes())?;
    for record in block {
        w.write_all(&(record.len() as u32).to_le_bytes())?;
        for (name, value) in record.iter() {
            write_bytes_u32(&mut w, name.as_bytes())?;
            write_value(&mut w, value)?;
        }
    }
    w.flush()
}

fn write_value<W: Write>(w: &mut W, value: &Value) -> io::Result<()> {
    match value {
        Value::Image(image) => {
            let color = match image {
                DynamicImage::ImageLuma8(_) => COLOR_L8,
                DynamicImage::ImageLumaA8(_) => COLOR_LA8,
                DynamicImage::ImageRgb8(_) => COLOR_RGB8,
                DynamicImage::ImageRgba8(_) => COLOR_RGBA8,
                other => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("cannot spill image with color type {:?}", other.color()),
                    ))
                }
            };
            w.write_all(&[TAG_IMAGE, color])?;
            w.write_all(&image.width().to_le_bytes())?;
            w.write_all(&image.height().to_le_bytes())?;
            let bytes = image.as_bytes();
            w.write_all(&(bytes.len() as u64).to_le_bytes())?;
            w.write_all(bytes)
        }
        Value::Tensor(tensor) => {
            w.write_all(&[TAG_TENSOR])?;
            w.write_all(&(tensor.ndim() as u32).to_le_bytes())?;
            for d in tensor.shape() {
                w.write_all(&(*d as u64).to_le_bytes())?;
            }
            for v in tensor.iter() {
                w.write_all(&v.to_le_bytes())?;
            }
            Ok(())
        }
        Value::Text(text) => {
            w.write_all(&[TAG_TEXT])?;
            w.write_all(&(text.len() as u64).to_le_bytes())?;
            w.write_all(text.as_bytes())
        }
    }
}

fn write_bytes_u32<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    w.write_all(&(bytes.len() as u32).to_le_bytes())?;
    w.write_all(bytes)
}

fn read_block(path: &Path) -> io::Result<Block> {
    let mut r = BufReader::new(fs::File::open(path)?);
    let n = read_u32(&mut r)? as usize;
    let mut block = Vec::with_capacity(n);
    for _ in 0..n {
        let columns = read_u32(&mut r)?;
        let mut record = Record::new();
        for _ in 0..columns {
            let len = read_u32(&mut r)? as usize;
            let name = String::from_utf8(read_exact_vec(&mut r, len)?).map_err(invalid)?;
            let value = read_value(&mut r)?;
            record.insert(&name, value);
        }
        block.push(record);
    }
    Ok(block)
}

fn read_value<R: Read>(r: &mut R) -> io::Result<Value> {
    match read_u8(r)? {
        TAG_IMAGE => {
            let color = read_u8(r)?;
            let width = read_u32(r)?;
            let height = read_u32(r)?;
            let len = read_u64(r)? as usize;
            let bytes = read_exact_vec(r, len)?;
            let malformed = || invalid(format!("pixel buffer of {} bytes does not fit {}x{}", len, width, height));
            let image = match color {
                COLOR_L8 => GrayImage::from_raw(width, height, bytes).map(DynamicImage::ImageLuma8),
                COLOR_LA8 => GrayAlphaImage::from_raw(width, height, bytes).map(DynamicImage::ImageLumaA8),
                COLOR_RGB8 => RgbImage::from_raw(width, height, bytes).map(DynamicImage::ImageRgb8),
                COLOR_RGBA8 => RgbaImage::from_raw(width, height, bytes).map(DynamicImage::ImageRgba8),
                other => return Err(invalid(format!("unknown color tag {}", other))),
            };
            image.map(Value::Image).ok_or_else(malformed)
        }
        TAG_TENSOR => {
            let ndim = read_u32(r)? as usize;
            let mut shape = Vec::with_capacity(ndim);
            for _ in 0..ndim {
                shape.push(read_u64(r)? as usize);
            }
            let len: usize = shape.iter().product();
            let raw = read_exact_vec(r, len * 4)?;
            let values = raw
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            Array::from_shape_vec(IxDyn(&shape), values)
                .map(Value::Tensor)
                .map_err(invalid)
        }
        TAG_TEXT => {
            let len = read_u64(r)? as usize;
            String::from_utf8(read_exact_vec(r, len)?)
                .map(Value::Text)
                .map_err(invalid)
        }
        other => Err(invalid(format!("unknown value tag {}", other))),
    }
}

fn invalid<E: ToString>(e: E) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}

fn read_exact_vec<R: Read>(r: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
