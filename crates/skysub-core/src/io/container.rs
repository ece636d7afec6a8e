//! Multi-chip container (MCF) read/write.
//!
//! One header plus K fixed-size planes, little-endian, addressed by chip
//! index. Frames, masks, count maps and rms maps all share the layout and
//! differ only in the plane element kind.

use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::Mmap;
use ndarray::Array2;

use crate::error::{Result, SkyError};
use crate::frame::{Frame, FrameMeta, Mask};

pub const MCF_MAGIC: &[u8; 12] = b"SKYSUB-MCF1\0";

/// Element type of the stored planes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaneKind {
    F32,
    U8,
    U32,
}

impl PlaneKind {
    pub fn elem_size(self) -> usize {
        match self {
            PlaneKind::F32 | PlaneKind::U32 => 4,
            PlaneKind::U8 => 1,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(PlaneKind::F32),
            1 => Ok(PlaneKind::U8),
            2 => Ok(PlaneKind::U32),
            other => Err(SkyError::InvalidContainer(format!(
                "Unknown plane kind tag {other}"
            ))),
        }
    }

    fn tag(self) -> u8 {
        match self {
            PlaneKind::F32 => 0,
            PlaneKind::U8 => 1,
            PlaneKind::U32 => 2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ContainerHeader {
    pub chip_count: usize,
    pub rows: usize,
    pub cols: usize,
    pub kind: PlaneKind,
    pub meta: FrameMeta,
}

/// Memory-mapped container reader. Parses the header eagerly; planes are
/// decoded on demand from the mapping.
#[derive(Debug)]
pub struct ContainerReader {
    mmap: Mmap,
    pub header: ContainerHeader,
    data_offset: usize,
}

impl ContainerReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < MCF_MAGIC.len() || &mmap[..MCF_MAGIC.len()] != MCF_MAGIC {
            return Err(SkyError::InvalidContainer(format!(
                "{}: missing MCF magic",
                path.display()
            )));
        }

        let mut cursor = Cursor::new(&mmap[..]);
        cursor.set_position(MCF_MAGIC.len() as u64);
        let header = parse_header(&mut cursor)?;
        let data_offset = cursor.position() as usize;

        let plane_bytes = header.rows * header.cols * header.kind.elem_size();
        let expected = data_offset + plane_bytes * header.chip_count;
        if mmap.len() < expected {
            return Err(SkyError::InvalidContainer(format!(
                "{}: truncated, expected at least {} bytes, got {}",
                path.display(),
                expected,
                mmap.len()
            )));
        }

        Ok(Self {
            mmap,
            header,
            data_offset,
        })
    }

    pub fn chip_count(&self) -> usize {
        self.header.chip_count
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.header.rows, self.header.cols)
    }

    /// Raw bytes of one plane (zero-copy from the mapping).
    fn plane_raw(&self, chip: usize) -> Result<&[u8]> {
        if chip >= self.header.chip_count {
            return Err(SkyError::ChipIndexOutOfRange {
                index: chip,
                total: self.header.chip_count,
            });
        }
        let plane_bytes = self.header.rows * self.header.cols * self.header.kind.elem_size();
        let offset = self.data_offset + chip * plane_bytes;
        Ok(&self.mmap[offset..offset + plane_bytes])
    }

    /// Decode one plane to f32, converting integral plane kinds.
    pub fn read_plane_f32(&self, chip: usize) -> Result<Array2<f32>> {
        let raw = self.plane_raw(chip)?;
        let (h, w) = self.dims();
        let mut out = Array2::<f32>::zeros((h, w));
        let flat = out.as_slice_mut().expect("freshly allocated plane is contiguous");
        match self.header.kind {
            PlaneKind::F32 => {
                let mut rdr = Cursor::new(raw);
                for v in flat.iter_mut() {
                    *v = rdr.read_f32::<LittleEndian>()?;
                }
            }
            PlaneKind::U8 => {
                for (v, b) in flat.iter_mut().zip(raw.iter()) {
                    *v = *b as f32;
                }
            }
            PlaneKind::U32 => {
                let mut rdr = Cursor::new(raw);
                for v in flat.iter_mut() {
                    *v = rdr.read_u32::<LittleEndian>()? as f32;
                }
            }
        }
        Ok(out)
    }

    /// Decode one u8 plane. Errors unless the container holds u8 planes.
    pub fn read_plane_u8(&self, chip: usize) -> Result<Array2<u8>> {
        if self.header.kind != PlaneKind::U8 {
            return Err(SkyError::InvalidContainer(
                "Expected a u8-plane container".into(),
            ));
        }
        let raw = self.plane_raw(chip)?;
        let (h, w) = self.dims();
        let mut out = Array2::<u8>::zeros((h, w));
        let flat = out.as_slice_mut().expect("freshly allocated plane is contiguous");
        flat.copy_from_slice(raw);
        Ok(out)
    }

    /// Decode one u32 plane (count maps).
    pub fn read_plane_u32(&self, chip: usize) -> Result<Array2<u32>> {
        if self.header.kind != PlaneKind::U32 {
            return Err(SkyError::InvalidContainer(
                "Expected a u32-plane container".into(),
            ));
        }
        let raw = self.plane_raw(chip)?;
        let (h, w) = self.dims();
        let mut out = Array2::<u32>::zeros((h, w));
        let flat = out.as_slice_mut().expect("freshly allocated plane is contiguous");
        let mut rdr = Cursor::new(raw);
        for v in flat.iter_mut() {
            *v = rdr.read_u32::<LittleEndian>()?;
        }
        Ok(out)
    }

    /// Read all planes as a Frame.
    pub fn read_frame(&self) -> Result<Frame> {
        let planes = (0..self.header.chip_count)
            .map(|c| self.read_plane_f32(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(Frame::new(planes, self.header.meta.clone()))
    }

    /// Read all planes as a Mask.
    pub fn read_mask(&self) -> Result<Mask> {
        let planes = (0..self.header.chip_count)
            .map(|c| self.read_plane_u8(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(Mask::new(planes))
    }
}

fn parse_header(cursor: &mut Cursor<&[u8]>) -> Result<ContainerHeader> {
    let chip_count = cursor.read_u32::<LittleEndian>()? as usize;
    let rows = cursor.read_u32::<LittleEndian>()? as usize;
    let cols = cursor.read_u32::<LittleEndian>()? as usize;
    let kind = PlaneKind::from_tag(cursor.read_u8()?)?;
    let mut pad = [0u8; 3];
    cursor.read_exact(&mut pad)?;

    let exposure_id = read_string(cursor)?;
    let filter = read_string(cursor)?;
    let ra_deg = read_opt_f64(cursor)?;
    let dec_deg = read_opt_f64(cursor)?;
    let mjd = read_opt_f64(cursor)?;

    let n_levels = cursor.read_u32::<LittleEndian>()? as usize;
    ensure_remaining(cursor, n_levels * 4)?;
    let mut sky_levels = Vec::with_capacity(n_levels);
    for _ in 0..n_levels {
        sky_levels.push(cursor.read_f32::<LittleEndian>()?);
    }

    let n_history = cursor.read_u32::<LittleEndian>()? as usize;
    ensure_remaining(cursor, n_history * 4)?;
    let mut history = Vec::with_capacity(n_history);
    for _ in 0..n_history {
        history.push(read_string(cursor)?);
    }

    Ok(ContainerHeader {
        chip_count,
        rows,
        cols,
        kind,
        meta: FrameMeta {
            exposure_id,
            filter,
            ra_deg,
            dec_deg,
            mjd,
            sky_levels,
            history,
        },
    })
}

/// Guard against corrupt length fields before any allocation sized by them.
fn ensure_remaining(cursor: &Cursor<&[u8]>, needed: usize) -> Result<()> {
    let remaining = cursor.get_ref().len().saturating_sub(cursor.position() as usize);
    if needed > remaining {
        return Err(SkyError::InvalidContainer(format!(
            "Header field of {needed} bytes exceeds the {remaining} bytes left in the file"
        )));
    }
    Ok(())
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = cursor.read_u32::<LittleEndian>()? as usize;
    ensure_remaining(cursor, len)?;
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map_err(|e| SkyError::InvalidContainer(format!("Invalid UTF-8 in header: {e}")))
}

fn read_opt_f64(cursor: &mut Cursor<&[u8]>) -> Result<Option<f64>> {
    let v = cursor.read_f64::<LittleEndian>()?;
    Ok(if v.is_nan() { None } else { Some(v) })
}

/// Write a container atomically: the data goes to a sibling temp file that
/// is renamed into place only once fully written, so a failed frame never
/// leaves a partial artifact behind.
fn write_container<F>(
    path: &Path,
    kind: PlaneKind,
    chip_count: usize,
    dims: (usize, usize),
    meta: &FrameMeta,
    write_planes: F,
) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let tmp = path.with_extension("mcf.tmp");
    {
        let file = File::create(&tmp)?;
        let mut w = BufWriter::new(file);

        w.write_all(MCF_MAGIC)?;
        w.write_u32::<LittleEndian>(chip_count as u32)?;
        w.write_u32::<LittleEndian>(dims.0 as u32)?;
        w.write_u32::<LittleEndian>(dims.1 as u32)?;
        w.write_u8(kind.tag())?;
        w.write_all(&[0u8; 3])?;

        write_string(&mut w, &meta.exposure_id)?;
        write_string(&mut w, &meta.filter)?;
        write_opt_f64(&mut w, meta.ra_deg)?;
        write_opt_f64(&mut w, meta.dec_deg)?;
        write_opt_f64(&mut w, meta.mjd)?;

        w.write_u32::<LittleEndian>(meta.sky_levels.len() as u32)?;
        for &lvl in &meta.sky_levels {
            w.write_f32::<LittleEndian>(lvl)?;
        }

        w.write_u32::<LittleEndian>(meta.history.len() as u32)?;
        for entry in &meta.history {
            write_string(&mut w, entry)?;
        }

        write_planes(&mut w)?;
        w.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn write_string(w: &mut impl Write, s: &str) -> Result<()> {
    w.write_u32::<LittleEndian>(s.len() as u32)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn write_opt_f64(w: &mut impl Write, v: Option<f64>) -> Result<()> {
    w.write_f64::<LittleEndian>(v.unwrap_or(f64::NAN))?;
    Ok(())
}

/// Write a frame (f32 planes) with its metadata.
pub fn write_frame(path: &Path, frame: &Frame) -> Result<()> {
    write_f32_planes(path, &frame.planes, &frame.meta)
}

/// Write f32 planes with arbitrary metadata (sky, rms, background maps).
pub fn write_f32_planes(path: &Path, planes: &[Array2<f32>], meta: &FrameMeta) -> Result<()> {
    let dims = planes.first().map(|p| p.dim()).unwrap_or((0, 0));
    write_container(path, PlaneKind::F32, planes.len(), dims, meta, |w| {
        for plane in planes {
            for &v in plane.iter() {
                w.write_f32::<LittleEndian>(v)?;
            }
        }
        Ok(())
    })
}

/// Write a validity mask (u8 planes).
pub fn write_mask(path: &Path, mask: &Mask, meta: &FrameMeta) -> Result<()> {
    let dims = mask.planes.first().map(|p| p.dim()).unwrap_or((0, 0));
    write_container(path, PlaneKind::U8, mask.planes.len(), dims, meta, |w| {
        for plane in &mask.planes {
            for &v in plane.iter() {
                w.write_u8(v)?;
            }
        }
        Ok(())
    })
}

/// Write contributing-candidate count maps (u32 planes).
pub fn write_counts(path: &Path, planes: &[Array2<u32>], meta: &FrameMeta) -> Result<()> {
    let dims = planes.first().map(|p| p.dim()).unwrap_or((0, 0));
    write_container(path, PlaneKind::U32, planes.len(), dims, meta, |w| {
        for plane in planes {
            for &v in plane.iter() {
                w.write_u32::<LittleEndian>(v)?;
            }
        }
        Ok(())
    })
}
