///! Compressed visibility lump module
///!
///! Layout: `i32` cluster count, `[i32; 2]` PVS/PHS row offsets per cluster
///! (measured from the lump start), then compressed PVS rows and compressed PHS rows.

use crate::{
    error::{CompileError, Result},
    vis::{Bits, VisData},
};

/// Offsets of cluster rows
#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct VisOffsets {
    /// PVS row offset
    pub pvs: i32,

    /// PHS row offset
    pub phs: i32,
}

unsafe impl bytemuck::Zeroable for VisOffsets {}
unsafe impl bytemuck::AnyBitPattern for VisOffsets {}
unsafe impl bytemuck::NoUninit for VisOffsets {}

/// Maximal length of a zero run
const MAX_ZERO_RUN: usize = 255;

/// Compress visibility row, zero bytes are run-length encoded
pub fn compress_vis(row: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(row.len());
    let mut index = 0;

    while index < row.len() {
        let byte = row[index];
        out.push(byte);
        index += 1;

        if byte != 0 {
            continue;
        }

        let mut run = 1;
        while index < row.len() && row[index] == 0 && run < MAX_ZERO_RUN {
            run += 1;
            index += 1;
        }
        out.push(run as u8);
    }

    out
}

/// Decompress visibility row of `row_bytes` bytes
pub fn decompress_vis(data: &[u8], row_bytes: usize) -> Result<Vec<u8>> {
    let mut row = Vec::with_capacity(row_bytes);
    let mut input = data.iter().copied();

    while row.len() < row_bytes {
        let byte = input.next().ok_or(CompileError::CorruptVis)?;
        if byte != 0 {
            row.push(byte);
            continue;
        }

        let run = input.next().ok_or(CompileError::CorruptVis)? as usize;
        if run == 0 || row.len() + run > row_bytes {
            return Err(CompileError::CorruptVis);
        }
        row.resize(row.len() + run, 0);
    }

    Ok(row)
}

/// Serialized visibility
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VisLump {
    /// Lump bytes
    pub bytes: Vec<u8>,
}

impl VisLump {
    /// Build lump, `max_bytes` is the lump size limit
    pub fn build(data: &VisData, max_bytes: usize) -> Result<Self> {
        let count = data.cluster_count;
        let header_size = size_of::<i32>() + count * size_of::<VisOffsets>();

        let mut offsets = vec![VisOffsets { pvs: 0, phs: 0 }; count];
        let mut rows = Vec::new();

        for (cluster, row) in data.pvs.iter().enumerate() {
            offsets[cluster].pvs = (header_size + rows.len()) as i32;
            rows.extend(compress_vis(row.bytes()));
        }
        for (cluster, row) in data.phs.iter().enumerate() {
            offsets[cluster].phs = (header_size + rows.len()) as i32;
            rows.extend(compress_vis(row.bytes()));
        }

        let size = header_size + rows.len();
        if size > max_bytes {
            return Err(CompileError::VisOverflow(max_bytes));
        }

        let mut bytes = Vec::with_capacity(size);
        bytes.extend_from_slice(&(count as i32).to_le_bytes());
        bytes.extend_from_slice(bytemuck::cast_slice::<VisOffsets, u8>(&offsets));
        bytes.extend(rows);

        log::info!(
            "vis data: {} bytes (compressed from {} bytes)",
            bytes.len(),
            count * data.row_bytes() * 2,
        );

        Ok(Self { bytes })
    }

    /// Decode lump back to uncompressed rows
    pub fn decode(&self) -> Result<VisData> {
        let count_bytes = self.bytes.get(0..size_of::<i32>()).ok_or(CompileError::CorruptVis)?;
        let count = bytemuck::pod_read_unaligned::<i32>(count_bytes);
        let count = usize::try_from(count).map_err(|_| CompileError::CorruptVis)?;

        let row_bytes = (count + 7) >> 3;
        let mut pvs = Vec::with_capacity(count);
        let mut phs = Vec::with_capacity(count);

        for cluster in 0..count {
            let start = size_of::<i32>() + cluster * size_of::<VisOffsets>();
            let offset_bytes = self
                .bytes
                .get(start..start + size_of::<VisOffsets>())
                .ok_or(CompileError::CorruptVis)?;
            let offsets = bytemuck::pod_read_unaligned::<VisOffsets>(offset_bytes);

            for (offset, rows) in [(offsets.pvs, &mut pvs), (offsets.phs, &mut phs)] {
                let data = usize::try_from(offset)
                    .ok()
                    .and_then(|offset| self.bytes.get(offset..))
                    .ok_or(CompileError::CorruptVis)?;
                rows.push(Bits::from_bytes(decompress_vis(data, row_bytes)?));
            }
        }

        Ok(VisData { cluster_count: count, pvs, phs })
    }
}


// lump.rs
