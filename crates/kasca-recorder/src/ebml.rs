// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

// Minimal EBML walker for the WebM segment duration
//
// Streamed WebM files are written before their length is known, so the
// Segment is usually of unknown size and the Info element carries a
// placeholder Duration. Only the path EBML header -> Segment -> Info ->
// {TimecodeScale, Duration} is understood; everything else is skipped by
// its size prefix. Patching rewrites the float payload in place and never
// changes the length of any element.

use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::FinalizeError;

const EBML_HEADER: u32 = 0x1A45_DFA3;
const SEGMENT: u32 = 0x1853_8067;
const INFO: u32 = 0x1549_A966;
const CLUSTER: u32 = 0x1F43_B675;
const TIMECODE_SCALE: u32 = 0x2A_D7B1;
const DURATION: u32 = 0x4489;

const DEFAULT_TIMECODE_SCALE_NS: u64 = 1_000_000;

/// Segment info sits before the first cluster; this bounds the read.
const HEADER_SCAN_LIMIT: u64 = 1 << 20;

/// Location and contents of the Duration element payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationField {
    /// Byte offset of the float payload from the start of the file.
    pub offset: usize,
    /// Payload width in bytes, 4 or 8.
    pub width: usize,
    /// Nanoseconds per tick.
    pub timecode_scale: u64,
    /// Current value, in ticks.
    pub ticks: f64,
}

impl DurationField {
    pub fn duration(&self) -> Duration {
        let nanos = self.ticks * self.timecode_scale as f64;
        if nanos.is_finite() && nanos > 0.0 {
            Duration::from_nanos(nanos as u64)
        } else {
            Duration::ZERO
        }
    }

    pub fn encode(&self, duration: Duration) -> Vec<u8> {
        let ticks = duration.as_nanos() as f64 / self.timecode_scale as f64;
        if self.width == 4 {
            (ticks as f32).to_be_bytes().to_vec()
        } else {
            ticks.to_be_bytes().to_vec()
        }
    }
}

struct ElementHeader {
    id: u32,
    /// `None` for the reserved unknown-size value.
    size: Option<u64>,
    data_start: usize,
}

fn malformed(offset: usize, reason: &'static str) -> FinalizeError {
    FinalizeError::Malformed { offset, reason }
}

/// Element ids keep their length marker bits.
fn read_id(buf: &[u8], pos: usize) -> Result<(u32, usize), FinalizeError> {
    let first = *buf.get(pos).ok_or(malformed(pos, "truncated element id"))?;
    let len = first.leading_zeros() as usize + 1;
    if len > 4 {
        return Err(malformed(pos, "element id longer than 4 bytes"));
    }
    let bytes = buf
        .get(pos..pos + len)
        .ok_or(malformed(pos, "truncated element id"))?;
    let id = bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
    Ok((id, len))
}

fn read_size(buf: &[u8], pos: usize) -> Result<(Option<u64>, usize), FinalizeError> {
    let first = *buf.get(pos).ok_or(malformed(pos, "truncated element size"))?;
    let len = first.leading_zeros() as usize + 1;
    if len > 8 {
        return Err(malformed(pos, "invalid element size prefix"));
    }
    let bytes = buf
        .get(pos..pos + len)
        .ok_or(malformed(pos, "truncated element size"))?;
    let mut value = u64::from(first) & (0xFFu64 >> len);
    for b in &bytes[1..] {
        value = (value << 8) | u64::from(*b);
    }
    let unknown = value == (1u64 << (7 * len)) - 1;
    Ok((if unknown { None } else { Some(value) }, len))
}

fn read_header(buf: &[u8], pos: usize) -> Result<ElementHeader, FinalizeError> {
    let (id, id_len) = read_id(buf, pos)?;
    let (size, size_len) = read_size(buf, pos + id_len)?;
    Ok(ElementHeader {
        id,
        size,
        data_start: pos + id_len + size_len,
    })
}

fn end_of(start: usize, size: u64) -> Result<usize, FinalizeError> {
    usize::try_from(size)
        .ok()
        .and_then(|size| start.checked_add(size))
        .ok_or(malformed(start, "element size overflows"))
}

/// Find the Duration element of the first segment in `buf`.
pub fn locate_duration(buf: &[u8]) -> Result<DurationField, FinalizeError> {
    let header = read_header(buf, 0).map_err(|_| FinalizeError::NotEbml)?;
    if header.id != EBML_HEADER {
        return Err(FinalizeError::NotEbml);
    }
    let header_size = header
        .size
        .ok_or(malformed(0, "EBML header has unknown size"))?;

    let segment_pos = end_of(header.data_start, header_size)?;
    let segment = read_header(buf, segment_pos)?;
    if segment.id != SEGMENT {
        return Err(malformed(segment_pos, "expected a Segment element"));
    }
    let segment_end = match segment.size {
        Some(size) => end_of(segment.data_start, size)?.min(buf.len()),
        None => buf.len(),
    };

    let mut pos = segment.data_start;
    while pos < segment_end {
        let child = read_header(buf, pos)?;
        match child.id {
            CLUSTER => break,
            INFO => return scan_info(buf, &child),
            _ => {}
        }
        let Some(size) = child.size else {
            break;
        };
        pos = end_of(child.data_start, size)?;
    }

    Err(FinalizeError::DurationFieldMissing)
}

fn scan_info(buf: &[u8], info: &ElementHeader) -> Result<DurationField, FinalizeError> {
    let size = info
        .size
        .ok_or(malformed(info.data_start, "segment info has unknown size"))?;
    let end = end_of(info.data_start, size)?;
    if end > buf.len() {
        return Err(malformed(info.data_start, "truncated segment info"));
    }

    let mut timecode_scale = DEFAULT_TIMECODE_SCALE_NS;
    let mut duration: Option<(usize, usize)> = None;

    let mut pos = info.data_start;
    while pos < end {
        let child = read_header(buf, pos)?;
        let child_size = child
            .size
            .ok_or(malformed(pos, "info child has unknown size"))?;
        let child_end = end_of(child.data_start, child_size)?;
        if child_end > end {
            return Err(malformed(pos, "info child overruns segment info"));
        }

        match child.id {
            TIMECODE_SCALE if child_size <= 8 => {
                let scale = buf[child.data_start..child_end]
                    .iter()
                    .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
                if scale > 0 {
                    timecode_scale = scale;
                }
            }
            DURATION => duration = Some((child.data_start, child_end - child.data_start)),
            _ => {}
        }
        pos = child_end;
    }

    let (offset, width) = duration.ok_or(FinalizeError::DurationFieldMissing)?;
    let payload = &buf[offset..offset + width];
    let ticks = match width {
        4 => f64::from(f32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])),
        8 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(payload);
            f64::from_be_bytes(raw)
        }
        other => return Err(FinalizeError::UnsupportedWidth(other)),
    };

    Ok(DurationField {
        offset,
        width,
        timecode_scale,
        ticks,
    })
}

/// Overwrite the Duration payload in `buf`.
pub fn patch_duration(buf: &mut [u8], duration: Duration) -> Result<DurationField, FinalizeError> {
    let field = locate_duration(buf)?;
    let bytes = field.encode(duration);
    buf[field.offset..field.offset + field.width].copy_from_slice(&bytes);
    Ok(field)
}

async fn read_prefix(path: &Path) -> Result<Vec<u8>, FinalizeError> {
    let file = tokio::fs::File::open(path).await?;
    let mut buf = Vec::new();
    file.take(HEADER_SCAN_LIMIT).read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Patch the Duration of the WebM file at `path` in place.
pub async fn patch_file(path: &Path, duration: Duration) -> Result<DurationField, FinalizeError> {
    let prefix = read_prefix(path).await?;
    let field = locate_duration(&prefix)?;
    let bytes = field.encode(duration);

    let mut file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
    file.seek(SeekFrom::Start(field.offset as u64)).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    Ok(field)
}

/// Duration stored in the WebM file at `path`, `None` when the file has no
/// usable Duration element.
pub async fn read_duration(path: &Path) -> Result<Option<Duration>, FinalizeError> {
    let prefix = read_prefix(path).await?;
    match locate_duration(&prefix) {
        Ok(field) if field.ticks > 0.0 => Ok(Some(field.duration())),
        Ok(_) | Err(FinalizeError::DurationFieldMissing) => Ok(None),
        Err(err) => Err(err),
    }
}
