//! Minimal EXIF writer
//!
//! Writes a GPS IFD into the Exif APP1 segment of a JPEG byte stream.
//!
//! Without existing Exif data a little-endian TIFF structure is built from
//! scratch (offsets relative to the TIFF header):
//!
//! ```text
//!   0  "II" 0x002A, IFD0 offset = 8
//!   8  IFD0: 1 entry (GPSInfo -> 26), next = 0
//!  26  GPS IFD: 7 entries, next = 0
//! 116  latitude  3 x RATIONAL
//! 140  longitude 3 x RATIONAL
//! 164  altitude  1 x RATIONAL
//! ```
//!
//! When the camera already wrote Exif data, its TIFF block is kept byte for
//! byte so every existing offset stays valid. A copy of IFD0 with the GPSInfo
//! pointer replaced and a fresh GPS IFD are appended in the block's own byte
//! order, and the header is pointed at the new IFD0.

use contracts::Position;

use crate::error::GeotagError;

const SOI: [u8; 2] = [0xFF, 0xD8];
const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const SOS: u8 = 0xDA;
const EXIF_HEADER: &[u8; 6] = b"Exif\0\0";

/// Segment length field is a u16 that counts itself
const MAX_SEGMENT_PAYLOAD: usize = u16::MAX as usize - 2;

const TAG_GPS_INFO: u16 = 0x8825;
const TAG_GPS_VERSION: u16 = 0x0000;
const TAG_GPS_LATITUDE_REF: u16 = 0x0001;
const TAG_GPS_LATITUDE: u16 = 0x0002;
const TAG_GPS_LONGITUDE_REF: u16 = 0x0003;
const TAG_GPS_LONGITUDE: u16 = 0x0004;
const TAG_GPS_ALTITUDE_REF: u16 = 0x0005;
const TAG_GPS_ALTITUDE: u16 = 0x0006;

const TYPE_BYTE: u16 = 1;
const TYPE_ASCII: u16 = 2;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;

const IFD_ENTRY_LEN: usize = 12;
const IFD0_OFFSET: u32 = 8;
const GPS_ENTRIES: u16 = 7;
/// GPS IFD (entries, next pointer) plus its three rational arrays
const GPS_BLOCK_LEN: usize = 2 + IFD_ENTRY_LEN * GPS_ENTRIES as usize + 4 + 24 + 24 + 8;

/// Arc-second fractions kept in the seconds rational
const SECONDS_DENOMINATOR: u32 = 10_000;
/// Millimetre resolution for altitude
const ALTITUDE_DENOMINATOR: u32 = 1_000;

/// Degrees as (degrees, minutes, seconds) rationals
fn dms_rationals(value: f64) -> [(u32, u32); 3] {
    let scale = 3600 * u64::from(SECONDS_DENOMINATOR);
    let total = (value.abs() * scale as f64).round() as u64;
    let degrees = total / scale;
    let remainder = total % scale;
    let minute = 60 * u64::from(SECONDS_DENOMINATOR);
    let minutes = remainder / minute;
    let seconds = remainder % minute;
    [
        (degrees as u32, 1),
        (minutes as u32, 1),
        (seconds as u32, SECONDS_DENOMINATOR),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn from_header(tiff: &[u8]) -> Option<Self> {
        match tiff.get(..2)? {
            b"II" => Some(Self::Little),
            b"MM" => Some(Self::Big),
            _ => None,
        }
    }

    fn read_u16(self, buf: &[u8], at: usize) -> Option<u16> {
        let bytes: [u8; 2] = buf.get(at..at + 2)?.try_into().ok()?;
        Some(match self {
            Self::Little => u16::from_le_bytes(bytes),
            Self::Big => u16::from_be_bytes(bytes),
        })
    }

    fn read_u32(self, buf: &[u8], at: usize) -> Option<u32> {
        let bytes: [u8; 4] = buf.get(at..at + 4)?.try_into().ok()?;
        Some(match self {
            Self::Little => u32::from_le_bytes(bytes),
            Self::Big => u32::from_be_bytes(bytes),
        })
    }

    fn u16_bytes(self, value: u16) -> [u8; 2] {
        match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        }
    }

    fn u32_bytes(self, value: u32) -> [u8; 4] {
        match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        }
    }
}

struct TiffWriter {
    buf: Vec<u8>,
    order: ByteOrder,
}

impl TiffWriter {
    fn offset(&self) -> u32 {
        self.buf.len() as u32
    }

    fn u16(&mut self, value: u16) {
        let bytes = self.order.u16_bytes(value);
        self.buf.extend_from_slice(&bytes);
    }

    fn u32(&mut self, value: u32) {
        let bytes = self.order.u32_bytes(value);
        self.buf.extend_from_slice(&bytes);
    }

    /// IFD entry whose value fits in the 4-byte slot (left-justified)
    fn inline_entry(&mut self, tag: u16, kind: u16, count: u32, value: [u8; 4]) {
        self.u16(tag);
        self.u16(kind);
        self.u32(count);
        self.buf.extend_from_slice(&value);
    }

    /// IFD entry whose value lives at `offset`
    fn offset_entry(&mut self, tag: u16, kind: u16, count: u32, offset: u32) {
        let offset = self.order.u32_bytes(offset);
        self.inline_entry(tag, kind, count, offset);
    }

    fn gps_info_entry(&self, gps_offset: u32) -> [u8; IFD_ENTRY_LEN] {
        let mut entry = TiffWriter {
            buf: Vec::with_capacity(IFD_ENTRY_LEN),
            order: self.order,
        };
        entry.offset_entry(TAG_GPS_INFO, TYPE_LONG, 1, gps_offset);
        let mut out = [0u8; IFD_ENTRY_LEN];
        out.copy_from_slice(&entry.buf);
        out
    }

    fn rationals(&mut self, values: &[(u32, u32)]) {
        for &(numerator, denominator) in values {
            self.u32(numerator);
            self.u32(denominator);
        }
    }

    /// GPS IFD at the current end of the buffer, values right after it
    fn gps_ifd(&mut self, position: &Position) {
        let lat_ref = if position.latitude_deg < 0.0 { b'S' } else { b'N' };
        let lon_ref = if position.longitude_deg < 0.0 { b'W' } else { b'E' };
        let alt_ref = u8::from(position.relative_altitude_m < 0.0);
        let altitude =
            (position.relative_altitude_m.abs() * f64::from(ALTITUDE_DENOMINATOR)).round() as u32;

        let latitude_offset = self.offset() + 2 + IFD_ENTRY_LEN as u32 * u32::from(GPS_ENTRIES) + 4;
        let longitude_offset = latitude_offset + 24;
        let altitude_offset = longitude_offset + 24;

        // tags ascending
        self.u16(GPS_ENTRIES);
        self.inline_entry(TAG_GPS_VERSION, TYPE_BYTE, 4, [2, 3, 0, 0]);
        self.inline_entry(TAG_GPS_LATITUDE_REF, TYPE_ASCII, 2, [lat_ref, 0, 0, 0]);
        self.offset_entry(TAG_GPS_LATITUDE, TYPE_RATIONAL, 3, latitude_offset);
        self.inline_entry(TAG_GPS_LONGITUDE_REF, TYPE_ASCII, 2, [lon_ref, 0, 0, 0]);
        self.offset_entry(TAG_GPS_LONGITUDE, TYPE_RATIONAL, 3, longitude_offset);
        self.inline_entry(TAG_GPS_ALTITUDE_REF, TYPE_BYTE, 1, [alt_ref, 0, 0, 0]);
        self.offset_entry(TAG_GPS_ALTITUDE, TYPE_RATIONAL, 1, altitude_offset);
        self.u32(0);

        debug_assert_eq!(self.offset(), latitude_offset);
        self.rationals(&dms_rationals(position.latitude_deg));
        self.rationals(&dms_rationals(position.longitude_deg));
        self.rationals(&[(altitude, ALTITUDE_DENOMINATOR)]);
    }
}

fn check_position(position: &Position) -> Result<(), GeotagError> {
    if position.is_finite() {
        Ok(())
    } else {
        Err(GeotagError::InvalidPosition)
    }
}

/// TIFF block holding only IFD0 -> GPS IFD
fn fresh_tiff(position: &Position) -> Vec<u8> {
    let mut tiff = TiffWriter {
        buf: Vec::with_capacity(IFD0_OFFSET as usize + 18 + GPS_BLOCK_LEN),
        order: ByteOrder::Little,
    };

    tiff.buf.extend_from_slice(b"II");
    tiff.u16(0x002A);
    tiff.u32(IFD0_OFFSET);

    let gps_offset = IFD0_OFFSET + 2 + IFD_ENTRY_LEN as u32 + 4;
    tiff.u16(1);
    tiff.offset_entry(TAG_GPS_INFO, TYPE_LONG, 1, gps_offset);
    tiff.u32(0);

    tiff.gps_ifd(position);
    tiff.buf
}

/// Existing TIFF block with its GPS data replaced, every other entry kept
fn merged_tiff(existing: &[u8], position: &Position) -> Result<Vec<u8>, GeotagError> {
    let malformed = GeotagError::MalformedExif;
    let order = ByteOrder::from_header(existing).ok_or(malformed("unknown byte order"))?;
    if order.read_u16(existing, 2) != Some(0x002A) {
        return Err(malformed("bad TIFF magic"));
    }
    let ifd0 = order
        .read_u32(existing, 4)
        .ok_or(malformed("missing IFD0 offset"))? as usize;
    let count = usize::from(order.read_u16(existing, ifd0).ok_or(malformed("IFD0 out of bounds"))?);
    let entries_start = ifd0 + 2;
    let entries_end = entries_start + count * IFD_ENTRY_LEN;
    let next_ifd = order
        .read_u32(existing, entries_end)
        .ok_or(malformed("IFD0 out of bounds"))?;

    let mut entries: Vec<(u16, [u8; IFD_ENTRY_LEN])> = existing[entries_start..entries_end]
        .chunks_exact(IFD_ENTRY_LEN)
        .filter_map(|raw| {
            let tag = order.read_u16(raw, 0)?;
            let mut entry = [0u8; IFD_ENTRY_LEN];
            entry.copy_from_slice(raw);
            Some((tag, entry))
        })
        .filter(|(tag, _)| *tag != TAG_GPS_INFO)
        .collect();

    let mut tiff = TiffWriter {
        buf: Vec::with_capacity(existing.len() + 2 + (entries.len() + 1) * IFD_ENTRY_LEN + 6 + GPS_BLOCK_LEN),
        order,
    };
    tiff.buf.extend_from_slice(existing);
    // IFDs start on a word boundary
    if tiff.buf.len() % 2 == 1 {
        tiff.buf.push(0);
    }

    let new_ifd0 = tiff.offset();
    let gps_offset = new_ifd0 + 2 + ((entries.len() + 1) * IFD_ENTRY_LEN) as u32 + 4;
    entries.push((TAG_GPS_INFO, tiff.gps_info_entry(gps_offset)));
    entries.sort_by_key(|(tag, _)| *tag);

    tiff.u16(entries.len() as u16);
    for (_, entry) in &entries {
        tiff.buf.extend_from_slice(entry);
    }
    tiff.u32(next_ifd);
    debug_assert_eq!(tiff.offset(), gps_offset);
    tiff.gps_ifd(position);

    let header = order.u32_bytes(new_ifd0);
    tiff.buf[4..8].copy_from_slice(&header);
    Ok(tiff.buf)
}

fn app1_segment(tiff: &[u8]) -> Result<Vec<u8>, GeotagError> {
    let payload_len = EXIF_HEADER.len() + tiff.len();
    if payload_len > MAX_SEGMENT_PAYLOAD {
        return Err(GeotagError::ExifTooLarge { len: payload_len });
    }
    let mut segment = Vec::with_capacity(4 + payload_len);
    segment.extend_from_slice(&[0xFF, APP1]);
    segment.extend_from_slice(&((payload_len + 2) as u16).to_be_bytes());
    segment.extend_from_slice(EXIF_HEADER);
    segment.extend_from_slice(tiff);
    Ok(segment)
}

/// Build a complete APP1 segment (marker included) holding only GPS data
pub fn build_gps_segment(position: &Position) -> Result<Vec<u8>, GeotagError> {
    check_position(position)?;
    app1_segment(&fresh_tiff(position))
}

/// One marker segment of a JPEG header
struct Segment {
    start: usize,
    marker: u8,
    payload: std::ops::Range<usize>,
}

/// Header segments up to the first scan, plus where the scan starts
fn header_segments(jpeg: &[u8]) -> Result<(Vec<Segment>, usize), GeotagError> {
    if jpeg.len() < 4 || jpeg[..2] != SOI {
        return Err(GeotagError::NotJpeg);
    }

    let mut segments = Vec::new();
    let mut pos = 2;
    while pos < jpeg.len() {
        if jpeg[pos] != 0xFF {
            return Err(GeotagError::Truncated { offset: pos });
        }
        // Fill bytes
        let mut marker_pos = pos + 1;
        while marker_pos < jpeg.len() && jpeg[marker_pos] == 0xFF {
            marker_pos += 1;
        }
        let Some(&marker) = jpeg.get(marker_pos) else {
            return Err(GeotagError::Truncated { offset: pos });
        };

        if marker == SOS || (0xD0..=0xD9).contains(&marker) || marker == 0x01 {
            // Entropy-coded data (or a bare marker) follows
            return Ok((segments, pos));
        }

        let len_pos = marker_pos + 1;
        let Some(len_bytes) = jpeg.get(len_pos..len_pos + 2) else {
            return Err(GeotagError::Truncated { offset: pos });
        };
        let length = usize::from(u16::from_be_bytes([len_bytes[0], len_bytes[1]]));
        let end = len_pos + length;
        if length < 2 || end > jpeg.len() {
            return Err(GeotagError::Truncated { offset: pos });
        }

        segments.push(Segment {
            start: pos,
            marker,
            payload: len_pos + 2..end,
        });
        pos = end;
    }
    Ok((segments, jpeg.len()))
}

fn is_exif(jpeg: &[u8], segment: &Segment) -> bool {
    segment.marker == APP1 && jpeg[segment.payload.clone()].starts_with(EXIF_HEADER)
}

/// Insert `app1` into a JPEG, dropping any existing EXIF APP1
///
/// The new segment goes right after SOI, or after a leading JFIF APP0.
/// Everything from SOS onwards is copied untouched.
pub fn insert_app1(jpeg: &[u8], app1: &[u8]) -> Result<Vec<u8>, GeotagError> {
    let (segments, scan_start) = header_segments(jpeg)?;

    let mut out = Vec::with_capacity(jpeg.len() + app1.len());
    out.extend_from_slice(&SOI);
    let mut inserted = false;
    for segment in &segments {
        if !inserted && segment.marker != APP0 {
            out.extend_from_slice(app1);
            inserted = true;
        }
        if !is_exif(jpeg, segment) {
            out.extend_from_slice(&jpeg[segment.start..segment.payload.end]);
        }
    }
    if !inserted {
        out.extend_from_slice(app1);
    }
    out.extend_from_slice(&jpeg[scan_start..]);
    Ok(out)
}

/// TIFF block of the first Exif APP1 segment, if any
fn existing_tiff(jpeg: &[u8]) -> Result<Option<&[u8]>, GeotagError> {
    let (segments, _) = header_segments(jpeg)?;
    Ok(segments
        .iter()
        .find(|segment| is_exif(jpeg, segment))
        .map(|segment| &jpeg[segment.payload.start + EXIF_HEADER.len()..segment.payload.end]))
}

/// Return `jpeg` with GPS metadata for `position`
///
/// Existing Exif metadata (camera make, capture time, orientation) is kept;
/// only the GPS IFD is replaced.
pub fn embed_gps(jpeg: &[u8], position: &Position) -> Result<Vec<u8>, GeotagError> {
    check_position(position)?;
    let tiff = match existing_tiff(jpeg)? {
        Some(existing) => merged_tiff(existing, position)?,
        None => fresh_tiff(position),
    };
    insert_app1(jpeg, &app1_segment(&tiff)?)
}
