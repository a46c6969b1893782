//! Parses a baseline JFIF header: SOI, APP0, DQT, DHT, SOF0, SOS.
//!
//! Driven as an explicit state machine (`State`, `step`) rather than runtime
//! polymorphism: each step consumes one marker segment and returns the next
//! state, or an error that aborts parsing outright.
use crate::cursor::ByteCursor;
use crate::errors::DecodeErrors;
use crate::huffman::{HuffClass, HuffmanTables};

const SOI: u16 = 0xffd8;
const DQT: u16 = 0xffdb;
const DHT: u16 = 0xffc4;
const SOF0: u16 = 0xffc0;
const SOS: u16 = 0xffda;

/// Frame geometry recovered from SOF0: pixel dimensions and the horizontal
/// chroma subsampling factor (1 for 4:4:4, 2 for 4:2:2).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameInfo {
    pub width_px: u16,
    pub height_px: u16,
    pub horiz_chroma_subs_factor: u8,
}

impl FrameInfo {
    pub fn width_blocks(&self) -> u16 {
        self.width_px / 8
    }

    pub fn height_blocks(&self) -> u16 {
        self.height_px / 8
    }
}

/// Everything a scan needs: frame geometry, the luma quantization table (a
/// view into the input buffer), and the four bound Huffman tables.
pub struct ParsedHeader<'a> {
    pub frame: FrameInfo,
    pub qtable: &'a [u8; 64],
    pub tables: HuffmanTables<'a>,
    pub ecs_start: usize,
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum State {
    Entry,
    Soi,
    App0,
    Dqt,
    Dht,
    Sof0,
}

/// A marker this decoder recognizes as valid JPEG but does not support:
/// other SOF variants, arithmetic coding, restart intervals, hierarchical
/// progression. Distinct from a marker value that is not a defined JPEG
/// marker at all.
fn is_recognized_but_unsupported(marker: u16) -> bool {
    matches!(
        marker,
        0xffc1
            | 0xffc2
            | 0xffc3
            | 0xffc5
            | 0xffc6
            | 0xffc7
            | 0xffc9
            | 0xffca
            | 0xffcb
            | 0xffcc
            | 0xffdc
            | 0xffdd
            | 0xffde
            | 0xffdf
    )
}

fn bad_marker(marker: u16) -> DecodeErrors {
    if is_recognized_but_unsupported(marker) {
        warn!("rejecting recognized but unsupported marker 0x{:04x}", marker);
        DecodeErrors::UnsupportedMarker(marker)
    } else {
        DecodeErrors::CorruptedData(format!(
            "0x{:04x} is not a marker this parser expects here",
            marker
        ))
    }
}

fn read_marker(cursor: &mut ByteCursor) -> Result<u16, DecodeErrors> {
    cursor.read_marker().ok_or(DecodeErrors::PrematureEndOfBuffer)
}

fn skip_segment(cursor: &mut ByteCursor) -> Result<(), DecodeErrors> {
    let size = cursor
        .read_segment_size()
        .ok_or(DecodeErrors::PrematureEndOfBuffer)?;
    if size > 0 && !cursor.seek(usize::from(size)) {
        return Err(DecodeErrors::PrematureEndOfBuffer);
    }
    Ok(())
}

fn read_bytes<'a>(cursor: &mut ByteCursor<'a>, len: usize) -> Result<&'a [u8], DecodeErrors> {
    let slice = cursor
        .remaining()
        .get(..len)
        .ok_or(DecodeErrors::PrematureEndOfBuffer)?;
    cursor.seek(len);
    Ok(slice)
}

fn parse_dqt<'a>(cursor: &mut ByteCursor<'a>, qtable: &mut Option<&'a [u8; 64]>) -> Result<(), DecodeErrors> {
    let size = usize::from(
        cursor
            .read_segment_size()
            .ok_or(DecodeErrors::PrematureEndOfBuffer)?,
    );
    let mut consumed = 0usize;

    while consumed < size {
        let info = cursor.read_u8().ok_or(DecodeErrors::PrematureEndOfBuffer)?;
        let precision = 1 + usize::from((info >> 4) != 0);
        let id = info & 0x0f;
        let subtable_size = 1 + 64 * precision;

        if consumed + subtable_size > size {
            return Err(DecodeErrors::CorruptedData(
                "DQT sub-table overruns its segment".to_string(),
            ));
        }

        if id == 0 {
            if precision != 1 {
                return Err(DecodeErrors::CorruptedData(
                    "luma quantization table must be 8-bit precision".to_string(),
                ));
            }
            let bytes = read_bytes(cursor, 64)?;
            let array: &'a [u8; 64] = bytes.try_into().unwrap();
            *qtable = Some(array);
        } else if !cursor.seek(64 * precision) {
            return Err(DecodeErrors::PrematureEndOfBuffer);
        }

        consumed += subtable_size;
    }

    Ok(())
}

fn parse_dht<'a>(cursor: &mut ByteCursor<'a>, tables: &mut HuffmanTables<'a>) -> Result<(), DecodeErrors> {
    let size = usize::from(
        cursor
            .read_segment_size()
            .ok_or(DecodeErrors::PrematureEndOfBuffer)?,
    );
    let mut consumed = 0usize;

    while consumed < size {
        let info = cursor.read_u8().ok_or(DecodeErrors::PrematureEndOfBuffer)?;
        let class = if (info >> 4) == 0 { HuffClass::Dc } else { HuffClass::Ac };
        let id = usize::from(info & 0x0f);

        let mut histogram = [0u8; 16];
        for slot in histogram.iter_mut() {
            *slot = cursor.read_u8().ok_or(DecodeErrors::PrematureEndOfBuffer)?;
        }
        let total: usize = histogram.iter().map(|&n| usize::from(n)).sum();

        if 1 + 16 + total + consumed > size {
            return Err(DecodeErrors::CorruptedData(
                "DHT sub-table overruns its segment".to_string(),
            ));
        }

        let symbols = read_bytes(cursor, total)?;
        tables.bind(class, id, histogram, symbols)?;

        consumed += 1 + 16 + total;
    }

    Ok(())
}

fn parse_sof0(cursor: &mut ByteCursor) -> Result<FrameInfo, DecodeErrors> {
    let size = cursor
        .read_segment_size()
        .ok_or(DecodeErrors::PrematureEndOfBuffer)?;
    if size != 15 {
        return Err(DecodeErrors::UnsupportedParameter(format!(
            "SOF0 segment size {} is not the expected 15",
            size
        )));
    }

    let precision = cursor.read_u8().ok_or(DecodeErrors::PrematureEndOfBuffer)?;
    if precision != 8 {
        return Err(DecodeErrors::UnsupportedParameter(format!(
            "sample precision {} bits is not supported, only 8",
            precision
        )));
    }

    let height_px = cursor.read_u16().ok_or(DecodeErrors::PrematureEndOfBuffer)?;
    let width_px = cursor.read_u16().ok_or(DecodeErrors::PrematureEndOfBuffer)?;
    if width_px == 0 || height_px == 0 {
        return Err(DecodeErrors::UnsupportedParameter(
            "image width or height is zero".to_string(),
        ));
    }
    if width_px % 8 != 0 || height_px % 8 != 0 {
        return Err(DecodeErrors::UnsupportedParameter(
            "image dimensions must be multiples of 8".to_string(),
        ));
    }

    let num_components = cursor.read_u8().ok_or(DecodeErrors::PrematureEndOfBuffer)?;
    if num_components != 3 {
        return Err(DecodeErrors::UnsupportedParameter(format!(
            "{} components found, only 3-component (YCbCr) frames are supported",
            num_components
        )));
    }

    let mut horiz_chroma_subs_factor = 0u8;
    for component_idx in 0..3usize {
        let id = cursor.read_u8().ok_or(DecodeErrors::PrematureEndOfBuffer)?;
        let sampling = cursor.read_u8().ok_or(DecodeErrors::PrematureEndOfBuffer)?;
        let qt_id = cursor.read_u8().ok_or(DecodeErrors::PrematureEndOfBuffer)?;

        if !(1..=3).contains(&id) {
            return Err(DecodeErrors::UnsupportedParameter(format!(
                "component id {} is not one of 1, 2, 3",
                id
            )));
        }

        if component_idx == 0 {
            if qt_id != 0 {
                return Err(DecodeErrors::UnsupportedParameter(
                    "luma component must reference quantization table 0".to_string(),
                ));
            }
            horiz_chroma_subs_factor = match sampling {
                0x11 => 1,
                0x21 => 2,
                _ => {
                    return Err(DecodeErrors::UnsupportedParameter(format!(
                        "unsupported luma sampling factor byte 0x{:02x}",
                        sampling
                    )))
                }
            };
        } else if sampling != 0x11 {
            return Err(DecodeErrors::UnsupportedParameter(format!(
                "chroma component {} must use 1x1 sampling, found byte 0x{:02x}",
                component_idx + 1,
                sampling
            )));
        }
    }

    debug!(
        "SOF0 accepted: {}x{}, horizontal chroma subsampling factor {}",
        width_px, height_px, horiz_chroma_subs_factor
    );

    Ok(FrameInfo {
        width_px,
        height_px,
        horiz_chroma_subs_factor,
    })
}

fn parse_sos(cursor: &mut ByteCursor, qtable: &Option<&[u8; 64]>, tables: &HuffmanTables) -> Result<(), DecodeErrors> {
    let size = cursor
        .read_segment_size()
        .ok_or(DecodeErrors::PrematureEndOfBuffer)?;
    if size != 10 {
        return Err(DecodeErrors::CorruptedData(format!(
            "SOS segment size {} is not the expected 10",
            size
        )));
    }

    if qtable.is_none() || !tables.is_set() {
        return Err(DecodeErrors::CorruptedData(
            "SOS reached before all quantization/Huffman tables were bound".to_string(),
        ));
    }

    let ns = cursor.read_u8().ok_or(DecodeErrors::PrematureEndOfBuffer)?;
    if ns != 3 {
        return Err(DecodeErrors::CorruptedData(format!(
            "SOS declares {} components, expected 3",
            ns
        )));
    }

    for component_idx in 0..3usize {
        let _component_selector = cursor.read_u8().ok_or(DecodeErrors::PrematureEndOfBuffer)?;
        let table_ids = cursor.read_u8().ok_or(DecodeErrors::PrematureEndOfBuffer)?;

        if component_idx == 0 {
            let dc_id = table_ids >> 4;
            let ac_id = table_ids & 0x0f;
            if dc_id != 0 || ac_id != 0 {
                return Err(DecodeErrors::UnsupportedParameter(
                    "luma component must use Huffman table ids 0/0".to_string(),
                ));
            }
        }
    }

    let spectral_start = cursor.read_u8().ok_or(DecodeErrors::PrematureEndOfBuffer)?;
    let spectral_end = cursor.read_u8().ok_or(DecodeErrors::PrematureEndOfBuffer)?;
    let approximation = cursor.read_u8().ok_or(DecodeErrors::PrematureEndOfBuffer)?;

    if spectral_start != 0 || spectral_end != 63 || approximation != 0 {
        return Err(DecodeErrors::UnsupportedParameter(
            "only baseline spectral selection (0..63) with no successive approximation is supported".to_string(),
        ));
    }

    Ok(())
}

fn step<'a>(
    state: State,
    cursor: &mut ByteCursor<'a>,
    qtable: &mut Option<&'a [u8; 64]>,
    tables: &mut HuffmanTables<'a>,
    frame: &mut Option<FrameInfo>,
) -> Result<Option<State>, DecodeErrors> {
    match state {
        State::Entry => {
            let marker = read_marker(cursor)?;
            if marker != SOI {
                return Err(bad_marker(marker));
            }
            debug!("SOI accepted");
            Ok(Some(State::Soi))
        }
        State::Soi => {
            let marker = read_marker(cursor)?;
            if !(0xffe0..=0xffef).contains(&marker) {
                return Err(bad_marker(marker));
            }
            skip_segment(cursor)?;
            Ok(Some(State::App0))
        }
        State::App0 => {
            let marker = read_marker(cursor)?;
            match marker {
                DQT => {
                    parse_dqt(cursor, qtable)?;
                    Ok(Some(State::Dqt))
                }
                DHT => {
                    parse_dht(cursor, tables)?;
                    Ok(Some(State::Dht))
                }
                SOF0 => {
                    *frame = Some(parse_sof0(cursor)?);
                    Ok(Some(State::Sof0))
                }
                other => Err(bad_marker(other)),
            }
        }
        State::Dqt | State::Dht => {
            let marker = read_marker(cursor)?;
            match marker {
                DQT => {
                    parse_dqt(cursor, qtable)?;
                    Ok(Some(State::Dqt))
                }
                DHT => {
                    parse_dht(cursor, tables)?;
                    Ok(Some(State::Dht))
                }
                SOF0 => {
                    *frame = Some(parse_sof0(cursor)?);
                    Ok(Some(State::Sof0))
                }
                SOS => {
                    parse_sos(cursor, qtable, tables)?;
                    cursor.mark_start_of_ecs();
                    debug!("SOS accepted, entropy-coded segment begins here");
                    Ok(None)
                }
                other => Err(bad_marker(other)),
            }
        }
        State::Sof0 => {
            let marker = read_marker(cursor)?;
            match marker {
                DQT => {
                    parse_dqt(cursor, qtable)?;
                    Ok(Some(State::Dqt))
                }
                DHT => {
                    parse_dht(cursor, tables)?;
                    Ok(Some(State::Dht))
                }
                SOS => {
                    parse_sos(cursor, qtable, tables)?;
                    cursor.mark_start_of_ecs();
                    debug!("SOS accepted, entropy-coded segment begins here");
                    Ok(None)
                }
                other => Err(bad_marker(other)),
            }
        }
    }
}

/// Drives the header state machine to completion, returning the frame
/// geometry, luma quantization table, and Huffman tables needed to start
/// decoding the entropy-coded segment that immediately follows.
pub fn parse<'a>(cursor: &mut ByteCursor<'a>) -> Result<ParsedHeader<'a>, DecodeErrors> {
    let mut state = State::Entry;
    let mut qtable: Option<&'a [u8; 64]> = None;
    let mut tables = HuffmanTables::new();
    let mut frame: Option<FrameInfo> = None;

    loop {
        match step(state, cursor, &mut qtable, &mut tables, &mut frame)? {
            Some(next) => state = next,
            None => break,
        }
    }

    let ecs_start = cursor.tell();

    Ok(ParsedHeader {
        frame: frame.ok_or(DecodeErrors::CorruptedData(
            "header reached SOS without an SOF0 segment".to_string(),
        ))?,
        qtable: qtable.ok_or(DecodeErrors::CorruptedData(
            "header reached SOS without a luma quantization table".to_string(),
        ))?,
        tables,
        ecs_start,
    })
}

#[cfg(test)]
mod tests {
    use super::parse;
    use crate::cursor::ByteCursor;

    /// Assembles a minimal but complete baseline JFIF buffer: SOI, a tiny
    /// APP0, a single luma DQT, a DC/AC table pair for each of luma and
    /// chroma ids, an SOF0 for `width_px x height_px` at `sampling`, an SOS,
    /// and enough trailing zero ECS bytes plus an EOI to let the bit reader
    /// run off the end harmlessly.
    fn synthetic_jfif(width_px: u16, height_px: u16, sampling: u8) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&[0xff, 0xd8]); // SOI

        // APP0, minimal length
        buf.extend_from_slice(&[0xff, 0xe0, 0x00, 0x02]);

        // DQT: one 8-bit luma table, id 0, all ones
        buf.extend_from_slice(&[0xff, 0xdb]);
        buf.extend_from_slice(&(2 + 1 + 64u16).to_be_bytes());
        buf.push(0x00); // precision 0 (8-bit), id 0
        buf.extend_from_slice(&[1u8; 64]);

        // DHT: DC id0 (one symbol len1), AC id0 (one symbol len1),
        // DC id1 (one symbol len1), AC id1 (one symbol len1)
        let dht_payload_len = 4 * (1 + 16 + 1);
        buf.extend_from_slice(&[0xff, 0xc4]);
        buf.extend_from_slice(&(2 + dht_payload_len as u16).to_be_bytes());
        for &info in &[0x00u8, 0x10, 0x01, 0x11] {
            buf.push(info);
            let mut histogram = [0u8; 16];
            histogram[0] = 1;
            buf.extend_from_slice(&histogram);
            buf.push(0x00); // single symbol: DC/AC category 0
        }

        // SOF0
        buf.extend_from_slice(&[0xff, 0xc0]);
        buf.extend_from_slice(&15u16.to_be_bytes());
        buf.push(8); // precision
        buf.extend_from_slice(&height_px.to_be_bytes());
        buf.extend_from_slice(&width_px.to_be_bytes());
        buf.push(3); // components
        buf.extend_from_slice(&[1, sampling, 0]);
        buf.extend_from_slice(&[2, 0x11, 1]);
        buf.extend_from_slice(&[3, 0x11, 1]);

        // SOS
        buf.extend_from_slice(&[0xff, 0xda]);
        buf.extend_from_slice(&10u16.to_be_bytes());
        buf.push(3);
        buf.extend_from_slice(&[1, 0x00]);
        buf.extend_from_slice(&[2, 0x11]);
        buf.extend_from_slice(&[3, 0x11]);
        buf.extend_from_slice(&[0, 63, 0]);

        // ECS padding, then EOI
        buf.extend_from_slice(&[0u8; 64]);
        buf.extend_from_slice(&[0xff, 0xd9]);

        buf
    }

    #[test]
    fn accepts_a_minimal_444_header() {
        let buf = synthetic_jfif(160, 120, 0x11);
        let mut cursor = ByteCursor::new(&buf);
        let parsed = parse(&mut cursor).unwrap();
        assert_eq!(parsed.frame.width_px, 160);
        assert_eq!(parsed.frame.height_px, 120);
        assert_eq!(parsed.frame.horiz_chroma_subs_factor, 1);
        assert!(parsed.tables.is_set());
    }

    #[test]
    fn accepts_422_sampling_factor() {
        let buf = synthetic_jfif(160, 120, 0x21);
        let mut cursor = ByteCursor::new(&buf);
        let parsed = parse(&mut cursor).unwrap();
        assert_eq!(parsed.frame.horiz_chroma_subs_factor, 2);
    }

    #[test]
    fn rejects_progressive_sof_marker() {
        let mut buf = synthetic_jfif(160, 120, 0x11);
        // flip the SOF0 marker (at the known offset after SOI+APP0+DQT+DHT)
        // to SOF2 (progressive).
        let sof_marker_offset = buf
            .windows(2)
            .position(|w| w == [0xff, 0xc0])
            .expect("synthetic buffer must contain an SOF0 marker");
        buf[sof_marker_offset + 1] = 0xc2;

        let mut cursor = ByteCursor::new(&buf);
        let err = parse(&mut cursor).unwrap_err();
        assert!(matches!(err, crate::errors::DecodeErrors::UnsupportedMarker(0xffc2)));
    }

    #[test]
    fn rejects_header_ending_before_soi() {
        let buf = [0x00u8, 0x01];
        let mut cursor = ByteCursor::new(&buf);
        assert!(parse(&mut cursor).is_err());
    }

    #[test]
    fn header_parse_is_idempotent_across_reassignment() {
        let buf = synthetic_jfif(160, 120, 0x11);
        let mut cursor_a = ByteCursor::new(&buf);
        let parsed_a = parse(&mut cursor_a).unwrap();

        let mut cursor_b = ByteCursor::new(&buf);
        let parsed_b = parse(&mut cursor_b).unwrap();

        assert_eq!(parsed_a.frame, parsed_b.frame);
    }
}
