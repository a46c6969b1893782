//! Canonical Huffman tables and the decoder built on top of them.
//!
//! Four tables are held by the header parser: DC/AC, each with ids 0 and 1.
//! Symbol decode walks the bitstream one bit at a time, matching the
//! accumulated code against the canonical codes at each length — the same
//! algorithm JPEG's own Annex C describes, not a fast lookup table.
use crate::bitstream::{BitReader, BitResult};
use crate::errors::DecodeErrors;

/// DC tables carry at most 12 symbols (coefficient magnitude categories 0..11).
pub const MAX_DC_SYMBOLS: usize = 12;
/// AC tables carry at most 162 symbols (256 run/length combinations minus
/// reserved codes, per the JPEG standard).
pub const MAX_AC_SYMBOLS: usize = 162;

/// A canonical Huffman table bound to a length histogram and symbol list
/// that live in the caller's input buffer.
pub struct HuffmanTable<'a, const MAX: usize> {
    histogram: [u8; 16],
    symbols: &'a [u8],
    codes: [u16; MAX],
    count: usize,
    is_set: bool,
}

impl<'a, const MAX: usize> HuffmanTable<'a, MAX> {
    pub fn empty() -> HuffmanTable<'a, MAX> {
        HuffmanTable {
            histogram: [0; 16],
            symbols: &[],
            codes: [0; MAX],
            count: 0,
            is_set: false,
        }
    }

    pub fn is_set(&self) -> bool {
        self.is_set
    }

    /// Binds a length histogram and matching symbol table, generating
    /// canonical codes for each symbol.
    ///
    /// `symbols` must have exactly `sum(histogram)` entries; the caller
    /// (DHT parsing) is responsible for slicing the right span out of the
    /// input buffer.
    pub fn bind(&mut self, histogram: [u8; 16], symbols: &'a [u8]) -> Result<(), DecodeErrors> {
        for (i, &count) in histogram.iter().enumerate() {
            if usize::from(count) > (1usize << (i + 1)) {
                return Err(DecodeErrors::CorruptedData(format!(
                    "Huffman length histogram entry for length {} exceeds 2^{}",
                    i + 1,
                    i + 1
                )));
            }
        }

        let total: usize = histogram.iter().map(|&n| usize::from(n)).sum();
        if total == 0 || total > MAX {
            return Err(DecodeErrors::CorruptedData(format!(
                "Huffman table symbol count {} is zero or exceeds the maximum of {}",
                total, MAX
            )));
        }
        if symbols.len() != total {
            return Err(DecodeErrors::CorruptedData(
                "Huffman symbol table length does not match its histogram".to_string(),
            ));
        }

        let mut code: u32 = 0;
        let mut idx = 0usize;
        for &count_at_length in &histogram {
            code <<= 1;
            for _ in 0..count_at_length {
                self.codes[idx] = code as u16;
                code += 1;
                idx += 1;
            }
        }

        self.histogram = histogram;
        self.symbols = symbols;
        self.count = total;
        self.is_set = true;
        Ok(())
    }

    /// Walks the bitstream bit by bit, matching the accumulated code against
    /// the canonical codes at each length, and returns the matching symbol.
    pub fn decode_symbol(&self, reader: &mut BitReader) -> Result<u8, DecodeErrors> {
        let mut code: u32 = 0;
        let mut base = 0usize;
        for length in 0..16usize {
            let bit = match reader.read_bit() {
                BitResult::Bit(b) => b,
                BitResult::EcsError => return Err(DecodeErrors::EcsReadError),
            };
            code = (code << 1) | u32::from(bit);

            let count_at_length = usize::from(self.histogram[length]);
            for i in 0..count_at_length {
                if u32::from(self.codes[base + i]) == code {
                    return Ok(self.symbols[base + i]);
                }
            }
            base += count_at_length;
        }
        Err(DecodeErrors::CorruptedData(
            "no Huffman code matched within 16 bits".to_string(),
        ))
    }
}

/// The DC/AC table pair for one id (0 or 1).
#[derive(Default)]
struct TablePair<'a> {
    dc: Option<HuffmanTable<'a, MAX_DC_SYMBOLS>>,
    ac: Option<HuffmanTable<'a, MAX_AC_SYMBOLS>>,
}

/// Which Huffman table class a DHT sub-table belongs to.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum HuffClass {
    Dc,
    Ac,
}

/// The four canonical Huffman tables required before a scan can begin:
/// DC/AC, each with ids 0 (luma) and 1 (chroma).
pub struct HuffmanTables<'a> {
    dc: [HuffmanTable<'a, MAX_DC_SYMBOLS>; 2],
    ac: [HuffmanTable<'a, MAX_AC_SYMBOLS>; 2],
}

impl<'a> HuffmanTables<'a> {
    pub fn new() -> HuffmanTables<'a> {
        HuffmanTables {
            dc: [HuffmanTable::empty(), HuffmanTable::empty()],
            ac: [HuffmanTable::empty(), HuffmanTable::empty()],
        }
    }

    /// True once all four tables have been bound by DHT parsing.
    pub fn is_set(&self) -> bool {
        self.dc[0].is_set() && self.dc[1].is_set() && self.ac[0].is_set() && self.ac[1].is_set()
    }

    pub fn bind(
        &mut self,
        class: HuffClass,
        id: usize,
        histogram: [u8; 16],
        symbols: &'a [u8],
    ) -> Result<(), DecodeErrors> {
        if id > 1 {
            return Err(DecodeErrors::CorruptedData(format!(
                "Huffman table id {} is not one of 0 or 1",
                id
            )));
        }
        match class {
            HuffClass::Dc => self.dc[id].bind(histogram, symbols),
            HuffClass::Ac => self.ac[id].bind(histogram, symbols),
        }
    }
}

impl<'a> Default for HuffmanTables<'a> {
    fn default() -> Self {
        Self::new()
    }
}

/// Recovers the signed value of a DCT coefficient from its raw bit pattern
/// and bit length.
///
/// Uses the `length`-guarded form of the sign-recovery check
/// (`length > 0 && raw >> (length - 1) == 0`), not a `raw`-guarded form: the
/// latter shifts by a negative amount when `length == 0` in the source this
/// crate is ported from, and is undefined behavior there.
fn recover_coefficient(length: u32, raw: u32) -> i32 {
    if length == 0 {
        return 0;
    }
    if (raw >> (length - 1)) & 1 == 0 {
        raw as i32 - ((1i32 << length) - 1)
    } else {
        raw as i32
    }
}

/// Decodes one 8x8 block's worth of coefficients (DC at index 0, AC run-length
/// coded at indices 1..64) in zig-zag scan order. Does not apply DC
/// prediction; callers combine the returned differential with their own
/// running predictor.
pub fn decode_block(
    reader: &mut BitReader,
    dc_table: &HuffmanTable<MAX_DC_SYMBOLS>,
    ac_table: &HuffmanTable<MAX_AC_SYMBOLS>,
) -> Result<[i32; 64], DecodeErrors> {
    let mut block = [0i32; 64];

    let dc_symbol = dc_table.decode_symbol(reader)?;
    if dc_symbol > 11 {
        return Err(DecodeErrors::CorruptedData(format!(
            "DC coefficient length {} exceeds the maximum of 11",
            dc_symbol
        )));
    }
    let dc_len = u32::from(dc_symbol);
    let dc_raw = reader.read_bits(dc_len)?;
    block[0] = recover_coefficient(dc_len, dc_raw);

    let mut idx = 1usize;
    while idx < 64 {
        let symbol = ac_table.decode_symbol(reader)?;
        if symbol == 0x00 {
            break;
        }
        if symbol == 0xf0 {
            if idx + 16 >= 64 {
                return Err(DecodeErrors::CorruptedData(
                    "AC run length overflows the block".to_string(),
                ));
            }
            idx += 16;
            continue;
        }

        let run = usize::from(symbol >> 4);
        let len = u32::from(symbol & 0x0f);
        if idx + run >= 64 {
            return Err(DecodeErrors::CorruptedData(
                "AC run length overflows the block".to_string(),
            ));
        }
        if len > 10 {
            return Err(DecodeErrors::CorruptedData(format!(
                "AC coefficient length {} exceeds the maximum of 10",
                len
            )));
        }
        idx += run;
        let raw = reader.read_bits(len)?;
        block[idx] = recover_coefficient(len, raw);
        idx += 1;
    }

    Ok(block)
}

/// Sequential decoder state for one scan: DC predictor and block counters
/// used to randomly seek to any luma block under interleaved MCU order.
pub struct HuffmanDecoder {
    previous_luma_dc: i32,
    block_idx: u64,
    luma_block_idx: u64,
}

impl HuffmanDecoder {
    pub fn new() -> HuffmanDecoder {
        HuffmanDecoder {
            previous_luma_dc: 0,
            block_idx: 0,
            luma_block_idx: 0,
        }
    }

    /// Resets predictor and counters to the start of the scan.
    pub fn reset(&mut self) {
        self.previous_luma_dc = 0;
        self.block_idx = 0;
        self.luma_block_idx = 0;
    }

    /// Decodes (or skips past, for chroma) blocks in interleaved MCU order
    /// until the luma block at `target_luma_block_idx` has been produced,
    /// returning its dequantized-ready coefficients with the DC predictor
    /// already applied.
    ///
    /// Seeking backward restarts the bit reader from the beginning of the
    /// ECS and resets all decoder state, since a later luma block's DC value
    /// depends on every earlier luma block's differential.
    pub fn decode_luma_block(
        &mut self,
        reader: &mut BitReader,
        tables: &HuffmanTables,
        horiz_chroma_subs_factor: u8,
        target_luma_block_idx: u64,
    ) -> Result<[i32; 64], DecodeErrors> {
        if target_luma_block_idx < self.luma_block_idx {
            self.reset();
            reader.restart_ecs();
        }

        let h = u64::from(horiz_chroma_subs_factor);
        let group_size = h + 2;

        let mut target_block = None;
        while self.luma_block_idx <= target_luma_block_idx {
            let is_luma = self.block_idx % group_size < h;

            if is_luma {
                let mut block = decode_block(reader, &tables.dc[0], &tables.ac[0])?;
                self.previous_luma_dc += block[0];
                block[0] = self.previous_luma_dc;

                if self.luma_block_idx == target_luma_block_idx {
                    target_block = Some(block);
                }
                self.luma_block_idx += 1;
            } else {
                // chroma block: decode only to advance the bit reader past
                // its bits; its DC predictor is not tracked since its
                // output is never used.
                decode_block(reader, &tables.dc[1], &tables.ac[1])?;
            }

            self.block_idx += 1;
        }

        target_block.ok_or(DecodeErrors::CorruptedData(
            "luma block seek terminated without producing the target block".to_string(),
        ))
    }
}

impl Default for HuffmanDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One length-2 code (0b0, symbol 0) and one length-2 code (0b1... wait
    /// canonical codes must be consistent with histogram), built directly
    /// from a tiny histogram: two symbols of length 2 ("00" -> 0xA, "01" ->
    /// 0xB).
    fn two_symbol_dc_table<'a>(symbols: &'a [u8]) -> HuffmanTable<'a, MAX_DC_SYMBOLS> {
        let mut histogram = [0u8; 16];
        histogram[1] = 2; // two codes of length 2
        let mut table = HuffmanTable::empty();
        table.bind(histogram, symbols).unwrap();
        table
    }

    #[test]
    fn canonical_codes_are_consecutive_and_increase_with_length() {
        let symbols = [0xA, 0xB];
        let table = two_symbol_dc_table(&symbols);
        assert_eq!(table.codes[0], 0b00);
        assert_eq!(table.codes[1], 0b01);
    }

    #[test]
    fn bind_rejects_histogram_entry_exceeding_its_length_bound() {
        let mut histogram = [0u8; 16];
        histogram[0] = 3; // length 1 allows at most 2^1 = 2 codes
        let symbols = [0u8; 3];
        let mut table: HuffmanTable<MAX_DC_SYMBOLS> = HuffmanTable::empty();
        assert!(table.bind(histogram, &symbols).is_err());
    }

    #[test]
    fn bind_rejects_dc_table_over_twelve_symbols() {
        let mut histogram = [0u8; 16];
        histogram[15] = 13; // one more than MAX_DC_SYMBOLS
        let symbols = [0u8; 13];
        let mut table: HuffmanTable<MAX_DC_SYMBOLS> = HuffmanTable::empty();
        assert!(table.bind(histogram, &symbols).is_err());
    }

    #[test]
    fn decode_symbol_matches_msb_first_bit_walk() {
        let symbols = [0xA, 0xB];
        let table = two_symbol_dc_table(&symbols);
        // code 0b01 -> symbol 0xB
        let buf = [0b0100_0000u8, 0, 0];
        let mut reader = BitReader::new(&buf, 0);
        assert_eq!(table.decode_symbol(&mut reader).unwrap(), 0xB);
    }

    #[test]
    fn recover_coefficient_handles_zero_length_and_sign() {
        assert_eq!(recover_coefficient(0, 0), 0);
        // length 3, raw 0b011 (top bit 0) -> negative
        assert_eq!(recover_coefficient(3, 0b011), 0b011 - 0b111);
        // length 3, raw 0b100 (top bit 1) -> positive, as-is
        assert_eq!(recover_coefficient(3, 0b100), 0b100);
    }
}
