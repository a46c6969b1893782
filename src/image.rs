//! The public decoder façade: owns the parsed header and drives ROI luma
//! decoding through the Huffman, dequantize, IDCT, and block-writer stages.
use crate::bitstream::BitReader;
use crate::block_writer::{BasicBlockWriter, BlockWriter};
use crate::bounding_box::BoundingBox;
use crate::cursor::ByteCursor;
use crate::dequantize::Dequantizer;
use crate::errors::DecodeErrors;
use crate::headers::{self, ParsedHeader};
use crate::huffman::HuffmanDecoder;
use crate::idct::{idct_transform, range_normalize, zigzag_transform};

/// Owns a borrowed JFIF buffer and its parsed header. Valid for as long as
/// the buffer it was assigned is valid; reassigning to a new buffer drops
/// whatever header state was bound to the old one.
pub struct Decoder<'a> {
    buffer: Option<&'a [u8]>,
    header: Option<ParsedHeader<'a>>,
}

impl<'a> Decoder<'a> {
    /// An empty decoder with no valid header; `get_width`/`get_height`
    /// return 0 and every decode call fails until `assign` succeeds.
    pub fn new() -> Decoder<'a> {
        Decoder { buffer: None, header: None }
    }

    /// Builds a decoder and immediately attempts to parse `buffer`'s header.
    /// Parse failure leaves the decoder in the same empty state as `new()`.
    pub fn from_buffer(buffer: &'a [u8]) -> Decoder<'a> {
        let mut decoder = Decoder::new();
        decoder.assign(buffer);
        decoder
    }

    /// Parses `buffer`'s JFIF header, replacing any previously bound one.
    /// Returns whether the header reached `HEADER_OK`.
    pub fn assign(&mut self, buffer: &'a [u8]) -> bool {
        let mut cursor = ByteCursor::new(buffer);
        match headers::parse(&mut cursor) {
            Ok(parsed) => {
                debug!(
                    "assigned new buffer, header ok: {}x{}",
                    parsed.frame.width_px, parsed.frame.height_px
                );
                self.buffer = Some(buffer);
                self.header = Some(parsed);
                true
            }
            Err(err) => {
                warn!("header parse failed, decoder left without a valid header: {}", err);
                self.buffer = None;
                self.header = None;
                false
            }
        }
    }

    pub fn get_width(&self) -> u16 {
        self.header.as_ref().map_or(0, |h| h.frame.width_px)
    }

    pub fn get_height(&self) -> u16 {
        self.header.as_ref().map_or(0, |h| h.frame.height_px)
    }

    /// Decodes every luma block in `roi_blk` (block coordinates) through a
    /// default identity `BasicBlockWriter`, writing `(x2-x1)*8 * (y2-y1)*8`
    /// bytes into `dst`.
    pub fn luma_decode(&self, dst: &mut [u8], roi_blk: BoundingBox) -> bool {
        let mut writer = BasicBlockWriter::new();
        self.luma_decode_with(dst, roi_blk, &mut writer)
    }

    /// Same as `luma_decode`, routing reconstructed blocks through a
    /// caller-supplied writer instead of the default identity copy.
    pub fn luma_decode_with<'b, W: BlockWriter<'b>>(
        &self, dst: &'b mut [u8], roi_blk: BoundingBox, writer: &mut W,
    ) -> bool {
        match self.luma_decode_inner(dst, roi_blk, writer) {
            Ok(()) => true,
            Err(err) => {
                warn!("luma_decode failed: {}", err);
                false
            }
        }
    }

    fn luma_decode_inner<'b, W: BlockWriter<'b>>(
        &self, dst: &'b mut [u8], roi_blk: BoundingBox, writer: &mut W,
    ) -> Result<(), DecodeErrors> {
        let header = self.header.as_ref().ok_or(DecodeErrors::RoiError)?;
        let buffer = self.buffer.ok_or(DecodeErrors::RoiError)?;
        let width_blocks = header.frame.width_blocks();
        let height_blocks = header.frame.height_blocks();

        let x1 = roi_blk.topleft_x;
        let y1 = roi_blk.topleft_y;
        let x2 = roi_blk.bottomright_x;
        let y2 = roi_blk.bottomright_y;

        if x1 >= x2 || y1 >= y2 || (x2 - x1) > width_blocks || (y2 - y1) > height_blocks {
            return Err(DecodeErrors::RoiError);
        }

        let roi_width_px = (x2 - x1) * 8;
        let roi_height_px = (y2 - y1) * 8;
        writer.init(dst, roi_width_px, roi_height_px);

        let mut reader = BitReader::new(buffer, header.ecs_start);
        let mut huffman_decoder = HuffmanDecoder::new();
        let dequantizer = Dequantizer::new(header.qtable);

        for row in y1..y2 {
            for col in x1..x2 {
                let target_idx = u64::from(row) * u64::from(width_blocks) + u64::from(col);
                let mut block = huffman_decoder.decode_luma_block(
                    &mut reader,
                    &header.tables,
                    header.frame.horiz_chroma_subs_factor,
                    target_idx,
                )?;

                dequantizer.transform(&mut block);
                zigzag_transform(&mut block);
                idct_transform(&mut block);
                range_normalize(&mut block);

                writer.write(&block);
            }
        }

        Ok(())
    }

    /// Decodes only the DC coefficient of every luma block in `roi_blk`,
    /// writing one low-pass luma byte per block (stride `x2-x1`).
    pub fn dc_luma_decode(&self, dst: &mut [u8], roi_blk: BoundingBox) -> bool {
        match self.dc_luma_decode_inner(dst, roi_blk) {
            Ok(()) => true,
            Err(err) => {
                warn!("dc_luma_decode failed: {}", err);
                false
            }
        }
    }

    fn dc_luma_decode_inner(&self, dst: &mut [u8], roi_blk: BoundingBox) -> Result<(), DecodeErrors> {
        let header = self.header.as_ref().ok_or(DecodeErrors::RoiError)?;
        let buffer = self.buffer.ok_or(DecodeErrors::RoiError)?;
        let width_blocks = header.frame.width_blocks();
        let height_blocks = header.frame.height_blocks();

        let x1 = roi_blk.topleft_x;
        let y1 = roi_blk.topleft_y;
        let x2 = roi_blk.bottomright_x;
        let y2 = roi_blk.bottomright_y;

        if x1 >= x2 || y1 >= y2 || (x2 - x1) > width_blocks || (y2 - y1) > height_blocks {
            return Err(DecodeErrors::RoiError);
        }

        let stride = usize::from(x2 - x1);
        let mut reader = BitReader::new(buffer, header.ecs_start);
        let mut huffman_decoder = HuffmanDecoder::new();
        let dequantizer = Dequantizer::new(header.qtable);

        for row in y1..y2 {
            for col in x1..x2 {
                let target_idx = u64::from(row) * u64::from(width_blocks) + u64::from(col);
                let block = huffman_decoder.decode_luma_block(
                    &mut reader,
                    &header.tables,
                    header.frame.horiz_chroma_subs_factor,
                    target_idx,
                )?;

                let mut dc = block[0];
                dequantizer.transform_dc(&mut dc);
                let low_pass_luma = ((dc + 1024) / 8).clamp(0, 255) as u8;

                let dst_idx = usize::from(row - y1) * stride + usize::from(col - x1);
                dst[dst_idx] = low_pass_luma;
            }
        }

        Ok(())
    }
}

impl<'a> Default for Decoder<'a> {
    fn default() -> Self {
        Self::new()
    }
}
