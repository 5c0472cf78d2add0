//! PNG recompression that only touches the image data stream.
//!
//! Chunks are copied through byte for byte except `IDAT`: the run of `IDAT`
//! chunks is inflated and written back as one chunk deflated at maximum
//! compression. Scanline filters, colour chunks (`gAMA`, `iCCP`, `sRGB`,
//! `cHRM`), text and APNG frame chunks all survive untouched.

use std::io::{Read, Write};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc};

use crate::utils::{ConverterError, ConverterResult};

pub const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];

const IDAT: [u8; 4] = *b"IDAT";
const IEND: [u8; 4] = *b"IEND";

/// One chunk, borrowed from the encoded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub kind: [u8; 4],
    pub data: &'a [u8],
}

/// Splits a PNG into its chunks, checking every CRC.
///
/// Returns the chunks up to and including `IEND` plus whatever trails it.
pub fn read_chunks(png: &[u8]) -> ConverterResult<(Vec<Chunk<'_>>, &[u8])> {
    let mut rest = png
        .strip_prefix(&SIGNATURE[..])
        .ok_or_else(|| ConverterError::optimization("Not a PNG file"))?;

    let mut chunks = Vec::new();
    loop {
        if rest.len() < 12 {
            return Err(ConverterError::optimization("Truncated PNG chunk"));
        }
        let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        let kind = [rest[4], rest[5], rest[6], rest[7]];
        let end = len
            .checked_add(12)
            .filter(|end| *end <= rest.len())
            .ok_or_else(|| ConverterError::optimization("Truncated PNG chunk"))?;

        let data = &rest[8..8 + len];
        let stored = u32::from_be_bytes([rest[8 + len], rest[9 + len], rest[10 + len], rest[11 + len]]);
        if stored != chunk_crc(&kind, data) {
            return Err(ConverterError::optimization(format!(
                "CRC mismatch in {} chunk",
                String::from_utf8_lossy(&kind)
            )));
        }

        chunks.push(Chunk { kind, data });
        rest = &rest[end..];
        if kind == IEND {
            return Ok((chunks, rest));
        }
    }
}

/// Appends one chunk, length and CRC included.
pub fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&chunk_crc(kind, data).to_be_bytes());
}

fn chunk_crc(kind: &[u8; 4], data: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(kind);
    crc.update(data);
    crc.sum()
}

/// Re-deflates the image data of a PNG at maximum compression.
///
/// The inflated scanlines are identical before and after, so the result
/// decodes to exactly the same image. It is not necessarily smaller.
pub fn recompress_png(png: &[u8]) -> ConverterResult<Vec<u8>> {
    let (chunks, trailer) = read_chunks(png)?;

    let first = chunks
        .iter()
        .position(|chunk| chunk.kind == IDAT)
        .ok_or_else(|| ConverterError::optimization("PNG has no image data"))?;
    let count = chunks[first..].iter().take_while(|chunk| chunk.kind == IDAT).count();
    if chunks[first + count..].iter().any(|chunk| chunk.kind == IDAT) {
        return Err(ConverterError::optimization("IDAT chunks are not consecutive"));
    }

    let stream: Vec<u8> = chunks[first..first + count]
        .iter()
        .flat_map(|chunk| chunk.data.iter().copied())
        .collect();
    let mut scanlines = Vec::new();
    ZlibDecoder::new(stream.as_slice())
        .read_to_end(&mut scanlines)
        .map_err(|e| ConverterError::optimization(format!("Failed to inflate image data: {e}")))?;

    let mut encoder = ZlibEncoder::new(Vec::with_capacity(stream.len()), Compression::best());
    encoder
        .write_all(&scanlines)
        .map_err(|e| ConverterError::optimization(format!("Failed to deflate image data: {e}")))?;
    let deflated = encoder
        .finish()
        .map_err(|e| ConverterError::optimization(format!("Failed to deflate image data: {e}")))?;

    let mut out = Vec::with_capacity(png.len());
    out.extend_from_slice(&SIGNATURE);
    for (idx, chunk) in chunks.iter().enumerate() {
        if idx == first {
            write_chunk(&mut out, &IDAT, &deflated);
        } else if chunk.kind != IDAT {
            write_chunk(&mut out, &chunk.kind, chunk.data);
        }
    }
    out.extend_from_slice(trailer);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::png::{CompressionType, FilterType, PngEncoder};
    use image::{ImageEncoder, Rgba, RgbaImage};

    fn loose_png() -> Vec<u8> {
        let image = RgbaImage::from_fn(64, 64, |x, y| Rgba([(x * 4) as u8, (y * 4) as u8, 128, 255]));
        let mut out = Vec::new();
        PngEncoder::new_with_quality(&mut out, CompressionType::Uncompressed, FilterType::NoFilter)
            .write_image(image.as_raw(), 64, 64, image::ExtendedColorType::Rgba8)
            .unwrap();
        out
    }

    /// Rebuilds `png` with extra chunks placed around its image data.
    fn with_chunks(png: &[u8], before: &[([u8; 4], &[u8])], after: &[([u8; 4], &[u8])]) -> Vec<u8> {
        let (chunks, _) = read_chunks(png).unwrap();
        let first = chunks.iter().position(|c| c.kind == IDAT).unwrap();
        let last = chunks.iter().rposition(|c| c.kind == IDAT).unwrap();

        let mut out = SIGNATURE.to_vec();
        for (idx, chunk) in chunks.iter().enumerate() {
            if idx == first {
                for (kind, data) in before {
                    write_chunk(&mut out, kind, data);
                }
            }
            write_chunk(&mut out, &chunk.kind, chunk.data);
            if idx == last {
                for (kind, data) in after {
                    write_chunk(&mut out, kind, data);
                }
            }
        }
        out
    }

    fn ancillary(png: &[u8]) -> Vec<Chunk<'_>> {
        read_chunks(png)
            .unwrap()
            .0
            .into_iter()
            .filter(|chunk| chunk.kind != IDAT)
            .collect()
    }

    fn pixels(png: &[u8]) -> RgbaImage {
        image::load_from_memory(png).unwrap().to_rgba8()
    }

    #[test]
    fn recompression_shrinks_and_keeps_pixels() {
        let original = loose_png();
        let recompressed = recompress_png(&original).unwrap();
        assert!(recompressed.len() < original.len());
        assert_eq!(pixels(&original), pixels(&recompressed));
    }

    #[test]
    fn animation_chunks_survive() {
        let actl = [0, 0, 0, 2, 0, 0, 0, 0];
        let fctl = [0u8; 26];
        let fdat = [0, 0, 0, 2, 0x78, 0x9C, 0x03, 0, 0, 0, 0, 1];
        let original = with_chunks(
            &loose_png(),
            &[(*b"acTL", &actl[..]), (*b"fcTL", &fctl[..])],
            &[(*b"fcTL", &fctl[..]), (*b"fdAT", &fdat[..])],
        );

        let recompressed = recompress_png(&original).unwrap();
        let kinds: Vec<_> = ancillary(&recompressed).iter().map(|c| c.kind).collect();
        assert!(kinds.contains(b"acTL"));
        assert_eq!(ancillary(&recompressed), ancillary(&original));
    }

    #[test]
    fn colour_chunks_survive() {
        let gama = 45455u32.to_be_bytes();
        let srgb = [0u8];
        let original = with_chunks(&loose_png(), &[(*b"gAMA", &gama[..]), (*b"sRGB", &srgb[..])], &[]);

        let recompressed = recompress_png(&original).unwrap();
        assert_eq!(ancillary(&recompressed), ancillary(&original));
        assert_eq!(pixels(&original), pixels(&recompressed));
    }

    #[test]
    fn split_image_data_is_joined() {
        let original = loose_png();
        let (chunks, _) = read_chunks(&original).unwrap();
        let mut split = SIGNATURE.to_vec();
        for chunk in &chunks {
            if chunk.kind == IDAT {
                let (head, tail) = chunk.data.split_at(chunk.data.len() / 2);
                write_chunk(&mut split, &IDAT, head);
                write_chunk(&mut split, &IDAT, tail);
            } else {
                write_chunk(&mut split, &chunk.kind, chunk.data);
            }
        }

        let recompressed = recompress_png(&split).unwrap();
        let (chunks, _) = read_chunks(&recompressed).unwrap();
        assert_eq!(chunks.iter().filter(|c| c.kind == IDAT).count(), 1);
        assert_eq!(pixels(&split), pixels(&recompressed));
    }

    #[test]
    fn damaged_files_are_rejected() {
        assert!(matches!(recompress_png(b"garbage"), Err(ConverterError::Optimization(_))));

        let mut flipped = loose_png();
        let last = flipped.len() - 20;
        flipped[last] ^= 0xFF;
        assert!(matches!(recompress_png(&flipped), Err(ConverterError::Optimization(_))));

        let truncated = loose_png();
        assert!(recompress_png(&truncated[..40]).is_err());
    }
}
