//! PNG encoding for RGBA map images.
//!
//! Supports two encoding modes:
//! - **Indexed PNG (color type 3)**: used when the image has ≤256 unique
//!   colors, which is common for vector-only layers on a flat background.
//! - **RGBA PNG (color type 6)**: fallback for imagery and blended rasters.
//!
//! Every image carries a `pHYs` chunk with the output DPI so print workflows
//! pick up the intended physical size.

use rayon::prelude::*;
use std::collections::HashMap;
use std::io::Write;

use crate::error::{DrawResult, RenderError};

const SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Maximum colors for indexed PNG (PNG8)
const MAX_PALETTE_SIZE: usize = 256;

/// Minimum pixels to benefit from parallel palette extraction
const PARALLEL_THRESHOLD: usize = 4096;

const METRES_PER_INCH: f64 = 0.0254;

type Palette = Vec<(u8, u8, u8, u8)>;

/// Encode straight-alpha RGBA pixels, choosing indexed or RGBA output.
pub fn encode_png(pixels: &[u8], width: u32, height: u32, dpi: Option<u32>) -> DrawResult<Vec<u8>> {
    let expected = width as usize * height as usize * 4;
    if width == 0 || height == 0 || pixels.len() != expected {
        return Err(RenderError::Encode(format!(
            "{}x{} image needs {} bytes, got {}",
            width,
            height,
            expected,
            pixels.len()
        )));
    }

    let palette = if pixels.len() / 4 >= PARALLEL_THRESHOLD {
        extract_palette_parallel(pixels)
    } else {
        extract_palette_sequential(pixels)
    };

    match palette {
        Some((palette, indices)) => encode_indexed(width, height, &palette, &indices, dpi),
        None => encode_rgba(pixels, width, height, dpi),
    }
}

/// Pack RGBA bytes into a u32 for faster hashing and comparison
#[inline(always)]
fn pack_color(r: u8, g: u8, b: u8, a: u8) -> u32 {
    (r as u32) | ((g as u32) << 8) | ((b as u32) << 16) | ((a as u32) << 24)
}

#[inline(always)]
fn unpack_color(packed: u32) -> (u8, u8, u8, u8) {
    (
        packed as u8,
        (packed >> 8) as u8,
        (packed >> 16) as u8,
        (packed >> 24) as u8,
    )
}

fn extract_palette_sequential(pixels: &[u8]) -> Option<(Palette, Vec<u8>)> {
    let mut color_to_index: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette: Palette = Vec::with_capacity(MAX_PALETTE_SIZE);
    let mut indices: Vec<u8> = Vec::with_capacity(pixels.len() / 4);

    for chunk in pixels.chunks_exact(4) {
        let packed = pack_color(chunk[0], chunk[1], chunk[2], chunk[3]);
        let index = match color_to_index.get(&packed) {
            Some(&idx) => idx,
            None => {
                if palette.len() >= MAX_PALETTE_SIZE {
                    return None;
                }
                let idx = palette.len() as u8;
                palette.push((chunk[0], chunk[1], chunk[2], chunk[3]));
                color_to_index.insert(packed, idx);
                idx
            }
        };
        indices.push(index);
    }

    Some((palette, indices))
}

/// Collect unique colors per chunk in parallel, merge, then map pixels to
/// indices in a second parallel pass.
fn extract_palette_parallel(pixels: &[u8]) -> Option<(Palette, Vec<u8>)> {
    let chunk_pixels = (pixels.len() / 4 / rayon::current_num_threads()).max(256);

    let unique_colors: Vec<u32> = pixels
        .par_chunks(chunk_pixels * 4)
        .flat_map(|chunk| {
            let mut local: HashMap<u32, ()> = HashMap::with_capacity(MAX_PALETTE_SIZE);
            for px in chunk.chunks_exact(4) {
                local.insert(pack_color(px[0], px[1], px[2], px[3]), ());
                if local.len() > MAX_PALETTE_SIZE {
                    break;
                }
            }
            local.into_keys().collect::<Vec<_>>()
        })
        .collect();

    let mut lookup: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette: Palette = Vec::with_capacity(MAX_PALETTE_SIZE);
    for packed in unique_colors {
        if !lookup.contains_key(&packed) {
            if palette.len() >= MAX_PALETTE_SIZE {
                return None;
            }
            lookup.insert(packed, palette.len() as u8);
            palette.push(unpack_color(packed));
        }
    }

    let mut indices = vec![0u8; pixels.len() / 4];
    indices
        .par_chunks_mut(chunk_pixels)
        .zip(pixels.par_chunks(chunk_pixels * 4))
        .for_each(|(out, px)| {
            for (idx, p) in out.iter_mut().zip(px.chunks_exact(4)) {
                *idx = lookup.get(&pack_color(p[0], p[1], p[2], p[3])).copied().unwrap_or(0);
            }
        });

    Some((palette, indices))
}

fn ihdr(width: u32, height: u32, color_type: u8) -> [u8; 13] {
    let mut data = [0u8; 13];
    data[0..4].copy_from_slice(&width.to_be_bytes());
    data[4..8].copy_from_slice(&height.to_be_bytes());
    data[8] = 8; // bit depth
    data[9] = color_type;
    // compression, filter and interlace methods stay 0
    data
}

/// pHYs payload: pixels per metre on both axes, unit = metre.
fn phys(dpi: u32) -> [u8; 9] {
    let ppm = (dpi as f64 / METRES_PER_INCH).round() as u32;
    let mut data = [0u8; 9];
    data[0..4].copy_from_slice(&ppm.to_be_bytes());
    data[4..8].copy_from_slice(&ppm.to_be_bytes());
    data[8] = 1;
    data
}

fn encode_indexed(
    width: u32,
    height: u32,
    palette: &[(u8, u8, u8, u8)],
    indices: &[u8],
    dpi: Option<u32>,
) -> DrawResult<Vec<u8>> {
    let mut png = Vec::with_capacity(indices.len() / 4 + 1024);
    png.extend_from_slice(&SIGNATURE);
    write_chunk(&mut png, b"IHDR", &ihdr(width, height, 3));
    if let Some(dpi) = dpi {
        write_chunk(&mut png, b"pHYs", &phys(dpi));
    }

    let plte: Vec<u8> = palette.iter().flat_map(|&(r, g, b, _)| [r, g, b]).collect();
    write_chunk(&mut png, b"PLTE", &plte);

    if palette.iter().any(|&(_, _, _, a)| a < 255) {
        let trns: Vec<u8> = palette.iter().map(|&(_, _, _, a)| a).collect();
        write_chunk(&mut png, b"tRNS", &trns);
    }

    let idat = deflate_scanlines(indices, width as usize, height as usize)?;
    write_chunk(&mut png, b"IDAT", &idat);
    write_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

fn encode_rgba(pixels: &[u8], width: u32, height: u32, dpi: Option<u32>) -> DrawResult<Vec<u8>> {
    let mut png = Vec::with_capacity(pixels.len() / 2);
    png.extend_from_slice(&SIGNATURE);
    write_chunk(&mut png, b"IHDR", &ihdr(width, height, 6));
    if let Some(dpi) = dpi {
        write_chunk(&mut png, b"pHYs", &phys(dpi));
    }
    let idat = deflate_scanlines(pixels, width as usize * 4, height as usize)?;
    write_chunk(&mut png, b"IDAT", &idat);
    write_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    png.extend_from_slice(&hasher.finalize().to_be_bytes());
}

/// Zlib-compress rows of `row_bytes`, each prefixed with filter type 0.
fn deflate_scanlines(data: &[u8], row_bytes: usize, rows: usize) -> DrawResult<Vec<u8>> {
    let mut raw = Vec::with_capacity(rows * (row_bytes + 1));
    for row in data.chunks_exact(row_bytes).take(rows) {
        raw.push(0);
        raw.extend_from_slice(row);
    }

    let compress = |e: std::io::Error| RenderError::Encode(format!("IDAT compression failed: {}", e));
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&raw).map_err(compress)?;
    encoder.finish().map_err(compress)
}
