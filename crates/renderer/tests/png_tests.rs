//! Encoder behaviour on map-like images.
//!
//! Vector layers on the paper background stay under 256 colors and should
//! come out indexed; imagery falls back to RGBA.

use renderer::png::encode_png;

// ============================================================================
// Helper functions
// ============================================================================

/// IHDR color type: byte 25 of a PNG stream.
fn color_type(png: &[u8]) -> u8 {
    png[25]
}

/// Zoning-like image: a handful of flat fills in bands.
fn zoning_pixels(width: usize, height: usize) -> Vec<u8> {
    let fills = [
        (0xf2, 0xef, 0xe9, 255),
        (0xe4, 0xc5, 0x8f, 255),
        (0xd9, 0x8c, 0x8c, 255),
        (0x9e, 0xc3, 0xe6, 255),
        (0x00, 0xb7, 0xc2, 255),
    ];
    let mut pixels = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            let (r, g, b, a) = fills[(x / 13 + y / 17) % fills.len()];
            pixels.extend_from_slice(&[r, g, b, a]);
        }
    }
    pixels
}

/// Aerial-like image: a smooth gradient with thousands of colors.
fn aerial_pixels(width: usize, height: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            pixels.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255]);
        }
    }
    pixels
}

fn decode(png: &[u8]) -> image::RgbaImage {
    image::load_from_memory(png).unwrap().to_rgba8()
}

// ============================================================================
// Format selection
// ============================================================================

#[test]
fn test_flat_fills_encode_indexed() {
    let pixels = zoning_pixels(256, 256);
    let png = encode_png(&pixels, 256, 256, Some(150)).unwrap();
    assert_eq!(color_type(&png), 3);
    assert_eq!(decode(&png).into_raw(), pixels);
}

#[test]
fn test_imagery_encodes_rgba() {
    let pixels = aerial_pixels(300, 300);
    let png = encode_png(&pixels, 300, 300, Some(150)).unwrap();
    assert_eq!(color_type(&png), 6);
    assert_eq!(decode(&png).into_raw(), pixels);
}

#[test]
fn test_parallel_palette_matches_input() {
    // Above the parallel threshold, with partial transparency in the palette
    let mut pixels = zoning_pixels(128, 128);
    for px in pixels.chunks_exact_mut(4).step_by(7) {
        px[3] = 46;
    }
    let png = encode_png(&pixels, 128, 128, None).unwrap();
    assert_eq!(color_type(&png), 3);
    assert_eq!(decode(&png).into_raw(), pixels);
}

// ============================================================================
// Size
// ============================================================================

#[test]
fn test_indexed_is_smaller_than_rgba_equivalent() {
    let flat = zoning_pixels(512, 512);
    let indexed = encode_png(&flat, 512, 512, None).unwrap();

    // One odd pixel per row pushes the palette over 256 colors
    let mut noisy = flat.clone();
    for (i, px) in noisy.chunks_exact_mut(4).enumerate().step_by(512) {
        px[0] = (i / 512) as u8;
        px[1] = (i / 512 / 2) as u8;
    }
    let rgba = encode_png(&noisy, 512, 512, None).unwrap();

    assert_eq!(color_type(&indexed), 3);
    assert_eq!(color_type(&rgba), 6);
    assert!(indexed.len() < rgba.len());
}
