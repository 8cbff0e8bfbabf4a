//! Multi-page PDF contact sheet.
//!
//! One page per image, sized so the image prints at the request DPI, with a
//! Helvetica title band above it. Images are flattened onto white first.

use image::{DynamicImage, RgbImage};
use printpdf::{BuiltinFont, Image, ImageTransform, Mm, PdfDocument, Pt};

use crate::error::{DrawResult, RenderError};

/// Height of the title band in points.
pub const TITLE_BAND_PT: f32 = 28.0;
const TITLE_FONT_PT: f32 = 12.0;
const TITLE_MARGIN_PT: f32 = 10.0;

/// One image placed on its own page.
#[derive(Debug, Clone, Copy)]
pub struct SheetPage<'a> {
    pub title: &'a str,
    pub width: u32,
    pub height: u32,
    /// Straight-alpha RGBA
    pub rgba: &'a [u8],
}

/// Build the contact sheet document.
pub fn write_contact_sheet(pages: &[SheetPage<'_>], dpi: u32) -> DrawResult<Vec<u8>> {
    if pages.is_empty() {
        return Err(RenderError::Encode("contact sheet needs at least one page".to_string()));
    }
    if dpi == 0 {
        return Err(RenderError::Encode("contact sheet dpi must be positive".to_string()));
    }

    let doc = PdfDocument::empty("Parcel contact sheet");
    let font = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;

    for page in pages {
        let rgb = flatten_on_white(page)?;
        let (image_w, image_h) = page_size_pt(page, dpi);

        let (page_index, layer_index) = doc.add_page(
            Mm::from(Pt(image_w)),
            Mm::from(Pt(image_h + TITLE_BAND_PT)),
            page.title,
        );
        let layer = doc.get_page(page_index).get_layer(layer_index);

        Image::from_dynamic_image(&DynamicImage::ImageRgb8(rgb)).add_to_layer(
            layer.clone(),
            ImageTransform {
                dpi: Some(dpi as f32),
                ..Default::default()
            },
        );
        layer.use_text(
            page.title,
            TITLE_FONT_PT,
            Mm::from(Pt(TITLE_MARGIN_PT)),
            Mm::from(Pt(image_h + (TITLE_BAND_PT - TITLE_FONT_PT) / 2.0)),
            &font,
        );
    }

    doc.save_to_bytes().map_err(pdf_error)
}

/// Image size in points when printed at `dpi`.
fn page_size_pt(page: &SheetPage<'_>, dpi: u32) -> (f32, f32) {
    let scale = 72.0 / dpi as f32;
    (page.width as f32 * scale, page.height as f32 * scale)
}

fn flatten_on_white(page: &SheetPage<'_>) -> DrawResult<RgbImage> {
    let expected = page.width as usize * page.height as usize * 4;
    if page.width == 0 || page.height == 0 || page.rgba.len() != expected {
        return Err(RenderError::Encode(format!(
            "page '{}' is {}x{} but carries {} bytes",
            page.title,
            page.width,
            page.height,
            page.rgba.len()
        )));
    }
    let mut rgb = Vec::with_capacity(expected / 4 * 3);
    for px in page.rgba.chunks_exact(4) {
        let a = px[3] as u32;
        for c in &px[..3] {
            rgb.push(((*c as u32 * a + 255 * (255 - a) + 127) / 255) as u8);
        }
    }
    RgbImage::from_raw(page.width, page.height, rgb)
        .ok_or_else(|| RenderError::Encode(format!("page '{}' has a short buffer", page.title)))
}

fn pdf_error(e: printpdf::Error) -> RenderError {
    RenderError::Encode(format!("pdf: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use printpdf::lopdf;

    #[test]
    fn test_one_page_per_image() {
        let a = vec![255u8; 20 * 10 * 4];
        let b = vec![0u8; 20 * 10 * 4];
        let pages = [
            SheetPage { title: "Zoning", width: 20, height: 10, rgba: &a },
            SheetPage { title: "Flood (FEMA)", width: 20, height: 10, rgba: &b },
        ];
        let pdf = write_contact_sheet(&pages, 144).unwrap();

        assert!(pdf.starts_with(b"%PDF-"));
        let doc = lopdf::Document::load_mem(&pdf).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn test_page_size_follows_dpi() {
        let px = vec![0u8; 20 * 10 * 4];
        let page = SheetPage { title: "Aerial", width: 20, height: 10, rgba: &px };
        // 20 px at 144 dpi is 10 pt wide
        assert_eq!(page_size_pt(&page, 144), (10.0, 5.0));
        assert_eq!(page_size_pt(&page, 72), (20.0, 10.0));
    }

    #[test]
    fn test_image_is_flattened_on_white() {
        let transparent = vec![0u8; 2 * 2 * 4];
        let page = SheetPage { title: "t", width: 2, height: 2, rgba: &transparent };
        assert_eq!(flatten_on_white(&page).unwrap().into_raw(), vec![255u8; 12]);

        let half_red = [255u8, 0, 0, 128].repeat(4);
        let page = SheetPage { title: "t", width: 2, height: 2, rgba: &half_red };
        assert_eq!(&flatten_on_white(&page).unwrap().into_raw()[..3], &[255, 127, 127]);
    }

    #[test]
    fn test_rejects_empty_and_malformed() {
        assert!(write_contact_sheet(&[], 96).is_err());
        let short = vec![0u8; 3];
        let pages = [SheetPage { title: "x", width: 2, height: 2, rgba: &short }];
        assert!(write_contact_sheet(&pages, 96).is_err());
        let px = vec![0u8; 16];
        let pages = [SheetPage { title: "x", width: 2, height: 2, rgba: &px }];
        assert!(write_contact_sheet(&pages, 0).is_err());
    }
}
