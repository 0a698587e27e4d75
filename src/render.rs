//! # Document Renderer
//!
//! [`DocumentRenderer`] is the seam between the batch loop and whatever turns
//! a template plus one input map into document bytes. [`PdfRenderer`] is the
//! default implementation, built on `printpdf`: one page the size of the
//! template, the background image stretched over it, then every field of the
//! first group painted in order.

use std::collections::BTreeMap;
use std::io::BufWriter;

use ::image::{DynamicImage, Rgba, RgbImage};
use log::{debug, warn};
use printpdf::{
    BuiltinFont, Color, ColorBits, ColorSpace, Image, ImageTransform, ImageXObject,
    IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference, Px, Rgb,
};

use crate::binder::InputMap;
use crate::error::RenderError;
use crate::fonts::{FontData, FontSet, LoadedFont};
use crate::template::{Alignment, FieldDescriptor, Template};

// ============================================================================
// Constants
// ============================================================================

/// Millimetres per typographic point
const PT_TO_MM: f32 = 25.4 / 72.0;

/// Baseline offset below the top of a field box, as a share of the font size
const ASCENT_RATIO: f32 = 0.8;

/// Distance between baselines of consecutive lines, as a share of the font size
const LINE_HEIGHT_RATIO: f32 = 1.2;

/// Average glyph advance (in em) assumed for built-in proportional fonts
const BUILTIN_AVERAGE_ADVANCE_EM: f32 = 0.5;

/// Glyph advance (in em) of the built-in Courier family
const COURIER_ADVANCE_EM: f32 = 0.6;

/// Paints one document from a template and an input map.
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, template: &Template, inputs: &InputMap, fonts: &FontSet) -> Result<Vec<u8>, RenderError>;
}

/// Default PDF renderer
#[derive(Debug, Clone)]
pub struct PdfRenderer {
    title: String,
}

impl PdfRenderer {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into() }
    }
}

impl Default for PdfRenderer {
    fn default() -> Self {
        Self::new("Diploma")
    }
}

impl DocumentRenderer for PdfRenderer {
    fn render(&self, template: &Template, inputs: &InputMap, fonts: &FontSet) -> Result<Vec<u8>, RenderError> {
        let (doc, page, layer) = PdfDocument::new(
            self.title.clone(),
            Mm(template.page_width),
            Mm(template.page_height),
            "Layer 1",
        );
        let layer = doc.get_page(page).get_layer(layer);

        if let Some(background) = &template.background {
            embed_background(&layer, &background.image, template.page_width, template.page_height);
        }

        let mut font_refs: BTreeMap<String, IndirectFontRef> = BTreeMap::new();
        for field in template.schemas.first().into_iter().flatten() {
            let text = inputs.get(&field.name);
            if text.is_empty() {
                continue;
            }

            let (label, font) = fonts
                .resolve(field.font_name.as_deref())
                .ok_or_else(|| RenderError::Render("font set is empty".to_string()))?;

            let font_ref = match font_refs.get(label) {
                Some(font_ref) => font_ref.clone(),
                None => {
                    let font_ref = add_font(&doc, label, font)?;
                    font_refs.insert(label.to_string(), font_ref.clone());
                    font_ref
                }
            };

            draw_field(&layer, field, text, font, &font_ref, template.page_height);
        }

        let mut writer = BufWriter::new(Vec::new());
        doc.save(&mut writer)
            .map_err(|e| RenderError::Render(e.to_string()))?;
        writer
            .into_inner()
            .map_err(|e| RenderError::Render(e.to_string()))
    }
}

fn add_font(doc: &PdfDocumentReference, label: &str, font: &LoadedFont) -> Result<IndirectFontRef, RenderError> {
    let result = match &font.data {
        FontData::Builtin(builtin) => doc.add_builtin_font(builtin.clone()),
        FontData::Embedded(bytes) => doc.add_external_font(bytes.as_slice()),
    };
    result.map_err(|e| RenderError::Render(format!("font '{}': {}", label, e)))
}

// ============================================================================
// Field Drawing
// ============================================================================

fn draw_field(
    layer: &PdfLayerReference,
    field: &FieldDescriptor,
    text: &str,
    font: &LoadedFont,
    font_ref: &IndirectFontRef,
    page_height: f32,
) {
    let color = field
        .font_color
        .as_deref()
        .map(|value| {
            parse_hex_color(value).unwrap_or_else(|e| {
                warn!("Field '{}': {}, using black", field.name, e);
                (0.0, 0.0, 0.0)
            })
        })
        .unwrap_or((0.0, 0.0, 0.0));
    layer.set_fill_color(Color::Rgb(Rgb::new(color.0, color.1, color.2, None)));

    let line_height = field.font_size * PT_TO_MM * LINE_HEIGHT_RATIO;
    let first_baseline = field.position.y + field.font_size * PT_TO_MM * ASCENT_RATIO;

    for (index, line) in text.lines().enumerate() {
        let width = text_width_mm(line, font, field.font_size);
        let x = aligned_x(field, width);
        let y = page_height - (first_baseline + index as f32 * line_height);

        debug!("Drawing '{}' at ({:.1}, {:.1}) mm", field.name, x, y);
        layer.use_text(line, field.font_size, Mm(x), Mm(y), font_ref);
    }
}

/// Left edge of a line of `text_width` mm inside the field box.
fn aligned_x(field: &FieldDescriptor, text_width: f32) -> f32 {
    match field.alignment {
        Alignment::Left => field.position.x,
        Alignment::Center => field.position.x + (field.width - text_width) / 2.0,
        Alignment::Right => field.position.x + field.width - text_width,
    }
}

/// Width of `text` in mm at `font_size` points.
fn text_width_mm(text: &str, font: &LoadedFont, font_size: f32) -> f32 {
    let em = match &font.data {
        FontData::Builtin(builtin) => text.chars().count() as f32 * builtin_advance_em(builtin),
        FontData::Embedded(bytes) => match ttf_parser::Face::parse(bytes.as_slice(), 0) {
            Ok(face) => {
                let units = face.units_per_em() as f32;
                text.chars()
                    .map(|c| {
                        face.glyph_index(c)
                            .and_then(|glyph| face.glyph_hor_advance(glyph))
                            .map(|advance| advance as f32 / units)
                            .unwrap_or(BUILTIN_AVERAGE_ADVANCE_EM)
                    })
                    .sum()
            }
            Err(_) => text.chars().count() as f32 * BUILTIN_AVERAGE_ADVANCE_EM,
        },
    };
    em * font_size * PT_TO_MM
}

fn builtin_advance_em(font: &BuiltinFont) -> f32 {
    match font {
        BuiltinFont::Courier
        | BuiltinFont::CourierBold
        | BuiltinFont::CourierOblique
        | BuiltinFont::CourierBoldOblique => COURIER_ADVANCE_EM,
        _ => BUILTIN_AVERAGE_ADVANCE_EM,
    }
}

/// Parses `#RGB` or `#RRGGBB` into 0.0..=1.0 components.
pub fn parse_hex_color(value: &str) -> Result<(f32, f32, f32), String> {
    let hex = value.trim().trim_start_matches('#');
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("invalid color '{}'", value));
    }
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return Err(format!("invalid color '{}'", value)),
    };

    let channel = |i: usize| {
        u8::from_str_radix(&expanded[i..i + 2], 16)
            .map(|v| v as f32 / 255.0)
            .map_err(|_| format!("invalid color '{}'", value))
    };
    Ok((channel(0)?, channel(2)?, channel(4)?))
}

// ============================================================================
// Background
// ============================================================================

fn embed_background(layer: &PdfLayerReference, background: &DynamicImage, page_width: f32, page_height: f32) {
    // Composite against white so transparent regions print as paper
    let rgba_image = background.to_rgba8();
    let (width_px, height_px) = rgba_image.dimensions();

    let mut rgb_image = RgbImage::new(width_px, height_px);
    for (x, y, pixel) in rgba_image.enumerate_pixels() {
        let Rgba([r, g, b, a]) = *pixel;
        let alpha = a as f32 / 255.0;
        let bg = 255.0;
        let out_r = (r as f32 * alpha + bg * (1.0 - alpha)) as u8;
        let out_g = (g as f32 * alpha + bg * (1.0 - alpha)) as u8;
        let out_b = (b as f32 * alpha + bg * (1.0 - alpha)) as u8;
        rgb_image.put_pixel(x, y, ::image::Rgb([out_r, out_g, out_b]));
    }

    let image = Image::from(ImageXObject {
        width: Px(width_px as usize),
        height: Px(height_px as usize),
        color_space: ColorSpace::Rgb,
        bits_per_component: ColorBits::Bit8,
        interpolate: true,
        image_data: rgb_image.into_raw(),
        image_filter: None,
        clipping_bbox: None,
        smask: None,
    });

    // DPI fits the width; the vertical scale stretches the rest to the page
    let dpi = (width_px as f32) / (page_width / 25.4);
    let natural_height = height_px as f32 / dpi * 25.4;

    image.add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(0.0)),
            translate_y: Some(Mm(0.0)),
            dpi: Some(dpi),
            scale_y: Some(page_height / natural_height),
            ..Default::default()
        },
    );
}
