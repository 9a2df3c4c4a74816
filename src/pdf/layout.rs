//! Page geometry and the single-page element that draws a certificate.

use chrono::NaiveDate;
use genpdf::elements::Image;
use genpdf::render::Area;
use genpdf::style::{Color, Style};
use genpdf::{Context, Element, Mm, Position, RenderResult};

use crate::db::{FieldPlacement, QrPlacement, TextAlign};

/// Landscape A4.
pub const PAGE_WIDTH_MM: f64 = 297.0;
pub const PAGE_HEIGHT_MM: f64 = 210.0;

const MM_PER_PT: f64 = 25.4 / 72.0;
const MIN_FONT_PT: f64 = 4.0;
const MAX_FONT_PT: f64 = 144.0;

/// Page fill used when the template has no usable background.
pub const PAPER_RGB: [u8; 3] = [255, 253, 245];
pub const INK: Color = Color::Rgb(33, 37, 41);
pub const ACCENT: Color = Color::Rgb(26, 54, 93);

/// A rectangle on the page, in millimetres from the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

pub const QR_SLOT: Slot = Slot {
    x: 247.0,
    y: 155.0,
    width: 35.0,
    height: 35.0,
};
pub const LOGO_SLOT: Slot = Slot {
    x: 18.0,
    y: 16.0,
    width: 30.0,
    height: 30.0,
};
pub const SIGNATURE_SLOT: Slot = Slot {
    x: 24.0,
    y: 158.0,
    width: 50.0,
    height: 20.0,
};

/// Fixed vertical positions (mm) of the centered text lines.
pub mod fixed {
    pub const TITLE_Y: f64 = 38.0;
    pub const SUBTITLE_Y: f64 = 54.0;
    pub const PREAMBLE_Y: f64 = 72.0;
    pub const STUDENT_Y: f64 = 88.0;
    pub const COMPLETED_Y: f64 = 106.0;
    pub const COURSE_Y: f64 = 120.0;
    pub const DATE_Y: f64 = 138.0;
    pub const INSTITUTE_Y: f64 = 148.0;
    pub const CODE_X: f64 = 20.0;
    pub const CODE_Y: f64 = 190.0;
}

/// Maps the background image's pixel space onto the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    mm_per_px_x: f64,
    mm_per_px_y: f64,
}

impl Geometry {
    /// The background is stretched to cover the whole page.
    pub fn for_background(width_px: u32, height_px: u32) -> Option<Self> {
        if width_px == 0 || height_px == 0 {
            return None;
        }
        Some(Self {
            mm_per_px_x: PAGE_WIDTH_MM / f64::from(width_px),
            mm_per_px_y: PAGE_HEIGHT_MM / f64::from(height_px),
        })
    }

    pub fn text(&self, placement: &FieldPlacement, text: String, bold: bool) -> PlacedText {
        let size_pt = placement.font_size * self.mm_per_px_x / MM_PER_PT;
        PlacedText {
            text,
            x: placement.x * self.mm_per_px_x,
            y: placement.y * self.mm_per_px_y,
            size_pt: clamp_font(size_pt),
            color: parse_color(&placement.font_color).unwrap_or(INK),
            align: placement.text_align,
            bold,
        }
    }

    pub fn qr_slot(&self, placement: &QrPlacement) -> Slot {
        let side = placement.size * self.mm_per_px_x;
        Slot {
            x: placement.x * self.mm_per_px_x,
            y: placement.y * self.mm_per_px_y,
            width: side,
            height: side,
        }
    }
}

fn clamp_font(size_pt: f64) -> u8 {
    size_pt.clamp(MIN_FONT_PT, MAX_FONT_PT).round() as u8
}

/// Parses `#rrggbb` or `#rgb`.
pub fn parse_color(raw: &str) -> Option<Color> {
    let hex = raw.trim().strip_prefix('#')?;
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        6 => Some(Color::Rgb(
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        )),
        3 => {
            let expand = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
            Some(Color::Rgb(expand(0)?, expand(1)?, expand(2)?))
        }
        _ => None,
    }
}

pub fn format_award_date(date: NaiveDate) -> String {
    date.format("%B %d, %Y").to_string()
}

/// A line of text anchored at `(x, y)`: `x` is interpreted through `align`,
/// `y` is the vertical centre of the line.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedText {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub size_pt: u8,
    pub color: Color,
    pub align: TextAlign,
    pub bold: bool,
}

impl PlacedText {
    pub fn centered(text: impl Into<String>, y: f64, size_pt: u8, color: Color, bold: bool) -> Self {
        Self {
            text: text.into(),
            x: PAGE_WIDTH_MM / 2.0,
            y,
            size_pt,
            color,
            align: TextAlign::Center,
            bold,
        }
    }

    fn style(&self) -> Style {
        let style = Style::new().with_font_size(self.size_pt).with_color(self.color);
        if self.bold {
            style.bold()
        } else {
            style
        }
    }

    /// Top-left corner of the text box, given the measured string width.
    pub fn origin(&self, width_mm: f64) -> (f64, f64) {
        let left = match self.align {
            TextAlign::Left => self.x,
            TextAlign::Center => self.x - width_mm / 2.0,
            TextAlign::Right => self.x - width_mm,
        };
        let top = self.y - f64::from(self.size_pt) * MM_PER_PT / 2.0;
        (left.max(0.0), top.max(0.0))
    }
}

/// Inset (mm) and stroke count of the outer frame and the inner rule.
const OUTER_FRAME: (f64, usize) = (8.0, 4);
const INNER_FRAME: (f64, usize) = (11.0, 1);
/// Distance between the strokes that make up a heavier frame.
const FRAME_STROKE_GAP_MM: f64 = 0.25;

/// Closed rectangle `inset` mm inside a `width` × `height` page.
pub fn frame(width: f64, height: f64, inset: f64) -> Vec<Position> {
    let (right, bottom) = (width - inset, height - inset);
    vec![
        Position::new(inset, inset),
        Position::new(right, inset),
        Position::new(right, bottom),
        Position::new(inset, bottom),
        Position::new(inset, inset),
    ]
}

/// The whole certificate, drawn onto one page in a fixed layer order.
///
/// `background` is either the template image or a plain paper fill, both
/// stretched over the page.
pub struct CertificatePage {
    pub background: Image,
    pub draw_border: bool,
    pub texts: Vec<PlacedText>,
    pub images: Vec<Image>,
}

impl CertificatePage {
    fn border(area: &Area<'_>) {
        let size = area.size();
        let (width, height) = (f64::from(size.width), f64::from(size.height));
        // genpdf strokes have a fixed weight; stack offset strokes for the heavy frame.
        for (inset, strokes) in [OUTER_FRAME, INNER_FRAME] {
            for stroke in 0..strokes {
                let inset = inset + stroke as f64 * FRAME_STROKE_GAP_MM;
                area.draw_line(
                    frame(width, height, inset),
                    Style::new().with_color(ACCENT),
                );
            }
        }
    }
}

impl Element for CertificatePage {
    fn render(
        &mut self,
        context: &Context,
        area: Area<'_>,
        style: Style,
    ) -> Result<RenderResult, genpdf::error::Error> {
        self.background.render(context, area.clone(), style)?;

        if self.draw_border {
            Self::border(&area);
        }

        for text in &self.texts {
            let text_style = text.style();
            let width: Mm = text_style.str_width(&context.font_cache, &text.text);
            let (x, y) = text.origin(f64::from(width));
            let printed =
                area.print_str(&context.font_cache, Position::new(x, y), text_style, &text.text)?;
            if !printed {
                tracing::warn!(text = %text.text, "Text did not fit on the certificate page");
            }
        }

        for image in &mut self.images {
            image.render(context, area.clone(), style)?;
        }

        Ok(RenderResult {
            size: area.size(),
            has_more: false,
        })
    }
}
