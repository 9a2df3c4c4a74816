// Certificate PDF generation
// Uses genpdf - requires Liberation, DejaVu or Arial fonts in standard paths
pub mod layout;

use chrono::NaiveDate;
use genpdf::elements::Image;
use genpdf::fonts::{FontData, FontFamily};
use genpdf::{Position, Scale, Size};
use image::{DynamicImage, Rgb, RgbImage};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::certificates::qr::decode_data_url;
use crate::db::{FieldName, Template};
use crate::storage::artifact_file_name;
use layout::{
    fixed, format_award_date, CertificatePage, Geometry, PlacedText, Slot, ACCENT, INK,
    LOGO_SLOT, PAGE_HEIGHT_MM, PAGE_WIDTH_MM, PAPER_RGB, QR_SLOT, SIGNATURE_SLOT,
};

/// With this DPI one image pixel is one millimetre before scaling.
const PIXEL_PER_MM_DPI: f64 = 25.4;

const FONT_DIRS: [&str; 8] = [
    "./fonts",
    "/usr/share/fonts/truetype/liberation",
    "/usr/share/fonts/liberation",
    "/usr/share/fonts/truetype/dejavu",
    "/usr/share/fonts/dejavu",
    "/usr/share/fonts/TTF",
    "/System/Library/Fonts/Supplemental",
    "/Library/Fonts",
];

/// Regular, bold, italic and bold-italic file names of each supported family,
/// as the distributions ship them.
const FONT_FILES: [[&str; 4]; 3] = [
    [
        "LiberationSans-Regular.ttf",
        "LiberationSans-Bold.ttf",
        "LiberationSans-Italic.ttf",
        "LiberationSans-BoldItalic.ttf",
    ],
    [
        "DejaVuSans.ttf",
        "DejaVuSans-Bold.ttf",
        "DejaVuSans-Oblique.ttf",
        "DejaVuSans-BoldOblique.ttf",
    ],
    [
        "Arial.ttf",
        "Arial Bold.ttf",
        "Arial Italic.ttf",
        "Arial Bold Italic.ttf",
    ],
];

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no suitable fonts found (install fonts-liberation or fonts-dejavu, or set FONTS_DIR)")]
    Font,

    #[error("bad image data: {0}")]
    Image(String),

    #[error("PDF rendering failed: {0}")]
    Pdf(#[from] genpdf::error::Error),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("render task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Everything needed to draw one certificate.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub certificate_code: String,
    pub student_name: String,
    pub course_name: String,
    pub award_date: NaiveDate,
    pub institute_name: String,
    pub template: Template,
    /// `data:image/png;base64,...` QR payload.
    pub qr_code: String,
    pub background: Option<Vec<u8>>,
    pub logo: Option<Vec<u8>>,
    pub signature: Option<Vec<u8>>,
    /// Regeneration overwrites; first issuance never clobbers an existing file.
    pub replace_existing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPdf {
    pub file_name: String,
}

pub trait Renderer: Send + Sync {
    fn render(&self, job: RenderJob) -> impl Future<Output = Result<RenderedPdf, RenderError>> + Send;

    /// Deletes a rendered file whose certificate was never persisted.
    fn discard(&self, pdf: &RenderedPdf) -> std::io::Result<()>;
}

/// Renders certificates with genpdf into `output_dir/{code}.pdf`.
#[derive(Debug, Clone)]
pub struct PdfRenderer {
    output_dir: PathBuf,
    fonts_dir: Option<PathBuf>,
    honor_template_layout: bool,
}

fn family_in(dir: &Path, files: &[&str; 4]) -> Option<FontFamily<FontData>> {
    let load = |name: &str| FontData::load(dir.join(name), None).ok();
    Some(FontFamily {
        regular: load(files[0])?,
        bold: load(files[1])?,
        italic: load(files[2])?,
        bold_italic: load(files[3])?,
    })
}

impl PdfRenderer {
    pub fn new(output_dir: PathBuf, fonts_dir: Option<PathBuf>, honor_template_layout: bool) -> Self {
        Self {
            output_dir,
            fonts_dir,
            honor_template_layout,
        }
    }

    fn load_fonts(&self) -> Result<FontFamily<FontData>, RenderError> {
        let preferred = self.fonts_dir.iter().map(PathBuf::as_path);
        let defaults = FONT_DIRS.iter().map(Path::new);

        preferred
            .chain(defaults)
            .filter(|dir| dir.exists())
            .find_map(|dir| FONT_FILES.iter().find_map(|files| family_in(dir, files)))
            .ok_or(RenderError::Font)
    }
}

/// An image re-encoded as an RGB PNG on disk, which is what genpdf can embed.
struct StagedImage {
    file: NamedTempFile,
    width_px: u32,
    height_px: u32,
}

impl StagedImage {
    fn from_bytes(bytes: &[u8]) -> Result<Self, RenderError> {
        let img = image::load_from_memory(bytes).map_err(|e| RenderError::Image(e.to_string()))?;
        Self::from_image(img)
    }

    /// Flattens alpha over white, since the PDF backend rejects alpha channels.
    fn from_image(img: DynamicImage) -> Result<Self, RenderError> {
        let rgba = img.to_rgba8();
        let (w, h) = rgba.dimensions();
        let mut background = image::RgbaImage::from_pixel(w, h, image::Rgba([255, 255, 255, 255]));
        image::imageops::overlay(&mut background, &rgba, 0, 0);
        let rgb = DynamicImage::ImageRgba8(background).to_rgb8();

        let mut file = tempfile::Builder::new().suffix(".png").tempfile()?;
        rgb.write_to(file.as_file_mut(), image::ImageFormat::Png)
            .map_err(|e| RenderError::Image(e.to_string()))?;

        Ok(Self {
            file,
            width_px: w,
            height_px: h,
        })
    }

    /// A single paper-colored pixel, stretched to fill pages without a background.
    fn paper() -> Result<Self, RenderError> {
        Self::from_image(DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb(PAPER_RGB))))
    }

    /// Stretches the image over `slot`.
    fn stretched(&self, slot: Slot) -> Result<Image, RenderError> {
        self.element(
            slot,
            Scale::new(
                slot.width / f64::from(self.width_px),
                slot.height / f64::from(self.height_px),
            ),
        )
    }

    /// Fits the image inside `slot`, keeping its aspect ratio.
    fn fitted(&self, slot: Slot) -> Result<Image, RenderError> {
        let factor = (slot.width / f64::from(self.width_px))
            .min(slot.height / f64::from(self.height_px));
        self.element(slot, Scale::new(factor, factor))
    }

    fn element(&self, slot: Slot, scale: Scale) -> Result<Image, RenderError> {
        let mut img = Image::from_path(self.file.path())?
            .with_position(Position::new(slot.x, slot.y))
            .with_scale(scale);
        img.set_dpi(PIXEL_PER_MM_DPI);
        Ok(img)
    }
}

/// Stages a best-effort decoration; failures are logged and skipped.
fn optional_image(what: &str, bytes: Option<&[u8]>, slot: Slot) -> Option<(StagedImage, Image)> {
    let staged = match StagedImage::from_bytes(bytes?) {
        Ok(staged) => staged,
        Err(e) => {
            tracing::warn!(asset = what, error = %e, "Skipping undecodable image");
            return None;
        }
    };
    match staged.fitted(slot) {
        Ok(element) => Some((staged, element)),
        Err(e) => {
            tracing::warn!(asset = what, error = %e, "Skipping image genpdf could not load");
            None
        }
    }
}

fn field_text(job: &RenderJob, field: FieldName) -> String {
    match field {
        FieldName::StudentName => job.student_name.clone(),
        FieldName::CourseName => job.course_name.clone(),
        FieldName::AwardDate => format_award_date(job.award_date),
        FieldName::CertificateCode => job.certificate_code.clone(),
    }
}

fn fixed_text(job: &RenderJob, field: FieldName) -> PlacedText {
    let text = field_text(job, field);
    match field {
        FieldName::StudentName => PlacedText::centered(text, fixed::STUDENT_Y, 30, ACCENT, true),
        FieldName::CourseName => PlacedText::centered(text, fixed::COURSE_Y, 22, INK, true),
        FieldName::AwardDate => {
            PlacedText::centered(format!("Awarded on {}", text), fixed::DATE_Y, 13, INK, false)
        }
        FieldName::CertificateCode => {
            let mut line =
                PlacedText::centered(format!("Certificate ID: {}", text), fixed::CODE_Y, 10, INK, false);
            line.x = fixed::CODE_X;
            line.align = crate::db::TextAlign::Left;
            line
        }
    }
}

fn static_texts(job: &RenderJob) -> Vec<PlacedText> {
    let mut texts = vec![
        PlacedText::centered("CERTIFICATE", fixed::TITLE_Y, 36, ACCENT, true),
        PlacedText::centered("OF COMPLETION", fixed::SUBTITLE_Y, 16, ACCENT, false),
        PlacedText::centered("This is to certify that", fixed::PREAMBLE_Y, 14, INK, false),
        PlacedText::centered(
            "has successfully completed the course",
            fixed::COMPLETED_Y,
            14,
            INK,
            false,
        ),
    ];
    if !job.institute_name.is_empty() {
        texts.push(PlacedText::centered(
            format!("Issued by {}", job.institute_name),
            fixed::INSTITUTE_Y,
            12,
            INK,
            false,
        ));
    }
    texts
}

const DYNAMIC_FIELDS: [(FieldName, bool); 4] = [
    (FieldName::StudentName, true),
    (FieldName::CourseName, true),
    (FieldName::AwardDate, false),
    (FieldName::CertificateCode, false),
];

impl PdfRenderer {
    /// Draws and writes one certificate. CPU and disk bound.
    fn render_blocking(&self, job: &RenderJob) -> Result<RenderedPdf, RenderError> {
        let font_family = self.load_fonts()?;

        let mut doc = genpdf::Document::new(font_family);
        doc.set_title(format!("Certificate {}", job.certificate_code));
        doc.set_paper_size(Size::new(PAGE_WIDTH_MM, PAGE_HEIGHT_MM));

        // Temp files must outlive `doc.render`.
        let mut staged: Vec<StagedImage> = Vec::new();

        let template_background =
            job.background
                .as_deref()
                .and_then(|bytes| match StagedImage::from_bytes(bytes) {
                    Ok(image) => Some(image),
                    Err(e) => {
                        tracing::warn!(error = %e, "Template background unusable, using plain fill");
                        None
                    }
                });
        let geometry = template_background
            .as_ref()
            .and_then(|bg| Geometry::for_background(bg.width_px, bg.height_px))
            .filter(|_| self.honor_template_layout && !job.template.fields.is_empty());

        let draw_border = template_background.is_none();
        let background = match template_background {
            Some(bg) => bg,
            None => StagedImage::paper()?,
        };
        let background_element = background.stretched(Slot {
            x: 0.0,
            y: 0.0,
            width: PAGE_WIDTH_MM,
            height: PAGE_HEIGHT_MM,
        })?;
        staged.push(background);

        let mut texts = match geometry {
            Some(_) => Vec::new(),
            None => static_texts(job),
        };
        for (field, bold) in DYNAMIC_FIELDS {
            let placed = geometry
                .zip(job.template.placement(field))
                .map(|(geometry, placement)| geometry.text(placement, field_text(job, field), bold));
            texts.push(placed.unwrap_or_else(|| fixed_text(job, field)));
        }

        let qr_bytes = decode_data_url(&job.qr_code)
            .ok_or_else(|| RenderError::Image("QR payload is not valid base64".to_string()))?;
        let qr = StagedImage::from_bytes(&qr_bytes)?;
        let qr_slot = match geometry {
            Some(geometry) => geometry.qr_slot(&job.template.qr_code_position),
            None => QR_SLOT,
        };
        let mut images = vec![qr.stretched(qr_slot)?];
        staged.push(qr);

        for (what, bytes, slot) in [
            ("logo", job.logo.as_deref(), LOGO_SLOT),
            ("signature", job.signature.as_deref(), SIGNATURE_SLOT),
        ] {
            if let Some((image, element)) = optional_image(what, bytes, slot) {
                images.push(element);
                staged.push(image);
            }
        }

        doc.push(CertificatePage {
            background: background_element,
            draw_border,
            texts,
            images,
        });

        let mut pdf = Vec::new();
        doc.render(&mut pdf)?;
        drop(staged);

        let file_name = artifact_file_name(&job.certificate_code);
        let mut options = std::fs::OpenOptions::new();
        options.write(true);
        if job.replace_existing {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        options
            .open(self.output_dir.join(&file_name))?
            .write_all(&pdf)?;

        Ok(RenderedPdf { file_name })
    }
}

impl Renderer for PdfRenderer {
    async fn render(&self, job: RenderJob) -> Result<RenderedPdf, RenderError> {
        let renderer = self.clone();
        tokio::task::spawn_blocking(move || renderer.render_blocking(&job)).await?
    }

    fn discard(&self, pdf: &RenderedPdf) -> std::io::Result<()> {
        std::fs::remove_file(self.output_dir.join(&pdf.file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificates::qr::encode_data_url;
    use crate::db::{FieldPlacement, QrPlacement, TextAlign};
    use chrono::Utc;
    use sqlx::types::Json;
    use std::io::Cursor;
    use uuid::Uuid;

    const CODE: &str = "CERT-1700000000000-ABCDEF123";

    fn template(fields: Vec<FieldPlacement>) -> Template {
        Template {
            id: Uuid::new_v4(),
            institute_id: Uuid::new_v4(),
            course_id: None,
            name: "Classic".to_string(),
            background_image: None,
            fields: Json(fields),
            qr_code_position: Json(QrPlacement::default()),
            is_default: true,
            created_at: Utc::now(),
        }
    }

    fn job(template: Template, qr_code: &str) -> RenderJob {
        RenderJob {
            certificate_code: CODE.to_string(),
            student_name: "Ada Lovelace".to_string(),
            course_name: "Analytical Engines".to_string(),
            award_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            institute_name: "Babbage Institute".to_string(),
            template,
            qr_code: qr_code.to_string(),
            background: None,
            logo: None,
            signature: None,
            replace_existing: false,
        }
    }

    fn qr() -> String {
        encode_data_url("https://certs.example.org/verify/CERT-1700000000000-ABCDEF123").unwrap()
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([240, 235, 220]));
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut bytes, image::ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    fn placement(field_name: FieldName, x: f64, y: f64) -> FieldPlacement {
        FieldPlacement {
            field_name,
            x,
            y,
            font_size: 24.0,
            font_color: "#1a365d".to_string(),
            font_family: "Helvetica".to_string(),
            text_align: TextAlign::Center,
        }
    }

    /// A renderer writing into `dir`, or None when the host has no usable fonts.
    fn renderer_with_fonts(dir: &Path) -> Option<PdfRenderer> {
        let renderer = PdfRenderer::new(dir.to_path_buf(), None, true);
        match renderer.load_fonts() {
            Ok(_) => Some(renderer),
            Err(e) => {
                eprintln!("skipping PDF render test: {}", e);
                None
            }
        }
    }

    fn assert_pdf(path: &Path) {
        let bytes = std::fs::read(path).unwrap();
        assert!(bytes.starts_with(b"%PDF"), "not a PDF: {}", path.display());
    }

    #[test]
    fn fixed_layout_centers_dynamic_fields() {
        let job = job(template(Vec::new()), "");

        let student = fixed_text(&job, FieldName::StudentName);
        assert_eq!(student.text, "Ada Lovelace");
        assert_eq!(student.align, TextAlign::Center);
        assert_eq!(student.y, fixed::STUDENT_Y);

        let date = fixed_text(&job, FieldName::AwardDate);
        assert_eq!(date.text, "Awarded on January 15, 2024");

        let code = fixed_text(&job, FieldName::CertificateCode);
        assert_eq!(code.align, TextAlign::Left);
        assert_eq!(code.x, fixed::CODE_X);
    }

    #[test]
    fn static_captions_mention_the_institute() {
        let job = job(template(Vec::new()), "");
        let texts = static_texts(&job);
        assert_eq!(texts[0].text, "CERTIFICATE");
        assert!(texts.iter().any(|t| t.text == "Issued by Babbage Institute"));
    }

    #[test]
    fn staged_images_are_flattened_pngs() {
        let bytes = decode_data_url(&qr()).unwrap();
        let staged = StagedImage::from_bytes(&bytes).unwrap();

        let reloaded = image::open(staged.file.path()).unwrap();
        assert_eq!(reloaded.color(), image::ColorType::Rgb8);
        assert_eq!(reloaded.width(), staged.width_px);
    }

    #[test]
    fn paper_fill_is_a_single_paper_pixel() {
        let staged = StagedImage::paper().unwrap();
        assert_eq!((staged.width_px, staged.height_px), (1, 1));

        let reloaded = image::open(staged.file.path()).unwrap().to_rgb8();
        assert_eq!(reloaded.get_pixel(0, 0).0, PAPER_RGB);
    }

    #[test]
    fn undecodable_decoration_is_skipped() {
        assert!(optional_image("logo", Some(b"not an image"), LOGO_SLOT).is_none());
        assert!(optional_image("logo", None, LOGO_SLOT).is_none());
    }

    #[test]
    fn font_lookup_needs_all_four_styles() {
        let dir = tempfile::tempdir().unwrap();
        for files in &FONT_FILES {
            assert!(family_in(dir.path(), files).is_none());
        }

        // A lone regular face is not a family.
        std::fs::write(dir.path().join("DejaVuSans.ttf"), b"not a font").unwrap();
        assert!(family_in(dir.path(), &FONT_FILES[1]).is_none());
    }

    #[test]
    fn bad_qr_payload_is_a_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = PdfRenderer::new(dir.path().to_path_buf(), Some(dir.path().to_path_buf()), true);
        let job = job(template(Vec::new()), "data:image/png;base64,@@@");

        // Either fonts are missing or the QR is rejected; both must be errors, never a file.
        assert!(renderer.render_blocking(&job).is_err());
        assert!(!dir.path().join(artifact_file_name(CODE)).exists());
    }

    #[test]
    fn fixed_layout_renders_a_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let Some(renderer) = renderer_with_fonts(dir.path()) else {
            return;
        };
        let mut job = job(template(Vec::new()), &qr());
        job.logo = Some(png(40, 40));
        job.signature = Some(b"not an image".to_vec());

        let rendered = renderer.render_blocking(&job).unwrap();

        assert_eq!(rendered.file_name, artifact_file_name(CODE));
        assert_pdf(&dir.path().join(&rendered.file_name));
    }

    #[test]
    fn template_layout_renders_a_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let Some(renderer) = renderer_with_fonts(dir.path()) else {
            return;
        };
        let mut template = template(vec![
            placement(FieldName::StudentName, 297.0, 180.0),
            placement(FieldName::CourseName, 297.0, 240.0),
            placement(FieldName::AwardDate, 297.0, 290.0),
        ]);
        template.qr_code_position = Json(QrPlacement {
            x: 470.0,
            y: 300.0,
            size: 90.0,
        });
        let mut job = job(template, &qr());
        job.background = Some(png(594, 420));

        let rendered = renderer.render_blocking(&job).unwrap();

        assert_pdf(&dir.path().join(&rendered.file_name));
    }

    #[test]
    fn existing_file_is_only_replaced_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let Some(renderer) = renderer_with_fonts(dir.path()) else {
            return;
        };
        let mut job = job(template(Vec::new()), &qr());
        renderer.render_blocking(&job).unwrap();

        assert!(matches!(renderer.render_blocking(&job), Err(RenderError::Io(_))));

        job.replace_existing = true;
        let rendered = renderer.render_blocking(&job).unwrap();
        assert_pdf(&dir.path().join(&rendered.file_name));

        renderer.discard(&rendered).unwrap();
        assert!(!dir.path().join(&rendered.file_name).exists());
    }

    #[tokio::test]
    async fn render_runs_off_the_async_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let Some(renderer) = renderer_with_fonts(dir.path()) else {
            return;
        };

        let rendered = renderer.render(job(template(Vec::new()), &qr())).await.unwrap();

        assert_pdf(&dir.path().join(&rendered.file_name));
    }
}
