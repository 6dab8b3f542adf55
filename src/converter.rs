//! PDF conversion to plain text, HTML, or a JPEG of the first page.

use crate::error::ConversionError;
use crate::fetch::SourcePdf;
use crate::job::Action;
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use std::fmt;
use std::io::Cursor;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Default raster resolution for `ToImage`.
pub const DEFAULT_IMAGE_DPI: u32 = 256;

/// PDF user space is 72 units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Converted output ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

/// Turns a fetched PDF into the output an [`Action`] asks for.
///
/// Implementations are CPU-bound and called from a blocking task.
#[cfg_attr(test, mockall::automock)]
pub trait DocumentConverter: Send + Sync {
    fn convert(&self, action: Action, pdf: &SourcePdf) -> Result<Artifact, ConversionError>;
}

/// Converter backed by lopdf for text and pdfium for rendering.
///
/// libpdfium is bound on the first `ToImage` conversion and reused after
/// that. A failed bind is not cached, so the next job tries again.
pub struct PdfConverter {
    image_dpi: u32,
    /// Directory containing libpdfium; `./` then the system path when unset.
    pdfium_dir: Option<String>,
    pdfium: OnceLock<Pdfium>,
}

impl fmt::Debug for PdfConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdfConverter")
            .field("image_dpi", &self.image_dpi)
            .field("pdfium_dir", &self.pdfium_dir)
            .field("pdfium_bound", &self.pdfium.get().is_some())
            .finish()
    }
}

impl PdfConverter {
    pub fn new(image_dpi: u32, pdfium_dir: Option<String>) -> Self {
        Self {
            image_dpi,
            pdfium_dir,
            pdfium: OnceLock::new(),
        }
    }

    fn to_text(&self, pdf: &SourcePdf) -> Result<Artifact, ConversionError> {
        let text = extract_pages(pdf)?.join("\n");

        Ok(Artifact {
            bytes: text.into_bytes(),
            content_type: "text/plain; charset=utf-8",
        })
    }

    fn to_html(&self, pdf: &SourcePdf) -> Result<Artifact, ConversionError> {
        let pages = extract_pages(pdf)?;

        Ok(Artifact {
            bytes: render_html(&pages).into_bytes(),
            content_type: "text/html; charset=utf-8",
        })
    }

    fn to_image(&self, pdf: &SourcePdf) -> Result<Artifact, ConversionError> {
        let pdfium = self.pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(&pdf.bytes, None)
            .map_err(|e| ConversionError::Render(format!("{:?}", e)))?;

        let page = document
            .pages()
            .get(0)
            .map_err(|e| ConversionError::Render(format!("{:?}", e)))?;

        let render_config =
            PdfRenderConfig::new().scale_page_by_factor(self.image_dpi as f32 / POINTS_PER_INCH);
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| ConversionError::Render(format!("{:?}", e)))?;

        let image = bitmap.as_image();
        debug!(
            "Rendered first page: {}x{} px at {} dpi",
            image.width(),
            image.height(),
            self.image_dpi
        );

        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
        let mut out = Cursor::new(Vec::new());
        rgb.write_to(&mut out, ImageFormat::Jpeg)?;

        Ok(Artifact {
            bytes: out.into_inner(),
            content_type: "image/jpeg",
        })
    }

    fn pdfium(&self) -> Result<&Pdfium, ConversionError> {
        if let Some(pdfium) = self.pdfium.get() {
            return Ok(pdfium);
        }

        let pdfium = self.bind_pdfium()?;
        info!("Bound pdfium library");
        Ok(self.pdfium.get_or_init(|| pdfium))
    }

    fn bind_pdfium(&self) -> Result<Pdfium, ConversionError> {
        let bindings = match &self.pdfium_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| ConversionError::Library(format!("{:?}", e)))?;

        Ok(Pdfium::new(bindings))
    }
}

impl Default for PdfConverter {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_DPI, None)
    }
}

impl DocumentConverter for PdfConverter {
    fn convert(&self, action: Action, pdf: &SourcePdf) -> Result<Artifact, ConversionError> {
        info!("Converting document: action={}, pages={}", action, pdf.page_count);

        let artifact = match action {
            Action::ToImage => self.to_image(pdf)?,
            Action::ToHtml => self.to_html(pdf)?,
            Action::ToText => self.to_text(pdf)?,
        };

        info!(
            "Conversion complete: action={}, bytes={}",
            action,
            artifact.bytes.len()
        );
        Ok(artifact)
    }
}

/// Text of every page, in page order.
fn extract_pages(pdf: &SourcePdf) -> Result<Vec<String>, ConversionError> {
    let doc = lopdf::Document::load_mem(&pdf.bytes)?;

    doc.get_pages()
        .keys()
        .map(|&page_num| doc.extract_text(&[page_num]).map_err(ConversionError::from))
        .collect()
}

fn render_html(pages: &[String]) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n</head>\n<body>\n",
    );

    for page in pages {
        html.push_str("<div class=\"page\">\n");
        for line in page.lines().map(str::trim).filter(|l| !l.is_empty()) {
            html.push_str("<p>");
            html.push_str(&escape_html(line));
            html.push_str("</p>\n");
        }
        html.push_str("</div>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::tests::sample_pdf;
    use bytes::Bytes;

    fn source(pages: &[&str]) -> SourcePdf {
        SourcePdf::parse("http://x/doc.pdf", Bytes::from(sample_pdf(pages))).unwrap()
    }

    #[test]
    fn test_convert_to_text() {
        let converter = PdfConverter::default();
        let artifact = converter.convert(Action::ToText, &source(&["Hello"])).unwrap();

        assert_eq!(artifact.content_type, "text/plain; charset=utf-8");
        let text = String::from_utf8(artifact.bytes).unwrap();
        assert!(text.contains("Hello"));
    }

    #[test]
    fn test_text_keeps_page_order() {
        let converter = PdfConverter::default();
        let artifact = converter
            .convert(Action::ToText, &source(&["First", "Second"]))
            .unwrap();

        let text = String::from_utf8(artifact.bytes).unwrap();
        let first = text.find("First").unwrap();
        let second = text.find("Second").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_convert_to_html() {
        let converter = PdfConverter::default();
        let artifact = converter
            .convert(Action::ToHtml, &source(&["Fish & Chips", "Page two"]))
            .unwrap();

        assert_eq!(artifact.content_type, "text/html; charset=utf-8");
        let html = String::from_utf8(artifact.bytes).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("Fish &amp; Chips"));
        assert_eq!(html.matches("<div class=\"page\">").count(), 2);
    }

    #[test]
    fn test_render_html_skips_blank_lines() {
        let html = render_html(&["a\n\n  \n<b>".to_string()]);
        assert!(html.contains("<p>a</p>\n<p>&lt;b&gt;</p>\n"));
        assert_eq!(html.matches("<p>").count(), 2);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }

    #[test]
    fn test_missing_pdfium_is_library_error() {
        let converter = PdfConverter::new(DEFAULT_IMAGE_DPI, Some("/nonexistent/pdfium".to_string()));
        let err = converter.convert(Action::ToImage, &source(&["Hello"])).unwrap_err();

        assert!(matches!(err, ConversionError::Library(_)));
    }

    #[test]
    fn test_failed_bind_is_retried() {
        let converter = PdfConverter::new(DEFAULT_IMAGE_DPI, Some("/nonexistent/pdfium".to_string()));

        for _ in 0..2 {
            let err = converter.convert(Action::ToImage, &source(&["Hello"])).unwrap_err();
            assert!(matches!(err, ConversionError::Library(_)));
            assert!(converter.pdfium.get().is_none());
        }
        assert!(format!("{:?}", converter).contains("pdfium_bound: false"));
    }

    // Requires libpdfium in ./ or on the system library path.
    #[test]
    #[ignore]
    fn test_convert_to_image() {
        let converter = PdfConverter::default();
        let artifact = converter.convert(Action::ToImage, &source(&["Hello"])).unwrap();

        assert_eq!(artifact.content_type, "image/jpeg");
        // JPEG SOI marker
        assert_eq!(&artifact.bytes[..2], &[0xFF, 0xD8]);

        let image = image::load_from_memory(&artifact.bytes).unwrap();
        // Letter page at 256 dpi
        assert_eq!(image.width(), (612.0 * 256.0 / 72.0_f32).round() as u32);

        // Second render reuses the bound library
        assert!(converter.pdfium.get().is_some());
        let again = converter.convert(Action::ToImage, &source(&["Again"])).unwrap();
        assert_eq!(&again.bytes[..2], &[0xFF, 0xD8]);
    }
}
