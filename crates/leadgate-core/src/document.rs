//! Personalized document rendering and delivery collaborators.
//!
//! After a successful registration on a segment whose policy delivers a
//! document, a [`DocumentRenderer`] produces the artifact for the segment
//! attribute (the clinic name) and a [`DocumentMailer`] sends it.

use crate::error::{DeliveryError, RenderError};

/// A4 portrait, in PDF points.
const PAGE_WIDTH: f64 = 595.0;
const PAGE_HEIGHT: f64 = 842.0;
const MARGIN: f64 = 40.0;
const NAME_FONT_SIZE: f64 = 40.0;
const NAME_MIN_FONT_SIZE: f64 = 14.0;
/// Rough Helvetica-Bold advance width per glyph, in em.
const BOLD_GLYPH_EM: f64 = 0.58;
const REGULAR_GLYPH_EM: f64 = 0.5;
const WATERMARK_FONT_SIZE: f64 = 7.0;
const WATERMARK_X: f64 = 50.0;
const WATERMARK_Y: f64 = 20.0;

/// Produces a personalized artifact for a name.
#[async_trait::async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Render the document for `name`.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if the document cannot be produced.
    async fn render(&self, name: &str) -> Result<Vec<u8>, RenderError>;

    /// Render the document for `name` with a tracking line identifying the
    /// recipient. Renderers without watermark support return the plain
    /// document.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if the document cannot be produced.
    async fn render_watermarked(&self, name: &str, watermark: &str) -> Result<Vec<u8>, RenderError> {
        let _ = watermark;
        self.render(name).await
    }

    /// Attachment file name for `name`.
    fn file_name(&self, name: &str) -> String {
        format!("document-{}.pdf", sanitize_file_stem(name))
    }

    /// MIME type of rendered documents.
    fn content_type(&self) -> &'static str {
        "application/pdf"
    }
}

/// Sends a rendered document to a subscriber.
#[async_trait::async_trait]
pub trait DocumentMailer: Send + Sync {
    /// Deliver `document` to `email` as an attachment called `file_name`.
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] when the delivery provider fails.
    async fn deliver(
        &self,
        email: &str,
        recipient_name: &str,
        file_name: &str,
        document: &[u8],
    ) -> Result<(), DeliveryError>;
}

/// Renders a single-page PDF with the name centred on it.
///
/// The output is self-contained: base-14 fonts only, no template file.
#[derive(Debug, Clone)]
pub struct PdfCardRenderer {
    heading: String,
    footer: String,
    file_prefix: String,
}

impl PdfCardRenderer {
    #[must_use]
    pub fn new(
        heading: impl Into<String>,
        footer: impl Into<String>,
        file_prefix: impl Into<String>,
    ) -> Self {
        Self {
            heading: heading.into(),
            footer: footer.into(),
            file_prefix: file_prefix.into(),
        }
    }

    fn build(&self, name: &str, watermark: Option<&str>) -> Vec<u8> {
        let name_len = name.chars().count().max(1);
        #[allow(clippy::cast_precision_loss)]
        let glyphs = name_len as f64;
        let usable = PAGE_WIDTH - 2.0 * MARGIN;
        let name_size = (usable / (glyphs * BOLD_GLYPH_EM)).clamp(NAME_MIN_FONT_SIZE, NAME_FONT_SIZE);

        let mut content = Vec::new();
        content.extend(centred_text("F2", 16.0, REGULAR_GLYPH_EM, PAGE_HEIGHT - 200.0, &self.heading));
        content.extend(centred_text("F1", name_size, BOLD_GLYPH_EM, PAGE_HEIGHT / 2.0, name));
        content.extend(centred_text("F2", 9.0, REGULAR_GLYPH_EM, MARGIN, &self.footer));
        if let Some(watermark) = watermark {
            content.extend(watermark_text(watermark));
        }

        let objects: Vec<Vec<u8>> = vec![
            b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
            b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_vec(),
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
                 /Resources << /Font << /F1 4 0 R /F2 5 0 R >> >> /Contents 6 0 R >>"
            )
            .into_bytes(),
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
                .to_vec(),
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_vec(),
            {
                let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
                stream.extend_from_slice(&content);
                stream.extend_from_slice(b"\nendstream");
                stream
            },
        ];

        let mut out: Vec<u8> = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (index, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend(format!("{} 0 obj\n", index + 1).into_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }

        let xref_at = out.len();
        out.extend(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).into_bytes());
        for offset in offsets {
            out.extend(format!("{offset:010} 00000 n \n").into_bytes());
        }
        out.extend(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
                objects.len() + 1
            )
            .into_bytes(),
        );
        out
    }
}

impl Default for PdfCardRenderer {
    fn default() -> Self {
        Self::new(
            "Material de apoio para momentos difíceis",
            "Material personalizado. Distribuição exclusiva da clínica indicada.",
            "material-apoio",
        )
    }
}

#[async_trait::async_trait]
impl DocumentRenderer for PdfCardRenderer {
    async fn render(&self, name: &str) -> Result<Vec<u8>, RenderError> {
        Ok(self.build(checked_name(name)?, None))
    }

    async fn render_watermarked(&self, name: &str, watermark: &str) -> Result<Vec<u8>, RenderError> {
        let watermark = watermark.trim();
        let watermark = (!watermark.is_empty()).then_some(watermark);
        Ok(self.build(checked_name(name)?, watermark))
    }

    fn file_name(&self, name: &str) -> String {
        let stem = sanitize_file_stem(name);
        if stem.is_empty() {
            format!("{}.pdf", self.file_prefix)
        } else {
            format!("{}-{stem}.pdf", self.file_prefix)
        }
    }
}

fn checked_name(name: &str) -> Result<&str, RenderError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RenderError::InvalidName {
            reason: "name is empty".to_owned(),
        });
    }
    Ok(name)
}

/// Small light-grey line in the bottom-left corner.
fn watermark_text(text: &str) -> Vec<u8> {
    let mut out = format!(
        "q 0.7 g BT /F2 {WATERMARK_FONT_SIZE:.2} Tf {WATERMARK_X:.2} {WATERMARK_Y:.2} Td ("
    )
    .into_bytes();
    out.extend(pdf_string(text));
    out.extend_from_slice(b") Tj ET Q\n");
    out
}

/// One horizontally centred text line as a content-stream fragment.
fn centred_text(font: &str, size: f64, glyph_em: f64, y: f64, text: &str) -> Vec<u8> {
    #[allow(clippy::cast_precision_loss)]
    let width = text.chars().count() as f64 * size * glyph_em;
    let x = ((PAGE_WIDTH - width) / 2.0).max(MARGIN / 2.0);
    let mut out = format!("BT /{font} {size:.2} Tf {x:.2} {y:.2} Td (").into_bytes();
    out.extend(pdf_string(text));
    out.extend_from_slice(b") Tj ET\n");
    out
}

/// Encode text for a PDF literal string under `WinAnsiEncoding`.
///
/// Printable ASCII and Latin-1 letters map directly; anything else becomes
/// `?`. Delimiters are backslash-escaped.
#[allow(clippy::cast_possible_truncation)]
fn pdf_string(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        let code = u32::from(c);
        match c {
            '(' | ')' | '\\' => {
                out.push(b'\\');
                out.push(code as u8);
            }
            _ if (0x20..=0x7E).contains(&code) || (0xA0..=0xFF).contains(&code) => {
                out.push(code as u8);
            }
            _ => out.push(b'?'),
        }
    }
    out
}

/// Lower-case ASCII file stem: diacritics folded, everything outside
/// `[a-z0-9-]` replaced by `-`, runs collapsed, trimmed, at most 50 chars.
#[must_use]
pub fn sanitize_file_stem(name: &str) -> String {
    let mut stem = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase).map(fold_diacritic) {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' };
        if c == '-' && (stem.is_empty() || stem.ends_with('-')) {
            continue;
        }
        stem.push(c);
    }
    let mut stem: String = stem.chars().take(50).collect();
    while stem.ends_with('-') {
        stem.pop();
    }
    stem
}

fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[tokio::test]
    async fn renders_pdf_with_name() {
        let renderer = PdfCardRenderer::default();
        let pdf = renderer.render("Clínica RosaVet").await.unwrap();
        assert!(pdf.starts_with(b"%PDF-1.4"));
        assert!(pdf.ends_with(b"%%EOF\n"));
        // 'í' is 0xED in WinAnsi.
        assert!(contains(&pdf, b"(Cl\xEDnica RosaVet) Tj"));
    }

    #[tokio::test]
    async fn xref_offsets_point_at_objects() {
        let pdf = PdfCardRenderer::default().render("RosaVet").await.unwrap();
        let tail_at = pdf.windows(10).rposition(|w| w == b"startxref\n").unwrap() + 10;
        let xref_at: usize = std::str::from_utf8(&pdf[tail_at..])
            .unwrap()
            .lines()
            .next()
            .unwrap()
            .parse()
            .unwrap();
        assert!(pdf[xref_at..].starts_with(b"xref\n"));

        let entries: Vec<usize> = std::str::from_utf8(&pdf[xref_at..])
            .unwrap()
            .lines()
            .skip(3)
            .take(6)
            .map(|l| l[..10].parse().unwrap())
            .collect();
        assert_eq!(entries.len(), 6);
        for (i, offset) in entries.into_iter().enumerate() {
            let header = format!("{} 0 obj", i + 1);
            assert!(pdf[offset..].starts_with(header.as_bytes()), "object {}", i + 1);
        }
    }

    #[tokio::test]
    async fn watermark_is_stamped_only_when_asked() {
        let renderer = PdfCardRenderer::default();
        let stamp = "RosaVet | ana@example.com | 2026-10-16";

        let marked = renderer.render_watermarked("RosaVet", stamp).await.unwrap();
        assert!(contains(&marked, b"(RosaVet | ana@example.com | 2026-10-16) Tj"));
        assert!(contains(&marked, b"0.7 g"));

        let plain = renderer.render("RosaVet").await.unwrap();
        assert!(!contains(&plain, b"ana@example.com"));
        assert!(!contains(&plain, b"0.7 g"));

        let blank = renderer.render_watermarked("RosaVet", "  ").await.unwrap();
        assert_eq!(blank, plain);
    }

    #[tokio::test]
    async fn watermarked_xref_stays_valid() {
        let pdf = PdfCardRenderer::default()
            .render_watermarked("RosaVet", "RosaVet | a@example.com | 2026-10-16")
            .await
            .unwrap();
        let tail_at = pdf.windows(10).rposition(|w| w == b"startxref\n").unwrap() + 10;
        let xref_at: usize = std::str::from_utf8(&pdf[tail_at..])
            .unwrap()
            .lines()
            .next()
            .unwrap()
            .parse()
            .unwrap();
        assert!(pdf[xref_at..].starts_with(b"xref\n"));
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let err = PdfCardRenderer::default().render("  ").await.unwrap_err();
        assert!(matches!(err, RenderError::InvalidName { .. }));
    }

    #[test]
    fn pdf_string_escapes_delimiters() {
        assert_eq!(pdf_string(r"a(b)c\d"), br"a\(b\)c\\d".to_vec());
        assert_eq!(pdf_string("猫"), b"?".to_vec());
    }

    #[test]
    fn file_stem_is_sanitized() {
        assert_eq!(sanitize_file_stem("Clínica São Francisco"), "clinica-sao-francisco");
        assert_eq!(sanitize_file_stem("  --Pet's  Care.  "), "pet-s-care");
        assert_eq!(sanitize_file_stem(&"a".repeat(80)).len(), 50);
        assert_eq!(sanitize_file_stem("!!!"), "");
    }

    #[test]
    fn file_name_uses_prefix() {
        let r = PdfCardRenderer::default();
        assert_eq!(r.file_name("RosaVet"), "material-apoio-rosavet.pdf");
        assert_eq!(r.file_name("???"), "material-apoio.pdf");
    }
}
