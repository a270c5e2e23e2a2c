use crate::config::ExtractionConfig;
use crate::error::IngestError;
use crate::models::{ExtractedDocument, Outcome, Page, PageText, SkippedPage, TextSource};
use crate::ocr::OcrEngine;
use crate::pdf::{to_rgb, LopdfPages, PdfPages};
use std::path::Path;
use tracing::{debug, info, warn};

/// Per-page text extraction with an OCR fallback for pages that carry
/// too little selectable text.
pub struct PageExtractor<O> {
    config: ExtractionConfig,
    ocr: O,
}

impl<O: OcrEngine> PageExtractor<O> {
    pub fn new(config: ExtractionConfig, ocr: O) -> Self {
        Self { config, ocr }
    }

    /// Open `path` and extract it. Failing to open is the only fatal case.
    pub fn extract_path(&self, path: &Path) -> Result<ExtractedDocument, IngestError> {
        let pages = LopdfPages::open(path)?;
        let document = self.extract(&pages);
        info!(
            path = %path.display(),
            pages = document.page_count,
            ocr_pages = document.ocr_pages(),
            skipped_pages = document.skipped.len(),
            "extracted pdf text"
        );
        Ok(document)
    }

    /// Walk the pages in order. Page-level failures are recorded and skipped.
    pub fn extract(&self, pdf: &dyn PdfPages) -> ExtractedDocument {
        let page_count = pdf.page_count();
        let mut document = ExtractedDocument {
            page_count,
            ..ExtractedDocument::default()
        };

        for index in 0..page_count {
            match self.extract_page(pdf, index) {
                Ok(page) => {
                    if page.text.value().is_empty() {
                        debug!(page = index, "page produced no text after extraction and ocr");
                    }
                    document.pages.push(page);
                }
                Err(error) => {
                    warn!(page = index, %error, "skipping page");
                    document.skipped.push(SkippedPage {
                        index,
                        reason: error.to_string(),
                    });
                }
            }
        }

        debug!(chars = document.full_text().chars().count(), "joined page texts");
        document
    }

    fn extract_page(&self, pdf: &dyn PdfPages, index: usize) -> Result<PageText, IngestError> {
        let page = Page {
            index,
            text: pdf.page_text(index)?.trim().to_string(),
        };

        if !page.needs_ocr(self.config.min_text_chars) {
            return Ok(PageText {
                index,
                source: TextSource::Selectable,
                text: Outcome::Primary(page.text),
            });
        }

        if !self.ocr.enabled() {
            return Ok(PageText::fallback(page, "ocr disabled"));
        }

        debug!(page = index, chars = page.trimmed_len(), "text too short, running ocr");
        let image = match pdf.render_page(index, self.config.render_scale) {
            Ok(image) => image,
            Err(error) => {
                warn!(page = index, %error, "render failed, keeping selectable text");
                return Ok(PageText::fallback(page, error.to_string()));
            }
        };

        match self.ocr.recognize(&to_rgb(image)) {
            Ok(recognized) => {
                let recognized = recognized.trim();
                if recognized.is_empty() {
                    debug!(page = index, "ocr produced no text");
                    Ok(PageText::fallback(page, "ocr produced no text"))
                } else {
                    debug!(page = index, chars = recognized.chars().count(), "ocr produced text");
                    Ok(PageText {
                        index,
                        source: TextSource::Ocr,
                        text: Outcome::Primary(recognized.to_string()),
                    })
                }
            }
            Err(error) => {
                warn!(page = index, %error, "ocr failed, keeping selectable text");
                Ok(PageText::fallback(page, error.to_string()))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage, RgbaImage};
    use std::cell::RefCell;

    pub(crate) enum FakePage {
        Text(String),
        Unreadable,
        Unrenderable(String),
    }

    pub(crate) struct FakePdf {
        pub(crate) pages: Vec<FakePage>,
        pub(crate) alpha: bool,
    }

    impl FakePdf {
        pub(crate) fn with_texts(texts: &[&str]) -> Self {
            Self {
                pages: texts
                    .iter()
                    .map(|text| FakePage::Text((*text).to_string()))
                    .collect(),
                alpha: false,
            }
        }
    }

    impl PdfPages for FakePdf {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn page_text(&self, index: usize) -> Result<String, IngestError> {
            match &self.pages[index] {
                FakePage::Text(text) | FakePage::Unrenderable(text) => Ok(text.clone()),
                FakePage::Unreadable => Err(IngestError::PageProcessing {
                    page: index,
                    details: "bad content stream".to_string(),
                }),
            }
        }

        fn render_page(&self, index: usize, scale: f32) -> Result<DynamicImage, IngestError> {
            if let FakePage::Unrenderable(_) = self.pages[index] {
                return Err(IngestError::PageProcessing {
                    page: index,
                    details: "render failed".to_string(),
                });
            }
            let side = (10.0 * scale) as u32;
            Ok(if self.alpha {
                DynamicImage::ImageRgba8(RgbaImage::new(side, side))
            } else {
                DynamicImage::ImageRgb8(RgbImage::new(side, side))
            })
        }
    }

    /// Returns queued answers in order and records what it was shown.
    pub(crate) struct ScriptedOcr {
        answers: RefCell<Vec<Result<String, IngestError>>>,
        pub(crate) seen: RefCell<Vec<(u32, u32, bool)>>,
    }

    impl ScriptedOcr {
        pub(crate) fn new(answers: Vec<Result<String, IngestError>>) -> Self {
            Self {
                answers: RefCell::new(answers.into_iter().rev().collect()),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl OcrEngine for ScriptedOcr {
        fn recognize(&self, image: &DynamicImage) -> Result<String, IngestError> {
            self.seen
                .borrow_mut()
                .push((image.width(), image.height(), image.color().has_alpha()));
            self.answers
                .borrow_mut()
                .pop()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn long_text(word: &str) -> String {
        vec![word; 20].join(" ")
    }

    #[test]
    fn text_native_pages_skip_ocr() {
        let pdf = FakePdf::with_texts(&[&long_text("alpha"), &long_text("beta")]);
        let ocr = ScriptedOcr::new(vec![]);
        let extractor = PageExtractor::new(ExtractionConfig::default(), &ocr);

        let document = extractor.extract(&pdf);

        assert!(ocr.seen.borrow().is_empty());
        assert_eq!(document.pages.len(), 2);
        assert_eq!(
            document.full_text(),
            format!("{}\n\n{}", long_text("alpha"), long_text("beta"))
        );
    }

    #[test]
    fn short_page_is_replaced_by_ocr_text() {
        let pdf = FakePdf::with_texts(&["  tiny  "]);
        let ocr = ScriptedOcr::new(vec![Ok("  recognized invoice text \n".to_string())]);
        let extractor = PageExtractor::new(ExtractionConfig::default(), &ocr);

        let document = extractor.extract(&pdf);

        assert_eq!(document.pages[0].source, TextSource::Ocr);
        assert_eq!(
            document.pages[0].text,
            Outcome::Primary("recognized invoice text".to_string())
        );
        assert_eq!(document.ocr_pages(), 1);
    }

    #[test]
    fn render_uses_configured_scale_and_strips_alpha() {
        let mut pdf = FakePdf::with_texts(&[""]);
        pdf.alpha = true;
        let ocr = ScriptedOcr::new(vec![Ok("text".to_string())]);
        let config = ExtractionConfig {
            render_scale: 3.0,
            ..ExtractionConfig::default()
        };
        PageExtractor::new(config, &ocr).extract(&pdf);

        assert_eq!(ocr.seen.borrow().as_slice(), &[(30, 30, false)]);
    }

    #[test]
    fn empty_ocr_keeps_short_selectable_text() {
        let pdf = FakePdf::with_texts(&["Figure 3"]);
        let ocr = ScriptedOcr::new(vec![Ok("   ".to_string())]);
        let extractor = PageExtractor::new(ExtractionConfig::default(), &ocr);

        let document = extractor.extract(&pdf);

        assert_eq!(document.pages[0].source, TextSource::Selectable);
        assert_eq!(document.pages[0].text.value(), "Figure 3");
        assert_eq!(
            document.pages[0].text.fallback_reason(),
            Some("ocr produced no text")
        );
        assert_eq!(document.full_text(), "Figure 3");
    }

    #[test]
    fn ocr_failure_is_not_fatal() {
        let pdf = FakePdf::with_texts(&["short", "", &long_text("gamma")]);
        let ocr = ScriptedOcr::new(vec![
            Err(IngestError::Ocr("engine crashed".to_string())),
            Err(IngestError::Ocr("engine crashed".to_string())),
        ]);
        let extractor = PageExtractor::new(ExtractionConfig::default(), &ocr);

        let document = extractor.extract(&pdf);

        assert_eq!(document.pages.len(), 3);
        assert!(document.pages[0].text.is_fallback());
        assert_eq!(document.pages[0].text.value(), "short");
        assert_eq!(document.pages[1].text.value(), "");
        assert_eq!(
            document.full_text(),
            format!("short\n\n{}", long_text("gamma"))
        );
    }

    #[test]
    fn unreadable_pages_are_skipped_and_order_is_kept() {
        let pdf = FakePdf {
            pages: vec![
                FakePage::Text(long_text("one")),
                FakePage::Unreadable,
                FakePage::Unrenderable("x".to_string()),
                FakePage::Text(long_text("four")),
            ],
            alpha: false,
        };
        let ocr = ScriptedOcr::new(vec![]);
        let extractor = PageExtractor::new(ExtractionConfig::default(), &ocr);

        let document = extractor.extract(&pdf);

        assert_eq!(document.page_count, 4);
        assert_eq!(
            document.skipped.iter().map(|page| page.index).collect::<Vec<_>>(),
            vec![1]
        );
        assert_eq!(
            document.full_text(),
            format!("{}\n\nx\n\n{}", long_text("one"), long_text("four"))
        );
    }

    #[test]
    fn render_failure_keeps_selectable_text() {
        let pdf = FakePdf {
            pages: vec![FakePage::Unrenderable("Figure 3 caption".to_string())],
            alpha: false,
        };
        let ocr = ScriptedOcr::new(vec![Ok("never used".to_string())]);

        let document = PageExtractor::new(ExtractionConfig::default(), &ocr).extract(&pdf);

        assert!(ocr.seen.borrow().is_empty());
        assert!(document.skipped.is_empty());
        assert_eq!(document.pages[0].source, TextSource::Selectable);
        assert!(document.pages[0].text.is_fallback());
        assert_eq!(document.full_text(), "Figure 3 caption");
    }

    #[test]
    fn disabled_ocr_never_renders_short_pages() {
        let pdf = FakePdf {
            pages: vec![FakePage::Unrenderable("short".to_string())],
            alpha: false,
        };

        let document = PageExtractor::new(ExtractionConfig::default(), crate::ocr::NoOcr).extract(&pdf);

        assert!(document.skipped.is_empty());
        assert_eq!(document.pages[0].text.value(), "short");
        assert_eq!(document.pages[0].text.fallback_reason(), Some("ocr disabled"));
    }

    #[test]
    fn disabled_ocr_keeps_short_text_without_a_renderer() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("caption.pdf");
        crate::pdf::tests::write_text_pdf(&path, &["Figure 3 caption"])?;
        let pages = LopdfPages::open(&path)?.with_renderer("definitely-missing-pdftoppm");

        let document = PageExtractor::new(ExtractionConfig::default(), crate::ocr::NoOcr).extract(&pages);

        assert!(document.skipped.is_empty());
        assert!(document.full_text().contains("Figure 3 caption"));
        Ok(())
    }

    #[test]
    fn threshold_is_configurable() {
        let pdf = FakePdf::with_texts(&["twelve chars"]);
        let ocr = ScriptedOcr::new(vec![Ok("ocr".to_string())]);
        let config = ExtractionConfig {
            min_text_chars: 5,
            ..ExtractionConfig::default()
        };

        let document = PageExtractor::new(config, &ocr).extract(&pdf);

        assert!(ocr.seen.borrow().is_empty());
        assert_eq!(document.full_text(), "twelve chars");
    }

    #[test]
    fn unreadable_path_fails_the_document() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("corrupt.pdf");
        std::fs::write(&path, b"not a pdf at all")?;

        let extractor = PageExtractor::new(ExtractionConfig::default(), crate::ocr::NoOcr);
        assert!(matches!(
            extractor.extract_path(&path),
            Err(IngestError::DocumentUnreadable(_))
        ));
        Ok(())
    }

    #[test]
    fn real_pdf_text_is_extracted_without_ocr() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("manual.pdf");
        let first = "The pump must be primed before start-up to avoid dry running damage.";
        crate::pdf::tests::write_text_pdf(&path, &[first])?;

        let extractor = PageExtractor::new(ExtractionConfig::default(), crate::ocr::NoOcr);
        let document = extractor.extract_path(&path)?;

        assert_eq!(document.page_count, 1);
        assert!(document.full_text().contains("primed before start-up"));
        Ok(())
    }
}
