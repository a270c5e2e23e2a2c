use crate::config::ScanConfig;
use crate::error::IngestError;
use crate::models::Page;
use crate::pdf::{LopdfPages, PdfPages};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanReport {
    pub total_pages: usize,
    pub ocr_needed_pages: usize,
    pub ratio: f64,
    pub scanned: bool,
}

/// Cheap scanned-vs-text-native classification. Never invokes OCR.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanHeuristic {
    config: ScanConfig,
}

impl ScanHeuristic {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn is_scanned(&self, pdf: &dyn PdfPages) -> bool {
        self.report(pdf).scanned
    }

    pub fn is_scanned_path(&self, path: &Path) -> Result<bool, IngestError> {
        Ok(self.report_path(path)?.scanned)
    }

    pub fn report_path(&self, path: &Path) -> Result<ScanReport, IngestError> {
        let pages = LopdfPages::open(path)?;
        Ok(self.report(&pages))
    }

    pub fn report(&self, pdf: &dyn PdfPages) -> ScanReport {
        let total_pages = pdf.page_count();
        if total_pages == 0 {
            return ScanReport {
                total_pages: 0,
                ocr_needed_pages: 0,
                ratio: 0.0,
                scanned: false,
            };
        }

        let ocr_needed_pages = (0..total_pages)
            .filter(|&index| match pdf.page_text(index) {
                Ok(text) => Page { index, text }.needs_ocr(self.config.min_text_chars),
                Err(error) => {
                    // unreadable pages count as needing OCR
                    warn!(page = index, %error, "page text unreadable during scan check");
                    true
                }
            })
            .count();

        let ratio = ocr_needed_pages as f64 / total_pages as f64;
        debug!(ocr_needed_pages, total_pages, ratio, "scan heuristic");

        ScanReport {
            total_pages,
            ocr_needed_pages,
            ratio,
            scanned: ratio > self.config.scanned_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::tests::{FakePage, FakePdf};

    fn text_of(len: usize) -> String {
        "a".repeat(len)
    }

    #[test]
    fn zero_pages_is_not_scanned() {
        let pdf = FakePdf::with_texts(&[]);
        let report = ScanHeuristic::default().report(&pdf);
        assert!(!report.scanned);
        assert_eq!(report.total_pages, 0);
    }

    #[test]
    fn text_native_document_is_not_scanned() {
        let long = text_of(50);
        let pdf = FakePdf::with_texts(&[&long, &long, &long]);
        assert!(!ScanHeuristic::default().is_scanned(&pdf));
    }

    #[test]
    fn all_short_pages_is_scanned() {
        let short = text_of(49);
        let pdf = FakePdf::with_texts(&[&short, "", "   "]);
        let report = ScanHeuristic::default().report(&pdf);
        assert!(report.scanned);
        assert_eq!(report.ocr_needed_pages, 3);
    }

    #[test]
    fn ratio_must_strictly_exceed_threshold() {
        let long = text_of(80);
        let mut texts = vec![long.as_str(); 7];
        texts.extend(["", "", ""]);
        let pdf = FakePdf::with_texts(&texts);

        let at_threshold = ScanHeuristic::default().report(&pdf);
        assert!((at_threshold.ratio - 0.3).abs() < 1e-9);
        assert!(!at_threshold.scanned);

        let lower = ScanHeuristic::new(ScanConfig {
            scanned_ratio: 0.25,
            ..ScanConfig::default()
        });
        assert!(lower.is_scanned(&pdf));
    }

    #[test]
    fn unreadable_pages_count_as_needing_ocr() {
        let pdf = FakePdf {
            pages: vec![
                FakePage::Text(text_of(100)),
                FakePage::Unreadable,
                FakePage::Unreadable,
            ],
            alpha: false,
        };
        let report = ScanHeuristic::default().report(&pdf);
        assert_eq!(report.ocr_needed_pages, 2);
        assert!(report.scanned);
    }

    #[test]
    fn whitespace_padding_does_not_count() {
        let padded = format!("\n\n{}\n\n", text_of(40));
        let pdf = FakePdf::with_texts(&[&padded]);
        assert!(ScanHeuristic::default().is_scanned(&pdf));
    }

    #[test]
    fn pdf_files_are_classified_from_disk() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("brochure.pdf");
        crate::pdf::tests::write_text_pdf(
            &path,
            &[
                "Cover",
                "Chapter one explains how the relief valve is set and tested on site.",
            ],
        )?;

        assert!(ScanHeuristic::default().is_scanned_path(&path)?);

        let corrupt = dir.path().join("corrupt.pdf");
        std::fs::write(&corrupt, b"%PDF-garbage")?;
        assert!(matches!(
            ScanHeuristic::default().is_scanned_path(&corrupt),
            Err(IngestError::DocumentUnreadable(_))
        ));
        Ok(())
    }
}
