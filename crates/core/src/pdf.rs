use crate::error::IngestError;
use image::DynamicImage;
use lopdf::Document;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Page-level access to an opened PDF.
///
/// Page indices are 0-based and stable for the lifetime of the value.
pub trait PdfPages {
    fn page_count(&self) -> usize;

    fn page_text(&self, index: usize) -> Result<String, IngestError>;

    /// Rasterize a page, upscaled by `scale` in both axes.
    fn render_page(&self, index: usize, scale: f32) -> Result<DynamicImage, IngestError>;
}

/// `lopdf` for selectable text, poppler's `pdftoppm` for rasterization.
pub struct LopdfPages {
    document: Document,
    page_numbers: Vec<u32>,
    path: PathBuf,
    renderer: String,
}

impl LopdfPages {
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        let document = Document::load(path).map_err(|error| {
            IngestError::DocumentUnreadable(format!("{}: {error}", path.display()))
        })?;
        let page_numbers = document.get_pages().keys().copied().collect();

        Ok(Self {
            document,
            page_numbers,
            path: path.to_path_buf(),
            renderer: "pdftoppm".to_string(),
        })
    }

    pub fn with_renderer(mut self, binary: impl Into<String>) -> Self {
        self.renderer = binary.into();
        self
    }

    fn page_number(&self, index: usize) -> Result<u32, IngestError> {
        self.page_numbers
            .get(index)
            .copied()
            .ok_or_else(|| IngestError::PageProcessing {
                page: index,
                details: format!("page index out of range (pages={})", self.page_numbers.len()),
            })
    }
}

impl PdfPages for LopdfPages {
    fn page_count(&self) -> usize {
        self.page_numbers.len()
    }

    fn page_text(&self, index: usize) -> Result<String, IngestError> {
        let page_no = self.page_number(index)?;
        self.document
            .extract_text(&[page_no])
            .map_err(|error| IngestError::PageProcessing {
                page: index,
                details: error.to_string(),
            })
    }

    fn render_page(&self, index: usize, scale: f32) -> Result<DynamicImage, IngestError> {
        let page_no = self.page_number(index)?.to_string();
        let dpi = render_dpi(scale).to_string();

        let output = Command::new(&self.renderer)
            .args(["-f", &page_no, "-l", &page_no, "-r", &dpi, "-png", "-singlefile"])
            .arg(&self.path)
            .output()
            .map_err(|error| IngestError::PageProcessing {
                page: index,
                details: format!("failed to run {}: {error}", self.renderer),
            })?;

        if !output.status.success() {
            return Err(IngestError::PageProcessing {
                page: index,
                details: format!(
                    "{} exited with {}: {}",
                    self.renderer,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        image::load_from_memory(&output.stdout).map_err(|error| IngestError::PageProcessing {
            page: index,
            details: format!("rendered page could not be decoded: {error}"),
        })
    }
}

/// PDF user space is 72 units per inch, so a scale maps directly onto DPI.
fn render_dpi(scale: f32) -> u32 {
    (72.0 * scale).round().max(1.0) as u32
}

/// Drop an alpha channel if the renderer produced one.
pub fn to_rgb(image: DynamicImage) -> DynamicImage {
    if image.color().has_alpha() {
        DynamicImage::ImageRgb8(image.to_rgb8())
    } else {
        image
    }
}
