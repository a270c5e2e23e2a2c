use crate::error::IngestError;
use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageFormat};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use std::process::{Command, Stdio};

/// Text-from-image capability.
pub trait OcrEngine {
    fn recognize(&self, image: &DynamicImage) -> Result<String, IngestError>;

    /// A disabled engine is never handed a page, so nothing gets rendered.
    fn enabled(&self) -> bool {
        true
    }
}

impl<T: OcrEngine + ?Sized> OcrEngine for &T {
    fn recognize(&self, image: &DynamicImage) -> Result<String, IngestError> {
        (**self).recognize(image)
    }

    fn enabled(&self) -> bool {
        (**self).enabled()
    }
}

impl<T: OcrEngine + ?Sized> OcrEngine for Box<T> {
    fn recognize(&self, image: &DynamicImage) -> Result<String, IngestError> {
        (**self).recognize(image)
    }

    fn enabled(&self) -> bool {
        (**self).enabled()
    }
}

/// OCR disabled: pages keep their selectable text.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOcr;

impl OcrEngine for NoOcr {
    fn enabled(&self) -> bool {
        false
    }

    fn recognize(&self, _image: &DynamicImage) -> Result<String, IngestError> {
        Err(IngestError::Ocr("ocr is disabled".to_string()))
    }
}

/// Runs the `tesseract` binary, feeding a PNG on stdin.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    pub binary: String,
    pub language: Option<String>,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: None,
        }
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &DynamicImage) -> Result<String, IngestError> {
        let png = encode_png(image)?;

        let mut command = Command::new(&self.binary);
        command.arg("stdin").arg("stdout");
        if let Some(language) = &self.language {
            command.arg("-l").arg(language);
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| IngestError::Ocr(format!("failed to run {}: {error}", self.binary)))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(error) = stdin.write_all(&png) {
                drop(stdin);
                // reap the child before reporting
                let _ = child.kill();
                let _ = child.wait();
                return Err(IngestError::Ocr(format!("failed to feed {}: {error}", self.binary)));
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|error| IngestError::Ocr(format!("{} did not finish: {error}", self.binary)))?;

        if !output.status.success() {
            return Err(IngestError::Ocr(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[derive(Clone)]
pub struct OcrEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for OcrEndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrEndpointConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
struct OcrRequest {
    image_base64: String,
    mime_type: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    pages: Option<Vec<OcrResponsePage>>,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrResponsePage {
    #[serde(default)]
    text: Option<String>,
}

/// Posts each page image to a multimodal OCR endpoint.
pub struct HttpOcr {
    config: OcrEndpointConfig,
    client: Client,
}

impl HttpOcr {
    pub fn new(config: OcrEndpointConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }
}

impl OcrEngine for HttpOcr {
    fn recognize(&self, image: &DynamicImage) -> Result<String, IngestError> {
        let payload = OcrRequest {
            image_base64: STANDARD.encode(encode_png(image)?),
            mime_type: "image/png",
        };

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .header("content-type", "application/json")
            .json(&payload);

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;
        if !response.status().is_success() {
            return Err(IngestError::Ocr(format!(
                "ocr request to {} returned {}",
                self.config.endpoint,
                response.status()
            )));
        }

        let payload: OcrResponse = response.json()?;
        Ok(response_text(payload))
    }
}

fn response_text(payload: OcrResponse) -> String {
    if let Some(text) = payload.text.filter(|text| !text.trim().is_empty()) {
        return text;
    }

    payload
        .pages
        .unwrap_or_default()
        .into_iter()
        .filter_map(|page| page.text)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, IngestError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|error| IngestError::Ocr(format!("page image could not be encoded: {error}")))?;
    Ok(buffer.into_inner())
}
