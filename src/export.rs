//! Client side of an export: either rasterize the live canvas or hand the
//! parameters to the server for a parametric redraw.

use std::fmt;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};

use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;

use crate::model::PosterParameters;
use crate::service::ExportService;
use crate::viewport::{CanvasPresentation, ViewportController};
use crate::wire::{ExportResponse, ExportSubmission, encode_data_uri};

/// Raster multiplier over natural canvas pixels.
pub const CAPTURE_SCALE: f32 = 3.0;
pub const CAPTURE_JPEG_QUALITY: u8 = 98;

const UNKNOWN_SERVER_ERROR: &str = "Unknown error generating the PDF.";
const COMMUNICATION_ERROR: &str = "Error communicating with the server.";
const CAPTURE_ERROR: &str = "Error capturing the poster image.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportStrategy {
    Capture,
    Parametric,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportError {
    /// Another export of this session is still running.
    Busy,
    /// Rasterizing failed or produced nothing; no request was sent.
    Capture(String),
    /// The request never produced a usable response.
    Communication(String),
    /// The server answered with a failure.
    Server(String),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Busy => write!(f, "An export is already in progress."),
            ExportError::Capture(detail) => write!(f, "{CAPTURE_ERROR} ({detail})"),
            ExportError::Communication(_) => write!(f, "{COMMUNICATION_ERROR}"),
            ExportError::Server(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ExportError {}

/// The rendered canvas as the client sees it.
pub trait CaptureSurface {
    fn presentation(&self) -> CanvasPresentation;
    fn apply_presentation(&mut self, presentation: CanvasPresentation);
    /// Rasterize the canvas at `scale` times its natural pixel size.
    fn rasterize(&mut self, scale: f32) -> Result<RgbImage, String>;
}

/// A canvas that was already rendered to a bitmap at natural size, e.g. by
/// a headless browser. Rasterizing resamples it.
pub struct StillSurface {
    page: RgbImage,
    presentation: CanvasPresentation,
}

impl StillSurface {
    pub fn new(page: RgbImage) -> Self {
        Self {
            page,
            presentation: CanvasPresentation::stripped(),
        }
    }
}

impl CaptureSurface for StillSurface {
    fn presentation(&self) -> CanvasPresentation {
        self.presentation
    }

    fn apply_presentation(&mut self, presentation: CanvasPresentation) {
        self.presentation = presentation;
    }

    fn rasterize(&mut self, scale: f32) -> Result<RgbImage, String> {
        if self.presentation != CanvasPresentation::stripped() {
            return Err("canvas still carries presentation transforms".into());
        }
        let w = (self.page.width() as f32 * scale).round() as u32;
        let h = (self.page.height() as f32 * scale).round() as u32;
        if w == 0 || h == 0 {
            return Err("empty canvas".into());
        }
        Ok(image::imageops::resize(
            &self.page,
            w,
            h,
            image::imageops::FilterType::Triangle,
        ))
    }
}

pub trait ExportTransport {
    /// `Err` carries transport-level detail only (connection, malformed body).
    fn submit(&self, submission: &ExportSubmission) -> Result<ExportResponse, String>;
}

/// Hands submissions straight to an in-process service.
pub struct LocalTransport<'a> {
    service: &'a ExportService,
}

impl<'a> LocalTransport<'a> {
    pub fn new(service: &'a ExportService) -> Self {
        Self { service }
    }
}

impl ExportTransport for LocalTransport<'_> {
    fn submit(&self, submission: &ExportSubmission) -> Result<ExportResponse, String> {
        // Round-trip through JSON so the wire shape is what gets exercised.
        let body = serde_json::to_vec(submission).map_err(|e| e.to_string())?;
        let decoded: ExportSubmission = serde_json::from_slice(&body).map_err(|e| e.to_string())?;
        Ok(self.service.handle(&decoded))
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One per editing session. Only one export runs at a time; the busy flag
/// is cleared however the export ends.
pub struct Exporter<T: ExportTransport> {
    transport: T,
    post_id: u64,
    auth_token: String,
    busy: AtomicBool,
}

impl<T: ExportTransport> Exporter<T> {
    pub fn new(transport: T, post_id: u64, auth_token: impl Into<String>) -> Self {
        Self {
            transport,
            post_id,
            auth_token: auth_token.into(),
            busy: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn acquire(&self) -> Result<BusyGuard<'_>, ExportError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ExportError::Busy)?;
        Ok(BusyGuard(&self.busy))
    }

    /// Run one export and return the document URL.
    pub fn export(
        &self,
        strategy: ExportStrategy,
        params: &PosterParameters,
        viewport: &mut ViewportController,
        surface: &mut dyn CaptureSurface,
    ) -> Result<String, ExportError> {
        let _guard = self.acquire()?;
        let t0 = std::time::Instant::now();

        let image_data = match strategy {
            ExportStrategy::Capture => Some(capture_data_uri(viewport, surface)?),
            ExportStrategy::Parametric => None,
        };
        let t_capture = t0.elapsed();

        let submission = ExportSubmission {
            post_id: serde_json::Value::from(self.post_id),
            auth_token: self.auth_token.clone(),
            parameters: params.clone(),
            image_data,
        };
        let response = self.transport.submit(&submission).map_err(|detail| {
            log::error!("Export transport failed: {detail}");
            ExportError::Communication(detail)
        })?;

        log::info!(
            "Export {strategy:?}: capture={:.1}ms, submit={:.1}ms",
            t_capture.as_secs_f64() * 1000.0,
            (t0.elapsed() - t_capture).as_secs_f64() * 1000.0,
        );

        match response {
            ExportResponse {
                success: true,
                url: Some(url),
                ..
            } => Ok(url),
            ExportResponse { message, .. } => Err(ExportError::Server(
                message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| UNKNOWN_SERVER_ERROR.to_string()),
            )),
        }
    }
}

/// Rasterize the page 1:1 without any presentation, then put the view back
/// exactly as it was, whether or not the capture worked.
pub fn capture_page(
    viewport: &mut ViewportController,
    surface: &mut dyn CaptureSurface,
) -> Result<RgbImage, ExportError> {
    let saved_zoom = viewport.user_zoom();
    let saved_presentation = surface.presentation();

    viewport.reset_zoom();
    surface.apply_presentation(CanvasPresentation::stripped());
    let raster = surface.rasterize(CAPTURE_SCALE);

    viewport.restore_zoom(saved_zoom);
    surface.apply_presentation(saved_presentation);

    let raster = raster.map_err(ExportError::Capture)?;
    if raster.width() == 0 || raster.height() == 0 {
        return Err(ExportError::Capture("capture produced no data".into()));
    }
    Ok(raster)
}

fn capture_data_uri(
    viewport: &mut ViewportController,
    surface: &mut dyn CaptureSurface,
) -> Result<String, ExportError> {
    let raster = capture_page(viewport, surface)?;
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(Cursor::new(&mut jpeg), CAPTURE_JPEG_QUALITY)
        .encode_image(&raster)
        .map_err(|e| ExportError::Capture(e.to_string()))?;
    log::debug!(
        "Captured {}x{} px, {} bytes JPEG",
        raster.width(),
        raster.height(),
        jpeg.len()
    );
    Ok(encode_data_uri("image/jpeg", &jpeg))
}
