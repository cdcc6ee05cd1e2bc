pub mod config;
mod error;
pub mod export;
pub mod fonts;
pub mod layout;
pub mod model;
pub mod pdf;
pub mod service;
pub mod storage;
pub mod validator;
pub mod viewport;
pub mod wire;

pub use error::Error;

use std::path::Path;
use std::time::Instant;

use crate::layout::TemplateText;
use crate::model::ExportRequest;
use crate::pdf::{DocumentMeta, PosterAssets, RenderReport};

/// Render one poster straight to a file, bypassing the document store.
pub fn render_poster_to_file(
    request: ExportRequest,
    assets: &PosterAssets,
    template: &TemplateText,
    meta: DocumentMeta,
    output: &Path,
) -> Result<RenderReport, Error> {
    let t0 = Instant::now();

    let rendered = pdf::render_poster(request, assets, template, meta)?;
    let t_render = t0.elapsed();

    std::fs::write(output, &rendered.bytes).map_err(Error::Io)?;
    let t_total = t0.elapsed();

    log::info!(
        "Timing: render={:.1}ms, write={:.1}ms, total={:.1}ms (output {} bytes)",
        t_render.as_secs_f64() * 1000.0,
        (t_total - t_render).as_secs_f64() * 1000.0,
        t_total.as_secs_f64() * 1000.0,
        rendered.bytes.len(),
    );

    Ok(rendered.report)
}
