mod images;
mod qr;
mod text;

use std::collections::HashSet;

use pdf_writer::{Content, Filter, Name, Pdf, Rect as PdfRect, Ref, TextStr};
use serde::Serialize;

use crate::error::Error;
use crate::fonts::{FontSet, RegisteredFonts, TextMeasure};
use crate::layout::{
    BRAND_MAROON, BRANDING_GREY, PT_PER_MM, PosterLayout, Rect, SEPARATOR_GREY, TemplateText,
    TextBlock,
};
use crate::model::{EmbeddedImage, ExportRequest, PageSize};

pub use images::{decode_image, load_image_file};
pub use qr::QrMatrix;

/// Aspect mismatch between a capture and the page that is worth a warning.
const ASPECT_TOLERANCE: f32 = 0.01;

/// Assets resolved by the caller for a parametric render.
#[derive(Clone, Default)]
pub struct PosterAssets {
    pub featured_image: Option<EmbeddedImage>,
    pub logo: Option<EmbeddedImage>,
    /// Link encoded in the QR code; `None` hides the QR.
    pub qr_target: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct DocumentMeta {
    pub title: String,
    pub author: String,
    pub creator: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RenderStage {
    Initialized,
    PageSized,
    ImageBandDrawn,
    BodyDrawn,
    BrandingDrawn,
    Finalized,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RenderStrategy {
    Captured,
    Parametric,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ElementKind {
    FullPageImage,
    Image,
    Title,
    Date,
    Rule,
    Details,
    Separator,
    InfoHeading,
    Info,
    Qr,
    OrganizerLabel,
    Logo,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DrawnElement {
    pub kind: ElementKind,
    /// Top-left millimetres, same frame as `PosterLayout`.
    pub rect: Rect,
}

/// What ended up on the page, for callers that need to check placement
/// without parsing the PDF back.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RenderReport {
    pub page_size: PageSize,
    pub page_mm: (f32, f32),
    pub strategy: RenderStrategy,
    pub elements: Vec<DrawnElement>,
    pub title_lines: Vec<String>,
    pub qr_drawn: bool,
    pub logo_drawn: bool,
}

impl RenderReport {
    pub fn element(&self, kind: ElementKind) -> Option<Rect> {
        self.elements.iter().find(|e| e.kind == kind).map(|e| e.rect)
    }
}

pub struct RenderedPoster {
    pub bytes: Vec<u8>,
    pub report: RenderReport,
}

/// Single-page poster writer. Drawing happens in a fixed order; calling a
/// step out of turn fails instead of producing a half-drawn page.
pub struct PosterRenderer {
    pdf: Pdf,
    next_id: i32,
    content: Content,
    stage: RenderStage,
    page_size: PageSize,
    fonts: Option<RegisteredFonts>,
    xobjects: Vec<(String, Ref)>,
    meta: DocumentMeta,
    report: RenderReport,
}

impl PosterRenderer {
    pub fn new(meta: DocumentMeta) -> Self {
        Self {
            pdf: Pdf::new(),
            next_id: 1,
            content: Content::new(),
            stage: RenderStage::Initialized,
            page_size: PageSize::A4,
            fonts: None,
            xobjects: Vec::new(),
            meta,
            report: RenderReport {
                page_size: PageSize::A4,
                page_mm: PageSize::A4.dimensions_mm(),
                strategy: RenderStrategy::Parametric,
                elements: Vec::new(),
                title_lines: Vec::new(),
                qr_drawn: false,
                logo_drawn: false,
            },
        }
    }

    pub fn stage(&self) -> RenderStage {
        self.stage
    }

    fn advance(&mut self, expected: RenderStage, next: RenderStage) -> Result<(), Error> {
        if self.stage != expected {
            return Err(Error::Render(format!(
                "cannot move to {next:?} from {:?}",
                self.stage
            )));
        }
        self.stage = next;
        Ok(())
    }

    fn alloc(&mut self) -> Ref {
        let r = Ref::new(self.next_id);
        self.next_id += 1;
        r
    }

    fn page_height_mm(&self) -> f32 {
        self.page_size.height_mm()
    }

    fn record(&mut self, kind: ElementKind, rect: Rect) {
        self.report.elements.push(DrawnElement { kind, rect });
    }

    fn embed(&mut self, img: &EmbeddedImage) -> Result<String, Error> {
        let next_id = &mut self.next_id;
        let mut alloc = || {
            let r = Ref::new(*next_id);
            *next_id += 1;
            r
        };
        let xobj_ref = images::embed_image(&mut self.pdf, &mut alloc, img)?;
        let name = format!("Im{}", self.xobjects.len() + 1);
        self.xobjects.push((name.clone(), xobj_ref));
        Ok(name)
    }

    /// Paint a registered image XObject into `rect` (top-left mm).
    fn place_image(&mut self, name: &str, rect: Rect) {
        let y_pt = (self.page_height_mm() - rect.y - rect.height) * PT_PER_MM;
        self.content.save_state();
        self.content.transform([
            rect.width * PT_PER_MM,
            0.0,
            0.0,
            rect.height * PT_PER_MM,
            rect.x * PT_PER_MM,
            y_pt,
        ]);
        self.content.x_object(Name(name.as_bytes()));
        self.content.restore_state();
    }

    fn fill_rect(&mut self, rect: Rect, color: [u8; 3]) {
        let y_pt = (self.page_height_mm() - rect.y - rect.height) * PT_PER_MM;
        self.content.save_state();
        text::set_fill(&mut self.content, color);
        self.content.rect(
            rect.x * PT_PER_MM,
            y_pt,
            rect.width * PT_PER_MM,
            rect.height * PT_PER_MM,
        );
        self.content.fill_nonzero();
        self.content.restore_state();
    }

    pub fn size_page(&mut self, page_size: PageSize) -> Result<(), Error> {
        self.advance(RenderStage::Initialized, RenderStage::PageSized)?;
        self.page_size = page_size;
        self.report.page_size = page_size;
        self.report.page_mm = page_size.dimensions_mm();
        Ok(())
    }

    /// Captured strategy: the whole page is the client's raster. Completes
    /// every drawing stage at once.
    pub fn draw_full_page_image(&mut self, img: &EmbeddedImage) -> Result<(), Error> {
        self.advance(RenderStage::PageSized, RenderStage::BrandingDrawn)?;
        self.report.strategy = RenderStrategy::Captured;

        let (page_w, page_h) = self.page_size.dimensions_mm();
        if img.pixel_width > 0 && img.pixel_height > 0 {
            let img_aspect = img.pixel_height as f32 / img.pixel_width as f32;
            let page_aspect = page_h / page_w;
            if (img_aspect / page_aspect - 1.0).abs() > ASPECT_TOLERANCE {
                log::warn!(
                    "Captured image {}x{} does not match {} proportions, stretching to fit",
                    img.pixel_width,
                    img.pixel_height,
                    self.page_size.as_str()
                );
            }
        }

        let name = self.embed(img)?;
        let page = Rect::new(0.0, 0.0, page_w, page_h);
        self.place_image(&name, page);
        self.record(ElementKind::FullPageImage, page);
        Ok(())
    }

    /// Featured image clipped to the band, panned by the layout offset.
    pub fn draw_image_band(
        &mut self,
        layout: &PosterLayout,
        img: Option<&EmbeddedImage>,
    ) -> Result<(), Error> {
        self.advance(RenderStage::PageSized, RenderStage::ImageBandDrawn)?;
        let band = layout.image;

        if let Some(img) = img {
            let name = self.embed(img)?;
            let clip = band.clip;
            let y_pt = (self.page_height_mm() - clip.bottom()) * PT_PER_MM;
            self.content.save_state();
            self.content.rect(
                clip.x * PT_PER_MM,
                y_pt,
                clip.width * PT_PER_MM,
                clip.height * PT_PER_MM,
            );
            self.content.clip_nonzero();
            self.content.end_path();
            self.place_image(&name, band.placement(img.pixel_width, img.pixel_height));
            self.content.restore_state();
            self.record(ElementKind::Image, clip);
        }

        // Body sits on white whatever the image did above.
        let page = layout.page;
        let below = Rect::new(0.0, band.band.bottom(), page.width, page.height - band.band.bottom());
        self.fill_rect(below, [255, 255, 255]);
        Ok(())
    }

    /// Title, both text columns and the separator.
    pub fn draw_body(&mut self, layout: &PosterLayout, fonts: &FontSet) -> Result<(), Error> {
        self.advance(RenderStage::ImageBandDrawn, RenderStage::BodyDrawn)?;

        let mut used_chars: HashSet<char> = HashSet::new();
        for block in text_blocks(layout) {
            for line in &block.lines {
                used_chars.extend(line.chars());
            }
        }
        let next_id = &mut self.next_id;
        let mut alloc = || {
            let r = Ref::new(*next_id);
            *next_id += 1;
            r
        };
        let registered = fonts.register(&mut self.pdf, &mut alloc, &used_chars);

        let page_h = self.page_height_mm();
        let draw = |content: &mut Content, block: &TextBlock, color: [u8; 3]| {
            text::render_text_block(content, block, color, &registered, fonts as &dyn TextMeasure, page_h);
        };

        draw(&mut self.content, &layout.title, BRAND_MAROON);
        draw(&mut self.content, &layout.date, [0, 0, 0]);
        draw(&mut self.content, &layout.details, [0, 0, 0]);
        draw(&mut self.content, &layout.info_heading, [0, 0, 0]);
        draw(&mut self.content, &layout.info, [0, 0, 0]);
        self.fill_rect(layout.rule, BRAND_MAROON);

        let sep = layout.separator;
        self.content.save_state();
        text::set_stroke(&mut self.content, SEPARATOR_GREY);
        self.content.set_line_width(sep.width * PT_PER_MM);
        self.content.move_to(sep.center_x() * PT_PER_MM, (page_h - sep.y) * PT_PER_MM);
        self.content.line_to(sep.center_x() * PT_PER_MM, (page_h - sep.bottom()) * PT_PER_MM);
        self.content.stroke();
        self.content.restore_state();

        self.report.title_lines = layout.title.lines.clone();
        self.record(ElementKind::Title, layout.title.rect);
        self.record(ElementKind::Date, layout.date.rect);
        self.record(ElementKind::Rule, layout.rule);
        self.record(ElementKind::Details, layout.details.rect);
        self.record(ElementKind::Separator, sep);
        self.record(ElementKind::InfoHeading, layout.info_heading.rect);
        self.record(ElementKind::Info, layout.info.rect);

        self.fonts = Some(registered);
        Ok(())
    }

    /// QR code and organiser block. Either may be absent.
    pub fn draw_branding(
        &mut self,
        layout: &PosterLayout,
        fonts: &FontSet,
        qr_target: Option<&str>,
        logo: Option<&EmbeddedImage>,
    ) -> Result<(), Error> {
        self.advance(RenderStage::BodyDrawn, RenderStage::BrandingDrawn)?;
        let page_h = self.page_height_mm();

        if let Some(target) = qr_target {
            let matrix = QrMatrix::encode(target)?;
            qr::draw_qr(&mut self.content, &matrix, layout.qr, page_h);
            self.report.qr_drawn = true;
            self.record(ElementKind::Qr, layout.qr);
        }

        let Some(registered) = self.fonts.as_ref() else {
            return Err(Error::Render("fonts not registered".into()));
        };
        text::render_text_block(
            &mut self.content,
            &layout.organizer_label,
            BRANDING_GREY,
            registered,
            fonts,
            page_h,
        );
        self.record(ElementKind::OrganizerLabel, layout.organizer_label.rect);

        if let Some(logo) = logo {
            let name = self.embed(logo)?;
            let rect = fit_in_slot(layout.logo, logo.pixel_width, logo.pixel_height);
            self.place_image(&name, rect);
            self.report.logo_drawn = true;
            self.record(ElementKind::Logo, rect);
        }
        Ok(())
    }

    /// Assemble the document. Only a fully drawn page produces bytes.
    pub fn finish(mut self) -> Result<RenderedPoster, Error> {
        self.advance(RenderStage::BrandingDrawn, RenderStage::Finalized)?;

        let catalog_id = self.alloc();
        let pages_id = self.alloc();
        let page_id = self.alloc();
        let content_id = self.alloc();
        let info_id = self.alloc();

        let raw = self.content.finish();
        let compressed = miniz_oxide::deflate::compress_to_vec_zlib(raw.as_slice(), 6);
        self.pdf.stream(content_id, &compressed).filter(Filter::FlateDecode);

        self.pdf.catalog(catalog_id).pages(pages_id);
        self.pdf.pages(pages_id).kids([page_id]).count(1);

        let (w_mm, h_mm) = self.page_size.dimensions_mm();
        {
            let mut page = self.pdf.page(page_id);
            page.media_box(PdfRect::new(0.0, 0.0, w_mm * PT_PER_MM, h_mm * PT_PER_MM))
                .parent(pages_id)
                .contents(content_id);
            {
                let mut resources = page.resources();
                if let Some(fonts) = &self.fonts {
                    let mut font_dict = resources.fonts();
                    for entry in [&fonts.regular, &fonts.bold] {
                        font_dict.pair(Name(entry.pdf_name.as_bytes()), entry.font_ref);
                    }
                }
                if !self.xobjects.is_empty() {
                    let mut xobjects = resources.x_objects();
                    for (name, xobj_ref) in &self.xobjects {
                        xobjects.pair(Name(name.as_bytes()), *xobj_ref);
                    }
                }
            }
        }

        {
            let mut info = self.pdf.document_info(info_id);
            if !self.meta.title.is_empty() {
                info.title(TextStr(&self.meta.title));
            }
            if !self.meta.author.is_empty() {
                info.author(TextStr(&self.meta.author));
            }
            if !self.meta.creator.is_empty() {
                info.creator(TextStr(&self.meta.creator));
            }
            info.producer(TextStr(concat!("poster-studio ", env!("CARGO_PKG_VERSION"))));
        }

        Ok(RenderedPoster {
            bytes: self.pdf.finish(),
            report: self.report,
        })
    }
}

/// Largest rect of the image's proportions inside `slot`, left-aligned and
/// vertically centred so the branding row stays balanced against the QR.
fn fit_in_slot(slot: Rect, pixel_width: u32, pixel_height: u32) -> Rect {
    if pixel_width == 0 || pixel_height == 0 {
        return slot;
    }
    let aspect = pixel_height as f32 / pixel_width as f32;
    let (w, h) = if aspect * slot.width <= slot.height {
        (slot.width, slot.width * aspect)
    } else {
        (slot.height / aspect, slot.height)
    };
    Rect::new(slot.x, slot.y + (slot.height - h) / 2.0, w, h)
}

fn text_blocks(layout: &PosterLayout) -> [&TextBlock; 6] {
    [
        &layout.title,
        &layout.date,
        &layout.details,
        &layout.info_heading,
        &layout.info,
        &layout.organizer_label,
    ]
}

/// Render one export request. A captured image wins; otherwise the poster
/// is drawn from its parameters.
pub fn render_poster(
    request: ExportRequest,
    assets: &PosterAssets,
    template: &TemplateText,
    meta: DocumentMeta,
) -> Result<RenderedPoster, Error> {
    let t0 = std::time::Instant::now();
    let params = request.parameters.normalized();
    let mut renderer = PosterRenderer::new(meta);
    renderer.size_page(params.page_size)?;

    if let Some(capture) = request.captured_image {
        renderer.draw_full_page_image(&capture)?;
        let rendered = renderer.finish()?;
        log::info!(
            "Rendered captured poster ({}, {} bytes) in {:.1}ms",
            params.page_size.as_str(),
            rendered.bytes.len(),
            t0.elapsed().as_secs_f64() * 1000.0,
        );
        return Ok(rendered);
    }

    let fonts = FontSet::load(params.font_family);
    let layout = PosterLayout::compute(&params, template, &fonts);
    if !layout.fits_page() {
        log::warn!(
            "Poster content ends at {:.1}mm, below the {:.0}mm page",
            layout.content_bottom_mm(),
            layout.page.height
        );
    }
    let t_layout = t0.elapsed();

    renderer.draw_image_band(&layout, assets.featured_image.as_ref())?;
    renderer.draw_body(&layout, &fonts)?;
    renderer.draw_branding(
        &layout,
        &fonts,
        assets.qr_target.as_deref(),
        assets.logo.as_ref(),
    )?;
    let t_draw = t0.elapsed();
    let rendered = renderer.finish()?;

    log::info!(
        "Render phases: layout={:.1}ms, draw={:.1}ms, assembly={:.1}ms",
        t_layout.as_secs_f64() * 1000.0,
        (t_draw - t_layout).as_secs_f64() * 1000.0,
        (t0.elapsed() - t_draw).as_secs_f64() * 1000.0,
    );
    Ok(rendered)
}
