//! Image-height edits that would push content off the page are refused.
//!
//! Deciding that needs real layout: the candidate height is applied, the
//! rendered content is measured in natural (unscaled) page coordinates, and
//! the edit is rolled back when the lowest element ends below the canvas.

use crate::fonts::FontSet;
use crate::layout::{PosterLayout, TemplateText, mm_to_px};
use crate::model::{IMAGE_HEIGHT_RANGE_MM, PosterParameters};

/// A live layout that can be re-measured after changing the image band.
pub trait LayoutProbe {
    fn image_height_mm(&self) -> f32;
    fn set_image_height_mm(&mut self, height_mm: f32);
    /// Lowest bottom edge of any content element, in unscaled px.
    fn content_bottom_px(&self) -> f32;
    /// Natural canvas height, in unscaled px.
    fn canvas_height_px(&self) -> f32;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HeightEdit {
    /// New height committed; the readout shows it.
    Accepted { height_mm: f32 },
    /// Edit refused; control and readout keep the previous height.
    Rejected { height_mm: f32 },
}

impl HeightEdit {
    pub fn height_mm(self) -> f32 {
        match self {
            HeightEdit::Accepted { height_mm } | HeightEdit::Rejected { height_mm } => height_mm,
        }
    }

    pub fn is_accepted(self) -> bool {
        matches!(self, HeightEdit::Accepted { .. })
    }
}

/// Validate and, when legal, commit a new image height.
///
/// Only growth is checked: shrinking the band can never cause overflow, so it
/// is always accepted. A bottom edge exactly on the canvas edge still fits.
pub fn validate_image_height(
    probe: &mut dyn LayoutProbe,
    params: &mut PosterParameters,
    candidate_mm: f32,
) -> HeightEdit {
    let previous = params.image_height_mm;
    if !candidate_mm.is_finite() {
        return HeightEdit::Rejected {
            height_mm: previous,
        };
    }
    let candidate = candidate_mm.clamp(IMAGE_HEIGHT_RANGE_MM.0, IMAGE_HEIGHT_RANGE_MM.1);

    probe.set_image_height_mm(candidate);
    if candidate > previous {
        let bottom = probe.content_bottom_px();
        let limit = probe.canvas_height_px();
        if bottom > limit {
            log::debug!(
                "image height {candidate}mm overflows canvas ({bottom:.1}px > {limit:.1}px), keeping {previous}mm"
            );
            probe.set_image_height_mm(previous);
            return HeightEdit::Rejected {
                height_mm: previous,
            };
        }
    }

    params.image_height_mm = candidate;
    HeightEdit::Accepted {
        height_mm: candidate,
    }
}

/// Headless probe over the poster layout, used when no interactive client is
/// around to measure (server-side checks, CLI, tests).
pub struct TemplateProbe<'a> {
    params: PosterParameters,
    template: &'a TemplateText,
    fonts: FontSet,
}

impl<'a> TemplateProbe<'a> {
    pub fn new(params: &PosterParameters, template: &'a TemplateText) -> Self {
        Self {
            params: params.clone(),
            template,
            fonts: FontSet::load(params.font_family),
        }
    }

    pub fn with_fonts(params: &PosterParameters, template: &'a TemplateText, fonts: FontSet) -> Self {
        Self {
            params: params.clone(),
            template,
            fonts,
        }
    }

    pub fn layout(&self) -> PosterLayout {
        PosterLayout::compute(&self.params, self.template, &self.fonts)
    }
}

impl LayoutProbe for TemplateProbe<'_> {
    fn image_height_mm(&self) -> f32 {
        self.params.image_height_mm
    }

    fn set_image_height_mm(&mut self, height_mm: f32) {
        self.params.image_height_mm = height_mm;
    }

    fn content_bottom_px(&self) -> f32 {
        mm_to_px(self.layout().content_bottom_mm())
    }

    fn canvas_height_px(&self) -> f32 {
        mm_to_px(self.params.page_size.height_mm())
    }
}
