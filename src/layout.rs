//! Canonical poster geometry.
//!
//! Everything here is in millimetres with a top-left origin, the way the
//! editor canvas is laid out. The PDF renderer flips to bottom-left points
//! only at draw time, and the preview probe converts to CSS pixels, so both
//! always agree on where each box sits.

use serde::Serialize;

use crate::fonts::TextMeasure;
use crate::model::{PageSize, PosterParameters};

pub const PT_PER_MM: f32 = 72.0 / 25.4;
pub const MM_PER_PT: f32 = 25.4 / 72.0;
/// CSS reference pixels per millimetre (96 px per inch).
pub const PX_PER_MM: f32 = 96.0 / 25.4;

pub const COLUMN_PADDING_MM: f32 = 25.0;
pub const COLUMN_GAP_MM: f32 = 15.0;
pub const LEFT_COLUMN_SHARE: f32 = 0.6;

pub const TITLE_MARGIN_MM: f32 = 20.0;
pub const TITLE_GAP_MM: f32 = 6.0;
pub const COLUMNS_GAP_MM: f32 = 6.0;
pub const LINE_HEIGHT_RATIO: f32 = 1.25;

pub const HEADING_CELL_MM: f32 = 10.0;
pub const HEADING_SIZE_PT: f32 = 14.0;
pub const DETAILS_SIZE_PT: f32 = 14.0;
pub const RULE_WIDTH_MM: f32 = 1.0;
pub const RULE_GAP_MM: f32 = 5.0;
pub const INFO_GAP_MM: f32 = 6.0;
pub const INFO_SIZE_PT: f32 = 10.0;
pub const QR_ROW_GAP_MM: f32 = 6.0;
pub const BRANDING_GAP_MM: f32 = 8.0;
pub const BRANDING_LABEL_MM: f32 = 5.0;
pub const BRANDING_LABEL_SIZE_PT: f32 = 9.0;
/// Height the branding block is centred with: label plus logo plus slack.
const BRANDING_BLOCK_EXTRA_MM: f32 = 6.0;
pub const SEPARATOR_WIDTH_MM: f32 = 0.3;

pub const BRAND_MAROON: [u8; 3] = [144, 25, 30];
pub const SEPARATOR_GREY: [u8; 3] = [220, 220, 220];
pub const BRANDING_GREY: [u8; 3] = [100, 100, 100];

pub fn mm_to_px(mm: f32) -> f32 {
    mm * PX_PER_MM
}

pub fn px_to_mm(px: f32) -> f32 {
    px / PX_PER_MM
}

pub fn qr_size_mm(page: PageSize) -> f32 {
    match page {
        PageSize::A4 => 25.0,
        PageSize::A3 => 35.0,
    }
}

pub fn logo_size_mm(page: PageSize) -> f32 {
    match page {
        PageSize::A4 => 20.0,
        PageSize::A3 => 30.0,
    }
}

/// Fixed wording of the template.
#[derive(Clone, Debug, PartialEq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateText {
    pub info_heading: String,
    pub info_text: String,
    pub organizer_label: String,
}

impl Default for TemplateText {
    fn default() -> Self {
        Self {
            info_heading: "INFORMACIÓ".into(),
            info_text: "Tots els dimecres de 19:00 a 21:00 al local del GEM i al web\nwww.gem-malgrat.cat"
                .into(),
            organizer_label: "ORGANITZA:".into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum TextAlign {
    Left,
    Center,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TextBlock {
    pub rect: Rect,
    pub lines: Vec<String>,
    pub size_pt: f32,
    pub bold: bool,
    pub align: TextAlign,
    pub line_height_mm: f32,
}

impl TextBlock {
    /// Lay `text` out inside `width`, starting at (x, y). Line height follows
    /// the font size; `min_height` reserves a fixed cell (used for headings).
    fn flow(
        measure: &dyn TextMeasure,
        text: &str,
        x: f32,
        y: f32,
        width: f32,
        size_pt: f32,
        bold: bool,
        align: TextAlign,
        min_height: f32,
    ) -> TextBlock {
        let lines = wrap_text(measure, text, width, size_pt, bold);
        let line_height_mm = size_pt * LINE_HEIGHT_RATIO * MM_PER_PT;
        let height = (lines.len() as f32 * line_height_mm).max(min_height);
        TextBlock {
            rect: Rect::new(x, y, width, height),
            lines,
            size_pt,
            bold,
            align,
            line_height_mm,
        }
    }
}

/// The top band reserved for the featured image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ImageBand {
    /// Full-width band; the page background above the text.
    pub band: Rect,
    /// Visible window of the image: configured width, centred, band height.
    pub clip: Rect,
    /// Vertical shift from panning, always `<= 0`.
    pub offset_mm: f32,
}

impl ImageBand {
    /// Where an image with the given pixel size is drawn. It fills the clip
    /// width and is scaled up whenever that would leave a gap at the bottom
    /// of the band, so the band is always covered.
    pub fn placement(&self, pixel_width: u32, pixel_height: u32) -> Rect {
        if pixel_width == 0 || pixel_height == 0 {
            return Rect::new(self.clip.x, self.offset_mm, self.clip.width, self.clip.height);
        }
        let aspect = pixel_height as f32 / pixel_width as f32;
        let needed = self.clip.height - self.offset_mm;
        let mut width = self.clip.width;
        let mut height = width * aspect;
        if height < needed {
            height = needed;
            width = height / aspect;
        }
        let x = self.clip.center_x() - width / 2.0;
        Rect::new(x, self.offset_mm, width, height)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PosterLayout {
    pub page_size: PageSize,
    pub page: Rect,
    pub image: ImageBand,
    pub title: TextBlock,
    pub left_column: Rect,
    pub right_column: Rect,
    pub separator: Rect,
    pub date: TextBlock,
    pub rule: Rect,
    pub details: TextBlock,
    pub info_heading: TextBlock,
    pub info: TextBlock,
    pub qr: Rect,
    pub organizer_label: TextBlock,
    pub logo: Rect,
}

impl PosterLayout {
    pub fn compute(
        params: &PosterParameters,
        template: &TemplateText,
        measure: &dyn TextMeasure,
    ) -> PosterLayout {
        let (page_w, page_h) = params.page_size.dimensions_mm();
        let band_h = params.image_height_mm;
        let image_w = params.image_width_mm.min(page_w);

        let image = ImageBand {
            band: Rect::new(0.0, 0.0, page_w, band_h),
            clip: Rect::new((page_w - image_w) / 2.0, 0.0, image_w, band_h),
            offset_mm: px_to_mm(params.image_top_offset_px.min(0) as f32),
        };

        let mut title = TextBlock::flow(
            measure,
            &params.display_title(),
            TITLE_MARGIN_MM,
            band_h + TITLE_GAP_MM,
            page_w - 2.0 * TITLE_MARGIN_MM,
            params.title_size_pt as f32,
            true,
            TextAlign::Center,
            0.0,
        );
        if title.lines.is_empty() {
            title.lines.push(String::new());
            title.rect.height = title.line_height_mm;
        }

        let content_y = title.rect.bottom() + COLUMNS_GAP_MM;
        let inner_w = page_w - 2.0 * COLUMN_PADDING_MM - COLUMN_GAP_MM;
        let left_w = inner_w * LEFT_COLUMN_SHARE;
        let right_w = inner_w * (1.0 - LEFT_COLUMN_SHARE);
        let left_x = COLUMN_PADDING_MM;
        let right_x = left_x + left_w + COLUMN_GAP_MM;

        // Left column: date, rule, details.
        let date = TextBlock::flow(
            measure,
            &params.date_text,
            left_x,
            content_y,
            left_w,
            HEADING_SIZE_PT,
            true,
            TextAlign::Left,
            HEADING_CELL_MM,
        );
        let rule = Rect::new(left_x, date.rect.bottom(), left_w, RULE_WIDTH_MM);
        let details = TextBlock::flow(
            measure,
            &params.details,
            left_x,
            date.rect.bottom() + RULE_GAP_MM,
            left_w,
            DETAILS_SIZE_PT,
            false,
            TextAlign::Left,
            0.0,
        );

        // Right column: heading, info text, QR + branding row.
        let info_heading = TextBlock::flow(
            measure,
            &template.info_heading,
            right_x,
            content_y,
            right_w,
            HEADING_SIZE_PT,
            true,
            TextAlign::Left,
            HEADING_CELL_MM,
        );
        let info = TextBlock::flow(
            measure,
            &template.info_text,
            right_x,
            info_heading.rect.bottom() + INFO_GAP_MM,
            right_w,
            INFO_SIZE_PT,
            false,
            TextAlign::Left,
            0.0,
        );

        let qr_size = qr_size_mm(params.page_size);
        let logo_size = logo_size_mm(params.page_size);
        let row_y = info.rect.bottom() + QR_ROW_GAP_MM;
        let qr = Rect::new(right_x, row_y, qr_size, qr_size);

        let branding_x = qr.right() + BRANDING_GAP_MM;
        let branding_y = row_y + (qr_size - (logo_size + BRANDING_BLOCK_EXTRA_MM)) / 2.0;
        let organizer_label = TextBlock::flow(
            measure,
            &template.organizer_label,
            branding_x,
            branding_y,
            (page_w - branding_x).max(0.0),
            BRANDING_LABEL_SIZE_PT,
            true,
            TextAlign::Left,
            BRANDING_LABEL_MM,
        );
        let logo = Rect::new(
            branding_x,
            organizer_label.rect.bottom(),
            logo_size,
            logo_size,
        );

        let left_bottom = details.rect.bottom().max(rule.bottom());
        let right_bottom = qr.bottom().max(logo.bottom());
        let column_h = left_bottom.max(right_bottom) - content_y;

        let separator = Rect::new(
            left_x + left_w + COLUMN_GAP_MM / 2.0 - SEPARATOR_WIDTH_MM / 2.0,
            content_y,
            SEPARATOR_WIDTH_MM,
            column_h,
        );

        PosterLayout {
            page_size: params.page_size,
            page: Rect::new(0.0, 0.0, page_w, page_h),
            image,
            title,
            left_column: Rect::new(left_x, content_y, left_w, column_h),
            right_column: Rect::new(right_x, content_y, right_w, column_h),
            separator,
            date,
            rule,
            details,
            info_heading,
            info,
            qr,
            organizer_label,
            logo,
        }
    }

    /// Bounding boxes of every content element, in drawing order.
    pub fn content_boxes(&self) -> [Rect; 12] {
        [
            self.image.band,
            self.title.rect,
            self.date.rect,
            self.rule,
            self.details.rect,
            self.info_heading.rect,
            self.info.rect,
            self.qr,
            self.organizer_label.rect,
            self.logo,
            self.left_column,
            self.right_column,
        ]
    }

    /// Lowest bottom edge over all content, in millimetres.
    pub fn content_bottom_mm(&self) -> f32 {
        self.content_boxes()
            .iter()
            .map(Rect::bottom)
            .fold(0.0, f32::max)
    }

    pub fn fits_page(&self) -> bool {
        self.content_bottom_mm() <= self.page.height
    }
}

/// Greedy word wrap. Source line breaks are kept (empty lines included);
/// words wider than the box are split between characters.
pub fn wrap_text(
    measure: &dyn TextMeasure,
    text: &str,
    max_width_mm: f32,
    size_pt: f32,
    bold: bool,
) -> Vec<String> {
    let width_of = |s: &str| measure.text_width_mm(s, size_pt, bold);
    let mut lines = Vec::new();
    if text.trim().is_empty() {
        return lines;
    }

    for source_line in text.trim_end().split('\n') {
        let source_line = source_line.trim_end_matches('\r');
        let mut current = String::new();
        for word in source_line.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if width_of(&candidate) <= max_width_mm {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if width_of(word) <= max_width_mm {
                current = word.to_string();
                continue;
            }
            for ch in word.chars() {
                current.push(ch);
                if width_of(&current) > max_width_mm && current.chars().count() > 1 {
                    current.pop();
                    lines.push(std::mem::take(&mut current));
                    current.push(ch);
                }
            }
        }
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::FontSet;
    use crate::model::FontFamily;

    fn montseny(page_size: PageSize) -> PosterParameters {
        PosterParameters {
            title: "Sortida al Montseny".into(),
            date_text: "12/05/2024".into(),
            details: "Lloc: Montseny\nDificultat: Mitjana".into(),
            image_width_mm: page_size.width_mm(),
            page_size,
            ..PosterParameters::default()
        }
    }

    fn layout(params: &PosterParameters) -> PosterLayout {
        let fonts = FontSet::builtin(params.font_family);
        PosterLayout::compute(params, &TemplateText::default(), &fonts)
    }

    #[test]
    fn columns_split_sixty_forty() {
        let l = layout(&montseny(PageSize::A4));
        // (210 - 50 - 15) = 145mm usable
        assert!((l.left_column.width - 87.0).abs() < 1e-3);
        assert!((l.right_column.width - 58.0).abs() < 1e-3);
        assert!((l.right_column.x - (25.0 + 87.0 + 15.0)).abs() < 1e-3);
        assert!((l.separator.center_x() - (25.0 + 87.0 + 7.5)).abs() < 1e-3);
    }

    #[test]
    fn title_sits_below_band_and_is_centered() {
        let l = layout(&montseny(PageSize::A4));
        assert_eq!(l.title.lines, vec!["SORTIDA AL MONTSENY".to_string()]);
        assert!((l.title.rect.y - 147.0).abs() < 1e-3);
        assert!((l.title.rect.center_x() - 105.0).abs() < 1e-3);
        assert_eq!(l.title.align, TextAlign::Center);
    }

    #[test]
    fn details_keep_source_line_breaks() {
        let l = layout(&montseny(PageSize::A4));
        assert_eq!(l.details.lines, vec!["Lloc: Montseny", "Dificultat: Mitjana"]);
    }

    #[test]
    fn a3_scales_qr_and_logo() {
        let a4 = layout(&montseny(PageSize::A4));
        let a3 = layout(&montseny(PageSize::A3));
        assert_eq!((a4.qr.width, a4.logo.width), (25.0, 20.0));
        assert_eq!((a3.qr.width, a3.logo.width), (35.0, 30.0));
        assert_eq!((a3.page.width, a3.page.height), (297.0, 420.0));
    }

    #[test]
    fn logo_block_is_centred_on_qr() {
        let l = layout(&montseny(PageSize::A4));
        assert!((l.organizer_label.rect.x - (l.qr.right() + 8.0)).abs() < 1e-3);
        let block_mid = l.organizer_label.rect.y + (20.0 + 6.0) / 2.0;
        assert!((block_mid - (l.qr.y + l.qr.height / 2.0)).abs() < 1e-3);
    }

    #[test]
    fn default_poster_fits_and_tall_band_overflows() {
        let mut p = montseny(PageSize::A4);
        assert!(layout(&p).fits_page());
        p.image_height_mm = 220.0;
        assert!(!layout(&p).fits_page());
    }

    #[test]
    fn long_words_are_split() {
        let fonts = FontSet::builtin(FontFamily::Courier);
        // 10pt Courier: 6pt per glyph ≈ 2.117mm
        let lines = wrap_text(&fonts, "ABCDEFGHIJ", 10.0, 10.0, false);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| fonts.text_width_mm(l, 10.0, false) <= 10.0));
        assert_eq!(lines.concat(), "ABCDEFGHIJ");
    }

    #[test]
    fn blank_text_has_no_lines() {
        let fonts = FontSet::builtin(FontFamily::Helvetica);
        assert!(wrap_text(&fonts, "  \n ", 50.0, 14.0, false).is_empty());
        assert_eq!(wrap_text(&fonts, "a\n\nb", 50.0, 14.0, false), vec!["a", "", "b"]);
    }

    #[test]
    fn image_covers_band_when_panned() {
        let band = ImageBand {
            band: Rect::new(0.0, 0.0, 210.0, 141.0),
            clip: Rect::new(0.0, 0.0, 210.0, 141.0),
            offset_mm: -20.0,
        };
        // Landscape 3:2 image at 210mm wide is only 140mm tall
        let placed = band.placement(3000, 2000);
        assert_eq!(placed.y, -20.0);
        assert!(placed.bottom() >= 141.0 - 1e-3);
        assert!((placed.center_x() - 105.0).abs() < 1e-3);
    }
}
