use pdf_writer::{Content, Name, Str};

use crate::fonts::{RegisteredFonts, TextMeasure};
use crate::layout::{MM_PER_PT, PT_PER_MM, TextAlign, TextBlock};

/// Cap height as a share of the font size; used to centre text in its line.
const CAP_HEIGHT_RATIO: f32 = 0.7;

pub(super) fn set_fill(content: &mut Content, [r, g, b]: [u8; 3]) {
    content.set_fill_rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
}

pub(super) fn set_stroke(content: &mut Content, [r, g, b]: [u8; 3]) {
    content.set_stroke_rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
}

/// Draw a laid-out block. Lines are vertically centred inside the block's
/// rect (heading cells are taller than one line) and aligned horizontally
/// against the measured line width.
pub(super) fn render_text_block(
    content: &mut Content,
    block: &TextBlock,
    color: [u8; 3],
    fonts: &RegisteredFonts,
    measure: &dyn TextMeasure,
    page_height_mm: f32,
) {
    if block.lines.iter().all(|l| l.is_empty()) {
        return;
    }

    let entry = fonts.get(block.bold);
    let size_mm = block.size_pt * MM_PER_PT;
    let text_h = block.lines.len() as f32 * block.line_height_mm;
    let top = block.rect.y + ((block.rect.height - text_h) / 2.0).max(0.0);
    let baseline_in_line = (block.line_height_mm + size_mm * CAP_HEIGHT_RATIO) / 2.0;

    content.save_state();
    set_fill(content, color);
    for (i, line) in block.lines.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let x_mm = match block.align {
            TextAlign::Left => block.rect.x,
            TextAlign::Center => {
                let w = measure.text_width_mm(line, block.size_pt, block.bold);
                block.rect.x + (block.rect.width - w) / 2.0
            }
        };
        let baseline_mm = top + i as f32 * block.line_height_mm + baseline_in_line;

        content.begin_text();
        content.set_font(Name(entry.pdf_name.as_bytes()), block.size_pt);
        content.next_line(x_mm * PT_PER_MM, (page_height_mm - baseline_mm) * PT_PER_MM);
        content.show(Str(&entry.encode(line)));
        content.end_text();
    }
    content.restore_state();
}
