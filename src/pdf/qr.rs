use pdf_writer::Content;
use qrcode::{Color, EcLevel, QrCode};

use crate::error::Error;
use crate::layout::{PT_PER_MM, Rect};

/// Light modules around the symbol, in modules.
const QUIET_ZONE: usize = 1;

/// Dark-module matrix of a QR code, row-major, quiet zone included.
pub struct QrMatrix {
    pub size: usize,
    dark: Vec<bool>,
}

impl QrMatrix {
    pub fn encode(target: &str) -> Result<QrMatrix, Error> {
        let code = QrCode::with_error_correction_level(target.as_bytes(), EcLevel::L)
            .map_err(|e| Error::Render(format!("QR encoding failed: {e}")))?;
        let width = code.width();
        let colors = code.to_colors();
        let size = width + 2 * QUIET_ZONE;
        let mut dark = vec![false; size * size];
        for y in 0..width {
            for x in 0..width {
                if colors[y * width + x] == Color::Dark {
                    dark[(y + QUIET_ZONE) * size + x + QUIET_ZONE] = true;
                }
            }
        }
        Ok(QrMatrix { size, dark })
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        self.dark[y * self.size + x]
    }

    /// Horizontal runs of dark modules as (row, start, len).
    fn dark_runs(&self) -> Vec<(usize, usize, usize)> {
        let mut runs = Vec::new();
        for y in 0..self.size {
            let mut x = 0;
            while x < self.size {
                if !self.is_dark(x, y) {
                    x += 1;
                    continue;
                }
                let start = x;
                while x < self.size && self.is_dark(x, y) {
                    x += 1;
                }
                runs.push((y, start, x - start));
            }
        }
        runs
    }
}

/// Draw the matrix as vector rectangles filling `rect` (top-left mm).
pub(super) fn draw_qr(content: &mut Content, matrix: &QrMatrix, rect: Rect, page_height_mm: f32) {
    let module = rect.width / matrix.size as f32;
    let to_pt = |x_mm: f32, y_mm: f32, w_mm: f32, h_mm: f32| {
        (
            x_mm * PT_PER_MM,
            (page_height_mm - y_mm - h_mm) * PT_PER_MM,
            w_mm * PT_PER_MM,
            h_mm * PT_PER_MM,
        )
    };

    content.save_state();
    content.set_fill_gray(1.0);
    let (x, y, w, h) = to_pt(rect.x, rect.y, rect.width, rect.height);
    content.rect(x, y, w, h);
    content.fill_nonzero();

    content.set_fill_gray(0.0);
    for (row, start, len) in matrix.dark_runs() {
        let (x, y, w, h) = to_pt(
            rect.x + start as f32 * module,
            rect.y + row as f32 * module,
            len as f32 * module,
            module,
        );
        content.rect(x, y, w, h);
    }
    content.fill_nonzero();
    content.restore_state();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_has_quiet_zone() {
        let m = QrMatrix::encode("https://www.gem-malgrat.cat/?p=42").unwrap();
        // Version 2 or 3 at level L for a short URL, plus 2 quiet modules
        assert!(m.size >= 25 + 2);
        for i in 0..m.size {
            assert!(!m.is_dark(i, 0));
            assert!(!m.is_dark(0, i));
            assert!(!m.is_dark(i, m.size - 1));
        }
        // Finder pattern corner
        assert!(m.is_dark(1, 1));
    }

    #[test]
    fn runs_cover_every_dark_module() {
        let m = QrMatrix::encode("hello").unwrap();
        let dark_count = (0..m.size)
            .flat_map(|y| (0..m.size).map(move |x| (x, y)))
            .filter(|&(x, y)| m.is_dark(x, y))
            .count();
        let run_total: usize = m.dark_runs().iter().map(|r| r.2).sum();
        assert_eq!(dark_count, run_total);
    }
}
