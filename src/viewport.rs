//! Zoom and pan for the on-screen poster.
//!
//! The controller only decides presentation: the canvas transform, its
//! vertical alignment and the image offset produced by dragging. None of it
//! feeds back into [`PosterParameters`] except the image offset, which the
//! caller commits explicitly.
//!
//! [`PosterParameters`]: crate::model::PosterParameters

use serde::Serialize;

use crate::layout::mm_to_px;
use crate::model::PageSize;

pub const MIN_ZOOM: f32 = 0.2;
pub const MAX_ZOOM: f32 = 3.0;
/// Zoom change for the +/- buttons.
pub const BUTTON_ZOOM_STEP: f32 = 0.2;
/// Zoom change per wheel notch.
pub const WHEEL_ZOOM_STEP: f32 = 0.1;
/// Space kept free around the canvas inside the workspace, in px.
pub const WORKSPACE_PADDING_PX: f32 = 120.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum TransformOrigin {
    /// Horizontal centre, top edge.
    TopCenter,
    /// No transform applied (capture mode).
    Unset,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum VerticalAlign {
    Center,
    Top,
}

/// Everything the canvas element needs to be styled with.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CanvasPresentation {
    pub scale: f32,
    pub origin: TransformOrigin,
    /// Compensates the layout space a scale transform does not reclaim.
    pub margin_bottom_px: f32,
    pub align: VerticalAlign,
    pub shadow: bool,
}

impl CanvasPresentation {
    /// 1:1 rendering with every decoration removed.
    pub fn stripped() -> Self {
        Self {
            scale: 1.0,
            origin: TransformOrigin::Unset,
            margin_bottom_px: 0.0,
            align: VerticalAlign::Top,
            shadow: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DragState {
    Idle,
    Dragging { start_y: f32, start_top: i32 },
}

/// Per-session state. Dropped with the editing session; never persisted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportState {
    pub user_zoom: f32,
    pub drag: DragState,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            user_zoom: 1.0,
            drag: DragState::Idle,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WheelInput {
    pub delta_y: f32,
    pub ctrl: bool,
    pub meta: bool,
    pub pointer_over_workspace: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WheelOutcome {
    /// The wheel zoomed the canvas; the page must not scroll.
    Zoomed(CanvasPresentation),
    /// Leave the event to normal page scrolling.
    PassThrough,
}

pub struct ViewportController {
    state: ViewportState,
    workspace_px: (f32, f32),
    canvas_px: (f32, f32),
}

impl ViewportController {
    pub fn new(workspace_width: f32, workspace_height: f32, page: PageSize) -> Self {
        let mut controller = Self {
            state: ViewportState::default(),
            workspace_px: (workspace_width, workspace_height),
            canvas_px: (0.0, 0.0),
        };
        controller.set_page_size(page);
        controller
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn user_zoom(&self) -> f32 {
        self.state.user_zoom
    }

    /// Natural (unscaled) canvas size in px.
    pub fn canvas_size(&self) -> (f32, f32) {
        self.canvas_px
    }

    pub fn set_workspace_size(&mut self, width: f32, height: f32) -> CanvasPresentation {
        self.workspace_px = (width, height);
        self.apply_zoom()
    }

    pub fn set_page_size(&mut self, page: PageSize) -> CanvasPresentation {
        let (w, h) = page.dimensions_mm();
        self.canvas_px = (mm_to_px(w), mm_to_px(h));
        self.apply_zoom()
    }

    fn available(&self) -> (f32, f32) {
        (
            (self.workspace_px.0 - WORKSPACE_PADDING_PX).max(0.0),
            (self.workspace_px.1 - WORKSPACE_PADDING_PX).max(0.0),
        )
    }

    /// Largest scale at which the whole canvas is visible.
    pub fn compute_fit_scale(&self) -> f32 {
        let (avail_w, avail_h) = self.available();
        let (canvas_w, canvas_h) = self.canvas_px;
        if canvas_w <= 0.0 || canvas_h <= 0.0 {
            return 1.0;
        }
        (avail_w / canvas_w).min(avail_h / canvas_h)
    }

    pub fn combined_scale(&self) -> f32 {
        self.compute_fit_scale() * self.state.user_zoom
    }

    /// Presentation for the current fit scale and user zoom.
    pub fn apply_zoom(&self) -> CanvasPresentation {
        let scale = self.combined_scale();
        let canvas_h = self.canvas_px.1;
        let align = if canvas_h * scale < self.available().1 {
            VerticalAlign::Center
        } else {
            VerticalAlign::Top
        };
        CanvasPresentation {
            scale,
            origin: TransformOrigin::TopCenter,
            margin_bottom_px: canvas_h * (scale - 1.0),
            align,
            shadow: true,
        }
    }

    pub fn change_zoom(&mut self, delta: f32) -> CanvasPresentation {
        if delta.is_finite() {
            self.state.user_zoom = (self.state.user_zoom + delta).clamp(MIN_ZOOM, MAX_ZOOM);
        }
        self.apply_zoom()
    }

    pub fn zoom_in(&mut self) -> CanvasPresentation {
        self.change_zoom(BUTTON_ZOOM_STEP)
    }

    pub fn zoom_out(&mut self) -> CanvasPresentation {
        self.change_zoom(-BUTTON_ZOOM_STEP)
    }

    pub fn reset_zoom(&mut self) -> CanvasPresentation {
        self.state.user_zoom = 1.0;
        self.apply_zoom()
    }

    /// Restore a zoom saved earlier (e.g. around a capture).
    pub fn restore_zoom(&mut self, zoom: f32) -> CanvasPresentation {
        if zoom.is_finite() {
            self.state.user_zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        }
        self.apply_zoom()
    }

    /// Wheel zoom is only taken while the pointer is over the workspace or a
    /// modifier is held, so ordinary page scrolling keeps working.
    pub fn handle_wheel(&mut self, input: WheelInput) -> WheelOutcome {
        if !(input.ctrl || input.meta || input.pointer_over_workspace) {
            return WheelOutcome::PassThrough;
        }
        // Sideways swipes carry no vertical delta.
        if input.delta_y == 0.0 || !input.delta_y.is_finite() {
            return WheelOutcome::PassThrough;
        }
        let delta = if input.delta_y > 0.0 {
            -WHEEL_ZOOM_STEP
        } else {
            WHEEL_ZOOM_STEP
        };
        WheelOutcome::Zoomed(self.change_zoom(delta))
    }

    /// Pointer went down on the image.
    pub fn begin_drag(&mut self, pointer_y: f32, current_top_px: i32) {
        self.state.drag = DragState::Dragging {
            start_y: pointer_y,
            start_top: current_top_px.min(0),
        };
    }

    /// New image offset for a pointer move, or `None` when not dragging.
    /// Pointer travel is divided by the user zoom so the image follows the
    /// cursor at any magnification.
    pub fn drag_to(&mut self, pointer_y: f32) -> Option<i32> {
        let DragState::Dragging { start_y, start_top } = self.state.drag else {
            return None;
        };
        if !pointer_y.is_finite() {
            return Some(start_top);
        }
        let delta = (pointer_y - start_y) / self.state.user_zoom;
        let top = (start_top as f32 + delta).round().min(0.0);
        Some(top.max(i32::MIN as f32) as i32)
    }

    pub fn end_drag(&mut self) -> bool {
        let was_dragging = self.is_dragging();
        self.state.drag = DragState::Idle;
        was_dragging
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state.drag, DragState::Dragging { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> ViewportController {
        ViewportController::new(1400.0, 900.0, PageSize::A4)
    }

    #[test]
    fn fit_scale_uses_the_tighter_axis() {
        let c = controller();
        let (w, h) = c.canvas_size();
        let expected = ((1400.0 - 120.0) / w).min((900.0 - 120.0) / h);
        assert!((c.compute_fit_scale() - expected).abs() < 1e-6);
        // A4 is taller than wide, so height limits on a landscape screen
        assert!((c.compute_fit_scale() - 780.0 / h).abs() < 1e-6);
    }

    #[test]
    fn page_change_recomputes_fit() {
        let mut c = controller();
        let a4 = c.compute_fit_scale();
        c.set_page_size(PageSize::A3);
        assert!(c.compute_fit_scale() < a4);
    }

    #[test]
    fn zoom_is_clamped_under_repetition() {
        let mut c = controller();
        for _ in 0..100 {
            c.zoom_in();
        }
        assert_eq!(c.user_zoom(), MAX_ZOOM);
        c.change_zoom(-1e9);
        assert_eq!(c.user_zoom(), MIN_ZOOM);
        c.change_zoom(f32::NAN);
        assert_eq!(c.user_zoom(), MIN_ZOOM);
        for _ in 0..7 {
            c.change_zoom(0.37);
            assert!((MIN_ZOOM..=MAX_ZOOM).contains(&c.user_zoom()));
        }
    }

    #[test]
    fn reset_keeps_fit_scale() {
        let mut c = controller();
        let fit = c.compute_fit_scale();
        c.change_zoom(1.3);
        let p = c.reset_zoom();
        assert_eq!(c.user_zoom(), 1.0);
        assert_eq!(c.compute_fit_scale(), fit);
        assert_eq!(p.scale, fit);
    }

    #[test]
    fn transform_is_anchored_top_center() {
        let mut c = controller();
        let p = c.change_zoom(0.5);
        assert_eq!(p.origin, TransformOrigin::TopCenter);
        assert!((p.scale - c.compute_fit_scale() * 1.5).abs() < 1e-6);
        assert!((p.margin_bottom_px - c.canvas_size().1 * (p.scale - 1.0)).abs() < 1e-3);
    }

    #[test]
    fn small_canvas_is_centered_large_is_top_aligned() {
        let mut c = controller();
        assert_eq!(c.zoom_out().align, VerticalAlign::Center);
        assert_eq!(c.change_zoom(2.0).align, VerticalAlign::Top);
    }

    #[test]
    fn wheel_only_zooms_over_workspace_or_with_modifier() {
        let mut c = controller();
        let idle = WheelInput {
            delta_y: 120.0,
            ctrl: false,
            meta: false,
            pointer_over_workspace: false,
        };
        assert_eq!(c.handle_wheel(idle), WheelOutcome::PassThrough);
        assert_eq!(c.user_zoom(), 1.0);

        let with_ctrl = WheelInput { ctrl: true, ..idle };
        assert!(matches!(c.handle_wheel(with_ctrl), WheelOutcome::Zoomed(_)));
        assert!((c.user_zoom() - 0.9).abs() < 1e-6);

        let hover_up = WheelInput {
            delta_y: -40.0,
            pointer_over_workspace: true,
            ..idle
        };
        c.handle_wheel(hover_up);
        assert!((c.user_zoom() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn wheel_without_vertical_delta_does_not_zoom() {
        let mut c = controller();
        for delta_y in [0.0, -0.0, f32::NAN, f32::INFINITY] {
            let input = WheelInput {
                delta_y,
                ctrl: true,
                meta: false,
                pointer_over_workspace: true,
            };
            assert_eq!(c.handle_wheel(input), WheelOutcome::PassThrough);
            assert_eq!(c.user_zoom(), 1.0);
        }
    }

    #[test]
    fn drag_is_scaled_by_zoom_and_never_below_zero() {
        let mut c = controller();
        c.change_zoom(1.0); // zoom 2.0
        assert_eq!(c.drag_to(10.0), None);

        c.begin_drag(500.0, -40);
        assert_eq!(c.drag_to(400.0), Some(-90));
        assert_eq!(c.drag_to(700.0), Some(0));
        assert_eq!(c.drag_to(580.0), Some(0));
        assert!(c.end_drag());
        assert_eq!(c.drag_to(100.0), None);
        assert!(!c.end_drag());
    }

    #[test]
    fn pan_offsets_stay_non_positive() {
        let mut c = controller();
        for (start, zoom_delta) in [(0, 0.0), (-15, -0.6), (-300, 1.7)] {
            c.reset_zoom();
            c.change_zoom(zoom_delta);
            c.begin_drag(0.0, start);
            for y in [-1e6, -3.0, 0.0, 2.5, 77.0, 1e6] {
                assert!(c.drag_to(y).unwrap() <= 0);
            }
            c.end_drag();
        }
    }
}
