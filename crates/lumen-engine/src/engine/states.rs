use crate::coords::Color4;
use crate::device::{BlendEquation, CompareFunc, Face, FrontFace, GraphicsDriver, StencilOp};
use crate::state::{AlphaMode, AlphaState, DepthCullingState, StencilState};

use super::Engine;

/// Fixed-function helpers. Everything here only updates the trackers; the
/// driver sees the changes at the next draw or clear.
impl<D: GraphicsDriver> Engine<D> {
    /// Culling, polygon offset and winding in one call.
    ///
    /// `reverse_side` flips the front face to clockwise; `cull_back_faces`
    /// selects which side is culled when `culling` is on.
    pub fn set_state(
        &mut self,
        culling: bool,
        z_offset: f32,
        z_offset_units: f32,
        reverse_side: bool,
        cull_back_faces: bool,
    ) {
        self.depth.set_cull(culling);
        self.depth.set_cull_face(if cull_back_faces { Face::Back } else { Face::Front });
        self.depth.set_z_offset(z_offset, z_offset_units);
        self.depth.set_front_face(if reverse_side { FrontFace::Cw } else { FrontFace::Ccw });
    }

    pub fn set_z_offset(&mut self, factor: f32, units: f32) {
        self.depth.set_z_offset(factor, units);
    }

    // ── Depth ─────────────────────────────────────────────────────────────

    pub fn set_depth_buffer(&mut self, enabled: bool) {
        self.depth.set_depth_test(enabled);
    }

    pub fn depth_buffer(&self) -> bool {
        self.depth.depth_test()
    }

    pub fn set_depth_write(&mut self, enabled: bool) {
        self.depth.set_depth_mask(enabled);
    }

    pub fn depth_write(&self) -> bool {
        self.depth.depth_mask()
    }

    pub fn set_depth_function(&mut self, func: CompareFunc) {
        self.depth.set_depth_func(func);
    }

    pub fn depth_function(&self) -> CompareFunc {
        self.depth.depth_func()
    }

    pub fn depth_culling_state(&self) -> &DepthCullingState {
        &self.depth
    }

    // ── Color & blending ──────────────────────────────────────────────────

    pub fn set_color_write(&mut self, enabled: bool) {
        if self.color_write != enabled {
            self.color_write = enabled;
            self.color_write_dirty = true;
        }
    }

    pub fn color_write(&self) -> bool {
        self.color_write
    }

    /// Switches the blend preset. Unless `no_depth_write_change` is set the
    /// depth mask follows: writes stay on only for [`AlphaMode::Disable`].
    pub fn set_alpha_mode(&mut self, mode: AlphaMode, no_depth_write_change: bool) {
        if self.alpha_mode == mode {
            return;
        }
        self.alpha.set_mode(mode);
        if !no_depth_write_change {
            self.depth.set_depth_mask(mode == AlphaMode::Disable);
        }
        self.alpha_mode = mode;
    }

    pub fn alpha_mode(&self) -> AlphaMode {
        self.alpha_mode
    }

    pub fn set_alpha_constants(&mut self, color: Color4) {
        self.alpha.set_constants(color);
    }

    pub fn set_alpha_equation(&mut self, rgb: BlendEquation, alpha: BlendEquation) {
        self.alpha.set_equations(rgb, alpha);
    }

    pub fn alpha_state(&self) -> &AlphaState {
        &self.alpha
    }

    // ── Stencil ───────────────────────────────────────────────────────────

    pub fn set_stencil_buffer(&mut self, enabled: bool) {
        self.stencil.set_test(enabled);
    }

    pub fn stencil_buffer(&self) -> bool {
        self.stencil.test()
    }

    pub fn set_stencil_mask(&mut self, mask: u32) {
        self.stencil.set_mask(mask);
    }

    pub fn set_stencil_function(&mut self, func: CompareFunc) {
        self.stencil.set_func(func);
    }

    pub fn set_stencil_function_reference(&mut self, reference: i32) {
        self.stencil.set_func_ref(reference);
    }

    pub fn set_stencil_function_mask(&mut self, mask: u32) {
        self.stencil.set_func_mask(mask);
    }

    pub fn set_stencil_operation_fail(&mut self, op: StencilOp) {
        self.stencil.set_op_stencil_fail(op);
    }

    pub fn set_stencil_operation_depth_fail(&mut self, op: StencilOp) {
        self.stencil.set_op_depth_fail(op);
    }

    pub fn set_stencil_operation_pass(&mut self, op: StencilOp) {
        self.stencil.set_op_pass(op);
    }

    pub fn stencil_state(&self) -> &StencilState {
        &self.stencil
    }
}

#[cfg(test)]
mod tests {
    use crate::device::{BlendFactor, CompareFunc, PrimitiveMode, StencilOp};
    use crate::engine::test_support::*;
    use crate::state::AlphaMode;

    #[test]
    fn alpha_mode_drives_blend_and_depth_mask() {
        let mut e = engine();
        e.set_alpha_mode(AlphaMode::Combine, false);
        assert!(e.alpha_state().blend());
        assert_eq!(
            e.alpha_state().factors(),
            [BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha, BlendFactor::One, BlendFactor::One]
        );
        assert!(!e.depth_write());

        e.set_alpha_mode(AlphaMode::Disable, false);
        assert!(!e.alpha_state().blend());
        assert!(e.depth_write());

        e.set_alpha_mode(AlphaMode::Add, true);
        assert!(e.depth_write());
    }

    #[test]
    fn set_state_maps_winding_and_cull_face() {
        let mut e = engine();
        e.set_state(true, 1.0, 2.0, true, false);
        let s = e.depth_culling_state();
        assert!(s.cull());
        assert_eq!(s.cull_face(), crate::device::Face::Front);
        assert_eq!(s.front_face(), crate::device::FrontFace::Cw);
        assert_eq!(s.z_offset(), (1.0, 2.0));
    }

    #[test]
    fn color_write_is_flushed_once() {
        let mut e = engine();
        e.apply_states();
        e.driver_mut().clear_calls();
        e.set_color_write(false);
        e.set_color_write(false);
        e.draw_arrays(PrimitiveMode::Points, 0, 1, 1);
        e.draw_arrays(PrimitiveMode::Points, 0, 1, 1);
        assert_eq!(e.driver().count("color_mask"), 1);
    }

    #[test]
    fn stencil_helpers_reach_the_driver_on_draw() {
        let mut e = engine();
        e.apply_states();
        e.driver_mut().clear_calls();
        e.set_stencil_buffer(true);
        e.set_stencil_function(CompareFunc::Equal);
        e.set_stencil_function_reference(3);
        e.set_stencil_operation_pass(StencilOp::Keep);
        assert_eq!(e.driver().count("stencil_func"), 0);
        e.draw_arrays(PrimitiveMode::Triangles, 0, 3, 1);
        assert_eq!(e.driver().count("stencil_func"), 1);
        assert_eq!(e.driver().count("stencil_op"), 1);
        assert_eq!(e.stencil_state().func(), (CompareFunc::Equal, 3, 0xFF));
    }
}
