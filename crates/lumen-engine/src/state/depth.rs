use crate::device::{Capability, CompareFunc, Face, FrontFace, GraphicsDriver};

/// Depth test, depth write, face culling and polygon offset.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthCullingState {
    depth_test: bool,
    depth_mask: bool,
    depth_func: CompareFunc,
    cull: bool,
    cull_face: Face,
    front_face: FrontFace,
    z_offset: f32,
    z_offset_units: f32,

    depth_test_dirty: bool,
    depth_mask_dirty: bool,
    depth_func_dirty: bool,
    cull_dirty: bool,
    cull_face_dirty: bool,
    front_face_dirty: bool,
    z_offset_dirty: bool,
}

impl Default for DepthCullingState {
    fn default() -> Self {
        let mut s = Self {
            depth_test: true,
            depth_mask: true,
            depth_func: CompareFunc::LessEqual,
            cull: false,
            cull_face: Face::Back,
            front_face: FrontFace::Ccw,
            z_offset: 0.0,
            z_offset_units: 0.0,
            depth_test_dirty: false,
            depth_mask_dirty: false,
            depth_func_dirty: false,
            cull_dirty: false,
            cull_face_dirty: false,
            front_face_dirty: false,
            z_offset_dirty: false,
        };
        s.mark_all_dirty();
        s
    }
}

impl DepthCullingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores defaults and marks every field dirty.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn mark_all_dirty(&mut self) {
        self.depth_test_dirty = true;
        self.depth_mask_dirty = true;
        self.depth_func_dirty = true;
        self.cull_dirty = true;
        self.cull_face_dirty = true;
        self.front_face_dirty = true;
        self.z_offset_dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.depth_test_dirty
            || self.depth_mask_dirty
            || self.depth_func_dirty
            || self.cull_dirty
            || self.cull_face_dirty
            || self.front_face_dirty
            || self.z_offset_dirty
    }

    pub fn depth_test(&self) -> bool {
        self.depth_test
    }

    pub fn set_depth_test(&mut self, enabled: bool) {
        if self.depth_test != enabled {
            self.depth_test = enabled;
            self.depth_test_dirty = true;
        }
    }

    pub fn depth_mask(&self) -> bool {
        self.depth_mask
    }

    pub fn set_depth_mask(&mut self, write: bool) {
        if self.depth_mask != write {
            self.depth_mask = write;
            self.depth_mask_dirty = true;
        }
    }

    pub fn depth_func(&self) -> CompareFunc {
        self.depth_func
    }

    pub fn set_depth_func(&mut self, func: CompareFunc) {
        if self.depth_func != func {
            self.depth_func = func;
            self.depth_func_dirty = true;
        }
    }

    pub fn cull(&self) -> bool {
        self.cull
    }

    pub fn set_cull(&mut self, enabled: bool) {
        if self.cull != enabled {
            self.cull = enabled;
            self.cull_dirty = true;
        }
    }

    pub fn cull_face(&self) -> Face {
        self.cull_face
    }

    pub fn set_cull_face(&mut self, face: Face) {
        if self.cull_face != face {
            self.cull_face = face;
            self.cull_face_dirty = true;
        }
    }

    pub fn front_face(&self) -> FrontFace {
        self.front_face
    }

    pub fn set_front_face(&mut self, front: FrontFace) {
        if self.front_face != front {
            self.front_face = front;
            self.front_face_dirty = true;
        }
    }

    pub fn z_offset(&self) -> (f32, f32) {
        (self.z_offset, self.z_offset_units)
    }

    /// Polygon offset factor and units; both zero disables the offset.
    pub fn set_z_offset(&mut self, factor: f32, units: f32) {
        if self.z_offset != factor || self.z_offset_units != units {
            self.z_offset = factor;
            self.z_offset_units = units;
            self.z_offset_dirty = true;
        }
    }

    /// Flushes dirty fields to the driver and clears their flags.
    pub fn apply<D: GraphicsDriver>(&mut self, driver: &mut D) {
        if !self.is_dirty() {
            return;
        }

        // toggles
        if self.cull_dirty {
            driver.set_capability(Capability::CullFace, self.cull);
            self.cull_dirty = false;
        }

        if self.depth_test_dirty {
            driver.set_capability(Capability::DepthTest, self.depth_test);
            self.depth_test_dirty = false;
        }

        let z_offset_active = self.z_offset != 0.0 || self.z_offset_units != 0.0;
        if self.z_offset_dirty {
            driver.set_capability(Capability::PolygonOffsetFill, z_offset_active);
        }

        // functions
        if self.depth_func_dirty {
            driver.depth_func(self.depth_func);
            self.depth_func_dirty = false;
        }

        // parameters
        if self.cull_face_dirty {
            driver.cull_face(self.cull_face);
            self.cull_face_dirty = false;
        }

        if self.depth_mask_dirty {
            driver.depth_mask(self.depth_mask);
            self.depth_mask_dirty = false;
        }

        if self.z_offset_dirty {
            if z_offset_active {
                driver.polygon_offset(self.z_offset, self.z_offset_units);
            }
            self.z_offset_dirty = false;
        }

        if self.front_face_dirty {
            driver.front_face(self.front_face);
            self.front_face_dirty = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{HeadlessConfig, HeadlessDriver};

    fn driver() -> HeadlessDriver {
        HeadlessDriver::new(HeadlessConfig::default())
    }

    #[test]
    fn fresh_state_applies_everything_once() {
        let mut d = driver();
        let mut s = DepthCullingState::new();
        s.apply(&mut d);
        assert_eq!(d.count("depth_func"), 1);
        assert_eq!(d.count("cull_face"), 1);
        assert!(!s.is_dirty());

        d.clear_calls();
        s.apply(&mut d);
        assert!(d.calls().is_empty());
    }

    #[test]
    fn setting_same_value_is_a_no_op() {
        let mut d = driver();
        let mut s = DepthCullingState::new();
        s.apply(&mut d);
        d.clear_calls();

        s.set_depth_func(CompareFunc::LessEqual);
        s.set_cull(false);
        s.set_z_offset(0.0, 0.0);
        assert!(!s.is_dirty());
        s.apply(&mut d);
        assert!(d.calls().is_empty());
    }

    #[test]
    fn only_changed_fields_are_written() {
        let mut d = driver();
        let mut s = DepthCullingState::new();
        s.apply(&mut d);
        d.clear_calls();

        s.set_depth_func(CompareFunc::Greater);
        s.set_depth_func(CompareFunc::Greater);
        s.apply(&mut d);
        assert_eq!(d.calls().len(), 1);
        assert_eq!(d.calls()[0].name, "depth_func");
    }

    #[test]
    fn z_offset_toggles_polygon_offset() {
        let mut d = driver();
        let mut s = DepthCullingState::new();
        s.apply(&mut d);
        d.clear_calls();

        s.set_z_offset(1.0, 2.0);
        s.apply(&mut d);
        assert_eq!(d.count("polygon_offset"), 1);
        assert_eq!(d.calls()[0].args, "PolygonOffsetFill=true");
    }

    #[test]
    fn toggles_go_before_functions_and_parameters() {
        let mut d = driver();
        let mut s = DepthCullingState::new();
        s.apply(&mut d);
        d.clear_calls();

        s.set_cull_face(Face::Front);
        s.set_depth_mask(false);
        s.set_depth_func(CompareFunc::Always);
        s.set_z_offset(1.0, 1.0);
        s.set_depth_test(false);
        s.set_cull(true);
        s.apply(&mut d);

        let names: Vec<&str> = d.calls().iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            [
                "set_capability",
                "set_capability",
                "set_capability",
                "depth_func",
                "cull_face",
                "depth_mask",
                "polygon_offset",
            ]
        );
    }

    #[test]
    fn reset_marks_dirty() {
        let mut d = driver();
        let mut s = DepthCullingState::new();
        s.set_depth_test(false);
        s.apply(&mut d);
        s.reset();
        assert!(s.is_dirty());
        assert!(s.depth_test());
    }
}
