use crate::device::{Capability, CompareFunc, GraphicsDriver, StencilOp};

/// Stencil test, write mask, function and operations.
#[derive(Debug, Clone, PartialEq)]
pub struct StencilState {
    test: bool,
    mask: u32,
    func: CompareFunc,
    func_ref: i32,
    func_mask: u32,
    op_stencil_fail: StencilOp,
    op_depth_fail: StencilOp,
    op_pass: StencilOp,

    test_dirty: bool,
    mask_dirty: bool,
    func_dirty: bool,
    op_dirty: bool,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            test: false,
            mask: 0xFF,
            func: CompareFunc::Always,
            func_ref: 1,
            func_mask: 0xFF,
            op_stencil_fail: StencilOp::Keep,
            op_depth_fail: StencilOp::Keep,
            op_pass: StencilOp::Replace,
            test_dirty: true,
            mask_dirty: true,
            func_dirty: true,
            op_dirty: true,
        }
    }
}

impl StencilState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_dirty(&self) -> bool {
        self.test_dirty || self.mask_dirty || self.func_dirty || self.op_dirty
    }

    pub fn test(&self) -> bool {
        self.test
    }

    pub fn set_test(&mut self, enabled: bool) {
        if self.test != enabled {
            self.test = enabled;
            self.test_dirty = true;
        }
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn set_mask(&mut self, mask: u32) {
        if self.mask != mask {
            self.mask = mask;
            self.mask_dirty = true;
        }
    }

    pub fn func(&self) -> (CompareFunc, i32, u32) {
        (self.func, self.func_ref, self.func_mask)
    }

    pub fn set_func(&mut self, func: CompareFunc) {
        if self.func != func {
            self.func = func;
            self.func_dirty = true;
        }
    }

    pub fn set_func_ref(&mut self, reference: i32) {
        if self.func_ref != reference {
            self.func_ref = reference;
            self.func_dirty = true;
        }
    }

    pub fn set_func_mask(&mut self, mask: u32) {
        if self.func_mask != mask {
            self.func_mask = mask;
            self.func_dirty = true;
        }
    }

    pub fn ops(&self) -> (StencilOp, StencilOp, StencilOp) {
        (self.op_stencil_fail, self.op_depth_fail, self.op_pass)
    }

    pub fn set_op_stencil_fail(&mut self, op: StencilOp) {
        if self.op_stencil_fail != op {
            self.op_stencil_fail = op;
            self.op_dirty = true;
        }
    }

    pub fn set_op_depth_fail(&mut self, op: StencilOp) {
        if self.op_depth_fail != op {
            self.op_depth_fail = op;
            self.op_dirty = true;
        }
    }

    pub fn set_op_pass(&mut self, op: StencilOp) {
        if self.op_pass != op {
            self.op_pass = op;
            self.op_dirty = true;
        }
    }

    pub fn apply<D: GraphicsDriver>(&mut self, driver: &mut D) {
        if !self.is_dirty() {
            return;
        }

        if self.test_dirty {
            driver.set_capability(Capability::StencilTest, self.test);
            self.test_dirty = false;
        }

        if self.func_dirty {
            driver.stencil_func(self.func, self.func_ref, self.func_mask);
            self.func_dirty = false;
        }

        if self.mask_dirty {
            driver.stencil_mask(self.mask);
            self.mask_dirty = false;
        }

        if self.op_dirty {
            driver.stencil_op(self.op_stencil_fail, self.op_depth_fail, self.op_pass);
            self.op_dirty = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{HeadlessConfig, HeadlessDriver};

    #[test]
    fn func_ref_and_mask_share_one_call() {
        let mut d = HeadlessDriver::new(HeadlessConfig::default());
        let mut s = StencilState::new();
        s.apply(&mut d);
        d.clear_calls();

        s.set_func(CompareFunc::Equal);
        s.set_func_ref(3);
        s.set_func_mask(0x0F);
        s.apply(&mut d);
        assert_eq!(d.calls().len(), 1);
        assert_eq!(d.calls()[0].args, "Equal 3 0xf");
    }

    #[test]
    fn fresh_state_writes_toggle_then_func_then_params() {
        let mut d = HeadlessDriver::new(HeadlessConfig::default());
        let mut s = StencilState::new();
        s.apply(&mut d);
        let names: Vec<&str> = d.calls().iter().map(|c| c.name).collect();
        assert_eq!(names, ["set_capability", "stencil_func", "stencil_mask", "stencil_op"]);
    }

    #[test]
    fn unchanged_state_writes_nothing() {
        let mut d = HeadlessDriver::new(HeadlessConfig::default());
        let mut s = StencilState::new();
        s.apply(&mut d);
        d.clear_calls();
        s.set_test(false);
        s.set_mask(0xFF);
        s.set_op_pass(StencilOp::Replace);
        s.apply(&mut d);
        assert!(d.calls().is_empty());
    }
}
