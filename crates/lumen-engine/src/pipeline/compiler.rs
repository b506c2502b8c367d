//! Driver-level compile, link and reflection steps.

use std::collections::HashMap;

use lumen_shader::to_define_line;

use crate::device::{GraphicsDriver, ShaderStage, UniformValue};
use crate::error::{EngineError, Result};

/// Driver objects of a submitted, possibly still linking, program.
pub(crate) struct Submitted<D: GraphicsDriver> {
    pub program: D::Program,
    pub vertex: D::Shader,
    pub fragment: D::Shader,
}

/// Locations discovered after a successful link.
pub(crate) struct Reflection<D: GraphicsDriver> {
    pub attribute_locations: Vec<Option<u32>>,
    pub uniforms: HashMap<String, D::UniformLocation>,
    /// Samplers with an active uniform, in unit order.
    pub samplers: Vec<String>,
}

impl<D: GraphicsDriver> Reflection<D> {
    pub fn sampler_unit(&self, name: &str) -> Option<u32> {
        self.samplers.iter().position(|s| s == name).map(|i| i as u32)
    }
}

/// Text handed to the driver: version header, define lines, `SHADER_NAME`,
/// then the processed source.
pub fn assemble(version: u32, defines: &[String], stage: ShaderStage, name: &str, processed: &str) -> String {
    let mut out = String::with_capacity(processed.len() + 64);
    if version >= 2 && !processed.trim_start().starts_with("#version") {
        out.push_str("#version 300 es\n");
    }
    for line in defines.iter().filter_map(|d| to_define_line(d)) {
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str(&format!("#define SHADER_NAME {}:{}\n", stage.as_str(), name));
    out.push_str(processed);
    out
}

/// Compiles both stages and links. Link status is not checked here.
pub(crate) fn submit<D: GraphicsDriver>(driver: &mut D, vertex: &str, fragment: &str) -> Result<Submitted<D>> {
    let vs = driver
        .create_shader(ShaderStage::Vertex)
        .map_err(|e| EngineError::creation("vertex shader", e))?;
    driver.compile_shader(vs, vertex);

    let fs = match driver.create_shader(ShaderStage::Fragment) {
        Ok(fs) => fs,
        Err(e) => {
            driver.delete_shader(vs);
            return Err(EngineError::creation("fragment shader", e));
        }
    };
    driver.compile_shader(fs, fragment);

    let program = match driver.create_program() {
        Ok(p) => p,
        Err(e) => {
            driver.delete_shader(vs);
            driver.delete_shader(fs);
            return Err(EngineError::creation("program", e));
        }
    };
    driver.attach_shader(program, vs);
    driver.attach_shader(program, fs);
    driver.link_program(program);

    Ok(Submitted { program, vertex: vs, fragment: fs })
}

/// Link outcome; the error names the failing stage when a shader did not compile.
pub(crate) fn link_result<D: GraphicsDriver>(driver: &D, s: &Submitted<D>) -> std::result::Result<(), String> {
    if driver.program_link_status(s.program) {
        return Ok(());
    }
    if !driver.shader_compile_status(s.vertex) {
        return Err(format!("VERTEX SHADER {}", driver.shader_info_log(s.vertex)));
    }
    if !driver.shader_compile_status(s.fragment) {
        return Err(format!("FRAGMENT SHADER {}", driver.shader_info_log(s.fragment)));
    }
    Err(driver.program_info_log(s.program))
}

/// Shaders are no longer needed once the program linked.
pub(crate) fn release_shaders<D: GraphicsDriver>(driver: &mut D, s: &Submitted<D>) {
    driver.delete_shader(s.vertex);
    driver.delete_shader(s.fragment);
}

pub(crate) fn release<D: GraphicsDriver>(driver: &mut D, s: Submitted<D>) {
    release_shaders(driver, &s);
    driver.delete_program(s.program);
}

/// Resolves locations and binds every active sampler to its unit.
///
/// Leaves `program` current on the driver.
pub(crate) fn reflect<D: GraphicsDriver>(
    driver: &mut D,
    program: D::Program,
    attributes: &[String],
    uniforms: &[String],
    samplers: &[String],
) -> Reflection<D> {
    let attribute_locations = attributes.iter().map(|a| driver.attrib_location(program, a)).collect();

    let mut locations = HashMap::new();
    for name in uniforms.iter().chain(samplers) {
        if let Some(loc) = driver.uniform_location(program, name) {
            locations.insert(name.clone(), loc);
        }
    }

    let active: Vec<String> = samplers.iter().filter(|s| locations.contains_key(*s)).cloned().collect();

    driver.use_program(Some(program));
    for (unit, name) in active.iter().enumerate() {
        if let Some(loc) = locations.get(name) {
            driver.set_uniform(loc, &UniformValue::Int(unit as i32));
        }
    }

    Reflection { attribute_locations, uniforms: locations, samplers: active }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{HeadlessConfig, HeadlessDriver};

    const VS: &str = "in vec3 position;\nin vec2 uv;\nuniform mat4 world;\nvoid main() { gl_Position = world * vec4(position, 1.0); }";
    const FS: &str = "uniform sampler2D unusedMap;\nuniform sampler2D albedo;\nuniform sampler2D detail;\nvoid main() { glFragColor = texture(albedo, vec2(0.0)) * texture(detail, vec2(0.0)); }";

    #[test]
    fn assemble_orders_header_defines_name() {
        let text = assemble(2, &["FOG".into(), "N 3".into()], ShaderStage::Fragment, "std", "void main(){}\n");
        assert_eq!(
            text,
            "#version 300 es\n#define FOG\n#define N 3\n#define SHADER_NAME fragment:std\nvoid main(){}\n"
        );
        assert!(!assemble(1, &[], ShaderStage::Vertex, "a", "x").starts_with("#version"));
    }

    #[test]
    fn sampler_table_drops_inactive_and_renumbers() {
        let mut d = HeadlessDriver::new(HeadlessConfig::default());
        let s = submit(&mut d, VS, FS).unwrap();
        assert!(link_result(&d, &s).is_ok());

        let samplers = vec!["unusedMap".to_string(), "albedo".to_string(), "detail".to_string()];
        let r = reflect(&mut d, s.program, &["uv".into(), "position".into(), "color".into()], &["world".into()], &samplers);

        assert_eq!(r.samplers, vec!["albedo", "detail"]);
        assert_eq!(r.sampler_unit("detail"), Some(1));
        assert_eq!(r.attribute_locations, vec![Some(1), Some(0), None]);
        assert_eq!(d.uniform_value(s.program, "albedo"), Some("Int(0)"));
        assert_eq!(d.uniform_value(s.program, "detail"), Some("Int(1)"));
    }

    #[test]
    fn failing_stage_is_named() {
        let mut d = HeadlessDriver::new(HeadlessConfig::default());
        let s = submit(&mut d, VS, "#error broken\nvoid main(){}").unwrap();
        let err = link_result(&d, &s).unwrap_err();
        assert_eq!(err, "FRAGMENT SHADER ERROR: 0:1: '#error' : broken");
        release(&mut d, s);
        assert_eq!(d.live_objects(), 0);
    }
}
