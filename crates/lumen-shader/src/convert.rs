//! GLSL ES 1.00 -> 3.00 source conversion.

use crate::processor::ShaderStage;

const FRAG_OUTPUT: &str = "glFragColor";
const FRAG_OUTPUT_DECL: &str = "layout(location = 0) out vec4 glFragColor;";

/// Extensions whose functionality is core in GLSL ES 3.00.
const CORE_EXTENSIONS: [&str; 5] = [
    "GL_OVR_multiview2",
    "GL_OES_standard_derivatives",
    "GL_EXT_shader_texture_lod",
    "GL_EXT_frag_depth",
    "GL_EXT_draw_buffers",
];

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Replaces whole-identifier occurrences of `from` with `to`.
pub(crate) fn replace_word(src: &str, from: &str, to: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut rest = src;

    while let Some(i) = rest.find(from) {
        let before = rest[..i].chars().next_back();
        let after = rest[i + from.len()..].chars().next();
        out.push_str(&rest[..i]);
        if before.is_some_and(is_ident) || after.is_some_and(is_ident) {
            out.push_str(from);
        } else {
            out.push_str(to);
        }
        rest = &rest[i + from.len()..];
    }
    out.push_str(rest);
    out
}

fn is_core_extension_line(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("#extension") && CORE_EXTENSIONS.iter().any(|e| t.contains(e))
}

/// Rewrites a processed GLSL ES 1.00 source for a version-3 context.
///
/// Sources that already declare `#version 3xx` are returned unchanged.
pub fn to_gles3(src: &str, stage: ShaderStage) -> String {
    if src.contains("#version 3") {
        return src.to_string();
    }

    let mut code = String::with_capacity(src.len() + FRAG_OUTPUT_DECL.len());
    for line in src.lines().filter(|l| !is_core_extension_line(l)) {
        code.push_str(line);
        code.push('\n');
    }

    code = replace_word(&code, "attribute", "in");
    code = replace_word(
        &code,
        "varying",
        match stage {
            ShaderStage::Vertex => "out",
            ShaderStage::Fragment => "in",
        },
    );
    for (from, to) in [
        ("texture2DLodEXT", "textureLod"),
        ("textureCubeLodEXT", "textureLod"),
        ("texture2DLod", "textureLod"),
        ("textureCubeLod", "textureLod"),
        ("texture2D", "texture"),
        ("textureCube", "texture"),
        ("gl_FragDepthEXT", "gl_FragDepth"),
    ] {
        code = replace_word(&code, from, to);
    }

    if stage == ShaderStage::Fragment {
        let uses_color = code.contains("gl_FragColor");
        code = replace_word(&code, "gl_FragColor", FRAG_OUTPUT);
        if uses_color && !code.contains(FRAG_OUTPUT_DECL) {
            code = match code.find("void main(") {
                Some(i) => format!("{}{}\n{}", &code[..i], FRAG_OUTPUT_DECL, &code[i..]),
                None => format!("{}\n{}", FRAG_OUTPUT_DECL, code),
            };
        }
    }

    code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_replacement_respects_identifiers() {
        assert_eq!(replace_word("texture2D(t, uv)", "texture2D", "texture"), "texture(t, uv)");
        assert_eq!(replace_word("mytexture2D(t)", "texture2D", "texture"), "mytexture2D(t)");
        assert_eq!(replace_word("attributes", "attribute", "in"), "attributes");
    }

    #[test]
    fn vertex_conversion() {
        let out = to_gles3("attribute vec3 position;\nvarying vec2 vUV;\n", ShaderStage::Vertex);
        assert_eq!(out, "in vec3 position;\nout vec2 vUV;\n");
    }

    #[test]
    fn fragment_conversion_declares_output() {
        let src = "#extension GL_OES_standard_derivatives : enable\nvarying vec2 vUV;\nvoid main() {\ngl_FragColor = texture2D(s, vUV);\n}\n";
        let out = to_gles3(src, ShaderStage::Fragment);
        assert_eq!(
            out,
            "in vec2 vUV;\nlayout(location = 0) out vec4 glFragColor;\nvoid main() {\nglFragColor = texture(s, vUV);\n}\n"
        );
    }

    #[test]
    fn lod_variants_map_to_texture_lod() {
        let out = to_gles3("textureCubeLodEXT(c, d, 0.0);\n", ShaderStage::Fragment);
        assert_eq!(out, "textureLod(c, d, 0.0);\n");
    }

    #[test]
    fn version_three_sources_are_untouched() {
        let src = "#version 300 es\nattribute vec3 p;\n";
        assert_eq!(to_gles3(src, ShaderStage::Vertex), src);
    }
}
