//! Headless walkthrough of the engine: a textured quad rendered through a
//! multisampled render target, with a context loss in the middle of the run.
//!
//! `RUST_LOG=debug cargo run -p lumen-studio` shows the cache and rebuild
//! traffic.

use std::cell::Cell;
use std::rc::Rc;

use anyhow::{Context, Result};
use lumen_engine::Engine;
use lumen_engine::coords::{Color4, NormalizedRect};
use lumen_engine::core::EngineOptions;
use lumen_engine::device::{HeadlessConfig, HeadlessDriver, PrimitiveMode, ShaderStage, UniformValue};
use lumen_engine::logging::{LoggingConfig, init_logging, recent_entries};
use lumen_engine::pipeline::{EffectFallbacks, ProgramDescriptor};
use lumen_engine::resource::{
    ImageData, IndexData, MemoryImageLoader, RenderTargetOptions, TextureHandle, TextureOptions, VertexAttribute,
};

const FRAMES: u32 = 8;
const LOSE_AT: u32 = 3;
const RESTORE_AT: u32 = 5;

const VERTEX: &str = "\
attribute vec3 position;
attribute vec2 uv;
uniform mat4 world;
varying vec2 vUV;
void main() {
    vUV = uv;
    gl_Position = world * vec4(position, 1.0);
}
";

const FRAGMENT: &str = "\
uniform sampler2D albedo;
uniform vec4 tint;
varying vec2 vUV;
#ifdef FOG
#include<fogDeclaration>
#endif
void main() {
    vec4 color = texture2D(albedo, vUV) * tint;
#ifdef FOG
    color.rgb = applyFog(color.rgb);
#endif
    gl_FragColor = color;
}
";

const FOG: &str = "\
uniform float fogDensity;
vec3 applyFog(vec3 color) { return mix(color, vec3(0.5), fogDensity); }";

const IDENTITY: [f32; 16] = [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0];

/// Interleaved position (xyz) and uv for a unit quad.
const QUAD: [f32; 20] = [
    -1.0, -1.0, 0.0, 0.0, 0.0, //
    1.0, -1.0, 0.0, 1.0, 0.0, //
    1.0, 1.0, 0.0, 1.0, 1.0, //
    -1.0, 1.0, 0.0, 0.0, 1.0,
];

fn checker(size: u32) -> ImageData {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let v = if (x + y) % 2 == 0 { 230 } else { 40 };
            pixels.extend_from_slice(&[v, v, v, 255]);
        }
    }
    ImageData::rgba(size, size, pixels)
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let mut engine = Engine::new(HeadlessDriver::new(HeadlessConfig::default()), EngineOptions::default());
    engine.register_shader("mesh", ShaderStage::Vertex, VERTEX);
    engine.register_shader("mesh", ShaderStage::Fragment, FRAGMENT);
    engine.register_include("fogDeclaration", FOG);

    let mut loader = MemoryImageLoader::new().with_latency(2);
    loader.insert("textures/checker.png", checker(64));
    engine.set_image_loader(loader);

    let mut fallbacks = EffectFallbacks::new();
    fallbacks.add_fallback(0, "FOG");
    let program = engine
        .create_program(
            ProgramDescriptor::named("mesh")
                .attributes(&["position", "uv"])
                .uniforms(&["world", "tint", "fogDensity"])
                .samplers(&["albedo"])
                .defines(&["FOG"])
                .fallbacks(fallbacks),
        )
        .context("creating the mesh program")?;

    let loaded = Rc::new(Cell::new(false));
    let flag = loaded.clone();
    let albedo = engine.create_texture_from_url(
        "textures/checker.png",
        TextureOptions::default(),
        Some(Box::new(move |_| flag.set(true))),
        None,
    )?;
    let target = engine
        .create_render_target_texture(RenderTargetOptions { width: 256, height: 256, samples: 4, ..Default::default() })
        .context("creating the offscreen target")?;

    let vertices = engine.create_vertex_buffer(&QUAD)?;
    let indices = engine.create_index_buffer(IndexData::Values(&[0, 1, 2, 0, 2, 3]), false)?;
    let layout = vec![
        VertexAttribute::new("position", vertices, 3).with_layout(20, 0),
        VertexAttribute::new("uv", vertices, 2).with_layout(20, 12),
    ];

    engine.run_render_loop(move |e, time| {
        let pass = |e: &mut Engine<HeadlessDriver>, texture: TextureHandle, tint: [f32; 4]| -> lumen_engine::Result<()> {
            e.set_viewport(NormalizedRect::FULL, None, None);
            if !e.is_program_ready(program) {
                return Ok(());
            }
            e.enable_program(program)?;
            e.set_uniform(program, "world", UniformValue::Mat4(IDENTITY))?;
            e.set_uniform(program, "tint", UniformValue::Vec4(tint))?;
            e.set_uniform(program, "fogDensity", UniformValue::Float(0.25))?;
            e.set_texture(program, "albedo", Some(texture))?;
            e.bind_buffers(&layout, Some(indices), Some(program))?;
            e.clear(Some(Color4::BLACK), true, true, false);
            e.draw_elements(PrimitiveMode::Triangles, 0, 6, 1);
            Ok(())
        };

        let result = e
            .bind_framebuffer(target, None)
            .and_then(|()| pass(e, albedo, [1.0, 0.8, 0.6, 1.0]))
            .and_then(|()| e.unbind_framebuffer(target, false))
            .and_then(|()| {
                e.restore_default_framebuffer();
                pass(e, target, [1.0, 1.0, 1.0, 1.0])
            });
        if let Err(err) = result {
            log::error!("frame {} failed: {}", time.frame_index, err);
            e.stop_render_loop();
        }
    });

    let mut digests = Vec::new();
    for frame in 0..FRAMES {
        match frame {
            LOSE_AT => engine.driver_mut().lose_context(),
            RESTORE_AT => engine.driver_mut().restore_context(),
            _ => {}
        }
        let rendered = engine.frame();
        let digest = engine.driver().last_frame_digest();
        log::info!(
            "frame {}: rendered={} lost={} texture_ready={} digest={:016x}",
            frame,
            rendered,
            engine.is_context_lost(),
            engine.is_texture_ready(albedo),
            digest.unwrap_or(0)
        );
        if rendered {
            digests.push((frame, digest));
        }
    }

    let before = digests.iter().filter(|(f, _)| *f < LOSE_AT).last().and_then(|(_, d)| *d);
    let after = digests.last().and_then(|(_, d)| *d);
    println!("frames rendered : {}", digests.len());
    println!("draw calls      : {}", engine.driver().draw_calls());
    println!("texture loaded  : {}", loaded.get());
    println!("programs cached : {}", engine.cached_program_count());
    println!("restore matches : {}", before.is_some() && before == after);

    let warnings = recent_entries().into_iter().filter(|e| e.level <= log::Level::Warn).count();
    println!("warnings logged : {}", warnings);

    let driver = engine.dispose();
    println!("objects leaked  : {}", driver.live_objects());
    Ok(())
}
