use std::borrow::Cow;
use std::task::Poll;

use crate::coords::{NormalizedRect, PixelRect};
use crate::device::{
    Attachment, FramebufferTarget, GraphicsDriver, ImageTarget, TexParam, TextureFormat, TextureTarget, Wrap,
};
use crate::error::{EngineError, Result};
use crate::resource::loader::{DecodeError, ImageData};
use crate::resource::resample::{flip_rows, is_pot, nearest_pot, resample_bilinear};
use crate::resource::sampling::{SamplingMode, effective_anisotropy};
use crate::resource::texture::{Framebuffers, MsaaTargets, TextureEntry, checker_pixels};
use crate::resource::{
    DepthStencilOptions, RenderTargetOptions, TextureHandle, TextureInfo, TextureOptions, TextureSource,
};

use super::{Engine, PendingLoad};

/// Called once a URL texture has its pixels.
pub type TextureLoadCallback = Box<dyn FnOnce(TextureHandle)>;
/// Called with the failure reason when a URL texture cannot be loaded.
pub type TextureErrorCallback = Box<dyn FnOnce(TextureHandle, &str)>;

const FALLBACK_SIZE: u32 = 8;

fn fallback_image() -> ImageData {
    ImageData::rgba(FALLBACK_SIZE, FALLBACK_SIZE, checker_pixels(FALLBACK_SIZE))
}

fn apply_options<D: GraphicsDriver>(entry: &mut TextureEntry<D>, options: &TextureOptions) {
    entry.generate_mipmaps = options.generate_mipmaps;
    entry.invert_y = options.invert_y;
    entry.sampling_mode = options.sampling_mode;
}

fn texel_bytes(format: TextureFormat, width: u32, height: u32, depth: u32) -> usize {
    format.bytes_per_texel() * width as usize * height as usize * depth as usize
}

fn check_len(data: &[u8], expected: usize, what: &str) -> Result<()> {
    if data.len() < expected {
        return Err(EngineError::InvalidArgument(format!(
            "{} needs {} bytes, got {}",
            what,
            expected,
            data.len()
        )));
    }
    Ok(())
}

fn check_size(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(EngineError::InvalidArgument(format!("empty texture size {}x{}", width, height)));
    }
    Ok(())
}

fn wrap_param(axis: usize, wrap: Wrap) -> TexParam {
    match axis {
        0 => TexParam::WrapS(wrap),
        1 => TexParam::WrapT(wrap),
        _ => TexParam::WrapR(wrap),
    }
}

impl<D: GraphicsDriver> Engine<D> {
    fn texture_entry(&self, handle: TextureHandle) -> Result<&TextureEntry<D>> {
        self.textures.get(handle.0).ok_or(EngineError::InvalidHandle("texture"))
    }

    fn texture_entry_mut(&mut self, handle: TextureHandle) -> Result<&mut TextureEntry<D>> {
        self.textures.get_mut(handle.0).ok_or(EngineError::InvalidHandle("texture"))
    }

    // ── Creation ──────────────────────────────────────────────────────────

    /// Creates a texture whose pixels come from the image loader.
    ///
    /// The URL goes through `texture_url_transform` first; when the
    /// transformed URL fails, the original one is tried once. After that the
    /// checker fallback is used when enabled (the texture turns ready and
    /// neither callback runs), otherwise `on_error` fires. The load is polled
    /// once right away and then on every [`frame`](Self::frame).
    pub fn create_texture_from_url(
        &mut self,
        url: &str,
        options: TextureOptions,
        on_load: Option<TextureLoadCallback>,
        on_error: Option<TextureErrorCallback>,
    ) -> Result<TextureHandle> {
        let load_url = match &self.options.texture_url_transform {
            Some(transform) => transform(url),
            None => url.to_string(),
        };
        let original_url = (load_url != url).then(|| url.to_string());

        let source = TextureSource::Url { url: load_url.clone(), original_url };
        let mut entry = TextureEntry::new(source, url, TextureTarget::Texture2D, options.format);
        apply_options(&mut entry, &options);
        let handle = self.insert_texture(entry)?;

        self.pending_loads.push(PendingLoad { texture: handle, url: load_url, retried: false, on_load, on_error });
        self.poll_loads(Some(handle));
        Ok(handle)
    }

    /// Decodes `bytes` with the installed decoder and uploads the result.
    pub fn create_texture_from_bytes(
        &mut self,
        bytes: Vec<u8>,
        mime: Option<&str>,
        options: TextureOptions,
    ) -> Result<TextureHandle> {
        let label = format!("data:{}", mime.unwrap_or("application/octet-stream"));
        let image = self.decode(&bytes, mime, &label)?;

        let source = TextureSource::Encoded { bytes, mime: mime.map(str::to_string) };
        let mut entry = TextureEntry::new(source, label, TextureTarget::Texture2D, image.format);
        apply_options(&mut entry, &options);
        let handle = TextureHandle(self.textures.insert(entry));

        let result = self.create_driver_texture(handle).and_then(|()| self.upload_image(handle, image));
        if let Err(err) = result {
            self.destroy_texture(handle);
            return Err(err);
        }
        Ok(handle)
    }

    /// 2D texture from tightly packed texels; `None` allocates storage only.
    pub fn create_raw_texture(
        &mut self,
        data: Option<&[u8]>,
        width: u32,
        height: u32,
        options: TextureOptions,
    ) -> Result<TextureHandle> {
        check_size(width, height)?;
        if let Some(data) = data {
            check_len(data, texel_bytes(options.format, width, height, 1), "raw texture")?;
        }
        let source = TextureSource::Raw { data: data.map(<[u8]>::to_vec) };
        let mut entry = TextureEntry::new(source, "raw", TextureTarget::Texture2D, options.format);
        apply_options(&mut entry, &options);
        entry.set_sizes((width, height, 1), (width, height, 1));
        self.insert_texture(entry)
    }

    /// Cube texture from six faces in +X, -X, +Y, -Y, +Z, -Z order.
    pub fn create_raw_cube_texture(
        &mut self,
        faces: Option<&[&[u8]]>,
        size: u32,
        options: TextureOptions,
    ) -> Result<TextureHandle> {
        check_size(size, size)?;
        if size > self.caps.max_cube_map_texture_size {
            return Err(EngineError::InvalidArgument(format!(
                "cube size {} exceeds {}",
                size, self.caps.max_cube_map_texture_size
            )));
        }
        let faces = match faces {
            Some(faces) => Some(collect_faces(faces, texel_bytes(options.format, size, size, 1))?),
            None => None,
        };
        let mut entry = TextureEntry::new(
            TextureSource::RawCube { faces },
            "raw-cube",
            TextureTarget::CubeMap,
            options.format,
        );
        apply_options(&mut entry, &options);
        entry.wrap = [Wrap::ClampToEdge; 3];
        entry.set_sizes((size, size, 1), (size, size, 1));
        self.insert_texture(entry)
    }

    pub fn create_raw_texture_3d(
        &mut self,
        data: Option<&[u8]>,
        width: u32,
        height: u32,
        depth: u32,
        options: TextureOptions,
    ) -> Result<TextureHandle> {
        if !self.caps.texture_3d {
            return Err(EngineError::Unsupported("3D textures".to_string()));
        }
        check_size(width, height)?;
        let max = self.caps.max_3d_texture_size;
        if depth == 0 || width.max(height).max(depth) > max {
            return Err(EngineError::InvalidArgument(format!(
                "3D texture {}x{}x{} exceeds {}",
                width, height, depth, max
            )));
        }
        if let Some(data) = data {
            check_len(data, texel_bytes(options.format, width, height, depth), "3D texture")?;
        }
        let source = TextureSource::Raw3D { data: data.map(<[u8]>::to_vec) };
        let mut entry = TextureEntry::new(source, "raw-3d", TextureTarget::Texture3D, options.format);
        apply_options(&mut entry, &options);
        entry.set_sizes((width, height, depth), (width, height, depth));
        self.insert_texture(entry)
    }

    pub fn create_raw_texture_2d_array(
        &mut self,
        data: Option<&[u8]>,
        width: u32,
        height: u32,
        layers: u32,
        options: TextureOptions,
    ) -> Result<TextureHandle> {
        if !self.caps.texture_2d_array {
            return Err(EngineError::Unsupported("2D array textures".to_string()));
        }
        check_size(width, height)?;
        if layers == 0 || layers > self.caps.max_array_texture_layers {
            return Err(EngineError::InvalidArgument(format!(
                "{} layers exceeds {}",
                layers, self.caps.max_array_texture_layers
            )));
        }
        if let Some(data) = data {
            check_len(data, texel_bytes(options.format, width, height, layers), "2D array texture")?;
        }
        let source = TextureSource::Raw2DArray { data: data.map(<[u8]>::to_vec) };
        let mut entry = TextureEntry::new(source, "raw-2d-array", TextureTarget::Texture2DArray, options.format);
        apply_options(&mut entry, &options);
        entry.set_sizes((width, height, layers), (width, height, layers));
        self.insert_texture(entry)
    }

    /// Texture with a framebuffer to render into.
    ///
    /// A depth-stencil texture is created and attached when requested and
    /// supported (a renderbuffer otherwise); it is released with the target.
    /// `samples` is clamped to the context maximum.
    pub fn create_render_target_texture(&mut self, options: RenderTargetOptions) -> Result<TextureHandle> {
        check_size(options.width, options.height)?;
        if options.format.is_depth() {
            return Err(EngineError::InvalidArgument(
                "use create_depth_stencil_texture for depth formats".to_string(),
            ));
        }
        if options.is_cube && options.width != options.height {
            return Err(EngineError::InvalidArgument("cube render targets must be square".to_string()));
        }

        let mut options = options;
        options.width = options.width.min(self.caps.max_render_texture_size.max(1));
        options.height = options.height.min(self.caps.max_render_texture_size.max(1));
        let (width, height) = (options.width, options.height);

        let depth_stencil = if options.depth_stencil && self.caps.depth_texture {
            Some(self.create_depth_stencil_texture(DepthStencilOptions {
                width,
                height,
                format: TextureFormat::Depth24Stencil8,
                comparison: None,
                is_cube: options.is_cube,
            })?)
        } else {
            None
        };

        let samples = if self.caps.multisampled_render_targets && !options.is_cube {
            options.samples.clamp(1, self.caps.max_samples.max(1))
        } else {
            1
        };
        let target = if options.is_cube { TextureTarget::CubeMap } else { TextureTarget::Texture2D };

        let mut entry = TextureEntry::new(TextureSource::RenderTarget(options.clone()), "render-target", target, options.format);
        entry.generate_mipmaps = options.generate_mipmaps;
        entry.sampling_mode = options.sampling_mode;
        entry.wrap = [Wrap::ClampToEdge; 3];
        entry.set_sizes((width, height, 1), (width, height, 1));
        entry.depth_stencil = depth_stencil;
        entry.samples = samples;
        self.insert_texture(entry)
    }

    /// Depth (and stencil) texture, optionally with hardware comparison for
    /// shadow samplers.
    pub fn create_depth_stencil_texture(&mut self, options: DepthStencilOptions) -> Result<TextureHandle> {
        if !self.caps.depth_texture {
            return Err(EngineError::Unsupported("depth textures".to_string()));
        }
        check_size(options.width, options.height)?;
        if !options.format.is_depth() {
            return Err(EngineError::InvalidArgument(format!("{:?} is not a depth format", options.format)));
        }
        let target = if options.is_cube { TextureTarget::CubeMap } else { TextureTarget::Texture2D };
        let (width, height) = (options.width, options.height);

        let mut entry = TextureEntry::new(TextureSource::DepthStencil(options.clone()), "depth-stencil", target, options.format);
        entry.sampling_mode = if options.comparison.is_some() { SamplingMode::Bilinear } else { SamplingMode::Nearest };
        entry.comparison = options.comparison;
        entry.wrap = [Wrap::ClampToEdge; 3];
        entry.set_sizes((width, height, 1), (width, height, 1));
        self.insert_texture(entry)
    }

    /// Registers the entry and replays its recipe; the entry is dropped when
    /// that fails.
    fn insert_texture(&mut self, entry: TextureEntry<D>) -> Result<TextureHandle> {
        let handle = TextureHandle(self.textures.insert(entry));
        if let Err(err) = self.realize_texture(handle) {
            self.destroy_texture(handle);
            return Err(err);
        }
        log::debug!("texture {:?} created", handle);
        Ok(handle)
    }

    fn decode(&self, bytes: &[u8], mime: Option<&str>, label: &str) -> Result<ImageData> {
        self.decoder.decode(bytes, mime).map_err(|err| match err {
            DecodeError::Unsupported(format) => EngineError::Unsupported(format!("texture format {}", format)),
            DecodeError::Corrupt(reason) => EngineError::Load { url: label.to_string(), reason },
        })
    }

    // ── Upload ────────────────────────────────────────────────────────────

    fn create_driver_texture(&mut self, handle: TextureHandle) -> Result<()> {
        let texture = self
            .driver
            .create_texture()
            .map_err(|reason| EngineError::creation("texture", reason))?;
        let entry = self.texture_entry_mut(handle)?;
        entry.texture = Some(texture);
        entry.invalidate_applied();
        entry.is_ready = false;
        Ok(())
    }

    fn realize_texture(&mut self, handle: TextureHandle) -> Result<()> {
        self.create_driver_texture(handle)?;
        self.upload_source(handle)
    }

    /// Uploads the entry's recipe into its driver texture. URL sources have
    /// nothing to upload until the loader delivers.
    fn upload_source(&mut self, handle: TextureHandle) -> Result<()> {
        let entry = self.texture_entry_mut(handle)?;
        let label = entry.label.clone();
        let source = std::mem::replace(&mut entry.source, TextureSource::Fallback);

        let result = match &source {
            TextureSource::Url { .. } => Ok(()),
            TextureSource::Encoded { bytes, mime } => self
                .decode(bytes, mime.as_deref(), &label)
                .and_then(|image| self.upload_image(handle, image)),
            TextureSource::Raw { data } => self.upload_raw(handle, ImageTarget::Texture2D, data.as_deref()),
            TextureSource::Raw3D { data } => self.upload_raw(handle, ImageTarget::Texture3D, data.as_deref()),
            TextureSource::Raw2DArray { data } => {
                self.upload_raw(handle, ImageTarget::Texture2DArray, data.as_deref())
            }
            TextureSource::RawCube { faces } => self.upload_raw_cube(handle, faces.as_deref()),
            TextureSource::RenderTarget(options) => self.realize_render_target(handle, options),
            TextureSource::DepthStencil(options) => self.realize_depth_stencil(handle, options),
            TextureSource::Fallback => self.upload_image(handle, fallback_image()),
        };

        if let Some(entry) = self.textures.get_mut(handle.0) {
            entry.source = source;
        }
        result
    }

    /// Binds the texture on the active unit for an upload, bypassing the
    /// binding cache.
    fn bind_for_update(&mut self, handle: TextureHandle) -> Result<D::Texture> {
        let entry = self.texture_entry(handle)?;
        let target = entry.target;
        let texture = entry.texture.ok_or(EngineError::InvalidHandle("texture"))?;
        let unit = self.active_unit.unwrap_or(0);
        self.bind_on_unit(unit, target, Some(texture), true);
        Ok(texture)
    }

    fn upload_image(&mut self, handle: TextureHandle, image: ImageData) -> Result<()> {
        let ImageData { width, height, format, mut pixels } = image;
        check_size(width, height)?;
        check_len(&pixels, texel_bytes(format, width, height, 1), "image")?;

        if self.texture_entry(handle)?.invert_y {
            flip_rows(&mut pixels, width, height, format.bytes_per_texel());
        }
        let storage = self.image_storage_size(width, height);
        let texture = self.bind_for_update(handle)?;
        let stored = self.upload_level(texture, format, (width, height), storage, &pixels);

        let entry = self.texture_entry_mut(handle)?;
        entry.format = format;
        entry.set_sizes((stored.0, stored.1, 1), (width, height, 1));
        self.finish_upload(handle)
    }

    /// Storage size of an image: rescaled to powers of two when the context
    /// lacks NPOT support or `force_pot_textures` is set.
    fn image_storage_size(&self, width: u32, height: u32) -> (u32, u32) {
        if self.options.force_pot_textures || !self.caps.npot_textures {
            let max = self.caps.max_texture_size;
            (nearest_pot(width, max), nearest_pot(height, max))
        } else {
            (self.caps.clamp_texture_size(width), self.caps.clamp_texture_size(height))
        }
    }

    /// Uploads level 0 of the bound 2D texture at `storage` size and returns
    /// the size actually stored.
    fn upload_level(
        &mut self,
        texture: D::Texture,
        format: TextureFormat,
        size: (u32, u32),
        storage: (u32, u32),
        pixels: &[u8],
    ) -> (u32, u32) {
        if size == storage {
            self.driver.tex_image(ImageTarget::Texture2D, 0, format, size.0, size.1, 1, Some(pixels));
            return size;
        }

        if self.caps.blit_framebuffer && !format.is_depth() {
            match self.blit_rescale(texture, format, size, storage, pixels) {
                Ok(()) => return storage,
                Err(err) => log::warn!("GPU rescale failed, resampling on the CPU: {}", err),
            }
        }

        let byte_texels = format.bytes_per_texel() == format.channels() && !format.is_depth();
        if byte_texels {
            if let Some(scaled) = resample_bilinear(pixels, size.0, size.1, format.channels(), storage.0, storage.1) {
                self.driver
                    .tex_image(ImageTarget::Texture2D, 0, format, storage.0, storage.1, 1, Some(&scaled));
                return storage;
            }
        }

        log::warn!(
            "cannot rescale {:?} image {}x{} to {}x{}, keeping its size",
            format,
            size.0,
            size.1,
            storage.0,
            storage.1
        );
        self.driver.tex_image(ImageTarget::Texture2D, 0, format, size.0, size.1, 1, Some(pixels));
        size
    }

    /// Rescales through a framebuffer blit from a temporary source texture.
    fn blit_rescale(
        &mut self,
        destination: D::Texture,
        format: TextureFormat,
        size: (u32, u32),
        storage: (u32, u32),
        pixels: &[u8],
    ) -> Result<()> {
        let source = self
            .driver
            .create_texture()
            .map_err(|reason| EngineError::creation("texture", reason))?;
        let read = match self.driver.create_framebuffer() {
            Ok(fb) => fb,
            Err(reason) => {
                self.driver.delete_texture(source);
                return Err(EngineError::creation("framebuffer", reason));
            }
        };
        let draw = match self.driver.create_framebuffer() {
            Ok(fb) => fb,
            Err(reason) => {
                self.driver.delete_framebuffer(read);
                self.driver.delete_texture(source);
                return Err(EngineError::creation("framebuffer", reason));
            }
        };

        self.driver.tex_image(ImageTarget::Texture2D, 0, format, storage.0, storage.1, 1, None);
        self.driver.bind_texture(TextureTarget::Texture2D, Some(source));
        self.driver.tex_image(ImageTarget::Texture2D, 0, format, size.0, size.1, 1, Some(pixels));

        self.driver.bind_framebuffer(FramebufferTarget::Draw, Some(read));
        self.driver.framebuffer_texture(Attachment::Color(0), ImageTarget::Texture2D, Some(source), 0);
        self.driver.bind_framebuffer(FramebufferTarget::Draw, Some(draw));
        self.driver.framebuffer_texture(Attachment::Color(0), ImageTarget::Texture2D, Some(destination), 0);
        self.driver.bind_framebuffer(FramebufferTarget::Read, Some(read));
        self.driver.blit_framebuffer(size, storage, true);
        self.driver.bind_framebuffer(FramebufferTarget::Read, None);
        self.rebind_current_framebuffer();

        self.driver.delete_framebuffer(read);
        self.driver.delete_framebuffer(draw);
        self.driver.delete_texture(source);
        self.driver.bind_texture(TextureTarget::Texture2D, Some(destination));
        Ok(())
    }

    fn upload_raw(&mut self, handle: TextureHandle, target: ImageTarget, data: Option<&[u8]>) -> Result<()> {
        let entry = self.texture_entry(handle)?;
        let (format, invert_y) = (entry.format, entry.invert_y);
        let (width, height, depth) = (entry.base_width, entry.base_height, entry.base_depth);
        self.bind_for_update(handle)?;

        let pixels: Option<Cow<'_, [u8]>> = match data {
            Some(pixels) if invert_y && depth == 1 => {
                let mut flipped = pixels.to_vec();
                flip_rows(&mut flipped, width, height, format.bytes_per_texel());
                Some(Cow::Owned(flipped))
            }
            other => other.map(Cow::Borrowed),
        };
        self.driver.tex_image(target, 0, format, width, height, depth, pixels.as_deref());
        self.texture_entry_mut(handle)?
            .set_sizes((width, height, depth), (width, height, depth));
        self.finish_upload(handle)
    }

    fn upload_raw_cube(&mut self, handle: TextureHandle, faces: Option<&[Vec<u8>]>) -> Result<()> {
        let entry = self.texture_entry(handle)?;
        let (format, size) = (entry.format, entry.base_width);
        self.bind_for_update(handle)?;
        for face in 0..6u8 {
            let pixels = faces.and_then(|f| f.get(face as usize)).map(Vec::as_slice);
            self.driver.tex_image(ImageTarget::CubeFace(face), 0, format, size, size, 1, pixels);
        }
        self.finish_upload(handle)
    }

    /// Mipmaps, filters and readiness after the texels are in place.
    fn finish_upload(&mut self, handle: TextureHandle) -> Result<()> {
        let npot = self.caps.npot_textures;
        let entry = self.texture_entry_mut(handle)?;
        let pot = is_pot(entry.width) && is_pot(entry.height);
        let mipmaps = entry.generate_mipmaps && (npot || pot) && !entry.format.is_depth();
        if entry.generate_mipmaps && !mipmaps {
            log::debug!("{}: no mipmaps for a {}x{} texture", entry.label, entry.width, entry.height);
        }
        entry.generate_mipmaps = mipmaps;
        let target = entry.target;

        if mipmaps {
            self.driver.generate_mipmap(target);
        }
        self.write_sampling(handle);
        self.texture_entry_mut(handle)?.is_ready = true;
        Ok(())
    }

    fn realize_render_target(&mut self, handle: TextureHandle, options: &RenderTargetOptions) -> Result<()> {
        let entry = self.texture_entry(handle)?;
        let (width, height, samples) = (entry.width, entry.height, entry.samples);
        let depth_texture = entry
            .depth_stencil
            .and_then(|h| self.textures.get(h.0))
            .and_then(|e| e.texture);

        let texture = self.bind_for_update(handle)?;
        let color_target = if options.is_cube { ImageTarget::CubeFace(0) } else { ImageTarget::Texture2D };
        if options.is_cube {
            for face in 0..6u8 {
                self.driver
                    .tex_image(ImageTarget::CubeFace(face), 0, options.format, width, height, 1, None);
            }
        } else {
            self.driver
                .tex_image(ImageTarget::Texture2D, 0, options.format, width, height, 1, None);
        }
        self.finish_upload(handle)?;

        let framebuffer = self
            .driver
            .create_framebuffer()
            .map_err(|reason| EngineError::creation("framebuffer", reason))?;
        self.texture_entry_mut(handle)?.framebuffers =
            Some(Framebuffers { framebuffer, depth_renderbuffer: None, msaa: None });
        self.driver.bind_framebuffer(FramebufferTarget::Draw, Some(framebuffer));
        self.driver.framebuffer_texture(Attachment::Color(0), color_target, Some(texture), 0);

        match depth_texture {
            Some(depth) => {
                self.driver
                    .framebuffer_texture(Attachment::DepthStencil, color_target, Some(depth), 0);
            }
            None if options.depth_stencil => {
                let renderbuffer = self.create_renderbuffer()?;
                self.driver
                    .renderbuffer_storage(renderbuffer, TextureFormat::Depth24Stencil8, 1, width, height);
                self.driver.framebuffer_renderbuffer(Attachment::DepthStencil, Some(renderbuffer));
                self.framebuffers_mut(handle)?.depth_renderbuffer = Some(renderbuffer);
            }
            None => {}
        }

        if samples > 1 {
            let color = self.create_renderbuffer()?;
            let msaa = match self.driver.create_framebuffer() {
                Ok(fb) => fb,
                Err(reason) => {
                    self.driver.delete_renderbuffer(color);
                    return Err(EngineError::creation("framebuffer", reason));
                }
            };
            self.framebuffers_mut(handle)?.msaa = Some(MsaaTargets { framebuffer: msaa, color, depth: None });
            self.driver.bind_framebuffer(FramebufferTarget::Draw, Some(msaa));
            self.driver.renderbuffer_storage(color, options.format, samples, width, height);
            self.driver.framebuffer_renderbuffer(Attachment::Color(0), Some(color));

            if options.depth_stencil {
                let depth = self.create_renderbuffer()?;
                self.driver
                    .renderbuffer_storage(depth, TextureFormat::Depth24Stencil8, samples, width, height);
                self.driver.framebuffer_renderbuffer(Attachment::DepthStencil, Some(depth));
                if let Some(msaa) = self.framebuffers_mut(handle)?.msaa.as_mut() {
                    msaa.depth = Some(depth);
                }
            }
        }

        self.rebind_current_framebuffer();
        Ok(())
    }

    fn realize_depth_stencil(&mut self, handle: TextureHandle, options: &DepthStencilOptions) -> Result<()> {
        if !self.caps.depth_texture {
            return Err(EngineError::Unsupported("depth textures".to_string()));
        }
        let entry = self.texture_entry(handle)?;
        let (width, height, target) = (entry.width, entry.height, entry.target);
        self.bind_for_update(handle)?;
        if options.is_cube {
            for face in 0..6u8 {
                self.driver
                    .tex_image(ImageTarget::CubeFace(face), 0, options.format, width, height, 1, None);
            }
        } else {
            self.driver
                .tex_image(ImageTarget::Texture2D, 0, options.format, width, height, 1, None);
        }
        self.driver.tex_parameter(target, TexParam::Compare(options.comparison));
        self.finish_upload(handle)
    }

    fn create_renderbuffer(&mut self) -> Result<D::Renderbuffer> {
        self.driver
            .create_renderbuffer()
            .map_err(|reason| EngineError::creation("renderbuffer", reason))
    }

    fn framebuffers_mut(&mut self, handle: TextureHandle) -> Result<&mut Framebuffers<D>> {
        self.texture_entry_mut(handle)?
            .framebuffers
            .as_mut()
            .ok_or_else(|| EngineError::InvalidArgument("not a render target".to_string()))
    }

    fn rebind_current_framebuffer(&mut self) {
        let framebuffer = self
            .current_render_target
            .and_then(|h| self.textures.get(h.0))
            .and_then(|e| e.framebuffers.as_ref())
            .map(|f| f.draw_target());
        self.driver.bind_framebuffer(FramebufferTarget::Draw, framebuffer);
    }

    // ── Binding ───────────────────────────────────────────────────────────

    fn activate_unit(&mut self, unit: u32) {
        if self.active_unit != Some(unit) {
            self.driver.active_texture(unit);
            self.active_unit = Some(unit);
        }
    }

    /// Cached `active_texture` + `bind_texture`. Returns `true` when the
    /// driver was called.
    fn bind_on_unit(&mut self, unit: u32, target: TextureTarget, texture: Option<D::Texture>, force: bool) -> bool {
        let current = self.bound_textures.get(&unit).copied();
        let wanted = texture.map(|t| (target, t));
        if !force && current == Some(wanted) {
            return false;
        }

        self.activate_unit(unit);
        match (texture, current.flatten()) {
            (Some(texture), _) => self.driver.bind_texture(target, Some(texture)),
            (None, Some((bound_target, _))) => self.driver.bind_texture(bound_target, None),
            (None, None) => self.driver.bind_texture(target, None),
        }
        self.bound_textures.insert(unit, wanted);
        true
    }

    /// Binds `texture` to `unit` for drawing. Textures that are not ready
    /// bind nothing. Wrap and anisotropy changes are written here, lazily.
    ///
    /// Returns `true` when the binding changed.
    pub fn bind_texture_unit(&mut self, unit: u32, texture: Option<TextureHandle>, force: bool) -> Result<bool> {
        let units = self.caps.max_combined_texture_image_units;
        if unit >= units {
            return Err(EngineError::InvalidArgument(format!(
                "texture unit {} out of range ({} available)",
                unit, units
            )));
        }
        let Some(handle) = texture else {
            return Ok(self.bind_on_unit(unit, TextureTarget::Texture2D, None, force));
        };

        let entry = self.texture_entry(handle)?;
        let target = entry.target;
        let bound = entry.texture.filter(|_| entry.is_ready);
        let changed = self.bind_on_unit(unit, target, bound, force);
        if bound.is_some() {
            self.sync_sampler_params(handle, unit);
        }
        Ok(changed)
    }

    fn write_sampling(&mut self, handle: TextureHandle) {
        let Some(entry) = self.textures.get_mut(handle.0) else { return };
        let (min, mag) = entry.sampling_mode.filters(entry.generate_mipmaps);
        entry.applied_sampling = Some(entry.sampling_mode);
        let target = entry.target;
        self.driver.tex_parameter(target, TexParam::MinFilter(min));
        self.driver.tex_parameter(target, TexParam::MagFilter(mag));
    }

    /// Writes wrap and anisotropy values that differ from the last write.
    /// The texture must be bound on `unit`.
    fn sync_sampler_params(&mut self, handle: TextureHandle, unit: u32) {
        let max_anisotropy = self.caps.max_anisotropy;
        let Some(entry) = self.textures.get_mut(handle.0) else { return };
        let target = entry.target;
        let axes = if target == TextureTarget::Texture3D { 3 } else { 2 };

        let mut writes = Vec::new();
        for axis in 0..axes {
            if entry.applied_wrap[axis] != Some(entry.wrap[axis]) {
                writes.push(wrap_param(axis, entry.wrap[axis]));
                entry.applied_wrap[axis] = Some(entry.wrap[axis]);
            }
        }
        if max_anisotropy > 0.0 {
            let level = effective_anisotropy(entry.sampling_mode, entry.anisotropy, max_anisotropy);
            if entry.applied_anisotropy != Some(level) {
                writes.push(TexParam::MaxAnisotropy(level as f32));
                entry.applied_anisotropy = Some(level);
            }
        }

        if writes.is_empty() {
            return;
        }
        self.activate_unit(unit);
        for param in writes {
            self.driver.tex_parameter(target, param);
        }
    }

    // ── Sampler state ─────────────────────────────────────────────────────

    /// Changes min/mag filtering. Written immediately.
    pub fn update_texture_sampling_mode(&mut self, handle: TextureHandle, mode: SamplingMode) -> Result<()> {
        let entry = self.texture_entry_mut(handle)?;
        entry.sampling_mode = mode;
        if entry.texture.is_none() {
            return Ok(());
        }
        self.bind_for_update(handle)?;
        self.write_sampling(handle);
        let unit = self.active_unit.unwrap_or(0);
        self.sync_sampler_params(handle, unit);
        Ok(())
    }

    /// Changes wrap modes; `None` keeps an axis. Written immediately.
    pub fn update_texture_wrapping_mode(
        &mut self,
        handle: TextureHandle,
        wrap_u: Option<Wrap>,
        wrap_v: Option<Wrap>,
        wrap_r: Option<Wrap>,
    ) -> Result<()> {
        let entry = self.texture_entry_mut(handle)?;
        for (axis, wrap) in [wrap_u, wrap_v, wrap_r].into_iter().enumerate() {
            if let Some(wrap) = wrap {
                entry.wrap[axis] = wrap;
            }
        }
        if entry.texture.is_none() {
            return Ok(());
        }
        self.bind_for_update(handle)?;
        let unit = self.active_unit.unwrap_or(0);
        self.sync_sampler_params(handle, unit);
        Ok(())
    }

    /// Requested anisotropy, applied at the next bind.
    pub fn set_anisotropic_level(&mut self, handle: TextureHandle, level: u32) -> Result<()> {
        self.texture_entry_mut(handle)?.anisotropy = level.max(1);
        Ok(())
    }

    // ── Raw updates ───────────────────────────────────────────────────────

    /// Replaces the texels of a raw 2D, 3D or 2D-array texture.
    pub fn update_raw_texture(&mut self, handle: TextureHandle, data: &[u8]) -> Result<()> {
        let entry = self.texture_entry_mut(handle)?;
        let expected = texel_bytes(entry.format, entry.base_width, entry.base_height, entry.base_depth);
        check_len(data, expected, "raw texture update")?;
        match &mut entry.source {
            TextureSource::Raw { data: stored }
            | TextureSource::Raw3D { data: stored }
            | TextureSource::Raw2DArray { data: stored } => *stored = Some(data.to_vec()),
            other => {
                return Err(EngineError::InvalidArgument(format!("cannot update a {} texture", other.kind())));
            }
        }
        self.upload_source(handle)
    }

    pub fn update_raw_cube_texture(&mut self, handle: TextureHandle, faces: &[&[u8]]) -> Result<()> {
        let entry = self.texture_entry_mut(handle)?;
        let faces = collect_faces(faces, texel_bytes(entry.format, entry.base_width, entry.base_width, 1))?;
        match &mut entry.source {
            TextureSource::RawCube { faces: stored } => *stored = Some(faces),
            other => {
                return Err(EngineError::InvalidArgument(format!("cannot update a {} texture", other.kind())));
            }
        }
        self.upload_source(handle)
    }

    // ── Lifetime ──────────────────────────────────────────────────────────

    /// Adds a user of the texture. Returns the new count.
    pub fn increment_texture_references(&mut self, handle: TextureHandle) -> Result<u32> {
        let entry = self.texture_entry_mut(handle)?;
        entry.references += 1;
        Ok(entry.references)
    }

    /// Drops one reference; the last one deletes the texture and releases
    /// its LOD, irradiance and depth-stencil textures. Stale handles are
    /// ignored.
    pub fn release_texture(&mut self, handle: TextureHandle) {
        let Some(entry) = self.textures.get_mut(handle.0) else { return };
        entry.references = entry.references.saturating_sub(1);
        if entry.references == 0 {
            self.destroy_texture(handle);
        }
    }

    /// Deletes the texture regardless of its reference count.
    pub(super) fn destroy_texture(&mut self, handle: TextureHandle) {
        let Some(entry) = self.textures.remove(handle.0) else { return };
        log::debug!("texture {} released", entry.label);

        if let Some(texture) = entry.texture {
            for bound in self.bound_textures.values_mut() {
                if bound.is_some_and(|(_, t)| t == texture) {
                    *bound = None;
                }
            }
            self.driver.delete_texture(texture);
        }
        if let Some(framebuffers) = entry.framebuffers {
            self.delete_framebuffers(framebuffers);
        }
        if self.current_render_target == Some(handle) {
            self.current_render_target = None;
            self.driver.bind_framebuffer(FramebufferTarget::Draw, None);
        }
        self.pending_loads.retain(|load| load.texture != handle);

        let children = entry.lod_textures.into_iter().chain(entry.irradiance).chain(entry.depth_stencil);
        for child in children {
            self.release_texture(child);
        }
    }

    fn delete_framebuffers(&mut self, framebuffers: Framebuffers<D>) {
        if let Some(msaa) = framebuffers.msaa {
            self.driver.delete_framebuffer(msaa.framebuffer);
            self.driver.delete_renderbuffer(msaa.color);
            if let Some(depth) = msaa.depth {
                self.driver.delete_renderbuffer(depth);
            }
        }
        if let Some(depth) = framebuffers.depth_renderbuffer {
            self.driver.delete_renderbuffer(depth);
        }
        self.driver.delete_framebuffer(framebuffers.framebuffer);
    }

    /// Attaches prefiltered LOD textures (low, mid, high). The texture takes
    /// over one reference of each and releases previously attached ones.
    pub fn attach_lod_textures(&mut self, handle: TextureHandle, lods: &[TextureHandle]) -> Result<()> {
        if let Some(missing) = lods.iter().find(|h| !self.textures.contains(h.0)) {
            return Err(EngineError::InvalidArgument(format!("unknown LOD texture {:?}", missing)));
        }
        let previous = std::mem::replace(&mut self.texture_entry_mut(handle)?.lod_textures, lods.to_vec());
        for lod in previous {
            self.release_texture(lod);
        }
        Ok(())
    }

    /// Attaches an irradiance texture, taking over one reference.
    pub fn attach_irradiance_texture(&mut self, handle: TextureHandle, irradiance: TextureHandle) -> Result<()> {
        if !self.textures.contains(irradiance.0) {
            return Err(EngineError::InvalidHandle("texture"));
        }
        let previous = self.texture_entry_mut(handle)?.irradiance.replace(irradiance);
        if let Some(previous) = previous {
            self.release_texture(previous);
        }
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn texture_info(&self, handle: TextureHandle) -> Option<TextureInfo> {
        self.textures.get(handle.0).map(|e| e.info())
    }

    pub fn is_texture_ready(&self, handle: TextureHandle) -> bool {
        self.textures.get(handle.0).is_some_and(|e| e.is_ready)
    }

    /// Size of the stored texels, after any power-of-two rescale.
    pub fn texture_size(&self, handle: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(handle.0).map(|e| (e.width, e.height))
    }

    /// Size as requested or decoded.
    pub fn texture_base_size(&self, handle: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(handle.0).map(|e| (e.base_width, e.base_height))
    }

    pub fn pending_texture_loads(&self) -> usize {
        self.pending_loads.len()
    }

    // ── Render targets ────────────────────────────────────────────────────

    /// Redirects drawing into a render target and sets the viewport to its
    /// size. `face` selects the cube face for cube targets. A previously
    /// bound target is unbound first.
    pub fn bind_framebuffer(&mut self, handle: TextureHandle, face: Option<u8>) -> Result<()> {
        if let Some(current) = self.current_render_target.filter(|c| *c != handle) {
            self.unbind_framebuffer(current, false)?;
        }

        let entry = self.texture_entry(handle)?;
        let framebuffers = entry
            .framebuffers
            .as_ref()
            .ok_or_else(|| EngineError::InvalidArgument(format!("{} is not a render target", entry.label)))?;
        let draw = framebuffers.draw_target();
        let (texture, target, width, height) = (entry.texture, entry.target, entry.width, entry.height);

        self.driver.bind_framebuffer(FramebufferTarget::Draw, Some(draw));
        if let (Some(face), TextureTarget::CubeMap) = (face, target) {
            self.driver
                .framebuffer_texture(Attachment::Color(0), ImageTarget::CubeFace(face.min(5)), texture, 0);
        }
        self.current_render_target = Some(handle);
        self.viewport
            .set(&mut self.driver, PixelRect::new(0, 0, width as i32, height as i32));
        Ok(())
    }

    /// Ends rendering into `handle`: resolves multisampling and regenerates
    /// mipmaps unless `disable_generate_mipmaps`.
    pub fn unbind_framebuffer(&mut self, handle: TextureHandle, disable_generate_mipmaps: bool) -> Result<()> {
        let entry = self.texture_entry(handle)?;
        let framebuffers = entry
            .framebuffers
            .as_ref()
            .ok_or_else(|| EngineError::InvalidArgument(format!("{} is not a render target", entry.label)))?;
        let resolve = framebuffers.msaa.as_ref().map(|m| (m.framebuffer, framebuffers.framebuffer));
        let (width, height, target, mipmaps) = (entry.width, entry.height, entry.target, entry.generate_mipmaps);

        if self.current_render_target == Some(handle) {
            self.current_render_target = None;
        }
        if let Some((multisampled, resolved)) = resolve {
            self.driver.bind_framebuffer(FramebufferTarget::Read, Some(multisampled));
            self.driver.bind_framebuffer(FramebufferTarget::Draw, Some(resolved));
            self.driver.blit_framebuffer((width, height), (width, height), false);
            self.driver.bind_framebuffer(FramebufferTarget::Read, None);
        }
        if mipmaps && !disable_generate_mipmaps {
            self.bind_for_update(handle)?;
            self.driver.generate_mipmap(target);
        }
        self.driver.bind_framebuffer(FramebufferTarget::Draw, None);
        Ok(())
    }

    /// Back to the drawing buffer with a full viewport.
    pub fn restore_default_framebuffer(&mut self) {
        match self.current_render_target {
            Some(current) => {
                if let Err(err) = self.unbind_framebuffer(current, false) {
                    log::error!("failed to unbind render target: {}", err);
                    self.current_render_target = None;
                    self.driver.bind_framebuffer(FramebufferTarget::Draw, None);
                }
            }
            None => self.driver.bind_framebuffer(FramebufferTarget::Draw, None),
        }
        self.set_viewport(NormalizedRect::FULL, None, None);
    }

    // ── URL loads ─────────────────────────────────────────────────────────

    pub(crate) fn poll_texture_loads(&mut self) {
        self.poll_loads(None);
    }

    /// Polls pending loads, all of them or only those of `only`.
    fn poll_loads(&mut self, only: Option<TextureHandle>) {
        let loads = std::mem::take(&mut self.pending_loads);
        let mut waiting = Vec::with_capacity(loads.len());

        for load in loads {
            if !self.textures.contains(load.texture.0) {
                continue;
            }
            if only.is_some_and(|h| h != load.texture) {
                waiting.push(load);
                continue;
            }
            let poll = match self.image_loader.as_mut() {
                Some(loader) => loader.poll(&load.url),
                None => Poll::Ready(Err("no image loader installed".to_string())),
            };
            let next = match poll {
                Poll::Pending => Some(load),
                Poll::Ready(Ok(image)) => self.complete_load(load, image),
                Poll::Ready(Err(reason)) => self.fail_load(load, reason),
            };
            waiting.extend(next);
        }

        waiting.append(&mut self.pending_loads);
        self.pending_loads = waiting;
    }

    fn complete_load(&mut self, load: PendingLoad, image: ImageData) -> Option<PendingLoad> {
        match self.upload_image(load.texture, image) {
            Ok(()) => {
                if let Some(entry) = self.textures.get_mut(load.texture.0) {
                    entry.load_error = None;
                }
                log::debug!("texture loaded from {}", load.url);
                if let Some(on_load) = load.on_load {
                    on_load(load.texture);
                }
                self.on_texture_loaded.notify(&load.texture);
                None
            }
            Err(err) => self.fail_load(load, err.to_string()),
        }
    }

    /// Retry with the original URL, then the fallback checker, then the
    /// error callback. Returns the load to keep polling, if any.
    fn fail_load(&mut self, load: PendingLoad, reason: String) -> Option<PendingLoad> {
        let entry = self.textures.get_mut(load.texture.0)?;

        if !load.retried {
            if let TextureSource::Url { original_url: Some(original), .. } = &entry.source {
                log::warn!("failed to load {} ({}), retrying with {}", load.url, reason, original);
                let url = original.clone();
                return Some(PendingLoad { url, retried: true, ..load });
            }
        }

        entry.load_error = Some(reason.clone());
        if self.options.use_fallback_texture {
            log::warn!("failed to load {} ({}), using the fallback texture", load.url, reason);
            entry.source = TextureSource::Fallback;
            match self.upload_image(load.texture, fallback_image()) {
                Ok(()) => return None,
                Err(err) => log::error!("fallback texture upload failed: {}", err),
            }
        } else {
            log::error!("failed to load texture {}: {}", load.url, reason);
        }

        if let Some(on_error) = load.on_error {
            on_error(load.texture, &reason);
        }
        None
    }

    // ── Context restore ───────────────────────────────────────────────────

    /// Replays every texture recipe on the new context: depth-stencil
    /// textures first so render targets can attach them, render targets
    /// last. Each recipe is replayed into a temporary entry whose driver
    /// objects then move into the original handle.
    pub(super) fn rebuild_textures(&mut self) {
        let mut ids = self.textures.ids();
        ids.sort_by_key(|id| match self.textures.get(*id).map(|e| &e.source) {
            Some(TextureSource::DepthStencil(_)) => 0,
            Some(TextureSource::RenderTarget(_)) => 2,
            _ => 1,
        });

        for id in ids {
            let handle = TextureHandle(id);
            let Some(entry) = self.textures.get(id) else { continue };
            let template = entry.rebuild_template();
            let reload = match &entry.source {
                TextureSource::Url { url, .. } => Some(url.clone()),
                _ => None,
            };

            let temporary = TextureHandle(self.textures.insert(template));
            let result = self.realize_texture(temporary);
            let Some(rebuilt) = self.textures.remove(temporary.0) else { continue };
            if let Err(err) = &result {
                log::error!("failed to rebuild texture {}: {}", rebuilt.label, err);
            }

            let Some(entry) = self.textures.get_mut(id) else { continue };
            entry.texture = rebuilt.texture;
            entry.framebuffers = rebuilt.framebuffers;
            entry.format = rebuilt.format;
            entry.set_sizes(
                (rebuilt.width, rebuilt.height, rebuilt.depth),
                (rebuilt.base_width, rebuilt.base_height, rebuilt.base_depth),
            );
            entry.generate_mipmaps = rebuilt.generate_mipmaps;
            entry.applied_sampling = rebuilt.applied_sampling;
            entry.applied_wrap = rebuilt.applied_wrap;
            entry.applied_anisotropy = rebuilt.applied_anisotropy;
            entry.is_ready = rebuilt.is_ready && result.is_ok();

            if let Some(url) = reload {
                if !self.pending_loads.iter().any(|l| l.texture == handle) {
                    self.pending_loads.push(PendingLoad {
                        texture: handle,
                        url,
                        retried: false,
                        on_load: None,
                        on_error: None,
                    });
                }
            }
        }
        log::debug!("rebuilt {} textures", self.textures.len());
    }
}

fn collect_faces(faces: &[&[u8]], face_bytes: usize) -> Result<Vec<Vec<u8>>> {
    if faces.len() != 6 {
        return Err(EngineError::InvalidArgument(format!("cube textures need 6 faces, got {}", faces.len())));
    }
    faces
        .iter()
        .map(|face| check_len(face, face_bytes, "cube face").map(|()| face.to_vec()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::core::EngineOptions;
    use crate::device::HeadlessConfig;
    use crate::engine::test_support::*;
    use crate::resource::MemoryImageLoader;

    fn solid_loader(url: &str, width: u32, height: u32) -> MemoryImageLoader {
        let mut loader = MemoryImageLoader::new();
        loader.insert(url, ImageData::solid(width, height, [10, 20, 30, 255]));
        loader
    }

    #[test]
    fn references_keep_textures_alive() {
        let mut e = engine();
        let t = e.create_raw_texture(Some(&[0u8; 16]), 2, 2, TextureOptions::default()).unwrap();
        assert_eq!(e.increment_texture_references(t).unwrap(), 2);
        e.release_texture(t);
        assert!(e.texture_info(t).is_some());
        e.release_texture(t);
        assert!(e.texture_info(t).is_none());
        assert_eq!(e.driver().live_textures(), 0);
        e.release_texture(t);
    }

    #[test]
    fn render_target_owns_its_depth_stencil() {
        let mut e = engine();
        let rt = e
            .create_render_target_texture(RenderTargetOptions {
                width: 64,
                height: 32,
                samples: 8,
                ..Default::default()
            })
            .unwrap();
        let info = e.texture_info(rt).unwrap();
        assert!(info.is_render_target);
        assert_eq!(info.samples, 4);
        assert_eq!(e.texture_count(), 2);

        e.bind_framebuffer(rt, None).unwrap();
        assert_eq!((e.render_width(), e.render_height()), (64, 32));
        e.restore_default_framebuffer();
        assert_eq!(e.driver().count("blit_framebuffer"), 1);
        assert_eq!(e.render_width(), 800);

        e.release_texture(rt);
        assert_eq!(e.texture_count(), 0);
        assert_eq!(e.driver().live_objects(), 0);
    }

    #[test]
    fn npot_images_are_rescaled_without_npot_support() {
        let mut e = engine_with(HeadlessConfig { version: 1, ..Default::default() }, EngineOptions::default());
        e.set_image_loader(solid_loader("a.png", 3, 5));
        let t = e.create_texture_from_url("a.png", TextureOptions::default(), None, None).unwrap();

        assert!(e.is_texture_ready(t));
        assert_eq!(e.texture_size(t), Some((4, 4)));
        assert_eq!(e.texture_base_size(t), Some((3, 5)));
        let texture = e.textures.get(t.0).unwrap().texture.unwrap();
        assert_eq!(e.driver().texture_storage_size(texture), Some((4, 4)));
        assert!(e.texture_info(t).unwrap().generate_mipmaps);
        assert_eq!(e.driver().count("blit_framebuffer"), 0);
    }

    #[test]
    fn forced_pot_uses_a_blit_when_available() {
        let options = EngineOptions { force_pot_textures: true, ..Default::default() };
        let mut e = engine_with(HeadlessConfig::default(), options);
        e.set_image_loader(solid_loader("a.png", 6, 6));
        let t = e.create_texture_from_url("a.png", TextureOptions::default(), None, None).unwrap();
        assert_eq!(e.texture_size(t), Some((8, 8)));
        assert_eq!(e.driver().count("blit_framebuffer"), 1);
        assert_eq!(e.driver().live_textures(), 1);
    }

    #[test]
    fn npot_raw_textures_skip_mipmaps_on_version_one() {
        let mut e = engine_with(HeadlessConfig { version: 1, ..Default::default() }, EngineOptions::default());
        let t = e.create_raw_texture(Some(&[0u8; 3 * 4]), 3, 1, TextureOptions::default()).unwrap();
        assert_eq!(e.texture_size(t), Some((3, 1)));
        assert!(!e.texture_info(t).unwrap().generate_mipmaps);
        assert_eq!(e.driver().count("generate_mipmap"), 0);
    }

    #[test]
    fn transformed_url_falls_back_to_the_original() {
        let options = EngineOptions {
            texture_url_transform: Some(Rc::new(|url: &str| format!("cdn/{}", url))),
            ..Default::default()
        };
        let mut e = engine_with(HeadlessConfig::default(), options);
        e.set_image_loader(solid_loader("a.png", 2, 2));
        let loaded = Rc::new(Cell::new(false));
        let l = loaded.clone();

        let t = e
            .create_texture_from_url("a.png", TextureOptions::default(), Some(Box::new(move |_| l.set(true))), None)
            .unwrap();
        assert!(!e.is_texture_ready(t));
        assert_eq!(e.pending_texture_loads(), 1);

        e.poll_texture_loads();
        assert!(loaded.get());
        assert!(e.is_texture_ready(t));
        assert_eq!(e.pending_texture_loads(), 0);
    }

    #[test]
    fn failed_loads_use_the_checker_fallback() {
        let mut e = engine();
        e.set_image_loader(MemoryImageLoader::new());
        let errors = Rc::new(Cell::new(0));
        let n = errors.clone();
        let t = e
            .create_texture_from_url(
                "missing.png",
                TextureOptions::default(),
                None,
                Some(Box::new(move |_, _| n.set(n.get() + 1))),
            )
            .unwrap();

        let info = e.texture_info(t).unwrap();
        assert!(info.is_ready);
        assert_eq!(info.kind, "fallback");
        assert_eq!(info.load_error.as_deref(), Some("not found: missing.png"));
        assert_eq!(e.texture_size(t), Some((8, 8)));
        assert_eq!(errors.get(), 0);
    }

    #[test]
    fn failed_loads_report_without_fallback() {
        let options = EngineOptions { use_fallback_texture: false, ..Default::default() };
        let mut e = engine_with(HeadlessConfig::default(), options);
        e.set_image_loader(MemoryImageLoader::new().with_latency(1));
        let reason = Rc::new(RefCell::new(String::new()));
        let r = reason.clone();
        let t = e
            .create_texture_from_url(
                "missing.png",
                TextureOptions::default(),
                None,
                Some(Box::new(move |_, msg| *r.borrow_mut() = msg.to_string())),
            )
            .unwrap();
        assert!(reason.borrow().is_empty());

        e.frame();
        assert_eq!(*reason.borrow(), "not found: missing.png");
        assert!(!e.is_texture_ready(t));
    }

    #[test]
    fn unit_bindings_and_sampler_params_are_cached() {
        let mut e = engine();
        let t = e.create_raw_texture(Some(&[0u8; 16]), 2, 2, TextureOptions::default()).unwrap();
        e.driver_mut().clear_calls();

        assert!(e.bind_texture_unit(1, Some(t), false).unwrap());
        assert!(!e.bind_texture_unit(1, Some(t), false).unwrap());
        assert_eq!(e.driver().count("bind_texture"), 1);
        assert_eq!(e.driver().count("tex_parameter"), 2);

        e.update_texture_wrapping_mode(t, Some(Wrap::ClampToEdge), None, None).unwrap();
        assert_eq!(e.driver().count("tex_parameter"), 3);
        assert_eq!(e.driver().count("bind_texture"), 2);

        assert!(e.bind_texture_unit(32, Some(t), false).is_err());
    }

    #[test]
    fn raw_updates_validate_length() {
        let mut e = engine();
        let t = e.create_raw_texture(None, 2, 2, TextureOptions::default()).unwrap();
        assert!(e.update_raw_texture(t, &[0u8; 4]).is_err());
        e.update_raw_texture(t, &[7u8; 16]).unwrap();
        assert!(e.is_texture_ready(t));

        let cube = e.create_raw_cube_texture(None, 4, TextureOptions::default()).unwrap();
        assert!(e.update_raw_texture(cube, &[0u8; 64]).is_err());
        let face = [0u8; 64];
        let faces: [&[u8]; 6] = [&face; 6];
        e.update_raw_cube_texture(cube, &faces).unwrap();
    }

    #[test]
    fn version_one_rejects_3d_textures() {
        let mut e = engine_with(HeadlessConfig { version: 1, ..Default::default() }, EngineOptions::default());
        let err = e.create_raw_texture_3d(None, 4, 4, 4, TextureOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::Unsupported(_)));
    }

    #[test]
    fn releasing_a_parent_releases_attached_textures() {
        let mut e = engine();
        let base = e.create_raw_texture(None, 2, 2, TextureOptions::default()).unwrap();
        let lods: Vec<_> = (0..3)
            .map(|_| e.create_raw_texture(None, 2, 2, TextureOptions::default()).unwrap())
            .collect();
        let irradiance = e.create_raw_texture(None, 2, 2, TextureOptions::default()).unwrap();
        e.attach_lod_textures(base, &lods).unwrap();
        e.attach_irradiance_texture(base, irradiance).unwrap();
        assert_eq!(e.texture_count(), 5);
        e.release_texture(base);
        assert_eq!(e.texture_count(), 0);
    }
}
