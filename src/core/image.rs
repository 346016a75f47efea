//! Device-resident images.
//!
//! An [`ImObject`] always owns a sampled/storage texture. A linear buffer
//! (one packed RGBA8 word per pixel) exists only when the operation that
//! produced the image wrote through to it. Host bytes and statistics are
//! materialised lazily and cached for the object's lifetime; an image is
//! never mutated after construction.

use crate::core::device::{transfer_usage, DeviceEnv};
use crate::core::error::{Result, ValidationError};
use crate::core::registry::{KernelRegistry, KernelSet, Program, ProgramKernels};
use crate::core::stats::{HistogramAccumulator, Histograms, ImageStats};
use crate::core::tables::LookupTables;
use crate::core::types::{ChannelLayout, ColorSpace, Gamma, Size, WriteMode};
use bytemuck::{Pod, Zeroable};
use rayon::prelude::*;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Shared ownership of an image.
pub type ImPtr = Arc<ImObject>;

/// Pixels per rayon task when packing uploads.
const CHUNK_PIXELS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TransferKernel {
    Normalise,
    Denormalise,
}

impl KernelSet for TransferKernel {
    const PROGRAM: Program = Program::Transfer;

    fn all() -> &'static [Self] {
        &[TransferKernel::Normalise, TransferKernel::Denormalise]
    }

    fn entry_point(self) -> &'static str {
        match self {
            TransferKernel::Normalise => "normalise",
            TransferKernel::Denormalise => "denormalise",
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct TransferParams {
    size: [u32; 2],
    encode: u32,
    _pad: u32,
}

/// What every image needs to move pixels between host and device.
pub struct ImageContext {
    env: Arc<DeviceEnv>,
    tables: &'static LookupTables,
    transfer: ProgramKernels<TransferKernel>,
}

impl ImageContext {
    /// Resolve the transfer kernels from a compiled registry.
    pub fn new(
        env: Arc<DeviceEnv>,
        registry: &KernelRegistry,
        tables: &'static LookupTables,
    ) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            env,
            tables,
            transfer: registry.resolve()?,
        }))
    }

    /// The device environment.
    pub fn env(&self) -> &Arc<DeviceEnv> {
        &self.env
    }

    /// The process lookup tables.
    pub fn tables(&self) -> &'static LookupTables {
        self.tables
    }
}

impl fmt::Debug for ImageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageContext").field("env", &self.env).finish_non_exhaustive()
    }
}

/// One RGB(A) image resident on the accelerator.
pub struct ImObject {
    size: Size,
    view: wgpu::TextureView,
    texture: wgpu::Texture,
    buffer: Option<wgpu::Buffer>,
    gamma: Gamma,
    space: ColorSpace,
    host: [OnceLock<Vec<u8>>; 2],
    stats: OnceLock<ImageStats>,
    ctx: Arc<ImageContext>,
}

impl ImObject {
    /// Allocate an uninitialised image.
    ///
    /// `WriteBuffer` also allocates the linear buffer kernels write through to.
    pub fn empty(
        ctx: &Arc<ImageContext>,
        size: Size,
        mode: WriteMode,
        gamma: Gamma,
        space: ColorSpace,
    ) -> Result<Self> {
        let env = &ctx.env;
        let texture = env.allocate_image(size, None, ChannelLayout::Rgba)?;
        let buffer = match mode {
            WriteMode::WriteBuffer => Some(env.allocate_buffer(
                transfer_usage(),
                4 * size.area(),
                None,
            )?),
            WriteMode::NoBuffer => None,
        };
        Ok(Self::assemble(ctx, size, texture, buffer, gamma, space))
    }

    /// Allocate an image with `src`'s gamma policy and colour space.
    pub fn empty_like(src: &ImObject, size: Size, mode: WriteMode) -> Result<Self> {
        Self::empty(&src.ctx, size, mode, src.gamma, src.space)
    }

    /// Upload interleaved RGB8 bytes.
    ///
    /// One parallel pass packs the pixels into words and fills the
    /// histograms; the transfer kernel then decodes every byte through the
    /// `gamma` table into the sampled representation.
    pub fn from_host(
        ctx: &Arc<ImageContext>,
        bytes: &[u8],
        size: Size,
        gamma: Gamma,
    ) -> Result<Self> {
        size.validate()?;
        let expected = 3 * size.area() as usize;
        if bytes.len() != expected {
            return Err(ValidationError::ByteCount {
                expected,
                actual: bytes.len(),
            }
            .into());
        }

        let (words, histograms) = bytes
            .par_chunks(3 * CHUNK_PIXELS)
            .map(|chunk| {
                let mut acc = HistogramAccumulator::default();
                let words: Vec<u32> = chunk
                    .chunks_exact(3)
                    .map(|px| {
                        acc.add_pixel(px[0], px[1], px[2]);
                        u32::from_le_bytes([px[0], px[1], px[2], 0xff])
                    })
                    .collect();
                (words, acc)
            })
            .reduce(
                || (Vec::new(), HistogramAccumulator::default()),
                |(mut words, acc), (more, other)| {
                    words.extend(more);
                    (words, acc.merge(other))
                },
            );

        let env = &ctx.env;
        let texture = env.allocate_image(size, None, ChannelLayout::Rgba)?;
        let image = Self::assemble(ctx, size, texture, None, gamma, ColorSpace::Srgb);

        let payload: &[u8] = bytemuck::cast_slice(&words);
        let params = TransferParams {
            size: size.to_array(),
            encode: 0,
            _pad: 0,
        };
        let upload = |source: &wgpu::Buffer| -> Result<()> {
            let uniform = env.allocate_buffer(
                wgpu::BufferUsages::UNIFORM,
                std::mem::size_of::<TransferParams>() as u64,
                Some(bytemuck::bytes_of(&params)),
            )?;
            let token = env.submit(
                ctx.transfer.get(TransferKernel::Normalise),
                &[
                    entry(0, source.as_entire_binding()),
                    entry(1, env.decode_table(gamma).as_entire_binding()),
                    entry(2, wgpu::BindingResource::TextureView(&image.view)),
                    entry(3, uniform.as_entire_binding()),
                ],
                size,
            )?;
            env.wait(&token)?;
            Ok(())
        };
        match env.scratch_for(payload.len() as u64) {
            Some(scratch) => {
                env.queue().write_buffer(&scratch.transfer, 0, payload);
                upload(&scratch.transfer)?;
            }
            None => {
                let staging = env.allocate_buffer(transfer_usage(), payload.len() as u64, Some(payload))?;
                upload(&staging)?;
            }
        }

        let _ = image.host[gamma_slot(gamma)].set(bytes.to_vec());
        let _ = image
            .stats
            .set(ImageStats::from_histograms(histograms.finish()));
        log::debug!("Uploaded {} image ({:?})", size, gamma);
        Ok(image)
    }

    /// Upload an `image` crate RGB buffer.
    pub fn from_rgb_image(ctx: &Arc<ImageContext>, rgb: &image::RgbImage, gamma: Gamma) -> Result<Self> {
        let size = Size::new(rgb.width(), rgb.height());
        Self::from_host(ctx, rgb.as_raw(), size, gamma)
    }

    /// Retag freshly uploaded samples as already being in `space`.
    ///
    /// Only meaningful for identity uploads of data produced by a previous
    /// conversion, such as a YCbCr file written by the `converse` command.
    pub fn with_space(mut self, space: ColorSpace) -> Self {
        self.space = space;
        self
    }

    fn assemble(
        ctx: &Arc<ImageContext>,
        size: Size,
        texture: wgpu::Texture,
        buffer: Option<wgpu::Buffer>,
        gamma: Gamma,
        space: ColorSpace,
    ) -> Self {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            size,
            view,
            texture,
            buffer,
            gamma,
            space,
            host: [OnceLock::new(), OnceLock::new()],
            stats: OnceLock::new(),
            ctx: Arc::clone(ctx),
        }
    }

    /// Width × height.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Gamma policy the image was created with.
    pub fn gamma(&self) -> Gamma {
        self.gamma
    }

    /// Colour space of the sampled representation.
    pub fn space(&self) -> ColorSpace {
        self.space
    }

    /// Whether kernels wrote through to a linear buffer.
    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    pub(crate) fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub(crate) fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub(crate) fn buffer(&self) -> Option<&wgpu::Buffer> {
        self.buffer.as_ref()
    }

    pub(crate) fn context(&self) -> &Arc<ImageContext> {
        &self.ctx
    }

    /// Encoding kernels apply when writing this image's linear buffer.
    ///
    /// Images outside sRGB are never gamma-corrected.
    pub fn buffer_encoding(&self) -> Gamma {
        self.effective(self.gamma)
    }

    fn effective(&self, requested: Gamma) -> Gamma {
        if self.space == ColorSpace::Srgb {
            requested
        } else {
            Gamma::Identity
        }
    }

    /// Interleaved RGB8 bytes, display-encoded when `inverse_gamma` is set.
    ///
    /// The first call reads the image back (straight from the linear buffer
    /// when it holds the requested encoding, through the transfer kernel
    /// otherwise); later calls return the cached bytes.
    pub fn host_bytes(&self, inverse_gamma: bool) -> Result<&[u8]> {
        let encoding = self.effective(Gamma::from_flag(inverse_gamma));
        let slot = &self.host[gamma_slot(encoding)];
        if let Some(bytes) = slot.get() {
            return Ok(bytes);
        }
        let words = match &self.buffer {
            Some(buffer) if self.buffer_encoding() == encoding => {
                self.ctx.env.read_buffer(buffer, 4 * self.size.area())?
            }
            _ => self.read_through_transfer(encoding)?,
        };
        let rgb: Vec<u8> = words
            .par_chunks_exact(4)
            .flat_map_iter(|px| [px[0], px[1], px[2]])
            .collect();
        Ok(slot.get_or_init(|| rgb))
    }

    fn read_through_transfer(&self, encoding: Gamma) -> Result<Vec<u8>> {
        let env = &self.ctx.env;
        let bytes = 4 * self.size.area();
        let params = TransferParams {
            size: self.size.to_array(),
            encode: u32::from(encoding == Gamma::Srgb),
            _pad: 0,
        };
        let uniform = env.allocate_buffer(
            wgpu::BufferUsages::UNIFORM,
            std::mem::size_of::<TransferParams>() as u64,
            Some(bytemuck::bytes_of(&params)),
        )?;
        let dispatch = |target: &wgpu::Buffer| {
            env.submit(
                self.ctx.transfer.get(TransferKernel::Denormalise),
                &[
                    entry(0, target.as_entire_binding()),
                    entry(3, uniform.as_entire_binding()),
                    entry(4, wgpu::BindingResource::TextureView(&self.view)),
                ],
                self.size,
            )
        };
        let words = match env.scratch_for(bytes) {
            Some(scratch) => {
                dispatch(&scratch.transfer)?;
                env.read_through(&scratch.transfer, &scratch.staging, bytes)?
            }
            None => {
                let target = env.allocate_buffer(transfer_usage(), bytes, None)?;
                dispatch(&target)?;
                env.read_buffer(&target, bytes)?
            }
        };
        Ok(words)
    }

    /// Copy of the display-encoded pixels as an `image` crate buffer.
    pub fn to_rgb_image(&self) -> Result<image::RgbImage> {
        let bytes = self.host_bytes(true)?.to_vec();
        let actual = bytes.len();
        image::RgbImage::from_raw(self.size.width, self.size.height, bytes).ok_or_else(|| {
            ValidationError::ByteCount {
                expected: 3 * self.size.area() as usize,
                actual,
            }
            .into()
        })
    }

    /// Statistics of the bytes in the image's own encoding, computed once.
    pub fn statistics(&self) -> Result<&ImageStats> {
        if let Some(stats) = self.stats.get() {
            return Ok(stats);
        }
        let bytes = self.host_bytes(self.gamma == Gamma::Srgb)?;
        let stats = ImageStats::compute(bytes);
        Ok(self.stats.get_or_init(|| stats))
    }

    /// Per-channel 256-bin histograms; index 3 aggregates channels 0..2.
    pub fn histograms(&self) -> Result<&Histograms> {
        Ok(&self.statistics()?.histograms)
    }
}

impl fmt::Debug for ImObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImObject")
            .field("size", &self.size)
            .field("gamma", &self.gamma)
            .field("space", &self.space)
            .field("buffer", &self.buffer.is_some())
            .finish_non_exhaustive()
    }
}

fn gamma_slot(gamma: Gamma) -> usize {
    match gamma {
        Gamma::Srgb => 0,
        Gamma::Identity => 1,
    }
}

pub(crate) fn entry(binding: u32, resource: wgpu::BindingResource<'_>) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry { binding, resource }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::device::tests::test_env;
    use crate::core::stats::AGGREGATE;

    pub(crate) fn test_context() -> Option<(Arc<ImageContext>, KernelRegistry)> {
        let env = test_env()?;
        let registry = KernelRegistry::compile(&env).ok()?;
        let ctx = ImageContext::new(env, &registry, LookupTables::global()).ok()?;
        Some((ctx, registry))
    }

    /// A deterministic RGB gradient.
    pub(crate) fn gradient(size: Size) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(3 * size.area() as usize);
        for y in 0..size.height {
            for x in 0..size.width {
                bytes.push((x * 255 / (size.width - 1).max(1)) as u8);
                bytes.push((y * 255 / (size.height - 1).max(1)) as u8);
                bytes.push(((x + y) % 256) as u8);
            }
        }
        bytes
    }

    #[test]
    fn test_gamma_slots_distinct() {
        assert_ne!(gamma_slot(Gamma::Srgb), gamma_slot(Gamma::Identity));
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_round_trip_identity() {
        let Some((ctx, _)) = test_context() else { return };
        let size = Size::new(37, 19);
        let bytes = gradient(size);
        let image = ImObject::from_host(&ctx, &bytes, size, Gamma::Identity).unwrap();
        // Seeded from the upload.
        assert_eq!(image.host_bytes(false).unwrap(), &bytes[..]);
        let copy = ImObject::empty_like(&image, size, WriteMode::NoBuffer).unwrap();
        assert_eq!(copy.size(), size);
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_round_trip_srgb_readback() {
        let Some((ctx, _)) = test_context() else { return };
        let size = Size::new(16, 16);
        let bytes = gradient(size);
        let image = ImObject::from_host(&ctx, &bytes, size, Gamma::Srgb).unwrap();
        // Linear readback is not cached at upload, so this goes through the device.
        let linear = image.host_bytes(false).unwrap().to_vec();
        assert_eq!(linear.len(), bytes.len());
        assert!(linear.iter().zip(&bytes).all(|(l, b)| l <= b));
        assert_eq!(image.host_bytes(true).unwrap(), &bytes[..]);
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_statistics_cached() {
        let Some((ctx, _)) = test_context() else { return };
        let size = Size::new(8, 4);
        let image = ImObject::from_host(&ctx, &vec![200u8; 96], size, Gamma::Srgb).unwrap();
        let first = image.statistics().unwrap() as *const ImageStats;
        let second = image.statistics().unwrap() as *const ImageStats;
        assert_eq!(first, second);
        assert_eq!(image.histograms().unwrap()[AGGREGATE][200], 96);
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_rejects_wrong_length() {
        let Some((ctx, _)) = test_context() else { return };
        let err = ImObject::from_host(&ctx, &[0u8; 10], Size::new(2, 2), Gamma::Srgb).unwrap_err();
        assert!(matches!(
            err,
            crate::core::error::Error::Validation(ValidationError::ByteCount { expected: 12, actual: 10 })
        ));
    }
}
