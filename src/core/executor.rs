//! The dispatch contract shared by every engine.
//!
//! Every two-image kernel starts with the same five bindings:
//!
//! | binding | resource                                       |
//! |---------|------------------------------------------------|
//! | 0       | source sampled image                           |
//! | 1       | destination linear buffer (or the empty buffer)|
//! | 2       | destination storage image                      |
//! | 3       | sampler                                        |
//! | 4       | `{dst_size, write_mode, encode}` uniform       |
//!
//! Operation arguments follow from binding 5 in the order they are pushed.

use crate::core::device::{DeviceEnv, Token};
use crate::core::error::{DeviceResult, Result};
use crate::core::image::{ImObject, ImageContext};
use crate::core::registry::{KernelRegistry, KernelSet, ProgramKernels};
use crate::core::types::{EdgeMode, FilterMode, Gamma, Size, WriteMode};
use bytemuck::{Pod, Zeroable};
use std::sync::Arc;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct IoUniform {
    dst_size: [u32; 2],
    write_mode: u32,
    encode: u32,
}

enum Arg<'a> {
    View(&'a wgpu::TextureView),
    Sampler(&'a wgpu::Sampler),
    Buffer(&'a wgpu::Buffer),
    Uniform(wgpu::Buffer),
}

/// Ordered kernel arguments. Each push takes the next free binding.
pub(crate) struct KernelArgs<'a> {
    env: &'a DeviceEnv,
    args: Vec<(u32, Arg<'a>)>,
    next: u32,
}

impl<'a> KernelArgs<'a> {
    fn new(env: &'a DeviceEnv) -> Self {
        Self {
            env,
            args: Vec::new(),
            next: 0,
        }
    }

    fn push(mut self, arg: Arg<'a>) -> Self {
        self.args.push((self.next, arg));
        self.next += 1;
        self
    }

    pub(crate) fn view(self, view: &'a wgpu::TextureView) -> Self {
        self.push(Arg::View(view))
    }

    pub(crate) fn sampler(self, sampler: &'a wgpu::Sampler) -> Self {
        self.push(Arg::Sampler(sampler))
    }

    pub(crate) fn buffer(self, buffer: &'a wgpu::Buffer) -> Self {
        self.push(Arg::Buffer(buffer))
    }

    /// Upload `value` into a fresh uniform buffer owned by the argument list.
    pub(crate) fn uniform<T: Pod>(self, value: &T) -> DeviceResult<Self> {
        let buffer = self.env.allocate_buffer(
            wgpu::BufferUsages::UNIFORM,
            std::mem::size_of::<T>() as u64,
            Some(bytemuck::bytes_of(value)),
        )?;
        Ok(self.push(Arg::Uniform(buffer)))
    }

    /// Leave the next binding unbound, for entry points that never read it.
    pub(crate) fn skip(mut self) -> Self {
        self.next += 1;
        self
    }

    fn entries(&self) -> Vec<wgpu::BindGroupEntry<'_>> {
        self.args
            .iter()
            .map(|(binding, arg)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match arg {
                    Arg::View(view) => wgpu::BindingResource::TextureView(view),
                    Arg::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                    Arg::Buffer(buffer) => buffer.as_entire_binding(),
                    Arg::Uniform(buffer) => buffer.as_entire_binding(),
                },
            })
            .collect()
    }
}

/// Kernels of one program plus the image context they dispatch against.
#[derive(Debug)]
pub(crate) struct Executor<K: KernelSet> {
    ctx: Arc<ImageContext>,
    kernels: ProgramKernels<K>,
}

impl<K: KernelSet> Executor<K> {
    /// Resolve every kernel of `K`; fails before any dispatch if one is missing.
    pub(crate) fn new(ctx: &Arc<ImageContext>, registry: &KernelRegistry) -> Result<Self> {
        let kernels = registry.resolve::<K>()?;
        log::info!("Created {} executor ({} kernels)", K::PROGRAM, K::all().len());
        Ok(Self {
            ctx: Arc::clone(ctx),
            kernels,
        })
    }

    pub(crate) fn env(&self) -> &DeviceEnv {
        self.ctx.env()
    }

    pub(crate) fn context(&self) -> &Arc<ImageContext> {
        &self.ctx
    }

    /// Fill bindings 0..4 for a `src` → `dst` kernel.
    ///
    /// The write-mode flag follows from whether `dst` owns a linear buffer;
    /// that buffer is display-encoded when `dst` is an sRGB image with the
    /// sRGB gamma policy.
    pub(crate) fn bind_common<'a>(
        &'a self,
        src: &'a ImObject,
        dst: &'a ImObject,
        sampler: (EdgeMode, FilterMode),
    ) -> DeviceResult<KernelArgs<'a>> {
        let env = self.env();
        let mode = if dst.has_buffer() {
            WriteMode::WriteBuffer
        } else {
            WriteMode::NoBuffer
        };
        let io = IoUniform {
            dst_size: dst.size().to_array(),
            write_mode: mode.flag(),
            encode: u32::from(mode == WriteMode::WriteBuffer && dst.buffer_encoding() == Gamma::Srgb),
        };
        KernelArgs::new(env)
            .view(src.view())
            .buffer(dst.buffer().unwrap_or_else(|| env.empty_buffer()))
            .view(dst.view())
            .sampler(env.sampler(sampler.0, sampler.1))
            .uniform(&io)
    }

    /// Enqueue `kernel` over `grid` and return its completion token.
    ///
    /// Submissions on the single queue execute in order, so a predecessor
    /// only has to have been submitted for the new dispatch to observe it.
    pub(crate) fn run_async(
        &self,
        kernel: K,
        args: &KernelArgs<'_>,
        grid: Size,
        after: Option<&Token>,
    ) -> Result<Token> {
        if let Some(token) = after {
            log::trace!("{:?} ordered after {:?}", kernel, token);
        }
        let token = self
            .env()
            .submit(self.kernels.get(kernel), &args.entries(), grid)?;
        Ok(token)
    }

    /// Enqueue `kernel` over `grid` and wait until it has finished.
    pub(crate) fn run_blocking(
        &self,
        kernel: K,
        args: &KernelArgs<'_>,
        grid: Size,
        after: Option<&Token>,
    ) -> Result<()> {
        let token = self.run_async(kernel, args, grid, after)?;
        self.wait(&token)
    }

    pub(crate) fn wait(&self, token: &Token) -> Result<()> {
        self.env().wait(token)?;
        Ok(())
    }

    /// Device-side copy of the top-left `region` of `src` into `dst`.
    pub(crate) fn copy_region(
        &self,
        src: &ImObject,
        dst: &ImObject,
        region: Size,
        after: Option<&Token>,
    ) -> Result<Token> {
        if let Some(token) = after {
            log::trace!("copy_region ordered after {:?}", token);
        }
        let token = self.env().submit_commands("copy_region", |encoder| {
            encoder.copy_texture_to_texture(
                wgpu::ImageCopyTexture {
                    texture: src.texture(),
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::ImageCopyTexture {
                    texture: dst.texture(),
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                region.extent(),
            );
        })?;
        Ok(token)
    }

    /// Allocate the output image of a `src` → `size` operation.
    pub(crate) fn output(&self, src: &ImObject, size: Size, mode: WriteMode) -> Result<ImObject> {
        ImObject::empty_like(src, size, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image::tests::{gradient, test_context};
    use crate::core::registry::Program;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Passthrough {
        Copy,
    }

    impl KernelSet for Passthrough {
        const PROGRAM: Program = Program::Rotator;

        fn all() -> &'static [Self] {
            &[Passthrough::Copy]
        }

        fn entry_point(self) -> &'static str {
            "copy"
        }
    }

    #[test]
    fn test_io_uniform_layout() {
        assert_eq!(std::mem::size_of::<IoUniform>(), 16);
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_common_prefix_copy_writes_buffer() {
        let Some((ctx, registry)) = test_context() else { return };
        let exec = Executor::<Passthrough>::new(&ctx, &registry).unwrap();
        let size = Size::new(20, 12);
        let bytes = gradient(size);
        let src = ImObject::from_host(&ctx, &bytes, size, Gamma::Identity).unwrap();
        let dst = exec.output(&src, size, WriteMode::WriteBuffer).unwrap();
        let args = exec
            .bind_common(&src, &dst, (EdgeMode::None, FilterMode::Nearest))
            .unwrap();
        exec.run_blocking(Passthrough::Copy, &args, size, None).unwrap();
        assert_eq!(dst.host_bytes(false).unwrap(), &bytes[..]);
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_copy_region_then_readback() {
        let Some((ctx, registry)) = test_context() else { return };
        let exec = Executor::<Passthrough>::new(&ctx, &registry).unwrap();
        let size = Size::new(8, 8);
        let bytes = gradient(size);
        let src = ImObject::from_host(&ctx, &bytes, size, Gamma::Identity).unwrap();
        let dst = exec.output(&src, size, WriteMode::NoBuffer).unwrap();
        let token = exec.copy_region(&src, &dst, size, None).unwrap();
        exec.wait(&token).unwrap();
        assert_eq!(dst.host_bytes(false).unwrap(), &bytes[..]);
    }
}
