//! Device environment: adapter, device, queue and the shared resources every
//! engine binds.
//!
//! One [`DeviceEnv`] is created at startup and shared as `Arc<DeviceEnv>`.
//! After construction it is read-only apart from the scratch transfer
//! buffers (behind a mutex) and the error sink.
//!
//! # Field drop order
//! Struct fields drop in declaration order. Samplers, scratch buffers and
//! lookup buffers are declared first, then the queue, the device, the
//! adapter and finally the instance, so nothing outlives what it was
//! created from.

use crate::config::DeviceConfig;
use crate::core::error::{DeviceError, DeviceResult, Error, Result, Status, ValidationError};
use crate::core::registry::Kernel;
use crate::core::tables::LookupTables;
use crate::core::types::{ChannelLayout, EdgeMode, FilterMode, Gamma, Size};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// Side of the square workgroup every kernel is compiled with.
pub const WORKGROUP_SIDE: u32 = 16;

/// Every (edge, filter) pair a sampler is created for.
const SAMPLER_KEYS: [(EdgeMode, FilterMode); 6] = [
    (EdgeMode::Clamp, FilterMode::Nearest),
    (EdgeMode::Clamp, FilterMode::Linear),
    (EdgeMode::ClampToEdge, FilterMode::Nearest),
    (EdgeMode::ClampToEdge, FilterMode::Linear),
    (EdgeMode::None, FilterMode::Nearest),
    (EdgeMode::None, FilterMode::Linear),
];

/// Read-only description of the selected device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub driver: String,
    pub texel_format: wgpu::TextureFormat,
    pub max_texture_dimension: u32,
    pub clamp_to_border: bool,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Device:  {} ({:?}, {:?})", self.name, self.backend, self.device_type)?;
        if !self.driver.is_empty() {
            writeln!(f, "Driver:  {}", self.driver)?;
        }
        writeln!(f, "Texels:  {:?}", self.texel_format)?;
        writeln!(f, "Max 2D:  {}", self.max_texture_dimension)?;
        write!(
            f,
            "Border:  {}",
            if self.clamp_to_border { "clamp to border" } else { "clamp to edge" }
        )
    }
}

/// One enumerated adapter, for `env` style listings.
#[derive(Debug, Clone)]
pub struct AdapterSummary {
    pub index: usize,
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
}

impl fmt::Display for AdapterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Adapter {}: {} ({:?}, {:?})",
            self.index, self.name, self.backend, self.device_type
        )
    }
}

/// Completion token of a submitted dispatch.
#[derive(Debug, Clone)]
pub struct Token(pub(crate) wgpu::SubmissionIndex);

/// Reusable transfer buffers for uploads and downloads below the threshold.
pub(crate) struct Scratch {
    /// Storage buffer the transfer kernels read from or write to.
    pub transfer: wgpu::Buffer,
    /// Host-mappable copy target for readback.
    pub staging: wgpu::Buffer,
}

/// The compute context shared by images and engines.
pub struct DeviceEnv {
    samplers: HashMap<(EdgeMode, FilterMode), wgpu::Sampler>,
    scratch: Option<Mutex<Scratch>>,
    scratch_bytes: u64,
    decode_srgb: wgpu::Buffer,
    decode_identity: wgpu::Buffer,
    empty_buffer: wgpu::Buffer,
    error_sink: Arc<Mutex<Option<DeviceError>>>,
    texel_format: wgpu::TextureFormat,
    info: DeviceInfo,
    limits: wgpu::Limits,
    queue: wgpu::Queue,
    device: wgpu::Device,
    _adapter: wgpu::Adapter,
    _instance: wgpu::Instance,
}

impl DeviceEnv {
    /// Open the adapter selected by `config` and create the shared resources.
    pub fn new(config: &DeviceConfig, tables: &LookupTables) -> Result<Self> {
        pollster::block_on(Self::init_async(config, tables))
    }

    async fn init_async(config: &DeviceConfig, tables: &LookupTables) -> Result<Self> {
        let backends = config.backends()?;
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let mut adapters = instance.enumerate_adapters(backends);
        if adapters.is_empty() {
            return Err(DeviceError::NoAdapter.into());
        }
        if config.adapter >= adapters.len() {
            return Err(DeviceError::IllegalAdapter {
                index: config.adapter,
                available: adapters.len(),
            }
            .into());
        }
        let adapter = adapters.swap_remove(config.adapter);
        let adapter_info = adapter.get_info();
        check_compute(&adapter_info.name, &adapter.get_downlevel_capabilities())?;

        let offered = adapter.features();
        let wanted = wgpu::Features::FLOAT32_FILTERABLE | wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER;
        let required_features = offered & wanted;
        let float32 = required_features.contains(wgpu::Features::FLOAT32_FILTERABLE);
        let clamp_to_border = required_features.contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER);
        if !float32 {
            log::warn!("{}: no filterable 32-bit float, using 16-bit texels", adapter_info.name);
        }
        if !clamp_to_border {
            log::warn!("{}: no clamp-to-border addressing, clamping to edge", adapter_info.name);
        }

        let limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("gpuim"),
                    required_features,
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| DeviceError::RequestDevice(e.to_string()))?;

        let error_sink: Arc<Mutex<Option<DeviceError>>> = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&error_sink);
        device.on_uncaptured_error(Box::new(move |error| {
            log::error!("Uncaptured device error: {}", error);
            let mut slot = sink.lock();
            if slot.is_none() {
                *slot = Some(DeviceError::Uncaptured {
                    status: Status::from(&error),
                    message: error.to_string(),
                });
            }
        }));

        let lost = Arc::clone(&error_sink);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("Device lost ({:?}): {}", reason, message);
            let mut slot = lost.lock();
            if slot.is_none() {
                *slot = Some(lost_error(reason, &message));
            }
        });

        let texel_format = if float32 {
            wgpu::TextureFormat::Rgba32Float
        } else {
            wgpu::TextureFormat::Rgba16Float
        };

        let samplers = SAMPLER_KEYS
            .iter()
            .map(|&(edge, filter)| {
                let sampler = create_sampler(&device, edge, filter, clamp_to_border);
                ((edge, filter), sampler)
            })
            .collect();

        let decode_srgb = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("decode_srgb"),
            contents: bytemuck::cast_slice(tables.decode_table(Gamma::Srgb)),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let decode_identity = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("decode_identity"),
            contents: bytemuck::cast_slice(tables.decode_table(Gamma::Identity)),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let empty_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("empty_buffer"),
            size: 4,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let scratch_bytes = align4(config.scratch_bytes.min(limits.max_storage_buffer_binding_size as u64));
        let scratch = (scratch_bytes > 0).then(|| {
            Mutex::new(Scratch {
                transfer: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("scratch_transfer"),
                    size: scratch_bytes,
                    usage: transfer_usage(),
                    mapped_at_creation: false,
                }),
                staging: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("scratch_staging"),
                    size: scratch_bytes,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }),
            })
        });

        let info = DeviceInfo {
            name: adapter_info.name.clone(),
            backend: adapter_info.backend,
            device_type: adapter_info.device_type,
            driver: format!("{} {}", adapter_info.driver, adapter_info.driver_info)
                .trim()
                .to_string(),
            texel_format,
            max_texture_dimension: limits.max_texture_dimension_2d,
            clamp_to_border,
        };
        log::info!(
            "Opened {} ({:?}), texels {:?}, scratch {} bytes",
            info.name,
            info.backend,
            texel_format,
            scratch_bytes
        );

        Ok(Self {
            samplers,
            scratch,
            scratch_bytes,
            decode_srgb,
            decode_identity,
            empty_buffer,
            error_sink,
            texel_format,
            info,
            limits,
            queue,
            device,
            _adapter: adapter,
            _instance: instance,
        })
    }

    /// Enumerate adapters available for `config`'s backend family.
    pub fn list_adapters(config: &DeviceConfig) -> Result<Vec<AdapterSummary>> {
        let backends = config.backends()?;
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });
        Ok(instance
            .enumerate_adapters(backends)
            .iter()
            .enumerate()
            .map(|(index, adapter)| {
                let info = adapter.get_info();
                AdapterSummary {
                    index,
                    name: info.name,
                    backend: info.backend,
                    device_type: info.device_type,
                }
            })
            .collect())
    }

    /// Device name and capabilities, for diagnostics only.
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Texel format of every RGBA image.
    pub fn texel_format(&self) -> wgpu::TextureFormat {
        self.texel_format
    }

    pub(crate) fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub(crate) fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// The cached sampler for an (edge, filter) pair.
    pub fn sampler(&self, edge: EdgeMode, filter: FilterMode) -> &wgpu::Sampler {
        // Every key is inserted at construction.
        &self.samplers[&(edge, filter)]
    }

    /// One-word buffer bound where a kernel writes no linear data.
    pub(crate) fn empty_buffer(&self) -> &wgpu::Buffer {
        &self.empty_buffer
    }

    /// Byte→float map read by the upload kernel.
    pub(crate) fn decode_table(&self, gamma: Gamma) -> &wgpu::Buffer {
        match gamma {
            Gamma::Srgb => &self.decode_srgb,
            Gamma::Identity => &self.decode_identity,
        }
    }

    /// Lock the scratch buffers when `bytes` fits in them.
    pub(crate) fn scratch_for(&self, bytes: u64) -> Option<MutexGuard<'_, Scratch>> {
        match &self.scratch {
            Some(scratch) if bytes <= self.scratch_bytes => Some(scratch.lock()),
            _ => None,
        }
    }

    /// Allocate a buffer, optionally initialised with `contents`.
    ///
    /// Sizes are rounded up to a multiple of four bytes.
    pub fn allocate_buffer(
        &self,
        usage: wgpu::BufferUsages,
        size: u64,
        contents: Option<&[u8]>,
    ) -> DeviceResult<wgpu::Buffer> {
        let size = align4(size.max(4));
        self.scoped("buffer", || match contents {
            Some(data) => {
                let mut padded = data.to_vec();
                padded.resize(size as usize, 0);
                self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: None,
                    contents: &padded,
                    usage,
                })
            }
            None => self.device.create_buffer(&wgpu::BufferDescriptor {
                label: None,
                size,
                usage,
                mapped_at_creation: false,
            }),
        })
    }

    /// Allocate an image, optionally filled with float texels.
    ///
    /// `data` holds 4 floats per pixel for [`ChannelLayout::Rgba`] and one for
    /// [`ChannelLayout::Single`], row-major. The image is sampled, and also
    /// writable from kernels unless its format rules that out (see
    /// [`image_usage`]).
    pub fn allocate_image(
        &self,
        size: Size,
        data: Option<&[f32]>,
        layout: ChannelLayout,
    ) -> Result<wgpu::Texture> {
        size.validate()?;
        let max = self.limits.max_texture_dimension_2d;
        if size.width > max || size.height > max {
            return Err(ValidationError::TooLarge {
                width: size.width,
                height: size.height,
                max,
            }
            .into());
        }
        let (format, channels) = match layout {
            ChannelLayout::Rgba => (self.texel_format, 4),
            ChannelLayout::Single if self.texel_format == wgpu::TextureFormat::Rgba32Float => {
                (wgpu::TextureFormat::R32Float, 1)
            }
            ChannelLayout::Single => (wgpu::TextureFormat::R16Float, 1),
        };
        if let Some(texels) = data {
            let expected = size.area() as usize * channels;
            if texels.len() != expected {
                return Err(ValidationError::ByteCount {
                    expected: expected * 4,
                    actual: texels.len() * 4,
                }
                .into());
            }
        }

        let texture = self.scoped("image", || {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: None,
                size: size.extent(),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: image_usage(format),
                view_formats: &[],
            })
        })?;

        if let Some(texels) = data {
            let bytes: Vec<u8> = match format {
                wgpu::TextureFormat::Rgba32Float | wgpu::TextureFormat::R32Float => {
                    bytemuck::cast_slice(texels).to_vec()
                }
                _ => {
                    let halves: Vec<half::f16> =
                        texels.iter().map(|&v| half::f16::from_f32(v)).collect();
                    bytemuck::cast_slice(&halves).to_vec()
                }
            };
            let texel_bytes = format.block_copy_size(None).unwrap_or(4 * channels as u32);
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &bytes,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(size.width * texel_bytes),
                    rows_per_image: Some(size.height),
                },
                size.extent(),
            );
        }
        log::debug!("Allocated {:?} image {}", format, size);
        Ok(texture)
    }

    /// Bind, encode and submit one dispatch of `kernel` over `grid`.
    ///
    /// `entries` are the group 0 bindings; group 1 always carries the grid
    /// extent the kernel bounds-checks against.
    pub(crate) fn submit(
        &self,
        kernel: &Kernel,
        entries: &[wgpu::BindGroupEntry<'_>],
        grid: Size,
    ) -> DeviceResult<Token> {
        let max_groups = self.limits.max_compute_workgroups_per_dimension;
        let (groups_x, groups_y) =
            workgroup_counts(grid, max_groups).ok_or_else(|| DeviceError::Dispatch {
                kernel: kernel.name.to_string(),
                status: Status::OutOfResources,
                message: format!("grid {} needs more than {} workgroups per axis", grid, max_groups),
            })?;
        let grid_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("grid"),
            contents: bytemuck::bytes_of(&[grid.width, grid.height, 0, 0]),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let group0 = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.name),
            layout: &kernel.pipeline.get_bind_group_layout(0),
            entries,
        });
        let group1 = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("grid"),
            layout: &kernel.pipeline.get_bind_group_layout(1),
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: grid_buffer.as_entire_binding(),
            }],
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DeviceError::Binding {
                kernel: kernel.name.to_string(),
                message: error.to_string(),
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(kernel.name),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.name),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &group0, &[]);
            pass.set_bind_group(1, &group1, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        let index = self.queue.submit(Some(encoder.finish()));
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DeviceError::Dispatch {
                kernel: kernel.name.to_string(),
                status: Status::from(&error),
                message: error.to_string(),
            });
        }
        log::debug!("Dispatched {} over {}", kernel.name, grid);
        Ok(Token(index))
    }

    /// Record and submit a command encoder built by `record`.
    pub(crate) fn submit_commands(
        &self,
        label: &'static str,
        record: impl FnOnce(&mut wgpu::CommandEncoder),
    ) -> DeviceResult<Token> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        record(&mut encoder);
        let index = self.queue.submit(Some(encoder.finish()));
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DeviceError::Dispatch {
                kernel: label.to_string(),
                status: Status::from(&error),
                message: error.to_string(),
            });
        }
        Ok(Token(index))
    }

    /// Block until the submission behind `token` has finished.
    pub fn wait(&self, token: &Token) -> DeviceResult<()> {
        self.device
            .poll(wgpu::Maintain::WaitForSubmissionIndex(token.0.clone()));
        self.take_error()
    }

    /// Block until the queue is empty.
    pub fn wait_idle(&self) -> DeviceResult<()> {
        self.device.poll(wgpu::Maintain::Wait);
        self.take_error()
    }

    /// Surface an asynchronous device error recorded since the last check.
    pub fn take_error(&self) -> DeviceResult<()> {
        match self.error_sink.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Copy `bytes` from the start of `source` into host memory.
    ///
    /// `source` needs `COPY_SRC`; the staging buffer is the scratch one when
    /// it is large enough.
    pub(crate) fn read_buffer(&self, source: &wgpu::Buffer, bytes: u64) -> DeviceResult<Vec<u8>> {
        let bytes = align4(bytes);
        match self.scratch_for(bytes) {
            Some(scratch) => self.read_through(source, &scratch.staging, bytes),
            None => {
                let staging = self.allocate_buffer(
                    wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    bytes,
                    None,
                )?;
                self.read_through(source, &staging, bytes)
            }
        }
    }

    pub(crate) fn read_through(
        &self,
        source: &wgpu::Buffer,
        staging: &wgpu::Buffer,
        bytes: u64,
    ) -> DeviceResult<Vec<u8>> {
        self.submit_commands("readback", |encoder| {
            encoder.copy_buffer_to_buffer(source, 0, staging, 0, bytes);
        })?;

        let slice = staging.slice(..bytes);
        let (tx, rx) = crossbeam::channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| DeviceError::Readback("map callback dropped".to_string()))?
            .map_err(|e| DeviceError::Readback(e.to_string()))?;
        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        self.take_error()?;
        Ok(data)
    }

    /// Run `create` inside out-of-memory and validation error scopes.
    fn scoped<T>(&self, what: &str, create: impl FnOnce() -> T) -> DeviceResult<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create();
        let validation = pollster::block_on(self.device.pop_error_scope());
        let memory = pollster::block_on(self.device.pop_error_scope());
        match memory.or(validation) {
            Some(error) => Err(DeviceError::Allocation {
                what: what.to_string(),
                status: Status::from(&error),
                message: error.to_string(),
            }),
            None => Ok(value),
        }
    }
}

impl fmt::Debug for DeviceEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceEnv")
            .field("info", &self.info)
            .field("scratch_bytes", &self.scratch_bytes)
            .finish_non_exhaustive()
    }
}

/// Usage of buffers the transfer kernels read or write.
pub(crate) fn transfer_usage() -> wgpu::BufferUsages {
    wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC
}

fn align4(bytes: u64) -> u64 {
    bytes.div_ceil(4) * 4
}

/// Workgroups covering `grid`, or `None` past `max` on either axis.
fn workgroup_counts(grid: Size, max: u32) -> Option<(u32, u32)> {
    let x = grid.width.div_ceil(WORKGROUP_SIDE);
    let y = grid.height.div_ceil(WORKGROUP_SIDE);
    (x <= max && y <= max).then_some((x, y))
}

/// Reject adapters that cannot run compute kernels at all.
fn check_compute(adapter: &str, downlevel: &wgpu::DownlevelCapabilities) -> DeviceResult<()> {
    if downlevel.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
        Ok(())
    } else {
        Err(DeviceError::Capability {
            adapter: adapter.to_string(),
            status: Status::Unsupported,
            missing: "compute shaders".to_string(),
        })
    }
}

fn lost_error(reason: wgpu::DeviceLostReason, message: &str) -> DeviceError {
    DeviceError::Uncaptured {
        status: Status::DeviceLost,
        message: format!("{:?}: {}", reason, message),
    }
}

/// Texture usages of an image in `format`.
///
/// R16Float cannot be a storage texture, so single-channel images on
/// adapters without 32-bit filtering are sampled-only.
pub fn image_usage(format: wgpu::TextureFormat) -> wgpu::TextureUsages {
    let usage = wgpu::TextureUsages::TEXTURE_BINDING
        | wgpu::TextureUsages::COPY_SRC
        | wgpu::TextureUsages::COPY_DST;
    match format {
        wgpu::TextureFormat::R16Float => usage,
        _ => usage | wgpu::TextureUsages::STORAGE_BINDING,
    }
}

fn create_sampler(
    device: &wgpu::Device,
    edge: EdgeMode,
    filter: FilterMode,
    clamp_to_border: bool,
) -> wgpu::Sampler {
    let (address_mode, border_color) = match edge {
        EdgeMode::Clamp if clamp_to_border => (
            wgpu::AddressMode::ClampToBorder,
            Some(wgpu::SamplerBorderColor::TransparentBlack),
        ),
        EdgeMode::Clamp | EdgeMode::ClampToEdge | EdgeMode::None => {
            (wgpu::AddressMode::ClampToEdge, None)
        }
    };
    let filter_mode = match filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("gpuim_sampler"),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: filter_mode,
        min_filter: filter_mode,
        mipmap_filter: wgpu::FilterMode::Nearest,
        border_color,
        ..Default::default()
    })
}
