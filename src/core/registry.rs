//! Kernel programs and the compiled kernel map.
//!
//! Each [`Program`] is one WGSL module. [`KernelRegistry::compile`] builds
//! all of them in a fixed order and keeps a read-only map from program to
//! `{kernel name → pipeline}`. Engines never look kernels up by string:
//! each declares a closed enum implementing [`KernelSet`], and
//! [`KernelRegistry::resolve`] turns it into a [`ProgramKernels`] with every
//! variant already bound, so a missing kernel fails at construction.

use crate::core::device::DeviceEnv;
use crate::core::error::CompileError;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

const GRID_PRELUDE: &str = include_str!("../shaders/grid.wgsl");
const COMMON_PRELUDE: &str = include_str!("../shaders/common.wgsl");

/// One kernel program file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Program {
    Transfer,
    Zoomer,
    Rotator,
    Converser,
    Contraster,
    Wavelet,
    Filter,
}

impl Program {
    /// Compilation order; engines are constructed in the same order.
    pub const ALL: [Program; 7] = [
        Program::Transfer,
        Program::Zoomer,
        Program::Rotator,
        Program::Converser,
        Program::Contraster,
        Program::Wavelet,
        Program::Filter,
    ];

    /// Program name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Program::Transfer => "transfer",
            Program::Zoomer => "zoomer",
            Program::Rotator => "rotator",
            Program::Converser => "converser",
            Program::Contraster => "contraster",
            Program::Wavelet => "wavelet",
            Program::Filter => "filter",
        }
    }

    fn body(&self) -> &'static str {
        match self {
            Program::Transfer => include_str!("../shaders/transfer.wgsl"),
            Program::Zoomer => include_str!("../shaders/zoomer.wgsl"),
            Program::Rotator => include_str!("../shaders/rotator.wgsl"),
            Program::Converser => include_str!("../shaders/converser.wgsl"),
            Program::Contraster => include_str!("../shaders/contraster.wgsl"),
            Program::Wavelet => include_str!("../shaders/wavelet.wgsl"),
            Program::Filter => include_str!("../shaders/filter.wgsl"),
        }
    }

    /// Entry points compiled from this program.
    pub fn kernels(&self) -> &'static [&'static str] {
        match self {
            Program::Transfer => &["normalise", "denormalise"],
            Program::Zoomer => &["bilinear", "lanczos", "splines", "precise_box"],
            Program::Rotator => &[
                "copy",
                "clockwise",
                "counter_clockwise",
                "flip",
                "shear_rotate",
                "map_rotate",
                "crop",
            ],
            Program::Converser => &[
                "srgb_to_ycbcr",
                "ycbcr_to_srgb",
                "srgb_to_hsv",
                "hsv_to_srgb",
                "srgb_to_hsl",
                "hsl_to_srgb",
                "hsl_to_hsv",
                "hsv_to_hsl",
                "srgb_to_ciexyz",
                "ciexyz_to_srgb",
                "ciexyz_to_cielab",
                "cielab_to_ciexyz",
            ],
            Program::Contraster => &[
                "manual",
                "exclusive_hist",
                "adaptive_hist_all",
                "adaptive_hist_single",
            ],
            Program::Wavelet => &[
                "pad",
                "horizontal_haar",
                "vertical_haar",
                "soft_threshold",
                "crop",
            ],
            Program::Filter => &["horizontal_conv", "vertical_conv", "convolution_2d"],
        }
    }

    /// Full WGSL source for a device using `texel_format` storage images.
    pub fn source(&self, texel_format: wgpu::TextureFormat) -> String {
        let texel = match texel_format {
            wgpu::TextureFormat::Rgba32Float => "rgba32float",
            _ => "rgba16float",
        };
        let mut source = String::from(GRID_PRELUDE);
        if *self != Program::Transfer {
            source.push_str(COMMON_PRELUDE);
        }
        source.push_str(self.body());
        source.replace("$TEXEL", texel)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A compiled, callable kernel.
pub struct Kernel {
    pub(crate) program: Program,
    pub(crate) name: &'static str,
    pub(crate) pipeline: wgpu::ComputePipeline,
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kernel({}::{})", self.program, self.name)
    }
}

/// The closed set of kernels one engine dispatches.
pub trait KernelSet: Copy + Eq + Hash + fmt::Debug + 'static {
    /// Program the kernels live in.
    const PROGRAM: Program;

    /// Every variant.
    fn all() -> &'static [Self];

    /// WGSL entry point of a variant.
    fn entry_point(self) -> &'static str;
}

/// The kernels of one engine, every variant resolved.
#[derive(Debug)]
pub struct ProgramKernels<K: KernelSet> {
    kernels: HashMap<K, Arc<Kernel>>,
}

impl<K: KernelSet> ProgramKernels<K> {
    /// The compiled kernel for `key`.
    pub fn get(&self, key: K) -> &Kernel {
        // Resolution inserts every variant of K.
        &self.kernels[&key]
    }
}

/// Program → kernel name → compiled kernel. Immutable once compiled.
#[derive(Debug, Default)]
pub struct KernelRegistry {
    programs: HashMap<Program, HashMap<&'static str, Arc<Kernel>>>,
}

impl KernelRegistry {
    /// Compile every program in [`Program::ALL`] order.
    pub fn compile(env: &DeviceEnv) -> Result<Self, CompileError> {
        let mut registry = Self::default();
        for program in Program::ALL {
            let kernels = compile_program(env, program)?;
            registry.programs.insert(program, kernels);
        }
        log::info!("Compiled {} kernel programs", registry.programs.len());
        Ok(registry)
    }

    /// Bind every variant of `K` to its compiled kernel.
    pub fn resolve<K: KernelSet>(&self) -> Result<ProgramKernels<K>, CompileError> {
        let program = K::PROGRAM;
        let compiled = self.programs.get(&program);
        let mut kernels = HashMap::with_capacity(K::all().len());
        for &key in K::all() {
            let name = key.entry_point();
            let kernel = compiled
                .and_then(|map| map.get(name))
                .ok_or(CompileError::MissingKernel {
                    program: program.name(),
                    kernel: name,
                })?;
            kernels.insert(key, Arc::clone(kernel));
        }
        Ok(ProgramKernels { kernels })
    }

    /// Names of the compiled kernels of `program`, sorted.
    pub fn kernel_names(&self, program: Program) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .programs
            .get(&program)
            .map(|map| map.keys().copied().collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }
}

fn compile_program(
    env: &DeviceEnv,
    program: Program,
) -> Result<HashMap<&'static str, Arc<Kernel>>, CompileError> {
    let device = env.device();
    let source = program.source(env.texel_format());

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(program.name()),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let info = pollster::block_on(module.get_compilation_info());
    let scope = pollster::block_on(device.pop_error_scope());

    let errors: Vec<String> = info
        .messages
        .iter()
        .filter(|m| m.message_type == wgpu::CompilationMessageType::Error)
        .map(|m| match &m.location {
            Some(loc) => format!("{}:{}: {}", loc.line_number, loc.line_position, m.message),
            None => m.message.clone(),
        })
        .collect();
    if !errors.is_empty() || scope.is_some() {
        let mut log = errors.join("\n");
        if let Some(error) = scope {
            if !log.is_empty() {
                log.push('\n');
            }
            log.push_str(&error.to_string());
        }
        return Err(CompileError::Program {
            program: program.name(),
            log,
        });
    }

    let mut kernels = HashMap::new();
    for &name in program.kernels() {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(name),
            layout: None,
            module: &module,
            entry_point: Some(name),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            log::error!("{}::{}: {}", program, name, error);
            return Err(CompileError::MissingKernel {
                program: program.name(),
                kernel: name,
            });
        }
        kernels.insert(
            name,
            Arc::new(Kernel {
                program,
                name,
                pipeline,
            }),
        );
    }
    log::debug!("Built program {} ({} kernels)", program, kernels.len());
    Ok(kernels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::device::tests::test_env;

    #[test]
    fn test_sources_substitute_texel_format() {
        for program in Program::ALL {
            let source = program.source(wgpu::TextureFormat::Rgba16Float);
            assert!(!source.contains("$TEXEL"), "{}", program);
            for kernel in program.kernels() {
                assert!(
                    source.contains(&format!("fn {}(", kernel)),
                    "{} lacks {}",
                    program,
                    kernel
                );
            }
        }
        assert!(Program::Zoomer
            .source(wgpu::TextureFormat::Rgba32Float)
            .contains("rgba32float"));
    }

    #[test]
    fn test_kernel_names_unique_per_program() {
        for program in Program::ALL {
            let mut names = program.kernels().to_vec();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), program.kernels().len());
        }
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_compile_all_programs() {
        let Some(env) = test_env() else { return };
        let registry = KernelRegistry::compile(&env).unwrap();
        assert_eq!(
            registry.kernel_names(Program::Transfer),
            vec!["denormalise", "normalise"]
        );
    }
}
