//! The application object.
//!
//! A [`Toolkit`] opens the device, compiles every kernel program and builds
//! the engines in program order. Dropping it releases the engines first,
//! then the image context, the compiled programs and finally the device.

use crate::config::ToolkitConfig;
use crate::core::device::DeviceEnv;
use crate::core::error::Result;
use crate::core::image::{ImObject, ImPtr, ImageContext};
use crate::core::registry::KernelRegistry;
use crate::core::tables::LookupTables;
use crate::core::types::{ColorSpace, Gamma, WriteMode};
use crate::engines::{
    ChannelMode, Contraster, Converser, Filter, Rotator, ToneCurve, Wavelet, Zoomer,
};
use std::path::Path;
use std::sync::Arc;

/// Spaces visited on the way from sRGB to `space`, `space` included.
pub fn route_from_srgb(space: ColorSpace) -> &'static [ColorSpace] {
    match space {
        ColorSpace::Srgb => &[],
        ColorSpace::Ycc601 => &[ColorSpace::Ycc601],
        ColorSpace::Ycc709 => &[ColorSpace::Ycc709],
        ColorSpace::Ycc2020 => &[ColorSpace::Ycc2020],
        ColorSpace::Hsv => &[ColorSpace::Hsv],
        ColorSpace::Hsl => &[ColorSpace::Hsl],
        ColorSpace::CieXyz => &[ColorSpace::CieXyz],
        ColorSpace::CieLab => &[ColorSpace::CieXyz, ColorSpace::CieLab],
    }
}

/// Device, compiled programs and one instance of every engine.
pub struct Toolkit {
    zoomer: Zoomer,
    rotator: Rotator,
    converser: Converser,
    contraster: Contraster,
    wavelet: Wavelet,
    filter: Filter,
    ctx: Arc<ImageContext>,
    registry: KernelRegistry,
    env: Arc<DeviceEnv>,
    config: ToolkitConfig,
}

impl Toolkit {
    /// Open the configured adapter and build every engine.
    pub fn new(config: &ToolkitConfig) -> Result<Self> {
        config.validate()?;
        let tables = LookupTables::global();
        let env = Arc::new(DeviceEnv::new(&config.device, tables)?);
        let registry = KernelRegistry::compile(&env)?;
        let ctx = ImageContext::new(Arc::clone(&env), &registry, tables)?;

        let zoomer = Zoomer::new(&ctx, &registry)?;
        let rotator = Rotator::new(&ctx, &registry)?;
        let converser = Converser::new(&ctx, &registry)?;
        let contraster = Contraster::new(&ctx, &registry)?;
        let wavelet = Wavelet::new(&ctx, &registry)?;
        let filter = Filter::new(&ctx, &registry)?;
        log::info!("Toolkit ready on {}", env.info().name);

        Ok(Self {
            zoomer,
            rotator,
            converser,
            contraster,
            wavelet,
            filter,
            ctx,
            registry,
            env,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &ToolkitConfig {
        &self.config
    }

    pub fn env(&self) -> &Arc<DeviceEnv> {
        &self.env
    }

    pub fn context(&self) -> &Arc<ImageContext> {
        &self.ctx
    }

    pub fn registry(&self) -> &KernelRegistry {
        &self.registry
    }

    pub fn zoomer(&self) -> &Zoomer {
        &self.zoomer
    }

    pub fn rotator(&self) -> &Rotator {
        &self.rotator
    }

    pub fn converser(&self) -> &Converser {
        &self.converser
    }

    pub fn contraster(&self) -> &Contraster {
        &self.contraster
    }

    pub fn wavelet(&self) -> &Wavelet {
        &self.wavelet
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Decode an image file and upload it as sRGB.
    pub fn load(&self, path: impl AsRef<Path>, gamma: Gamma) -> Result<ImPtr> {
        let rgb = image::open(path.as_ref())?.into_rgb8();
        log::debug!("Loaded {} ({}x{})", path.as_ref().display(), rgb.width(), rgb.height());
        Ok(Arc::new(ImObject::from_rgb_image(&self.ctx, &rgb, gamma)?))
    }

    /// Decode an image file whose samples are already in `space`.
    ///
    /// sRGB files are linearised; every other space is uploaded as is.
    pub fn load_tagged(&self, path: impl AsRef<Path>, space: ColorSpace) -> Result<ImPtr> {
        let gamma = Gamma::from_flag(space == ColorSpace::Srgb);
        let rgb = image::open(path.as_ref())?.into_rgb8();
        let image = ImObject::from_rgb_image(&self.ctx, &rgb, gamma)?.with_space(space);
        Ok(Arc::new(image))
    }

    /// Encode `image` into a file; the format follows the extension.
    pub fn store(&self, image: &ImObject, path: impl AsRef<Path>) -> Result<()> {
        image.to_rgb_image()?.save(path.as_ref())?;
        log::debug!("Stored {} to {}", image.size(), path.as_ref().display());
        Ok(())
    }

    /// Apply `curve` to the lightness channel of `space`.
    ///
    /// The sRGB source is converted into `space`, adjusted in single-channel
    /// mode and converted back. For sRGB itself every channel is adjusted.
    pub fn contrast_via(&self, space: ColorSpace, curve: ToneCurve, src: &ImObject) -> Result<ImPtr> {
        let route = route_from_srgb(space);
        if route.is_empty() {
            return self.contraster.apply(src, curve, ChannelMode::All);
        }

        let mut from = src.space();
        let mut current: Option<ImPtr> = None;
        for &to in route {
            let input = current.as_deref().unwrap_or(src);
            current = Some(self.converser.run(from, to, input, WriteMode::NoBuffer)?);
            from = to;
        }
        let converted = current.as_deref().unwrap_or(src);
        let mut adjusted = self.contraster.apply(converted, curve, ChannelMode::Single)?;

        let back: Vec<ColorSpace> = route
            .iter()
            .rev()
            .skip(1)
            .copied()
            .chain(std::iter::once(ColorSpace::Srgb))
            .collect();
        let last = back.len() - 1;
        for (i, &to) in back.iter().enumerate() {
            let mode = if i == last {
                WriteMode::WriteBuffer
            } else {
                WriteMode::NoBuffer
            };
            adjusted = self.converser.run(adjusted.space(), to, &adjusted, mode)?;
        }
        Ok(adjusted)
    }
}

impl std::fmt::Debug for Toolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolkit")
            .field("device", &self.env.info().name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image::tests::gradient;
    use crate::core::types::Size;
    use crate::engines::converser::targets;

    #[test]
    fn test_routes_follow_direct_edges() {
        for space in ColorSpace::ALL {
            let mut from = ColorSpace::Srgb;
            for &to in route_from_srgb(space) {
                assert!(targets(from).contains(&to), "{} -> {}", from, to);
                from = to;
            }
            assert_eq!(from, space);
        }
    }

    fn test_toolkit() -> Option<Toolkit> {
        Toolkit::new(&ToolkitConfig::default()).ok()
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_keeps_validated_config() {
        let config = ToolkitConfig::from_toml_str("[filter]\nsigma = 2.5\nwindow = 7\n").unwrap();
        let Ok(toolkit) = Toolkit::new(&config) else { return };
        assert_eq!(toolkit.config(), &config);
        assert_eq!(toolkit.config().filter.window, 7);
    }

    #[test]
    fn test_invalid_config_fails_before_device() {
        let config = ToolkitConfig {
            filter: crate::config::FilterConfig {
                sigma: f32::NAN,
                window: 3,
            },
            ..ToolkitConfig::default()
        };
        let err = Toolkit::new(&config).unwrap_err();
        assert!(matches!(err, crate::core::error::Error::Config(_)));
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_store_then_load() {
        let Some(toolkit) = test_toolkit() else { return };
        let size = Size::new(9, 7);
        let bytes = gradient(size);
        let src = ImObject::from_host(toolkit.context(), &bytes, size, Gamma::Srgb).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gradient.png");
        toolkit.store(&src, &path).unwrap();

        let back = toolkit.load(&path, Gamma::Srgb).unwrap();
        assert_eq!(back.size(), size);
        assert_eq!(back.host_bytes(true).unwrap(), &bytes[..]);
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_contrast_via_returns_srgb() {
        let Some(toolkit) = test_toolkit() else { return };
        let size = Size::new(16, 16);
        let src = ImObject::from_host(toolkit.context(), &gradient(size), size, Gamma::Srgb).unwrap();
        for space in [ColorSpace::Srgb, ColorSpace::Hsv, ColorSpace::CieLab] {
            let out = toolkit
                .contrast_via(space, ToneCurve::Manual { level: 0.0 }, &src)
                .unwrap();
            assert_eq!(out.space(), ColorSpace::Srgb);
            assert!(out.has_buffer());
            assert_eq!(out.size(), size);
        }
    }
}
