//! gpuim CLI - GPU image toolkit
//!
//! Thin front-end over [`gpuim::toolkit::Toolkit`]: one command per engine
//! plus device listings.

use anyhow::{bail, Context};
use gpuim::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

const COMMANDS: [(&str, &str); 8] = [
    ("env", "env"),
    ("dev", "dev"),
    ("zoom", "zoom <in> -o <out> [-t type] (-f percent | -x width -y height)"),
    ("converse", "converse <in> -o <out> [-f from] [-t to]"),
    ("rotate", "rotate <in> -o <out> -a degrees [-t shear|map]"),
    (
        "contrast",
        "contrast <in> -o <out> [-t manual|exclusive|adaptive] [-v space] [-c level] [-e exclusion] [-x rx -y ry]",
    ),
    ("gauss", "gauss <in> -o <out> [-s sigma] [-w window] [--2d]"),
    ("wavelet", "wavelet <in> -o <out> [-b basis] [-t threshold]"),
];

/// Bad command line; printed with the command's syntax.
#[derive(Debug)]
struct UsageError {
    command: &'static str,
    message: String,
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for UsageError {}

fn syntax(command: &str) -> Option<&'static str> {
    COMMANDS
        .iter()
        .find(|(name, _)| *name == command)
        .map(|(_, syntax)| *syntax)
}

/// Positional input plus `-k value` flags and bare switches.
struct Options {
    command: &'static str,
    input: Option<String>,
    flags: HashMap<String, String>,
    switches: HashSet<String>,
}

impl Options {
    fn parse(command: &'static str, args: &[String], switches: &[&str]) -> Result<Self, UsageError> {
        let usage = |message: String| UsageError { command, message };
        let mut options = Options {
            command,
            input: None,
            flags: HashMap::new(),
            switches: HashSet::new(),
        };
        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            if switches.contains(&arg.as_str()) {
                options.switches.insert(arg.clone());
                i += 1;
            } else if arg.starts_with('-') && arg.len() > 1 && arg.parse::<f64>().is_err() {
                // Values may be negative numbers, so the next argument is always taken.
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| usage(format!("Missing value for {}", arg)))?;
                options.flags.insert(arg.clone(), value.clone());
                i += 2;
            } else if options.input.is_none() {
                options.input = Some(arg.clone());
                i += 1;
            } else {
                return Err(usage(format!("Unexpected argument: {}", arg)));
            }
        }
        Ok(options)
    }

    fn usage(&self, message: impl Into<String>) -> UsageError {
        UsageError {
            command: self.command,
            message: message.into(),
        }
    }

    fn get<T: FromStr>(&self, key: &str) -> Result<Option<T>, UsageError>
    where
        T::Err: fmt::Display,
    {
        match self.flags.get(key) {
            Some(text) => text
                .parse()
                .map(Some)
                .map_err(|e| self.usage(format!("Invalid value '{}' for {}: {}", text, key, e))),
            None => Ok(None),
        }
    }

    fn require<T: FromStr>(&self, key: &str) -> Result<T, UsageError>
    where
        T::Err: fmt::Display,
    {
        self.get(key)?
            .ok_or_else(|| self.usage(format!("Missing required option {}", key)))
    }

    fn input(&self) -> Result<&str, UsageError> {
        self.input
            .as_deref()
            .ok_or_else(|| self.usage("Missing input image"))
    }

    fn output(&self) -> Result<String, UsageError> {
        self.require("-o")
    }

    fn has(&self, switch: &str) -> bool {
        self.switches.contains(switch)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("gpuim");

    if let Err(e) = run(&args[1.min(args.len())..]) {
        if let Some(usage) = e.downcast_ref::<UsageError>() {
            eprintln!("Error: {}", usage);
            if let Some(syntax) = syntax(usage.command) {
                eprintln!("Usage: {} {}", program, syntax);
            } else {
                print_usage(program);
            }
        } else {
            eprintln!("❌ {:#}", e);
            if let Some(hint) = e.downcast_ref::<Error>().and_then(Error::suggested_fix) {
                eprintln!("   Hint: {}", hint);
            }
        }
        std::process::exit(1);
    }
}

fn print_usage(program: &str) {
    println!("gpuim v{} - GPU image toolkit", gpuim::VERSION);
    println!();
    println!("Usage: {} [--config <file>] <command> [options]", program);
    println!();
    println!("Commands:");
    for (_, syntax) in COMMANDS {
        println!("  {}", syntax);
    }
    println!();
    println!("Interpolation: bilinear, lan3, lan4, lan5, mitchell, catmull, adobe, b-spline");
    println!("Colour spaces: srgb, ycc601, ycc709, ycc2020, hsv, hsl, ciexyz, cielab");
    println!("Set RUST_LOG=debug for dispatch tracing.");
}

fn run(mut args: &[String]) -> anyhow::Result<()> {
    let mut config_path = None;
    if args.first().map(String::as_str) == Some("--config") {
        let path = args.get(1).context("--config needs a file")?;
        config_path = Some(path.clone());
        args = &args[2..];
    }
    let config = match &config_path {
        Some(path) => ToolkitConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path))?,
        None => ToolkitConfig::default(),
    }
    .with_env_overrides()?;

    let Some((command, rest)) = args.split_first() else {
        print_usage("gpuim");
        return Ok(());
    };

    match command.as_str() {
        "env" => list_adapters(&config),
        "dev" => device_info(&config),
        "zoom" => zoom(&config, &Options::parse("zoom", rest, &[])?),
        "converse" => converse(&config, &Options::parse("converse", rest, &[])?),
        "rotate" => rotate(&config, &Options::parse("rotate", rest, &[])?),
        "contrast" => contrast(&config, &Options::parse("contrast", rest, &[])?),
        "gauss" => gauss(&config, &Options::parse("gauss", rest, &["--2d"])?),
        "wavelet" => wavelet(&config, &Options::parse("wavelet", rest, &[])?),
        "help" | "--help" | "-h" => {
            print_usage("gpuim");
            Ok(())
        }
        other => bail!("Unknown command: {} (try `gpuim help`)", other),
    }
}

fn list_adapters(config: &ToolkitConfig) -> anyhow::Result<()> {
    let adapters = DeviceEnv::list_adapters(&config.device)?;
    if adapters.is_empty() {
        println!("No adapters found for backend '{}'", config.device.backend);
    }
    for adapter in adapters {
        let marker = if adapter.index == config.device.adapter { "*" } else { " " };
        println!("{} {}", marker, adapter);
    }
    Ok(())
}

fn device_info(config: &ToolkitConfig) -> anyhow::Result<()> {
    let toolkit = Toolkit::new(config)?;
    let device = &toolkit.config().device;
    println!("{}", toolkit.env().info());
    println!(
        "Config:  adapter {} of '{}', scratch {} bytes",
        device.adapter, device.backend, device.scratch_bytes
    );
    println!();
    println!("Programs:");
    for program in Program::ALL {
        let kernels = toolkit.registry().kernel_names(program);
        println!("  {:<11} {} kernels", program.name(), kernels.len());
    }
    Ok(())
}

/// Load, transform, store, and report the elapsed time.
fn process(
    config: &ToolkitConfig,
    options: &Options,
    op: impl FnOnce(&Toolkit, &ImObject) -> gpuim::core::error::Result<ImPtr>,
) -> anyhow::Result<()> {
    let input = options.input()?;
    let output = options.output()?;
    let toolkit = Toolkit::new(config)?;
    let src = toolkit
        .load(input, Gamma::Srgb)
        .with_context(|| format!("Failed to load {}", input))?;
    let started = Instant::now();
    let dst = op(&toolkit, &src)?;
    log::info!(
        "{} {} -> {} in {:.1} ms",
        options.command,
        src.size(),
        dst.size(),
        started.elapsed().as_secs_f64() * 1000.0
    );
    toolkit
        .store(&dst, &output)
        .with_context(|| format!("Failed to store {}", output))?;
    println!("✅ Saved {}", output);
    Ok(())
}

fn zoom(config: &ToolkitConfig, options: &Options) -> anyhow::Result<()> {
    let interp: Interpolation = match options.get("-t")? {
        Some(interp) => interp,
        None => config.zoom.interpolation.parse()?,
    };
    let percent: Option<f64> = options.get("-f")?;
    let target = match (options.get::<u32>("-x")?, options.get::<u32>("-y")?) {
        (Some(w), Some(h)) => Some(Size::new(w, h)),
        (None, None) => None,
        _ => return Err(options.usage("-x and -y go together").into()),
    };
    match (percent, target) {
        (Some(percent), None) => process(config, options, |toolkit, src| {
            toolkit.zoomer().run(interp, percent / 100.0, src)
        }),
        (None, Some(target)) => process(config, options, |toolkit, src| {
            toolkit.zoomer().precise(src, target)
        }),
        _ => Err(options.usage("Give either -f or -x/-y").into()),
    }
}

fn converse(config: &ToolkitConfig, options: &Options) -> anyhow::Result<()> {
    let from: ColorSpace = options.get("-f")?.unwrap_or(ColorSpace::Srgb);
    let to: ColorSpace = options.get("-t")?.unwrap_or(ColorSpace::Ycc709);
    let input = options.input()?;
    let output = options.output()?;

    let toolkit = Toolkit::new(config)?;
    let src = toolkit
        .load_tagged(input, from)
        .with_context(|| format!("Failed to load {}", input))?;
    let dst = toolkit
        .converser()
        .run(from, to, &src, WriteMode::WriteBuffer)?;
    toolkit.store(&dst, &output)?;
    println!("✅ Saved {} ({} -> {})", output, from, to);
    Ok(())
}

fn rotate(config: &ToolkitConfig, options: &Options) -> anyhow::Result<()> {
    let degrees: f64 = options.require("-a")?;
    let algo: RotationAlgo = match options.get("-t")? {
        Some(algo) => algo,
        None => config.rotate.algorithm.parse()?,
    };
    process(config, options, |toolkit, src| {
        toolkit.rotator().run(algo, degrees, src)
    })
}

fn contrast(config: &ToolkitConfig, options: &Options) -> anyhow::Result<()> {
    let space: ColorSpace = options.get("-v")?.unwrap_or(ColorSpace::Srgb);
    let kind: String = options.get("-t")?.unwrap_or_else(|| "exclusive".to_string());
    let curve = match kind.as_str() {
        "manual" => ToneCurve::Manual {
            level: options.require("-c")?,
        },
        "exclusive" => {
            let percent = options
                .get("-e")?
                .unwrap_or(config.contrast.exclusion_percent);
            ToneCurve::Exclusive {
                fraction: percent / 100.0,
            }
        }
        "adaptive" => {
            let side = config.contrast.adaptive_region;
            ToneCurve::Adaptive {
                region: Size::new(
                    options.get("-x")?.unwrap_or(side),
                    options.get("-y")?.unwrap_or(side),
                ),
                exclude: options
                    .get("-e")?
                    .unwrap_or(config.contrast.adaptive_exclude),
            }
        }
        other => return Err(options.usage(format!("Unknown contrast type '{}'", other)).into()),
    };
    process(config, options, |toolkit, src| {
        toolkit.contrast_via(space, curve, src)
    })
}

fn gauss(config: &ToolkitConfig, options: &Options) -> anyhow::Result<()> {
    let sigma: f32 = options.get("-s")?.unwrap_or(config.filter.sigma);
    let window: usize = options.get("-w")?.unwrap_or(config.filter.window);
    let two_d = options.has("--2d");
    process(config, options, |toolkit, src| {
        if two_d {
            toolkit.filter().gauss_2d(sigma, window, src)
        } else {
            toolkit.filter().gauss(sigma, window, src)
        }
    })
}

fn wavelet(config: &ToolkitConfig, options: &Options) -> anyhow::Result<()> {
    let basis: Basis = match options.get("-b")? {
        Some(basis) => basis,
        None => config.wavelet.basis.parse()?,
    };
    let threshold: f32 = options.get("-t")?.unwrap_or(config.wavelet.threshold);
    process(config, options, |toolkit, src| {
        toolkit.wavelet().run(basis, threshold, src)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_flags_and_input() {
        let args = strings(&["in.png", "-o", "out.png", "-a", "-30", "--2d"]);
        let options = Options::parse("rotate", &args, &["--2d"]).unwrap();
        assert_eq!(options.input().unwrap(), "in.png");
        assert_eq!(options.output().unwrap(), "out.png");
        assert_eq!(options.require::<f64>("-a").unwrap(), -30.0);
        assert!(options.has("--2d"));
    }

    #[test]
    fn test_missing_value() {
        let args = strings(&["in.png", "-o"]);
        assert!(Options::parse("zoom", &args, &[]).is_err());
    }

    #[test]
    fn test_bad_value_names_flag() {
        let args = strings(&["in.png", "-w", "wide"]);
        let options = Options::parse("gauss", &args, &[]).unwrap();
        let err = options.get::<usize>("-w").unwrap_err();
        assert!(err.to_string().contains("-w"));
        assert_eq!(err.command, "gauss");
    }

    #[test]
    fn test_every_command_has_syntax() {
        for command in ["env", "dev", "zoom", "converse", "rotate", "contrast", "gauss", "wavelet"] {
            assert!(syntax(command).is_some());
        }
    }
}
