mod interactive;

use kawase_blur::gpu::{GpuContext, WgpuBackend};
use kawase_blur::recording::{Command, RecordingBackend};
use kawase_blur::{
    BlurError, BlurFeature, CameraKind, DualKawaseConfig, DualKawasePass, FrameInfo, GpuBackend,
    KawaseConfig, KawasePass, KernelTable, OutputMode, PassOutput, PixelateConfig, PixelatePass,
    RgbaImage, Size, TextureDesc, TextureFormat,
};

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Effect {
    DualKawase,
    Kawase,
    Pixelate,
}

/// Settings shared by every run mode
#[derive(Clone, Debug)]
pub struct Options {
    pub effect: Effect,
    pub size: Size,
    pub radius: f32,
    pub intensity: f32,
    pub passes: u32,
    pub downsample: u32,
    pub block: u32,
    pub expose: bool,
    pub input: Option<String>,
    pub output: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            effect: Effect::DualKawase,
            size: Size::new(1920, 1081),
            radius: 32.0,
            intensity: 1.0,
            passes: 4,
            downsample: 1,
            block: 10,
            expose: false,
            input: None,
            output: "blurred.ppm".to_string(),
        }
    }
}

impl Options {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut options = Self::default();
        let mut args = args.iter();
        while let Some(flag) = args.next() {
            let mut value = || args.next().ok_or(format!("{} needs a value", flag));
            match flag.as_str() {
                "--effect" => {
                    options.effect = match value()?.as_str() {
                        "dual" => Effect::DualKawase,
                        "kawase" => Effect::Kawase,
                        "pixelate" => Effect::Pixelate,
                        other => return Err(format!("unknown effect {}", other)),
                    }
                }
                "--size" => options.size = parse_size(value()?)?,
                "--radius" => options.radius = parse(flag, value()?)?,
                "--intensity" => options.intensity = parse(flag, value()?)?,
                "--passes" => options.passes = parse(flag, value()?)?,
                "--downsample" => options.downsample = parse(flag, value()?)?,
                "--block" => options.block = parse(flag, value()?)?,
                "--input" => options.input = Some(value()?.clone()),
                "--output" => options.output = value()?.clone(),
                "--expose" => options.expose = true,
                other => return Err(format!("unknown flag {}", other)),
            }
        }
        Ok(options)
    }

    pub fn dual_kawase(&self) -> DualKawaseConfig {
        let output = if self.expose { OutputMode::Expose } else { OutputMode::CopyToFrame };
        DualKawaseConfig::new(self.radius, self.intensity).with_output(output)
    }

    pub fn kawase(&self) -> KawaseConfig {
        KawaseConfig::new(self.passes, self.downsample).full_screen(!self.expose)
    }

    pub fn pixelate(&self) -> PixelateConfig {
        PixelateConfig::new(self.block)
    }
}

fn parse<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid value {:?} for {}", value, flag))
}

fn parse_size(value: &str) -> Result<Size, String> {
    let (w, h) = value
        .split_once('x')
        .ok_or(format!("size must look like 1920x1080, got {:?}", value))?;
    let size = Size::new(parse("--size", w)?, parse("--size", h)?);
    if size.is_empty() {
        return Err("size must be non-zero".to_string());
    }
    Ok(size)
}

/// The three features, created once against a backend's kernels
pub struct Effects {
    pub dual_kawase: BlurFeature<DualKawasePass>,
    pub kawase: BlurFeature<KawasePass>,
    pub pixelate: BlurFeature<PixelatePass>,
}

impl Effects {
    pub fn new<B: GpuBackend>(backend: &B) -> Self {
        let kernels = KernelTable::resolve(backend);
        Self {
            dual_kawase: BlurFeature::create("Dual Kawase Blur", &kernels, DualKawasePass::new),
            kawase: BlurFeature::create("Kawase Blur", &kernels, KawasePass::new),
            pixelate: BlurFeature::create("Pixelate", &kernels, PixelatePass::new),
        }
    }

    pub fn render<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        frame: &FrameInfo,
        options: &Options,
    ) -> Result<PassOutput, BlurError> {
        match options.effect {
            Effect::DualKawase => self.dual_kawase.render(backend, frame, Some(&options.dual_kawase())),
            Effect::Kawase => self.kawase.render(backend, frame, Some(&options.kawase())),
            Effect::Pixelate => self.pixelate.render(backend, frame, Some(&options.pixelate())),
        }
    }

    pub fn dispose<B: GpuBackend>(&mut self, backend: &mut B) -> Result<(), BlurError> {
        self.dual_kawase.dispose(backend)?;
        self.kawase.dispose(backend)?;
        self.pixelate.dispose(backend)?;
        backend.trim_scratch()
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let Some(mode) = args.get(1) else {
        print_usage();
        return;
    };
    let options = match Options::parse(&args[2..]) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            return;
        }
    };

    let result = match mode.as_str() {
        "--trace" => run_trace(&options),
        "--headless" => run_headless(&options),
        "--interactive" => interactive::run(options),
        _ => {
            print_usage();
            Ok(())
        }
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }
}

fn print_usage() {
    println!("Kawase Blur");
    println!("Run with --trace to print the command sequence for one frame");
    println!("Run with --headless to blur an image on the GPU and save it");
    println!("Run with --interactive for a minifb viewer");
    println!();
    println!("Options: --effect dual|kawase|pixelate --size WxH --radius R --intensity I");
    println!("         --passes N --downsample D --block B --input in.ppm --output out.ppm --expose");
}

fn run_trace(options: &Options) -> Result<(), BlurError> {
    let mut backend = RecordingBackend::new();
    let mut effects = Effects::new(&backend);
    let frame = backend.frame(options.size, CameraKind::Game);

    let output = effects.render(&mut backend, &frame, options)?;

    let mut depth = 0usize;
    for command in backend.commands() {
        if *command == Command::EndScope {
            depth = depth.saturating_sub(1);
        }
        println!("{}{}", "  ".repeat(depth), command);
        if matches!(command, Command::BeginScope(_)) {
            depth += 1;
        }
    }
    println!();
    println!(
        "{} dispatches, {} acquires, {} releases -> {:?}",
        backend.dispatches().len(),
        backend.acquire_count(),
        backend.release_count(),
        output
    );

    effects.dispose(&mut backend)
}

/// Load the input image (or generate the test pattern)
pub fn source_image(options: &Options) -> Result<RgbaImage, BlurError> {
    match &options.input {
        Some(path) => Ok(RgbaImage::load_ppm(path)?),
        None => Ok(RgbaImage::test_pattern(options.size.width, options.size.height, 32)),
    }
}

fn run_headless(options: &Options) -> Result<(), BlurError> {
    let source = source_image(options)?;
    let mut backend = WgpuBackend::new(GpuContext::new()?, TextureFormat::Rgba8Unorm);
    let mut effects = Effects::new(&backend);

    let descriptor = TextureDesc::new(source.size(), TextureFormat::Rgba8Unorm);
    let color_target = backend.create_texture("Frame Color", descriptor)?;
    backend.upload(color_target, &source)?;
    let frame = FrameInfo {
        color_target,
        descriptor,
        camera: CameraKind::Game,
    };

    let result = match effects.render(&mut backend, &frame, options)? {
        PassOutput::Exposed { name, .. } => {
            let texture = backend
                .named(&name)
                .ok_or_else(|| BlurError::Gpu(format!("{} was not exposed", name)))?;
            backend.read_back(texture)?
        }
        _ => backend.read_back(color_target)?,
    };

    result.save_ppm(&options.output)?;
    log::info!(
        "Wrote {} ({}x{}) on {}",
        options.output,
        result.width,
        result.height,
        backend.context().adapter_name
    );

    effects.dispose(&mut backend)?;
    backend.destroy_texture(color_target)
}
