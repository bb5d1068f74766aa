//! Interactive viewer - keys drive the blur settings, GPU result shown via minifb

use minifb::{Key, KeyRepeat, Window, WindowOptions};

use kawase_blur::gpu::{GpuContext, WgpuBackend};
use kawase_blur::{
    BlurError, CameraKind, DualKawaseConfig, FrameInfo, GpuBackend, PassOutput, TextureDesc,
    TextureFormat,
};

use crate::{Effect, Effects, Options, source_image};

pub fn run(mut options: Options) -> Result<(), BlurError> {
    let source = source_image(&options)?;
    let (width, height) = (source.width as usize, source.height as usize);

    let mut window = Window::new(
        "Kawase Blur - Interactive Viewer (ESC to exit)",
        width,
        height,
        WindowOptions {
            resize: false,
            ..WindowOptions::default()
        },
    )
    .map_err(|e| BlurError::Gpu(e.to_string()))?;
    window.set_target_fps(60);

    let mut backend = WgpuBackend::new(GpuContext::new()?, TextureFormat::Rgba8Unorm);
    let mut effects = Effects::new(&backend);

    let descriptor = TextureDesc::new(source.size(), TextureFormat::Rgba8Unorm);
    let color_target = backend.create_texture("Frame Color", descriptor)?;
    let frame = FrameInfo {
        color_target,
        descriptor,
        camera: CameraKind::Game,
    };

    println!("=== Interactive Blur Viewer ===");
    println!("Controls:");
    println!("  1/2/3      - Effect: Dual Kawase/Kawase/Pixelate");
    println!("  Up/Down    - Radius (dual) / passes (kawase) / block size");
    println!("  Left/Right - Intensity (dual) / downsample (kawase)");
    println!("  ESC        - Exit");
    println!();

    let mut buffer = Vec::new();
    let mut dirty = true;

    while window.is_open() && !window.is_key_down(Key::Escape) {
        let previous = options.effect;
        if let Some(changed) = handle_keys(&window, &mut options) {
            println!("{}", changed);
            if options.effect != previous {
                // the old effect's textures are not coming back
                backend.trim_scratch()?;
            }
            dirty = true;
        }

        if dirty {
            // every frame starts from the unblurred source
            backend.upload(color_target, &source)?;
            let image = match effects.render(&mut backend, &frame, &options)? {
                PassOutput::Exposed { name, .. } => match backend.named(&name) {
                    Some(texture) => backend.read_back(texture)?,
                    None => backend.read_back(color_target)?,
                },
                _ => backend.read_back(color_target)?,
            };
            // exposed results can be smaller than the window
            buffer = image.scaled_to(source.size()).to_argb();
            dirty = false;
        }

        window
            .update_with_buffer(&buffer, width, height)
            .map_err(|e| BlurError::Gpu(e.to_string()))?;
    }

    effects.dispose(&mut backend)?;
    backend.destroy_texture(color_target)
}

fn handle_keys(window: &Window, options: &mut Options) -> Option<String> {
    let pressed = |key| window.is_key_pressed(key, KeyRepeat::Yes);

    if window.is_key_pressed(Key::Key1, KeyRepeat::No) {
        options.effect = Effect::DualKawase;
        return Some("Effect: Dual Kawase".to_string());
    }
    if window.is_key_pressed(Key::Key2, KeyRepeat::No) {
        options.effect = Effect::Kawase;
        return Some("Effect: Kawase".to_string());
    }
    if window.is_key_pressed(Key::Key3, KeyRepeat::No) {
        options.effect = Effect::Pixelate;
        return Some("Effect: Pixelate".to_string());
    }

    let step: i32 = if pressed(Key::Up) {
        1
    } else if pressed(Key::Down) {
        -1
    } else {
        0
    };
    let side: i32 = if pressed(Key::Right) {
        1
    } else if pressed(Key::Left) {
        -1
    } else {
        0
    };
    if step == 0 && side == 0 {
        return None;
    }

    match options.effect {
        Effect::DualKawase => {
            let config = DualKawaseConfig::new(
                options.radius + step as f32 * 8.0,
                options.intensity + side as f32 * 0.05,
            );
            options.radius = config.radius;
            options.intensity = config.intensity;
            let plan = kawase_blur::BlurPlan::new(config.radius, config.intensity);
            Some(format!(
                "Radius: {:.0}, intensity: {:.2} ({} iterations, blend {:.3})",
                options.radius, options.intensity, plan.iterations, plan.blend_ratio
            ))
        }
        Effect::Kawase => {
            let config = kawase_blur::KawaseConfig::new(
                options.passes.saturating_add_signed(step),
                options.downsample.saturating_add_signed(side),
            );
            options.passes = config.pass_count;
            options.downsample = config.downsample;
            Some(format!("Passes: {}, downsample: {}", options.passes, options.downsample))
        }
        Effect::Pixelate => {
            options.block = kawase_blur::PixelateConfig::new(options.block.saturating_add_signed(step)).block_size;
            Some(format!("Block size: {}", options.block))
        }
    }
}
