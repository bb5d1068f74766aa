//! Per-effect settings, produced by the host once per frame
//!
//! Values are clamped here so the passes can assume valid input.

/// Where in the frame's pass list an effect is inserted
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PassEvent {
    AfterRenderingSkybox,
    BeforeRenderingPostProcessing,
    AfterRendering,
}

/// What happens to the blurred result
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutputMode {
    /// Copy back onto the frame's colour target
    CopyToFrame,
    /// Publish under the configured target name, leave the frame untouched
    Expose,
}

/// Common surface of every effect configuration
pub trait EffectConfig {
    /// Inactive effects are never executed
    fn is_active(&self) -> bool;

    fn pass_event(&self) -> PassEvent;
}

pub const DEFAULT_TARGET_NAME: &str = "_BlurTexture";

/// Dual Kawase settings
#[derive(Clone, Debug, PartialEq)]
pub struct DualKawaseConfig {
    pub enabled: bool,
    /// Blur radius in texels, `[0, 255]`
    pub radius: f32,
    /// Scales the radius, `[0, 1]`
    pub intensity: f32,
    pub output: OutputMode,
    pub target_name: String,
}

impl DualKawaseConfig {
    pub const MAX_RADIUS: f32 = 255.0;

    /// Enabled config with clamped radius and intensity
    pub fn new(radius: f32, intensity: f32) -> Self {
        Self {
            enabled: true,
            radius,
            intensity,
            ..Default::default()
        }
        .clamped()
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn with_target_name(mut self, name: impl Into<String>) -> Self {
        self.target_name = name.into();
        self
    }

    pub fn clamped(mut self) -> Self {
        self.radius = clamp_or_zero(self.radius, 0.0, Self::MAX_RADIUS);
        self.intensity = clamp_or_zero(self.intensity, 0.0, 1.0);
        self
    }
}

impl Default for DualKawaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            radius: 32.0,
            intensity: 0.0,
            output: OutputMode::CopyToFrame,
            target_name: DEFAULT_TARGET_NAME.to_string(),
        }
    }
}

impl EffectConfig for DualKawaseConfig {
    fn is_active(&self) -> bool {
        self.enabled && self.intensity > 0.0
    }

    fn pass_event(&self) -> PassEvent {
        match self.output {
            OutputMode::CopyToFrame => PassEvent::BeforeRenderingPostProcessing,
            OutputMode::Expose => PassEvent::AfterRenderingSkybox,
        }
    }
}

/// Fixed-pass ping-pong Kawase settings
#[derive(Clone, Debug, PartialEq)]
pub struct KawaseConfig {
    pub enabled: bool,
    /// `[2, 15]`
    pub pass_count: u32,
    /// Divisor of the frame size for the ping-pong buffers, `[1, 4]`
    pub downsample: u32,
    /// Final pass writes the frame instead of exposing a named texture
    pub full_screen: bool,
    pub target_name: String,
}

impl KawaseConfig {
    pub const PASS_RANGE: (u32, u32) = (2, 15);
    pub const DOWNSAMPLE_RANGE: (u32, u32) = (1, 4);

    pub fn new(pass_count: u32, downsample: u32) -> Self {
        Self {
            enabled: true,
            pass_count,
            downsample,
            ..Default::default()
        }
        .clamped()
    }

    pub fn full_screen(mut self, full_screen: bool) -> Self {
        self.full_screen = full_screen;
        self
    }

    pub fn clamped(mut self) -> Self {
        self.pass_count = self.pass_count.clamp(Self::PASS_RANGE.0, Self::PASS_RANGE.1);
        self.downsample = self
            .downsample
            .clamp(Self::DOWNSAMPLE_RANGE.0, Self::DOWNSAMPLE_RANGE.1);
        self
    }
}

impl Default for KawaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pass_count: 2,
            downsample: 1,
            full_screen: false,
            target_name: DEFAULT_TARGET_NAME.to_string(),
        }
    }
}

impl EffectConfig for KawaseConfig {
    fn is_active(&self) -> bool {
        self.enabled
    }

    fn pass_event(&self) -> PassEvent {
        PassEvent::AfterRenderingSkybox
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PixelateConfig {
    pub enabled: bool,
    /// Edge length of one output block in pixels, `[2, 30]`
    pub block_size: u32,
}

impl PixelateConfig {
    pub const BLOCK_RANGE: (u32, u32) = (2, 30);

    pub fn new(block_size: u32) -> Self {
        Self {
            enabled: true,
            block_size: block_size.clamp(Self::BLOCK_RANGE.0, Self::BLOCK_RANGE.1),
        }
    }
}

impl Default for PixelateConfig {
    fn default() -> Self {
        Self::new(10)
    }
}

impl EffectConfig for PixelateConfig {
    fn is_active(&self) -> bool {
        self.enabled
    }

    fn pass_event(&self) -> PassEvent {
        PassEvent::AfterRendering
    }
}

// NaN collapses to the lower bound instead of poisoning the plan
fn clamp_or_zero(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() { min } else { value.clamp(min, max) }
}
