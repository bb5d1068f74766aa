//! Blur strength → pyramid plan, plus the small sizing helpers every pass shares

/// Width/height pair of a texture or dispatch target
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Integer division by `factor`, never collapsing below one texel
    pub fn scaled_down(self, factor: u32) -> Self {
        let factor = factor.max(1);
        Self::new((self.width / factor).max(1), (self.height / factor).max(1))
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}

/// Next pyramid level: half the size, rounded up.
///
/// Rounding up keeps odd dimensions from ever producing a zero-sized level,
/// which would in turn produce a zero thread-group dispatch.
#[inline]
pub fn half_size(size: Size) -> Size {
    Size::new((size.width + 1) / 2, (size.height + 1) / 2)
}

/// Reciprocal dimensions consumed by the kernels for texel-space offsets
#[inline]
pub fn texel_size_params(size: Size) -> [f32; 2] {
    [1.0 / size.width as f32, 1.0 / size.height as f32]
}

/// Thread groups needed to cover `size` with groups of `group_size`
#[inline]
pub fn group_count(size: Size, group_size: (u32, u32)) -> (u32, u32) {
    (
        size.width.div_ceil(group_size.0.max(1)),
        size.height.div_ceil(group_size.1.max(1)),
    )
}

/// Per-frame iteration plan derived from radius and intensity
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BlurPlan {
    /// `radius * intensity + 1`
    pub blur_factor: f32,
    /// Full pyramid depth below the top blend, `floor(log2(blur_factor))`
    pub iterations: u32,
    /// Fractional part of `log2(blur_factor)`, always in `[0, 1)`
    pub blend_ratio: f32,
}

impl BlurPlan {
    pub fn new(radius: f32, intensity: f32) -> Self {
        let blur_factor = (radius * intensity).max(0.0) + 1.0;
        let amount = blur_factor.log2();
        let iterations = amount.floor();
        let blend_ratio = (amount - iterations).clamp(0.0, 1.0 - f32::EPSILON);

        Self {
            blur_factor,
            iterations: iterations as u32,
            blend_ratio,
        }
    }

    /// No multi-level pyramid: one downsample, one upsample, one blend
    /// against the original frame.
    pub fn is_degenerate(&self) -> bool {
        self.iterations == 0
    }

    /// Sizes of every level the downsample walk produces, level 0 included.
    ///
    /// Always `iterations + 2` entries.
    pub fn level_sizes(&self, frame: Size) -> Vec<Size> {
        let mut sizes = Vec::with_capacity(self.iterations as usize + 2);
        sizes.push(frame);
        let mut current = frame;
        for _ in 0..=self.iterations {
            current = half_size(current);
            sizes.push(current);
        }
        sizes
    }
}
