use approx::assert_relative_eq;

use super::{ODD_FRAME, backend_with_frame, scope_labels};
use crate::dual_kawase::PYRAMID_TEXTURE_NAME;
use crate::recording::{Command, RecordingBackend};
use crate::{
    BlurError, BlurPlan, CameraKind, Dispatch, DualKawaseConfig, DualKawasePass, GpuBackend, Kernel,
    KernelInfo, KernelTable, OutputMode, PassOutput, ScratchKey, Size, TextureDesc, TextureHandle,
    half_size,
};

/// Recording backend whose dispatches fail once a countdown reaches zero
struct FailingBackend {
    inner: RecordingBackend,
    // dispatches that succeed before the failing one
    fail_after: Option<usize>,
}

impl GpuBackend for FailingBackend {
    fn resolve_kernel(&self, kernel: Kernel) -> Option<KernelInfo> {
        self.inner.resolve_kernel(kernel)
    }

    fn acquire_scratch(&mut self, key: ScratchKey, desc: TextureDesc) -> Result<TextureHandle, BlurError> {
        self.inner.acquire_scratch(key, desc)
    }

    fn release_scratch(&mut self, key: ScratchKey) -> Result<(), BlurError> {
        self.inner.release_scratch(key)
    }

    fn trim_scratch(&mut self) -> Result<(), BlurError> {
        self.inner.trim_scratch()
    }

    fn create_texture(&mut self, label: &str, desc: TextureDesc) -> Result<TextureHandle, BlurError> {
        self.inner.create_texture(label, desc)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) -> Result<(), BlurError> {
        self.inner.destroy_texture(texture)
    }

    fn dispatch(&mut self, dispatch: &Dispatch) -> Result<(), BlurError> {
        match self.fail_after {
            Some(0) => {
                self.fail_after = None;
                Err(BlurError::Gpu("device lost".to_string()))
            }
            Some(n) => {
                self.fail_after = Some(n - 1);
                self.inner.dispatch(dispatch)
            }
            None => self.inner.dispatch(dispatch),
        }
    }

    fn copy(&mut self, source: TextureHandle, target: TextureHandle) -> Result<(), BlurError> {
        self.inner.copy(source, target)
    }

    fn expose_named(&mut self, name: &str, texture: TextureHandle) -> Result<(), BlurError> {
        self.inner.expose_named(name, texture)
    }

    fn begin_scope(&mut self, label: &str) {
        self.inner.begin_scope(label)
    }

    fn end_scope(&mut self) {
        self.inner.end_scope()
    }
}

fn run_frame(radius: f32, intensity: f32, size: Size) -> (crate::recording::RecordingBackend, crate::FrameInfo, PassOutput) {
    let (mut backend, frame, kernels) = backend_with_frame(size);
    let pass = DualKawasePass::new("Dual Kawase Blur", &kernels).unwrap();
    let config = DualKawaseConfig::new(radius, intensity);
    let output = pass.run(&mut backend, &frame, &config).unwrap();
    (backend, frame, output)
}

#[test]
fn test_acquire_release_balance() {
    for k in 0..=8u32 {
        // radius 2^k - 1 at full intensity gives exactly k iterations
        let radius = ((1u32 << k) - 1) as f32;
        let (backend, _, _) = run_frame(radius, 1.0, ODD_FRAME);

        assert_eq!(BlurPlan::new(radius, 1.0).iterations, k);
        assert_eq!(backend.acquire_count(), backend.release_count(), "k={}", k);
        assert_eq!(backend.outstanding_scratch(), 0, "k={}", k);
        assert_eq!(backend.open_scopes(), 0, "k={}", k);
        assert!(backend.violations().is_empty(), "{:?}", backend.violations());
    }
}

#[test]
fn test_balance_across_fractional_strengths() {
    for radius in [1.0, 5.0, 33.0, 100.0, 200.0, 255.0] {
        for intensity in [0.1, 0.37, 0.5, 0.99] {
            let (backend, _, _) = run_frame(radius, intensity, Size::new(333, 77));
            assert_eq!(backend.acquire_count(), backend.release_count());
            assert_eq!(backend.outstanding_scratch(), 0);
            assert!(backend.violations().is_empty(), "{:?}", backend.violations());
        }
    }
}

#[test]
fn test_dispatch_counts() {
    for radius in [3.0, 32.0, 100.0, 255.0] {
        let iterations = BlurPlan::new(radius, 1.0).iterations as usize;
        let (backend, _, _) = run_frame(radius, 1.0, ODD_FRAME);

        assert_eq!(backend.dispatches_of(Kernel::Downsample).len(), iterations + 1);
        assert_eq!(backend.dispatches_of(Kernel::Upsample).len(), iterations + 1);
        assert_eq!(backend.dispatches_of(Kernel::LinearBlend).len(), 1);
        assert_eq!(backend.dispatches().len(), 2 * iterations + 3);
    }
}

#[test]
fn test_downsample_walk_halves_rounding_up() {
    let (backend, frame, _) = run_frame(255.0, 1.0, ODD_FRAME);
    let downsamples = backend.dispatches_of(Kernel::Downsample);

    assert_eq!(downsamples[0].source, frame.color_target);
    let mut expected = ODD_FRAME;
    for (i, d) in downsamples.iter().enumerate() {
        expected = half_size(expected);
        assert_eq!(backend.texture_size(d.target), Some(expected), "level {}", i + 1);
        assert_eq!(d.params.target_size, [expected.width, expected.height]);
        if i > 0 {
            // each level reads the one written before it
            assert_eq!(d.source, downsamples[i - 1].target);
        }
    }
    assert_eq!(expected, Size::new(4, 3));
}

#[test]
fn test_upsample_walk_returns_to_full_size() {
    let (backend, frame, _) = run_frame(32.0, 1.0, ODD_FRAME);
    let downsamples = backend.dispatches_of(Kernel::Downsample);
    let upsamples = backend.dispatches_of(Kernel::Upsample);

    // starts from the coarsest level
    assert_eq!(upsamples[0].source, downsamples.last().unwrap().target);
    for pair in upsamples.windows(2) {
        assert_eq!(pair[1].source, pair[0].target);
        let larger = backend.texture_size(pair[1].target).unwrap();
        let smaller = backend.texture_size(pair[0].target).unwrap();
        assert_eq!(half_size(larger), smaller);
    }

    let last = upsamples.last().unwrap();
    assert_eq!(backend.texture_size(last.target), Some(frame.size()));
}

#[test]
fn test_blend_follows_top_upsample() {
    let (backend, _, _) = run_frame(100.0, 0.5, ODD_FRAME);
    let dispatches = backend.dispatches();
    let iterations = BlurPlan::new(100.0, 0.5).iterations as usize;

    let blend_at = dispatches
        .iter()
        .position(|d| d.kernel == Kernel::LinearBlend)
        .unwrap();
    // after every downsample and the first upsample
    assert_eq!(blend_at, iterations + 2);

    let top_upsample = dispatches[blend_at - 1];
    let blend = dispatches[blend_at];
    let downsamples = backend.dispatches_of(Kernel::Downsample);

    assert_eq!(top_upsample.kernel, Kernel::Upsample);
    assert_eq!(blend.target, top_upsample.target);
    // the second-deepest level is mixed in
    assert_eq!(blend.source, downsamples[iterations - 1].target);
    assert_relative_eq!(blend.params.blend_ratio, 51f32.log2() - 5.0, epsilon = 1e-5);

    // the blended texture feeds the rest of the walk
    let next = dispatches[blend_at + 1];
    assert_eq!(next.kernel, Kernel::Upsample);
    assert_eq!(next.source, blend.target);
}

#[test]
fn test_degenerate_path() {
    let (backend, frame, output) = run_frame(32.0, 0.01, Size::new(64, 48));
    assert!(BlurPlan::new(32.0, 0.01).is_degenerate());

    let kernels: Vec<Kernel> = backend.dispatches().iter().map(|d| d.kernel).collect();
    assert_eq!(kernels, vec![Kernel::Downsample, Kernel::Upsample, Kernel::LinearBlend]);

    let dispatches = backend.dispatches();
    let (up, blend) = (dispatches[1], dispatches[2]);
    assert_eq!(up.source, dispatches[0].target);
    assert_eq!(backend.texture_size(up.target), Some(Size::new(64, 48)));
    // blends against the untouched frame colour
    assert_eq!(blend.source, frame.color_target);
    assert_eq!(blend.target, up.target);

    assert_eq!(output, PassOutput::Composited);
    assert_eq!(backend.acquire_count(), 2);
    assert_eq!(backend.release_count(), 2);
    assert!(backend.violations().is_empty(), "{:?}", backend.violations());
}

#[test]
fn test_single_level_pyramid_is_released() {
    let (backend, _, _) = run_frame(0.5, 1.0, Size::new(5, 5));
    let level = ScratchKey::indexed(PYRAMID_TEXTURE_NAME, 0);

    let released = backend
        .commands()
        .iter()
        .any(|c| matches!(c, Command::Release { key, .. } if *key == level));
    assert!(released);
}

#[test]
fn test_composite_copies_to_frame() {
    let (backend, frame, output) = run_frame(32.0, 1.0, ODD_FRAME);
    let last_upsample = *backend.dispatches_of(Kernel::Upsample).last().unwrap();

    assert_eq!(output, PassOutput::Composited);
    assert!(backend.commands().contains(&Command::Copy {
        source: last_upsample.target,
        target: frame.color_target,
    }));
    assert!(!backend.commands().iter().any(|c| matches!(c, Command::Expose { .. })));
}

#[test]
fn test_expose_leaves_frame_untouched() {
    let (mut backend, frame, kernels) = backend_with_frame(ODD_FRAME);
    let pass = DualKawasePass::new("Dual Kawase Blur", &kernels).unwrap();
    let config = DualKawaseConfig::new(32.0, 1.0)
        .with_output(OutputMode::Expose)
        .with_target_name("_SceneBlur");

    let output = pass.run(&mut backend, &frame, &config).unwrap();
    let last_upsample = *backend.dispatches_of(Kernel::Upsample).last().unwrap();

    assert_eq!(
        output,
        PassOutput::Exposed {
            name: "_SceneBlur".to_string(),
            texture: last_upsample.target,
        }
    );
    assert!(!backend
        .commands()
        .iter()
        .any(|c| matches!(c, Command::Copy { target, .. } if *target == frame.color_target)));
    assert_eq!(backend.outstanding_scratch(), 0);
}

#[test]
fn test_frame_to_frame_determinism() {
    let (mut backend, frame, kernels) = backend_with_frame(ODD_FRAME);
    let pass = DualKawasePass::new("Dual Kawase Blur", &kernels).unwrap();
    let config = DualKawaseConfig::new(200.0, 0.7);

    pass.run(&mut backend, &frame, &config).unwrap();
    let first = backend.dispatches();
    let allocations = backend.scratch_allocations();
    backend.clear();

    pass.run(&mut backend, &frame, &config).unwrap();
    let second = backend.dispatches();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.kernel, b.kernel);
        assert_eq!(a.params, b.params);
        assert_eq!(a.groups, b.groups);
        assert_eq!(backend.texture_size(a.target), backend.texture_size(b.target));
    }
    // second frame runs entirely on pooled memory
    assert_eq!(backend.scratch_allocations(), allocations);
}

#[test]
fn test_scopes_nest_under_pass_label() {
    let (backend, _, _) = run_frame(0.5, 1.0, Size::new(16, 16));
    assert_eq!(
        scope_labels(&backend),
        vec!["Dual Kawase Blur", "DownSample Blur", "UpSample Blur", "Linear Blend"]
    );
    assert_eq!(backend.commands().first(), Some(&Command::BeginScope("Dual Kawase Blur".to_string())));
    assert_eq!(backend.commands().last(), Some(&Command::EndScope));
}

#[test]
fn test_tiny_frame_has_no_empty_dispatch() {
    let (backend, _, _) = run_frame(255.0, 1.0, Size::new(1, 1));
    assert!(backend.violations().is_empty(), "{:?}", backend.violations());
    for d in backend.dispatches() {
        assert_eq!(d.groups, (1, 1));
    }
}

#[test]
fn test_failed_frame_releases_scratch() {
    let config = DualKawaseConfig::new(100.0, 0.5);
    let iterations = BlurPlan::new(100.0, 0.5).iterations as usize;
    let total = 2 * iterations + 3;

    // fail at every dispatch position in turn, including the blend
    for fail_at in 0..total {
        let mut inner = RecordingBackend::new();
        let frame = inner.frame(ODD_FRAME, CameraKind::Game);
        let mut backend = FailingBackend {
            inner,
            fail_after: Some(fail_at),
        };
        let kernels = KernelTable::resolve(&backend);
        let pass = DualKawasePass::new("Dual Kawase Blur", &kernels).unwrap();

        assert!(pass.run(&mut backend, &frame, &config).is_err(), "fail_at={}", fail_at);
        assert_eq!(backend.inner.outstanding_scratch(), 0, "fail_at={}", fail_at);
        assert_eq!(backend.inner.acquire_count(), backend.inner.release_count());
        assert_eq!(backend.inner.open_scopes(), 0);

        // the next frame runs normally on the same pool
        backend.inner.clear();
        let output = pass.run(&mut backend, &frame, &config).unwrap();
        assert_eq!(output, PassOutput::Composited);
        assert_eq!(backend.inner.dispatches().len(), total);
        assert_eq!(backend.inner.outstanding_scratch(), 0);
    }
}

#[test]
fn test_failed_degenerate_frame_releases_scratch() {
    let mut inner = RecordingBackend::new();
    let frame = inner.frame(Size::new(64, 48), CameraKind::Game);
    let mut backend = FailingBackend {
        inner,
        fail_after: Some(2),
    };
    let kernels = KernelTable::resolve(&backend);
    let pass = DualKawasePass::new("Dual Kawase Blur", &kernels).unwrap();
    let config = DualKawaseConfig::new(0.5, 1.0);

    // blend fails after the single level was already released
    assert!(pass.run(&mut backend, &frame, &config).is_err());
    assert_eq!(backend.inner.outstanding_scratch(), 0);
    assert!(pass.run(&mut backend, &frame, &config).is_ok());
}

#[test]
fn test_target_name_does_not_collide_with_levels() {
    let (mut backend, frame, kernels) = backend_with_frame(ODD_FRAME);
    let pass = DualKawasePass::new("Dual Kawase Blur", &kernels).unwrap();
    let name = format!("{}0", PYRAMID_TEXTURE_NAME);
    let config = DualKawaseConfig::new(32.0, 1.0)
        .with_output(OutputMode::Expose)
        .with_target_name(name.clone());

    let output = pass.run(&mut backend, &frame, &config).unwrap();

    assert!(matches!(output, PassOutput::Exposed { name: exposed, .. } if exposed == name));
    assert_eq!(backend.outstanding_scratch(), 0);
    assert!(backend.violations().is_empty(), "{:?}", backend.violations());
}

#[test]
fn test_trim_scratch_destroys_pooled_textures() {
    let (mut backend, frame, kernels) = backend_with_frame(ODD_FRAME);
    let pass = DualKawasePass::new("Dual Kawase Blur", &kernels).unwrap();
    let config = DualKawaseConfig::new(32.0, 1.0);

    pass.run(&mut backend, &frame, &config).unwrap();
    let pooled = backend.scratch_allocations();
    // output, iterations + 1 levels and the spare
    assert_eq!(pooled, BlurPlan::new(32.0, 1.0).iterations as usize + 3);
    backend.clear();

    backend.trim_scratch().unwrap();
    let destroyed: Vec<TextureHandle> = backend
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::Destroy { texture } => Some(*texture),
            _ => None,
        })
        .collect();
    assert_eq!(destroyed.len(), pooled);
    assert!(!destroyed.contains(&frame.color_target));
    for texture in &destroyed {
        assert_eq!(backend.texture_size(*texture), None);
    }

    // nothing left to reuse: the next frame allocates afresh
    pass.run(&mut backend, &frame, &config).unwrap();
    assert_eq!(backend.scratch_allocations(), 2 * pooled);
    assert!(backend.violations().is_empty(), "{:?}", backend.violations());

    // an empty free list trims to nothing
    backend.trim_scratch().unwrap();
    backend.clear();
    backend.trim_scratch().unwrap();
    assert!(backend.commands().is_empty());
}
