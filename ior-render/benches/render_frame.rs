use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use ior_core::{DisplayState, Layout, PlaceholderId, Presenter, SaccadeLoc, TrialPhase};
use ior_render::{RenderStyle, SkiaRenderer};
use ior_timing::HighPrecisionTimer;

fn harness() -> (SkiaRenderer, Vec<u8>, HighPrecisionTimer) {
    let layout = Layout::new(1280, 1440, 30.0);
    let style = RenderStyle::from_degrees(&layout, 1.5, 1.5, 0.75, 0.1, 0.3, 28.0);
    let fb = vec![0u8; (layout.width * layout.height * 4) as usize];
    let r = SkiaRenderer::new(layout, style, None).expect("renderer");
    (r, fb, HighPrecisionTimer::new())
}

fn target_display() -> DisplayState {
    let id = |n| PlaceholderId::new(n).expect("placeholder");
    DisplayState::compose(TrialPhase::Target, true, id(4), SaccadeLoc::Upper, id(3))
}

pub fn bench_frames(c: &mut Criterion) {
    let mut g = c.benchmark_group("render_frame");
    g.sample_size(40);

    g.bench_function("target_frame", |b| {
        b.iter_batched(
            || {
                let mut h = harness();
                h.0.present(&target_display());
                h
            },
            |(mut r, mut fb, mut t)| {
                black_box(r.render_frame(&mut fb, &mut t).ok());
            },
            BatchSize::LargeInput,
        )
    });

    g.bench_function("steady_state", |b| {
        let (mut r, mut fb, mut t) = harness();
        r.present(&target_display());
        b.iter(|| black_box(r.render_frame(&mut fb, &mut t).ok()));
    });

    g.finish();
}

criterion_group!(benches, bench_frames);
criterion_main!(benches);
