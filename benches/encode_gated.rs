// Run with:  cargo bench --bench encode_gated

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hub75_bitplane::display::{Display, EngineConfig};
use hub75_bitplane::encoder::Strategy;
use hub75_bitplane::frame::Frame;
use hub75_bitplane::panel::{PanelConfig, PANEL_128X128, PANEL_64X64};
use hub75_bitplane::Color;
use std::hint::black_box;
use std::time::Duration;

fn configure_criterion() -> Criterion {
    Criterion::default()
        .sample_size(100)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(2))
}

// A gradient touches every plane, unlike a solid fill
fn gradient(panel: &PanelConfig) -> Frame {
    let mut frame = Frame::new(panel);
    for y in 0..panel.height() {
        for x in 0..panel.width() {
            let color = Color::new((x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8);
            frame.framebuffer.set_pixel(x, y, color);
        }
    }
    frame
}

fn encode_gated(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_gated");

    for (name, panel) in [("64x64", PANEL_64X64), ("128x128", PANEL_128X128)] {
        for bits in [4, 8] {
            group.throughput(Throughput::Elements(panel.pixel_count() as u64));
            let frame = gradient(&panel);
            let mut display = Display::new(EngineConfig {
                panel,
                strategy: Strategy::Gated,
                bit_planes: bits,
                brightness: 40,
            });
            group.bench_with_input(BenchmarkId::new(name, bits), &frame, |b, frame| {
                b.iter(|| black_box(&mut display).encode_frame(black_box(frame)));
            });
        }
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = configure_criterion();
    targets = encode_gated
}
criterion_main!(benches);
