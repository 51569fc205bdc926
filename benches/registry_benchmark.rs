use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use image::{DynamicImage, RgbaImage};
use marker_icons::{IconArtifact, IconSubscriber, SharedIconRegistry};
use std::hint::black_box;
use std::sync::Arc;

struct NullMarker;

impl IconSubscriber<u32> for NullMarker {
    fn set_icon(&self, artifact: &IconArtifact<u32>) {
        black_box(artifact.descriptor);
    }
}

fn benchmark_get_or_create_hit(c: &mut Criterion) {
    let registry = SharedIconRegistry::<u32>::new();
    registry.get_or_create("pin.png");

    c.bench_function("get_or_create_hit", |b| {
        b.iter(|| registry.get_or_create(black_box("pin.png")))
    });
}

fn benchmark_subscribe_evict_cycle(c: &mut Criterion) {
    let registry = SharedIconRegistry::<u32>::new();
    let marker = Arc::new(NullMarker);

    c.bench_function("subscribe_evict_cycle", |b| {
        b.iter(|| {
            let icon = registry.subscribe(black_box("pin.png"), &marker);
            icon.remove_marker(&marker);
            registry.remove_if_empty("pin.png")
        })
    });
}

fn benchmark_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_icon_fanout");
    let image = DynamicImage::ImageRgba8(RgbaImage::new(32, 32));

    for subscribers in [1usize, 16, 256] {
        let registry = SharedIconRegistry::<u32>::new();
        let markers: Vec<_> = (0..subscribers).map(|_| Arc::new(NullMarker)).collect();
        let icon = registry.get_or_create("pin.png");
        for marker in &markers {
            icon.add_marker(marker);
        }

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| b.iter(|| icon.update_icon(1, &image)),
        );
    }
    group.finish();
}

fn benchmark_contended_subscribe(c: &mut Criterion) {
    let registry = Arc::new(SharedIconRegistry::<u32>::new());

    c.bench_function("contended_subscribe_4_threads", |b| {
        b.iter(|| {
            std::thread::scope(|scope| {
                for thread in 0..4 {
                    let registry = &registry;
                    scope.spawn(move || {
                        let marker = Arc::new(NullMarker);
                        for i in 0..64 {
                            let uri = if (i + thread) % 2 == 0 { "pin.png" } else { "flag.png" };
                            let icon = registry.subscribe(uri, &marker);
                            icon.remove_marker(&marker);
                            registry.remove_if_empty(uri);
                        }
                    });
                }
            });
        })
    });
}

criterion_group!(
    benches,
    benchmark_get_or_create_hit,
    benchmark_subscribe_evict_cycle,
    benchmark_fanout,
    benchmark_contended_subscribe
);
criterion_main!(benches);
