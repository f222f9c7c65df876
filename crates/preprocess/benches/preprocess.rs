use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use preprocess::{CenterCrop, DepthResize, Letterbox};

/// Create raw pixel buffer for benchmarking (gradient pattern)
fn create_test_pixels(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = vec![0u8; (width * height * 3) as usize];
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 3) as usize;
            pixels[idx] = (x % 256) as u8; // R
            pixels[idx + 1] = (y % 256) as u8; // G
            pixels[idx + 2] = ((x + y) % 256) as u8; // B
        }
    }
    pixels
}

const RESOLUTIONS: [(u32, u32); 3] = [(640, 480), (1280, 720), (1920, 1080)];

fn benchmark_letterbox(c: &mut Criterion) {
    let mut group = c.benchmark_group("letterbox");
    let mut letterbox = Letterbox::default();

    for (width, height) in RESOLUTIONS.iter() {
        let pixels = create_test_pixels(*width, *height);

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &pixels,
            |b, pixels| {
                b.iter(|| {
                    letterbox
                        .apply(black_box(pixels), black_box(*width), black_box(*height))
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

fn benchmark_depth_resize(c: &mut Criterion) {
    let mut group = c.benchmark_group("depth_resize");
    let mut resize = DepthResize::default();

    for (width, height) in RESOLUTIONS.iter() {
        let pixels = create_test_pixels(*width, *height);

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &pixels,
            |b, pixels| {
                b.iter(|| {
                    resize
                        .apply(black_box(pixels), black_box(*width), black_box(*height))
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

fn benchmark_center_crop(c: &mut Criterion) {
    let mut crop = CenterCrop::default();
    let pixels = create_test_pixels(1280, 720);

    c.bench_function("center_crop/1280x720", |b| {
        b.iter(|| crop.apply(black_box(&pixels), 1280, 720).unwrap())
    });
}

criterion_group!(
    benches,
    benchmark_letterbox,
    benchmark_depth_resize,
    benchmark_center_crop
);
criterion_main!(benches);
