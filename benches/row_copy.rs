use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use spinnaker_source::acquisition::copy_rows;

fn bench_copy_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("copy_rows");

    // (width, height, source row alignment)
    for (width, height, align) in [(640usize, 512usize, 1usize), (1280, 1024, 64), (2448, 2048, 256)] {
        let src_stride = width.div_ceil(align) * align;
        let src = vec![0x5Au8; src_stride * height];
        let mut dst = vec![0u8; width * height];

        group.throughput(Throughput::Bytes((width * height) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}/{align}")),
            &src,
            |b, src| {
                b.iter(|| {
                    copy_rows(
                        black_box(src),
                        src_stride,
                        black_box(&mut dst),
                        width,
                        height,
                    )
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_copy_rows);
criterion_main!(benches);
