use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::prelude::*;
use sweep_power::{
    accumulate::{AccumulateMode, PowerAccumulator},
    decimate::{boxcar, recursive, remove_dc},
    fft::FixedFft,
    window::{WindowFunction, WindowTable},
    DEFAULT_BUF_LENGTH,
};

const BINS_LOG2: u32 = 10;
const BINS: usize = 1 << BINS_LOG2;

fn benchmark(c: &mut Criterion) {
    let mut rng = rand::thread_rng();

    let mut dummy_block = vec![0i16; 2 * DEFAULT_BUF_LENGTH];
    rng.fill(&mut dummy_block[..]);
    // Keep the dummy block in a range the decimators won't saturate on
    dummy_block.iter_mut().for_each(|s| *s >>= 6);

    // Containers
    let mut scratch = dummy_block.clone();
    let fft = FixedFft::new(BINS_LOG2);
    let window = WindowTable::new(WindowFunction::BlackmanHarris, BINS);
    let mut acc = PowerAccumulator::new(BINS);

    c.bench_function("window and fft", |b| {
        b.iter(|| {
            let frame = &mut scratch[..2 * BINS];
            frame.copy_from_slice(&dummy_block[..2 * BINS]);
            window.apply(frame);
            fft.process(black_box(frame))
        })
    });

    c.bench_function("boxcar decimate", |b| {
        b.iter(|| {
            scratch.copy_from_slice(&dummy_block);
            boxcar(black_box(&mut scratch), black_box(14))
        })
    });

    c.bench_function("recursive decimate", |b| {
        b.iter(|| {
            scratch.copy_from_slice(&dummy_block);
            recursive(black_box(&mut scratch), black_box(3), true)
        })
    });

    c.bench_function("remove dc", |b| {
        b.iter(|| {
            scratch.copy_from_slice(&dummy_block);
            remove_dc(black_box(&mut scratch))
        })
    });

    c.bench_function("accumulate spectrum", |b| {
        b.iter(|| {
            acc.add_spectrum(
                black_box(&dummy_block[..2 * BINS]),
                AccumulateMode::Average,
                1,
            )
        })
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
