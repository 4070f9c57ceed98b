use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chip8::prelude::*;

/// Counts up in v0, drawing a glyph of the counter each iteration.
#[rustfmt::skip]
const COUNTER: &[u8] = &[
    0x70, 0x01, // LD v0, 1      ; loop
    0xF0, 0x29, // LD F, v0
    0x61, 0x08, // LD v1, 8
    0xD1, 0x15, // DRW v1, v1, 5
    0x80, 0x14, // ADD v0, v1
    0x12, 0x00, // JP loop
];

fn criterion_benchmark(c: &mut Criterion) {
    {
        let mut vm = Chip8Vm::new(Chip8Conf::default());
        vm.load_rom(COUNTER).unwrap();

        c.bench_function("counter bytecode", |b| {
            b.iter(|| {
                let step_count = black_box(1000_usize);
                black_box(vm.run_steps(step_count))
            })
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
