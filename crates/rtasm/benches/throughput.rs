//! Performance benchmarks for `rtasm`.
//!
//! Measures:
//! - Single instruction latency
//! - Straight-line SSE kernel emission (bytes/s)
//! - Branch-heavy emission with forward fixups
//! - Finalization into executable memory
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use rtasm::{Assembler, Cond, Gpr, X86Mode, Xmm};

// ─── Single-Instruction Latency ──────────────────────────────────────────────

fn bench_single_instruction(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_instruction");

    group.bench_function("mov_reg_reg", |b| {
        b.iter(|| {
            let mut asm = Assembler::new(X86Mode::Mode32);
            asm.mov(black_box(Gpr::Eax), black_box(Gpr::Ecx)).unwrap();
            asm.len()
        })
    });

    group.bench_function("mov_esp_disp32", |b| {
        b.iter(|| {
            let mut asm = Assembler::new(X86Mode::Mode32);
            asm.mov(Gpr::Eax, Gpr::Esp.disp(black_box(0x1000))).unwrap();
            asm.len()
        })
    });

    group.bench_function("addps_mem", |b| {
        b.iter(|| {
            let mut asm = Assembler::new(X86Mode::Mode32);
            asm.addps(Xmm::Xmm0, Gpr::Ecx.disp(black_box(16))).unwrap();
            asm.len()
        })
    });

    group.finish();
}

// ─── Straight-line kernel ────────────────────────────────────────────────────

/// A vertex-transform style body: four loads, multiply-add, store.
fn emit_kernel(asm: &mut Assembler, iterations: usize) {
    for i in 0..iterations {
        let off = (i as i32) * 16;
        asm.movups(Xmm::Xmm0, Gpr::Esi.disp(off)).unwrap();
        asm.movaps(Xmm::Xmm1, Xmm::Xmm0).unwrap();
        asm.shufps(Xmm::Xmm1, Xmm::Xmm1, 0x00).unwrap();
        asm.mulps(Xmm::Xmm1, Xmm::Xmm4).unwrap();
        asm.movaps(Xmm::Xmm2, Xmm::Xmm0).unwrap();
        asm.shufps(Xmm::Xmm2, Xmm::Xmm2, 0x55).unwrap();
        asm.mulps(Xmm::Xmm2, Xmm::Xmm5).unwrap();
        asm.addps(Xmm::Xmm1, Xmm::Xmm2).unwrap();
        asm.movups(Gpr::Edi.disp(off), Xmm::Xmm1).unwrap();
    }
    asm.ret().unwrap();
}

fn bench_kernel(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernel");

    let mut sizing = Assembler::with_capacity(X86Mode::Mode32, 1 << 20);
    emit_kernel(&mut sizing, 256);
    group.throughput(Throughput::Bytes(sizing.len() as u64));

    group.bench_function("sse_256_vertices", |b| {
        b.iter(|| {
            let mut asm = Assembler::with_capacity(X86Mode::Mode32, 1 << 20);
            emit_kernel(&mut asm, black_box(256));
            asm.finish().unwrap().into_bytes()
        })
    });

    group.bench_function("sse_256_vertices_listing", |b| {
        b.iter(|| {
            let mut asm = Assembler::with_capacity(X86Mode::Mode32, 1 << 20);
            asm.enable_listing();
            emit_kernel(&mut asm, black_box(256));
            asm.finish().unwrap().listing()
        })
    });

    group.finish();
}

// ─── Branches ────────────────────────────────────────────────────────────────

fn bench_branches(c: &mut Criterion) {
    let mut group = c.benchmark_group("branches");

    group.bench_function("forward_fixups_100", |b| {
        b.iter(|| {
            let mut asm = Assembler::with_capacity(X86Mode::Mode32, 1 << 16);
            for _ in 0..black_box(100) {
                asm.cmp_imm(Gpr::Eax, 3).unwrap();
                let skip = asm.jcc_forward(Cond::Ne).unwrap();
                asm.inc(Gpr::Ecx).unwrap();
                asm.fixup_forward(skip).unwrap();
            }
            asm.ret().unwrap();
            asm.finish().unwrap().len()
        })
    });

    group.bench_function("backward_loops_100", |b| {
        b.iter(|| {
            let mut asm = Assembler::with_capacity(X86Mode::Mode32, 1 << 16);
            for _ in 0..black_box(100) {
                let top = asm.label();
                asm.dec(Gpr::Ecx).unwrap();
                asm.jcc(Cond::Ne, top).unwrap();
            }
            asm.ret().unwrap();
            asm.finish().unwrap().len()
        })
    });

    group.finish();
}

// ─── Finalization ────────────────────────────────────────────────────────────

fn bench_finalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("finalize");

    group.bench_function("map_executable_4k", |b| {
        b.iter(|| {
            let mut asm = Assembler::with_capacity(X86Mode::Mode32, 1 << 16);
            emit_kernel(&mut asm, 64);
            asm.finalize().unwrap()
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_instruction,
    bench_kernel,
    bench_branches,
    bench_finalize
);
criterion_main!(benches);
