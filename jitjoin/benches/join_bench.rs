use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use jitjoin::{
    build_join_ir, run_join, CompilationBackend, InterpBackend, JitEngine, JoinParams,
    StringColumn,
};

fn bench_compile_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("JIT Compile");
    let func = build_join_ir(&JoinParams::default()).unwrap();

    group.bench_function("join_ir_build", |b| {
        b.iter(|| build_join_ir(black_box(&JoinParams::default())).unwrap())
    });

    group.bench_function("join_compile", |b| {
        b.iter(|| {
            let mut engine = JitEngine::default();
            engine.initialize().unwrap();
            engine.compile(black_box(&func)).unwrap();
        })
    });

    group.finish();
}

fn keys(n: usize, prefix: &str) -> StringColumn {
    StringColumn::from_values((0..n).map(|i| format!("{prefix}{i}"))).unwrap()
}

fn bench_join_execution(c: &mut Criterion) {
    let mut group = c.benchmark_group("JIT Join");
    let func = build_join_ir(&JoinParams::default()).unwrap();

    let mut engine = JitEngine::default();
    engine.initialize().unwrap();
    let native = engine.compile(&func).unwrap();

    let mut interp = InterpBackend::new();
    interp.initialize().unwrap();
    let reference = interp.compile(&func).unwrap();

    for rows in [16, 128, 512] {
        let left = keys(rows, "k");
        // Half the right keys overlap the left column.
        let right = StringColumn::from_values(
            (0..rows).map(|i| if i % 2 == 0 { format!("k{i}") } else { format!("r{i}") }),
        )
        .unwrap();

        group.bench_with_input(BenchmarkId::new("native", rows), &rows, |b, _| {
            b.iter(|| run_join(&native, &left, &right).unwrap())
        });

        if rows <= 128 {
            group.bench_with_input(BenchmarkId::new("interp", rows), &rows, |b, _| {
                b.iter(|| run_join(&reference, &left, &right).unwrap())
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_compile_join, bench_join_execution);
criterion_main!(benches);
