use apex_sim::{
    config::SimConfig, cpu::Cpu, out_of_order::OutOfOrder, parse_and_exec,
    pipelined::Pipelined,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn sum_of<C: Cpu>(name: &str) -> i32 {
    parse_and_exec::<C>(black_box(name), &SimConfig::default())
        .expect("program runs")
        .mem
        .read(0)
        .unwrap_or_default()
}

fn array_sum(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_sum");
    group.bench_function("out_of_order", |b| b.iter(|| sum_of::<OutOfOrder>("array_sum")));
    group.bench_function("pipelined", |b| b.iter(|| sum_of::<Pipelined>("array_sum")));
    group.finish();
}

criterion_group!(benches, array_sum);
criterion_main!(benches);
