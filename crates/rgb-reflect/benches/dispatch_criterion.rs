//! Reflective dispatch benchmarks using criterion for historical comparison.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rgb_reflect::prelude::*;

#[derive(Default)]
struct Counter {
    value: i64,
}

impl NativeClass for Counter {}

fn counter() -> Box<dyn NativeClass> {
    Box::new(Counter::default())
}

fn setup() -> std::sync::Arc<Context> {
    let ctx = Context::new(Config::default());
    let db = ctx.class_db();
    db.register_class("Counter", "Object", Some(counter)).unwrap();
    db.bind_method(
        "Counter",
        MethodBind::new("add", |c: &mut Counter, n: i64| {
            c.value += n;
            c.value
        }),
    )
    .unwrap();
    db.bind_method("Counter", MethodBind::new("get_value", |c: &Counter| c.value))
        .unwrap();
    db.bind_method("Counter", MethodBind::new("set_value", |c: &mut Counter, v: i64| c.value = v))
        .unwrap();
    db.add_property(
        "Counter",
        PropertyInfo::new(VariantType::Int, "value"),
        "set_value",
        "get_value",
        None,
    )
    .unwrap();
    db.add_signal("Counter", MethodInfo::new("ticked").with_arg(VariantType::Int, "n"))
        .unwrap();
    ctx
}

fn call_benchmarks(c: &mut Criterion) {
    let ctx = setup();
    let object = ctx.instance("Counter").unwrap();
    let bind = ctx.class_db().get_method("Counter", "add").unwrap();
    let args = [Variant::Int(1)];

    let mut group = c.benchmark_group("call");
    group.bench_function("by_name", |b| {
        b.iter(|| black_box(object.call(black_box("add"), &args)));
    });
    group.bench_function("method_bind", |b| {
        b.iter(|| black_box(bind.call(&object, &args)));
    });
    group.bench_function("ptrcall", |b| {
        b.iter(|| black_box(bind.ptrcall(&object, &args)));
    });
    group.bench_function("property_get", |b| {
        b.iter(|| black_box(object.get(black_box("value"))));
    });
    group.finish();
}

fn emit_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit");

    for count in [1_u64, 10, 100] {
        let ctx = setup();
        let source = ctx.instance("Counter").unwrap();
        let targets: Vec<Object> = (0..count)
            .map(|_| ctx.instance("Counter").unwrap())
            .collect();
        for target in &targets {
            source
                .connect("ticked", target, "add", Vec::new(), ConnectFlags::empty())
                .unwrap();
        }

        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::new("direct", count), &count, |b, _| {
            b.iter(|| source.emit_signal("ticked", &[Variant::Int(1)]));
        });
    }

    group.finish();
}

criterion_group!(benches, call_benchmarks, emit_benchmarks);
criterion_main!(benches);
