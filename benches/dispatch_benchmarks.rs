//! Benchmarks for host-to-native dispatch.
//!
//! Measures overload selection plus argument marshaling against the in-memory
//! test module, so the numbers cover the runtime's own overhead only.
//!
//! ## Profiling
//!
//! ```bash
//! cargo bench --features profile-with-puffin
//! ```

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

#[path = "../tests/harness/mod.rs"]
mod harness;

use harness::*;
use wirebind::core::{Value, WireValue};

fn bench_free_functions(c: &mut Criterion) {
    let (module, ctx) = setup();
    module.define(0x80, |_, _, args| Ok(int(args[0].as_i64() + args[1].as_i64())));
    module.define(0x81, |_, _, args| Ok(int(args[0].as_i64())));
    module.define(0x82, |m, _, args| Ok(int(m.read_cstr(args[0].as_u32()).len() as i64)));
    register_function(&module, &ctx, 0, "add", &[INT32, INT32, INT32], &[], 0x80).unwrap();
    register_function(&module, &ctx, 0, "add", &[INT32, INT32], &[], 0x81).unwrap();
    register_function(&module, &ctx, 0, "len", &[INT32, CSTRING], &[], 0x82).unwrap();

    let mut group = c.benchmark_group("dispatch");

    let two = [Value::from(1), Value::from(2)];
    group.bench_function("overloaded_2", |b| {
        b.iter(|| ctx.call(black_box("add"), black_box(&two)).unwrap())
    });

    let one = [Value::from(1)];
    group.bench_function("overloaded_1", |b| {
        b.iter(|| ctx.call(black_box("add"), black_box(&one)).unwrap())
    });

    let text = [Value::from("a short string")];
    group.bench_function("c_string_arg", |b| {
        b.iter(|| ctx.call(black_box("len"), black_box(&text)).unwrap())
    });

    group.finish();
}

fn bench_methods(c: &mut Criterion) {
    let (module, ctx) = setup();
    register_class(&module, &ctx, 100, "Cell");
    let storage = module.alloc(4) as i64;
    module.define(0x10, move |_, _, _| Ok(int(storage)));
    module.define(0x11, |_, _, _| Ok(WireValue::Void));
    module.define(0x20, |m, _, args| Ok(int(m.read_u32(args[1].as_u32()) as i64)));
    ctx.register_constructor(100, 0, module.u32s(&[VOID]), 1, 0x10, 0x11).unwrap();
    register_method(&module, &ctx, 100, "get", &[INT32], 0x20, 0, 0).unwrap();
    register_method(&module, &ctx, 100, "getValue", &[INT32], 0x20, 1, 1).unwrap();

    let cell = ctx.new_instance("Cell", &[]).unwrap();

    let mut group = c.benchmark_group("methods");
    group.bench_function("method", |b| {
        b.iter(|| cell.call_method(&ctx, black_box("get"), &[]).unwrap())
    });
    group.bench_function("accessor", |b| b.iter(|| cell.get(&ctx, black_box("value")).unwrap()));
    group.bench_function("construct", |b| b.iter(|| ctx.new_instance("Cell", &[]).unwrap()));
    group.finish();
}

criterion_group!(benches, bench_free_functions, bench_methods);
criterion_main!(benches);
