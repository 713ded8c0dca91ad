use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dexjit_compiler::{
    BitVector, CodeInfo, DexRegisterLocationKind, InvokeType, StackMapStream,
};

/// A method with `maps` safepoints over `registers` dex registers, where
/// roughly one register in four moves between consecutive safepoints
fn build_stream(maps: u32, registers: u32, inline_every: u32) -> StackMapStream {
    let mut stream = StackMapStream::new();
    for i in 0..maps {
        let stack_mask = BitVector::from_indexes([(i % 7) as usize, 9]);
        stream.begin_stack_map_entry(i * 3, i * 16, 0x3 << (i % 4), Some(&stack_mask), registers);
        for r in 0..registers {
            if (r + i) % 4 == 0 {
                stream.add_dex_register_entry(DexRegisterLocationKind::InStack, (4 * (r + i)) as i32);
            } else if r % 3 == 0 {
                stream.add_dex_register_entry(DexRegisterLocationKind::Constant, -(r as i32));
            } else {
                stream.add_dex_register_entry(DexRegisterLocationKind::InRegister, (r % 16) as i32);
            }
        }
        if inline_every != 0 && i % inline_every == 0 {
            stream.begin_inline_info_entry(i, 2, InvokeType::Virtual, 2);
            stream.add_dex_register_entry(DexRegisterLocationKind::InRegister, 1);
            stream.add_dex_register_entry(DexRegisterLocationKind::None, 0);
            stream.end_inline_info_entry();
        }
        stream.end_stack_map_entry();
    }
    stream
}

fn encode(stream: &mut StackMapStream) -> Vec<u8> {
    let mut code_info = vec![0u8; stream.prepare_for_fill_in()];
    stream.fill_in(&mut code_info);
    code_info
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for maps in [16u32, 256] {
        group.throughput(Throughput::Elements(u64::from(maps)));
        group.bench_with_input(BenchmarkId::new("safepoints", maps), &maps, |b, &maps| {
            b.iter_batched(
                || build_stream(maps, 24, 5),
                |mut stream| encode(black_box(&mut stream)),
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut stream = build_stream(256, 24, 5);
    let code_info = encode(&mut stream);

    c.bench_function("resolve_last_dex_register_map", |b| {
        b.iter(|| {
            let info = CodeInfo::new(black_box(&code_info));
            let map = info.stack_map_at(info.number_of_stack_maps() - 1);
            info.dex_register_map_of(&map).number_of_live_dex_registers()
        });
    });

    c.bench_function("find_by_native_pc", |b| {
        b.iter(|| {
            let info = CodeInfo::new(black_box(&code_info));
            info.stack_map_for_native_pc_offset(black_box(255 * 16))
                .map(|m| m.dex_pc())
        });
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
