//! Stack map encoding and decoding through the public API

use dexjit_compiler::stack_map::StackMapFlags;
use dexjit_compiler::{
    BitVector, CodeInfo, DexRegisterLocation, DexRegisterLocationKind as Kind, InvokeType,
    StackMapStream,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn encode(stream: &mut StackMapStream) -> Vec<u8> {
    let size = stream.prepare_for_fill_in();
    let mut code_info = vec![0u8; size];
    stream.fill_in(&mut code_info);
    code_info
}

#[test]
fn test_two_registers_in_stack_and_constant() {
    let mut stream = StackMapStream::new();
    let stack_mask = BitVector::from_indexes([0, 2]);
    stream.begin_stack_map_entry(0, 64, 0x3, Some(&stack_mask), 2);
    stream.add_dex_register_entry(Kind::InStack, 0);
    stream.add_dex_register_entry(Kind::Constant, -2);
    stream.end_stack_map_entry();
    let code_info = encode(&mut stream);

    let info = CodeInfo::new(&code_info);
    assert_eq!(info.number_of_stack_maps(), 1);
    assert_eq!(info.number_of_dex_registers(), 2);

    let map = info.stack_map_for_dex_pc(0).unwrap();
    assert_eq!(map.index(), 0);
    assert_eq!(map.native_pc_offset(), 64);
    assert_eq!(map.register_mask(), 0x3);
    assert_eq!(map.stack_mask().collect::<Vec<_>>(), vec![0, 2]);
    assert!(map.has_dex_register_map());
    assert!(!map.has_inline_info());

    let registers = info.dex_register_map_of(&map);
    assert_eq!(registers.location_kind(0), Kind::InStack);
    assert_eq!(registers.location_kind(1), Kind::Constant);
    assert_eq!(registers.location_internal_kind(0), Kind::InStack);
    assert_eq!(registers.location_internal_kind(1), Kind::ConstantLargeValue);
    assert_eq!(registers.stack_offset_in_bytes(0), 0);
    assert_eq!(registers.constant(1), -2);
    assert_eq!(registers.number_of_live_dex_registers(), 2);
}

#[test]
fn test_maps_without_registers() {
    let mut stream = StackMapStream::new();
    stream.begin_stack_map_entry(1, 8, 0, None, 0);
    stream.end_stack_map_entry();
    let code_info = encode(&mut stream);

    let info = CodeInfo::new(&code_info);
    let map = info.stack_map_at(0);
    assert_eq!(map.flags(), StackMapFlags::empty());
    assert!(info.dex_register_map_of(&map).is_empty());
    assert_eq!(info.header().dex_register_maps_size, 0);
}

#[test]
fn test_only_changed_registers_are_stored() {
    let mut stream = StackMapStream::new();
    let states = [
        [(Kind::InRegister, 1), (Kind::InStack, 4), (Kind::Constant, 3)],
        [(Kind::InRegister, 1), (Kind::InStack, 4), (Kind::Constant, 3)],
        [(Kind::InRegister, 1), (Kind::InStack, 8), (Kind::Constant, 3)],
    ];
    for (i, registers) in states.iter().enumerate() {
        stream.begin_stack_map_entry(i as u32, 4 * i as u32, 0, None, 3);
        for &(kind, value) in registers {
            stream.add_dex_register_entry(kind, value);
        }
        stream.end_stack_map_entry();
    }
    let code_info = encode(&mut stream);
    let info = CodeInfo::new(&code_info);

    let flags: Vec<bool> = info.stack_maps().map(|m| m.has_dex_register_map()).collect();
    assert_eq!(flags, vec![true, false, true]);
    // Mask plus three locations, then mask plus the one changed location.
    assert_eq!(info.header().dex_register_maps_size, 4 + 2);

    for (i, registers) in states.iter().enumerate() {
        let decoded = info.dex_register_map_of(&info.stack_map_at(i));
        let expected: Vec<_> = registers
            .iter()
            .map(|&(kind, value)| DexRegisterLocation::new(kind, value))
            .collect();
        assert_eq!(decoded.locations(), expected.as_slice());
    }
}

#[test]
fn test_inline_frames_share_slots_across_stack_maps() {
    let mut stream = StackMapStream::new();
    for native_pc in [16, 24] {
        stream.begin_stack_map_entry(3, native_pc, 0, None, 1);
        stream.add_dex_register_entry(Kind::InRegister, 2);
        stream.begin_inline_info_entry(12, 5, InvokeType::Interface, 1);
        stream.add_dex_register_entry(Kind::InStack, 32);
        stream.end_inline_info_entry();
        stream.end_stack_map_entry();
    }
    let code_info = encode(&mut stream);
    let info = CodeInfo::new(&code_info);

    let second = info.stack_map_for_native_pc_offset(24).unwrap();
    assert!(second.has_inline_info());
    assert!(!second.has_dex_register_map());
    assert_eq!(second.inlining_depth(), 1);

    let inline_info = info.inline_info_of(&second);
    assert_eq!(inline_info.method_index_at_depth(0), 12);
    assert_eq!(inline_info.dex_pc_at_depth(0), 5);
    assert_eq!(inline_info.invoke_type_at_depth(0), Some(InvokeType::Interface));
    let inlined = info.dex_register_map_at_depth(0, &inline_info, &second);
    assert_eq!(inlined.stack_offset_in_bytes(0), 32);
    assert_eq!(info.dex_register_map_of(&second).machine_register(0), 2);
}

#[derive(Debug, Clone)]
struct InlineFrame {
    method_index: u32,
    dex_pc: u32,
    invoke_type: InvokeType,
    registers: Vec<DexRegisterLocation>,
}

#[derive(Debug, Clone)]
struct Safepoint {
    dex_pc: u32,
    native_pc_offset: u32,
    register_mask: u32,
    stack_mask: Vec<usize>,
    registers: Vec<DexRegisterLocation>,
    inline_frames: Vec<InlineFrame>,
}

fn location() -> impl Strategy<Value = DexRegisterLocation> {
    prop_oneof![
        Just(DexRegisterLocation::none()),
        (0..4096i32).prop_map(|v| DexRegisterLocation::new(Kind::InStack, v)),
        (0..32i32).prop_map(|v| DexRegisterLocation::new(Kind::InRegister, v)),
        (0..32i32).prop_map(|v| DexRegisterLocation::new(Kind::InFpuRegister, v)),
        any::<i32>().prop_map(|v| DexRegisterLocation::new(Kind::Constant, v)),
    ]
}

fn invoke_type() -> impl Strategy<Value = InvokeType> {
    prop_oneof![
        Just(InvokeType::Static),
        Just(InvokeType::Direct),
        Just(InvokeType::Virtual),
        Just(InvokeType::Super),
        Just(InvokeType::Interface),
    ]
}

fn inline_frame() -> impl Strategy<Value = InlineFrame> {
    (
        0..70_000u32,
        0..500u32,
        invoke_type(),
        prop::collection::vec(location(), 0..4),
    )
        .prop_map(|(method_index, dex_pc, invoke_type, registers)| InlineFrame {
            method_index,
            dex_pc,
            invoke_type,
            registers,
        })
}

fn safepoints() -> impl Strategy<Value = Vec<Safepoint>> {
    (0..6usize).prop_flat_map(|num_registers| {
        let safepoint = (
            0..1000u32,
            0..100_000u32,
            any::<u32>(),
            prop::collection::vec(0..48usize, 0..4),
            prop::collection::vec(location(), num_registers),
            prop::collection::vec(inline_frame(), 0..3),
        )
            .prop_map(
                |(dex_pc, native_pc_offset, register_mask, stack_mask, registers, inline_frames)| {
                    Safepoint {
                        dex_pc,
                        native_pc_offset,
                        register_mask,
                        stack_mask,
                        registers,
                        inline_frames,
                    }
                },
            );
        prop::collection::vec(safepoint, 0..8)
    })
}

proptest! {
    #[test]
    fn test_every_appended_value_reads_back(points in safepoints()) {
        let mut stream = StackMapStream::new();
        for point in &points {
            let stack_mask = BitVector::from_indexes(point.stack_mask.iter().copied());
            stream.begin_stack_map_entry(
                point.dex_pc,
                point.native_pc_offset,
                point.register_mask,
                Some(&stack_mask),
                point.registers.len() as u32,
            );
            for location in &point.registers {
                stream.add_dex_register_entry(location.kind(), location.value());
            }
            for frame in &point.inline_frames {
                stream.begin_inline_info_entry(
                    frame.method_index,
                    frame.dex_pc,
                    frame.invoke_type,
                    frame.registers.len() as u32,
                );
                for location in &frame.registers {
                    stream.add_dex_register_entry(location.kind(), location.value());
                }
                stream.end_inline_info_entry();
            }
            stream.end_stack_map_entry();
        }
        let code_info = encode(&mut stream);
        prop_assert_eq!(stream.check_code_info(&code_info), Ok(()));
        prop_assert_eq!(code_info.len() % 4, 0);

        let info = CodeInfo::new(&code_info);
        prop_assert_eq!(info.number_of_stack_maps(), points.len());
        for (i, point) in points.iter().enumerate() {
            let map = info.stack_map_at(i);
            prop_assert_eq!(map.dex_pc(), point.dex_pc);
            prop_assert_eq!(map.native_pc_offset(), point.native_pc_offset);
            prop_assert_eq!(map.register_mask(), point.register_mask);
            let mut stack_mask = point.stack_mask.clone();
            stack_mask.sort_unstable();
            stack_mask.dedup();
            prop_assert_eq!(map.stack_mask().collect::<Vec<_>>(), stack_mask);

            let registers = info.dex_register_map_of(&map);
            prop_assert_eq!(registers.locations(), point.registers.as_slice());

            prop_assert_eq!(map.inlining_depth(), point.inline_frames.len());
            if point.inline_frames.is_empty() {
                continue;
            }
            let inline_info = info.inline_info_of(&map);
            for (depth, frame) in point.inline_frames.iter().enumerate() {
                prop_assert_eq!(inline_info.method_index_at_depth(depth), frame.method_index);
                prop_assert_eq!(inline_info.dex_pc_at_depth(depth), frame.dex_pc);
                prop_assert_eq!(inline_info.invoke_type_at_depth(depth), Some(frame.invoke_type));
                let inlined = info.dex_register_map_at_depth(depth, &inline_info, &map);
                prop_assert_eq!(inlined.locations(), frame.registers.as_slice());
            }
        }
    }
}
