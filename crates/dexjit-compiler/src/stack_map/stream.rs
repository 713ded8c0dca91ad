//! Stack map stream
//!
//! Code generation appends one entry per safepoint, optionally with inlined
//! frames underneath, then sizes and fills the code info blob in one shot.
//!
//! Dex register locations are delta encoded across stack maps: every slot
//! (main frame registers followed by each inlined frame's registers) keeps the
//! last location written for it, and a stack map only stores the slots that
//! changed. A stack map whose slots all match the previous state stores no map
//! at all. Identical deltas are stored once.

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

use crate::bit_vector::BitVector;
use crate::dex::InvokeType;

use super::code_info::CodeInfo;
use super::encoding::{
    bits_needed, CodeInfoHeader, InlineInfoEncoding, StackMapEncoding, StackMapFlags,
    STACK_MAP_FLAG_BITS,
};
use super::location::{DexRegisterLocation, DexRegisterLocationKind};
use super::region::MemoryRegionMut;

/// A difference between an encoded blob and the entries it was built from
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeInfoMismatch {
    #[error("code info is {actual} bytes, expected {expected}")]
    Size { expected: usize, actual: usize },

    #[error("code info holds {actual} stack maps, expected {expected}")]
    StackMapCount { expected: usize, actual: usize },

    #[error("stack map {index}: {field} is {actual}, expected {expected}")]
    StackMapField {
        index: usize,
        field: &'static str,
        expected: u64,
        actual: u64,
    },

    #[error("stack map {index}: stack mask bit {bit} is {actual}, expected {expected}")]
    StackMaskBit {
        index: usize,
        bit: usize,
        expected: bool,
        actual: bool,
    },

    #[error("stack map {index}: dex register {register} (inline depth {depth:?}) is {actual}, expected {expected}")]
    DexRegister {
        index: usize,
        depth: Option<usize>,
        register: usize,
        expected: DexRegisterLocation,
        actual: DexRegisterLocation,
    },

    #[error("stack map {index}: inline frame {depth} {field} is {actual}, expected {expected}")]
    InlineInfo {
        index: usize,
        depth: usize,
        field: &'static str,
        expected: u64,
        actual: u64,
    },
}

#[derive(Debug, Clone)]
struct StackMapEntry {
    dex_pc: u32,
    native_pc_offset: u32,
    register_mask: u32,
    stack_mask: BitVector,
    num_dex_registers: u32,
    inlining_depth: u32,
    dex_register_locations_start: usize,
    /// Main and inlined registers together
    dex_register_locations_count: usize,
    inline_infos_start: usize,
}

#[derive(Debug, Clone)]
struct InlineInfoEntry {
    method_index: u32,
    dex_pc: u32,
    invoke_type: InvokeType,
    num_dex_registers: u32,
    dex_register_locations_start: usize,
}

/// Result of `prepare_for_fill_in`
#[derive(Debug, Clone)]
struct Layout {
    header: CodeInfoHeader,
    flags: Vec<StackMapFlags>,
    dex_register_map_offsets: Vec<u32>,
    dex_register_maps: Vec<u8>,
}

/// Collects stack maps during code generation and encodes them
#[derive(Debug, Default)]
pub struct StackMapStream {
    stack_maps: Vec<StackMapEntry>,
    inline_infos: Vec<InlineInfoEntry>,
    dex_register_locations: Vec<DexRegisterLocation>,
    current_entry: Option<StackMapEntry>,
    current_inline_info: Option<InlineInfoEntry>,
    layout: Option<Layout>,
}

impl StackMapStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn number_of_stack_maps(&self) -> usize {
        self.stack_maps.len()
    }

    pub fn number_of_inline_infos(&self) -> usize {
        self.inline_infos.len()
    }

    pub fn begin_stack_map_entry(
        &mut self,
        dex_pc: u32,
        native_pc_offset: u32,
        register_mask: u32,
        stack_mask: Option<&BitVector>,
        num_dex_registers: u32,
    ) {
        debug_assert!(self.current_entry.is_none(), "stack map entry already open");
        self.current_entry = Some(StackMapEntry {
            dex_pc,
            native_pc_offset,
            register_mask,
            stack_mask: stack_mask.cloned().unwrap_or_default(),
            num_dex_registers,
            inlining_depth: 0,
            dex_register_locations_start: self.dex_register_locations.len(),
            dex_register_locations_count: 0,
            inline_infos_start: self.inline_infos.len(),
        });
    }

    /// Append the location of the next register, in the open inline frame if
    /// there is one and in the stack map itself otherwise
    pub fn add_dex_register_entry(&mut self, kind: DexRegisterLocationKind, value: i32) {
        let location = DexRegisterLocation::new(kind, value);
        let added = self.dex_register_locations.len();
        match (&self.current_inline_info, &self.current_entry) {
            (Some(inline), _) => debug_assert!(
                added - inline.dex_register_locations_start < inline.num_dex_registers as usize,
                "too many registers for inline frame"
            ),
            (None, Some(entry)) => {
                debug_assert_eq!(
                    entry.inlining_depth, 0,
                    "main frame registers added after an inline frame"
                );
                debug_assert!(
                    added - entry.dex_register_locations_start < entry.num_dex_registers as usize,
                    "too many registers for stack map"
                );
            }
            (None, None) => debug_assert!(false, "no stack map entry open"),
        }
        self.dex_register_locations.push(location);
    }

    pub fn begin_inline_info_entry(
        &mut self,
        method_index: u32,
        dex_pc: u32,
        invoke_type: InvokeType,
        num_dex_registers: u32,
    ) {
        debug_assert!(self.current_inline_info.is_none(), "inline info entry already open");
        let added = self.dex_register_locations.len();
        if let Some(entry) = self.current_entry.as_mut() {
            debug_assert_eq!(
                added - entry.dex_register_locations_start,
                entry.num_dex_registers as usize,
                "main frame registers incomplete"
            );
            entry.inlining_depth += 1;
        } else {
            debug_assert!(false, "no stack map entry open");
        }
        self.current_inline_info = Some(InlineInfoEntry {
            method_index,
            dex_pc,
            invoke_type,
            num_dex_registers,
            dex_register_locations_start: added,
        });
    }

    pub fn end_inline_info_entry(&mut self) {
        let inline = self.current_inline_info.take();
        debug_assert!(inline.is_some(), "no inline info entry open");
        if let Some(inline) = inline {
            debug_assert_eq!(
                self.dex_register_locations.len() - inline.dex_register_locations_start,
                inline.num_dex_registers as usize,
                "inline frame registers incomplete"
            );
            self.inline_infos.push(inline);
        }
    }

    pub fn end_stack_map_entry(&mut self) {
        debug_assert!(self.current_inline_info.is_none(), "inline info entry still open");
        let entry = self.current_entry.take();
        debug_assert!(entry.is_some(), "no stack map entry open");
        let Some(mut entry) = entry else { return };
        entry.dex_register_locations_count =
            self.dex_register_locations.len() - entry.dex_register_locations_start;
        if entry.inlining_depth == 0 {
            debug_assert_eq!(
                entry.dex_register_locations_count, entry.num_dex_registers as usize,
                "main frame registers incomplete"
            );
        }
        debug_assert!(
            entry.num_dex_registers == 0
                || self.stack_maps.iter().all(|m| {
                    m.num_dex_registers == 0 || m.num_dex_registers == entry.num_dex_registers
                }),
            "stack maps disagree on the number of dex registers"
        );
        self.stack_maps.push(entry);
        self.layout = None;
    }

    fn slots_of(&self, entry: &StackMapEntry) -> &[DexRegisterLocation] {
        let start = entry.dex_register_locations_start;
        &self.dex_register_locations[start..start + entry.dex_register_locations_count]
    }

    fn main_registers_of(&self, entry: &StackMapEntry) -> &[DexRegisterLocation] {
        &self.slots_of(entry)[..entry.num_dex_registers as usize]
    }

    fn inline_infos_of(&self, entry: &StackMapEntry) -> &[InlineInfoEntry] {
        let start = entry.inline_infos_start;
        &self.inline_infos[start..start + entry.inlining_depth as usize]
    }

    fn inline_registers_of(&self, inline: &InlineInfoEntry) -> &[DexRegisterLocation] {
        let start = inline.dex_register_locations_start;
        &self.dex_register_locations[start..start + inline.num_dex_registers as usize]
    }

    /// Compute the encoding and return the number of bytes `fill_in` needs
    pub fn prepare_for_fill_in(&mut self) -> usize {
        debug_assert!(self.current_entry.is_none(), "stack map entry still open");

        let mut last: Vec<DexRegisterLocation> = Vec::new();
        let mut deltas: FxHashMap<Vec<u8>, u32> = FxHashMap::default();
        let mut dex_register_maps = Vec::new();
        let mut flags = Vec::with_capacity(self.stack_maps.len());
        let mut dex_register_map_offsets = Vec::with_capacity(self.stack_maps.len());

        let mut header_flags = StackMapFlags::empty();
        let mut max_dex_pc = 0;
        let mut max_native_pc = 0;
        let mut max_register_mask = 0;
        let mut max_map_offset = 0;
        let mut max_inline_index = 0;
        let mut max_depth = 0;
        let mut stack_mask_bits = 0;
        let mut number_of_dex_registers = 0;

        for entry in &self.stack_maps {
            let slots = self.slots_of(entry);
            if last.len() < slots.len() {
                last.resize(slots.len(), DexRegisterLocation::none());
            }
            let mut delta = vec![0u8; slots.len().div_ceil(8)];
            let mask_len = delta.len();
            for (slot, location) in slots.iter().enumerate() {
                if *location != last[slot] {
                    delta[slot / 8] |= 1 << (slot % 8);
                    location.encode(&mut delta);
                    last[slot] = *location;
                }
            }

            let mut map_flags = StackMapFlags::empty();
            let mut offset = 0;
            if delta.len() > mask_len {
                map_flags |= StackMapFlags::HAS_DEX_REGISTER_MAP;
                offset = *deltas.entry(delta).or_insert_with_key(|delta| {
                    let offset = dex_register_maps.len() as u32;
                    dex_register_maps.extend_from_slice(delta);
                    offset
                });
                max_map_offset = max_map_offset.max(offset);
            }
            if entry.num_dex_registers > 0 {
                map_flags |= StackMapFlags::HAS_ANY_DEX_REGISTERS;
            }
            if entry.inlining_depth > 0 {
                map_flags |= StackMapFlags::HAS_INLINE_INFO;
                max_inline_index = max_inline_index.max(entry.inline_infos_start as u32);
            }

            header_flags |= map_flags;
            flags.push(map_flags);
            dex_register_map_offsets.push(offset);

            max_dex_pc = max_dex_pc.max(entry.dex_pc);
            max_native_pc = max_native_pc.max(entry.native_pc_offset);
            max_register_mask |= entry.register_mask;
            max_depth = max_depth.max(entry.inlining_depth);
            if let Some(bit) = entry.stack_mask.highest_bit_set() {
                stack_mask_bits = stack_mask_bits.max(bit as u32 + 1);
            }
            number_of_dex_registers = number_of_dex_registers.max(entry.num_dex_registers);
        }

        let inline_info_encoding = InlineInfoEncoding {
            method_index_bits: bits_needed(
                self.inline_infos
                    .iter()
                    .map(|i| i.method_index)
                    .max()
                    .unwrap_or(0),
            ),
            dex_pc_bits: bits_needed(self.inline_infos.iter().map(|i| i.dex_pc).max().unwrap_or(0)),
            invoke_type_bits: bits_needed(
                self.inline_infos
                    .iter()
                    .map(|i| i.invoke_type as u32)
                    .max()
                    .unwrap_or(0),
            ),
            num_dex_registers_bits: bits_needed(
                self.inline_infos
                    .iter()
                    .map(|i| i.num_dex_registers)
                    .max()
                    .unwrap_or(0),
            ),
        };

        let mut header = CodeInfoHeader {
            overall_size: 0,
            number_of_stack_maps: self.stack_maps.len() as u32,
            number_of_inline_infos: self.inline_infos.len() as u32,
            dex_register_maps_size: dex_register_maps.len() as u32,
            number_of_dex_registers,
            stack_map_encoding: StackMapEncoding {
                dex_pc_bits: bits_needed(max_dex_pc),
                native_pc_bits: bits_needed(max_native_pc),
                register_mask_bits: bits_needed(max_register_mask),
                dex_register_map_offset_bits: bits_needed(max_map_offset),
                inline_info_index_bits: bits_needed(max_inline_index),
                inlining_depth_bits: bits_needed(max_depth),
                stack_mask_bits,
            },
            inline_info_encoding,
            flags: header_flags,
        };
        let size = header.computed_size();
        header.overall_size = size as u32;

        debug!(
            stack_maps = self.stack_maps.len(),
            inline_infos = self.inline_infos.len(),
            dex_register_map_bytes = dex_register_maps.len(),
            size,
            "prepared code info"
        );

        self.layout = Some(Layout {
            header,
            flags,
            dex_register_map_offsets,
            dex_register_maps,
        });
        size
    }

    /// Write the code info into `out`, which must be exactly the size
    /// returned by `prepare_for_fill_in`
    pub fn fill_in(&self, out: &mut [u8]) {
        debug_assert!(self.layout.is_some(), "fill_in before prepare_for_fill_in");
        let Some(layout) = &self.layout else { return };
        let header = &layout.header;
        debug_assert_eq!(out.len(), header.overall_size as usize);

        out.fill(0);
        let mut region = MemoryRegionMut::new(out);
        header.encode(&mut region);

        let sm = header.stack_map_encoding;
        let stride = sm.bit_size();
        let base = header.stack_maps_start() * 8;
        for (i, entry) in self.stack_maps.iter().enumerate() {
            let record = base + i * stride;
            let inline_index = if entry.inlining_depth > 0 {
                entry.inline_infos_start as u32
            } else {
                0
            };
            let fields = [
                (sm.dex_pc_offset(), sm.dex_pc_bits, entry.dex_pc),
                (sm.native_pc_offset(), sm.native_pc_bits, entry.native_pc_offset),
                (sm.register_mask_offset(), sm.register_mask_bits, entry.register_mask),
                (
                    sm.dex_register_map_offset(),
                    sm.dex_register_map_offset_bits,
                    layout.dex_register_map_offsets[i],
                ),
                (sm.inline_info_index_offset(), sm.inline_info_index_bits, inline_index),
                (
                    sm.inlining_depth_offset(),
                    sm.inlining_depth_bits,
                    entry.inlining_depth,
                ),
            ];
            for (offset, width, value) in fields {
                region.store_bits(record + offset, u32::from(width), value);
            }
            region.store_bits(
                record + sm.flags_offset(),
                STACK_MAP_FLAG_BITS,
                u32::from(layout.flags[i].bits()),
            );
            for bit in entry.stack_mask.indexes() {
                region.store_bit(record + sm.stack_mask_offset() + bit, true);
            }
        }

        region.store_bytes(header.dex_register_maps_start(), &layout.dex_register_maps);

        let ii = header.inline_info_encoding;
        let stride = ii.bit_size();
        let base = header.inline_infos_start() * 8;
        for (i, inline) in self.inline_infos.iter().enumerate() {
            let record = base + i * stride;
            let fields = [
                (ii.method_index_offset(), ii.method_index_bits, inline.method_index),
                (ii.dex_pc_offset(), ii.dex_pc_bits, inline.dex_pc),
                (ii.invoke_type_offset(), ii.invoke_type_bits, inline.invoke_type as u32),
                (
                    ii.num_dex_registers_offset(),
                    ii.num_dex_registers_bits,
                    inline.num_dex_registers,
                ),
            ];
            for (offset, width, value) in fields {
                region.store_bits(record + offset, u32::from(width), value);
            }
        }

        debug_assert_eq!(self.check_code_info(out), Ok(()));
    }

    /// Re-read every value from `code_info` and compare it with the entries
    pub fn check_code_info(&self, code_info: &[u8]) -> Result<(), CodeInfoMismatch> {
        let expected_size = self
            .layout
            .as_ref()
            .map_or(code_info.len(), |layout| layout.header.overall_size as usize);
        if code_info.len() != expected_size {
            return Err(CodeInfoMismatch::Size {
                expected: expected_size,
                actual: code_info.len(),
            });
        }
        let info = CodeInfo::new(code_info);
        if info.overall_size() != expected_size {
            return Err(CodeInfoMismatch::Size {
                expected: expected_size,
                actual: info.overall_size(),
            });
        }
        if info.number_of_stack_maps() != self.stack_maps.len() {
            return Err(CodeInfoMismatch::StackMapCount {
                expected: self.stack_maps.len(),
                actual: info.number_of_stack_maps(),
            });
        }

        for (index, entry) in self.stack_maps.iter().enumerate() {
            let map = info.stack_map_at(index);
            let fields = [
                ("dex_pc", entry.dex_pc, map.dex_pc()),
                ("native_pc_offset", entry.native_pc_offset, map.native_pc_offset()),
                ("register_mask", entry.register_mask, map.register_mask()),
                (
                    "inlining_depth",
                    entry.inlining_depth,
                    map.inlining_depth() as u32,
                ),
            ];
            for (field, expected, actual) in fields {
                if expected != actual {
                    return Err(CodeInfoMismatch::StackMapField {
                        index,
                        field,
                        expected: expected.into(),
                        actual: actual.into(),
                    });
                }
            }

            let mask_bits = (info.stack_mask_bits() as usize).max(entry.stack_mask.storage_bits());
            for bit in 0..mask_bits {
                let expected = entry.stack_mask.is_set(bit);
                let actual = map.stack_mask_bit(bit);
                if expected != actual {
                    return Err(CodeInfoMismatch::StackMaskBit {
                        index,
                        bit,
                        expected,
                        actual,
                    });
                }
            }

            if entry.num_dex_registers > 0 {
                let registers = info.dex_register_map_of(&map);
                compare_registers(index, None, self.main_registers_of(entry), registers.locations())?;
            }

            if entry.inlining_depth == 0 {
                continue;
            }
            let inline_info = info.inline_info_of(&map);
            for (depth, inline) in self.inline_infos_of(entry).iter().enumerate() {
                let fields = [
                    ("method_index", inline.method_index, inline_info.method_index_at_depth(depth)),
                    ("dex_pc", inline.dex_pc, inline_info.dex_pc_at_depth(depth)),
                    (
                        "invoke_type",
                        inline.invoke_type as u32,
                        inline_info.invoke_type_at_depth(depth).map_or(u32::MAX, |t| t as u32),
                    ),
                    (
                        "num_dex_registers",
                        inline.num_dex_registers,
                        inline_info.num_dex_registers_at_depth(depth),
                    ),
                ];
                for (field, expected, actual) in fields {
                    if expected != actual {
                        return Err(CodeInfoMismatch::InlineInfo {
                            index,
                            depth,
                            field,
                            expected: expected.into(),
                            actual: actual.into(),
                        });
                    }
                }
                if inline.num_dex_registers > 0 {
                    let registers = info.dex_register_map_at_depth(depth, &inline_info, &map);
                    compare_registers(
                        index,
                        Some(depth),
                        self.inline_registers_of(inline),
                        registers.locations(),
                    )?;
                }
            }
        }
        Ok(())
    }
}

fn compare_registers(
    index: usize,
    depth: Option<usize>,
    expected: &[DexRegisterLocation],
    actual: &[DexRegisterLocation],
) -> Result<(), CodeInfoMismatch> {
    for (register, expected) in expected.iter().enumerate() {
        let actual = actual.get(register).copied().unwrap_or_default();
        if *expected != actual {
            return Err(CodeInfoMismatch::DexRegister {
                index,
                depth,
                register,
                expected: *expected,
                actual,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use DexRegisterLocationKind as Kind;

    fn encode(stream: &mut StackMapStream) -> Vec<u8> {
        let size = stream.prepare_for_fill_in();
        let mut out = vec![0u8; size];
        stream.fill_in(&mut out);
        out
    }

    #[test]
    fn test_empty_stream() {
        let mut stream = StackMapStream::new();
        let out = encode(&mut stream);
        assert_eq!(out.len(), 36);
        let info = CodeInfo::new(&out);
        assert_eq!(info.number_of_stack_maps(), 0);
        assert_eq!(stream.check_code_info(&out), Ok(()));
    }

    #[test]
    fn test_inlining_depth_past_a_byte() {
        let mut stream = StackMapStream::new();
        stream.begin_stack_map_entry(0, 0, 0, None, 0);
        for depth in 0..300u32 {
            stream.begin_inline_info_entry(depth, depth, InvokeType::Static, 0);
            stream.end_inline_info_entry();
        }
        stream.end_stack_map_entry();
        let out = encode(&mut stream);
        assert_eq!(stream.check_code_info(&out), Ok(()));

        let info = CodeInfo::new(&out);
        let map = info.stack_map_at(0);
        assert_eq!(map.inlining_depth(), 300);
        let inline_info = info.inline_info_of(&map);
        assert_eq!(inline_info.method_index_at_depth(299), 299);
    }

    #[test]
    fn test_unchanged_registers_share_the_previous_map() {
        let mut stream = StackMapStream::new();
        for native_pc in [4, 8] {
            stream.begin_stack_map_entry(1, native_pc, 0, None, 2);
            stream.add_dex_register_entry(Kind::InRegister, 3);
            stream.add_dex_register_entry(Kind::Constant, 1);
            stream.end_stack_map_entry();
        }
        let out = encode(&mut stream);
        let info = CodeInfo::new(&out);

        let second = info.stack_map_at(1);
        assert!(!second.has_dex_register_map());
        assert!(second.has_any_dex_registers());
        let registers = info.dex_register_map_of(&second);
        assert_eq!(registers.machine_register(0), 3);
        assert_eq!(registers.constant(1), 1);
        // One mask byte and two short locations.
        assert_eq!(info.header().dex_register_maps_size, 3);
    }

    #[test]
    fn test_identical_deltas_are_stored_once() {
        let mut stream = StackMapStream::new();
        let locations = [(Kind::InStack, 8), (Kind::InStack, 12), (Kind::InStack, 8)];
        for (i, (kind, value)) in locations.into_iter().enumerate() {
            stream.begin_stack_map_entry(i as u32, 16 * i as u32, 0, None, 1);
            stream.add_dex_register_entry(kind, value);
            stream.end_stack_map_entry();
        }
        let out = encode(&mut stream);
        let info = CodeInfo::new(&out);

        assert_eq!(info.header().dex_register_maps_size, 4);
        assert_eq!(
            info.stack_map_at(0).dex_register_map_offset(),
            info.stack_map_at(2).dex_register_map_offset()
        );
        assert_eq!(info.dex_register_map_of(&info.stack_map_at(1)).stack_offset_in_bytes(0), 12);
        assert_eq!(info.dex_register_map_of(&info.stack_map_at(2)).stack_offset_in_bytes(0), 8);
    }

    #[test]
    fn test_check_code_info_reports_corruption() {
        let mut stream = StackMapStream::new();
        stream.begin_stack_map_entry(3, 40, 0x5, None, 0);
        stream.end_stack_map_entry();
        stream.begin_stack_map_entry(7, 48, 0x1, None, 0);
        stream.end_stack_map_entry();
        let size = stream.prepare_for_fill_in();
        let mut out = vec![0u8; size];
        stream.fill_in(&mut out);

        let short = &out[..out.len() - 4];
        assert!(matches!(
            stream.check_code_info(short),
            Err(CodeInfoMismatch::Size { .. })
        ));

        // The first record's dex pc starts right after the header.
        out[crate::stack_map::encoding::HEADER_SIZE] ^= 1;
        assert_eq!(
            stream.check_code_info(&out),
            Err(CodeInfoMismatch::StackMapField {
                index: 0,
                field: "dex_pc",
                expected: 3,
                actual: 2,
            })
        );
    }
}
