//! Read side of an encoded code info blob
//!
//! All lookups are offset arithmetic against the widths in the header. The
//! only non-constant walks are the two pc lookups and dex register
//! resolution, which goes back over earlier stack maps until every slot has
//! been found in a delta.

use std::fmt;

use crate::dex::InvokeType;

use super::encoding::{
    CodeInfoHeader, InlineInfoEncoding, StackMapEncoding, StackMapFlags, HEADER_SIZE,
    STACK_MAP_FLAG_BITS,
};
use super::location::{DexRegisterLocation, DexRegisterLocationKind};
use super::region::{BitRegion, MemoryRegion};

/// Decoded view of a code info blob produced by `StackMapStream::fill_in`
#[derive(Debug, Clone, Copy)]
pub struct CodeInfo<'a> {
    region: MemoryRegion<'a>,
    header: CodeInfoHeader,
}

impl<'a> CodeInfo<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        debug_assert!(data.len() >= HEADER_SIZE, "code info shorter than its header");
        let region = MemoryRegion::new(data);
        CodeInfo {
            region,
            header: CodeInfoHeader::decode(region),
        }
    }

    pub fn header(&self) -> &CodeInfoHeader {
        &self.header
    }

    pub fn overall_size(&self) -> usize {
        self.header.overall_size as usize
    }

    pub fn number_of_stack_maps(&self) -> usize {
        self.header.number_of_stack_maps as usize
    }

    pub fn number_of_dex_registers(&self) -> usize {
        self.header.number_of_dex_registers as usize
    }

    pub fn stack_mask_bits(&self) -> u32 {
        self.header.stack_map_encoding.stack_mask_bits
    }

    /// Stack map record stride in bits
    pub fn stack_map_size(&self) -> usize {
        self.header.stack_map_encoding.bit_size()
    }

    pub fn stack_map_at(&self, index: usize) -> StackMap<'a> {
        debug_assert!(index < self.number_of_stack_maps());
        let records = self
            .region
            .subregion(self.header.stack_maps_start(), self.header.stack_maps_size());
        let stride = self.stack_map_size();
        StackMap {
            index,
            bits: records.bit_region(index * stride, stride),
            encoding: self.header.stack_map_encoding,
        }
    }

    pub fn stack_maps(&self) -> impl Iterator<Item = StackMap<'a>> + '_ {
        (0..self.number_of_stack_maps()).map(|i| self.stack_map_at(i))
    }

    // TODO: binary search once the stream sorts entries by native pc.
    pub fn stack_map_for_dex_pc(&self, dex_pc: u32) -> Option<StackMap<'a>> {
        self.stack_maps().find(|map| map.dex_pc() == dex_pc)
    }

    pub fn stack_map_for_native_pc_offset(&self, native_pc_offset: u32) -> Option<StackMap<'a>> {
        self.stack_maps()
            .find(|map| map.native_pc_offset() == native_pc_offset)
    }

    pub fn inline_info_of(&self, stack_map: &StackMap<'_>) -> InlineInfo<'a> {
        debug_assert!(stack_map.has_inline_info());
        let records = self
            .region
            .subregion(self.header.inline_infos_start(), self.header.inline_infos_size());
        InlineInfo {
            records,
            encoding: self.header.inline_info_encoding,
            first: stack_map.inline_info_index(),
            depth: stack_map.inlining_depth(),
        }
    }

    /// Locations of the main frame's registers at `stack_map`
    pub fn dex_register_map_of(&self, stack_map: &StackMap<'_>) -> DexRegisterMap {
        let count = self.main_registers_of(stack_map);
        DexRegisterMap::new(self.resolve_slots(stack_map.index(), 0, count))
    }

    /// Locations of the registers of the inlined frame at `depth`
    pub fn dex_register_map_at_depth(
        &self,
        depth: usize,
        inline_info: &InlineInfo<'_>,
        stack_map: &StackMap<'_>,
    ) -> DexRegisterMap {
        debug_assert!(depth < inline_info.depth());
        let first = self.main_registers_of(stack_map)
            + (0..depth)
                .map(|d| inline_info.num_dex_registers_at_depth(d) as usize)
                .sum::<usize>();
        let count = inline_info.num_dex_registers_at_depth(depth) as usize;
        DexRegisterMap::new(self.resolve_slots(stack_map.index(), first, count))
    }

    fn main_registers_of(&self, stack_map: &StackMap<'_>) -> usize {
        if stack_map.has_any_dex_registers() {
            self.number_of_dex_registers()
        } else {
            0
        }
    }

    /// Main plus inlined register slots of a stack map
    fn total_slots_of(&self, stack_map: &StackMap<'_>) -> usize {
        let mut total = self.main_registers_of(stack_map);
        if stack_map.has_inline_info() {
            let inline_info = self.inline_info_of(stack_map);
            total += (0..inline_info.depth())
                .map(|d| inline_info.num_dex_registers_at_depth(d) as usize)
                .sum::<usize>();
        }
        total
    }

    fn delta_at(&self, offset: usize) -> &'a [u8] {
        let start = self.header.dex_register_maps_start() + offset;
        let end = self.header.inline_infos_start();
        &self.region.as_slice()[start..end]
    }

    /// Latest location of slots `first..first + count` as of stack map
    /// `index`. Slots no delta ever mentioned are `None`.
    fn resolve_slots(&self, index: usize, first: usize, count: usize) -> Vec<DexRegisterLocation> {
        let mut resolved: Vec<Option<DexRegisterLocation>> = vec![None; count];
        let mut remaining = count;
        for map in (0..=index).rev().map(|j| self.stack_map_at(j)) {
            if remaining == 0 {
                break;
            }
            if !map.has_dex_register_map() {
                continue;
            }
            let total = self.total_slots_of(&map);
            let delta = self.delta_at(map.dex_register_map_offset());
            let mask = &delta[..total.div_ceil(8)];
            let mut cursor = mask.len();
            for slot in 0..total.min(first + count) {
                if mask[slot / 8] & (1 << (slot % 8)) == 0 {
                    continue;
                }
                let Some((location, size)) = DexRegisterLocation::decode(&delta[cursor..]) else {
                    break;
                };
                cursor += size;
                if slot >= first && resolved[slot - first].is_none() {
                    resolved[slot - first] = Some(location);
                    remaining -= 1;
                }
            }
        }
        resolved.into_iter().map(Option::unwrap_or_default).collect()
    }
}

/// One fixed-stride stack map record
#[derive(Clone, Copy)]
pub struct StackMap<'a> {
    index: usize,
    bits: BitRegion<'a>,
    encoding: StackMapEncoding,
}

impl StackMap<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    fn field(&self, offset: usize, width: u8) -> u32 {
        self.bits.load_bits(offset, u32::from(width))
    }

    pub fn dex_pc(&self) -> u32 {
        self.field(self.encoding.dex_pc_offset(), self.encoding.dex_pc_bits)
    }

    pub fn native_pc_offset(&self) -> u32 {
        self.field(self.encoding.native_pc_offset(), self.encoding.native_pc_bits)
    }

    pub fn register_mask(&self) -> u32 {
        self.field(
            self.encoding.register_mask_offset(),
            self.encoding.register_mask_bits,
        )
    }

    /// Byte offset of this map's delta inside the dex register maps
    pub fn dex_register_map_offset(&self) -> usize {
        self.field(
            self.encoding.dex_register_map_offset(),
            self.encoding.dex_register_map_offset_bits,
        ) as usize
    }

    pub fn inline_info_index(&self) -> usize {
        self.field(
            self.encoding.inline_info_index_offset(),
            self.encoding.inline_info_index_bits,
        ) as usize
    }

    pub fn inlining_depth(&self) -> usize {
        self.field(
            self.encoding.inlining_depth_offset(),
            self.encoding.inlining_depth_bits,
        ) as usize
    }

    pub fn flags(&self) -> StackMapFlags {
        let bits = self
            .bits
            .load_bits(self.encoding.flags_offset(), STACK_MAP_FLAG_BITS);
        StackMapFlags::from_bits_truncate(bits as u8)
    }

    pub fn has_dex_register_map(&self) -> bool {
        self.flags().contains(StackMapFlags::HAS_DEX_REGISTER_MAP)
    }

    pub fn has_any_dex_registers(&self) -> bool {
        self.flags().contains(StackMapFlags::HAS_ANY_DEX_REGISTERS)
    }

    pub fn has_inline_info(&self) -> bool {
        self.flags().contains(StackMapFlags::HAS_INLINE_INFO)
    }

    /// Bits past the encoded mask width read as clear
    pub fn stack_mask_bit(&self, bit: usize) -> bool {
        bit < self.encoding.stack_mask_bits as usize
            && self.bits.load_bit(self.encoding.stack_mask_offset() + bit)
    }

    /// Indexes of the stack slots holding references
    pub fn stack_mask(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.encoding.stack_mask_bits as usize).filter(|&bit| self.stack_mask_bit(bit))
    }
}

impl fmt::Debug for StackMap<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackMap")
            .field("index", &self.index)
            .field("dex_pc", &self.dex_pc())
            .field("native_pc_offset", &self.native_pc_offset())
            .field("register_mask", &format_args!("{:#x}", self.register_mask()))
            .field("flags", &self.flags())
            .finish()
    }
}

/// Resolved locations of one frame's dex registers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DexRegisterMap {
    locations: Vec<DexRegisterLocation>,
}

impl DexRegisterMap {
    fn new(locations: Vec<DexRegisterLocation>) -> Self {
        DexRegisterMap { locations }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn locations(&self) -> &[DexRegisterLocation] {
        &self.locations
    }

    /// Out-of-range registers read as dead
    pub fn location(&self, register: usize) -> DexRegisterLocation {
        self.locations.get(register).copied().unwrap_or_default()
    }

    pub fn location_kind(&self, register: usize) -> DexRegisterLocationKind {
        self.location(register).kind()
    }

    /// Kind as stored, distinguishing short and large forms
    pub fn location_internal_kind(&self, register: usize) -> DexRegisterLocationKind {
        self.location(register).internal_kind()
    }

    pub fn stack_offset_in_bytes(&self, register: usize) -> i32 {
        debug_assert_eq!(self.location_kind(register), DexRegisterLocationKind::InStack);
        self.location(register).value()
    }

    pub fn constant(&self, register: usize) -> i32 {
        debug_assert_eq!(self.location_kind(register), DexRegisterLocationKind::Constant);
        self.location(register).value()
    }

    pub fn machine_register(&self, register: usize) -> i32 {
        debug_assert!(matches!(
            self.location_kind(register),
            DexRegisterLocationKind::InRegister | DexRegisterLocationKind::InFpuRegister
        ));
        self.location(register).value()
    }

    pub fn is_dex_register_live(&self, register: usize) -> bool {
        self.location(register).is_live()
    }

    pub fn number_of_live_dex_registers(&self) -> usize {
        self.locations.iter().filter(|l| l.is_live()).count()
    }
}

/// Inline chain of one stack map, outermost callee at depth 0
#[derive(Debug, Clone, Copy)]
pub struct InlineInfo<'a> {
    records: MemoryRegion<'a>,
    encoding: InlineInfoEncoding,
    first: usize,
    depth: usize,
}

impl InlineInfo<'_> {
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn field(&self, depth: usize, offset: usize, width: u8) -> u32 {
        debug_assert!(depth < self.depth);
        let record = (self.first + depth) * self.encoding.bit_size();
        self.records.load_bits(record + offset, u32::from(width))
    }

    pub fn method_index_at_depth(&self, depth: usize) -> u32 {
        self.field(
            depth,
            self.encoding.method_index_offset(),
            self.encoding.method_index_bits,
        )
    }

    pub fn dex_pc_at_depth(&self, depth: usize) -> u32 {
        self.field(depth, self.encoding.dex_pc_offset(), self.encoding.dex_pc_bits)
    }

    /// `None` when the stored value is not a known invoke type
    pub fn invoke_type_at_depth(&self, depth: usize) -> Option<InvokeType> {
        let raw = self.field(
            depth,
            self.encoding.invoke_type_offset(),
            self.encoding.invoke_type_bits,
        );
        u8::try_from(raw).ok().and_then(InvokeType::from_u8)
    }

    pub fn num_dex_registers_at_depth(&self, depth: usize) -> u32 {
        self.field(
            depth,
            self.encoding.num_dex_registers_offset(),
            self.encoding.num_dex_registers_bits,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit_vector::BitVector;
    use crate::stack_map::StackMapStream;
    use DexRegisterLocationKind as Kind;

    fn encode(stream: &mut StackMapStream) -> Vec<u8> {
        let mut out = vec![0u8; stream.prepare_for_fill_in()];
        stream.fill_in(&mut out);
        out
    }

    #[test]
    fn test_pc_lookups() {
        let mut stream = StackMapStream::new();
        for (dex_pc, native_pc) in [(0, 12), (5, 20), (9, 44)] {
            stream.begin_stack_map_entry(dex_pc, native_pc, 0, None, 0);
            stream.end_stack_map_entry();
        }
        let out = encode(&mut stream);
        let info = CodeInfo::new(&out);

        assert_eq!(info.stack_map_for_dex_pc(5).map(|m| m.index()), Some(1));
        assert_eq!(info.stack_map_for_native_pc_offset(44).map(|m| m.dex_pc()), Some(9));
        assert!(info.stack_map_for_dex_pc(6).is_none());
        assert!(info.stack_map_for_native_pc_offset(13).is_none());
    }

    #[test]
    fn test_stack_mask_bits() {
        let mut stream = StackMapStream::new();
        let mask = BitVector::from_indexes([1, 6]);
        stream.begin_stack_map_entry(0, 0, 0, Some(&mask), 0);
        stream.end_stack_map_entry();
        stream.begin_stack_map_entry(1, 8, 0, None, 0);
        stream.end_stack_map_entry();
        let out = encode(&mut stream);
        let info = CodeInfo::new(&out);

        assert_eq!(info.stack_mask_bits(), 7);
        assert_eq!(info.stack_map_at(0).stack_mask().collect::<Vec<_>>(), vec![1, 6]);
        assert_eq!(info.stack_map_at(1).stack_mask().count(), 0);
        assert!(!info.stack_map_at(0).stack_mask_bit(40));
    }

    #[test]
    fn test_inlined_registers_resolve_per_depth() {
        let mut stream = StackMapStream::new();
        stream.begin_stack_map_entry(2, 16, 0, None, 1);
        stream.add_dex_register_entry(Kind::InRegister, 4);
        stream.begin_inline_info_entry(7, 3, InvokeType::Virtual, 2);
        stream.add_dex_register_entry(Kind::Constant, 0);
        stream.add_dex_register_entry(Kind::InStack, 16);
        stream.end_inline_info_entry();
        stream.begin_inline_info_entry(9, 1, InvokeType::Static, 1);
        stream.add_dex_register_entry(Kind::InFpuRegister, 2);
        stream.end_inline_info_entry();
        stream.end_stack_map_entry();
        let out = encode(&mut stream);
        let info = CodeInfo::new(&out);

        let map = info.stack_map_at(0);
        assert!(map.has_inline_info());
        let inline_info = info.inline_info_of(&map);
        assert_eq!(inline_info.depth(), 2);
        assert_eq!(inline_info.method_index_at_depth(1), 9);
        assert_eq!(inline_info.invoke_type_at_depth(0), Some(InvokeType::Virtual));

        assert_eq!(info.dex_register_map_of(&map).machine_register(0), 4);
        let outer = info.dex_register_map_at_depth(0, &inline_info, &map);
        assert_eq!(outer.constant(0), 0);
        assert_eq!(outer.stack_offset_in_bytes(1), 16);
        let inner = info.dex_register_map_at_depth(1, &inline_info, &map);
        assert_eq!(inner.location_kind(0), Kind::InFpuRegister);
        assert_eq!(inner.machine_register(0), 2);
    }

    #[test]
    fn test_dead_registers() {
        let mut stream = StackMapStream::new();
        stream.begin_stack_map_entry(0, 0, 0, None, 3);
        stream.add_dex_register_entry(Kind::None, 0);
        stream.add_dex_register_entry(Kind::InRegister, 1);
        stream.add_dex_register_entry(Kind::None, 0);
        stream.end_stack_map_entry();
        let out = encode(&mut stream);
        let info = CodeInfo::new(&out);

        let registers = info.dex_register_map_of(&info.stack_map_at(0));
        assert_eq!(registers.len(), 3);
        assert_eq!(registers.number_of_live_dex_registers(), 1);
        assert!(!registers.is_dex_register_live(0));
        assert!(registers.is_dex_register_live(1));
        assert!(!registers.is_dex_register_live(5));
    }
}
