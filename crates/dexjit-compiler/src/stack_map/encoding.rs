//! Code info layout
//!
//! ```text
//! header                      HEADER_SIZE bytes
//! stack map records           fixed-stride bit records, byte aligned
//! dex register maps           delta maps, byte granular
//! inline info records         fixed-stride bit records, byte aligned
//! padding                     to a multiple of 4 bytes
//! ```
//!
//! Every bit field is exactly as wide as the largest value it holds in this
//! method, so the widths live in the header.

use bitflags::bitflags;

use super::region::{MemoryRegion, MemoryRegionMut};

pub const HEADER_SIZE: usize = 35;

/// Code info blobs are padded to this alignment
pub const CODE_INFO_ALIGNMENT: usize = 4;

/// Width of the per-record flags field
pub const STACK_MAP_FLAG_BITS: u32 = 3;

bitflags! {
    /// Per stack map facts, stored in every record
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StackMapFlags: u8 {
        /// The record carries its own delta map
        const HAS_DEX_REGISTER_MAP = 1 << 0;
        /// The main frame has dex registers
        const HAS_ANY_DEX_REGISTERS = 1 << 1;
        const HAS_INLINE_INFO = 1 << 2;
    }
}

/// Bits needed to hold `max`
pub fn bits_needed(max: u32) -> u8 {
    (u32::BITS - max.leading_zeros()) as u8
}

/// Field widths of a stack map record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackMapEncoding {
    pub dex_pc_bits: u8,
    pub native_pc_bits: u8,
    pub register_mask_bits: u8,
    pub dex_register_map_offset_bits: u8,
    pub inline_info_index_bits: u8,
    pub inlining_depth_bits: u8,
    pub stack_mask_bits: u32,
}

impl StackMapEncoding {
    pub fn dex_pc_offset(&self) -> usize {
        0
    }

    pub fn native_pc_offset(&self) -> usize {
        self.dex_pc_offset() + self.dex_pc_bits as usize
    }

    pub fn register_mask_offset(&self) -> usize {
        self.native_pc_offset() + self.native_pc_bits as usize
    }

    pub fn dex_register_map_offset(&self) -> usize {
        self.register_mask_offset() + self.register_mask_bits as usize
    }

    pub fn inline_info_index_offset(&self) -> usize {
        self.dex_register_map_offset() + self.dex_register_map_offset_bits as usize
    }

    pub fn inlining_depth_offset(&self) -> usize {
        self.inline_info_index_offset() + self.inline_info_index_bits as usize
    }

    pub fn flags_offset(&self) -> usize {
        self.inlining_depth_offset() + self.inlining_depth_bits as usize
    }

    pub fn stack_mask_offset(&self) -> usize {
        self.flags_offset() + STACK_MAP_FLAG_BITS as usize
    }

    /// Record stride in bits
    pub fn bit_size(&self) -> usize {
        self.stack_mask_offset() + self.stack_mask_bits as usize
    }
}

/// Field widths of an inline frame record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InlineInfoEncoding {
    pub method_index_bits: u8,
    pub dex_pc_bits: u8,
    pub invoke_type_bits: u8,
    pub num_dex_registers_bits: u8,
}

impl InlineInfoEncoding {
    pub fn method_index_offset(&self) -> usize {
        0
    }

    pub fn dex_pc_offset(&self) -> usize {
        self.method_index_bits as usize
    }

    pub fn invoke_type_offset(&self) -> usize {
        self.dex_pc_offset() + self.dex_pc_bits as usize
    }

    pub fn num_dex_registers_offset(&self) -> usize {
        self.invoke_type_offset() + self.invoke_type_bits as usize
    }

    pub fn bit_size(&self) -> usize {
        self.num_dex_registers_offset() + self.num_dex_registers_bits as usize
    }
}

/// Fixed-size code info header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeInfoHeader {
    pub overall_size: u32,
    pub number_of_stack_maps: u32,
    pub number_of_inline_infos: u32,
    pub dex_register_maps_size: u32,
    pub number_of_dex_registers: u32,
    pub stack_map_encoding: StackMapEncoding,
    pub inline_info_encoding: InlineInfoEncoding,
    /// Union of every record's flags
    pub flags: StackMapFlags,
}

impl CodeInfoHeader {
    pub fn encode(&self, region: &mut MemoryRegionMut<'_>) {
        let sm = &self.stack_map_encoding;
        let ii = &self.inline_info_encoding;
        region.store_u32(0, self.overall_size);
        region.store_u32(4, self.number_of_stack_maps);
        region.store_u32(8, self.number_of_inline_infos);
        region.store_u32(12, self.dex_register_maps_size);
        region.store_u32(16, self.number_of_dex_registers);
        region.store_u32(20, sm.stack_mask_bits);
        let widths = [
            sm.dex_pc_bits,
            sm.native_pc_bits,
            sm.register_mask_bits,
            sm.dex_register_map_offset_bits,
            sm.inline_info_index_bits,
            sm.inlining_depth_bits,
            ii.method_index_bits,
            ii.dex_pc_bits,
            ii.invoke_type_bits,
            ii.num_dex_registers_bits,
        ];
        region.store_bytes(24, &widths);
        region.store_u8(34, self.flags.bits());
    }

    pub fn decode(region: MemoryRegion<'_>) -> Self {
        let width = |i: usize| region.load_u8(24 + i);
        CodeInfoHeader {
            overall_size: region.load_u32(0),
            number_of_stack_maps: region.load_u32(4),
            number_of_inline_infos: region.load_u32(8),
            dex_register_maps_size: region.load_u32(12),
            number_of_dex_registers: region.load_u32(16),
            stack_map_encoding: StackMapEncoding {
                dex_pc_bits: width(0),
                native_pc_bits: width(1),
                register_mask_bits: width(2),
                dex_register_map_offset_bits: width(3),
                inline_info_index_bits: width(4),
                inlining_depth_bits: width(5),
                stack_mask_bits: region.load_u32(20),
            },
            inline_info_encoding: InlineInfoEncoding {
                method_index_bits: width(6),
                dex_pc_bits: width(7),
                invoke_type_bits: width(8),
                num_dex_registers_bits: width(9),
            },
            flags: StackMapFlags::from_bits_truncate(region.load_u8(34)),
        }
    }

    pub fn stack_maps_start(&self) -> usize {
        HEADER_SIZE
    }

    pub fn stack_maps_size(&self) -> usize {
        (self.number_of_stack_maps as usize * self.stack_map_encoding.bit_size()).div_ceil(8)
    }

    pub fn dex_register_maps_start(&self) -> usize {
        self.stack_maps_start() + self.stack_maps_size()
    }

    pub fn inline_infos_start(&self) -> usize {
        self.dex_register_maps_start() + self.dex_register_maps_size as usize
    }

    pub fn inline_infos_size(&self) -> usize {
        (self.number_of_inline_infos as usize * self.inline_info_encoding.bit_size()).div_ceil(8)
    }

    /// Total size implied by the table sizes, padding included
    pub fn computed_size(&self) -> usize {
        let end = self.inline_infos_start() + self.inline_infos_size();
        end.next_multiple_of(CODE_INFO_ALIGNMENT)
    }
}
