//! Byte and bit access over encoded stack map memory
//!
//! Multi-byte values are little-endian. Bit `i` of a region is bit `i % 8` of
//! byte `i / 8`, so bit fields may straddle byte boundaries.

/// Read-only view of an encoded region
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion<'a> {
    data: &'a [u8],
}

impl<'a> MemoryRegion<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        MemoryRegion { data }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn size_in_bits(&self) -> usize {
        self.data.len() * 8
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    pub fn load_u8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    pub fn load_u32(&self, offset: usize) -> u32 {
        let d = &self.data[offset..offset + 4];
        u32::from_le_bytes([d[0], d[1], d[2], d[3]])
    }

    pub fn load_i32(&self, offset: usize) -> i32 {
        self.load_u32(offset) as i32
    }

    pub fn subregion(&self, offset: usize, len: usize) -> MemoryRegion<'a> {
        MemoryRegion {
            data: &self.data[offset..offset + len],
        }
    }

    pub fn load_bit(&self, bit: usize) -> bool {
        self.data[bit / 8] & (1 << (bit % 8)) != 0
    }

    /// Unsigned field of `width` bits (at most 32) starting at `bit_offset`
    pub fn load_bits(&self, bit_offset: usize, width: u32) -> u32 {
        debug_assert!(width <= 32);
        let mut value = 0u64;
        let mut read = 0u32;
        while read < width {
            let bit = bit_offset + read as usize;
            let shift = (bit % 8) as u32;
            let take = (8 - shift).min(width - read);
            let chunk = (u64::from(self.data[bit / 8]) >> shift) & ((1 << take) - 1);
            value |= chunk << read;
            read += take;
        }
        value as u32
    }

    pub fn bit_region(&self, bit_offset: usize, bit_len: usize) -> BitRegion<'a> {
        debug_assert!(bit_offset + bit_len <= self.size_in_bits());
        BitRegion {
            region: *self,
            bit_start: bit_offset,
            bit_len,
        }
    }
}

/// Writable view of a region being filled in
#[derive(Debug)]
pub struct MemoryRegionMut<'a> {
    data: &'a mut [u8],
}

impl<'a> MemoryRegionMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        MemoryRegionMut { data }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn as_region(&self) -> MemoryRegion<'_> {
        MemoryRegion { data: self.data }
    }

    pub fn store_u8(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    pub fn store_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn store_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn store_bit(&mut self, bit: usize, value: bool) {
        let mask = 1u8 << (bit % 8);
        if value {
            self.data[bit / 8] |= mask;
        } else {
            self.data[bit / 8] &= !mask;
        }
    }

    /// Store the low `width` bits (at most 32) of `value` at `bit_offset`
    pub fn store_bits(&mut self, bit_offset: usize, width: u32, value: u32) {
        debug_assert!(width <= 32);
        debug_assert!(width == 32 || value >> width == 0, "{value} does not fit {width} bits");
        let mut written = 0u32;
        while written < width {
            let bit = bit_offset + written as usize;
            let shift = (bit % 8) as u32;
            let take = (8 - shift).min(width - written);
            let mask = (((1u16 << take) - 1) as u8) << shift;
            let chunk = ((value >> written) as u8) << shift;
            let byte = &mut self.data[bit / 8];
            *byte = (*byte & !mask) | (chunk & mask);
            written += take;
        }
    }
}

/// Window of bits inside a region, such as one stack map's stack mask
#[derive(Debug, Clone, Copy)]
pub struct BitRegion<'a> {
    region: MemoryRegion<'a>,
    bit_start: usize,
    bit_len: usize,
}

impl BitRegion<'_> {
    pub fn len(&self) -> usize {
        self.bit_len
    }

    pub fn is_empty(&self) -> bool {
        self.bit_len == 0
    }

    /// Bits past the end of the window read as clear
    pub fn load_bit(&self, bit: usize) -> bool {
        bit < self.bit_len && self.region.load_bit(self.bit_start + bit)
    }

    pub fn load_bits(&self, bit_offset: usize, width: u32) -> u32 {
        debug_assert!(bit_offset + width as usize <= self.bit_len);
        self.region.load_bits(self.bit_start + bit_offset, width)
    }
}
