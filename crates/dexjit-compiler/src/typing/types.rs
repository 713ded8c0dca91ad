//! The type lattice
//!
//! A [`Type`] packs the coarse facts the register allocator needs about one
//! SSA register into 32 bits:
//!
//! ```text
//! bit  0      wide        bit  7..=11  element wide/narrow/fp/core/ref (arrays)
//! bit  1      narrow      bit 12..     array depth
//! bit  2..=4  fp/core/ref
//! bit  5..=6  low/high word
//! ```
//!
//! Every merge only ORs bits in, so repeated merging reaches a fixed point.
//! The one exception is [`Type::merge_pure_ref_and_array`], which may replace
//! an array type with the plain reference type; it reports a change only when
//! the bits really change, which keeps the fixed point finite.

use std::fmt;

use crate::dex::{DexFile, DexFileError};

const BIT_WIDE: u32 = 0;
const BIT_NARROW: u32 = 1;
const BIT_FP: u32 = 2;
const BIT_CORE: u32 = 3;
const BIT_REF: u32 = 4;
const BIT_LOW_WORD: u32 = 5;
const BIT_HIGH_WORD: u32 = 6;
const BIT_ARRAY_WIDE: u32 = 7;
const BIT_ARRAY_DEPTH_START: u32 = 12;

const FLAG_WIDE: u32 = 1 << BIT_WIDE;
const FLAG_NARROW: u32 = 1 << BIT_NARROW;
const FLAG_FP: u32 = 1 << BIT_FP;
const FLAG_CORE: u32 = 1 << BIT_CORE;
const FLAG_REF: u32 = 1 << BIT_REF;
const FLAG_LOW_WORD: u32 = 1 << BIT_LOW_WORD;
const FLAG_HIGH_WORD: u32 = 1 << BIT_HIGH_WORD;

const MASK_WIDE: u32 = FLAG_WIDE | FLAG_NARROW;
const MASK_TYPE: u32 = FLAG_FP | FLAG_CORE | FLAG_REF;
const MASK_WORD: u32 = FLAG_LOW_WORD | FLAG_HIGH_WORD;
const MASK_WIDE_AND_TYPE: u32 = MASK_WIDE | MASK_TYPE;

const ARRAY_TYPE_SHIFT: u32 = BIT_ARRAY_WIDE - BIT_WIDE;
const MASK_ARRAY_WIDE_AND_TYPE: u32 = MASK_WIDE_AND_TYPE << ARRAY_TYPE_SHIFT;
const MASK_ARRAY_DEPTH: u32 = u32::MAX << ARRAY_TYPE_SHIFT;
const MASK_NON_ARRAY: u32 = !(MASK_ARRAY_WIDE_AND_TYPE | MASK_ARRAY_DEPTH);

/// Inferred type of one SSA register
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Type(u32);

impl Type {
    // ===== Constructors =====

    /// No facts known yet
    pub const fn uninitialized() -> Self {
        Type(0)
    }

    /// A reference that is not known to be an array
    pub const fn non_array_ref_type() -> Self {
        Type(FLAG_LOW_WORD | FLAG_NARROW | FLAG_REF)
    }

    pub const fn from_raw(raw: u32) -> Self {
        Type(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Type of a value described by a shorty character
    pub fn shorty_type(shorty: char) -> Self {
        match shorty {
            'L' => Type(FLAG_LOW_WORD | FLAG_NARROW | FLAG_REF),
            'D' => Type(FLAG_LOW_WORD | FLAG_WIDE | FLAG_FP),
            'J' => Type(FLAG_LOW_WORD | FLAG_WIDE | FLAG_CORE),
            'F' => Type(FLAG_LOW_WORD | FLAG_NARROW | FLAG_FP),
            _ => {
                debug_assert!(matches!(shorty, 'I' | 'S' | 'C' | 'B' | 'Z'), "shorty {shorty}");
                Type(FLAG_LOW_WORD | FLAG_NARROW | FLAG_CORE)
            }
        }
    }

    /// Array of `array_depth` dimensions whose innermost element is `nested`
    pub fn array_type(array_depth: u32, nested: Type) -> Self {
        debug_assert_ne!(array_depth, 0);
        Type(
            FLAG_NARROW
                | FLAG_REF
                | FLAG_LOW_WORD
                | (array_depth << BIT_ARRAY_DEPTH_START)
                | ((nested.0 & MASK_WIDE_AND_TYPE) << ARRAY_TYPE_SHIFT),
        )
    }

    /// Type of a value with the given type descriptor. `V` yields the
    /// uninitialized type.
    pub fn from_descriptor(descriptor: &str) -> Self {
        let element = descriptor.trim_start_matches('[');
        let array_depth = (descriptor.len() - element.len()) as u32;
        let first = element.chars().next().unwrap_or('V');
        if array_depth != 0 {
            Type::array_type(array_depth, Type::shorty_type(first))
        } else if first == 'V' {
            Type::uninitialized()
        } else {
            Type::shorty_type(first)
        }
    }

    /// Type of `type_idx` in `dex_file`
    pub fn dex_type(dex_file: &DexFile, type_idx: u32) -> Result<Self, DexFileError> {
        Ok(Type::from_descriptor(dex_file.type_descriptor(type_idx)?))
    }

    // ===== Queries =====

    pub fn is_defined(self) -> bool {
        self.0 != 0
    }

    /// Used as both a 32-bit and a 64-bit value, or as both halves of a pair.
    /// Element conflicts inside array types are ignored.
    pub fn size_conflict(self) -> bool {
        (self.wide() && self.narrow()) || (self.high_word() && self.low_word())
    }

    /// Two or more of fp, core and ref
    pub fn type_conflict(self) -> bool {
        (self.0 & MASK_TYPE).count_ones() >= 2
    }

    pub fn wide(self) -> bool {
        self.is_bit_set(FLAG_WIDE)
    }

    pub fn narrow(self) -> bool {
        self.is_bit_set(FLAG_NARROW)
    }

    pub fn fp(self) -> bool {
        self.is_bit_set(FLAG_FP)
    }

    pub fn core(self) -> bool {
        self.is_bit_set(FLAG_CORE)
    }

    pub fn is_ref(self) -> bool {
        self.is_bit_set(FLAG_REF)
    }

    pub fn low_word(self) -> bool {
        self.is_bit_set(FLAG_LOW_WORD)
    }

    pub fn high_word(self) -> bool {
        self.is_bit_set(FLAG_HIGH_WORD)
    }

    pub fn array_depth(self) -> u32 {
        self.0 >> BIT_ARRAY_DEPTH_START
    }

    /// Innermost element type of an array type
    pub fn nested_type(self) -> Self {
        debug_assert_ne!(self.array_depth(), 0);
        Type(FLAG_LOW_WORD | ((self.0 & MASK_ARRAY_WIDE_AND_TYPE) >> ARRAY_TYPE_SHIFT))
    }

    /// Element type one dimension down
    pub fn component_type(self) -> Self {
        debug_assert_ne!(self.array_depth(), 0);
        let temp = Type(self.0 - (1 << BIT_ARRAY_DEPTH_START));
        if temp.array_depth() != 0 {
            temp
        } else {
            self.nested_type()
        }
    }

    /// The type of the high half of a wide low-word type
    pub fn to_high_word(self) -> Self {
        debug_assert_eq!(self.0 & (MASK_WIDE | MASK_WORD), FLAG_WIDE | FLAG_LOW_WORD);
        Type(self.0 ^ (FLAG_LOW_WORD | FLAG_HIGH_WORD))
    }

    /// Narrow low-word reference with nothing else in the non-array bits
    pub fn is_pure_ref(self) -> bool {
        self.0 & (MASK_WIDE_AND_TYPE | MASK_WORD) == (FLAG_NARROW | FLAG_REF | FLAG_LOW_WORD)
    }

    /// Same array shape (depth and element flags). Both must be pure refs.
    pub fn equal_array_ref(self, other: Type) -> bool {
        debug_assert!(self.is_pure_ref() && other.is_pure_ref());
        (self.0 ^ other.0) & (MASK_ARRAY_WIDE_AND_TYPE | MASK_ARRAY_DEPTH) == 0
    }

    // ===== Mutators =====
    //
    // Each returns whether the bits changed.

    pub fn set_wide(&mut self) -> bool {
        self.set_bit(FLAG_WIDE)
    }

    pub fn set_narrow(&mut self) -> bool {
        self.set_bit(FLAG_NARROW)
    }

    pub fn set_fp(&mut self) -> bool {
        self.set_bit(FLAG_FP)
    }

    pub fn set_core(&mut self) -> bool {
        self.set_bit(FLAG_CORE)
    }

    pub fn set_ref(&mut self) -> bool {
        self.set_bit(FLAG_REF)
    }

    pub fn set_low_word(&mut self) -> bool {
        self.set_bit(FLAG_LOW_WORD)
    }

    pub fn set_high_word(&mut self) -> bool {
        self.set_bit(FLAG_HIGH_WORD)
    }

    pub fn copy(&mut self, other: Type) -> bool {
        if self.0 != other.0 {
            self.0 = other.0;
            true
        } else {
            false
        }
    }

    /// Merge a pure reference type. An unassigned type takes `ref_type` as is;
    /// two different array shapes collapse to [`Type::non_array_ref_type`].
    pub fn merge_pure_ref_and_array(&mut self, ref_type: Type) -> bool {
        debug_assert!(ref_type.is_pure_ref());
        if !self.is_ref() {
            debug_assert!(!self.is_defined(), "merging ref into {self}");
            return self.copy(ref_type);
        }
        debug_assert!(self.is_pure_ref());
        if self.equal_array_ref(ref_type) {
            return false;
        }
        self.copy(Type::non_array_ref_type())
    }

    /// Mark this as the high word of the wide value described by
    /// `low_word_type`
    pub fn merge_high_word(&mut self, low_word_type: Type) -> bool {
        debug_assert!(low_word_type.wide() && low_word_type.low_word());
        let changed = self.merge_bits(low_word_type, MASK_WIDE_AND_TYPE);
        self.set_high_word() | changed
    }

    /// OR in width, class and word flags, ignoring the array shape
    pub fn merge_non_array_flags(&mut self, src: Type) -> bool {
        self.merge_bits(src, MASK_NON_ARRAY)
    }

    fn is_bit_set(self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    fn set_bit(&mut self, flag: u32) -> bool {
        if self.0 & flag == 0 {
            self.0 |= flag;
            true
        } else {
            false
        }
    }

    fn merge_bits(&mut self, src: Type, mask: u32) -> bool {
        let new_bits = self.0 | (src.0 & mask);
        if new_bits != self.0 {
            self.0 = new_bits;
            true
        } else {
            false
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_defined() {
            return write!(f, "?");
        }
        let mut sep = "";
        for (flag, name) in [
            (FLAG_WIDE, "wide"),
            (FLAG_NARROW, "narrow"),
            (FLAG_FP, "fp"),
            (FLAG_CORE, "core"),
            (FLAG_REF, "ref"),
            (FLAG_LOW_WORD, "lo"),
            (FLAG_HIGH_WORD, "hi"),
        ] {
            if self.is_bit_set(flag) {
                write!(f, "{sep}{name}")?;
                sep = "|";
            }
        }
        if self.array_depth() != 0 {
            write!(f, " [{}]{}", self.array_depth(), self.nested_type())?;
        }
        Ok(())
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({:#x}: {})", self.0, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_shorty_types() {
        let int = Type::shorty_type('I');
        assert!(int.core() && int.narrow() && int.low_word());
        assert!(!int.is_ref());

        let double = Type::shorty_type('D');
        assert!(double.fp() && double.wide());
        assert_eq!(Type::shorty_type('Z'), int);

        let object = Type::shorty_type('L');
        assert_eq!(object, Type::non_array_ref_type());
        assert!(object.is_pure_ref());
    }

    #[test]
    fn test_descriptors() {
        assert_eq!(Type::from_descriptor("V"), Type::uninitialized());
        assert_eq!(Type::from_descriptor("Ljava/lang/String;"), Type::non_array_ref_type());
        assert_eq!(Type::from_descriptor("J"), Type::shorty_type('J'));

        let int_array_2d = Type::from_descriptor("[[I");
        assert_eq!(int_array_2d.array_depth(), 2);
        assert!(int_array_2d.is_pure_ref());

        let int_array = int_array_2d.component_type();
        assert_eq!(int_array, Type::from_descriptor("[I"));
        assert_eq!(int_array.component_type(), Type::shorty_type('I'));
        assert_eq!(int_array_2d.nested_type(), Type::shorty_type('I'));
    }

    #[test]
    fn test_high_word() {
        let long = Type::shorty_type('J');
        let high = long.to_high_word();
        assert!(high.high_word() && !high.low_word());
        assert!(high.wide() && high.core());

        let mut slot = Type::uninitialized();
        assert!(slot.merge_high_word(long));
        assert_eq!(slot, high);
        assert!(!slot.merge_high_word(long));
    }

    #[test]
    fn test_conflicts() {
        let mut t = Type::shorty_type('I');
        assert!(!t.type_conflict() && !t.size_conflict());
        t.set_fp();
        assert!(t.type_conflict());
        assert!(!t.size_conflict());
        t.set_wide();
        assert!(t.size_conflict());

        let mut halves = Type::shorty_type('J');
        halves.set_high_word();
        assert!(halves.size_conflict());
    }

    #[test]
    fn test_merge_pure_ref_and_array() {
        let mut slot = Type::uninitialized();
        let int_array = Type::from_descriptor("[I");
        assert!(slot.merge_pure_ref_and_array(int_array));
        assert_eq!(slot, int_array);
        assert!(!slot.merge_pure_ref_and_array(int_array));

        assert!(slot.merge_pure_ref_and_array(Type::from_descriptor("[J")));
        assert_eq!(slot, Type::non_array_ref_type());
        // The collapse is sticky and settles.
        assert!(!slot.merge_pure_ref_and_array(int_array));
        assert_eq!(slot, Type::non_array_ref_type());
    }

    #[test]
    fn test_merge_non_array_flags_ignores_shape() {
        let mut slot = Type::uninitialized();
        assert!(slot.merge_non_array_flags(Type::from_descriptor("[[D")));
        assert_eq!(slot, Type::non_array_ref_type());
        assert_eq!(slot.array_depth(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::uninitialized().to_string(), "?");
        assert_eq!(Type::shorty_type('I').to_string(), "narrow|core|lo");
        assert_eq!(Type::from_descriptor("[F").to_string(), "narrow|ref|lo [1]narrow|fp|lo");
    }

    fn any_type() -> impl Strategy<Value = Type> {
        any::<u32>().prop_map(Type::from_raw)
    }

    proptest! {
        #[test]
        fn test_bit_merges_are_monotonic(a in any_type(), b in any_type()) {
            let mut t = a;
            t.merge_non_array_flags(b);
            prop_assert_eq!(t.raw() & a.raw(), a.raw());

            if b.wide() && b.low_word() {
                let mut t = a;
                t.merge_high_word(b);
                prop_assert_eq!(t.raw() & a.raw(), a.raw());
                prop_assert!(t.high_word());
            }
        }

        #[test]
        fn test_merges_report_changes_exactly(a in any_type(), b in any_type()) {
            let mut t = a;
            let changed = t.merge_non_array_flags(b);
            prop_assert_eq!(changed, t != a);
            let mut again = t;
            prop_assert!(!again.merge_non_array_flags(b));
        }

        #[test]
        fn test_pure_ref_merge_settles(depth_a in 0u32..4, depth_b in 0u32..4, elem in prop::sample::select(vec!['I', 'J', 'F', 'D', 'L'])) {
            let make = |depth: u32| if depth == 0 {
                Type::non_array_ref_type()
            } else {
                Type::array_type(depth, Type::shorty_type(elem))
            };
            let mut slot = Type::uninitialized();
            slot.merge_pure_ref_and_array(make(depth_a));
            slot.merge_pure_ref_and_array(make(depth_b));
            prop_assert!(!slot.merge_pure_ref_and_array(make(depth_a)));
            prop_assert!(!slot.merge_pure_ref_and_array(make(depth_b)));
        }
    }
}
