//! Dex register locations
//!
//! Where a dex register's value lives at a safepoint. Locations are encoded in
//! one byte when the payload fits in five bits, and in five bytes otherwise.

use std::fmt;

const KIND_BITS: u32 = 3;
const KIND_MASK: u8 = (1 << KIND_BITS) - 1;
const SHORT_VALUE_LIMIT: i32 = 1 << (8 - KIND_BITS);

/// Stack offsets are multiples of this in the short form
const STACK_SLOT_SIZE: i32 = 4;

pub const SHORT_LOCATION_SIZE: usize = 1;
pub const LARGE_LOCATION_SIZE: usize = 5;

/// Location kind. The last two kinds only appear in the encoding.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DexRegisterLocationKind {
    None = 0,
    InStack = 1,
    InRegister = 2,
    InFpuRegister = 3,
    Constant = 4,
    InStackLargeOffset = 5,
    ConstantLargeValue = 6,
}

impl DexRegisterLocationKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::InStack),
            2 => Some(Self::InRegister),
            3 => Some(Self::InFpuRegister),
            4 => Some(Self::Constant),
            5 => Some(Self::InStackLargeOffset),
            6 => Some(Self::ConstantLargeValue),
            _ => None,
        }
    }

    /// Kinds callers may pass to the stream
    pub fn is_external(self) -> bool {
        !matches!(self, Self::InStackLargeOffset | Self::ConstantLargeValue)
    }

    pub fn is_large(self) -> bool {
        !self.is_external()
    }

    /// Caller-visible kind of an encoded kind
    pub fn external(self) -> Self {
        match self {
            Self::InStackLargeOffset => Self::InStack,
            Self::ConstantLargeValue => Self::Constant,
            other => other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::InStack => "in stack",
            Self::InRegister => "in register",
            Self::InFpuRegister => "in fpu register",
            Self::Constant => "as constant",
            Self::InStackLargeOffset => "in stack (large offset)",
            Self::ConstantLargeValue => "as constant (large value)",
        }
    }
}

impl fmt::Display for DexRegisterLocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Location of one dex register: a kind and its payload (stack offset in
/// bytes, register number or constant)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DexRegisterLocation {
    kind: DexRegisterLocationKind,
    value: i32,
}

impl DexRegisterLocation {
    /// # Panics
    ///
    /// Register kinds have no large form, so a register number outside
    /// `0..32` panics in every build.
    pub fn new(kind: DexRegisterLocationKind, value: i32) -> Self {
        debug_assert!(kind.is_external(), "{kind} is an encoding-only kind");
        debug_assert!(kind != DexRegisterLocationKind::None || value == 0);
        if matches!(
            kind,
            DexRegisterLocationKind::InRegister | DexRegisterLocationKind::InFpuRegister
        ) {
            assert!(
                (0..SHORT_VALUE_LIMIT).contains(&value),
                "{kind} {value} is not a machine register number"
            );
        }
        DexRegisterLocation { kind, value }
    }

    pub fn none() -> Self {
        DexRegisterLocation {
            kind: DexRegisterLocationKind::None,
            value: 0,
        }
    }

    pub fn kind(&self) -> DexRegisterLocationKind {
        self.kind
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn is_live(&self) -> bool {
        self.kind != DexRegisterLocationKind::None
    }

    /// Kind used in the encoding: short when the payload fits five bits
    pub fn internal_kind(&self) -> DexRegisterLocationKind {
        match self.kind {
            DexRegisterLocationKind::InStack => {
                let fits = self.value % STACK_SLOT_SIZE == 0
                    && (0..SHORT_VALUE_LIMIT).contains(&(self.value / STACK_SLOT_SIZE));
                if fits {
                    DexRegisterLocationKind::InStack
                } else {
                    DexRegisterLocationKind::InStackLargeOffset
                }
            }
            DexRegisterLocationKind::Constant => {
                if (0..SHORT_VALUE_LIMIT).contains(&self.value) {
                    DexRegisterLocationKind::Constant
                } else {
                    DexRegisterLocationKind::ConstantLargeValue
                }
            }
            kind => kind,
        }
    }

    pub fn encoded_size(&self) -> usize {
        if self.internal_kind().is_large() {
            LARGE_LOCATION_SIZE
        } else {
            SHORT_LOCATION_SIZE
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let internal = self.internal_kind();
        if internal.is_large() {
            out.push(internal as u8);
            out.extend_from_slice(&self.value.to_le_bytes());
            return;
        }
        let payload = match internal {
            DexRegisterLocationKind::InStack => self.value / STACK_SLOT_SIZE,
            _ => self.value,
        };
        assert!(
            (0..SHORT_VALUE_LIMIT).contains(&payload),
            "{} {} does not fit a short location",
            internal,
            self.value
        );
        out.push(internal as u8 | ((payload as u8) << KIND_BITS));
    }

    /// Decode the location starting at `bytes[0]`, returning it and its
    /// encoded size. `None` for an unknown kind or a truncated large form.
    pub fn decode(bytes: &[u8]) -> Option<(Self, usize)> {
        let first = *bytes.first()?;
        let internal = DexRegisterLocationKind::from_u8(first & KIND_MASK)?;
        if internal.is_large() {
            let v = bytes.get(1..LARGE_LOCATION_SIZE)?;
            let value = i32::from_le_bytes([v[0], v[1], v[2], v[3]]);
            let location = DexRegisterLocation {
                kind: internal.external(),
                value,
            };
            return Some((location, LARGE_LOCATION_SIZE));
        }
        let payload = i32::from(first >> KIND_BITS);
        let value = match internal {
            DexRegisterLocationKind::InStack => payload * STACK_SLOT_SIZE,
            _ => payload,
        };
        Some((
            DexRegisterLocation {
                kind: internal,
                value,
            },
            SHORT_LOCATION_SIZE,
        ))
    }
}

impl Default for DexRegisterLocation {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Display for DexRegisterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DexRegisterLocationKind::None => write!(f, "none"),
            kind => write!(f, "{} ({})", kind, self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DexRegisterLocationKind as Kind;

    fn encoded(kind: Kind, value: i32) -> Vec<u8> {
        let mut out = Vec::new();
        DexRegisterLocation::new(kind, value).encode(&mut out);
        out
    }

    #[test]
    fn test_internal_kinds() {
        let loc = |kind, value| DexRegisterLocation::new(kind, value).internal_kind();
        assert_eq!(loc(Kind::InStack, 0), Kind::InStack);
        assert_eq!(loc(Kind::InStack, 124), Kind::InStack);
        assert_eq!(loc(Kind::InStack, 128), Kind::InStackLargeOffset);
        assert_eq!(loc(Kind::InStack, 6), Kind::InStackLargeOffset);
        assert_eq!(loc(Kind::Constant, 31), Kind::Constant);
        assert_eq!(loc(Kind::Constant, -2), Kind::ConstantLargeValue);
        assert_eq!(loc(Kind::InRegister, 18), Kind::InRegister);
        assert_eq!(DexRegisterLocation::none().internal_kind(), Kind::None);
    }

    #[test]
    fn test_short_and_large_forms() {
        assert_eq!(encoded(Kind::InStack, 8), vec![1 | (2 << 3)]);
        assert_eq!(encoded(Kind::InFpuRegister, 3), vec![3 | (3 << 3)]);
        assert_eq!(encoded(Kind::Constant, -2), vec![6, 0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(
            DexRegisterLocation::new(Kind::InStack, 4096).encoded_size(),
            LARGE_LOCATION_SIZE
        );
    }

    #[test]
    fn test_decode_restores_external_kind() {
        for (kind, value) in [
            (Kind::InStack, 0),
            (Kind::InStack, 1000),
            (Kind::Constant, -2),
            (Kind::Constant, 7),
            (Kind::InRegister, 31),
        ] {
            let bytes = encoded(kind, value);
            let (decoded, size) = DexRegisterLocation::decode(&bytes).unwrap();
            assert_eq!(decoded, DexRegisterLocation::new(kind, value));
            assert_eq!(size, bytes.len());
        }
        assert!(DexRegisterLocation::decode(&[7]).is_none());
        assert!(DexRegisterLocation::decode(&[6, 1]).is_none());
    }

    #[test]
    #[should_panic(expected = "not a machine register number")]
    fn test_register_number_past_short_form_is_rejected() {
        DexRegisterLocation::new(Kind::InRegister, 32);
    }

    #[test]
    #[should_panic(expected = "not a machine register number")]
    fn test_negative_fpu_register_is_rejected() {
        DexRegisterLocation::new(Kind::InFpuRegister, -1);
    }
}
