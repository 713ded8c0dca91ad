//! Dalvik opcodes as seen by the MIR
//!
//! Values match the dex instruction encoding. Extended MIR-only opcodes start at
//! `0x100` so they can never collide with a real instruction.

use std::fmt;

/// First opcode value reserved for MIR-only (pseudo) instructions
pub const MIR_OP_FIRST: u16 = 0x100;

/// MIR opcode
///
/// Covers the dex instructions the compiler pipeline handles plus the extended
/// `Phi` opcode introduced by SSA construction.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    // ===== Moves and results (0x00-0x0D) =====
    Nop = 0x00,
    Move = 0x01,
    MoveFrom16 = 0x02,
    Move16 = 0x03,
    MoveWide = 0x04,
    MoveWideFrom16 = 0x05,
    MoveWide16 = 0x06,
    MoveObject = 0x07,
    MoveObjectFrom16 = 0x08,
    MoveObject16 = 0x09,
    MoveResult = 0x0A,
    MoveResultWide = 0x0B,
    MoveResultObject = 0x0C,
    MoveException = 0x0D,

    // ===== Returns (0x0E-0x11) =====
    ReturnVoid = 0x0E,
    Return = 0x0F,
    ReturnWide = 0x10,
    ReturnObject = 0x11,

    // ===== Constants (0x12-0x1C) =====
    Const4 = 0x12,
    Const16 = 0x13,
    Const = 0x14,
    ConstHigh16 = 0x15,
    ConstWide16 = 0x16,
    ConstWide32 = 0x17,
    ConstWide = 0x18,
    ConstWideHigh16 = 0x19,
    ConstString = 0x1A,
    ConstStringJumbo = 0x1B,
    ConstClass = 0x1C,

    // ===== Object and type operations (0x1D-0x27) =====
    MonitorEnter = 0x1D,
    MonitorExit = 0x1E,
    CheckCast = 0x1F,
    InstanceOf = 0x20,
    ArrayLength = 0x21,
    NewInstance = 0x22,
    NewArray = 0x23,
    FilledNewArray = 0x24,
    FilledNewArrayRange = 0x25,
    FillArrayData = 0x26,
    Throw = 0x27,

    // ===== Control flow (0x28-0x2C) =====
    Goto = 0x28,
    Goto16 = 0x29,
    Goto32 = 0x2A,
    PackedSwitch = 0x2B,
    SparseSwitch = 0x2C,

    // ===== Comparisons (0x2D-0x31) =====
    CmplFloat = 0x2D,
    CmpgFloat = 0x2E,
    CmplDouble = 0x2F,
    CmpgDouble = 0x30,
    CmpLong = 0x31,

    // ===== Conditional branches (0x32-0x3D) =====
    IfEq = 0x32,
    IfNe = 0x33,
    IfLt = 0x34,
    IfGe = 0x35,
    IfGt = 0x36,
    IfLe = 0x37,
    IfEqz = 0x38,
    IfNez = 0x39,
    IfLtz = 0x3A,
    IfGez = 0x3B,
    IfGtz = 0x3C,
    IfLez = 0x3D,

    // ===== Array access (0x44-0x51) =====
    Aget = 0x44,
    AgetWide = 0x45,
    AgetObject = 0x46,
    AgetBoolean = 0x47,
    AgetByte = 0x48,
    AgetChar = 0x49,
    AgetShort = 0x4A,
    Aput = 0x4B,
    AputWide = 0x4C,
    AputObject = 0x4D,
    AputBoolean = 0x4E,
    AputByte = 0x4F,
    AputChar = 0x50,
    AputShort = 0x51,

    // ===== Instance fields (0x52-0x5F) =====
    Iget = 0x52,
    IgetWide = 0x53,
    IgetObject = 0x54,
    IgetBoolean = 0x55,
    IgetByte = 0x56,
    IgetChar = 0x57,
    IgetShort = 0x58,
    Iput = 0x59,
    IputWide = 0x5A,
    IputObject = 0x5B,
    IputBoolean = 0x5C,
    IputByte = 0x5D,
    IputChar = 0x5E,
    IputShort = 0x5F,

    // ===== Static fields (0x60-0x6D) =====
    Sget = 0x60,
    SgetWide = 0x61,
    SgetObject = 0x62,
    SgetBoolean = 0x63,
    SgetByte = 0x64,
    SgetChar = 0x65,
    SgetShort = 0x66,
    Sput = 0x67,
    SputWide = 0x68,
    SputObject = 0x69,
    SputBoolean = 0x6A,
    SputByte = 0x6B,
    SputChar = 0x6C,
    SputShort = 0x6D,

    // ===== Invokes (0x6E-0x78) =====
    InvokeVirtual = 0x6E,
    InvokeSuper = 0x6F,
    InvokeDirect = 0x70,
    InvokeStatic = 0x71,
    InvokeInterface = 0x72,
    InvokeVirtualRange = 0x74,
    InvokeSuperRange = 0x75,
    InvokeDirectRange = 0x76,
    InvokeStaticRange = 0x77,
    InvokeInterfaceRange = 0x78,

    // ===== Unary operations and conversions (0x7B-0x8F) =====
    NegInt = 0x7B,
    NotInt = 0x7C,
    NegLong = 0x7D,
    NotLong = 0x7E,
    NegFloat = 0x7F,
    NegDouble = 0x80,
    IntToLong = 0x81,
    IntToFloat = 0x82,
    IntToDouble = 0x83,
    LongToInt = 0x84,
    LongToFloat = 0x85,
    LongToDouble = 0x86,
    FloatToInt = 0x87,
    FloatToLong = 0x88,
    FloatToDouble = 0x89,
    DoubleToInt = 0x8A,
    DoubleToLong = 0x8B,
    DoubleToFloat = 0x8C,
    IntToByte = 0x8D,
    IntToChar = 0x8E,
    IntToShort = 0x8F,

    // ===== Binary operations (0x90-0xAF) =====
    AddInt = 0x90,
    SubInt = 0x91,
    MulInt = 0x92,
    DivInt = 0x93,
    RemInt = 0x94,
    AndInt = 0x95,
    OrInt = 0x96,
    XorInt = 0x97,
    ShlInt = 0x98,
    ShrInt = 0x99,
    UshrInt = 0x9A,
    AddLong = 0x9B,
    SubLong = 0x9C,
    MulLong = 0x9D,
    DivLong = 0x9E,
    RemLong = 0x9F,
    AndLong = 0xA0,
    OrLong = 0xA1,
    XorLong = 0xA2,
    ShlLong = 0xA3,
    ShrLong = 0xA4,
    UshrLong = 0xA5,
    AddFloat = 0xA6,
    SubFloat = 0xA7,
    MulFloat = 0xA8,
    DivFloat = 0xA9,
    RemFloat = 0xAA,
    AddDouble = 0xAB,
    SubDouble = 0xAC,
    MulDouble = 0xAD,
    DivDouble = 0xAE,
    RemDouble = 0xAF,

    // ===== Binary operations, two-address form (0xB0-0xCF) =====
    AddInt2Addr = 0xB0,
    SubInt2Addr = 0xB1,
    MulInt2Addr = 0xB2,
    DivInt2Addr = 0xB3,
    RemInt2Addr = 0xB4,
    AndInt2Addr = 0xB5,
    OrInt2Addr = 0xB6,
    XorInt2Addr = 0xB7,
    ShlInt2Addr = 0xB8,
    ShrInt2Addr = 0xB9,
    UshrInt2Addr = 0xBA,
    AddLong2Addr = 0xBB,
    SubLong2Addr = 0xBC,
    MulLong2Addr = 0xBD,
    DivLong2Addr = 0xBE,
    RemLong2Addr = 0xBF,
    AndLong2Addr = 0xC0,
    OrLong2Addr = 0xC1,
    XorLong2Addr = 0xC2,
    ShlLong2Addr = 0xC3,
    ShrLong2Addr = 0xC4,
    UshrLong2Addr = 0xC5,
    AddFloat2Addr = 0xC6,
    SubFloat2Addr = 0xC7,
    MulFloat2Addr = 0xC8,
    DivFloat2Addr = 0xC9,
    RemFloat2Addr = 0xCA,
    AddDouble2Addr = 0xCB,
    SubDouble2Addr = 0xCC,
    MulDouble2Addr = 0xCD,
    DivDouble2Addr = 0xCE,
    RemDouble2Addr = 0xCF,

    // ===== Binary operations with literal (0xD0-0xE2) =====
    AddIntLit16 = 0xD0,
    RsubIntLit16 = 0xD1,
    MulIntLit16 = 0xD2,
    DivIntLit16 = 0xD3,
    RemIntLit16 = 0xD4,
    AndIntLit16 = 0xD5,
    OrIntLit16 = 0xD6,
    XorIntLit16 = 0xD7,
    AddIntLit8 = 0xD8,
    RsubIntLit8 = 0xD9,
    MulIntLit8 = 0xDA,
    DivIntLit8 = 0xDB,
    RemIntLit8 = 0xDC,
    AndIntLit8 = 0xDD,
    OrIntLit8 = 0xDE,
    XorIntLit8 = 0xDF,
    ShlIntLit8 = 0xE0,
    ShrIntLit8 = 0xE1,
    UshrIntLit8 = 0xE2,

    // ===== Extended MIR opcodes =====
    /// SSA merge of one vreg's versions, one use per predecessor
    Phi = 0x100,
}

impl Opcode {
    /// Decode an opcode value
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x00 => Some(Self::Nop),
            0x01 => Some(Self::Move),
            0x02 => Some(Self::MoveFrom16),
            0x03 => Some(Self::Move16),
            0x04 => Some(Self::MoveWide),
            0x05 => Some(Self::MoveWideFrom16),
            0x06 => Some(Self::MoveWide16),
            0x07 => Some(Self::MoveObject),
            0x08 => Some(Self::MoveObjectFrom16),
            0x09 => Some(Self::MoveObject16),
            0x0A => Some(Self::MoveResult),
            0x0B => Some(Self::MoveResultWide),
            0x0C => Some(Self::MoveResultObject),
            0x0D => Some(Self::MoveException),
            0x0E => Some(Self::ReturnVoid),
            0x0F => Some(Self::Return),
            0x10 => Some(Self::ReturnWide),
            0x11 => Some(Self::ReturnObject),
            0x12 => Some(Self::Const4),
            0x13 => Some(Self::Const16),
            0x14 => Some(Self::Const),
            0x15 => Some(Self::ConstHigh16),
            0x16 => Some(Self::ConstWide16),
            0x17 => Some(Self::ConstWide32),
            0x18 => Some(Self::ConstWide),
            0x19 => Some(Self::ConstWideHigh16),
            0x1A => Some(Self::ConstString),
            0x1B => Some(Self::ConstStringJumbo),
            0x1C => Some(Self::ConstClass),
            0x1D => Some(Self::MonitorEnter),
            0x1E => Some(Self::MonitorExit),
            0x1F => Some(Self::CheckCast),
            0x20 => Some(Self::InstanceOf),
            0x21 => Some(Self::ArrayLength),
            0x22 => Some(Self::NewInstance),
            0x23 => Some(Self::NewArray),
            0x24 => Some(Self::FilledNewArray),
            0x25 => Some(Self::FilledNewArrayRange),
            0x26 => Some(Self::FillArrayData),
            0x27 => Some(Self::Throw),
            0x28 => Some(Self::Goto),
            0x29 => Some(Self::Goto16),
            0x2A => Some(Self::Goto32),
            0x2B => Some(Self::PackedSwitch),
            0x2C => Some(Self::SparseSwitch),
            0x2D => Some(Self::CmplFloat),
            0x2E => Some(Self::CmpgFloat),
            0x2F => Some(Self::CmplDouble),
            0x30 => Some(Self::CmpgDouble),
            0x31 => Some(Self::CmpLong),
            0x32 => Some(Self::IfEq),
            0x33 => Some(Self::IfNe),
            0x34 => Some(Self::IfLt),
            0x35 => Some(Self::IfGe),
            0x36 => Some(Self::IfGt),
            0x37 => Some(Self::IfLe),
            0x38 => Some(Self::IfEqz),
            0x39 => Some(Self::IfNez),
            0x3A => Some(Self::IfLtz),
            0x3B => Some(Self::IfGez),
            0x3C => Some(Self::IfGtz),
            0x3D => Some(Self::IfLez),
            0x44 => Some(Self::Aget),
            0x45 => Some(Self::AgetWide),
            0x46 => Some(Self::AgetObject),
            0x47 => Some(Self::AgetBoolean),
            0x48 => Some(Self::AgetByte),
            0x49 => Some(Self::AgetChar),
            0x4A => Some(Self::AgetShort),
            0x4B => Some(Self::Aput),
            0x4C => Some(Self::AputWide),
            0x4D => Some(Self::AputObject),
            0x4E => Some(Self::AputBoolean),
            0x4F => Some(Self::AputByte),
            0x50 => Some(Self::AputChar),
            0x51 => Some(Self::AputShort),
            0x52 => Some(Self::Iget),
            0x53 => Some(Self::IgetWide),
            0x54 => Some(Self::IgetObject),
            0x55 => Some(Self::IgetBoolean),
            0x56 => Some(Self::IgetByte),
            0x57 => Some(Self::IgetChar),
            0x58 => Some(Self::IgetShort),
            0x59 => Some(Self::Iput),
            0x5A => Some(Self::IputWide),
            0x5B => Some(Self::IputObject),
            0x5C => Some(Self::IputBoolean),
            0x5D => Some(Self::IputByte),
            0x5E => Some(Self::IputChar),
            0x5F => Some(Self::IputShort),
            0x60 => Some(Self::Sget),
            0x61 => Some(Self::SgetWide),
            0x62 => Some(Self::SgetObject),
            0x63 => Some(Self::SgetBoolean),
            0x64 => Some(Self::SgetByte),
            0x65 => Some(Self::SgetChar),
            0x66 => Some(Self::SgetShort),
            0x67 => Some(Self::Sput),
            0x68 => Some(Self::SputWide),
            0x69 => Some(Self::SputObject),
            0x6A => Some(Self::SputBoolean),
            0x6B => Some(Self::SputByte),
            0x6C => Some(Self::SputChar),
            0x6D => Some(Self::SputShort),
            0x6E => Some(Self::InvokeVirtual),
            0x6F => Some(Self::InvokeSuper),
            0x70 => Some(Self::InvokeDirect),
            0x71 => Some(Self::InvokeStatic),
            0x72 => Some(Self::InvokeInterface),
            0x74 => Some(Self::InvokeVirtualRange),
            0x75 => Some(Self::InvokeSuperRange),
            0x76 => Some(Self::InvokeDirectRange),
            0x77 => Some(Self::InvokeStaticRange),
            0x78 => Some(Self::InvokeInterfaceRange),
            0x7B => Some(Self::NegInt),
            0x7C => Some(Self::NotInt),
            0x7D => Some(Self::NegLong),
            0x7E => Some(Self::NotLong),
            0x7F => Some(Self::NegFloat),
            0x80 => Some(Self::NegDouble),
            0x81 => Some(Self::IntToLong),
            0x82 => Some(Self::IntToFloat),
            0x83 => Some(Self::IntToDouble),
            0x84 => Some(Self::LongToInt),
            0x85 => Some(Self::LongToFloat),
            0x86 => Some(Self::LongToDouble),
            0x87 => Some(Self::FloatToInt),
            0x88 => Some(Self::FloatToLong),
            0x89 => Some(Self::FloatToDouble),
            0x8A => Some(Self::DoubleToInt),
            0x8B => Some(Self::DoubleToLong),
            0x8C => Some(Self::DoubleToFloat),
            0x8D => Some(Self::IntToByte),
            0x8E => Some(Self::IntToChar),
            0x8F => Some(Self::IntToShort),
            0x90 => Some(Self::AddInt),
            0x91 => Some(Self::SubInt),
            0x92 => Some(Self::MulInt),
            0x93 => Some(Self::DivInt),
            0x94 => Some(Self::RemInt),
            0x95 => Some(Self::AndInt),
            0x96 => Some(Self::OrInt),
            0x97 => Some(Self::XorInt),
            0x98 => Some(Self::ShlInt),
            0x99 => Some(Self::ShrInt),
            0x9A => Some(Self::UshrInt),
            0x9B => Some(Self::AddLong),
            0x9C => Some(Self::SubLong),
            0x9D => Some(Self::MulLong),
            0x9E => Some(Self::DivLong),
            0x9F => Some(Self::RemLong),
            0xA0 => Some(Self::AndLong),
            0xA1 => Some(Self::OrLong),
            0xA2 => Some(Self::XorLong),
            0xA3 => Some(Self::ShlLong),
            0xA4 => Some(Self::ShrLong),
            0xA5 => Some(Self::UshrLong),
            0xA6 => Some(Self::AddFloat),
            0xA7 => Some(Self::SubFloat),
            0xA8 => Some(Self::MulFloat),
            0xA9 => Some(Self::DivFloat),
            0xAA => Some(Self::RemFloat),
            0xAB => Some(Self::AddDouble),
            0xAC => Some(Self::SubDouble),
            0xAD => Some(Self::MulDouble),
            0xAE => Some(Self::DivDouble),
            0xAF => Some(Self::RemDouble),
            0xB0 => Some(Self::AddInt2Addr),
            0xB1 => Some(Self::SubInt2Addr),
            0xB2 => Some(Self::MulInt2Addr),
            0xB3 => Some(Self::DivInt2Addr),
            0xB4 => Some(Self::RemInt2Addr),
            0xB5 => Some(Self::AndInt2Addr),
            0xB6 => Some(Self::OrInt2Addr),
            0xB7 => Some(Self::XorInt2Addr),
            0xB8 => Some(Self::ShlInt2Addr),
            0xB9 => Some(Self::ShrInt2Addr),
            0xBA => Some(Self::UshrInt2Addr),
            0xBB => Some(Self::AddLong2Addr),
            0xBC => Some(Self::SubLong2Addr),
            0xBD => Some(Self::MulLong2Addr),
            0xBE => Some(Self::DivLong2Addr),
            0xBF => Some(Self::RemLong2Addr),
            0xC0 => Some(Self::AndLong2Addr),
            0xC1 => Some(Self::OrLong2Addr),
            0xC2 => Some(Self::XorLong2Addr),
            0xC3 => Some(Self::ShlLong2Addr),
            0xC4 => Some(Self::ShrLong2Addr),
            0xC5 => Some(Self::UshrLong2Addr),
            0xC6 => Some(Self::AddFloat2Addr),
            0xC7 => Some(Self::SubFloat2Addr),
            0xC8 => Some(Self::MulFloat2Addr),
            0xC9 => Some(Self::DivFloat2Addr),
            0xCA => Some(Self::RemFloat2Addr),
            0xCB => Some(Self::AddDouble2Addr),
            0xCC => Some(Self::SubDouble2Addr),
            0xCD => Some(Self::MulDouble2Addr),
            0xCE => Some(Self::DivDouble2Addr),
            0xCF => Some(Self::RemDouble2Addr),
            0xD0 => Some(Self::AddIntLit16),
            0xD1 => Some(Self::RsubIntLit16),
            0xD2 => Some(Self::MulIntLit16),
            0xD3 => Some(Self::DivIntLit16),
            0xD4 => Some(Self::RemIntLit16),
            0xD5 => Some(Self::AndIntLit16),
            0xD6 => Some(Self::OrIntLit16),
            0xD7 => Some(Self::XorIntLit16),
            0xD8 => Some(Self::AddIntLit8),
            0xD9 => Some(Self::RsubIntLit8),
            0xDA => Some(Self::MulIntLit8),
            0xDB => Some(Self::DivIntLit8),
            0xDC => Some(Self::RemIntLit8),
            0xDD => Some(Self::AndIntLit8),
            0xDE => Some(Self::OrIntLit8),
            0xDF => Some(Self::XorIntLit8),
            0xE0 => Some(Self::ShlIntLit8),
            0xE1 => Some(Self::ShrIntLit8),
            0xE2 => Some(Self::UshrIntLit8),
            0x100 => Some(Self::Phi),
            _ => None,
        }
    }

    /// Disassembly mnemonic
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Move => "move",
            Self::MoveFrom16 => "move/from16",
            Self::Move16 => "move/16",
            Self::MoveWide => "move-wide",
            Self::MoveWideFrom16 => "move-wide/from16",
            Self::MoveWide16 => "move-wide/16",
            Self::MoveObject => "move-object",
            Self::MoveObjectFrom16 => "move-object/from16",
            Self::MoveObject16 => "move-object/16",
            Self::MoveResult => "move-result",
            Self::MoveResultWide => "move-result-wide",
            Self::MoveResultObject => "move-result-object",
            Self::MoveException => "move-exception",
            Self::ReturnVoid => "return-void",
            Self::Return => "return",
            Self::ReturnWide => "return-wide",
            Self::ReturnObject => "return-object",
            Self::Const4 => "const/4",
            Self::Const16 => "const/16",
            Self::Const => "const",
            Self::ConstHigh16 => "const/high16",
            Self::ConstWide16 => "const-wide/16",
            Self::ConstWide32 => "const-wide/32",
            Self::ConstWide => "const-wide",
            Self::ConstWideHigh16 => "const-wide/high16",
            Self::ConstString => "const-string",
            Self::ConstStringJumbo => "const-string/jumbo",
            Self::ConstClass => "const-class",
            Self::MonitorEnter => "monitor-enter",
            Self::MonitorExit => "monitor-exit",
            Self::CheckCast => "check-cast",
            Self::InstanceOf => "instance-of",
            Self::ArrayLength => "array-length",
            Self::NewInstance => "new-instance",
            Self::NewArray => "new-array",
            Self::FilledNewArray => "filled-new-array",
            Self::FilledNewArrayRange => "filled-new-array/range",
            Self::FillArrayData => "fill-array-data",
            Self::Throw => "throw",
            Self::Goto => "goto",
            Self::Goto16 => "goto/16",
            Self::Goto32 => "goto/32",
            Self::PackedSwitch => "packed-switch",
            Self::SparseSwitch => "sparse-switch",
            Self::CmplFloat => "cmpl-float",
            Self::CmpgFloat => "cmpg-float",
            Self::CmplDouble => "cmpl-double",
            Self::CmpgDouble => "cmpg-double",
            Self::CmpLong => "cmp-long",
            Self::IfEq => "if-eq",
            Self::IfNe => "if-ne",
            Self::IfLt => "if-lt",
            Self::IfGe => "if-ge",
            Self::IfGt => "if-gt",
            Self::IfLe => "if-le",
            Self::IfEqz => "if-eqz",
            Self::IfNez => "if-nez",
            Self::IfLtz => "if-ltz",
            Self::IfGez => "if-gez",
            Self::IfGtz => "if-gtz",
            Self::IfLez => "if-lez",
            Self::Aget => "aget",
            Self::AgetWide => "aget-wide",
            Self::AgetObject => "aget-object",
            Self::AgetBoolean => "aget-boolean",
            Self::AgetByte => "aget-byte",
            Self::AgetChar => "aget-char",
            Self::AgetShort => "aget-short",
            Self::Aput => "aput",
            Self::AputWide => "aput-wide",
            Self::AputObject => "aput-object",
            Self::AputBoolean => "aput-boolean",
            Self::AputByte => "aput-byte",
            Self::AputChar => "aput-char",
            Self::AputShort => "aput-short",
            Self::Iget => "iget",
            Self::IgetWide => "iget-wide",
            Self::IgetObject => "iget-object",
            Self::IgetBoolean => "iget-boolean",
            Self::IgetByte => "iget-byte",
            Self::IgetChar => "iget-char",
            Self::IgetShort => "iget-short",
            Self::Iput => "iput",
            Self::IputWide => "iput-wide",
            Self::IputObject => "iput-object",
            Self::IputBoolean => "iput-boolean",
            Self::IputByte => "iput-byte",
            Self::IputChar => "iput-char",
            Self::IputShort => "iput-short",
            Self::Sget => "sget",
            Self::SgetWide => "sget-wide",
            Self::SgetObject => "sget-object",
            Self::SgetBoolean => "sget-boolean",
            Self::SgetByte => "sget-byte",
            Self::SgetChar => "sget-char",
            Self::SgetShort => "sget-short",
            Self::Sput => "sput",
            Self::SputWide => "sput-wide",
            Self::SputObject => "sput-object",
            Self::SputBoolean => "sput-boolean",
            Self::SputByte => "sput-byte",
            Self::SputChar => "sput-char",
            Self::SputShort => "sput-short",
            Self::InvokeVirtual => "invoke-virtual",
            Self::InvokeSuper => "invoke-super",
            Self::InvokeDirect => "invoke-direct",
            Self::InvokeStatic => "invoke-static",
            Self::InvokeInterface => "invoke-interface",
            Self::InvokeVirtualRange => "invoke-virtual/range",
            Self::InvokeSuperRange => "invoke-super/range",
            Self::InvokeDirectRange => "invoke-direct/range",
            Self::InvokeStaticRange => "invoke-static/range",
            Self::InvokeInterfaceRange => "invoke-interface/range",
            Self::NegInt => "neg-int",
            Self::NotInt => "not-int",
            Self::NegLong => "neg-long",
            Self::NotLong => "not-long",
            Self::NegFloat => "neg-float",
            Self::NegDouble => "neg-double",
            Self::IntToLong => "int-to-long",
            Self::IntToFloat => "int-to-float",
            Self::IntToDouble => "int-to-double",
            Self::LongToInt => "long-to-int",
            Self::LongToFloat => "long-to-float",
            Self::LongToDouble => "long-to-double",
            Self::FloatToInt => "float-to-int",
            Self::FloatToLong => "float-to-long",
            Self::FloatToDouble => "float-to-double",
            Self::DoubleToInt => "double-to-int",
            Self::DoubleToLong => "double-to-long",
            Self::DoubleToFloat => "double-to-float",
            Self::IntToByte => "int-to-byte",
            Self::IntToChar => "int-to-char",
            Self::IntToShort => "int-to-short",
            Self::AddInt => "add-int",
            Self::SubInt => "sub-int",
            Self::MulInt => "mul-int",
            Self::DivInt => "div-int",
            Self::RemInt => "rem-int",
            Self::AndInt => "and-int",
            Self::OrInt => "or-int",
            Self::XorInt => "xor-int",
            Self::ShlInt => "shl-int",
            Self::ShrInt => "shr-int",
            Self::UshrInt => "ushr-int",
            Self::AddLong => "add-long",
            Self::SubLong => "sub-long",
            Self::MulLong => "mul-long",
            Self::DivLong => "div-long",
            Self::RemLong => "rem-long",
            Self::AndLong => "and-long",
            Self::OrLong => "or-long",
            Self::XorLong => "xor-long",
            Self::ShlLong => "shl-long",
            Self::ShrLong => "shr-long",
            Self::UshrLong => "ushr-long",
            Self::AddFloat => "add-float",
            Self::SubFloat => "sub-float",
            Self::MulFloat => "mul-float",
            Self::DivFloat => "div-float",
            Self::RemFloat => "rem-float",
            Self::AddDouble => "add-double",
            Self::SubDouble => "sub-double",
            Self::MulDouble => "mul-double",
            Self::DivDouble => "div-double",
            Self::RemDouble => "rem-double",
            Self::AddInt2Addr => "add-int/2addr",
            Self::SubInt2Addr => "sub-int/2addr",
            Self::MulInt2Addr => "mul-int/2addr",
            Self::DivInt2Addr => "div-int/2addr",
            Self::RemInt2Addr => "rem-int/2addr",
            Self::AndInt2Addr => "and-int/2addr",
            Self::OrInt2Addr => "or-int/2addr",
            Self::XorInt2Addr => "xor-int/2addr",
            Self::ShlInt2Addr => "shl-int/2addr",
            Self::ShrInt2Addr => "shr-int/2addr",
            Self::UshrInt2Addr => "ushr-int/2addr",
            Self::AddLong2Addr => "add-long/2addr",
            Self::SubLong2Addr => "sub-long/2addr",
            Self::MulLong2Addr => "mul-long/2addr",
            Self::DivLong2Addr => "div-long/2addr",
            Self::RemLong2Addr => "rem-long/2addr",
            Self::AndLong2Addr => "and-long/2addr",
            Self::OrLong2Addr => "or-long/2addr",
            Self::XorLong2Addr => "xor-long/2addr",
            Self::ShlLong2Addr => "shl-long/2addr",
            Self::ShrLong2Addr => "shr-long/2addr",
            Self::UshrLong2Addr => "ushr-long/2addr",
            Self::AddFloat2Addr => "add-float/2addr",
            Self::SubFloat2Addr => "sub-float/2addr",
            Self::MulFloat2Addr => "mul-float/2addr",
            Self::DivFloat2Addr => "div-float/2addr",
            Self::RemFloat2Addr => "rem-float/2addr",
            Self::AddDouble2Addr => "add-double/2addr",
            Self::SubDouble2Addr => "sub-double/2addr",
            Self::MulDouble2Addr => "mul-double/2addr",
            Self::DivDouble2Addr => "div-double/2addr",
            Self::RemDouble2Addr => "rem-double/2addr",
            Self::AddIntLit16 => "add-int/lit16",
            Self::RsubIntLit16 => "rsub-int",
            Self::MulIntLit16 => "mul-int/lit16",
            Self::DivIntLit16 => "div-int/lit16",
            Self::RemIntLit16 => "rem-int/lit16",
            Self::AndIntLit16 => "and-int/lit16",
            Self::OrIntLit16 => "or-int/lit16",
            Self::XorIntLit16 => "xor-int/lit16",
            Self::AddIntLit8 => "add-int/lit8",
            Self::RsubIntLit8 => "rsub-int/lit8",
            Self::MulIntLit8 => "mul-int/lit8",
            Self::DivIntLit8 => "div-int/lit8",
            Self::RemIntLit8 => "rem-int/lit8",
            Self::AndIntLit8 => "and-int/lit8",
            Self::OrIntLit8 => "or-int/lit8",
            Self::XorIntLit8 => "xor-int/lit8",
            Self::ShlIntLit8 => "shl-int/lit8",
            Self::ShrIntLit8 => "shr-int/lit8",
            Self::UshrIntLit8 => "ushr-int/lit8",
            Self::Phi => "Phi",
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// MIR-only opcodes that never correspond to a dex instruction
    pub fn is_pseudo(self) -> bool {
        self.as_u16() >= MIR_OP_FIRST
    }

    pub fn is_invoke(self) -> bool {
        matches!(
            self,
            Self::InvokeVirtual
                | Self::InvokeSuper
                | Self::InvokeDirect
                | Self::InvokeStatic
                | Self::InvokeInterface
                | Self::InvokeVirtualRange
                | Self::InvokeSuperRange
                | Self::InvokeDirectRange
                | Self::InvokeStaticRange
                | Self::InvokeInterfaceRange
        )
    }

    pub fn is_move_result(self) -> bool {
        matches!(
            self,
            Self::MoveResult | Self::MoveResultWide | Self::MoveResultObject
        )
    }

    /// `const*` family, narrow and wide
    pub fn is_const(self) -> bool {
        (Self::Const4.as_u16()..=Self::ConstWideHigh16.as_u16()).contains(&self.as_u16())
    }

    /// `move`, `move-wide` and `move-object` in all register-width forms
    pub fn is_move(self) -> bool {
        (Self::Move.as_u16()..=Self::MoveObject16.as_u16()).contains(&self.as_u16())
    }

    pub fn is_move_object(self) -> bool {
        matches!(
            self,
            Self::MoveObject | Self::MoveObjectFrom16 | Self::MoveObject16
        )
    }

    pub fn is_return_value(self) -> bool {
        matches!(self, Self::Return | Self::ReturnWide | Self::ReturnObject)
    }

    /// Instructions that end a basic block without falling through
    pub fn is_unconditional_branch(self) -> bool {
        matches!(
            self,
            Self::Goto
                | Self::Goto16
                | Self::Goto32
                | Self::ReturnVoid
                | Self::Return
                | Self::ReturnWide
                | Self::ReturnObject
                | Self::Throw
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_values_round_trip() {
        for value in 0u16..=0x1ff {
            if let Some(op) = Opcode::from_u16(value) {
                assert_eq!(op.as_u16(), value, "{}", op);
            }
        }
        assert_eq!(Opcode::from_u16(0x3e), None);
        assert_eq!(Opcode::from_u16(0x1f), Some(Opcode::CheckCast));
    }

    #[test]
    fn test_opcode_classification() {
        assert!(Opcode::Phi.is_pseudo());
        assert!(!Opcode::Nop.is_pseudo());
        assert!(Opcode::InvokeStaticRange.is_invoke());
        assert!(Opcode::ConstWideHigh16.is_const());
        assert!(!Opcode::ConstString.is_const());
        assert!(Opcode::MoveObject16.is_move());
        assert!(!Opcode::MoveResult.is_move());
        assert_eq!(Opcode::UshrIntLit8.name(), "ushr-int/lit8");
        assert_eq!(Opcode::RsubIntLit16.to_string(), "rsub-int");
    }
}
