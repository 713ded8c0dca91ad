//! Per-opcode operand shape table
//!
//! For every opcode this records which operand positions are SSA defs and uses,
//! which of them are wide, and which register class (fp/core/ref) the opcode
//! itself forces on them. Type inference reads nothing else about an opcode's
//! semantics.

use bitflags::bitflags;

use super::opcode::Opcode;

bitflags! {
    /// Operand shape and typing attributes of an opcode
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DataFlowAttrs: u64 {
        /// vA is defined
        const DA = 1 << 0;
        /// vA is used
        const UA = 1 << 1;
        /// vB is used
        const UB = 1 << 2;
        /// vC is used
        const UC = 1 << 3;
        const A_WIDE = 1 << 4;
        const B_WIDE = 1 << 5;
        const C_WIDE = 1 << 6;
        /// Arguments are a register list (35c format)
        const FORMAT_35C = 1 << 7;
        /// Arguments are a register range (3rc format)
        const FORMAT_3RC = 1 << 8;
        const NULL_CHK_A = 1 << 9;
        const NULL_CHK_B = 1 << 10;
        /// Null check on the first argument of an invoke
        const NULL_CHK_OUT0 = 1 << 11;
        const NON_NULL_DST = 1 << 12;
        /// Result is delivered to a following move-result and is never null
        const NON_NULL_RET = 1 << 13;
        /// Null-ness of the single use transfers to the def
        const NULL_TRANSFER_0 = 1 << 14;
        /// Null-ness of all uses merges into the def (phi)
        const NULL_TRANSFER_N = 1 << 15;
        const RANGE_CHK_B = 1 << 16;
        const RANGE_CHK_C = 1 << 17;
        const FP_A = 1 << 18;
        const FP_B = 1 << 19;
        const FP_C = 1 << 20;
        const CORE_A = 1 << 21;
        const CORE_B = 1 << 22;
        const CORE_C = 1 << 23;
        const REF_A = 1 << 24;
        const REF_B = 1 << 25;
        const REF_C = 1 << 26;
        /// Uses the method pointer (needs resolution)
        const UMS = 1 << 27;
        const IFIELD = 1 << 28;
        const SFIELD = 1 << 29;
        const IS_MOVE = 1 << 30;
        const SETS_CONST = 1 << 31;
        const CHK_CAST = 1 << 32;
        /// Both operands must have the same register class
        const SAME_TYPE_AB = 1 << 33;

        const HAS_RANGE_CHKS = Self::RANGE_CHK_B.bits() | Self::RANGE_CHK_C.bits();
        const HAS_DEFS = Self::DA.bits();
        const HAS_USES = Self::UA.bits() | Self::UB.bits() | Self::UC.bits();
    }
}

type Df = DataFlowAttrs;

const fn df(bits: &[Df]) -> Df {
    let mut acc = 0u64;
    let mut i = 0;
    while i < bits.len() {
        acc |= bits[i].bits();
        i += 1;
    }
    Df::from_bits_retain(acc)
}

const UNOP_CORE: Df = df(&[Df::DA, Df::UB, Df::CORE_A, Df::CORE_B]);
const UNOP_WIDE_CORE: Df = df(&[Df::DA, Df::A_WIDE, Df::UB, Df::B_WIDE, Df::CORE_A, Df::CORE_B]);
const BINOP_INT: Df = df(&[Df::DA, Df::UB, Df::UC, Df::CORE_A, Df::CORE_B, Df::CORE_C]);
const BINOP_LONG: Df = df(&[
    Df::DA, Df::A_WIDE, Df::UB, Df::B_WIDE, Df::UC, Df::C_WIDE, Df::CORE_A, Df::CORE_B, Df::CORE_C,
]);
const SHIFT_LONG: Df = df(&[
    Df::DA, Df::A_WIDE, Df::UB, Df::B_WIDE, Df::UC, Df::CORE_A, Df::CORE_B, Df::CORE_C,
]);
const BINOP_FLOAT: Df = df(&[Df::DA, Df::UB, Df::UC, Df::FP_A, Df::FP_B, Df::FP_C]);
const BINOP_DOUBLE: Df = df(&[
    Df::DA, Df::A_WIDE, Df::UB, Df::B_WIDE, Df::UC, Df::C_WIDE, Df::FP_A, Df::FP_B, Df::FP_C,
]);
const BINOP_INT_2ADDR: Df = df(&[Df::DA, Df::UA, Df::UB, Df::CORE_A, Df::CORE_B]);
const BINOP_LONG_2ADDR: Df = df(&[
    Df::DA, Df::A_WIDE, Df::UA, Df::UB, Df::B_WIDE, Df::CORE_A, Df::CORE_B,
]);
const SHIFT_LONG_2ADDR: Df = df(&[Df::DA, Df::A_WIDE, Df::UA, Df::UB, Df::CORE_A, Df::CORE_B]);
const BINOP_FLOAT_2ADDR: Df = df(&[Df::DA, Df::UA, Df::UB, Df::FP_A, Df::FP_B]);
const BINOP_DOUBLE_2ADDR: Df = df(&[Df::DA, Df::A_WIDE, Df::UA, Df::UB, Df::B_WIDE, Df::FP_A, Df::FP_B]);
const ARRAY_GET: Df = df(&[
    Df::DA, Df::UB, Df::UC, Df::NULL_CHK_B, Df::RANGE_CHK_C, Df::REF_B, Df::CORE_C,
]);
const ARRAY_PUT: Df = df(&[
    Df::UA, Df::UB, Df::UC, Df::NULL_CHK_B, Df::RANGE_CHK_C, Df::REF_B, Df::CORE_C,
]);
const INSTANCE_GET: Df = df(&[Df::DA, Df::UB, Df::NULL_CHK_B, Df::REF_B, Df::IFIELD]);
const INSTANCE_PUT: Df = df(&[Df::UA, Df::UB, Df::NULL_CHK_B, Df::REF_B, Df::IFIELD]);
const STATIC_GET: Df = df(&[Df::DA, Df::SFIELD, Df::UMS]);
const STATIC_PUT: Df = df(&[Df::UA, Df::SFIELD, Df::UMS]);

impl Opcode {
    /// Operand shape of this opcode
    pub fn data_flow_attrs(self) -> DataFlowAttrs {
        use Opcode::*;
        match self {
            Nop | ReturnVoid | Goto | Goto16 | Goto32 => Df::empty(),

            Move | MoveFrom16 | Move16 => Df::DA | Df::UB | Df::IS_MOVE,
            MoveWide | MoveWideFrom16 | MoveWide16 => {
                Df::DA | Df::A_WIDE | Df::UB | Df::B_WIDE | Df::IS_MOVE
            }
            MoveObject | MoveObjectFrom16 | MoveObject16 => {
                Df::DA | Df::UB | Df::NULL_TRANSFER_0 | Df::IS_MOVE | Df::REF_A | Df::REF_B
            }
            MoveResult => Df::DA,
            MoveResultWide => Df::DA | Df::A_WIDE,
            MoveResultObject => Df::DA | Df::REF_A,
            MoveException => Df::DA | Df::REF_A | Df::NON_NULL_DST,

            Return => Df::UA,
            ReturnWide => Df::UA | Df::A_WIDE,
            ReturnObject => Df::UA | Df::REF_A,

            Const4 | Const16 | Const | ConstHigh16 => Df::DA | Df::SETS_CONST,
            ConstWide16 | ConstWide32 | ConstWide | ConstWideHigh16 => {
                Df::DA | Df::A_WIDE | Df::SETS_CONST
            }
            ConstString | ConstStringJumbo | ConstClass => Df::DA | Df::REF_A | Df::NON_NULL_DST,

            MonitorEnter | MonitorExit => Df::UA | Df::NULL_CHK_A | Df::REF_A,
            CheckCast => Df::UA | Df::REF_A | Df::CHK_CAST | Df::UMS,
            InstanceOf => Df::DA | Df::UB | Df::CORE_A | Df::REF_B | Df::UMS,
            ArrayLength => Df::DA | Df::UB | Df::NULL_CHK_B | Df::CORE_A | Df::REF_B,
            NewInstance => Df::DA | Df::NON_NULL_DST | Df::REF_A | Df::UMS,
            NewArray => Df::DA | Df::UB | Df::NON_NULL_DST | Df::REF_A | Df::CORE_B | Df::UMS,
            FilledNewArray => Df::FORMAT_35C | Df::NON_NULL_RET | Df::UMS,
            FilledNewArrayRange => Df::FORMAT_3RC | Df::NON_NULL_RET | Df::UMS,
            FillArrayData => Df::UA | Df::REF_A | Df::UMS,
            Throw => Df::UA | Df::REF_A | Df::UMS,

            PackedSwitch | SparseSwitch => Df::UA | Df::CORE_A,

            CmplFloat | CmpgFloat => Df::DA | Df::UB | Df::UC | Df::FP_B | Df::FP_C | Df::CORE_A,
            CmplDouble | CmpgDouble => {
                Df::DA
                    | Df::UB
                    | Df::B_WIDE
                    | Df::UC
                    | Df::C_WIDE
                    | Df::FP_B
                    | Df::FP_C
                    | Df::CORE_A
            }
            CmpLong => BINOP_LONG.difference(Df::A_WIDE),

            IfEq | IfNe => Df::UA | Df::UB | Df::SAME_TYPE_AB,
            IfLt | IfGe | IfGt | IfLe => Df::UA | Df::UB | Df::CORE_A | Df::CORE_B,
            IfEqz | IfNez => Df::UA,
            IfLtz | IfGez | IfGtz | IfLez => Df::UA | Df::CORE_A,

            Aget => ARRAY_GET,
            AgetWide => ARRAY_GET | Df::A_WIDE,
            AgetObject => ARRAY_GET | Df::REF_A,
            AgetBoolean | AgetByte | AgetChar | AgetShort => ARRAY_GET | Df::CORE_A,
            Aput => ARRAY_PUT,
            AputWide => ARRAY_PUT | Df::A_WIDE,
            AputObject => ARRAY_PUT | Df::REF_A,
            AputBoolean | AputByte | AputChar | AputShort => ARRAY_PUT | Df::CORE_A,

            Iget => INSTANCE_GET,
            IgetWide => INSTANCE_GET | Df::A_WIDE,
            IgetObject => INSTANCE_GET | Df::REF_A,
            IgetBoolean | IgetByte | IgetChar | IgetShort => INSTANCE_GET | Df::CORE_A,
            Iput => INSTANCE_PUT,
            IputWide => INSTANCE_PUT | Df::A_WIDE,
            IputObject => INSTANCE_PUT | Df::REF_A,
            IputBoolean | IputByte | IputChar | IputShort => INSTANCE_PUT | Df::CORE_A,

            Sget => STATIC_GET,
            SgetWide => STATIC_GET | Df::A_WIDE,
            SgetObject => STATIC_GET | Df::REF_A,
            SgetBoolean | SgetByte | SgetChar | SgetShort => STATIC_GET | Df::CORE_A,
            Sput => STATIC_PUT,
            SputWide => STATIC_PUT | Df::A_WIDE,
            SputObject => STATIC_PUT | Df::REF_A,
            SputBoolean | SputByte | SputChar | SputShort => STATIC_PUT | Df::CORE_A,

            InvokeVirtual | InvokeSuper | InvokeDirect | InvokeInterface => {
                Df::FORMAT_35C | Df::NULL_CHK_OUT0 | Df::UMS
            }
            InvokeStatic => Df::FORMAT_35C | Df::UMS,
            InvokeVirtualRange | InvokeSuperRange | InvokeDirectRange | InvokeInterfaceRange => {
                Df::FORMAT_3RC | Df::NULL_CHK_OUT0 | Df::UMS
            }
            InvokeStaticRange => Df::FORMAT_3RC | Df::UMS,

            NegInt | NotInt | IntToByte | IntToChar | IntToShort => UNOP_CORE,
            NegLong | NotLong => UNOP_WIDE_CORE,
            NegFloat => Df::DA | Df::UB | Df::FP_A | Df::FP_B,
            NegDouble => Df::DA | Df::A_WIDE | Df::UB | Df::B_WIDE | Df::FP_A | Df::FP_B,
            IntToLong => Df::DA | Df::A_WIDE | Df::UB | Df::CORE_A | Df::CORE_B,
            IntToFloat => Df::DA | Df::UB | Df::FP_A | Df::CORE_B,
            IntToDouble => Df::DA | Df::A_WIDE | Df::UB | Df::FP_A | Df::CORE_B,
            LongToInt => Df::DA | Df::UB | Df::B_WIDE | Df::CORE_A | Df::CORE_B,
            LongToFloat => Df::DA | Df::UB | Df::B_WIDE | Df::FP_A | Df::CORE_B,
            LongToDouble => Df::DA | Df::A_WIDE | Df::UB | Df::B_WIDE | Df::FP_A | Df::CORE_B,
            FloatToInt => Df::DA | Df::UB | Df::FP_B | Df::CORE_A,
            FloatToLong => Df::DA | Df::A_WIDE | Df::UB | Df::FP_B | Df::CORE_A,
            FloatToDouble => Df::DA | Df::A_WIDE | Df::UB | Df::FP_A | Df::FP_B,
            DoubleToInt => Df::DA | Df::UB | Df::B_WIDE | Df::FP_B | Df::CORE_A,
            DoubleToLong => Df::DA | Df::A_WIDE | Df::UB | Df::B_WIDE | Df::FP_B | Df::CORE_A,
            DoubleToFloat => Df::DA | Df::UB | Df::B_WIDE | Df::FP_A | Df::FP_B,

            AddInt | SubInt | MulInt | DivInt | RemInt | AndInt | OrInt | XorInt | ShlInt
            | ShrInt | UshrInt => BINOP_INT,
            AddLong | SubLong | MulLong | DivLong | RemLong | AndLong | OrLong | XorLong => {
                BINOP_LONG
            }
            ShlLong | ShrLong | UshrLong => SHIFT_LONG,
            AddFloat | SubFloat | MulFloat | DivFloat | RemFloat => BINOP_FLOAT,
            AddDouble | SubDouble | MulDouble | DivDouble | RemDouble => BINOP_DOUBLE,

            AddInt2Addr | SubInt2Addr | MulInt2Addr | DivInt2Addr | RemInt2Addr | AndInt2Addr
            | OrInt2Addr | XorInt2Addr | ShlInt2Addr | ShrInt2Addr | UshrInt2Addr => {
                BINOP_INT_2ADDR
            }
            AddLong2Addr | SubLong2Addr | MulLong2Addr | DivLong2Addr | RemLong2Addr
            | AndLong2Addr | OrLong2Addr | XorLong2Addr => BINOP_LONG_2ADDR,
            ShlLong2Addr | ShrLong2Addr | UshrLong2Addr => SHIFT_LONG_2ADDR,
            AddFloat2Addr | SubFloat2Addr | MulFloat2Addr | DivFloat2Addr | RemFloat2Addr => {
                BINOP_FLOAT_2ADDR
            }
            AddDouble2Addr | SubDouble2Addr | MulDouble2Addr | DivDouble2Addr
            | RemDouble2Addr => BINOP_DOUBLE_2ADDR,

            AddIntLit16 | RsubIntLit16 | MulIntLit16 | DivIntLit16 | RemIntLit16 | AndIntLit16
            | OrIntLit16 | XorIntLit16 | AddIntLit8 | RsubIntLit8 | MulIntLit8 | DivIntLit8
            | RemIntLit8 | AndIntLit8 | OrIntLit8 | XorIntLit8 | ShlIntLit8 | ShrIntLit8
            | UshrIntLit8 => UNOP_CORE,

            Phi => Df::DA | Df::NULL_TRANSFER_N,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_operands_have_matching_use_or_def() {
        for value in 0u16..=0x1ff {
            let Some(op) = Opcode::from_u16(value) else { continue };
            let attrs = op.data_flow_attrs();
            if attrs.contains(Df::A_WIDE) {
                assert!(attrs.intersects(Df::DA | Df::UA), "{}", op);
            }
            if attrs.contains(Df::B_WIDE) {
                assert!(attrs.contains(Df::UB), "{}", op);
            }
            if attrs.contains(Df::C_WIDE) {
                assert!(attrs.contains(Df::UC), "{}", op);
            }
        }
    }

    #[test]
    fn test_register_class_attrs() {
        assert!(Opcode::AddDouble.data_flow_attrs().contains(Df::FP_A | Df::A_WIDE));
        assert!(Opcode::AgetObject.data_flow_attrs().contains(Df::REF_A | Df::REF_B));
        assert!(Opcode::AputWide.data_flow_attrs().intersects(Df::HAS_RANGE_CHKS));
        assert!(Opcode::CmpLong.data_flow_attrs().contains(Df::B_WIDE | Df::C_WIDE));
        assert!(!Opcode::CmpLong.data_flow_attrs().contains(Df::A_WIDE));
        assert_eq!(
            Opcode::Phi.data_flow_attrs(),
            Df::DA | Df::NULL_TRANSFER_N
        );
    }

    #[test]
    fn test_field_accesses_are_flagged() {
        assert!(Opcode::IgetWide.data_flow_attrs().contains(Df::IFIELD));
        assert!(Opcode::SputObject.data_flow_attrs().contains(Df::SFIELD | Df::REF_A));
        assert!(Opcode::InvokeStatic.data_flow_attrs().contains(Df::FORMAT_35C));
        assert!(!Opcode::InvokeStatic.data_flow_attrs().contains(Df::NULL_CHK_OUT0));
    }
}
