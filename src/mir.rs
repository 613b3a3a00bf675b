//! The MIR consumed by the code generator.
//!
//! This module defines the product of the bytecode front end: a [Method] made of basic blocks of
//! [MirInst]s over numbered virtual registers. The conventions mirror the bytecode they derive
//! from:
//!
//!   * Virtual registers (vregs) are word sized. A 64-bit value occupies the adjacent pair
//!     `(v, v+1)`; [Method::wide_vregs] has a bit set for the *low* half of each pair.
//!   * The method's incoming arguments occupy the highest-numbered vregs: vreg `num_vregs -
//!     num_ins + i` holds argument `i`.
//!   * A `MoveResult`/`MoveResultWide` must directly follow the `Invoke` whose result it consumes.
//!   * Switch and fill-array-data payloads are raw `u16` units in [Method::data], referenced by
//!     unit offset.
//!
//! Constant-pool references (field and method indices) are resolved through a caller-supplied
//! [ConstResolver]; the code generator never sees the pool itself.

use index_vec::IndexVec;
use smallvec::SmallVec;
use vob::Vob;

index_vec::define_index_type! {
    /// A virtual register number.
    pub struct VReg = u16;
}

impl VReg {
    /// The maximum representable [VReg].
    pub const MAX: VReg = VReg::from_raw_unchecked(u16::MAX);

    /// The high half of the wide pair whose low half is `self`.
    pub fn pair_hi(self) -> VReg {
        VReg::from_usize(self.index() + 1)
    }
}

index_vec::define_index_type! {
    pub struct BBlockIdx = u16;
}

/// A comparison condition. `Hs`/`Lo` are the unsigned orderings, used by the generator for range
/// checks; front ends only produce the signed ones.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
    /// Unsigned `>=`.
    Hs,
    /// Unsigned `<`.
    Lo,
}

impl Cond {
    /// The condition that branches in exactly the opposite cases.
    pub fn negate(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Lt => Cond::Ge,
            Cond::Ge => Cond::Lt,
            Cond::Gt => Cond::Le,
            Cond::Le => Cond::Gt,
            Cond::Hs => Cond::Lo,
            Cond::Lo => Cond::Hs,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BinKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UnKind {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FpBinKind {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InvokeKind {
    Static,
    Direct,
    Virtual,
    Interface,
}

/// Methods the generator may expand inline instead of calling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Intrinsic {
    /// `Math.abs(int)`: fully inline.
    AbsInt,
    /// `String.compareTo`: inline reference-equality fast path, out-of-line general case.
    StringCompareTo,
}

/// Per-instruction optimisation flags proven by the front end.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MirFlags(u8);

const MIR_IGNORE_NULL_CHECK: u8 = 0b01;
const MIR_IGNORE_RANGE_CHECK: u8 = 0b10;

impl MirFlags {
    pub const fn none() -> Self {
        Self(0)
    }

    /// The instruction's object operand is proven non-null; elide the check and its launch pad.
    pub const fn ignore_null_check(self) -> Self {
        Self(self.0 | MIR_IGNORE_NULL_CHECK)
    }

    /// The instruction's index operand is proven in bounds.
    pub const fn ignore_range_check(self) -> Self {
        Self(self.0 | MIR_IGNORE_RANGE_CHECK)
    }

    pub fn ignores_null_check(&self) -> bool {
        self.0 & MIR_IGNORE_NULL_CHECK != 0
    }

    pub fn ignores_range_check(&self) -> bool {
        self.0 & MIR_IGNORE_RANGE_CHECK != 0
    }
}

#[derive(Clone, Debug)]
pub struct MirInst {
    pub op: MirOp,
    /// The bytecode offset this instruction derives from.
    pub dex_off: u32,
    pub flags: MirFlags,
}

impl MirInst {
    pub fn new(op: MirOp, dex_off: u32) -> Self {
        Self {
            op,
            dex_off,
            flags: MirFlags::none(),
        }
    }

    pub fn with_flags(op: MirOp, dex_off: u32, flags: MirFlags) -> Self {
        Self { op, dex_off, flags }
    }
}

#[derive(Clone, Debug)]
pub enum MirOp {
    Const {
        dst: VReg,
        val: i32,
    },
    ConstWide {
        dst: VReg,
        val: i64,
    },
    Move {
        dst: VReg,
        src: VReg,
    },
    MoveWide {
        dst: VReg,
        src: VReg,
    },
    UnOp {
        op: UnKind,
        dst: VReg,
        src: VReg,
    },
    BinOp {
        op: BinKind,
        dst: VReg,
        lhs: VReg,
        rhs: VReg,
    },
    BinOpWide {
        op: BinKind,
        dst: VReg,
        lhs: VReg,
        rhs: VReg,
    },
    /// 32-bit float arithmetic.
    FpBinOp {
        op: FpBinKind,
        dst: VReg,
        lhs: VReg,
        rhs: VReg,
    },
    /// 64-bit double arithmetic over wide pairs.
    FpBinOpWide {
        op: FpBinKind,
        dst: VReg,
        lhs: VReg,
        rhs: VReg,
    },
    IfTest {
        cond: Cond,
        lhs: VReg,
        rhs: VReg,
        target: BBlockIdx,
    },
    IfTestZ {
        cond: Cond,
        src: VReg,
        target: BBlockIdx,
    },
    Goto {
        target: BBlockIdx,
    },
    PackedSwitch {
        src: VReg,
        /// Unit offset of the table in [Method::data].
        table_off: u32,
    },
    SparseSwitch {
        src: VReg,
        table_off: u32,
    },
    FillArrayData {
        arr: VReg,
        table_off: u32,
    },
    IGet {
        dst: VReg,
        obj: VReg,
        field_idx: u32,
    },
    IGetWide {
        dst: VReg,
        obj: VReg,
        field_idx: u32,
    },
    IPut {
        src: VReg,
        obj: VReg,
        field_idx: u32,
    },
    IPutWide {
        src: VReg,
        obj: VReg,
        field_idx: u32,
    },
    AGet {
        dst: VReg,
        arr: VReg,
        idx: VReg,
    },
    APut {
        src: VReg,
        arr: VReg,
        idx: VReg,
    },
    ArrayLength {
        dst: VReg,
        arr: VReg,
    },
    Invoke {
        kind: InvokeKind,
        method_idx: u32,
        /// Argument vregs in call order; a wide argument contributes both halves.
        args: SmallVec<[VReg; 5]>,
        /// True for the range form: `args` are a contiguous ascending vreg window.
        range: bool,
    },
    MoveResult {
        dst: VReg,
    },
    MoveResultWide {
        dst: VReg,
    },
    Return,
    ReturnVal {
        src: VReg,
    },
    ReturnWide {
        src: VReg,
    },
}

impl MirOp {
    /// Visit every vreg this operation references, definitions and uses alike. Wide values are
    /// visited through their low vreg only, matching how operations name them.
    pub fn for_each_vreg(&self, mut f: impl FnMut(VReg)) {
        match self {
            MirOp::Const { dst, .. }
            | MirOp::ConstWide { dst, .. }
            | MirOp::MoveResult { dst }
            | MirOp::MoveResultWide { dst } => f(*dst),
            MirOp::Move { dst, src }
            | MirOp::MoveWide { dst, src }
            | MirOp::UnOp { dst, src, .. } => {
                f(*dst);
                f(*src);
            }
            MirOp::BinOp { dst, lhs, rhs, .. }
            | MirOp::BinOpWide { dst, lhs, rhs, .. }
            | MirOp::FpBinOp { dst, lhs, rhs, .. }
            | MirOp::FpBinOpWide { dst, lhs, rhs, .. } => {
                f(*dst);
                f(*lhs);
                f(*rhs);
            }
            MirOp::IfTest { lhs, rhs, .. } => {
                f(*lhs);
                f(*rhs);
            }
            MirOp::IfTestZ { src, .. }
            | MirOp::PackedSwitch { src, .. }
            | MirOp::SparseSwitch { src, .. }
            | MirOp::ReturnVal { src }
            | MirOp::ReturnWide { src } => f(*src),
            MirOp::Goto { .. } | MirOp::Return => (),
            MirOp::FillArrayData { arr, .. } => f(*arr),
            MirOp::IGet { dst, obj, .. } | MirOp::IGetWide { dst, obj, .. } => {
                f(*dst);
                f(*obj);
            }
            MirOp::IPut { src, obj, .. } | MirOp::IPutWide { src, obj, .. } => {
                f(*src);
                f(*obj);
            }
            MirOp::AGet { dst, arr, idx } => {
                f(*dst);
                f(*arr);
                f(*idx);
            }
            MirOp::APut { src, arr, idx } => {
                f(*src);
                f(*arr);
                f(*idx);
            }
            MirOp::ArrayLength { dst, arr } => {
                f(*dst);
                f(*arr);
            }
            MirOp::Invoke { args, .. } => {
                for a in args {
                    f(*a);
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct BBlock {
    pub insts: Vec<MirInst>,
}

impl BBlock {
    pub fn new(insts: Vec<MirInst>) -> Self {
        Self { insts }
    }
}

/// A method ready for code generation.
#[derive(Clone, Debug)]
pub struct Method {
    /// Human readable name, used only in logging and diagnostics.
    pub name: String,
    pub blocks: IndexVec<BBlockIdx, BBlock>,
    /// Total number of virtual registers, incoming arguments included.
    pub num_vregs: u16,
    /// How many of the (highest numbered) vregs are incoming arguments.
    pub num_ins: u16,
    /// Bit `v` set iff vreg `v` is the low half of a 64-bit pair.
    pub wide_vregs: Vob,
    /// Bit `v` set iff vreg `v` holds a float (or, with [Method::wide_vregs], a double).
    pub fp_vregs: Vob,
    /// Raw table units referenced by switch and fill-array-data instructions.
    pub data: Vec<u16>,
    /// Vregs the caller would like promoted to registers, overriding the use-count heuristic.
    /// Backends may still promote fewer (never more) if they run out of promotable registers.
    pub promote_hint: Option<Vob>,
}

impl Method {
    /// Create a method with no wide/fp vregs, no data tables and no promotion hint. Tests and
    /// simple front ends refine the sets afterwards.
    pub fn new(name: &str, num_vregs: u16, num_ins: u16, blocks: IndexVec<BBlockIdx, BBlock>) -> Self {
        Self {
            name: name.to_owned(),
            blocks,
            num_vregs,
            num_ins,
            wide_vregs: Vob::from_elem(false, usize::from(num_vregs)),
            fp_vregs: Vob::from_elem(false, usize::from(num_vregs)),
            data: Vec::new(),
            promote_hint: None,
        }
    }

    pub fn vreg_wide(&self, v: VReg) -> bool {
        self.wide_vregs.get(v.index()) == Some(true)
    }

    pub fn vreg_fp(&self, v: VReg) -> bool {
        self.fp_vregs.get(v.index()) == Some(true)
    }

    /// Is `v` an incoming argument vreg?
    pub fn vreg_is_in(&self, v: VReg) -> bool {
        v.index() >= usize::from(self.num_vregs) - usize::from(self.num_ins)
    }
}

/// Resolved information about an instance field.
#[derive(Clone, Copy, Debug)]
pub struct FieldInfo {
    /// Byte offset of the field from the object base.
    pub offset: i32,
    /// Volatile fields order their access with a barrier.
    pub volatile: bool,
}

/// Resolved information about a callee.
#[derive(Clone, Copy, Debug)]
pub struct MethodInfo {
    /// Index into the receiver class's dispatch table.
    pub vtable_idx: u32,
    /// When the callee's code address is statically bindable, its code offset. The call site
    /// then takes the fast sequence and a patch record is emitted for it.
    pub direct_code: Option<u32>,
    /// True if the call must be routed through the resolution trampoline regardless of
    /// resolution, e.g. for access checks.
    pub needs_access_check: bool,
    /// Set when the callee is one the generator may expand inline.
    pub intrinsic: Option<Intrinsic>,
}

/// Constant-pool resolution services supplied by the embedder.
///
/// A `None` from either method means the reference could not be resolved at compile time. For
/// fields that makes the whole method unsupported (the caller falls back to another execution
/// strategy); for callees the generator emits the slow, trampoline-based call sequence instead.
pub trait ConstResolver {
    fn field_offset(&self, field_idx: u32) -> Option<FieldInfo>;
    fn method_info(&self, method_idx: u32, kind: InvokeKind) -> Option<MethodInfo>;
}
