//! The x86 backend: IA-32 with SSE2 scalar float.
//!
//! Register conventions: `esi` is the reserved self register and `ecx` the reserved
//! emission scratch, which also feeds the `cl` shift-amount convention. The core temp pool
//! is `eax`, `edx`, `ebx` and `edi`, with `ebx` doubling as the invoke scratch; `ebp` is
//! the sole core promotion home. The fp pool is `xmm0`-`xmm6` and `xmm7` is the fp scratch
//! for aliased two-address arithmetic. Arguments are entirely stack-resident and results
//! return in `eax`/`edx`, floats included.
//!
//! Compiled frames treat `ebx` and `edi` as scratch; the entry trampoline owns the C
//! callee-saved set. A double occupies a single xmm register, so wide fp locations carry
//! the same register in both halves.
//!
//! Instruction sizes vary with operand shape but never with placement, except for the two
//! pc-relative jumps, which start at rel8 and widen to rel32.

use crate::{
    codegen::{
        abi,
        asm::{self, EncodeOutcome},
        callseq::{self, CallInfo},
        launchpad::{self, PadKind},
        lir::{Lir, LirIdx, OpFlags, OpInfo, OpT},
        mir_to_lir::{Isa, TableRef},
        regalloc::RegT,
        Cg, CompileError, Helper, PatchForm, PatchKind, PatchPoint,
    },
    mir::{BinKind, Cond, FpBinKind, UnKind},
};
use std::fmt;
use strum::EnumCount;

/// An x86 register. Core registers take mask bits 0-7 (their hardware ids); `xmm0`-`xmm7`
/// take bits 16-23.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Reg(u8);

impl Reg {
    fn from_bit(bit: i32) -> Self {
        Reg(bit as u8)
    }

    fn bit(self) -> i32 {
        i32::from(self.0)
    }
}

impl RegT for Reg {
    fn undefined() -> Self {
        Reg(u8::MAX)
    }

    fn mask_bit(&self) -> u8 {
        self.0
    }

    fn is_fp(&self) -> bool {
        (16..24).contains(&self.0)
    }

    // Under the compiled-code convention; the entry trampoline owns the C view of
    // ebx and edi.
    fn is_caller_saved(&self) -> bool {
        matches!(self.0, 0..=3 | 7) || (16..24).contains(&self.0)
    }
}

static REG_NAMES: [&str; 8] = ["eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi"];

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if (16..24).contains(&self.0) {
            write!(f, "xmm{}", self.0 - 16)
        } else {
            match REG_NAMES.get(usize::from(self.0)) {
                Some(n) => write!(f, "{n}"),
                None => write!(f, "r?"),
            }
        }
    }
}

const EAX: Reg = Reg(0);
/// Reserved emission scratch; also the shift-amount register.
const ECX: Reg = Reg(1);
const EDX: Reg = Reg(2);
/// The invoke scratch.
const EBX: Reg = Reg(3);
const ESP: Reg = Reg(4);
const EBP: Reg = Reg(5);
/// Reserved self register.
const ESI: Reg = Reg(6);
const EDI: Reg = Reg(7);
/// Reserved fp scratch for aliased two-address arithmetic.
const XMM7: Reg = Reg(23);

static CORE_TEMPS: [Reg; 4] = [EAX, EDX, EBX, EDI];
static FP_TEMPS: [Reg; 7] = [
    Reg(16),
    Reg(17),
    Reg(18),
    Reg(19),
    Reg(20),
    Reg(21),
    Reg(22),
];
static PROMOTABLE_CORE: [Reg; 1] = [EBP];

/// The tttn condition field.
fn cc(cond: Cond) -> i32 {
    match cond {
        Cond::Eq => 4,
        Cond::Ne => 5,
        Cond::Lo => 2,
        Cond::Hs => 3,
        Cond::Lt => 12,
        Cond::Ge => 13,
        Cond::Le => 14,
        Cond::Gt => 15,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, EnumCount)]
#[repr(u8)]
pub(crate) enum Op {
    /// mov rd, rs
    MovRR,
    /// mov rd, #imm32
    MovRI,
    /// movd xd, rs
    MovdXR,
    /// movd rd, xs
    MovdRX,
    /// movaps xd, xs
    Movaps,
    /// mov rd, [base + #disp]
    MovLoad,
    /// mov [base + #disp], rs
    MovStore,
    /// movss xd, [base + #disp]
    MovssLoad,
    /// movss [base + #disp], xs
    MovssStore,
    /// movsd xd, [base + #disp]
    MovsdLoad,
    /// movsd [base + #disp], xs
    MovsdStore,
    /// mov rd, [base + idx << scale + #disp]
    MovLoadIdx,
    /// mov [base + idx << scale + #disp], rs
    MovStoreIdx,
    /// movss xd, [base + idx << scale + #disp]
    MovssLoadIdx,
    /// movss [base + idx << scale + #disp], xs
    MovssStoreIdx,
    /// add rd, rs
    AddRR,
    /// add rd, #imm
    AddRI,
    /// sub rd, rs
    SubRR,
    /// sub rd, #imm
    SubRI,
    /// adc rd, rs
    AdcRR,
    /// sbb rd, rs
    SbbRR,
    /// and rd, rs
    AndRR,
    /// or rd, rs
    OrRR,
    /// xor rd, rs
    XorRR,
    /// neg rd
    NegR,
    /// not rd
    NotR,
    /// imul rd, rs
    ImulRR,
    /// shl rd, cl
    ShlCl,
    /// shr rd, cl
    ShrCl,
    /// sar rd, cl
    SarCl,
    /// sar rd, #imm
    SarRI,
    /// cmp ra, rb
    CmpRR,
    /// cmp ra, #imm
    CmpRI,
    /// test ra, rb
    TestRR,
    /// j<cc> <label>; operand 0 is the tttn field.
    Jcc,
    /// jmp <label>
    Jmp,
    /// jmp rs
    JmpR,
    /// call rs
    CallR,
    /// call [esi + #disp]
    CallMem,
    /// push rs
    PushR,
    /// pop rd
    PopR,
    /// ret
    Ret,
    /// addss/addsd xd, xs; operand 2 selects the double form.
    AddF,
    /// subss/subsd xd, xs
    SubF,
    /// mulss/mulsd xd, xs
    MulF,
    /// divss/divsd xd, xs
    DivF,
    /// xchg ra, rb
    Xchg,
    /// The fused table-address sequence: `call .+0; pop rd; add rd, #delta`.
    LoadTableAddr,
}

static OPINFO: [OpInfo; Op::COUNT] = [
    OpInfo {
        name: "mov",
        flags: OpFlags::none().def0().use1(),
    },
    OpInfo {
        name: "mov",
        flags: OpFlags::none().def0(),
    },
    OpInfo {
        name: "movd",
        flags: OpFlags::none().def0().use1(),
    },
    OpInfo {
        name: "movd",
        flags: OpFlags::none().def0().use1(),
    },
    OpInfo {
        name: "movaps",
        flags: OpFlags::none().def0().use1(),
    },
    OpInfo {
        name: "mov",
        flags: OpFlags::none().def0().use1().load(),
    },
    OpInfo {
        name: "mov",
        flags: OpFlags::none().use0().use1().store(),
    },
    OpInfo {
        name: "movss",
        flags: OpFlags::none().def0().use1().load(),
    },
    OpInfo {
        name: "movss",
        flags: OpFlags::none().use0().use1().store(),
    },
    OpInfo {
        name: "movsd",
        flags: OpFlags::none().def0().use1().load(),
    },
    OpInfo {
        name: "movsd",
        flags: OpFlags::none().use0().use1().store(),
    },
    OpInfo {
        name: "mov",
        flags: OpFlags::none().def0().use1().use2().load(),
    },
    OpInfo {
        name: "mov",
        flags: OpFlags::none().use0().use1().use2().store(),
    },
    OpInfo {
        name: "movss",
        flags: OpFlags::none().def0().use1().use2().load(),
    },
    OpInfo {
        name: "movss",
        flags: OpFlags::none().use0().use1().use2().store(),
    },
    OpInfo {
        name: "add",
        flags: OpFlags::none().def0().use0().use1().sets_cc(),
    },
    OpInfo {
        name: "add",
        flags: OpFlags::none().def0().use0().sets_cc(),
    },
    OpInfo {
        name: "sub",
        flags: OpFlags::none().def0().use0().use1().sets_cc(),
    },
    OpInfo {
        name: "sub",
        flags: OpFlags::none().def0().use0().sets_cc(),
    },
    OpInfo {
        name: "adc",
        flags: OpFlags::none().def0().use0().use1().sets_cc().uses_cc(),
    },
    OpInfo {
        name: "sbb",
        flags: OpFlags::none().def0().use0().use1().sets_cc().uses_cc(),
    },
    OpInfo {
        name: "and",
        flags: OpFlags::none().def0().use0().use1().sets_cc(),
    },
    OpInfo {
        name: "or",
        flags: OpFlags::none().def0().use0().use1().sets_cc(),
    },
    OpInfo {
        name: "xor",
        flags: OpFlags::none().def0().use0().use1().sets_cc(),
    },
    OpInfo {
        name: "neg",
        flags: OpFlags::none().def0().use0().sets_cc(),
    },
    OpInfo {
        name: "not",
        flags: OpFlags::none().def0().use0(),
    },
    OpInfo {
        name: "imul",
        flags: OpFlags::none().def0().use0().use1().sets_cc(),
    },
    OpInfo {
        name: "shl",
        flags: OpFlags::none().def0().use0().sets_cc(),
    },
    OpInfo {
        name: "shr",
        flags: OpFlags::none().def0().use0().sets_cc(),
    },
    OpInfo {
        name: "sar",
        flags: OpFlags::none().def0().use0().sets_cc(),
    },
    OpInfo {
        name: "sar",
        flags: OpFlags::none().def0().use0().sets_cc(),
    },
    OpInfo {
        name: "cmp",
        flags: OpFlags::none().use0().use1().sets_cc(),
    },
    OpInfo {
        name: "cmp",
        flags: OpFlags::none().use0().sets_cc(),
    },
    OpInfo {
        name: "test",
        flags: OpFlags::none().use0().use1().sets_cc(),
    },
    OpInfo {
        name: "jcc",
        flags: OpFlags::none().branch().uses_cc().needs_fixup(),
    },
    OpInfo {
        name: "jmp",
        flags: OpFlags::none().branch().needs_fixup(),
    },
    OpInfo {
        name: "jmp",
        flags: OpFlags::none().branch(),
    },
    OpInfo {
        name: "call",
        flags: OpFlags::none().branch(),
    },
    OpInfo {
        name: "call",
        flags: OpFlags::none().branch().load(),
    },
    OpInfo {
        name: "push",
        flags: OpFlags::none().use0().store().use_sp().def_sp(),
    },
    OpInfo {
        name: "pop",
        flags: OpFlags::none().def0().load().use_sp().def_sp(),
    },
    OpInfo {
        name: "ret",
        flags: OpFlags::none().branch().load(),
    },
    OpInfo {
        name: "addss",
        flags: OpFlags::none().def0().use0().use1(),
    },
    OpInfo {
        name: "subss",
        flags: OpFlags::none().def0().use0().use1(),
    },
    OpInfo {
        name: "mulss",
        flags: OpFlags::none().def0().use0().use1(),
    },
    OpInfo {
        name: "divss",
        flags: OpFlags::none().def0().use0().use1(),
    },
    OpInfo {
        name: "xchg",
        flags: OpFlags::none().def0().def1().use0().use1(),
    },
    OpInfo {
        name: "la",
        flags: OpFlags::none().def0().needs_fixup(),
    },
];

impl OpT for Op {
    fn info(&self) -> &'static OpInfo {
        &OPINFO[*self as usize]
    }
}

pub(crate) struct X86;

impl X86 {
    /// Two-address arithmetic with the standard aliasing dance. `dst` may name either
    /// source; non-commutative operations with `dst == rhs` go through the scratch.
    fn two_addr(cg: &mut Cg<'_, Self>, op: Op, commutative: bool, dst: Reg, lhs: Reg, rhs: Reg) {
        if dst == lhs {
            cg.lir.new_lir2(op, dst.bit(), rhs.bit());
        } else if dst == rhs {
            if commutative {
                cg.lir.new_lir2(op, dst.bit(), lhs.bit());
            } else {
                Self::op_reg_copy(cg, ECX, rhs);
                Self::op_reg_copy(cg, dst, lhs);
                cg.lir.new_lir2(op, dst.bit(), ECX.bit());
            }
        } else {
            Self::op_reg_copy(cg, dst, lhs);
            cg.lir.new_lir2(op, dst.bit(), rhs.bit());
        }
    }
}

impl Isa for X86 {
    type Reg = Reg;
    type Op = Op;

    const NAME: &'static str = "x86";
    const FP_DOUBLE_SOLO: bool = true;

    fn self_reg() -> Reg {
        ESI
    }

    fn sp_reg() -> Reg {
        ESP
    }

    fn lr_reg() -> Option<Reg> {
        None
    }

    fn pc_mask_bit() -> Option<u8> {
        None
    }

    fn arg_regs() -> &'static [Reg] {
        &[]
    }

    fn ret_regs() -> (Reg, Reg) {
        (EAX, EDX)
    }

    fn core_temps() -> &'static [Reg] {
        &CORE_TEMPS
    }

    fn fp_temps() -> &'static [Reg] {
        &FP_TEMPS
    }

    fn promotable_core() -> &'static [Reg] {
        &PROMOTABLE_CORE
    }

    fn promotable_fp() -> &'static [Reg] {
        &[]
    }

    fn fixed_core_spills() -> u32 {
        0
    }

    fn fp_mask_base() -> u8 {
        16
    }

    // The pushed return address sits between the frame and the incoming arguments.
    fn in_arg_bias() -> i32 {
        4
    }

    fn op_reg_copy(cg: &mut Cg<'_, Self>, dst: Reg, src: Reg) {
        let op = match (dst.is_fp(), src.is_fp()) {
            (false, false) => Op::MovRR,
            (true, true) => Op::Movaps,
            (true, false) => Op::MovdXR,
            (false, true) => Op::MovdRX,
        };
        cg.lir.new_lir2(op, dst.bit(), src.bit());
    }

    fn load_const(cg: &mut Cg<'_, Self>, dst: Reg, val: i32) {
        cg.lir.new_lir2(Op::MovRI, dst.bit(), val);
    }

    fn load_const_wide(cg: &mut Cg<'_, Self>, lo: Reg, hi: Reg, val: i64) {
        Self::load_const(cg, lo, val as i32);
        Self::load_const(cg, hi, (val >> 32) as i32);
    }

    fn load_word(cg: &mut Cg<'_, Self>, dst: Reg, base: Reg, disp: i32) -> LirIdx {
        let op = if dst.is_fp() {
            Op::MovssLoad
        } else {
            Op::MovLoad
        };
        cg.lir.new_lir3(op, dst.bit(), base.bit(), disp)
    }

    fn store_word(cg: &mut Cg<'_, Self>, src: Reg, base: Reg, disp: i32) -> LirIdx {
        let op = if src.is_fp() {
            Op::MovssStore
        } else {
            Op::MovStore
        };
        cg.lir.new_lir3(op, src.bit(), base.bit(), disp)
    }

    fn load_pair(cg: &mut Cg<'_, Self>, lo: Reg, hi: Reg, base: Reg, disp: i32) -> LirIdx {
        if lo.is_fp() {
            // A solo double; both halves name the same register.
            cg.lir.new_lir3(Op::MovsdLoad, lo.bit(), base.bit(), disp)
        } else {
            // High first in case the base aliases the low half.
            cg.lir
                .new_lir3(Op::MovLoad, hi.bit(), base.bit(), disp + 4);
            cg.lir.new_lir3(Op::MovLoad, lo.bit(), base.bit(), disp)
        }
    }

    fn store_pair(cg: &mut Cg<'_, Self>, lo: Reg, hi: Reg, base: Reg, disp: i32) -> LirIdx {
        if lo.is_fp() {
            cg.lir.new_lir3(Op::MovsdStore, lo.bit(), base.bit(), disp)
        } else {
            let s = cg.lir.new_lir3(Op::MovStore, lo.bit(), base.bit(), disp);
            cg.lir
                .new_lir3(Op::MovStore, hi.bit(), base.bit(), disp + 4);
            s
        }
    }

    fn load_indexed(
        cg: &mut Cg<'_, Self>,
        dst: Reg,
        base: Reg,
        idx: Reg,
        scale: u8,
        disp: i32,
    ) -> Result<(), CompileError> {
        let op = if dst.is_fp() {
            Op::MovssLoadIdx
        } else {
            Op::MovLoadIdx
        };
        cg.lir
            .new_lir5(op, dst.bit(), base.bit(), idx.bit(), i32::from(scale), disp);
        Ok(())
    }

    fn store_indexed(
        cg: &mut Cg<'_, Self>,
        src: Reg,
        base: Reg,
        idx: Reg,
        scale: u8,
        disp: i32,
    ) -> Result<(), CompileError> {
        let op = if src.is_fp() {
            Op::MovssStoreIdx
        } else {
            Op::MovStoreIdx
        };
        cg.lir
            .new_lir5(op, src.bit(), base.bit(), idx.bit(), i32::from(scale), disp);
        Ok(())
    }

    fn op_un(cg: &mut Cg<'_, Self>, kind: UnKind, dst: Reg, src: Reg) {
        if dst != src {
            Self::op_reg_copy(cg, dst, src);
        }
        let op = match kind {
            UnKind::Neg => Op::NegR,
            UnKind::Not => Op::NotR,
        };
        cg.lir.new_lir1(op, dst.bit());
    }

    fn op_bin(
        cg: &mut Cg<'_, Self>,
        kind: BinKind,
        dst: Reg,
        lhs: Reg,
        rhs: Reg,
    ) -> Result<(), CompileError> {
        match kind {
            BinKind::Add => Self::two_addr(cg, Op::AddRR, true, dst, lhs, rhs),
            BinKind::Sub => Self::two_addr(cg, Op::SubRR, false, dst, lhs, rhs),
            BinKind::Mul => Self::two_addr(cg, Op::ImulRR, true, dst, lhs, rhs),
            BinKind::And => Self::two_addr(cg, Op::AndRR, true, dst, lhs, rhs),
            BinKind::Or => Self::two_addr(cg, Op::OrRR, true, dst, lhs, rhs),
            BinKind::Xor => Self::two_addr(cg, Op::XorRR, true, dst, lhs, rhs),
            BinKind::Shl | BinKind::Shr | BinKind::Ushr => {
                // The amount rides in cl; capture it before dst can overwrite rhs.
                Self::op_reg_copy(cg, ECX, rhs);
                if dst != lhs {
                    Self::op_reg_copy(cg, dst, lhs);
                }
                let op = match kind {
                    BinKind::Shl => Op::ShlCl,
                    BinKind::Shr => Op::SarCl,
                    _ => Op::ShrCl,
                };
                cg.lir.new_lir1(op, dst.bit());
            }
            BinKind::Div | BinKind::Rem => {
                return Err(CompileError::Internal(
                    "integer division reached the emitter".to_owned(),
                ))
            }
        }
        Ok(())
    }

    fn op_bin_imm(
        cg: &mut Cg<'_, Self>,
        kind: BinKind,
        dst: Reg,
        src: Reg,
        imm: i32,
    ) -> Result<(), CompileError> {
        let (op, imm) = match kind {
            BinKind::Add => (Op::AddRI, imm),
            BinKind::Sub => (Op::SubRI, imm),
            BinKind::Shr => (Op::SarRI, imm & 31),
            _ => {
                return Err(CompileError::Internal(format!(
                    "no immediate form for {kind:?}"
                )))
            }
        };
        if dst != src {
            Self::op_reg_copy(cg, dst, src);
        }
        cg.lir.new_lir2(op, dst.bit(), imm);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn op_bin_wide(
        cg: &mut Cg<'_, Self>,
        kind: BinKind,
        d_lo: Reg,
        d_hi: Reg,
        l_lo: Reg,
        l_hi: Reg,
        r_lo: Reg,
        r_hi: Reg,
    ) -> Result<(), CompileError> {
        let (lo_op, hi_op) = match kind {
            BinKind::Add => (Op::AddRR, Op::AdcRR),
            BinKind::Sub => (Op::SubRR, Op::SbbRR),
            BinKind::And => (Op::AndRR, Op::AndRR),
            BinKind::Or => (Op::OrRR, Op::OrRR),
            BinKind::Xor => (Op::XorRR, Op::XorRR),
            _ => {
                return Err(CompileError::Internal(format!(
                    "wide {kind:?} reached the emitter"
                )))
            }
        };
        if d_lo != l_lo {
            Self::op_reg_copy(cg, d_lo, l_lo);
        }
        if d_hi != l_hi {
            Self::op_reg_copy(cg, d_hi, l_hi);
        }
        // The carry pair must stay adjacent; the copies above leave flags alone.
        cg.lir.new_lir2(lo_op, d_lo.bit(), r_lo.bit());
        cg.lir.new_lir2(hi_op, d_hi.bit(), r_hi.bit());
        Ok(())
    }

    fn op_fp_bin(
        cg: &mut Cg<'_, Self>,
        kind: FpBinKind,
        wide: bool,
        dst: Reg,
        lhs: Reg,
        rhs: Reg,
    ) -> Result<(), CompileError> {
        let op = match kind {
            FpBinKind::Add => Op::AddF,
            FpBinKind::Sub => Op::SubF,
            FpBinKind::Mul => Op::MulF,
            FpBinKind::Div => Op::DivF,
        };
        let w = i32::from(wide);
        if dst == lhs {
            cg.lir.new_lir3(op, dst.bit(), rhs.bit(), w);
        } else if dst == rhs {
            if matches!(kind, FpBinKind::Add | FpBinKind::Mul) {
                cg.lir.new_lir3(op, dst.bit(), lhs.bit(), w);
            } else {
                Self::op_reg_copy(cg, XMM7, rhs);
                Self::op_reg_copy(cg, dst, lhs);
                cg.lir.new_lir3(op, dst.bit(), XMM7.bit(), w);
            }
        } else {
            Self::op_reg_copy(cg, dst, lhs);
            cg.lir.new_lir3(op, dst.bit(), rhs.bit(), w);
        }
        Ok(())
    }

    fn branch(cg: &mut Cg<'_, Self>) -> LirIdx {
        cg.lir.new_lir0(Op::Jmp)
    }

    fn cond_branch(cg: &mut Cg<'_, Self>, cond: Cond, lhs: Reg, rhs: Reg) -> LirIdx {
        cg.lir.new_lir2(Op::CmpRR, lhs.bit(), rhs.bit());
        cg.lir.new_lir1(Op::Jcc, cc(cond))
    }

    fn cond_branch_imm(cg: &mut Cg<'_, Self>, cond: Cond, src: Reg, imm: i32) -> LirIdx {
        if imm == 0 && matches!(cond, Cond::Eq | Cond::Ne) {
            cg.lir.new_lir2(Op::TestRR, src.bit(), src.bit());
        } else {
            cg.lir.new_lir2(Op::CmpRI, src.bit(), imm);
        }
        cg.lir.new_lir1(Op::Jcc, cc(cond))
    }

    fn jump_reg(cg: &mut Cg<'_, Self>, r: Reg) {
        cg.lir.new_lir1(Op::JmpR, r.bit());
    }

    fn mem_barrier(_cg: &mut Cg<'_, Self>) {
        // Total store order already gives volatile accesses the ordering they need.
    }

    fn helper_args2(cg: &mut Cg<'_, Self>, a_bit: i32, b_bit: i32) {
        let a = Reg::from_bit(a_bit);
        let b = Reg::from_bit(b_bit);
        if a == EDX && b == EAX {
            cg.lir.new_lir2(Op::Xchg, EAX.bit(), EDX.bit());
        } else if b == EAX {
            Self::op_reg_copy(cg, EDX, EAX);
            if a != EAX {
                Self::op_reg_copy(cg, EAX, a);
            }
        } else {
            if a != EAX {
                Self::op_reg_copy(cg, EAX, a);
            }
            if b != EDX {
                Self::op_reg_copy(cg, EDX, b);
            }
        }
    }

    fn helper_arg_regs() -> [Reg; 3] {
        [EAX, EDX, EBX]
    }

    fn call_helper(cg: &mut Cg<'_, Self>, h: Helper) {
        cg.lir.new_lir1(Op::CallMem, h.self_disp());
    }

    fn load_patchable(cg: &mut Cg<'_, Self>, dst: Reg, method_idx: u32, kind: PatchKind) {
        let n = cg.lir.new_lir2(Op::MovRI, dst.bit(), method_idx as i32);
        cg.patches.push(PatchPoint {
            node: n,
            adjust: 1,
            form: PatchForm::Imm32,
            method_idx,
            kind,
        });
    }

    fn emit_call_reg(cg: &mut Cg<'_, Self>, target: Reg) {
        cg.lir.new_lir1(Op::CallR, target.bit());
    }

    fn invoke_target_reg() -> Reg {
        EBX
    }

    fn load_table_addr(cg: &mut Cg<'_, Self>, dst: Reg, table: TableRef) {
        let (kind, idx) = match table {
            TableRef::Switch(i) => (0, i),
            TableRef::Fill(i) => (1, i),
        };
        cg.lir
            .new_lir3(Op::LoadTableAddr, dst.bit(), kind, idx as i32);
    }

    fn next_call_insn(
        cg: &mut Cg<'_, Self>,
        info: &CallInfo<Reg>,
        state: u32,
    ) -> Result<Option<u32>, CompileError> {
        callseq::next_call_insn_std::<Self>(cg, info, state, EBX, ESP)
    }

    fn emit_entry(cg: &mut Cg<'_, Self>) -> Result<(), CompileError> {
        // Trap entry if esp would drop below the guard limit once the frame is in place.
        Self::load_word(cg, EAX, ESI, abi::SELF_STACK_LIMIT_OFF);
        Self::op_bin_imm(cg, BinKind::Add, EAX, EAX, cg.frame_size as i32)?;
        let b = Self::cond_branch(cg, Cond::Lo, ESP, EAX);
        let pad = launchpad::add_pad(cg, PadKind::StackOverflow, [0, 0]);
        cg.lir.set_target(b, pad);

        for bit in 0..8u8 {
            if cg.core_spill_mask & (1 << bit) != 0 {
                cg.lir.new_lir1(Op::PushR, i32::from(bit));
            }
        }
        let adj = cg.frame_size - cg.spill_bytes();
        if adj > 0 {
            Self::op_bin_imm(cg, BinKind::Sub, ESP, ESP, adj as i32)?;
        }
        // Arguments already sit in their frame slots above the pushed return address.
        Ok(())
    }

    fn emit_exit(cg: &mut Cg<'_, Self>) -> Result<(), CompileError> {
        let adj = cg.frame_size - cg.spill_bytes();
        if adj > 0 {
            Self::op_bin_imm(cg, BinKind::Add, ESP, ESP, adj as i32)?;
        }
        for bit in (0..8u8).rev() {
            if cg.core_spill_mask & (1 << bit) != 0 {
                cg.lir.new_lir1(Op::PopR, i32::from(bit));
            }
        }
        cg.lir.new_lir0(Op::Ret);
        Ok(())
    }

    fn op_size(lir: &Lir<Op>, _off: u32) -> u32 {
        let ops = &lir.operands;
        let Some(op) = lir.op.real() else { return 0 };
        match op {
            Op::MovRR => 2,
            Op::MovRI => 5,
            Op::MovdXR | Op::MovdRX => 4,
            Op::Movaps => 3,
            Op::MovLoad | Op::MovStore => 1 + mem_size(ops[1], ops[2]),
            Op::MovssLoad | Op::MovssStore | Op::MovsdLoad | Op::MovsdStore => {
                3 + mem_size(ops[1], ops[2])
            }
            Op::MovLoadIdx | Op::MovStoreIdx => 1 + sib_size(ops[4]),
            Op::MovssLoadIdx | Op::MovssStoreIdx => 3 + sib_size(ops[4]),
            Op::AddRR
            | Op::SubRR
            | Op::AdcRR
            | Op::SbbRR
            | Op::AndRR
            | Op::OrRR
            | Op::XorRR
            | Op::CmpRR
            | Op::TestRR
            | Op::Xchg
            | Op::NegR
            | Op::NotR
            | Op::ShlCl
            | Op::ShrCl
            | Op::SarCl
            | Op::JmpR
            | Op::CallR => 2,
            Op::AddRI | Op::SubRI | Op::CmpRI => grp1_size(ops[1]),
            Op::ImulRR | Op::SarRI => 3,
            Op::Jcc => {
                if lir.widened {
                    6
                } else {
                    2
                }
            }
            Op::Jmp => {
                if lir.widened {
                    5
                } else {
                    2
                }
            }
            Op::CallMem => 1 + mem_size(ESI.bit(), ops[0]),
            Op::PushR | Op::PopR | Op::Ret => 1,
            Op::AddF | Op::SubF | Op::MulF | Op::DivF => 4,
            Op::LoadTableAddr => 12,
        }
    }

    fn encode(cg: &Cg<'_, Self>, idx: LirIdx, code: &mut Vec<u8>) -> EncodeOutcome {
        encode_one(cg, idx, code)
    }
}

fn fits_i8(v: i32) -> bool {
    i8::try_from(v).is_ok()
}

fn mem_size(base: i32, disp: i32) -> u32 {
    1 + u32::from(base == ESP.bit()) + if fits_i8(disp) { 1 } else { 4 }
}

fn sib_size(disp: i32) -> u32 {
    2 + if fits_i8(disp) { 1 } else { 4 }
}

fn grp1_size(imm: i32) -> u32 {
    2 + if fits_i8(imm) { 1 } else { 4 }
}

fn modrm(m: u8, reg: u8, rm: u8) -> u8 {
    m << 6 | reg << 3 | rm
}

/// ModRM and displacement for `[base + disp]`, with the SIB byte `esp` as a base demands.
/// Only mod 01/10 are emitted, so an `ebp` base needs no special case.
fn emit_mem(code: &mut Vec<u8>, reg: u8, base: u8, disp: i32) {
    let m = if fits_i8(disp) { 0b01 } else { 0b10 };
    if base == 4 {
        code.push(modrm(m, reg, 4));
        code.push(0x24);
    } else {
        code.push(modrm(m, reg, base));
    }
    if m == 0b01 {
        code.push(disp as u8);
    } else {
        asm::push_u32(code, disp as u32);
    }
}

fn emit_sib_mem(code: &mut Vec<u8>, reg: u8, base: u8, idx: u8, scale: u8, disp: i32) {
    let m = if fits_i8(disp) { 0b01 } else { 0b10 };
    code.push(modrm(m, reg, 4));
    code.push(scale << 6 | idx << 3 | base);
    if m == 0b01 {
        code.push(disp as u8);
    } else {
        asm::push_u32(code, disp as u32);
    }
}

fn emit_grp1(code: &mut Vec<u8>, ext: u8, rm: u8, imm: i32) {
    if fits_i8(imm) {
        code.push(0x83);
        code.push(modrm(3, ext, rm));
        code.push(imm as u8);
    } else {
        code.push(0x81);
        code.push(modrm(3, ext, rm));
        asm::push_u32(code, imm as u32);
    }
}

fn encode_one(cg: &Cg<'_, X86>, idx: LirIdx, code: &mut Vec<u8>) -> EncodeOutcome {
    let lir = &cg.lir[idx];
    let Some(op) = lir.op.real() else {
        return EncodeOutcome::Done;
    };
    let ops = &lir.operands;
    let off = lir.offset;
    let r = |i: usize| ops[i] as u8;
    let x = |i: usize| (ops[i] - 16) as u8;
    let target = || lir.target.map(|t| cg.lir[t].offset).unwrap_or(u32::MAX);

    match op {
        Op::MovRR => {
            code.push(0x89);
            code.push(modrm(3, r(1), r(0)));
        }
        Op::MovRI => {
            code.push(0xB8 + r(0));
            asm::push_u32(code, ops[1] as u32);
        }
        Op::MovdXR => {
            code.extend_from_slice(&[0x66, 0x0F, 0x6E]);
            code.push(modrm(3, x(0), r(1)));
        }
        Op::MovdRX => {
            code.extend_from_slice(&[0x66, 0x0F, 0x7E]);
            code.push(modrm(3, x(1), r(0)));
        }
        Op::Movaps => {
            code.extend_from_slice(&[0x0F, 0x28]);
            code.push(modrm(3, x(0), x(1)));
        }
        Op::MovLoad => {
            code.push(0x8B);
            emit_mem(code, r(0), r(1), ops[2]);
        }
        Op::MovStore => {
            code.push(0x89);
            emit_mem(code, r(0), r(1), ops[2]);
        }
        Op::MovssLoad | Op::MovsdLoad => {
            code.push(if op == Op::MovssLoad { 0xF3 } else { 0xF2 });
            code.extend_from_slice(&[0x0F, 0x10]);
            emit_mem(code, x(0), r(1), ops[2]);
        }
        Op::MovssStore | Op::MovsdStore => {
            code.push(if op == Op::MovssStore { 0xF3 } else { 0xF2 });
            code.extend_from_slice(&[0x0F, 0x11]);
            emit_mem(code, x(0), r(1), ops[2]);
        }
        Op::MovLoadIdx => {
            code.push(0x8B);
            emit_sib_mem(code, r(0), r(1), r(2), ops[3] as u8, ops[4]);
        }
        Op::MovStoreIdx => {
            code.push(0x89);
            emit_sib_mem(code, r(0), r(1), r(2), ops[3] as u8, ops[4]);
        }
        Op::MovssLoadIdx => {
            code.extend_from_slice(&[0xF3, 0x0F, 0x10]);
            emit_sib_mem(code, x(0), r(1), r(2), ops[3] as u8, ops[4]);
        }
        Op::MovssStoreIdx => {
            code.extend_from_slice(&[0xF3, 0x0F, 0x11]);
            emit_sib_mem(code, x(0), r(1), r(2), ops[3] as u8, ops[4]);
        }
        Op::AddRR => {
            code.push(0x01);
            code.push(modrm(3, r(1), r(0)));
        }
        Op::SubRR => {
            code.push(0x29);
            code.push(modrm(3, r(1), r(0)));
        }
        Op::AdcRR => {
            code.push(0x11);
            code.push(modrm(3, r(1), r(0)));
        }
        Op::SbbRR => {
            code.push(0x19);
            code.push(modrm(3, r(1), r(0)));
        }
        Op::AndRR => {
            code.push(0x21);
            code.push(modrm(3, r(1), r(0)));
        }
        Op::OrRR => {
            code.push(0x09);
            code.push(modrm(3, r(1), r(0)));
        }
        Op::XorRR => {
            code.push(0x31);
            code.push(modrm(3, r(1), r(0)));
        }
        Op::AddRI => emit_grp1(code, 0, r(0), ops[1]),
        Op::SubRI => emit_grp1(code, 5, r(0), ops[1]),
        Op::CmpRI => emit_grp1(code, 7, r(0), ops[1]),
        Op::NegR => {
            code.push(0xF7);
            code.push(modrm(3, 3, r(0)));
        }
        Op::NotR => {
            code.push(0xF7);
            code.push(modrm(3, 2, r(0)));
        }
        Op::ImulRR => {
            code.extend_from_slice(&[0x0F, 0xAF]);
            code.push(modrm(3, r(0), r(1)));
        }
        Op::ShlCl => {
            code.push(0xD3);
            code.push(modrm(3, 4, r(0)));
        }
        Op::ShrCl => {
            code.push(0xD3);
            code.push(modrm(3, 5, r(0)));
        }
        Op::SarCl => {
            code.push(0xD3);
            code.push(modrm(3, 7, r(0)));
        }
        Op::SarRI => {
            code.push(0xC1);
            code.push(modrm(3, 7, r(0)));
            code.push(ops[1] as u8);
        }
        Op::CmpRR => {
            code.push(0x39);
            code.push(modrm(3, r(1), r(0)));
        }
        Op::TestRR => {
            code.push(0x85);
            code.push(modrm(3, r(1), r(0)));
        }
        Op::Jcc => {
            if lir.widened {
                let rel = i64::from(target()) - i64::from(off) - 6;
                code.push(0x0F);
                code.push(0x80 | r(0));
                asm::push_u32(code, rel as u32);
            } else {
                let rel = i64::from(target()) - i64::from(off) - 2;
                if !(-128..=127).contains(&rel) {
                    return EncodeOutcome::OutOfRange;
                }
                code.push(0x70 | r(0));
                code.push(rel as u8);
            }
        }
        Op::Jmp => {
            if lir.widened {
                let rel = i64::from(target()) - i64::from(off) - 5;
                code.push(0xE9);
                asm::push_u32(code, rel as u32);
            } else {
                let rel = i64::from(target()) - i64::from(off) - 2;
                if !(-128..=127).contains(&rel) {
                    return EncodeOutcome::OutOfRange;
                }
                code.push(0xEB);
                code.push(rel as u8);
            }
        }
        Op::JmpR => {
            code.push(0xFF);
            code.push(modrm(3, 4, r(0)));
        }
        Op::CallR => {
            code.push(0xFF);
            code.push(modrm(3, 2, r(0)));
        }
        Op::CallMem => {
            code.push(0xFF);
            emit_mem(code, 2, ESI.0, ops[0]);
        }
        Op::PushR => code.push(0x50 + r(0)),
        Op::PopR => code.push(0x58 + r(0)),
        Op::Ret => code.push(0xC3),
        Op::AddF | Op::SubF | Op::MulF | Op::DivF => {
            code.push(if ops[2] != 0 { 0xF2 } else { 0xF3 });
            code.push(0x0F);
            code.push(match op {
                Op::AddF => 0x58,
                Op::SubF => 0x5C,
                Op::MulF => 0x59,
                _ => 0x5E,
            });
            code.push(modrm(3, x(0), x(1)));
        }
        Op::Xchg => {
            code.push(0x87);
            code.push(modrm(3, r(1), r(0)));
        }
        Op::LoadTableAddr => {
            let tab = table_offset(cg, ops[1], ops[2]);
            // call .+0 pushes the address of the pop; the add rebases it onto the table.
            code.push(0xE8);
            asm::push_u32(code, 0);
            code.push(0x58 + r(0));
            code.push(0x81);
            code.push(modrm(3, 0, r(0)));
            let delta = i64::from(tab) - i64::from(off) - 5;
            asm::push_u32(code, delta as u32);
        }
    }
    EncodeOutcome::Done
}

fn table_offset(cg: &Cg<'_, X86>, kind: i32, idx: i32) -> u32 {
    if kind == 0 {
        cg.data.switch_tables[idx as usize].offset
    } else {
        cg.data.fill_items[idx as usize].offset
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        codegen::Tuning,
        mir::{BBlock, ConstResolver, FieldInfo, InvokeKind, Method, MethodInfo},
    };
    use index_vec::IndexVec;

    struct NoResolver;

    impl ConstResolver for NoResolver {
        fn field_offset(&self, _field_idx: u32) -> Option<FieldInfo> {
            None
        }

        fn method_info(&self, _method_idx: u32, _kind: InvokeKind) -> Option<MethodInfo> {
            None
        }
    }

    fn cg_for_test() -> Cg<'static, X86> {
        let mut blocks = IndexVec::new();
        blocks.push(BBlock::new(vec![]));
        let m = Box::leak(Box::new(Method::new("t", 1, 0, blocks)));
        let t = Box::leak(Box::new(Tuning::default()));
        Cg::new(m, &NoResolver, t).unwrap()
    }

    fn enc(cg: &mut Cg<'_, X86>, idx: LirIdx) -> Vec<u8> {
        let mut code = Vec::new();
        cg.lir[idx].offset = 0;
        assert_eq!(X86::encode(cg, idx, &mut code), EncodeOutcome::Done);
        assert_eq!(code.len() as u32, X86::op_size(&cg.lir[idx], 0));
        code
    }

    fn ops_in_stream(cg: &Cg<'_, X86>) -> Vec<Op> {
        let mut v = Vec::new();
        let mut it = cg.lir.first();
        while let Some(i) = it {
            if let Some(op) = cg.lir[i].op.real() {
                v.push(op);
            }
            it = cg.lir[i].next();
        }
        v
    }

    #[test]
    fn opinfo_table_matches_enum() {
        assert_eq!(OPINFO.len(), Op::COUNT);
        assert_eq!(Op::MovRR.info().name, "mov");
        assert_eq!(Op::LoadTableAddr.info().name, "la");
        assert!(Op::Jcc.info().flags.is_branch());
        assert!(Op::Ret.info().flags.is_branch());
        assert!(Op::MovLoad.info().flags.is_load());
        assert!(Op::PushR.info().flags.is_store());
    }

    #[test]
    fn known_bytes() {
        let mut cg = cg_for_test();
        // mov eax, ebx
        let i = cg.lir.new_lir2(Op::MovRR, 0, 3);
        assert_eq!(enc(&mut cg, i), [0x89, 0xD8]);
        // mov edi, 0x12345678
        let i = cg.lir.new_lir2(Op::MovRI, 7, 0x1234_5678);
        assert_eq!(enc(&mut cg, i), [0xBF, 0x78, 0x56, 0x34, 0x12]);
        // mov eax, [esp+16]
        let i = cg.lir.new_lir3(Op::MovLoad, 0, 4, 16);
        assert_eq!(enc(&mut cg, i), [0x8B, 0x44, 0x24, 0x10]);
        // mov [esi+0x80], eax takes the disp32 form.
        let i = cg.lir.new_lir3(Op::MovStore, 0, 6, 0x80);
        assert_eq!(enc(&mut cg, i), [0x89, 0x86, 0x80, 0x00, 0x00, 0x00]);
        // add eax, edx
        let i = cg.lir.new_lir2(Op::AddRR, 0, 2);
        assert_eq!(enc(&mut cg, i), [0x01, 0xD0]);
        // cmp esp, eax
        let i = cg.lir.new_lir2(Op::CmpRR, 4, 0);
        assert_eq!(enc(&mut cg, i), [0x39, 0xC4]);
        // test eax, eax
        let i = cg.lir.new_lir2(Op::TestRR, 0, 0);
        assert_eq!(enc(&mut cg, i), [0x85, 0xC0]);
        // push ebp; pop ebp; ret
        let i = cg.lir.new_lir1(Op::PushR, 5);
        assert_eq!(enc(&mut cg, i), [0x55]);
        let i = cg.lir.new_lir1(Op::PopR, 5);
        assert_eq!(enc(&mut cg, i), [0x5D]);
        let i = cg.lir.new_lir0(Op::Ret);
        assert_eq!(enc(&mut cg, i), [0xC3]);
        // call [esi+0x84]
        let i = cg.lir.new_lir1(Op::CallMem, 0x84);
        assert_eq!(enc(&mut cg, i), [0xFF, 0x96, 0x84, 0x00, 0x00, 0x00]);
        // jmp eax
        let i = cg.lir.new_lir1(Op::JmpR, 0);
        assert_eq!(enc(&mut cg, i), [0xFF, 0xE0]);
        // movss xmm0, [esp+8]
        let i = cg.lir.new_lir3(Op::MovssLoad, 16, 4, 8);
        assert_eq!(enc(&mut cg, i), [0xF3, 0x0F, 0x10, 0x44, 0x24, 0x08]);
        // addss xmm0, xmm1 and its double form
        let i = cg.lir.new_lir3(Op::AddF, 16, 17, 0);
        assert_eq!(enc(&mut cg, i), [0xF3, 0x0F, 0x58, 0xC1]);
        let i = cg.lir.new_lir3(Op::AddF, 16, 17, 1);
        assert_eq!(enc(&mut cg, i), [0xF2, 0x0F, 0x58, 0xC1]);
        // sar eax, 1
        let i = cg.lir.new_lir2(Op::SarRI, 0, 1);
        assert_eq!(enc(&mut cg, i), [0xC1, 0xF8, 0x01]);
        // mov edx, [eax + edi*4 + 16]
        let i = cg.lir.new_lir5(Op::MovLoadIdx, 2, 0, 7, 2, 16);
        assert_eq!(enc(&mut cg, i), [0x8B, 0x54, 0xB8, 0x10]);
    }

    #[test]
    fn grp1_immediates_shrink_to_a_byte() {
        let mut cg = cg_for_test();
        let i = cg.lir.new_lir2(Op::AddRI, 0, 100);
        assert_eq!(enc(&mut cg, i), [0x83, 0xC0, 0x64]);
        let i = cg.lir.new_lir2(Op::AddRI, 0, 0x1000);
        assert_eq!(enc(&mut cg, i), [0x81, 0xC0, 0x00, 0x10, 0x00, 0x00]);
        let i = cg.lir.new_lir2(Op::SubRI, 4, 24);
        assert_eq!(enc(&mut cg, i), [0x83, 0xEC, 0x18]);
    }

    #[test]
    fn two_address_aliasing_takes_the_scratch() {
        // dst aliasing rhs on a commutative op just swaps the sources.
        let mut cg = cg_for_test();
        X86::op_bin(&mut cg, BinKind::Add, EAX, EDX, EAX).unwrap();
        assert_eq!(ops_in_stream(&cg), [Op::AddRR]);
        let n = cg.lir.first().unwrap();
        assert_eq!(cg.lir[n].operands[..2], [EAX.bit(), EDX.bit()]);

        // Subtraction cannot, so the rhs is parked in ecx.
        let mut cg = cg_for_test();
        X86::op_bin(&mut cg, BinKind::Sub, EAX, EDX, EAX).unwrap();
        assert_eq!(ops_in_stream(&cg), [Op::MovRR, Op::MovRR, Op::SubRR]);
        let sub = {
            let mut it = cg.lir.first();
            let mut last = None;
            while let Some(i) = it {
                last = Some(i);
                it = cg.lir[i].next();
            }
            last.unwrap()
        };
        assert_eq!(cg.lir[sub].operands[..2], [EAX.bit(), ECX.bit()]);
    }

    #[test]
    fn shift_amounts_go_through_cl() {
        let mut cg = cg_for_test();
        X86::op_bin(&mut cg, BinKind::Shl, EAX, EAX, EDX).unwrap();
        assert_eq!(ops_in_stream(&cg), [Op::MovRR, Op::ShlCl]);
        let mov = cg.lir.first().unwrap();
        assert_eq!(cg.lir[mov].operands[..2], [ECX.bit(), EDX.bit()]);
    }

    #[test]
    fn aliased_fp_divide_takes_the_fp_scratch() {
        let mut cg = cg_for_test();
        let x0 = Reg(16);
        let x1 = Reg(17);
        X86::op_fp_bin(&mut cg, FpBinKind::Div, false, x1, x0, x1).unwrap();
        assert_eq!(ops_in_stream(&cg), [Op::Movaps, Op::Movaps, Op::DivF]);
        let first = cg.lir.first().unwrap();
        assert_eq!(cg.lir[first].operands[..2], [XMM7.bit(), x1.bit()]);
    }

    #[test]
    fn cond_branch_widens_when_out_of_range() {
        let mut cg = cg_for_test();
        let b = X86::cond_branch(&mut cg, Cond::Eq, EAX, EDX);
        let lab = cg.lir.raw_pseudo(crate::codegen::lir::Pseudo::TargetLabel);
        cg.lir.append(lab);
        cg.lir.set_target(b, lab);
        cg.lir[b].offset = 0;

        cg.lir[lab].offset = 60;
        let mut code = Vec::new();
        assert_eq!(X86::encode(&cg, b, &mut code), EncodeOutcome::Done);
        assert_eq!(code, [0x74, 0x3A]);

        cg.lir[lab].offset = 4000;
        let mut code = Vec::new();
        assert_eq!(X86::encode(&cg, b, &mut code), EncodeOutcome::OutOfRange);
        cg.lir[b].widened = true;
        assert_eq!(X86::op_size(&cg.lir[b], 0), 6);
        let mut code = Vec::new();
        assert_eq!(X86::encode(&cg, b, &mut code), EncodeOutcome::Done);
        assert_eq!(code, [0x0F, 0x84, 0x9A, 0x0F, 0x00, 0x00]);
    }

    #[test]
    fn table_address_is_a_fixed_size_composite() {
        let mut cg = cg_for_test();
        let ti = cg.data.add_fill_item(3);
        cg.data.fill_items[ti].offset = 0x40;
        X86::load_table_addr(&mut cg, EDI, TableRef::Fill(ti));
        let la = cg.lir.first().unwrap();
        cg.lir[la].offset = 0;
        let mut code = Vec::new();
        assert_eq!(X86::encode(&cg, la, &mut code), EncodeOutcome::Done);
        assert_eq!(code.len(), 12);
        // call .+0; pop edi; add edi, 0x3b
        assert_eq!(code[0], 0xE8);
        assert_eq!(code[5], 0x58 + 7);
        assert_eq!(code[6..8], [0x81, 0xC7]);
        assert_eq!(code[8..12], [0x3B, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn patchable_loads_record_an_imm32_site() {
        let mut cg = cg_for_test();
        X86::load_patchable(&mut cg, EBX, 77, PatchKind::Static);
        assert_eq!(ops_in_stream(&cg), [Op::MovRI]);
        assert_eq!(cg.patches.len(), 1);
        assert_eq!(cg.patches[0].adjust, 1);
        assert_eq!(cg.patches[0].form, PatchForm::Imm32);
    }
}
