//! The MIPS backend: MIPS32r2, o32 with soft float.
//!
//! Register conventions: `s6` is the reserved self register and `at` the reserved emission
//! scratch (immediate overflow, branch synthesis). The temp pool is `v0`/`v1`, `a0`-`a3`
//! and `t0`-`t3`; `s0`-`s5` are promotion homes. The invoke scratch is `t9`, matching the
//! `jalr` convention. There are no fp registers to manage: float values are plain words
//! and float arithmetic falls back to another execution strategy before reaching here.
//!
//! Every instruction is four bytes, so a node's size never moves and only the fused
//! table-address sequence can widen. Branch delay slots are explicit: each branch strategy
//! appends a [Op::Nop] node behind the branch it returns. Conditional branches beyond
//! `beq`/`bne` are synthesised with a `slt` into `at`.

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
    mir::{BinKind, Cond, FpBinKind, UnKind, VReg},
};
use std::fmt;
use strum::EnumCount;

/// A MIPS register, identified by its architectural number, which is also its
/// resource-mask bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Reg(u8);

impl Reg {
    fn from_bit(bit: i32) -> Self {
        Reg(bit as u8)
    }

    fn bit(self) -> i32 {
        i32::from(self.0)
    }

    fn num(self) -> u16 {
        u16::from(self.0)
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
        false
    }

    fn is_caller_saved(&self) -> bool {
        matches!(self.0, 1..=15 | 24 | 25 | 31)
    }
}

static REG_NAMES: [&str; 32] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5",
    "t6", "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1",
    "gp", "sp", "s8", "ra",
];

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match REG_NAMES.get(usize::from(self.0)) {
            Some(n) => write!(f, "{n}"),
            None => write!(f, "r?"),
        }
    }
}

const ZERO: Reg = Reg(0);
/// Reserved emission scratch.
const AT: Reg = Reg(1);
const V0: Reg = Reg(2);
const V1: Reg = Reg(3);
const A0: Reg = Reg(4);
const A1: Reg = Reg(5);
const A2: Reg = Reg(6);
const A3: Reg = Reg(7);
const T0: Reg = Reg(8);
const T1: Reg = Reg(9);
const T2: Reg = Reg(10);
const T3: Reg = Reg(11);
/// Reserved self register.
const S6: Reg = Reg(22);
/// The invoke scratch; `jalr` through it keeps position-independent callees happy.
const T9: Reg = Reg(25);
const SP: Reg = Reg(29);
const RA: Reg = Reg(31);

static ARG_REGS: [Reg; 4] = [A0, A1, A2, A3];
static CORE_TEMPS: [Reg; 10] = [V0, V1, A0, A1, A2, A3, T0, T1, T2, T3];
static PROMOTABLE_CORE: [Reg; 6] = [Reg(16), Reg(17), Reg(18), Reg(19), Reg(20), Reg(21)];

#[derive(Clone, Copy, Debug, PartialEq, EnumCount)]
#[repr(u8)]
pub(crate) enum Op {
    Nop,
    /// move rd, rs (addu rd, rs, zero)
    MoveRR,
    /// lui rt, #imm16
    Lui,
    /// ori rt, rs, #imm16
    Ori,
    /// xori rt, rs, #imm16
    Xori,
    /// addiu rt, rs, #imm16
    Addiu,
    /// slti rt, rs, #imm16
    Slti,
    /// sltiu rt, rs, #imm16
    Sltiu,
    /// lw rt, #disp(rs)
    Lw,
    /// sw rt, #disp(rs)
    Sw,
    /// addu rd, rs, rt
    Addu,
    /// subu rd, rs, rt
    Subu,
    /// and rd, rs, rt
    And,
    /// or rd, rs, rt
    Or,
    /// xor rd, rs, rt
    Xor,
    /// nor rd, rs, rt
    Nor,
    /// mul rd, rs, rt
    Mul,
    /// slt rd, rs, rt
    Slt,
    /// sltu rd, rs, rt
    Sltu,
    /// sllv rd, rt, rs; the amount rides in operand 2.
    Sllv,
    /// srlv rd, rt, rs
    Srlv,
    /// srav rd, rt, rs
    Srav,
    /// sll rd, rt, #sa
    Sll,
    /// sra rd, rt, #sa
    Sra,
    /// beq rs, rt, <label>
    Beq,
    /// bne rs, rt, <label>
    Bne,
    /// bltz rs, <label>
    Bltz,
    /// bgez rs, <label>
    Bgez,
    /// bgtz rs, <label>
    Bgtz,
    /// blez rs, <label>
    Blez,
    /// b <label>
    B,
    /// jr rs
    Jr,
    /// jalr rs
    Jalr,
    /// The fused table-address sequence: `bal .+8; nop; addiu rd, ra, #delta`, widened to
    /// a `lui`/`ori`/`addu` through `at` when the delta outgrows 15 bits.
    LoadTableAddr,
    /// sync
    Sync,
}

static OPINFO: [OpInfo; Op::COUNT] = [
    OpInfo {
        name: "nop",
        flags: OpFlags::none(),
    },
    OpInfo {
        name: "move",
        flags: OpFlags::none().def0().use1(),
    },
    OpInfo {
        name: "lui",
        flags: OpFlags::none().def0(),
    },
    OpInfo {
        name: "ori",
        flags: OpFlags::none().def0().use1(),
    },
    OpInfo {
        name: "xori",
        flags: OpFlags::none().def0().use1(),
    },
    OpInfo {
        name: "addiu",
        flags: OpFlags::none().def0().use1(),
    },
    OpInfo {
        name: "slti",
        flags: OpFlags::none().def0().use1(),
    },
    OpInfo {
        name: "sltiu",
        flags: OpFlags::none().def0().use1(),
    },
    OpInfo {
        name: "lw",
        flags: OpFlags::none().def0().use1().load(),
    },
    OpInfo {
        name: "sw",
        flags: OpFlags::none().use0().use1().store(),
    },
    OpInfo {
        name: "addu",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "subu",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "and",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "or",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "xor",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "nor",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "mul",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "slt",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "sltu",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "sllv",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "srlv",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "srav",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "sll",
        flags: OpFlags::none().def0().use1(),
    },
    OpInfo {
        name: "sra",
        flags: OpFlags::none().def0().use1(),
    },
    OpInfo {
        name: "beq",
        flags: OpFlags::none().branch().needs_fixup(),
    },
    OpInfo {
        name: "bne",
        flags: OpFlags::none().branch().needs_fixup(),
    },
    OpInfo {
        name: "bltz",
        flags: OpFlags::none().branch().needs_fixup(),
    },
    OpInfo {
        name: "bgez",
        flags: OpFlags::none().branch().needs_fixup(),
    },
    OpInfo {
        name: "bgtz",
        flags: OpFlags::none().branch().needs_fixup(),
    },
    OpInfo {
        name: "blez",
        flags: OpFlags::none().branch().needs_fixup(),
    },
    OpInfo {
        name: "b",
        flags: OpFlags::none().branch().needs_fixup(),
    },
    OpInfo {
        name: "jr",
        flags: OpFlags::none().branch(),
    },
    OpInfo {
        name: "jalr",
        flags: OpFlags::none().branch().def_lr(),
    },
    OpInfo {
        name: "la",
        flags: OpFlags::none().def0().def_lr().needs_fixup(),
    },
    OpInfo {
        name: "sync",
        flags: OpFlags::none().load().store(),
    },
];

impl OpT for Op {
    fn info(&self) -> &'static OpInfo {
        &OPINFO[*self as usize]
    }
}

pub(crate) struct Mips;

impl Mips {
    /// `slt at, a, b`.
    fn slt(cg: &mut Cg<'_, Self>, a: Reg, b: Reg) {
        cg.lir.new_lir3(Op::Slt, AT.bit(), a.bit(), b.bit());
    }

    /// `sltu at, a, b`.
    fn sltu(cg: &mut Cg<'_, Self>, a: Reg, b: Reg) {
        cg.lir.new_lir3(Op::Sltu, AT.bit(), a.bit(), b.bit());
    }

    /// Materialise `base + %hi(disp)` in `at` and return the sign-carried low half.
    fn split_disp(cg: &mut Cg<'_, Self>, base: Reg, disp: i32) -> i32 {
        let hi = ((i64::from(disp) + 0x8000) >> 16) as i32;
        cg.lir.new_lir2(Op::Lui, AT.bit(), hi & 0xFFFF);
        cg.lir.new_lir3(Op::Addu, AT.bit(), AT.bit(), base.bit());
        i32::from(disp as i16)
    }
}

impl Isa for Mips {
    type Reg = Reg;
    type Op = Op;

    const NAME: &'static str = "mips";
    const FP_DOUBLE_SOLO: bool = false;

    fn self_reg() -> Reg {
        S6
    }

    fn sp_reg() -> Reg {
        SP
    }

    fn lr_reg() -> Option<Reg> {
        Some(RA)
    }

    fn pc_mask_bit() -> Option<u8> {
        None
    }

    fn arg_regs() -> &'static [Reg] {
        &ARG_REGS
    }

    fn ret_regs() -> (Reg, Reg) {
        (V0, V1)
    }

    fn core_temps() -> &'static [Reg] {
        &CORE_TEMPS
    }

    fn fp_temps() -> &'static [Reg] {
        &[]
    }

    fn promotable_core() -> &'static [Reg] {
        &PROMOTABLE_CORE
    }

    fn promotable_fp() -> &'static [Reg] {
        &[]
    }

    fn fixed_core_spills() -> u32 {
        1 << 31
    }

    fn fp_mask_base() -> u8 {
        32
    }

    fn in_arg_bias() -> i32 {
        0
    }

    fn op_reg_copy(cg: &mut Cg<'_, Self>, dst: Reg, src: Reg) {
        cg.lir.new_lir2(Op::MoveRR, dst.bit(), src.bit());
    }

    fn load_const(cg: &mut Cg<'_, Self>, dst: Reg, val: i32) {
        if i16::try_from(val).is_ok() {
            cg.lir.new_lir3(Op::Addiu, dst.bit(), ZERO.bit(), val);
        } else if val & 0xFFFF == 0 {
            cg.lir.new_lir2(Op::Lui, dst.bit(), (val >> 16) & 0xFFFF);
        } else if (0..=0xFFFF).contains(&val) {
            cg.lir.new_lir3(Op::Ori, dst.bit(), ZERO.bit(), val);
        } else {
            cg.lir.new_lir2(Op::Lui, dst.bit(), (val >> 16) & 0xFFFF);
            cg.lir.new_lir3(Op::Ori, dst.bit(), dst.bit(), val & 0xFFFF);
        }
    }

    fn load_const_wide(cg: &mut Cg<'_, Self>, lo: Reg, hi: Reg, val: i64) {
        Self::load_const(cg, lo, val as i32);
        Self::load_const(cg, hi, (val >> 32) as i32);
    }

    fn load_word(cg: &mut Cg<'_, Self>, dst: Reg, base: Reg, disp: i32) -> LirIdx {
        if i16::try_from(disp).is_ok() {
            cg.lir.new_lir3(Op::Lw, dst.bit(), base.bit(), disp)
        } else {
            let lo = Self::split_disp(cg, base, disp);
            cg.lir.new_lir3(Op::Lw, dst.bit(), AT.bit(), lo)
        }
    }

    fn store_word(cg: &mut Cg<'_, Self>, src: Reg, base: Reg, disp: i32) -> LirIdx {
        if i16::try_from(disp).is_ok() {
            cg.lir.new_lir3(Op::Sw, src.bit(), base.bit(), disp)
        } else {
            let lo = Self::split_disp(cg, base, disp);
            cg.lir.new_lir3(Op::Sw, src.bit(), AT.bit(), lo)
        }
    }

    fn load_pair(cg: &mut Cg<'_, Self>, lo: Reg, hi: Reg, base: Reg, disp: i32) -> LirIdx {
        // High first in case the base aliases the low half.
        Self::load_word(cg, hi, base, disp + 4);
        Self::load_word(cg, lo, base, disp)
    }

    fn store_pair(cg: &mut Cg<'_, Self>, lo: Reg, hi: Reg, base: Reg, disp: i32) -> LirIdx {
        let s = Self::store_word(cg, lo, base, disp);
        Self::store_word(cg, hi, base, disp + 4);
        s
    }

    fn load_indexed(
        cg: &mut Cg<'_, Self>,
        dst: Reg,
        base: Reg,
        idx: Reg,
        scale: u8,
        disp: i32,
    ) -> Result<(), CompileError> {
        cg.lir
            .new_lir3(Op::Sll, AT.bit(), idx.bit(), i32::from(scale));
        cg.lir.new_lir3(Op::Addu, AT.bit(), base.bit(), AT.bit());
        cg.lir.new_lir3(Op::Lw, dst.bit(), AT.bit(), disp);
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
        cg.lir
            .new_lir3(Op::Sll, AT.bit(), idx.bit(), i32::from(scale));
        cg.lir.new_lir3(Op::Addu, AT.bit(), base.bit(), AT.bit());
        cg.lir.new_lir3(Op::Sw, src.bit(), AT.bit(), disp);
        Ok(())
    }

    fn op_un(cg: &mut Cg<'_, Self>, kind: UnKind, dst: Reg, src: Reg) {
        match kind {
            UnKind::Neg => cg
                .lir
                .new_lir3(Op::Subu, dst.bit(), ZERO.bit(), src.bit()),
            UnKind::Not => cg.lir.new_lir3(Op::Nor, dst.bit(), src.bit(), ZERO.bit()),
        };
    }

    fn op_bin(
        cg: &mut Cg<'_, Self>,
        kind: BinKind,
        dst: Reg,
        lhs: Reg,
        rhs: Reg,
    ) -> Result<(), CompileError> {
        let op = match kind {
            BinKind::Add => Op::Addu,
            BinKind::Sub => Op::Subu,
            BinKind::Mul => Op::Mul,
            BinKind::And => Op::And,
            BinKind::Or => Op::Or,
            BinKind::Xor => Op::Xor,
            BinKind::Shl => Op::Sllv,
            BinKind::Shr => Op::Srav,
            BinKind::Ushr => Op::Srlv,
            BinKind::Div | BinKind::Rem => {
                return Err(CompileError::Internal(
                    "integer division reached the emitter".to_owned(),
                ))
            }
        };
        cg.lir.new_lir3(op, dst.bit(), lhs.bit(), rhs.bit());
        Ok(())
    }

    fn op_bin_imm(
        cg: &mut Cg<'_, Self>,
        kind: BinKind,
        dst: Reg,
        src: Reg,
        imm: i32,
    ) -> Result<(), CompileError> {
        match kind {
            BinKind::Add | BinKind::Sub => {
                let v = if kind == BinKind::Add {
                    i64::from(imm)
                } else {
                    -i64::from(imm)
                };
                if let Ok(v16) = i16::try_from(v) {
                    cg.lir
                        .new_lir3(Op::Addiu, dst.bit(), src.bit(), i32::from(v16));
                } else {
                    Self::load_const(cg, AT, imm);
                    let op = if kind == BinKind::Add {
                        Op::Addu
                    } else {
                        Op::Subu
                    };
                    cg.lir.new_lir3(op, dst.bit(), src.bit(), AT.bit());
                }
            }
            BinKind::Shr => {
                cg.lir.new_lir3(Op::Sra, dst.bit(), src.bit(), imm & 31);
            }
            _ => {
                return Err(CompileError::Internal(format!(
                    "no immediate form for {kind:?}"
                )))
            }
        }
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
        match kind {
            BinKind::Add => {
                cg.lir
                    .new_lir3(Op::Addu, d_lo.bit(), l_lo.bit(), r_lo.bit());
                // Unsigned carry: the low sum wrapped iff it is below either addend.
                Self::sltu(cg, d_lo, r_lo);
                cg.lir
                    .new_lir3(Op::Addu, d_hi.bit(), l_hi.bit(), r_hi.bit());
                cg.lir.new_lir3(Op::Addu, d_hi.bit(), d_hi.bit(), AT.bit());
            }
            BinKind::Sub => {
                // Borrow read before the low halves are modified.
                Self::sltu(cg, l_lo, r_lo);
                cg.lir
                    .new_lir3(Op::Subu, d_lo.bit(), l_lo.bit(), r_lo.bit());
                cg.lir
                    .new_lir3(Op::Subu, d_hi.bit(), l_hi.bit(), r_hi.bit());
                cg.lir.new_lir3(Op::Subu, d_hi.bit(), d_hi.bit(), AT.bit());
            }
            BinKind::And | BinKind::Or | BinKind::Xor => {
                let op = match kind {
                    BinKind::And => Op::And,
                    BinKind::Or => Op::Or,
                    _ => Op::Xor,
                };
                cg.lir.new_lir3(op, d_lo.bit(), l_lo.bit(), r_lo.bit());
                cg.lir.new_lir3(op, d_hi.bit(), l_hi.bit(), r_hi.bit());
            }
            _ => {
                return Err(CompileError::Internal(format!(
                    "wide {kind:?} reached the emitter"
                )))
            }
        }
        Ok(())
    }

    fn op_fp_bin(
        _cg: &mut Cg<'_, Self>,
        kind: FpBinKind,
        _wide: bool,
        _dst: Reg,
        _lhs: Reg,
        _rhs: Reg,
    ) -> Result<(), CompileError> {
        Err(CompileError::Internal(format!(
            "fp {kind:?} reached a soft-float emitter"
        )))
    }

    fn branch(cg: &mut Cg<'_, Self>) -> LirIdx {
        let b = cg.lir.new_lir0(Op::B);
        cg.lir.new_lir0(Op::Nop);
        b
    }

    fn cond_branch(cg: &mut Cg<'_, Self>, cond: Cond, lhs: Reg, rhs: Reg) -> LirIdx {
        let b = match cond {
            Cond::Eq => cg.lir.new_lir2(Op::Beq, lhs.bit(), rhs.bit()),
            Cond::Ne => cg.lir.new_lir2(Op::Bne, lhs.bit(), rhs.bit()),
            Cond::Lt => {
                Self::slt(cg, lhs, rhs);
                cg.lir.new_lir2(Op::Bne, AT.bit(), ZERO.bit())
            }
            Cond::Ge => {
                Self::slt(cg, lhs, rhs);
                cg.lir.new_lir2(Op::Beq, AT.bit(), ZERO.bit())
            }
            Cond::Gt => {
                Self::slt(cg, rhs, lhs);
                cg.lir.new_lir2(Op::Bne, AT.bit(), ZERO.bit())
            }
            Cond::Le => {
                Self::slt(cg, rhs, lhs);
                cg.lir.new_lir2(Op::Beq, AT.bit(), ZERO.bit())
            }
            Cond::Hs => {
                Self::sltu(cg, lhs, rhs);
                cg.lir.new_lir2(Op::Beq, AT.bit(), ZERO.bit())
            }
            Cond::Lo => {
                Self::sltu(cg, lhs, rhs);
                cg.lir.new_lir2(Op::Bne, AT.bit(), ZERO.bit())
            }
        };
        cg.lir.new_lir0(Op::Nop);
        b
    }

    fn cond_branch_imm(cg: &mut Cg<'_, Self>, cond: Cond, src: Reg, imm: i32) -> LirIdx {
        let b = match (cond, imm) {
            (Cond::Eq, 0) => cg.lir.new_lir2(Op::Beq, src.bit(), ZERO.bit()),
            (Cond::Ne, 0) => cg.lir.new_lir2(Op::Bne, src.bit(), ZERO.bit()),
            (Cond::Lt, 0) => cg.lir.new_lir1(Op::Bltz, src.bit()),
            (Cond::Ge, 0) => cg.lir.new_lir1(Op::Bgez, src.bit()),
            (Cond::Gt, 0) => cg.lir.new_lir1(Op::Bgtz, src.bit()),
            (Cond::Le, 0) => cg.lir.new_lir1(Op::Blez, src.bit()),
            (Cond::Eq | Cond::Ne, _) => {
                if (0..=0xFFFF).contains(&imm) {
                    cg.lir.new_lir3(Op::Xori, AT.bit(), src.bit(), imm);
                } else {
                    Self::load_const(cg, AT, imm);
                    cg.lir.new_lir3(Op::Xor, AT.bit(), src.bit(), AT.bit());
                }
                let op = if cond == Cond::Eq { Op::Beq } else { Op::Bne };
                cg.lir.new_lir2(op, AT.bit(), ZERO.bit())
            }
            (Cond::Lt | Cond::Ge, _) => {
                if i16::try_from(imm).is_ok() {
                    cg.lir.new_lir3(Op::Slti, AT.bit(), src.bit(), imm);
                } else {
                    Self::load_const(cg, AT, imm);
                    Self::slt(cg, src, AT);
                }
                let op = if cond == Cond::Lt { Op::Bne } else { Op::Beq };
                cg.lir.new_lir2(op, AT.bit(), ZERO.bit())
            }
            (Cond::Gt | Cond::Le, _) => {
                // src > imm rewritten as imm < src, sparing a second scratch.
                Self::load_const(cg, AT, imm);
                cg.lir.new_lir3(Op::Slt, AT.bit(), AT.bit(), src.bit());
                let op = if cond == Cond::Gt { Op::Bne } else { Op::Beq };
                cg.lir.new_lir2(op, AT.bit(), ZERO.bit())
            }
            (Cond::Hs | Cond::Lo, _) => {
                if (1..=0x7FFF).contains(&imm) {
                    cg.lir.new_lir3(Op::Sltiu, AT.bit(), src.bit(), imm);
                } else {
                    Self::load_const(cg, AT, imm);
                    Self::sltu(cg, src, AT);
                }
                let op = if cond == Cond::Lo { Op::Bne } else { Op::Beq };
                cg.lir.new_lir2(op, AT.bit(), ZERO.bit())
            }
        };
        cg.lir.new_lir0(Op::Nop);
        b
    }

    fn jump_reg(cg: &mut Cg<'_, Self>, r: Reg) {
        cg.lir.new_lir1(Op::Jr, r.bit());
        cg.lir.new_lir0(Op::Nop);
    }

    fn mem_barrier(cg: &mut Cg<'_, Self>) {
        cg.lir.new_lir0(Op::Sync);
    }

    fn helper_args2(cg: &mut Cg<'_, Self>, a_bit: i32, b_bit: i32) {
        let a = Reg::from_bit(a_bit);
        let b = Reg::from_bit(b_bit);
        if b == A0 && a == A1 {
            Self::op_reg_copy(cg, AT, A0);
            Self::op_reg_copy(cg, A0, A1);
            Self::op_reg_copy(cg, A1, AT);
        } else if b == A0 {
            Self::op_reg_copy(cg, A1, A0);
            if a != A0 {
                Self::op_reg_copy(cg, A0, a);
            }
        } else {
            if a != A0 {
                Self::op_reg_copy(cg, A0, a);
            }
            if b != A1 {
                Self::op_reg_copy(cg, A1, b);
            }
        }
    }

    fn helper_arg_regs() -> [Reg; 3] {
        [A0, A1, A2]
    }

    fn call_helper(cg: &mut Cg<'_, Self>, h: Helper) {
        Self::load_word(cg, T9, S6, h.self_disp());
        cg.lir.new_lir1(Op::Jalr, T9.bit());
        cg.lir.new_lir0(Op::Nop);
    }

    fn load_patchable(cg: &mut Cg<'_, Self>, dst: Reg, method_idx: u32, kind: PatchKind) {
        let l = cg
            .lir
            .new_lir2(Op::Lui, dst.bit(), ((method_idx >> 16) & 0xFFFF) as i32);
        cg.lir
            .new_lir3(Op::Ori, dst.bit(), dst.bit(), (method_idx & 0xFFFF) as i32);
        cg.patches.push(PatchPoint {
            node: l,
            adjust: 0,
            form: PatchForm::PairHiLo,
            method_idx,
            kind,
        });
    }

    fn emit_call_reg(cg: &mut Cg<'_, Self>, target: Reg) {
        cg.lir.new_lir1(Op::Jalr, target.bit());
        cg.lir.new_lir0(Op::Nop);
    }

    fn invoke_target_reg() -> Reg {
        T9
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
        callseq::next_call_insn_std::<Self>(cg, info, state, T9, SP)
    }

    fn emit_entry(cg: &mut Cg<'_, Self>) -> Result<(), CompileError> {
        // Trap entry if sp would drop below the guard limit once the frame is in place.
        Self::load_word(cg, T0, S6, abi::SELF_STACK_LIMIT_OFF);
        Self::op_bin_imm(cg, BinKind::Add, T0, T0, cg.frame_size as i32)?;
        let b = Self::cond_branch(cg, Cond::Lo, SP, T0);
        let pad = launchpad::add_pad(cg, PadKind::StackOverflow, [0, 0]);
        cg.lir.set_target(b, pad);

        Self::op_bin_imm(cg, BinKind::Sub, SP, SP, cg.frame_size as i32)?;
        // ra at the frame top, promoted homes below it, all inside frame_size.
        let mut slot = cg.frame_size as i32 - 4;
        Self::store_word(cg, RA, SP, slot);
        slot -= 4;
        for bit in 0..31u8 {
            if cg.core_spill_mask & (1 << bit) != 0 {
                Self::store_word(cg, Reg(bit), SP, slot);
                slot -= 4;
            }
        }
        let first_in = usize::from(cg.m.num_vregs - cg.m.num_ins);
        for (i, &r) in ARG_REGS
            .iter()
            .enumerate()
            .take(usize::from(cg.m.num_ins))
        {
            let v = VReg::from_usize(first_in + i);
            let s = Self::store_word(cg, r, SP, cg.vreg_disp(v));
            cg.lir.annotate_frame_ref(s, v);
        }
        Ok(())
    }

    fn emit_exit(cg: &mut Cg<'_, Self>) -> Result<(), CompileError> {
        let mut slot = cg.frame_size as i32 - 4;
        Self::load_word(cg, RA, SP, slot);
        slot -= 4;
        for bit in 0..31u8 {
            if cg.core_spill_mask & (1 << bit) != 0 {
                Self::load_word(cg, Reg(bit), SP, slot);
                slot -= 4;
            }
        }
        Self::op_bin_imm(cg, BinKind::Add, SP, SP, cg.frame_size as i32)?;
        cg.lir.new_lir1(Op::Jr, RA.bit());
        cg.lir.new_lir0(Op::Nop);
        Ok(())
    }

    fn op_size(lir: &Lir<Op>, _off: u32) -> u32 {
        match lir.op.real() {
            Some(Op::LoadTableAddr) => {
                if lir.widened {
                    20
                } else {
                    12
                }
            }
            Some(_) => 4,
            None => 0,
        }
    }

    fn encode(cg: &Cg<'_, Self>, idx: LirIdx, code: &mut Vec<u8>) -> EncodeOutcome {
        encode_one(cg, idx, code)
    }
}

fn r_type(funct: u32, rs: u16, rt: u16, rd: u16, sa: u16) -> u32 {
    u32::from(rs) << 21 | u32::from(rt) << 16 | u32::from(rd) << 11 | u32::from(sa) << 6 | funct
}

fn i_type(op: u32, rs: u16, rt: u16, imm: i32) -> u32 {
    op << 26 | u32::from(rs) << 21 | u32::from(rt) << 16 | (imm as u32 & 0xFFFF)
}

fn encode_one(cg: &Cg<'_, Mips>, idx: LirIdx, code: &mut Vec<u8>) -> EncodeOutcome {
    let lir = &cg.lir[idx];
    let Some(op) = lir.op.real() else {
        return EncodeOutcome::Done;
    };
    let ops = &lir.operands;
    let off = lir.offset;
    let r = |i: usize| ops[i] as u16;

    // Branch displacement in words, relative to the delay slot.
    let branch_words = |cg: &Cg<'_, Mips>| -> Option<i32> {
        let t = lir.target.map(|t| cg.lir[t].offset).unwrap_or(u32::MAX);
        let delta = i64::from(t) - i64::from(off) - 4;
        let words = delta >> 2;
        if (-32768..=32767).contains(&words) {
            Some(words as i32)
        } else {
            None
        }
    };

    let word = match op {
        Op::Nop => 0,
        Op::MoveRR => r_type(0x21, r(1), 0, r(0), 0),
        Op::Lui => i_type(0xF, 0, r(0), ops[1]),
        Op::Ori => i_type(0xD, r(1), r(0), ops[2]),
        Op::Xori => i_type(0xE, r(1), r(0), ops[2]),
        Op::Addiu => i_type(0x9, r(1), r(0), ops[2]),
        Op::Slti => i_type(0xA, r(1), r(0), ops[2]),
        Op::Sltiu => i_type(0xB, r(1), r(0), ops[2]),
        Op::Lw => i_type(0x23, r(1), r(0), ops[2]),
        Op::Sw => i_type(0x2B, r(1), r(0), ops[2]),
        Op::Addu => r_type(0x21, r(1), r(2), r(0), 0),
        Op::Subu => r_type(0x23, r(1), r(2), r(0), 0),
        Op::And => r_type(0x24, r(1), r(2), r(0), 0),
        Op::Or => r_type(0x25, r(1), r(2), r(0), 0),
        Op::Xor => r_type(0x26, r(1), r(2), r(0), 0),
        Op::Nor => r_type(0x27, r(1), r(2), r(0), 0),
        Op::Mul => 0x70000002 | r_type(0, r(1), r(2), r(0), 0),
        Op::Slt => r_type(0x2A, r(1), r(2), r(0), 0),
        Op::Sltu => r_type(0x2B, r(1), r(2), r(0), 0),
        // Shift-variable forms carry the amount in rs.
        Op::Sllv => r_type(0x04, r(2), r(1), r(0), 0),
        Op::Srlv => r_type(0x06, r(2), r(1), r(0), 0),
        Op::Srav => r_type(0x07, r(2), r(1), r(0), 0),
        Op::Sll => r_type(0x00, 0, r(1), r(0), r(2)),
        Op::Sra => r_type(0x03, 0, r(1), r(0), r(2)),
        Op::Beq | Op::Bne => {
            let Some(w) = branch_words(cg) else {
                return EncodeOutcome::OutOfRange;
            };
            let o = if op == Op::Beq { 0x4 } else { 0x5 };
            i_type(o, r(0), r(1), w)
        }
        Op::Bltz | Op::Bgez => {
            let Some(w) = branch_words(cg) else {
                return EncodeOutcome::OutOfRange;
            };
            let rt = u16::from(op == Op::Bgez);
            i_type(0x1, r(0), rt, w)
        }
        Op::Bgtz | Op::Blez => {
            let Some(w) = branch_words(cg) else {
                return EncodeOutcome::OutOfRange;
            };
            let o = if op == Op::Bgtz { 0x7 } else { 0x6 };
            i_type(o, r(0), 0, w)
        }
        Op::B => {
            let Some(w) = branch_words(cg) else {
                return EncodeOutcome::OutOfRange;
            };
            i_type(0x4, 0, 0, w)
        }
        Op::Jr => r_type(0x08, r(0), 0, 0, 0),
        Op::Jalr => r_type(0x09, r(0), 0, 31, 0),
        Op::Sync => 0xF,
        Op::LoadTableAddr => {
            let tab = table_offset(cg, ops[1], ops[2]);
            // bal .+8 leaves the address of its own +8 in ra.
            let delta = i64::from(tab) - i64::from(off) - 8;
            if !lir.widened && !(0..=0x7FFF).contains(&delta) {
                return EncodeOutcome::OutOfRange;
            }
            asm::push_u32(code, 0x0411_0001);
            asm::push_u32(code, 0);
            if !lir.widened {
                asm::push_u32(code, i_type(0x9, 31, r(0), delta as i32));
            } else {
                asm::push_u32(code, i_type(0xF, 0, AT.num(), ((delta >> 16) & 0xFFFF) as i32));
                asm::push_u32(code, i_type(0xD, AT.num(), AT.num(), (delta & 0xFFFF) as i32));
                asm::push_u32(code, r_type(0x21, 31, AT.num(), r(0), 0));
            }
            return EncodeOutcome::Done;
        }
    };
    asm::push_u32(code, word);
    EncodeOutcome::Done
}

fn table_offset(cg: &Cg<'_, Mips>, kind: i32, idx: i32) -> u32 {
    if kind == 0 {
        cg.data.switch_tables[idx as usize].offset
    } else {
        cg.data.fill_items[idx as usize].offset
    }
}
