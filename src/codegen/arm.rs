//! The ARM backend: Thumb-2 with VFP.
//!
//! Register conventions: `r9` is the reserved self register, `r6` the reserved emission
//! scratch, `r12` the invocation target (also a pool temp between calls). The temp pool is
//! `r0`-`r3` plus `r12`; `r4`, `r5`, `r7`, `r8`, `r10`, `r11` and `s16`-`s23` are promotion
//! homes. Arguments travel in `r0`-`r3`, results in `r0`/`r1` whatever their type.
//!
//! Instructions encode as Thumb halfword pairs. Short encodings are preferred and the
//! assembler widens pc-relative forms ([Op::BCond], [Op::B], the literal loads and
//! [Op::AdrTable]) on demand. Constants that neither `movs` nor `movw` can carry come from
//! the literal pool.

use crate::{
    codegen::{
        abi,
        asm::{self, EncodeOutcome},
        callseq::{self, CallInfo},
        launchpad::{self, PadKind},
        lir::{Lir, LirIdx, OpFlags, OpInfo, OpT},
        litpool,
        mir_to_lir::{Isa, TableRef},
        regalloc::{self, RegClass, RegT},
        Cg, CompileError, Helper, PatchForm, PatchKind, PatchPoint,
    },
    mir::{BinKind, Cond, FpBinKind, UnKind, VReg},
};
use std::fmt;
use strum::EnumCount;

/// An ARM register, identified by its resource-mask bit: `r0`-`r15` are bits 0-15 and
/// `s0`-`s31` are bits 16-47.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Reg(u8);

impl Reg {
    const fn core(n: u8) -> Self {
        Reg(n)
    }

    const fn s(n: u8) -> Self {
        Reg(16 + n)
    }

    fn from_bit(bit: i32) -> Self {
        Reg(bit as u8)
    }

    fn bit(self) -> i32 {
        i32::from(self.0)
    }

    /// Core register number, for encoding.
    fn num(self) -> u16 {
        debug_assert!(self.0 < 16);
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
        (16..48).contains(&self.0)
    }

    fn is_caller_saved(&self) -> bool {
        matches!(self.0, 0..=3 | 12 | 14) || (16..32).contains(&self.0)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            13 => write!(f, "sp"),
            14 => write!(f, "lr"),
            15 => write!(f, "pc"),
            n if n < 13 => write!(f, "r{n}"),
            n if n < 48 => write!(f, "s{}", n - 16),
            _ => write!(f, "r?"),
        }
    }
}

const R0: Reg = Reg::core(0);
const R1: Reg = Reg::core(1);
const R2: Reg = Reg::core(2);
const R3: Reg = Reg::core(3);
const R4: Reg = Reg::core(4);
const R5: Reg = Reg::core(5);
/// Reserved emission scratch: never pooled, never promoted, so displacement and immediate
/// overflow paths can always materialise through it.
const R6: Reg = Reg::core(6);
const R7: Reg = Reg::core(7);
const R8: Reg = Reg::core(8);
/// Reserved self register.
const R9: Reg = Reg::core(9);
const R10: Reg = Reg::core(10);
const R11: Reg = Reg::core(11);
const R12: Reg = Reg::core(12);
const SP: Reg = Reg::core(13);
const LR: Reg = Reg::core(14);

static ARG_REGS: [Reg; 4] = [R0, R1, R2, R3];
static CORE_TEMPS: [Reg; 5] = [R0, R1, R2, R3, R12];
static FP_TEMPS: [Reg; 16] = [
    Reg::s(0),
    Reg::s(1),
    Reg::s(2),
    Reg::s(3),
    Reg::s(4),
    Reg::s(5),
    Reg::s(6),
    Reg::s(7),
    Reg::s(8),
    Reg::s(9),
    Reg::s(10),
    Reg::s(11),
    Reg::s(12),
    Reg::s(13),
    Reg::s(14),
    Reg::s(15),
];
static PROMOTABLE_CORE: [Reg; 6] = [R4, R5, R7, R8, R10, R11];
static PROMOTABLE_FP: [Reg; 8] = [
    Reg::s(16),
    Reg::s(17),
    Reg::s(18),
    Reg::s(19),
    Reg::s(20),
    Reg::s(21),
    Reg::s(22),
    Reg::s(23),
];

/// The ARM condition-code field value for `cond`.
fn cc(cond: Cond) -> i32 {
    match cond {
        Cond::Eq => 0,
        Cond::Ne => 1,
        Cond::Hs => 2,
        Cond::Lo => 3,
        Cond::Ge => 10,
        Cond::Lt => 11,
        Cond::Gt => 12,
        Cond::Le => 13,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, EnumCount)]
#[repr(u8)]
pub(crate) enum Op {
    /// mov rd, rm
    MovRR,
    /// vmov rt, sn
    VmovRS,
    /// vmov sn, rt
    VmovSR,
    /// vmov.f32 sd, sm
    VmovSS,
    /// movs rd, #imm8
    MovImm8,
    /// movw rd, #imm16
    MovwImm,
    /// movt rd, #imm16
    MovtImm,
    /// ldr rt, <literal>
    LdrPcRel,
    /// ldrd rt, rt2, <literal pair>; operands 2 and 3 carry the value halves for the
    /// widened movw/movt rendition.
    LdrdPcRel,
    /// adr rd, <data table>
    AdrTable,
    /// ldr rt, [rn, #disp]
    LdrRRI,
    /// str rt, [rn, #disp]
    StrRRI,
    /// ldrd rt, rt2, [rn, #disp]
    LdrdRRI,
    /// strd rt, rt2, [rn, #disp]
    StrdRRI,
    /// vldr st, [rn, #disp]
    VldrS,
    /// vstr st, [rn, #disp]
    VstrS,
    /// vldr dt, [rn, #disp]; operand 0 is the low s register of the pair.
    VldrD,
    /// vstr dt, [rn, #disp]
    VstrD,
    /// adds rd, rn, rm
    AddRRR,
    /// adds rd, rn, #imm
    AddRRI,
    /// add rd, rn, rm, lsl #sh
    AddRRShift,
    /// subs rd, rn, rm
    SubRRR,
    /// subs rd, rn, #imm
    SubRRI,
    /// rsb rd, rn, #0
    RsbImm0,
    /// adc rd, rn, rm
    AdcRRR,
    /// sbc rd, rn, rm
    SbcRRR,
    /// and rd, rn, rm
    AndRRR,
    /// orr rd, rn, rm
    OrrRRR,
    /// orr rd, rn, #imm8
    OrrImm,
    /// eor rd, rn, rm
    EorRRR,
    /// mvn rd, rm
    MvnRR,
    /// mul rd, rn, rm
    MulRRR,
    /// lsl rd, rn, rm
    LslRRR,
    /// lsr rd, rn, rm
    LsrRRR,
    /// asr rd, rn, rm
    AsrRRR,
    /// asr rd, rm, #imm
    AsrRRI,
    /// cmp rn, rm
    CmpRR,
    /// cmp rn, #imm8
    CmpRI,
    /// b<cond> <label>; operand 0 is the condition-code field.
    BCond,
    /// b <label>
    B,
    /// bx rm
    Bx,
    /// blx rm
    BlxR,
    /// push {list}; operand 0 is the core register list.
    Push,
    /// pop {list}; restores pc, so it terminates the method.
    Pop,
    /// vpush {s<first>-s<first+count-1>}
    Vpush,
    /// vpop {s<first>-s<first+count-1>}
    Vpop,
    /// sub sp, #imm
    SubSpImm,
    /// add sp, #imm
    AddSpImm,
    /// vadd.f32/.f64 d, n, m; operand 3 selects double.
    VaddF,
    /// vsub.f32/.f64
    VsubF,
    /// vmul.f32/.f64
    VmulF,
    /// vdiv.f32/.f64
    VdivF,
    /// dmb ish
    Dmb,
}

static OPINFO: [OpInfo; Op::COUNT] = [
    OpInfo {
        name: "mov",
        flags: OpFlags::none().def0().use1(),
    },
    OpInfo {
        name: "vmov",
        flags: OpFlags::none().def0().use1(),
    },
    OpInfo {
        name: "vmov",
        flags: OpFlags::none().def0().use1(),
    },
    OpInfo {
        name: "vmov.f32",
        flags: OpFlags::none().def0().use1(),
    },
    OpInfo {
        name: "movs",
        flags: OpFlags::none().def0().sets_cc(),
    },
    OpInfo {
        name: "movw",
        flags: OpFlags::none().def0(),
    },
    OpInfo {
        name: "movt",
        flags: OpFlags::none().def0().use0(),
    },
    OpInfo {
        name: "ldr",
        flags: OpFlags::none().def0().load().use_pc().needs_fixup(),
    },
    OpInfo {
        name: "ldrd",
        flags: OpFlags::none().def0().def1().load().use_pc().needs_fixup(),
    },
    OpInfo {
        name: "adr",
        flags: OpFlags::none().def0().use_pc().needs_fixup(),
    },
    OpInfo {
        name: "ldr",
        flags: OpFlags::none().def0().use1().load(),
    },
    OpInfo {
        name: "str",
        flags: OpFlags::none().use0().use1().store(),
    },
    OpInfo {
        name: "ldrd",
        flags: OpFlags::none().def0().def1().use2().load(),
    },
    OpInfo {
        name: "strd",
        flags: OpFlags::none().use0().use1().use2().store(),
    },
    OpInfo {
        name: "vldr",
        flags: OpFlags::none().def0().use1().load(),
    },
    OpInfo {
        name: "vstr",
        flags: OpFlags::none().use0().use1().store(),
    },
    OpInfo {
        name: "vldr.64",
        flags: OpFlags::none().def0().use1().load(),
    },
    OpInfo {
        name: "vstr.64",
        flags: OpFlags::none().use0().use1().store(),
    },
    OpInfo {
        name: "adds",
        flags: OpFlags::none().def0().use1().use2().sets_cc(),
    },
    OpInfo {
        name: "adds",
        flags: OpFlags::none().def0().use1().sets_cc(),
    },
    OpInfo {
        name: "add",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "subs",
        flags: OpFlags::none().def0().use1().use2().sets_cc(),
    },
    OpInfo {
        name: "subs",
        flags: OpFlags::none().def0().use1().sets_cc(),
    },
    OpInfo {
        name: "rsb",
        flags: OpFlags::none().def0().use1(),
    },
    OpInfo {
        name: "adc",
        flags: OpFlags::none().def0().use1().use2().uses_cc(),
    },
    OpInfo {
        name: "sbc",
        flags: OpFlags::none().def0().use1().use2().uses_cc(),
    },
    OpInfo {
        name: "and",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "orr",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "orr",
        flags: OpFlags::none().def0().use1(),
    },
    OpInfo {
        name: "eor",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "mvn",
        flags: OpFlags::none().def0().use1(),
    },
    OpInfo {
        name: "mul",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "lsl",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "lsr",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "asr",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "asr",
        flags: OpFlags::none().def0().use1(),
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
        name: "bcc",
        flags: OpFlags::none().branch().uses_cc().needs_fixup(),
    },
    OpInfo {
        name: "b",
        flags: OpFlags::none().branch().needs_fixup(),
    },
    OpInfo {
        name: "bx",
        flags: OpFlags::none().branch(),
    },
    OpInfo {
        name: "blx",
        flags: OpFlags::none().branch().def_lr(),
    },
    OpInfo {
        name: "push",
        flags: OpFlags::none().use_list0().store().use_sp().def_sp(),
    },
    OpInfo {
        name: "pop",
        flags: OpFlags::none().branch().load(),
    },
    OpInfo {
        name: "vpush",
        flags: OpFlags::none().store().use_sp().def_sp(),
    },
    OpInfo {
        name: "vpop",
        flags: OpFlags::none().load().use_sp().def_sp(),
    },
    OpInfo {
        name: "sub",
        flags: OpFlags::none().use_sp().def_sp(),
    },
    OpInfo {
        name: "add",
        flags: OpFlags::none().use_sp().def_sp(),
    },
    OpInfo {
        name: "vadd",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "vsub",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "vmul",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "vdiv",
        flags: OpFlags::none().def0().use1().use2(),
    },
    OpInfo {
        name: "dmb",
        flags: OpFlags::none().load().store(),
    },
];

impl OpT for Op {
    fn info(&self) -> &'static OpInfo {
        &OPINFO[*self as usize]
    }
}

pub(crate) struct Arm;

impl Arm {
    /// Materialise `base + disp` in the emission scratch when a displacement does not fit
    /// the addressing mode.
    fn base_plus(cg: &mut Cg<'_, Self>, base: Reg, disp: i32) -> Reg {
        Self::load_const(cg, R6, disp);
        cg.lir
            .new_lir3(Op::AddRRR, R6.bit(), R6.bit(), base.bit());
        R6
    }
}

/// Does `disp` fit a vldr/vstr/ldrd word-scaled immediate?
fn vfp_disp(disp: i32) -> bool {
    (0..=1020).contains(&disp) && disp % 4 == 0
}

impl Isa for Arm {
    type Reg = Reg;
    type Op = Op;

    const NAME: &'static str = "arm";
    const FP_DOUBLE_SOLO: bool = false;

    fn self_reg() -> Reg {
        R9
    }

    fn sp_reg() -> Reg {
        SP
    }

    fn lr_reg() -> Option<Reg> {
        Some(LR)
    }

    fn pc_mask_bit() -> Option<u8> {
        Some(15)
    }

    fn arg_regs() -> &'static [Reg] {
        &ARG_REGS
    }

    fn ret_regs() -> (Reg, Reg) {
        (R0, R1)
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
        &PROMOTABLE_FP
    }

    fn fixed_core_spills() -> u32 {
        1 << 14
    }

    fn fp_mask_base() -> u8 {
        16
    }

    fn in_arg_bias() -> i32 {
        0
    }

    fn op_reg_copy(cg: &mut Cg<'_, Self>, dst: Reg, src: Reg) {
        let op = match (dst.is_fp(), src.is_fp()) {
            (true, true) => Op::VmovSS,
            (true, false) => Op::VmovSR,
            (false, true) => Op::VmovRS,
            (false, false) => Op::MovRR,
        };
        cg.lir.new_lir2(op, dst.bit(), src.bit());
    }

    fn load_const(cg: &mut Cg<'_, Self>, dst: Reg, val: i32) {
        debug_assert!(!dst.is_fp());
        if (0..=255).contains(&val) && dst.num() < 8 {
            cg.lir.new_lir2(Op::MovImm8, dst.bit(), val);
        } else if val as u32 <= 0xFFFF {
            cg.lir.new_lir2(Op::MovwImm, dst.bit(), val);
        } else {
            let w = cg.data.find_or_add_word(&mut cg.lir, val, 0);
            let l = cg.lir.new_lir1(Op::LdrPcRel, dst.bit());
            litpool::link_literal_load(&mut cg.lir, l, w);
        }
    }

    fn load_const_wide(cg: &mut Cg<'_, Self>, lo: Reg, hi: Reg, val: i64) {
        let w = cg.data.add_wide(&mut cg.lir, val);
        let l = cg.lir.new_lir4(
            Op::LdrdPcRel,
            lo.bit(),
            hi.bit(),
            val as i32,
            (val >> 32) as i32,
        );
        litpool::link_literal_load(&mut cg.lir, l, w);
    }

    fn load_word(cg: &mut Cg<'_, Self>, dst: Reg, base: Reg, disp: i32) -> LirIdx {
        if dst.is_fp() {
            if vfp_disp(disp) {
                cg.lir.new_lir3(Op::VldrS, dst.bit(), base.bit(), disp)
            } else {
                let t = Self::base_plus(cg, base, disp);
                cg.lir.new_lir3(Op::VldrS, dst.bit(), t.bit(), 0)
            }
        } else if (-255..=4095).contains(&disp) {
            cg.lir.new_lir3(Op::LdrRRI, dst.bit(), base.bit(), disp)
        } else {
            let t = Self::base_plus(cg, base, disp);
            cg.lir.new_lir3(Op::LdrRRI, dst.bit(), t.bit(), 0)
        }
    }

    fn store_word(cg: &mut Cg<'_, Self>, src: Reg, base: Reg, disp: i32) -> LirIdx {
        if src.is_fp() {
            if vfp_disp(disp) {
                cg.lir.new_lir3(Op::VstrS, src.bit(), base.bit(), disp)
            } else {
                let t = Self::base_plus(cg, base, disp);
                cg.lir.new_lir3(Op::VstrS, src.bit(), t.bit(), 0)
            }
        } else if (-255..=4095).contains(&disp) {
            cg.lir.new_lir3(Op::StrRRI, src.bit(), base.bit(), disp)
        } else {
            let t = Self::base_plus(cg, base, disp);
            cg.lir.new_lir3(Op::StrRRI, src.bit(), t.bit(), 0)
        }
    }

    fn load_pair(cg: &mut Cg<'_, Self>, lo: Reg, hi: Reg, base: Reg, disp: i32) -> LirIdx {
        if lo.is_fp() {
            if vfp_disp(disp) {
                cg.lir.new_lir3(Op::VldrD, lo.bit(), base.bit(), disp)
            } else {
                let t = Self::base_plus(cg, base, disp);
                cg.lir.new_lir3(Op::VldrD, lo.bit(), t.bit(), 0)
            }
        } else if vfp_disp(disp) {
            cg.lir
                .new_lir4(Op::LdrdRRI, lo.bit(), hi.bit(), base.bit(), disp)
        } else {
            // Split into words, high first in case the base aliases the low half.
            Self::load_word(cg, hi, base, disp + 4);
            Self::load_word(cg, lo, base, disp)
        }
    }

    fn store_pair(cg: &mut Cg<'_, Self>, lo: Reg, hi: Reg, base: Reg, disp: i32) -> LirIdx {
        if lo.is_fp() {
            if vfp_disp(disp) {
                cg.lir.new_lir3(Op::VstrD, lo.bit(), base.bit(), disp)
            } else {
                let t = Self::base_plus(cg, base, disp);
                cg.lir.new_lir3(Op::VstrD, lo.bit(), t.bit(), 0)
            }
        } else if vfp_disp(disp) {
            cg.lir
                .new_lir4(Op::StrdRRI, lo.bit(), hi.bit(), base.bit(), disp)
        } else {
            let s = Self::store_word(cg, lo, base, disp);
            Self::store_word(cg, hi, base, disp + 4);
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
        if dst.is_fp() {
            let t = regalloc::alloc_temp(cg, RegClass::Core)?;
            cg.lir.new_lir4(
                Op::AddRRShift,
                t.bit(),
                base.bit(),
                idx.bit(),
                i32::from(scale),
            );
            cg.lir.new_lir3(Op::VldrS, dst.bit(), t.bit(), disp);
            cg.pool.free_temp(t);
        } else {
            // The destination doubles as the address scratch.
            cg.lir.new_lir4(
                Op::AddRRShift,
                dst.bit(),
                base.bit(),
                idx.bit(),
                i32::from(scale),
            );
            cg.lir.new_lir3(Op::LdrRRI, dst.bit(), dst.bit(), disp);
        }
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
        let t = regalloc::alloc_temp(cg, RegClass::Core)?;
        cg.lir.new_lir4(
            Op::AddRRShift,
            t.bit(),
            base.bit(),
            idx.bit(),
            i32::from(scale),
        );
        let op = if src.is_fp() { Op::VstrS } else { Op::StrRRI };
        cg.lir.new_lir3(op, src.bit(), t.bit(), disp);
        cg.pool.free_temp(t);
        Ok(())
    }

    fn op_un(cg: &mut Cg<'_, Self>, kind: UnKind, dst: Reg, src: Reg) {
        match kind {
            UnKind::Neg => cg.lir.new_lir2(Op::RsbImm0, dst.bit(), src.bit()),
            UnKind::Not => cg.lir.new_lir2(Op::MvnRR, dst.bit(), src.bit()),
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
            BinKind::Add => Op::AddRRR,
            BinKind::Sub => Op::SubRRR,
            BinKind::Mul => Op::MulRRR,
            BinKind::And => Op::AndRRR,
            BinKind::Or => Op::OrrRRR,
            BinKind::Xor => Op::EorRRR,
            BinKind::Shl => Op::LslRRR,
            BinKind::Shr => Op::AsrRRR,
            BinKind::Ushr => Op::LsrRRR,
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
                let (op_pos, op_neg) = if kind == BinKind::Add {
                    (Op::AddRRI, Op::SubRRI)
                } else {
                    (Op::SubRRI, Op::AddRRI)
                };
                if (0..=4095).contains(&imm) {
                    cg.lir.new_lir3(op_pos, dst.bit(), src.bit(), imm);
                } else if (-4095..=-1).contains(&imm) {
                    cg.lir.new_lir3(op_neg, dst.bit(), src.bit(), -imm);
                } else {
                    Self::load_const(cg, R6, imm);
                    let op = if kind == BinKind::Add {
                        Op::AddRRR
                    } else {
                        Op::SubRRR
                    };
                    cg.lir.new_lir3(op, dst.bit(), src.bit(), R6.bit());
                }
            }
            BinKind::Shr => {
                cg.lir.new_lir3(Op::AsrRRI, dst.bit(), src.bit(), imm & 31);
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
        let (lo_op, hi_op) = match kind {
            BinKind::Add => (Op::AddRRR, Op::AdcRRR),
            BinKind::Sub => (Op::SubRRR, Op::SbcRRR),
            BinKind::And => (Op::AndRRR, Op::AndRRR),
            BinKind::Or => (Op::OrrRRR, Op::OrrRRR),
            BinKind::Xor => (Op::EorRRR, Op::EorRRR),
            _ => {
                return Err(CompileError::Internal(format!(
                    "wide {kind:?} reached the emitter"
                )))
            }
        };
        cg.lir.new_lir3(lo_op, d_lo.bit(), l_lo.bit(), r_lo.bit());
        cg.lir.new_lir3(hi_op, d_hi.bit(), l_hi.bit(), r_hi.bit());
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
            FpBinKind::Add => Op::VaddF,
            FpBinKind::Sub => Op::VsubF,
            FpBinKind::Mul => Op::VmulF,
            FpBinKind::Div => Op::VdivF,
        };
        cg.lir
            .new_lir4(op, dst.bit(), lhs.bit(), rhs.bit(), i32::from(wide));
        Ok(())
    }

    fn branch(cg: &mut Cg<'_, Self>) -> LirIdx {
        cg.lir.new_lir0(Op::B)
    }

    fn cond_branch(cg: &mut Cg<'_, Self>, cond: Cond, lhs: Reg, rhs: Reg) -> LirIdx {
        cg.lir.new_lir2(Op::CmpRR, lhs.bit(), rhs.bit());
        cg.lir.new_lir1(Op::BCond, cc(cond))
    }

    fn cond_branch_imm(cg: &mut Cg<'_, Self>, cond: Cond, src: Reg, imm: i32) -> LirIdx {
        if (0..=255).contains(&imm) {
            cg.lir.new_lir2(Op::CmpRI, src.bit(), imm);
        } else {
            Self::load_const(cg, R6, imm);
            cg.lir.new_lir2(Op::CmpRR, src.bit(), R6.bit());
        }
        cg.lir.new_lir1(Op::BCond, cc(cond))
    }

    fn jump_reg(cg: &mut Cg<'_, Self>, r: Reg) {
        // Dispatch addresses must keep the Thumb bit.
        cg.lir.new_lir3(Op::OrrImm, r.bit(), r.bit(), 1);
        cg.lir.new_lir1(Op::Bx, r.bit());
    }

    fn mem_barrier(cg: &mut Cg<'_, Self>) {
        cg.lir.new_lir0(Op::Dmb);
    }

    fn helper_args2(cg: &mut Cg<'_, Self>, a_bit: i32, b_bit: i32) {
        let a = Reg::from_bit(a_bit);
        let b = Reg::from_bit(b_bit);
        if b == R0 && a == R1 {
            // Swap without a scratch.
            cg.lir.new_lir3(Op::EorRRR, R0.bit(), R0.bit(), R1.bit());
            cg.lir.new_lir3(Op::EorRRR, R1.bit(), R1.bit(), R0.bit());
            cg.lir.new_lir3(Op::EorRRR, R0.bit(), R0.bit(), R1.bit());
        } else if b == R0 {
            Self::op_reg_copy(cg, R1, R0);
            if a != R0 {
                Self::op_reg_copy(cg, R0, a);
            }
        } else {
            if a != R0 {
                Self::op_reg_copy(cg, R0, a);
            }
            if b != R1 {
                Self::op_reg_copy(cg, R1, b);
            }
        }
    }

    fn helper_arg_regs() -> [Reg; 3] {
        [R0, R1, R2]
    }

    fn call_helper(cg: &mut Cg<'_, Self>, h: Helper) {
        Self::load_word(cg, R12, R9, h.self_disp());
        cg.lir.new_lir1(Op::BlxR, R12.bit());
    }

    fn load_patchable(cg: &mut Cg<'_, Self>, dst: Reg, method_idx: u32, kind: PatchKind) {
        let w = cg.data.find_or_add_word(&mut cg.lir, method_idx as i32, 0);
        let l = cg.lir.new_lir1(Op::LdrPcRel, dst.bit());
        litpool::link_literal_load(&mut cg.lir, l, w);
        if !cg.patches.iter().any(|p| p.node == w) {
            cg.patches.push(PatchPoint {
                node: w,
                adjust: 0,
                form: PatchForm::PoolWord,
                method_idx,
                kind,
            });
        }
    }

    fn emit_call_reg(cg: &mut Cg<'_, Self>, target: Reg) {
        cg.lir.new_lir1(Op::BlxR, target.bit());
    }

    fn invoke_target_reg() -> Reg {
        R12
    }

    fn load_table_addr(cg: &mut Cg<'_, Self>, dst: Reg, table: TableRef) {
        let (kind, idx) = match table {
            TableRef::Switch(i) => (0, i),
            TableRef::Fill(i) => (1, i),
        };
        cg.lir.new_lir3(Op::AdrTable, dst.bit(), kind, idx as i32);
    }

    fn next_call_insn(
        cg: &mut Cg<'_, Self>,
        info: &CallInfo<Reg>,
        state: u32,
    ) -> Result<Option<u32>, CompileError> {
        callseq::next_call_insn_std::<Self>(cg, info, state, R12, SP)
    }

    fn emit_entry(cg: &mut Cg<'_, Self>) -> Result<(), CompileError> {
        // Trap entry if sp would drop below the guard limit once the frame is in place.
        Self::load_word(cg, R12, R9, abi::SELF_STACK_LIMIT_OFF);
        Self::op_bin_imm(cg, BinKind::Add, R12, R12, cg.frame_size as i32)?;
        let b = Self::cond_branch(cg, Cond::Lo, SP, R12);
        let pad = launchpad::add_pad(cg, PadKind::StackOverflow, [0, 0]);
        cg.lir.set_target(b, pad);

        cg.lir.new_lir1(Op::Push, cg.core_spill_mask as i32);
        if cg.fp_spill_mask != 0 {
            cg.lir.new_lir2(
                Op::Vpush,
                cg.fp_spill_mask.trailing_zeros() as i32,
                cg.fp_spill_mask.count_ones() as i32,
            );
        }
        let mut rem = cg.frame_size - cg.spill_bytes();
        while rem > 0 {
            let chunk = rem.min(4088);
            cg.lir.new_lir1(Op::SubSpImm, chunk as i32);
            rem -= chunk;
        }
        // Registered argument words land in their frame slots so the frame is coherent from
        // the first bytecode.
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
        let mut rem = cg.frame_size - cg.spill_bytes();
        while rem > 0 {
            let chunk = rem.min(4088);
            cg.lir.new_lir1(Op::AddSpImm, chunk as i32);
            rem -= chunk;
        }
        if cg.fp_spill_mask != 0 {
            cg.lir.new_lir2(
                Op::Vpop,
                cg.fp_spill_mask.trailing_zeros() as i32,
                cg.fp_spill_mask.count_ones() as i32,
            );
        }
        // lr was pushed; it comes back as pc.
        let list = (cg.core_spill_mask & !(1 << 14)) | (1 << 15);
        cg.lir.new_lir1(Op::Pop, list as i32);
        Ok(())
    }

    fn op_size(lir: &Lir<Op>, _off: u32) -> u32 {
        let Some(op) = lir.op.real() else { return 0 };
        let ops = &lir.operands;
        let low = |i: usize| (0..8).contains(&ops[i]);
        match op {
            Op::MovRR | Op::MovImm8 | Op::CmpRR | Op::Bx | Op::BlxR => 2,
            Op::VmovRS | Op::VmovSR | Op::VmovSS | Op::MovwImm | Op::MovtImm => 4,
            Op::LdrPcRel => {
                if lir.widened {
                    10
                } else {
                    4
                }
            }
            Op::LdrdPcRel => {
                if lir.widened {
                    16
                } else {
                    4
                }
            }
            Op::AdrTable => {
                if lir.widened {
                    6
                } else {
                    4
                }
            }
            Op::LdrRRI | Op::StrRRI => {
                if low(0) && low(1) && (0..128).contains(&ops[2]) && ops[2] % 4 == 0 {
                    2
                } else {
                    4
                }
            }
            Op::LdrdRRI | Op::StrdRRI | Op::VldrS | Op::VstrS | Op::VldrD | Op::VstrD => 4,
            Op::AddRRR | Op::SubRRR => {
                if low(0) && low(1) && low(2) {
                    2
                } else {
                    4
                }
            }
            Op::AddRRI | Op::SubRRI => {
                if low(0) && low(1) && (0..8).contains(&ops[2])
                    || low(0) && ops[0] == ops[1] && (0..256).contains(&ops[2])
                {
                    2
                } else {
                    4
                }
            }
            Op::AddRRShift
            | Op::RsbImm0
            | Op::AdcRRR
            | Op::SbcRRR
            | Op::AndRRR
            | Op::OrrRRR
            | Op::OrrImm
            | Op::EorRRR
            | Op::MvnRR
            | Op::MulRRR
            | Op::LslRRR
            | Op::LsrRRR
            | Op::AsrRRR => 4,
            Op::AsrRRI => {
                if low(0) && low(1) {
                    2
                } else {
                    4
                }
            }
            Op::CmpRI => {
                if low(0) && (0..256).contains(&ops[1]) {
                    2
                } else {
                    4
                }
            }
            Op::BCond | Op::B => {
                if lir.widened {
                    4
                } else {
                    2
                }
            }
            Op::Push => {
                if ops[0] as u32 & !0x40FF == 0 {
                    2
                } else {
                    4
                }
            }
            Op::Pop => {
                if ops[0] as u32 & !0x80FF == 0 {
                    2
                } else {
                    4
                }
            }
            Op::Vpush | Op::Vpop => 4,
            Op::SubSpImm | Op::AddSpImm => {
                if (0..512).contains(&ops[0]) && ops[0] % 4 == 0 {
                    2
                } else {
                    4
                }
            }
            Op::VaddF | Op::VsubF | Op::VmulF | Op::VdivF | Op::Dmb => 4,
        }
    }

    fn encode(cg: &Cg<'_, Self>, idx: LirIdx, code: &mut Vec<u8>) -> EncodeOutcome {
        encode_one(cg, idx, code)
    }
}

fn encode_one(cg: &Cg<'_, Arm>, idx: LirIdx, code: &mut Vec<u8>) -> EncodeOutcome {
    let lir = &cg.lir[idx];
    let Some(op) = lir.op.real() else {
        return EncodeOutcome::Done;
    };
    let ops = &lir.operands;
    let off = lir.offset;
    let r = |i: usize| ops[i] as u16;
    let s = |i: usize| (ops[i] - 16) as u16;
    let target_off = |cg: &Cg<'_, Arm>| lir.target.map(|t| cg.lir[t].offset);

    match op {
        Op::MovRR => {
            let (d, m) = (r(0), r(1));
            hw(code, 0x4600 | (d >> 3) << 7 | m << 3 | (d & 7));
        }
        Op::VmovRS => {
            let (t, n) = (r(0), s(1));
            w32(code, 0xEE10 | (n >> 1), t << 12 | 0x0A10 | (n & 1) << 7);
        }
        Op::VmovSR => {
            let (n, t) = (s(0), r(1));
            w32(code, 0xEE00 | (n >> 1), t << 12 | 0x0A10 | (n & 1) << 7);
        }
        Op::VmovSS => {
            let (d, m) = (s(0), s(1));
            w32(
                code,
                0xEEB0 | (d & 1) << 6,
                (d >> 1) << 12 | 0x0A40 | (m & 1) << 5 | (m >> 1),
            );
        }
        Op::MovImm8 => hw(code, 0x2000 | r(0) << 8 | ops[1] as u16),
        Op::MovwImm => {
            let (hw1, hw2) = enc_mov16(0xF240, r(0), ops[1] as u32 as u16);
            w32(code, hw1, hw2);
        }
        Op::MovtImm => {
            let (hw1, hw2) = enc_mov16(0xF2C0, r(0), ops[1] as u32 as u16);
            w32(code, hw1, hw2);
        }
        Op::LdrPcRel => {
            let lit = target_off(cg).unwrap_or(u32::MAX);
            if !lir.widened {
                let delta = lit as i64 - i64::from((off + 4) & !3);
                if !(0..=4095).contains(&delta) {
                    return EncodeOutcome::OutOfRange;
                }
                w32(code, 0xF8DF, r(0) << 12 | delta as u16);
            } else {
                let delta = lit as i64 - i64::from(off) - 8;
                if !(0..=0xFFFF).contains(&delta) {
                    return EncodeOutcome::OutOfRange;
                }
                let (hw1, hw2) = enc_mov16(0xF240, r(0), delta as u16);
                w32(code, hw1, hw2);
                hw(code, add_pc(r(0)));
                w32(code, 0xF8D0 | r(0), r(0) << 12);
            }
        }
        Op::LdrdPcRel => {
            if !lir.widened {
                let lit = target_off(cg).unwrap_or(u32::MAX);
                let delta = lit as i64 - i64::from((off + 4) & !3);
                if !(0..=1020).contains(&delta) || delta % 4 != 0 {
                    return EncodeOutcome::OutOfRange;
                }
                w32(code, 0xE9DF, r(0) << 12 | r(1) << 8 | (delta / 4) as u16);
            } else {
                for (reg, val) in [(r(0), ops[2] as u32), (r(1), ops[3] as u32)] {
                    let (hw1, hw2) = enc_mov16(0xF240, reg, val as u16);
                    w32(code, hw1, hw2);
                    let (hw1, hw2) = enc_mov16(0xF2C0, reg, (val >> 16) as u16);
                    w32(code, hw1, hw2);
                }
            }
        }
        Op::AdrTable => {
            let tab = table_offset(cg, ops[1], ops[2]);
            if !lir.widened {
                let delta = i64::from(tab) - i64::from((off + 4) & !3);
                if !(0..=4095).contains(&delta) {
                    return EncodeOutcome::OutOfRange;
                }
                let imm = delta as u16;
                w32(
                    code,
                    0xF20F | ((imm >> 11) & 1) << 10,
                    ((imm >> 8) & 7) << 12 | r(0) << 8 | (imm & 0xFF),
                );
            } else {
                let delta = i64::from(tab) - i64::from(off) - 8;
                if !(0..=0xFFFF).contains(&delta) {
                    return EncodeOutcome::OutOfRange;
                }
                let (hw1, hw2) = enc_mov16(0xF240, r(0), delta as u16);
                w32(code, hw1, hw2);
                hw(code, add_pc(r(0)));
            }
        }
        Op::LdrRRI | Op::StrRRI => {
            let (t, n, disp) = (r(0), r(1), ops[2]);
            let ldr = op == Op::LdrRRI;
            if t < 8 && n < 8 && (0..128).contains(&disp) && disp % 4 == 0 {
                let base: u16 = if ldr { 0x6800 } else { 0x6000 };
                hw(code, base | ((disp / 4) as u16) << 6 | n << 3 | t);
            } else if (0..=4095).contains(&disp) {
                let base: u16 = if ldr { 0xF8D0 } else { 0xF8C0 };
                w32(code, base | n, t << 12 | disp as u16);
            } else if (-255..=-1).contains(&disp) {
                let base: u16 = if ldr { 0xF850 } else { 0xF840 };
                w32(code, base | n, t << 12 | 0x0C00 | (-disp) as u16);
            } else {
                return EncodeOutcome::OutOfRange;
            }
        }
        Op::LdrdRRI | Op::StrdRRI => {
            let base: u16 = if op == Op::LdrdRRI { 0xE9D0 } else { 0xE9C0 };
            w32(
                code,
                base | r(2),
                r(0) << 12 | r(1) << 8 | (ops[3] / 4) as u16,
            );
        }
        Op::VldrS | Op::VstrS => {
            let (d, n, disp) = (s(0), r(1), ops[2]);
            let base: u16 = if op == Op::VldrS { 0xED90 } else { 0xED80 };
            w32(
                code,
                base | (d & 1) << 6 | n,
                (d >> 1) << 12 | 0x0A00 | (disp / 4) as u16,
            );
        }
        Op::VldrD | Op::VstrD => {
            let (dn, n, disp) = (s(0) / 2, r(1), ops[2]);
            let base: u16 = if op == Op::VldrD { 0xED90 } else { 0xED80 };
            w32(code, base | n, dn << 12 | 0x0B00 | (disp / 4) as u16);
        }
        Op::AddRRR | Op::SubRRR => {
            let (d, n, m) = (r(0), r(1), r(2));
            let add = op == Op::AddRRR;
            if d < 8 && n < 8 && m < 8 {
                let base: u16 = if add { 0x1800 } else { 0x1A00 };
                hw(code, base | m << 6 | n << 3 | d);
            } else {
                let base: u16 = if add { 0xEB10 } else { 0xEBB0 };
                w32(code, base | n, d << 8 | m);
            }
        }
        Op::AddRRI | Op::SubRRI => {
            let (d, n, imm) = (r(0), r(1), ops[2]);
            let add = op == Op::AddRRI;
            if d < 8 && n < 8 && (0..8).contains(&imm) {
                let base: u16 = if add { 0x1C00 } else { 0x1E00 };
                hw(code, base | (imm as u16) << 6 | n << 3 | d);
            } else if d < 8 && d == n && (0..256).contains(&imm) {
                let base: u16 = if add { 0x3000 } else { 0x3800 };
                hw(code, base | d << 8 | imm as u16);
            } else {
                let base: u16 = if add { 0xF200 } else { 0xF2A0 };
                let (hw1, hw2) = enc_imm12(base, n, imm as u16);
                w32(code, hw1, hw2 | d << 8);
            }
        }
        Op::AddRRShift => {
            let sh = ops[3] as u16;
            w32(
                code,
                0xEB00 | r(1),
                (sh >> 2) << 12 | r(0) << 8 | (sh & 3) << 6 | r(2),
            );
        }
        Op::RsbImm0 => w32(code, 0xF1C0 | r(1), r(0) << 8),
        Op::AdcRRR => w32(code, 0xEB40 | r(1), r(0) << 8 | r(2)),
        Op::SbcRRR => w32(code, 0xEB60 | r(1), r(0) << 8 | r(2)),
        Op::AndRRR => w32(code, 0xEA00 | r(1), r(0) << 8 | r(2)),
        Op::OrrRRR => w32(code, 0xEA40 | r(1), r(0) << 8 | r(2)),
        Op::OrrImm => w32(code, 0xF040 | r(1), r(0) << 8 | ops[2] as u16),
        Op::EorRRR => w32(code, 0xEA80 | r(1), r(0) << 8 | r(2)),
        Op::MvnRR => w32(code, 0xEA6F, r(0) << 8 | r(1)),
        Op::MulRRR => w32(code, 0xFB00 | r(1), 0xF000 | r(0) << 8 | r(2)),
        Op::LslRRR => w32(code, 0xFA00 | r(1), 0xF000 | r(0) << 8 | r(2)),
        Op::LsrRRR => w32(code, 0xFA20 | r(1), 0xF000 | r(0) << 8 | r(2)),
        Op::AsrRRR => w32(code, 0xFA40 | r(1), 0xF000 | r(0) << 8 | r(2)),
        Op::AsrRRI => {
            let (d, m, imm) = (r(0), r(1), ops[2] as u16);
            if d < 8 && m < 8 {
                hw(code, 0x1000 | imm << 6 | m << 3 | d);
            } else {
                w32(
                    code,
                    0xEA4F,
                    (imm >> 2) << 12 | d << 8 | (imm & 3) << 6 | 0x20 | m,
                );
            }
        }
        Op::CmpRR => {
            let (n, m) = (r(0), r(1));
            if n < 8 && m < 8 {
                hw(code, 0x4280 | m << 3 | n);
            } else {
                hw(code, 0x4500 | (n >> 3) << 7 | m << 3 | (n & 7));
            }
        }
        Op::CmpRI => {
            let (n, imm) = (r(0), ops[1] as u16);
            if n < 8 && imm < 256 {
                hw(code, 0x2800 | n << 8 | imm);
            } else {
                w32(code, 0xF1B0 | n, 0x0F00 | imm);
            }
        }
        Op::BCond => {
            let t = target_off(cg).unwrap_or(u32::MAX);
            let delta = t as i64 - i64::from(off) - 4;
            let cond = ops[0] as u16;
            if !lir.widened {
                if !(-256..=254).contains(&delta) {
                    return EncodeOutcome::OutOfRange;
                }
                hw(code, 0xD000 | cond << 8 | ((delta >> 1) as u16 & 0xFF));
            } else {
                if !(-(1 << 20)..(1 << 20)).contains(&delta) {
                    return EncodeOutcome::OutOfRange;
                }
                let x = (delta >> 1) as u32 & 0xFFFFF;
                let (s_, j2, j1) = ((x >> 19) & 1, (x >> 18) & 1, (x >> 17) & 1);
                w32(
                    code,
                    0xF000 | (s_ as u16) << 10 | cond << 6 | ((x >> 11) & 0x3F) as u16,
                    0x8000 | (j1 as u16) << 13 | (j2 as u16) << 11 | (x & 0x7FF) as u16,
                );
            }
        }
        Op::B => {
            let t = target_off(cg).unwrap_or(u32::MAX);
            let delta = t as i64 - i64::from(off) - 4;
            if !lir.widened {
                if !(-2048..=2046).contains(&delta) {
                    return EncodeOutcome::OutOfRange;
                }
                hw(code, 0xE000 | ((delta >> 1) as u16 & 0x7FF));
            } else {
                if !(-(1 << 24)..(1 << 24)).contains(&delta) {
                    return EncodeOutcome::OutOfRange;
                }
                let x = (delta >> 1) as u32 & 0xFFFFFF;
                let s_ = (x >> 23) & 1;
                let j1 = (((x >> 22) & 1) ^ 1) ^ s_;
                let j2 = (((x >> 21) & 1) ^ 1) ^ s_;
                w32(
                    code,
                    0xF000 | (s_ as u16) << 10 | ((x >> 11) & 0x3FF) as u16,
                    0x9000 | (j1 as u16) << 13 | (j2 as u16) << 11 | (x & 0x7FF) as u16,
                );
            }
        }
        Op::Bx => hw(code, 0x4700 | r(0) << 3),
        Op::BlxR => hw(code, 0x4780 | r(0) << 3),
        Op::Push => {
            let list = ops[0] as u32;
            if list & !0x40FF == 0 {
                hw(code, 0xB400 | (((list >> 14) & 1) as u16) << 8 | (list & 0xFF) as u16);
            } else {
                w32(code, 0xE92D, list as u16);
            }
        }
        Op::Pop => {
            let list = ops[0] as u32;
            if list & !0x80FF == 0 {
                hw(code, 0xBC00 | (((list >> 15) & 1) as u16) << 8 | (list & 0xFF) as u16);
            } else {
                w32(code, 0xE8BD, list as u16);
            }
        }
        Op::Vpush | Op::Vpop => {
            let (first, count) = (ops[0] as u16, ops[1] as u16);
            let base: u16 = if op == Op::Vpush { 0xED2D } else { 0xECBD };
            w32(
                code,
                base | (first & 1) << 6,
                (first >> 1) << 12 | 0x0A00 | count,
            );
        }
        Op::SubSpImm | Op::AddSpImm => {
            let imm = ops[0];
            let sub = op == Op::SubSpImm;
            if (0..512).contains(&imm) && imm % 4 == 0 {
                let base: u16 = if sub { 0xB080 } else { 0xB000 };
                hw(code, base | (imm / 4) as u16);
            } else {
                // subw/addw with rn = rd = sp.
                let base: u16 = if sub { 0xF2AD } else { 0xF20D };
                let (hw1, hw2) = enc_imm12(base, 0, imm as u16);
                w32(code, hw1, hw2 | 0x0D00);
            }
        }
        Op::VaddF | Op::VsubF | Op::VmulF | Op::VdivF => {
            let wide = ops[3] != 0;
            let (vd, vn, vm) = if wide {
                (s(0) / 2, s(1) / 2, s(2) / 2)
            } else {
                (s(0), s(1), s(2))
            };
            let (d, dd) = if wide { (0, vd) } else { (vd & 1, vd >> 1) };
            let (n, nn) = if wide { (0, vn) } else { (vn & 1, vn >> 1) };
            let (m, mm) = if wide { (0, vm) } else { (vm & 1, vm >> 1) };
            let sz: u16 = if wide { 0x100 } else { 0 };
            let (hw1_base, sub_bit): (u16, u16) = match op {
                Op::VaddF => (0xEE30, 0),
                Op::VsubF => (0xEE30, 0x40),
                Op::VmulF => (0xEE20, 0),
                _ => (0xEE80, 0),
            };
            w32(
                code,
                hw1_base | d << 6 | nn,
                dd << 12 | 0x0A00 | sz | n << 7 | sub_bit | m << 5 | mm,
            );
        }
        Op::Dmb => w32(code, 0xF3BF, 0x8F5B),
    }
    EncodeOutcome::Done
}

fn hw(code: &mut Vec<u8>, v: u16) {
    asm::push_u16(code, v);
}

fn w32(code: &mut Vec<u8>, hw1: u16, hw2: u16) {
    asm::push_u16(code, hw1);
    asm::push_u16(code, hw2);
}

/// movw/movt: split a 16-bit immediate over the i:imm4:imm3:imm8 fields.
fn enc_mov16(base: u16, rd: u16, imm: u16) -> (u16, u16) {
    let hw1 = base | ((imm >> 11) & 1) << 10 | imm >> 12;
    let hw2 = ((imm >> 8) & 7) << 12 | rd << 8 | (imm & 0xFF);
    (hw1, hw2)
}

/// addw/subw: split a 12-bit immediate over the i:imm3:imm8 fields. The caller ors the
/// destination into hw2.
fn enc_imm12(base: u16, rn: u16, imm: u16) -> (u16, u16) {
    let hw1 = base | ((imm >> 11) & 1) << 10 | rn;
    let hw2 = ((imm >> 8) & 7) << 12 | (imm & 0xFF);
    (hw1, hw2)
}

/// add rd, pc (the high-register T1 form).
fn add_pc(rd: u16) -> u16 {
    0x4400 | (rd >> 3) << 7 | 15 << 3 | (rd & 7)
}

fn table_offset(cg: &Cg<'_, Arm>, kind: i32, idx: i32) -> u32 {
    if kind == 0 {
        cg.data.switch_tables[idx as usize].offset
    } else {
        cg.data.fill_items[idx as usize].offset
    }
}
