//! Lowering MIR to LIR: the per-target interface and the target-neutral driver.
//!
//! [Isa] is the seam between the shared lowering logic and a backend. Everything above it
//! (this module, [regalloc](super::regalloc), [callseq](super::callseq),
//! [launchpad](super::launchpad)) manipulates values and control flow in terms of abstract
//! operations; everything below it chooses instructions and encodings. The driver walks the
//! method's blocks in order, emitting a [Pseudo::Boundary] per bytecode so the mapping table
//! and switch processing can find their way back, then hands the stream to the local
//! optimiser and the assembler.
//!
//! Register state never crosses a block edge: the pool is cleared at every block label, and
//! flushed before anything control flow can observe (branches, calls, potential throws).

use crate::{
    codegen::{
        abi,
        asm::{self, EncodeOutcome},
        callseq::{self, CallInfo},
        launchpad::{self, PadKind},
        lir::{Lir, LirIdx, OpT, Pseudo},
        litpool, local_opt,
        regalloc::{self, RegClass, RegT},
        Cg, CompileError, CompiledMethod, Helper, PatchKind, Tuning,
    },
    log::{self, IRPhase, Log, Verbosity},
    mir::{
        BBlockIdx, BinKind, Cond, ConstResolver, FpBinKind, Method, MirInst, MirOp, UnKind, VReg,
    },
};
use std::fmt::Write;

/// A data table referenced from code, by index into the method's
/// [DataPools](super::litpool::DataPools).
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum TableRef {
    Switch(usize),
    Fill(usize),
}

/// One compilation target.
///
/// The emission methods append to `cg.lir` through the target's own opcode table; the
/// description methods are constants of the register file and calling convention. A backend
/// is stateless: everything it needs lives in the [Cg] it is handed.
pub(crate) trait Isa: Sized + 'static {
    type Reg: RegT;
    type Op: OpT;

    const NAME: &'static str;
    /// A wide fp value occupies one fp register instead of an even/odd pair.
    const FP_DOUBLE_SOLO: bool;

    /// The reserved register holding the per-thread runtime state.
    fn self_reg() -> Self::Reg;
    fn sp_reg() -> Self::Reg;
    /// The link register, on targets that have one.
    fn lr_reg() -> Option<Self::Reg>;
    /// The program counter's resource-mask bit, on targets where reading it is an
    /// architectural operand.
    fn pc_mask_bit() -> Option<u8>;
    /// Registers carrying leading argument words, in order. May be empty.
    fn arg_regs() -> &'static [Self::Reg];
    /// Registers carrying a (low, high) return value. Also the soft-float result registers.
    fn ret_regs() -> (Self::Reg, Self::Reg);
    fn core_temps() -> &'static [Self::Reg];
    fn fp_temps() -> &'static [Self::Reg];
    fn promotable_core() -> &'static [Self::Reg];
    fn promotable_fp() -> &'static [Self::Reg];
    /// Callee-saved core registers every frame spills regardless of promotion, as a mask-bit
    /// set (the return address register, where one exists).
    fn fixed_core_spills() -> u32;
    /// Mask bit of the first fp register; fp spill-mask bits are relative to it.
    fn fp_mask_base() -> u8;
    /// Byte bias added to incoming-argument displacements (a pushed return address sits
    /// between the frame and the arguments on some targets).
    fn in_arg_bias() -> i32;

    /// Copy between registers, in either register class or across them.
    fn op_reg_copy(cg: &mut Cg<'_, Self>, dst: Self::Reg, src: Self::Reg);
    fn load_const(cg: &mut Cg<'_, Self>, dst: Self::Reg, val: i32);
    fn load_const_wide(cg: &mut Cg<'_, Self>, lo: Self::Reg, hi: Self::Reg, val: i64);
    fn load_word(cg: &mut Cg<'_, Self>, dst: Self::Reg, base: Self::Reg, disp: i32) -> LirIdx;
    fn store_word(cg: &mut Cg<'_, Self>, src: Self::Reg, base: Self::Reg, disp: i32) -> LirIdx;
    fn load_pair(
        cg: &mut Cg<'_, Self>,
        lo: Self::Reg,
        hi: Self::Reg,
        base: Self::Reg,
        disp: i32,
    ) -> LirIdx;
    fn store_pair(
        cg: &mut Cg<'_, Self>,
        lo: Self::Reg,
        hi: Self::Reg,
        base: Self::Reg,
        disp: i32,
    ) -> LirIdx;
    /// Load from `[base + (idx << scale) + disp]`. Fallible because some targets route the
    /// address through a temp when the destination register cannot carry it.
    fn load_indexed(
        cg: &mut Cg<'_, Self>,
        dst: Self::Reg,
        base: Self::Reg,
        idx: Self::Reg,
        scale: u8,
        disp: i32,
    ) -> Result<(), CompileError>;
    fn store_indexed(
        cg: &mut Cg<'_, Self>,
        src: Self::Reg,
        base: Self::Reg,
        idx: Self::Reg,
        scale: u8,
        disp: i32,
    ) -> Result<(), CompileError>;
    fn op_un(cg: &mut Cg<'_, Self>, kind: UnKind, dst: Self::Reg, src: Self::Reg);
    fn op_bin(
        cg: &mut Cg<'_, Self>,
        kind: BinKind,
        dst: Self::Reg,
        lhs: Self::Reg,
        rhs: Self::Reg,
    ) -> Result<(), CompileError>;
    fn op_bin_imm(
        cg: &mut Cg<'_, Self>,
        kind: BinKind,
        dst: Self::Reg,
        src: Self::Reg,
        imm: i32,
    ) -> Result<(), CompileError>;
    /// 64-bit arithmetic on two register pairs. `dst` may alias `lhs` (the driver relies on
    /// it) but never `rhs`.
    #[allow(clippy::too_many_arguments)]
    fn op_bin_wide(
        cg: &mut Cg<'_, Self>,
        kind: BinKind,
        d_lo: Self::Reg,
        d_hi: Self::Reg,
        l_lo: Self::Reg,
        l_hi: Self::Reg,
        r_lo: Self::Reg,
        r_hi: Self::Reg,
    ) -> Result<(), CompileError>;
    /// Fp arithmetic; for a wide operation the registers name the low halves (or the whole
    /// value on a [FP_DOUBLE_SOLO](Isa::FP_DOUBLE_SOLO) target).
    fn op_fp_bin(
        cg: &mut Cg<'_, Self>,
        kind: FpBinKind,
        wide: bool,
        dst: Self::Reg,
        lhs: Self::Reg,
        rhs: Self::Reg,
    ) -> Result<(), CompileError>;
    /// Unconditional branch; the caller links the target.
    fn branch(cg: &mut Cg<'_, Self>) -> LirIdx;
    fn cond_branch(cg: &mut Cg<'_, Self>, cond: Cond, lhs: Self::Reg, rhs: Self::Reg) -> LirIdx;
    fn cond_branch_imm(cg: &mut Cg<'_, Self>, cond: Cond, src: Self::Reg, imm: i32) -> LirIdx;
    fn jump_reg(cg: &mut Cg<'_, Self>, r: Self::Reg);
    /// Order volatile memory accesses. A no-op on targets whose memory model already
    /// guarantees the required ordering.
    fn mem_barrier(cg: &mut Cg<'_, Self>);
    /// Move the two recorded registers (by mask bit) into the helper argument convention.
    fn helper_args2(cg: &mut Cg<'_, Self>, a_bit: i32, b_bit: i32);
    /// The first three helper argument registers, for helper calls whose operands are
    /// computed in place rather than marshalled from temps.
    fn helper_arg_regs() -> [Self::Reg; 3];
    /// Call a runtime helper through its slot in the thread state.
    fn call_helper(cg: &mut Cg<'_, Self>, h: Helper);
    /// Load the patchable constant for `method_idx` (a code address or method-table entry)
    /// and record the patch point.
    fn load_patchable(cg: &mut Cg<'_, Self>, dst: Self::Reg, method_idx: u32, kind: PatchKind);
    fn emit_call_reg(cg: &mut Cg<'_, Self>, target: Self::Reg);
    /// The scratch register call sequences materialise the callee address in.
    fn invoke_target_reg() -> Self::Reg;
    /// Materialise the runtime address of a data table.
    fn load_table_addr(cg: &mut Cg<'_, Self>, dst: Self::Reg, table: TableRef);
    /// Advance the invocation state machine one step; `None` means the callee address is
    /// ready in [invoke_target_reg](Isa::invoke_target_reg) (or no setup was needed).
    fn next_call_insn(
        cg: &mut Cg<'_, Self>,
        info: &CallInfo<Self::Reg>,
        state: u32,
    ) -> Result<Option<u32>, CompileError>;
    /// Prologue: stack-limit check, callee saves, frame allocation, argument-register
    /// write-back.
    fn emit_entry(cg: &mut Cg<'_, Self>) -> Result<(), CompileError>;
    /// Epilogue, emitted once per MIR return.
    fn emit_exit(cg: &mut Cg<'_, Self>) -> Result<(), CompileError>;
    /// Encoded byte size of `lir` if placed at `off`, honouring its widened flag.
    fn op_size(lir: &Lir<Self::Op>, off: u32) -> u32;
    /// Encode one node at its assigned offset, appending to `code`.
    fn encode(cg: &Cg<'_, Self>, idx: LirIdx, code: &mut Vec<u8>) -> EncodeOutcome;
}

pub(crate) fn build<A: Isa>(
    m: &Method,
    resolver: &dyn ConstResolver,
    tuning: &Tuning,
    log: &Log,
) -> Result<CompiledMethod, CompileError> {
    if log::should_log_ir(IRPhase::Mir) {
        log::log_ir(&format!(
            "--- Begin mir: {} ---\n{}--- End mir ---\n",
            m.name,
            mir_to_string(m)
        ));
    }
    let mut cg = Cg::<A>::new(m, resolver, tuning)?;
    let r = lower(&mut cg);
    if let Err(CompileError::Internal(_)) = &r {
        log.log(Verbosity::Error, &cg.diag_dump());
    }
    r
}

fn lower<A: Isa>(cg: &mut Cg<'_, A>) -> Result<CompiledMethod, CompileError> {
    let m = cg.m;
    // Every block gets its entry label up front so forward branches can link immediately.
    for _ in 0..m.blocks.len() {
        let l = cg.lir.raw_pseudo(Pseudo::BlockLabel);
        cg.block_labels.push(l);
    }

    A::emit_entry(cg)?;
    for (bidx, block) in m.blocks.iter_enumerated() {
        cg.pool.reset();
        cg.pool.clobber_all();
        cg.lir.append(cg.block_labels[bidx]);
        for inst in &block.insts {
            cg.lir.cur_dex_off = inst.dex_off;
            let b = cg.lir.add_pseudo(Pseudo::Boundary);
            cg.boundary_map.entry(inst.dex_off).or_insert(b);
            cg.pool.reset();
            gen_inst(cg, bidx, inst)?;
        }
        // A fall-through edge hands values over in the frame, the same as a branch edge.
        regalloc::flush_all_regs(cg);
    }
    launchpad::emit_pads(cg)?;
    litpool::process_switch_tables(cg)?;

    if log::should_log_ir(IRPhase::LirPre) {
        log::log_ir(&format!(
            "--- Begin lir-pre: {} ---\n{}--- End lir-pre ---\n",
            m.name,
            cg.lir.to_string(false)
        ));
    }
    local_opt::apply_local_opts(&mut cg.lir);
    if log::should_log_ir(IRPhase::LirPost) {
        log::log_ir(&format!(
            "--- Begin lir-post: {} ---\n{}--- End lir-post ---\n",
            m.name,
            cg.lir.to_string(false)
        ));
    }

    let out = asm::assemble(cg)?;
    if log::should_log_ir(IRPhase::Asm) {
        log::log_ir(&format!(
            "--- Begin asm: {} ({}) ---\n{}--- End asm ---\n",
            m.name,
            A::NAME,
            cg.lir.to_string(true)
        ));
    }
    Ok(CompiledMethod {
        code: out.code,
        map: out.map,
        patches: out.patches,
        frame_size: cg.frame_size,
        core_spill_mask: cg.core_spill_mask,
        fp_spill_mask: cg.fp_spill_mask,
        asm_retries: out.retries,
    })
}

fn mir_to_string(m: &Method) -> String {
    let mut s = format!("method {} ({} vregs, {} in)\n", m.name, m.num_vregs, m.num_ins);
    for (bidx, b) in m.blocks.iter_enumerated() {
        writeln!(s, "bb{}:", bidx.raw()).ok();
        for inst in &b.insts {
            writeln!(s, "  {:#06x}: {:?}", inst.dex_off, inst.op).ok();
        }
    }
    s
}

fn gen_inst<A: Isa>(cg: &mut Cg<'_, A>, bidx: BBlockIdx, inst: &MirInst) -> Result<(), CompileError> {
    match &inst.op {
        MirOp::Const { dst, val } => gen_const(cg, *dst, *val),
        MirOp::ConstWide { dst, val } => gen_const_wide(cg, *dst, *val),
        MirOp::Move { dst, src } => {
            regalloc::store_value(cg, cg.loc(*dst), cg.loc(*src))?;
            Ok(())
        }
        MirOp::MoveWide { dst, src } => {
            regalloc::store_value_wide(cg, cg.loc(*dst), cg.loc(*src))?;
            Ok(())
        }
        MirOp::UnOp { op, dst, src } => gen_un(cg, *op, *dst, *src),
        MirOp::BinOp { op, dst, lhs, rhs } => gen_bin(cg, *op, *dst, *lhs, *rhs),
        MirOp::BinOpWide { op, dst, lhs, rhs } => gen_bin_wide(cg, *op, *dst, *lhs, *rhs),
        MirOp::FpBinOp { op, dst, lhs, rhs } => gen_fp_bin(cg, *op, false, *dst, *lhs, *rhs),
        MirOp::FpBinOpWide { op, dst, lhs, rhs } => gen_fp_bin(cg, *op, true, *dst, *lhs, *rhs),
        MirOp::IfTest {
            cond,
            lhs,
            rhs,
            target,
        } => gen_if_test(cg, bidx, *cond, *lhs, *rhs, *target),
        MirOp::IfTestZ { cond, src, target } => gen_if_test_z(cg, bidx, *cond, *src, *target),
        MirOp::Goto { target } => gen_goto(cg, bidx, *target),
        MirOp::PackedSwitch { src, table_off } => gen_packed_switch(cg, *src, *table_off),
        MirOp::SparseSwitch { src, table_off } => gen_sparse_switch(cg, *src, *table_off),
        MirOp::FillArrayData { arr, table_off } => gen_fill_array(cg, inst, *arr, *table_off),
        MirOp::IGet {
            dst,
            obj,
            field_idx,
        } => gen_iget(cg, inst, *dst, *obj, *field_idx, false),
        MirOp::IGetWide {
            dst,
            obj,
            field_idx,
        } => gen_iget(cg, inst, *dst, *obj, *field_idx, true),
        MirOp::IPut {
            src,
            obj,
            field_idx,
        } => gen_iput(cg, inst, *src, *obj, *field_idx, false),
        MirOp::IPutWide {
            src,
            obj,
            field_idx,
        } => gen_iput(cg, inst, *src, *obj, *field_idx, true),
        MirOp::AGet { dst, arr, idx } => gen_aget(cg, inst, *dst, *arr, *idx),
        MirOp::APut { src, arr, idx } => gen_aput(cg, inst, *src, *arr, *idx),
        MirOp::ArrayLength { dst, arr } => gen_array_length(cg, inst, *dst, *arr),
        MirOp::Invoke {
            kind,
            method_idx,
            args,
            range,
        } => callseq::gen_invoke(cg, inst.flags, *kind, *method_idx, args, *range),
        MirOp::MoveResult { dst } => callseq::gen_move_result(cg, *dst, false),
        MirOp::MoveResultWide { dst } => callseq::gen_move_result(cg, *dst, true),
        // Residency ends with the method; the block-edge flush must see nothing dirty.
        MirOp::Return => {
            cg.pool.clobber_all();
            A::emit_exit(cg)
        }
        MirOp::ReturnVal { src } => {
            let (r0, _) = A::ret_regs();
            regalloc::load_value_direct(cg, cg.loc(*src), r0);
            cg.pool.clobber_all();
            A::emit_exit(cg)
        }
        MirOp::ReturnWide { src } => {
            let (r0, r1) = A::ret_regs();
            regalloc::load_value_direct_wide(cg, cg.loc(*src), r0, r1);
            cg.pool.clobber_all();
            A::emit_exit(cg)
        }
    }
}

/// Flush, then fork to a throw pad if `r` is null. `r` stays reserved for the rest of the
/// instruction so later allocations cannot steal it.
pub(crate) fn null_check<A: Isa>(cg: &mut Cg<'_, A>, r: A::Reg) {
    regalloc::flush_all_regs(cg);
    cg.pool.mark_in_use(r);
    let b = A::cond_branch_imm(cg, Cond::Eq, r, 0);
    let pad = launchpad::add_pad(cg, PadKind::NullCheck, [0, 0]);
    cg.lir.set_target(b, pad);
}

/// Flush, then fork to a throw pad unless `idx` is below the array's length.
fn range_check<A: Isa>(cg: &mut Cg<'_, A>, arr: A::Reg, idx: A::Reg) -> Result<(), CompileError> {
    regalloc::flush_all_regs(cg);
    cg.pool.mark_in_use(arr);
    cg.pool.mark_in_use(idx);
    let len = regalloc::alloc_temp(cg, RegClass::Core)?;
    A::load_word(cg, len, arr, abi::ARRAY_LEN_OFF);
    let b = A::cond_branch(cg, Cond::Hs, idx, len);
    let pad = launchpad::add_pad(
        cg,
        PadKind::BoundsCheck,
        [i32::from(idx.mask_bit()), i32::from(len.mask_bit())],
    );
    cg.lir.set_target(b, pad);
    cg.pool.free_temp(len);
    Ok(())
}

fn gen_const<A: Isa>(cg: &mut Cg<'_, A>, dst: VReg, val: i32) -> Result<(), CompileError> {
    let d = cg.loc(dst);
    if d.home && d.fp {
        // A promoted fp home takes its bits through a core temp.
        let t = regalloc::alloc_temp(cg, RegClass::Core)?;
        A::load_const(cg, t, val);
        A::op_reg_copy(cg, d.low, t);
        cg.pool.free_temp(t);
    } else {
        let d = regalloc::eval_loc(cg, d, RegClass::Core, true)?;
        A::load_const(cg, d.low, val);
        cg.pool.mark_dirty(d.low);
    }
    Ok(())
}

fn gen_const_wide<A: Isa>(cg: &mut Cg<'_, A>, dst: VReg, val: i64) -> Result<(), CompileError> {
    // Wide constants are formed in a core pair whatever the vreg's kind; bits are bits, and
    // an fp use re-evaluates the location in its own class.
    let d = regalloc::eval_loc_wide(cg, cg.loc(dst), RegClass::Core, true)?;
    A::load_const_wide(cg, d.low, d.high, val);
    cg.pool.mark_dirty(d.low);
    cg.pool.mark_dirty(d.high);
    Ok(())
}

fn gen_un<A: Isa>(cg: &mut Cg<'_, A>, op: UnKind, dst: VReg, src: VReg) -> Result<(), CompileError> {
    let s = regalloc::load_value(cg, cg.loc(src), RegClass::Core)?;
    let d = regalloc::eval_loc(cg, cg.loc(dst), RegClass::Core, true)?;
    A::op_un(cg, op, d.low, s.low);
    cg.pool.mark_dirty(d.low);
    Ok(())
}

fn gen_bin<A: Isa>(
    cg: &mut Cg<'_, A>,
    op: BinKind,
    dst: VReg,
    lhs: VReg,
    rhs: VReg,
) -> Result<(), CompileError> {
    if matches!(op, BinKind::Div | BinKind::Rem) {
        return gen_div_rem(cg, op, dst, lhs, rhs);
    }
    let l = regalloc::load_value(cg, cg.loc(lhs), RegClass::Core)?;
    let r = regalloc::load_value(cg, cg.loc(rhs), RegClass::Core)?;
    let d = regalloc::eval_loc(cg, cg.loc(dst), RegClass::Core, true)?;
    A::op_bin(cg, op, d.low, l.low, r.low)?;
    cg.pool.mark_dirty(d.low);
    Ok(())
}

/// Integer division takes a zero check and a helper call on every target.
fn gen_div_rem<A: Isa>(
    cg: &mut Cg<'_, A>,
    op: BinKind,
    dst: VReg,
    lhs: VReg,
    rhs: VReg,
) -> Result<(), CompileError> {
    let l = regalloc::load_value(cg, cg.loc(lhs), RegClass::Core)?.low;
    let r = regalloc::load_value(cg, cg.loc(rhs), RegClass::Core)?.low;
    regalloc::flush_all_regs(cg);
    cg.pool.mark_in_use(l);
    cg.pool.mark_in_use(r);
    let b = A::cond_branch_imm(cg, Cond::Eq, r, 0);
    let pad = launchpad::add_pad(cg, PadKind::DivZero, [0, 0]);
    cg.lir.set_target(b, pad);
    A::helper_args2(cg, i32::from(l.mask_bit()), i32::from(r.mask_bit()));
    A::call_helper(
        cg,
        if op == BinKind::Div {
            Helper::IDiv
        } else {
            Helper::IRem
        },
    );
    cg.pool.clobber_all();
    callseq::gen_move_result(cg, dst, false)
}

fn gen_bin_wide<A: Isa>(
    cg: &mut Cg<'_, A>,
    op: BinKind,
    dst: VReg,
    lhs: VReg,
    rhs: VReg,
) -> Result<(), CompileError> {
    if !matches!(
        op,
        BinKind::Add | BinKind::Sub | BinKind::And | BinKind::Or | BinKind::Xor
    ) {
        return Err(CompileError::Unsupported(format!("wide {op:?}")));
    }
    let l = regalloc::load_value_wide(cg, cg.loc(lhs), RegClass::Core)?;
    // The result forms in the lhs pair and the emitter contract forbids the rhs aliasing
    // it, so a shared operand gets its own pair copy first.
    let (r_low, r_high) = if lhs == rhs {
        cg.pool.mark_in_use(l.low);
        cg.pool.mark_in_use(l.high);
        let (lo, hi) = regalloc::alloc_temp_pair(cg, RegClass::Core)?;
        cg.pool.free_temp(l.low);
        cg.pool.free_temp(l.high);
        A::op_reg_copy(cg, lo, l.low);
        A::op_reg_copy(cg, hi, l.high);
        (lo, hi)
    } else {
        let r = regalloc::load_value_wide(cg, cg.loc(rhs), RegClass::Core)?;
        (r.low, r.high)
    };
    // The result overwrites the lhs copy in place; save the lhs vreg first if that copy is
    // the only current one.
    if cg.pool.is_dirty(l.low) || cg.pool.is_dirty(l.high) {
        regalloc::flush_reg(cg, l.low);
    }
    cg.pool.clobber(l.low);
    if l.high != l.low {
        cg.pool.clobber(l.high);
    }
    A::op_bin_wide(cg, op, l.low, l.high, l.low, l.high, r_low, r_high)?;
    if lhs == rhs {
        cg.pool.free_temp(r_low);
        cg.pool.free_temp(r_high);
    }
    let src = regalloc::RegLoc {
        kind: regalloc::LocKind::Reg,
        wide: true,
        fp: false,
        home: false,
        low: l.low,
        high: l.high,
        vreg: dst,
    };
    regalloc::store_value_wide(cg, cg.loc(dst), src)?;
    Ok(())
}

fn gen_fp_bin<A: Isa>(
    cg: &mut Cg<'_, A>,
    op: FpBinKind,
    wide: bool,
    dst: VReg,
    lhs: VReg,
    rhs: VReg,
) -> Result<(), CompileError> {
    if A::fp_temps().is_empty() {
        return Err(CompileError::Unsupported(
            "fp arithmetic on a soft-float target".to_owned(),
        ));
    }
    if wide {
        let l = regalloc::load_value_wide(cg, cg.loc(lhs), RegClass::Fp)?;
        let r = regalloc::load_value_wide(cg, cg.loc(rhs), RegClass::Fp)?;
        let d = regalloc::eval_loc_wide(cg, cg.loc(dst), RegClass::Fp, true)?;
        A::op_fp_bin(cg, op, true, d.low, l.low, r.low)?;
        cg.pool.mark_dirty(d.low);
        if d.high != d.low {
            cg.pool.mark_dirty(d.high);
        }
    } else {
        let l = regalloc::load_value(cg, cg.loc(lhs), RegClass::Fp)?;
        let r = regalloc::load_value(cg, cg.loc(rhs), RegClass::Fp)?;
        let d = regalloc::eval_loc(cg, cg.loc(dst), RegClass::Fp, true)?;
        A::op_fp_bin(cg, op, false, d.low, l.low, r.low)?;
        cg.pool.mark_dirty(d.low);
    }
    Ok(())
}

/// The branch target for an edge to `target`: the block's label, or for a backward edge a
/// suspend-test pad that falls on to it.
fn branch_dest<A: Isa>(cg: &mut Cg<'_, A>, bidx: BBlockIdx, target: BBlockIdx) -> LirIdx {
    let dest = cg.block_labels[target];
    if target <= bidx {
        launchpad::add_pad(cg, PadKind::Suspend { resume: dest }, [0, 0])
    } else {
        dest
    }
}

fn gen_if_test<A: Isa>(
    cg: &mut Cg<'_, A>,
    bidx: BBlockIdx,
    cond: Cond,
    lhs: VReg,
    rhs: VReg,
    target: BBlockIdx,
) -> Result<(), CompileError> {
    let l = regalloc::load_value(cg, cg.loc(lhs), RegClass::Core)?.low;
    let r = regalloc::load_value(cg, cg.loc(rhs), RegClass::Core)?.low;
    regalloc::flush_all_regs(cg);
    let dest = branch_dest(cg, bidx, target);
    let b = A::cond_branch(cg, cond, l, r);
    cg.lir.set_target(b, dest);
    Ok(())
}

fn gen_if_test_z<A: Isa>(
    cg: &mut Cg<'_, A>,
    bidx: BBlockIdx,
    cond: Cond,
    src: VReg,
    target: BBlockIdx,
) -> Result<(), CompileError> {
    let s = regalloc::load_value(cg, cg.loc(src), RegClass::Core)?.low;
    regalloc::flush_all_regs(cg);
    let dest = branch_dest(cg, bidx, target);
    let b = A::cond_branch_imm(cg, cond, s, 0);
    cg.lir.set_target(b, dest);
    Ok(())
}

fn gen_goto<A: Isa>(
    cg: &mut Cg<'_, A>,
    bidx: BBlockIdx,
    target: BBlockIdx,
) -> Result<(), CompileError> {
    regalloc::flush_all_regs(cg);
    let dest = branch_dest(cg, bidx, target);
    let b = A::branch(cg);
    cg.lir.set_target(b, dest);
    Ok(())
}

/// Packed dispatch: bias the key, bounds-test it, then add the table-relative displacement
/// fetched from the table to the table's own address and jump.
fn gen_packed_switch<A: Isa>(
    cg: &mut Cg<'_, A>,
    src: VReg,
    table_off: u32,
) -> Result<(), CompileError> {
    let dex_off = cg.lir.cur_dex_off;
    let sc = litpool::switch_cases(&cg.m.data, table_off, dex_off)?;
    let ti = cg.data.add_switch_table(table_off, dex_off);
    let key = regalloc::load_value(cg, cg.loc(src), RegClass::Core)?.low;
    regalloc::flush_all_regs(cg);
    cg.pool.mark_in_use(key);

    let idx = regalloc::alloc_temp(cg, RegClass::Core)?;
    A::op_bin_imm(cg, BinKind::Sub, idx, key, sc.first_key)?;
    let over = cg.lir.raw_pseudo(Pseudo::TargetLabel);
    let b = A::cond_branch_imm(cg, Cond::Hs, idx, sc.cases.len() as i32);
    cg.lir.set_target(b, over);
    let base = regalloc::alloc_temp(cg, RegClass::Core)?;
    A::load_table_addr(cg, base, TableRef::Switch(ti));
    let addr = regalloc::alloc_temp(cg, RegClass::Core)?;
    A::load_indexed(cg, addr, base, idx, 2, 8)?;
    A::op_bin(cg, BinKind::Add, addr, addr, base)?;
    A::jump_reg(cg, addr);
    // No case matched: fall through to the next bytecode.
    cg.lir.append(over);
    Ok(())
}

/// Sparse dispatch: an equality-branch chain in table order. The branches are linked to
/// their case labels once switch processing has planted them.
fn gen_sparse_switch<A: Isa>(
    cg: &mut Cg<'_, A>,
    src: VReg,
    table_off: u32,
) -> Result<(), CompileError> {
    let dex_off = cg.lir.cur_dex_off;
    let sc = litpool::switch_cases(&cg.m.data, table_off, dex_off)?;
    let ti = cg.data.add_switch_table(table_off, dex_off);
    let key = regalloc::load_value(cg, cg.loc(src), RegClass::Core)?.low;
    regalloc::flush_all_regs(cg);
    cg.pool.mark_in_use(key);
    let mut branches = Vec::with_capacity(sc.cases.len());
    for (case_key, _) in &sc.cases {
        branches.push(A::cond_branch_imm(cg, Cond::Eq, key, *case_key));
    }
    cg.data.switch_tables[ti].case_branches = branches;
    Ok(())
}

fn gen_fill_array<A: Isa>(
    cg: &mut Cg<'_, A>,
    inst: &MirInst,
    arr: VReg,
    table_off: u32,
) -> Result<(), CompileError> {
    // Validate the payload now; the helper trusts it at run time.
    litpool::fill_array_units(&cg.m.data, table_off)?;
    let fi = cg.data.add_fill_item(table_off);
    let a = regalloc::load_value(cg, cg.loc(arr), RegClass::Core)?.low;
    if !inst.flags.ignores_null_check() {
        null_check(cg, a);
    }
    let t = regalloc::alloc_temp(cg, RegClass::Core)?;
    A::load_table_addr(cg, t, TableRef::Fill(fi));
    regalloc::flush_all_regs(cg);
    A::helper_args2(cg, i32::from(a.mask_bit()), i32::from(t.mask_bit()));
    A::call_helper(cg, Helper::FillArrayData);
    cg.pool.clobber_all();
    Ok(())
}

fn gen_iget<A: Isa>(
    cg: &mut Cg<'_, A>,
    inst: &MirInst,
    dst: VReg,
    obj: VReg,
    field_idx: u32,
    wide: bool,
) -> Result<(), CompileError> {
    let fi = cg
        .resolver
        .field_offset(field_idx)
        .ok_or_else(|| CompileError::Unsupported(format!("unresolved field {field_idx}")))?;
    let o = regalloc::load_value(cg, cg.loc(obj), RegClass::Core)?.low;
    if !inst.flags.ignores_null_check() {
        null_check(cg, o);
    } else {
        cg.pool.mark_in_use(o);
    }
    if wide {
        let d = regalloc::eval_loc_wide(cg, cg.loc(dst), RegClass::Any, true)?;
        A::load_pair(cg, d.low, d.high, o, fi.offset);
        cg.pool.mark_dirty(d.low);
        if d.high != d.low {
            cg.pool.mark_dirty(d.high);
        }
    } else {
        let d = regalloc::eval_loc(cg, cg.loc(dst), RegClass::Any, true)?;
        A::load_word(cg, d.low, o, fi.offset);
        cg.pool.mark_dirty(d.low);
    }
    if fi.volatile {
        A::mem_barrier(cg);
    }
    Ok(())
}

fn gen_iput<A: Isa>(
    cg: &mut Cg<'_, A>,
    inst: &MirInst,
    src: VReg,
    obj: VReg,
    field_idx: u32,
    wide: bool,
) -> Result<(), CompileError> {
    let fi = cg
        .resolver
        .field_offset(field_idx)
        .ok_or_else(|| CompileError::Unsupported(format!("unresolved field {field_idx}")))?;
    let o = regalloc::load_value(cg, cg.loc(obj), RegClass::Core)?.low;
    if !inst.flags.ignores_null_check() {
        null_check(cg, o);
    } else {
        cg.pool.mark_in_use(o);
    }
    if wide {
        let s = regalloc::load_value_wide(cg, cg.loc(src), RegClass::Any)?;
        if fi.volatile {
            A::mem_barrier(cg);
        }
        A::store_pair(cg, s.low, s.high, o, fi.offset);
    } else {
        let s = regalloc::load_value(cg, cg.loc(src), RegClass::Any)?;
        if fi.volatile {
            A::mem_barrier(cg);
        }
        A::store_word(cg, s.low, o, fi.offset);
    }
    if fi.volatile {
        A::mem_barrier(cg);
    }
    Ok(())
}

fn gen_aget<A: Isa>(
    cg: &mut Cg<'_, A>,
    inst: &MirInst,
    dst: VReg,
    arr: VReg,
    idx: VReg,
) -> Result<(), CompileError> {
    let a = regalloc::load_value(cg, cg.loc(arr), RegClass::Core)?.low;
    if !inst.flags.ignores_null_check() {
        null_check(cg, a);
    } else {
        cg.pool.mark_in_use(a);
    }
    let i = regalloc::load_value(cg, cg.loc(idx), RegClass::Core)?.low;
    if !inst.flags.ignores_range_check() {
        range_check(cg, a, i)?;
    } else {
        cg.pool.mark_in_use(i);
    }
    let d = regalloc::eval_loc(cg, cg.loc(dst), RegClass::Any, true)?;
    A::load_indexed(cg, d.low, a, i, 2, abi::ARRAY_DATA_OFF)?;
    cg.pool.mark_dirty(d.low);
    Ok(())
}

fn gen_aput<A: Isa>(
    cg: &mut Cg<'_, A>,
    inst: &MirInst,
    src: VReg,
    arr: VReg,
    idx: VReg,
) -> Result<(), CompileError> {
    let a = regalloc::load_value(cg, cg.loc(arr), RegClass::Core)?.low;
    if !inst.flags.ignores_null_check() {
        null_check(cg, a);
    } else {
        cg.pool.mark_in_use(a);
    }
    let i = regalloc::load_value(cg, cg.loc(idx), RegClass::Core)?.low;
    if !inst.flags.ignores_range_check() {
        range_check(cg, a, i)?;
    } else {
        cg.pool.mark_in_use(i);
    }
    let s = regalloc::load_value(cg, cg.loc(src), RegClass::Any)?;
    A::store_indexed(cg, s.low, a, i, 2, abi::ARRAY_DATA_OFF)?;
    Ok(())
}

fn gen_array_length<A: Isa>(
    cg: &mut Cg<'_, A>,
    inst: &MirInst,
    dst: VReg,
    arr: VReg,
) -> Result<(), CompileError> {
    let a = regalloc::load_value(cg, cg.loc(arr), RegClass::Core)?.low;
    if !inst.flags.ignores_null_check() {
        null_check(cg, a);
    } else {
        cg.pool.mark_in_use(a);
    }
    let d = regalloc::eval_loc(cg, cg.loc(dst), RegClass::Core, true)?;
    A::load_word(cg, d.low, a, abi::ARRAY_LEN_OFF);
    cg.pool.mark_dirty(d.low);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        codegen::{
            mips::{Mips, Op},
            Codegen, Target,
        },
        mir::{BBlock, FieldInfo, InvokeKind, MethodInfo, MirFlags},
    };
    use fm::FMBuilder;
    use index_vec::IndexVec;
    use lazy_static::lazy_static;
    use regex::Regex;
    use smallvec::SmallVec;
    use vob::Vob;

    lazy_static! {
        static ref PTN_RE: Regex = Regex::new(r"\{\{.+?\}\}").unwrap();
        static ref TEXT_RE: Regex = Regex::new(r"[a-zA-Z0-9\._-]+").unwrap();
    }

    struct TestResolver;

    impl ConstResolver for TestResolver {
        fn field_offset(&self, field_idx: u32) -> Option<FieldInfo> {
            (field_idx < 100).then(|| FieldInfo {
                offset: 8 + field_idx as i32 * 4,
                volatile: false,
            })
        }

        fn method_info(&self, _method_idx: u32, _kind: InvokeKind) -> Option<MethodInfo> {
            None
        }
    }

    fn one_block(insts: Vec<MirInst>, num_vregs: u16, num_ins: u16) -> Method {
        let mut blocks = IndexVec::new();
        blocks.push(BBlock::new(insts));
        Method::new("t", num_vregs, num_ins, blocks)
    }

    fn lowered(m: Method, tuning: Tuning) -> (Cg<'static, Mips>, CompiledMethod) {
        let m = Box::leak(Box::new(m));
        let t = Box::leak(Box::new(tuning));
        let mut cg = Cg::new(m, &TestResolver, t).unwrap();
        let cm = lower(&mut cg).unwrap();
        (cg, cm)
    }

    fn linked_nodes(cg: &Cg<'_, Mips>) -> Vec<LirIdx> {
        let mut v = Vec::new();
        let mut it = cg.lir.first();
        while let Some(i) = it {
            v.push(i);
            it = cg.lir[i].next();
        }
        v
    }

    fn match_listing(cg: &Cg<'_, Mips>, ptn: &str) {
        let listing = cg.lir.to_string(false);
        let matcher = FMBuilder::new(ptn)
            .unwrap()
            .name_matcher(PTN_RE.clone(), TEXT_RE.clone())
            .build()
            .unwrap();
        if let Err(e) = matcher.matches(&listing) {
            panic!("{e}");
        }
    }

    fn v(i: usize) -> VReg {
        VReg::from_usize(i)
    }

    #[test]
    fn promoted_values_never_touch_the_frame() {
        let insts = vec![
            MirInst::new(
                MirOp::BinOp {
                    op: BinKind::Add,
                    dst: v(2),
                    lhs: v(0),
                    rhs: v(0),
                },
                0,
            ),
            MirInst::new(
                MirOp::BinOp {
                    op: BinKind::Add,
                    dst: v(2),
                    lhs: v(1),
                    rhs: v(1),
                },
                4,
            ),
            MirInst::new(MirOp::Return, 8),
        ];
        let mut m = one_block(insts, 3, 0);
        let mut hint = Vob::from_elem(false, 3);
        hint.set(0, true);
        m.promote_hint = Some(hint);
        // A threshold no use count reaches: only the hinted vreg is promoted.
        let (cg, cm) = lowered(
            m,
            Tuning {
                promote_min_uses: 100,
                ..Tuning::default()
            },
        );
        let home = cg.promo.get(v(0)).unwrap();
        assert!(cg.promo.get(v(1)).is_none());
        assert!(cm.core_spill_mask & (1 << home.mask_bit()) != 0);

        let frame_loads = |vr: VReg| {
            linked_nodes(&cg)
                .iter()
                .filter(|&&n| cg.lir[n].is_load() && !cg.lir[n].is_nop && cg.lir[n].alias == Some(vr))
                .count()
        };
        assert_eq!(frame_loads(v(0)), 0);
        // Both uses of the unpromoted vreg share one load.
        assert_eq!(frame_loads(v(1)), 1);
    }

    fn iget_method(flags: MirFlags) -> Method {
        let insts = vec![
            MirInst::with_flags(
                MirOp::IGet {
                    dst: v(0),
                    obj: v(1),
                    field_idx: 1,
                },
                0,
                flags,
            ),
            MirInst::new(MirOp::Return, 4),
        ];
        one_block(insts, 2, 1)
    }

    #[test]
    fn proven_nonnull_objects_skip_the_check_and_its_pad() {
        let (cg, _) = lowered(iget_method(MirFlags::none()), Tuning::default());
        let pad = cg
            .pads
            .iter()
            .find(|p| p.kind == PadKind::NullCheck)
            .copied()
            .unwrap();
        // Some branch forks to the pad.
        assert!(
            linked_nodes(&cg)
                .iter()
                .any(|&n| cg.lir[n].target == Some(pad.label))
        );

        let (cg, _) = lowered(
            iget_method(MirFlags::none().ignore_null_check()),
            Tuning::default(),
        );
        assert!(cg.pads.iter().all(|p| p.kind != PadKind::NullCheck));
    }

    #[test]
    fn unresolved_fields_fall_back() {
        let insts = vec![
            MirInst::new(
                MirOp::IGet {
                    dst: v(0),
                    obj: v(1),
                    field_idx: 500,
                },
                0,
            ),
            MirInst::new(MirOp::Return, 4),
        ];
        let m = Box::leak(Box::new(one_block(insts, 2, 1)));
        let t = Box::leak(Box::new(Tuning::default()));
        let mut cg = Cg::<Mips>::new(m, &TestResolver, t).unwrap();
        assert!(matches!(
            lower(&mut cg),
            Err(CompileError::Unsupported(_))
        ));
    }

    #[test]
    fn fp_arithmetic_needs_an_fp_register_file() {
        let insts = vec![
            MirInst::new(
                MirOp::FpBinOp {
                    op: FpBinKind::Add,
                    dst: v(0),
                    lhs: v(1),
                    rhs: v(2),
                },
                0,
            ),
            MirInst::new(MirOp::Return, 4),
        ];
        let mut m = one_block(insts, 3, 0);
        for i in 0..3 {
            m.fp_vregs.set(i, true);
        }
        let m = Box::leak(Box::new(m));
        let t = Box::leak(Box::new(Tuning::default()));
        let mut cg = Cg::<Mips>::new(m, &TestResolver, t).unwrap();
        assert!(matches!(
            lower(&mut cg),
            Err(CompileError::Unsupported(_))
        ));
    }

    #[test]
    fn backward_edges_route_through_a_suspend_pad() {
        let mut blocks = IndexVec::new();
        blocks.push(BBlock::new(vec![MirInst::new(
            MirOp::Goto {
                target: BBlockIdx::from_usize(0),
            },
            0,
        )]));
        let m = Method::new("t", 1, 0, blocks);
        let (cg, _) = lowered(m, Tuning::default());

        let pad = cg
            .pads
            .iter()
            .find(|p| matches!(p.kind, PadKind::Suspend { .. }))
            .copied()
            .unwrap();
        assert!(
            linked_nodes(&cg)
                .iter()
                .any(|&n| cg.lir[n].target == Some(pad.label))
        );
        match pad.kind {
            PadKind::Suspend { resume } => {
                assert_eq!(resume, cg.block_labels[BBlockIdx::from_usize(0)])
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn forward_edges_branch_straight_to_the_block() {
        let mut blocks = IndexVec::new();
        blocks.push(BBlock::new(vec![MirInst::new(
            MirOp::Goto {
                target: BBlockIdx::from_usize(1),
            },
            0,
        )]));
        blocks.push(BBlock::new(vec![MirInst::new(MirOp::Return, 2)]));
        let (cg, _) = lowered(Method::new("t", 1, 0, blocks), Tuning::default());
        assert!(
            cg.pads
                .iter()
                .all(|p| !matches!(p.kind, PadKind::Suspend { .. }))
        );
        let nodes = linked_nodes(&cg);
        let b = nodes
            .iter()
            .find(|&&n| cg.lir[n].op.real() == Some(Op::B))
            .unwrap();
        assert_eq!(
            cg.lir[*b].target,
            Some(cg.block_labels[BBlockIdx::from_usize(1)])
        );
    }

    #[test]
    fn dirty_values_reach_the_frame_before_a_branch() {
        let mut blocks = IndexVec::new();
        blocks.push(BBlock::new(vec![
            MirInst::new(MirOp::Const { dst: v(0), val: 5 }, 0),
            MirInst::new(
                MirOp::Goto {
                    target: BBlockIdx::from_usize(1),
                },
                4,
            ),
        ]));
        blocks.push(BBlock::new(vec![MirInst::new(
            MirOp::ReturnVal { src: v(0) },
            6,
        )]));
        let (cg, _) = lowered(Method::new("t", 1, 0, blocks), Tuning::default());

        let nodes = linked_nodes(&cg);
        let store = nodes
            .iter()
            .position(|&n| cg.lir[n].is_store() && !cg.lir[n].is_nop && cg.lir[n].alias == Some(v(0)))
            .unwrap();
        let branch = nodes
            .iter()
            .position(|&n| cg.lir[n].op.real() == Some(Op::B))
            .unwrap();
        assert!(store < branch);
        // The next block reloads the value from its slot.
        let reload = nodes
            .iter()
            .position(|&n| cg.lir[n].is_load() && !cg.lir[n].is_nop && cg.lir[n].alias == Some(v(0)))
            .unwrap();
        assert!(reload > branch);
    }

    #[test]
    fn wide_add_of_a_value_to_itself_keeps_the_carry() {
        let insts = vec![
            MirInst::new(
                MirOp::ConstWide {
                    dst: v(0),
                    val: 0xFFFF_FFFF,
                },
                0,
            ),
            MirInst::new(
                MirOp::BinOpWide {
                    op: BinKind::Add,
                    dst: v(2),
                    lhs: v(0),
                    rhs: v(0),
                },
                3,
            ),
            MirInst::new(MirOp::Return, 5),
        ];
        let mut m = one_block(insts, 4, 0);
        m.wide_vregs.set(0, true);
        m.wide_vregs.set(2, true);
        let (cg, _) = lowered(m, Tuning::default());

        // The carry compare must not see the summed low half on both sides; the shared
        // operand rides a copied pair.
        let nodes = linked_nodes(&cg);
        let carry = nodes
            .iter()
            .rev()
            .find(|&&n| cg.lir[n].op.real() == Some(Op::Sltu))
            .unwrap();
        assert_ne!(cg.lir[*carry].operands[1], cg.lir[*carry].operands[2]);
    }

    fn range_invoke(n_args: usize) -> Method {
        let insts = vec![
            MirInst::new(
                MirOp::Invoke {
                    kind: InvokeKind::Static,
                    method_idx: 7,
                    args: (0..n_args).map(VReg::from_usize).collect(),
                    range: true,
                },
                0,
            ),
            MirInst::new(MirOp::Return, 6),
        ];
        one_block(insts, 12, 0)
    }

    #[test]
    fn long_range_calls_copy_their_window_with_the_helper() {
        let (cg, _) = lowered(range_invoke(10), Tuning::default());
        let nodes = linked_nodes(&cg);
        // Six stack-bound words reach the helper as a byte count in its third argument
        // register.
        assert!(nodes.iter().any(|&n| cg.lir[n].op.real() == Some(Op::Addiu)
            && cg.lir[n].operands[0] == 6
            && cg.lir[n].operands[1] == 0
            && cg.lir[n].operands[2] == 24));
        let copy_calls = |cg: &Cg<'_, Mips>| {
            linked_nodes(cg)
                .iter()
                .filter(|&&n| {
                    cg.lir[n].op.real() == Some(Op::Lw)
                        && cg.lir[n].operands[2] == Helper::MemCopy.self_disp()
                })
                .count()
        };
        assert_eq!(copy_calls(&cg), 1);

        // A short window stays unrolled.
        let (cg, _) = lowered(range_invoke(6), Tuning::default());
        assert_eq!(copy_calls(&cg), 0);
    }

    #[test]
    fn receiverless_instance_invokes_are_an_internal_error() {
        let insts = vec![
            MirInst::new(
                MirOp::Invoke {
                    kind: InvokeKind::Virtual,
                    method_idx: 7,
                    args: SmallVec::new(),
                    range: false,
                },
                0,
            ),
            MirInst::new(MirOp::Return, 6),
        ];
        let m = Box::leak(Box::new(one_block(insts, 2, 0)));
        let t = Box::leak(Box::new(Tuning::default()));
        let mut cg = Cg::<Mips>::new(m, &TestResolver, t).unwrap();
        assert!(matches!(lower(&mut cg), Err(CompileError::Internal(_))));
    }

    #[test]
    fn listing_shows_the_whole_pipeline() {
        let insts = vec![
            MirInst::new(MirOp::Const { dst: v(0), val: 7 }, 0),
            MirInst::new(MirOp::ReturnVal { src: v(0) }, 4),
        ];
        let (cg, _) = lowered(one_block(insts, 1, 0), Tuning::default());
        match_listing(
            &cg,
            "lw r8, r22, 16
addiu r8, r8, 8
sltu r1, r29, r8
bne 1, 0 -> @{{pad}}
nop
addiu r29, r29, -8
sw r31, r29, 4
L0:
-- bc 0x0000
addiu r{{t}}, r0, 7
-- bc 0x0004
...
jr 31
nop
T{{pad}}:
-- bc 0x0000
lw r25, r22, 140
jalr 25
nop
",
        );
    }

    #[test]
    fn every_target_compiles_a_simple_method() {
        for target in [Target::Arm, Target::Mips, Target::X86] {
            let insts = vec![
                MirInst::new(MirOp::Const { dst: v(0), val: 1 }, 0),
                MirInst::new(MirOp::Const { dst: v(1), val: 2 }, 2),
                MirInst::new(
                    MirOp::BinOp {
                        op: BinKind::Add,
                        dst: v(2),
                        lhs: v(0),
                        rhs: v(1),
                    },
                    4,
                ),
                MirInst::new(MirOp::ReturnVal { src: v(2) }, 6),
            ];
            let m = one_block(insts, 3, 0);
            let cgen = Codegen::new(target).unwrap();
            let cm = cgen.compile(&m, &TestResolver).unwrap();
            assert!(!cm.code.is_empty(), "{target:?}");
            assert_eq!(cm.map.first().map(|e| e.dex_off), Some(0), "{target:?}");
            assert!(
                cm.map.windows(2).all(|w| w[0].code_off <= w[1].code_off),
                "{target:?}"
            );
            assert_eq!(cm.frame_size % 8, 0, "{target:?}");
        }
    }
}
