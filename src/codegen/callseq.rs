//! Call sequences.
//!
//! An invoke lowers in phases: receiver null check, a flush so the frame is the single
//! source of truth, argument marshaling into the outgoing area and the argument registers,
//! and the target-specific invocation state machine that materialises the callee address.
//! The machine is advanced one step between marshaling moves so address formation overlaps
//! the argument traffic, then drained before the call itself.
//!
//! Out-slot stores beyond the argument registers are unrolled word by word; a range call
//! moving [Tuning::arg_block_copy_min](crate::Tuning::arg_block_copy_min) or more words
//! hands the window to the block-copy helper instead. Either way the callee sees its
//! incoming words contiguous above the caller's frame: register-passed words are written
//! back by the callee's own prologue, never here.

use crate::{
    codegen::{
        abi,
        launchpad::{self, PadKind},
        lir::Pseudo,
        litpool,
        mir_to_lir::{self, Isa},
        regalloc::{self, LocKind, RegClass, RegLoc, RegT},
        Cg, CompileError, Helper, PatchKind,
    },
    mir::{BinKind, Cond, Intrinsic, InvokeKind, Method, MethodInfo, MirFlags, MirOp, VReg},
};

/// Outgoing-argument area size in bytes. Sized by the widest invoke in the method, since
/// every callee's incoming words alias this one area.
pub(crate) fn outs_size(m: &Method) -> u32 {
    let mut max_words = 0;
    for b in &m.blocks {
        for inst in &b.insts {
            if let MirOp::Invoke { args, .. } = &inst.op {
                max_words = max_words.max(args.len());
            }
        }
    }
    (max_words * 4) as u32
}

/// How the callee's code address is materialised.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum CallPath {
    /// Statically bound. With a known code address the site loads it directly; otherwise it
    /// loads the method-table entry and indirects. Both load through a patched constant.
    Fixed { direct_code: Option<u32> },
    /// Loaded from the receiver class's dispatch table.
    Vtable { vtable_idx: u32 },
    /// Not resolvable at compile time: route through the resolution trampoline, which
    /// decodes the call site from the mapping table and completes the invocation itself.
    Resolve,
}

/// Where the receiver sits once the pre-call flush has run.
#[derive(Clone, Copy, Debug)]
pub(crate) enum ThisLoc<R> {
    None,
    /// A promoted home register, untouched by marshaling.
    Reg(R),
    /// The receiver vreg's frame displacement.
    Frame(i32),
}

/// Everything a target's invocation state machine needs to know about the call.
pub(crate) struct CallInfo<R: RegT> {
    pub(crate) method_idx: u32,
    pub(crate) path: CallPath,
    pub(crate) this: ThisLoc<R>,
}

fn decide_path(kind: InvokeKind, resolved: Option<&MethodInfo>) -> CallPath {
    match resolved {
        Some(mi) if !mi.needs_access_check => match kind {
            InvokeKind::Virtual => CallPath::Vtable {
                vtable_idx: mi.vtable_idx,
            },
            // No dispatch-table model for interfaces; the trampoline handles them.
            InvokeKind::Interface => CallPath::Resolve,
            InvokeKind::Static | InvokeKind::Direct => CallPath::Fixed {
                direct_code: mi.direct_code,
            },
        },
        _ => CallPath::Resolve,
    }
}

fn advance<A: Isa>(
    cg: &mut Cg<'_, A>,
    info: &CallInfo<A::Reg>,
    state: &mut Option<u32>,
) -> Result<(), CompileError> {
    if let Some(s) = *state {
        *state = A::next_call_insn(cg, info, s)?;
    }
    Ok(())
}

/// The standard invocation state machine: a chain of word loads into `tgt`, the target's
/// invoke scratch. Targets whose address formation fits this shape delegate their
/// [next_call_insn](Isa::next_call_insn) here, passing their own scratch and stack registers.
pub(crate) fn next_call_insn_std<A: Isa>(
    cg: &mut Cg<'_, A>,
    info: &CallInfo<A::Reg>,
    state: u32,
    tgt: A::Reg,
    sp: A::Reg,
) -> Result<Option<u32>, CompileError> {
    match info.path {
        CallPath::Fixed { direct_code } => match (state, direct_code) {
            (0, Some(_)) => {
                A::load_patchable(cg, tgt, info.method_idx, PatchKind::Static);
                Ok(None)
            }
            (0, None) => {
                A::load_patchable(cg, tgt, info.method_idx, PatchKind::Dynamic);
                Ok(Some(1))
            }
            (1, None) => {
                A::load_word(cg, tgt, tgt, abi::METHOD_CODE_OFF);
                Ok(None)
            }
            _ => Err(bad_call_state(state)),
        },
        CallPath::Vtable { vtable_idx } => {
            let disp = i32::try_from(u64::from(vtable_idx) * 4).map_err(|_| {
                CompileError::Unsupported(format!("vtable index {vtable_idx} out of range"))
            })?;
            match (state, info.this) {
                (0, ThisLoc::Frame(d)) => {
                    A::load_word(cg, tgt, sp, d);
                    Ok(Some(1))
                }
                (0, ThisLoc::Reg(r)) => {
                    A::load_word(cg, tgt, r, abi::OBJ_CLASS_OFF);
                    Ok(Some(2))
                }
                (0, ThisLoc::None) => Err(CompileError::Internal(
                    "virtual call without a receiver".to_owned(),
                )),
                (1, _) => {
                    A::load_word(cg, tgt, tgt, abi::OBJ_CLASS_OFF);
                    Ok(Some(2))
                }
                (2, _) => {
                    A::load_word(cg, tgt, tgt, abi::CLASS_VTABLE_OFF);
                    Ok(Some(3))
                }
                (3, _) => {
                    A::load_word(cg, tgt, tgt, disp);
                    Ok(Some(4))
                }
                (4, _) => {
                    A::load_word(cg, tgt, tgt, abi::METHOD_CODE_OFF);
                    Ok(None)
                }
                _ => Err(bad_call_state(state)),
            }
        }
        // The trampoline is the whole sequence; there is nothing to set up.
        CallPath::Resolve => Ok(None),
    }
}

fn bad_call_state(state: u32) -> CompileError {
    CompileError::Internal(format!("call state {state} out of sequence"))
}

pub(crate) fn gen_invoke<A: Isa>(
    cg: &mut Cg<'_, A>,
    flags: MirFlags,
    kind: InvokeKind,
    method_idx: u32,
    args: &[VReg],
    range: bool,
) -> Result<(), CompileError> {
    if kind != InvokeKind::Static && args.is_empty() {
        return Err(CompileError::Internal(
            "instance invoke with no receiver".to_owned(),
        ));
    }
    let resolved = cg.resolver.method_info(method_idx, kind);
    if let Some(mi) = &resolved {
        if !mi.needs_access_check {
            if let Some(intr) = mi.intrinsic {
                return gen_intrinsic(cg, flags, intr, args);
            }
        }
    }

    if kind != InvokeKind::Static && !flags.ignores_null_check() {
        let recv = regalloc::load_value(cg, cg.loc(args[0]), RegClass::Core)?.low;
        mir_to_lir::null_check(cg, recv);
        cg.pool.free_temp(recv);
    }

    let this = if kind == InvokeKind::Static {
        ThisLoc::None
    } else if let Some(r) = cg.promo.get(args[0]) {
        ThisLoc::Reg(r)
    } else {
        ThisLoc::Frame(cg.vreg_disp(args[0]))
    };
    let info = CallInfo {
        method_idx,
        path: decide_path(kind, resolved.as_ref()),
        this,
    };

    regalloc::flush_all_regs(cg);

    let arg_regs = A::arg_regs();
    let n_reg = args.len().min(arg_regs.len());

    // A long range call copies its stack words through the block-copy helper; the window
    // must sit on one side of the locals/in-args split for its frame slots to be contiguous.
    let first_in = cg.m.num_vregs - cg.m.num_ins;
    let use_helper = range
        && args.len() - n_reg >= cg.tuning.arg_block_copy_min
        && (args[args.len() - 1].raw() < first_in || args[n_reg].raw() >= first_in);
    if use_helper {
        emit_range_copy(cg, args, n_reg)?;
    }

    cg.pool.mark_in_use(A::invoke_target_reg());
    let mut state = Some(0u32);
    advance(cg, &info, &mut state)?;

    if !use_helper {
        for (i, v) in args.iter().enumerate().skip(n_reg) {
            let disp = cg.out_disp(i);
            if let Some(r) = cg.promo.get(*v) {
                let s = A::store_word(cg, r, A::sp_reg(), disp);
                litpool::mark_out_arg_store(&mut cg.lir, s);
            } else {
                let t = regalloc::alloc_temp(cg, RegClass::Core)?;
                let l = A::load_word(cg, t, A::sp_reg(), cg.vreg_disp(*v));
                cg.lir.annotate_frame_ref(l, *v);
                let s = A::store_word(cg, t, A::sp_reg(), disp);
                litpool::mark_out_arg_store(&mut cg.lir, s);
                cg.pool.free_temp(t);
            }
            advance(cg, &info, &mut state)?;
        }
    }

    for (i, v) in args.iter().enumerate().take(n_reg) {
        if let Some(r) = cg.promo.get(*v) {
            A::op_reg_copy(cg, arg_regs[i], r);
        } else {
            let l = A::load_word(cg, arg_regs[i], A::sp_reg(), cg.vreg_disp(*v));
            cg.lir.annotate_frame_ref(l, *v);
        }
        advance(cg, &info, &mut state)?;
    }
    while state.is_some() {
        advance(cg, &info, &mut state)?;
    }

    match info.path {
        CallPath::Resolve => A::call_helper(cg, Helper::ResolveInvoke),
        _ => A::emit_call_reg(cg, A::invoke_target_reg()),
    }
    cg.pool.clobber_all();
    Ok(())
}

/// Copy the stack-passed argument words of a long range call with the block-copy helper
/// instead of unrolled moves. Promoted values in the window are written back to their
/// frame slots first so the helper sees current data. Runs right after the pre-call flush,
/// before anything live sits in a caller-saved register.
fn emit_range_copy<A: Isa>(
    cg: &mut Cg<'_, A>,
    args: &[VReg],
    from: usize,
) -> Result<(), CompileError> {
    for v in &args[from..] {
        if let Some(r) = cg.promo.get(*v) {
            let s = A::store_word(cg, r, A::sp_reg(), cg.vreg_disp(*v));
            cg.lir.annotate_frame_ref(s, *v);
        }
    }

    let [dst, src, len] = A::helper_arg_regs();
    A::op_bin_imm(cg, BinKind::Add, dst, A::sp_reg(), cg.out_disp(from))?;
    A::op_bin_imm(cg, BinKind::Add, src, A::sp_reg(), cg.vreg_disp(args[from]))?;
    A::load_const(cg, len, ((args.len() - from) * 4) as i32);
    A::call_helper(cg, Helper::MemCopy);
    cg.pool.clobber_all();
    Ok(())
}

/// Bind the pending call result, which the call left in the core return registers, to its
/// destination vreg through the usual adoption rule.
pub(crate) fn gen_move_result<A: Isa>(
    cg: &mut Cg<'_, A>,
    dst: VReg,
    wide: bool,
) -> Result<(), CompileError> {
    let (r0, r1) = A::ret_regs();
    let dest = cg.loc(dst);
    let src = RegLoc {
        kind: LocKind::Reg,
        wide,
        fp: false,
        home: false,
        low: r0,
        high: if wide { r1 } else { r0 },
        vreg: dst,
    };
    if wide {
        regalloc::store_value_wide(cg, dest, src)?;
    } else {
        regalloc::store_value(cg, dest, src)?;
    }
    Ok(())
}

/// Expand a resolved intrinsic in place of the call. The result is left in the first core
/// return register so the following move-result behaves exactly as after a real call.
fn gen_intrinsic<A: Isa>(
    cg: &mut Cg<'_, A>,
    flags: MirFlags,
    intr: Intrinsic,
    args: &[VReg],
) -> Result<(), CompileError> {
    let (r0, _) = A::ret_regs();
    match intr {
        Intrinsic::AbsInt => {
            let ta = regalloc::load_value(cg, cg.loc(args[0]), RegClass::Core)?.low;
            regalloc::flush_all_regs(cg);
            cg.pool.mark_in_use(r0);
            let sign = regalloc::alloc_temp(cg, RegClass::Core)?;
            // abs(x) = (x + (x >> 31)) ^ (x >> 31), branch free.
            A::op_bin_imm(cg, BinKind::Shr, sign, ta, 31)?;
            A::op_bin(cg, BinKind::Add, r0, ta, sign)?;
            A::op_bin(cg, BinKind::Xor, r0, r0, sign)?;
        }
        Intrinsic::StringCompareTo => {
            // The inline result forms in r0 before the compare, so neither operand may
            // ride there.
            regalloc::flush_reg(cg, r0);
            cg.pool.clobber(r0);
            cg.pool.mark_in_use(r0);
            let ta = regalloc::load_value(cg, cg.loc(args[0]), RegClass::Core)?.low;
            let tb = regalloc::load_value(cg, cg.loc(args[1]), RegClass::Core)?.low;
            if !flags.ignores_null_check() {
                mir_to_lir::null_check(cg, ta);
            }
            regalloc::flush_all_regs(cg);
            // Equal references compare as zero without leaving the line; anything else
            // takes the out-of-line helper and rejoins below.
            A::load_const(cg, r0, 0);
            let b = A::cond_branch(cg, Cond::Ne, ta, tb);
            let resume = cg.lir.raw_pseudo(Pseudo::TargetLabel);
            let pad = launchpad::add_pad(
                cg,
                PadKind::StringRetry { resume },
                [i32::from(ta.mask_bit()), i32::from(tb.mask_bit())],
            );
            cg.lir.set_target(b, pad);
            cg.lir.append(resume);
        }
    }
    cg.pool.clobber_all();
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mir::{BBlock, MirInst};
    use index_vec::IndexVec;

    fn invoke(kind: InvokeKind, n_args: usize, dex_off: u32) -> MirInst {
        let args = (0..n_args).map(VReg::from_usize).collect();
        MirInst::new(
            MirOp::Invoke {
                kind,
                method_idx: 7,
                args,
                range: false,
            },
            dex_off,
        )
    }

    #[test]
    fn outs_area_sized_by_widest_invoke() {
        let mut blocks = IndexVec::new();
        blocks.push(BBlock::new(vec![
            invoke(InvokeKind::Static, 1, 0),
            invoke(InvokeKind::Virtual, 3, 6),
            MirInst::new(MirOp::Return, 12),
        ]));
        let m = Method::new("outs", 3, 0, blocks);
        assert_eq!(outs_size(&m), 12);
    }

    #[test]
    fn leaf_method_needs_no_outs() {
        let mut blocks = IndexVec::new();
        blocks.push(BBlock::new(vec![MirInst::new(MirOp::Return, 0)]));
        let m = Method::new("leaf", 2, 0, blocks);
        assert_eq!(outs_size(&m), 0);
    }

    #[test]
    fn resolved_calls_pick_the_fast_paths() {
        let mi = MethodInfo {
            vtable_idx: 9,
            direct_code: None,
            needs_access_check: false,
            intrinsic: None,
        };
        assert_eq!(
            decide_path(InvokeKind::Virtual, Some(&mi)),
            CallPath::Vtable { vtable_idx: 9 }
        );
        assert_eq!(
            decide_path(InvokeKind::Static, Some(&mi)),
            CallPath::Fixed { direct_code: None }
        );
        let bound = MethodInfo {
            direct_code: Some(0x4000),
            ..mi
        };
        assert_eq!(
            decide_path(InvokeKind::Direct, Some(&bound)),
            CallPath::Fixed {
                direct_code: Some(0x4000)
            }
        );
    }

    #[test]
    fn unresolvable_calls_fall_back_to_the_trampoline() {
        let mi = MethodInfo {
            vtable_idx: 3,
            direct_code: None,
            needs_access_check: false,
            intrinsic: None,
        };
        assert_eq!(decide_path(InvokeKind::Interface, Some(&mi)), CallPath::Resolve);
        assert_eq!(decide_path(InvokeKind::Virtual, None), CallPath::Resolve);
        let checked = MethodInfo {
            needs_access_check: true,
            ..mi
        };
        assert_eq!(
            decide_path(InvokeKind::Static, Some(&checked)),
            CallPath::Resolve
        );
    }
}
