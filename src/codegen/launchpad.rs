//! Launch pads: the out-of-line slow paths the main instruction walk only branches to.
//!
//! A check in the hot path (null, divide-by-zero, array bounds, stack depth, suspend) forks
//! with a single conditional branch to a pad registered here; the pad bodies are emitted in
//! one batch after the method body so the fall-through path stays straight. Throwing pads
//! never return. Suspend and intrinsic-retry pads call their helper and branch back to a
//! resume label.
//!
//! A pad is entered with the frame coherent (every fork point flushes first) but with no
//! register residency guarantees beyond the registers its fork recorded in
//! [Pad::operands]; emission resets the pool accordingly.

use crate::codegen::{
    lir::{LirIdx, Pseudo},
    mir_to_lir::Isa,
    Cg, CompileError, Helper,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum PadKind {
    /// Throw a null pointer exception.
    NullCheck,
    /// Throw an arithmetic exception.
    DivZero,
    /// Throw an out-of-bounds exception; the fork records index and length registers.
    BoundsCheck,
    /// Throw on stack exhaustion, from the method prologue.
    StackOverflow,
    /// Run the suspend test taken on a backward branch, then resume.
    Suspend { resume: LirIdx },
    /// The out-of-line general case of an inlined string compare; the fork records the two
    /// operand registers.
    StringRetry { resume: LirIdx },
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Pad {
    pub(crate) kind: PadKind,
    /// Entry label, unlinked until the pad body is emitted.
    pub(crate) label: LirIdx,
    /// Bytecode offset of the faulting instruction; pad code maps back to it.
    pub(crate) dex_off: u32,
    /// Register mask bits the pad hands to its helper; meaning depends on `kind`.
    pub(crate) operands: [i32; 2],
}

/// Register a pad and return the entry label for the fork branch to target.
pub(crate) fn add_pad<A: Isa>(cg: &mut Cg<'_, A>, kind: PadKind, operands: [i32; 2]) -> LirIdx {
    let label = cg.lir.raw_pseudo(Pseudo::TargetLabel);
    cg.pads.push(Pad {
        kind,
        label,
        dex_off: cg.lir.cur_dex_off,
        operands,
    });
    label
}

/// Emit every registered pad body after the method's epilogue.
pub(crate) fn emit_pads<A: Isa>(cg: &mut Cg<'_, A>) -> Result<(), CompileError> {
    for pi in 0..cg.pads.len() {
        let Pad {
            kind,
            label,
            dex_off,
            operands,
        } = cg.pads[pi];
        cg.lir.cur_dex_off = dex_off;
        cg.pool.reset();
        cg.pool.clobber_all();
        cg.lir.append(label);
        // Pads throw on behalf of their fork point, so the mapping table must cover them.
        cg.lir.add_pseudo(Pseudo::Boundary);
        match kind {
            PadKind::NullCheck => A::call_helper(cg, Helper::ThrowNullPointer),
            PadKind::DivZero => A::call_helper(cg, Helper::ThrowDivZero),
            PadKind::BoundsCheck => {
                A::helper_args2(cg, operands[0], operands[1]);
                A::call_helper(cg, Helper::ThrowArrayBounds);
            }
            PadKind::StackOverflow => A::call_helper(cg, Helper::ThrowStackOverflow),
            PadKind::Suspend { resume } => {
                A::call_helper(cg, Helper::TestSuspend);
                let b = A::branch(cg);
                cg.lir.set_target(b, resume);
            }
            PadKind::StringRetry { resume } => {
                A::helper_args2(cg, operands[0], operands[1]);
                A::call_helper(cg, Helper::StringCompareTo);
                let b = A::branch(cg);
                cg.lir.set_target(b, resume);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        codegen::{
            mips::{Mips, Op},
            Tuning,
        },
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

    fn cg_for_test() -> Cg<'static, Mips> {
        let mut blocks = IndexVec::new();
        blocks.push(BBlock::new(vec![]));
        let m = Box::leak(Box::new(Method::new("t", 1, 0, blocks)));
        let t = Box::leak(Box::new(Tuning::default()));
        Cg::new(m, &NoResolver, t).unwrap()
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

    fn op_of(cg: &Cg<'_, Mips>, idx: LirIdx) -> Option<Op> {
        cg.lir[idx].op.real()
    }

    #[test]
    fn pads_follow_the_body_in_registration_order() {
        let mut cg = cg_for_test();
        cg.lir.cur_dex_off = 4;
        let p1 = add_pad(&mut cg, PadKind::NullCheck, [0, 0]);
        cg.lir.cur_dex_off = 8;
        let resume = cg.lir.add_pseudo(Pseudo::TargetLabel);
        let p2 = add_pad(&mut cg, PadKind::Suspend { resume }, [0, 0]);
        assert_eq!(cg.pads.len(), 2);
        emit_pads(&mut cg).unwrap();

        let nodes = linked_nodes(&cg);
        let i1 = nodes.iter().position(|&n| n == p1).unwrap();
        let i2 = nodes.iter().position(|&n| n == p2).unwrap();
        assert!(i1 < i2);

        // The throw pad: its label, a boundary carrying the fork's bytecode offset, and a
        // helper call with nothing after it.
        assert!(cg.lir[nodes[i1 + 1]].is_boundary());
        assert_eq!(cg.lir[nodes[i1 + 1]].dex_off, 4);
        assert_eq!(op_of(&cg, nodes[i1 + 2]), Some(Op::Lw));
        assert_eq!(
            cg.lir[nodes[i1 + 2]].operands[2],
            Helper::ThrowNullPointer.self_disp()
        );
        assert_eq!(op_of(&cg, nodes[i1 + 3]), Some(Op::Jalr));
        assert_eq!(op_of(&cg, nodes[i1 + 4]), Some(Op::Nop));
        assert_eq!(nodes[i1 + 5], p2);

        // The suspend pad calls its helper and branches back to the resume label.
        assert!(cg.lir[nodes[i2 + 1]].is_boundary());
        assert_eq!(cg.lir[nodes[i2 + 1]].dex_off, 8);
        assert_eq!(
            cg.lir[nodes[i2 + 2]].operands[2],
            Helper::TestSuspend.self_disp()
        );
        let b = nodes[i2 + 5];
        assert_eq!(op_of(&cg, b), Some(Op::B));
        assert_eq!(cg.lir[b].target, Some(resume));
    }

    #[test]
    fn bounds_pads_hand_over_their_recorded_registers() {
        let mut cg = cg_for_test();
        // t0 holds the index, t1 the length.
        add_pad(&mut cg, PadKind::BoundsCheck, [8, 9]);
        emit_pads(&mut cg).unwrap();

        let nodes = linked_nodes(&cg);
        let moves: Vec<_> = nodes
            .iter()
            .filter(|&&n| op_of(&cg, n) == Some(Op::MoveRR))
            .map(|&n| (cg.lir[n].operands[0], cg.lir[n].operands[1]))
            .collect();
        // a0 <- t0, a1 <- t1.
        assert_eq!(moves, vec![(4, 8), (5, 9)]);
        let lw = nodes
            .iter()
            .find(|&&n| op_of(&cg, n) == Some(Op::Lw))
            .unwrap();
        assert_eq!(
            cg.lir[*lw].operands[2],
            Helper::ThrowArrayBounds.self_disp()
        );
    }

    #[test]
    fn string_retry_pads_resume_after_the_call() {
        let mut cg = cg_for_test();
        let resume = cg.lir.add_pseudo(Pseudo::TargetLabel);
        add_pad(&mut cg, PadKind::StringRetry { resume }, [4, 5]);
        emit_pads(&mut cg).unwrap();

        let nodes = linked_nodes(&cg);
        let b = nodes
            .iter()
            .find(|&&n| op_of(&cg, n) == Some(Op::B))
            .unwrap();
        assert_eq!(cg.lir[*b].target, Some(resume));
        let lw = nodes
            .iter()
            .find(|&&n| op_of(&cg, n) == Some(Op::Lw))
            .unwrap();
        assert_eq!(
            cg.lir[*lw].operands[2],
            Helper::StringCompareTo.self_disp()
        );
    }
}
