//! Local elimination of redundant frame traffic.
//!
//! Emission is deliberately naive about memory: every value load and every flush goes
//! through a vreg's frame slot. This pass removes the traffic that the resource masks and
//! slot annotations prove redundant, within extended basic blocks: scans skip
//! [Pseudo::Boundary] markers but stop at labels, barriers and anything branch-flagged
//! (whose masks claim every resource).
//!
//! Two patterns are handled:
//!
//!   * a load from a slot whose value provably still sits in the load's own destination
//!     register (a preceding load or store of that slot through the same register, with no
//!     intervening definition of the register and no intervening write that could alias the
//!     slot) becomes a nop;
//!   * a store to a slot that is overwritten by a later same-width store before any
//!     possible read of the slot becomes a nop.
//!
//! Nodes are marked [Lir::is_nop] rather than unlinked, so listings still show what was
//! eliminated.

use crate::codegen::lir::{LirBuf, LirOp, MemRefKind, OpT, Pseudo};

pub(crate) fn apply_local_opts<Op: OpT>(lir: &mut LirBuf<Op>) {
    eliminate_redundant_loads(lir);
    eliminate_dead_stores(lir);
}

fn eliminate_redundant_loads<Op: OpT>(lir: &mut LirBuf<Op>) {
    let mut it = lir.first();
    while let Some(d) = it {
        it = lir[d].next();
        if lir[d].is_nop || !lir[d].is_load() {
            continue;
        }
        let v = match lir[d].alias {
            Some(v) => v,
            None => continue,
        };
        let dst_bit = lir[d].operands[0];
        let d_claims = lir[d].use_mask.minus_mem().union(lir[d].def_mask);

        let mut back = lir[d].prev();
        while let Some(p) = back {
            back = lir[p].prev();
            if lir[p].is_nop {
                continue;
            }
            match &lir[p].op {
                LirOp::Pseudo(Pseudo::Boundary) => continue,
                LirOp::Pseudo(_) => break,
                LirOp::Real(_) => (),
            }
            if lir[p].alias == Some(v) {
                if lir[p].is_load() && lir[p].operands[0] == dst_bit {
                    lir[d].is_nop = true;
                }
                if lir[p].is_store() && lir[p].operands[0] == dst_bit {
                    lir[d].is_nop = true;
                }
                // Same slot through a different register: the slot value is known but we
                // only elide, never rewrite into a copy.
                break;
            }
            let pd = lir[p].def_mask;
            if pd.interferes(d_claims) {
                break;
            }
            if pd.contains_mem(MemRefKind::Frame) && lir[p].alias.is_none() {
                break;
            }
        }
    }
}

fn eliminate_dead_stores<Op: OpT>(lir: &mut LirBuf<Op>) {
    let mut it = lir.first();
    while let Some(s) = it {
        it = lir[s].next();
        if lir[s].is_nop || !lir[s].is_store() {
            continue;
        }
        let v = match lir[s].alias {
            Some(v) => v,
            None => continue,
        };

        let mut fwd = lir[s].next();
        while let Some(n) = fwd {
            fwd = lir[n].next();
            if lir[n].is_nop {
                continue;
            }
            match &lir[n].op {
                LirOp::Pseudo(Pseudo::Boundary) => continue,
                LirOp::Pseudo(_) => break,
                LirOp::Real(_) => (),
            }
            if lir[n].is_store() && lir[n].alias == Some(v) {
                // Same opcode means same width, so the overwrite fully covers us.
                if lir[n].op == lir[s].op {
                    lir[s].is_nop = true;
                }
                break;
            }
            if lir[n].use_mask.contains_mem(MemRefKind::Frame)
                && (lir[n].alias.is_none() || lir[n].alias == Some(v))
            {
                break;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codegen::lir::{OpFlags, OpInfo, Pseudo};
    use crate::mir::VReg;

    #[derive(Clone, Copy, Debug, PartialEq)]
    #[repr(u8)]
    enum TOp {
        Ldr,
        Str,
        Mov,
        B,
    }

    static TINFO: [OpInfo; 4] = [
        OpInfo {
            name: "ldr",
            flags: OpFlags::none().load().def0().use1(),
        },
        OpInfo {
            name: "str",
            flags: OpFlags::none().store().use0().use1(),
        },
        OpInfo {
            name: "mov",
            flags: OpFlags::none().def0().use1(),
        },
        OpInfo {
            name: "b",
            flags: OpFlags::none().branch(),
        },
    ];

    impl OpT for TOp {
        fn info(&self) -> &'static OpInfo {
            &TINFO[*self as usize]
        }
    }

    const SP: i32 = 13;

    fn ldr(lir: &mut LirBuf<TOp>, dst: i32, v: usize) -> crate::codegen::lir::LirIdx {
        let i = lir.new_lir2(TOp::Ldr, dst, SP);
        lir.annotate_frame_ref(i, VReg::from_usize(v));
        i
    }

    fn str(lir: &mut LirBuf<TOp>, src: i32, v: usize) -> crate::codegen::lir::LirIdx {
        let i = lir.new_lir2(TOp::Str, src, SP);
        lir.annotate_frame_ref(i, VReg::from_usize(v));
        i
    }

    fn buf() -> LirBuf<TOp> {
        LirBuf::new(SP as u8, None, None)
    }

    #[test]
    fn reload_after_store_is_elided() {
        let mut lir = buf();
        str(&mut lir, 0, 5);
        lir.add_pseudo(Pseudo::Boundary);
        let d = ldr(&mut lir, 0, 5);
        apply_local_opts(&mut lir);
        assert!(lir[d].is_nop);
    }

    #[test]
    fn reload_after_load_is_elided() {
        let mut lir = buf();
        let first = ldr(&mut lir, 2, 5);
        let second = ldr(&mut lir, 2, 5);
        apply_local_opts(&mut lir);
        assert!(!lir[first].is_nop);
        assert!(lir[second].is_nop);
    }

    #[test]
    fn clobbered_register_keeps_load() {
        let mut lir = buf();
        str(&mut lir, 0, 5);
        lir.new_lir2(TOp::Mov, 0, 1);
        let d = ldr(&mut lir, 0, 5);
        apply_local_opts(&mut lir);
        assert!(!lir[d].is_nop);
    }

    #[test]
    fn other_slot_store_does_not_block() {
        let mut lir = buf();
        str(&mut lir, 0, 5);
        str(&mut lir, 1, 6);
        let d = ldr(&mut lir, 0, 5);
        apply_local_opts(&mut lir);
        assert!(lir[d].is_nop);
    }

    #[test]
    fn branch_blocks_elimination() {
        let mut lir = buf();
        str(&mut lir, 0, 5);
        lir.new_lir0(TOp::B);
        let d = ldr(&mut lir, 0, 5);
        apply_local_opts(&mut lir);
        assert!(!lir[d].is_nop);
    }

    #[test]
    fn overwritten_store_is_dead() {
        let mut lir = buf();
        let s = str(&mut lir, 0, 5);
        lir.add_pseudo(Pseudo::Boundary);
        str(&mut lir, 1, 5);
        apply_local_opts(&mut lir);
        assert!(lir[s].is_nop);
    }

    #[test]
    fn store_live_across_label() {
        let mut lir = buf();
        let s = str(&mut lir, 0, 5);
        lir.add_pseudo(Pseudo::TargetLabel);
        str(&mut lir, 1, 5);
        apply_local_opts(&mut lir);
        assert!(!lir[s].is_nop);
    }

    #[test]
    fn read_keeps_store() {
        let mut lir = buf();
        let s = str(&mut lir, 0, 5);
        ldr(&mut lir, 2, 5);
        str(&mut lir, 1, 5);
        apply_local_opts(&mut lir);
        assert!(!lir[s].is_nop);
    }

    #[test]
    fn double_elimination_chains() {
        // A store made dead still satisfies no later load: the load scan must see the
        // surviving newest store, not the nop.
        let mut lir = buf();
        let s1 = str(&mut lir, 0, 5);
        let s2 = str(&mut lir, 1, 5);
        let d = ldr(&mut lir, 1, 5);
        apply_local_opts(&mut lir);
        assert!(lir[s1].is_nop);
        assert!(!lir[s2].is_nop);
        assert!(lir[d].is_nop);
    }
}
