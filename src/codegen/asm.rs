//! The assembler: offset assignment, encoding, and image serialisation.
//!
//! Layout and encoding run as a fixed point. Offsets are assigned assuming each node's
//! current (narrow or widened) encoding, then every node is encoded; an encoder that cannot
//! reach its target within the narrow encoding's range reports [EncodeOutcome::OutOfRange].
//! All failing nodes are switched to their wide encoding at once, the buffer is discarded,
//! and layout restarts. Widening is monotonic (never undone), so each retry only grows
//! instructions and the loop converges; a retry budget turns a non-converging layout into an
//! internal error rather than an infinite loop.
//!
//! A converged image is: instructions, a 4-aligned literal pool, switch tables, then
//! fill-array payloads. Switch case displacements are stored relative to the table base.
//! Everything multi-byte is little-endian.

use crate::codegen::{
    lir::{LirOp, Pseudo},
    litpool::{fill_array_units, switch_cases, PACKED_SWITCH_SIG, SPARSE_SWITCH_SIG},
    mir_to_lir::Isa,
    Cg, CompileError, MapEntry, PatchForm, PatchRecord, PatchSite,
};

/// What a backend's encoder reports for one node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum EncodeOutcome {
    Done,
    /// The narrow encoding cannot express the node's pc-relative distance.
    OutOfRange,
}

/// The assembled image and its by-products.
pub(crate) struct AsmOut {
    pub(crate) code: Vec<u8>,
    pub(crate) map: Vec<MapEntry>,
    pub(crate) patches: Vec<PatchRecord>,
    pub(crate) retries: u32,
}

pub(crate) fn push_u16(code: &mut Vec<u8>, v: u16) {
    code.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn push_u32(code: &mut Vec<u8>, v: u32) {
    code.extend_from_slice(&v.to_le_bytes());
}

const fn align4(off: u32) -> u32 {
    (off + 3) & !3
}

struct Placement {
    lit_start: u32,
    total: u32,
}

/// Walk the stream assigning a byte offset to every node (pseudos and nops occupy no
/// bytes), then place the literal pool, switch tables and fill payloads after the code.
fn place<A: Isa>(cg: &mut Cg<'_, A>) -> Result<Placement, CompileError> {
    let mut off = 0u32;
    let mut it = cg.lir.first();
    while let Some(idx) = it {
        it = cg.lir[idx].next();
        cg.lir[idx].offset = off;
        if cg.lir[idx].is_nop {
            continue;
        }
        if let LirOp::Real(_) = cg.lir[idx].op {
            off += A::op_size(&cg.lir[idx], off);
        }
    }

    let lit_start = align4(off);
    let mut off = lit_start;
    let words: Vec<_> = cg.data.words_in_layout_order().collect();
    for w in words {
        cg.lir[w].offset = off;
        off += 4;
    }
    for ti in 0..cg.data.switch_tables.len() {
        off = align4(off);
        let (table_off, dex_off) = {
            let t = &cg.data.switch_tables[ti];
            (t.table_off, t.dex_off)
        };
        cg.data.switch_tables[ti].offset = off;
        let sc = switch_cases(&cg.m.data, table_off, dex_off)?;
        let n = sc.cases.len() as u32;
        off += if sc.packed { 8 + 4 * n } else { 4 + 8 * n };
    }
    for fi in 0..cg.data.fill_items.len() {
        off = align4(off);
        cg.data.fill_items[fi].offset = off;
        let units = fill_array_units(&cg.m.data, cg.data.fill_items[fi].table_off)?;
        off += (units as u32) * 2;
    }
    Ok(Placement {
        lit_start,
        total: off,
    })
}

/// A branch whose label was never linked into the stream is a generator bug.
fn check_targets_placed<A: Isa>(cg: &Cg<'_, A>) -> Result<(), CompileError> {
    let mut it = cg.lir.first();
    while let Some(idx) = it {
        it = cg.lir[idx].next();
        if cg.lir[idx].is_nop {
            continue;
        }
        if let Some(t) = cg.lir[idx].target {
            if cg.lir[t].offset == u32::MAX {
                return Err(CompileError::Internal(format!(
                    "node at {:#06x} targets an unplaced label",
                    cg.lir[idx].offset
                )));
            }
        }
    }
    Ok(())
}

pub(crate) fn assemble<A: Isa>(cg: &mut Cg<'_, A>) -> Result<AsmOut, CompileError> {
    let mut retries = 0u32;
    let (mut code, placement) = loop {
        let placement = place(cg)?;
        check_targets_placed(cg)?;

        let mut code = Vec::with_capacity(placement.total as usize);
        let mut out_of_range = Vec::new();
        let mut it = cg.lir.first();
        while let Some(idx) = it {
            it = cg.lir[idx].next();
            if cg.lir[idx].is_nop || cg.lir[idx].op.real().is_none() {
                continue;
            }
            let start = code.len();
            let want = start + A::op_size(&cg.lir[idx], cg.lir[idx].offset) as usize;
            debug_assert_eq!(start as u32, cg.lir[idx].offset);
            match A::encode(cg, idx, &mut code) {
                EncodeOutcome::Done => debug_assert_eq!(code.len(), want),
                EncodeOutcome::OutOfRange => {
                    // Keep offsets coherent for the rest of this (doomed) pass.
                    out_of_range.push(idx);
                    code.truncate(start);
                    code.resize(want, 0);
                }
            }
        }
        if out_of_range.is_empty() {
            break (code, placement);
        }
        for idx in out_of_range {
            cg.lir[idx].widened = true;
        }
        retries += 1;
        if retries > cg.tuning.max_asm_retries {
            return Err(CompileError::Internal(format!(
                "layout failed to converge after {retries} attempts"
            )));
        }
    };

    // Literal pool.
    code.resize(placement.lit_start as usize, 0);
    for w in cg.data.words_in_layout_order() {
        debug_assert_eq!(code.len() as u32, cg.lir[w].offset);
        push_u32(&mut code, cg.lir[w].operands[0] as u32);
    }

    // Switch tables, case displacements relative to each table's base.
    for t in &cg.data.switch_tables {
        code.resize(align4(code.len() as u32) as usize, 0);
        debug_assert_eq!(code.len() as u32, t.offset);
        let sc = switch_cases(&cg.m.data, t.table_off, t.dex_off)?;
        let disp_of = |lab: &crate::codegen::lir::LirIdx| -> Result<u32, CompileError> {
            let lo = cg.lir[*lab].offset;
            if lo == u32::MAX {
                return Err(CompileError::Internal(
                    "switch case label never placed".to_owned(),
                ));
            }
            Ok((i64::from(lo) - i64::from(t.offset)) as i32 as u32)
        };
        if sc.packed {
            push_u16(&mut code, PACKED_SWITCH_SIG);
            push_u16(&mut code, t.case_labels.len() as u16);
            push_u32(&mut code, sc.first_key as u32);
            for lab in &t.case_labels {
                let d = disp_of(lab)?;
                push_u32(&mut code, d);
            }
        } else {
            push_u16(&mut code, SPARSE_SWITCH_SIG);
            push_u16(&mut code, t.case_labels.len() as u16);
            for (key, _) in &sc.cases {
                push_u32(&mut code, *key as u32);
            }
            for lab in &t.case_labels {
                let d = disp_of(lab)?;
                push_u32(&mut code, d);
            }
        }
    }

    // Fill-array payloads, verbatim units.
    for f in &cg.data.fill_items {
        code.resize(align4(code.len() as u32) as usize, 0);
        debug_assert_eq!(code.len() as u32, f.offset);
        let units = fill_array_units(&cg.m.data, f.table_off)?;
        let start = f.table_off as usize;
        for u in &cg.m.data[start..start + units] {
            push_u16(&mut code, *u);
        }
    }
    debug_assert_eq!(code.len() as u32, placement.total);

    // Mapping table from the boundary markers, deduplicating runs from one bytecode.
    let mut map: Vec<MapEntry> = Vec::new();
    let mut it = cg.lir.first();
    while let Some(idx) = it {
        it = cg.lir[idx].next();
        let node = &cg.lir[idx];
        if node.is_nop || !matches!(node.op, LirOp::Pseudo(Pseudo::Boundary)) {
            continue;
        }
        if map.last().map(|e| e.dex_off) == Some(node.dex_off) {
            continue;
        }
        map.push(MapEntry {
            code_off: node.offset,
            dex_off: node.dex_off,
        });
    }

    // Patch points become records now that every node has its final offset.
    let mut patches = Vec::with_capacity(cg.patches.len());
    for p in &cg.patches {
        let off = cg.lir[p.node].offset;
        if off == u32::MAX {
            return Err(CompileError::Internal("patch site never placed".to_owned()));
        }
        let at = off + p.adjust;
        let site = match p.form {
            PatchForm::PoolWord => PatchSite::PoolWord(at),
            PatchForm::PairHiLo => PatchSite::PairHiLo(at),
            PatchForm::Imm32 => PatchSite::Imm32(at),
        };
        patches.push(PatchRecord {
            site,
            method_idx: p.method_idx,
            kind: p.kind,
        });
    }

    Ok(AsmOut {
        code,
        map,
        patches,
        retries,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        codegen::{
            callseq::CallInfo,
            launchpad::{self, PadKind},
            lir::{Lir, LirIdx, OpFlags, OpInfo, OpT},
            litpool::FILL_ARRAY_SIG,
            mir_to_lir::TableRef,
            regalloc::RegT,
            Helper, PatchKind, PatchPoint, Tuning,
        },
        mir::{
            BBlock, BinKind, Cond, ConstResolver, FieldInfo, FpBinKind, InvokeKind, Method,
            MethodInfo, UnKind,
        },
    };
    use index_vec::IndexVec;
    use std::fmt;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct Reg(u8);

    impl fmt::Display for Reg {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "g{}", self.0)
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
            true
        }
    }

    /// A three-opcode machine: `Word` is fixed size, `Jump` has a short form with a one-byte
    /// reach and a six-byte long form, and `Stuck` never encodes, widened or not.
    #[derive(Clone, Copy, Debug, PartialEq)]
    #[repr(u8)]
    enum Op {
        Word,
        Jump,
        Stuck,
    }

    static OPINFO: [OpInfo; 3] = [
        OpInfo {
            name: "word",
            flags: OpFlags::none(),
        },
        OpInfo {
            name: "jump",
            flags: OpFlags::none().branch().needs_fixup(),
        },
        OpInfo {
            name: "stuck",
            flags: OpFlags::none().branch().needs_fixup(),
        },
    ];

    impl OpT for Op {
        fn info(&self) -> &'static OpInfo {
            &OPINFO[*self as usize]
        }
    }

    static TEMPS: [Reg; 2] = [Reg(0), Reg(1)];

    struct TIsa;

    // Only the register-file description and the encoder matter here; the tests build their
    // LIR by hand, so the emission surface is never called.
    impl Isa for TIsa {
        type Reg = Reg;
        type Op = Op;

        const NAME: &'static str = "t";
        const FP_DOUBLE_SOLO: bool = false;

        fn self_reg() -> Reg {
            Reg(8)
        }

        fn sp_reg() -> Reg {
            Reg(9)
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
            (Reg(0), Reg(1))
        }

        fn core_temps() -> &'static [Reg] {
            &TEMPS
        }

        fn fp_temps() -> &'static [Reg] {
            &[]
        }

        fn promotable_core() -> &'static [Reg] {
            &[]
        }

        fn promotable_fp() -> &'static [Reg] {
            &[]
        }

        fn fixed_core_spills() -> u32 {
            0
        }

        fn fp_mask_base() -> u8 {
            32
        }

        fn in_arg_bias() -> i32 {
            0
        }

        fn op_reg_copy(_cg: &mut Cg<'_, Self>, _dst: Reg, _src: Reg) {
            unreachable!()
        }

        fn load_const(_cg: &mut Cg<'_, Self>, _dst: Reg, _val: i32) {
            unreachable!()
        }

        fn load_const_wide(_cg: &mut Cg<'_, Self>, _lo: Reg, _hi: Reg, _val: i64) {
            unreachable!()
        }

        fn load_word(_cg: &mut Cg<'_, Self>, _dst: Reg, _base: Reg, _disp: i32) -> LirIdx {
            unreachable!()
        }

        fn store_word(_cg: &mut Cg<'_, Self>, _src: Reg, _base: Reg, _disp: i32) -> LirIdx {
            unreachable!()
        }

        fn load_pair(_cg: &mut Cg<'_, Self>, _lo: Reg, _hi: Reg, _base: Reg, _disp: i32) -> LirIdx {
            unreachable!()
        }

        fn store_pair(
            _cg: &mut Cg<'_, Self>,
            _lo: Reg,
            _hi: Reg,
            _base: Reg,
            _disp: i32,
        ) -> LirIdx {
            unreachable!()
        }

        fn load_indexed(
            _cg: &mut Cg<'_, Self>,
            _dst: Reg,
            _base: Reg,
            _idx: Reg,
            _scale: u8,
            _disp: i32,
        ) -> Result<(), CompileError> {
            unreachable!()
        }

        fn store_indexed(
            _cg: &mut Cg<'_, Self>,
            _src: Reg,
            _base: Reg,
            _idx: Reg,
            _scale: u8,
            _disp: i32,
        ) -> Result<(), CompileError> {
            unreachable!()
        }

        fn op_un(_cg: &mut Cg<'_, Self>, _kind: UnKind, _dst: Reg, _src: Reg) {
            unreachable!()
        }

        fn op_bin(
            _cg: &mut Cg<'_, Self>,
            _kind: BinKind,
            _dst: Reg,
            _lhs: Reg,
            _rhs: Reg,
        ) -> Result<(), CompileError> {
            unreachable!()
        }

        fn op_bin_imm(
            _cg: &mut Cg<'_, Self>,
            _kind: BinKind,
            _dst: Reg,
            _src: Reg,
            _imm: i32,
        ) -> Result<(), CompileError> {
            unreachable!()
        }

        fn op_bin_wide(
            _cg: &mut Cg<'_, Self>,
            _kind: BinKind,
            _d_lo: Reg,
            _d_hi: Reg,
            _l_lo: Reg,
            _l_hi: Reg,
            _r_lo: Reg,
            _r_hi: Reg,
        ) -> Result<(), CompileError> {
            unreachable!()
        }

        fn op_fp_bin(
            _cg: &mut Cg<'_, Self>,
            _kind: FpBinKind,
            _wide: bool,
            _dst: Reg,
            _lhs: Reg,
            _rhs: Reg,
        ) -> Result<(), CompileError> {
            unreachable!()
        }

        fn branch(_cg: &mut Cg<'_, Self>) -> LirIdx {
            unreachable!()
        }

        fn cond_branch(_cg: &mut Cg<'_, Self>, _cond: Cond, _lhs: Reg, _rhs: Reg) -> LirIdx {
            unreachable!()
        }

        fn cond_branch_imm(_cg: &mut Cg<'_, Self>, _cond: Cond, _src: Reg, _imm: i32) -> LirIdx {
            unreachable!()
        }

        fn jump_reg(_cg: &mut Cg<'_, Self>, _r: Reg) {
            unreachable!()
        }

        fn mem_barrier(_cg: &mut Cg<'_, Self>) {
            unreachable!()
        }

        fn helper_args2(_cg: &mut Cg<'_, Self>, _a_bit: i32, _b_bit: i32) {
            unreachable!()
        }

        fn helper_arg_regs() -> [Reg; 3] {
            unreachable!()
        }

        fn call_helper(_cg: &mut Cg<'_, Self>, _h: Helper) {
            unreachable!()
        }

        fn load_patchable(_cg: &mut Cg<'_, Self>, _dst: Reg, _method_idx: u32, _kind: PatchKind) {
            unreachable!()
        }

        fn emit_call_reg(_cg: &mut Cg<'_, Self>, _target: Reg) {
            unreachable!()
        }

        fn invoke_target_reg() -> Reg {
            unreachable!()
        }

        fn load_table_addr(_cg: &mut Cg<'_, Self>, _dst: Reg, _table: TableRef) {
            unreachable!()
        }

        fn next_call_insn(
            _cg: &mut Cg<'_, Self>,
            _info: &CallInfo<Reg>,
            _state: u32,
        ) -> Result<Option<u32>, CompileError> {
            unreachable!()
        }

        fn emit_entry(_cg: &mut Cg<'_, Self>) -> Result<(), CompileError> {
            unreachable!()
        }

        fn emit_exit(_cg: &mut Cg<'_, Self>) -> Result<(), CompileError> {
            unreachable!()
        }

        fn op_size(lir: &Lir<Op>, _off: u32) -> u32 {
            match lir.op.real() {
                Some(Op::Word) => 4,
                Some(Op::Jump) => {
                    if lir.widened {
                        6
                    } else {
                        2
                    }
                }
                Some(Op::Stuck) => 2,
                None => 0,
            }
        }

        fn encode(cg: &Cg<'_, Self>, idx: LirIdx, code: &mut Vec<u8>) -> EncodeOutcome {
            let lir = &cg.lir[idx];
            match lir.op.real() {
                Some(Op::Word) => {
                    push_u32(code, lir.operands[0] as u32);
                    EncodeOutcome::Done
                }
                Some(Op::Jump) => {
                    let t = cg.lir[lir.target.unwrap()].offset;
                    let delta = i64::from(t) - i64::from(lir.offset);
                    if lir.widened {
                        code.push(0xE9);
                        code.push(0);
                        push_u32(code, delta as u32);
                    } else if (-128..=127).contains(&delta) {
                        code.push(0xEB);
                        code.push(delta as u8);
                    } else {
                        return EncodeOutcome::OutOfRange;
                    }
                    EncodeOutcome::Done
                }
                Some(Op::Stuck) => EncodeOutcome::OutOfRange,
                None => EncodeOutcome::Done,
            }
        }
    }

    struct NoResolver;

    impl ConstResolver for NoResolver {
        fn field_offset(&self, _field_idx: u32) -> Option<FieldInfo> {
            None
        }

        fn method_info(&self, _method_idx: u32, _kind: InvokeKind) -> Option<MethodInfo> {
            None
        }
    }

    fn cg_with(tuning: Tuning, data: Vec<u16>) -> Cg<'static, TIsa> {
        let mut blocks = IndexVec::new();
        blocks.push(BBlock::new(vec![]));
        let mut m = Method::new("t", 0, 0, blocks);
        m.data = data;
        let m = Box::leak(Box::new(m));
        let t = Box::leak(Box::new(tuning));
        Cg::new(m, &NoResolver, t).unwrap()
    }

    fn cg_for_test() -> Cg<'static, TIsa> {
        cg_with(Tuning::default(), Vec::new())
    }

    #[test]
    fn straight_line_layout_and_map() {
        let mut cg = cg_for_test();
        cg.lir.add_pseudo(Pseudo::Boundary);
        cg.lir.new_lir1(Op::Word, 0x1111_1111);
        cg.lir.new_lir1(Op::Word, 0x2222_2222);
        cg.lir.cur_dex_off = 2;
        cg.lir.add_pseudo(Pseudo::Boundary);
        cg.lir.new_lir1(Op::Word, 0x3333_3333);

        let out = assemble(&mut cg).unwrap();
        assert_eq!(out.retries, 0);
        assert_eq!(out.code.len(), 12);
        assert_eq!(&out.code[..4], &0x1111_1111u32.to_le_bytes());
        assert_eq!(&out.code[8..], &0x3333_3333u32.to_le_bytes());
        assert_eq!(
            out.map,
            vec![
                MapEntry {
                    code_off: 0,
                    dex_off: 0
                },
                MapEntry {
                    code_off: 8,
                    dex_off: 2
                },
            ]
        );
    }

    #[test]
    fn nops_occupy_no_bytes() {
        let mut cg = cg_for_test();
        cg.lir.new_lir1(Op::Word, 1);
        let n = cg.lir.new_lir1(Op::Word, 2);
        cg.lir[n].is_nop = true;
        cg.lir.new_lir1(Op::Word, 3);

        let out = assemble(&mut cg).unwrap();
        assert_eq!(out.code.len(), 8);
        assert_eq!(&out.code[4..], &3u32.to_le_bytes());
    }

    #[test]
    fn map_dedups_runs_from_one_bytecode() {
        let mut cg = cg_for_test();
        cg.lir.cur_dex_off = 4;
        cg.lir.add_pseudo(Pseudo::Boundary);
        cg.lir.new_lir1(Op::Word, 1);
        cg.lir.add_pseudo(Pseudo::Boundary);
        cg.lir.new_lir1(Op::Word, 2);
        // A pad re-entering an earlier bytecode still gets its own entry.
        cg.lir.cur_dex_off = 0;
        cg.lir.add_pseudo(Pseudo::Boundary);
        cg.lir.new_lir1(Op::Word, 3);

        let out = assemble(&mut cg).unwrap();
        assert_eq!(
            out.map,
            vec![
                MapEntry {
                    code_off: 0,
                    dex_off: 4
                },
                MapEntry {
                    code_off: 8,
                    dex_off: 0
                },
            ]
        );
    }

    #[test]
    fn out_of_range_branch_widens_and_converges() {
        let mut cg = cg_for_test();
        let j1 = cg.lir.new_lir0(Op::Jump);
        for _ in 0..40 {
            cg.lir.new_lir1(Op::Word, 0);
        }
        let j2 = cg.lir.new_lir0(Op::Jump);
        let lab = cg.lir.add_pseudo(Pseudo::TargetLabel);
        cg.lir.new_lir1(Op::Word, 0);
        cg.lir.set_target(j1, lab);
        cg.lir.set_target(j2, lab);

        let out = assemble(&mut cg).unwrap();
        // Only the branch that could not reach is widened; the short one keeps its short
        // form on the retry.
        assert_eq!(out.retries, 1);
        assert!(cg.lir[j1].widened);
        assert!(!cg.lir[j2].widened);
        assert_eq!(out.code.len(), 6 + 160 + 2 + 4);
        assert_eq!(out.code[0], 0xE9);
        assert_eq!(cg.lir[j2].offset, 166);
        assert_eq!(out.code[166], 0xEB);
        assert_eq!(out.code[167], 2);

        // The converged layout is a fixed point: running again changes nothing.
        let again = assemble(&mut cg).unwrap();
        assert_eq!(again.retries, 0);
        assert_eq!(again.code, out.code);
        assert_eq!(again.map, out.map);
    }

    #[test]
    fn retry_budget_turns_divergence_into_an_internal_error() {
        let mut cg = cg_with(
            Tuning {
                max_asm_retries: 3,
                ..Tuning::default()
            },
            Vec::new(),
        );
        let s = cg.lir.new_lir0(Op::Stuck);
        let lab = cg.lir.add_pseudo(Pseudo::TargetLabel);
        cg.lir.set_target(s, lab);
        assert!(matches!(assemble(&mut cg), Err(CompileError::Internal(_))));
    }

    #[test]
    fn unplaced_target_is_an_internal_error() {
        let mut cg = cg_for_test();
        let j = cg.lir.new_lir0(Op::Jump);
        let lab = cg.lir.raw_pseudo(Pseudo::TargetLabel);
        cg.lir.set_target(j, lab);
        assert!(matches!(assemble(&mut cg), Err(CompileError::Internal(_))));
    }

    #[test]
    fn image_lays_out_pools_tables_and_payloads_after_code() {
        // A packed switch payload (2 cases, first key 5) followed by a fill payload of
        // three 16-bit elements.
        let data = vec![
            PACKED_SWITCH_SIG,
            2,
            5,
            0,
            0,
            0,
            2,
            0,
            FILL_ARRAY_SIG,
            2,
            3,
            0,
            0xAAAA,
            0xBBBB,
            0xCCCC,
        ];
        let mut cg = cg_with(Tuning::default(), data);
        let c0 = cg.lir.add_pseudo(Pseudo::CaseLabel);
        cg.lir.new_lir1(Op::Word, 7);
        let c1 = cg.lir.add_pseudo(Pseudo::CaseLabel);
        cg.lir.new_lir1(Op::Word, 8);
        let ti = cg.data.add_switch_table(0, 0);
        cg.data.switch_tables[ti].case_labels = vec![c0, c1];
        cg.data.add_fill_item(8);
        cg.data.find_or_add_word(&mut cg.lir, 0x1111, 0);
        cg.data.find_or_add_word(&mut cg.lir, 0x2222, 0);

        let out = assemble(&mut cg).unwrap();
        assert_eq!(out.code.len(), 46);
        // Pool words, newest first.
        assert_eq!(&out.code[8..12], &0x2222u32.to_le_bytes());
        assert_eq!(&out.code[12..16], &0x1111u32.to_le_bytes());
        // The switch table: signature, size, first key, then case displacements relative
        // to the table base at offset 16.
        assert_eq!(&out.code[16..18], &PACKED_SWITCH_SIG.to_le_bytes());
        assert_eq!(&out.code[18..20], &2u16.to_le_bytes());
        assert_eq!(&out.code[20..24], &5u32.to_le_bytes());
        assert_eq!(&out.code[24..28], &(-16i32 as u32).to_le_bytes());
        assert_eq!(&out.code[28..32], &(-12i32 as u32).to_le_bytes());
        // The fill payload is copied verbatim, header included.
        assert_eq!(&out.code[32..34], &FILL_ARRAY_SIG.to_le_bytes());
        assert_eq!(&out.code[40..42], &0xAAAAu16.to_le_bytes());
        assert_eq!(&out.code[44..46], &0xCCCCu16.to_le_bytes());
    }

    #[test]
    fn patch_records_resolve_against_final_offsets() {
        let mut cg = cg_for_test();
        cg.lir.new_lir1(Op::Word, 0);
        let n = cg.lir.new_lir1(Op::Word, 0);
        cg.patches.push(PatchPoint {
            node: n,
            adjust: 2,
            form: PatchForm::Imm32,
            method_idx: 77,
            kind: PatchKind::Static,
        });
        let w = cg.data.find_or_add_word(&mut cg.lir, 1234, 0);
        cg.patches.push(PatchPoint {
            node: w,
            adjust: 0,
            form: PatchForm::PoolWord,
            method_idx: 78,
            kind: PatchKind::Dynamic,
        });

        let out = assemble(&mut cg).unwrap();
        assert_eq!(
            out.patches,
            vec![
                PatchRecord {
                    site: PatchSite::Imm32(6),
                    method_idx: 77,
                    kind: PatchKind::Static,
                },
                PatchRecord {
                    site: PatchSite::PoolWord(8),
                    method_idx: 78,
                    kind: PatchKind::Dynamic,
                },
            ]
        );
    }

    #[test]
    fn pads_assemble_behind_the_body() {
        let mut cg = cg_for_test();
        cg.lir.new_lir1(Op::Word, 1);
        let pad = launchpad::add_pad(&mut cg, PadKind::NullCheck, [0, 0]);
        cg.lir.new_lir1(Op::Word, 2);
        cg.lir.append(pad);
        cg.lir.new_lir1(Op::Word, 3);

        let out = assemble(&mut cg).unwrap();
        assert_eq!(cg.lir[pad].offset, 8);
        assert_eq!(out.code.len(), 12);
    }
}
