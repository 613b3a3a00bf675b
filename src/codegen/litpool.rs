//! Literal pools, switch tables and fill-array data.
//!
//! All three kinds of data are laid out after the method's instructions, in that order, and
//! become part of the code image. Pool words are [Pseudo::Literal] nodes kept out of the
//! instruction stream; loads reference them through their `target` link and the assembler
//! turns that into a pc-relative displacement. Deduplication scans the pool newest-first
//! under a tolerance mask, accepting that an older equal word may be missed: a duplicate
//! word costs four bytes, never correctness.
//!
//! Switch tables serialise their case displacements relative to the *table base*, so the
//! in-code dispatch sequence is the same add-and-jump on every target. Fill-array payloads
//! are copied verbatim from the method's data area.

use crate::codegen::{
    lir::{LirBuf, LirIdx, MemRefKind, OpT, Pseudo},
    mir_to_lir::Isa,
    Cg, CompileError,
};

/// Identifying signature of a packed-switch payload.
pub(crate) const PACKED_SWITCH_SIG: u16 = 0x0100;
/// Identifying signature of a sparse-switch payload.
pub(crate) const SPARSE_SWITCH_SIG: u16 = 0x0200;
/// Identifying signature of a fill-array-data payload.
pub(crate) const FILL_ARRAY_SIG: u16 = 0x0300;

/// One switch payload used by the method.
pub(crate) struct SwitchTab {
    /// Unit offset of the payload in [crate::mir::Method::data].
    pub(crate) table_off: u32,
    /// Bytecode offset of the switch instruction; case targets are relative to it.
    pub(crate) dex_off: u32,
    /// Case labels in table order, filled in by [process_switch_tables].
    pub(crate) case_labels: Vec<LirIdx>,
    /// For a sparse switch, the compare-chain branch emitted per case during the method
    /// walk, in table order. [process_switch_tables] points each one at its case label.
    pub(crate) case_branches: Vec<LirIdx>,
    /// Final byte offset of the serialised table; `u32::MAX` until placed.
    pub(crate) offset: u32,
}

/// One fill-array-data payload used by the method.
pub(crate) struct FillItem {
    pub(crate) table_off: u32,
    pub(crate) offset: u32,
}

/// The method's literal pool and data tables.
pub(crate) struct DataPools {
    /// Pool word nodes in creation order; scans and layout walk them newest first.
    words: Vec<LirIdx>,
    pub(crate) switch_tables: Vec<SwitchTab>,
    pub(crate) fill_items: Vec<FillItem>,
}

impl DataPools {
    pub(crate) fn new() -> Self {
        Self {
            words: Vec::new(),
            switch_tables: Vec::new(),
            fill_items: Vec::new(),
        }
    }

    fn find_word<Op: OpT>(&self, lir: &LirBuf<Op>, value: i32, delta: u32) -> Option<LirIdx> {
        self.words
            .iter()
            .rev()
            .copied()
            .find(|&w| (lir[w].operands[0] ^ value) as u32 & !delta == 0)
    }

    /// Find a pool word matching `value` outside `delta`'s ignored bits, or add a new one.
    pub(crate) fn find_or_add_word<Op: OpT>(
        &mut self,
        lir: &mut LirBuf<Op>,
        value: i32,
        delta: u32,
    ) -> LirIdx {
        if let Some(w) = self.find_word(lir, value, delta) {
            return w;
        }
        let w = lir.raw_pseudo(Pseudo::Literal);
        lir[w].operands[0] = value;
        lir[w].n_ops = 1;
        self.words.push(w);
        w
    }

    /// Add a 64-bit value as two adjacent pool words and return the node of the low word.
    /// The high word is pushed first so the newest-first layout walk lays the low word at
    /// the smaller offset. Wide values are never deduplicated.
    pub(crate) fn add_wide<Op: OpT>(&mut self, lir: &mut LirBuf<Op>, value: i64) -> LirIdx {
        let hi_w = lir.raw_pseudo(Pseudo::Literal);
        lir[hi_w].operands[0] = (value >> 32) as i32;
        lir[hi_w].n_ops = 1;
        self.words.push(hi_w);
        let lo_w = lir.raw_pseudo(Pseudo::Literal);
        lir[lo_w].operands[0] = value as i32;
        lir[lo_w].n_ops = 1;
        self.words.push(lo_w);
        lo_w
    }

    /// Pool words in the order they are laid out in the image.
    pub(crate) fn words_in_layout_order(&self) -> impl Iterator<Item = LirIdx> + '_ {
        self.words.iter().rev().copied()
    }

    pub(crate) fn num_words(&self) -> usize {
        self.words.len()
    }

    pub(crate) fn add_switch_table(&mut self, table_off: u32, dex_off: u32) -> usize {
        self.switch_tables.push(SwitchTab {
            table_off,
            dex_off,
            case_labels: Vec::new(),
            case_branches: Vec::new(),
            offset: u32::MAX,
        });
        self.switch_tables.len() - 1
    }

    pub(crate) fn add_fill_item(&mut self, table_off: u32) -> usize {
        self.fill_items.push(FillItem {
            table_off,
            offset: u32::MAX,
        });
        self.fill_items.len() - 1
    }
}

fn read_unit(data: &[u16], off: usize) -> Result<u16, CompileError> {
    data.get(off).copied().ok_or_else(|| {
        CompileError::Internal(format!("data table read past end at unit {off}"))
    })
}

/// Read a 32-bit value stored as two units, low unit first.
fn read_i32(data: &[u16], off: usize) -> Result<i32, CompileError> {
    let lo = read_unit(data, off)?;
    let hi = read_unit(data, off + 1)?;
    Ok((i32::from(hi as i16) << 16) | i32::from(lo))
}

fn case_target(dex_off: u32, rel: i32) -> Result<u32, CompileError> {
    u32::try_from(i64::from(dex_off) + i64::from(rel)).map_err(|_| {
        CompileError::Internal(format!("switch target underflows from {dex_off:#06x}"))
    })
}

/// A decoded switch payload: case keys paired with absolute bytecode targets, table order.
pub(crate) struct SwitchCases {
    pub(crate) packed: bool,
    /// Lowest key; meaningful for packed tables only.
    pub(crate) first_key: i32,
    pub(crate) cases: Vec<(i32, u32)>,
}

/// Decode the switch payload at `table_off`, resolving its relative targets against the
/// switch instruction's own bytecode offset.
pub(crate) fn switch_cases(
    data: &[u16],
    table_off: u32,
    dex_off: u32,
) -> Result<SwitchCases, CompileError> {
    let off = table_off as usize;
    let sig = read_unit(data, off)?;
    let size = usize::from(read_unit(data, off + 1)?);
    match sig {
        PACKED_SWITCH_SIG => {
            let first_key = read_i32(data, off + 2)?;
            let mut cases = Vec::with_capacity(size);
            for i in 0..size {
                let rel = read_i32(data, off + 4 + 2 * i)?;
                cases.push((first_key.wrapping_add(i as i32), case_target(dex_off, rel)?));
            }
            Ok(SwitchCases {
                packed: true,
                first_key,
                cases,
            })
        }
        SPARSE_SWITCH_SIG => {
            let mut cases = Vec::with_capacity(size);
            for i in 0..size {
                let key = read_i32(data, off + 2 + 2 * i)?;
                let rel = read_i32(data, off + 2 + 2 * size + 2 * i)?;
                cases.push((key, case_target(dex_off, rel)?));
            }
            Ok(SwitchCases {
                packed: false,
                first_key: 0,
                cases,
            })
        }
        _ => Err(CompileError::Internal(format!(
            "bad switch signature {sig:#06x} at unit {off}"
        ))),
    }
}

/// Total unit length of the fill-array payload at `table_off`, header included.
pub(crate) fn fill_array_units(data: &[u16], table_off: u32) -> Result<usize, CompileError> {
    let off = table_off as usize;
    let sig = read_unit(data, off)?;
    if sig != FILL_ARRAY_SIG {
        return Err(CompileError::Internal(format!(
            "bad fill-array signature {sig:#06x} at unit {off}"
        )));
    }
    let width = usize::from(read_unit(data, off + 1)?);
    let size = read_i32(data, off + 2)? as u32 as usize;
    let payload_units = (width * size + 1) / 2;
    let total = 4 + payload_units;
    if off + total > data.len() {
        return Err(CompileError::Internal(format!(
            "fill-array payload at unit {off} runs past the data area"
        )));
    }
    Ok(total)
}

/// Resolve every switch case against the bytecode boundary map and plant a
/// [Pseudo::CaseLabel] at each target. Runs after the method walk, once every reachable
/// bytecode has a boundary node; a case targeting an unknown offset is an internal error.
pub(crate) fn process_switch_tables<A: Isa>(cg: &mut Cg<'_, A>) -> Result<(), CompileError> {
    for ti in 0..cg.data.switch_tables.len() {
        let (table_off, dex_off) = {
            let t = &cg.data.switch_tables[ti];
            (t.table_off, t.dex_off)
        };
        let sc = switch_cases(&cg.m.data, table_off, dex_off)?;
        let mut labels = Vec::with_capacity(sc.cases.len());
        for (i, (key, case_dex)) in sc.cases.iter().enumerate() {
            let b = *cg.boundary_map.get(case_dex).ok_or_else(|| {
                CompileError::Internal(format!(
                    "switch case {key} targets unmapped bytecode {case_dex:#06x}"
                ))
            })?;
            let lab = cg.lir.raw_pseudo(Pseudo::CaseLabel);
            cg.lir[lab].operands[0] = *key;
            cg.lir[lab].n_ops = 1;
            cg.lir.insert_after(b, lab);
            labels.push(lab);
            if let Some(&br) = cg.data.switch_tables[ti].case_branches.get(i) {
                cg.lir.set_target(br, lab);
            }
        }
        cg.data.switch_tables[ti].case_labels = labels;
    }
    Ok(())
}

/// Mark up the literal load `load` as a pool reference: its alias class becomes the pool
/// (never-written) and its target the pool word.
pub(crate) fn link_literal_load<Op: OpT>(lir: &mut LirBuf<Op>, load: LirIdx, word: LirIdx) {
    lir.set_mem_ref_kind(load, MemRefKind::Literal);
    lir.set_target(load, word);
}

/// Frame traffic the generator proves disjoint from vreg slots (outgoing-argument staging)
/// gets the must-not-alias class instead of the frame class.
pub(crate) fn mark_out_arg_store<Op: OpT>(lir: &mut LirBuf<Op>, store: LirIdx) {
    lir.set_mem_ref_kind(store, MemRefKind::MustNotAlias);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codegen::lir::{OpFlags, OpInfo};

    #[derive(Clone, Copy, Debug, PartialEq)]
    enum TOp {
        Nop,
    }

    static TINFO: [OpInfo; 1] = [OpInfo {
        name: "nop",
        flags: OpFlags::none(),
    }];

    impl OpT for TOp {
        fn info(&self) -> &'static OpInfo {
            &TINFO[*self as usize]
        }
    }

    fn buf() -> LirBuf<TOp> {
        LirBuf::new(13, None, None)
    }

    #[test]
    fn word_dedup_is_exact_by_default() {
        let mut lir = buf();
        let mut p = DataPools::new();
        let a = p.find_or_add_word(&mut lir, 0x1234, 0);
        let b = p.find_or_add_word(&mut lir, 0x1234, 0);
        let c = p.find_or_add_word(&mut lir, 0x1235, 0);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(p.num_words(), 2);
    }

    #[test]
    fn word_dedup_honours_delta_mask() {
        let mut lir = buf();
        let mut p = DataPools::new();
        let a = p.find_or_add_word(&mut lir, 0x1000, 0);
        // Low byte ignored: 0x10ff matches the existing word.
        let b = p.find_or_add_word(&mut lir, 0x10ff, 0xff);
        assert_eq!(a, b);
        assert_eq!(p.num_words(), 1);
    }

    #[test]
    fn dedup_scans_newest_first() {
        let mut lir = buf();
        let mut p = DataPools::new();
        let old = p.find_or_add_word(&mut lir, 0x10, 0);
        let newer = p.find_or_add_word(&mut lir, 0x20, 0);
        // Both match under a permissive mask; the newer word wins.
        let hit = p.find_or_add_word(&mut lir, 0x30, !0);
        assert_eq!(hit, newer);
        assert_ne!(hit, old);
    }

    #[test]
    fn wide_layout_is_low_word_first() {
        let mut lir = buf();
        let mut p = DataPools::new();
        let lo = p.add_wide(&mut lir, 0x1122_3344_5566_7788);
        let order: Vec<_> = p.words_in_layout_order().collect();
        assert_eq!(order[0], lo);
        assert_eq!(lir[order[0]].operands[0] as u32, 0x5566_7788);
        assert_eq!(lir[order[1]].operands[0] as u32, 0x1122_3344);
    }

    // Packed payload: keys 10, 11 targeting dex 0x20 and 0x30 from a switch at 0x10.
    fn packed_data() -> Vec<u16> {
        vec![
            PACKED_SWITCH_SIG,
            2,
            10,
            0,
            0x10,
            0,
            0x20,
            0,
        ]
    }

    #[test]
    fn packed_parse() {
        let sc = switch_cases(&packed_data(), 0, 0x10).unwrap();
        assert!(sc.packed);
        assert_eq!(sc.first_key, 10);
        assert_eq!(sc.cases, vec![(10, 0x20), (11, 0x30)]);
    }

    #[test]
    fn sparse_parse() {
        // Keys -5 and 100, relative targets 4 and -2, switch at dex 0x40.
        let data: Vec<u16> = vec![
            SPARSE_SWITCH_SIG,
            2,
            (-5i32) as u16,
            0xffff,
            100,
            0,
            4,
            0,
            (-2i32) as u16,
            0xffff,
        ];
        let sc = switch_cases(&data, 0, 0x40).unwrap();
        assert!(!sc.packed);
        assert_eq!(sc.cases, vec![(-5, 0x44), (100, 0x3e)]);
    }

    #[test]
    fn bad_signature_is_internal() {
        let data = vec![0x0400u16, 0];
        assert!(matches!(
            switch_cases(&data, 0, 0),
            Err(CompileError::Internal(_))
        ));
    }

    #[test]
    fn fill_array_length() {
        // width 2, size 3: payload 6 bytes = 3 units, plus the 4 unit header.
        let data = vec![FILL_ARRAY_SIG, 2, 3, 0, 1, 2, 3];
        assert_eq!(fill_array_units(&data, 0).unwrap(), 7);
    }

    #[test]
    fn fill_array_truncated_is_internal() {
        let data = vec![FILL_ARRAY_SIG, 2, 3, 0, 1];
        assert!(matches!(
            fill_array_units(&data, 0),
            Err(CompileError::Internal(_))
        ));
    }
}
