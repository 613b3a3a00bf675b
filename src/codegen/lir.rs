//! The machine-independent LIR.
//!
//! LIR nodes live in an arena ([LirBuf]) and are threaded into a doubly-linked list through
//! [LirIdx] links, so passes can insert in the middle of the stream without invalidating anything.
//! Each node carries a use and a def [ResourceMask] naming every resource it touches: register
//! bits, the condition codes, and four disjoint memory alias classes. The masks are built from a
//! per-opcode flag table ([OpInfo]) that each backend supplies through [OpT]; they over-approximate
//! (a mask may claim more than the instruction touches, never less), which is what the local
//! optimiser and any future scheduler rely on.
//!
//! Branches are special: they claim *all* resources in both masks, so nothing is ever moved or
//! eliminated across them. Labels and bytecode boundaries claim all resources in their def mask
//! for the same reason.

use crate::mir::VReg;
use index_vec::IndexVec;
use static_assertions::const_assert;
use std::fmt::Debug;

index_vec::define_index_type! {
    pub(crate) struct LirIdx = u32;
}

impl LirIdx {
    /// The maximum representable [LirIdx].
    pub(crate) const MAX: LirIdx = LirIdx::from_raw_unchecked(u32::MAX);
}

/// How many low mask bits are reserved for registers. Each backend maps its registers into this
/// space via [crate::codegen::regalloc::RegT::mask_bit].
pub(crate) const RES_REG_BITS: u8 = 48;
const RES_CCODE: u8 = 48;
const RES_FRAME: u8 = 49;
const RES_LITERAL: u8 = 50;
const RES_HEAP: u8 = 51;
const RES_MUST_NOT_ALIAS: u8 = 52;
const MEM_BITS: u64 =
    (1 << RES_FRAME) | (1 << RES_LITERAL) | (1 << RES_HEAP) | (1 << RES_MUST_NOT_ALIAS);

// Every resource, register or not, must have a bit in a u64 mask.
const_assert!(RES_MUST_NOT_ALIAS < u64::BITS as u8);

/// The set of abstract resources an instruction uses or defines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ResourceMask(u64);

impl ResourceMask {
    /// A mask that claims nothing.
    pub(crate) const fn none() -> Self {
        Self(0)
    }

    /// A mask that claims every resource.
    pub(crate) const fn all() -> Self {
        Self(!0)
    }

    /// Add the register with mask bit `bit`.
    pub(crate) const fn add_reg(self, bit: u8) -> Self {
        assert!(bit < RES_REG_BITS);
        Self(self.0 | (1 << bit))
    }

    pub(crate) const fn add_ccode(self) -> Self {
        Self(self.0 | (1 << RES_CCODE))
    }

    pub(crate) const fn add_mem(self, kind: MemRefKind) -> Self {
        Self(self.0 | kind.bit())
    }

    /// Remove every memory alias class, leaving registers and condition codes.
    pub(crate) const fn minus_mem(self) -> Self {
        Self(self.0 & !MEM_BITS)
    }

    pub(crate) const fn union(self, other: ResourceMask) -> Self {
        Self(self.0 | other.0)
    }

    /// Is the intersection of `self` and `other` non-empty?
    pub(crate) const fn interferes(&self, other: ResourceMask) -> bool {
        (self.0 & other.0) != 0
    }

    pub(crate) const fn contains_reg(&self, bit: u8) -> bool {
        assert!(bit < RES_REG_BITS);
        (self.0 & (1 << bit)) != 0
    }

    pub(crate) const fn contains_mem(&self, kind: MemRefKind) -> bool {
        (self.0 & kind.bit()) != 0
    }

    pub(crate) const fn is_none(&self) -> bool {
        self.0 == 0
    }
}

/// The four disjoint memory alias classes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum MemRefKind {
    /// Constant pool: never written after assembly.
    Literal,
    /// A method frame slot.
    Frame,
    /// Arbitrary heap memory: conservative default.
    Heap,
    /// Memory the generator proves disjoint from all other classes (e.g. spill-area traffic).
    MustNotAlias,
}

impl MemRefKind {
    const fn bit(self) -> u64 {
        match self {
            MemRefKind::Literal => 1 << RES_LITERAL,
            MemRefKind::Frame => 1 << RES_FRAME,
            MemRefKind::Heap => 1 << RES_HEAP,
            MemRefKind::MustNotAlias => 1 << RES_MUST_NOT_ALIAS,
        }
    }
}

const F_BRANCH: u32 = 1 << 0;
const F_LOAD: u32 = 1 << 1;
const F_STORE: u32 = 1 << 2;
const F_SETS_CC: u32 = 1 << 3;
const F_USES_CC: u32 = 1 << 4;
const F_NEEDS_FIXUP: u32 = 1 << 5;
const F_DEF0: u32 = 1 << 6;
const F_DEF1: u32 = 1 << 7;
const F_USE0: u32 = 1 << 8;
const F_USE1: u32 = 1 << 9;
const F_USE2: u32 = 1 << 10;
const F_USE3: u32 = 1 << 11;
const F_USE4: u32 = 1 << 12;
const F_DEF_SP: u32 = 1 << 13;
const F_USE_SP: u32 = 1 << 14;
const F_DEF_LR: u32 = 1 << 15;
const F_USE_PC: u32 = 1 << 16;
const F_DEF_LIST0: u32 = 1 << 17;
const F_USE_LIST0: u32 = 1 << 18;

/// Per-opcode behaviour flags. Built with the const builder methods so backend tables read as a
/// sequence of properties.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct OpFlags(u32);

#[allow(unused)]
impl OpFlags {
    pub(crate) const fn none() -> Self {
        Self(0)
    }

    pub(crate) const fn branch(self) -> Self {
        Self(self.0 | F_BRANCH)
    }

    pub(crate) const fn load(self) -> Self {
        Self(self.0 | F_LOAD)
    }

    pub(crate) const fn store(self) -> Self {
        Self(self.0 | F_STORE)
    }

    pub(crate) const fn sets_cc(self) -> Self {
        Self(self.0 | F_SETS_CC)
    }

    pub(crate) const fn uses_cc(self) -> Self {
        Self(self.0 | F_USES_CC)
    }

    /// The encoding embeds a pc-relative quantity and may need widening during assembly.
    pub(crate) const fn needs_fixup(self) -> Self {
        Self(self.0 | F_NEEDS_FIXUP)
    }

    pub(crate) const fn def0(self) -> Self {
        Self(self.0 | F_DEF0)
    }

    pub(crate) const fn def1(self) -> Self {
        Self(self.0 | F_DEF1)
    }

    pub(crate) const fn use0(self) -> Self {
        Self(self.0 | F_USE0)
    }

    pub(crate) const fn use1(self) -> Self {
        Self(self.0 | F_USE1)
    }

    pub(crate) const fn use2(self) -> Self {
        Self(self.0 | F_USE2)
    }

    pub(crate) const fn use3(self) -> Self {
        Self(self.0 | F_USE3)
    }

    pub(crate) const fn use4(self) -> Self {
        Self(self.0 | F_USE4)
    }

    pub(crate) const fn def_sp(self) -> Self {
        Self(self.0 | F_DEF_SP)
    }

    pub(crate) const fn use_sp(self) -> Self {
        Self(self.0 | F_USE_SP)
    }

    pub(crate) const fn def_lr(self) -> Self {
        Self(self.0 | F_DEF_LR)
    }

    pub(crate) const fn use_pc(self) -> Self {
        Self(self.0 | F_USE_PC)
    }

    /// Operand 0 is a core register list bitmap which the instruction loads into.
    pub(crate) const fn def_list0(self) -> Self {
        Self(self.0 | F_DEF_LIST0)
    }

    /// Operand 0 is a core register list bitmap which the instruction stores from.
    pub(crate) const fn use_list0(self) -> Self {
        Self(self.0 | F_USE_LIST0)
    }

    pub(crate) fn is_branch(&self) -> bool {
        self.0 & F_BRANCH != 0
    }

    pub(crate) fn is_load(&self) -> bool {
        self.0 & F_LOAD != 0
    }

    pub(crate) fn is_store(&self) -> bool {
        self.0 & F_STORE != 0
    }

    pub(crate) fn fixup_needed(&self) -> bool {
        self.0 & F_NEEDS_FIXUP != 0
    }
}

/// A per-opcode flag table entry.
#[derive(Debug, PartialEq)]
pub(crate) struct OpInfo {
    /// Mnemonic used in listings.
    pub(crate) name: &'static str,
    pub(crate) flags: OpFlags,
}

/// The trait a backend's opcode enum must conform to. Backends store their [OpInfo]s in a static
/// table indexed by discriminant; an exhaustive unit test per backend checks the table order.
pub(crate) trait OpT: Copy + Clone + Debug + PartialEq + 'static {
    fn info(&self) -> &'static OpInfo;
}

/// Pseudo opcodes: zero-size stream markers shared by every backend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Pseudo {
    /// Marks the start of the code for one bytecode instruction; source of the mapping table.
    Boundary,
    /// A basic block entry.
    BlockLabel,
    /// A generic branch target (launch pads, resume points).
    TargetLabel,
    /// A switch case target; operand 0 is the case key.
    CaseLabel,
    /// A scheduling barrier with no code of its own.
    Barrier,
    /// A 32-bit literal pool word; operand 0 is the value.
    Literal,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum LirOp<Op> {
    Real(Op),
    Pseudo(Pseudo),
}

impl<Op: OpT> LirOp<Op> {
    pub(crate) fn real(&self) -> Option<Op> {
        match self {
            LirOp::Real(x) => Some(*x),
            LirOp::Pseudo(_) => None,
        }
    }
}

/// One LIR node. `prev`/`next` thread the instruction stream; `target` points at the node a
/// branch resolves against (a label or a literal).
#[derive(Debug)]
pub(crate) struct Lir<Op> {
    pub(crate) op: LirOp<Op>,
    pub(crate) operands: [i32; 5],
    /// How many of `operands` are meaningful.
    pub(crate) n_ops: u8,
    pub(crate) use_mask: ResourceMask,
    pub(crate) def_mask: ResourceMask,
    /// The bytecode offset this node derives from.
    pub(crate) dex_off: u32,
    prev: Option<LirIdx>,
    next: Option<LirIdx>,
    pub(crate) target: Option<LirIdx>,
    /// The frame slot a frame load/store aliases, for local elimination.
    pub(crate) alias: Option<VReg>,
    /// Eliminated: occupies no bytes and is skipped by encoding.
    pub(crate) is_nop: bool,
    /// The assembler has demanded this node's wider encoding.
    pub(crate) widened: bool,
    /// Code offset assigned by the assembler; `u32::MAX` until placed.
    pub(crate) offset: u32,
}

impl<Op: OpT> Lir<Op> {
    pub(crate) fn next(&self) -> Option<LirIdx> {
        self.next
    }

    pub(crate) fn prev(&self) -> Option<LirIdx> {
        self.prev
    }

    /// Is this node a placed or placeable instruction boundary marker?
    pub(crate) fn is_boundary(&self) -> bool {
        matches!(self.op, LirOp::Pseudo(Pseudo::Boundary))
    }

    pub(crate) fn is_load(&self) -> bool {
        self.flags().is_some_and(|f| f.is_load())
    }

    pub(crate) fn is_store(&self) -> bool {
        self.flags().is_some_and(|f| f.is_store())
    }

    fn flags(&self) -> Option<&'static OpFlags> {
        match &self.op {
            LirOp::Real(op) => Some(&op.info().flags),
            LirOp::Pseudo(_) => None,
        }
    }
}

/// The LIR arena plus the list threading for one method.
pub(crate) struct LirBuf<Op> {
    arena: IndexVec<LirIdx, Lir<Op>>,
    first: Option<LirIdx>,
    last: Option<LirIdx>,
    /// Mask bits of the target's dedicated registers, for the implicit-operand flags.
    sp_bit: u8,
    lr_bit: Option<u8>,
    pc_bit: Option<u8>,
    /// The bytecode offset new nodes are tagged with; the driver updates this per MIR
    /// instruction.
    pub(crate) cur_dex_off: u32,
}

impl<Op: OpT> LirBuf<Op> {
    pub(crate) fn new(sp_bit: u8, lr_bit: Option<u8>, pc_bit: Option<u8>) -> Self {
        Self {
            arena: IndexVec::new(),
            first: None,
            last: None,
            sp_bit,
            lr_bit,
            pc_bit,
            cur_dex_off: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.arena.len()
    }

    pub(crate) fn first(&self) -> Option<LirIdx> {
        self.first
    }

    pub(crate) fn last(&self) -> Option<LirIdx> {
        self.last
    }

    /// Allocate an unlinked node. The caller must later [Self::append] or insert it, except for
    /// literal pool entries, which are threaded by the pool instead.
    pub(crate) fn raw(&mut self, op: LirOp<Op>, operands: [i32; 5], n_ops: u8) -> LirIdx {
        self.arena.push(Lir {
            op,
            operands,
            n_ops,
            use_mask: ResourceMask::none(),
            def_mask: ResourceMask::none(),
            dex_off: self.cur_dex_off,
            prev: None,
            next: None,
            target: None,
            alias: None,
            is_nop: false,
            widened: false,
            offset: u32::MAX,
        })
    }

    /// Link `idx` at the end of the stream.
    pub(crate) fn append(&mut self, idx: LirIdx) {
        debug_assert!(self.arena[idx].prev.is_none() && self.arena[idx].next.is_none());
        match self.last {
            Some(l) => {
                self.arena[l].next = Some(idx);
                self.arena[idx].prev = Some(l);
            }
            None => self.first = Some(idx),
        }
        self.last = Some(idx);
    }

    /// Link `idx` directly after `anchor`.
    pub(crate) fn insert_after(&mut self, anchor: LirIdx, idx: LirIdx) {
        let after = self.arena[anchor].next;
        self.arena[anchor].next = Some(idx);
        self.arena[idx].prev = Some(anchor);
        self.arena[idx].next = after;
        match after {
            Some(a) => self.arena[a].prev = Some(idx),
            None => self.last = Some(idx),
        }
    }

    /// Link `idx` directly before `anchor`.
    pub(crate) fn insert_before(&mut self, anchor: LirIdx, idx: LirIdx) {
        let before = self.arena[anchor].prev;
        self.arena[anchor].prev = Some(idx);
        self.arena[idx].next = Some(anchor);
        self.arena[idx].prev = before;
        match before {
            Some(b) => self.arena[b].next = Some(idx),
            None => self.first = Some(idx),
        }
    }

    pub(crate) fn new_lir0(&mut self, op: Op) -> LirIdx {
        let idx = self.raw(LirOp::Real(op), [0; 5], 0);
        self.setup_resource_masks(idx);
        self.append(idx);
        idx
    }

    pub(crate) fn new_lir1(&mut self, op: Op, a: i32) -> LirIdx {
        let idx = self.raw(LirOp::Real(op), [a, 0, 0, 0, 0], 1);
        self.setup_resource_masks(idx);
        self.append(idx);
        idx
    }

    pub(crate) fn new_lir2(&mut self, op: Op, a: i32, b: i32) -> LirIdx {
        let idx = self.raw(LirOp::Real(op), [a, b, 0, 0, 0], 2);
        self.setup_resource_masks(idx);
        self.append(idx);
        idx
    }

    pub(crate) fn new_lir3(&mut self, op: Op, a: i32, b: i32, c: i32) -> LirIdx {
        let idx = self.raw(LirOp::Real(op), [a, b, c, 0, 0], 3);
        self.setup_resource_masks(idx);
        self.append(idx);
        idx
    }

    pub(crate) fn new_lir4(&mut self, op: Op, a: i32, b: i32, c: i32, d: i32) -> LirIdx {
        let idx = self.raw(LirOp::Real(op), [a, b, c, d, 0], 4);
        self.setup_resource_masks(idx);
        self.append(idx);
        idx
    }

    pub(crate) fn new_lir5(&mut self, op: Op, a: i32, b: i32, c: i32, d: i32, e: i32) -> LirIdx {
        let idx = self.raw(LirOp::Real(op), [a, b, c, d, e], 5);
        self.setup_resource_masks(idx);
        self.append(idx);
        idx
    }

    /// Append a pseudo node with no operands.
    pub(crate) fn add_pseudo(&mut self, p: Pseudo) -> LirIdx {
        let idx = self.raw_pseudo(p);
        self.append(idx);
        idx
    }

    /// Allocate an unlinked pseudo node, e.g. a label whose position isn't yet known.
    pub(crate) fn raw_pseudo(&mut self, p: Pseudo) -> LirIdx {
        let idx = self.raw(LirOp::Pseudo(p), [0; 5], 0);
        self.setup_resource_masks(idx);
        idx
    }

    pub(crate) fn set_target(&mut self, idx: LirIdx, target: LirIdx) {
        self.arena[idx].target = Some(target);
    }

    /// Compute `idx`'s use/def masks from its opcode's flag table entry.
    ///
    /// Branches claim everything in both masks; label-like pseudos claim everything in their def
    /// mask; literals claim nothing.
    fn setup_resource_masks(&mut self, idx: LirIdx) {
        let (flags, n_ops) = match &self.arena[idx].op {
            LirOp::Real(op) => (op.info().flags, self.arena[idx].n_ops),
            LirOp::Pseudo(Pseudo::Literal) => return,
            LirOp::Pseudo(_) => {
                self.arena[idx].def_mask = ResourceMask::all();
                return;
            }
        };
        if flags.0 & F_BRANCH != 0 {
            self.arena[idx].use_mask = ResourceMask::all();
            self.arena[idx].def_mask = ResourceMask::all();
            return;
        }

        let operands = self.arena[idx].operands;
        let mut use_mask = ResourceMask::none();
        let mut def_mask = ResourceMask::none();
        let reg_bit = |i: usize| {
            debug_assert!(usize::from(n_ops) > i);
            u8::try_from(operands[i]).unwrap_or_else(|_| panic!("bad register operand {i}"))
        };

        for (f, i) in [(F_DEF0, 0), (F_DEF1, 1)] {
            if flags.0 & f != 0 {
                def_mask = def_mask.add_reg(reg_bit(i));
            }
        }
        for (f, i) in [
            (F_USE0, 0),
            (F_USE1, 1),
            (F_USE2, 2),
            (F_USE3, 3),
            (F_USE4, 4),
        ] {
            if flags.0 & f != 0 {
                use_mask = use_mask.add_reg(reg_bit(i));
            }
        }
        if flags.0 & F_SETS_CC != 0 {
            def_mask = def_mask.add_ccode();
        }
        if flags.0 & F_USES_CC != 0 {
            use_mask = use_mask.add_ccode();
        }
        // Memory operations default to the heap class until retagged.
        if flags.0 & F_LOAD != 0 {
            use_mask = use_mask.add_mem(MemRefKind::Heap);
        }
        if flags.0 & F_STORE != 0 {
            def_mask = def_mask.add_mem(MemRefKind::Heap);
        }
        if flags.0 & F_DEF_SP != 0 {
            def_mask = def_mask.add_reg(self.sp_bit);
        }
        if flags.0 & F_USE_SP != 0 {
            use_mask = use_mask.add_reg(self.sp_bit);
        }
        if flags.0 & F_DEF_LR != 0 {
            if let Some(b) = self.lr_bit {
                def_mask = def_mask.add_reg(b);
            }
        }
        if flags.0 & F_USE_PC != 0 {
            if let Some(b) = self.pc_bit {
                use_mask = use_mask.add_reg(b);
            }
        }
        // Register list operands name core registers directly by mask bit.
        if flags.0 & (F_DEF_LIST0 | F_USE_LIST0) != 0 {
            let list = operands[0] as u32;
            for bit in 0..16u8 {
                if list & (1 << bit) != 0 {
                    if flags.0 & F_DEF_LIST0 != 0 {
                        def_mask = def_mask.add_reg(bit);
                    } else {
                        use_mask = use_mask.add_reg(bit);
                    }
                }
            }
        }
        self.arena[idx].use_mask = use_mask;
        self.arena[idx].def_mask = def_mask;
    }

    /// Retag `idx`'s memory alias class. The class lands in the use mask of a load and the def
    /// mask of a store.
    pub(crate) fn set_mem_ref_kind(&mut self, idx: LirIdx, kind: MemRefKind) {
        let Some(flags) = self.arena[idx].flags() else {
            panic!("mem ref kind on a pseudo op");
        };
        debug_assert!(flags.is_load() || flags.is_store());
        if flags.is_load() {
            let m = self.arena[idx].use_mask;
            self.arena[idx].use_mask = m.minus_mem().add_mem(kind);
        }
        if flags.is_store() {
            let m = self.arena[idx].def_mask;
            self.arena[idx].def_mask = m.minus_mem().add_mem(kind);
        }
    }

    /// Mark `idx` as a frame access of `vreg`'s slot.
    pub(crate) fn annotate_frame_ref(&mut self, idx: LirIdx, vreg: VReg) {
        self.set_mem_ref_kind(idx, MemRefKind::Frame);
        self.arena[idx].alias = Some(vreg);
    }

    /// Pretty print one node.
    pub(crate) fn entry_to_string(&self, idx: LirIdx, with_offsets: bool) -> String {
        let lir = &self.arena[idx];
        let mut s = String::new();
        if with_offsets && lir.offset != u32::MAX {
            s.push_str(&format!("{:#06x}: ", lir.offset));
        }
        if lir.is_nop {
            s.push_str("(nop) ");
        }
        match &lir.op {
            LirOp::Pseudo(Pseudo::Boundary) => s.push_str(&format!("-- bc {:#06x}", lir.dex_off)),
            LirOp::Pseudo(Pseudo::BlockLabel) => s.push_str(&format!("L{}:", idx.raw())),
            LirOp::Pseudo(Pseudo::TargetLabel) => s.push_str(&format!("T{}:", idx.raw())),
            LirOp::Pseudo(Pseudo::CaseLabel) => {
                s.push_str(&format!("case {}:", lir.operands[0]))
            }
            LirOp::Pseudo(Pseudo::Barrier) => s.push_str("-- barrier"),
            LirOp::Pseudo(Pseudo::Literal) => {
                s.push_str(&format!(".word {:#010x}", lir.operands[0] as u32))
            }
            LirOp::Real(op) => {
                let info = op.info();
                s.push_str(info.name);
                let mut sep = " ";
                for i in 0..usize::from(lir.n_ops) {
                    s.push_str(sep);
                    sep = ", ";
                    // Register operands render as `r<maskbit>`; everything else as a plain
                    // integer.
                    let is_reg = match i {
                        0 => info.flags.0 & (F_DEF0 | F_USE0) != 0,
                        1 => info.flags.0 & (F_DEF1 | F_USE1) != 0,
                        2 => info.flags.0 & F_USE2 != 0,
                        3 => info.flags.0 & F_USE3 != 0,
                        4 => info.flags.0 & F_USE4 != 0,
                        _ => false,
                    };
                    if is_reg {
                        s.push_str(&format!("r{}", lir.operands[i]));
                    } else {
                        s.push_str(&format!("{}", lir.operands[i]));
                    }
                }
                if let Some(t) = lir.target {
                    if with_offsets && self.arena[t].offset != u32::MAX {
                        s.push_str(&format!(" -> {:#06x}", self.arena[t].offset));
                    } else {
                        s.push_str(&format!(" -> @{}", t.raw()));
                    }
                }
            }
        }
        s
    }

    /// Pretty print the whole stream, one node per line.
    pub(crate) fn to_string(&self, with_offsets: bool) -> String {
        let mut s = String::new();
        let mut it = self.first;
        while let Some(idx) = it {
            s.push_str(&self.entry_to_string(idx, with_offsets));
            s.push('\n');
            it = self.arena[idx].next;
        }
        s
    }
}

impl<Op> std::ops::Index<LirIdx> for LirBuf<Op> {
    type Output = Lir<Op>;

    fn index(&self, idx: LirIdx) -> &Lir<Op> {
        &self.arena[idx]
    }
}

impl<Op> std::ops::IndexMut<LirIdx> for LirBuf<Op> {
    fn index_mut(&mut self, idx: LirIdx) -> &mut Lir<Op> {
        &mut self.arena[idx]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq)]
    #[repr(u8)]
    enum TOp {
        Add,
        Ldr,
        Str,
        B,
    }

    static TINFO: [OpInfo; 4] = [
        OpInfo {
            name: "add",
            flags: OpFlags::none().def0().use1().use2().sets_cc(),
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
            name: "b",
            flags: OpFlags::none().branch(),
        },
    ];

    impl OpT for TOp {
        fn info(&self) -> &'static OpInfo {
            &TINFO[*self as usize]
        }
    }

    fn buf() -> LirBuf<TOp> {
        LirBuf::new(13, Some(14), Some(15))
    }

    #[test]
    fn interferes() {
        assert!(ResourceMask::all().interferes(ResourceMask::none().add_reg(3)));
        assert!(ResourceMask::all().interferes(ResourceMask::none().add_ccode()));
        assert!(!ResourceMask::all().interferes(ResourceMask::none()));
        assert!(
            !ResourceMask::none()
                .add_reg(1)
                .interferes(ResourceMask::none().add_reg(2))
        );
        assert!(
            ResourceMask::none()
                .add_mem(MemRefKind::Frame)
                .interferes(ResourceMask::none().add_mem(MemRefKind::Frame))
        );
        assert!(
            !ResourceMask::none()
                .add_mem(MemRefKind::Frame)
                .interferes(ResourceMask::none().add_mem(MemRefKind::Heap))
        );
        assert!(
            ResourceMask::none()
                .add_mem(MemRefKind::Heap)
                .minus_mem()
                .is_none()
        );
    }

    #[test]
    fn masks_from_flags() {
        let mut b = buf();
        let add = b.new_lir3(TOp::Add, 0, 1, 2);
        assert!(b[add].def_mask.contains_reg(0));
        assert!(!b[add].def_mask.contains_reg(1));
        assert!(b[add].use_mask.contains_reg(1));
        assert!(b[add].use_mask.contains_reg(2));
        assert!(b[add].def_mask.interferes(ResourceMask::none().add_ccode()));

        let ldr = b.new_lir3(TOp::Ldr, 4, 5, 8);
        assert!(b[ldr].def_mask.contains_reg(4));
        assert!(
            b[ldr]
                .use_mask
                .interferes(ResourceMask::none().add_mem(MemRefKind::Heap))
        );

        let br = b.new_lir0(TOp::B);
        assert_eq!(b[br].use_mask, ResourceMask::all());
        assert_eq!(b[br].def_mask, ResourceMask::all());
    }

    #[test]
    fn mem_retagging() {
        let mut b = buf();
        let st = b.new_lir3(TOp::Str, 2, 13, 8);
        assert!(
            b[st].def_mask
                .interferes(ResourceMask::none().add_mem(MemRefKind::Heap))
        );
        b.annotate_frame_ref(st, VReg::from_usize(3));
        assert!(
            !b[st].def_mask
                .interferes(ResourceMask::none().add_mem(MemRefKind::Heap))
        );
        assert!(
            b[st].def_mask
                .interferes(ResourceMask::none().add_mem(MemRefKind::Frame))
        );
        assert_eq!(b[st].alias, Some(VReg::from_usize(3)));
        // The register parts survive the retag.
        assert!(b[st].use_mask.contains_reg(2));
    }

    #[test]
    fn labels_are_barriers() {
        let mut b = buf();
        let l = b.add_pseudo(Pseudo::BlockLabel);
        assert_eq!(b[l].def_mask, ResourceMask::all());
        assert_eq!(b[l].use_mask, ResourceMask::none());
        let lit = b.raw_pseudo(Pseudo::Literal);
        assert!(b[lit].def_mask.is_none());
    }

    #[test]
    fn insertion_keeps_order() {
        let mut b = buf();
        let a = b.new_lir3(TOp::Add, 0, 1, 2);
        let c = b.new_lir0(TOp::B);
        let mid = b.raw_pseudo(Pseudo::TargetLabel);
        b.insert_after(a, mid);
        let pre = b.raw_pseudo(Pseudo::Boundary);
        b.insert_before(a, pre);

        let mut order = Vec::new();
        let mut it = b.first();
        while let Some(i) = it {
            order.push(i);
            it = b[i].next();
        }
        assert_eq!(order, vec![pre, a, mid, c]);
        assert_eq!(b[a].prev(), Some(pre));
        assert_eq!(b.last(), Some(c));
    }

    #[test]
    fn listing_format() {
        let mut b = buf();
        b.cur_dex_off = 0x10;
        let bd = b.add_pseudo(Pseudo::Boundary);
        let add = b.new_lir3(TOp::Add, 0, 1, 2);
        assert_eq!(b.entry_to_string(bd, false), "-- bc 0x0010");
        assert_eq!(b.entry_to_string(add, false), "add r0, r1, r2");
        let br = b.new_lir0(TOp::B);
        let l = b.add_pseudo(Pseudo::TargetLabel);
        b.set_target(br, l);
        assert_eq!(
            b.entry_to_string(br, false),
            format!("b -> @{}", l.raw())
        );
    }
}
