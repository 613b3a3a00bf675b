//! The code generator.
//!
//! Lowering a [Method] happens in passes:
//!
//! 1. [mir_to_lir] walks the MIR blocks in order, using [regalloc] to place values and a
//!    target-specific [Isa](mir_to_lir::Isa) implementation to emit [lir] nodes.
//! 2. [launchpad] appends the deferred slow paths (throws, suspend checks, intrinsic
//!    fallbacks) that the main walk only branched to.
//! 3. [litpool] resolves switch case labels against the bytecode boundary map.
//! 4. [local_opt] runs the mask-driven local load/store elimination.
//! 5. [asm] assigns offsets, encodes, and retries with widened encodings until the layout
//!    converges, then serialises the code image, data pools, mapping table and patch records.
//!
//! The target is chosen exactly once, in [Codegen::compile]; everything downstream is generic
//! over the [Isa](mir_to_lir::Isa) trait and never branches on architecture identity.

pub(crate) mod arm;
pub(crate) mod asm;
pub(crate) mod callseq;
pub(crate) mod launchpad;
pub(crate) mod lir;
pub(crate) mod litpool;
pub(crate) mod local_opt;
pub(crate) mod mips;
pub(crate) mod mir_to_lir;
pub(crate) mod regalloc;
pub(crate) mod x86;

use crate::{
    log::{Log, Verbosity},
    mir::{BBlockIdx, ConstResolver, Method, VReg},
    stats::Stats,
};
use index_vec::IndexVec;
use lir::{LirBuf, LirIdx};
use litpool::DataPools;
use mir_to_lir::Isa;
use regalloc::{PromotionMap, RegLoc, RegPool, RegT};
use std::{collections::HashMap, error::Error};
use thiserror::Error;

/// Failures the code generator can produce. The two variants are deliberately different in kind:
///
///   * [CompileError::Unsupported] means "this method cannot be compiled by this backend". It is
///     recoverable: the caller falls back to another execution strategy for the method.
///   * [CompileError::Internal] means an invariant was violated inside the generator. The method's
///     compilation is abandoned and a diagnostic dump is logged; compiling on regardless could
///     silently produce wrong code, which is never acceptable.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Which machine the generated code targets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Target {
    /// Thumb-flavoured 32-bit ARM with VFP.
    Arm,
    /// MIPS32, soft-float.
    Mips,
    /// 32-bit x86 with SSE2.
    X86,
}

/// Numeric thresholds that shape generated code. These are preserved as data, never re-derived;
/// [Tuning::default] supplies the canonical values.
#[derive(Clone, Debug)]
pub struct Tuning {
    /// How many assembler layout retries are allowed before compilation fails with an internal
    /// error. Each retry only ever widens encodings, so layouts converge quickly in practice.
    pub max_asm_retries: u32,
    /// For a range call, the argument word count at and above which a block-copy helper call
    /// replaces unrolled word-by-word copies.
    pub arg_block_copy_min: usize,
    /// How many MIR uses a vreg needs before the heuristic will promote it to a register.
    pub promote_min_uses: u32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            max_asm_retries: 10,
            arg_block_copy_min: 6,
            promote_min_uses: 2,
        }
    }
}

/// One code-offset to bytecode-offset correspondence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MapEntry {
    pub code_off: u32,
    pub dex_off: u32,
}

/// Where a patch lands in the code image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PatchSite {
    /// A 32-bit literal pool word at this code offset.
    PoolWord(u32),
    /// A register-high/register-low immediate instruction pair starting at this offset.
    PairHiLo(u32),
    /// A plain 32-bit immediate embedded at this offset.
    Imm32(u32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PatchKind {
    /// The callee's code address was statically bound at compile time.
    Static,
    /// The site holds a method-table entry resolved when the image is loaded.
    Dynamic,
}

/// A call-target relocation the embedder must apply before the code runs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatchRecord {
    pub site: PatchSite,
    pub method_idx: u32,
    pub kind: PatchKind,
}

/// The output of compiling one method.
#[derive(Debug)]
pub struct CompiledMethod {
    /// Instructions, then literal pool, then switch tables, then fill-array data.
    pub code: Vec<u8>,
    /// Code-offset to bytecode-offset mapping, ascending in code offset.
    pub map: Vec<MapEntry>,
    pub patches: Vec<PatchRecord>,
    pub frame_size: u32,
    /// Bit set of callee-saved core registers the prologue spills (by mask bit).
    pub core_spill_mask: u32,
    pub fp_spill_mask: u32,
    /// How many widen-and-retry assembler passes this method cost.
    pub(crate) asm_retries: u32,
}

/// Object-layout and thread-state constants the generated code assumes. The reserved self
/// register points at the runtime's per-thread state; helper entry points live at fixed offsets
/// from it.
pub(crate) mod abi {
    /// Offset of the class pointer in an object header.
    pub(crate) const OBJ_CLASS_OFF: i32 = 0;
    /// Offset of the dispatch table in a class.
    pub(crate) const CLASS_VTABLE_OFF: i32 = 0x18;
    /// Offset of the compiled-code entry point in a method-table entry.
    pub(crate) const METHOD_CODE_OFF: i32 = 0x20;
    /// Offset of the length word in an array object.
    pub(crate) const ARRAY_LEN_OFF: i32 = 8;
    /// Offset of element 0 in an array object.
    pub(crate) const ARRAY_DATA_OFF: i32 = 16;
    /// Offset of the stack-overflow limit in the thread state.
    pub(crate) const SELF_STACK_LIMIT_OFF: i32 = 0x10;
    /// Offset of the helper entry-point table in the thread state.
    pub(crate) const SELF_HELPER_BASE_OFF: i32 = 0x80;
}

/// Runtime helper entry points, reachable at a fixed displacement from the self register.
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(u8)]
pub(crate) enum Helper {
    ThrowNullPointer,
    ThrowDivZero,
    ThrowArrayBounds,
    ThrowStackOverflow,
    TestSuspend,
    /// Resolve-and-invoke trampoline for calls unresolved at compile time.
    ResolveInvoke,
    IDiv,
    IRem,
    FillArrayData,
    StringCompareTo,
    /// Block copy for long range-call argument windows: (dst, src, byte count).
    MemCopy,
}

impl Helper {
    /// Displacement of this helper's entry word from the self register.
    pub(crate) fn self_disp(self) -> i32 {
        abi::SELF_HELPER_BASE_OFF + (self as i32) * 4
    }
}

/// The compiler front object: owns logging, statistics and tuning, and compiles methods for one
/// target.
pub struct Codegen {
    log: Log,
    stats: Stats,
    tuning: Tuning,
    target: Target,
}

impl Codegen {
    pub fn new(target: Target) -> Result<Self, Box<dyn Error>> {
        Self::with_tuning(target, Tuning::default())
    }

    pub fn with_tuning(target: Target, tuning: Tuning) -> Result<Self, Box<dyn Error>> {
        Ok(Self {
            log: Log::new()?,
            stats: Stats::new(),
            tuning,
            target,
        })
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// Compile `m` to machine code for this [Codegen]'s target.
    pub fn compile(
        &self,
        m: &Method,
        resolver: &dyn ConstResolver,
    ) -> Result<CompiledMethod, CompileError> {
        let r = match self.target {
            Target::Arm => mir_to_lir::build::<arm::Arm>(m, resolver, &self.tuning, &self.log),
            Target::Mips => mir_to_lir::build::<mips::Mips>(m, resolver, &self.tuning, &self.log),
            Target::X86 => mir_to_lir::build::<x86::X86>(m, resolver, &self.tuning, &self.log),
        };
        match &r {
            Ok(cm) => {
                self.stats.method_compiled_ok();
                self.stats.asm_retries(u64::from(cm.asm_retries));
                self.log.log(
                    Verbosity::MethodEvent,
                    &format!("compiled {}: {} bytes", m.name, cm.code.len()),
                );
            }
            Err(CompileError::Unsupported(reason)) => {
                self.stats.method_fallback();
                self.log.log(
                    Verbosity::Warning,
                    &format!("fallback {}: {reason}", m.name),
                );
            }
            Err(CompileError::Internal(reason)) => {
                self.stats.method_compiled_err();
                self.log
                    .log(Verbosity::Error, &format!("internal {}: {reason}", m.name));
            }
        }
        r
    }
}

/// A call-target patch gathered during generation; [asm] resolves it to a [PatchRecord] once
/// offsets are final.
pub(crate) struct PatchPoint {
    /// The node whose encoding embeds the target: a pool literal or a real instruction,
    /// depending on how the backend materialises call targets.
    pub(crate) node: LirIdx,
    /// Byte adjustment from the node's offset to the patched field.
    pub(crate) adjust: u32,
    pub(crate) form: PatchForm,
    pub(crate) method_idx: u32,
    pub(crate) kind: PatchKind,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum PatchForm {
    PoolWord,
    PairHiLo,
    Imm32,
}

/// Everything the generator knows about the method being compiled. Exclusively owned for the
/// duration of one compilation; the only shared state anywhere is read-only.
pub(crate) struct Cg<'a, A: Isa> {
    pub(crate) m: &'a Method,
    pub(crate) resolver: &'a dyn ConstResolver,
    pub(crate) tuning: &'a Tuning,
    pub(crate) lir: LirBuf<A::Op>,
    pub(crate) pool: RegPool<A::Reg>,
    locs: IndexVec<VReg, RegLoc<A::Reg>>,
    pub(crate) promo: PromotionMap<A::Reg>,
    pub(crate) data: DataPools,
    pub(crate) pads: Vec<launchpad::Pad>,
    /// Bytecode offset to the [lir::Pseudo::Boundary] node opening that instruction's code.
    pub(crate) boundary_map: HashMap<u32, LirIdx>,
    /// Entry label of each basic block, filled in by the driver before the walk.
    pub(crate) block_labels: IndexVec<BBlockIdx, LirIdx>,
    pub(crate) patches: Vec<PatchPoint>,
    /// Frame layout, fixed before emission: from the stack pointer upwards, outgoing-argument
    /// words, then non-argument vreg slots, then fp and core callee saves. Incoming argument
    /// vregs alias the caller's outgoing area above the frame.
    pub(crate) frame_size: u32,
    pub(crate) outs_size: u32,
    pub(crate) core_spill_mask: u32,
    pub(crate) fp_spill_mask: u32,
}

impl<'a, A: Isa> Cg<'a, A> {
    pub(crate) fn new(
        m: &'a Method,
        resolver: &'a dyn ConstResolver,
        tuning: &'a Tuning,
    ) -> Result<Self, CompileError> {
        if usize::from(m.num_vregs) != m.wide_vregs.len()
            || usize::from(m.num_vregs) != m.fp_vregs.len()
        {
            return Err(CompileError::Internal(
                "vreg attribute sets disagree with num_vregs".to_owned(),
            ));
        }

        let outs_size = callseq::outs_size(m);
        let promo = PromotionMap::build(m, A::promotable_core(), A::promotable_fp(), tuning);
        let mut core_spill_mask = A::fixed_core_spills();
        let mut fp_spill_mask = 0u32;
        for (_, r) in promo.iter_promoted() {
            if r.is_fp() {
                fp_spill_mask |= 1 << (r.mask_bit() - A::fp_mask_base());
            } else {
                core_spill_mask |= 1 << r.mask_bit();
            }
        }
        let n_spills = core_spill_mask.count_ones() + fp_spill_mask.count_ones();
        let n_locals = u32::from(m.num_vregs) - u32::from(m.num_ins);
        let frame_size = (outs_size + n_locals * 4 + n_spills * 4 + 7) & !7;

        let locs = regalloc::init_reg_locs(m, &promo, !A::fp_temps().is_empty());
        let sp_bit = A::sp_reg().mask_bit();
        let lr_bit = A::lr_reg().map(|r| r.mask_bit());
        Ok(Self {
            m,
            resolver,
            tuning,
            lir: LirBuf::new(sp_bit, lr_bit, A::pc_mask_bit()),
            pool: RegPool::new(A::core_temps(), A::fp_temps(), A::FP_DOUBLE_SOLO),
            locs,
            promo,
            data: DataPools::new(),
            pads: Vec::new(),
            boundary_map: HashMap::new(),
            block_labels: IndexVec::new(),
            patches: Vec::new(),
            frame_size,
            outs_size,
            core_spill_mask,
            fp_spill_mask,
        })
    }

    /// The current location of `v`. This is a copy: residency is re-derived from the pool on
    /// each use, so stale copies cannot mislead.
    pub(crate) fn loc(&self, v: VReg) -> RegLoc<A::Reg> {
        self.locs[v]
    }

    /// Displacement of `v`'s frame slot from the stack pointer.
    pub(crate) fn vreg_disp(&self, v: VReg) -> i32 {
        let v = u32::from(v.raw());
        let first_in = u32::from(self.m.num_vregs) - u32::from(self.m.num_ins);
        if v >= first_in {
            // Incoming arguments alias the caller's outgoing area above our frame.
            (self.frame_size + (v - first_in) * 4) as i32 + A::in_arg_bias()
        } else {
            (self.outs_size + v * 4) as i32
        }
    }

    /// Displacement of the `i`th outgoing argument word.
    pub(crate) fn out_disp(&self, i: usize) -> i32 {
        (i * 4) as i32
    }

    /// Bytes of [Cg::frame_size] consumed by the callee-save spills. Prologues that save
    /// with push-style operations subtract this from the explicit stack adjustment.
    pub(crate) fn spill_bytes(&self) -> u32 {
        4 * (self.core_spill_mask.count_ones() + self.fp_spill_mask.count_ones())
    }

    /// Render the state a human needs when an internal error aborts this method: the LIR so
    /// far, the promotion map, and the temp pool.
    pub(crate) fn diag_dump(&self) -> String {
        let mut s = format!("method {}\n", self.m.name);
        s.push_str(&self.lir.to_string(true));
        s.push_str("promotions:");
        let mut any = false;
        for (v, r) in self.promo.iter_promoted() {
            s.push_str(&format!(" v{}->{}", v.raw(), r));
            any = true;
        }
        if !any {
            s.push_str(" none");
        }
        s.push('\n');
        s.push_str(&self.pool.to_string());
        s
    }
}
