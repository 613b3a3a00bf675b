//! Value locations and the temporary register pool.
//!
//! Every vreg has a [RegLoc] describing where its value lives: a frame slot, or a register.
//! The locations table built by [init_reg_locs] is static for the whole method; what changes
//! as code is emitted is *residency*, tracked by the [RegPool]. A pool temp can hold a copy
//! of a vreg's value (`live`), and that copy can be newer than the frame slot (`dirty`).
//! The pool is the single source of truth for residency: location copies handed to emission
//! code are refreshed against it ([update_loc]) before use, so a stale copy can never cause
//! two registers to claim the same vreg.
//!
//! Allocation is two rounds ([alloc_temp]): first a free temp not holding a live value, then
//! any free temp, flushing its value first if dirty. `in_use` protects a temp only for the
//! duration of one MIR instruction; [RegPool::reset] clears it at instruction end while
//! `live`/`dirty` persist so values stay cached across instructions within a block.

use crate::{
    codegen::{mir_to_lir::Isa, Cg, CompileError, Tuning},
    mir::{Method, VReg},
};
use index_vec::IndexVec;
use smallvec::SmallVec;
use std::fmt::{Debug, Display, Write};

/// The interface to a target's register file.
pub(crate) trait RegT: Copy + Clone + Debug + Display + PartialEq + 'static {
    /// The value this type uses to mean "no register".
    fn undefined() -> Self;

    fn is_undefined(&self) -> bool {
        *self == Self::undefined()
    }

    /// This register's bit position in a
    /// [ResourceMask](crate::codegen::lir::ResourceMask)'s register space, and in the spill
    /// masks of a compiled method.
    fn mask_bit(&self) -> u8;

    fn is_fp(&self) -> bool;

    /// Caller-saved under the target's calling convention. Pool temps must be; promotable
    /// registers must not be.
    fn is_caller_saved(&self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum RegClass {
    /// Whatever matches the value's own kind.
    Any,
    Core,
    Fp,
}

fn class_matches<R: RegT>(class: RegClass, r: R) -> bool {
    match class {
        RegClass::Any => true,
        RegClass::Core => !r.is_fp(),
        RegClass::Fp => r.is_fp(),
    }
}

/// `Any` narrowed by the value's own kind.
fn effective_class(class: RegClass, fp: bool) -> RegClass {
    match class {
        RegClass::Any => {
            if fp {
                RegClass::Fp
            } else {
                RegClass::Core
            }
        }
        c => c,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum LocKind {
    /// The value lives in its frame slot.
    Frame,
    /// The value lives in `low` (and `high` when wide).
    Reg,
}

/// Where a vreg's value lives. Copies of these circulate through emission code; the pool
/// stays authoritative via [update_loc].
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct RegLoc<R> {
    pub(crate) kind: LocKind,
    pub(crate) wide: bool,
    pub(crate) fp: bool,
    /// Promoted: `low`/`high` are the value's permanent home and `kind` is always `Reg`.
    pub(crate) home: bool,
    pub(crate) low: R,
    pub(crate) high: R,
    pub(crate) vreg: VReg,
}

/// Bookkeeping for one pool temp.
#[derive(Clone, Copy, Debug)]
struct TempInfo<R> {
    reg: R,
    /// Reserved within the current MIR instruction.
    in_use: bool,
    /// Holds one half of a wide value; `partner` is the other half.
    pair: bool,
    partner: R,
    /// Holds a vreg's current value.
    live: bool,
    /// The held value is newer than the frame slot.
    dirty: bool,
    vreg: Option<VReg>,
}

impl<R: RegT> TempInfo<R> {
    fn new(reg: R) -> Self {
        Self {
            reg,
            in_use: false,
            pair: false,
            partner: R::undefined(),
            live: false,
            dirty: false,
            vreg: None,
        }
    }

    fn clobber(&mut self) {
        self.live = false;
        self.dirty = false;
        self.pair = false;
        self.partner = R::undefined();
        self.vreg = None;
    }
}

/// The temporary register pool. Holds only caller-saved registers; promoted homes and
/// reserved registers are outside the pool and all state methods no-op on them.
pub(crate) struct RegPool<R: RegT> {
    core: Vec<TempInfo<R>>,
    fp: Vec<TempInfo<R>>,
    /// Round-robin cursors so consecutive allocations spread across the pool.
    next_core: usize,
    next_fp: usize,
    /// On this target a wide fp value occupies one fp register, not an even/odd pair.
    fp_solo: bool,
}

impl<R: RegT> RegPool<R> {
    pub(crate) fn new(core: &[R], fp: &[R], fp_solo: bool) -> Self {
        debug_assert!(core.iter().all(|r| r.is_caller_saved() && !r.is_fp()));
        debug_assert!(fp.iter().all(|r| r.is_caller_saved() && r.is_fp()));
        Self {
            core: core.iter().map(|r| TempInfo::new(*r)).collect(),
            fp: fp.iter().map(|r| TempInfo::new(*r)).collect(),
            next_core: 0,
            next_fp: 0,
            fp_solo,
        }
    }

    pub(crate) fn fp_solo(&self) -> bool {
        self.fp_solo
    }

    fn info(&self, r: R) -> Option<&TempInfo<R>> {
        self.core
            .iter()
            .chain(self.fp.iter())
            .find(|i| i.reg == r)
    }

    fn info_mut(&mut self, r: R) -> Option<&mut TempInfo<R>> {
        self.core
            .iter_mut()
            .chain(self.fp.iter_mut())
            .find(|i| i.reg == r)
    }

    pub(crate) fn is_temp(&self, r: R) -> bool {
        self.info(r).is_some()
    }

    pub(crate) fn is_live(&self, r: R) -> bool {
        self.info(r).is_some_and(|i| i.live)
    }

    pub(crate) fn is_dirty(&self, r: R) -> bool {
        self.info(r).is_some_and(|i| i.dirty)
    }

    pub(crate) fn is_in_use(&self, r: R) -> bool {
        self.info(r).is_some_and(|i| i.in_use)
    }

    pub(crate) fn is_pair(&self, r: R) -> bool {
        self.info(r).is_some_and(|i| i.pair)
    }

    pub(crate) fn partner(&self, r: R) -> R {
        self.info(r).map_or_else(R::undefined, |i| i.partner)
    }

    pub(crate) fn vreg_of(&self, r: R) -> Option<VReg> {
        self.info(r).and_then(|i| i.vreg)
    }

    /// Take a free temp of `class` not holding a live value. Marks it in-use.
    pub(crate) fn take_free(&mut self, class: RegClass, avoid_live: bool) -> Option<R> {
        let (temps, cursor) = match effective_class(class, false) {
            RegClass::Fp => (&mut self.fp, &mut self.next_fp),
            _ => (&mut self.core, &mut self.next_core),
        };
        let n = temps.len();
        for step in 0..n {
            let i = (*cursor + step) % n;
            let info = &mut temps[i];
            if !info.in_use && (!avoid_live || !info.live) {
                info.in_use = true;
                *cursor = (i + 1) % n;
                return Some(info.reg);
            }
        }
        None
    }

    /// Take two free temps of `class` for a wide value. For fp pairs the two registers are
    /// mask-bit adjacent with the low half even; core halves may be any two temps. On a
    /// solo-fp target a wide fp request yields one register twice.
    pub(crate) fn take_free_pair(&mut self, class: RegClass, avoid_live: bool) -> Option<(R, R)> {
        if matches!(class, RegClass::Fp) {
            if self.fp_solo {
                return self.take_free(class, avoid_live).map(|r| (r, r));
            }
            let free = |info: &TempInfo<R>| !info.in_use && (!avoid_live || !info.live);
            let mut found = None;
            for i in (0..self.fp.len().saturating_sub(1)).step_by(2) {
                if self.fp[i].reg.mask_bit() % 2 == 0
                    && self.fp[i + 1].reg.mask_bit() == self.fp[i].reg.mask_bit() + 1
                    && free(&self.fp[i])
                    && free(&self.fp[i + 1])
                {
                    found = Some(i);
                    break;
                }
            }
            let i = found?;
            self.fp[i].in_use = true;
            self.fp[i + 1].in_use = true;
            return Some((self.fp[i].reg, self.fp[i + 1].reg));
        }
        // Core halves are independent; roll back the first if no second is free.
        let lo = self.take_free(RegClass::Core, avoid_live)?;
        match self.take_free(RegClass::Core, avoid_live) {
            Some(hi) => Some((lo, hi)),
            None => {
                self.free_temp(lo);
                None
            }
        }
    }

    /// Release an in-instruction reservation. Residency (`live`/`dirty`) persists.
    pub(crate) fn free_temp(&mut self, r: R) {
        if let Some(info) = self.info_mut(r) {
            info.in_use = false;
        }
    }

    pub(crate) fn mark_in_use(&mut self, r: R) {
        if let Some(info) = self.info_mut(r) {
            info.in_use = true;
        }
    }

    /// Forget any value association for `r`, unlinking its pair partner too.
    pub(crate) fn clobber(&mut self, r: R) {
        let partner = match self.info(r) {
            Some(info) if info.pair => Some(info.partner),
            _ => None,
        };
        if let Some(p) = partner {
            if let Some(pi) = self.info_mut(p) {
                pi.pair = false;
                pi.partner = R::undefined();
            }
        }
        if let Some(info) = self.info_mut(r) {
            info.clobber();
        }
    }

    pub(crate) fn clobber_all(&mut self) {
        for info in self.core.iter_mut().chain(self.fp.iter_mut()) {
            info.clobber();
        }
    }

    /// Kill any temp claiming to hold `v`'s value.
    pub(crate) fn clobber_vreg(&mut self, v: VReg) {
        let mut victims: SmallVec<[R; 2]> = SmallVec::new();
        for info in self.core.iter().chain(self.fp.iter()) {
            if info.live && info.vreg == Some(v) {
                victims.push(info.reg);
            }
        }
        for r in victims {
            self.clobber(r);
        }
    }

    /// Record that `r` now holds `v`'s current value. Any other register claiming `v` is
    /// clobbered first, so at most one register is ever live for a vreg.
    pub(crate) fn mark_live(&mut self, r: R, v: VReg) {
        if let Some(info) = self.info(r) {
            if info.live && info.vreg == Some(v) {
                return;
            }
        }
        self.clobber_vreg(v);
        if let Some(info) = self.info_mut(r) {
            info.live = true;
            info.vreg = Some(v);
        }
    }

    pub(crate) fn mark_dirty(&mut self, r: R) {
        if let Some(info) = self.info_mut(r) {
            info.dirty = true;
        }
    }

    pub(crate) fn mark_clean(&mut self, r: R) {
        if let Some(info) = self.info_mut(r) {
            info.dirty = false;
        }
    }

    /// Link two temps as halves of one wide value.
    pub(crate) fn mark_pair(&mut self, lo: R, hi: R) {
        if lo == hi {
            // Solo-fp wide values are tracked through the low half alone.
            return;
        }
        if let Some(info) = self.info_mut(lo) {
            info.pair = true;
            info.partner = hi;
        }
        if let Some(info) = self.info_mut(hi) {
            info.pair = true;
            info.partner = lo;
        }
    }

    /// The temp of `class` currently live for `v`, if any.
    pub(crate) fn live_reg_for(&self, v: VReg, class: RegClass) -> Option<R> {
        self.core
            .iter()
            .chain(self.fp.iter())
            .find(|i| i.live && i.vreg == Some(v) && class_matches(class, i.reg))
            .map(|i| i.reg)
    }

    /// All temps whose values are newer than their frame slots.
    pub(crate) fn dirty_live(&self) -> SmallVec<[R; 8]> {
        self.core
            .iter()
            .chain(self.fp.iter())
            .filter(|i| i.live && i.dirty)
            .map(|i| i.reg)
            .collect()
    }

    /// Clear in-instruction reservations. Called between MIR instructions.
    pub(crate) fn reset(&mut self) {
        for info in self.core.iter_mut().chain(self.fp.iter_mut()) {
            info.in_use = false;
        }
        self.next_core = 0;
        self.next_fp = 0;
    }

    pub(crate) fn to_string(&self) -> String {
        let mut s = String::from("pool:");
        for info in self.core.iter().chain(self.fp.iter()) {
            write!(s, " {}[", info.reg).ok();
            if let Some(v) = info.vreg {
                write!(s, "v{}", v.raw()).ok();
            }
            if info.live {
                s.push_str(" live");
            }
            if info.dirty {
                s.push_str(" dirty");
            }
            if info.in_use {
                s.push_str(" in_use");
            }
            if info.pair {
                write!(s, " pair:{}", info.partner).ok();
            }
            s.push(']');
        }
        s.push('\n');
        s
    }
}

/// Allocate a temp of `class`: round one takes a free temp holding no live value; round two
/// takes any free temp, flushing its value first if dirty. A pool with no free temp at all
/// means emission code leaked reservations, which is an internal error.
pub(crate) fn alloc_temp<A: Isa>(
    cg: &mut Cg<'_, A>,
    class: RegClass,
) -> Result<A::Reg, CompileError> {
    if let Some(r) = cg.pool.take_free(class, true) {
        return Ok(r);
    }
    if let Some(r) = cg.pool.take_free(class, false) {
        flush_reg(cg, r);
        cg.pool.clobber(r);
        return Ok(r);
    }
    Err(CompileError::Internal(format!(
        "out of {class:?} temp registers"
    )))
}

/// Pair flavour of [alloc_temp].
pub(crate) fn alloc_temp_pair<A: Isa>(
    cg: &mut Cg<'_, A>,
    class: RegClass,
) -> Result<(A::Reg, A::Reg), CompileError> {
    if let Some(p) = cg.pool.take_free_pair(class, true) {
        return Ok(p);
    }
    if let Some((lo, hi)) = cg.pool.take_free_pair(class, false) {
        flush_reg(cg, lo);
        cg.pool.clobber(lo);
        if hi != lo {
            flush_reg(cg, hi);
            cg.pool.clobber(hi);
        }
        return Ok((lo, hi));
    }
    Err(CompileError::Internal(format!(
        "out of {class:?} temp register pairs"
    )))
}

/// Write `r`'s value back to its vreg's frame slot if it is dirty. Pairs flush as one
/// double-word store through the low half.
pub(crate) fn flush_reg<A: Isa>(cg: &mut Cg<'_, A>, r: A::Reg) {
    if !(cg.pool.is_live(r) && cg.pool.is_dirty(r)) {
        return;
    }
    let v = match cg.pool.vreg_of(r) {
        Some(v) => v,
        None => return,
    };
    if cg.pool.is_pair(r) {
        let p = cg.pool.partner(r);
        let pv = match cg.pool.vreg_of(p) {
            Some(pv) => pv,
            None => return,
        };
        let (lo, lov, hi) = if v < pv { (r, v, p) } else { (p, pv, r) };
        let disp = cg.vreg_disp(lov);
        let idx = A::store_pair(cg, lo, hi, A::sp_reg(), disp);
        cg.lir.annotate_frame_ref(idx, lov);
        cg.pool.mark_clean(lo);
        cg.pool.mark_clean(hi);
    } else if cg.m.vreg_wide(v) {
        // A non-pair temp holding a wide value is a solo fp double.
        let disp = cg.vreg_disp(v);
        let idx = A::store_pair(cg, r, r, A::sp_reg(), disp);
        cg.lir.annotate_frame_ref(idx, v);
        cg.pool.mark_clean(r);
    } else {
        let disp = cg.vreg_disp(v);
        let idx = A::store_word(cg, r, A::sp_reg(), disp);
        cg.lir.annotate_frame_ref(idx, v);
        cg.pool.mark_clean(r);
    }
}

/// Write every dirty value back to the frame and forget all residency. Used where control
/// flow leaves the pool's view: branches, calls, slow-path forks.
pub(crate) fn flush_all_regs<A: Isa>(cg: &mut Cg<'_, A>) {
    for r in cg.pool.dirty_live() {
        flush_reg(cg, r);
    }
    cg.pool.clobber_all();
}

/// Refresh a narrow location copy against the pool. A frame-resident copy whose value
/// turns out to be live in a temp becomes register-resident; a live half-pair cannot be
/// used alone and is clobbered instead.
pub(crate) fn update_loc<A: Isa>(cg: &mut Cg<'_, A>, mut loc: RegLoc<A::Reg>) -> RegLoc<A::Reg> {
    debug_assert!(!loc.wide);
    if loc.kind == LocKind::Frame {
        let class = effective_class(RegClass::Any, loc.fp);
        if let Some(r) = cg.pool.live_reg_for(loc.vreg, class) {
            if cg.pool.is_pair(r) {
                let p = cg.pool.partner(r);
                cg.pool.clobber(p);
                cg.pool.clobber(r);
            } else {
                loc.kind = LocKind::Reg;
                loc.low = r;
            }
        }
    }
    loc
}

/// Wide flavour of [update_loc]: both halves must be live and linked as one pair, or on a
/// solo-fp target one fp temp holds the whole value. Stale lone halves are clobbered.
pub(crate) fn update_loc_wide<A: Isa>(
    cg: &mut Cg<'_, A>,
    mut loc: RegLoc<A::Reg>,
) -> RegLoc<A::Reg> {
    debug_assert!(loc.wide);
    if loc.kind != LocKind::Frame {
        return loc;
    }
    let class = effective_class(RegClass::Any, loc.fp);
    if cg.pool.fp_solo() && loc.fp {
        if let Some(r) = cg.pool.live_reg_for(loc.vreg, class) {
            loc.kind = LocKind::Reg;
            loc.low = r;
            loc.high = r;
        }
        return loc;
    }
    let lo = cg.pool.live_reg_for(loc.vreg, class);
    let hi = cg.pool.live_reg_for(loc.vreg.pair_hi(), class);
    match (lo, hi) {
        (Some(lo), Some(hi)) if cg.pool.is_pair(lo) && cg.pool.partner(lo) == hi => {
            loc.kind = LocKind::Reg;
            loc.low = lo;
            loc.high = hi;
        }
        (lo, hi) => {
            if let Some(r) = lo {
                cg.pool.clobber(r);
            }
            if let Some(r) = hi {
                cg.pool.clobber(r);
            }
        }
    }
    loc
}

/// Ensure `loc` has registers of `class` assigned, without loading anything. On return
/// `low`/`high` are valid and reserved; `kind` still says whether the frame holds the
/// current value. With `update` the location is committed as register-resident, for callers
/// about to overwrite the value.
pub(crate) fn eval_loc<A: Isa>(
    cg: &mut Cg<'_, A>,
    loc: RegLoc<A::Reg>,
    class: RegClass,
    update: bool,
) -> Result<RegLoc<A::Reg>, CompileError> {
    if loc.wide {
        return eval_loc_wide(cg, loc, class, update);
    }
    let mut loc = update_loc(cg, loc);
    if loc.kind == LocKind::Reg {
        if !class_matches(class, loc.low) {
            let r = alloc_temp(cg, effective_class(class, loc.fp))?;
            A::op_reg_copy(cg, r, loc.low);
            let was_live = cg.pool.is_live(loc.low);
            cg.pool.clobber(loc.low);
            if was_live && cg.promo.get(loc.vreg).is_none() {
                cg.pool.mark_live(r, loc.vreg);
            }
            loc.low = r;
        }
        cg.pool.mark_in_use(loc.low);
        return Ok(loc);
    }
    loc.low = alloc_temp(cg, effective_class(class, loc.fp))?;
    if update {
        loc.kind = LocKind::Reg;
        cg.pool.mark_live(loc.low, loc.vreg);
    }
    Ok(loc)
}

pub(crate) fn eval_loc_wide<A: Isa>(
    cg: &mut Cg<'_, A>,
    loc: RegLoc<A::Reg>,
    class: RegClass,
    update: bool,
) -> Result<RegLoc<A::Reg>, CompileError> {
    let mut loc = update_loc_wide(cg, loc);
    let solo = cg.pool.fp_solo() && loc.fp;
    if loc.kind == LocKind::Reg {
        if !class_matches(class, loc.low) {
            let (lo, hi) = alloc_temp_pair(cg, effective_class(class, loc.fp))?;
            A::op_reg_copy(cg, lo, loc.low);
            if hi != lo {
                A::op_reg_copy(cg, hi, loc.high);
            }
            cg.pool.clobber(loc.low);
            if loc.high != loc.low {
                cg.pool.clobber(loc.high);
            }
            loc.low = lo;
            loc.high = hi;
        }
        cg.pool.mark_in_use(loc.low);
        cg.pool.mark_in_use(loc.high);
        return Ok(loc);
    }
    let (lo, hi) = alloc_temp_pair(cg, effective_class(class, loc.fp))?;
    loc.low = lo;
    loc.high = hi;
    if update {
        loc.kind = LocKind::Reg;
        cg.pool.mark_live(loc.low, loc.vreg);
        if !solo {
            cg.pool.mark_live(loc.high, loc.vreg.pair_hi());
            cg.pool.mark_pair(loc.low, loc.high);
        }
    }
    Ok(loc)
}

/// Make `loc`'s value register-resident, loading from the frame only when no register
/// already holds it. Promoted values return their home register with no memory traffic.
pub(crate) fn load_value<A: Isa>(
    cg: &mut Cg<'_, A>,
    loc: RegLoc<A::Reg>,
    class: RegClass,
) -> Result<RegLoc<A::Reg>, CompileError> {
    let mut loc = eval_loc(cg, loc, class, false)?;
    if loc.kind == LocKind::Frame {
        let disp = cg.vreg_disp(loc.vreg);
        let idx = A::load_word(cg, loc.low, A::sp_reg(), disp);
        cg.lir.annotate_frame_ref(idx, loc.vreg);
        loc.kind = LocKind::Reg;
        cg.pool.mark_live(loc.low, loc.vreg);
    }
    Ok(loc)
}

pub(crate) fn load_value_wide<A: Isa>(
    cg: &mut Cg<'_, A>,
    loc: RegLoc<A::Reg>,
    class: RegClass,
) -> Result<RegLoc<A::Reg>, CompileError> {
    let mut loc = eval_loc(cg, loc, class, false)?;
    if loc.kind == LocKind::Frame {
        let disp = cg.vreg_disp(loc.vreg);
        let idx = A::load_pair(cg, loc.low, loc.high, A::sp_reg(), disp);
        cg.lir.annotate_frame_ref(idx, loc.vreg);
        loc.kind = LocKind::Reg;
        cg.pool.mark_live(loc.low, loc.vreg);
        if loc.high != loc.low {
            cg.pool.mark_live(loc.high, loc.vreg.pair_hi());
            cg.pool.mark_pair(loc.low, loc.high);
        }
    }
    Ok(loc)
}

/// Load `loc`'s value into a specific register, typically an argument register outside the
/// pool's control. The target's old association is forgotten first.
pub(crate) fn load_value_direct<A: Isa>(cg: &mut Cg<'_, A>, loc: RegLoc<A::Reg>, r: A::Reg) {
    let loc = update_loc(cg, loc);
    if loc.kind == LocKind::Reg {
        if loc.low != r {
            cg.pool.clobber(r);
            A::op_reg_copy(cg, r, loc.low);
        }
    } else {
        cg.pool.clobber(r);
        let disp = cg.vreg_disp(loc.vreg);
        let idx = A::load_word(cg, r, A::sp_reg(), disp);
        cg.lir.annotate_frame_ref(idx, loc.vreg);
    }
}

pub(crate) fn load_value_direct_wide<A: Isa>(
    cg: &mut Cg<'_, A>,
    loc: RegLoc<A::Reg>,
    lo: A::Reg,
    hi: A::Reg,
) {
    let loc = update_loc_wide(cg, loc);
    if loc.kind == LocKind::Reg {
        if loc.low != lo {
            cg.pool.clobber(lo);
            A::op_reg_copy(cg, lo, loc.low);
        }
        if hi != lo && loc.high != hi {
            cg.pool.clobber(hi);
            A::op_reg_copy(cg, hi, loc.high);
        }
    } else {
        cg.pool.clobber(lo);
        cg.pool.clobber(hi);
        let disp = cg.vreg_disp(loc.vreg);
        let idx = A::load_pair(cg, lo, hi, A::sp_reg(), disp);
        cg.lir.annotate_frame_ref(idx, loc.vreg);
    }
}

/// Associate a result with its destination vreg. When the result sits in a temp that holds
/// no other live value and the destination has no assigned register, the temp is adopted as
/// the destination outright; otherwise one register copy is emitted. Either way the
/// destination ends live and dirty, with no store emitted here: write-back is deferred to
/// the next flush point.
pub(crate) fn store_value<A: Isa>(
    cg: &mut Cg<'_, A>,
    dest: RegLoc<A::Reg>,
    src: RegLoc<A::Reg>,
) -> Result<RegLoc<A::Reg>, CompileError> {
    debug_assert!(!dest.wide && !src.wide);
    let src = update_loc(cg, src);
    let mut dest = update_loc(cg, dest);
    if src.kind == LocKind::Reg {
        if cg.pool.is_live(src.low) || !cg.pool.is_temp(src.low) || dest.kind == LocKind::Reg {
            dest = eval_loc(cg, dest, RegClass::Any, false)?;
            A::op_reg_copy(cg, dest.low, src.low);
        } else {
            cg.pool.clobber(src.low);
            dest.low = src.low;
            dest.kind = LocKind::Reg;
        }
    } else {
        dest = eval_loc(cg, dest, RegClass::Any, false)?;
        let disp = cg.vreg_disp(src.vreg);
        let idx = A::load_word(cg, dest.low, A::sp_reg(), disp);
        cg.lir.annotate_frame_ref(idx, src.vreg);
    }
    dest.kind = LocKind::Reg;
    cg.pool.mark_live(dest.low, dest.vreg);
    cg.pool.mark_dirty(dest.low);
    Ok(dest)
}

pub(crate) fn store_value_wide<A: Isa>(
    cg: &mut Cg<'_, A>,
    dest: RegLoc<A::Reg>,
    src: RegLoc<A::Reg>,
) -> Result<RegLoc<A::Reg>, CompileError> {
    debug_assert!(dest.wide && src.wide);
    let src = update_loc_wide(cg, src);
    let mut dest = update_loc_wide(cg, dest);
    let solo = cg.pool.fp_solo() && dest.fp;
    if src.kind == LocKind::Reg {
        if cg.pool.is_live(src.low) || !cg.pool.is_temp(src.low) || dest.kind == LocKind::Reg {
            dest = eval_loc(cg, dest, RegClass::Any, false)?;
            A::op_reg_copy(cg, dest.low, src.low);
            if dest.high != dest.low {
                A::op_reg_copy(cg, dest.high, src.high);
            }
        } else {
            cg.pool.clobber(src.low);
            if src.high != src.low {
                cg.pool.clobber(src.high);
            }
            dest.low = src.low;
            dest.high = src.high;
            dest.kind = LocKind::Reg;
        }
    } else {
        dest = eval_loc(cg, dest, RegClass::Any, false)?;
        let disp = cg.vreg_disp(src.vreg);
        let idx = A::load_pair(cg, dest.low, dest.high, A::sp_reg(), disp);
        cg.lir.annotate_frame_ref(idx, src.vreg);
    }
    dest.kind = LocKind::Reg;
    cg.pool.mark_live(dest.low, dest.vreg);
    cg.pool.mark_dirty(dest.low);
    if !solo && dest.high != dest.low {
        cg.pool.mark_live(dest.high, dest.vreg.pair_hi());
        cg.pool.mark_dirty(dest.high);
        cg.pool.mark_pair(dest.low, dest.high);
    }
    Ok(dest)
}

/// The vreg-to-register promotion decided before emission. Narrow vregs only; promoted
/// registers are callee-saved homes outside the temp pool.
pub(crate) struct PromotionMap<R> {
    raw: IndexVec<VReg, Option<R>>,
}

impl<R: RegT> PromotionMap<R> {
    /// Count MIR uses and hand the promotable registers to the hottest narrow vregs.
    /// Hinted vregs are served first, in vreg order, and bypass the use-count threshold.
    pub(crate) fn build(
        m: &Method,
        core: &'static [R],
        fp: &'static [R],
        tuning: &Tuning,
    ) -> Self {
        debug_assert!(core.iter().all(|r| !r.is_caller_saved()));
        debug_assert!(fp.iter().all(|r| !r.is_caller_saved()));
        let n = usize::from(m.num_vregs);
        let mut counts = vec![0u32; n];
        for block in m.blocks.iter() {
            for inst in &block.insts {
                inst.op.for_each_vreg(|v| {
                    counts[usize::from(v.raw())] += 1;
                });
            }
        }

        let promotable = |v: usize| {
            let v_idx = VReg::from_usize(v);
            if m.vreg_wide(v_idx) {
                return false;
            }
            // Not the high half of a wide pair either.
            if v > 0 && m.vreg_wide(VReg::from_usize(v - 1)) {
                return false;
            }
            true
        };

        let mut order: Vec<usize> = Vec::with_capacity(n);
        if let Some(hint) = &m.promote_hint {
            for v in 0..n {
                if hint.get(v).unwrap_or(false) && promotable(v) {
                    order.push(v);
                }
            }
        }
        let mut rest: Vec<usize> = (0..n)
            .filter(|&v| {
                promotable(v) && counts[v] >= tuning.promote_min_uses && !order.contains(&v)
            })
            .collect();
        rest.sort_by_key(|&v| (std::cmp::Reverse(counts[v]), v));
        order.extend(rest);

        let mut raw = IndexVec::from_vec(vec![None; n]);
        let mut next_core = 0;
        let mut next_fp = 0;
        for v in order {
            let v_idx = VReg::from_usize(v);
            if m.vreg_fp(v_idx) {
                if next_fp < fp.len() {
                    raw[v_idx] = Some(fp[next_fp]);
                    next_fp += 1;
                }
            } else if next_core < core.len() {
                raw[v_idx] = Some(core[next_core]);
                next_core += 1;
            }
        }
        Self { raw }
    }

    pub(crate) fn get(&self, v: VReg) -> Option<R> {
        self.raw[v]
    }

    pub(crate) fn iter_promoted(&self) -> impl Iterator<Item = (VReg, R)> + '_
    where
        R: Copy,
    {
        self.raw
            .iter_enumerated()
            .filter_map(|(v, r)| r.map(|r| (v, r)))
    }
}

/// Build the static locations table: every vreg starts frame-resident except promoted ones,
/// whose home registers are permanent.
///
/// `has_fp` is false on soft-float targets: their float values are plain words and must
/// never narrow a location to the (empty) fp class.
pub(crate) fn init_reg_locs<R: RegT>(
    m: &Method,
    promo: &PromotionMap<R>,
    has_fp: bool,
) -> IndexVec<VReg, RegLoc<R>> {
    let mut locs = IndexVec::with_capacity(usize::from(m.num_vregs));
    for v in 0..usize::from(m.num_vregs) {
        let v_idx = VReg::from_usize(v);
        let fp = has_fp && m.vreg_fp(v_idx);
        let loc = match promo.get(v_idx) {
            Some(r) => RegLoc {
                kind: LocKind::Reg,
                wide: false,
                fp,
                home: true,
                low: r,
                high: R::undefined(),
                vreg: v_idx,
            },
            None => RegLoc {
                kind: LocKind::Frame,
                wide: m.vreg_wide(v_idx),
                fp,
                home: false,
                low: R::undefined(),
                high: R::undefined(),
                vreg: v_idx,
            },
        };
        locs.push(loc);
    }
    locs
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mir::{BBlock, FpBinKind, MirInst, MirOp};
    use strum::{Display, EnumCount, FromRepr};
    use vob::Vob;

    // R0-R3/S0-S3 stand in for pool temps, R4/R5/S4 for promotable callee saves.
    #[derive(Copy, Clone, Debug, Display, EnumCount, FromRepr, PartialEq)]
    #[repr(u8)]
    enum TestReg {
        R0,
        R1,
        R2,
        R3,
        R4,
        R5,
        S0,
        S1,
        S2,
        S3,
        S4,
        UNDEF,
    }

    impl RegT for TestReg {
        fn undefined() -> Self {
            Self::UNDEF
        }

        fn mask_bit(&self) -> u8 {
            match self {
                Self::R0 => 0,
                Self::R1 => 1,
                Self::R2 => 2,
                Self::R3 => 3,
                Self::R4 => 4,
                Self::R5 => 5,
                Self::S0 => 16,
                Self::S1 => 17,
                Self::S2 => 18,
                Self::S3 => 19,
                Self::S4 => 20,
                Self::UNDEF => unreachable!(),
            }
        }

        fn is_fp(&self) -> bool {
            matches!(self, Self::S0 | Self::S1 | Self::S2 | Self::S3 | Self::S4)
        }

        fn is_caller_saved(&self) -> bool {
            !matches!(self, Self::R4 | Self::R5 | Self::S4)
        }
    }

    use TestReg::*;

    fn pool() -> RegPool<TestReg> {
        RegPool::new(&[R0, R1, R2, R3], &[S0, S1, S2, S3], false)
    }

    #[test]
    fn round_one_skips_live() {
        let mut p = pool();
        p.mark_live(R0, VReg::from_usize(0));
        let r = p.take_free(RegClass::Core, true).unwrap();
        assert_ne!(r, R0);
        assert!(p.is_in_use(r));
    }

    #[test]
    fn round_two_takes_live() {
        let mut p = pool();
        for (i, r) in [R0, R1, R2, R3].into_iter().enumerate() {
            p.mark_live(r, VReg::from_usize(i));
        }
        assert_eq!(p.take_free(RegClass::Core, true), None);
        assert!(p.take_free(RegClass::Core, false).is_some());
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut p = pool();
        for _ in 0..4 {
            assert!(p.take_free(RegClass::Core, false).is_some());
        }
        assert_eq!(p.take_free(RegClass::Core, false), None);
    }

    #[test]
    fn live_is_unique_per_vreg() {
        let mut p = pool();
        let v = VReg::from_usize(5);
        p.mark_live(R0, v);
        p.mark_dirty(R0);
        p.mark_live(R1, v);
        assert!(!p.is_live(R0));
        assert!(!p.is_dirty(R0));
        assert!(p.is_live(R1));
        assert_eq!(p.live_reg_for(v, RegClass::Core), Some(R1));
    }

    #[test]
    fn clobber_unlinks_pair() {
        let mut p = pool();
        p.mark_live(R0, VReg::from_usize(2));
        p.mark_live(R1, VReg::from_usize(3));
        p.mark_pair(R0, R1);
        assert!(p.is_pair(R1));
        p.clobber(R0);
        assert!(!p.is_pair(R1));
        assert!(p.is_live(R1));
        assert!(p.partner(R1).is_undefined());
    }

    #[test]
    fn free_temp_keeps_residency() {
        let mut p = pool();
        let r = p.take_free(RegClass::Core, true).unwrap();
        p.mark_live(r, VReg::from_usize(1));
        p.mark_dirty(r);
        p.free_temp(r);
        assert!(!p.is_in_use(r));
        assert!(p.is_live(r));
        assert!(p.is_dirty(r));
    }

    #[test]
    fn fp_pairs_are_even_odd_adjacent() {
        let mut p = pool();
        let (lo, hi) = p.take_free_pair(RegClass::Fp, true).unwrap();
        assert_eq!(lo.mask_bit() % 2, 0);
        assert_eq!(hi.mask_bit(), lo.mask_bit() + 1);
        let (lo2, hi2) = p.take_free_pair(RegClass::Fp, true).unwrap();
        assert_ne!((lo, hi), (lo2, hi2));
        assert_eq!(p.take_free_pair(RegClass::Fp, true), None);
    }

    #[test]
    fn solo_fp_pair_is_one_reg() {
        let mut p = RegPool::new(&[R0, R1], &[S0, S1], true);
        let (lo, hi) = p.take_free_pair(RegClass::Fp, true).unwrap();
        assert_eq!(lo, hi);
    }

    #[test]
    fn class_filtering() {
        let mut p = pool();
        let v = VReg::from_usize(7);
        p.mark_live(S1, v);
        assert_eq!(p.live_reg_for(v, RegClass::Core), None);
        assert_eq!(p.live_reg_for(v, RegClass::Fp), Some(S1));
        assert_eq!(p.live_reg_for(v, RegClass::Any), Some(S1));
    }

    #[test]
    fn dirty_live_lists_both_classes() {
        let mut p = pool();
        p.mark_live(R2, VReg::from_usize(0));
        p.mark_dirty(R2);
        p.mark_live(S0, VReg::from_usize(1));
        p.mark_dirty(S0);
        p.mark_live(R3, VReg::from_usize(2));
        let d = p.dirty_live();
        assert_eq!(d.len(), 2);
        assert!(d.contains(&R2) && d.contains(&S0));
    }

    // Promotion candidates are tested against a hand-built method: v0 hot, v1 hinted but
    // cold, v2/v3 a wide pair, v4 hot fp.
    fn promo_method() -> Method {
        let v0 = VReg::from_usize(0);
        let v4 = VReg::from_usize(4);
        let mut insts = Vec::new();
        for _ in 0..3 {
            insts.push(MirInst::new(MirOp::Move { dst: v0, src: v0 }, 0));
        }
        insts.push(MirInst::new(
            MirOp::FpBinOp {
                op: FpBinKind::Add,
                dst: v4,
                lhs: v4,
                rhs: v4,
            },
            0,
        ));
        insts.push(MirInst::new(MirOp::Return, 0));
        let mut blocks = IndexVec::new();
        blocks.push(BBlock::new(insts));
        let mut m = Method::new("promo", 5, 0, blocks);
        m.wide_vregs.set(2, true);
        m.fp_vregs.set(4, true);
        let mut hint = Vob::from_elem(false, 5);
        hint.set(1, true);
        m.promote_hint = Some(hint);
        m
    }

    #[test]
    fn promotion_prefers_hint_then_count() {
        let m = promo_method();
        let promo = PromotionMap::build(&m, &[R4, R5], &[S4], &Tuning::default());
        // Hinted v1 takes the first promotable core reg, hot v0 the second.
        assert_eq!(promo.get(VReg::from_usize(1)), Some(R4));
        assert_eq!(promo.get(VReg::from_usize(0)), Some(R5));
        // The wide pair stays in the frame.
        assert_eq!(promo.get(VReg::from_usize(2)), None);
        assert_eq!(promo.get(VReg::from_usize(3)), None);
        // The fp vreg gets an fp home.
        assert_eq!(promo.get(VReg::from_usize(4)), Some(S4));
    }

    #[test]
    fn init_locs_mark_homes() {
        let m = promo_method();
        let promo = PromotionMap::build(&m, &[R4], &[], &Tuning::default());
        let locs = init_reg_locs(&m, &promo, true);
        let l1 = locs[VReg::from_usize(1)];
        assert_eq!(l1.kind, LocKind::Reg);
        assert!(l1.home);
        assert_eq!(l1.low, R4);
        let l2 = locs[VReg::from_usize(2)];
        assert_eq!(l2.kind, LocKind::Frame);
        assert!(l2.wide);
        assert!(l2.low.is_undefined());
        assert!(locs[VReg::from_usize(4)].fp);
    }

    #[test]
    fn soft_float_locations_stay_core() {
        let m = promo_method();
        let promo = PromotionMap::build(&m, &[R4], &[], &Tuning::default());
        let locs = init_reg_locs(&m, &promo, false);
        // The float vreg is an ordinary word on a target without fp registers.
        assert!(!locs[VReg::from_usize(4)].fp);
    }
}
