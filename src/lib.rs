//! dexgen: the backend of a method compiler.
//!
//! This crate lowers a method's bytecode-derived MIR (see [mir]) to machine
//! code for one of several register architectures. At a high-level it has
//! three main passes:
//!
//! 1. Walk the MIR, allocating temporary registers as it goes, and emit a
//!    machine-independent LIR stream annotated with per-instruction resource
//!    masks ([codegen::mir_to_lir], [codegen::regalloc]).
//! 2. Schedule the deferred slow paths and run local, mask-driven
//!    optimisations over the LIR ([codegen::launchpad], [codegen::local_opt]).
//! 3. Assign offsets and encode, retrying with widened encodings until the
//!    layout converges ([codegen::asm]).
//!
//! The architecture-specific parts live behind the [codegen::Isa] trait;
//! everything else is target independent.

pub mod codegen;
pub(crate) mod log;
pub mod mir;
pub(crate) mod stats;

pub use codegen::{
    Codegen, CompileError, CompiledMethod, MapEntry, PatchKind, PatchRecord, PatchSite, Target,
    Tuning,
};
