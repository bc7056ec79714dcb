//! # rtasm - Runtime IA-32 Machine-Code Emitter
//!
//! `rtasm` emits x86 machine code for a small general-purpose and SSE/MMX
//! instruction subset straight into a memory buffer, one instruction per
//! call. It is meant for code generators that build a short function at run
//! time (a shader, a vertex fetch routine) and call it immediately.
//!
//! ## Quick Start
//!
//! ```rust
//! use rtasm::{Assembler, Cond, Gpr, X86Mode};
//!
//! let mut asm = Assembler::new(X86Mode::Mode32);
//! asm.mov(Gpr::Eax, asm.argument(1)?)?;
//! asm.test(Gpr::Eax, Gpr::Eax)?;
//! let skip = asm.jcc_forward(Cond::E)?;
//! asm.dec(Gpr::Eax)?;
//! asm.fixup_forward(skip)?;
//! asm.ret()?;
//!
//! let code = asm.finish()?.into_bytes();
//! assert_eq!(
//!     code,
//!     [0x8B, 0x44, 0x24, 0x04, 0x85, 0xC0, 0x0F, 0x84, 0x01, 0x00, 0x00, 0x00, 0x48, 0xC3]
//! );
//! # Ok::<(), rtasm::AsmError>(())
//! ```
//!
//! ## Features
//!
//! - **Single pass**: every call appends one complete instruction; forward
//!   branches are patched in place.
//! - **Checked buffer**: a full buffer reports [`AsmError::CapacityExceeded`]
//!   and writes nothing.
//! - **Callable output**: with `std`, [`Assembler::finalize`] maps the code
//!   read-execute and hands back a [`Function`].
//! - **`no_std` + `alloc`**: without `std`, only byte emission is available.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
// ── Pedantic lint policy ─────────────────────────────────────────────────
// Encoding narrows and reinterprets integers constantly (i32→i8→u8 for
// displacements, usize→i64 for branch distances) and writes opcodes as
// dense hex literals.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap,
    clippy::unreadable_literal,
    clippy::match_same_arms,
    clippy::redundant_closure_for_method_calls,
    clippy::wildcard_imports,
    clippy::enum_glob_use,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args,
    clippy::doc_markdown,
    clippy::similar_names,
    clippy::too_many_lines,
    clippy::return_self_not_must_use,
    clippy::missing_errors_doc
)]

extern crate alloc;

/// Public assembler API: the emission builder and `AssemblyResult`.
pub mod assembler;
/// Instruction encoder (ModR/M, SIB, displacement, opcode forms).
pub mod encoder;
/// Error types.
pub mod error;
/// Executable memory and callable functions.
#[cfg(feature = "std")]
pub mod exec;
/// Operand model: registers, memory operands, conditions.
pub mod ir;
/// Labels, branch sizing, and forward-branch patching.
pub mod linker;
pub(crate) mod x86;

// Re-exports
pub use assembler::{Assembler, AssemblyResult, DEFAULT_CAPACITY};
pub use encoder::{encode_addressing_byte, encode_dual_opcode, InstrBytes};
pub use error::AsmError;
#[cfg(feature = "std")]
pub use exec::{Entry, Function};
pub use ir::{
    shuffle, CmpPredicate, Cond, DispMode, Gpr, MemoryOperand, Mmx, Operand, PrefetchHint,
    RegClass, Register, St, X86Mode, Xmm,
};
pub use linker::{AppliedFixup, Fixup, Label};
