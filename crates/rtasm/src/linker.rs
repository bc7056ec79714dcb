//! Label resolution, branch sizing, and forward-branch patching.
//!
//! Backward branches know their target when emitted and take the short
//! form whenever the displacement fits a signed byte. Forward branches are
//! always emitted in the long form with a zero placeholder and patched once
//! their target is emitted.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::encoder::InstrBytes;
use crate::error::AsmError;
use crate::ir::Cond;
use crate::x86;

/// A resolved branch target: the buffer offset of already-emitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Label(usize);

impl Label {
    pub(crate) fn new(offset: usize) -> Self {
        Label(offset)
    }

    /// Buffer offset of the target.
    #[must_use]
    pub fn offset(self) -> usize {
        self.0
    }
}

/// Token for a pending forward branch.
///
/// Holds the buffer offset just past the branch and the identity of the
/// emission pass that opened it. The token is consumed when the branch is
/// resolved, so a second resolution does not compile. A token from another
/// assembler, or from before a [`crate::Assembler::reset`], is rejected at
/// run time.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "a forward branch must be resolved before the buffer is finalized"]
pub struct Fixup {
    end: usize,
    owner: usize,
}

impl Fixup {
    /// Buffer offset immediately after the branch instruction.
    #[must_use]
    pub fn end(&self) -> usize {
        self.end
    }
}

/// Source of emission-pass identities.
static NEXT_OWNER: AtomicUsize = AtomicUsize::new(1);

/// A forward branch patched by [`crate::Assembler::fixup_forward`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AppliedFixup {
    /// Offset of the 4-byte displacement field.
    pub offset: usize,
    /// Buffer offset the branch lands on.
    pub target: usize,
}

/// Branch family being encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BranchKind {
    /// Conditional jump: `70+cc rel8` / `0F 80+cc rel32`.
    Jcc(Cond),
    /// Unconditional jump: `EB rel8` / `E9 rel32`.
    Jmp,
}

impl BranchKind {
    const SHORT_LEN: usize = 2;

    fn long_len(self) -> usize {
        match self {
            BranchKind::Jcc(_) => 6,
            BranchKind::Jmp => 5,
        }
    }

    fn short_opcode(self) -> u8 {
        match self {
            BranchKind::Jcc(cc) => x86::JCC_SHORT + cc.code(),
            BranchKind::Jmp => x86::JMP_SHORT,
        }
    }

    fn long_opcode(self, buf: &mut InstrBytes) {
        match self {
            BranchKind::Jcc(cc) => {
                buf.push(x86::JCC_NEAR[0]);
                buf.push(x86::JCC_NEAR[1] + cc.code());
            }
            BranchKind::Jmp => buf.push(x86::JMP_NEAR),
        }
    }
}

/// Displacement from `from` (end of a branch) to `target`, checked against
/// the rel32 range.
fn rel32(from: usize, target: usize) -> Result<i32, AsmError> {
    let disp = target as i64 - from as i64;
    i32::try_from(disp).map_err(|_| AsmError::BranchOutOfRange {
        disp,
        max: i64::from(i32::MAX),
    })
}

/// Encode a branch from `pos` back to an already-emitted `target`.
///
/// The short form is chosen when the displacement, measured from the end of
/// the 2-byte instruction, fits in `-128..=127`; otherwise the displacement
/// is recomputed against the long form's length.
pub(crate) fn encode_backward(
    kind: BranchKind,
    pos: usize,
    target: Label,
) -> Result<InstrBytes, AsmError> {
    if target.offset() > pos {
        return Err(AsmError::contract(alloc::format!(
            "label at {} is past the cursor at {}; use a forward branch",
            target.offset(),
            pos
        )));
    }
    let mut buf = InstrBytes::new();
    let short = target.offset() as i64 - (pos + BranchKind::SHORT_LEN) as i64;
    if let Ok(disp) = i8::try_from(short) {
        tracing::trace!(pos, target = target.offset(), disp, "short branch");
        buf.push(kind.short_opcode());
        buf.push(disp as u8);
    } else {
        let disp = rel32(pos + kind.long_len(), target.offset())?;
        tracing::trace!(pos, target = target.offset(), disp, "long branch");
        kind.long_opcode(&mut buf);
        buf.extend_from_slice(&disp.to_le_bytes());
    }
    Ok(buf)
}

/// Encode a forward branch: long form with a zero displacement.
pub(crate) fn encode_forward(kind: BranchKind) -> InstrBytes {
    let mut buf = InstrBytes::new();
    kind.long_opcode(&mut buf);
    buf.extend_from_slice(&0i32.to_le_bytes());
    buf
}

/// Outstanding forward branches and the furthest branch target seen.
///
/// Each linker carries a process-unique `owner`; fixups it hands out are
/// only accepted back by the same linker.
#[derive(Debug)]
pub(crate) struct Linker {
    owner: usize,
    pending: BTreeSet<usize>,
    applied: Vec<AppliedFixup>,
    max_target: Option<usize>,
}

impl Linker {
    pub fn new() -> Self {
        Self {
            owner: NEXT_OWNER.fetch_add(1, Ordering::Relaxed),
            pending: BTreeSet::new(),
            applied: Vec::new(),
            max_target: None,
        }
    }

    /// Register a forward branch ending at `end`.
    pub fn open(&mut self, end: usize) -> Fixup {
        self.pending.insert(end);
        Fixup {
            end,
            owner: self.owner,
        }
    }

    /// Record a branch target so finalization can check it lies inside the
    /// emitted code.
    pub fn note_target(&mut self, target: usize) {
        self.max_target = Some(self.max_target.map_or(target, |t| t.max(target)));
    }

    /// Patch `fixup` so it lands on `target`.
    ///
    /// The displacement is `target - fixup.end()`, written little-endian
    /// into the four bytes ending at `fixup.end()`.
    pub fn resolve(&mut self, code: &mut [u8], fixup: Fixup, target: usize) -> Result<(), AsmError> {
        let end = fixup.end();
        if fixup.owner != self.owner || !self.pending.contains(&end) {
            return Err(AsmError::contract(alloc::format!(
                "fixup at {} is not an outstanding forward branch of this buffer",
                end
            )));
        }
        let disp = rel32(end, target)?;
        self.pending.remove(&end);
        code[end - 4..end].copy_from_slice(&disp.to_le_bytes());
        tracing::trace!(fixup = end, target, disp, "patched forward branch");
        self.note_target(target);
        self.applied.push(AppliedFixup {
            offset: end - 4,
            target,
        });
        Ok(())
    }

    /// Number of forward branches not yet resolved.
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    pub fn max_target(&self) -> Option<usize> {
        self.max_target
    }

    pub fn into_applied(self) -> Vec<AppliedFixup> {
        self.applied
    }
}
