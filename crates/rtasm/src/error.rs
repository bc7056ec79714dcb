//! Error types for instruction emission and function finalization.

use alloc::string::String;
#[allow(unused_imports)]
use alloc::format;
use core::fmt;

/// Emission or finalization error.
///
/// Every variant is recoverable: the embedding system is expected to fall
/// back to a generic code path rather than abort. Failures are
/// deterministic for a given sequence of emission calls.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AsmError {
    /// Operand-class or addressing-role misuse, or a broken fixup/stack
    /// discipline. Nothing was written for the failing call.
    ContractViolation {
        /// What was violated.
        detail: String,
    },

    /// The instruction does not fit into the remaining buffer capacity.
    CapacityExceeded {
        /// Bytes the instruction needs.
        needed: usize,
        /// Bytes still free in the buffer.
        available: usize,
    },

    /// A relative branch offset does not fit the long branch form.
    BranchOutOfRange {
        /// The displacement that was computed.
        disp: i64,
        /// Largest magnitude the encoding can hold.
        max: i64,
    },

    /// The platform refused to map or protect executable memory.
    ExecutableMemory {
        /// Operating-system error description.
        detail: String,
    },
}

impl AsmError {
    /// Build a [`AsmError::ContractViolation`] from a message.
    pub(crate) fn contract(detail: impl Into<String>) -> Self {
        AsmError::ContractViolation {
            detail: detail.into(),
        }
    }

    /// Whether this error is a contract violation (as opposed to a resource
    /// or platform failure).
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, AsmError::ContractViolation { .. })
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmError::ContractViolation { detail } => {
                write!(f, "contract violation: {}", detail)
            }
            AsmError::CapacityExceeded { needed, available } => {
                write!(
                    f,
                    "buffer capacity exceeded: instruction needs {} bytes, {} available",
                    needed, available
                )
            }
            AsmError::BranchOutOfRange { disp, max } => {
                write!(
                    f,
                    "branch displacement {} out of range (max=±{})",
                    disp, max
                )
            }
            AsmError::ExecutableMemory { detail } => {
                write!(f, "executable memory: {}", detail)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AsmError {}
