//! Macro expansion into builtin submodule instructions.
//!
//! Expanders run when the macro is invoked, after its arguments have been
//! validated; the assembler only encodes the resulting builtin ops.

pub mod gemv;
pub mod vv;

pub use gemv::{GemvMacro, GEMV_SYNC_NOPS};
pub use vv::{VvMacro, VV_SYNC_NOPS};

use crate::error::{AsmError, Result};

/// Narrows an already validated operand to its op field.
pub(crate) fn narrow<T: TryFrom<u32>>(v: u32, width: u8) -> Result<T> {
    T::try_from(v).map_err(|_| AsmError::FieldOverflow { value: v.into(), width })
}
