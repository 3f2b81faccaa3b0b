pub mod bitfield;
pub mod decoder;
pub mod disasm;
pub mod error;
pub mod expand;
pub mod export;
pub mod fixed;
pub mod params;
pub mod program;
pub mod script;
pub mod sim;
pub mod transpose;

pub mod isa {
    pub mod picaso; // PiCaSO GEMV block array
    pub mod vvengine; // vector-vector engine
}

pub use error::{AsmError, Result};
pub use export::{ExportOptions, C_HEADER, C_HEADER_NAME};
pub use isa::vvengine::{Register, ACT, O, S};
pub use params::{AsmParams, Config};
pub use program::{DavinciAsm, Instruction, InstrKind, Submodule};
pub use script::{Call, Script, Step};
