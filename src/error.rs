#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("invalid assembler parameters: {0}")]
    Config(String),
    #[error("invalid {kind} register: {reg} (valid range 0..{count})")]
    Register { kind: &'static str, reg: i64, count: u32 },
    #[error("invalid {what}: {value}, range ({min}, {max})")]
    OutOfRange { what: &'static str, value: i64, min: i64, max: i64 },
    #[error("{what} cannot overlap with dest registers ({lo}, {hi})")]
    Overlap { what: &'static str, lo: u32, hi: u32 },
    #[error("register combination not valid: {0}")]
    RegisterCombination(String),
    #[error("{op} requires at least {need} reserved registers ({have} configured); adjust the assembler parameters")]
    ReservedRegisters { op: &'static str, need: u32, have: u32 },
    #[error("column count {count} is not one of {valid:?}")]
    ColumnCount { count: u32, valid: Vec<u32> },
    #[error("{what} ({len}) of the given data is too big (>{max})")]
    Shape { what: &'static str, len: usize, max: u32 },
    #[error("value {value} cannot be converted to a {width}-bit fixed-point register value")]
    FixedPoint { value: String, width: u32 },
    #[error("value {value:#x} does not fit in a {width}-bit field")]
    FieldOverflow { value: u64, width: u8 },
    #[error("cannot decode {submodule} word {word:#010x}")]
    Decode { submodule: &'static str, word: u32 },
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("{path}: {reason}")]
    Io { path: String, reason: String },
}

pub type Result<T> = std::result::Result<T, AsmError>;

impl AsmError {
    pub(crate) fn range(what: &'static str, value: impl Into<i64>, min: impl Into<i64>, max: impl Into<i64>) -> Self {
        AsmError::OutOfRange { what, value: value.into(), min: min.into(), max: max.into() }
    }

    /// Reads a whole text file, keeping the path in the error.
    pub(crate) fn read_file(path: &std::path::Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| AsmError::Io { path: path.display().to_string(), reason: e.to_string() })
    }
}
