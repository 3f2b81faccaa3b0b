//! Top-level DA-VinCi program assembler.
//!
//! Word format: `[submodule code:2] [submodule instruction:30]`.
//!
//! Mnemonic methods validate their arguments, then append one or more
//! records to the program; macros are expanded at that point. A failed call
//! appends nothing. [`DavinciAsm::assemble`] encodes the records into words.

use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bitfield::{pack, Segment, SubWord};
use crate::disasm::{fmt_gemv_macro, fmt_picaso, fmt_vv, fmt_vv_macro};
use crate::error::{AsmError, Result};
use crate::expand::{narrow, GemvMacro, VvMacro};
use crate::isa::picaso::{PicasoAsm, PicasoOp, REG_FIELD_WIDTH};
use crate::isa::vvengine::{Register, VvAsm, VvOp};
use crate::params::{ceil_log2, AsmParams, Config};

pub const SUBMODULE_CODE_WIDTH: u32 = 2;
pub const PAYLOAD_WIDTH: u32 = 30;
pub const WORD_WIDTH: u32 = SUBMODULE_CODE_WIDTH + PAYLOAD_WIDTH;
pub const GEMV_CODE: u32 = 0;
pub const VV_CODE: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Submodule {
    Gemv,
    Vv,
    /// The assembler itself; its records produce no words.
    Pseudo,
}

impl Submodule {
    pub fn code(self) -> Option<u32> {
        match self {
            Submodule::Gemv => Some(GEMV_CODE),
            Submodule::Vv => Some(VV_CODE),
            Submodule::Pseudo => None,
        }
    }
}

/// What a record holds. Macro records keep the builtin ops they expanded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrKind {
    Gemv(PicasoOp),
    Vv(VvOp),
    GemvMacro { mac: GemvMacro, expansion: Vec<PicasoOp> },
    VvMacro { mac: VvMacro, expansion: Vec<VvOp> },
    Comment,
}

impl InstrKind {
    pub fn submodule(&self) -> Submodule {
        match self {
            InstrKind::Gemv(_) | InstrKind::GemvMacro { .. } => Submodule::Gemv,
            InstrKind::Vv(_) | InstrKind::VvMacro { .. } => Submodule::Vv,
            InstrKind::Comment => Submodule::Pseudo,
        }
    }

    pub fn is_macro(&self) -> bool {
        matches!(self, InstrKind::GemvMacro { .. } | InstrKind::VvMacro { .. })
    }

    fn encode(&self) -> Result<Assembly> {
        let subm_code = self.submodule().code().unwrap_or_default();
        Ok(match self {
            InstrKind::Gemv(op) => Assembly::Builtin { subm_code, word: op.encode()? },
            InstrKind::Vv(op) => Assembly::Builtin { subm_code, word: op.encode()? },
            InstrKind::GemvMacro { expansion, .. } => Assembly::Macro {
                subm_code,
                words: expansion.iter().map(PicasoOp::encode).collect::<Result<_>>()?,
            },
            InstrKind::VvMacro { expansion, .. } => Assembly::Macro {
                subm_code,
                words: expansion.iter().map(VvOp::encode).collect::<Result<_>>()?,
            },
            InstrKind::Comment => Assembly::Pseudo,
        })
    }
}

/// Machine code of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Assembly {
    Builtin { subm_code: u32, word: SubWord },
    Macro { subm_code: u32, words: Vec<SubWord> },
    Pseudo,
}

impl Assembly {
    /// Full-word segments (submodule code first) of every word, in order.
    pub fn segments(&self) -> Vec<[Segment; 4]> {
        let full = |code: u32, w: &SubWord| [Segment { value: code, width: SUBMODULE_CODE_WIDTH as u8 }, w[0], w[1], w[2]];
        match self {
            Assembly::Builtin { subm_code, word } => vec![full(*subm_code, word)],
            Assembly::Macro { subm_code, words } => words.iter().map(|w| full(*subm_code, w)).collect(),
            Assembly::Pseudo => Vec::new(),
        }
    }

    /// Packed 32-bit words, in order.
    pub fn words(&self) -> Vec<u32> {
        self.segments().iter().map(|s| pack(s) as u32).collect()
    }
}

/// One record of the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    kind: InstrKind,
    comment: Option<String>,
    src: String,
    assembly: Option<Assembly>,
}

impl Instruction {
    pub fn kind(&self) -> &InstrKind {
        &self.kind
    }

    pub fn submodule(&self) -> Submodule {
        self.kind.submodule()
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Mnemonic text of the call that produced the record.
    pub fn src(&self) -> &str {
        &self.src
    }

    /// `None` until the program is assembled.
    pub fn assembly(&self) -> Option<&Assembly> {
        self.assembly.as_ref()
    }
}

/// A program-build session: configuration, the two submodule assemblers and
/// the ordered record list.
#[derive(Debug, Clone)]
pub struct DavinciAsm {
    cfg: Config,
    picaso: PicasoAsm,
    vv: VvAsm,
    instructions: Vec<Instruction>,
    is_assembled: bool,
    note: Option<String>,
}

impl Default for DavinciAsm {
    fn default() -> Self {
        Self::with_config(Config::default())
    }
}

impl DavinciAsm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(cfg: Config) -> Self {
        Self {
            picaso: PicasoAsm::new(cfg.picaso),
            vv: VvAsm::new(cfg.vv),
            cfg,
            instructions: Vec::new(),
            is_assembled: false,
            note: None,
        }
    }

    pub fn with_params(params: &AsmParams) -> Result<Self> {
        Ok(Self::with_config(params.validate()?))
    }

    /// Replaces the parameters. Only allowed on an empty program, since
    /// emitted records were validated against the old ones.
    pub fn setup(&mut self, params: &AsmParams) -> Result<()> {
        if !self.instructions.is_empty() {
            return Err(AsmError::Config("parameters cannot change once instructions are emitted; reset() first".into()));
        }
        *self = Self::with_config(params.validate()?);
        Ok(())
    }

    /// Drops all records, keeping the parameters.
    pub fn reset(&mut self) {
        self.instructions.clear();
        self.is_assembled = false;
        self.note = None;
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn is_assembled(&self) -> bool {
        self.is_assembled
    }

    /// Attaches `text` as the user comment of the records produced by the next call.
    pub fn note(&mut self, text: impl Into<String>) -> &mut Self {
        self.note = Some(text.into());
        self
    }

    /// Encodes every record not yet encoded.
    pub fn assemble(&mut self) -> Result<()> {
        debug!("encoding instructions");
        for instr in self.instructions.iter_mut().filter(|i| i.assembly.is_none()) {
            debug!(src = %instr.src, "encode");
            instr.assembly = Some(instr.kind.encode()?);
        }
        info!("{} instructions assembled", self.instructions.len());
        self.is_assembled = true;
        Ok(())
    }

    /// The program as 32-bit words, assembling first if needed.
    pub fn words(&mut self) -> Result<Vec<u32>> {
        if !self.is_assembled {
            self.assemble()?;
        }
        Ok(self
            .instructions
            .iter()
            .filter_map(Instruction::assembly)
            .flat_map(Assembly::words)
            .collect())
    }

    fn push(&mut self, kind: InstrKind, src: String, comment: Option<String>) -> &Instruction {
        self.instructions.push(Instruction { kind, comment, src, assembly: None });
        self.is_assembled = false;
        &self.instructions[self.instructions.len() - 1]
    }

    fn push_all(&mut self, records: Vec<(InstrKind, String, Option<String>)>) -> &[Instruction] {
        let start = self.instructions.len();
        for (kind, src, comment) in records {
            self.push(kind, src, comment);
        }
        &self.instructions[start..]
    }

    fn gemv(&mut self, op: Result<PicasoOp>) -> Result<&Instruction> {
        let comment = self.note.take();
        let op = op?;
        Ok(self.push(InstrKind::Gemv(op), format!("MV_{}", fmt_picaso(&op)), comment))
    }

    fn vv(&mut self, op: Result<VvOp>) -> Result<&Instruction> {
        let comment = self.note.take();
        let op = op?;
        Ok(self.push(InstrKind::Vv(op), format!("VV_{}", fmt_vv(&op)), comment))
    }

    fn gemv_macro_record(&self, mac: GemvMacro, comment: Option<String>) -> Result<(InstrKind, String, Option<String>)> {
        let expansion = mac.expand(&self.cfg.picaso)?;
        let src = fmt_gemv_macro(&mac);
        Ok((InstrKind::GemvMacro { mac, expansion }, src, comment))
    }

    fn vv_macro_record(&self, mac: VvMacro, comment: Option<String>) -> Result<(InstrKind, String, Option<String>)> {
        let expansion = mac.expand(&self.cfg.vv)?;
        let src = fmt_vv_macro(&mac);
        Ok((InstrKind::VvMacro { mac, expansion }, src, comment))
    }

    fn gemv_macro(&mut self, mac: Result<GemvMacro>) -> Result<&Instruction> {
        let comment = self.note.take();
        let (kind, src, comment) = self.gemv_macro_record(mac?, comment)?;
        Ok(self.push(kind, src, comment))
    }

    fn vv_macro(&mut self, mac: Result<VvMacro>) -> Result<&Instruction> {
        let comment = self.note.take();
        let (kind, src, comment) = self.vv_macro_record(mac?, comment)?;
        Ok(self.push(kind, src, comment))
    }

    // ---- GEMV (PiCaSO) builtins

    pub fn mv_nop(&mut self) -> Result<&Instruction> {
        let op = self.picaso.nop();
        self.gemv(Ok(op))
    }

    pub fn mv_write(&mut self, addr: u32, data: u32) -> Result<&Instruction> {
        let op = self.picaso.write(addr, data);
        self.gemv(op)
    }

    pub fn mv_add(&mut self, rd: u32, rs1: u32, rs2: u32) -> Result<&Instruction> {
        let op = self.picaso.add(rd, rs1, rs2);
        self.gemv(op)
    }

    pub fn mv_sub(&mut self, rd: u32, rs1: u32, rs2: u32) -> Result<&Instruction> {
        let op = self.picaso.sub(rd, rs1, rs2);
        self.gemv(op)
    }

    pub fn mv_updatepp(&mut self, pp_reg: u32, multiplicand: u32, multiplier: u32, bit_no: u32) -> Result<&Instruction> {
        let op = self.picaso.updatepp(pp_reg, multiplicand, multiplier, bit_no);
        self.gemv(op)
    }

    /// Single accum_blk step; see [`mv_block_accum`](Self::mv_block_accum) for the full fold sequence.
    pub fn mv_block_fold(&mut self, fold: u32, rd: u32, rs: u32) -> Result<&Instruction> {
        let op = self.picaso.accum_blk(fold, rd, rs);
        self.gemv(op)
    }

    pub fn mv_accum_row(&mut self, level: u32, reg: u32) -> Result<&Instruction> {
        let op = self.picaso.accum_row(level, reg);
        self.gemv(op)
    }

    pub fn mv_select_block(&mut self, row_id: u32, col_id: u32) -> Result<&Instruction> {
        let op = self.picaso.select_block(row_id, col_id);
        self.gemv(op)
    }

    pub fn mv_select_row(&mut self, row_id: u32) -> Result<&Instruction> {
        let op = self.picaso.select_row(row_id);
        self.gemv(op)
    }

    pub fn mv_select_col(&mut self, col_id: u32) -> Result<&Instruction> {
        let op = self.picaso.select_col(col_id);
        self.gemv(op)
    }

    pub fn mv_select_all(&mut self) -> Result<&Instruction> {
        let op = self.picaso.select_all();
        self.gemv(Ok(op))
    }

    pub fn mv_mov(&mut self, rd: u32, rs: u32) -> Result<&Instruction> {
        let op = self.picaso.mov(rd, rs);
        self.gemv(op)
    }

    pub fn mv_mov_offset(&mut self, offset: u32, rd: u32, rs: u32) -> Result<&Instruction> {
        let op = self.picaso.mov_offset(offset, rd, rs);
        self.gemv(op)
    }

    // ---- VV-Engine builtins

    pub fn vv_nop(&mut self) -> Result<&Instruction> {
        let op = self.vv.nop();
        self.vv(Ok(op))
    }

    pub fn vv_write(&mut self, addr: u32, data: i32) -> Result<&Instruction> {
        let op = self.vv.write(addr, data);
        self.vv(op)
    }

    pub fn vv_mov(&mut self, rd: Register, rs: Register) -> Result<&Instruction> {
        let op = self.vv.mov(rd, rs);
        self.vv(op)
    }

    pub fn vv_add(&mut self, opl: Register, opr: Register) -> Result<&Instruction> {
        let op = self.vv.add(opl, opr);
        self.vv(op)
    }

    pub fn vv_sub(&mut self, opl: Register, opr: Register) -> Result<&Instruction> {
        let op = self.vv.sub(opl, opr);
        self.vv(op)
    }

    pub fn vv_mult(&mut self, opl: Register, opr: Register) -> Result<&Instruction> {
        let op = self.vv.mult(opl, opr);
        self.vv(op)
    }

    /// RELU for code 0, table lookup otherwise.
    pub fn vv_activation(&mut self, code: u32) -> Result<&Instruction> {
        let op = self.vv.activation(code);
        self.vv(op)
    }

    pub fn vv_shift_off(&mut self) -> Result<&Instruction> {
        let op = self.vv.shift_off();
        self.vv(Ok(op))
    }

    pub fn vv_serial_en(&mut self) -> Result<&Instruction> {
        let op = self.vv.serial_en();
        self.vv(Ok(op))
    }

    pub fn vv_parallel_en(&mut self) -> Result<&Instruction> {
        let op = self.vv.parallel_en();
        self.vv(Ok(op))
    }

    pub fn vv_select_blk(&mut self, id: u32) -> Result<&Instruction> {
        let op = self.vv.select_blk(id);
        self.vv(op)
    }

    pub fn vv_select_all(&mut self) -> Result<&Instruction> {
        let op = self.vv.select_all();
        self.vv(Ok(op))
    }

    // ---- GEMV macros

    /// Signed multiply into the register pair `rd:rd+1`.
    pub fn mv_mult(&mut self, rd: u32, multiplicand: u32, multiplier: u32) -> Result<&Instruction> {
        let mac = self.picaso.check_product_regs(rd, multiplicand, multiplier);
        self.gemv_macro(mac.map(|_| GemvMacro::Mult { pp_reg: rd, multiplicand, multiplier }))
    }

    /// Fixed-point multiply: the full product goes to the first two reserved
    /// registers and is shifted by `fracWidth` into `rd`.
    pub fn mv_mult_fxp(&mut self, rd: u32, multiplicand: u32, multiplier: u32) -> Result<&[Instruction]> {
        let note = self.note.take();
        let resv = match self.cfg.reserved {
            Some(r) if r.count >= 2 => r,
            r => return Err(AsmError::ReservedRegisters { op: "MV_MULTFXP", need: 2, have: r.map_or(0, |r| r.count) }),
        };
        let p = &self.cfg.picaso;
        for r in [rd, multiplicand, multiplier] {
            p.validate_reg(r)?;
        }
        for (what, r) in [("multiplicand", multiplicand), ("multiplier", multiplier)] {
            if r == rd {
                return Err(AsmError::Overlap { what, lo: rd, hi: rd });
            }
        }
        p.validate_offset(self.cfg.frac_width)?;
        let src = format!("MV_MULTFXP rd={rd}, multiplicand={multiplicand}, multiplier={multiplier}");
        let from = from_macro(&src, note.as_deref());
        let mult = self.gemv_macro_record(GemvMacro::Mult { pp_reg: resv.base, multiplicand, multiplier }, Some(from.clone()))?;
        let shift = PicasoOp::MovOffset {
            offset: self.cfg.frac_width as u8,
            rd: narrow(rd, REG_FIELD_WIDTH)?,
            rs: narrow(resv.base, REG_FIELD_WIDTH)?,
        };
        let shift = (InstrKind::Gemv(shift), format!("MV_{}", fmt_picaso(&shift)), Some(from));
        Ok(self.push_all(vec![mult, shift]))
    }

    /// Folds `rs` into `rd` inside every block: fold 1 from `rs`, the rest in place.
    pub fn mv_block_accum(&mut self, rd: u32, rs: u32) -> Result<&Instruction> {
        let p = &self.cfg.picaso;
        let mac = p.validate_reg(rd).and(p.validate_reg(rs)).map(|_| GemvMacro::BlockAccum { rd, rs });
        self.gemv_macro(mac)
    }

    /// Accumulates `rs` over PE columns `0..col_cnt` into `rd`.
    pub fn mv_range_accum(&mut self, col_cnt: u32, rd: u32, rs: u32) -> Result<&[Instruction]> {
        let note = self.note.take();
        let p = self.cfg.picaso;
        let valid: Vec<u32> = (0..=p.max_level + 1)
            .map_while(|i| 1u32.checked_shl(i).and_then(|scale| p.pe_count.checked_mul(scale)))
            .collect();
        if !valid.contains(&col_cnt) {
            return Err(AsmError::ColumnCount { count: col_cnt, valid });
        }
        p.validate_reg(rd)?;
        p.validate_reg(rs)?;
        let src = format!("MV_RNGACCUM colCnt={col_cnt}, rd={rd}, rs={rs}");
        let from = from_macro(&src, note.as_deref());
        let mut records = vec![self.gemv_macro_record(GemvMacro::BlockAccum { rd, rs }, Some(from.clone()))?];
        let blk_cols = col_cnt / p.pe_count;
        if blk_cols > 1 {
            for level in 0..ceil_log2(blk_cols) {
                records.push(self.accum_row_record(level, rd, &from)?);
            }
        }
        Ok(self.push_all(records))
    }

    /// Accumulates `rs` over every PE column of the array into `rd`.
    pub fn mv_all_accum(&mut self, rd: u32, rs: u32) -> Result<&[Instruction]> {
        let note = self.note.take();
        let p = self.cfg.picaso;
        p.validate_reg(rd)?;
        p.validate_reg(rs)?;
        let src = format!("MV_ALLACCUM rd={rd}, rs={rs}");
        let from = from_macro(&src, note.as_deref());
        let mut records = vec![self.gemv_macro_record(GemvMacro::BlockAccum { rd, rs }, Some(from.clone()))?];
        for level in 0..=p.max_level {
            records.push(self.accum_row_record(level, rd, &from)?);
        }
        Ok(self.push_all(records))
    }

    fn accum_row_record(&self, level: u32, reg: u32, comment: &str) -> Result<(InstrKind, String, Option<String>)> {
        let op = self.picaso.accum_row(level, reg)?;
        Ok((InstrKind::Gemv(op), format!("MV_{}", fmt_picaso(&op)), Some(comment.to_string())))
    }

    /// Pipeline barrier on the GEMV side.
    pub fn mv_sync(&mut self) -> Result<&Instruction> {
        self.gemv_macro(Ok(GemvMacro::Sync))
    }

    pub fn mv_clear_reg(&mut self, reg: u32) -> Result<&Instruction> {
        let mac = self.cfg.picaso.validate_reg(reg).map(|_| GemvMacro::ClearReg { reg });
        self.gemv_macro(mac)
    }

    /// Loads a matrix (rows may differ in length) into `reg` of the PE array,
    /// after clearing it.
    pub fn mv_load_mat<T, R>(&mut self, reg: u32, matrix: &[R]) -> Result<&[Instruction]>
    where
        T: ToPrimitive + Copy,
        R: AsRef<[T]>,
    {
        let note = self.note.take();
        self.cfg.picaso.validate_reg(reg)?;
        check_len("row count", matrix.len(), self.cfg.mv_max_row)?;
        let mut fixed = Vec::with_capacity(matrix.len());
        for row in matrix {
            let row = row.as_ref();
            check_len("column count", row.len(), self.cfg.mv_max_col)?;
            fixed.push(self.to_fixed_vec(row)?);
        }
        let load = self.gemv_macro_record(GemvMacro::LoadMat { reg, matrix: fixed }, note)?;
        let clear = self.gemv_macro_record(GemvMacro::ClearReg { reg }, Some("dependency of MV_LOADMAT".into()))?;
        Ok(self.push_all(vec![clear, load]))
    }

    /// Loads `vector` into `reg` of every PE row: element `i` goes to PE column `i`.
    pub fn mv_load_vec_row<T: ToPrimitive + Copy>(&mut self, reg: u32, vector: &[T]) -> Result<&[Instruction]> {
        let note = self.note.take();
        self.cfg.picaso.validate_reg(reg)?;
        check_len("column count", vector.len(), self.cfg.mv_max_col)?;
        let vector = self.to_fixed_vec(vector)?;
        let load = self.gemv_macro_record(GemvMacro::LoadVecRow { reg, vector }, note)?;
        let clear = self.gemv_macro_record(GemvMacro::ClearReg { reg }, Some("dependency of MV_LOADVEC_ROW".into()))?;
        Ok(self.push_all(vec![clear, load]))
    }

    /// Loads `vector` into `reg` of every PE column: element `i` goes to all PEs of block row `i`.
    pub fn mv_load_vec_col<T: ToPrimitive + Copy>(&mut self, reg: u32, vector: &[T]) -> Result<&[Instruction]> {
        let note = self.note.take();
        self.cfg.picaso.validate_reg(reg)?;
        check_len("row count", vector.len(), self.cfg.mv_max_row)?;
        let vector = self.to_fixed_vec(vector)?;
        let load = self.gemv_macro_record(GemvMacro::LoadVecCol { reg, vector }, note)?;
        let clear = self.gemv_macro_record(GemvMacro::ClearReg { reg }, Some("dependency of MV_LOADVEC_COL".into()))?;
        Ok(self.push_all(vec![clear, load]))
    }

    // ---- VV-Engine macros

    /// Pipeline barrier on the VV-Engine side.
    pub fn vv_sync(&mut self) -> Result<&Instruction> {
        self.vv_macro(Ok(VvMacro::Sync))
    }

    pub fn vv_clear_reg(&mut self, reg: u32) -> Result<&Instruction> {
        let mac = self.cfg.vv.validate_reg(reg).map(|_| VvMacro::ClearReg { reg });
        self.vv_macro(mac)
    }

    /// Loads element `i` of `vector` into `reg` of VV block `i`, after clearing it.
    pub fn vv_load_vec<T: ToPrimitive + Copy>(&mut self, reg: u32, vector: &[T]) -> Result<&[Instruction]> {
        let note = self.note.take();
        self.cfg.vv.validate_reg(reg)?;
        check_len("row count", vector.len(), self.cfg.mv_max_row)?;
        let vector = self.to_fixed_vec(vector)?;
        let load = self.vv_macro_record(VvMacro::LoadVec { reg, vector }, note)?;
        let clear = self.vv_macro_record(VvMacro::ClearReg { reg }, Some("dependency of VV_LOADVEC".into()))?;
        Ok(self.push_all(vec![clear, load]))
    }

    // ---- pseudo instructions

    /// A comment line in the exported program; produces no word.
    pub fn as_comment(&mut self, text: impl Into<String>) -> &Instruction {
        self.push(InstrKind::Comment, "AS_COMMENT".into(), Some(text.into()))
    }

    fn to_fixed_vec<T: ToPrimitive + Copy>(&self, values: &[T]) -> Result<Vec<i32>> {
        crate::fixed::to_fixed_vec(values, self.cfg.frac_width, self.cfg.picaso.reg_width)
    }
}

fn from_macro(src: &str, note: Option<&str>) -> String {
    match note {
        Some(n) => format!("From macro call: {src}; {n}"),
        None => format!("From macro call: {src}"),
    }
}

fn check_len(what: &'static str, len: usize, max: Option<u32>) -> Result<()> {
    match max {
        Some(max) if len > max as usize => Err(AsmError::Shape { what, len, max }),
        _ => Ok(()),
    }
}
