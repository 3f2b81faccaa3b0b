//! PiCaSO (GEMV array) tile-controller instruction set.
//!
//! Word layout: `[opcode:4] [mid:10] [low:16]`, 30 bits in total. The mid and
//! low segments carry packed sub-fields whose meaning depends on the opcode.

use serde::{Deserialize, Serialize};

use crate::bitfield::{fit, Segment, SubWord};
use crate::error::{AsmError, Result};
use crate::params::PicasoParams;

pub const OPCODE_WIDTH: u8 = 4;
pub const ADDR_WIDTH: u8 = 10;
pub const DATA_WIDTH: u8 = 16;
pub const OFFSET_WIDTH: u8 = 4;
pub const REG_FIELD_WIDTH: u8 = 6;
pub const ID_FIELD_WIDTH: u8 = 8;

/// Segment widths, MSB first.
pub const SEGMENT_WIDTHS: [u8; 3] = [OPCODE_WIDTH, ADDR_WIDTH, DATA_WIDTH];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    Write = 1,
    Read = 2,
    UpdatePp = 3,
    Accum = 4,
    AluOp = 5,
    Select = 6,
    Mov = 7,
    SuperOp = 8,
}

impl Opcode {
    pub fn from_u32(v: u32) -> Option<Self> {
        use Opcode::*;
        Some(match v {
            0 => Nop,
            1 => Write,
            2 => Read,
            3 => UpdatePp,
            4 => Accum,
            5 => AluOp,
            6 => Select,
            7 => Mov,
            8 => SuperOp,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AluFn {
    Add = 0,
    Cpx = 1,
    Cpy = 2,
    Sub = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AccumFn {
    Block = 0,
    Row = 1,
}

/// Block-selection modes; `All` is the hardware's `sel_enc` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SelectFn {
    Col = 0,
    Block = 1,
    Row = 2,
    All = 3,
}

pub const MOV_FN_OFFSET: u32 = 0;
pub const SUPER_CLRMBIT: u32 = 0;

/// A builtin PiCaSO instruction with its conceptual operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PicasoOp {
    Nop,
    /// Writes `data` into BRAM row `addr` of every selected block.
    Write { addr: u16, data: u16 },
    /// `rd = rs1 (fn) rs2`
    Alu { func: AluFn, rd: u8, rs1: u8, rs2: u8 },
    /// One Booth step of `pp_reg:pp_reg+1 = multiplicand * multiplier` at bit `offset`.
    UpdatePp { offset: u8, pp_reg: u8, multiplicand: u8, multiplier: u8 },
    /// `rd = rs + folded(rs, fold)` inside a block.
    AccumBlk { fold: u8, rd: u8, rs: u8 },
    /// Receiver-block `reg` += transmitter-block `reg` at network `level`.
    AccumRow { level: u8, reg: u8 },
    Select { func: SelectFn, row_id: u8, col_id: u8 },
    /// `rd = rs >> offset` over the register pair starting at `rs`.
    MovOffset { offset: u8, rd: u8, rs: u8 },
    /// Clears the multiplier-bit history of the Booth ALU.
    ClrMbit,
}

impl PicasoOp {
    pub fn opcode(&self) -> Opcode {
        match self {
            PicasoOp::Nop => Opcode::Nop,
            PicasoOp::Write { .. } => Opcode::Write,
            PicasoOp::Alu { .. } => Opcode::AluOp,
            PicasoOp::UpdatePp { .. } => Opcode::UpdatePp,
            PicasoOp::AccumBlk { .. } | PicasoOp::AccumRow { .. } => Opcode::Accum,
            PicasoOp::Select { .. } => Opcode::Select,
            PicasoOp::MovOffset { .. } => Opcode::Mov,
            PicasoOp::ClrMbit => Opcode::SuperOp,
        }
    }

    /// Encodes the instruction into its three segments.
    pub fn encode(&self) -> Result<SubWord> {
        let r = REG_FIELD_WIDTH;
        let reg = |v: u8| fit(u32::from(v), r);
        let (mid, low) = match *self {
            PicasoOp::Nop => (0, 0),
            PicasoOp::Write { addr, data } => (u32::from(addr), u32::from(data)),
            PicasoOp::Alu { func, rd, rs1, rs2 } => {
                ((func as u32) << r | reg(rd)?, reg(rs2)? << r | reg(rs1)?)
            }
            PicasoOp::UpdatePp { offset, pp_reg, multiplicand, multiplier } => (
                fit(u32::from(offset), OFFSET_WIDTH)? << r | reg(pp_reg)?,
                reg(multiplicand)? << r | reg(multiplier)?,
            ),
            // the destination rides in the rs2 field: the param field overlaps rd
            PicasoOp::AccumBlk { fold, rd, rs } => {
                ((AccumFn::Block as u32) << r | reg(fold)?, reg(rd)? << r | reg(rs)?)
            }
            PicasoOp::AccumRow { level, reg: rs } => ((AccumFn::Row as u32) << r | reg(level)?, reg(rs)?),
            PicasoOp::Select { func, row_id, col_id } => {
                ((func as u32) << r, u32::from(row_id) << ID_FIELD_WIDTH | u32::from(col_id))
            }
            PicasoOp::MovOffset { offset, rd, rs } => {
                (MOV_FN_OFFSET << r | fit(u32::from(offset), OFFSET_WIDTH)?, reg(rd)? << r | reg(rs)?)
            }
            PicasoOp::ClrMbit => (SUPER_CLRMBIT, 0),
        };
        Ok([
            Segment::new(self.opcode() as u32, OPCODE_WIDTH)?,
            Segment::new(mid, ADDR_WIDTH)?,
            Segment::new(low, DATA_WIDTH)?,
        ])
    }
}

/// Mnemonic constructors for PiCaSO builtins. Every constructor validates its
/// operands against the configured limits before building the op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PicasoAsm {
    pub params: PicasoParams,
}

impl PicasoAsm {
    pub fn new(params: PicasoParams) -> Self {
        Self { params }
    }

    fn regs(&self, regs: &[u32]) -> Result<()> {
        regs.iter().try_for_each(|&r| self.params.validate_reg(r))
    }

    pub fn nop(&self) -> PicasoOp {
        PicasoOp::Nop
    }

    pub fn add(&self, rd: u32, rs1: u32, rs2: u32) -> Result<PicasoOp> {
        self.regs(&[rd, rs1, rs2])?;
        Ok(PicasoOp::Alu { func: AluFn::Add, rd: rd as u8, rs1: rs1 as u8, rs2: rs2 as u8 })
    }

    pub fn sub(&self, rd: u32, rs1: u32, rs2: u32) -> Result<PicasoOp> {
        self.regs(&[rd, rs1, rs2])?;
        Ok(PicasoOp::Alu { func: AluFn::Sub, rd: rd as u8, rs1: rs1 as u8, rs2: rs2 as u8 })
    }

    /// `pp_reg` spans two registers; neither operand may overlap them.
    pub fn updatepp(&self, pp_reg: u32, multiplicand: u32, multiplier: u32, bit_no: u32) -> Result<PicasoOp> {
        self.check_product_regs(pp_reg, multiplicand, multiplier)?;
        self.params.validate_offset(bit_no)?;
        Ok(PicasoOp::UpdatePp {
            offset: bit_no as u8,
            pp_reg: pp_reg as u8,
            multiplicand: multiplicand as u8,
            multiplier: multiplier as u8,
        })
    }

    /// Validation shared by `updatepp` and the multiply macro.
    pub fn check_product_regs(&self, pp_reg: u32, multiplicand: u32, multiplier: u32) -> Result<()> {
        self.params.validate_reg(pp_reg)?;
        self.regs(&[pp_reg + 1, multiplicand, multiplier])?;
        for (what, r) in [("multiplicand", multiplicand), ("multiplier", multiplier)] {
            if r == pp_reg || r == pp_reg + 1 {
                return Err(AsmError::Overlap { what, lo: pp_reg, hi: pp_reg + 1 });
            }
        }
        Ok(())
    }

    pub fn accum_blk(&self, fold: u32, rd: u32, rs: u32) -> Result<PicasoOp> {
        self.params.validate_fold(fold)?;
        self.regs(&[rd, rs])?;
        Ok(PicasoOp::AccumBlk { fold: fold as u8, rd: rd as u8, rs: rs as u8 })
    }

    pub fn accum_row(&self, level: u32, reg: u32) -> Result<PicasoOp> {
        self.params.validate_level(level)?;
        self.params.validate_reg(reg)?;
        Ok(PicasoOp::AccumRow { level: level as u8, reg: reg as u8 })
    }

    pub fn select_block(&self, row_id: u32, col_id: u32) -> Result<PicasoOp> {
        self.params.validate_id("rowID", row_id)?;
        self.params.validate_id("colID", col_id)?;
        Ok(PicasoOp::Select { func: SelectFn::Block, row_id: row_id as u8, col_id: col_id as u8 })
    }

    pub fn select_row(&self, row_id: u32) -> Result<PicasoOp> {
        self.params.validate_id("rowID", row_id)?;
        Ok(PicasoOp::Select { func: SelectFn::Row, row_id: row_id as u8, col_id: 0 })
    }

    pub fn select_col(&self, col_id: u32) -> Result<PicasoOp> {
        self.params.validate_id("colID", col_id)?;
        Ok(PicasoOp::Select { func: SelectFn::Col, row_id: 0, col_id: col_id as u8 })
    }

    pub fn select_all(&self) -> PicasoOp {
        PicasoOp::Select { func: SelectFn::All, row_id: 0, col_id: 0 }
    }

    pub fn mov_offset(&self, offset: u32, rd: u32, rs: u32) -> Result<PicasoOp> {
        self.params.validate_offset(offset)?;
        self.regs(&[rd, rs])?;
        Ok(PicasoOp::MovOffset { offset: offset as u8, rd: rd as u8, rs: rs as u8 })
    }

    /// Plain copy, encoded as a zero-offset move.
    pub fn mov(&self, rd: u32, rs: u32) -> Result<PicasoOp> {
        self.mov_offset(0, rd, rs)
    }

    pub fn write(&self, addr: u32, data: u32) -> Result<PicasoOp> {
        self.params.validate_addr(addr)?;
        self.params.validate_data(data)?;
        Ok(PicasoOp::Write { addr: addr as u16, data: data as u16 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitfield::{pack, total_width};
    use crate::params::Config;

    fn asm() -> PicasoAsm {
        PicasoAsm::new(Config::default().picaso)
    }

    fn fields(op: PicasoOp) -> [u32; 3] {
        let w = op.encode().unwrap();
        [w[0].value, w[1].value, w[2].value]
    }

    #[test]
    fn every_word_is_30_bits() {
        let a = asm();
        let ops = [
            a.nop(),
            a.write(1023, 0xFFFF).unwrap(),
            a.add(1, 2, 3).unwrap(),
            a.updatepp(4, 1, 2, 15).unwrap(),
            a.accum_blk(4, 5, 6).unwrap(),
            a.accum_row(3, 7).unwrap(),
            a.select_block(255, 255).unwrap(),
            a.mov_offset(8, 1, 2).unwrap(),
            PicasoOp::ClrMbit,
        ];
        for op in ops {
            let w = op.encode().unwrap();
            assert_eq!(total_width(&w), 30, "{op:?}");
            assert!(pack(&w) < 1 << 30);
        }
    }

    #[test]
    fn alu_layout() {
        // [5] [fn=3, rd=1] [rs2=3, rs1=2]
        assert_eq!(fields(asm().sub(1, 2, 3).unwrap()), [5, 3 << 6 | 1, 3 << 6 | 2]);
        assert_eq!(fields(asm().add(1, 2, 3).unwrap()), [5, 1, 3 << 6 | 2]);
    }

    #[test]
    fn updatepp_layout() {
        assert_eq!(fields(asm().updatepp(4, 1, 2, 7).unwrap()), [3, 7 << 6 | 4, 1 << 6 | 2]);
    }

    #[test]
    fn accum_carries_destination_in_rs2() {
        assert_eq!(fields(asm().accum_blk(2, 5, 6).unwrap()), [4, 2, 5 << 6 | 6]);
        assert_eq!(fields(asm().accum_row(3, 7).unwrap()), [4, 1 << 6 | 3, 7]);
    }

    #[test]
    fn select_layout() {
        assert_eq!(fields(asm().select_block(2, 3).unwrap()), [6, 1 << 6, 2 << 8 | 3]);
        assert_eq!(fields(asm().select_row(4).unwrap()), [6, 2 << 6, 4 << 8]);
        assert_eq!(fields(asm().select_col(5).unwrap()), [6, 0, 5]);
        assert_eq!(fields(asm().select_all()), [6, 3 << 6, 0]);
    }

    #[test]
    fn mov_and_superop_layout() {
        assert_eq!(fields(asm().mov_offset(8, 1, 2).unwrap()), [7, 8, 1 << 6 | 2]);
        assert_eq!(fields(asm().mov(1, 2).unwrap()), [7, 0, 1 << 6 | 2]);
        assert_eq!(fields(PicasoOp::ClrMbit), [8, 0, 0]);
        assert_eq!(fields(asm().write(5, 10).unwrap()), [1, 5, 10]);
    }

    #[test]
    fn operands_are_validated_at_call_time() {
        let a = asm();
        assert!(a.add(16, 0, 0).is_err());
        assert!(a.add(15, 0, 0).is_ok());
        assert!(a.updatepp(15, 0, 1, 0).is_err(), "pp pair would spill past the register file");
        assert!(matches!(a.updatepp(2, 3, 0, 0), Err(AsmError::Overlap { what: "multiplicand", .. })));
        assert!(matches!(a.updatepp(2, 0, 2, 0), Err(AsmError::Overlap { what: "multiplier", .. })));
        assert!(a.updatepp(2, 0, 1, 16).is_err());
        assert!(a.accum_blk(0, 1, 2).is_err());
        assert!(a.accum_row(4, 1).is_err());
        assert!(a.select_block(256, 0).is_err());
        assert!(a.write(1024, 0).is_err());
        assert!(a.write(0, 0x1_0000).is_err());
    }

    #[test]
    fn product_register_pair_past_u32_is_rejected() {
        let a = asm();
        assert!(matches!(a.updatepp(u32::MAX, 0, 1, 0), Err(AsmError::Register { reg, .. }) if reg == i64::from(u32::MAX)));
        assert!(matches!(a.check_product_regs(u32::MAX, 0, 1), Err(AsmError::Register { .. })));
        assert!(matches!(a.check_product_regs(15, 0, 1), Err(AsmError::Register { reg: 16, .. })));
    }

    #[test]
    fn unvalidated_register_overflow_is_caught_by_the_encoder() {
        let op = PicasoOp::Alu { func: AluFn::Add, rd: 64, rs1: 0, rs2: 0 };
        assert!(matches!(op.encode(), Err(AsmError::FieldOverflow { width: 6, .. })));
    }
}
