//! Functional model of a single PiCaSO block.
//!
//! Only GEMV payloads are executed; VV-Engine words are skipped. Writes land
//! only while the block is selected, every other op runs unconditionally.
//! `accum_row` is a no-op since a lone block has no neighbours to fold in.

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

use crate::decoder::{Decoded, Decoder, DavinciDecoder};
use crate::error::{AsmError, Result};
use crate::isa::picaso::{AluFn, PicasoOp, SelectFn};
use crate::params::PicasoParams;

/// Block RAM, one 16-bit word per row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bram {
    pub rows: Vec<u16>,
}

impl Bram {
    pub fn new(depth: usize) -> Self {
        Self { rows: vec![0; depth] }
    }

    fn bad_addr(&self, addr: usize) -> AsmError {
        AsmError::range("BRAM address", addr as i64, 0, self.rows.len() as i64 - 1)
    }

    pub fn read(&self, addr: usize) -> Result<u16> {
        self.rows.get(addr).copied().ok_or_else(|| self.bad_addr(addr))
    }

    pub fn write(&mut self, addr: usize, data: u16) -> Result<()> {
        let err = self.bad_addr(addr);
        let row = self.rows.get_mut(addr).ok_or(err)?;
        *row = data;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSim {
    params: PicasoParams,
    row_id: u8,
    col_id: u8,
    selected: bool,
    /// Booth multiplier bit of the previous step, per PE.
    mbit: BitVec<u16, Lsb0>,
    pub bram: Bram,
}

impl BlockSim {
    /// A block at grid position (`row_id`, `col_id`), deselected, BRAM zeroed.
    pub fn new(params: PicasoParams, row_id: u8, col_id: u8) -> Self {
        Self {
            params,
            row_id,
            col_id,
            selected: false,
            mbit: bitvec![u16, Lsb0; 0; params.pe_count as usize],
            bram: Bram::new(params.pim_depth as usize),
        }
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    fn pe_count(&self) -> usize {
        self.params.pe_count as usize
    }

    /// Register `reg` of every PE, read back out of its bit-rows.
    pub fn reg(&self, reg: u32) -> Result<Vec<u16>> {
        let mut values = vec![0u16; self.pe_count()];
        for bit in 0..self.params.reg_width {
            let row = self.bram.read(self.params.reg_addr(reg, bit) as usize)?;
            for (pe, v) in values.iter_mut().enumerate() {
                v.view_bits_mut::<Lsb0>().set(bit as usize, row.view_bits::<Lsb0>()[pe]);
            }
        }
        Ok(values)
    }

    /// Signed view of [`reg`](Self::reg).
    pub fn reg_signed(&self, reg: u32) -> Result<Vec<i16>> {
        Ok(self.reg(reg)?.into_iter().map(|v| v as i16).collect())
    }

    pub fn set_reg(&mut self, reg: u32, values: &[u16]) -> Result<()> {
        for bit in 0..self.params.reg_width {
            let addr = self.params.reg_addr(reg, bit) as usize;
            let mut row = 0u16;
            for (pe, v) in values.iter().take(self.pe_count()).enumerate() {
                row.view_bits_mut::<Lsb0>().set(pe, v.view_bits::<Lsb0>()[bit as usize]);
            }
            self.bram.write(addr, row)?;
        }
        Ok(())
    }

    /// `reg:reg+1` as 32-bit values, `reg` holding the low half. A high half
    /// past the end of BRAM reads as zero.
    fn pair(&self, reg: u32) -> Result<Vec<u32>> {
        let lo = self.reg(reg)?;
        let hi = self.reg(reg + 1).unwrap_or_else(|_| vec![0; lo.len()]);
        Ok(lo.iter().zip(&hi).map(|(&l, &h)| u32::from(h) << 16 | u32::from(l)).collect())
    }

    fn set_pair(&mut self, reg: u32, values: &[u32]) -> Result<()> {
        let lo: Vec<u16> = values.iter().map(|&v| v as u16).collect();
        let hi: Vec<u16> = values.iter().map(|&v| (v >> 16) as u16).collect();
        self.set_reg(reg, &lo)?;
        self.set_reg(reg + 1, &hi)
    }

    pub fn exec(&mut self, op: &PicasoOp) -> Result<()> {
        match *op {
            PicasoOp::Nop | PicasoOp::AccumRow { .. } => {}
            PicasoOp::Write { addr, data } => {
                if self.selected {
                    self.bram.write(addr.into(), data)?;
                }
            }
            PicasoOp::Select { func, row_id, col_id } => {
                self.selected = match func {
                    SelectFn::Col => col_id == self.col_id,
                    SelectFn::Row => row_id == self.row_id,
                    SelectFn::Block => row_id == self.row_id && col_id == self.col_id,
                    SelectFn::All => true,
                };
            }
            PicasoOp::Alu { func, rd, rs1, rs2 } => {
                let (x, y) = (self.reg(rs1.into())?, self.reg(rs2.into())?);
                let res: Vec<u16> = x
                    .iter()
                    .zip(&y)
                    .map(|(&a, &b)| match func {
                        AluFn::Add => a.wrapping_add(b),
                        AluFn::Sub => a.wrapping_sub(b),
                        AluFn::Cpx => a,
                        AluFn::Cpy => b,
                    })
                    .collect();
                self.set_reg(rd.into(), &res)?;
            }
            PicasoOp::ClrMbit => self.mbit.fill(false),
            PicasoOp::UpdatePp { offset, pp_reg, multiplicand, multiplier } => {
                self.params.validate_offset(offset.into())?;
                // bit 0 starts a fresh product
                let mut pp = if offset == 0 { vec![0; self.pe_count()] } else { self.pair(pp_reg.into())? };
                let m = self.reg(multiplicand.into())?;
                let q = self.reg(multiplier.into())?;
                for pe in 0..self.pe_count() {
                    let cur = q[pe].view_bits::<Lsb0>()[usize::from(offset)];
                    let step = (i32::from(m[pe] as i16) as u32) << offset;
                    match (cur, self.mbit[pe]) {
                        (true, false) => pp[pe] = pp[pe].wrapping_sub(step),
                        (false, true) => pp[pe] = pp[pe].wrapping_add(step),
                        _ => {}
                    }
                    self.mbit.set(pe, cur);
                }
                self.set_pair(pp_reg.into(), &pp)?;
            }
            PicasoOp::MovOffset { offset, rd, rs } => {
                self.params.validate_offset(offset.into())?;
                let res: Vec<u16> = self.pair(rs.into())?.iter().map(|&v| (v >> offset) as u16).collect();
                self.set_reg(rd.into(), &res)?;
            }
            PicasoOp::AccumBlk { fold, rd, rs } => {
                let src = self.reg(rs.into())?;
                let mut dst = self.reg(rd.into())?;
                let max_fold = self.params.pe_count.trailing_zeros();
                if fold == 0 || u32::from(fold) > max_fold {
                    return Err(AsmError::range("fold", fold, 1, max_fold));
                }
                let half = self.pe_count() >> fold;
                for pe in 0..half {
                    dst[pe] = src[pe].wrapping_add(src[pe + half]);
                }
                self.set_reg(rd.into(), &dst)?;
            }
        }
        Ok(())
    }

    pub fn run<'a>(&mut self, ops: impl IntoIterator<Item = &'a PicasoOp>) -> Result<()> {
        ops.into_iter().try_for_each(|op| self.exec(op))
    }

    /// Decodes and executes a DA-VinCi word stream.
    pub fn run_words(&mut self, words: &[u32]) -> Result<()> {
        for &w in words {
            if let Decoded::Gemv(op) = DavinciDecoder.decode(w)? {
                self.exec(&op)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::GemvMacro;
    use crate::params::Config;
    use pretty_assertions::assert_eq;

    fn sim() -> BlockSim {
        BlockSim::new(Config::default().picaso, 0, 0)
    }

    #[test]
    fn registers_round_trip_through_bit_rows() {
        let mut s = sim();
        let vals: Vec<u16> = (0..16).map(|i| i * 1000 + 7).collect();
        s.set_reg(3, &vals).unwrap();
        assert_eq!(s.reg(3).unwrap(), vals);
        assert_eq!(s.reg(2).unwrap(), vec![0; 16]);
    }

    #[test]
    fn writes_need_selection() {
        let mut s = sim();
        s.exec(&PicasoOp::Write { addr: 0, data: 1 }).unwrap();
        assert_eq!(s.bram.rows[0], 0);
        s.exec(&PicasoOp::Select { func: SelectFn::Col, row_id: 0, col_id: 1 }).unwrap();
        assert!(!s.is_selected());
        s.exec(&PicasoOp::Select { func: SelectFn::Row, row_id: 0, col_id: 1 }).unwrap();
        s.exec(&PicasoOp::Write { addr: 0, data: 1 }).unwrap();
        assert_eq!(s.bram.rows[0], 1);
    }

    #[test]
    fn booth_steps_multiply() {
        let p = Config::default().picaso;
        let mut s = sim();
        s.set_reg(1, &[5u16; 16]).unwrap();
        let mut q = vec![3u16; 16];
        q[1] = (-2i16) as u16;
        s.set_reg(2, &q).unwrap();
        s.run(&GemvMacro::Mult { pp_reg: 4, multiplicand: 1, multiplier: 2 }.expand(&p).unwrap()).unwrap();
        assert_eq!(s.reg(4).unwrap()[0], 15);
        assert_eq!(s.reg(5).unwrap()[0], 0);
        assert_eq!(s.reg_signed(4).unwrap()[1], -10);
        assert_eq!(s.reg(5).unwrap()[1], 0xFFFF);
    }

    #[test]
    fn block_folds_sum_all_pes() {
        let p = Config::default().picaso;
        let mut s = sim();
        s.set_reg(7, &(1..=16).collect::<Vec<u16>>()).unwrap();
        s.run(&GemvMacro::BlockAccum { rd: 3, rs: 7 }.expand(&p).unwrap()).unwrap();
        assert_eq!(s.reg(3).unwrap()[0], 136);
    }

    #[test]
    fn mov_offset_shifts_the_pair() {
        let mut s = sim();
        s.set_reg(0, &[0x8000; 16]).unwrap();
        s.set_reg(1, &[0x0001; 16]).unwrap();
        s.exec(&PicasoOp::MovOffset { offset: 4, rd: 2, rs: 0 }).unwrap();
        assert_eq!(s.reg(2).unwrap()[0], 0x1800);
    }

    #[test]
    fn malformed_fields_are_errors() {
        let mut s = sim();
        for fold in [0, 5, 63] {
            let err = s.exec(&PicasoOp::AccumBlk { fold, rd: 0, rs: 1 }).unwrap_err();
            assert!(matches!(err, AsmError::OutOfRange { what: "fold", .. }), "{err}");
        }
        for offset in [16, 32, 63] {
            assert!(s.exec(&PicasoOp::MovOffset { offset, rd: 2, rs: 0 }).is_err());
            assert!(s.exec(&PicasoOp::UpdatePp { offset, pp_reg: 4, multiplicand: 1, multiplier: 2 }).is_err());
        }
        assert!(s.exec(&PicasoOp::AccumBlk { fold: 4, rd: 0, rs: 1 }).is_ok());
    }

    #[test]
    fn zero_fold_word_in_an_image_is_rejected() {
        let mut asm = crate::DavinciAsm::new();
        asm.mv_block_fold(1, 0, 1).unwrap();
        let word = asm.words().unwrap()[0] & !(0x3F << 16);
        assert!(matches!(sim().run_words(&[word]), Err(AsmError::OutOfRange { what: "fold", value: 0, .. })));
    }
}
