//! PE-register to BRAM bit-row transposition.
//!
//! A PiCaSO block stores register `r` of all its PEs in BRAM rows
//! `r * regWidth .. (r + 1) * regWidth`; row `b` holds bit `b` of every PE,
//! with PE `p` at bit position `p` of the row.

use bitvec::prelude::*;

use crate::error::{AsmError, Result};

/// Bit-rows of one block register image, LSB row first.
pub type BramImage = Vec<u16>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transposer {
    pub pe_count: usize,
    pub reg_width: usize,
}

impl Transposer {
    pub fn new(pe_count: u32, reg_width: u32) -> Self {
        Self { pe_count: pe_count as usize, reg_width: reg_width as usize }
    }

    /// Transposes up to `pe_count` register values; missing PEs read as zero.
    pub fn block(&self, values: &[i32]) -> Result<BramImage> {
        if values.len() > self.pe_count || self.pe_count > u16::BITS as usize {
            return Err(AsmError::Shape { what: "block size", len: values.len(), max: self.pe_count as u32 });
        }
        let mut image = vec![0u16; self.reg_width];
        for (bit, row) in image.iter_mut().enumerate() {
            let row_bits = row.view_bits_mut::<Lsb0>();
            for (pe, v) in values.iter().enumerate() {
                let pattern = *v as u32;
                row_bits.set(pe, pattern.view_bits::<Lsb0>()[bit]);
            }
        }
        Ok(image)
    }

    /// Slices a PE-row vector into per-block chunks; the last chunk may be short.
    pub fn row_vec(&self, vec: &[i32]) -> Result<Vec<BramImage>> {
        vec.chunks(self.pe_count.max(1)).map(|chunk| self.block(chunk)).collect()
    }

    /// Broadcasts every element of a PE-column vector across its block.
    pub fn col_vec(&self, vec: &[i32]) -> Result<Vec<BramImage>> {
        vec.iter().map(|&v| self.block(&vec![v; self.pe_count])).collect()
    }

    /// One [`row_vec`](Self::row_vec) per matrix row; rows may differ in length.
    pub fn matrix<R: AsRef<[i32]>>(&self, mat: &[R]) -> Result<Vec<Vec<BramImage>>> {
        mat.iter().map(|row| self.row_vec(row.as_ref())).collect()
    }
}
