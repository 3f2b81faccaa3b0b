use serde::{Deserialize, Serialize};

use crate::bitfield::unpack;
use crate::error::{AsmError, Result};
use crate::isa::picaso::{self, AluFn, PicasoOp, SelectFn};
use crate::isa::vvengine::{self, ArithFn, VvOp};
use crate::program::{GEMV_CODE, PAYLOAD_WIDTH, SUBMODULE_CODE_WIDTH, VV_CODE};

/// A decoded 32-bit DA-VinCi word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decoded {
    Gemv(PicasoOp),
    Vv(VvOp),
}

pub trait Decoder {
    type Op;
    fn decode(&self, raw: u32) -> Result<Self::Op>;
}

/// Decodes 30-bit PiCaSO payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct PicasoDecoder;

/// Decodes 30-bit VV-Engine payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct VvDecoder;

/// Splits a 32-bit word by submodule code and decodes the payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct DavinciDecoder;

const REG_MASK: u32 = (1 << picaso::REG_FIELD_WIDTH) - 1;
const ID_MASK: u32 = (1 << picaso::ID_FIELD_WIDTH) - 1;
const VV_REG_MASK: u32 = (1 << vvengine::REG_FIELD_WIDTH) - 1;

impl Decoder for PicasoDecoder {
    type Op = PicasoOp;

    fn decode(&self, raw: u32) -> Result<PicasoOp> {
        use picaso::Opcode;
        let bad = || AsmError::Decode { submodule: "PiCaSO", word: raw };
        let f = unpack(u64::from(raw), &picaso::SEGMENT_WIDTHS);
        let (opc, mid, low) = (f[0], f[1], f[2]);
        if raw >> PAYLOAD_WIDTH != 0 {
            return Err(bad());
        }
        let r = picaso::REG_FIELD_WIDTH;
        let (func, param) = (mid >> r, (mid & REG_MASK) as u8);
        let (hi_reg, lo_reg) = (((low >> r) & REG_MASK) as u8, (low & REG_MASK) as u8);
        let op = match Opcode::from_u32(opc).ok_or_else(bad)? {
            Opcode::Nop => PicasoOp::Nop,
            Opcode::Write => PicasoOp::Write { addr: mid as u16, data: low as u16 },
            Opcode::Read => return Err(bad()),
            Opcode::UpdatePp => PicasoOp::UpdatePp { offset: func as u8, pp_reg: param, multiplicand: hi_reg, multiplier: lo_reg },
            Opcode::Accum => match func {
                0 => PicasoOp::AccumBlk { fold: param, rd: hi_reg, rs: lo_reg },
                1 => PicasoOp::AccumRow { level: param, reg: lo_reg },
                _ => return Err(bad()),
            },
            Opcode::AluOp => {
                let func = match func {
                    0 => AluFn::Add,
                    1 => AluFn::Cpx,
                    2 => AluFn::Cpy,
                    3 => AluFn::Sub,
                    _ => return Err(bad()),
                };
                PicasoOp::Alu { func, rd: param, rs1: lo_reg, rs2: hi_reg }
            }
            Opcode::Select => {
                let func = match func {
                    0 => SelectFn::Col,
                    1 => SelectFn::Block,
                    2 => SelectFn::Row,
                    3 => SelectFn::All,
                    _ => return Err(bad()),
                };
                let id = picaso::ID_FIELD_WIDTH;
                PicasoOp::Select { func, row_id: ((low >> id) & ID_MASK) as u8, col_id: (low & ID_MASK) as u8 }
            }
            Opcode::Mov if func == picaso::MOV_FN_OFFSET => PicasoOp::MovOffset { offset: param, rd: hi_reg, rs: lo_reg },
            Opcode::SuperOp if mid == picaso::SUPER_CLRMBIT => PicasoOp::ClrMbit,
            Opcode::Mov | Opcode::SuperOp => return Err(bad()),
        };
        Ok(op)
    }
}

impl Decoder for VvDecoder {
    type Op = VvOp;

    fn decode(&self, raw: u32) -> Result<VvOp> {
        use vvengine::Opcode;
        let bad = || AsmError::Decode { submodule: "VV-Engine", word: raw };
        if raw >> PAYLOAD_WIDTH != 0 {
            return Err(bad());
        }
        let f = unpack(u64::from(raw), &vvengine::SEGMENT_WIDTHS);
        let (opc, mid, low) = (f[0], f[1], f[2]);
        let hi = ((low >> vvengine::REG_FIELD_WIDTH) & VV_REG_MASK) as u8;
        let lo = (low & VV_REG_MASK) as u8;
        let op = match Opcode::from_u32(opc).ok_or_else(bad)? {
            Opcode::Nop => VvOp::Nop,
            Opcode::AddXy => VvOp::Xy { func: ArithFn::Add, rx: hi, ry: lo },
            Opcode::SubXy => VvOp::Xy { func: ArithFn::Sub, rx: hi, ry: lo },
            Opcode::MultXy => VvOp::Xy { func: ArithFn::Mult, rx: hi, ry: lo },
            Opcode::AddXsreg => VvOp::Xsreg { func: ArithFn::Add, rx: hi },
            Opcode::SubXsreg => VvOp::Xsreg { func: ArithFn::Sub, rx: hi },
            Opcode::MultXsreg => VvOp::Xsreg { func: ArithFn::Mult, rx: hi },
            Opcode::Relu => VvOp::Relu,
            Opcode::ActLookup => VvOp::ActLookup { code: (low & ((1 << vvengine::ACTCODE_WIDTH) - 1)) as u8 },
            Opcode::ShiftOff => VvOp::ShiftOff,
            Opcode::SerialEn => VvOp::SerialEn,
            Opcode::ParallelEn => VvOp::ParallelEn,
            Opcode::SelectBlk => VvOp::SelectBlk { id: hi },
            Opcode::SelectAll => VvOp::SelectAll,
            Opcode::MovO2Sreg => VvOp::MovO2Sreg,
            Opcode::MovY2Sreg => VvOp::MovY2Sreg { ry: lo },
            Opcode::MovSreg2R => VvOp::MovSreg2R { rd: lo },
            Opcode::MovOreg2R => VvOp::MovOreg2R { rd: lo },
            Opcode::MovY2Oreg => VvOp::MovY2Oreg { ry: lo },
            Opcode::MovOreg2Act => VvOp::MovOreg2Act,
            Opcode::MovX2Act => VvOp::MovX2Act { rx: hi },
            // the opcode LSB is the address MSB
            Opcode::Write0 | Opcode::Write1 => {
                let addr = (opc & 1) << vvengine::MID_WIDTH | mid;
                VvOp::Write { addr: addr as u16, data: low as u16 as i16 }
            }
        };
        Ok(op)
    }
}

impl Decoder for DavinciDecoder {
    type Op = Decoded;

    fn decode(&self, raw: u32) -> Result<Decoded> {
        let payload = raw & ((1 << PAYLOAD_WIDTH) - 1);
        match raw >> PAYLOAD_WIDTH {
            GEMV_CODE => PicasoDecoder.decode(payload).map(Decoded::Gemv),
            VV_CODE => VvDecoder.decode(payload).map(Decoded::Vv),
            _ => Err(AsmError::Decode { submodule: "DA-VinCi", word: raw }),
        }
    }
}

/// Reads the words of a verilog memory image: one binary word per line,
/// `_` separators allowed, `//` comments and blank lines skipped.
pub fn parse_verilog_bin(text: &str) -> Result<Vec<u32>> {
    let width = (SUBMODULE_CODE_WIDTH + PAYLOAD_WIDTH) as usize;
    let mut words = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let code = line.split("//").next().unwrap_or("").trim();
        if code.is_empty() {
            continue;
        }
        let bits: String = code.chars().filter(|&c| c != '_').collect();
        let parse_err = |reason: String| AsmError::Parse { line: n + 1, reason };
        if bits.len() != width {
            return Err(parse_err(format!("expected {width} bits, found {}", bits.len())));
        }
        let word = u32::from_str_radix(&bits, 2).map_err(|e| parse_err(e.to_string()))?;
        words.push(word);
    }
    Ok(words)
}
