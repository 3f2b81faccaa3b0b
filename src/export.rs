//! Program text output: verilog `$readmemb` images and C arrays.

use tracing::{info, warn};

use crate::bitfield::{pack, to_bin_string, to_hex_string, Segment};
use crate::error::Result;
use crate::program::{Assembly, DavinciAsm, Instruction, WORD_WIDTH};

pub const C_HEADER_NAME: &str = "davinci_prog.h";

pub const C_HEADER: &str = r#"#ifndef DAVINCI_PROG_H
#define DAVINCI_PROG_H


#include <stdint.h>

typedef struct {
    const uint32_t * const instruction;
    const int size;
    // target DA-VinCi configuration of the program
    const int fracWidth;
    const int mvMaxRow;
    const int mvMaxCol;
    const int regWidth;
    const int idWidth;
    const int peCount;
} Davinci_Prog;


#endif  // DAVINCI_PROG_H
"#;

const C_INDENT: &str = "    ";

/// Annotation switches of the exported text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// User comments, macro markers and `as_comment` lines.
    pub comment: bool,
    /// Source mnemonic of each record.
    pub source: bool,
    /// Separator between binary word segments.
    pub separator: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { comment: true, source: true, separator: "_".into() }
    }
}

fn make_comment(text: &str) -> String {
    format!("// {text}")
}

/// `src; comment`, each part only when enabled and present.
fn meta_info(instr: &Instruction, opts: &ExportOptions) -> String {
    let mut parts = Vec::new();
    if opts.source {
        parts.push(instr.src());
    }
    if opts.comment {
        if let Some(c) = instr.comment().filter(|c| !c.is_empty()) {
            parts.push(c);
        }
    }
    parts.join("; ")
}

/// Renders one record; `None` when the record has no text under `opts`.
fn render(instr: &Instruction, assembly: &Assembly, opts: &ExportOptions, indent: &str, fmt_word: &dyn Fn(&[Segment; 4]) -> String) -> Option<String> {
    let meta = meta_info(instr, opts);
    match assembly {
        Assembly::Pseudo => match (opts.comment, instr.comment()) {
            (true, Some(c)) => Some(format!("{indent}{}", make_comment(c))),
            _ => None,
        },
        Assembly::Builtin { .. } => {
            let word = assembly.segments().first().map(fmt_word)?;
            if meta.is_empty() { Some(word) } else { Some(format!("{word}  {}", make_comment(&meta))) }
        }
        Assembly::Macro { .. } => {
            let mut lines = Vec::new();
            if opts.comment {
                lines.push(format!("{indent}{}", make_comment(&format!("---- MACRO: {meta}"))));
            }
            lines.extend(assembly.segments().iter().map(fmt_word));
            if opts.comment {
                lines.push(format!("{indent}{}", make_comment("---- End of MACRO")));
            }
            Some(lines.join("\n"))
        }
    }
}

impl DavinciAsm {
    fn ensure_assembled(&mut self) -> Result<()> {
        if !self.is_assembled() {
            warn!("export invoked before the code is assembled");
            info!("running assembler");
            self.assemble()?;
        }
        Ok(())
    }

    fn render_all(&self, opts: &ExportOptions, indent: &str, fmt_word: &dyn Fn(&[Segment; 4]) -> String) -> Vec<String> {
        self.instructions()
            .iter()
            .filter_map(|instr| render(instr, instr.assembly()?, opts, indent, fmt_word))
            .collect()
    }

    /// Verilog memory image: one binary word per line, newline terminated.
    pub fn export_verilog_bin(&mut self, opts: &ExportOptions) -> Result<String> {
        self.ensure_assembled()?;
        let sep = opts.separator.clone();
        let lines = self.render_all(opts, "", &|segs| to_bin_string(segs, &sep));
        Ok(lines.iter().map(|l| format!("{l}\n")).collect())
    }

    /// C source defining `progname` as a `Davinci_Prog` over the hex words.
    pub fn export_c_prog_hex(&mut self, progname: &str, opts: &ExportOptions) -> Result<String> {
        self.ensure_assembled()?;
        let words = self
            .render_all(opts, C_INDENT, &|segs| format!("{C_INDENT}{}, ", to_hex_string(pack(segs), WORD_WIDTH)))
            .join("\n");
        let cfg = self.config();
        let p = &cfg.picaso;
        Ok(format!(
            r#"#include "{C_HEADER_NAME}"


static const uint32_t word_arr[] = {{
{words}
}};


Davinci_Prog {progname} = {{
    word_arr,
    sizeof(word_arr)/sizeof(word_arr[0]),   // size
    {},    // fracWidth
    {},   // mvMaxRow
    {},   // mvMaxCol
    {},   // regWidth
    {},    // idWidth
    {},   // peCount
}};
"#,
            cfg.frac_width,
            cfg.mv_max_row.unwrap_or(0),
            cfg.mv_max_col.unwrap_or(0),
            p.reg_width,
            p.id_width,
            p.pe_count,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builtin_line_with_source_and_comment() {
        let mut asm = DavinciAsm::new();
        asm.note("go").mv_write(5, 10).unwrap();
        let text = asm.export_verilog_bin(&ExportOptions::default()).unwrap();
        assert_eq!(text, "00_0001_0000000101_0000000000001010  // MV_WRITE addr=5, data=0xA; go\n");
    }

    #[test]
    fn bare_words_without_annotations() {
        let mut asm = DavinciAsm::new();
        asm.as_comment("hidden");
        asm.vv_sync().unwrap();
        let opts = ExportOptions { comment: false, source: false, separator: String::new() };
        let text = asm.export_verilog_bin(&opts).unwrap();
        assert_eq!(text, format!("01{}\n", "0".repeat(30)));
    }

    #[test]
    fn macro_is_bracketed_by_markers() {
        let mut asm = DavinciAsm::new();
        asm.as_comment("start");
        asm.mv_sync().unwrap();
        let text = asm.export_verilog_bin(&ExportOptions::default()).unwrap();
        let nop = "00_0000_0000000000_0000000000000000";
        assert_eq!(text, format!("// start\n// ---- MACRO: MV_SYNC\n{nop}\n{nop}\n// ---- End of MACRO\n"));
    }

    #[test]
    fn export_assembles_on_demand() {
        let mut asm = DavinciAsm::new();
        asm.mv_nop().unwrap();
        assert!(!asm.is_assembled());
        asm.export_verilog_bin(&ExportOptions::default()).unwrap();
        assert!(asm.is_assembled());
    }

    #[test]
    fn c_program_uses_hex_words_and_config() {
        let mut asm = DavinciAsm::new();
        asm.vv_write(0x200, -1).unwrap();
        let opts = ExportOptions { comment: false, source: false, ..Default::default() };
        let text = asm.export_c_prog_hex("prog", &opts).unwrap();
        assert!(text.starts_with("#include \"davinci_prog.h\"\n"));
        assert!(text.contains("static const uint32_t word_arr[] = {\n    0x7E00FFFF, \n};"), "{text}");
        assert!(text.contains("Davinci_Prog prog = {"));
        assert!(text.contains("    0,    // fracWidth\n    0,   // mvMaxRow\n    0,   // mvMaxCol\n    16,   // regWidth\n    8,    // idWidth\n    16,   // peCount\n};\n"));
    }

    #[test]
    fn c_macro_markers_are_indented() {
        let mut asm = DavinciAsm::new();
        asm.vv_sync().unwrap();
        let text = asm.export_c_prog_hex("p", &ExportOptions::default()).unwrap();
        assert!(text.contains("    // ---- MACRO: VV_SYNC\n    0x40000000, \n    // ---- End of MACRO\n"), "{text}");
    }
}
