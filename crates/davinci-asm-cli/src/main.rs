use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use davinci_asm::decoder::{parse_verilog_bin, Decoded, Decoder, DavinciDecoder};
use davinci_asm::disasm::fmt_decoded;
use davinci_asm::{AsmParams, ExportOptions, Script, C_HEADER, C_HEADER_NAME};

#[derive(Parser, Debug)]
#[command(author, version, about = "DA-VinCi assembler CLI", long_about = None)]
struct Cli {
    /// Assembler parameter file (JSON); overrides the parameters of a program script
    #[arg(short, long, value_name = "FILE", global = true)]
    params: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the parameters and print the derived configuration
    Params {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the C header the exported programs include
    Header {
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Assemble a JSON program script
    Build {
        #[arg(value_name = "PROGRAM")]
        program: PathBuf,
        #[arg(long, value_enum, default_value_t = Target::Verilog)]
        target: Target,
        /// Name of the generated C program object
        #[arg(long, default_value = "davinci_prog")]
        name: String,
        /// Leave out user comments and macro markers
        #[arg(long)]
        no_comment: bool,
        /// Leave out source mnemonics
        #[arg(long)]
        no_source: bool,
        /// Separator between binary word segments
        #[arg(long, default_value = "_")]
        separator: String,
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Decode a verilog memory image back to mnemonics
    Disasm {
        #[arg(value_name = "MEMFILE")]
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Target {
    /// `$readmemb` binary text
    Verilog,
    /// C source over the hex words
    C,
}

#[derive(Debug, Serialize)]
struct DisasmLine {
    index: usize,
    word: u32,
    op: Decoded,
    text: String,
}

fn emit(out: Option<&Path>, text: &str) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "output written");
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn load_params(path: Option<&Path>) -> Result<Option<AsmParams>> {
    let params = path.map(AsmParams::from_json_file).transpose()?;
    Ok(params)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let params = load_params(cli.params.as_deref())?;

    match cli.cmd {
        Command::Params { format } => {
            let cfg = params.unwrap_or_default().validate()?;
            match format {
                OutputFormat::Text => print!("{}", cfg.summary()),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&cfg)?),
            }
        }
        Command::Header { out } => {
            info!("exporting {C_HEADER_NAME}");
            emit(out.as_deref(), C_HEADER)?;
        }
        Command::Build { program, target, name, no_comment, no_source, separator, out } => {
            let mut script = Script::from_json_file(&program).with_context(|| format!("loading {}", program.display()))?;
            if params.is_some() {
                script.params = params;
            }
            let mut asm = script.build().with_context(|| format!("assembling {}", program.display()))?;
            asm.assemble()?;
            let opts = ExportOptions { comment: !no_comment, source: !no_source, separator };
            let text = match target {
                Target::Verilog => asm.export_verilog_bin(&opts)?,
                Target::C => asm.export_c_prog_hex(&name, &opts)?,
            };
            emit(out.as_deref(), &text)?;
        }
        Command::Disasm { input, format, out } => {
            let text = std::fs::read_to_string(&input).with_context(|| format!("reading {}", input.display()))?;
            let mut lines = Vec::new();
            for (index, word) in parse_verilog_bin(&text)?.into_iter().enumerate() {
                let op = DavinciDecoder.decode(word).with_context(|| format!("word {index}"))?;
                lines.push(DisasmLine { index, word, text: fmt_decoded(&op), op });
            }
            let mut buf = String::new();
            match format {
                OutputFormat::Text => {
                    for l in &lines {
                        let _ = writeln!(buf, "{:5}: {:#010x}  {}", l.index, l.word, l.text);
                    }
                }
                OutputFormat::Json => buf = serde_json::to_string_pretty(&lines)? + "\n",
            }
            emit(out.as_deref(), &buf)?;
        }
    }
    Ok(())
}
