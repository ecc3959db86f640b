use std::fs;
use std::io::Read;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rnc_convert_core::{FsResolver, Options, XmlSerializer, parse_with, resolve};

// ── CLI definition ──────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "rncc",
    version,
    about = "Convert RELAX NG compact syntax (RNC) to XML syntax (RNG)"
)]
struct Cli {
    /// Input schema file; reads stdin when omitted or `-`. Relative
    /// includes resolve against the input file's directory (or the
    /// current directory for stdin).
    input: Option<String>,

    /// Output file; writes stdout when omitted.
    output: Option<String>,

    /// Spaces per indentation level in the XML output.
    #[arg(long, default_value_t = 2)]
    indent: usize,

    /// What to emit.
    #[arg(long, value_enum, default_value_t = EmitKind::Xml)]
    emit: EmitKind,
}

/// Output form of the conversion.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmitKind {
    /// The XML-syntax schema.
    Xml,
    /// The parsed tree as JSON, for inspection.
    Ast,
}

// ── Main ────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (src, file, base) = read_input(cli.input.as_deref())?;
    let root = parse_with(
        &src,
        Options {
            file: file.as_deref(),
            base: Some(&base),
            resolver: &FsResolver,
        },
    )?;

    let out = match cli.emit {
        EmitKind::Xml => {
            let indent = " ".repeat(cli.indent);
            XmlSerializer::with_indent(&indent).to_xml(&root)?
        }
        EmitKind::Ast => serde_json::to_string_pretty(&root)?,
    };

    match cli.output.as_deref() {
        Some(path) => fs::write(path, format!("{out}\n"))
            .with_context(|| format!("failed to write '{path}'"))?,
        None => println!("{out}"),
    }
    Ok(())
}

// ── Input handling ──────────────────────────────────────────────────────

/// Read the schema source, returning (text, display name, include base).
fn read_input(path: Option<&str>) -> Result<(String, Option<String>, String)> {
    match path {
        Some(path) if path != "-" => {
            let bytes =
                fs::read(path).with_context(|| format!("failed to read '{path}'"))?;
            let text =
                resolve::decode(&bytes).with_context(|| format!("failed to decode '{path}'"))?;
            let base = resolve::parent_location(path);
            Ok((text, Some(path.to_string()), base))
        }
        _ => {
            let mut bytes = Vec::new();
            std::io::stdin()
                .read_to_end(&mut bytes)
                .context("failed to read stdin")?;
            let text = resolve::decode(&bytes).context("failed to decode stdin")?;
            Ok((text, None, ".".to_string()))
        }
    }
}
