//! qpuasm binary.
#![deny(missing_docs, unused, clippy::all, clippy::pedantic, clippy::nursery)]

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use miette::IntoDiagnostic;
use qpuasm::cli::{self, CliFrontend, OutputFormat, QpuasmCli};
use qpuasm::{AssembledProgram, Disassembler, DisassemblerOptions, ErrorKind, FileSystem, pretty_hex, run_assembler};

/// Width of the instruction column in listings.
const LISTING_WIDTH: usize = 48;

fn main() -> miette::Result<()> {
	use clap::Parser;

	human_panic::setup_panic!(human_panic::metadata!());
	miette::set_hook(Box::new(|_| {
		Box::new(
			miette::MietteHandlerOpts::new().unicode(true).context_lines(3).tab_width(4).with_cause_chain().build(),
		)
	}))?;

	let args = QpuasmCli::parse();
	simple_logger::SimpleLogger::new()
		.with_level(cli::log_level(args.verbose))
		.without_timestamps()
		.init()
		.into_diagnostic()?;

	let frontend = Arc::new(CliFrontend::new(args.warning_flags, args.maximum_expansion_depth));
	let program = match run_assembler(frontend.clone(), FileSystem, &args.inputs, &args.include_paths) {
		Ok(program) => program,
		// Diagnostics are already reported.
		Err(error) if matches!(error.kind, ErrorKind::AssemblyFailed) => std::process::exit(1),
		Err(error) => return Err(miette::Report::new(*error)),
	};
	if frontend.had_error() {
		std::process::exit(1);
	}
	log::info!("assembled {} instruction words from {} files", program.words.len(), program.files.len());

	let mut output = open_output(args.output.as_deref())?;
	match args.output_format {
		OutputFormat::Plain => output.write_all(&program.to_bytes()),
		OutputFormat::Hex => output.write_all(pretty_hex(&program.words).as_bytes()),
		OutputFormat::Listing => output.write_all(listing(&program).as_bytes()),
	}
	.into_diagnostic()?;
	output.flush().into_diagnostic()?;

	if args.symbols {
		for (name, value) in program.symbols() {
			eprintln!("{name:<24} 0x{value:08x}");
		}
	}
	Ok(())
}

/// Opens the output file, where no file or `-` means standard output.
fn open_output(path: Option<&Path>) -> miette::Result<Box<dyn Write>> {
	Ok(match path {
		Some(path) if path.to_string_lossy() != "-" => Box::new(std::io::BufWriter::new(
			File::options().create(true).truncate(true).write(true).open(path).into_diagnostic()?,
		)),
		_ => Box::new(std::io::stdout().lock()),
	})
}

/// Disassembly of the program with the source statement of every instruction next to it.
fn listing(program: &AssembledProgram) -> String {
	let mut disassembler = Disassembler::new(DisassemblerOptions { print_comment: false, ..Default::default() });
	disassembler.provide_labels(program.label_map(false));
	let mut text = String::new();
	for (pc, &word) in program.words.iter().enumerate() {
		let address = (pc * 8) as u32;
		for label in program.labels_for_instruction(pc, false) {
			text += &format!(":{label}\n");
		}
		let (statement, _) = disassembler.disassemble_instruction(word, address);
		let line = format!(
			"{address:04x}: {word:016x}  {statement:<LISTING_WIDTH$} # {}",
			program.source_line(pc).unwrap_or_default()
		);
		text += line.trim_end();
		text.push('\n');
	}
	text
}
