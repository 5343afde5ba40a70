//! qpudis binary.
#![deny(missing_docs, unused, clippy::all, clippy::pedantic, clippy::nursery)]

use std::fs::File;
use std::io::Write;

use miette::{IntoDiagnostic, WrapErr};
use qpuasm::cli::{self, QpudisCli};
use qpuasm::{Disassembler, DisassemblerOptions};

fn main() -> miette::Result<()> {
	use clap::Parser;

	human_panic::setup_panic!(human_panic::metadata!());

	let args = QpudisCli::parse();
	simple_logger::SimpleLogger::new()
		.with_level(cli::log_level(args.verbose))
		.without_timestamps()
		.init()
		.into_diagnostic()?;

	let bytes = std::fs::read(&args.input)
		.into_diagnostic()
		.wrap_err_with(|| format!("cannot read {}", args.input.display()))?;
	let chunks = bytes.chunks_exact(8);
	if !chunks.remainder().is_empty() {
		log::warn!("ignoring {} trailing bytes that do not form an instruction", chunks.remainder().len());
	}
	let words: Vec<u64> = chunks.map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap_or_default())).collect();

	let mut disassembler = Disassembler::new(DisassemblerOptions {
		use_mov:       !args.no_mov,
		use_float:     args.use_float,
		print_fields:  !args.no_fields,
		print_comment: !args.no_comment,
		base:          args.base,
	});
	disassembler.scan_labels(&words);
	log::info!("disassembling {} words with {} labels", words.len(), disassembler.labels().len());
	let text = disassembler.disassemble(&words);

	let mut output: Box<dyn Write> = match args.output {
		Some(path) if path.to_string_lossy() != "-" =>
			Box::new(std::io::BufWriter::new(File::create(path).into_diagnostic()?)),
		_ => Box::new(std::io::stdout().lock()),
	};
	output.write_all(text.as_bytes()).into_diagnostic()?;
	output.flush().into_diagnostic()
}
