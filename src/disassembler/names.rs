//! Operand and signal names as the assembler accepts them.

use std::borrow::Cow;

use crate::expression::RegisterCapabilities;
use crate::instruction::small_immediate::code_value;
use crate::instruction::{NOP_REGISTER, Signal};

/// Name of the register written at `address` through register file A (`file_a`) or B.
#[must_use]
pub fn write_register(address: u8, file_a: bool) -> Cow<'static, str> {
	let pick = |a: &'static str, b: &'static str| Cow::Borrowed(if file_a { a } else { b });
	match address & 63 {
		number @ 0 ..= 31 => file_register(number, file_a),
		number @ 32 ..= 35 => Cow::Owned(format!("r{}", number - 32)),
		36 => Cow::Borrowed("tmu_noswap"),
		37 => pick("r5quad", "r5rep"),
		38 => Cow::Borrowed("host_int"),
		NOP_REGISTER => Cow::Borrowed("-"),
		40 => pick("unif_addr", "unif_addr_rel"),
		41 => pick("quad_x", "quad_y"),
		42 => pick("ms_flags", "rev_flag"),
		43 => Cow::Borrowed("tlb_stencil"),
		44 => Cow::Borrowed("tlb_z"),
		45 => Cow::Borrowed("tlb_color_ms"),
		46 => Cow::Borrowed("tlb_color_all"),
		47 => Cow::Borrowed("tlb_alpha_mask"),
		48 => Cow::Borrowed("vpm"),
		49 => pick("vr_setup", "vw_setup"),
		50 => pick("vr_addr", "vw_addr"),
		51 => Cow::Borrowed("mutex"),
		52 => Cow::Borrowed("sfu_recip"),
		53 => Cow::Borrowed("sfu_recipsqrt"),
		54 => Cow::Borrowed("sfu_exp"),
		55 => Cow::Borrowed("sfu_log"),
		56 => Cow::Borrowed("tmu0_s"),
		57 => Cow::Borrowed("tmu0_t"),
		58 => Cow::Borrowed("tmu0_r"),
		59 => Cow::Borrowed("tmu0_b"),
		60 => Cow::Borrowed("tmu1_s"),
		61 => Cow::Borrowed("tmu1_t"),
		62 => Cow::Borrowed("tmu1_r"),
		_ => Cow::Borrowed("tmu1_b"),
	}
}

/// Name of the register read at `address` through register file A (`file_a`) or B. Addresses without a readable
/// register are written as register constants.
#[must_use]
pub fn read_register(address: u8, file_a: bool) -> Cow<'static, str> {
	let pick = |a: &'static str, b: &'static str| Cow::Borrowed(if file_a { a } else { b });
	match address & 63 {
		number @ 0 ..= 31 => file_register(number, file_a),
		32 => Cow::Borrowed("unif"),
		35 => Cow::Borrowed("vary"),
		38 => pick("elem_num", "qpu_num"),
		NOP_REGISTER => Cow::Borrowed("-"),
		41 => pick("x_coord", "y_coord"),
		42 => pick("ms_flags", "rev_flag"),
		48 => Cow::Borrowed("vpm"),
		49 => pick("vr_busy", "vw_busy"),
		50 => pick("vr_wait", "vw_wait"),
		51 => Cow::Borrowed("mutex"),
		number => {
			let file = if file_a { RegisterCapabilities::FILE_A } else { RegisterCapabilities::FILE_B };
			Cow::Owned(format!(":[{number}, {}]", (file | RegisterCapabilities::READ).bits()))
		},
	}
}

fn file_register(number: u8, file_a: bool) -> Cow<'static, str> {
	Cow::Owned(format!("{}{number}", if file_a { "ra" } else { "rb" }))
}

/// Source operand text of a small immediate code. Rotation codes supply the value of the code 32 below them.
#[must_use]
pub fn small_immediate(code: u8) -> String {
	let value = code_value(code);
	match code & 63 {
		0 ..= 31 | 48 ..= 63 => (value as i32).to_string(),
		_ => format!("{:?}", f32::from_bits(value)),
	}
}

/// Mnemonic of a signal that is written as its own statement; `None` for signals that select an instruction class.
#[must_use]
pub const fn signal(signal: Signal) -> Option<&'static str> {
	Some(match signal {
		Signal::Breakpoint => "bkpt",
		Signal::ThreadSwitch => "thrsw",
		Signal::ProgramEnd => "thrend",
		Signal::WaitScoreboard => "sbwait",
		Signal::ScoreboardUnlock => "sbdone",
		Signal::LastThreadSwitch => "lthrsw",
		Signal::CoverageLoad => "loadcv",
		Signal::ColorLoad => "loadc",
		Signal::ColorLoadEnd => "ldcend",
		Signal::LoadTmu0 => "ldtmu0",
		Signal::LoadTmu1 => "ldtmu1",
		Signal::AlphaMaskLoad => "loadam",
		Signal::None | Signal::SmallImmediate | Signal::LoadImmediate | Signal::Branch => return None,
	})
}
