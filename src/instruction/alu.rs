//! Constant evaluation of ALU operations and pack modes.
//!
//! This models what the hardware computes for the same value on every SIMD element. It is used to derive the small
//! immediate table and to print constants in disassembly; it is not a simulator.

use super::opcode::{AddOp, MulOp, Pack};

fn float(value: u32) -> f32 {
	f32::from_bits(value)
}

/// Applies `operation` to each of the four bytes.
fn per_byte(a: u32, b: u32, operation: impl Fn(u32, u32) -> u32) -> u32 {
	(0 .. 4).fold(0, |result, byte| {
		let shift = byte * 8;
		result | (operation((a >> shift) & 0xff, (b >> shift) & 0xff).min(0xff) << shift)
	})
}

/// Result of an ADD ALU operation.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn evaluate_add(op: AddOp, a: u32, b: u32) -> u32 {
	match op {
		AddOp::Nop
		| AddOp::Reserved9
		| AddOp::Reserved10
		| AddOp::Reserved11
		| AddOp::Reserved25
		| AddOp::Reserved26
		| AddOp::Reserved27
		| AddOp::Reserved28
		| AddOp::Reserved29 => 0,
		AddOp::Fadd => (float(a) + float(b)).to_bits(),
		AddOp::Fsub => (float(a) - float(b)).to_bits(),
		AddOp::Fmin => float(a).min(float(b)).to_bits(),
		AddOp::Fmax => float(a).max(float(b)).to_bits(),
		AddOp::Fminabs => float(a).abs().min(float(b).abs()).to_bits(),
		AddOp::Fmaxabs => float(a).abs().max(float(b).abs()).to_bits(),
		AddOp::Ftoi => float(a) as i32 as u32,
		AddOp::Itof => (a as i32 as f32).to_bits(),
		AddOp::Add => a.wrapping_add(b),
		AddOp::Sub => a.wrapping_sub(b),
		AddOp::Shr => a >> (b & 31),
		AddOp::Asr => ((a as i32) >> (b & 31)) as u32,
		AddOp::Ror => a.rotate_right(b & 31),
		AddOp::Shl => a << (b & 31),
		AddOp::Min => (a as i32).min(b as i32) as u32,
		AddOp::Max => (a as i32).max(b as i32) as u32,
		AddOp::And => a & b,
		AddOp::Or => a | b,
		AddOp::Xor => a ^ b,
		AddOp::Not => !a,
		AddOp::Clz => a.leading_zeros(),
		AddOp::V8adds => per_byte(a, b, |a, b| a + b),
		AddOp::V8subs => per_byte(a, b, u32::saturating_sub),
	}
}

/// Result of a MUL ALU operation.
#[must_use]
pub fn evaluate_mul(op: MulOp, a: u32, b: u32) -> u32 {
	match op {
		MulOp::Nop => 0,
		MulOp::Fmul => (float(a) * float(b)).to_bits(),
		MulOp::Mul24 => (a & 0x00ff_ffff).wrapping_mul(b & 0x00ff_ffff),
		MulOp::V8muld => per_byte(a, b, |a, b| (a * b + 127) / 255),
		MulOp::V8min => per_byte(a, b, u32::min),
		MulOp::V8max => per_byte(a, b, u32::max),
		MulOp::V8adds => per_byte(a, b, |a, b| a + b),
		MulOp::V8subs => per_byte(a, b, u32::saturating_sub),
	}
}

/// Converts a float in [0, 1] to an 8-bit color channel.
fn color_channel(value: u32) -> u32 {
	let value = float(value);
	if value.is_nan() { 0 } else { (value.clamp(0., 1.) * 255.).round() as u32 }
}

/// Saturates a signed integer to an unsigned range.
fn saturate_unsigned(value: u32, maximum: i64) -> u32 {
	i64::from(value as i32).clamp(0, maximum) as u32
}

/// Saturates a signed integer to a signed 16-bit range.
fn saturate_signed_16(value: u32) -> u32 {
	i64::from(value as i32).clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as u32 & 0xffff
}

/// The bits written to the target when `value` is stored with the given pack mode. With `pm` set, the MUL ALU color
/// conversion is applied instead of the register file A pack.
///
/// Partial writes only yield the bits that are written; the remaining bits of the target are unchanged by the
/// hardware and returned as zero here.
#[must_use]
pub fn evaluate_pack(value: u32, pack: Pack, pm: bool) -> u32 {
	if pm {
		let channel = color_channel(value);
		return match pack as u8 & 7 {
			0 => value,
			3 => channel * 0x0101_0101,
			mode @ 4 ..= 7 => channel << ((u32::from(mode) - 4) * 8),
			_ => value,
		};
	}
	match pack {
		Pack::None => value,
		Pack::Half16a => value & 0xffff,
		Pack::Half16b => (value & 0xffff) << 16,
		Pack::Replicate8888 => (value & 0xff) * 0x0101_0101,
		Pack::Byte8a => value & 0xff,
		Pack::Byte8b => (value & 0xff) << 8,
		Pack::Byte8c => (value & 0xff) << 16,
		Pack::Byte8d => (value & 0xff) << 24,
		Pack::Saturate32 => value,
		Pack::Half16aSaturate => saturate_signed_16(value),
		Pack::Half16bSaturate => saturate_signed_16(value) << 16,
		Pack::Replicate8888Saturate => saturate_unsigned(value, 0xff) * 0x0101_0101,
		Pack::Byte8aSaturate => saturate_unsigned(value, 0xff),
		Pack::Byte8bSaturate => saturate_unsigned(value, 0xff) << 8,
		Pack::Byte8cSaturate => saturate_unsigned(value, 0xff) << 16,
		Pack::Byte8dSaturate => saturate_unsigned(value, 0xff) << 24,
	}
}
