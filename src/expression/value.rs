//! Typed values.

use std::fmt::Display;

use bitflags::bitflags;

use crate::error::EvalError;

bitflags! {
	/// How a register may be accessed.
	#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
	pub struct RegisterCapabilities: u8 {
		/// Accessible through register file A.
		const FILE_A = 0x01;
		/// Accessible through register file B.
		const FILE_B = 0x02;
		/// Accessible through either register file under the same address.
		const FILES = 0x03;
		/// Readable through a register file port.
		const READ = 0x04;
		/// Writable.
		const WRITE = 0x08;
		/// A semaphore pseudo-register; only usable as a load immediate source.
		const SEMAPHORE = 0x10;
		/// Semaphore acquire rather than release.
		const ACQUIRE = 0x20;
		/// An accumulator, read through the source multiplexer instead of a register file port.
		const ACCUMULATOR = 0x40;
	}
}

/// Rotation amount that requests a vector rotation by the contents of r5.
pub const ROTATE_BY_R5: u8 = 16;

/// A reference to a register, as produced by register names, rotation operators and `:[...]` constants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RegisterDescriptor {
	/// Register address. Accumulators r0 to r5 are numbered 32 to 37.
	pub number:       u8,
	/// Access rights.
	pub capabilities: RegisterCapabilities,
	/// Requested vector rotation to the right, 0 to 15, or [`ROTATE_BY_R5`].
	pub rotation:     u8,
}

impl RegisterDescriptor {
	/// Creates a register without rotation.
	#[must_use]
	pub const fn new(number: u8, capabilities: RegisterCapabilities) -> Self {
		Self { number, capabilities, rotation: 0 }
	}

	/// Rotates the register's vector elements right by the given amount. Negative amounts rotate left.
	///
	/// # Errors
	/// If the register is already rotated by r5.
	pub fn rotated_right(self, amount: i64) -> Result<Self, EvalError> {
		if self.rotation == ROTATE_BY_R5 {
			return Err(EvalError::InvalidRotation);
		}
		let rotation = (i64::from(self.rotation) + amount).rem_euclid(16) as u8;
		Ok(Self { rotation, ..self })
	}

	/// Rotates the register's vector elements right by the runtime value of r5.
	///
	/// # Errors
	/// If the register is already rotated.
	pub fn rotated_by_r5(self) -> Result<Self, EvalError> {
		if self.rotation != 0 {
			return Err(EvalError::InvalidRotation);
		}
		Ok(Self { rotation: ROTATE_BY_R5, ..self })
	}

	/// Whether this is the accumulator r5, which is the only valid dynamic rotation source.
	#[must_use]
	pub const fn is_r5(&self) -> bool {
		self.number == 37 && self.capabilities.contains(RegisterCapabilities::ACCUMULATOR)
	}
}

/// Sign interpretation of a per-element constant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ElementSign {
	/// All elements are 0 or 1, so both interpretations hold.
	#[default]
	Either,
	/// Elements in the range -2 to 1.
	Signed,
	/// Elements in the range 0 to 3.
	Unsigned,
}

/// Result of evaluating an expression.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Value {
	/// Nothing; an empty expression.
	#[default]
	None,
	/// Integer.
	Integer(i64),
	/// Floating point number.
	Float(f64),
	/// Register reference.
	Register(RegisterDescriptor),
	/// Label, i.e. a byte address into the code.
	Label(i64),
	/// Per-element constant for the 16 SIMD elements: the element LSBs in the lower, the MSBs in the upper half.
	PerElement(u32, ElementSign),
}

impl Value {
	/// Short name of the value's type, for messages.
	#[must_use]
	pub const fn type_name(&self) -> &'static str {
		match self {
			Self::None => "nothing",
			Self::Integer(_) => "integer",
			Self::Float(_) => "float",
			Self::Register(_) => "register",
			Self::Label(_) => "label",
			Self::PerElement(..) => "per-element constant",
		}
	}

	/// The 32 bit pattern that the QPU would see for this value. Floats are narrowed to single precision.
	#[must_use]
	pub fn as_qpu_value(&self) -> Option<u32> {
		match *self {
			Self::Integer(value) | Self::Label(value) => Some(value as u32),
			Self::Float(value) => Some((value as f32).to_bits()),
			Self::PerElement(value, _) => Some(value),
			Self::None | Self::Register(_) => None,
		}
	}

	/// Whether an integer does not fit into 32 bits in either signed or unsigned interpretation.
	#[must_use]
	pub fn exceeds_32_bits(&self) -> bool {
		matches!(*self, Self::Integer(value) if value < i64::from(i32::MIN) || value > i64::from(u32::MAX))
	}

	/// Truthiness used by conditional directives.
	#[must_use]
	pub fn is_true(&self) -> Option<bool> {
		match *self {
			Self::Integer(value) | Self::Label(value) => Some(value != 0),
			Self::Float(value) => Some(value != 0.),
			_ => None,
		}
	}
}

impl Display for Value {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match *self {
			Self::None => f.write_str("<none>"),
			Self::Integer(value) => write!(f, "{value}"),
			Self::Float(value) => write!(f, "{value:?}"),
			Self::Register(register) => write!(
				f,
				":[{}, {}, {}]",
				register.number,
				register.capabilities.bits(),
				register.rotation
			),
			Self::Label(value) => write!(f, ":({value})"),
			Self::PerElement(value, _) => {
				f.write_str("[")?;
				for element in 0 .. 16 {
					let element_value = (value >> element) & 1 | (value >> (15 + element)) & 2;
					if element > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{element_value}")?;
				}
				f.write_str("]")
			},
		}
	}
}
