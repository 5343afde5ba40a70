//! Label definition and reference.
//!
//! Labels live in a list that survives into pass 2, in order of first occurrence. Pass 2 must meet the labels in the
//! very same order; the name lookup table is rebuilt by each pass, which is what allows numeric labels to be redefined.

use miette::SourceSpan;

use super::context::{Label, LabelSite};
use super::{Assembler, Result};
use crate::error::ErrorKind;
use crate::expression::Value;
use crate::instruction::InstructionFlags;

impl Assembler {
	/// Claims the next slot of the label list for `name`, checking consistency with pass 1.
	fn new_label(&mut self, name: &str, span: SourceSpan) -> Result<usize> {
		let index = self.pass.label_count;
		if self.pass2 {
			if self.carried.labels.get(index).is_none_or(|label| label.name != name) {
				return Err(self.error(ErrorKind::InconsistentPass("label definition"), span));
			}
		} else {
			self.carried.labels.push(Label::new(name.to_owned()));
		}
		self.pass.labels_by_name.insert(name.to_owned(), index);
		self.pass.label_count += 1;
		Ok(index)
	}

	/// Defines a label at the current position. Names starting with a digit may be redefined; every definition is a
	/// separate label then.
	pub(super) fn define_label(&mut self, name: &str, exported: bool, span: SourceSpan) -> Result {
		let index = match self.pass.labels_by_name.get(name) {
			Some(&index) => match self.carried.labels[index].definition {
				None => index,
				Some(previous) => {
					if !name.starts_with(|chr: char| chr.is_ascii_digit()) {
						let previous = self.describe(previous.location);
						return Err(self.error(ErrorKind::LabelRedefinition { name: name.to_owned(), previous }, span));
					}
					self.new_label(name, span)?
				},
			},
			None => self.new_label(name, span)?,
		};

		if !self.pass2 {
			if self.pass.bit_offset & 7 != 0 {
				return Err(self.error(ErrorKind::UnalignedLabel, span));
			}
			self.carried.labels[index].value = (self.pass.pc * 8 + self.pass.bit_offset as usize / 8) as i64;
		}
		let location = self.location();
		let label = &mut self.carried.labels[index];
		label.definition = Some(LabelSite { location, span });
		label.exported = exported;

		let pc = self.pass.pc;
		self.pass.ensure_flags(pc);
		self.pass.flags[pc] |= InstructionFlags::BRANCH_TARGET;
		Ok(())
	}

	/// Resolves a label reference. A forward reference (`:1f`) always refers to the next definition of the name, even
	/// if the name is already defined.
	pub(super) fn label_ref(&mut self, name: &str, forward: bool, span: SourceSpan) -> Result<Value> {
		let existing = self.pass.labels_by_name.get(name).copied();
		let index = match existing {
			Some(index) if !(forward && self.carried.labels[index].definition.is_some()) => index,
			_ => self.new_label(name, span)?,
		};
		let location = self.location();
		let label = &mut self.carried.labels[index];
		if label.reference.is_none() {
			label.reference = Some(LabelSite { location, span });
		}
		Ok(Value::Label(label.value))
	}
}
