//! Segment system.
//!
//! Segments classify consecutive runs of the instruction sequence as code or data for downstream emitters. The list
//! always starts with a segment at index 0 and is ordered by start index.

use std::fmt::Display;

/// Classification of a segment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SegmentKind {
	/// Not classified (yet); becomes code if it contains instructions.
	#[default]
	None,
	/// Instructions.
	Code,
	/// Data emitted by data directives or marked with `.data`.
	Data,
}

impl Display for SegmentKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Self::None => "none",
			Self::Code => "code",
			Self::Data => "data",
		})
	}
}

/// A run of instructions starting at `start` and extending up to the start of the next segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Segment {
	/// Index of the first instruction.
	pub start: usize,
	/// Classification.
	pub kind:  SegmentKind,
}

/// The ordered segment list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segments {
	segments: Vec<Segment>,
}

impl Default for Segments {
	fn default() -> Self {
		Self { segments: vec![Segment { start: 0, kind: SegmentKind::None }] }
	}
}

impl Segments {
	/// All segments, ordered by start index.
	#[must_use]
	pub fn segments(&self) -> &[Segment] {
		&self.segments
	}

	/// Index into the list of the segment containing the instruction at `pc`.
	fn index_at(&self, pc: usize) -> usize {
		// The first segment starts at 0, so there is always at least one segment at or before pc.
		self.segments.partition_point(|segment| segment.start <= pc).saturating_sub(1)
	}

	/// The classification of the instruction at `pc`.
	#[must_use]
	pub fn kind_at(&self, pc: usize) -> SegmentKind {
		self.segments[self.index_at(pc)].kind
	}

	/// Classifies everything from `pc` on as `kind`, up to the next segment boundary.
	pub fn set_kind(&mut self, pc: usize, kind: SegmentKind) {
		let index = self.index_at(pc);
		let current = &mut self.segments[index];
		if current.kind == kind {
			return;
		}
		if current.start == pc {
			current.kind = kind;
		} else {
			self.segments.insert(index + 1, Segment { start: pc, kind });
		}
		log::debug!("Starting {kind} segment at instruction {pc}");
	}

	/// Classifies unclassified segments that contain instructions as code. `is_data` tells for every instruction
	/// whether it was emitted by a data directive. Data that follows automatically detected code in the same segment
	/// starts a new unclassified segment.
	pub fn detect_code(&mut self, is_data: impl IntoIterator<Item = bool>) {
		let mut current = 0;
		let mut autocode = false;
		for (pc, is_data) in is_data.into_iter().enumerate() {
			if self.segments.get(current + 1).is_some_and(|next| next.start <= pc) {
				current += 1;
				autocode = false;
			}
			if !is_data {
				let segment = &mut self.segments[current];
				if segment.kind == SegmentKind::None {
					if segment.start == pc {
						segment.kind = SegmentKind::Code;
					} else {
						current += 1;
						self.segments.insert(current, Segment { start: pc, kind: SegmentKind::Code });
					}
					autocode = true;
				}
			} else if autocode {
				current += 1;
				self.segments.insert(current, Segment { start: pc, kind: SegmentKind::None });
				autocode = false;
			}
		}
	}
}
