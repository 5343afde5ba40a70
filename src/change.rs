//! Enum specifying whether a rewrite modified its subject or not.

/// Outcome of a rewrite.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
#[repr(u8)]
pub enum Change {
	#[default]
	/// Nothing changed.
	Unmodified,
	/// Something changed.
	Modified,
}

impl Change {
	/// Whether anything was modified.
	#[must_use]
	pub const fn is_modified(self) -> bool {
		matches!(self, Self::Modified)
	}
}

impl From<bool> for Change {
	fn from(modified: bool) -> Self {
		if modified { Self::Modified } else { Self::Unmodified }
	}
}

impl std::ops::BitOrAssign for Change {
	fn bitor_assign(&mut self, rhs: Self) {
		*self = *self | rhs;
	}
}

impl std::ops::BitOr for Change {
	type Output = Self;

	fn bitor(self, rhs: Self) -> Self::Output {
		Self::from(self.is_modified() || rhs.is_modified())
	}
}
