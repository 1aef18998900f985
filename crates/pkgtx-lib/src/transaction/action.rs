use serde::{Serialize, Deserialize};

use crate::{PackageKey, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
	Install,
	Uninstall,
}

impl ActionKind {
	pub fn from_u8(value: u8) -> Option<ActionKind> {
		match value {
			0 => Some(ActionKind::Install),
			1 => Some(ActionKind::Uninstall),
			_ => None,
		}
	}

	pub fn to_u8(self) -> u8 {
		match self {
			ActionKind::Install => 0,
			ActionKind::Uninstall => 1,
		}
	}
}

impl std::fmt::Display for ActionKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			ActionKind::Install => "install",
			ActionKind::Uninstall => "uninstall",
		})
	}
}

/// Something the caller wants done to a package. Not validated in any way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
	pub kind: ActionKind,
	pub target: Target,
	pub key: PackageKey,
}

impl Action {
	pub fn new(kind: ActionKind, target: Target, key: PackageKey) -> Self {
		Action { kind, target, key }
	}

	pub fn install(key: PackageKey, target: Target) -> Self {
		Action::new(ActionKind::Install, target, key)
	}

	pub fn uninstall(key: PackageKey, target: Target) -> Self {
		Action::new(ActionKind::Uninstall, target, key)
	}
}

impl std::fmt::Display for Action {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} {} ({})", self.kind, self.key, self.target)
	}
}
