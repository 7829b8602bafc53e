use std::fmt;

use crate::config::OptionFamily;

/// CPU architecture options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  X86_64,
  Aarch64,
  Wasm32,
}

impl Arch {
  /// Detect the current CPU architecture at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" => Some(Self::X86_64),
      "aarch64" => Some(Self::Aarch64),
      "wasm32" => Some(Self::Wasm32),
      _ => None,
    }
  }

  /// Returns the lowercase string identifier for this architecture
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::Aarch64 => "aarch64",
      Self::Wasm32 => "wasm32",
    }
  }
}

impl OptionFamily for Arch {
  const SOURCE: &'static str = "platform";
  const FAMILY: &'static str = "Arch";

  fn all() -> &'static [Self] {
    &[Self::X86_64, Self::Aarch64, Self::Wasm32]
  }

  fn qualname(self) -> &'static str {
    match self {
      Self::X86_64 => "X86_64",
      Self::Aarch64 => "Aarch64",
      Self::Wasm32 => "Wasm32",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
