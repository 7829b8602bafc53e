use std::fmt;

use crate::config::OptionFamily;
use crate::exec::{LinuxExecutePlatform, MacOsExecutePlatform};
use crate::reference::TypeRef;

/// Operating system options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
  Linux,
  MacOs,
  Windows,
  Wasi,
  UnknownOs,
}

impl Os {
  /// Detect the current operating system at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::MacOs),
      "windows" => Some(Self::Windows),
      _ => None,
    }
  }

  /// Returns the lowercase string identifier for this OS
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::MacOs => "darwin",
      Self::Windows => "windows",
      Self::Wasi => "wasi",
      Self::UnknownOs => "unknown",
    }
  }

  /// Provider type describing how actions execute on this OS, if any.
  pub fn execute_platform_provider(&self) -> Option<TypeRef> {
    match self {
      Self::Linux => Some(LinuxExecutePlatform::reference()),
      Self::MacOs => Some(MacOsExecutePlatform::reference()),
      Self::Windows | Self::Wasi | Self::UnknownOs => None,
    }
  }
}

impl OptionFamily for Os {
  const SOURCE: &'static str = "platform";
  const FAMILY: &'static str = "Os";

  fn all() -> &'static [Self] {
    &[Self::Linux, Self::MacOs, Self::Windows, Self::Wasi, Self::UnknownOs]
  }

  fn qualname(self) -> &'static str {
    match self {
      Self::Linux => "Linux",
      Self::MacOs => "MacOs",
      Self::Windows => "Windows",
      Self::Wasi => "Wasi",
      Self::UnknownOs => "UnknownOs",
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
