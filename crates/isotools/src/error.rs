use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("walkdir error: {0}")]
  WalkDir(#[from] walkdir::Error),
  #[error("Invalid configuration: {0}")]
  Config(String),
  #[error("{convention}: {message}")]
  Naming {
    convention: &'static str,
    message: String,
  },
  #[error("Invalid image: {0}")]
  Format(String),
  #[error("Filesystem closed")]
  Closed,
  #[error("Not a file: {0}")]
  NotAFile(PathBuf),
}

impl Error {
  pub(crate) fn naming(convention: &'static str, message: impl Into<String>) -> Self {
    Error::Naming {
      convention,
      message: message.into(),
    }
  }
}

/// Non-fatal policy outcomes recorded during a build.
///
/// Warnings are logged as they occur and returned alongside the finished
/// image so callers can inspect them. Joliet truncation can be escalated to
/// a hard error via [`crate::JolietConfig::fail_on_truncation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
  /// A Joliet filename exceeded the configured maximum and was shortened.
  JolietTruncation { name: String, truncated: String },
  /// A logical path exceeded the 255-byte interchange ceiling (ISO 9660
  /// 6.8.2.1). Informational only.
  PathLength(String),
  /// The configured Joliet filename limit exceeds 64, which breaks the
  /// Joliet standard.
  JolietLimitNonStandard(u16),
}

impl std::fmt::Display for Warning {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Warning::JolietTruncation { name, truncated } => {
        write!(f, "Joliet: filename {name:?} truncated to {truncated:?}")
      }
      Warning::PathLength(path) => {
        write!(f, "ISO 9660: path length exceeds 255 bytes: {path}")
      }
      Warning::JolietLimitNonStandard(limit) => {
        write!(f, "Joliet: filename limit {limit} exceeds the standard 64")
      }
    }
  }
}
