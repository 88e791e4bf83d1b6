//! ISO 9660 filesystem images: building and reading.
//!
//! The write path turns a [`tree::Tree`] of directories and files into a
//! sector-addressable ISO 9660 image, optionally extended with Joliet long
//! filenames, Rock Ridge POSIX metadata and an El Torito boot record. The
//! read path opens such an image and exposes a breadth-first, lazily backed
//! view of its entries without materializing the whole image in memory.

pub mod config;
pub mod eltorito;
pub mod error;
pub mod layout;
pub mod lba;
pub mod naming;
pub mod path;
pub mod read;
pub mod rockridge;
pub mod serialize;
pub mod spec;
pub mod tree;
pub mod writer;

pub use config::{ElToritoConfig, ImageOptions, Iso9660Config, JolietConfig, RockRidgeConfig};
pub use error::{Error, Result, Warning};
pub use read::IsoFileSystem;
pub use tree::{FileContent, Tree};
pub use writer::{BuildReport, IsoWriter};

pub(crate) mod prelude {
  pub(crate) use crate::error::{Error, Result, Warning};
}
