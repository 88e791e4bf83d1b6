use clap::*;
use std::path::PathBuf;

#[derive(Debug, Subcommand)]
pub enum Command {
  /// Build an image from a directory.
  Create {
    output: PathBuf,
    #[clap(required = true)]
    directory: PathBuf,
    /// Volume identifier recorded in the descriptors.
    #[clap(long, short = 'V')]
    volume_id: Option<String>,
    #[clap(long)]
    system_id: Option<String>,
    #[clap(long)]
    publisher: Option<String>,
    #[clap(long)]
    preparer: Option<String>,
    #[clap(long)]
    application: Option<String>,
    /// ISO 9660 interchange level (1-3).
    #[clap(long, default_value_t = 1)]
    level: u8,
    /// Record a Joliet hierarchy alongside the ISO 9660 one.
    #[clap(long, short = 'J')]
    joliet: bool,
    /// Record Rock Ridge POSIX metadata.
    #[clap(long, short = 'R')]
    rock_ridge: bool,
    /// Rock Ridge permission override, PATTERN=OCTAL, repeatable. Implies
    /// --rock-ridge.
    #[clap(long = "mode", value_name = "PATTERN=MODE")]
    modes: Vec<String>,
    /// Make the image bootable with the given boot image (path inside the
    /// captured directory).
    #[clap(long)]
    boot_image: Option<PathBuf>,
    /// Boot platform: x86, ppc, mac or efi.
    #[clap(long, default_value = "x86")]
    boot_platform: String,
    /// Boot emulation: none, 1.2, 1.44, 2.88 or hd.
    #[clap(long, default_value = "none")]
    boot_emulation: String,
    /// Patch a boot info table into the boot image.
    #[clap(long)]
    boot_info_table: bool,
  },
  /// List the entries of an existing image.
  List { image: PathBuf },
}

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
  #[clap(subcommand)]
  pub command: Command,
}

pub fn parse() -> Cli {
  Cli::parse()
}
