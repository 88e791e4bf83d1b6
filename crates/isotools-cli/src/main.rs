mod cli;

use isotools::{
  config::{BootEmulation, BootPlatformId},
  ElToritoConfig, Error, ImageOptions, IsoWriter, JolietConfig, RockRidgeConfig,
};

fn main() -> Result<(), Error> {
  pretty_env_logger::init();

  match cli::parse().command {
    cli::Command::Create {
      output,
      directory,
      volume_id,
      system_id,
      publisher,
      preparer,
      application,
      level,
      joliet,
      rock_ridge,
      modes,
      boot_image,
      boot_platform,
      boot_emulation,
      boot_info_table,
    } => {
      let mut options = ImageOptions::default();
      options.iso9660.set_interchange_level(level)?;
      options.iso9660.volume_id = volume_id.unwrap_or_default();
      options.iso9660.system_id = system_id.unwrap_or_default();
      options.iso9660.publisher = publisher.unwrap_or_default();
      options.iso9660.preparer = preparer.unwrap_or_default();
      options.iso9660.application = application.unwrap_or_default();

      if joliet {
        options.joliet = Some(JolietConfig::default());
      }

      if rock_ridge || !modes.is_empty() {
        let mut config = RockRidgeConfig::default();
        for spec in &modes {
          let (pattern, mode) = spec
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("expected PATTERN=MODE, got {spec:?}")))?;
          let mode = u32::from_str_radix(mode, 8)
            .map_err(|_| Error::Config(format!("invalid octal mode: {mode:?}")))?;
          config.add_mode_for_pattern(pattern, mode);
        }
        options.rock_ridge = Some(config);
      }

      if let Some(image) = boot_image {
        let mut config = ElToritoConfig::new(image);
        config.platform_id = BootPlatformId::parse(&boot_platform);
        config.emulation = BootEmulation::parse(&boot_emulation);
        config.gen_boot_info_table = boot_info_table;
        options.el_torito = Some(config);
      }

      let mut writer = IsoWriter::new(options);
      writer.capture(&directory)?;

      let file = std::io::BufWriter::new(std::fs::File::create(&output)?);
      let report = writer.finalize(file)?;

      for warning in &report.warnings {
        eprintln!("warning: {warning}");
      }
      println!("{}: {} sectors", output.display(), report.total_sectors);
    }
    cli::Command::List { image } => {
      let fs = isotools::IsoFileSystem::open(std::fs::File::open(image)?)?;

      for entry in fs.entries() {
        let entry = entry?;
        if entry.path.is_empty() {
          continue;
        }

        if entry.directory {
          println!("{}/", entry.path);
        } else {
          println!("{} ({} bytes)", entry.path, entry.data_length);
        }
      }
    }
  }

  Ok(())
}
