use crate::output::print_summary;
use crate::signal;
use anyhow::{bail, Context};
use clap::Args;
use folio_core::driver::{Driver, RunOptions, VolumeStatus};
use folio_core::tools::SystemResolver;
use folio_core::types::Number;
use std::path::PathBuf;

#[derive(Args)]
pub struct RunArgs {
    /// Pipeline config (.yaml or .json)
    pub file: PathBuf,

    /// Log what every action would do without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Only run these volumes (repeatable)
    #[arg(long = "volume", value_name = "N")]
    pub volumes: Vec<Number>,

    #[arg(long, value_name = "PATH", env = "FOLIO_MAGICK")]
    pub magick: Option<PathBuf>,

    #[arg(long, value_name = "PATH", env = "FOLIO_PINGO")]
    pub pingo: Option<PathBuf>,

    #[arg(long, value_name = "PATH", env = "FOLIO_EXIFTOOL")]
    pub exiftool: Option<PathBuf>,

    #[arg(long, value_name = "PATH", env = "FOLIO_CJPEGLI")]
    pub cjpegli: Option<PathBuf>,

    /// waifu2x-ncnn-vulkan executable
    #[arg(long, value_name = "PATH", env = "FOLIO_WAIFU2X")]
    pub waifu2x: Option<PathBuf>,

    /// 7-Zip executable
    #[arg(long = "7z", value_name = "PATH", env = "FOLIO_7Z")]
    pub sevenzip: Option<PathBuf>,
}

impl RunArgs {
    fn resolver(&self) -> SystemResolver {
        [
            ("magick", &self.magick),
            ("pingo", &self.pingo),
            ("exiftool", &self.exiftool),
            ("cjpegli", &self.cjpegli),
            ("waifu2x", &self.waifu2x),
            ("7z", &self.sevenzip),
        ]
        .into_iter()
        .fold(SystemResolver::new(), |resolver, (name, path)| match path {
            Some(p) => resolver.with_override(name, p),
            None => resolver,
        })
    }
}

pub fn run(args: RunArgs, json: bool) -> anyhow::Result<()> {
    let driver = Driver::from_path(&args.file)
        .with_context(|| format!("could not load {}", args.file.display()))?;
    let opts = RunOptions {
        dry_run: args.dry_run,
        volumes: args.volumes.clone(),
        cancel: signal::cancel_on_ctrl_c(),
    };

    let summary = driver.run(&args.resolver(), &opts)?;
    print_summary(&summary, json)?;

    if summary.cancelled {
        bail!("interrupted");
    }
    if !summary.success() {
        let failed = summary
            .volumes
            .iter()
            .filter(|v| matches!(v.status, VolumeStatus::Failed { .. }) || v.totals().failed > 0)
            .count();
        bail!("{failed} volume(s) did not complete cleanly");
    }
    Ok(())
}
