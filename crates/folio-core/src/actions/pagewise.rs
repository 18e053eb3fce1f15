use super::{ActionReport, PageResult};
use crate::config::VolumeConfig;
use crate::context::WorkerContext;
use crate::error::Result;
use crate::pages::{collect_pages, parse_page_number};
use crate::skip::{self, SkipMode};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// One file's worth of work, fully decided before fan-out.
#[derive(Debug, Clone)]
pub(crate) struct PageJob {
    pub src: PathBuf,
    pub dest: PathBuf,
    pub page: Option<u32>,
    pub is_color: bool,
    pub skip: Option<SkipMode>,
}

pub(crate) struct PageBatch<'a> {
    pub label: &'a str,
    pub source_dir: &'a Path,
    pub out_dir: &'a Path,
    pub threads: usize,
    /// Page numbers must be parsed to know which pages are color pages.
    pub needs_colors: bool,
    /// Replace the source extension on the destination, e.g. `png`.
    pub dest_ext: Option<&'a str>,
    /// Restrict the batch to these page numbers.
    pub only_pages: Option<&'a BTreeSet<u32>>,
}

impl PageBatch<'_> {
    fn in_place(&self) -> bool {
        self.source_dir == self.out_dir
    }
}

pub(crate) fn plan_jobs(
    ctx: &WorkerContext,
    volume: &VolumeConfig,
    batch: &PageBatch<'_>,
) -> Result<Vec<PageJob>> {
    let skip = ctx.active_skip.as_ref();
    let parse = skip.is_some() || batch.needs_colors || batch.only_pages.is_some();

    let mut jobs = Vec::new();
    for page in collect_pages(batch.source_dir)? {
        let number = if parse {
            Some(parse_page_number(page.name())?)
        } else {
            None
        };
        if let (Some(only), Some(n)) = (batch.only_pages, number) {
            if !only.contains(&n) {
                continue;
            }
        }
        let dest = match batch.dest_ext {
            Some(ext) => batch.out_dir.join(format!("{}.{ext}", page.stem())),
            None => batch.out_dir.join(page.name()),
        };
        jobs.push(PageJob {
            dest,
            page: number,
            is_color: number.is_some_and(|n| volume.is_color(n)),
            skip: number.and_then(|n| skip.filter(|s| s.covers(n)).map(|s| s.action)),
            src: page.path,
        });
    }
    Ok(jobs)
}

/// Run `transform` over every page of the batch on a bounded pool.
///
/// Skip dispositions and existing destinations are handled here; `transform`
/// only sees pages that need real work. A failing page is counted and logged,
/// the rest of the batch continues.
pub(crate) fn run_batch<F>(
    ctx: &WorkerContext,
    volume: &VolumeConfig,
    batch: PageBatch<'_>,
    transform: F,
) -> Result<ActionReport>
where
    F: Fn(&PageJob) -> Result<PageResult> + Sync,
{
    // the output tree exists even when the batch is empty
    crate::io::ensure_dir(batch.out_dir)?;
    let jobs = plan_jobs(ctx, volume, &batch)?;
    if jobs.is_empty() {
        tracing::warn!(dir = %batch.source_dir.display(), "{}: no pages to process", batch.label);
        return Ok(ActionReport::default());
    }

    let in_place = batch.in_place();
    let out_dir = batch.out_dir;
    tracing::info!(
        pages = jobs.len(),
        threads = batch.threads,
        out = %out_dir.display(),
        "{}: processing",
        batch.label
    );

    let results = crate::pool::fan_out(batch.threads, &jobs, &ctx.cancel, |job| {
        process(job, out_dir, in_place, &transform)
    })?;

    let report = ActionReport::from_results(results.iter());
    tracing::info!("{}: {report}", batch.label);
    Ok(report)
}

/// Dry-run stand-in for an action: log what would happen, then advance `current_dir`.
pub(crate) fn preview(
    ctx: &mut WorkerContext,
    label: &str,
    out_dir: PathBuf,
    params: &dyn fmt::Debug,
) -> ActionReport {
    tracing::info!(
        from = %ctx.current_dir.display(),
        to = %out_dir.display(),
        "{label} (dry run): {params:?}"
    );
    ctx.update_cwd(out_dir);
    ActionReport::default()
}

fn process<F>(job: &PageJob, out_dir: &Path, in_place: bool, transform: &F) -> PageResult
where
    F: Fn(&PageJob) -> Result<PageResult>,
{
    if let Some(mode) = job.skip {
        return match skip::apply(mode, &job.src, out_dir) {
            Ok(result) => result,
            Err(e) => failed(job, e.to_string()),
        };
    }
    if !in_place && job.dest.exists() {
        tracing::warn!(dest = %job.dest.display(), "already done, skipping");
        return PageResult::AlreadyDone;
    }
    match transform(job) {
        Ok(result) => result,
        Err(e) => failed(job, e.to_string()),
    }
}

fn failed(job: &PageJob, reason: String) -> PageResult {
    tracing::warn!(file = %job.src.display(), "{reason}");
    PageResult::Failed(reason)
}
