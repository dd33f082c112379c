//! Batch runners.
//!
//! A [`Task`] handles one input record at a time and writes its output to a
//! [`RecordWriter`]. [`run_worker`] drives a task over a record stream,
//! logging and counting per-record failures instead of aborting.

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::ResultCache;
use crate::country::country_code;
use crate::error::{Error, Result};
use crate::io::{Format, LatLonRow, PostalRow, RecordWriter};
use crate::models::{Entity, GeocodingResult, IdentityScheme, RegionPath};
use crate::regions::RegionResolver;
use crate::resolve::{Orchestrator, ResolveOptions};

/// Outcome counts of one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    /// Records that produced output
    pub succeeded: usize,
    /// Records handled without error but without output
    pub empty: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, produced: bool) {
        self.processed += 1;
        if produced {
            self.succeeded += 1;
        } else {
            self.empty += 1;
        }
    }

    fn fail(&mut self) {
        self.processed += 1;
        self.failed += 1;
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed: {}, succeeded: {}, empty: {}, failed: {}",
            self.processed, self.succeeded, self.empty, self.failed
        )
    }
}

#[async_trait]
pub trait Task: Send + Sync {
    type Input: Send;

    fn name(&self) -> &'static str;

    /// Handle one record. `Ok(false)` means nothing was written.
    async fn handle(&self, input: Self::Input, out: &mut RecordWriter) -> Result<bool>;
}

fn spinner(name: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}: {pos} records ({per_sec})")
    {
        pb.set_style(style);
    }
    pb.set_message(name.to_string());
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}

/// Run `task` over `inputs`. Unreadable records and task errors are logged
/// and counted; configuration errors abort the run.
pub async fn run_worker<T, I>(task: &T, inputs: I, out: &mut RecordWriter) -> Result<RunSummary>
where
    T: Task + ?Sized,
    I: IntoIterator<Item = Result<T::Input>>,
{
    let pb = spinner(task.name());
    let mut summary = RunSummary::default();

    for (i, input) in inputs.into_iter().enumerate() {
        let outcome = match input {
            Ok(input) => task.handle(input, out).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(produced) => summary.record(produced),
            Err(e @ Error::Config(_)) => {
                pb.finish_and_clear();
                return Err(e);
            }
            Err(e) => {
                warn!("{}: record {} failed: {}", task.name(), i + 1, e);
                summary.fail();
            }
        }
        pb.inc(1);
    }

    out.flush()?;
    pb.finish_and_clear();
    info!("{} done ({})", task.name(), summary);
    Ok(summary)
}

/// Replace or append fields by name. Blank overlay values never replace a
/// present value.
fn merge_fields(base: &mut Vec<(String, String)>, overlay: Vec<(String, String)>) {
    for (name, value) in overlay {
        match base.iter_mut().find(|(k, _)| *k == name) {
            Some((_, existing)) => {
                if !value.trim().is_empty() {
                    *existing = value;
                }
            }
            None => base.push((name, value)),
        }
    }
}

/// Formatted address lines for postal rows.
pub struct FormatLineTask {
    orchestrator: Arc<Orchestrator>,
}

impl FormatLineTask {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Task for FormatLineTask {
    type Input = PostalRow;

    fn name(&self) -> &'static str {
        "format-line"
    }

    async fn handle(&self, row: PostalRow, out: &mut RecordWriter) -> Result<bool> {
        let line = self.orchestrator.format_line(
            &row.original_line,
            row.country.as_deref(),
            row.language.as_deref(),
        );
        let country = row
            .country
            .as_deref()
            .and_then(country_code)
            .map(str::to_string);

        let mut fields = row.fields();
        merge_fields(
            &mut fields,
            vec![
                ("country".to_string(), country.unwrap_or_default()),
                ("formatted_line".to_string(), line.clone()),
            ],
        );
        out.write_fields(&fields)?;
        Ok(!line.is_empty())
    }
}

/// Parsed address components for postal rows.
pub struct ParseComponentsTask {
    orchestrator: Arc<Orchestrator>,
}

impl ParseComponentsTask {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Task for ParseComponentsTask {
    type Input = PostalRow;

    fn name(&self) -> &'static str {
        "parse-components"
    }

    async fn handle(&self, row: PostalRow, out: &mut RecordWriter) -> Result<bool> {
        let Some(components) = self.orchestrator.parse_components(
            &row.original_line,
            row.country.as_deref(),
            row.language.as_deref(),
        ) else {
            debug!("No components for '{}'", row.original_line);
            return Ok(false);
        };
        let mut fields = components.fields();
        merge_fields(&mut fields, row.fields());
        out.write_fields(&fields)?;
        Ok(true)
    }
}

/// Geocoder input record.
#[derive(Debug, Clone)]
pub enum GeocodeInput {
    Row(PostalRow),
    Entity(Entity),
}

/// Geocode postal rows or entities through the orchestrator.
pub struct GeocodeTask {
    orchestrator: Arc<Orchestrator>,
    opts: ResolveOptions,
}

impl GeocodeTask {
    pub fn new(orchestrator: Arc<Orchestrator>, opts: ResolveOptions) -> Self {
        Self { orchestrator, opts }
    }
}

#[async_trait]
impl Task for GeocodeTask {
    type Input = GeocodeInput;

    fn name(&self) -> &'static str {
        "geocode"
    }

    async fn handle(&self, input: GeocodeInput, out: &mut RecordWriter) -> Result<bool> {
        match input {
            GeocodeInput::Row(row) => {
                let Some(result) = self
                    .orchestrator
                    .resolve_line(
                        &row.original_line,
                        row.country.as_deref(),
                        row.language.as_deref(),
                        &self.opts,
                    )
                    .await?
                else {
                    debug!("No result for '{}'", row.original_line);
                    return Ok(false);
                };
                match out.format() {
                    Format::Csv => {
                        let mut fields = result.to_row().fields(false);
                        merge_fields(&mut fields, row.fields());
                        out.write_fields(&fields)?;
                    }
                    Format::Entities => out.write_entity(&result.to_entity())?,
                }
                Ok(true)
            }
            GeocodeInput::Entity(entity) if out.format() == Format::Csv => {
                let results = self
                    .orchestrator
                    .resolve_entity_results(&entity, &self.opts)
                    .await?;
                for result in &results {
                    let mut fields = result.to_row().fields(false);
                    merge_fields(&mut fields, entity.fields());
                    out.write_fields(&fields)?;
                }
                Ok(!results.is_empty())
            }
            GeocodeInput::Entity(entity) => {
                let resolved = self.orchestrator.resolve_entity(&entity, &self.opts).await?;
                let changed = !(resolved.len() == 1 && resolved[0] == entity);
                for item in &resolved {
                    out.write_entity(item)?;
                }
                Ok(changed)
            }
        }
    }
}

/// Region lookup input record.
#[derive(Debug, Clone)]
pub enum RegionInput {
    Point(LatLonRow),
    Entity(Entity),
}

/// Region codes for coordinate rows or `Address` entities with
/// `latitude`/`longitude`.
pub struct ApplyRegionsTask {
    resolver: Arc<RegionResolver>,
}

impl ApplyRegionsTask {
    pub fn new(resolver: Arc<RegionResolver>) -> Self {
        Self { resolver }
    }

    fn entity_region(&self, entity: &Entity) -> Option<RegionPath> {
        if !entity.is_address() {
            return None;
        }
        let lat = entity.first("latitude")?.trim().parse::<f64>().ok()?;
        let lon = entity.first("longitude")?.trim().parse::<f64>().ok()?;
        self.resolver.resolve(lon, lat)
    }
}

#[async_trait]
impl Task for ApplyRegionsTask {
    type Input = RegionInput;

    fn name(&self) -> &'static str {
        "apply-regions"
    }

    async fn handle(&self, input: RegionInput, out: &mut RecordWriter) -> Result<bool> {
        let fields = match input {
            RegionInput::Point(row) => {
                let Some(path) = self.resolver.resolve(row.lon, row.lat) else {
                    return Ok(false);
                };
                let mut fields = path.fields();
                merge_fields(&mut fields, row.fields());
                fields
            }
            RegionInput::Entity(entity) => {
                let Some(path) = self.entity_region(&entity) else {
                    return Ok(false);
                };
                let mut fields = vec![("id".to_string(), entity.id)];
                fields.extend(path.fields());
                fields
            }
        };
        out.write_fields(&fields)?;
        Ok(true)
    }
}

/// Post-processing applied to results on their way into or out of the cache.
#[derive(Clone, Copy, Default)]
pub struct CacheMaintenance<'a> {
    pub regions: Option<&'a RegionResolver>,
    /// Recompute canonical ids with this scheme
    pub ensure_ids: Option<IdentityScheme>,
}

impl CacheMaintenance<'_> {
    fn apply(&self, result: &mut GeocodingResult) {
        if let Some(scheme) = self.ensure_ids {
            result.ensure_canonical_id(scheme);
        }
        if let Some(regions) = self.regions {
            result.apply_region(regions);
        }
    }
}

/// Bulk-load results (e.g. from a results CSV) into the cache. Entries
/// without a derivable key or without an actual answer are skipped.
pub fn populate_cache<I>(
    cache: &ResultCache,
    results: I,
    maintenance: CacheMaintenance<'_>,
) -> Result<RunSummary>
where
    I: IntoIterator<Item = Result<GeocodingResult>>,
{
    let pb = spinner("cache populate");
    let mut summary = RunSummary::default();
    let mut bulk = cache.bulk();

    for (i, result) in results.into_iter().enumerate() {
        pb.inc(1);
        let mut result = match result {
            Ok(result) => result,
            Err(e) => {
                warn!("cache populate: record {} failed: {}", i + 1, e);
                summary.fail();
                continue;
            }
        };
        let Some(key) = result.apply_cache_key(cache.prefix()).map(str::to_string) else {
            warn!("cache populate: no cache key for record {}", i + 1);
            summary.record(false);
            continue;
        };
        maintenance.apply(&mut result);
        if !result.is_storable() {
            debug!("Skipping empty result {}", key);
            summary.record(false);
            continue;
        }
        bulk.put(&key, &result)?;
        summary.record(true);
    }

    let written = bulk.finish()?;
    pb.finish_and_clear();
    info!("cache populate done ({}), {} entries written", summary, written);
    Ok(summary)
}

/// Write every cached result to `out`. CSV output keeps `geocoder_raw` so
/// the export can be loaded back with [`populate_cache`].
pub fn export_cache(
    cache: &ResultCache,
    out: &mut RecordWriter,
    maintenance: CacheMaintenance<'_>,
) -> Result<RunSummary> {
    let pb = spinner("cache iterate");
    let mut summary = RunSummary::default();

    for item in cache.iterate(None) {
        pb.inc(1);
        let (key, mut result) = match item {
            Ok(entry) => entry,
            Err(e) => {
                warn!("cache iterate: {}", e);
                summary.fail();
                continue;
            }
        };
        if result.cache_key.is_none() {
            result.cache_key = Some(key);
        }
        maintenance.apply(&mut result);
        out.write_result(&result, true)?;
        summary.record(true);
    }

    out.flush()?;
    pb.finish_and_clear();
    info!("cache iterate done ({})", summary);
    Ok(summary)
}
