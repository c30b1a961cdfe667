//! Batch generation over a configuration directory.
//!
//! Every `*.device` file is parsed, common packets are merged into the devices
//! of their category, and each device then runs its own pass:
//! `Unloaded -> Validated -> IdentifiersAssigned -> Emitted`, or `Failed`.
//! Passes share nothing, so they run on a rayon pool; a failing device is
//! reported and never stops the others.

use crate::ast::{ConfigFile, DeviceConfig, PacketConfig};
use crate::emit::{backend, Backend, DeviceContext};
use crate::error::{GenError, Result};
use crate::ids;
use crate::layout::LayoutCache;
use crate::parser::parse;
use crate::schema::Device;
use crate::types::Target;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Extension of configuration files.
pub const CONFIG_EXTENSION: &str = "device";

#[derive(Debug, Clone)]
pub struct Options {
    pub target: Target,
    pub out_dir: PathBuf,
    /// Worker count; `None` uses rayon's global pool.
    pub jobs: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Unloaded,
    Validated,
    IdentifiersAssigned,
    Emitted,
    Failed,
}

/// Result of one device's pass, or of a file that never got that far.
#[derive(Debug)]
pub struct DeviceOutcome {
    pub source: PathBuf,
    /// Wire name; `None` when the file itself could not be read or parsed.
    pub device: Option<String>,
    pub state: DeviceState,
    pub written: Vec<PathBuf>,
    pub error: Option<GenError>,
}

#[derive(Debug, Default)]
pub struct GenerationReport {
    /// Sorted by source file, then device.
    pub outcomes: Vec<DeviceOutcome>,
}

impl GenerationReport {
    /// True only if every device reached [`DeviceState::Emitted`].
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.state == DeviceState::Emitted)
    }

    pub fn failures(&self) -> impl Iterator<Item = &DeviceOutcome> {
        self.outcomes.iter().filter(|o| o.state == DeviceState::Failed)
    }

    pub fn emitted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.state == DeviceState::Emitted).count()
    }
}

/// Generated text for one device and target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedUnit {
    pub file_name: String,
    pub source: String,
    pub ids_file_name: String,
    pub ids: String,
}

struct DevicePass {
    label: String,
    state: DeviceState,
}

impl DevicePass {
    fn new(label: String) -> Self {
        DevicePass {
            label,
            state: DeviceState::Unloaded,
        }
    }

    fn advance(&mut self, next: DeviceState) {
        debug!(device = %self.label, from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }

    fn emit(&mut self, config: DeviceConfig, backend: &dyn Backend) -> Result<GeneratedUnit> {
        let device = Device::load(config)?;
        self.advance(DeviceState::Validated);
        let ids = ids::assign(&device)?;
        self.advance(DeviceState::IdentifiersAssigned);
        let layouts = LayoutCache::new(&device);
        let ctx = DeviceContext::new(&device, &ids, &layouts);
        let source = backend.emit_device(&ctx)?;
        Ok(GeneratedUnit {
            file_name: backend.file_name(&device),
            source,
            ids_file_name: format!("{}_{}.ids", device.category.to_lowercase(), device.underscore_name()),
            ids: ids.render(&device),
        })
    }
}

/// Run the in-memory part of one device's pass.
pub fn generate_device(config: DeviceConfig, target: Target) -> Result<GeneratedUnit> {
    let mut pass = DevicePass::new(config.name.wire.clone());
    pass.emit(config, backend(target).as_ref())
}

/// Common packets of every category declared across `files`, in file order.
pub fn common_packets(files: &[ConfigFile]) -> HashMap<String, Vec<PacketConfig>> {
    let mut common: HashMap<String, Vec<PacketConfig>> = HashMap::new();
    for section in files.iter().flat_map(|f| &f.common) {
        common
            .entry(section.category.clone())
            .or_default()
            .extend(section.packets.iter().cloned());
    }
    common
}

/// Append each category's common packets to its devices. Devices already
/// merged are left alone. Returns how many devices changed.
pub fn merge_common(devices: &mut [DeviceConfig], common: &HashMap<String, Vec<PacketConfig>>) -> usize {
    let mut merged = 0;
    for device in devices.iter_mut() {
        if let Some(packets) = common.get(&device.category) {
            if device.include_common(packets) {
                debug!(device = %device.name.wire, count = packets.len(), "merged common packets");
                merged += 1;
            }
        }
    }
    merged
}

/// Sorted `*.device` files directly inside `dir`.
pub fn config_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let io = |source: std::io::Error| GenError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io)? {
        let path = entry.map_err(io)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == CONFIG_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_config(path: &Path) -> Result<ConfigFile> {
    let text = fs::read_to_string(path).map_err(|source| GenError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse(&text)?)
}

fn write(path: PathBuf, contents: &str) -> Result<PathBuf> {
    fs::write(&path, contents).map_err(|source| GenError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Write every file of `unit`, or none: files written before a failure are removed.
fn write_unit(out_dir: &Path, unit: &GeneratedUnit) -> Result<Vec<PathBuf>> {
    let files = [(&unit.file_name, &unit.source), (&unit.ids_file_name, &unit.ids)];
    let mut written = Vec::with_capacity(files.len());
    for (name, contents) in files {
        match write(out_dir.join(name), contents) {
            Ok(path) => written.push(path),
            Err(e) => {
                for path in &written {
                    if let Err(err) = fs::remove_file(path) {
                        warn!(file = %path.display(), error = %err, "cannot remove partial output");
                    }
                }
                return Err(e);
            }
        }
    }
    Ok(written)
}

/// Devices that map to the same output files. Covers the `.ids` name and
/// every backend's file name, which differ only in case and underscores.
fn output_key(config: &DeviceConfig) -> String {
    format!(
        "{}_{}",
        config.category.to_lowercase(),
        config.name.wire.replace('_', "")
    )
}

fn run_device(source: PathBuf, config: DeviceConfig, backend: &dyn Backend, out_dir: &Path) -> DeviceOutcome {
    let label = config.name.wire.clone();
    let span = tracing::info_span!("device", file = %source.display(), device = %label);
    let _guard = span.enter();

    let mut pass = DevicePass::new(label.clone());
    let result = pass.emit(config, backend).and_then(|unit| write_unit(out_dir, &unit));
    match result {
        Ok(written) => {
            pass.advance(DeviceState::Emitted);
            info!(files = written.len(), "generated");
            DeviceOutcome {
                source,
                device: Some(label),
                state: pass.state,
                written,
                error: None,
            }
        }
        Err(e) => {
            pass.advance(DeviceState::Failed);
            error!(error = %e, "generation failed");
            DeviceOutcome {
                source,
                device: Some(label),
                state: pass.state,
                written: Vec::new(),
                error: Some(e),
            }
        }
    }
}

/// Generate every device found in `config_dir`.
///
/// Only an unreadable configuration directory or an uncreatable output
/// directory fail the call; everything else ends up in the report.
pub fn generate(config_dir: &Path, options: &Options) -> Result<GenerationReport> {
    let files = config_files(config_dir)?;
    info!(dir = %config_dir.display(), files = files.len(), target = %options.target, "loading configuration");

    let mut outcomes = Vec::new();
    let mut parsed = Vec::new();
    for path in files {
        match read_config(&path) {
            Ok(config) => parsed.push((path, config)),
            Err(e) => {
                error!(file = %path.display(), error = %e, "cannot load configuration");
                outcomes.push(DeviceOutcome {
                    source: path,
                    device: None,
                    state: DeviceState::Failed,
                    written: Vec::new(),
                    error: Some(e),
                });
            }
        }
    }

    let configs: Vec<ConfigFile> = parsed.iter().map(|(_, c)| c.clone()).collect();
    let common = common_packets(&configs);
    let mut jobs: Vec<(PathBuf, DeviceConfig)> = Vec::new();
    let mut owners: HashMap<String, PathBuf> = HashMap::new();
    for (path, config) in parsed {
        let mut devices = config.devices;
        merge_common(&mut devices, &common);
        for device in devices {
            // The first declaration in file order owns the output names.
            match owners.entry(output_key(&device)) {
                Entry::Vacant(slot) => {
                    slot.insert(path.clone());
                    jobs.push((path.clone(), device));
                }
                Entry::Occupied(first) => {
                    let e = GenError::DuplicateOutput {
                        device: device.name.wire.clone(),
                        first: first.get().clone(),
                    };
                    error!(file = %path.display(), error = %e, "duplicate device");
                    outcomes.push(DeviceOutcome {
                        source: path.clone(),
                        device: Some(device.name.wire),
                        state: DeviceState::Failed,
                        written: Vec::new(),
                        error: Some(e),
                    });
                }
            }
        }
    }

    fs::create_dir_all(&options.out_dir).map_err(|source| GenError::Io {
        path: options.out_dir.clone(),
        source,
    })?;

    let backend = backend(options.target);
    let backend = backend.as_ref();
    let out_dir = options.out_dir.as_path();
    let work = move || -> Vec<DeviceOutcome> {
        jobs.into_par_iter()
            .map(|(source, config)| run_device(source, config, backend, out_dir))
            .collect()
    };
    let generated = match options.jobs.map(|n| ThreadPoolBuilder::new().num_threads(n).build()) {
        Some(Ok(pool)) => pool.install(work),
        Some(Err(e)) => {
            warn!(error = %e, "cannot build worker pool, using the global one");
            work()
        }
        None => work(),
    };
    outcomes.extend(generated);
    outcomes.sort_by(|a, b| a.source.cmp(&b.source).then_with(|| a.device.cmp(&b.device)));

    let report = GenerationReport { outcomes };
    let failed = report.failures().count();
    if failed > 0 {
        warn!(emitted = report.emitted(), failed, "generation finished with failures");
    } else {
        info!(emitted = report.emitted(), "generation finished");
    }
    Ok(report)
}
