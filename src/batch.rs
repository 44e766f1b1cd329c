//! Per-file pipeline, output naming, input discovery and the worker pool.

use std::{
    collections::{hash_map::Entry, HashMap},
    ffi::OsStr,
    fmt, fs, io,
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, error, info, info_span, warn};
use walkdir::WalkDir;

use crate::error::{ConvertError, Result};
use crate::header::{open_source, parse_header};
use crate::schema::build_directory;
use crate::table::split;
use crate::writer::write_netcdf;

// ─────────────────────────────────────────────────────────────────────
// Naming conventions of the source archive
// ─────────────────────────────────────────────────────────────────────
pub const SOURCE_EXT: &str = ".txt";
pub const GZIP_EXT:   &str = ".gz";
pub const NC_EXT:     &str = ".nc";
pub const SOURCE_DIR: &str = "txt";
pub const NC_DIR:     &str = "nc";

/// Outcome of one file's conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionCode {
    Converted,
    Skipped,
    Error,
}

/// Batch settings passed explicitly to [`convert_many`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    process_count: NonZeroUsize,
    skip_empty: bool,
    progress: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            process_count: std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
            skip_empty: false,
            progress: false,
        }
    }
}

impl BatchConfig {
    /// Worker count; zero is treated as one.
    #[must_use]
    pub fn with_process_count(mut self, count: usize) -> Self {
        self.process_count = NonZeroUsize::new(count).unwrap_or(NonZeroUsize::MIN);
        self
    }

    /// Do not write files whose body has no rows.
    #[must_use]
    pub fn with_skip_empty(mut self, skip: bool) -> Self {
        self.skip_empty = skip;
        self
    }

    /// Draw a progress bar on stderr while converting.
    #[must_use]
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn process_count(&self) -> usize {
        self.process_count.get()
    }

    pub fn skip_empty(&self) -> bool {
        self.skip_empty
    }

    pub fn progress(&self) -> bool {
        self.progress
    }
}

/// Aggregate counts over a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub converted: usize,
    pub skipped: usize,
    pub errors: usize,
    pub total: usize,
}

impl BatchSummary {
    pub fn from_codes(codes: &[CompletionCode]) -> Self {
        codes.iter().fold(Self::default(), |mut s, code| {
            match code {
                CompletionCode::Converted => s.converted += 1,
                CompletionCode::Skipped => s.skipped += 1,
                CompletionCode::Error => s.errors += 1,
            }
            s.total += 1;
            s
        })
    }

    pub fn is_success(&self) -> bool {
        self.errors == 0
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "converted: {}, skipped: {}, errors: {}, total: {}",
            self.converted, self.skipped, self.errors, self.total
        )
    }
}

// ─────────────────────────────────────────────────────────────────────
// Paths
// ─────────────────────────────────────────────────────────────────────

/// `…/txt/name.txt.gz` → `…/nc/name.nc`.
pub fn output_path(input: &Path) -> PathBuf {
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name.strip_suffix(GZIP_EXT).unwrap_or(&file_name);
    let stem = stem.strip_suffix(SOURCE_EXT).unwrap_or(stem);

    let parent: PathBuf = input
        .parent()
        .map(|p| {
            p.components()
                .map(|c| match c.as_os_str() {
                    s if s == SOURCE_DIR => OsStr::new(NC_DIR),
                    s => s,
                })
                .collect()
        })
        .unwrap_or_default();
    parent.join(format!("{stem}{NC_EXT}"))
}

fn is_source_name(name: &OsStr) -> bool {
    let name = name.to_string_lossy();
    name.ends_with(SOURCE_EXT) || name.ends_with(&format!("{SOURCE_EXT}{GZIP_EXT}"))
}

/// Expands directories into the source files below them (sorted by name);
/// other paths pass through unchanged.
pub fn discover<P: AsRef<Path>>(paths: &[P]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths.iter().map(|p| p.as_ref()) {
        if !path.is_dir() {
            files.push(path.to_path_buf());
            continue;
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            match entry {
                // `path().is_file()` follows a symlinked file; `file_type()` would not.
                Ok(e) if is_source_name(e.file_name()) && e.path().is_file() => {
                    files.push(e.into_path());
                }
                Ok(e) if e.path_is_symlink() && !e.path().exists() => {
                    debug!(path = %e.path().display(), "skipping dangling symlink");
                }
                Ok(_) => {}
                Err(err) => warn!(root = %path.display(), error = %err, "skipping unreadable entry"),
            }
        }
    }
    files
}

// ─────────────────────────────────────────────────────────────────────
// Conversion
// ─────────────────────────────────────────────────────────────────────

/// Runs the full pipeline for one file, propagating any stage error.
pub fn convert_file(path: &Path, skip_empty: bool) -> Result<CompletionCode> {
    let (header, body_offset) = parse_header(open_source(path)?)?;
    let directory = build_directory(&header)?;
    debug!(types = directory.len(), "built type directory");
    let body = split(open_source(path)?, &directory, body_offset)?;

    if body.is_empty() {
        if skip_empty {
            info!("empty body, skipped");
            return Ok(CompletionCode::Skipped);
        }
        info!("empty body, writing attributes only");
    }

    let target = output_path(path);
    if target == path {
        return Err(ConvertError::io(
            path,
            io::Error::new(io::ErrorKind::AlreadyExists, "output path equals input path"),
        ));
    }
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ConvertError::io(parent, e))?;
    }
    write_netcdf(&target, &header, &body)?;
    info!(output = %target.display(), "converted");
    Ok(CompletionCode::Converted)
}

/// Converts one file; every failure is logged and reported as `Error`.
pub fn convert_one(path: &Path, skip_empty: bool) -> CompletionCode {
    let span = info_span!("convert", path = %path.display());
    let _enter = span.enter();

    match panic::catch_unwind(AssertUnwindSafe(|| convert_file(path, skip_empty))) {
        Ok(Ok(code)) => code,
        Ok(Err(err)) => {
            error!(path = %path.display(), error = %err, "conversion failed");
            CompletionCode::Error
        }
        Err(_) => {
            error!(path = %path.display(), "conversion panicked");
            CompletionCode::Error
        }
    }
}

/// For each input, the index of an earlier input with the same output path.
///
/// Only the first claimant of an output is converted, so no two workers ever
/// write the same file.
pub fn shadowed_by(inputs: &[PathBuf]) -> Vec<Option<usize>> {
    let mut owners: HashMap<PathBuf, usize> = HashMap::new();
    inputs
        .iter()
        .enumerate()
        .map(|(i, input)| match owners.entry(output_path(input)) {
            Entry::Vacant(slot) => {
                slot.insert(i);
                None
            }
            Entry::Occupied(slot) => Some(*slot.get()),
        })
        .collect()
}

fn progress_bar(enabled: bool, len: usize) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    match ProgressStyle::with_template("{msg} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta})") {
        Ok(style) => pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  ")),
        Err(err) => debug!(error = %err, "default progress style"),
    }
    pb.set_message("converting");
    pb
}

/// Discovers inputs and converts them on `config.process_count()` workers.
///
/// Codes are returned in submission order regardless of completion order.
/// An input whose output path was already claimed by an earlier input is
/// reported as `Error` without being converted.
pub fn convert_many<P: AsRef<Path>>(paths: &[P], config: &BatchConfig) -> Vec<CompletionCode> {
    let inputs = discover(paths);
    info!(files = inputs.len(), workers = config.process_count(), "starting batch");

    let shadowed = shadowed_by(&inputs);
    let skip_empty = config.skip_empty();
    let pb = progress_bar(config.progress(), inputs.len());

    let convert = |(i, path): (usize, &PathBuf)| {
        let code = match shadowed[i] {
            Some(first) => {
                error!(
                    path = %path.display(),
                    first = %inputs[first].display(),
                    output = %output_path(path).display(),
                    "output path already claimed by an earlier input"
                );
                CompletionCode::Error
            }
            None => convert_one(path, skip_empty),
        };
        pb.inc(1);
        code
    };

    let codes: Vec<CompletionCode> = if config.process_count() == 1 {
        inputs.iter().enumerate().map(convert).collect()
    } else {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.process_count())
            .build()
        {
            Ok(pool) => pool.install(|| inputs.par_iter().enumerate().map(convert).collect()),
            Err(err) => {
                warn!(error = %err, "worker pool unavailable, converting sequentially");
                inputs.iter().enumerate().map(convert).collect()
            }
        }
    };
    pb.finish_with_message("done");
    codes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_strips_suffixes_and_remaps_dir() {
        assert_eq!(
            output_path(Path::new("/data/cosmic2/2021-01-01/L2/txt/podTec_C2E1.0001.txt.gz")),
            PathBuf::from("/data/cosmic2/2021-01-01/L2/nc/podTec_C2E1.0001.nc")
        );
        assert_eq!(output_path(Path::new("a/b.txt")), PathBuf::from("a/b.nc"));
        assert_eq!(output_path(Path::new("b.dat")), PathBuf::from("b.dat.nc"));
        assert_eq!(
            output_path(Path::new("txt/x/txt/txtfile.txt")),
            PathBuf::from("nc/x/nc/txtfile.nc")
        );
    }

    #[test]
    fn summary_counts_codes() {
        use CompletionCode::{Converted, Error, Skipped};
        let s = BatchSummary::from_codes(&[Converted, Error, Skipped, Converted]);
        assert_eq!(
            s,
            BatchSummary {
                converted: 2,
                skipped: 1,
                errors: 1,
                total: 4
            }
        );
        assert!(!s.is_success());
        assert_eq!(s.to_string(), "converted: 2, skipped: 1, errors: 1, total: 4");
    }

    #[test]
    fn config_clamps_zero_workers() {
        let c = BatchConfig::default().with_process_count(0).with_skip_empty(true);
        assert_eq!(c.process_count(), 1);
        assert!(c.skip_empty());
    }

    #[test]
    fn discovers_sources_recursively_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("y2021").join("txt");
        fs::create_dir_all(&nested).unwrap();
        for name in ["b.txt.gz", "a.txt", "notes.md", "c.nc"] {
            fs::write(nested.join(name), "").unwrap();
        }
        let single = dir.path().join("single.txt.gz");

        let found = discover(&[dir.path().join("y2021"), single.clone()]);
        assert_eq!(found, vec![nested.join("a.txt"), nested.join("b.txt.gz"), single]);
    }

    #[test]
    fn config_progress_defaults_off() {
        assert!(!BatchConfig::default().progress());
        assert!(BatchConfig::default().with_progress(true).progress());
    }

    #[test]
    fn later_inputs_sharing_an_output_are_shadowed() {
        let inputs = [
            PathBuf::from("L2/txt/a.txt"),
            PathBuf::from("L2/txt/a.txt.gz"),
            PathBuf::from("L2/txt/b.txt.gz"),
            PathBuf::from("L2/nc/a.txt.gz"),
        ];
        assert_eq!(shadowed_by(&inputs), [None, Some(0), None, Some(0)]);
    }

    #[cfg(unix)]
    #[test]
    fn discovers_symlinked_files() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("elsewhere.txt.gz");
        fs::write(&real, "").unwrap();
        let txt = dir.path().join("txt");
        fs::create_dir_all(&txt).unwrap();
        std::os::unix::fs::symlink(&real, txt.join("linked.txt.gz")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), txt.join("dangling.txt")).unwrap();

        assert_eq!(discover(&[&txt]), vec![txt.join("linked.txt.gz")]);
    }

    #[test]
    fn missing_file_is_an_error_code() {
        assert_eq!(
            convert_one(Path::new("/nonexistent/x.txt.gz"), false),
            CompletionCode::Error
        );
    }
}
