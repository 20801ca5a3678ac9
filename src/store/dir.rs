use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{info, warn};

use super::CaStore;
use crate::error::{Error, ErrorCode, Result};
use crate::loader::{self, LoadOutcome};

/// Summary of a bulk registration.
#[derive(Debug, Default)]
pub struct DirLoadReport {
    /// Number of files read.
    pub files: usize,
    pub added: usize,
    pub already_present: usize,
    /// Per-file and per-certificate failures. None of them aborted the load.
    pub errors: Vec<Error>,
}

/// Regular, non-hidden files directly under `dir`, sorted by name, plus an
/// error for every directory entry that could not be read.
fn list_files(dir: &Path) -> Result<(Vec<PathBuf>, Vec<Error>)> {
    let entries = fs::read_dir(dir).map_err(|e| {
        Error::coded(
            ErrorCode::DirectoryRead,
            format!("cannot read directory {}: {e}", dir.display()),
        )
    })?;
    Ok(collect_files(dir, entries.map(|entry| entry.map(|entry| entry.path()))))
}

fn collect_files(
    dir: &Path,
    entries: impl Iterator<Item = io::Result<PathBuf>>,
) -> (Vec<PathBuf>, Vec<Error>) {
    let mut files = Vec::new();
    let mut errors = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => {
                let hidden = path
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with('.'));
                if !hidden && path.is_file() {
                    files.push(path);
                }
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                errors.push(Error::coded(
                    ErrorCode::DirectoryRead,
                    format!("cannot read an entry of {}: {e}", dir.display()),
                ));
            }
        }
    }
    files.sort();
    (files, errors)
}

impl CaStore {
    /// Registers every CA certificate found in the files of `dir`.
    ///
    /// Unreadable files and unacceptable certificates are reported, not fatal.
    pub fn add_all_cas_from_dir(&self, dir: impl AsRef<Path>) -> Result<DirLoadReport> {
        let dir = dir.as_ref();
        let (files, errors) = list_files(dir)?;
        let loaded = files
            .into_iter()
            .map(|path| {
                let outcome = loader::load_certs_from_file(&path);
                (path, outcome)
            })
            .collect();
        Ok(self.register_loaded(dir, loaded, errors))
    }

    /// Same as [`CaStore::add_all_cas_from_dir`], reading and parsing files
    /// on the rayon thread pool.
    pub fn add_all_cas_from_dir_parallel(&self, dir: impl AsRef<Path>) -> Result<DirLoadReport> {
        let dir = dir.as_ref();
        let (files, errors) = list_files(dir)?;
        let loaded = files
            .into_par_iter()
            .map(|path| {
                let outcome = loader::load_certs_from_file(&path);
                (path, outcome)
            })
            .collect();
        Ok(self.register_loaded(dir, loaded, errors))
    }

    /// Registers the certificates stored at the configured cache path.
    ///
    /// Never touches the network. A missing cache file is a `FileRead` error.
    pub fn load_cache(&self) -> Result<DirLoadReport> {
        let path = self.cache_path();
        let data = fs::read(&path).map_err(|e| {
            Error::coded(
                ErrorCode::FileRead,
                format!("cannot read CA cache {}: {e}", path.display()),
            )
        })?;
        let outcome = loader::load_certs_from_bytes(&data);
        Ok(self.register_loaded(&path, vec![(path.clone(), outcome)], Vec::new()))
    }

    /// Registers loader output in file order. `errors` come from listing.
    fn register_loaded(
        &self,
        source: &Path,
        loaded: Vec<(PathBuf, LoadOutcome)>,
        errors: Vec<Error>,
    ) -> DirLoadReport {
        let mut report = DirLoadReport {
            files: loaded.len(),
            errors,
            ..Default::default()
        };

        let mut certs = Vec::new();
        for (path, outcome) in loaded {
            report.errors.extend(
                outcome
                    .errors
                    .into_iter()
                    .map(|e| e.context(path.display())),
            );
            certs.extend(outcome.certs);
        }

        let batch = self.register(certs);
        report.added = batch.added;
        report.already_present = batch.already_present;
        report.errors.extend(batch.errors);

        info!(
            source = %source.display(),
            files = report.files,
            added = report.added,
            already_present = report.already_present,
            errors = report.errors.len(),
            "loaded CA certificates"
        );
        report
    }
}
