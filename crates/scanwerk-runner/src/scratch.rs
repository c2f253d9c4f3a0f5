// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-run scratch space for sub-plans, and the shared output directory.
//
// Workers all write into one output directory; their page ranges are
// disjoint, so the only merge step is removing the scratch directory.  The
// directory is deleted by `finalize`, or on drop if the run is abandoned.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, instrument, warn};

use scanwerk_core::error::{Result, ScanwerkError};

const SCRATCH_PREFIX: &str = "scanwerk.";

/// Temporary directory owned by exactly one run.
#[derive(Debug)]
pub struct ScratchSpace {
    dir: TempDir,
}

impl ScratchSpace {
    /// Create a scratch directory in the system temp location, or under
    /// `parent` when given.
    pub fn create(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        debug!(path = %dir.path().display(), "scratch directory created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the scratch directory and everything in it.
    #[instrument(skip_all, fields(path = %self.dir.path().display()))]
    pub fn finalize(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| {
            warn!(error = %e, "failed to remove scratch directory");
            ScanwerkError::Cleanup(format!("{}: {e}", path.display()))
        })?;
        debug!("scratch directory removed");
        Ok(())
    }
}

/// Make sure the shared output directory exists before any worker starts.
pub fn ensure_output_dir(path: &Path) -> Result<PathBuf> {
    if !path.is_dir() {
        std::fs::create_dir_all(path)?;
        debug!(path = %path.display(), "output directory created");
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn finalize_removes_contents() {
        let parent = tempfile::tempdir().expect("tempdir");
        let scratch = ScratchSpace::create(Some(parent.path())).expect("scratch");
        let path = scratch.path().to_path_buf();
        fs::write(path.join("book-0.ScanTailor"), "<project/>").expect("write");

        assert!(path.starts_with(parent.path()));
        assert!(
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(SCRATCH_PREFIX))
        );

        scratch.finalize().expect("finalize");
        assert!(!path.exists());
    }

    #[test]
    fn dropping_without_finalize_still_cleans_up() {
        let parent = tempfile::tempdir().expect("tempdir");
        let path = {
            let scratch = ScratchSpace::create(Some(parent.path())).expect("scratch");
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn missing_parent_is_an_io_error() {
        let parent = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            ScratchSpace::create(Some(&parent.path().join("missing"))),
            Err(ScanwerkError::Io(_))
        ));
    }

    #[test]
    fn output_dir_is_created_once() {
        let parent = tempfile::tempdir().expect("tempdir");
        let out = parent.path().join("done");
        ensure_output_dir(&out).expect("create");
        fs::write(out.join("0001.tif"), b"page").expect("write");
        ensure_output_dir(&out).expect("existing");
        assert!(out.join("0001.tif").exists());
    }
}
