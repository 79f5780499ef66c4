use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::check::stubs::write_stub_headers;

/// Directory (inside the run's working directory) holding the fake libc headers.
pub const STUB_INCLUDE_DIR: &str = "fake_libc_include";

/// What happens to a run's artifacts when its context is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Retention {
    #[default]
    Discard,
    /// Leave merged sources, objects and the binary in place for debugging.
    Keep,
}

/// Owning scope for one grading attempt's working directory.
///
/// Artifacts are removed by [`RunContext::close`], or on drop if the context
/// was never closed (early returns, panics), unless retention is `Keep`.
/// Independent runs must use distinct directories.
#[derive(Debug)]
pub struct RunContext {
    dir: PathBuf,
    retention: Retention,
    created: bool,
    closed: bool,
}

impl RunContext {
    /// Use `dir` as the working directory, creating it if absent.
    ///
    /// An existing directory must be empty: teardown removes everything in it.
    pub fn open(dir: impl AsRef<Path>, retention: Retention) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let created = !dir.exists();
        if !created && fs::read_dir(&dir)?.next().is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("working directory {} is not empty", dir.display()),
            ));
        }
        fs::create_dir_all(&dir)?;
        // Tools run with this as their cwd, so every path handed to them must be absolute.
        let dir = dir.canonicalize()?;
        debug!(dir = %dir.display(), created, "opened run context");
        Ok(Self { dir, retention, created, closed: false })
    }

    /// A fresh, uniquely named directory under the system temp dir.
    pub fn scratch(retention: Retention) -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("grade-").tempdir()?.keep();
        debug!(dir = %dir.display(), "opened scratch run context");
        Ok(Self { dir, retention, created: true, closed: false })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of an artifact inside the working directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }

    /// Write the fake libc headers used for preprocessing and return their directory.
    pub fn materialize_stubs(&self) -> io::Result<PathBuf> {
        let dir = self.path(STUB_INCLUDE_DIR);
        write_stub_headers(&dir)?;
        Ok(dir)
    }

    /// Tear down the working directory according to the retention policy.
    pub fn close(mut self) -> io::Result<()> {
        self.closed = true;
        self.teardown()
    }

    fn teardown(&self) -> io::Result<()> {
        if self.retention == Retention::Keep {
            info!(dir = %self.dir.display(), "keeping run artifacts");
            return Ok(());
        }
        if !self.dir.exists() {
            return Ok(());
        }
        if self.created {
            fs::remove_dir_all(&self.dir)?;
        } else {
            for entry in fs::read_dir(&self.dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    fs::remove_dir_all(&path)?;
                } else {
                    fs::remove_file(&path)?;
                }
            }
        }
        debug!(dir = %self.dir.display(), "cleared run artifacts");
        Ok(())
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.teardown() {
            warn!(dir = %self.dir.display(), error = %e, "failed to clean up run artifacts");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_removes_a_directory_it_created() {
        let parent = tempfile::tempdir().unwrap();
        let dir = parent.path().join("run");
        let ctx = RunContext::open(&dir, Retention::Discard).unwrap();
        fs::write(ctx.path("temp.c"), "int x;\n").unwrap();
        ctx.close().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn close_empties_but_keeps_a_preexisting_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::open(dir.path(), Retention::Discard).unwrap();
        fs::write(ctx.path("temp.o"), b"").unwrap();
        fs::create_dir_all(ctx.path("nested")).unwrap();
        ctx.close().unwrap();
        assert!(dir.path().is_dir());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn a_directory_with_files_is_refused_and_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("thesis.tex"), "\\documentclass{article}\n").unwrap();

        let err = RunContext::open(dir.path(), Retention::Discard).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert!(err.to_string().contains("not empty"));
        assert_eq!(fs::read_to_string(dir.path().join("thesis.tex")).unwrap(), "\\documentclass{article}\n");
    }

    #[test]
    fn drop_cleans_up_when_close_is_skipped() {
        let parent = tempfile::tempdir().unwrap();
        let dir = parent.path().join("run");
        {
            let ctx = RunContext::open(&dir, Retention::Discard).unwrap();
            fs::write(ctx.path("out"), b"").unwrap();
        }
        assert!(!dir.exists());
    }

    #[test]
    fn keep_retention_leaves_artifacts() {
        let parent = tempfile::tempdir().unwrap();
        let dir = parent.path().join("run");
        let ctx = RunContext::open(&dir, Retention::Keep).unwrap();
        fs::write(ctx.path("temp.c"), "int x;\n").unwrap();
        ctx.close().unwrap();
        assert!(dir.join("temp.c").is_file());
    }

    #[test]
    fn scratch_contexts_are_distinct() {
        let a = RunContext::scratch(Retention::Discard).unwrap();
        let b = RunContext::scratch(Retention::Discard).unwrap();
        assert_ne!(a.dir(), b.dir());
        let (pa, pb) = (a.dir().to_path_buf(), b.dir().to_path_buf());
        a.close().unwrap();
        b.close().unwrap();
        assert!(!pa.exists() && !pb.exists());
    }
}
