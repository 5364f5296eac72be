//! Session audit log: every fetch, score, accept and skip decision goes
//! through here, to the console and (when configured) to a log file, so a
//! run can be reconstructed line by line afterwards.
//!
//! This is deliberately separate from the `log` crate diagnostics: the
//! audit trail is a domain artifact referenced by the search session record.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Local;

pub struct SearchLog {
    file: Mutex<Option<File>>,
    path: Option<PathBuf>,
    pub verbose: bool,
}

impl SearchLog {
    /// Console-only sink. Used by tests and ad-hoc runs.
    pub fn to_console(verbose: bool) -> Self {
        Self {
            file: Mutex::new(None),
            path: None,
            verbose,
        }
    }

    /// Console + file sink. The file is created eagerly so a failing path
    /// surfaces before the run starts.
    pub fn create(path: &Path, verbose: bool) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(Some(file)),
            path: Some(path.to_path_buf()),
            verbose,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one timestamped line to console and file. The file is flushed
    /// before returning so a mid-run crash loses at most the in-flight line.
    pub fn write(&self, message: &str) {
        let line = format!("[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
        println!("{line}");
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = writeln!(file, "{line}");
                let _ = file.flush();
            }
        }
    }

    /// Extra detail, written only when verbose is enabled.
    pub fn debug(&self, message: &str) {
        if self.verbose {
            self.write(message);
        }
    }
}
