// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Child-process transport: talk to a controller image over stdin/stdout.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use super::{Conduit, Transport};
use crate::error::{ConnectionError, Result};

#[derive(Debug)]
pub struct ProcessTransport {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    child: Option<Child>,
}

impl ProcessTransport {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            child: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Transport for ProcessTransport {
    fn open(&mut self) -> Result<Conduit> {
        self.close();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        let mut child = cmd
            .spawn()
            .map_err(|e| ConnectionError::io(format!("spawn {}", self.describe()), e))?;

        let (Some(stdout), Some(stdin)) = (child.stdout.take(), child.stdin.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            let reason = format!("{}: pipes unavailable", self.describe());
            return Err(ConnectionError::new(reason).into());
        };
        log::debug!("[PROCESS] started {} (pid {})", self.describe(), child.id());
        self.child = Some(child);
        Ok(Conduit::new(stdout, stdin))
    }

    fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            // InvalidInput once the child already exited
            let _ = child.kill();
            if let Err(e) = child.wait() {
                log::warn!("[PROCESS] failed to reap {}: {}", self.describe(), e);
            }
        }
    }

    fn is_available(&self) -> bool {
        self.program.is_file()
    }

    fn describe(&self) -> String {
        format!("process://{}", self.program.display())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};

    #[test]
    fn test_spawn_and_echo() {
        let mut t = ProcessTransport::new("/bin/cat");
        assert!(t.is_available());
        let conduit = t.open().expect("spawn cat");
        let Conduit { input, mut output } = conduit;
        output.write_all(b"ping\n").expect("write");
        output.flush().expect("flush");

        let mut line = String::new();
        BufReader::new(input).read_line(&mut line).expect("read");
        assert_eq!(line, "ping\n");
        t.close();
    }

    #[test]
    fn test_missing_program() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut t = ProcessTransport::new(dir.path().join("no-such-controller"));
        assert!(!t.is_available());
        assert!(t.open().expect_err("spawn must fail").is_transient());
    }
}
