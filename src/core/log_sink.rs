// src/core/log_sink.rs

//! A line-capped log file used as an optional `tracing` sink.
//!
//! The file never grows past `max_lines` lines: once the cap is reached, the
//! oldest lines are dropped before the next record is appended.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// A writer that keeps only the most recent `max_lines` lines of a file.
///
/// Lines are mirrored in memory so trimming never has to re-read the file.
/// Wrap it in a `std::sync::Mutex` to use it as a `MakeWriter`.
#[derive(Debug)]
pub struct LineCappedFile {
    path: PathBuf,
    max_lines: usize,
    lines: VecDeque<String>,
    file: File,
    /// Bytes of a record that has not yet been terminated by a newline.
    pending: Vec<u8>,
}

impl LineCappedFile {
    /// Opens (or creates) the file at `path`, keeping its existing tail.
    pub fn open(path: impl AsRef<Path>, max_lines: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let max_lines = max_lines.max(1);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let mut lines = VecDeque::new();
        match File::open(&path) {
            Ok(existing) => {
                for line in BufReader::new(existing).lines() {
                    lines.push_back(line?);
                    if lines.len() > max_lines {
                        lines.pop_front();
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let mut sink = Self {
            file: OpenOptions::new().create(true).append(true).open(&path)?,
            path,
            max_lines,
            lines,
            pending: Vec::new(),
        };
        sink.rewrite()?;
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of complete lines currently in the file.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn rewrite(&mut self) -> io::Result<()> {
        let mut contents = String::new();
        for line in &self.lines {
            contents.push_str(line);
            contents.push('\n');
        }
        fs::write(&self.path, contents)?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        Ok(())
    }

    fn push_line(&mut self, line: String) -> io::Result<()> {
        if self.lines.len() >= self.max_lines {
            while self.lines.len() >= self.max_lines {
                self.lines.pop_front();
            }
            self.lines.push_back(line);
            return self.rewrite();
        }
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.lines.push_back(line);
        Ok(())
    }
}

impl Write for LineCappedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]).into_owned();
            self.push_line(line)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
