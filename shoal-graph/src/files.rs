//! Input file discovery and token parsing
//!
//! Data directories hold `id_*` triple files and `attr_*` attribute files,
//! both whitespace-separated integer records. Paths prefixed `hdfs:` would
//! be served by the HDFS reader; this build only supports POSIX
//! filesystems and reports an error for HDFS paths, mirroring a build
//! without Hadoop support.
//!
//! File-name lists are sorted before use so every server assigns the same
//! index to the same file.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// List `prefix`-named files under `dname`, sorted
pub fn list_files(dname: &str, prefix: &str) -> Result<Vec<PathBuf>> {
    if dname.starts_with("hdfs:") {
        return Err(Error::load(format!(
            "data directory {dname} is on HDFS but this build has no HDFS support"
        )));
    }
    let dir = Path::new(dname);
    let entries = std::fs::read_dir(dir).map_err(|e| {
        Error::load(format!("failed to open data directory {dname}: {e}"))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dname, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        if name.starts_with(prefix) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Whitespace-separated token reader over a buffered file
pub struct TokenReader {
    lines: std::io::Lines<BufReader<File>>,
    current: Vec<String>,
    pos: usize,
    path: String,
}

impl TokenReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path.display().to_string(), e))?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            current: Vec::new(),
            pos: 0,
            path: path.display().to_string(),
        })
    }

    /// Refill the token buffer; false at end of file
    fn refill(&mut self) -> Result<bool> {
        while self.pos >= self.current.len() {
            match self.lines.next() {
                Some(line) => {
                    let line = line.map_err(|e| Error::io(self.path.clone(), e))?;
                    self.current = line.split_whitespace().map(str::to_owned).collect();
                    self.pos = 0;
                }
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    /// Next token parsed as `u64`, or `None` at end of file
    pub fn next_u64(&mut self) -> Result<Option<u64>> {
        if !self.refill()? {
            return Ok(None);
        }
        let i = self.pos;
        self.pos += 1;
        let tok = &self.current[i];
        match tok.parse::<u64>() {
            Ok(v) => Ok(Some(v)),
            Err(e) => Err(Error::load(format!(
                "bad integer {tok:?} in {}: {e}",
                self.path
            ))),
        }
    }

    /// Next token as owned string, or `None` at end of file
    pub fn next_string(&mut self) -> Result<Option<String>> {
        if !self.refill()? {
            return Ok(None);
        }
        let i = self.pos;
        self.pos += 1;
        Ok(Some(self.current[i].clone()))
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}
