//! Duplicate removal for a generated corpus.
//!
//! Different flag-sets often produce byte-identical files (an encoder that
//! ignores an option, a setting that equals the default). Duplicates add
//! nothing to a fuzzing corpus, so after generation every pair of files in
//! the output directory is compared and the later member of each identical
//! pair is deleted.
//!
//! # Design
//!
//! The pass is exact: two files are duplicates only if their contents are
//! byte-for-byte identical. Cheap checks run first and can only rule a pair
//! *out*:
//!
//! 1. Same device and inode (a hard link to itself) is never a duplicate.
//! 2. Different sizes are never duplicates.
//! 3. Different SHA-256 digests are never duplicates. Digests are computed
//!    once per file and reused across all of its pairs.
//!
//! Pairs that pass all three are compared byte by byte before anything is
//! deleted.
//!
//! ## Survivor selection
//!
//! Entries are visited in file-name order, so within each set of identical
//! files the lexicographically smallest name survives. The directory is not
//! walked recursively and only regular files take part.
//!
//! A file that disappears during the pass (removed by someone else) is
//! skipped rather than treated as an error.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File, Metadata};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum DedupError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Unable to list '{path}': {source}", path = .path.display())]
    List {
        path: PathBuf,
        source: walkdir::Error,
    },
}

/// Summary of a deduplication pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DedupStats {
    /// Regular files found when the pass started.
    pub scanned: usize,
    /// Pairs that needed a byte comparison.
    pub compared: usize,
    /// Files deleted as duplicates.
    pub removed: usize,
    /// Files that disappeared while the pass ran.
    pub vanished: usize,
}

impl DedupStats {
    pub fn kept(&self) -> usize {
        self.scanned - self.removed - self.vanished
    }
}

impl fmt::Display for DedupStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} duplicate(s) removed, {} file(s) kept",
            self.removed,
            self.kept()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Present,
    Removed,
    Missing,
}

#[derive(Debug)]
struct Candidate {
    path: PathBuf,
    state: State,
    digest: Option<String>,
}

impl Candidate {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: State::Present,
            digest: None,
        }
    }

    /// Metadata, or `None` (and marked missing) if the file is gone.
    fn metadata(&mut self) -> io::Result<Option<Metadata>> {
        let result = fs::metadata(&self.path);
        self.found(result)
    }

    fn digest(&mut self) -> io::Result<Option<String>> {
        if self.digest.is_none() {
            let result = hash_file(&self.path);
            self.digest = self.found(result)?;
        }
        Ok(self.digest.clone())
    }

    fn found<T>(&mut self, result: io::Result<T>) -> io::Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.state = State::Missing;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Remove byte-identical files from `dir`. See the [module docs](self).
pub fn remove_duplicates(dir: &Path) -> Result<DedupStats, DedupError> {
    if !dir.is_dir() {
        return Ok(DedupStats::default());
    }
    let mut files: Vec<Candidate> = list_files(dir)?.into_iter().map(Candidate::new).collect();
    let mut stats = DedupStats {
        scanned: files.len(),
        ..DedupStats::default()
    };

    for i in 0..files.len() {
        for j in (i + 1)..files.len() {
            if files[i].state != State::Present {
                break;
            }
            if files[j].state != State::Present {
                continue;
            }
            let (head, tail) = files.split_at_mut(j);
            let (first, second) = (&mut head[i], &mut tail[0]);
            if !maybe_identical(first, second)? {
                continue;
            }
            stats.compared += 1;
            if !contents_equal(&first.path, &second.path)? {
                continue;
            }
            debug!(
                "'{}' matches '{}'",
                first.path.display(),
                second.path.display()
            );
            match fs::remove_file(&second.path) {
                Ok(()) => {
                    second.state = State::Removed;
                    stats.removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => second.state = State::Missing,
                Err(e) => return Err(e.into()),
            }
        }
    }

    stats.vanished = count_vanished(&mut files)?;
    debug!("removed {} duplicate(s)", stats.removed);
    Ok(stats)
}

/// Files gone by the end of the pass, whether or not a comparison noticed.
fn count_vanished(files: &mut [Candidate]) -> io::Result<usize> {
    let mut vanished = 0;
    for file in files.iter_mut() {
        if file.state == State::Present {
            file.metadata()?;
        }
        if file.state == State::Missing {
            vanished += 1;
        }
    }
    Ok(vanished)
}

/// Regular files directly inside `dir`, sorted by file name.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>, DedupError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.io_error().is_some_and(|io| io.kind() == io::ErrorKind::NotFound) => {
                continue;
            }
            Err(source) => {
                return Err(DedupError::List {
                    path: dir.to_path_buf(),
                    source,
                });
            }
        };
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Cheap checks that can only rule a pair out.
fn maybe_identical(first: &mut Candidate, second: &mut Candidate) -> io::Result<bool> {
    let (Some(meta_first), Some(meta_second)) = (first.metadata()?, second.metadata()?) else {
        return Ok(false);
    };
    if same_file(&meta_first, &meta_second) || meta_first.len() != meta_second.len() {
        return Ok(false);
    }
    let (Some(digest_first), Some(digest_second)) = (first.digest()?, second.digest()?) else {
        return Ok(false);
    };
    Ok(digest_first == digest_second)
}

#[cfg(unix)]
fn same_file(a: &Metadata, b: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_file(_a: &Metadata, _b: &Metadata) -> bool {
    false
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Byte-exact comparison. A file that vanished compares unequal.
fn contents_equal(a: &Path, b: &Path) -> io::Result<bool> {
    let (mut file_a, mut file_b) = match (File::open(a), File::open(b)) {
        (Ok(file_a), Ok(file_b)) => (file_a, file_b),
        (Err(e), _) | (_, Err(e)) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        (Err(e), _) | (_, Err(e)) => return Err(e),
    };
    let mut buf_a = vec![0u8; CHUNK_SIZE];
    let mut buf_b = vec![0u8; CHUNK_SIZE];
    loop {
        let n_a = read_chunk(&mut file_a, &mut buf_a)?;
        let n_b = read_chunk(&mut file_b, &mut buf_b)?;
        if n_a != n_b || buf_a[..n_a] != buf_b[..n_b] {
            return Ok(false);
        }
        if n_a == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as the file allows; returns the number of bytes read.
fn read_chunk(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
