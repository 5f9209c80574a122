use super::error::SourceError;
use super::source::{GameSource, RawGames};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zstd::stream::read::Decoder as ZstdDecoder;

pub type JsonInput = Box<dyn BufRead>;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CompressionMode {
    #[default]
    Plain,
    Zstd,
}

impl CompressionMode {
    pub fn parse(raw: &str) -> Result<Self, SourceError> {
        let normalized = raw.trim();
        if normalized.is_empty() {
            return Err(SourceError::InvalidInput(
                "Invalid compression value ''. Supported values: 'zstd' or 'none'.".to_string(),
            ));
        }

        if normalized.eq_ignore_ascii_case("zstd") {
            Ok(Self::Zstd)
        } else if normalized.eq_ignore_ascii_case("none") {
            Ok(Self::Plain)
        } else {
            Err(SourceError::InvalidInput(format!(
                "Invalid compression value '{}'. Supported values: 'zstd' or 'none'.",
                normalized
            )))
        }
    }
}

/// Expands a glob pattern (`*`, `?`) into matching paths, or takes the
/// pattern as a single literal path.
pub fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>, SourceError> {
    if pattern.contains('*') || pattern.contains('?') {
        let paths: Vec<PathBuf> = glob::glob(pattern)
            .map_err(|e| SourceError::InvalidInput(format!("'{pattern}': {e}")))?
            .filter_map(|entry| entry.ok())
            .collect();
        if paths.is_empty() {
            warn!(pattern, "pattern matched no files");
        }
        Ok(paths)
    } else {
        Ok(vec![PathBuf::from(pattern)])
    }
}

fn open_input_stream(path: &Path, compression: CompressionMode) -> Result<JsonInput, SourceError> {
    let file = File::open(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match compression {
        CompressionMode::Plain => Ok(Box::new(BufReader::new(file))),
        CompressionMode::Zstd => ZstdDecoder::new(file)
            .map(|decoder| Box::new(BufReader::new(decoder)) as JsonInput)
            .map_err(|source| SourceError::Io {
                path: path.to_path_buf(),
                source,
            }),
    }
}

/// Game source over Lichess NDJSON export files (one game object per line).
#[derive(Debug, Clone)]
pub struct NdjsonFileSource {
    paths: Vec<PathBuf>,
    compression: CompressionMode,
}

impl NdjsonFileSource {
    pub fn new(pattern: &str, compression: CompressionMode) -> Result<Self, SourceError> {
        Ok(Self::from_paths(expand_pattern(pattern)?, compression))
    }

    pub fn from_paths(paths: Vec<PathBuf>, compression: CompressionMode) -> Self {
        Self { paths, compression }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl GameSource for NdjsonFileSource {
    fn games(&self) -> Result<RawGames<'_>, SourceError> {
        Ok(Box::new(NdjsonGames {
            paths: &self.paths,
            compression: self.compression,
            next_path_idx: 0,
            current: None,
        }))
    }
}

struct FileReaderState {
    input: JsonInput,
    path_idx: usize,
    line_no: usize,
    buf: Vec<u8>,
}

enum ReadNextLine {
    Game(Value),
    Skip,
    Failed(SourceError),
    ReaderFinished,
}

pub struct NdjsonGames<'a> {
    paths: &'a [PathBuf],
    compression: CompressionMode,
    next_path_idx: usize,
    current: Option<FileReaderState>,
}

impl NdjsonGames<'_> {
    fn acquire_reader(&mut self) -> Result<Option<FileReaderState>, SourceError> {
        while self.next_path_idx < self.paths.len() {
            let path_idx = self.next_path_idx;
            self.next_path_idx += 1;

            let path = &self.paths[path_idx];
            match open_input_stream(path, self.compression) {
                Ok(input) => {
                    debug!(path = %path.display(), "reading game export");
                    return Ok(Some(FileReaderState {
                        input,
                        path_idx,
                        line_no: 0,
                        buf: Vec::new(),
                    }));
                }
                Err(err) => {
                    if self.paths.len() == 1 {
                        return Err(err);
                    }
                    warn!("{err}");
                }
            }
        }

        Ok(None)
    }

    fn read_next_line(&mut self) -> ReadNextLine {
        let Some(reader) = self.current.as_mut() else {
            return ReadNextLine::ReaderFinished;
        };
        let path = &self.paths[reader.path_idx];

        reader.buf.clear();
        // Read bytes so invalid UTF-8 fails only this line.
        match reader.input.read_until(b'\n', &mut reader.buf) {
            Ok(0) => ReadNextLine::ReaderFinished,
            Ok(_) => {
                reader.line_no += 1;
                let line = reader.buf.trim_ascii();
                if line.is_empty() {
                    return ReadNextLine::Skip;
                }
                match serde_json::from_slice(line) {
                    Ok(value) => ReadNextLine::Game(value),
                    Err(source) => ReadNextLine::Failed(SourceError::Decode {
                        origin: path.display().to_string(),
                        line: reader.line_no,
                        source,
                    }),
                }
            }
            Err(source) => {
                // Drop the reader; a broken stream would fail the same way again.
                let err = SourceError::Io {
                    path: path.clone(),
                    source,
                };
                self.current = None;
                ReadNextLine::Failed(err)
            }
        }
    }
}

impl Iterator for NdjsonGames<'_> {
    type Item = Result<Value, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                match self.acquire_reader() {
                    Ok(Some(reader)) => self.current = Some(reader),
                    Ok(None) => return None,
                    Err(err) => return Some(Err(err)),
                }
            }

            match self.read_next_line() {
                ReadNextLine::Game(value) => return Some(Ok(value)),
                ReadNextLine::Failed(err) => return Some(Err(err)),
                ReadNextLine::Skip => {}
                ReadNextLine::ReaderFinished => self.current = None,
            }
        }
    }
}
