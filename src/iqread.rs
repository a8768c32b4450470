//! Chunked I/Q sample reader.
//!
//! Wraps any byte source holding interleaved I/Q pairs and yields blocks of
//! a fixed number of complex samples. The file receiver uses it to replay
//! captures; a trailing partial chunk is treated as end of stream.
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use num_complex::Complex;

use crate::IqFormat;
use crate::error::{Error, Result};

pub struct IqRead<R: Read> {
    reader: R,
    format: IqFormat,
    chunk_size: usize,
    raw: Vec<u8>,
}

impl<R: Read> IqRead<R> {
    /// Reader yielding `chunk_size` samples per item.
    pub fn new(reader: R, chunk_size: usize, format: IqFormat) -> Self {
        Self {
            reader,
            format,
            chunk_size,
            raw: vec![0; chunk_size * format.bytes_per_sample()],
        }
    }

    pub fn format(&self) -> IqFormat {
        self.format
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Next full chunk, `None` once fewer than `chunk_size` samples remain.
    pub fn read_chunk(&mut self) -> Result<Option<Vec<Complex<f32>>>> {
        match self.reader.read_exact(&mut self.raw) {
            Ok(()) => Ok(Some(crate::convert_bytes_to_complex(self.format, &self.raw))),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

impl IqRead<BufReader<File>> {
    /// Opens a capture file; a leading `~` is expanded.
    pub fn from_file<P: AsRef<Path>>(path: P, chunk_size: usize, format: IqFormat) -> Result<Self> {
        let file = File::open(expanduser(path.as_ref().to_path_buf()))?;
        Ok(Self::new(BufReader::new(file), chunk_size, format))
    }
}

impl<R: Read> Iterator for IqRead<R> {
    type Item = Result<Vec<Complex<f32>>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_chunk().transpose()
    }
}

/// Resolves `~/...` against the user's home directory; other paths, or
/// any path when no home directory is known, are returned as is.
pub fn expanduser(path: PathBuf) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path
}
