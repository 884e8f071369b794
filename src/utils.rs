//! Small helpers shared by the readers.
use std::{
    fs::File,
    io::{BufRead, BufReader},
    ops::{Deref, DerefMut},
    path::Path,
};

use flate2::read::MultiGzDecoder;

use crate::error::LoadError;

/// Returns `true` if the path has a `.gz` extension.
pub fn is_gzipped(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// A buffered reader for a text table, which remembers the path it is reading.
pub struct FileBuf<'p, F: BufRead> {
    reader: F,
    pub path: &'p Path,
}

impl<'p> FileBuf<'p, Box<dyn BufRead>> {
    /// Open a file in buffered mode.
    ///
    /// Files with a `.gz` extension are decompressed transparently. Any other
    /// file is read as plain text.
    ///
    /// # Returns
    /// A [`Result`] with the `FileBuf` instance. An error is returned if the file could
    /// not be opened by `std::fs::File::open`; the error from that method will be displayed
    /// as the `reason` string in the returned [`LoadError::CouldNotOpen`].
    pub fn open(file: &'p Path) -> Result<Self, LoadError> {
        let f = File::open(file).map_err(|e| LoadError::CouldNotOpen {
            path: file.to_owned(),
            reason: e.to_string(),
        })?;

        let reader: Box<dyn BufRead> = if is_gzipped(file) {
            Box::new(BufReader::new(MultiGzDecoder::new(f)))
        } else {
            Box::new(BufReader::new(f))
        };
        Ok(Self { reader, path: file })
    }
}

impl<'p, F: BufRead> FileBuf<'p, F> {
    pub fn is_compressed(&self) -> bool {
        is_gzipped(self.path)
    }

    /// Read and return one line from the header of a table.
    ///
    /// # Returns
    /// A [`Result`] with the line as an owned [`String`]. An empty string means the
    /// end of the file was reached.
    pub fn read_header_line(&mut self) -> Result<String, LoadError> {
        let mut buf = String::new();
        self.read_line(&mut buf).map_err(|e| LoadError::CouldNotRead {
            path: self.path.to_owned(),
            reason: format!("{e} (while reading the header)"),
        })?;
        Ok(buf)
    }

    /// Read and return one line from the data block of a table.
    ///
    /// Identical to `read_header_line` except that the error message says the
    /// error occurred while reading the data.
    pub fn read_data_line(&mut self) -> Result<String, LoadError> {
        let mut buf = String::new();
        self.read_line(&mut buf).map_err(|e| LoadError::CouldNotRead {
            path: self.path.to_owned(),
            reason: format!("{e} (while reading the data)"),
        })?;
        Ok(buf)
    }
}

impl<'p, F: BufRead> Deref for FileBuf<'p, F> {
    type Target = F;

    fn deref(&self) -> &Self::Target {
        &self.reader
    }
}

impl<'p, F: BufRead> DerefMut for FileBuf<'p, F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.reader
    }
}
