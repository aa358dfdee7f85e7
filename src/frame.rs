//! Captured frame buffers and the on-disk frame file format
//!
//! A frame file is a 12-byte header holding three native-endian 32-bit
//! integers (width, height, stride) followed by `height * stride` bytes of
//! 32-bit ZPixmap pixel data.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bytes per pixel of every frame (BGRX on little-endian servers)
pub const BYTES_PER_PIXEL: usize = 4;

/// Size of the width/height/stride header
pub const HEADER_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum FrameFileError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid frame header in {}: {reason}", .path.display())]
    BadHeader { path: PathBuf, reason: String },

    #[error("frame {} is truncated: expected {expected} bytes, found {found}", .path.display())]
    Truncated {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("frame {} is {found} but the run is {expected}", .path.display())]
    HeaderMismatch {
        path: PathBuf,
        expected: FrameHeader,
        found: FrameHeader,
    },

    #[error("pixel buffer holds {actual} bytes, {expected} expected for {header}")]
    BufferSize {
        header: FrameHeader,
        expected: usize,
        actual: usize,
    },
}

impl FrameFileError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Dimensions shared by every frame of a capture run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, including any padding the server adds
    pub stride: u32,
}

impl FrameHeader {
    pub fn payload_len(&self) -> usize {
        self.height as usize * self.stride as usize
    }

    /// Bytes per row without padding
    pub fn packed_row_len(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        for (chunk, value) in bytes
            .chunks_exact_mut(4)
            .zip([self.width, self.height, self.stride])
        {
            chunk.copy_from_slice(&(value as i32).to_ne_bytes());
        }
        bytes
    }

    fn from_bytes(bytes: &[u8; HEADER_LEN], path: &Path) -> Result<Self, FrameFileError> {
        let mut fields = [0u32; 3];
        for (field, chunk) in fields.iter_mut().zip(bytes.chunks_exact(4)) {
            let raw = i32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            *field = u32::try_from(raw).map_err(|_| FrameFileError::BadHeader {
                path: path.to_path_buf(),
                reason: format!("negative dimension {}", raw),
            })?;
        }

        let header = Self {
            width: fields[0],
            height: fields[1],
            stride: fields[2],
        };
        if (header.stride as usize) < header.packed_row_len() {
            return Err(FrameFileError::BadHeader {
                path: path.to_path_buf(),
                reason: format!(
                    "stride {} is shorter than a {}-pixel row",
                    header.stride, header.width
                ),
            });
        }
        Ok(header)
    }
}

impl fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} (stride {})", self.width, self.height, self.stride)
    }
}

/// One captured image, exclusively owned until it is written out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub data: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32, stride: u32, data: Vec<u8>) -> Result<Self, FrameFileError> {
        let header = FrameHeader {
            width,
            height,
            stride,
        };
        if data.len() != header.payload_len() {
            return Err(FrameFileError::BufferSize {
                header,
                expected: header.payload_len(),
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            stride,
            data,
        })
    }

    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            width: self.width,
            height: self.height,
            stride: self.stride,
        }
    }

    /// Pixel rows with the stride padding cut off
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        let row_len = self.header().packed_row_len();
        // A zero stride only happens for empty frames; chunks_exact panics on 0
        let stride = (self.stride as usize).max(1);
        self.data
            .chunks_exact(stride)
            .map(move |row| &row[..row_len.min(row.len())])
    }

    /// Write the pixel rows back to back, without padding
    pub fn write_packed<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for row in self.rows() {
            out.write_all(row)?;
        }
        Ok(())
    }
}

/// Write a frame file: header followed by the raw pixel bytes
pub fn write_frame_file(path: &Path, frame: &FrameBuffer) -> Result<(), FrameFileError> {
    let file = File::create(path).map_err(|e| FrameFileError::io(path, e))?;
    let mut out = BufWriter::new(file);

    out.write_all(&frame.header().to_bytes())
        .and_then(|_| out.write_all(&frame.data))
        .and_then(|_| out.flush())
        .map_err(|e| FrameFileError::io(path, e))
}

/// Read only the header of a frame file
pub fn read_frame_header(path: &Path) -> Result<FrameHeader, FrameFileError> {
    let mut file = File::open(path).map_err(|e| FrameFileError::io(path, e))?;
    read_header(&mut file, path)
}

/// Read a whole frame file back into memory
pub fn read_frame_file(path: &Path) -> Result<FrameBuffer, FrameFileError> {
    let mut file = File::open(path).map_err(|e| FrameFileError::io(path, e))?;
    let header = read_header(&mut file, path)?;

    // The header may be damaged; never allocate more than the file holds
    let expected = header.payload_len();
    let file_len = file
        .metadata()
        .map_err(|e| FrameFileError::io(path, e))?
        .len();
    let available = usize::try_from(file_len)
        .unwrap_or(usize::MAX)
        .saturating_sub(HEADER_LEN);
    if available < expected {
        return Err(FrameFileError::Truncated {
            path: path.to_path_buf(),
            expected: HEADER_LEN.saturating_add(expected),
            found: HEADER_LEN + available,
        });
    }

    let mut data = Vec::with_capacity(expected);
    file.take(expected as u64)
        .read_to_end(&mut data)
        .map_err(|e| FrameFileError::io(path, e))?;

    if data.len() < expected {
        return Err(FrameFileError::Truncated {
            path: path.to_path_buf(),
            expected: HEADER_LEN + expected,
            found: HEADER_LEN + data.len(),
        });
    }

    FrameBuffer::new(header.width, header.height, header.stride, data)
}

fn read_header(file: &mut File, path: &Path) -> Result<FrameHeader, FrameFileError> {
    let mut bytes = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        match file.read(&mut bytes[filled..]) {
            Ok(0) => {
                return Err(FrameFileError::Truncated {
                    path: path.to_path_buf(),
                    expected: HEADER_LEN,
                    found: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FrameFileError::io(path, e)),
        }
    }
    FrameHeader::from_bytes(&bytes, path)
}
