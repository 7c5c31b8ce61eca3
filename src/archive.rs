// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

/// Archive writer bundling a directory's files into one upload unit
///
/// Archives are plain tar streams, optionally wrapped in a compression
/// codec. Entries are stored flat under their file names.
///
/// # Performance
///
/// - Gzip: widely readable, moderate speed
/// - LZ4: fastest, moderate ratio (~2-3x)
/// - Zstd: slower but better ratio (~4-6x), best when bandwidth is scarce
///
use async_trait::async_trait;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::model::{CompressionLevel, CompressionType};

#[async_trait]
pub trait Archiver: Send + Sync {
    /// Extension (without leading dot) of the archives this archiver writes
    fn extension(&self) -> &str;

    /// Bundle `sources` into a new archive at `destination`
    async fn archive(&self, sources: &[PathBuf], destination: &Path) -> io::Result<()>;
}

/// Tar archiver with configurable compression
///
/// # Examples
///
/// ```ignore
/// use record_sync::archive::TarArchiver;
/// use record_sync::model::{CompressionType, CompressionLevel};
///
/// let archiver = TarArchiver::new(CompressionType::Zstd, CompressionLevel::Default);
/// assert_eq!(archiver.extension(), "tar.zst");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TarArchiver {
    compression_type: CompressionType,
    compression_level: CompressionLevel,
}

impl TarArchiver {
    pub fn new(compression_type: CompressionType, compression_level: CompressionLevel) -> Self {
        Self {
            compression_type,
            compression_level,
        }
    }

    /// Encode into `destination` only once the archive is complete
    fn write_archive(&self, sources: &[PathBuf], destination: &Path) -> io::Result<()> {
        let partial = partial_path(destination);
        let result = self
            .encode(sources, &partial)
            .and_then(|()| std::fs::rename(&partial, destination));
        if result.is_err() {
            let _ = std::fs::remove_file(&partial);
        }
        result
    }

    fn encode(&self, sources: &[PathBuf], path: &Path) -> io::Result<()> {
        let file = BufWriter::new(File::create(path)?);

        match self.compression_type {
            CompressionType::None => {
                let mut writer = write_tar(file, sources)?;
                writer.flush()?;
            }
            CompressionType::Gzip => {
                let level = flate2::Compression::new(self.compression_level.to_gzip_level());
                let encoder = flate2::write::GzEncoder::new(file, level);
                let encoder = write_tar(encoder, sources)?;
                encoder.finish()?.flush()?;
            }
            CompressionType::Lz4 => {
                let encoder = lz4::EncoderBuilder::new()
                    .level(self.compression_level.to_lz4_level())
                    .build(file)?;
                let encoder = write_tar(encoder, sources)?;
                let (mut file, result) = encoder.finish();
                result?;
                file.flush()?;
            }
            CompressionType::Zstd => {
                let encoder =
                    zstd::stream::write::Encoder::new(file, self.compression_level.to_zstd_level())?;
                let encoder = write_tar(encoder, sources)?;
                encoder.finish()?.flush()?;
            }
        }

        Ok(())
    }
}

impl Default for TarArchiver {
    fn default() -> Self {
        Self::new(CompressionType::default(), CompressionLevel::default())
    }
}

#[async_trait]
impl Archiver for TarArchiver {
    fn extension(&self) -> &str {
        self.compression_type.archive_extension()
    }

    async fn archive(&self, sources: &[PathBuf], destination: &Path) -> io::Result<()> {
        let archiver = *self;
        let sources = sources.to_vec();
        let destination = destination.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let result = archiver.write_archive(&sources, &destination);
            if result.is_ok() {
                debug!(
                    "Archived {} files into {} using {:?}",
                    sources.len(),
                    destination.display(),
                    archiver.compression_type
                );
            }
            result
        })
        .await
        .map_err(io::Error::other)?
    }
}

/// `telemetry.tar.gz` -> `telemetry.tar.gz.partial`
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn write_tar<W: Write>(writer: W, sources: &[PathBuf]) -> io::Result<W> {
    let mut builder = tar::Builder::new(writer);
    for source in sources {
        let name = source.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("archive source has no file name: {}", source.display()),
            )
        })?;
        builder.append_path_with_name(source, name)?;
    }
    builder.into_inner()
}
