//! A single (file, codec) compression job.
//!
//! ```text
//! Scheduled → Reading → Compressing → Writing → JobSuccess
//!                 └──────────┴───────────┴────→ JobFailure
//! ```
//!
//! The job streams the source through the encoder into a temporary file in
//! the same directory and renames it onto `<path>.<ext>` only once the
//! encoder is finished and flushed. On failure the temporary file is
//! dropped, so a visible sibling is always complete. The source is never
//! modified.

use super::Codec;
use brotli::enc::backward_references::{BrotliEncoderMode, BrotliEncoderParams};
use flate2::{Compression, write::GzEncoder};
use std::{
    fmt,
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

/// Streaming buffer size for both ends of a job.
const BUFFER_SIZE: usize = 64 * 1024;

/// Highest brotli quality level.
const BROTLI_MAX_QUALITY: i32 = 11;

/// Stage a job was in; a failure records where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Scheduled,
    Reading,
    Compressing,
    Writing,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scheduled => "scheduled",
            Self::Reading => "reading",
            Self::Compressing => "compressing",
            Self::Writing => "writing",
        })
    }
}

/// One unit of work: compress `source` with `codec`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionJob {
    pub source: PathBuf,
    pub codec: Codec,
}

/// A finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSuccess {
    pub source: PathBuf,
    pub codec: Codec,
    pub input_bytes: u64,
    pub output_bytes: u64,
}

/// A failed job. Terminal; the engine does not retry.
#[derive(Debug)]
pub struct JobFailure {
    pub source: PathBuf,
    pub codec: Codec,
    pub stage: JobStage,
    pub error: io::Error,
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}, {}]: {}",
            self.source.display(),
            self.codec,
            self.stage,
            self.error
        )
    }
}

impl CompressionJob {
    pub fn new(source: PathBuf, codec: Codec) -> Self {
        Self { source, codec }
    }

    /// `<source>.<ext>`
    pub fn destination(&self) -> PathBuf {
        let mut name = self.source.clone().into_os_string();
        name.push(".");
        name.push(self.codec.ext());
        PathBuf::from(name)
    }

    fn fail(&self, stage: JobStage) -> impl FnOnce(io::Error) -> JobFailure + '_ {
        move |error| JobFailure {
            source: self.source.clone(),
            codec: self.codec,
            stage,
            error,
        }
    }

    /// Run the job to completion.
    pub fn run(&self) -> Result<JobSuccess, JobFailure> {
        let dest = self.destination();

        // Reading: open and stat; the size feeds the brotli size hint.
        let source = File::open(&self.source).map_err(self.fail(JobStage::Reading))?;
        let metadata = source.metadata().map_err(self.fail(JobStage::Reading))?;
        if metadata.is_dir() {
            return Err(self.fail(JobStage::Reading)(io::Error::other("is a directory")));
        }
        let input_bytes = metadata.len();

        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::Builder::new()
            .prefix(".bunpack-")
            .suffix(&format!(".{}.tmp", self.codec.ext()))
            .tempfile_in(parent)
            .map_err(self.fail(JobStage::Writing))?;

        // Compressing: stream source → encoder → temporary file.
        {
            let mut reader = BufReader::with_capacity(BUFFER_SIZE, source);
            let writer = BufWriter::with_capacity(BUFFER_SIZE, tmp.as_file_mut());
            let mut writer = encode(self.codec, &mut reader, writer, input_bytes)
                .map_err(self.fail(JobStage::Compressing))?;
            writer.flush().map_err(self.fail(JobStage::Writing))?;
        }

        // Writing: match the source's permissions, then publish atomically.
        tmp.as_file()
            .set_permissions(metadata.permissions())
            .map_err(self.fail(JobStage::Writing))?;
        let output_bytes = tmp
            .as_file()
            .metadata()
            .map_err(self.fail(JobStage::Writing))?
            .len();
        tmp.persist(&dest)
            .map_err(|e| self.fail(JobStage::Writing)(e.error))?;

        Ok(JobSuccess {
            source: self.source.clone(),
            codec: self.codec,
            input_bytes,
            output_bytes,
        })
    }
}

/// Stream `reader` through `codec` into `writer`, returning the writer once
/// the encoder has emitted its trailer.
pub fn encode<R: Read, W: Write>(
    codec: Codec,
    reader: &mut R,
    writer: W,
    size_hint: u64,
) -> io::Result<W> {
    match codec {
        Codec::Gzip => {
            let mut encoder = GzEncoder::new(writer, Compression::best());
            io::copy(reader, &mut encoder)?;
            encoder.finish()
        }
        Codec::Brotli => {
            let params = brotli_params(size_hint);
            let mut writer = writer;
            brotli::BrotliCompress(reader, &mut writer, &params)?;
            Ok(writer)
        }
    }
}

/// Text mode, maximum quality, exact input size as the allocation hint.
fn brotli_params(size_hint: u64) -> BrotliEncoderParams {
    let mut params = BrotliEncoderParams::default();
    params.mode = BrotliEncoderMode::BROTLI_MODE_TEXT;
    params.quality = BROTLI_MAX_QUALITY;
    params.size_hint = usize::try_from(size_hint).unwrap_or(usize::MAX);
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::fs;
    use tempfile::TempDir;

    fn sample() -> Vec<u8> {
        "function hello(name) { return `hello ${name}`; }\n"
            .repeat(200)
            .into_bytes()
    }

    fn gunzip(bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(bytes).read_to_end(&mut out).unwrap();
        out
    }

    fn unbrotli(bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        brotli::Decompressor::new(bytes, 4096)
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_destination_appends_extension() {
        let job = CompressionJob::new(PathBuf::from("/out/app.js"), Codec::Brotli);
        assert_eq!(job.destination(), PathBuf::from("/out/app.js.br"));
    }

    #[test]
    fn test_gzip_job_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.js");
        fs::write(&path, sample()).unwrap();

        let done = CompressionJob::new(path.clone(), Codec::Gzip).run().unwrap();
        assert_eq!(done.input_bytes, sample().len() as u64);
        assert!(done.output_bytes < done.input_bytes);

        let packed = fs::read(dir.path().join("app.js.gz")).unwrap();
        assert_eq!(packed.len() as u64, done.output_bytes);
        assert_eq!(gunzip(&packed), sample());
        // Source untouched.
        assert_eq!(fs::read(&path).unwrap(), sample());
    }

    #[test]
    fn test_brotli_job_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.html");
        fs::write(&path, sample()).unwrap();

        CompressionJob::new(path, Codec::Brotli).run().unwrap();
        let packed = fs::read(dir.path().join("index.html.br")).unwrap();
        assert_eq!(unbrotli(&packed), sample());
    }

    #[test]
    fn test_empty_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.json");
        fs::write(&path, b"").unwrap();

        for codec in [Codec::Gzip, Codec::Brotli] {
            CompressionJob::new(path.clone(), codec).run().unwrap();
        }
        assert!(gunzip(&fs::read(dir.path().join("empty.json.gz")).unwrap()).is_empty());
        assert!(unbrotli(&fs::read(dir.path().join("empty.json.br")).unwrap()).is_empty());
    }

    #[test]
    fn test_missing_source_fails_reading_and_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let job = CompressionJob::new(dir.path().join("gone.js"), Codec::Gzip);

        let failure = job.run().unwrap_err();
        assert_eq!(failure.stage, JobStage::Reading);
        assert_eq!(failure.error.kind(), io::ErrorKind::NotFound);
        assert!(!job.destination().exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_overwrites_stale_sibling() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.css");
        fs::write(&path, sample()).unwrap();
        fs::write(dir.path().join("app.css.gz"), b"stale").unwrap();

        CompressionJob::new(path, Codec::Gzip).run().unwrap();
        let packed = fs::read(dir.path().join("app.css.gz")).unwrap();
        assert_eq!(gunzip(&packed), sample());
    }

    #[test]
    fn test_failing_reader_propagates() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("disk on fire"))
            }
        }
        for codec in [Codec::Gzip, Codec::Brotli] {
            let err = encode(codec, &mut Broken, Vec::new(), 0).unwrap_err();
            assert!(err.to_string().contains("disk on fire"));
        }
    }
}
