//! Directory precompression.
//!
//! Walks an asset tree and writes `.gz` / `.br` siblings for every file
//! with an eligible extension:
//!
//! 1. **Discover** - absent root is a no-op; otherwise collect eligible
//!    files (recursive, dotfiles included, no ordering assumed).
//! 2. **Fan out** - one [`CompressionJob`] per (file, enabled codec).
//! 3. **Execute** - jobs run on a bounded worker pool; each streams its
//!    source through the encoder into a disjoint destination, so no locking
//!    is needed.
//! 4. **Settle** - the call returns once every job has finished. A failed
//!    job never cancels its siblings; failures are collected in the
//!    [`CompressReport`].

mod discover;
mod job;
mod options;

pub use discover::discover;
pub use job::{CompressionJob, JobFailure, JobStage, JobSuccess};
pub use options::{Codec, CompressOptions};

use crate::logger::ProgressLine;
use rayon::prelude::*;
use std::{io, path::Path};

/// Outcome of precompressing one or more directories.
#[derive(Debug, Default)]
pub struct CompressReport {
    /// Directories that did not exist and were skipped.
    pub skipped_dirs: usize,
    /// Eligible files found.
    pub files: usize,
    /// Jobs scheduled (files × enabled codecs).
    pub scheduled: usize,
    pub completed: Vec<JobSuccess>,
    pub failures: Vec<JobFailure>,
}

impl CompressReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.skipped_dirs += other.skipped_dirs;
        self.files += other.files;
        self.scheduled += other.scheduled;
        self.completed.extend(other.completed);
        self.failures.extend(other.failures);
    }

    /// Completed jobs for one codec.
    pub fn completed_for(&self, codec: Codec) -> usize {
        self.completed.iter().filter(|c| c.codec == codec).count()
    }

    /// Total (input, output) bytes over completed jobs.
    pub fn bytes(&self) -> (u64, u64) {
        self.completed.iter().fold((0, 0), |(i, o), c| {
            (i + c.input_bytes, o + c.output_bytes)
        })
    }
}

/// Precompression engine over a bounded worker pool.
pub struct Precompressor {
    pool: rayon::ThreadPool,
}

impl Precompressor {
    /// Create an engine running at most `max_jobs` jobs at once
    /// (`0` = one per CPU).
    pub fn new(max_jobs: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_jobs)
            .thread_name(|i| format!("bunpack-compress-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    pub fn max_jobs(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Schedule the jobs for `root` without running them.
    ///
    /// Returns `None` when `root` does not exist.
    pub fn plan(
        root: &Path,
        options: &CompressOptions,
    ) -> Option<(Vec<CompressionJob>, Vec<(std::path::PathBuf, String)>)> {
        if !root.exists() {
            return None;
        }
        if !options.is_enabled() {
            return Some((Vec::new(), Vec::new()));
        }

        let codecs = options.codecs();
        let (files, walk_errors) = discover(root, options);
        let jobs = files
            .into_iter()
            .flat_map(|file| {
                codecs
                    .iter()
                    .map(move |codec| CompressionJob::new(file.clone(), *codec))
            })
            .collect();
        Some((jobs, walk_errors))
    }

    /// Precompress `root`, returning once every scheduled job has settled.
    pub fn run(
        &self,
        root: &Path,
        options: &CompressOptions,
        show_progress: bool,
    ) -> CompressReport {
        let Some((jobs, walk_errors)) = Self::plan(root, options) else {
            crate::debug!("compress"; "{} does not exist, skipping", root.display());
            return CompressReport {
                skipped_dirs: 1,
                ..CompressReport::default()
            };
        };

        let codec_count = options.codecs().len().max(1);
        let mut report = CompressReport {
            files: jobs.len() / codec_count,
            scheduled: jobs.len(),
            ..CompressReport::default()
        };

        // Walk errors have no codec; report them once under the first codec.
        if let Some(codec) = options.codecs().first().copied() {
            report
                .failures
                .extend(walk_errors.into_iter().map(|(path, message)| JobFailure {
                    source: path,
                    codec,
                    stage: JobStage::Scheduled,
                    error: io::Error::other(message),
                }));
        }

        let progress = (show_progress && !jobs.is_empty()).then(|| {
            let counters: Vec<_> = options
                .codecs()
                .into_iter()
                .map(|codec| (codec.ext(), report.files))
                .collect();
            ProgressLine::new("compress", &counters)
        });

        let results = self.execute(&jobs, |job| {
            let result = job.run();
            if let Some(p) = &progress {
                p.inc(job.codec.ext());
            }
            result
        });
        if let Some(p) = progress {
            p.finish();
        }

        for result in results {
            match result {
                Ok(done) => report.completed.push(done),
                Err(failure) => report.failures.push(failure),
            }
        }
        report
    }

    /// Apply `work` to every job on the pool, results in job order.
    fn execute<R, F>(&self, jobs: &[CompressionJob], work: F) -> Vec<R>
    where
        R: Send,
        F: Fn(&CompressionJob) -> R + Sync,
    {
        self.pool
            .install(|| jobs.par_iter().map(|job| work(job)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::{fs, io::Read};
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn gunzip(path: &Path) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(fs::File::open(path).unwrap())
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    fn unbrotli(path: &Path) -> Vec<u8> {
        let mut out = Vec::new();
        brotli::Decompressor::new(fs::File::open(path).unwrap(), 4096)
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_absent_directory_is_noop() {
        let dir = TempDir::new().unwrap();
        let engine = Precompressor::new(2).unwrap();
        let report = engine.run(&dir.path().join("static"), &CompressOptions::both(), false);

        assert!(report.is_success());
        assert_eq!(report.skipped_dirs, 1);
        assert_eq!(report.scheduled, 0);
    }

    #[test]
    fn test_both_codecs_round_trip_and_skip_ineligible() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let js = "export const x = 1;\n".repeat(300);
        write(root, "app.js", js.as_bytes());
        write(root, "_app/.vite/manifest.json", br#"{"a":1}"#);
        write(root, "logo.png", &[0x89, b'P', b'N', b'G']);

        let report = Precompressor::new(4)
            .unwrap()
            .run(root, &CompressOptions::both(), false);

        assert!(report.is_success(), "{:?}", report.failures);
        assert_eq!(report.files, 2);
        assert_eq!(report.scheduled, 4);
        assert_eq!(report.completed_for(Codec::Gzip), 2);
        assert_eq!(report.completed_for(Codec::Brotli), 2);

        assert_eq!(gunzip(&root.join("app.js.gz")), js.as_bytes());
        assert_eq!(unbrotli(&root.join("app.js.br")), js.as_bytes());
        assert_eq!(
            unbrotli(&root.join("_app/.vite/manifest.json.br")),
            br#"{"a":1}"#
        );
        assert!(!root.join("logo.png.gz").exists());
        assert!(!root.join("logo.png.br").exists());
    }

    #[test]
    fn test_schedules_two_jobs_per_file() {
        let dir = TempDir::new().unwrap();
        for i in 0..25 {
            write(dir.path(), &format!("pages/p{i}.html"), b"<p>hi</p>");
        }

        let (jobs, errors) = Precompressor::plan(dir.path(), &CompressOptions::both()).unwrap();
        assert!(errors.is_empty());
        assert_eq!(jobs.len(), 50);

        let report = Precompressor::new(0)
            .unwrap()
            .run(dir.path(), &CompressOptions::both(), false);
        assert_eq!(report.scheduled, 50);
        assert_eq!(report.completed.len(), 50);
    }

    #[test]
    fn test_disabled_codecs_schedule_nothing() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.js", b"x");

        let report = Precompressor::new(1)
            .unwrap()
            .run(dir.path(), &CompressOptions::default(), false);
        assert_eq!(report.scheduled, 0);
        assert!(!dir.path().join("a.js.gz").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_one_unreadable_file_does_not_stop_the_rest() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for i in 0..10 {
            write(root, &format!("c{i}.css"), format!("a{{b:{i}}}").as_bytes());
        }
        // Dangling link: discovered as eligible, fails to open.
        std::os::unix::fs::symlink(root.join("missing.css"), root.join("broken.css")).unwrap();

        let report = Precompressor::new(3)
            .unwrap()
            .run(root, &CompressOptions::both(), false);

        assert_eq!(report.scheduled, 22);
        assert_eq!(report.completed.len(), 20);
        assert_eq!(report.failures.len(), 2);
        for failure in &report.failures {
            assert_eq!(failure.source, root.join("broken.css"));
            assert_eq!(failure.stage, JobStage::Reading);
        }
        for i in 0..10 {
            let expected = format!("a{{b:{i}}}");
            assert_eq!(gunzip(&root.join(format!("c{i}.css.gz"))), expected.as_bytes());
            assert_eq!(unbrotli(&root.join(format!("c{i}.css.br"))), expected.as_bytes());
        }
        assert!(!root.join("broken.css.gz").exists());
        assert!(!root.join("broken.css.br").exists());
    }

    /// Highest number of jobs observed running at once.
    fn peak_in_flight(engine: &Precompressor, count: usize) -> usize {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        let jobs: Vec<_> = (0..count)
            .map(|i| CompressionJob::new(format!("f{i}.js").into(), Codec::Gzip))
            .collect();
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        engine.execute(&jobs, |_| {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
        peak.load(Ordering::SeqCst)
    }

    #[test]
    fn test_jobs_run_concurrently_within_bound() {
        let engine = Precompressor::new(4).unwrap();
        let peak = peak_in_flight(&engine, 16);
        assert!(peak > 1, "peak {peak}");
        assert!(peak <= 4, "peak {peak}");

        let serial = Precompressor::new(1).unwrap();
        assert_eq!(peak_in_flight(&serial, 4), 1);
    }

    #[test]
    fn test_merge_reports() {
        let mut total = CompressReport::default();
        total.merge(CompressReport {
            skipped_dirs: 1,
            ..CompressReport::default()
        });
        total.merge(CompressReport {
            files: 2,
            scheduled: 2,
            ..CompressReport::default()
        });
        assert_eq!(total.skipped_dirs, 1);
        assert_eq!(total.scheduled, 2);
        assert_eq!(total.bytes(), (0, 0));
    }
}
