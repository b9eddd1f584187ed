use crate::config::UploadJob;
use crate::error::Result;
use crate::logging::log_with_thread;
use crate::session::Session;
use crate::shutdown::is_shutdown_requested;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Uploads one job over its own session
///
/// The local file is opened before anything is sent; the session is closed
/// with QUIT whether or not the transfer worked.
pub fn upload_job(job: &UploadJob, worker: usize) -> Result<u64> {
    let mut session = Session::connect(&job.session)?;
    let sent = session.upload_file(&job.local, &job.remote);
    if let Err(e) = session.quit() {
        let _ = log_with_thread(
            &format!("Error closing session to {}: {}", job.session.host, e),
            Some(worker),
        );
    }
    sent
}

/// Runs all jobs on a pool of `parallel` workers
///
/// # Arguments
/// * `jobs` - Upload jobs, one session each
/// * `parallel` - Number of worker threads (at least 1)
/// * `randomize` - Shuffle the job order first
///
/// # Returns
/// Number of files uploaded successfully
///
/// # Errors
/// Only fails if the worker pool cannot be built; individual job failures
/// are logged and left out of the count.
pub fn run_uploads(mut jobs: Vec<UploadJob>, parallel: usize, randomize: bool) -> io::Result<usize> {
    if randomize {
        jobs.shuffle(&mut rand::thread_rng());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(parallel.max(1))
        .build()
        .map_err(|e| io::Error::new(ErrorKind::Other, e))?;

    let succeeded = AtomicUsize::new(0);
    pool.install(|| {
        jobs.par_iter().for_each(|job| {
            let worker = rayon::current_thread_index().unwrap_or(0);
            if is_shutdown_requested() {
                let _ = log_with_thread(
                    &format!("Shutdown requested, skipping {}", job.local.display()),
                    Some(worker),
                );
                return;
            }

            let _ = log_with_thread(
                &format!(
                    "Uploading {} to ftp://{}:{}/{}",
                    job.local.display(),
                    job.session.host,
                    job.session.port,
                    job.remote.trim_start_matches('/')
                ),
                Some(worker),
            );

            match upload_job(job, worker) {
                Ok(bytes) => {
                    succeeded.fetch_add(1, Ordering::SeqCst);
                    let _ = log_with_thread(
                        &format!("Uploaded {} ({} bytes)", job.local.display(), bytes),
                        Some(worker),
                    );
                }
                Err(e) => {
                    let _ = log_with_thread(
                        &format!("Error uploading {}: {}", job.local.display(), e),
                        Some(worker),
                    );
                }
            }
        });
    });

    Ok(succeeded.load(Ordering::SeqCst))
}
