use ftpfs::cli::parse_upload_args;
use ftpfs::config::parse_upload_jobs;
use ftpfs::logging::{log, set_debug, set_log_file};
use ftpfs::shutdown::{install_signal_handlers, signal_name};
use ftpfs::upload::run_uploads;
use std::process;

fn main() {
    let args = parse_upload_args();
    if let Some(log_file) = &args.log_file {
        set_log_file(log_file);
    }
    set_debug(args.debug);

    if let Err(e) = install_signal_handlers() {
        eprintln!("Error installing signal handlers: {}", e);
        process::exit(1);
    }

    let jobs = match parse_upload_jobs(&args.jobs_file) {
        Ok(jobs) => jobs,
        Err(e) => {
            let _ = log(&format!("Error parsing jobs file {}: {}", args.jobs_file, e));
            process::exit(1);
        }
    };
    let total = jobs.len();
    let _ = log(&format!(
        "Uploading {} file(s) with {} worker(s)",
        total, args.parallel
    ));

    let uploaded = match run_uploads(jobs, args.parallel, args.randomize) {
        Ok(n) => n,
        Err(e) => {
            let _ = log(&format!("Error starting workers: {}", e));
            process::exit(1);
        }
    };

    if let Some(sig) = signal_name() {
        let _ = log(&format!("Interrupted by {}", sig));
    }
    let _ = log(&format!("{} of {} file(s) uploaded", uploaded, total));

    if uploaded < total {
        process::exit(1);
    }
}
