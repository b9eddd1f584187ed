use ftpfs::cli::parse_script_args;
use ftpfs::logging::{log, set_debug, set_log_file};
use ftpfs::script::{parse_script, run_script};
use ftpfs::shutdown::{install_signal_handlers, signal_name};
use std::process;

fn main() {
    let args = parse_script_args();
    if let Some(log_file) = &args.log_file {
        set_log_file(log_file);
    }
    set_debug(args.debug);

    if let Err(e) = install_signal_handlers() {
        eprintln!("Error installing signal handlers: {}", e);
        process::exit(1);
    }

    let steps = match parse_script(&args.script_file) {
        Ok(steps) => steps,
        Err(e) => {
            let _ = log(&format!("Error parsing script {}: {}", args.script_file, e));
            process::exit(1);
        }
    };

    let summary = {
        let _end = scopeguard::guard((), |_| {
            let _ = log(&format!("{} {} finished", ftpfs::PROGRAM_NAME, args.script_file));
        });
        let _ = log(&format!(
            "{} {} started: {} steps, {} round(s)",
            ftpfs::PROGRAM_NAME,
            args.script_file,
            steps.len(),
            args.times
        ));
        run_script(&steps, args.times)
    };

    if summary.interrupted {
        let _ = log(&format!(
            "Interrupted by {}",
            signal_name().unwrap_or("shutdown request")
        ));
    }
    let _ = log(&format!(
        "{} steps run, {} failed",
        summary.steps_run, summary.failures
    ));

    if summary.failures > 0 || summary.interrupted {
        process::exit(1);
    }
}
