use std::env;
use std::process;

/// Options of the script runner (`ftpfs`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptArgs {
    /// Path to log file (None for stdout)
    pub log_file: Option<String>,
    /// Trace commands and replies
    pub debug: bool,
    /// How many times to run the script
    pub times: u32,
    pub script_file: String,
}

/// Options of the upload driver (`ftpfs-upload`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadArgs {
    pub log_file: Option<String>,
    pub debug: bool,
    /// Number of parallel workers
    pub parallel: usize,
    /// Shuffle the job order
    pub randomize: bool,
    pub jobs_file: String,
}

/// What the command line asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<T> {
    Run(T),
    Help,
    Version,
}

pub fn print_script_usage() {
    println!(
        "Usage: {} [-h] [-v] [-d] [-l logfile] [-n times] script_file",
        crate::PROGRAM_NAME
    );
}

pub fn print_upload_usage() {
    println!(
        "Usage: {}-upload [-h] [-v] [-d] [-l logfile] [-p parallel] [-r] jobs_file",
        crate::PROGRAM_NAME
    );
}

fn positive<T: std::str::FromStr + PartialOrd + Default>(
    value: Option<String>,
    what: &str,
) -> Result<T, String> {
    match value {
        Some(arg) => match arg.parse::<T>() {
            Ok(n) if n > T::default() => Ok(n),
            _ => Err(format!("{} must be a positive number", what)),
        },
        None => Err(format!("Missing {} argument", what.to_lowercase())),
    }
}

/// Parses script runner arguments (without the program name)
pub fn try_parse_script_args<I: IntoIterator<Item = String>>(
    args: I,
) -> Result<Parsed<ScriptArgs>, String> {
    let mut log_file = None;
    let mut debug = false;
    let mut times = 1;
    let mut script_file = None;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" => return Ok(Parsed::Help),
            "-v" => return Ok(Parsed::Version),
            "-d" => debug = true,
            "-l" => {
                log_file = Some(
                    args.next()
                        .ok_or_else(|| "Missing log file argument".to_string())?,
                )
            }
            "-n" => times = positive(args.next(), "Repeat count")?,
            _ => {
                if script_file.is_none() {
                    script_file = Some(arg);
                } else {
                    return Err(format!("Unexpected argument: {}", arg));
                }
            }
        }
    }

    let script_file = script_file.ok_or_else(|| "Missing script file argument".to_string())?;
    Ok(Parsed::Run(ScriptArgs {
        log_file,
        debug,
        times,
        script_file,
    }))
}

/// Parses upload driver arguments (without the program name)
pub fn try_parse_upload_args<I: IntoIterator<Item = String>>(
    args: I,
) -> Result<Parsed<UploadArgs>, String> {
    let mut log_file = None;
    let mut debug = false;
    let mut parallel = 1;
    let mut randomize = false;
    let mut jobs_file = None;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" => return Ok(Parsed::Help),
            "-v" => return Ok(Parsed::Version),
            "-d" => debug = true,
            "-l" => {
                log_file = Some(
                    args.next()
                        .ok_or_else(|| "Missing log file argument".to_string())?,
                )
            }
            "-p" => parallel = positive(args.next(), "Parallel count")?,
            "-r" => randomize = true,
            _ => {
                if jobs_file.is_none() {
                    jobs_file = Some(arg);
                } else {
                    return Err(format!("Unexpected argument: {}", arg));
                }
            }
        }
    }

    let jobs_file = jobs_file.ok_or_else(|| "Missing jobs file argument".to_string())?;
    Ok(Parsed::Run(UploadArgs {
        log_file,
        debug,
        parallel,
        randomize,
        jobs_file,
    }))
}

/// Handles help, version and usage errors the same way for both binaries
fn resolve<T>(parsed: Result<Parsed<T>, String>, usage: fn()) -> T {
    match parsed {
        Ok(Parsed::Run(args)) => args,
        Ok(Parsed::Help) => {
            usage();
            process::exit(0);
        }
        Ok(Parsed::Version) => {
            println!("{} version {}", crate::PROGRAM_NAME, crate::PROGRAM_VERSION);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            usage();
            process::exit(1);
        }
    }
}

/// Parses the process arguments of `ftpfs`, exiting on -h, -v or bad usage
pub fn parse_script_args() -> ScriptArgs {
    resolve(try_parse_script_args(env::args().skip(1)), print_script_usage)
}

/// Parses the process arguments of `ftpfs-upload`, exiting on -h, -v or bad usage
pub fn parse_upload_args() -> UploadArgs {
    resolve(try_parse_upload_args(env::args().skip(1)), print_upload_usage)
}
