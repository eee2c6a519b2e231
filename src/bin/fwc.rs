use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::Parser;
use clap::error::ErrorKind;

use fwc_rs::WcError;
use fwc_rs::wc;

#[derive(Parser)]
#[command(
    name = "fwc",
    version,
    about = "Print newline, word, and byte counts for FILE"
)]
struct Cli {
    /// File to count (must be a regular file or empty)
    path: PathBuf,
}

/// Parse the command line. `--help`/`--version` print and exit 0 here;
/// every other clap failure becomes `WcError::Usage`.
fn parse_args<I, T>(args: I) -> anyhow::Result<Cli>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args).map_err(|e| match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
        _ => WcError::Usage(e.to_string().trim_end().to_owned()).into(),
    })
}

fn run(cli: &Cli, out: &mut impl Write) -> anyhow::Result<()> {
    let counts = wc::count_file(&cli.path)?;
    wc::write_counts(out, &counts, cli.path.as_os_str().as_encoded_bytes())
        .and_then(|()| out.flush())
        .context("write error")?;
    Ok(())
}

/// The stderr line for a failed run. Usage text is printed as clap renders it.
fn diagnostic(err: &anyhow::Error) -> String {
    match err.downcast_ref::<WcError>() {
        Some(WcError::Usage(usage)) => usage.clone(),
        _ => format!("fwc: {:#}", err),
    }
}

fn main() {
    fwc_rs::common::reset_sigpipe();
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .init();

    let result = parse_args(std::env::args_os()).and_then(|cli| {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        run(&cli, &mut out)
    });

    if let Err(e) = result {
        eprintln!("{}", diagnostic(&e));
        process::exit(1);
    }
}
