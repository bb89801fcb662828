use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use env_logger::{Env, Target, WriteStyle};
use fs_err::OpenOptions;
use log::info;
use tlc_attendance::{
    browser::{chromium::ChromiumSession, webdriver::WebDriverSession, BrowserKind},
    config,
    portal::Timings,
    prompt::{InquirePrompter, Prompter},
    report_error,
    roster::Roster,
    run::{record_attendance, Outcome},
};
use tlc_attendance_utils::credentials::Credentials;

/// Marks everyone listed in a spreadsheet as present at a Trail Life Connect event.
#[derive(Parser)]
struct Opts {
    /// Spreadsheet with one attendee id per row in column A.
    #[arg(short, long)]
    filename: PathBuf,
    /// Name of the event, as typed into the event search box.
    #[arg(short, long)]
    event: String,
    #[arg(short, long, default_value = "./TLCAttendance.log")]
    log: PathBuf,
    #[arg(short, long, default_value = "./.config.ini")]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    init_logging(&opts.log)?;
    info!("Attendance file: {}", opts.filename.display());
    info!("Log file: {}", opts.log.display());
    info!("Config file: {}", opts.config.display());

    let mut prompter = InquirePrompter;
    let settings = config::resolve(&opts.config, &mut prompter)?;

    let roster = Roster::load(&opts.filename, &settings.sheet_name)?;
    if roster.is_empty() {
        report_error!("No data found in spreadsheet.");
        return Ok(());
    }

    println!("Username: {}", settings.email);
    let password = prompter.password(&format!("Password for {}: ", settings.server))?;
    let credentials = Credentials::builder()
        .email(settings.email.clone())
        .password(password)
        .build();

    let timings = Timings::with_initial_wait(settings.initial_wait);
    let outcome = match settings.browser {
        BrowserKind::Firefox => record_attendance(
            WebDriverSession::launch_firefox()?,
            &settings,
            &credentials,
            &opts.event,
            &roster,
            timings,
        )?,
        kind @ (BrowserKind::Chrome | BrowserKind::Edge) => record_attendance(
            ChromiumSession::launch(kind)?,
            &settings,
            &credentials,
            &opts.event,
            &roster,
            timings,
        )?,
    };
    match outcome {
        Outcome::LoginFailed(e) => report_error!("{e}"),
        Outcome::Recorded(summary) => info!("Done: {summary:?}"),
    }
    Ok(())
}

fn init_logging(path: &Path) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context("Could not open the log file")?;
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Pipe(Box::new(file)))
        .write_style(WriteStyle::Never)
        .init();
    Ok(())
}
