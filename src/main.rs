use std::path::Path;

use chrono::{Local, NaiveDate};
use forumdump::{
    config::DumpConfig,
    info_time,
    process::{month_windows, Dumper},
    Error, Result,
};

const START_MONTH: &str = "2022-01";
const NUM_MONTHS: u32 = 3;
const USERS_FLAG: &str = "--users";

/// `forumdump [YYYY-MM] [MONTHS] [--users ID...]`
#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Local::now();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (window_args, user_ids) = match args.iter().position(|a| a == USERS_FLAG) {
        Some(idx) => (&args[..idx], &args[idx + 1..]),
        None => (&args[..], &args[args.len()..]),
    };

    let start_month = window_args.first().map(String::as_str).unwrap_or(START_MONTH);
    let start = NaiveDate::parse_from_str(&format!("{start_month}-01"), "%Y-%m-%d").map_err(
        |_| Error::InvalidConfig {
            key: "start month",
            value: start_month.to_string(),
        },
    )?;
    let months = match window_args.get(1) {
        Some(raw) => raw.parse().map_err(|_| Error::InvalidConfig {
            key: "months",
            value: raw.clone(),
        })?,
        None => NUM_MONTHS,
    };

    let cfg = DumpConfig::from_env()?;
    let out_dir = Path::new(".");
    let dumper = Dumper::new(cfg)?;

    for (from, to) in month_windows(start, months)? {
        info_time!("Exporting posts and comments between {} and {}", from, to);
        dumper.export_interval(from, to, out_dir).await?;
    }

    if !user_ids.is_empty() {
        let users_file = out_dir.join(format!("{}_users.csv", dumper.config().file_prefix));
        dumper.export_users(user_ids, &users_file).await?;
    }

    info_time!(start_time, "Full program time:");
    Ok(())
}
