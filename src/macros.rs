/// Prints a line prefixed with the local time, like `info!` in tracing.
/// Pass a starting time first and the line also reports the elapsed seconds.
/// ```
/// use forumdump::info_time;
///
/// info_time!("sent {} of {}", 1, 2);
/// let start = chrono::Local::now();
/// info_time!(start, "sent {} of {}", 2, 2);
/// ```
#[macro_export]
macro_rules! info_time {
    ($strfm:literal $(,)? $($arg:expr),*) => {{
        let local_now = $crate::macros::now();
        println!("{:<30} : {}", local_now, format!($strfm, $($arg),*));
    }};
    ($time:expr, $strfm:literal $(,)? $($arg:expr),*) => {{
        let local_now = $crate::macros::now();
        let run_time = $crate::macros::elapsed_secs($time, local_now);
        println!(
            "{:<30} : {}\nRUNTIME: {} sec",
            local_now,
            format!($strfm, $($arg),*),
            run_time
        );
    }};
}

use chrono::{DateTime, Local};

#[doc(hidden)]
pub fn now() -> DateTime<Local> {
    Local::now()
}

/// Seconds between `start` and `end` with microsecond resolution, 0.0 on overflow.
#[doc(hidden)]
pub fn elapsed_secs(start: DateTime<Local>, end: DateTime<Local>) -> f64 {
    (end - start)
        .num_microseconds()
        .map(|n| n as f64 / 1_000_000.0)
        .unwrap_or(0.0)
}
