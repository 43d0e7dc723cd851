use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Local, Months, NaiveDate, NaiveTime, Utc};
use reqwest::Client;
use serde_json::Value;
use tokio::task::spawn_blocking;

use crate::config::DumpConfig;
use crate::graphql::{
    chunk_batches, post_comments_op, posts_in_timeframe_op, single_post_op, single_user_op,
};
use crate::parse::{self, flatten, parse_responses, write_csv, FlatRecord, ResultPath};
use crate::request::{BatchRequester, Transport};
use crate::{info_time, Error, Result};

/// Files written by one [`Dumper::export_interval`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalReport {
    pub posts_file: PathBuf,
    pub comments_file: PathBuf,
    pub posts: usize,
    pub comments: usize,
}

/// Runs the posts / comments / users dumps against one endpoint. All batches
/// share the requester's transport and pacing.
pub struct Dumper<T: Transport = Client> {
    cfg: DumpConfig,
    requester: BatchRequester<T>,
}

impl Dumper<Client> {
    pub fn new(cfg: DumpConfig) -> Result<Self> {
        let client = Client::builder().build()?;
        Self::with_transport(cfg, client)
    }
}

impl<T: Transport> Dumper<T> {
    pub fn with_transport(cfg: DumpConfig, transport: T) -> Result<Self> {
        let requester = BatchRequester::new(transport, cfg.max_concurrent)?
            .with_delay(cfg.delay)
            .with_headers(cfg.headers.clone());
        Ok(Self { cfg, requester })
    }

    pub fn config(&self) -> &DumpConfig {
        &self.cfg
    }

    async fn fetch(&self, payloads: Vec<Value>, path: ResultPath) -> Result<Vec<FlatRecord>> {
        let bodies = self.requester.send_all(&self.cfg.endpoint, payloads).await?;
        let records = parse_responses(&bodies, path)?;
        Ok(records.iter().map(flatten).collect())
    }

    /// Frontpage posts published between `start` and `end`, with `postId` set
    /// to each post's own id.
    pub async fn fetch_posts(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FlatRecord>> {
        let batch = Value::Array(vec![posts_in_timeframe_op(start, end)]);
        let mut posts = self.fetch(vec![batch], parse::POSTS).await?;
        for post in posts.iter_mut() {
            post.post_id = post.id.clone();
        }
        Ok(posts)
    }

    /// Full details of the given posts, one request per post.
    pub async fn fetch_post_details<S: AsRef<str>>(
        &self,
        post_ids: &[S],
    ) -> Result<Vec<FlatRecord>> {
        let payloads = chunk_batches(post_ids, 1, single_post_op)?;
        let mut posts = self.fetch(payloads, parse::POST).await?;
        for post in posts.iter_mut() {
            post.post_id = post.id.clone();
        }
        Ok(posts)
    }

    pub async fn fetch_comments<S: AsRef<str>>(&self, post_ids: &[S]) -> Result<Vec<FlatRecord>> {
        let chunk_size = self.cfg.comment_chunk_size;
        info_time!(
            "Creating {} batch requests with up to {} queries each",
            post_ids.len().div_ceil(chunk_size.max(1)),
            chunk_size
        );
        let payloads = chunk_batches(post_ids, chunk_size, post_comments_op)?;
        self.fetch(payloads, parse::COMMENTS).await
    }

    pub async fn fetch_users<S: AsRef<str>>(&self, user_ids: &[S]) -> Result<Vec<FlatRecord>> {
        let chunk_size = self.cfg.user_chunk_size;
        info_time!(
            "Creating {} batch requests with up to {} queries each",
            user_ids.len().div_ceil(chunk_size.max(1)),
            chunk_size
        );
        let payloads = chunk_batches(user_ids, chunk_size, single_user_op)?;
        self.fetch(payloads, parse::USER).await
    }

    /// Dumps the posts of one window and the comments of every post that has
    /// any into `{prefix}_{start}_to_{end}_posts.csv` / `_comments.csv`.
    pub async fn export_interval(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        out_dir: &Path,
    ) -> Result<IntervalReport> {
        let start_time = Local::now();
        let file_stem = interval_file_prefix(&self.cfg.file_prefix, start, end);
        let posts_file = out_dir.join(format!("{file_stem}_posts.csv"));
        let comments_file = out_dir.join(format!("{file_stem}_comments.csv"));

        info_time!("Fetching posts between {} and {}", start, end);
        let posts = self.fetch_posts(start, end).await?;
        let commented: Vec<String> = posts
            .iter()
            .filter(|post| post.comment_count.unwrap_or(0) > 0)
            .filter_map(|post| post.id.clone())
            .collect();
        let post_count = posts.len();
        write_records(posts_file.clone(), posts).await?;
        info_time!(start_time, "Wrote {} posts to {}", post_count, posts_file.display());

        info_time!("Fetching comments for {} posts", commented.len());
        let comments = self.fetch_comments(&commented).await?;
        let comment_count = comments.len();
        write_records(comments_file.clone(), comments).await?;
        info_time!(
            start_time,
            "Wrote {} comments to {}",
            comment_count,
            comments_file.display()
        );

        Ok(IntervalReport {
            posts_file,
            comments_file,
            posts: post_count,
            comments: comment_count,
        })
    }

    /// Dumps the given users into `out`, returns how many were written.
    pub async fn export_users<S: AsRef<str>>(&self, user_ids: &[S], out: &Path) -> Result<usize> {
        let users = self.fetch_users(user_ids).await?;
        let count = users.len();
        write_records(out.to_path_buf(), users).await?;
        info_time!("Wrote {} users to {}", count, out.display());
        Ok(count)
    }
}

async fn write_records(path: PathBuf, records: Vec<FlatRecord>) -> Result<()> {
    spawn_blocking(move || write_csv(path, &records)).await?
}

/// `{prefix}_{YYYYMMDD}_to_{YYYYMMDD}`
pub fn interval_file_prefix(prefix: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!(
        "{prefix}_{}_to_{}",
        start.format("%Y%m%d"),
        end.format("%Y%m%d")
    )
}

/// `months` consecutive calendar-month windows, the first starting at
/// midnight UTC on the first day of `start`'s month.
pub fn month_windows(start: NaiveDate, months: u32) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
    let first = start
        .with_day(1)
        .ok_or_else(|| Error::InvalidConfig {
            key: "start",
            value: start.to_string(),
        })?;
    (0..months)
        .map(|i| {
            let from = first.checked_add_months(Months::new(i));
            let to = first.checked_add_months(Months::new(i + 1));
            match (from, to) {
                (Some(from), Some(to)) => Ok((
                    from.and_time(NaiveTime::MIN).and_utc(),
                    to.and_time(NaiveTime::MIN).and_utc(),
                )),
                _ => Err(Error::InvalidConfig {
                    key: "months",
                    value: months.to_string(),
                }),
            }
        })
        .collect()
}
