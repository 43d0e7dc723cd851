//! Dumps posts, comments and users from a forum GraphQL endpoint into CSV files.
//! Requests go out in batches through [`request::send_all`], a bounded
//! concurrent requester with a pause after every call.

mod error;
pub mod macros;

pub mod config;
pub mod graphql;
pub mod pacing;
pub mod parse;
pub mod process;
pub mod request;

pub use error::{Error, Result};

const ENDPOINT: &str = "https://www.lesswrong.com/graphql";
const FILE_PREFIX: &str = "effectivealtruism";
const USER_AGENT_STRING: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/109.0";
const MAX_CONCURRENT_REQUESTS: usize = 3;
const DEFAULT_DELAY_SECS: f64 = 1.0;
/// Post ids per batched comment request.
const COMMENT_CHUNK_SIZE: usize = 10;
/// User ids per batched user request.
const USER_CHUNK_SIZE: usize = 3;
