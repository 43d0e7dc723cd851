use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};

/// Where the records sit inside one GraphQL result: `data.<field>.results`
/// for list queries, `data.<field>.result` for single-object queries.
#[derive(Debug, Clone, Copy)]
pub enum ResultPath {
    List(&'static str),
    Single(&'static str),
}

pub const POSTS: ResultPath = ResultPath::List("posts");
pub const COMMENTS: ResultPath = ResultPath::List("comments");
pub const POST: ResultPath = ResultPath::Single("post");
pub const USER: ResultPath = ResultPath::Single("user");

/// One CSV row. Column names follow the GraphQL field names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlatRecord {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    #[serde(rename = "postId")]
    pub post_id: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "postedAt")]
    pub posted_at: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "commentCount")]
    pub comment_count: Option<u64>,
    #[serde(rename = "plaintextMainText")]
    pub plaintext_main_text: String,
}

/// Parses one response body as a batch of GraphQL results and returns the
/// records of every result in order.
pub fn parse_batch(body: &str, path: ResultPath) -> Result<Vec<Value>> {
    let batch: Value = serde_json::from_str(body)?;
    let results = batch
        .as_array()
        .ok_or_else(|| Error::MalformedResponse("batch response is not an array".into()))?;

    let mut records = Vec::new();
    for result in results {
        match path {
            ResultPath::List(field) => {
                let list = result["data"][field]["results"].as_array().ok_or_else(|| {
                    Error::MalformedResponse(format!("missing data.{field}.results"))
                })?;
                records.extend(list.iter().cloned());
            }
            ResultPath::Single(field) => {
                let record = &result["data"][field]["result"];
                if !record.is_object() {
                    return Err(Error::MalformedResponse(format!(
                        "missing data.{field}.result"
                    )));
                }
                records.push(record.clone());
            }
        }
    }
    Ok(records)
}

/// Parses every body of a requester run, see [`parse_batch`].
pub fn parse_responses(bodies: &[String], path: ResultPath) -> Result<Vec<Value>> {
    let mut records = Vec::new();
    for body in bodies {
        records.extend(parse_batch(body, path)?);
    }
    Ok(records)
}

fn string_field(record: &Value, field: &str) -> Option<String> {
    match &record[field] {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// `userId` comes from the nested `user` object and is empty without one,
/// `plaintextMainText` from `contents` and is empty without it.
pub fn flatten(record: &Value) -> FlatRecord {
    let user_id = match &record["user"] {
        Value::Null => String::new(),
        user => string_field(user, "_id").unwrap_or_default(),
    };
    let plaintext_main_text = string_field(&record["contents"], "plaintextMainText")
        .unwrap_or_default();

    FlatRecord {
        id: string_field(record, "_id"),
        post_id: string_field(record, "postId"),
        user_id,
        posted_at: string_field(record, "postedAt"),
        url: string_field(record, "url"),
        title: string_field(record, "title"),
        comment_count: record["commentCount"].as_u64(),
        plaintext_main_text,
    }
}

const CSV_COLUMNS: [&str; 8] = [
    "_id",
    "postId",
    "userId",
    "postedAt",
    "url",
    "title",
    "commentCount",
    "plaintextMainText",
];

/// Writes a header row and one row per record. An empty slice still
/// produces the header.
pub fn write_csv(path: impl AsRef<Path>, records: &[FlatRecord]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(CSV_COLUMNS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
