//! Batched GraphQL payloads. One payload is a JSON array of operations that the
//! server answers with an array of results in the same order.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::{Error, Result};

const COMMENTS_VIEW: &str = "postCommentsTop";
const COMMENTS_LIMIT: u32 = 5000;
const POSTS_VIEW: &str = "timeframe";
const POSTS_FILTER: &str = "frontpage";
const POSTS_SORTED_BY: &str = "magic";
const POSTS_LIMIT: u32 = 2000;

const USER_FIELDS: &str = "fragment UsersMinimumInfo on User { _id slug createdAt username \
displayName fullName karma afKarma deleted isAdmin htmlBio jobTitle organization postCount \
commentCount sequenceCount __typename }";

const MULTI_COMMENT_QUERY: &str = "query multiCommentQuery($input: MultiCommentInput) { \
comments(input: $input) { results { ...CommentsList __typename } totalCount __typename } } \
fragment CommentsList on Comment { _id postId tagId parentCommentId topLevelCommentId \
descendentCount title contents { _id html plaintextMainText wordCount __typename } postedAt \
userId deleted user { ...UsersMinimumInfo __typename } baseScore score voteCount af answer \
retracted shortform directChildrenCount __typename }";

const MULTI_POST_QUERY: &str = "query multiPostQuery($input: MultiPostInput) { \
posts(input: $input) { results { ...SimplePostInfo __typename } totalCount __typename } } \
fragment SimplePostInfo on Post { user { ...UsersMinimumInfo __typename } \
coauthors { ...UsersMinimumInfo __typename } _id userId url title postedAt createdAt \
reviewCount commentCount website contents { _id plaintextMainText html __typename } __typename }";

const SINGLE_POST_QUERY: &str = "query singlePostQuery($input: SinglePostInput) { \
post(input: $input) { result { ...PostsDetails __typename } __typename } } \
fragment PostsDetails on Post { _id slug title url postedAt createdAt status commentCount \
voteCount score userId viewCount readTimeMinutes question shortform \
contents { _id plaintextMainText html wordCount version __typename } \
user { ...UsersMinimumInfo __typename } coauthors { ...UsersMinimumInfo __typename } \
canonicalSequence { _id title __typename } __typename }";

const SINGLE_USER_QUERY: &str = "query singleUserQuery($input: SingleUserInput) { \
user(input: $input) { result { ...UsersMinimumInfo website voteCount __typename } __typename } }";

fn with_user_fields(query: &str) -> String {
    format!("{query} {USER_FIELDS}")
}

/// Comments on one post, best first.
pub fn post_comments_op(post_id: &str) -> Value {
    json!({
        "operationName": "multiCommentQuery",
        "variables": {
            "input": {
                "terms": {
                    "view": COMMENTS_VIEW,
                    "limit": COMMENTS_LIMIT,
                    "postId": post_id,
                },
                "enableCache": false,
                "enableTotal": true,
            }
        },
        "query": with_user_fields(MULTI_COMMENT_QUERY),
    })
}

/// Frontpage posts published in `[after, before]`.
pub fn posts_in_timeframe_op(after: DateTime<Utc>, before: DateTime<Utc>) -> Value {
    json!({
        "operationName": "multiPostQuery",
        "variables": {
            "input": {
                "terms": {
                    "limit": POSTS_LIMIT,
                    "view": POSTS_VIEW,
                    "filter": POSTS_FILTER,
                    "sortedBy": POSTS_SORTED_BY,
                    "after": after.to_rfc3339_opts(SecondsFormat::Millis, true),
                    "before": before.to_rfc3339_opts(SecondsFormat::Millis, true),
                },
                "enableCache": false,
                "enableTotal": true,
            }
        },
        "query": with_user_fields(MULTI_POST_QUERY),
    })
}

/// One post with its full details.
pub fn single_post_op(post_id: &str) -> Value {
    json!({
        "operationName": "singlePostQuery",
        "variables": {
            "input": {
                "selector": { "documentId": post_id }
            },
            "sequenceId": null,
            "batchKey": "singlePost",
        },
        "query": with_user_fields(SINGLE_POST_QUERY),
    })
}

pub fn single_user_op(user_id: &str) -> Value {
    json!({
        "operationName": "singleUserQuery",
        "variables": {
            "input": {
                "selector": { "documentId": user_id }
            }
        },
        "query": with_user_fields(SINGLE_USER_QUERY),
    })
}

/// Splits `ids` into chunks of `chunk_size` and wraps every chunk into one
/// batch payload, one operation per id. The last chunk may be shorter.
pub fn chunk_batches<S, F>(ids: &[S], chunk_size: usize, make_op: F) -> Result<Vec<Value>>
where
    S: AsRef<str>,
    F: Fn(&str) -> Value,
{
    if chunk_size == 0 {
        return Err(Error::InvalidChunkSize);
    }
    let batches = ids
        .chunks(chunk_size)
        .map(|chunk| Value::Array(chunk.iter().map(|id| make_op(id.as_ref())).collect()))
        .collect();
    Ok(batches)
}
