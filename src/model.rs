use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::store::{Row, StoreError};

/// What a comment is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    Gallery,
    Oc,
    Blog,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Gallery => "gallery",
            ContentType::Oc => "oc",
            ContentType::Blog => "blog",
        }
    }
}

impl FromStr for ContentType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gallery" => Ok(ContentType::Gallery),
            "oc" => Ok(ContentType::Oc),
            "blog" => Ok(ContentType::Blog),
            other => Err(AppError::param_error(format!("unknown content type `{}`", other))),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Up,
    Down,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Up => "up",
            VoteType::Down => "down",
        }
    }
}

impl FromStr for VoteType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(VoteType::Up),
            "down" => Ok(VoteType::Down),
            other => Err(AppError::param_error(format!("unknown vote type `{}`", other))),
        }
    }
}

/// A comment row as stored, with the author's username joined in.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Comment {
    pub id: i64,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub content_type: String,
    pub content_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
    pub country: Option<String>,
    pub upvotes: u32,
    pub downvotes: u32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Comment {
    /// Own id for top-level rows, the parent's id for replies.
    pub fn thread_id(&self) -> i64 {
        self.parent_id.unwrap_or(self.id)
    }

    pub fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.get_i64("id")?,
            user_id: row.get_opt_i64("user_id")?,
            username: row.get_opt_string("username")?,
            content_type: row.get_string("content_type")?,
            content_id: row.get_i64("content_id")?,
            parent_id: row.get_opt_i64("parent_id")?,
            content: row.get_string("content")?,
            country: row.get_opt_string("country")?,
            upvotes: counter(row, "upvotes")?,
            downvotes: counter(row, "downvotes")?,
            created_at: row.get_opt_datetime("created_at")?,
            updated_at: row.get_opt_datetime("updated_at")?,
        })
    }
}

/// A top-level comment ready for display, replies oldest-first.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

/// One user's ballot on one comment. Only the tally leaves the vote service,
/// so ballots are read back as records when checking the ledger.
#[cfg(test)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vote {
    pub user_id: i64,
    pub comment_id: i64,
    pub vote_type: VoteType,
}

#[cfg(test)]
impl Vote {
    pub fn from_row(row: &Row) -> Result<Self, StoreError> {
        let raw = row.get_string("vote_type")?;
        let vote_type = raw.parse::<VoteType>().map_err(|_| StoreError::Decode {
            column: "vote_type".to_string(),
            reason: format!("`{}` is not a vote type", raw),
        })?;
        Ok(Self {
            user_id: row.get_i64("user_id")?,
            comment_id: row.get_i64("comment_id")?,
            vote_type,
        })
    }
}

/// Cached vote counters of a comment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub upvotes: u32,
    pub downvotes: u32,
}

impl Tally {
    pub fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            upvotes: counter(row, "upvotes")?,
            downvotes: counter(row, "downvotes")?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
}

impl User {
    pub fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.get_i64("id")?,
            username: row.get_string("username")?,
            password_hash: row.get_string("password_hash")?,
            is_admin: row.get_bool("is_admin")?,
        })
    }
}

/// Who is acting and where the request came from. Built per request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: i64,
    pub country: String,
}

fn counter(row: &Row, col: &str) -> Result<u32, StoreError> {
    let v = row.get_opt_i64(col)?.unwrap_or(0);
    u32::try_from(v).map_err(|_| StoreError::Decode {
        column: col.to_string(),
        reason: format!("{} is not a valid counter", v),
    })
}
