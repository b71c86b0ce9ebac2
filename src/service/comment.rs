use chrono::Utc;
use log::info;

use crate::error::AppError;
use crate::model::{ContentType, RequestContext};
use crate::store::{format_db_datetime, Database, FetchMode};

#[derive(Clone, Debug)]
pub struct NewComment {
    pub content_type: String,
    pub content_id: i64,
    pub comment_text: String,
    pub parent_id: Option<i64>,
}

/// Stores a comment or a reply and returns its id.
///
/// Replies always hang off a top-level comment: answering a reply attaches
/// the new row to that reply's own parent.
pub async fn add_comment(
    db: &dyn Database,
    ctx: &RequestContext,
    input: NewComment,
) -> Result<i64, AppError> {
    if input.comment_text.trim().is_empty() {
        return Err(AppError::param_error("Comment cannot be empty"));
    }
    let content_type = input.content_type.parse::<ContentType>()?;

    let parent_id = match input.parent_id {
        Some(parent_id) => {
            Some(resolve_parent(db, content_type, input.content_id, parent_id).await?)
        }
        None => None,
    };

    let now = format_db_datetime(Utc::now());
    let inserted = db
        .execute(
            "INSERT INTO comments (user_id, content_type, content_id, parent_id, content, country, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                ctx.user_id.into(),
                content_type.as_str().into(),
                input.content_id.into(),
                parent_id.into(),
                input.comment_text.into(),
                ctx.country.clone().into(),
                now.clone().into(),
                now.into(),
            ],
            FetchMode::None,
        )
        .await?;
    let id = inserted
        .last_insert_id
        .ok_or_else(AppError::system_exception)?;
    info!(
        "comment {} added on {}/{} by user {}",
        id, content_type, input.content_id, ctx.user_id
    );
    Ok(id)
}

/// The top-level comment a reply to `parent_id` belongs under.
async fn resolve_parent(
    db: &dyn Database,
    content_type: ContentType,
    content_id: i64,
    parent_id: i64,
) -> Result<i64, AppError> {
    let row = db
        .execute(
            "SELECT id, parent_id, content_type, content_id FROM comments WHERE id = ?",
            vec![parent_id.into()],
            FetchMode::One,
        )
        .await?
        .into_first()
        .ok_or_else(|| AppError::param_error("parent comment does not exist"))?;

    if row.get_string("content_type")? != content_type.as_str()
        || row.get_i64("content_id")? != content_id
    {
        return Err(AppError::param_error("parent comment belongs to another page"));
    }
    Ok(row.get_opt_i64("parent_id")?.unwrap_or(parent_id))
}
