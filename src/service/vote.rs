//! Tri-state ballot toggle and tally refresh.
//!
//! Everything happens in one transaction. The first statement is always a
//! write, so on SQLite the write lock is held from the start and the tally
//! recount can not observe a half-applied ballot from another request.

use log::{debug, warn};

use crate::error::AppError;
use crate::model::{RequestContext, Tally, VoteType};
use crate::store::{Database, FetchMode, Transaction};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BallotChange {
    Added,
    Switched,
    Removed,
}

/// Applies `vote_type` from the acting user to `comment_id` and returns the
/// refreshed tally. Repeating the current ballot retracts it.
pub async fn vote_comment(
    db: &dyn Database,
    ctx: &RequestContext,
    comment_id: i64,
    vote_type: &str,
) -> Result<Tally, AppError> {
    let vote_type = vote_type.parse::<VoteType>()?;

    let mut tx = db.begin().await?;
    let applied = apply_ballot(&mut *tx, ctx.user_id, comment_id, vote_type).await;
    match applied {
        Ok((change, tally)) => {
            tx.commit().await?;
            debug!(
                "user {} {:?} {} ballot on comment {}: {:?}",
                ctx.user_id,
                change,
                vote_type.as_str(),
                comment_id,
                tally
            );
            Ok(tally)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("rollback of ballot on comment {} failed: {}", comment_id, rollback_err);
            }
            Err(err)
        }
    }
}

async fn apply_ballot(
    tx: &mut dyn Transaction,
    user_id: i64,
    comment_id: i64,
    vote_type: VoteType,
) -> Result<(BallotChange, Tally), AppError> {
    let removed = tx
        .execute(
            "DELETE FROM comment_votes WHERE user_id = ? AND comment_id = ? AND vote_type = ?",
            vec![user_id.into(), comment_id.into(), vote_type.as_str().into()],
            FetchMode::None,
        )
        .await?;

    let change = if removed.rows_affected > 0 {
        BallotChange::Removed
    } else {
        let switched = tx
            .execute(
                "UPDATE comment_votes SET vote_type = ? WHERE user_id = ? AND comment_id = ?",
                vec![vote_type.as_str().into(), user_id.into(), comment_id.into()],
                FetchMode::None,
            )
            .await?;
        if switched.rows_affected > 0 {
            BallotChange::Switched
        } else {
            let exists = tx
                .execute(
                    "SELECT id FROM comments WHERE id = ?",
                    vec![comment_id.into()],
                    FetchMode::One,
                )
                .await?;
            if exists.rows.is_empty() {
                return Err(comment_not_found(comment_id));
            }
            tx.execute(
                "INSERT INTO comment_votes (user_id, comment_id, vote_type) VALUES (?, ?, ?)",
                vec![user_id.into(), comment_id.into(), vote_type.as_str().into()],
                FetchMode::None,
            )
            .await?;
            BallotChange::Added
        }
    };

    let recount = tx
        .execute(
            "UPDATE comments SET \
                upvotes = (SELECT COUNT(*) FROM comment_votes WHERE comment_id = ? AND vote_type = 'up'), \
                downvotes = (SELECT COUNT(*) FROM comment_votes WHERE comment_id = ? AND vote_type = 'down') \
             WHERE id = ?",
            vec![comment_id.into(), comment_id.into(), comment_id.into()],
            FetchMode::None,
        )
        .await?;
    if recount.rows_affected == 0 {
        return Err(comment_not_found(comment_id));
    }

    let row = tx
        .execute(
            "SELECT upvotes, downvotes FROM comments WHERE id = ?",
            vec![comment_id.into()],
            FetchMode::One,
        )
        .await?
        .into_first()
        .ok_or_else(|| comment_not_found(comment_id))?;
    Ok((change, Tally::from_row(&row)?))
}

fn comment_not_found(comment_id: i64) -> AppError {
    AppError::fail(format!("comment {} does not exist", comment_id))
}
