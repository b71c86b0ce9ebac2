//! Two-level comment threads for one target, built from a single query.

use std::cmp::Ordering;
use std::collections::HashMap;

use log::warn;

use crate::model::{Comment, CommentNode};
use crate::store::{Database, FetchMode, StoreError};

const THREAD_SQL: &str = "
    SELECT c.id, c.user_id, u.username, c.content_type, c.content_id, c.parent_id,
           c.content, c.country, c.upvotes, c.downvotes, c.created_at, c.updated_at,
           CASE WHEN c.parent_id IS NULL THEN c.id ELSE c.parent_id END AS thread_id
    FROM comments c
    LEFT JOIN users u ON c.user_id = u.id
    WHERE c.content_type = ? AND c.content_id = ?
    ORDER BY thread_id ASC,
             CASE WHEN c.parent_id IS NULL THEN 0 ELSE 1 END ASC,
             c.parent_id ASC,
             c.created_at ASC,
             c.id ASC";

/// Top-level comments newest-first, each with its replies oldest-first.
///
/// `content_type` is matched verbatim; an unknown tag just finds nothing.
pub async fn load_thread(
    db: &dyn Database,
    content_type: &str,
    content_id: i64,
) -> Result<Vec<CommentNode>, StoreError> {
    let output = db
        .execute(
            THREAD_SQL,
            vec![content_type.into(), content_id.into()],
            FetchMode::All,
        )
        .await?;
    let rows = output
        .rows
        .iter()
        .map(Comment::from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(assemble(rows))
}

/// Groups a flat row set into threads. Rows may come in any order.
pub fn assemble(mut rows: Vec<Comment>) -> Vec<CommentNode> {
    rows.sort_by(thread_order);

    let mut index: HashMap<i64, usize> = HashMap::new();
    let mut top_level: Vec<CommentNode> = Vec::new();
    for comment in rows {
        match comment.parent_id {
            None => {
                index.insert(comment.id, top_level.len());
                top_level.push(CommentNode {
                    comment,
                    replies: Vec::new(),
                });
            }
            Some(parent_id) => match index.get(&parent_id) {
                Some(&pos) => top_level[pos].replies.push(comment),
                None => warn!(
                    "dropping reply {} on {}/{}: parent {} is not a top-level comment of this thread",
                    comment.id, comment.content_type, comment.content_id, parent_id
                ),
            },
        }
    }

    top_level.sort_by(|a, b| newest_first(&a.comment, &b.comment));
    top_level
}

// thread id, top-level row first, then parent id, creation time and id
fn thread_order(a: &Comment, b: &Comment) -> Ordering {
    a.thread_id()
        .cmp(&b.thread_id())
        .then_with(|| a.parent_id.is_some().cmp(&b.parent_id.is_some()))
        .then_with(|| a.parent_id.cmp(&b.parent_id))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

fn newest_first(a: &Comment, b: &Comment) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::store::testing::{insert_user, memory_db, CountingDb};
    use crate::store::Value;

    fn comment(id: i64, parent_id: Option<i64>, t: i64) -> Comment {
        Comment {
            id,
            user_id: Some(1),
            username: Some("alice".to_string()),
            content_type: "gallery".to_string(),
            content_id: 5,
            parent_id,
            content: format!("comment {}", id),
            country: Some("Unknown".to_string()),
            upvotes: 0,
            downvotes: 0,
            created_at: Some(Utc.timestamp_opt(1_700_000_000 + t, 0).unwrap()),
            updated_at: None,
        }
    }

    fn ids(nodes: &[CommentNode]) -> Vec<(i64, Vec<i64>)> {
        nodes
            .iter()
            .map(|n| (n.comment.id, n.replies.iter().map(|r| r.id).collect()))
            .collect()
    }

    #[test]
    fn top_level_newest_first_replies_oldest_first() {
        let nodes = assemble(vec![
            comment(1, None, 1),
            comment(2, Some(1), 2),
            comment(3, None, 3),
        ]);
        assert_eq!(ids(&nodes), vec![(3, vec![]), (1, vec![2])]);
    }

    #[test]
    fn replies_are_chronological_whatever_the_input_order() {
        let nodes = assemble(vec![
            comment(14, Some(10), 9),
            comment(11, Some(10), 2),
            comment(10, None, 1),
            comment(12, Some(10), 5),
            comment(20, None, 4),
            comment(21, Some(20), 6),
        ]);
        assert_eq!(ids(&nodes), vec![(20, vec![21]), (10, vec![11, 12, 14])]);
        for node in &nodes {
            for pair in node.replies.windows(2) {
                assert!(pair[0].created_at <= pair[1].created_at);
            }
            for reply in &node.replies {
                assert_eq!(reply.parent_id, Some(node.comment.id));
            }
        }
    }

    #[test]
    fn orphaned_and_nested_replies_are_dropped() {
        let nodes = assemble(vec![
            comment(1, None, 1),
            comment(2, Some(1), 2),
            // parent missing from the fetched set
            comment(3, Some(99), 3),
            // reply to a reply
            comment(4, Some(2), 4),
        ]);
        assert_eq!(ids(&nodes), vec![(1, vec![2])]);
        let flattened = nodes
            .iter()
            .flat_map(|n| std::iter::once(n.comment.clone()).chain(n.replies.iter().cloned()))
            .collect();
        let again = assemble(flattened);
        assert_eq!(ids(&again), vec![(1, vec![2])]);
    }

    #[test]
    fn same_second_ties_fall_back_to_id() {
        let nodes = assemble(vec![
            comment(1, None, 1),
            comment(2, None, 1),
            comment(4, Some(1), 2),
            comment(3, Some(1), 2),
        ]);
        assert_eq!(ids(&nodes), vec![(2, vec![]), (1, vec![3, 4])]);
    }

    #[test]
    fn nothing_in_nothing_out() {
        assert!(assemble(Vec::new()).is_empty());
    }

    async fn insert_comment(
        db: &dyn Database,
        user_id: i64,
        content_type: &str,
        parent_id: Option<i64>,
        created_at: &str,
    ) -> i64 {
        db.execute(
            "INSERT INTO comments (user_id, content_type, content_id, parent_id, content, country, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            vec![
                user_id.into(),
                content_type.into(),
                Value::Integer(5),
                parent_id.into(),
                "hello".into(),
                "Unknown".into(),
                created_at.into(),
            ],
            FetchMode::None,
        )
        .await
        .unwrap()
        .last_insert_id
        .unwrap()
    }

    #[actix_rt::test]
    async fn loads_only_the_requested_target() {
        let db = memory_db().await;
        let alice = insert_user(&db, "alice").await;
        let c1 = insert_comment(&db, alice, "gallery", None, "2024-01-01 00:00:01").await;
        let c2 = insert_comment(&db, alice, "gallery", Some(c1), "2024-01-01 00:00:02").await;
        let c3 = insert_comment(&db, alice, "gallery", None, "2024-01-01 00:00:03").await;
        // other targets stay out
        insert_comment(&db, alice, "blog", None, "2024-01-01 00:00:04").await;

        let nodes = load_thread(&db, "gallery", 5).await.unwrap();
        assert_eq!(ids(&nodes), vec![(c3, vec![]), (c1, vec![c2])]);
        assert_eq!(nodes[1].replies[0].username.as_deref(), Some("alice"));
        assert_eq!(nodes[0].comment.country.as_deref(), Some("Unknown"));
    }

    #[actix_rt::test]
    async fn a_thread_costs_one_store_call() {
        let db = memory_db().await;
        let alice = insert_user(&db, "alice").await;
        let c1 = insert_comment(&db, alice, "oc", None, "2024-01-01 00:00:01").await;
        let c2 = insert_comment(&db, alice, "oc", Some(c1), "2024-01-01 00:00:02").await;
        let c3 = insert_comment(&db, alice, "oc", Some(c1), "2024-01-01 00:00:03").await;
        let c4 = insert_comment(&db, alice, "oc", None, "2024-01-01 00:00:04").await;

        let counted = CountingDb::new(db);
        let nodes = load_thread(&counted, "oc", 5).await.unwrap();
        assert_eq!(ids(&nodes), vec![(c4, vec![]), (c1, vec![c2, c3])]);
        assert_eq!(counted.calls(), 1);

        load_thread(&counted, "oc", 404).await.unwrap();
        assert_eq!(counted.calls(), 2);
    }

    #[actix_rt::test]
    async fn unknown_target_yields_an_empty_thread() {
        let db = memory_db().await;
        assert!(load_thread(&db, "gallery", 404).await.unwrap().is_empty());
        assert!(load_thread(&db, "not-a-type", 5).await.unwrap().is_empty());
    }
}
