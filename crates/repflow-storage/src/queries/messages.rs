// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message operations. Messages are append-only: once persisted, never mutated.

use std::str::FromStr;

use repflow_core::types::{ConversationMessage, MessageRole};
use repflow_core::RepflowError;
use rusqlite::params;

use crate::database::Database;
use crate::queries::decode_err;

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<ConversationMessage, rusqlite::Error> {
    let role: String = row.get(2)?;
    Ok(ConversationMessage {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: MessageRole::from_str(&role).map_err(decode_err)?,
        content: row.get(3)?,
        seq: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Append a message, assigning the next sequence number for the conversation.
///
/// The seq computation and the insert run inside the same serialized call,
/// so concurrent appends cannot race on the sequence.
pub async fn append_message(
    db: &Database,
    id: &str,
    conversation_id: &str,
    role: MessageRole,
    content: &str,
    created_at: &str,
) -> Result<ConversationMessage, RepflowError> {
    let id = id.to_string();
    let conversation_id = conversation_id.to_string();
    let content = content.to_string();
    let created_at = created_at.to_string();
    db.connection()
        .call(move |conn| {
            let seq: i64 = conn.query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )?;
            conn.execute(
                "INSERT INTO messages (id, conversation_id, role, content, seq, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, conversation_id, role.to_string(), content, seq, created_at],
            )?;
            Ok(ConversationMessage {
                id,
                conversation_id,
                role,
                content,
                seq,
                created_at,
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get messages for a conversation in sequence order.
pub async fn get_messages(
    db: &Database,
    conversation_id: &str,
    limit: Option<i64>,
) -> Result<Vec<ConversationMessage>, RepflowError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut messages = Vec::new();
            match limit {
                Some(lim) => {
                    let mut stmt = conn.prepare(
                        "SELECT id, conversation_id, role, content, seq, created_at
                         FROM messages WHERE conversation_id = ?1
                         ORDER BY seq ASC LIMIT ?2",
                    )?;
                    let rows = stmt.query_map(params![conversation_id, lim], row_to_message)?;
                    for row in rows {
                        messages.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT id, conversation_id, role, content, seq, created_at
                         FROM messages WHERE conversation_id = ?1
                         ORDER BY seq ASC",
                    )?;
                    let rows = stmt.query_map(params![conversation_id], row_to_message)?;
                    for row in rows {
                        messages.push(row?);
                    }
                }
            }
            Ok(messages)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
