// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation CRUD operations.

use std::str::FromStr;

use repflow_core::types::{Channel, Conversation, ConversationStatus};
use repflow_core::RepflowError;
use rusqlite::params;

use crate::database::Database;
use crate::queries::decode_err;

fn row_to_conversation(row: &rusqlite::Row<'_>) -> Result<Conversation, rusqlite::Error> {
    let channel: String = row.get(3)?;
    let status: String = row.get(4)?;
    Ok(Conversation {
        id: row.get(0)?,
        rep_id: row.get(1)?,
        customer_id: row.get(2)?,
        channel: Channel::from_str(&channel).map_err(decode_err)?,
        status: ConversationStatus::from_str(&status).map_err(decode_err)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Create a new conversation.
pub async fn create_conversation(
    db: &Database,
    conversation: &Conversation,
) -> Result<(), RepflowError> {
    let c = conversation.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversations (id, rep_id, customer_id, channel, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    c.id,
                    c.rep_id,
                    c.customer_id,
                    c.channel.to_string(),
                    c.status.to_string(),
                    c.created_at,
                    c.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a conversation by ID.
pub async fn get_conversation(
    db: &Database,
    id: &str,
) -> Result<Option<Conversation>, RepflowError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, rep_id, customer_id, channel, status, created_at, updated_at
                 FROM conversations WHERE id = ?1",
            )?;
            let result = stmt.query_row(params![id], row_to_conversation);
            match result {
                Ok(conversation) => Ok(Some(conversation)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(tokio_rusqlite::Error::Rusqlite(e)),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Update a conversation's lifecycle status and updated_at timestamp.
pub async fn update_conversation_status(
    db: &Database,
    id: &str,
    status: ConversationStatus,
) -> Result<(), RepflowError> {
    let id = id.to_string();
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations
                 SET status = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![status, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
