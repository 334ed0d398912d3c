// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolution and approval operations.

use std::str::FromStr;

use repflow_core::types::{ApprovalRecord, Resolution, ResolutionStatus};
use repflow_core::RepflowError;
use rusqlite::params;

use crate::database::Database;
use crate::queries::decode_err;

fn row_to_resolution(row: &rusqlite::Row<'_>) -> Result<Resolution, rusqlite::Error> {
    let citations: String = row.get(5)?;
    let scores: String = row.get(6)?;
    let status: String = row.get(7)?;
    let approval: Option<String> = row.get(8)?;
    Ok(Resolution {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        run_id: row.get(2)?,
        attempt_index: row.get(3)?,
        resolution_text: row.get(4)?,
        citations: serde_json::from_str(&citations).map_err(decode_err)?,
        scores: serde_json::from_str(&scores).map_err(decode_err)?,
        status: ResolutionStatus::from_str(&status).map_err(decode_err)?,
        approval: approval
            .map(|a| serde_json::from_str(&a).map_err(decode_err))
            .transpose()?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

const SELECT_COLUMNS: &str = "id, conversation_id, run_id, attempt_index, resolution_text,
    citations, scores, status, approval, created_at, updated_at";

/// Upsert a resolution keyed by resolution id.
pub async fn save_resolution(db: &Database, resolution: &Resolution) -> Result<(), RepflowError> {
    let r = resolution.clone();
    let citations = serde_json::to_string(&r.citations)
        .map_err(|e| RepflowError::Storage { source: Box::new(e) })?;
    let scores = serde_json::to_string(&r.scores)
        .map_err(|e| RepflowError::Storage { source: Box::new(e) })?;
    let approval = r
        .approval
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| RepflowError::Storage { source: Box::new(e) })?;

    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO resolutions
                   (id, conversation_id, run_id, attempt_index, resolution_text,
                    citations, scores, status, approval, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(id) DO UPDATE SET
                   resolution_text = excluded.resolution_text,
                   citations = excluded.citations,
                   scores = excluded.scores,
                   status = excluded.status,
                   approval = excluded.approval,
                   updated_at = excluded.updated_at",
                params![
                    r.id,
                    r.conversation_id,
                    r.run_id,
                    r.attempt_index,
                    r.resolution_text,
                    citations,
                    scores,
                    r.status.to_string(),
                    approval,
                    r.created_at,
                    r.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a resolution by ID.
pub async fn get_resolution(db: &Database, id: &str) -> Result<Option<Resolution>, RepflowError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM resolutions WHERE id = ?1"
            ))?;
            let result = stmt.query_row(params![id], row_to_resolution);
            match result {
                Ok(resolution) => Ok(Some(resolution)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(tokio_rusqlite::Error::Rusqlite(e)),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List resolutions for a conversation, newest first.
pub async fn list_resolutions(
    db: &Database,
    conversation_id: &str,
) -> Result<Vec<Resolution>, RepflowError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM resolutions
                 WHERE conversation_id = ?1 ORDER BY created_at DESC"
            ))?;
            let rows = stmt.query_map(params![conversation_id], row_to_resolution)?;
            let mut resolutions = Vec::new();
            for row in rows {
                resolutions.push(row?);
            }
            Ok(resolutions)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record the representative's decision on a resolution.
///
/// The approval is terminal: a second decision on the same resolution
/// returns [`RepflowError::InvalidState`] without mutating the row.
pub async fn record_approval(
    db: &Database,
    resolution_id: &str,
    approval: &ApprovalRecord,
) -> Result<(), RepflowError> {
    let existing = get_resolution(db, resolution_id).await?;
    let Some(resolution) = existing else {
        return Err(RepflowError::ResolutionNotFound {
            id: resolution_id.to_string(),
        });
    };
    if resolution.approval.is_some() {
        return Err(RepflowError::InvalidState {
            message: format!("resolution {resolution_id} already has an approval record"),
        });
    }

    let status = match approval.action {
        repflow_core::types::ApprovalAction::Approve => ResolutionStatus::Approved,
        repflow_core::types::ApprovalAction::Reject => ResolutionStatus::Rejected,
        repflow_core::types::ApprovalAction::Edit => ResolutionStatus::Edited,
    };
    let approval_json = serde_json::to_string(approval)
        .map_err(|e| RepflowError::Storage { source: Box::new(e) })?;
    let resolution_id = resolution_id.to_string();

    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE resolutions
                 SET status = ?1, approval = ?2,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?3",
                params![status.to_string(), approval_json, resolution_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
