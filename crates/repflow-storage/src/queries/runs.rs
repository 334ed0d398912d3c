// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workflow run and attempt operations.
//!
//! Saves are upserts keyed by primary key, so the engine's write-through
//! after each sealed state (and any crash-replay of it) is idempotent.

use std::str::FromStr;

use repflow_core::error::FailureKind;
use repflow_core::types::{RunAttempt, RunState, WorkflowRun};
use repflow_core::RepflowError;
use rusqlite::params;

use crate::database::Database;
use crate::queries::decode_err;

fn row_to_run(row: &rusqlite::Row<'_>) -> Result<WorkflowRun, rusqlite::Error> {
    let state: String = row.get(2)?;
    let error_kind: Option<String> = row.get(5)?;
    Ok(WorkflowRun {
        run_id: row.get(0)?,
        conversation_id: row.get(1)?,
        state: RunState::from_str(&state).map_err(decode_err)?,
        attempt_count: row.get(3)?,
        verdict_passed: row.get(4)?,
        error_kind: error_kind
            .map(|k| FailureKind::from_str(&k).map_err(decode_err))
            .transpose()?,
        started_at: row.get(6)?,
        completed_at: row.get(7)?,
    })
}

fn row_to_attempt(row: &rusqlite::Row<'_>) -> Result<RunAttempt, rusqlite::Error> {
    let query_metadata: String = row.get(3)?;
    let source_results: String = row.get(4)?;
    let source_errors: String = row.get(5)?;
    let citations: String = row.get(7)?;
    let verdict: Option<String> = row.get(8)?;
    let failure: Option<String> = row.get(9)?;
    Ok(RunAttempt {
        run_id: row.get(0)?,
        attempt_index: row.get(1)?,
        optimized_query: row.get(2)?,
        query_metadata: serde_json::from_str(&query_metadata).map_err(decode_err)?,
        source_results: serde_json::from_str(&source_results).map_err(decode_err)?,
        source_errors: serde_json::from_str(&source_errors).map_err(decode_err)?,
        resolution_text: row.get(6)?,
        citations: serde_json::from_str(&citations).map_err(decode_err)?,
        verdict: verdict
            .map(|v| serde_json::from_str(&v).map_err(decode_err))
            .transpose()?,
        failure: failure
            .map(|f| FailureKind::from_str(&f).map_err(decode_err))
            .transpose()?,
        sealed_at: row.get(10)?,
    })
}

/// Upsert a run record keyed by run id.
pub async fn save_run(db: &Database, run: &WorkflowRun) -> Result<(), RepflowError> {
    let r = run.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO workflow_runs
                   (run_id, conversation_id, state, attempt_count, verdict_passed, error_kind, started_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(run_id) DO UPDATE SET
                   state = excluded.state,
                   attempt_count = excluded.attempt_count,
                   verdict_passed = excluded.verdict_passed,
                   error_kind = excluded.error_kind,
                   completed_at = excluded.completed_at",
                params![
                    r.run_id,
                    r.conversation_id,
                    r.state.to_string(),
                    r.attempt_count,
                    r.verdict_passed,
                    r.error_kind.map(|k| k.to_string()),
                    r.started_at,
                    r.completed_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a run by ID.
pub async fn get_run(db: &Database, run_id: &str) -> Result<Option<WorkflowRun>, RepflowError> {
    let run_id = run_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT run_id, conversation_id, state, attempt_count, verdict_passed, error_kind, started_at, completed_at
                 FROM workflow_runs WHERE run_id = ?1",
            )?;
            let result = stmt.query_row(params![run_id], row_to_run);
            match result {
                Ok(run) => Ok(Some(run)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(tokio_rusqlite::Error::Rusqlite(e)),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Upsert an attempt record keyed by (run id, attempt index).
pub async fn save_attempt(db: &Database, attempt: &RunAttempt) -> Result<(), RepflowError> {
    let a = attempt.clone();
    let query_metadata = serde_json::to_string(&a.query_metadata)
        .map_err(|e| RepflowError::Storage { source: Box::new(e) })?;
    let source_results = serde_json::to_string(&a.source_results)
        .map_err(|e| RepflowError::Storage { source: Box::new(e) })?;
    let source_errors = serde_json::to_string(&a.source_errors)
        .map_err(|e| RepflowError::Storage { source: Box::new(e) })?;
    let citations = serde_json::to_string(&a.citations)
        .map_err(|e| RepflowError::Storage { source: Box::new(e) })?;
    let verdict = a
        .verdict
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| RepflowError::Storage { source: Box::new(e) })?;

    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO run_attempts
                   (run_id, attempt_index, optimized_query, query_metadata, source_results,
                    source_errors, resolution_text, citations, verdict, failure, sealed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(run_id, attempt_index) DO UPDATE SET
                   optimized_query = excluded.optimized_query,
                   query_metadata = excluded.query_metadata,
                   source_results = excluded.source_results,
                   source_errors = excluded.source_errors,
                   resolution_text = excluded.resolution_text,
                   citations = excluded.citations,
                   verdict = excluded.verdict,
                   failure = excluded.failure,
                   sealed_at = excluded.sealed_at",
                params![
                    a.run_id,
                    a.attempt_index,
                    a.optimized_query,
                    query_metadata,
                    source_results,
                    source_errors,
                    a.resolution_text,
                    citations,
                    verdict,
                    a.failure.map(|f| f.to_string()),
                    a.sealed_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get all attempts for a run in attempt-index order.
pub async fn get_attempts(db: &Database, run_id: &str) -> Result<Vec<RunAttempt>, RepflowError> {
    let run_id = run_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT run_id, attempt_index, optimized_query, query_metadata, source_results,
                        source_errors, resolution_text, citations, verdict, failure, sealed_at
                 FROM run_attempts WHERE run_id = ?1 ORDER BY attempt_index ASC",
            )?;
            let rows = stmt.query_map(params![run_id], row_to_attempt)?;
            let mut attempts = Vec::new();
            for row in rows {
                attempts.push(row?);
            }
            Ok(attempts)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Startup sweep: mark every non-terminal run aborted.
///
/// A crash-restart that finds in-flight runs without a terminal record
/// finalizes them here; this never touches runs that already reached a
/// terminal state.
pub async fn mark_abandoned_runs_aborted(db: &Database) -> Result<u64, RepflowError> {
    db.connection()
        .call(|conn| {
            let swept = conn.execute(
                "UPDATE workflow_runs
                 SET state = 'aborted',
                     completed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE state = 'in_flight'",
                [],
            )?;
            Ok(swept as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use repflow_core::types::{
        Citation, EvaluationScores, EvaluationVerdict, QueryMetadata, SourceErrorKind,
        SourceResult,
    };
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_run(run_id: &str, state: RunState) -> WorkflowRun {
        WorkflowRun {
            run_id: run_id.to_string(),
            conversation_id: "conv-1".to_string(),
            state,
            attempt_count: 0,
            verdict_passed: None,
            error_kind: None,
            started_at: "2026-01-01T00:00:00.000Z".to_string(),
            completed_at: None,
        }
    }

    fn make_sealed_attempt(run_id: &str, index: u32) -> RunAttempt {
        RunAttempt {
            run_id: run_id.to_string(),
            attempt_index: index,
            optimized_query: "401k password reset".to_string(),
            query_metadata: QueryMetadata {
                keywords: vec!["401k".into(), "password".into()],
                entities: vec!["401k".into()],
                intent: Some("account access".into()),
            },
            source_results: vec![SourceResult {
                source: "fidelity".into(),
                title: "Reset your password".into(),
                url: "https://www.fidelity.com/help/reset".into(),
                snippet: "Use the reset flow".into(),
                relevance: 0.9,
            }],
            source_errors: BTreeMap::from([("mygps".to_string(), SourceErrorKind::Unauthorized)]),
            resolution_text: Some("Go to the reset page [Source: https://www.fidelity.com/help/reset]".into()),
            citations: vec![Citation {
                label: "Reset your password".into(),
                url: "https://www.fidelity.com/help/reset".into(),
            }],
            verdict: Some(EvaluationVerdict {
                scores: EvaluationScores {
                    accuracy: 5,
                    relevancy: 4,
                    factual_grounding: 5,
                    citation_quality: 4,
                    clarity: 5,
                },
                guardrails_passed: true,
                feedback: String::new(),
                passed: true,
            }),
            failure: None,
            sealed_at: Some("2026-01-01T00:00:30.000Z".to_string()),
        }
    }

    #[tokio::test]
    async fn save_and_get_run_round_trips() {
        let (db, _dir) = setup_db().await;
        let run = make_run("run-1", RunState::InFlight);
        save_run(&db, &run).await.unwrap();

        let retrieved = get_run(&db, "run-1").await.unwrap().unwrap();
        assert_eq!(retrieved.state, RunState::InFlight);
        assert_eq!(retrieved.conversation_id, "conv-1");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn save_run_is_idempotent_upsert() {
        let (db, _dir) = setup_db().await;
        let mut run = make_run("run-up", RunState::InFlight);
        save_run(&db, &run).await.unwrap();
        // Replaying the identical write is a no-op.
        save_run(&db, &run).await.unwrap();

        run.state = RunState::Succeeded;
        run.attempt_count = 2;
        run.verdict_passed = Some(true);
        run.completed_at = Some("2026-01-01T00:01:00.000Z".to_string());
        save_run(&db, &run).await.unwrap();

        let retrieved = get_run(&db, "run-up").await.unwrap().unwrap();
        assert_eq!(retrieved.state, RunState::Succeeded);
        assert_eq!(retrieved.attempt_count, 2);
        assert_eq!(retrieved.verdict_passed, Some(true));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn attempt_json_columns_round_trip() {
        let (db, _dir) = setup_db().await;
        save_run(&db, &make_run("run-a", RunState::InFlight)).await.unwrap();
        let attempt = make_sealed_attempt("run-a", 1);
        save_attempt(&db, &attempt).await.unwrap();

        let attempts = get_attempts(&db, "run-a").await.unwrap();
        assert_eq!(attempts.len(), 1);
        let a = &attempts[0];
        assert_eq!(a.optimized_query, "401k password reset");
        assert_eq!(a.query_metadata.keywords, vec!["401k", "password"]);
        assert_eq!(a.source_results.len(), 1);
        assert_eq!(
            a.source_errors.get("mygps"),
            Some(&SourceErrorKind::Unauthorized)
        );
        assert_eq!(a.citations.len(), 1);
        let verdict = a.verdict.as_ref().unwrap();
        assert!(verdict.passed);
        assert_eq!(verdict.scores.relevancy, 4);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn attempts_ordered_by_index() {
        let (db, _dir) = setup_db().await;
        save_run(&db, &make_run("run-o", RunState::InFlight)).await.unwrap();
        save_attempt(&db, &make_sealed_attempt("run-o", 2)).await.unwrap();
        save_attempt(&db, &make_sealed_attempt("run-o", 1)).await.unwrap();

        let attempts = get_attempts(&db, "run-o").await.unwrap();
        assert_eq!(attempts[0].attempt_index, 1);
        assert_eq!(attempts[1].attempt_index, 2);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn sweep_marks_only_in_flight_runs() {
        let (db, _dir) = setup_db().await;
        save_run(&db, &make_run("run-live", RunState::InFlight)).await.unwrap();
        let mut done = make_run("run-done", RunState::Succeeded);
        done.completed_at = Some("2026-01-01T00:01:00.000Z".to_string());
        save_run(&db, &done).await.unwrap();

        let swept = mark_abandoned_runs_aborted(&db).await.unwrap();
        assert_eq!(swept, 1);

        let live = get_run(&db, "run-live").await.unwrap().unwrap();
        assert_eq!(live.state, RunState::Aborted);
        assert!(live.completed_at.is_some());

        let done = get_run(&db, "run-done").await.unwrap().unwrap();
        assert_eq!(done.state, RunState::Succeeded);
        db.close().await.unwrap();
    }
}
