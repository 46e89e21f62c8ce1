// 🗄️ Ledger Store - SQLite + WAL
//
// Imported records are keyed by idempotency hash (UNIQUE), so importing the
// same file twice inserts nothing the second time. Match runs are stored with
// their pairs and unmatched records for later review.

use crate::error::{ReconError, Result};
use crate::matcher::{MatchConfig, MatchOutcome, MatchPair, Unmatched};
use crate::record::{idempotency_hashes, Record};
use crate::report::RunSummary;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

// ============================================================================
// TYPES
// ============================================================================

/// A record as stored, with its row id and hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i64,
    pub idempotency_hash: String,
    pub record: Record,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub inserted: usize,
    pub skipped_duplicates: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStat {
    pub source: String,
    pub record_count: i64,
    pub total_in_cents: i64,
    pub total_out_cents: i64,
    pub date_range: String,
}

/// Filter for loading ledger records
#[derive(Debug, Clone, Default)]
pub struct RecordFilter<'a> {
    pub source: Option<&'a str>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// A stored run with its full outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDetail {
    pub summary: RunSummary,
    pub config: MatchConfig,
    pub outcome: MatchOutcome,
}

// ============================================================================
// SETUP
// ============================================================================

pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    debug!(path = %path.display(), "ledger opened");
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idempotency_hash TEXT UNIQUE NOT NULL,
            source TEXT NOT NULL,
            source_file TEXT NOT NULL,
            line_number INTEGER NOT NULL,
            date TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            description TEXT NOT NULL,
            reference TEXT,
            vendor TEXT,
            category TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS match_runs (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            label_a TEXT NOT NULL,
            label_b TEXT NOT NULL,
            config TEXT NOT NULL,
            a_count INTEGER NOT NULL,
            b_count INTEGER NOT NULL,
            matched INTEGER NOT NULL,
            unmatched_a INTEGER NOT NULL,
            unmatched_b INTEGER NOT NULL,
            unmatched_a_cents INTEGER NOT NULL,
            unmatched_b_cents INTEGER NOT NULL,
            match_rate REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS match_pairs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL REFERENCES match_runs(id) ON DELETE CASCADE,
            a_index INTEGER NOT NULL,
            b_index INTEGER NOT NULL,
            score REAL NOT NULL,
            date_diff_days INTEGER NOT NULL,
            amount_diff_cents INTEGER NOT NULL,
            pair TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS unmatched (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL REFERENCES match_runs(id) ON DELETE CASCADE,
            side TEXT NOT NULL CHECK (side IN ('a', 'b')),
            record_index INTEGER NOT NULL,
            amount_cents INTEGER NOT NULL,
            record TEXT NOT NULL,
            UNIQUE (run_id, side, record_index)
        );

        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_records_source_date ON records(source, date);
        CREATE INDEX IF NOT EXISTS idx_pairs_run ON match_pairs(run_id);
        CREATE INDEX IF NOT EXISTS idx_unmatched_run ON unmatched(run_id, side);
        CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);",
    )?;

    Ok(())
}

// ============================================================================
// RECORDS
// ============================================================================

/// Insert records, skipping any whose hash is already stored.
///
/// Identical rows within one batch are numbered, so each is kept.
/// Runs in one transaction: either every new row lands or none does.
pub fn insert_records(conn: &Connection, records: &[Record], actor: &str) -> Result<ImportStats> {
    let tx = conn.unchecked_transaction()?;
    let mut stats = ImportStats::default();

    {
        let mut stmt = tx.prepare(
            "INSERT INTO records (
                idempotency_hash, source, source_file, line_number, date,
                amount_cents, description, reference, vendor, category
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(idempotency_hash) DO NOTHING",
        )?;

        for (r, hash) in records.iter().zip(idempotency_hashes(records)) {
            let changed = stmt.execute(params![
                hash,
                r.source,
                r.source_file,
                r.line_number as i64,
                r.date,
                r.amount_cents,
                r.description,
                r.reference,
                r.vendor,
                r.category,
            ])?;

            if changed == 0 {
                stats.skipped_duplicates += 1;
                continue;
            }
            stats.inserted += 1;

            let event = Event::new(
                "record_imported",
                "record",
                &hash,
                serde_json::json!({
                    "source": r.source,
                    "amount_cents": r.amount_cents,
                    "source_file": r.source_file,
                    "line_number": r.line_number,
                }),
                actor,
            );
            insert_event(&tx, &event)?;
        }
    }

    tx.commit()?;
    info!(
        inserted = stats.inserted,
        skipped = stats.skipped_duplicates,
        "records imported"
    );
    Ok(stats)
}

/// Count how many of `records` are not yet stored, without writing
pub fn count_new_records(conn: &Connection, records: &[Record]) -> Result<ImportStats> {
    let mut stmt = conn.prepare("SELECT 1 FROM records WHERE idempotency_hash = ?1")?;
    let mut stats = ImportStats::default();

    for hash in idempotency_hashes(records) {
        if stmt.exists(params![hash])? {
            stats.skipped_duplicates += 1;
        } else {
            stats.inserted += 1;
        }
    }

    Ok(stats)
}

fn row_to_stored(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    let line: i64 = row.get("line_number")?;
    Ok(StoredRecord {
        id: row.get("id")?,
        idempotency_hash: row.get("idempotency_hash")?,
        record: Record {
            source: row.get("source")?,
            source_file: row.get("source_file")?,
            line_number: line.max(0) as usize,
            date: row.get("date")?,
            amount_cents: row.get("amount_cents")?,
            description: row.get("description")?,
            reference: row.get("reference")?,
            vendor: row.get("vendor")?,
            category: row.get("category")?,
        },
    })
}

/// Load records, ordered by date then id
pub fn get_records(conn: &Connection, filter: &RecordFilter<'_>) -> Result<Vec<StoredRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, idempotency_hash, source, source_file, line_number, date,
                amount_cents, description, reference, vendor, category
         FROM records
         WHERE (?1 IS NULL OR source = ?1)
           AND (?2 IS NULL OR date >= ?2)
           AND (?3 IS NULL OR date <= ?3)
         ORDER BY date, id",
    )?;

    let rows = stmt
        .query_map(params![filter.source, filter.from, filter.to], row_to_stored)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

/// Delete records by id, logging one event per deletion. Returns rows deleted.
pub fn delete_records(conn: &Connection, ids: &[i64], actor: &str, reason: &str) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut deleted = 0;

    for id in ids {
        let hash: Option<String> = tx
            .query_row(
                "SELECT idempotency_hash FROM records WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(hash) = hash else {
            continue;
        };

        deleted += tx.execute("DELETE FROM records WHERE id = ?1", params![id])?;

        let event = Event::new(
            "record_deleted",
            "record",
            &hash,
            serde_json::json!({ "id": id, "reason": reason }),
            actor,
        );
        insert_event(&tx, &event)?;
    }

    tx.commit()?;
    Ok(deleted)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
    Ok(count)
}

/// Per-source statistics
pub fn get_source_stats(conn: &Connection) -> Result<Vec<SourceStat>> {
    let mut stmt = conn.prepare(
        "SELECT
            source,
            COUNT(*) as record_count,
            COALESCE(SUM(CASE WHEN amount_cents > 0 THEN amount_cents ELSE 0 END), 0) as total_in,
            COALESCE(SUM(CASE WHEN amount_cents < 0 THEN -amount_cents ELSE 0 END), 0) as total_out,
            MIN(date) as min_date,
            MAX(date) as max_date
         FROM records
         GROUP BY source
         ORDER BY source",
    )?;

    let stats = stmt
        .query_map([], |row| {
            let min_date: String = row.get(4)?;
            let max_date: String = row.get(5)?;
            Ok(SourceStat {
                source: row.get(0)?,
                record_count: row.get(1)?,
                total_in_cents: row.get(2)?,
                total_out_cents: row.get(3)?,
                date_range: format!("{} - {}", min_date, max_date),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(stats)
}

// ============================================================================
// MATCH RUNS
// ============================================================================

pub fn save_run(
    conn: &Connection,
    summary: &RunSummary,
    config: &MatchConfig,
    outcome: &MatchOutcome,
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO match_runs (
            id, created_at, label_a, label_b, config, a_count, b_count, matched,
            unmatched_a, unmatched_b, unmatched_a_cents, unmatched_b_cents, match_rate
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            summary.run_id,
            summary.created_at.to_rfc3339(),
            summary.label_a,
            summary.label_b,
            serde_json::to_string(config)?,
            summary.a_count as i64,
            summary.b_count as i64,
            summary.matched as i64,
            summary.unmatched_a as i64,
            summary.unmatched_b as i64,
            summary.unmatched_a_cents,
            summary.unmatched_b_cents,
            summary.match_rate,
        ],
    )?;

    {
        let mut pair_stmt = tx.prepare(
            "INSERT INTO match_pairs (run_id, a_index, b_index, score, date_diff_days, amount_diff_cents, pair)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for p in &outcome.pairs {
            pair_stmt.execute(params![
                summary.run_id,
                p.a_index as i64,
                p.b_index as i64,
                p.score.total,
                p.date_diff_days,
                p.amount_diff_cents,
                serde_json::to_string(p)?,
            ])?;
        }

        let mut unmatched_stmt = tx.prepare(
            "INSERT INTO unmatched (run_id, side, record_index, amount_cents, record)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (side, items) in [("a", &outcome.unmatched_a), ("b", &outcome.unmatched_b)] {
            for u in items {
                unmatched_stmt.execute(params![
                    summary.run_id,
                    side,
                    u.index as i64,
                    u.record.amount_cents,
                    serde_json::to_string(&u.record)?,
                ])?;
            }
        }
    }

    let event = Event::new(
        "match_run_saved",
        "match_run",
        &summary.run_id,
        serde_json::json!({
            "matched": summary.matched,
            "unmatched_a": summary.unmatched_a,
            "unmatched_b": summary.unmatched_b,
        }),
        "matcher",
    );
    insert_event(&tx, &event)?;

    tx.commit()?;
    info!(run_id = %summary.run_id, "match run saved");
    Ok(())
}

fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<(RunSummary, String)> {
    let created_at: String = row.get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;
    let count = |name: &str| -> rusqlite::Result<usize> {
        let v: i64 = row.get(name)?;
        Ok(v.max(0) as usize)
    };

    let summary = RunSummary {
        run_id: row.get("id")?,
        created_at,
        label_a: row.get("label_a")?,
        label_b: row.get("label_b")?,
        a_count: count("a_count")?,
        b_count: count("b_count")?,
        matched: count("matched")?,
        unmatched_a: count("unmatched_a")?,
        unmatched_b: count("unmatched_b")?,
        unmatched_a_cents: row.get("unmatched_a_cents")?,
        unmatched_b_cents: row.get("unmatched_b_cents")?,
        match_rate: row.get("match_rate")?,
    };
    Ok((summary, row.get("config")?))
}

/// Most recent first
pub fn list_runs(conn: &Connection) -> Result<Vec<RunSummary>> {
    let mut stmt = conn.prepare("SELECT * FROM match_runs ORDER BY created_at DESC, id")?;
    let runs = stmt
        .query_map([], row_to_summary)?
        .map(|r| r.map(|(summary, _)| summary))
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(runs)
}

/// Latest run id, if any run was saved
pub fn latest_run_id(conn: &Connection) -> Result<Option<String>> {
    let id = conn
        .query_row(
            "SELECT id FROM match_runs ORDER BY created_at DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

pub fn get_run(conn: &Connection, run_id: &str) -> Result<RunDetail> {
    let (summary, config_json) = conn
        .query_row(
            "SELECT * FROM match_runs WHERE id = ?1",
            params![run_id],
            row_to_summary,
        )
        .optional()?
        .ok_or_else(|| ReconError::RunNotFound(run_id.to_string()))?;
    let config: MatchConfig = serde_json::from_str(&config_json)?;

    let mut stmt = conn.prepare("SELECT pair FROM match_pairs WHERE run_id = ?1 ORDER BY a_index")?;
    let pairs = stmt
        .query_map(params![run_id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?
        .iter()
        .map(|json| serde_json::from_str::<MatchPair>(json))
        .collect::<serde_json::Result<Vec<_>>>()?;

    let unmatched_a = get_unmatched(conn, run_id, "a")?;
    let unmatched_b = get_unmatched(conn, run_id, "b")?;

    Ok(RunDetail {
        summary,
        config,
        outcome: MatchOutcome {
            pairs,
            unmatched_a,
            unmatched_b,
        },
    })
}

/// Unmatched records of one side ("a" or "b") of a run, by input order
pub fn get_unmatched(conn: &Connection, run_id: &str, side: &str) -> Result<Vec<Unmatched>> {
    let mut stmt = conn.prepare(
        "SELECT record_index, record FROM unmatched WHERE run_id = ?1 AND side = ?2 ORDER BY record_index",
    )?;
    let rows = stmt
        .query_map(params![run_id, side], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(index, json)| -> Result<Unmatched> {
            Ok(Unmatched {
                index: index.max(0) as usize,
                record: serde_json::from_str(&json)?,
            })
        })
        .collect()
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

pub fn get_events_for_entity(conn: &Connection, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id",
    )?;

    let raw = stmt
        .query_map(params![entity_type, entity_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    raw.into_iter()
        .map(|(event_id, ts, event_type, entity_type, entity_id, data, actor)| -> Result<Event> {
            let timestamp = DateTime::parse_from_rfc3339(&ts)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| ReconError::Parse(format!("bad event timestamp '{}': {}", ts, e)))?;
            Ok(Event {
                event_id,
                timestamp,
                event_type,
                entity_type,
                entity_id,
                data: serde_json::from_str(&data)?,
                actor,
            })
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
