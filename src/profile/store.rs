//! SQLite-backed profile store.
//!
//! Owns users, committed facts, the pending-confirmation queue, and the
//! voice transcript log. Thread-safe via an internal `Mutex<Connection>`;
//! all writes are serialized, which keeps the at-most-one-active-fact
//! invariant enforceable without upsert gymnastics.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, Row, params};

use super::schema::{apply_schema, read_schema_version};
use super::types::{
    ConfirmationStatus, Fact, FactCandidate, FactKind, FactStatus, PendingConfirmation,
    TranscriptEntry, UserRecord,
};
use crate::error::{Result, WayfareError};

/// Parameters for queuing a fact mutation for confirmation.
pub struct ConfirmationParams<'a> {
    pub user_id: &'a str,
    pub kind: FactKind,
    pub old_value: Option<&'a str>,
    pub new_value: &'a str,
    pub source: &'a str,
    pub confidence: f64,
    pub turn_text: &'a str,
}

/// SQLite-backed store for users, facts, confirmations, and transcripts.
pub struct ProfileStore {
    conn: Mutex<Connection>,
}

impl ProfileStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Current schema version stamp.
    pub fn schema_version(&self) -> Result<Option<u32>> {
        let conn = self.lock();
        Ok(read_schema_version(&conn)?)
    }

    // Poisoned-lock recovery: a panic mid-write leaves the connection
    // usable, and SQLite's own transactionality covers partial writes.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Users ────────────────────────────────────────────────

    /// Fetch a user record, creating it on first sight. A display name
    /// supplied later fills in a previously unknown one.
    pub fn resolve_user(&self, id: &str, display_name: Option<&str>) -> Result<UserRecord> {
        if id.is_empty() {
            return Err(WayfareError::Store("empty user id".into()));
        }
        let conn = self.lock();
        let now = now_secs();
        conn.execute(
            "INSERT OR IGNORE INTO users (id, display_name, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?3)",
            params![id, display_name, now],
        )?;
        if let Some(name) = display_name {
            conn.execute(
                "UPDATE users SET display_name = ?1, updated_at = ?2 \
                 WHERE id = ?3 AND display_name IS NULL",
                params![name, now, id],
            )?;
        }
        let user = conn
            .query_row(
                "SELECT id, display_name, destination_countries, created_at, updated_at \
                 FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .map_err(WayfareError::from)?;
        Ok(user)
    }

    /// Look up a user without creating one.
    pub fn get_user(&self, id: &str) -> Result<Option<UserRecord>> {
        let conn = self.lock();
        let user = conn
            .query_row(
                "SELECT id, display_name, destination_countries, created_at, updated_at \
                 FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    // ── Facts ────────────────────────────────────────────────

    /// All active facts for a user, oldest first.
    pub fn active_facts(&self, user_id: &str) -> Result<Vec<Fact>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, kind, value, confidence, source, status, created_at, updated_at \
             FROM facts WHERE user_id = ?1 AND status = 'active' ORDER BY id",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_fact)?;
        let mut facts = Vec::new();
        for row in rows {
            facts.push(row?);
        }
        Ok(facts)
    }

    /// The active fact of one kind, if any.
    pub fn active_fact(&self, user_id: &str, kind: FactKind) -> Result<Option<Fact>> {
        let conn = self.lock();
        let fact = conn
            .query_row(
                "SELECT id, kind, value, confidence, source, status, created_at, updated_at \
                 FROM facts WHERE user_id = ?1 AND kind = ?2 AND status = 'active'",
                params![user_id, kind.as_str()],
                row_to_fact,
            )
            .optional()?;
        Ok(fact)
    }

    /// Commit a brand-new fact. Callers must have checked that no active
    /// fact of this kind exists — a change goes through the confirmation
    /// queue instead.
    pub fn commit_fact(&self, user_id: &str, candidate: &FactCandidate, source: &str) -> Result<i64> {
        let conn = self.lock();
        let now = now_secs();
        conn.execute(
            "INSERT INTO facts (user_id, kind, value, confidence, source, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?6)",
            params![
                user_id,
                candidate.kind.as_str(),
                candidate.value,
                candidate.confidence,
                source,
                now
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    // ── Pending confirmations ────────────────────────────────

    /// Queue a proposed fact mutation for human approval.
    pub fn queue_confirmation(&self, p: &ConfirmationParams<'_>) -> Result<i64> {
        let conn = self.lock();
        let now = now_secs();
        conn.execute(
            "INSERT INTO pending_confirmations \
             (user_id, kind, old_value, new_value, source, confidence, turn_text, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8)",
            params![
                p.user_id,
                p.kind.as_str(),
                p.old_value,
                p.new_value,
                p.source,
                p.confidence,
                p.turn_text,
                now
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All unresolved confirmations for a user, oldest first.
    pub fn pending_confirmations(&self, user_id: &str) -> Result<Vec<PendingConfirmation>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, kind, old_value, new_value, source, confidence, turn_text, \
             status, created_at, resolved_at \
             FROM pending_confirmations WHERE user_id = ?1 AND status = 'pending' ORDER BY id",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_confirmation)?;
        let mut pending = Vec::new();
        for row in rows {
            pending.push(row?);
        }
        Ok(pending)
    }

    /// Resolve a pending confirmation.
    ///
    /// Accepting supersedes the user's active fact of that kind (if any)
    /// and commits the proposed value, transactionally. Rejecting only
    /// marks the row; the committed fact is untouched. Either way the
    /// row survives as the audit record.
    pub fn resolve_confirmation(&self, id: i64, accept: bool) -> Result<()> {
        let conn = self.lock();
        let now = now_secs();

        let proposal = conn
            .query_row(
                "SELECT id, user_id, kind, old_value, new_value, source, confidence, turn_text, \
                 status, created_at, resolved_at \
                 FROM pending_confirmations WHERE id = ?1 AND status = 'pending'",
                params![id],
                row_to_confirmation,
            )
            .optional()?;
        let Some(proposal) = proposal else {
            return Err(WayfareError::Store(format!(
                "no pending confirmation with id {id}"
            )));
        };

        let tx = conn.unchecked_transaction()?;
        if accept {
            tx.execute(
                "UPDATE facts SET status = 'superseded', updated_at = ?1 \
                 WHERE user_id = ?2 AND kind = ?3 AND status = 'active'",
                params![now, proposal.user_id, proposal.kind.as_str()],
            )?;
            tx.execute(
                "INSERT INTO facts (user_id, kind, value, confidence, source, status, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?6)",
                params![
                    proposal.user_id,
                    proposal.kind.as_str(),
                    proposal.new_value,
                    proposal.confidence,
                    proposal.source,
                    now
                ],
            )?;
        }
        tx.execute(
            "UPDATE pending_confirmations SET status = ?1, resolved_at = ?2 WHERE id = ?3",
            params![if accept { "accepted" } else { "rejected" }, now, id],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ── Transcript ───────────────────────────────────────────

    /// Append one side of a turn to the transcript log.
    pub fn append_transcript(&self, user_id: &str, role: &str, text: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO transcripts (user_id, role, text, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, role, text, now_secs()],
        )?;
        Ok(())
    }

    /// Full transcript for a user, oldest first.
    pub fn transcript(&self, user_id: &str) -> Result<Vec<TranscriptEntry>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, role, text, created_at FROM transcripts \
             WHERE user_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(TranscriptEntry {
                id: row.get(0)?,
                user_id: row.get(1)?,
                role: row.get(2)?,
                text: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    // ── Profile propagation ──────────────────────────────────

    /// Collapse the user's destination facts (active and superseded-but-
    /// accepted history is excluded — only active rows count) into the
    /// denormalized `destination_countries` field.
    pub fn refresh_destination_countries(&self, user_id: &str) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT value FROM facts \
             WHERE user_id = ?1 AND kind = 'destination' AND status = 'active' ORDER BY id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
        let mut countries = Vec::new();
        for row in rows {
            let value = row?;
            if !countries.contains(&value) {
                countries.push(value);
            }
        }
        let json = serde_json::to_string(&countries).unwrap_or_else(|_| "[]".to_owned());
        conn.execute(
            "UPDATE users SET destination_countries = ?1, updated_at = ?2 WHERE id = ?3",
            params![json, now_secs(), user_id],
        )?;
        Ok(countries)
    }
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    let countries_json: String = row.get(2)?;
    Ok(UserRecord {
        id: row.get(0)?,
        display_name: row.get(1)?,
        destination_countries: serde_json::from_str(&countries_json).unwrap_or_default(),
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn row_to_fact(row: &Row<'_>) -> rusqlite::Result<Fact> {
    let kind: String = row.get(1)?;
    let status: String = row.get(5)?;
    Ok(Fact {
        id: row.get(0)?,
        kind: FactKind::parse(&kind).unwrap_or(FactKind::Destination),
        value: row.get(2)?,
        confidence: row.get(3)?,
        source: row.get(4)?,
        status: if status == "active" {
            FactStatus::Active
        } else {
            FactStatus::Superseded
        },
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn row_to_confirmation(row: &Row<'_>) -> rusqlite::Result<PendingConfirmation> {
    let kind: String = row.get(2)?;
    let status: String = row.get(8)?;
    Ok(PendingConfirmation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: FactKind::parse(&kind).unwrap_or(FactKind::Destination),
        old_value: row.get(3)?,
        new_value: row.get(4)?,
        source: row.get(5)?,
        confidence: row.get(6)?,
        turn_text: row.get(7)?,
        status: match status.as_str() {
            "accepted" => ConfirmationStatus::Accepted,
            "rejected" => ConfirmationStatus::Rejected,
            _ => ConfirmationStatus::Pending,
        },
        created_at: row.get(9)?,
        resolved_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ProfileStore {
        match ProfileStore::open_in_memory() {
            Ok(s) => s,
            Err(_) => unreachable!("in-memory store opens"),
        }
    }

    fn candidate(kind: FactKind, value: &str) -> FactCandidate {
        FactCandidate {
            kind,
            value: value.to_owned(),
            confidence: 0.9,
            requires_confirmation: false,
        }
    }

    #[test]
    fn resolve_user_creates_then_reuses() {
        let store = store();
        let first = store.resolve_user("u1", None);
        assert!(first.is_ok());

        let second = store.resolve_user("u1", Some("Ana"));
        match second {
            Ok(user) => {
                assert_eq!(user.id, "u1");
                assert_eq!(user.display_name.as_deref(), Some("Ana"));
            }
            Err(_) => unreachable!("resolve succeeds"),
        }

        // A later name does not overwrite a known one.
        let third = store.resolve_user("u1", Some("Someone Else"));
        match third {
            Ok(user) => assert_eq!(user.display_name.as_deref(), Some("Ana")),
            Err(_) => unreachable!("resolve succeeds"),
        }
    }

    #[test]
    fn empty_user_id_rejected() {
        let store = store();
        assert!(store.resolve_user("", None).is_err());
    }

    #[test]
    fn get_user_does_not_create() {
        let store = store();
        assert!(matches!(store.get_user("ghost"), Ok(None)));
    }

    #[test]
    fn commit_and_read_back_fact() {
        let store = store();
        let _ = store.resolve_user("u1", None);
        let id = store.commit_fact("u1", &candidate(FactKind::Destination, "Portugal"), "voice");
        assert!(id.is_ok());

        let fact = store.active_fact("u1", FactKind::Destination);
        match fact {
            Ok(Some(f)) => {
                assert_eq!(f.value, "Portugal");
                assert_eq!(f.status, FactStatus::Active);
                assert_eq!(f.source, "voice");
            }
            _ => unreachable!("fact present"),
        }
    }

    #[test]
    fn accept_confirmation_supersedes_old_fact() {
        let store = store();
        let _ = store.resolve_user("u1", None);
        let _ = store.commit_fact("u1", &candidate(FactKind::Destination, "Portugal"), "voice");

        let queued = store.queue_confirmation(&ConfirmationParams {
            user_id: "u1",
            kind: FactKind::Destination,
            old_value: Some("Portugal"),
            new_value: "Spain",
            source: "voice",
            confidence: 0.85,
            turn_text: "actually, let's do Spain instead",
        });
        let id = match queued {
            Ok(id) => id,
            Err(_) => unreachable!("queue succeeds"),
        };

        assert!(store.resolve_confirmation(id, true).is_ok());

        // Exactly one active destination fact, holding the new value.
        let facts = store.active_facts("u1").unwrap_or_default();
        let destinations: Vec<_> = facts
            .iter()
            .filter(|f| f.kind == FactKind::Destination)
            .collect();
        assert_eq!(destinations.len(), 1);
        assert_eq!(destinations[0].value, "Spain");

        // The queue row survives as audit.
        assert!(store.pending_confirmations("u1").unwrap_or_default().is_empty());
    }

    #[test]
    fn reject_confirmation_keeps_old_fact() {
        let store = store();
        let _ = store.resolve_user("u1", None);
        let _ = store.commit_fact("u1", &candidate(FactKind::Budget, "€2000/month"), "voice");

        let id = store
            .queue_confirmation(&ConfirmationParams {
                user_id: "u1",
                kind: FactKind::Budget,
                old_value: Some("€2000/month"),
                new_value: "€5000/month",
                source: "voice",
                confidence: 0.4,
                turn_text: "maybe five thousand?",
            })
            .unwrap_or(-1);
        assert!(id > 0);

        assert!(store.resolve_confirmation(id, false).is_ok());

        let fact = store.active_fact("u1", FactKind::Budget);
        match fact {
            Ok(Some(f)) => assert_eq!(f.value, "€2000/month"),
            _ => unreachable!("old fact still active"),
        }
    }

    #[test]
    fn resolving_unknown_confirmation_errors() {
        let store = store();
        assert!(store.resolve_confirmation(12345, true).is_err());
    }

    #[test]
    fn double_resolution_errors() {
        let store = store();
        let _ = store.resolve_user("u1", None);
        let id = store
            .queue_confirmation(&ConfirmationParams {
                user_id: "u1",
                kind: FactKind::Timeline,
                old_value: None,
                new_value: "next spring",
                source: "voice",
                confidence: 0.7,
                turn_text: "we're thinking next spring",
            })
            .unwrap_or(-1);
        assert!(store.resolve_confirmation(id, true).is_ok());
        assert!(store.resolve_confirmation(id, true).is_err());
    }

    #[test]
    fn transcript_appends_in_order() {
        let store = store();
        let _ = store.resolve_user("u1", None);
        assert!(store.append_transcript("u1", "user", "hello").is_ok());
        assert!(store.append_transcript("u1", "assistant", "hi there").is_ok());

        let entries = store.transcript("u1").unwrap_or_default();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].role, "user");
        assert_eq!(entries[1].role, "assistant");
    }

    #[test]
    fn destination_countries_collapse() {
        let store = store();
        let _ = store.resolve_user("u1", None);
        let _ = store.commit_fact("u1", &candidate(FactKind::Destination, "Portugal"), "voice");
        let _ = store.commit_fact("u1", &candidate(FactKind::Budget, "€2000/month"), "voice");

        let countries = store.refresh_destination_countries("u1").unwrap_or_default();
        assert_eq!(countries, vec!["Portugal".to_owned()]);

        let user = store.get_user("u1");
        match user {
            Ok(Some(u)) => assert_eq!(u.destination_countries, vec!["Portugal".to_owned()]),
            _ => unreachable!("user present"),
        }
    }

    #[test]
    fn schema_version_readable() {
        let store = store();
        assert!(matches!(store.schema_version(), Ok(Some(_))));
    }
}
