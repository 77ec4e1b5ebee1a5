//! Inter-agent message bus
//!
//! Three durable relations over one SQLite database: append-only broadcast
//! history with TTL, per-recipient FIFO queues with read-and-delete
//! consumption, and an agent registry with heartbeat. The sender never
//! lands in its own queue.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::config::BusConfig;
use crate::error::{KatraError, Result};
use crate::record::AgentStatus;
use crate::tier1::Tier1Store;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS broadcasts (
    message_id INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_ci_id TEXT NOT NULL,
    sender_name TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_broadcasts_created ON broadcasts(created_at);

CREATE TABLE IF NOT EXISTS message_queue (
    queue_id INTEGER PRIMARY KEY AUTOINCREMENT,
    recipient_name TEXT NOT NULL,
    recipient_ci_id TEXT NOT NULL,
    sender_ci_id TEXT NOT NULL,
    sender_name TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL,
    recipients TEXT NOT NULL,
    broadcast_message_id INTEGER,
    read_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_queue_recipient ON message_queue(recipient_ci_id, queue_id);

CREATE TABLE IF NOT EXISTS registry (
    ci_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    role TEXT,
    joined_at TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'available'
);

CREATE INDEX IF NOT EXISTS idx_registry_name ON registry(name);
"#;

fn ts_to_sql(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_from_sql(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// WIRE TYPES
// ============================================================================

/// One queued message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// Monotone queue position
    pub queue_id: i64,
    /// Recipient name as resolved at send time
    pub recipient_name: String,
    /// Recipient identity
    pub recipient_ci_id: String,
    /// Sender identity
    pub sender_ci_id: String,
    /// Sender name
    pub sender_name: String,
    /// Message body
    pub message: String,
    /// Send time
    pub timestamp: DateTime<Utc>,
    /// Literal recipients spec ("broadcast" or the comma list)
    pub recipients: String,
    /// Originating broadcast row, when fanned out from one
    pub broadcast_message_id: Option<i64>,
    /// When the entry was consumed
    pub read_at: Option<DateTime<Utc>>,
}

/// One broadcast history row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastMessage {
    /// Globally ordered id
    pub message_id: i64,
    /// Sender identity
    pub sender_ci_id: String,
    /// Sender name
    pub sender_name: String,
    /// Message body
    pub message: String,
    /// Send time
    pub timestamp: DateTime<Utc>,
}

/// One registry row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    /// Agent identity (primary key)
    pub ci_id: String,
    /// Addressable name
    pub name: String,
    /// Free-form role
    pub role: Option<String>,
    /// First registration time; preserved across re-registration
    pub joined_at: DateTime<Utc>,
    /// Heartbeat; stale entries expire
    pub last_seen: DateTime<Utc>,
    /// Presence status
    pub status: AgentStatus,
}

/// Result of a `hear` call. An empty queue yields `message: None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HearResult {
    /// The popped entry, if any
    pub message: Option<QueueEntry>,
    /// Entries still waiting after this pop
    pub more_available: usize,
}

/// Result of a `say` call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SayReceipt {
    /// Queue rows written
    pub delivered: usize,
    /// Broadcast history id, when the send was a broadcast
    pub broadcast_message_id: Option<i64>,
    /// Direct recipient names that did not resolve
    pub skipped_unknown: Vec<String>,
}

/// Cleanup counters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusCleanup {
    /// Broadcast rows past TTL
    pub expired_broadcasts: usize,
    /// Registry rows past the stale timeout
    pub stale_registrations: usize,
}

// ============================================================================
// MESSAGE BUS
// ============================================================================

/// Durable message bus over `chat/chat.db`
pub struct MessageBus {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    config: BusConfig,
}

impl MessageBus {
    /// Open (creating schema if absent) and run the init cleanup pass
    pub fn open(db_path: &Path, config: BusConfig) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = Connection::open(db_path)?;
        Tier1Store::configure_connection(&writer)?;
        writer.execute_batch(SCHEMA)?;

        let reader = Connection::open(db_path)?;
        Tier1Store::configure_connection(&reader)?;

        let bus = Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            config,
        };
        bus.cleanup()?;
        Ok(bus)
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| KatraError::LockPoisoned("bus writer"))
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| KatraError::LockPoisoned("bus reader"))
    }

    // ========================================================================
    // REGISTRY
    // ========================================================================

    /// Register an agent, preserving `joined_at` and status on
    /// re-registration and always refreshing `last_seen`. New registrations
    /// are capped at `max_active_cis`.
    pub fn register(&self, ci_id: &str, name: &str, role: Option<&str>) -> Result<()> {
        if ci_id.trim().is_empty() {
            return Err(KatraError::MissingInput("ci_id"));
        }
        if name.trim().is_empty() {
            return Err(KatraError::MissingInput("name"));
        }

        let writer = self.writer()?;
        let exists: bool = writer
            .query_row(
                "SELECT 1 FROM registry WHERE ci_id = ?1",
                params![ci_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if !exists {
            let active: i64 =
                writer.query_row("SELECT COUNT(*) FROM registry", [], |row| row.get(0))?;
            if active as usize >= self.config.max_active_cis {
                return Err(KatraError::CapacityExceeded("registry"));
            }
        }

        let now = ts_to_sql(Utc::now());
        writer.execute(
            "INSERT INTO registry (ci_id, name, role, joined_at, last_seen, status)
             VALUES (?1, ?2, ?3, ?4, ?4, 'available')
             ON CONFLICT(ci_id) DO UPDATE SET
                 name = excluded.name,
                 role = excluded.role,
                 last_seen = excluded.last_seen",
            params![ci_id, name, role, now],
        )?;
        Ok(())
    }

    /// Remove an agent from the registry
    pub fn unregister(&self, ci_id: &str) -> Result<bool> {
        let changed = self
            .writer()?
            .execute("DELETE FROM registry WHERE ci_id = ?1", params![ci_id])?;
        Ok(changed > 0)
    }

    /// Refresh an agent's `last_seen`
    pub fn heartbeat(&self, ci_id: &str) -> Result<()> {
        let changed = self.writer()?.execute(
            "UPDATE registry SET last_seen = ?1 WHERE ci_id = ?2",
            params![ts_to_sql(Utc::now()), ci_id],
        )?;
        if changed == 0 {
            return Err(KatraError::NotFound(format!("agent {ci_id}")));
        }
        Ok(())
    }

    /// Update presence status (also refreshes the heartbeat)
    pub fn set_status(&self, ci_id: &str, status: AgentStatus) -> Result<()> {
        let changed = self.writer()?.execute(
            "UPDATE registry SET status = ?1, last_seen = ?2 WHERE ci_id = ?3",
            params![status.as_str(), ts_to_sql(Utc::now()), ci_id],
        )?;
        if changed == 0 {
            return Err(KatraError::NotFound(format!("agent {ci_id}")));
        }
        Ok(())
    }

    /// Read presence status
    pub fn get_status(&self, ci_id: &str) -> Result<AgentStatus> {
        let status: Option<String> = self
            .reader()?
            .query_row(
                "SELECT status FROM registry WHERE ci_id = ?1",
                params![ci_id],
                |row| row.get(0),
            )
            .optional()?;
        status
            .map(|s| AgentStatus::parse_name(&s))
            .ok_or_else(|| KatraError::NotFound(format!("agent {ci_id}")))
    }

    fn row_to_registry(row: &rusqlite::Row<'_>) -> rusqlite::Result<RegistryEntry> {
        Ok(RegistryEntry {
            ci_id: row.get(0)?,
            name: row.get(1)?,
            role: row.get(2)?,
            joined_at: ts_from_sql(&row.get::<_, String>(3)?),
            last_seen: ts_from_sql(&row.get::<_, String>(4)?),
            status: AgentStatus::parse_name(&row.get::<_, String>(5)?),
        })
    }

    /// Every registered agent
    pub fn registry(&self) -> Result<Vec<RegistryEntry>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT ci_id, name, role, joined_at, last_seen, status FROM registry
             ORDER BY joined_at, ci_id",
        )?;
        let rows = stmt.query_map([], Self::row_to_registry)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Resolve a name case-insensitively
    fn resolve_name(&self, name: &str) -> Result<Option<RegistryEntry>> {
        let reader = self.reader()?;
        let entry = reader
            .query_row(
                "SELECT ci_id, name, role, joined_at, last_seen, status FROM registry
                 WHERE LOWER(name) = LOWER(?1) ORDER BY joined_at LIMIT 1",
                params![name],
                Self::row_to_registry,
            )
            .optional()?;
        Ok(entry)
    }

    // ========================================================================
    // SENDING
    // ========================================================================

    /// Send a message.
    ///
    /// A NULL/empty/"broadcast" (case-insensitive) recipients spec fans out
    /// to every registered agent except the sender and lands in broadcast
    /// history; anything else is a comma-separated name list, resolved
    /// case-insensitively, with unknowns skipped and logged, duplicates
    /// collapsed, and the sender filtered out.
    pub fn say(
        &self,
        sender_name: &str,
        content: &str,
        recipients_spec: Option<&str>,
    ) -> Result<SayReceipt> {
        if sender_name.trim().is_empty() {
            return Err(KatraError::MissingInput("sender_name"));
        }
        if content.is_empty() {
            return Err(KatraError::MissingInput("content"));
        }
        if content.len() > self.config.max_message_length {
            return Err(KatraError::InputTooLong {
                field: "content",
                max: self.config.max_message_length,
            });
        }

        let sender = self
            .resolve_name(sender_name)?
            .ok_or_else(|| KatraError::UnknownRecipient(sender_name.to_string()))?;

        let spec = recipients_spec.map(str::trim).unwrap_or("");
        let is_broadcast = spec.is_empty() || spec.eq_ignore_ascii_case("broadcast");

        let now = Utc::now();
        if is_broadcast {
            let recipients: Vec<RegistryEntry> = self
                .registry()?
                .into_iter()
                .filter(|entry| entry.ci_id != sender.ci_id)
                .collect();

            let mut writer = self.writer()?;
            let tx = writer.transaction()?;
            tx.execute(
                "INSERT INTO broadcasts (sender_ci_id, sender_name, message, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![sender.ci_id, sender.name, content, ts_to_sql(now)],
            )?;
            let message_id = tx.last_insert_rowid();

            let mut delivered = 0;
            {
                let mut insert = tx.prepare(
                    "INSERT INTO message_queue (
                        recipient_name, recipient_ci_id, sender_ci_id, sender_name,
                        message, created_at, recipients, broadcast_message_id
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'broadcast', ?7)",
                )?;
                for recipient in &recipients {
                    insert.execute(params![
                        recipient.name,
                        recipient.ci_id,
                        sender.ci_id,
                        sender.name,
                        content,
                        ts_to_sql(now),
                        message_id,
                    ])?;
                    delivered += 1;
                }
            }
            tx.commit()?;

            return Ok(SayReceipt {
                delivered,
                broadcast_message_id: Some(message_id),
                skipped_unknown: Vec::new(),
            });
        }

        // Direct send: resolve, skip unknown, dedupe, never the sender
        let mut resolved: Vec<RegistryEntry> = Vec::new();
        let mut skipped_unknown = Vec::new();
        for raw in spec.split(',') {
            let name = raw.trim();
            if name.is_empty() {
                continue;
            }
            match self.resolve_name(name)? {
                Some(entry) => {
                    if entry.ci_id == sender.ci_id {
                        continue;
                    }
                    if !resolved.iter().any(|r| r.ci_id == entry.ci_id) {
                        resolved.push(entry);
                    }
                }
                None => {
                    tracing::warn!(recipient = name, "skipping unknown recipient");
                    skipped_unknown.push(name.to_string());
                }
            }
        }

        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        let mut delivered = 0;
        {
            let mut insert = tx.prepare(
                "INSERT INTO message_queue (
                    recipient_name, recipient_ci_id, sender_ci_id, sender_name,
                    message, created_at, recipients, broadcast_message_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL)",
            )?;
            for recipient in &resolved {
                insert.execute(params![
                    recipient.name,
                    recipient.ci_id,
                    sender.ci_id,
                    sender.name,
                    content,
                    ts_to_sql(now),
                    spec,
                ])?;
                delivered += 1;
            }
        }
        tx.commit()?;

        Ok(SayReceipt {
            delivered,
            broadcast_message_id: None,
            skipped_unknown,
        })
    }

    // ========================================================================
    // RECEIVING
    // ========================================================================

    fn row_to_queue_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueEntry> {
        Ok(QueueEntry {
            queue_id: row.get(0)?,
            recipient_name: row.get(1)?,
            recipient_ci_id: row.get(2)?,
            sender_ci_id: row.get(3)?,
            sender_name: row.get(4)?,
            message: row.get(5)?,
            timestamp: ts_from_sql(&row.get::<_, String>(6)?),
            recipients: row.get(7)?,
            broadcast_message_id: row.get(8)?,
            read_at: row.get::<_, Option<String>>(9)?.map(|s| ts_from_sql(&s)),
        })
    }

    /// Pop the oldest entry for a recipient (at-most-once: the row is gone
    /// once returned). An empty queue yields `message: None`.
    pub fn hear(&self, recipient_name: &str) -> Result<HearResult> {
        let recipient = self
            .resolve_name(recipient_name)?
            .ok_or_else(|| KatraError::UnknownRecipient(recipient_name.to_string()))?;

        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        let entry = tx
            .query_row(
                "SELECT queue_id, recipient_name, recipient_ci_id, sender_ci_id, sender_name,
                        message, created_at, recipients, broadcast_message_id, read_at
                 FROM message_queue WHERE recipient_ci_id = ?1
                 ORDER BY queue_id ASC LIMIT 1",
                params![recipient.ci_id],
                Self::row_to_queue_entry,
            )
            .optional()?;

        let mut popped = None;
        if let Some(mut entry) = entry {
            tx.execute(
                "DELETE FROM message_queue WHERE queue_id = ?1",
                params![entry.queue_id],
            )?;
            entry.read_at = Some(Utc::now());
            popped = Some(entry);
        }
        let more_available: i64 = tx.query_row(
            "SELECT COUNT(*) FROM message_queue WHERE recipient_ci_id = ?1",
            params![recipient.ci_id],
            |row| row.get(0),
        )?;
        tx.commit()?;

        Ok(HearResult {
            message: popped,
            more_available: more_available as usize,
        })
    }

    /// Atomic batch pop of up to `max_count` entries (capped by the bus
    /// `max_messages` config)
    pub fn hear_all(&self, recipient_name: &str, max_count: Option<usize>) -> Result<(Vec<QueueEntry>, usize)> {
        let recipient = self
            .resolve_name(recipient_name)?
            .ok_or_else(|| KatraError::UnknownRecipient(recipient_name.to_string()))?;
        let cap = max_count
            .unwrap_or(self.config.max_messages)
            .min(self.config.max_messages);

        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        let mut entries = {
            let mut stmt = tx.prepare(
                "SELECT queue_id, recipient_name, recipient_ci_id, sender_ci_id, sender_name,
                        message, created_at, recipients, broadcast_message_id, read_at
                 FROM message_queue WHERE recipient_ci_id = ?1
                 ORDER BY queue_id ASC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![recipient.ci_id, cap as i64], Self::row_to_queue_entry)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        let read_at = Utc::now();
        for entry in &mut entries {
            tx.execute(
                "DELETE FROM message_queue WHERE queue_id = ?1",
                params![entry.queue_id],
            )?;
            entry.read_at = Some(read_at);
        }
        let more_available: i64 = tx.query_row(
            "SELECT COUNT(*) FROM message_queue WHERE recipient_ci_id = ?1",
            params![recipient.ci_id],
            |row| row.get(0),
        )?;
        tx.commit()?;

        Ok((entries, more_available as usize))
    }

    /// Non-consuming queue depth for a recipient
    pub fn count(&self, recipient_name: &str) -> Result<usize> {
        let recipient = self
            .resolve_name(recipient_name)?
            .ok_or_else(|| KatraError::UnknownRecipient(recipient_name.to_string()))?;
        let count: i64 = self.reader()?.query_row(
            "SELECT COUNT(*) FROM message_queue WHERE recipient_ci_id = ?1",
            params![recipient.ci_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Read-only slice of broadcast history, newest first
    pub fn history(&self, count: usize) -> Result<Vec<BroadcastMessage>> {
        let cap = count.min(self.config.max_history_count);
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT message_id, sender_ci_id, sender_name, message, created_at
             FROM broadcasts ORDER BY message_id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![cap as i64], |row| {
            Ok(BroadcastMessage {
                message_id: row.get(0)?,
                sender_ci_id: row.get(1)?,
                sender_name: row.get(2)?,
                message: row.get(3)?,
                timestamp: ts_from_sql(&row.get::<_, String>(4)?),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ========================================================================
    // CLEANUP
    // ========================================================================

    /// Delete expired broadcasts and stale registrations. Runs on open and
    /// on every maintenance tick.
    pub fn cleanup(&self) -> Result<BusCleanup> {
        let broadcast_cutoff = ts_to_sql(Utc::now() - Duration::hours(self.config.message_ttl_hours));
        let stale_cutoff = ts_to_sql(Utc::now() - Duration::seconds(self.config.stale_timeout_secs));

        let writer = self.writer()?;
        let expired_broadcasts = writer.execute(
            "DELETE FROM broadcasts WHERE created_at < ?1",
            params![broadcast_cutoff],
        )?;
        let stale_registrations = writer.execute(
            "DELETE FROM registry WHERE last_seen < ?1",
            params![stale_cutoff],
        )?;
        if expired_broadcasts > 0 || stale_registrations > 0 {
            tracing::debug!(
                expired_broadcasts,
                stale_registrations,
                "bus cleanup removed rows"
            );
        }
        Ok(BusCleanup {
            expired_broadcasts,
            stale_registrations,
        })
    }

    /// Shutdown checkpoint
    pub fn checkpoint_truncate(&self) -> Result<()> {
        self.writer()?
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bus() -> (MessageBus, TempDir) {
        let dir = TempDir::new().unwrap();
        let bus = MessageBus::open(&dir.path().join("chat.db"), BusConfig::default()).unwrap();
        (bus, dir)
    }

    fn register_trio(bus: &MessageBus) {
        bus.register("ci-alice", "alice", Some("lead")).unwrap();
        bus.register("ci-bob", "bob", None).unwrap();
        bus.register("ci-carol", "carol", None).unwrap();
    }

    #[test]
    fn test_broadcast_fans_out_except_sender() {
        let (bus, _dir) = bus();
        register_trio(&bus);

        let receipt = bus.say("alice", "hello", Some("broadcast")).unwrap();
        assert_eq!(receipt.delivered, 2);
        assert!(receipt.broadcast_message_id.is_some());

        assert_eq!(bus.count("bob").unwrap(), 1);
        assert_eq!(bus.count("carol").unwrap(), 1);
        assert_eq!(bus.count("alice").unwrap(), 0);
    }

    #[test]
    fn test_empty_recipients_means_broadcast() {
        let (bus, _dir) = bus();
        register_trio(&bus);

        bus.say("alice", "hi", None).unwrap();
        bus.say("alice", "hi again", Some("")).unwrap();
        bus.say("alice", "HI", Some("BROADCAST")).unwrap();

        assert_eq!(bus.count("bob").unwrap(), 3);
        assert_eq!(bus.history(10).unwrap().len(), 3);
    }

    #[test]
    fn test_direct_send_resolves_case_insensitively() {
        let (bus, _dir) = bus();
        register_trio(&bus);

        let receipt = bus.say("alice", "ping", Some("BOB, Carol")).unwrap();
        assert_eq!(receipt.delivered, 2);
        assert!(receipt.broadcast_message_id.is_none());
        assert_eq!(bus.count("bob").unwrap(), 1);
        assert_eq!(bus.count("carol").unwrap(), 1);
    }

    #[test]
    fn test_direct_send_skips_unknown_and_dedupes_and_self_filters() {
        let (bus, _dir) = bus();
        register_trio(&bus);

        let receipt = bus
            .say("alice", "ping", Some("bob, bob, alice, mallory"))
            .unwrap();
        assert_eq!(receipt.delivered, 1);
        assert_eq!(receipt.skipped_unknown, vec!["mallory".to_string()]);
        assert_eq!(bus.count("bob").unwrap(), 1);
        assert_eq!(bus.count("alice").unwrap(), 0);
    }

    #[test]
    fn test_hear_is_fifo_and_at_most_once() {
        let (bus, _dir) = bus();
        register_trio(&bus);
        bus.say("alice", "first", Some("bob")).unwrap();
        bus.say("alice", "second", Some("bob")).unwrap();

        let before = bus.count("bob").unwrap();
        let result = bus.hear("bob").unwrap();
        let entry = result.message.unwrap();
        assert_eq!(entry.message, "first");
        assert!(entry.read_at.is_some());
        assert_eq!(result.more_available, 1);
        assert_eq!(bus.count("bob").unwrap(), before - 1);

        let result = bus.hear("bob").unwrap();
        assert_eq!(result.message.unwrap().message, "second");
        assert_eq!(result.more_available, 0);

        // Empty queue: zeroed output
        let result = bus.hear("bob").unwrap();
        assert!(result.message.is_none());
        assert_eq!(result.more_available, 0);
    }

    #[test]
    fn test_hear_all_batch_pop() {
        let (bus, _dir) = bus();
        register_trio(&bus);
        for i in 0..5 {
            bus.say("alice", &format!("msg {i}"), Some("bob")).unwrap();
        }

        let (entries, more) = bus.hear_all("bob", Some(3)).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "msg 0");
        assert_eq!(more, 2);

        let (entries, more) = bus.hear_all("bob", None).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(more, 0);
    }

    #[test]
    fn test_queue_carries_broadcast_id() {
        let (bus, _dir) = bus();
        register_trio(&bus);
        let receipt = bus.say("alice", "announce", None).unwrap();

        let entry = bus.hear("bob").unwrap().message.unwrap();
        assert_eq!(entry.broadcast_message_id, receipt.broadcast_message_id);
        assert_eq!(entry.recipients, "broadcast");
    }

    #[test]
    fn test_message_length_cap() {
        let (bus, _dir) = bus();
        register_trio(&bus);
        let long = "x".repeat(2000);
        let err = bus.say("alice", &long, None).unwrap_err();
        assert!(matches!(err, KatraError::InputTooLong { .. }));
    }

    #[test]
    fn test_unregistered_sender_rejected() {
        let (bus, _dir) = bus();
        let err = bus.say("ghost", "boo", None).unwrap_err();
        assert!(matches!(err, KatraError::UnknownRecipient(_)));
    }

    #[test]
    fn test_register_preserves_joined_at_and_status() {
        let (bus, _dir) = bus();
        bus.register("ci-alice", "alice", None).unwrap();
        bus.set_status("ci-alice", AgentStatus::Busy).unwrap();
        let before = bus.registry().unwrap()[0].clone();

        bus.register("ci-alice", "alice-renamed", Some("lead")).unwrap();
        let after = bus.registry().unwrap()[0].clone();
        assert_eq!(after.joined_at, before.joined_at);
        assert_eq!(after.status, AgentStatus::Busy);
        assert_eq!(after.name, "alice-renamed");
        assert!(after.last_seen >= before.last_seen);
    }

    #[test]
    fn test_registry_capacity() {
        let dir = TempDir::new().unwrap();
        let bus = MessageBus::open(
            &dir.path().join("chat.db"),
            BusConfig {
                max_active_cis: 2,
                ..Default::default()
            },
        )
        .unwrap();

        bus.register("ci-1", "one", None).unwrap();
        bus.register("ci-2", "two", None).unwrap();
        let err = bus.register("ci-3", "three", None).unwrap_err();
        assert!(matches!(err, KatraError::CapacityExceeded("registry")));
        // Re-registration of an existing ci always succeeds
        bus.register("ci-1", "one", None).unwrap();
    }

    #[test]
    fn test_status_roundtrip() {
        let (bus, _dir) = bus();
        bus.register("ci-alice", "alice", None).unwrap();
        assert_eq!(bus.get_status("ci-alice").unwrap(), AgentStatus::Available);
        bus.set_status("ci-alice", AgentStatus::DoNotDisturb).unwrap();
        assert_eq!(bus.get_status("ci-alice").unwrap(), AgentStatus::DoNotDisturb);
        assert!(bus.get_status("ghost").is_err());
    }

    #[test]
    fn test_history_is_newest_first_and_capped() {
        let (bus, _dir) = bus();
        register_trio(&bus);
        for i in 0..5 {
            bus.say("alice", &format!("b{i}"), None).unwrap();
        }

        let history = bus.history(3).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].message, "b4");
        assert!(history[0].message_id > history[1].message_id);
    }

    #[test]
    fn test_cleanup_expires_stale_state() {
        let dir = TempDir::new().unwrap();
        let bus = MessageBus::open(
            &dir.path().join("chat.db"),
            BusConfig {
                message_ttl_hours: 0,
                stale_timeout_secs: 0,
                ..Default::default()
            },
        )
        .unwrap();
        bus.register("ci-alice", "alice", None).unwrap();
        bus.register("ci-bob", "bob", None).unwrap();
        bus.say("alice", "soon gone", None).unwrap();

        let cleanup = bus.cleanup().unwrap();
        assert_eq!(cleanup.expired_broadcasts, 1);
        assert_eq!(cleanup.stale_registrations, 2);
        assert!(bus.history(10).unwrap().is_empty());
        assert!(bus.registry().unwrap().is_empty());
    }

    #[test]
    fn test_unregister() {
        let (bus, _dir) = bus();
        bus.register("ci-alice", "alice", None).unwrap();
        assert!(bus.unregister("ci-alice").unwrap());
        assert!(!bus.unregister("ci-alice").unwrap());
    }
}
