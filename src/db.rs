use crate::support::{TicketCategory, TicketPriority, TicketStatus};
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

/// Fixed-width RFC 3339 so text ordering matches time ordering.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn from_str(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Conversation {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub agent_id: Option<String>,   // set on assistant rows
    pub content: String,
    pub timestamp: String,
}

/// One completed user/assistant exchange, kept as improvement material.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConversationLog {
    pub id: String,
    pub agent_id: String,
    pub conversation_id: String,
    pub message_id: String,          // assistant message
    pub user_message: String,
    pub assistant_response: String,
    pub rating: Option<u8>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Feedback {
    pub id: String,
    pub agent_id: String,
    pub message_id: String,
    pub rating: u8,                  // 1-5
    pub feedback_text: Option<String>,
    pub original_response: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Improvement {
    pub id: String,
    pub agent_id: String,
    pub original_prompt: String,
    pub improved_prompt: String,
    pub improvement_reason: String,
    pub avg_rating_before: Option<f64>,
    pub feedback_count: i64,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Ticket {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub assigned_agent: Option<String>,
    pub conversation_id: Option<String>,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    pub resolved_at: Option<String>,
}

const SCHEMA: &str = "
    -- Chat sessions
    CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    -- Transcript, append-only
    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL,
        role TEXT NOT NULL,
        agent_id TEXT,
        content TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        FOREIGN KEY (conversation_id) REFERENCES conversations(id)
    );

    -- Completed exchanges per agent
    CREATE TABLE IF NOT EXISTS conversation_logs (
        id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        conversation_id TEXT NOT NULL,
        message_id TEXT NOT NULL,
        user_message TEXT NOT NULL,
        assistant_response TEXT NOT NULL,
        rating INTEGER,
        created_at TEXT NOT NULL
    );

    -- Ratings on assistant messages
    CREATE TABLE IF NOT EXISTS agent_feedback (
        id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        message_id TEXT NOT NULL,
        rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
        feedback_text TEXT,
        original_response TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    -- Candidate prompts generated from feedback
    CREATE TABLE IF NOT EXISTS agent_improvements (
        id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        original_prompt TEXT NOT NULL,
        improved_prompt TEXT NOT NULL,
        improvement_reason TEXT NOT NULL,
        avg_rating_before REAL,
        feedback_count INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    -- Support tickets (tags is a JSON array)
    CREATE TABLE IF NOT EXISTS support_tickets (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        category TEXT NOT NULL,
        priority TEXT NOT NULL,
        status TEXT NOT NULL,
        assigned_agent TEXT,
        conversation_id TEXT,
        tags TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        resolved_at TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_feedback_agent ON agent_feedback(agent_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_logs_agent ON conversation_logs(agent_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_improvements_agent ON agent_improvements(agent_id, created_at);
";

/// SQLite store. One connection guarded by a mutex; the owning session is the only writer.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut conn)
    }

    // ============ Conversations ============

    pub fn create_conversation(&self, id: &str) -> Result<Conversation> {
        let now = now_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, created_at, updated_at) VALUES (?1, ?2, ?3)",
                params![id, now, now],
            )?;
            Ok(Conversation {
                id: id.to_string(),
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT id, created_at, updated_at FROM conversations WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Conversation {
                        id: row.get(0)?,
                        created_at: row.get(1)?,
                        updated_at: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    // ============ Messages ============

    pub fn save_message(&self, message: &Message) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, role, agent_id, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id,
                    message.conversation_id,
                    message.role.as_str(),
                    message.agent_id,
                    message.content,
                    message.timestamp
                ],
            )?;

            conn.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                params![now_rfc3339(), message.conversation_id],
            )?;
            Ok(())
        })
    }

    pub fn get_conversation_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, agent_id, content, timestamp
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY timestamp ASC, rowid ASC",
            )?;
            let messages = stmt.query_map(params![conversation_id], message_from_row)?;
            messages.collect()
        })
    }

    /// Last `limit` messages of a conversation, oldest first.
    pub fn get_recent_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, agent_id, content, timestamp
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY timestamp DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let messages = stmt.query_map(params![conversation_id, limit as i64], message_from_row)?;
            let mut result: Vec<Message> = messages.collect::<Result<Vec<_>>>()?;
            result.reverse();
            Ok(result)
        })
    }

    // ============ Conversation Logs ============

    pub fn save_conversation_log(&self, log: &ConversationLog) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO conversation_logs (id, agent_id, conversation_id, message_id, user_message, assistant_response, rating, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    log.id,
                    log.agent_id,
                    log.conversation_id,
                    log.message_id,
                    log.user_message,
                    log.assistant_response,
                    log.rating,
                    log.created_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_recent_logs(&self, agent_id: &str, limit: usize) -> Result<Vec<ConversationLog>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, agent_id, conversation_id, message_id, user_message, assistant_response, rating, created_at
                 FROM conversation_logs
                 WHERE agent_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let logs = stmt.query_map(params![agent_id, limit as i64], |row| {
                Ok(ConversationLog {
                    id: row.get(0)?,
                    agent_id: row.get(1)?,
                    conversation_id: row.get(2)?,
                    message_id: row.get(3)?,
                    user_message: row.get(4)?,
                    assistant_response: row.get(5)?,
                    rating: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })?;
            logs.collect()
        })
    }

    pub fn count_logs(&self, agent_id: &str) -> Result<i64> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM conversation_logs WHERE agent_id = ?1",
                params![agent_id],
                |row| row.get(0),
            )
        })
    }

    /// Stamp a rating onto the log of the given assistant message. Returns rows touched.
    pub fn set_log_rating(&self, message_id: &str, rating: u8) -> Result<usize> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE conversation_logs SET rating = ?1 WHERE message_id = ?2",
                params![rating, message_id],
            )
        })
    }

    // ============ Feedback ============

    pub fn save_feedback(&self, feedback: &Feedback) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO agent_feedback (id, agent_id, message_id, rating, feedback_text, original_response, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    feedback.id,
                    feedback.agent_id,
                    feedback.message_id,
                    feedback.rating,
                    feedback.feedback_text,
                    feedback.original_response,
                    feedback.created_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_recent_feedback(&self, agent_id: &str, limit: usize) -> Result<Vec<Feedback>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, agent_id, message_id, rating, feedback_text, original_response, created_at
                 FROM agent_feedback
                 WHERE agent_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![agent_id, limit as i64], |row| {
                Ok(Feedback {
                    id: row.get(0)?,
                    agent_id: row.get(1)?,
                    message_id: row.get(2)?,
                    rating: row.get(3)?,
                    feedback_text: row.get(4)?,
                    original_response: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?;
            rows.collect()
        })
    }

    /// Every rating ever given to an agent.
    pub fn get_all_ratings(&self, agent_id: &str) -> Result<Vec<u8>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT rating FROM agent_feedback WHERE agent_id = ?1")?;
            let ratings = stmt.query_map(params![agent_id], |row| row.get(0))?;
            ratings.collect()
        })
    }

    // ============ Improvements ============

    pub fn save_improvement(&self, improvement: &Improvement) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO agent_improvements (id, agent_id, original_prompt, improved_prompt, improvement_reason, avg_rating_before, feedback_count, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    improvement.id,
                    improvement.agent_id,
                    improvement.original_prompt,
                    improvement.improved_prompt,
                    improvement.improvement_reason,
                    improvement.avg_rating_before,
                    improvement.feedback_count,
                    improvement.is_active as i64,
                    improvement.created_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_improvement(&self, id: &str) -> Result<Option<Improvement>> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM agent_improvements WHERE id = ?1", IMPROVEMENT_COLUMNS),
                params![id],
                improvement_from_row,
            )
            .optional()
        })
    }

    pub fn get_recent_improvements(&self, agent_id: &str, limit: usize) -> Result<Vec<Improvement>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM agent_improvements WHERE agent_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
                IMPROVEMENT_COLUMNS
            ))?;
            let rows = stmt.query_map(params![agent_id, limit as i64], improvement_from_row)?;
            rows.collect()
        })
    }

    pub fn get_active_improvement(&self, agent_id: &str) -> Result<Option<Improvement>> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM agent_improvements WHERE agent_id = ?1 AND is_active = 1 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                    IMPROVEMENT_COLUMNS
                ),
                params![agent_id],
                improvement_from_row,
            )
            .optional()
        })
    }

    /// Deactivate every improvement of the agent, then activate `improvement_id`.
    /// Returns false (and changes nothing) when the id does not belong to the agent.
    pub fn activate_improvement(&self, agent_id: &str, improvement_id: &str) -> Result<bool> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let belongs: bool = tx.query_row(
                "SELECT COUNT(*) FROM agent_improvements WHERE id = ?1 AND agent_id = ?2",
                params![improvement_id, agent_id],
                |row| Ok(row.get::<_, i64>(0)? > 0),
            )?;
            if !belongs {
                return Ok(false);
            }

            tx.execute(
                "UPDATE agent_improvements SET is_active = 0 WHERE agent_id = ?1",
                params![agent_id],
            )?;
            tx.execute(
                "UPDATE agent_improvements SET is_active = 1 WHERE id = ?1",
                params![improvement_id],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn deactivate_improvements(&self, agent_id: &str) -> Result<usize> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE agent_improvements SET is_active = 0 WHERE agent_id = ?1",
                params![agent_id],
            )
        })
    }

    // ============ Support Tickets ============

    pub fn save_ticket(&self, ticket: &Ticket) -> Result<()> {
        let tags = serde_json::to_string(&ticket.tags)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO support_tickets (id, title, description, category, priority, status, assigned_agent, conversation_id, tags, created_at, updated_at, resolved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    ticket.id,
                    ticket.title,
                    ticket.description,
                    ticket.category.as_str(),
                    ticket.priority.as_str(),
                    ticket.status.as_str(),
                    ticket.assigned_agent,
                    ticket.conversation_id,
                    tags,
                    ticket.created_at,
                    ticket.updated_at,
                    ticket.resolved_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_ticket(&self, id: &str) -> Result<Option<Ticket>> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM support_tickets WHERE id = ?1", TICKET_COLUMNS),
                params![id],
                ticket_from_row,
            )
            .optional()
        })
    }

    pub fn get_recent_tickets(&self, limit: usize) -> Result<Vec<Ticket>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM support_tickets ORDER BY created_at DESC, rowid DESC LIMIT ?1",
                TICKET_COLUMNS
            ))?;
            let rows = stmt.query_map(params![limit as i64], ticket_from_row)?;
            rows.collect()
        })
    }

    pub fn update_ticket_assignment(&self, id: &str, assigned_agent: &str) -> Result<usize> {
        let now = now_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE support_tickets SET assigned_agent = ?1, updated_at = ?2 WHERE id = ?3",
                params![assigned_agent, now, id],
            )
        })
    }

    /// Write a new status. `resolved_at` is only written when provided.
    pub fn update_ticket_status(
        &self,
        id: &str,
        status: TicketStatus,
        updated_at: &str,
        resolved_at: Option<&str>,
    ) -> Result<usize> {
        self.with_connection(|conn| {
            match resolved_at {
                Some(resolved) => conn.execute(
                    "UPDATE support_tickets SET status = ?1, updated_at = ?2, resolved_at = ?3 WHERE id = ?4",
                    params![status.as_str(), updated_at, resolved, id],
                ),
                None => conn.execute(
                    "UPDATE support_tickets SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    params![status.as_str(), updated_at, id],
                ),
            }
        })
    }
}

const IMPROVEMENT_COLUMNS: &str =
    "id, agent_id, original_prompt, improved_prompt, improvement_reason, avg_rating_before, feedback_count, is_active, created_at";

const TICKET_COLUMNS: &str =
    "id, title, description, category, priority, status, assigned_agent, conversation_id, tags, created_at, updated_at, resolved_at";

fn message_from_row(row: &Row<'_>) -> Result<Message> {
    let role: String = row.get(2)?;
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: Role::from_str(&role).unwrap_or(Role::User),
        agent_id: row.get(3)?,
        content: row.get(4)?,
        timestamp: row.get(5)?,
    })
}

fn improvement_from_row(row: &Row<'_>) -> Result<Improvement> {
    Ok(Improvement {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        original_prompt: row.get(2)?,
        improved_prompt: row.get(3)?,
        improvement_reason: row.get(4)?,
        avg_rating_before: row.get(5)?,
        feedback_count: row.get(6)?,
        is_active: row.get::<_, i64>(7)? != 0,
        created_at: row.get(8)?,
    })
}

fn ticket_from_row(row: &Row<'_>) -> Result<Ticket> {
    let category: String = row.get(3)?;
    let priority: String = row.get(4)?;
    let status: String = row.get(5)?;
    let tags: String = row.get(8)?;
    Ok(Ticket {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: TicketCategory::from_str(&category).unwrap_or_default(),
        priority: TicketPriority::from_str(&priority).unwrap_or_default(),
        status: TicketStatus::from_str(&status).unwrap_or_default(),
        assigned_agent: row.get(6)?,
        conversation_id: row.get(7)?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        resolved_at: row.get(11)?,
    })
}
