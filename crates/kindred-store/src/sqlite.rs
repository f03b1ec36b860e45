use std::sync::Mutex;

use async_trait::async_trait;
use kindred_core::{BotId, KnappStage, MessageRole, UserId};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::cache::StateCache;
use crate::error::Result;
use crate::store::{term_hits, tokenize, Store};
use crate::types::{
    Assets, Bot, ClearCounts, DerivedNote, MoodState, NewNote, NewTranscript, NoteType,
    RelationshipDimensions, ScoredHit, SptInfo, State, StoredMessage, Transcript, User,
};

/// SQLite-backed `Store`. One connection behind a mutex, mirroring the
/// teacher's `MemoryManager` — this workload is small enough per bot/user
/// pair that connection pooling isn't worth the complexity.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    cache: Mutex<StateCache<State>>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
        crate::db::init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            cache: Mutex::new(StateCache::new()),
        })
    }

    /// A fresh, single-connection in-memory database. Only safe for tests —
    /// a second connection to `:memory:` would see an empty database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        crate::db::init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            cache: Mutex::new(StateCache::new()),
        })
    }

    fn ensure_bot(conn: &Connection, bot_id: &BotId) -> Result<Bot> {
        let existing: Option<Bot> = conn
            .query_row(
                "SELECT id, name, basic_info, big_five, persona, character_sidewrite,
                        backlog_tasks, created_at
                 FROM bots WHERE id = ?1",
                params![bot_id.as_str()],
                row_to_bot,
            )
            .optional()?;
        if let Some(bot) = existing {
            return Ok(bot);
        }

        let profile = kindred_profile::generate_bot_profile(bot_id.as_str());
        let now = now_iso();
        let big_five_json = serde_json::to_string(&profile.big_five)?;
        let basic_info_json = serde_json::to_string(&profile.basic_info)?;
        let persona_json = serde_json::to_string(&profile.persona)?;
        conn.execute(
            "INSERT INTO bots (id, name, basic_info, big_five, persona, character_sidewrite,
                                backlog_tasks, created_at)
             VALUES (?1, ?1, ?2, ?3, ?4, '', '[]', ?5)",
            params![bot_id.as_str(), basic_info_json, big_five_json, persona_json, now],
        )?;
        Ok(Bot {
            id: bot_id.clone(),
            name: bot_id.as_str().to_string(),
            basic_info: profile.basic_info,
            big_five: profile.big_five,
            persona: profile.persona,
            character_sidewrite: String::new(),
            backlog_tasks: Vec::new(),
            created_at: now,
        })
    }

    fn ensure_user(conn: &Connection, bot_id: &BotId, external_id: &str) -> Result<User> {
        let existing: Option<User> = conn
            .query_row(
                "SELECT id, bot_id, external_id, basic_info, current_stage, dimensions,
                        mood_state, inferred_profile, assets, spt_info, conversation_summary,
                        created_at, updated_at
                 FROM users WHERE bot_id = ?1 AND external_id = ?2",
                params![bot_id.as_str(), external_id],
                row_to_user,
            )
            .optional()?;
        if let Some(user) = existing {
            return Ok(user);
        }

        let profile = kindred_profile::generate_user_profile(external_id);
        let now = now_iso();
        let id = UserId::new();
        let dimensions = RelationshipDimensions::default();
        let mood = MoodState::default();
        let assets = Assets::default();
        let spt = SptInfo::default();
        conn.execute(
            "INSERT INTO users (id, bot_id, external_id, basic_info, current_stage, dimensions,
                                 mood_state, inferred_profile, assets, spt_info,
                                 conversation_summary, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, '', ?11, ?11)",
            params![
                id.as_str(),
                bot_id.as_str(),
                external_id,
                serde_json::to_string(&profile.basic_info)?,
                KnappStage::default().to_string(),
                serde_json::to_string(&dimensions)?,
                serde_json::to_string(&mood)?,
                serde_json::to_string(&profile.inferred_profile)?,
                serde_json::to_string(&assets)?,
                serde_json::to_string(&spt)?,
                now,
            ],
        )?;
        Ok(User {
            id,
            bot_id: bot_id.clone(),
            external_id: external_id.to_string(),
            basic_info: profile.basic_info,
            current_stage: KnappStage::default(),
            dimensions,
            mood_state: mood,
            inferred_profile: profile.inferred_profile,
            assets,
            spt_info: spt,
            conversation_summary: String::new(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    fn recent_messages(conn: &Connection, user_id: &UserId) -> Result<Vec<StoredMessage>> {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, role, content, metadata, created_at
             FROM messages WHERE user_id = ?1
             ORDER BY id DESC LIMIT 20",
        )?;
        let mut rows: Vec<StoredMessage> = stmt
            .query_map(params![user_id.as_str()], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.reverse();
        rows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.role.order().cmp(&b.role.order()))
                .then(a.id.cmp(&b.id))
        });
        Ok(rows)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn load_state(&self, bot_id: &BotId, external_id: &str) -> Result<State> {
        if let Some(cached) = self
            .cache
            .lock()
            .unwrap()
            .get(bot_id.as_str(), external_id)
        {
            return Ok(cached);
        }

        let conn = self.conn.lock().unwrap();
        let bot = Self::ensure_bot(&conn, bot_id)?;
        let user = Self::ensure_user(&conn, bot_id, external_id)?;
        let recent_messages = Self::recent_messages(&conn, &user.id)?;
        let state = State {
            bot,
            user,
            recent_messages,
        };

        self.cache
            .lock()
            .unwrap()
            .put(bot_id.as_str(), external_id, state.clone());
        Ok(state)
    }

    async fn save_turn(
        &self,
        bot_id: &BotId,
        external_id: &str,
        user_text: &str,
        ai_text: &str,
        updated_user: &User,
        new_memory: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let now = now_iso();

        tx.execute(
            "INSERT INTO messages (user_id, role, content, metadata, created_at)
             VALUES (?1, ?2, ?3, '{}', ?4)",
            params![updated_user.id.as_str(), MessageRole::User.to_string(), user_text, now],
        )?;
        tx.execute(
            "INSERT INTO messages (user_id, role, content, metadata, created_at)
             VALUES (?1, ?2, ?3, '{}', ?4)",
            params![updated_user.id.as_str(), MessageRole::Ai.to_string(), ai_text, now],
        )?;
        if let Some(memory) = new_memory {
            tx.execute(
                "INSERT INTO memories (user_id, content, created_at) VALUES (?1, ?2, ?3)",
                params![updated_user.id.as_str(), memory, now],
            )?;
        }

        let persisted_dims_json: String = tx.query_row(
            "SELECT dimensions FROM users WHERE id = ?1",
            params![updated_user.id.as_str()],
            |row| row.get(0),
        )?;
        let persisted_dims: RelationshipDimensions =
            serde_json::from_str(&persisted_dims_json)?;
        let clamped = clamp_dimensions(&persisted_dims, &updated_user.dimensions);

        tx.execute(
            "UPDATE users SET current_stage = ?1, dimensions = ?2, mood_state = ?3,
                               inferred_profile = ?4, assets = ?5, spt_info = ?6,
                               conversation_summary = ?7, basic_info = ?8, updated_at = ?9
             WHERE id = ?10",
            params![
                updated_user.current_stage.to_string(),
                serde_json::to_string(&clamped)?,
                serde_json::to_string(&updated_user.mood_state)?,
                serde_json::to_string(&updated_user.inferred_profile)?,
                serde_json::to_string(&updated_user.assets)?,
                serde_json::to_string(&updated_user.spt_info)?,
                updated_user.conversation_summary,
                serde_json::to_string(&updated_user.basic_info)?,
                now,
                updated_user.id.as_str(),
            ],
        )?;
        tx.commit()?;
        drop(conn);

        self.cache
            .lock()
            .unwrap()
            .invalidate(bot_id.as_str(), external_id);
        Ok(())
    }

    async fn append_transcript(&self, transcript: NewTranscript) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let now = now_iso();
        conn.execute(
            "INSERT INTO transcripts (user_id, session_id, thread_id, turn_index, user_text,
                                       bot_text, entities, topic, importance, short_context,
                                       created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                transcript.user_id.as_str(),
                transcript.session_id,
                transcript.thread_id,
                transcript.turn_index,
                transcript.user_text,
                transcript.bot_text,
                serde_json::to_string(&transcript.entities)?,
                transcript.topic,
                transcript.importance,
                transcript.short_context,
                now,
            ],
        )?;
        let rowid = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO transcripts_fts(rowid, user_text, bot_text) VALUES (?1, ?2, ?3)",
            params![rowid, transcript.user_text, transcript.bot_text],
        )?;
        Ok(rowid)
    }

    async fn append_notes(
        &self,
        user_id: &UserId,
        transcript_id: i64,
        notes: Vec<NewNote>,
    ) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let now = now_iso();
        let mut inserted = 0usize;
        for note in notes {
            conn.execute(
                "INSERT INTO derived_notes (user_id, transcript_id, note_type, content,
                                             importance, source_pointer, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user_id.as_str(),
                    transcript_id,
                    note_type_str(note.note_type),
                    note.content,
                    note.importance,
                    note.source_pointer,
                    now,
                ],
            )?;
            let rowid = conn.last_insert_rowid();
            conn.execute(
                "INSERT INTO derived_notes_fts(rowid, content) VALUES (?1, ?2)",
                params![rowid, note.content],
            )?;
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn search_transcripts(
        &self,
        user_id: &UserId,
        query: &str,
        limit: usize,
        scan_limit: usize,
    ) -> Result<Vec<ScoredHit<Transcript>>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, session_id, thread_id, turn_index, user_text, bot_text,
                    entities, topic, importance, short_context, created_at
             FROM transcripts WHERE user_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let rows: Vec<Transcript> = stmt
            .query_map(params![user_id.as_str(), scan_limit as i64], row_to_transcript)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let tokens = tokenize(query);
        let mut hits: Vec<ScoredHit<Transcript>> = rows
            .into_iter()
            .filter_map(|t| {
                let haystack = format!(
                    "{} {} {}",
                    t.user_text,
                    t.bot_text,
                    t.topic.clone().unwrap_or_default()
                );
                let hits = term_hits(&tokens, &haystack);
                if hits == 0 {
                    return None;
                }
                let score = hits as f64 + t.importance.unwrap_or(0.0);
                Some(ScoredHit { item: t, score })
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        hits.truncate(limit);
        Ok(hits)
    }

    async fn search_notes(
        &self,
        user_id: &UserId,
        query: &str,
        limit: usize,
        scan_limit: usize,
    ) -> Result<Vec<ScoredHit<DerivedNote>>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, transcript_id, note_type, content, importance, source_pointer,
                    created_at
             FROM derived_notes WHERE user_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let rows: Vec<DerivedNote> = stmt
            .query_map(params![user_id.as_str(), scan_limit as i64], row_to_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let tokens = tokenize(query);
        let mut hits: Vec<ScoredHit<DerivedNote>> = rows
            .into_iter()
            .filter_map(|n| {
                let hits = term_hits(&tokens, &n.content);
                if hits == 0 {
                    return None;
                }
                let score = hits as f64 + n.importance.unwrap_or(0.0) + 0.5;
                Some(ScoredHit { item: n, score })
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        hits.truncate(limit);
        Ok(hits)
    }

    async fn clear_all_memory_for(
        &self,
        bot_id: &BotId,
        external_id: &str,
        reset_profile: bool,
    ) -> Result<ClearCounts> {
        let conn = self.conn.lock().unwrap();
        let user_id: Option<String> = conn
            .query_row(
                "SELECT id FROM users WHERE bot_id = ?1 AND external_id = ?2",
                params![bot_id.as_str(), external_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(user_id) = user_id else {
            return Ok(ClearCounts::default());
        };

        let tx = conn.unchecked_transaction()?;
        let messages = tx.execute(
            "DELETE FROM messages WHERE user_id = ?1",
            params![user_id],
        )?;
        let memories = tx.execute(
            "DELETE FROM memories WHERE user_id = ?1",
            params![user_id],
        )?;

        // External-content FTS5 tables need the old column values to retire
        // a row (the `'delete'` command, not a plain DELETE), so collect
        // those before the base-table rows disappear underneath them.
        let doomed_transcripts: Vec<(i64, String, String)> = {
            let mut stmt = tx.prepare("SELECT id, user_text, bot_text FROM transcripts WHERE user_id = ?1")?;
            stmt.query_map(params![user_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        for (id, user_text, bot_text) in &doomed_transcripts {
            tx.execute(
                "INSERT INTO transcripts_fts(transcripts_fts, rowid, user_text, bot_text) VALUES ('delete', ?1, ?2, ?3)",
                params![id, user_text, bot_text],
            )?;
        }
        let doomed_notes: Vec<(i64, String)> = {
            let mut stmt = tx.prepare("SELECT id, content FROM derived_notes WHERE user_id = ?1")?;
            stmt.query_map(params![user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        for (id, content) in &doomed_notes {
            tx.execute(
                "INSERT INTO derived_notes_fts(derived_notes_fts, rowid, content) VALUES ('delete', ?1, ?2)",
                params![id, content],
            )?;
        }

        let transcripts = tx.execute(
            "DELETE FROM transcripts WHERE user_id = ?1",
            params![user_id],
        )?;
        let derived_notes = tx.execute(
            "DELETE FROM derived_notes WHERE user_id = ?1",
            params![user_id],
        )?;
        if reset_profile {
            tx.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
        }
        tx.commit()?;
        drop(conn);

        self.cache
            .lock()
            .unwrap()
            .invalidate(bot_id.as_str(), external_id);
        Ok(ClearCounts {
            messages: messages as usize,
            memories: memories as usize,
            transcripts: transcripts as usize,
            derived_notes: derived_notes as usize,
        })
    }
}

/// Clamp the incoming `proposed` dimensions to at most `|delta| = 0.20` away
/// from `persisted`, logging one `DimensionAudit`-shaped event per dimension.
/// This runs in the store as a defense-in-depth backstop — the evolver is
/// expected to have already bounded its own deltas.
fn clamp_dimensions(
    persisted: &RelationshipDimensions,
    proposed: &RelationshipDimensions,
) -> RelationshipDimensions {
    let persisted = persisted.normalized();
    let proposed = proposed.normalized();
    let mut result = persisted;
    for (name, old) in persisted.as_pairs() {
        let target = proposed.as_pairs().into_iter().find(|(n, _)| *n == name).unwrap().1;
        let delta = (target - old).clamp(-0.20, 0.20);
        let new = (old + delta).clamp(0.0, 1.0);
        tracing::info!(dimension = name, old, new, delta, "dimension_update");
        result = RelationshipDimensions::from_pairs(set_pair(result.as_pairs(), name, new));
    }
    result
}

fn set_pair(mut pairs: [(&'static str, f64); 6], name: &str, value: f64) -> [(&'static str, f64); 6] {
    for p in pairs.iter_mut() {
        if p.0 == name {
            p.1 = value;
        }
    }
    pairs
}

fn note_type_str(nt: NoteType) -> &'static str {
    match nt {
        NoteType::Fact => "fact",
        NoteType::Preference => "preference",
        NoteType::Activity => "activity",
        NoteType::Decision => "decision",
        NoteType::Other => "other",
    }
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn row_to_bot(row: &Row) -> rusqlite::Result<Bot> {
    let big_five_json: String = row.get(3)?;
    let basic_info_json: String = row.get(2)?;
    let persona_json: String = row.get(4)?;
    let backlog_json: String = row.get(6)?;
    Ok(Bot {
        id: BotId::from(row.get::<_, String>(0)?),
        name: row.get(1)?,
        basic_info: serde_json::from_str(&basic_info_json).unwrap_or_default(),
        big_five: serde_json::from_str::<Vec<f64>>(&big_five_json)
            .ok()
            .and_then(|v| v.try_into().ok())
            .unwrap_or([0.0; 5]),
        persona: serde_json::from_str(&persona_json).unwrap_or_default(),
        character_sidewrite: row.get(5)?,
        backlog_tasks: serde_json::from_str(&backlog_json).unwrap_or_default(),
        created_at: row.get(7)?,
    })
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    let basic_info_json: String = row.get(3)?;
    let stage_str: String = row.get(4)?;
    let dims_json: String = row.get(5)?;
    let mood_json: String = row.get(6)?;
    let inferred_json: String = row.get(7)?;
    let assets_json: String = row.get(8)?;
    let spt_json: String = row.get(9)?;
    Ok(User {
        id: UserId::from(row.get::<_, String>(0)?),
        bot_id: BotId::from(row.get::<_, String>(1)?),
        external_id: row.get(2)?,
        basic_info: serde_json::from_str(&basic_info_json).unwrap_or_default(),
        current_stage: stage_str.parse::<KnappStage>().unwrap_or_default(),
        dimensions: serde_json::from_str::<RelationshipDimensions>(&dims_json)
            .unwrap_or_default()
            .normalized(),
        mood_state: serde_json::from_str(&mood_json).unwrap_or_default(),
        inferred_profile: serde_json::from_str(&inferred_json).unwrap_or_default(),
        assets: serde_json::from_str(&assets_json).unwrap_or_default(),
        spt_info: serde_json::from_str(&spt_json).unwrap_or_default(),
        conversation_summary: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn row_to_message(row: &Row) -> rusqlite::Result<StoredMessage> {
    let role_str: String = row.get(2)?;
    let meta_json: String = row.get(4)?;
    Ok(StoredMessage {
        id: row.get(0)?,
        user_id: UserId::from(row.get::<_, String>(1)?),
        role: role_str.parse::<MessageRole>().unwrap_or(MessageRole::User),
        content: row.get(3)?,
        meta: serde_json::from_str(&meta_json).unwrap_or_default(),
        created_at: row.get(5)?,
    })
}

fn row_to_transcript(row: &Row) -> rusqlite::Result<Transcript> {
    let entities_json: String = row.get(7)?;
    Ok(Transcript {
        id: row.get(0)?,
        user_id: UserId::from(row.get::<_, String>(1)?),
        session_id: row.get(2)?,
        thread_id: row.get(3)?,
        turn_index: row.get(4)?,
        user_text: row.get(5)?,
        bot_text: row.get(6)?,
        entities: serde_json::from_str(&entities_json).unwrap_or_default(),
        topic: row.get(8)?,
        importance: row.get(9)?,
        short_context: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn row_to_note(row: &Row) -> rusqlite::Result<DerivedNote> {
    let note_type_str: String = row.get(3)?;
    let note_type = match note_type_str.as_str() {
        "fact" => NoteType::Fact,
        "preference" => NoteType::Preference,
        "activity" => NoteType::Activity,
        "decision" => NoteType::Decision,
        _ => NoteType::Other,
    };
    Ok(DerivedNote {
        id: row.get(0)?,
        user_id: UserId::from(row.get::<_, String>(1)?),
        transcript_id: row.get(2)?,
        note_type,
        content: row.get(4)?,
        importance: row.get(5)?,
        source_pointer: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_core::BotId;

    fn ids() -> (BotId, &'static str) {
        (BotId::from("bot-test"), "ext-user-1")
    }

    #[tokio::test]
    async fn load_state_creates_idempotently() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (bot_id, external_id) = ids();

        let first = store.load_state(&bot_id, external_id).await.unwrap();
        let second = store.load_state(&bot_id, external_id).await.unwrap();
        assert_eq!(first.user.id, second.user.id);
        assert_eq!(first.bot.id, second.bot.id);
        assert!(first.recent_messages.is_empty());
    }

    #[tokio::test]
    async fn save_turn_persists_messages_and_clamps_dimensions() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (bot_id, external_id) = ids();
        let state = store.load_state(&bot_id, external_id).await.unwrap();

        let mut updated = state.user.clone();
        updated.dimensions.trust = 1.0; // far beyond the 0.20 per-turn clamp

        store
            .save_turn(&bot_id, external_id, "hi there", "hello!", &updated, None)
            .await
            .unwrap();

        let reloaded = store.load_state(&bot_id, external_id).await.unwrap();
        assert_eq!(reloaded.recent_messages.len(), 2);
        assert!((reloaded.user.dimensions.trust - (0.3 + 0.20)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn search_transcripts_scores_term_hits_plus_importance() {
        let store = SqliteStore::open_in_memory().unwrap();
        let user_id = UserId::new();
        store
            .append_transcript(NewTranscript {
                user_id: user_id.clone(),
                session_id: None,
                thread_id: None,
                turn_index: Some(1),
                user_text: "I love hiking on weekends".into(),
                bot_text: "that sounds fun".into(),
                entities: serde_json::json!([]),
                topic: Some("hiking".into()),
                importance: Some(0.4),
                short_context: None,
            })
            .await
            .unwrap();
        store
            .append_transcript(NewTranscript {
                user_id: user_id.clone(),
                session_id: None,
                thread_id: None,
                turn_index: Some(2),
                user_text: "what's the weather".into(),
                bot_text: "cloudy today".into(),
                entities: serde_json::json!([]),
                topic: None,
                importance: Some(0.1),
                short_context: None,
            })
            .await
            .unwrap();

        let hits = store
            .search_transcripts(&user_id, "hiking", 6, 200)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].item.user_text.contains("hiking"));
    }

    #[tokio::test]
    async fn clear_all_memory_for_removes_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (bot_id, external_id) = ids();
        let state = store.load_state(&bot_id, external_id).await.unwrap();
        store
            .save_turn(&bot_id, external_id, "hi", "hello", &state.user, Some("likes tea"))
            .await
            .unwrap();

        let counts = store
            .clear_all_memory_for(&bot_id, external_id, true)
            .await
            .unwrap();
        assert_eq!(counts.messages, 2);
        assert_eq!(counts.memories, 1);

        let fresh = store.load_state(&bot_id, external_id).await.unwrap();
        assert!(fresh.recent_messages.is_empty());
    }

    #[tokio::test]
    async fn clearing_memory_retires_the_fts_rows_without_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (bot_id, external_id) = ids();
        let state = store.load_state(&bot_id, external_id).await.unwrap();
        let user_id = state.user.id.clone();
        let transcript_id = store
            .append_transcript(NewTranscript {
                user_id: user_id.clone(),
                session_id: None,
                thread_id: None,
                turn_index: Some(1),
                user_text: "tell me about your day".into(),
                bot_text: "it was good".into(),
                entities: serde_json::json!([]),
                topic: None,
                importance: Some(0.2),
                short_context: None,
            })
            .await
            .unwrap();
        store
            .append_notes(
                &user_id,
                transcript_id,
                vec![NewNote {
                    note_type: NoteType::Fact,
                    content: "likes tea".into(),
                    importance: Some(0.3),
                    source_pointer: String::new(),
                }],
            )
            .await
            .unwrap();

        // A mismatched FTS5 'delete' command (stale rowid or column value)
        // raises at the SQL layer, so this not erroring is the assertion.
        let counts = store.clear_all_memory_for(&bot_id, external_id, false).await.unwrap();
        assert_eq!(counts.transcripts, 1);
        assert_eq!(counts.derived_notes, 1);
    }
}
