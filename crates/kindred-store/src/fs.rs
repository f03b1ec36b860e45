use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use kindred_core::{BotId, KnappStage, MessageRole, UserId};

use crate::cache::StateCache;
use crate::error::Result;
use crate::store::{term_hits, tokenize, Store};
use crate::types::{
    Assets, Bot, ClearCounts, DerivedNote, MoodState, NewNote, NewTranscript, NoteType,
    RelationshipDimensions, ScoredHit, SptInfo, State, StoredMessage, Transcript, User,
};

/// Filesystem fallback used when the SQLite database can't be opened (§4.1
/// Errors). One directory per `(bot_id, external_id)` holding
/// `relationship.json` plus one JSONL file per append-only log. Every write
/// is serialized behind a single in-process mutex — this backend exists for
/// availability, not throughput.
pub struct FilesystemStore {
    base_dir: PathBuf,
    write_lock: Mutex<()>,
    cache: Mutex<StateCache<State>>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct PersistedBot {
    name: String,
    basic_info: serde_json::Value,
    big_five: [f64; 5],
    persona: serde_json::Value,
    character_sidewrite: String,
    created_at: String,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct PersistedRelationship {
    user_id: String,
    basic_info: serde_json::Value,
    current_stage: KnappStage,
    dimensions: RelationshipDimensions,
    mood_state: MoodState,
    inferred_profile: serde_json::Value,
    assets: Assets,
    spt_info: SptInfo,
    conversation_summary: String,
    created_at: String,
    updated_at: String,
}

impl FilesystemStore {
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            write_lock: Mutex::new(()),
            cache: Mutex::new(StateCache::new()),
        })
    }

    fn bot_dir(&self, bot_id: &BotId) -> PathBuf {
        self.base_dir.join(bot_id.as_str())
    }

    fn user_dir(&self, bot_id: &BotId, external_id: &str) -> PathBuf {
        self.bot_dir(bot_id).join("users").join(sanitize(external_id))
    }

    fn bot_file(&self, bot_id: &BotId) -> PathBuf {
        self.bot_dir(bot_id).join("bot.json")
    }

    fn relationship_file(dir: &Path) -> PathBuf {
        dir.join("relationship.json")
    }

    fn messages_file(dir: &Path) -> PathBuf {
        dir.join("messages.jsonl")
    }

    fn memories_file(dir: &Path) -> PathBuf {
        dir.join("memories.jsonl")
    }

    fn transcripts_file(dir: &Path) -> PathBuf {
        dir.join("transcripts.jsonl")
    }

    fn notes_file(dir: &Path) -> PathBuf {
        dir.join("derived_notes.jsonl")
    }

    fn ensure_bot(&self, bot_id: &BotId) -> Result<Bot> {
        let file = self.bot_file(bot_id);
        if let Some(existing) = read_json::<PersistedBot>(&file)? {
            return Ok(Bot {
                id: bot_id.clone(),
                name: existing.name,
                basic_info: existing.basic_info,
                big_five: existing.big_five,
                persona: existing.persona,
                character_sidewrite: existing.character_sidewrite,
                backlog_tasks: Vec::new(),
                created_at: existing.created_at,
            });
        }

        let profile = kindred_profile::generate_bot_profile(bot_id.as_str());
        let now = now_iso();
        let persisted = PersistedBot {
            name: bot_id.as_str().to_string(),
            basic_info: profile.basic_info.clone(),
            big_five: profile.big_five,
            persona: profile.persona.clone(),
            character_sidewrite: String::new(),
            created_at: now.clone(),
        };
        fs::create_dir_all(self.bot_dir(bot_id))?;
        write_json(&file, &persisted)?;
        Ok(Bot {
            id: bot_id.clone(),
            name: persisted.name,
            basic_info: persisted.basic_info,
            big_five: persisted.big_five,
            persona: persisted.persona,
            character_sidewrite: persisted.character_sidewrite,
            backlog_tasks: Vec::new(),
            created_at: persisted.created_at,
        })
    }

    fn ensure_user(&self, bot_id: &BotId, external_id: &str) -> Result<User> {
        let dir = self.user_dir(bot_id, external_id);
        let file = Self::relationship_file(&dir);
        if let Some(existing) = read_json::<PersistedRelationship>(&file)? {
            return Ok(User {
                id: UserId::from(existing.user_id),
                bot_id: bot_id.clone(),
                external_id: external_id.to_string(),
                basic_info: existing.basic_info,
                current_stage: existing.current_stage,
                dimensions: existing.dimensions.normalized(),
                mood_state: existing.mood_state,
                inferred_profile: existing.inferred_profile,
                assets: existing.assets,
                spt_info: existing.spt_info,
                conversation_summary: existing.conversation_summary,
                created_at: existing.created_at,
                updated_at: existing.updated_at,
            });
        }

        let profile = kindred_profile::generate_user_profile(external_id);
        let now = now_iso();
        let id = UserId::new();
        let persisted = PersistedRelationship {
            user_id: id.as_str().to_string(),
            basic_info: profile.basic_info.clone(),
            current_stage: KnappStage::default(),
            dimensions: RelationshipDimensions::default(),
            mood_state: MoodState::default(),
            inferred_profile: profile.inferred_profile.clone(),
            assets: Assets::default(),
            spt_info: SptInfo::default(),
            conversation_summary: String::new(),
            created_at: now.clone(),
            updated_at: now,
        };
        fs::create_dir_all(&dir)?;
        write_json(&file, &persisted)?;
        Ok(User {
            id,
            bot_id: bot_id.clone(),
            external_id: external_id.to_string(),
            basic_info: persisted.basic_info,
            current_stage: persisted.current_stage,
            dimensions: persisted.dimensions,
            mood_state: persisted.mood_state,
            inferred_profile: persisted.inferred_profile,
            assets: persisted.assets,
            spt_info: persisted.spt_info,
            conversation_summary: persisted.conversation_summary,
            created_at: persisted.created_at,
            updated_at: persisted.updated_at,
        })
    }

    fn recent_messages(dir: &Path) -> Result<Vec<StoredMessage>> {
        let mut rows = read_jsonl::<StoredMessage>(&Self::messages_file(dir))?;
        let start = rows.len().saturating_sub(20);
        let mut rows: Vec<_> = rows.split_off(start);
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
impl Store for FilesystemStore {
    async fn load_state(&self, bot_id: &BotId, external_id: &str) -> Result<State> {
        if let Some(cached) = self.cache.lock().unwrap().get(bot_id.as_str(), external_id) {
            return Ok(cached);
        }
        let _guard = self.write_lock.lock().unwrap();
        let bot = self.ensure_bot(bot_id)?;
        let user = self.ensure_user(bot_id, external_id)?;
        let dir = self.user_dir(bot_id, external_id);
        let recent_messages = Self::recent_messages(&dir)?;
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
        let _guard = self.write_lock.lock().unwrap();
        let dir = self.user_dir(bot_id, external_id);
        fs::create_dir_all(&dir)?;
        let now = now_iso();

        let next_id = |path: &Path| -> Result<i64> {
            Ok(read_jsonl::<StoredMessage>(path)?
                .last()
                .map(|m| m.id + 1)
                .unwrap_or(1))
        };
        let messages_path = Self::messages_file(&dir);
        let mut next = next_id(&messages_path)?;
        append_jsonl(
            &messages_path,
            &StoredMessage {
                id: next,
                user_id: updated_user.id.clone(),
                role: MessageRole::User,
                content: user_text.to_string(),
                meta: serde_json::json!({}),
                created_at: now.clone(),
            },
        )?;
        next += 1;
        append_jsonl(
            &messages_path,
            &StoredMessage {
                id: next,
                user_id: updated_user.id.clone(),
                role: MessageRole::Ai,
                content: ai_text.to_string(),
                meta: serde_json::json!({}),
                created_at: now.clone(),
            },
        )?;
        if let Some(memory) = new_memory {
            append_line(&Self::memories_file(&dir), memory)?;
        }

        let relationship_file = Self::relationship_file(&dir);
        let persisted = read_json::<PersistedRelationship>(&relationship_file)?
            .expect("relationship.json must exist before save_turn");
        let clamped = clamp_dimensions(&persisted.dimensions, &updated_user.dimensions);
        let next_persisted = PersistedRelationship {
            user_id: persisted.user_id,
            basic_info: updated_user.basic_info.clone(),
            current_stage: updated_user.current_stage,
            dimensions: clamped,
            mood_state: updated_user.mood_state,
            inferred_profile: updated_user.inferred_profile.clone(),
            assets: updated_user.assets.clone(),
            spt_info: updated_user.spt_info,
            conversation_summary: updated_user.conversation_summary.clone(),
            created_at: persisted.created_at,
            updated_at: now,
        };
        write_json(&relationship_file, &next_persisted)?;

        self.cache.lock().unwrap().invalidate(bot_id.as_str(), external_id);
        Ok(())
    }

    async fn append_transcript(&self, transcript: NewTranscript) -> Result<i64> {
        let _guard = self.write_lock.lock().unwrap();
        let dir = self
            .base_dir
            .join("_transcripts_by_user")
            .join(sanitize(transcript.user_id.as_str()));
        fs::create_dir_all(&dir)?;
        let path = Self::transcripts_file(&dir);
        let id = read_jsonl::<Transcript>(&path)?
            .last()
            .map(|t| t.id + 1)
            .unwrap_or(1);
        append_jsonl(
            &path,
            &Transcript {
                id,
                user_id: transcript.user_id,
                session_id: transcript.session_id,
                thread_id: transcript.thread_id,
                turn_index: transcript.turn_index,
                user_text: transcript.user_text,
                bot_text: transcript.bot_text,
                entities: transcript.entities,
                topic: transcript.topic,
                importance: transcript.importance,
                short_context: transcript.short_context,
                created_at: now_iso(),
            },
        )?;
        Ok(id)
    }

    async fn append_notes(
        &self,
        user_id: &UserId,
        transcript_id: i64,
        notes: Vec<NewNote>,
    ) -> Result<usize> {
        let _guard = self.write_lock.lock().unwrap();
        let dir = self
            .base_dir
            .join("_transcripts_by_user")
            .join(sanitize(user_id.as_str()));
        fs::create_dir_all(&dir)?;
        let path = Self::notes_file(&dir);
        let mut next = read_jsonl::<DerivedNote>(&path)?
            .last()
            .map(|n| n.id + 1)
            .unwrap_or(1);
        let count = notes.len();
        for note in notes {
            append_jsonl(
                &path,
                &DerivedNote {
                    id: next,
                    user_id: user_id.clone(),
                    transcript_id,
                    note_type: note.note_type,
                    content: note.content,
                    importance: note.importance,
                    source_pointer: note.source_pointer,
                    created_at: now_iso(),
                },
            )?;
            next += 1;
        }
        Ok(count)
    }

    async fn search_transcripts(
        &self,
        user_id: &UserId,
        query: &str,
        limit: usize,
        scan_limit: usize,
    ) -> Result<Vec<ScoredHit<Transcript>>> {
        let dir = self
            .base_dir
            .join("_transcripts_by_user")
            .join(sanitize(user_id.as_str()));
        let mut rows = read_jsonl::<Transcript>(&Self::transcripts_file(&dir))?;
        let start = rows.len().saturating_sub(scan_limit);
        let rows = rows.split_off(start);
        let tokens = tokenize(query);
        let mut hits: Vec<_> = rows
            .into_iter()
            .filter_map(|t| {
                let haystack = format!(
                    "{} {} {}",
                    t.user_text,
                    t.bot_text,
                    t.topic.clone().unwrap_or_default()
                );
                let h = term_hits(&tokens, &haystack);
                if h == 0 {
                    return None;
                }
                let score = h as f64 + t.importance.unwrap_or(0.0);
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
        let dir = self
            .base_dir
            .join("_transcripts_by_user")
            .join(sanitize(user_id.as_str()));
        let mut rows = read_jsonl::<DerivedNote>(&Self::notes_file(&dir))?;
        let start = rows.len().saturating_sub(scan_limit);
        let rows = rows.split_off(start);
        let tokens = tokenize(query);
        let mut hits: Vec<_> = rows
            .into_iter()
            .filter_map(|n| {
                let h = term_hits(&tokens, &n.content);
                if h == 0 {
                    return None;
                }
                let score = h as f64 + n.importance.unwrap_or(0.0) + 0.5;
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
        let _guard = self.write_lock.lock().unwrap();
        let dir = self.user_dir(bot_id, external_id);
        if !dir.exists() {
            return Ok(ClearCounts::default());
        }
        let messages = read_jsonl::<StoredMessage>(&Self::messages_file(&dir))?.len();
        let memories = fs::read_to_string(Self::memories_file(&dir))
            .map(|s| s.lines().count())
            .unwrap_or(0);

        let user_id = read_json::<PersistedRelationship>(&Self::relationship_file(&dir))?
            .map(|p| p.user_id)
            .unwrap_or_default();
        let transcripts_dir = self
            .base_dir
            .join("_transcripts_by_user")
            .join(sanitize(&user_id));
        let transcripts = read_jsonl::<Transcript>(&Self::transcripts_file(&transcripts_dir))?.len();
        let derived_notes = read_jsonl::<DerivedNote>(&Self::notes_file(&transcripts_dir))?.len();

        let _ = fs::remove_file(Self::messages_file(&dir));
        let _ = fs::remove_file(Self::memories_file(&dir));
        let _ = fs::remove_dir_all(&transcripts_dir);
        if reset_profile {
            let _ = fs::remove_file(Self::relationship_file(&dir));
        }

        self.cache.lock().unwrap().invalidate(bot_id.as_str(), external_id);
        Ok(ClearCounts {
            messages,
            memories,
            transcripts,
            derived_notes,
        })
    }
}

fn clamp_dimensions(
    persisted: &RelationshipDimensions,
    proposed: &RelationshipDimensions,
) -> RelationshipDimensions {
    let persisted = persisted.normalized();
    let proposed = proposed.normalized();
    let mut out = persisted;
    for (name, old) in persisted.as_pairs() {
        let target = proposed.as_pairs().into_iter().find(|(n, _)| *n == name).unwrap().1;
        let delta = (target - old).clamp(-0.20, 0.20);
        let new = (old + delta).clamp(0.0, 1.0);
        tracing::info!(dimension = name, old, new, delta, "dimension_update");
        let mut pairs = out.as_pairs();
        for p in pairs.iter_mut() {
            if p.0 == name {
                p.1 = new;
            }
        }
        out = RelationshipDimensions::from_pairs(pairs);
    }
    out
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&data)?))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_string_pretty(value)?;
    fs::write(path, data)?;
    Ok(())
}

fn read_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}

fn append_jsonl<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let line = serde_json::to_string(value)?;
    append_line(path, &line)
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}
