use async_trait::async_trait;
use kindred_core::{BotId, UserId};

use crate::error::Result;
use crate::types::{ClearCounts, DerivedNote, NewNote, NewTranscript, ScoredHit, State, Transcript, User};

/// Storage adapter for everything the pipeline persists across turns: the
/// relationship `State`, the raw transcript log (Store A), and the derived,
/// note-typed memory (Store B). Two implementations ship: a SQLite-backed one
/// (default) and a filesystem fallback used when the database can't be
/// opened.
#[async_trait]
pub trait Store: Send + Sync {
    /// Load (or idempotently create, via `kindred-profile`) the bot/user
    /// relationship state plus the most recent messages, capped at 20 and in
    /// chronological order.
    async fn load_state(&self, bot_id: &BotId, external_id: &str) -> Result<State>;

    /// Persist one turn: append the user/ai messages, write the fully
    /// evolved user row (stage, mood, spt info, assets, summary, dimensions),
    /// and optionally append a free-text memory row. Applies a defense-in-
    /// depth `|delta| <= 0.20` clamp against the currently persisted
    /// dimensions and logs a `DimensionAudit` for every dimension that moved.
    async fn save_turn(
        &self,
        bot_id: &BotId,
        external_id: &str,
        user_text: &str,
        ai_text: &str,
        updated_user: &User,
        new_memory: Option<&str>,
    ) -> Result<()>;

    /// Append one row to the raw transcript log (Store A), returning its id.
    async fn append_transcript(&self, transcript: NewTranscript) -> Result<i64>;

    /// Append zero or more derived notes (Store B) linked to a transcript.
    async fn append_notes(
        &self,
        user_id: &UserId,
        transcript_id: i64,
        notes: Vec<NewNote>,
    ) -> Result<usize>;

    /// Manual tokenize+scan+score search over the most recent `scan_limit`
    /// transcript rows for this user, returning up to `limit` hits ordered by
    /// score descending.
    async fn search_transcripts(
        &self,
        user_id: &UserId,
        query: &str,
        limit: usize,
        scan_limit: usize,
    ) -> Result<Vec<ScoredHit<Transcript>>>;

    /// Same contract as `search_transcripts` but over derived notes; note
    /// hits get a `+0.5` stability bias over raw term-hit count.
    async fn search_notes(
        &self,
        user_id: &UserId,
        query: &str,
        limit: usize,
        scan_limit: usize,
    ) -> Result<Vec<ScoredHit<DerivedNote>>>;

    /// Wipe all persisted rows for one (bot, external user), returning the
    /// per-table row counts removed. `reset_profile` also drops the user row
    /// itself so the next `load_state` regenerates a fresh baseline.
    async fn clear_all_memory_for(
        &self,
        bot_id: &BotId,
        external_id: &str,
        reset_profile: bool,
    ) -> Result<ClearCounts>;
}

/// Lowercase, alnum-delimited tokens at least 2 chars long.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 2)
        .map(|w| w.to_string())
        .collect()
}

/// Count of query tokens that appear anywhere in `haystack`.
pub(crate) fn term_hits(tokens: &[String], haystack: &str) -> usize {
    let haystack = haystack.to_lowercase();
    tokens.iter().filter(|t| haystack.contains(t.as_str())).count()
}
