use rusqlite::{Connection, Result};

/// Initialise the persisted schema (§6). Safe to call on every startup
/// (idempotent) — schema drift tolerates missing non-essential columns per
/// §7 rather than failing boot.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_bots_table(conn)?;
    create_users_table(conn)?;
    create_messages_table(conn)?;
    create_memories_table(conn)?;
    create_transcripts_table(conn)?;
    create_derived_notes_table(conn)?;
    create_fts_indexes(conn)?;
    Ok(())
}

fn create_bots_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS bots (
            id                  TEXT PRIMARY KEY,
            name                TEXT NOT NULL,
            basic_info          TEXT NOT NULL DEFAULT '{}',
            big_five            TEXT NOT NULL DEFAULT '[0,0,0,0,0]',
            persona             TEXT NOT NULL DEFAULT '{}',
            character_sidewrite TEXT NOT NULL DEFAULT '',
            backlog_tasks       TEXT NOT NULL DEFAULT '[]',
            created_at          TEXT NOT NULL
        );",
    )
}

fn create_users_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id                   TEXT PRIMARY KEY,
            bot_id               TEXT NOT NULL REFERENCES bots(id) ON DELETE CASCADE,
            external_id          TEXT NOT NULL,
            basic_info           TEXT NOT NULL DEFAULT '{}',
            current_stage        TEXT NOT NULL DEFAULT 'initiating',
            dimensions            TEXT NOT NULL DEFAULT '{}',
            mood_state           TEXT NOT NULL DEFAULT '{}',
            inferred_profile     TEXT NOT NULL DEFAULT '{}',
            assets               TEXT NOT NULL DEFAULT '{}',
            spt_info             TEXT NOT NULL DEFAULT '{}',
            conversation_summary TEXT NOT NULL DEFAULT '',
            created_at           TEXT NOT NULL,
            updated_at           TEXT NOT NULL,
            UNIQUE(bot_id, external_id)
        );
        CREATE INDEX IF NOT EXISTS idx_users_bot ON users(bot_id);",
    )
}

fn create_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            role        TEXT NOT NULL CHECK (role IN ('user','ai','system')),
            content     TEXT NOT NULL,
            metadata    TEXT NOT NULL DEFAULT '{}',
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_user
            ON messages(user_id, created_at, role);",
    )
}

fn create_memories_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memories (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_memories_user ON memories(user_id);",
    )
}

fn create_transcripts_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS transcripts (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            session_id     TEXT,
            thread_id      TEXT,
            turn_index     INTEGER,
            user_text      TEXT NOT NULL,
            bot_text       TEXT NOT NULL,
            entities       TEXT NOT NULL DEFAULT '[]',
            topic          TEXT,
            importance     REAL,
            short_context  TEXT,
            created_at     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_transcripts_user
            ON transcripts(user_id, created_at DESC);",
    )
}

fn create_derived_notes_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS derived_notes (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            transcript_id   INTEGER NOT NULL REFERENCES transcripts(id) ON DELETE CASCADE,
            note_type       TEXT NOT NULL DEFAULT 'other',
            content         TEXT NOT NULL,
            importance      REAL,
            source_pointer  TEXT NOT NULL DEFAULT '',
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_notes_user
            ON derived_notes(user_id, created_at DESC);",
    )
}

/// FTS5 external-content indexes over transcripts/notes. `sqlite.rs` keeps
/// these in sync on every insert (`append_transcript`/`append_notes`) and
/// delete (`clear_all_memory_for`'s `'delete'` commands); there is no
/// update path since transcripts/notes are append-only. Used by
/// `kindred-store` as an auxiliary index — the scoring in
/// `search_transcripts`/`search_notes` is still a manual scan+score over
/// the most recent `scan_limit` rows per §4.1, not an FTS `MATCH` rank, so
/// these tables exist for future full-text use without changing that
/// contract.
fn create_fts_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS transcripts_fts
            USING fts5(user_text, bot_text, content='transcripts', content_rowid='id');
        CREATE VIRTUAL TABLE IF NOT EXISTS derived_notes_fts
            USING fts5(content, content='derived_notes', content_rowid='id');",
    )
}
