//! Database schema definitions for APEX storage.

/// SQL to create the patterns table
pub const CREATE_PATTERNS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS patterns (
    id TEXT PRIMARY KEY NOT NULL,
    alias TEXT UNIQUE,
    pattern_type TEXT NOT NULL,
    title TEXT NOT NULL,
    summary TEXT NOT NULL,
    json_canonical TEXT NOT NULL DEFAULT '{}',
    tags TEXT NOT NULL DEFAULT '[]',
    trust_score REAL NOT NULL DEFAULT 0.5,
    alpha REAL NOT NULL DEFAULT 1.0,
    beta REAL NOT NULL DEFAULT 1.0,
    usage_count INTEGER NOT NULL DEFAULT 0,
    success_count INTEGER NOT NULL DEFAULT 0,
    invalid INTEGER NOT NULL DEFAULT 0,
    key_insight TEXT,
    when_to_use TEXT,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
)
"#;

/// SQL to create the normalized tag table used by the tags filter
pub const CREATE_PATTERN_TAGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pattern_tags (
    pattern_id TEXT NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY (pattern_id, tag)
)
"#;

/// SQL to create the pattern metadata table
pub const CREATE_PATTERN_METADATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pattern_metadata (
    pattern_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (pattern_id, key)
)
"#;

/// SQL to create the pattern triggers table
pub const CREATE_PATTERN_TRIGGERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pattern_triggers (
    pattern_id TEXT NOT NULL,
    trigger_type TEXT NOT NULL,
    trigger_value TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0
)
"#;

/// SQL to create the pattern vocabulary table
pub const CREATE_PATTERN_VOCAB_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pattern_vocab (
    pattern_id TEXT NOT NULL,
    term TEXT NOT NULL,
    term_type TEXT NOT NULL,
    weight REAL NOT NULL DEFAULT 1.0
)
"#;

/// SQL to create the alias resolution table
pub const CREATE_PATTERN_ALIASES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pattern_aliases (
    alias TEXT PRIMARY KEY NOT NULL,
    pattern_id TEXT NOT NULL
)
"#;

/// SQL to create the tasks table
pub const CREATE_TASKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY NOT NULL,
    identifier TEXT,
    title TEXT NOT NULL,
    intent TEXT NOT NULL,
    task_type TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'active',
    phase TEXT NOT NULL DEFAULT 'ARCHITECT',
    confidence REAL NOT NULL DEFAULT 0.5,
    files_touched TEXT NOT NULL DEFAULT '[]',
    errors_encountered TEXT NOT NULL DEFAULT '[]',
    in_flight TEXT NOT NULL DEFAULT '[]',
    phase_handoffs TEXT NOT NULL DEFAULT '[]',
    brief TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
)
"#;

/// SQL to create the append-only task evidence table
pub const CREATE_TASK_EVIDENCE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS task_evidence (
    id TEXT PRIMARY KEY NOT NULL,
    task_id TEXT NOT NULL,
    evidence_type TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
)
"#;

/// SQL to create the reflections table
///
/// The `(task_id, content_hash)` unique constraint is what makes storing
/// the same reflection twice a no-op.
pub const CREATE_REFLECTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS reflections (
    id TEXT PRIMARY KEY NOT NULL,
    task_id TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    outcome TEXT NOT NULL,
    claims TEXT NOT NULL,
    artifacts TEXT NOT NULL DEFAULT '{}',
    received_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    UNIQUE (task_id, content_hash)
)
"#;

/// SQL to create the audit events table
pub const CREATE_AUDIT_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS audit_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    pattern_id TEXT,
    details TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
)
"#;

/// Index on pattern type for faceted listing
pub const CREATE_PATTERNS_TYPE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_patterns_type
ON patterns(pattern_type)
"#;

/// Index on trust score for min-trust filtering
pub const CREATE_PATTERNS_TRUST_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_patterns_trust
ON patterns(trust_score DESC)
"#;

/// Index on updated_at for recency ordering
pub const CREATE_PATTERNS_UPDATED_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_patterns_updated
ON patterns(updated_at DESC)
"#;

/// Index on the normalized tag table
pub const CREATE_PATTERN_TAGS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_pattern_tags_tag
ON pattern_tags(tag)
"#;

/// Index on triggers by pattern for bulk fetch
pub const CREATE_PATTERN_TRIGGERS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_pattern_triggers_pattern
ON pattern_triggers(pattern_id, priority DESC)
"#;

/// Index on vocab by pattern for bulk fetch
pub const CREATE_PATTERN_VOCAB_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_pattern_vocab_pattern
ON pattern_vocab(pattern_id)
"#;

/// Index on task external identifiers
pub const CREATE_TASKS_IDENTIFIER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_tasks_identifier
ON tasks(identifier)
"#;

/// Index on task status for `current` and `find`
pub const CREATE_TASKS_STATUS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_tasks_status
ON tasks(status, updated_at DESC)
"#;

/// Index on evidence by task in timestamp order
pub const CREATE_TASK_EVIDENCE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_task_evidence_task
ON task_evidence(task_id, created_at)
"#;

/// Index on audit events by pattern in time order
pub const CREATE_AUDIT_EVENTS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_audit_events_pattern
ON audit_events(pattern_id, created_at DESC)
"#;

/// SQL to create the FTS5 virtual table over pattern title/summary/tags
///
/// `pattern_id` is UNINDEXED so it is available for joins without being
/// tokenized. Tokenizer: porter unicode61 for stemming and Unicode-aware
/// tokenization.
pub const CREATE_PATTERNS_FTS_TABLE: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS patterns_fts USING fts5(
    pattern_id UNINDEXED,
    title,
    summary,
    tags,
    tokenize='porter unicode61'
)
"#;

/// Synchronization triggers keeping `patterns_fts` co-transactional with
/// the main table.
pub const CREATE_PATTERNS_FTS_TRIGGERS: &str = r#"
CREATE TRIGGER IF NOT EXISTS patterns_ai AFTER INSERT ON patterns BEGIN
    INSERT INTO patterns_fts(pattern_id, title, summary, tags)
    VALUES (new.id, new.title, new.summary, new.tags);
END;

CREATE TRIGGER IF NOT EXISTS patterns_au AFTER UPDATE ON patterns BEGIN
    DELETE FROM patterns_fts WHERE pattern_id = old.id;
    INSERT INTO patterns_fts(pattern_id, title, summary, tags)
    VALUES (new.id, new.title, new.summary, new.tags);
END;

CREATE TRIGGER IF NOT EXISTS patterns_ad AFTER DELETE ON patterns BEGIN
    DELETE FROM patterns_fts WHERE pattern_id = old.id;
END;
"#;

/// All statements needed to initialize a fresh database, in order.
pub const ALL_STATEMENTS: &[&str] = &[
    CREATE_PATTERNS_TABLE,
    CREATE_PATTERN_TAGS_TABLE,
    CREATE_PATTERN_METADATA_TABLE,
    CREATE_PATTERN_TRIGGERS_TABLE,
    CREATE_PATTERN_VOCAB_TABLE,
    CREATE_PATTERN_ALIASES_TABLE,
    CREATE_TASKS_TABLE,
    CREATE_TASK_EVIDENCE_TABLE,
    CREATE_REFLECTIONS_TABLE,
    CREATE_AUDIT_EVENTS_TABLE,
    CREATE_PATTERNS_TYPE_INDEX,
    CREATE_PATTERNS_TRUST_INDEX,
    CREATE_PATTERNS_UPDATED_INDEX,
    CREATE_PATTERN_TAGS_INDEX,
    CREATE_PATTERN_TRIGGERS_INDEX,
    CREATE_PATTERN_VOCAB_INDEX,
    CREATE_TASKS_IDENTIFIER_INDEX,
    CREATE_TASKS_STATUS_INDEX,
    CREATE_TASK_EVIDENCE_INDEX,
    CREATE_AUDIT_EVENTS_INDEX,
    CREATE_PATTERNS_FTS_TABLE,
]; // FTS triggers run through execute_batch separately
