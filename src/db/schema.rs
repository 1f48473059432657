/// Complete database schema for the bookmark store.
///
/// Uses CREATE TABLE/INDEX IF NOT EXISTS for idempotent execution.
/// Timestamps are unix seconds.
pub const INITIAL_SCHEMA: &str = r#"
-- Bookmarks: one row per unique URL
CREATE TABLE IF NOT EXISTS bookmarks (
    id INTEGER PRIMARY KEY,
    url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    notes TEXT NOT NULL DEFAULT '',
    is_favorite INTEGER NOT NULL DEFAULT 0,
    unread INTEGER NOT NULL DEFAULT 0,
    shared INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Tags: names are unique and case-sensitive
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    category TEXT NOT NULL DEFAULT 'candidate'
        CHECK (category IN ('core', 'fixed', 'dynamic', 'candidate')),
    usage_count INTEGER NOT NULL DEFAULT 0,
    last_used INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

-- Synonyms recorded by merges; the synonym tag itself is deleted afterwards
CREATE TABLE IF NOT EXISTS tag_synonyms (
    main_tag_id INTEGER NOT NULL,
    synonym_tag_id INTEGER NOT NULL,
    similarity_score REAL NOT NULL DEFAULT 0,
    auto_merged INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (main_tag_id, synonym_tag_id),
    FOREIGN KEY (main_tag_id) REFERENCES tags(id) ON DELETE CASCADE
);

-- Junction table: links bookmarks to tags (many-to-many)
CREATE TABLE IF NOT EXISTS bookmark_tags (
    bookmark_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    PRIMARY KEY (bookmark_id, tag_id),
    FOREIGN KEY (bookmark_id) REFERENCES bookmarks(id) ON DELETE CASCADE,
    FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS folders (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS bookmark_folders (
    bookmark_id INTEGER NOT NULL,
    folder_id INTEGER NOT NULL,
    PRIMARY KEY (bookmark_id, folder_id),
    FOREIGN KEY (bookmark_id) REFERENCES bookmarks(id) ON DELETE CASCADE,
    FOREIGN KEY (folder_id) REFERENCES folders(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS workflows (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    enabled INTEGER NOT NULL DEFAULT 1,
    priority INTEGER NOT NULL DEFAULT 0,
    condition_logic TEXT NOT NULL DEFAULT 'OR',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Trigger and action configs are JSON objects
CREATE TABLE IF NOT EXISTS workflow_triggers (
    id INTEGER PRIMARY KEY,
    workflow_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    trigger_type TEXT NOT NULL,
    config TEXT NOT NULL DEFAULT '{}',
    FOREIGN KEY (workflow_id) REFERENCES workflows(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS workflow_actions (
    id INTEGER PRIMARY KEY,
    workflow_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    action_type TEXT NOT NULL,
    config TEXT NOT NULL DEFAULT '{}',
    FOREIGN KEY (workflow_id) REFERENCES workflows(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_bookmarks_created ON bookmarks(created_at);
CREATE INDEX IF NOT EXISTS idx_bookmark_tags_tag ON bookmark_tags(tag_id);
CREATE INDEX IF NOT EXISTS idx_tags_category ON tags(category);
CREATE INDEX IF NOT EXISTS idx_tags_usage ON tags(usage_count);
CREATE INDEX IF NOT EXISTS idx_bookmark_folders_folder ON bookmark_folders(folder_id);
CREATE INDEX IF NOT EXISTS idx_workflows_priority ON workflows(priority);
CREATE INDEX IF NOT EXISTS idx_workflow_triggers_workflow ON workflow_triggers(workflow_id);
CREATE INDEX IF NOT EXISTS idx_workflow_actions_workflow ON workflow_actions(workflow_id);
"#;
