pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS applications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    repository_url TEXT,
    metadata JSON NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS features (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    application_id INTEGER NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'planned' CHECK (status IN (
        'planned', 'backlog', 'ready', 'in_progress', 'blocked', 'on_hold',
        'in_review', 'completed', 'wont_do', 'abandoned', 'archived')),
    priority INTEGER NOT NULL DEFAULT 0,
    blocking_reason TEXT,
    blocked_by_id INTEGER REFERENCES features(id),
    status_updated_at TEXT NOT NULL,
    status_history JSON NOT NULL DEFAULT '[]',
    metadata JSON NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (application_id, name),
    CHECK (blocked_by_id IS NULL OR blocked_by_id <> id),
    CHECK ((blocking_reason IS NULL) = (blocked_by_id IS NULL)),
    CHECK ((status = 'blocked') = (blocked_by_id IS NOT NULL))
);

CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    feature_id INTEGER NOT NULL REFERENCES features(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    acceptance_criteria TEXT,
    status TEXT NOT NULL DEFAULT 'backlog' CHECK (status IN (
        'backlog', 'ready', 'blocked', 'on_hold', 'in_progress', 'in_review',
        'needs_revision', 'completed', 'wont_do', 'abandoned', 'archived')),
    priority INTEGER NOT NULL DEFAULT 0,
    blocking_reason TEXT,
    blocked_by_id INTEGER REFERENCES tasks(id),
    status_updated_at TEXT NOT NULL,
    status_history JSON NOT NULL DEFAULT '[]',
    metadata JSON NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (feature_id, name),
    CHECK (blocked_by_id IS NULL OR blocked_by_id <> id),
    CHECK ((blocking_reason IS NULL) = (blocked_by_id IS NULL)),
    CHECK ((status = 'blocked') = (blocked_by_id IS NOT NULL))
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    task_id INTEGER REFERENCES tasks(id) ON DELETE SET NULL,
    feature_id INTEGER REFERENCES features(id) ON DELETE SET NULL,
    application_id INTEGER REFERENCES applications(id) ON DELETE SET NULL,
    task_type TEXT NOT NULL CHECK (task_type IN ('code-editing', 'planning', 'research', 'exploration')),
    context_description TEXT,
    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'completed', 'abandoned')),
    start_time TEXT NOT NULL,
    end_time TEXT,
    summary TEXT,
    last_checkpoint_at TEXT,
    last_file_change_at TEXT,
    last_decision_at TEXT,
    compliance_score INTEGER NOT NULL DEFAULT 100 CHECK (compliance_score BETWEEN 0 AND 100)
);

CREATE TABLE IF NOT EXISTS file_changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    file_path TEXT NOT NULL,
    change_type TEXT NOT NULL CHECK (change_type IN ('created', 'modified', 'deleted')),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS checkpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    progress TEXT NOT NULL,
    changes_description TEXT NOT NULL,
    current_thinking TEXT NOT NULL,
    next_steps TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    file_path TEXT NOT NULL,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (session_id, file_path, content_hash)
);

CREATE TABLE IF NOT EXISTS decisions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    description TEXT NOT NULL,
    reasoning TEXT NOT NULL,
    alternatives JSON NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS feedback (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    kind TEXT NOT NULL CHECK (kind IN ('issue', 'suggestion', 'praise')),
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS scope_validations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    file_path TEXT NOT NULL,
    change_type TEXT NOT NULL CHECK (change_type IN ('created', 'modified', 'deleted')),
    result TEXT NOT NULL CHECK (result IN ('pass', 'violation')),
    reason TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_features_application ON features(application_id);
CREATE INDEX IF NOT EXISTS idx_tasks_feature ON tasks(feature_id);
CREATE INDEX IF NOT EXISTS idx_sessions_task ON sessions(task_id);
CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
CREATE INDEX IF NOT EXISTS idx_file_changes_session ON file_changes(session_id, created_at);
CREATE INDEX IF NOT EXISTS idx_checkpoints_session ON checkpoints(session_id, created_at);
CREATE INDEX IF NOT EXISTS idx_decisions_session ON decisions(session_id, created_at);
CREATE INDEX IF NOT EXISTS idx_feedback_session ON feedback(session_id, created_at);
CREATE INDEX IF NOT EXISTS idx_scope_validations_session ON scope_validations(session_id, created_at);
"#;
