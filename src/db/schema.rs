//! SQL DDL for the bookkeeping tables the registry relies on.

/// SQLite schema includes:
/// - `ir_module_module` (one row per known module, with its state)
/// - `ir_module_module_dependency` (declared dependencies per module)
/// - `ir_model_data` (external ids: (module, name) -> (model, res_id))
pub const SQLITE_INIT: &str = r#"
-- ---------------------------------------------------------------------------
-- Modules
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS ir_module_module (
    id INTEGER PRIMARY KEY NOT NULL,
    name TEXT NOT NULL UNIQUE,
    state TEXT NOT NULL DEFAULT 'uninstalled',
    latest_version TEXT NULL,
    auto_install BOOLEAN NOT NULL DEFAULT 0,
    demo BOOLEAN NOT NULL DEFAULT 0,
    summary TEXT NULL,
    create_date TEXT NOT NULL, -- RFC3339
    write_date TEXT NOT NULL -- RFC3339
);

CREATE INDEX IF NOT EXISTS idx_ir_module_module_state ON ir_module_module(state);

CREATE TABLE IF NOT EXISTS ir_module_module_dependency (
    id INTEGER PRIMARY KEY NOT NULL,
    module_id INTEGER NOT NULL REFERENCES ir_module_module(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    UNIQUE(module_id, name)
);

-- ---------------------------------------------------------------------------
-- External ids
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS ir_model_data (
    id INTEGER PRIMARY KEY NOT NULL,
    module TEXT NOT NULL,
    name TEXT NOT NULL,
    model TEXT NOT NULL,
    res_id INTEGER NOT NULL,
    noupdate BOOLEAN NOT NULL DEFAULT 0,
    create_date TEXT NOT NULL, -- RFC3339
    write_date TEXT NOT NULL, -- RFC3339
    UNIQUE(module, name)
);

CREATE INDEX IF NOT EXISTS idx_ir_model_data_model_res ON ir_model_data(model, res_id);
"#;

/// Two counters shared by every process working on the database.
pub const SIGNALING_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS registry_signaling (
    name TEXT PRIMARY KEY NOT NULL,
    last_value INTEGER NOT NULL
);

INSERT OR IGNORE INTO registry_signaling (name, last_value) VALUES ('base_registry_signaling', 1);

INSERT OR IGNORE INTO registry_signaling (name, last_value) VALUES ('base_cache_signaling', 1);
"#;
