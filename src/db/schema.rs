//! SQL DDL for the ledger database.
//! SQLite-first; statements are idempotent so they run on every start.

/// Tables, indexes and the global currency seed.
/// Statements are separated by `;` and executed one at a time.
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    token TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

CREATE TABLE IF NOT EXISTS currencies (
    code TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    symbol TEXT NOT NULL,
    decimals INTEGER NOT NULL DEFAULT 2,
    created_by TEXT NULL REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS user_currencies (
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    code TEXT NOT NULL REFERENCES currencies(code),
    PRIMARY KEY (user_id, code)
);

CREATE TABLE IF NOT EXISTS user_settings (
    user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    base_currency TEXT NOT NULL REFERENCES currencies(code),
    language TEXT NOT NULL DEFAULT 'zh',
    theme TEXT NOT NULL DEFAULT 'system',
    date_format TEXT NOT NULL DEFAULT 'YYYY-MM-DD',
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS categories (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    parent_id TEXT NULL REFERENCES categories(id),
    category_type TEXT NOT NULL,
    sort_order INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

-- COALESCE keeps top-level names unique too (NULLs never collide in a plain UNIQUE).
CREATE UNIQUE INDEX IF NOT EXISTS idx_categories_name
    ON categories(user_id, COALESCE(parent_id, ''), name);

CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    category_id TEXT NOT NULL REFERENCES categories(id),
    name TEXT NOT NULL,
    currency_code TEXT NOT NULL REFERENCES currencies(code),
    description TEXT NULL,
    color TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (user_id, name)
);

CREATE TABLE IF NOT EXISTS recurring_transactions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    tx_type TEXT NOT NULL,
    amount TEXT NOT NULL,
    description TEXT NOT NULL,
    frequency TEXT NOT NULL,
    interval_count INTEGER NOT NULL DEFAULT 1,
    start_date TEXT NOT NULL,
    end_date TEXT NULL,
    max_occurrences INTEGER NULL,
    occurrences INTEGER NOT NULL DEFAULT 0,
    next_date TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_recurring_due ON recurring_transactions(user_id, active, next_date);

CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    account_id TEXT NOT NULL REFERENCES accounts(id),
    tx_type TEXT NOT NULL,
    amount TEXT NOT NULL,
    currency_code TEXT NOT NULL REFERENCES currencies(code),
    date TEXT NOT NULL,
    description TEXT NOT NULL,
    notes TEXT NULL,
    recurring_id TEXT NULL REFERENCES recurring_transactions(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transactions_account_date ON transactions(account_id, date);
CREATE INDEX IF NOT EXISTS idx_transactions_user_date ON transactions(user_id, date);

-- One generated transaction per recurring item and date, so sync re-runs are idempotent.
CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_recurring_date
    ON transactions(recurring_id, date) WHERE recurring_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS tags (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    color TEXT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (user_id, name)
);

CREATE TABLE IF NOT EXISTS transaction_tags (
    transaction_id TEXT NOT NULL REFERENCES transactions(id) ON DELETE CASCADE,
    tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (transaction_id, tag_id)
);

CREATE TABLE IF NOT EXISTS exchange_rates (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    from_currency TEXT NOT NULL REFERENCES currencies(code),
    to_currency TEXT NOT NULL REFERENCES currencies(code),
    rate TEXT NOT NULL,
    effective_date TEXT NOT NULL,
    rate_type TEXT NOT NULL DEFAULT 'USER',
    notes TEXT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (user_id, from_currency, to_currency, effective_date)
);

CREATE TABLE IF NOT EXISTS balance_snapshots (
    account_id TEXT PRIMARY KEY REFERENCES accounts(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    balance TEXT NOT NULL,
    currency_code TEXT NOT NULL,
    base_balance TEXT NULL,
    base_currency TEXT NOT NULL,
    as_of TEXT NOT NULL,
    computed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_status (
    user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    state TEXT NOT NULL DEFAULT 'IDLE',
    last_sync_at TEXT NULL,
    last_error TEXT NULL,
    data_changed_at TEXT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_runs (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    state TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT NULL,
    processed_recurring INTEGER NOT NULL DEFAULT 0,
    generated_rates INTEGER NOT NULL DEFAULT 0,
    fetched_rates INTEGER NOT NULL DEFAULT 0,
    refreshed_balances INTEGER NOT NULL DEFAULT 0,
    error TEXT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_runs_user ON sync_runs(user_id, started_at);

INSERT OR IGNORE INTO currencies (code, name, symbol, decimals) VALUES
    ('CNY', 'Chinese Yuan', '¥', 2),
    ('USD', 'US Dollar', '$', 2),
    ('EUR', 'Euro', '€', 2),
    ('GBP', 'British Pound', '£', 2),
    ('JPY', 'Japanese Yen', '¥', 0),
    ('HKD', 'Hong Kong Dollar', 'HK$', 2),
    ('AUD', 'Australian Dollar', 'A$', 2),
    ('CAD', 'Canadian Dollar', 'C$', 2),
    ('SGD', 'Singapore Dollar', 'S$', 2),
    ('KRW', 'South Korean Won', '₩', 0),
    ('CHF', 'Swiss Franc', 'CHF', 2)
"#;
