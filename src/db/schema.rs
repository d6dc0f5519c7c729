use super::core::{Backend, Store};

const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS news (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        text TEXT NOT NULL,
        topic TEXT,
        cluster TEXT NOT NULL,
        published_at TEXT,
        publisher TEXT
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_news_text ON news (text)",
    "CREATE INDEX IF NOT EXISTS idx_news_cluster ON news (cluster)",
];

const POSTGRES_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS news (
        id BIGSERIAL PRIMARY KEY,
        title TEXT NOT NULL,
        text TEXT NOT NULL,
        topic TEXT,
        cluster TEXT NOT NULL,
        published_at TEXT,
        publisher TEXT
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_news_text ON news (text)",
    "CREATE INDEX IF NOT EXISTS idx_news_cluster ON news (cluster)",
];

impl Store {
    pub(crate) async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        let statements = match self.backend() {
            Backend::Sqlite => SQLITE_SCHEMA,
            Backend::Postgres => POSTGRES_SCHEMA,
        };
        for statement in statements {
            sqlx::query(statement).execute(self.pool()).await?;
        }
        Ok(())
    }
}
