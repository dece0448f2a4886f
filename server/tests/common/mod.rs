//! Shared fixtures for the integration tests: a Typecho-like SQLite store in
//! a temporary directory and a driver wrapper that injects failures.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use curator_server::config::Config;
use curator_server::db::{
    ColumnInfo, Dialect, Row, SqliteDriver, StorageDriver, Tables, Transaction,
};
use curator_server::handlers::{BackupStore, JobStore, PolicyStore};
use serde_json::{json, Value};
use tempfile::TempDir;

pub const PREFIX: &str = "typecho_";
pub const BACKUP_PREFIX: &str = "AMD_backup";

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE typecho_contents (
        cid INTEGER PRIMARY KEY AUTOINCREMENT,
        title VARCHAR(150),
        slug VARCHAR(150),
        created INTEGER DEFAULT 0,
        modified INTEGER DEFAULT 0,
        text TEXT,
        type VARCHAR(16) DEFAULT 'post',
        status VARCHAR(16) DEFAULT 'publish',
        parent INTEGER DEFAULT 0
    )"#,
    r#"CREATE TABLE typecho_comments (
        coid INTEGER PRIMARY KEY AUTOINCREMENT,
        cid INTEGER DEFAULT 0,
        author VARCHAR(150),
        text TEXT,
        parent INTEGER DEFAULT 0
    )"#,
    r#"CREATE TABLE typecho_fields (
        cid INTEGER NOT NULL,
        name VARCHAR(150) NOT NULL,
        type VARCHAR(8) DEFAULT 'str',
        str_value TEXT,
        int_value INTEGER DEFAULT 0,
        float_value REAL DEFAULT 0,
        PRIMARY KEY (cid, name)
    )"#,
    r#"CREATE TABLE typecho_relationships (
        cid INTEGER NOT NULL,
        mid INTEGER NOT NULL,
        PRIMARY KEY (cid, mid)
    )"#,
];

/// A fresh store plus the directories the operations write to.
pub struct TestEnv {
    pub dir: TempDir,
    pub driver: Arc<dyn StorageDriver>,
    pub tables: Tables,
    pub backups: BackupStore,
    pub jobs: JobStore,
    pub policy: PolicyStore,
}

impl TestEnv {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("content.db").display());
        let driver: Arc<dyn StorageDriver> =
            Arc::new(SqliteDriver::connect(&url).await.expect("open sqlite"));

        for ddl in SCHEMA {
            exec(driver.as_ref(), ddl, &[]).await;
        }

        let backups = BackupStore::new(dir.path().join("backups"), BACKUP_PREFIX);
        let jobs = JobStore::new(dir.path().join("state"));
        let policy = PolicyStore::new(dir.path().join("state"));

        Self {
            dir,
            driver,
            tables: Tables::new(PREFIX),
            backups,
            jobs,
            policy,
        }
    }

    /// Configuration pointing at this environment.
    pub fn config(&self, admin_token: Option<&str>) -> Config {
        Config {
            host: "127.0.0.1".into(),
            port: 0,
            database_url: format!("sqlite://{}", self.dir.path().join("content.db").display()),
            table_prefix: PREFIX.into(),
            backup_dir: self.dir.path().join("backups"),
            state_dir: self.dir.path().join("state"),
            backup_prefix: BACKUP_PREFIX.into(),
            restore_batch_size: 200,
            admin_token: admin_token.map(String::from),
        }
    }

    pub fn driver(&self) -> &dyn StorageDriver {
        self.driver.as_ref()
    }
}

pub async fn exec(driver: &dyn StorageDriver, sql: &str, params: &[Value]) -> u64 {
    let mut tx = driver.begin().await.expect("begin");
    let affected = tx.execute(sql, params).await.expect(sql);
    tx.commit().await.expect("commit");
    affected
}

pub async fn query(driver: &dyn StorageDriver, sql: &str, params: &[Value]) -> Vec<Row> {
    let mut tx = driver.begin().await.expect("begin");
    let rows = tx.fetch_all(sql, params).await.expect(sql);
    tx.commit().await.expect("commit");
    rows
}

/// Integer column of every row, in the order the query returns them.
pub async fn column(driver: &dyn StorageDriver, sql: &str, name: &str) -> Vec<i64> {
    query(driver, sql, &[])
        .await
        .iter()
        .map(|row| row.get(name).and_then(Value::as_i64).expect(name))
        .collect()
}

pub async fn content_ids(driver: &dyn StorageDriver) -> Vec<i64> {
    column(driver, "SELECT cid FROM typecho_contents ORDER BY cid", "cid").await
}

pub async fn seed_record(driver: &dyn StorageDriver, cid: i64, kind: &str, parent: i64) {
    exec(
        driver,
        "INSERT INTO typecho_contents (cid, title, slug, created, text, type, parent) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        &[
            json!(cid),
            json!(format!("Title {cid}")),
            json!(format!("slug-{cid}")),
            json!(1_700_000_000 + cid),
            json!(format!("Body of {cid}")),
            json!(kind),
            json!(parent),
        ],
    )
    .await;
}

pub async fn seed_comment(driver: &dyn StorageDriver, coid: i64, cid: i64, author: &str) {
    exec(
        driver,
        "INSERT INTO typecho_comments (coid, cid, author, text, parent) VALUES (?, ?, ?, ?, 0)",
        &[json!(coid), json!(cid), json!(author), json!(format!("comment {coid}"))],
    )
    .await;
}

pub async fn seed_field(driver: &dyn StorageDriver, cid: i64, name: &str, value: &str) {
    exec(
        driver,
        "INSERT INTO typecho_fields (cid, name, type, str_value) VALUES (?, ?, 'str', ?)",
        &[json!(cid), json!(name), json!(value)],
    )
    .await;
}

pub async fn seed_relationship(driver: &dyn StorageDriver, cid: i64, mid: i64) {
    exec(
        driver,
        "INSERT INTO typecho_relationships (cid, mid) VALUES (?, ?)",
        &[json!(cid), json!(mid)],
    )
    .await;
}

/// Empty every content and reference table.
pub async fn clear_store(driver: &dyn StorageDriver) {
    for table in [
        "typecho_contents",
        "typecho_comments",
        "typecho_fields",
        "typecho_relationships",
    ] {
        exec(driver, &format!("DELETE FROM {table}"), &[]).await;
    }
}

/// Wraps a driver and fails selected operations.
pub struct FailingDriver {
    inner: Arc<dyn StorageDriver>,
    fail_column: Option<String>,
    fail_sql: Option<String>,
}

impl FailingDriver {
    pub fn new(inner: Arc<dyn StorageDriver>) -> Self {
        Self {
            inner,
            fail_column: None,
            fail_sql: None,
        }
    }

    /// Refuse to add the column with this name.
    pub fn fail_add_column(mut self, name: &str) -> Self {
        self.fail_column = Some(name.to_string());
        self
    }

    /// Fail every statement whose SQL contains `fragment`.
    pub fn fail_sql_containing(mut self, fragment: &str) -> Self {
        self.fail_sql = Some(fragment.to_string());
        self
    }
}

#[async_trait]
impl StorageDriver for FailingDriver {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, sqlx::Error> {
        let inner = self.inner.begin().await?;
        Ok(Box::new(FailingTx {
            inner,
            fail_sql: self.fail_sql.clone(),
        }))
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, sqlx::Error> {
        self.inner.list_columns(table).await
    }

    async fn add_column(
        &self,
        table: &str,
        name: &str,
        column_type: &str,
    ) -> Result<(), sqlx::Error> {
        if self.fail_column.as_deref() == Some(name) {
            return Err(sqlx::Error::Protocol(format!("injected failure adding {name}")));
        }
        self.inner.add_column(table, name, column_type).await
    }
}

struct FailingTx {
    inner: Box<dyn Transaction>,
    fail_sql: Option<String>,
}

impl FailingTx {
    fn check(&self, sql: &str) -> Result<(), sqlx::Error> {
        match &self.fail_sql {
            Some(fragment) if sql.contains(fragment.as_str()) => {
                Err(sqlx::Error::Protocol(format!("injected failure: {sql}")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Transaction for FailingTx {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, sqlx::Error> {
        self.check(sql)?;
        self.inner.fetch_all(sql, params).await
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, sqlx::Error> {
        self.check(sql)?;
        self.inner.execute(sql, params).await
    }

    async fn reset_sequence(
        &mut self,
        table: &str,
        id_column: &str,
        next_id: i64,
    ) -> Result<(), sqlx::Error> {
        self.inner.reset_sequence(table, id_column, next_id).await
    }

    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.inner.rollback().await
    }
}
