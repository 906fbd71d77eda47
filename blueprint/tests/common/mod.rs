#![allow(dead_code)]

use async_trait::async_trait;
use blueprint::database::{MigrationAdapter, SqliteAdapter};
use blueprint::{Error, Migrator, Result};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const TABLE: &str = "migration";

/// Operation that should fail on the memory adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Nothing,
    TableExist,
    CreateTable,
    Migrate,
    RecordUp,
    RecordDown,
}

#[derive(Debug, Default)]
pub struct MemoryState {
    pub table: bool,
    pub records: Vec<String>,
    pub executed: Vec<String>,
}

/// In-memory adapter that records every call
#[derive(Clone)]
pub struct MemoryAdapter {
    pub state: Arc<Mutex<MemoryState>>,
    pub fail_on: Arc<Mutex<FailOn>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            fail_on: Arc::new(Mutex::new(FailOn::Nothing)),
        }
    }

    pub fn fail_on(&self, op: FailOn) {
        *self.fail_on.lock().unwrap() = op;
    }

    pub fn records(&self) -> Vec<String> {
        self.state.lock().unwrap().records.clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    fn check(&self, op: FailOn) -> Result<()> {
        if *self.fail_on.lock().unwrap() == op {
            Err(Error::invalid_input(format!("injected failure: {:?}", op)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MigrationAdapter for MemoryAdapter {
    fn name(&self) -> &str {
        "Memory"
    }

    fn extension(&self) -> &str {
        "sql"
    }

    async fn table_exist(&self) -> Result<()> {
        self.check(FailOn::TableExist)?;
        if self.state.lock().unwrap().table {
            Ok(())
        } else {
            Err(Error::invalid_input("no table"))
        }
    }

    async fn create_table(&self) -> Result<()> {
        self.check(FailOn::CreateTable)?;
        self.state.lock().unwrap().table = true;
        Ok(())
    }

    async fn status(&self) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().records.last().cloned())
    }

    async fn migrate(&self, sql: &str) -> Result<()> {
        self.check(FailOn::Migrate)?;
        self.state.lock().unwrap().executed.push(sql.to_string());
        Ok(())
    }

    async fn record_up(&self, name: &str) -> Result<()> {
        self.check(FailOn::RecordUp)?;
        self.state.lock().unwrap().records.push(name.to_string());
        Ok(())
    }

    async fn record_down(&self, name: &str) -> Result<()> {
        self.check(FailOn::RecordDown)?;
        self.state.lock().unwrap().records.retain(|r| r != name);
        Ok(())
    }
}

/// Write an up/down pair into `folder`
pub fn write_pair(folder: &Path, name: &str, up: &str, down: &str) {
    fs::create_dir_all(folder).unwrap();
    fs::write(folder.join(format!("{}.up.sql", name)), up).unwrap();
    fs::write(folder.join(format!("{}.down.sql", name)), down).unwrap();
}

/// Migrator over a fresh in-memory SQLite database
pub async fn sqlite_migrator(folder: &Path) -> (Migrator, sqlx::SqlitePool) {
    let pool = SqliteAdapter::memory_pool().await.unwrap();
    let adapter = SqliteAdapter::from_pool(pool.clone(), TABLE, "sql").unwrap();
    let migrator = Migrator::with_adapter(adapter, TABLE, folder).await.unwrap();
    (migrator, pool)
}

pub async fn table_exists(pool: &sqlx::SqlitePool, table: &str) -> bool {
    sqlx::query_scalar::<_, String>(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
    )
    .bind(table)
    .fetch_optional(pool)
    .await
    .unwrap()
    .is_some()
}
