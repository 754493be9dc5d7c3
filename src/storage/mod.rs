//! 偏差记录（DeviationLog 协作方）
//!
//! 编排层只调用 record(...) -> {id, timestamp}；SqliteDeviationLog 落盘（rusqlite，经 spawn_blocking），
//! InMemoryDeviationLog 用于测试与无盘运行。记录只追加，不修改、不删除。

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use thiserror::Error;

/// 存储层错误
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 偏差严重程度
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    /// 回复中使用的图标
    pub fn icon(&self) -> &'static str {
        match self {
            Severity::Low | Severity::Medium => "⚠️",
            Severity::High => "🚨",
            Severity::Critical => "🔴",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 大小写不敏感；四个取值之外一律拒绝
impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(format!(
                "unsupported severity '{other}' (expected LOW, MEDIUM, HIGH or CRITICAL)"
            )),
        }
    }
}

/// 待写入的偏差
#[derive(Clone, Debug)]
pub struct NewDeviation {
    pub severity: Severity,
    pub description: String,
    pub recommended_action: String,
    /// 产生该偏差的会话
    pub session_id: Option<String>,
    /// 产生该偏差那一轮的延续令牌
    pub tool_signature: Option<String>,
}

impl NewDeviation {
    pub fn new(
        severity: Severity,
        description: impl Into<String>,
        recommended_action: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            description: description.into(),
            recommended_action: recommended_action.into(),
            session_id: None,
            tool_signature: None,
        }
    }
}

/// record 的返回：记录 ID 与写入时间
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviationReceipt {
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

/// 已存储的偏差
#[derive(Clone, Debug)]
pub struct Deviation {
    pub id: String,
    pub severity: String,
    pub description: String,
    pub recommended_action: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: Option<String>,
    pub tool_signature: Option<String>,
}

/// 偏差记录协作方
#[async_trait]
pub trait DeviationLog: Send + Sync {
    async fn record(&self, deviation: NewDeviation) -> Result<DeviationReceipt, StorageError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS deviations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    severity TEXT NOT NULL,
    description TEXT NOT NULL,
    recommended_action TEXT NOT NULL,
    session_id TEXT,
    tool_signature TEXT
);
CREATE INDEX IF NOT EXISTS idx_deviations_timestamp ON deviations(timestamp);
";

/// SQLite 偏差记录
#[derive(Clone)]
pub struct SqliteDeviationLog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDeviationLog {
    /// 打开（或创建）数据库；路径为 ":memory:" 时使用内存库，父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let conn = if path == Path::new(":memory:") {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Connection::open(path)?
        };
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 最近 limit 条，按写入倒序
    pub async fn recent(&self, limit: usize) -> Result<Vec<Deviation>, StorageError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, severity, description, recommended_action, session_id, tool_signature
                 FROM deviations ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], |row| {
                Ok(Deviation {
                    id: row.get::<_, i64>(0)?.to_string(),
                    timestamp: row.get(1)?,
                    severity: row.get(2)?,
                    description: row.get(3)?,
                    recommended_action: row.get(4)?,
                    session_id: row.get(5)?,
                    tool_signature: row.get(6)?,
                })
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok::<_, StorageError>(out)
        })
        .await
        .map_err(|e| StorageError::Unavailable(e.to_string()))?
    }

    pub async fn count(&self) -> Result<usize, StorageError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM deviations", [], |row| row.get(0))?;
            Ok::<_, StorageError>(n as usize)
        })
        .await
        .map_err(|e| StorageError::Unavailable(e.to_string()))?
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
    conn.lock()
        .map_err(|_| StorageError::Unavailable("deviation log lock poisoned".to_string()))
}

#[async_trait]
impl DeviationLog for SqliteDeviationLog {
    async fn record(&self, deviation: NewDeviation) -> Result<DeviationReceipt, StorageError> {
        let conn = Arc::clone(&self.conn);
        let receipt = tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let timestamp = Utc::now();
            conn.execute(
                "INSERT INTO deviations (timestamp, severity, description, recommended_action, session_id, tool_signature)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    timestamp,
                    deviation.severity.as_str(),
                    deviation.description,
                    deviation.recommended_action,
                    deviation.session_id,
                    deviation.tool_signature,
                ],
            )?;
            Ok::<_, StorageError>(DeviationReceipt {
                id: conn.last_insert_rowid().to_string(),
                timestamp,
            })
        })
        .await
        .map_err(|e| StorageError::Unavailable(e.to_string()))??;

        tracing::info!(
            id = %receipt.id,
            "[ANALYTICS] Deviation logged"
        );
        Ok(receipt)
    }
}

/// 内存偏差记录（测试、无盘运行）
#[derive(Default)]
pub struct InMemoryDeviationLog {
    records: Mutex<Vec<Deviation>>,
}

impl InMemoryDeviationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Deviation> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DeviationLog for InMemoryDeviationLog {
    async fn record(&self, deviation: NewDeviation) -> Result<DeviationReceipt, StorageError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StorageError::Unavailable("deviation log lock poisoned".to_string()))?;
        let receipt = DeviationReceipt {
            id: format!("dev_{}", records.len() + 1),
            timestamp: Utc::now(),
        };
        records.push(Deviation {
            id: receipt.id.clone(),
            severity: deviation.severity.as_str().to_string(),
            description: deviation.description,
            recommended_action: deviation.recommended_action,
            timestamp: receipt.timestamp,
            session_id: deviation.session_id,
            tool_signature: deviation.tool_signature,
        });
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_severity_parse_is_case_insensitive() {
        assert_eq!("High".parse::<Severity>(), Ok(Severity::High));
        assert_eq!(" critical ".parse::<Severity>(), Ok(Severity::Critical));
        assert_eq!(Severity::Medium.to_string(), "MEDIUM");
        assert!("SEVERE".parse::<Severity>().unwrap_err().contains("SEVERE"));
    }

    #[test]
    fn test_severity_icons() {
        assert_eq!(Severity::Low.icon(), "⚠️");
        assert_eq!(Severity::High.icon(), "🚨");
        assert_eq!(Severity::Critical.icon(), "🔴");
    }

    #[tokio::test]
    async fn test_sqlite_record_and_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("deviations.db");

        let log = SqliteDeviationLog::open(&db_path).unwrap();
        let mut dev = NewDeviation::new(
            Severity::High,
            "Glove breach near sterile field",
            "Replace gloves",
        );
        dev.session_id = Some("session_1".to_string());
        dev.tool_signature = Some("sim_00000000000000ab".to_string());

        let first = log.record(dev.clone()).await.unwrap();
        let second = log.record(dev).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(log.count().await.unwrap(), 2);

        drop(log);

        let reopened = SqliteDeviationLog::open(&db_path).unwrap();
        let recent = reopened.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, second.id);
        assert_eq!(recent[1].severity, "HIGH");
        assert_eq!(recent[1].session_id.as_deref(), Some("session_1"));
    }

    #[tokio::test]
    async fn test_in_memory_log_assigns_ids() {
        let log = InMemoryDeviationLog::new();
        let receipt = log
            .record(NewDeviation::new(Severity::Low, "Loose cable", "Secure cable"))
            .await
            .unwrap();
        assert_eq!(receipt.id, "dev_1");
        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, "LOW");
    }
}
