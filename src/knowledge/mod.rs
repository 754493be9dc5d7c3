//! 协议知识库（KnowledgeRepository 协作方）
//!
//! search(query) 返回有序的协议片段，可能为空。
//! StaticKnowledgeRepository 固定返回基线片段；KnowledgeVault 从目录导入 .md/.txt 文档，
//! 按段落切分，以查询词重叠数排序（无向量检索）。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;
use walkdir::WalkDir;

/// 未配置知识库目录时的基线片段
pub const BASELINE_EXCERPTS: [&str; 2] = [
    "Standard Operating Procedure 4.2.1: Always wear protective eyewear.",
    "IEC 60601-1: Medical electrical equipment safety standards.",
];

#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("document not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("knowledge vault unavailable: {0}")]
    Unavailable(String),
}

/// 协议知识库协作方
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<String>, KnowledgeError>;
}

/// 固定片段（不看查询内容）
#[derive(Debug, Clone)]
pub struct StaticKnowledgeRepository {
    excerpts: Vec<String>,
}

impl StaticKnowledgeRepository {
    pub fn new(excerpts: Vec<String>) -> Self {
        Self { excerpts }
    }

    pub fn baseline() -> Self {
        Self::new(BASELINE_EXCERPTS.iter().map(|s| s.to_string()).collect())
    }
}

#[async_trait]
impl KnowledgeRepository for StaticKnowledgeRepository {
    async fn search(&self, query: &str) -> Result<Vec<String>, KnowledgeError> {
        tracing::info!(query = %query, "[KNOWLEDGE VAULT] Searching");
        Ok(self.excerpts.clone())
    }
}

/// 段落（来源文件 + 文本 + 小写词集合）
struct Passage {
    source: String,
    text: String,
    tokens: HashSet<String>,
}

/// 空行（含只有空白的行）分隔段落；\r\n 由 lines() 处理，段内空白折叠为单个空格
fn paragraphs(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join(" "));
                current.clear();
            }
        } else {
            current.extend(line.split_whitespace());
        }
    }
    if !current.is_empty() {
        out.push(current.join(" "));
    }
    out
}

/// 小写词集合：按非字母数字切分，丢弃单字符
fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() > 1)
        .collect()
}

/// 从目录导入的协议文档库
pub struct KnowledgeVault {
    passages: RwLock<Vec<Passage>>,
    documents: RwLock<Vec<PathBuf>>,
    max_results: usize,
}

impl KnowledgeVault {
    pub fn new(max_results: usize) -> Self {
        Self {
            passages: RwLock::new(Vec::new()),
            documents: RwLock::new(Vec::new()),
            max_results: max_results.max(1),
        }
    }

    /// 导入单个文档，返回新增段落数
    pub fn ingest_document(&self, path: impl AsRef<Path>) -> Result<usize, KnowledgeError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(KnowledgeError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| KnowledgeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let added = self.ingest_text(&source, &content)?;

        let mut documents = self
            .documents
            .write()
            .map_err(|_| KnowledgeError::Unavailable("lock poisoned".into()))?;
        documents.push(path.to_path_buf());
        tracing::info!(
            "Ingested {} ({} passages). Total documents: {}",
            path.display(),
            added,
            documents.len()
        );
        Ok(added)
    }

    /// 递归导入目录下的 .md / .txt，返回导入的文档数
    pub fn ingest_dir(&self, dir: impl AsRef<Path>) -> Result<usize, KnowledgeError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(KnowledgeError::NotFound(dir.to_path_buf()));
        }
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("md") | Some("txt")
                )
            })
            .collect();
        files.sort();

        let mut count = 0;
        for file in files {
            match self.ingest_document(&file) {
                Ok(_) => count += 1,
                Err(e) => tracing::warn!("Skipping {}: {}", file.display(), e),
            }
        }
        Ok(count)
    }

    /// 按空行切段后写入；空段落忽略
    pub fn ingest_text(&self, source: &str, content: &str) -> Result<usize, KnowledgeError> {
        let new_passages: Vec<Passage> = paragraphs(content)
            .into_iter()
            .map(|text| Passage {
                source: source.to_string(),
                tokens: tokenize_lower(&text),
                text,
            })
            .collect();
        let added = new_passages.len();
        self.passages
            .write()
            .map_err(|_| KnowledgeError::Unavailable("lock poisoned".into()))?
            .extend(new_passages);
        Ok(added)
    }

    pub fn document_count(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn passage_count(&self) -> usize {
        self.passages.read().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl KnowledgeRepository for KnowledgeVault {
    async fn search(&self, query: &str) -> Result<Vec<String>, KnowledgeError> {
        tracing::info!(query = %query, "[KNOWLEDGE VAULT] Searching");
        let query_tokens = tokenize_lower(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }
        let passages = self
            .passages
            .read()
            .map_err(|_| KnowledgeError::Unavailable("lock poisoned".into()))?;

        // 稳定排序：同分时保持导入顺序
        let mut scored: Vec<(usize, &Passage)> = passages
            .iter()
            .map(|p| (query_tokens.intersection(&p.tokens).count(), p))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let results: Vec<String> = scored
            .into_iter()
            .take(self.max_results)
            .map(|(_, p)| format!("{} ({})", p.text, p.source))
            .collect();
        Ok(results)
    }
}
