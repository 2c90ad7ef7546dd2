use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use parking_lot::Mutex;
use polars::prelude::*;

use super::{next_created_at, sort_by_creation, CommentStore, StoreError, StoreResult};
use crate::model::{Comment, CommentId, NewComment};

const TABLE_FILE: &str = "comments.parquet";

/// Comment table persisted as one Parquet file under a data directory.
///
/// Every insert rewrites the whole file (write to a temp file, then rename) while
/// holding the table lock, so a concurrent list always sees a complete table.
/// File work runs on tokio's blocking pool, never on an async worker.
pub struct ParquetStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl ParquetStore {
    /// Open (or create) the table under `data_dir`.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> anyhow::Result<Self> {
        let dir = data_dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(TABLE_FILE);
        if !path.exists() {
            write_rows(&path, &[])?;
        }
        Ok(Self { path, lock: Arc::new(Mutex::new(())) })
    }

    pub fn path(&self) -> &Path { &self.path }
}

fn frame_for(rows: &[Comment]) -> PolarsResult<DataFrame> {
    let ids: Vec<String> = rows.iter().map(|c| c.id.0.clone()).collect();
    let texts: Vec<String> = rows.iter().map(|c| c.text.clone()).collect();
    let authors: Vec<String> = rows.iter().map(|c| c.author.clone()).collect();
    let stamps: Vec<i64> = rows.iter().map(|c| c.created_at.timestamp_micros()).collect();
    DataFrame::new(vec![
        Series::new("id".into(), ids).into(),
        Series::new("text".into(), texts).into(),
        Series::new("author".into(), authors).into(),
        Series::new("created_at_us".into(), stamps).into(),
    ])
}

fn read_rows(path: &Path) -> StoreResult<Vec<Comment>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let df = ParquetReader::new(File::open(path)?).finish()?;
    let ids = df.column("id")?.str()?;
    let texts = df.column("text")?.str()?;
    let authors = df.column("author")?.str()?;
    let stamps = df.column("created_at_us")?.i64()?;
    let mut out = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let (Some(id), Some(text), Some(author), Some(us)) = (ids.get(i), texts.get(i), authors.get(i), stamps.get(i)) else {
            return Err(StoreError::new(format!("incomplete row {} in {}", i, path.display())));
        };
        let created_at = DateTime::from_timestamp_micros(us)
            .ok_or_else(|| StoreError::new(format!("invalid created_at {} in row {}", us, i)))?;
        out.push(Comment { id: CommentId(id.to_string()), text: text.to_string(), author: author.to_string(), created_at });
    }
    Ok(out)
}

fn write_rows(path: &Path, rows: &[Comment]) -> StoreResult<()> {
    let mut df = frame_for(rows)?;
    let tmp = path.with_extension("parquet.tmp");
    {
        let mut f = File::create(&tmp)?;
        ParquetWriter::new(&mut f).finish(&mut df)?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

async fn run_blocking<T, F>(f: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::new(format!("parquet store task failed: {}", e)))?
}

#[async_trait]
impl CommentStore for ParquetStore {
    async fn insert(&self, new: NewComment) -> StoreResult<Comment> {
        let path = self.path.clone();
        let lock = Arc::clone(&self.lock);
        run_blocking(move || {
            let _guard = lock.lock();
            let mut rows = read_rows(&path)?;
            sort_by_creation(&mut rows);
            let created_at = next_created_at(rows.last().map(|c| c.created_at));
            let comment = Comment { id: CommentId::new_v4(), text: new.text, author: new.author, created_at };
            rows.push(comment.clone());
            write_rows(&path, &rows)?;
            tracing::debug!(target: "comments", id = %comment.id, rows = rows.len(), "parquet insert");
            Ok(comment)
        })
        .await
    }

    async fn list_ordered(&self) -> StoreResult<Vec<Comment>> {
        let path = self.path.clone();
        let lock = Arc::clone(&self.lock);
        run_blocking(move || {
            let _guard = lock.lock();
            let mut rows = read_rows(&path)?;
            sort_by_creation(&mut rows);
            Ok(rows)
        })
        .await
    }

    fn describe(&self) -> String { format!("parquet:{}", self.path.display()) }
}
