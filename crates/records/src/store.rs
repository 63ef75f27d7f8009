//! The record store: typed access to the records table.
//!
//! One handle wraps the pool and exposes exactly the operations the request
//! pipeline and the maintenance loops need. Query predicates are translated
//! from the wire envelope into SQL here; the metadata filter mini-language
//! arrives pre-parsed as [`MetaFilter`] variants and each variant is mapped
//! to this store's native form.

use crate::error::{ErrorKind, Result};
use crate::model::{CompressPolicy, Format, Physical, PolicySet, PolicyWindow, Record, Stats};
use exn::ResultExt;
use hoard_proto::{AccessKeys, MetaFilter, QueryRequest, parse_meta_filter};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::instrument;

use crate::Database;

/// Page size for the full-store scans used by the reconcilers.
pub const SCAN_PAGE_SIZE: i64 = 250;

#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    uid: String,
    read_key: Option<String>,
    write_key: Option<String>,
    family: Option<String>,
    ctime: f64,
    atime: i64,
    min_res: i64,
    mime: String,
    comp: Option<String>,
    delete_fixed: Option<i64>,
    delete_stale: Option<i64>,
    delete_stale_time: Option<i64>,
    compress_fixed: Option<i64>,
    compress_stale: Option<i64>,
    compress_stale_time: Option<i64>,
    compress_comp: Option<String>,
    accesses: i64,
    meta: String,
}

impl TryFrom<RecordRow> for Record {
    type Error = crate::error::Error;

    fn try_from(row: RecordRow) -> Result<Self> {
        let comp = row
            .comp
            .as_deref()
            .map(str::parse::<hoard_compress::Compression>)
            .transpose()
            .or_raise(|| ErrorKind::InvalidData("comp"))?;
        let compress_comp = row
            .compress_comp
            .as_deref()
            .map(str::parse::<hoard_compress::Compression>)
            .transpose()
            .or_raise(|| ErrorKind::InvalidData("compress_comp"))?;
        let meta = serde_json::from_str(&row.meta).or_raise(|| ErrorKind::InvalidData("meta"))?;
        Ok(Record {
            uid: row.uid,
            keys: AccessKeys { read: row.read_key, write: row.write_key },
            physical: Physical {
                family: row.family,
                ctime: row.ctime,
                atime: row.atime,
                min_res: u32::try_from(row.min_res).or_raise(|| ErrorKind::InvalidData("min_res"))?,
                format: Format { mime: row.mime, comp },
            },
            policy: PolicySet {
                delete: PolicyWindow {
                    fixed: row.delete_fixed,
                    stale: row.delete_stale,
                    stale_time: row.delete_stale_time,
                },
                compress: CompressPolicy {
                    comp: compress_comp,
                    window: PolicyWindow {
                        fixed: row.compress_fixed,
                        stale: row.compress_stale,
                        stale_time: row.compress_stale_time,
                    },
                },
            },
            stats: Stats { accesses: row.accesses },
            meta,
        })
    }
}

fn rows_to_records(rows: Vec<RecordRow>) -> Result<Vec<Record>> {
    rows.into_iter().map(Record::try_from).collect()
}

/// A regex filter that could not be pushed into SQL; applied to the result
/// page after the indexed predicates have run.
struct PostFilter {
    key: String,
    regex: Regex,
}

impl PostFilter {
    fn matches(&self, record: &Record) -> bool {
        match record.meta.get(&self.key) {
            Some(Value::String(s)) => self.regex.is_match(s),
            // Pattern filters only ever match string values.
            _ => false,
        }
    }
}

fn compile_regex(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .or_raise(|| ErrorKind::BadFilter(pattern.to_string()))
}

/// Compile a SQL-LIKE pattern to an anchored regex. A single trailing `%`
/// reduces to a plain prefix match.
fn compile_like(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    let source = if pattern.matches('%').count() == 1 && pattern.ends_with('%') {
        format!("^{}", regex::escape(&pattern[..pattern.len() - 1]))
    } else {
        format!("^{}$", regex::escape(pattern).replace('%', ".*"))
    };
    compile_regex(&source, case_insensitive)
}

/// JSON path addressing one metadata key.
fn meta_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace('"', ""))
}

/// Typed handle to the records table.
#[derive(Debug, Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl From<&Database> for RecordStore {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a freshly assembled record.
    ///
    /// Returns [`ErrorKind::Duplicate`] when another writer already claimed
    /// the uid; exactly one of a set of racing `put`s wins.
    #[instrument(skip(self, record), fields(uid = %record.uid))]
    pub async fn insert(&self, record: &Record) -> Result<()> {
        let meta = serde_json::to_string(&record.meta).or_raise(|| ErrorKind::InvalidData("meta"))?;
        let result = sqlx::query(include_str!("../queries/insert_record.sql"))
            .bind(&record.uid)
            .bind(&record.keys.read)
            .bind(&record.keys.write)
            .bind(&record.physical.family)
            .bind(record.physical.ctime)
            .bind(record.physical.atime)
            .bind(i64::from(record.physical.min_res))
            .bind(&record.physical.format.mime)
            .bind(record.physical.format.comp.map(|c| c.wire_name()))
            .bind(record.policy.delete.fixed)
            .bind(record.policy.delete.stale)
            .bind(record.policy.delete.stale_time)
            .bind(record.policy.compress.window.fixed)
            .bind(record.policy.compress.window.stale)
            .bind(record.policy.compress.window.stale_time)
            .bind(record.policy.compress.comp.map(|c| c.wire_name()))
            .bind(record.stats.accesses)
            .bind(meta)
            .execute(&self.pool)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                exn::bail!(ErrorKind::Duplicate(record.uid.clone()))
            },
            Err(e) => Err(e).or_raise(|| ErrorKind::Database),
        }
    }

    /// Fetch one record by uid.
    pub async fn get(&self, uid: &str) -> Result<Option<Record>> {
        let row: Option<RecordRow> = sqlx::query_as(include_str!("../queries/get_record.sql"))
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Record::try_from).transpose()
    }

    /// Persist every mutable field of a record. The identity fields (`uid`,
    /// `ctime`, `minRes`) are deliberately not part of the statement.
    #[instrument(skip(self, record), fields(uid = %record.uid))]
    pub async fn update(&self, record: &Record) -> Result<bool> {
        let meta = serde_json::to_string(&record.meta).or_raise(|| ErrorKind::InvalidData("meta"))?;
        let result = sqlx::query(include_str!("../queries/update_record.sql"))
            .bind(&record.keys.read)
            .bind(&record.keys.write)
            .bind(&record.physical.family)
            .bind(record.physical.atime)
            .bind(&record.physical.format.mime)
            .bind(record.physical.format.comp.map(|c| c.wire_name()))
            .bind(record.policy.delete.fixed)
            .bind(record.policy.delete.stale)
            .bind(record.policy.delete.stale_time)
            .bind(record.policy.compress.window.fixed)
            .bind(record.policy.compress.window.stale)
            .bind(record.policy.compress.window.stale_time)
            .bind(record.policy.compress.comp.map(|c| c.wire_name()))
            .bind(record.stats.accesses)
            .bind(meta)
            .bind(&record.uid)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Register a successful read in one atomic statement: bump `atime`,
    /// increment the access counter and refresh both denormalized stale
    /// deadlines. Returns the post-update record, or `None` if the record
    /// vanished.
    #[instrument(skip(self))]
    pub async fn touch(&self, uid: &str, now: i64) -> Result<Option<Record>> {
        let result = sqlx::query(include_str!("../queries/touch_record.sql"))
            .bind(now)
            .bind(uid)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(uid).await
    }

    /// Remove a record. Returns whether a row was actually dropped.
    #[instrument(skip(self))]
    pub async fn drop_record(&self, uid: &str) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/drop_record.sql"))
            .bind(uid)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether a record exists for the uid.
    pub async fn exists(&self, uid: &str) -> Result<bool> {
        let row: (i64,) = sqlx::query_as(include_str!("../queries/record_exists.sql"))
            .bind(uid)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(row.0 > 0)
    }

    /// Every distinct non-null family present in the store.
    pub async fn families(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(include_str!("../queries/list_families.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// One page of the full-store scan, in ascending `ctime` order. Pass the
    /// last returned `ctime` to continue, or a negative value to start over.
    pub async fn page_after(&self, ctime: f64, limit: i64) -> Result<Vec<Record>> {
        let rows: Vec<RecordRow> = sqlx::query_as(include_str!("../queries/page_after.sql"))
            .bind(ctime)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows_to_records(rows)
    }

    /// Records whose deletion policy has come due at `now`.
    pub async fn due_for_deletion(&self, now: i64, limit: i64) -> Result<Vec<Record>> {
        let rows: Vec<RecordRow> = sqlx::query_as(include_str!("../queries/due_delete.sql"))
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows_to_records(rows)
    }

    /// Records whose compression policy has come due at `now`.
    pub async fn due_for_compression(&self, now: i64, limit: i64) -> Result<Vec<Record>> {
        let rows: Vec<RecordRow> = sqlx::query_as(include_str!("../queries/due_compress.sql"))
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows_to_records(rows)
    }

    /// Evaluate a query envelope against the store, capped at `limit`
    /// records, sorted ascending by `ctime`. With `anonymous_only`, the
    /// scope is restricted to records whose read facet is world-accessible
    /// (what untrusted callers are allowed to see).
    ///
    /// Regex and LIKE metadata filters cannot ride the index; they are
    /// compiled here and applied to the capped result page after the SQL
    /// predicates.
    #[instrument(skip(self, query))]
    pub async fn search(&self, query: &QueryRequest, limit: i64, anonymous_only: bool) -> Result<Vec<Record>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM records WHERE 1=1");
        let mut post_filters: Vec<PostFilter> = Vec::new();
        if anonymous_only {
            builder.push(" AND read_key IS NULL");
        }

        // Family is always an equality match; null selects generic records.
        match &query.family {
            Some(family) => {
                builder.push(" AND family = ").push_bind(family.clone());
            },
            None => {
                builder.push(" AND family IS NULL");
            },
        }
        if let Some(min) = query.ctime.min {
            builder.push(" AND ctime >= ").push_bind(min);
        }
        if let Some(max) = query.ctime.max {
            builder.push(" AND ctime <= ").push_bind(max);
        }
        if let Some(min) = query.atime.min {
            builder.push(" AND atime >= ").push_bind(min);
        }
        if let Some(max) = query.atime.max {
            builder.push(" AND atime <= ").push_bind(max);
        }
        if let Some(min) = query.accesses.min {
            builder.push(" AND accesses >= ").push_bind(min);
        }
        if let Some(max) = query.accesses.max {
            builder.push(" AND accesses <= ").push_bind(max);
        }
        if let Some(mime) = &query.mime {
            if mime.contains('/') {
                builder.push(" AND mime = ").push_bind(mime.clone());
            } else {
                builder.push(" AND mime LIKE ").push_bind(format!("{mime}%"));
            }
        }

        for (key, value) in &query.meta {
            let path = meta_path(key);
            match value {
                Value::String(s) => match parse_meta_filter(s).map_err(|e| e.raise(ErrorKind::BadFilter(s.clone())))? {
                    MetaFilter::Literal(literal) => {
                        builder.push(" AND json_extract(meta, ").push_bind(path).push(") = ").push_bind(literal);
                    },
                    MetaFilter::Range { min, max } => {
                        builder.push(" AND json_extract(meta, ").push_bind(path.clone()).push(") >= ").push_bind(min);
                        builder.push(" AND json_extract(meta, ").push_bind(path).push(") <= ").push_bind(max);
                    },
                    MetaFilter::Gte(n) => {
                        builder.push(" AND json_extract(meta, ").push_bind(path).push(") >= ").push_bind(n);
                    },
                    MetaFilter::Lte(n) => {
                        builder.push(" AND json_extract(meta, ").push_bind(path).push(") <= ").push_bind(n);
                    },
                    MetaFilter::Regex { pattern, case_insensitive } => {
                        post_filters
                            .push(PostFilter { key: key.clone(), regex: compile_regex(&pattern, case_insensitive)? });
                    },
                    MetaFilter::Like { pattern, case_insensitive } => {
                        post_filters
                            .push(PostFilter { key: key.clone(), regex: compile_like(&pattern, case_insensitive)? });
                    },
                },
                Value::Number(n) => {
                    let n = n.as_f64().ok_or_else(|| exn::Exn::from(ErrorKind::BadFilter(n.to_string())))?;
                    builder.push(" AND json_extract(meta, ").push_bind(path).push(") = ").push_bind(n);
                },
                Value::Bool(b) => {
                    builder.push(" AND json_extract(meta, ").push_bind(path).push(") = ").push_bind(i64::from(*b));
                },
                Value::Null => {
                    builder.push(" AND json_extract(meta, ").push_bind(path).push(") IS NULL");
                },
                composite => {
                    // Composite values compare by their canonical JSON text.
                    let text = serde_json::to_string(composite).or_raise(|| ErrorKind::InvalidData("meta"))?;
                    builder.push(" AND json_extract(meta, ").push_bind(path).push(") = ").push_bind(text);
                },
            }
        }

        builder.push(" ORDER BY ctime ASC LIMIT ").push_bind(limit);
        let rows: Vec<RecordRow> = builder.build_query_as().fetch_all(&self.pool).await.or_raise(|| ErrorKind::Database)?;
        let mut records = rows_to_records(rows)?;
        if !post_filters.is_empty() {
            records.retain(|record| post_filters.iter().all(|f| f.matches(record)));
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Format, Physical, Record};
    use hoard_compress::Compression;
    use hoard_proto::MinMax;
    use serde_json::json;
    use std::collections::BTreeMap;

    async fn make_store() -> RecordStore {
        let db = Database::connect_in_memory().await.unwrap();
        RecordStore::from(&db)
    }

    fn make_record(uid: &str, ctime: f64) -> Record {
        Record {
            uid: uid.to_string(),
            keys: AccessKeys { read: Some("r".to_string()), write: Some("w".to_string()) },
            physical: Physical {
                family: None,
                ctime,
                atime: ctime as i64,
                min_res: 5,
                format: Format { mime: "text/plain".to_string(), comp: None },
            },
            policy: PolicySet::default(),
            stats: Stats::default(),
            meta: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let store = make_store().await;
        let mut record = make_record("u1", 100.5);
        record.physical.format.comp = Some(Compression::Gzip);
        record.meta.insert("show".to_string(), json!("firefly"));
        store.insert(&record).await.unwrap();
        let loaded = store.get("u1").await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_duplicate_uid_fails() {
        let store = make_store().await;
        store.insert(&make_record("u1", 1.0)).await.unwrap();
        let err = store.insert(&make_record("u1", 2.0)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Duplicate(uid) if uid == "u1"));
    }

    #[tokio::test]
    async fn test_touch_updates_access_state() {
        let store = make_store().await;
        let mut record = make_record("u1", 100.0);
        record.policy.delete = PolicyWindow { fixed: None, stale: Some(60), stale_time: Some(160) };
        store.insert(&record).await.unwrap();
        let touched = store.touch("u1", 500).await.unwrap().unwrap();
        assert_eq!(touched.physical.atime, 500);
        assert_eq!(touched.stats.accesses, 1);
        assert_eq!(touched.policy.delete.stale_time, Some(560));
        // Records without a stale policy keep their stale_time untouched
        assert!(touched.policy.compress.window.stale_time.is_none());
        // Touching a missing record reports it gone
        assert!(store.touch("missing", 500).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_persists_mutable_fields() {
        let store = make_store().await;
        let mut record = make_record("u1", 100.0);
        store.insert(&record).await.unwrap();
        record.meta.insert("tag".to_string(), json!("kept"));
        record.policy.compress = CompressPolicy {
            comp: Some(Compression::Bzip2),
            window: PolicyWindow { fixed: Some(9000), stale: None, stale_time: None },
        };
        assert!(store.update(&record).await.unwrap());
        let loaded = store.get("u1").await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(!store.update(&make_record("missing", 1.0)).await.unwrap());
    }

    #[tokio::test]
    async fn test_drop_and_exists() {
        let store = make_store().await;
        store.insert(&make_record("u1", 1.0)).await.unwrap();
        assert!(store.exists("u1").await.unwrap());
        assert!(store.drop_record("u1").await.unwrap());
        assert!(!store.exists("u1").await.unwrap());
        // Dropping again is a clean no-op
        assert!(!store.drop_record("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_families_are_distinct_and_sorted() {
        let store = make_store().await;
        for (uid, family) in [("a", Some("video")), ("b", Some("audio")), ("c", Some("video")), ("d", None)] {
            let mut record = make_record(uid, 1.0);
            record.physical.family = family.map(String::from);
            store.insert(&record).await.unwrap();
        }
        assert_eq!(store.families().await.unwrap(), ["audio", "video"]);
    }

    #[tokio::test]
    async fn test_page_after_walks_in_ctime_order() {
        let store = make_store().await;
        for i in 0..5 {
            store.insert(&make_record(&format!("u{i}"), f64::from(i))).await.unwrap();
        }
        let first = store.page_after(-1.0, 2).await.unwrap();
        assert_eq!(first.iter().map(|r| r.uid.as_str()).collect::<Vec<_>>(), ["u0", "u1"]);
        let next = store.page_after(first.last().unwrap().physical.ctime, 10).await.unwrap();
        assert_eq!(next.iter().map(|r| r.uid.as_str()).collect::<Vec<_>>(), ["u2", "u3", "u4"]);
    }

    #[tokio::test]
    async fn test_due_queries() {
        let store = make_store().await;
        let mut fixed = make_record("fixed", 1.0);
        fixed.policy.delete.fixed = Some(100);
        store.insert(&fixed).await.unwrap();
        let mut stale = make_record("stale", 2.0);
        stale.policy.delete.stale = Some(10);
        stale.policy.delete.stale_time = Some(150);
        store.insert(&stale).await.unwrap();
        let mut compress = make_record("compress", 3.0);
        compress.policy.compress =
            CompressPolicy { comp: Some(Compression::Gzip), window: PolicyWindow { fixed: Some(100), stale: None, stale_time: None } };
        store.insert(&compress).await.unwrap();

        let due = store.due_for_deletion(120, 100).await.unwrap();
        assert_eq!(due.iter().map(|r| r.uid.as_str()).collect::<Vec<_>>(), ["fixed"]);
        let due = store.due_for_deletion(200, 100).await.unwrap();
        assert_eq!(due.len(), 2);
        let due = store.due_for_compression(120, 100).await.unwrap();
        assert_eq!(due.iter().map(|r| r.uid.as_str()).collect::<Vec<_>>(), ["compress"]);
        // Nothing is due before any deadline
        assert!(store.due_for_deletion(50, 100).await.unwrap().is_empty());
    }

    fn meta_query(key: &str, value: serde_json::Value) -> QueryRequest {
        QueryRequest { meta: BTreeMap::from([(key.to_string(), value)]), ..QueryRequest::default() }
    }

    async fn seeded_store() -> RecordStore {
        let store = make_store().await;
        for (uid, ctime, mime, meta) in [
            ("u1", 1.0, "text/plain", json!({"show": "firefly", "season": 1})),
            ("u2", 2.0, "text/html", json!({"show": "Firefly", "season": 2})),
            ("u3", 3.0, "image/png", json!({"show": "farscape", "season": 4})),
        ] {
            let mut record = make_record(uid, ctime);
            record.physical.format.mime = mime.to_string();
            record.meta = serde_json::from_value(meta).unwrap();
            store.insert(&record).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_search_range_blocks_and_cap() {
        let store = seeded_store().await;
        let query = QueryRequest { ctime: MinMax { min: Some(1.5), max: None }, ..QueryRequest::default() };
        let hits = store.search(&query, 100, false).await.unwrap();
        assert_eq!(hits.iter().map(|r| r.uid.as_str()).collect::<Vec<_>>(), ["u2", "u3"]);
        // The cap holds and ordering is ascending ctime
        let capped = store.search(&QueryRequest::default(), 2, false).await.unwrap();
        assert_eq!(capped.iter().map(|r| r.uid.as_str()).collect::<Vec<_>>(), ["u1", "u2"]);
    }

    #[tokio::test]
    async fn test_search_family_equality() {
        let store = seeded_store().await;
        let mut other = make_record("u4", 4.0);
        other.physical.family = Some("video".to_string());
        store.insert(&other).await.unwrap();
        // Null family selects only generic records
        let generic = store.search(&QueryRequest::default(), 100, false).await.unwrap();
        assert_eq!(generic.len(), 3);
        let family = QueryRequest { family: Some("video".to_string()), ..QueryRequest::default() };
        let hits = store.search(&family, 100, false).await.unwrap();
        assert_eq!(hits.iter().map(|r| r.uid.as_str()).collect::<Vec<_>>(), ["u4"]);
    }

    #[tokio::test]
    async fn test_search_mime_exact_and_prefix() {
        let store = seeded_store().await;
        let exact = QueryRequest { mime: Some("text/html".to_string()), ..QueryRequest::default() };
        assert_eq!(store.search(&exact, 100, false).await.unwrap().len(), 1);
        let supertype = QueryRequest { mime: Some("text".to_string()), ..QueryRequest::default() };
        assert_eq!(store.search(&supertype, 100, false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_search_meta_literal_and_numeric() {
        let store = seeded_store().await;
        let hits = store.search(&meta_query("show", json!("firefly")), 100, false).await.unwrap();
        assert_eq!(hits.iter().map(|r| r.uid.as_str()).collect::<Vec<_>>(), ["u1"]);
        let hits = store.search(&meta_query("season", json!(4)), 100, false).await.unwrap();
        assert_eq!(hits.iter().map(|r| r.uid.as_str()).collect::<Vec<_>>(), ["u3"]);
    }

    #[tokio::test]
    async fn test_search_meta_range_and_relative() {
        let store = seeded_store().await;
        let hits = store.search(&meta_query("season", json!(":range:2:4")), 100, false).await.unwrap();
        assert_eq!(hits.iter().map(|r| r.uid.as_str()).collect::<Vec<_>>(), ["u2", "u3"]);
        let hits = store.search(&meta_query("season", json!(":lte:1")), 100, false).await.unwrap();
        assert_eq!(hits.iter().map(|r| r.uid.as_str()).collect::<Vec<_>>(), ["u1"]);
        let hits = store.search(&meta_query("season", json!(":gte:2")), 100, false).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_search_meta_regex_and_like() {
        let store = seeded_store().await;
        let hits = store.search(&meta_query("show", json!(":re:^fire")), 100, false).await.unwrap();
        assert_eq!(hits.iter().map(|r| r.uid.as_str()).collect::<Vec<_>>(), ["u1"]);
        let hits = store.search(&meta_query("show", json!(":re.i:^fire")), 100, false).await.unwrap();
        assert_eq!(hits.len(), 2);
        // Tail-only % is a prefix match
        let hits = store.search(&meta_query("show", json!(":like:fire%")), 100, false).await.unwrap();
        assert_eq!(hits.iter().map(|r| r.uid.as_str()).collect::<Vec<_>>(), ["u1"]);
        let hits = store.search(&meta_query("show", json!(":ilike:f%y")), 100, false).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_search_meta_escape_hatch() {
        let store = make_store().await;
        let mut record = make_record("odd", 1.0);
        record.meta.insert("note".to_string(), json!(":lte:5"));
        store.insert(&record).await.unwrap();
        // The escaped form matches the literal string, not a comparison.
        let hits = store.search(&meta_query("note", json!("::lte:5")), 100, false).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_search_anonymous_only_restriction() {
        let store = make_store().await;
        let mut keyed = make_record("keyed", 1.0);
        keyed.keys.read = Some("secret".to_string());
        store.insert(&keyed).await.unwrap();
        let mut open = make_record("open", 2.0);
        open.keys.read = None;
        store.insert(&open).await.unwrap();
        let hits = store.search(&QueryRequest::default(), 100, true).await.unwrap();
        assert_eq!(hits.iter().map(|r| r.uid.as_str()).collect::<Vec<_>>(), ["open"]);
        assert_eq!(store.search(&QueryRequest::default(), 100, false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_search_bad_filter_is_an_error() {
        let store = make_store().await;
        let err = store.search(&meta_query("x", json!(":nope:1")), 100, false).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::BadFilter(_)));
    }
}
