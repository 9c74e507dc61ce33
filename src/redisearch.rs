//! Thin helpers over the RediSearch commands used by the tool index and the
//! semantic cache. Both store hashes with a FLOAT32 `embedding` field and
//! query them with HNSW KNN under the COSINE metric.

use crate::error::{AppError, Result};
use redis::aio::ConnectionManager;
use redis::Value;
use std::collections::HashMap;

/// Safety valve on SCAN loops
const MAX_SCAN_ITERATIONS: usize = 1000;

/// Name of the score alias returned by KNN queries
pub const DISTANCE_FIELD: &str = "vector_distance";

/// Schema of a hash-backed vector index.
pub struct IndexSchema<'a> {
    pub name: &'a str,
    pub prefix: &'a str,
    pub text_fields: &'a [&'a str],
    pub tag_fields: &'a [&'a str],
    pub numeric_fields: &'a [&'a str],
    pub dimension: usize,
}

/// One document returned by a KNN query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub key: String,
    pub fields: HashMap<String, String>,
    /// Cosine distance (1 - similarity)
    pub distance: f32,
}

impl SearchHit {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// Encode a vector as the little-endian FLOAT32 blob RediSearch expects.
pub fn vector_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Returns false when FT.INFO reports the index as unknown.
pub async fn index_exists(conn: &ConnectionManager, name: &str) -> Result<bool> {
    let mut conn = conn.clone();
    let info: redis::RedisResult<Value> = redis::cmd("FT.INFO").arg(name).query_async(&mut conn).await;
    match info {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == redis::ErrorKind::ResponseError => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub async fn create_index(conn: &ConnectionManager, schema: &IndexSchema<'_>) -> Result<()> {
    let mut conn = conn.clone();
    let mut cmd = redis::cmd("FT.CREATE");
    cmd.arg(schema.name)
        .arg("ON")
        .arg("HASH")
        .arg("PREFIX")
        .arg(1)
        .arg(schema.prefix)
        .arg("SCHEMA");
    for field in schema.text_fields {
        cmd.arg(*field).arg("TEXT");
    }
    for field in schema.tag_fields {
        cmd.arg(*field).arg("TAG");
    }
    for field in schema.numeric_fields {
        cmd.arg(*field).arg("NUMERIC");
    }
    cmd.arg("embedding")
        .arg("VECTOR")
        .arg("HNSW")
        .arg(6)
        .arg("TYPE")
        .arg("FLOAT32")
        .arg("DIM")
        .arg(schema.dimension)
        .arg("DISTANCE_METRIC")
        .arg("COSINE");

    let _: Value = cmd.query_async(&mut conn).await?;

    tracing::info!(
        index = schema.name,
        prefix = schema.prefix,
        dimension = schema.dimension,
        "Vector index created"
    );
    Ok(())
}

pub async fn ensure_index(conn: &ConnectionManager, schema: &IndexSchema<'_>) -> Result<()> {
    if index_exists(conn, schema.name).await? {
        tracing::debug!(index = schema.name, "Vector index already exists");
        return Ok(());
    }
    create_index(conn, schema).await
}

/// Drop an index. With `delete_docs`, the indexed hashes go with it.
/// Dropping a missing index is not an error.
pub async fn drop_index(conn: &ConnectionManager, name: &str, delete_docs: bool) -> Result<()> {
    let mut conn = conn.clone();
    let mut cmd = redis::cmd("FT.DROPINDEX");
    cmd.arg(name);
    if delete_docs {
        cmd.arg("DD");
    }
    let reply: redis::RedisResult<Value> = cmd.query_async(&mut conn).await;
    match reply {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == redis::ErrorKind::ResponseError => {
            tracing::debug!(index = name, error = %e, "Index drop skipped");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Run a KNN query and return hits ordered by ascending distance.
pub async fn knn(
    conn: &ConnectionManager,
    index: &str,
    vector: &[f32],
    k: usize,
    return_fields: &[&str],
) -> Result<Vec<SearchHit>> {
    if k == 0 {
        return Ok(Vec::new());
    }

    let mut conn = conn.clone();
    let mut cmd = redis::cmd("FT.SEARCH");
    cmd.arg(index)
        .arg(format!("*=>[KNN {} @embedding $vec AS {}]", k, DISTANCE_FIELD))
        .arg("RETURN")
        .arg(return_fields.len() + 1);
    for field in return_fields {
        cmd.arg(*field);
    }
    cmd.arg(DISTANCE_FIELD)
        .arg("SORTBY")
        .arg(DISTANCE_FIELD)
        .arg("ASC")
        .arg("LIMIT")
        .arg(0)
        .arg(k)
        .arg("PARAMS")
        .arg(2)
        .arg("vec")
        .arg(vector_to_bytes(vector))
        .arg("DIALECT")
        .arg(2);

    let reply: Value = cmd.query_async(&mut conn).await?;
    parse_search_reply(reply)
}

/// Parse a RESP2 FT.SEARCH reply: `[total, key1, [f, v, ...], key2, [...], ...]`.
pub fn parse_search_reply(reply: Value) -> Result<Vec<SearchHit>> {
    let Value::Array(items) = reply else {
        return Err(AppError::StoreError(format!(
            "Unexpected FT.SEARCH reply: {:?}",
            reply
        )));
    };

    let mut hits = Vec::new();
    let mut iter = items.into_iter().skip(1);

    while let Some(key) = iter.next() {
        let key = value_to_string(&key).ok_or_else(|| {
            AppError::StoreError("FT.SEARCH reply contained a non-string key".into())
        })?;

        let mut fields = HashMap::new();
        if let Some(Value::Array(pairs)) = iter.next() {
            for pair in pairs.chunks(2) {
                if let [name, value] = pair {
                    if let (Some(name), Some(value)) = (value_to_string(name), value_to_string(value)) {
                        fields.insert(name, value);
                    }
                }
            }
        }

        let distance = fields
            .get(DISTANCE_FIELD)
            .and_then(|d| d.parse::<f32>().ok())
            .unwrap_or(1.0);

        hits.push(SearchHit {
            key,
            fields,
            distance,
        });
    }

    Ok(hits)
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::SimpleString(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Double(d) => Some(d.to_string()),
        _ => None,
    }
}

/// Collect every key matching `pattern` using non-blocking SCAN.
pub async fn scan_keys(conn: &ConnectionManager, pattern: &str) -> Result<Vec<String>> {
    let mut conn = conn.clone();
    let mut keys: Vec<String> = Vec::new();
    let mut cursor: u64 = 0;
    let mut iterations = 0;

    loop {
        let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(100)
            .query_async(&mut conn)
            .await?;

        keys.extend(batch);
        cursor = next_cursor;
        iterations += 1;

        if cursor == 0 || iterations >= MAX_SCAN_ITERATIONS {
            break;
        }
    }

    keys.sort_unstable();
    keys.dedup();
    Ok(keys)
}

/// Delete every key matching `pattern`, returning how many were removed.
pub async fn delete_matching(conn: &ConnectionManager, pattern: &str) -> Result<usize> {
    let keys = scan_keys(conn, pattern).await?;
    if keys.is_empty() {
        return Ok(0);
    }

    let mut conn = conn.clone();
    let deleted: usize = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn test_vector_bytes_are_little_endian_f32() {
        let bytes = vector_to_bytes(&[1.0f32, -0.5]);

        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[4..], &(-0.5f32).to_le_bytes());
    }

    #[test]
    fn test_parse_search_reply() {
        let reply = Value::Array(vec![
            Value::Int(2),
            bulk("tool:jira.get_issue"),
            Value::Array(vec![
                bulk("name"),
                bulk("jira.get_issue"),
                bulk(DISTANCE_FIELD),
                bulk("0.25"),
            ]),
            bulk("tool:zendesk.get_ticket"),
            Value::Array(vec![bulk("name"), bulk("zendesk.get_ticket"), bulk(DISTANCE_FIELD), bulk("0.5")]),
        ]);

        let hits = parse_search_reply(reply).unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].key, "tool:jira.get_issue");
        assert_eq!(hits[0].field("name"), Some("jira.get_issue"));
        assert!((hits[0].similarity() - 0.75).abs() < 1e-6);
        assert!((hits[1].distance - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_parse_empty_reply() {
        let hits = parse_search_reply(Value::Array(vec![Value::Int(0)])).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(parse_search_reply(Value::Nil).is_err());
    }

    #[test]
    fn test_missing_distance_defaults_to_max() {
        let reply = Value::Array(vec![
            Value::Int(1),
            bulk("k"),
            Value::Array(vec![bulk("name"), bulk("x")]),
        ]);
        let hits = parse_search_reply(reply).unwrap();
        assert_eq!(hits[0].distance, 1.0);
    }
}
