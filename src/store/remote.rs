//! Remote libSQL engine (Turso) reached through the Hrana-over-HTTP pipeline
//! endpoint. Plain calls open and close a stream in one request; a
//! transaction keeps the stream alive by threading the baton through each
//! round trip.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{Database, FetchMode, QueryOutput, Row, StoreError, Transaction, Value};

#[derive(Clone)]
pub struct RemoteDatabase {
    client: reqwest::Client,
    base_url: String,
    auth_token: String,
}

impl RemoteDatabase {
    pub fn new(url: &str, auth_token: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: http_base_url(url),
            auth_token: auth_token.to_string(),
        })
    }

    async fn pipeline(
        &self,
        base_url: &str,
        baton: Option<&str>,
        requests: Vec<StreamRequest>,
    ) -> Result<PipelineResponse, StoreError> {
        let body = PipelineRequest { baton, requests };
        let resp = self
            .client
            .post(format!("{}/v2/pipeline", base_url))
            .bearer_auth(&self.auth_token)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(StoreError::Remote(format!("http {}: {}", status, text)));
        }
        Ok(resp.json::<PipelineResponse>().await?)
    }
}

#[async_trait]
impl Database for RemoteDatabase {
    async fn execute(
        &self,
        sql: &str,
        params: Vec<Value>,
        fetch: FetchMode,
    ) -> Result<QueryOutput, StoreError> {
        let requests = vec![execute_request(sql, params, fetch), StreamRequest::Close];
        let resp = self.pipeline(&self.base_url, None, requests).await?;
        let mut results = resp.results.into_iter();
        let first = results
            .next()
            .ok_or_else(|| StoreError::Remote("empty pipeline response".to_string()))?;
        statement_output(first, fetch)
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let mut tx = RemoteTransaction {
            db: self.clone(),
            base_url: self.base_url.clone(),
            baton: None,
            finished: false,
        };
        tx.execute("BEGIN", Vec::new(), FetchMode::None).await?;
        Ok(Box::new(tx))
    }

    fn name(&self) -> &'static str {
        "libsql-remote"
    }
}

pub struct RemoteTransaction {
    db: RemoteDatabase,
    base_url: String,
    baton: Option<String>,
    finished: bool,
}

impl RemoteTransaction {
    async fn finish(&mut self, sql: &str) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Finished);
        }
        self.finished = true;
        let requests = vec![
            execute_request(sql, Vec::new(), FetchMode::None),
            StreamRequest::Close,
        ];
        let resp = self
            .db
            .pipeline(&self.base_url, self.baton.as_deref(), requests)
            .await?;
        let first = resp
            .results
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Remote("empty pipeline response".to_string()))?;
        statement_output(first, FetchMode::None).map(|_| ())
    }
}

#[async_trait]
impl Transaction for RemoteTransaction {
    async fn execute(
        &mut self,
        sql: &str,
        params: Vec<Value>,
        fetch: FetchMode,
    ) -> Result<QueryOutput, StoreError> {
        if self.finished {
            return Err(StoreError::Finished);
        }
        let requests = vec![execute_request(sql, params, fetch)];
        let resp = self
            .db
            .pipeline(&self.base_url, self.baton.as_deref(), requests)
            .await?;
        if let Some(url) = resp.base_url {
            debug!("remote stream moved to {}", url);
            self.base_url = http_base_url(&url);
        }
        self.baton = resp.baton;
        let first = resp
            .results
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Remote("empty pipeline response".to_string()))?;
        statement_output(first, fetch)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.finish("COMMIT").await
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for RemoteTransaction {
    fn drop(&mut self) {
        if !self.finished {
            warn!("remote transaction dropped without commit, server will roll it back");
        }
    }
}

/// `libsql://host` and `wss://host` urls are served over https.
pub fn http_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if let Some(rest) = url.strip_prefix("libsql://") {
        return format!("https://{}", rest);
    }
    if let Some(rest) = url.strip_prefix("wss://") {
        return format!("https://{}", rest);
    }
    if let Some(rest) = url.strip_prefix("ws://") {
        return format!("http://{}", rest);
    }
    url.to_string()
}

#[derive(Serialize)]
struct PipelineRequest<'a> {
    baton: Option<&'a str>,
    requests: Vec<StreamRequest>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamRequest {
    Execute { stmt: HranaStmt },
    Close,
}

#[derive(Serialize)]
struct HranaStmt {
    sql: String,
    args: Vec<HranaValue>,
    want_rows: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HranaValue {
    Null,
    Integer { value: String },
    Float { value: f64 },
    Text { value: String },
    Blob { base64: String },
}

#[derive(Deserialize)]
struct PipelineResponse {
    baton: Option<String>,
    base_url: Option<String>,
    results: Vec<StreamResult>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamResult {
    Ok { response: StreamResponse },
    Error { error: HranaError },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamResponse {
    Execute { result: StmtResult },
    Close,
}

#[derive(Deserialize)]
struct HranaError {
    message: String,
    code: Option<String>,
}

#[derive(Deserialize)]
struct StmtResult {
    cols: Vec<HranaCol>,
    rows: Vec<Vec<HranaValue>>,
    affected_row_count: u64,
    last_insert_rowid: Option<String>,
}

#[derive(Deserialize)]
struct HranaCol {
    name: Option<String>,
}

fn execute_request(sql: &str, params: Vec<Value>, fetch: FetchMode) -> StreamRequest {
    StreamRequest::Execute {
        stmt: HranaStmt {
            sql: sql.to_string(),
            args: params.into_iter().map(to_hrana).collect(),
            want_rows: fetch != FetchMode::None,
        },
    }
}

fn to_hrana(value: Value) -> HranaValue {
    match value {
        Value::Null => HranaValue::Null,
        Value::Integer(v) => HranaValue::Integer { value: v.to_string() },
        Value::Real(v) => HranaValue::Float { value: v },
        Value::Text(v) => HranaValue::Text { value: v },
        Value::Blob(v) => HranaValue::Blob { base64: BASE64.encode(v) },
    }
}

fn from_hrana(value: HranaValue) -> Result<Value, StoreError> {
    Ok(match value {
        HranaValue::Null => Value::Null,
        HranaValue::Integer { value } => Value::Integer(
            value
                .parse()
                .map_err(|_| StoreError::Remote(format!("bad integer `{}`", value)))?,
        ),
        HranaValue::Float { value } => Value::Real(value),
        HranaValue::Text { value } => Value::Text(value),
        HranaValue::Blob { base64 } => Value::Blob(
            BASE64
                .decode(base64.as_bytes())
                .map_err(|e| StoreError::Remote(format!("bad blob: {}", e)))?,
        ),
    })
}

fn statement_output(result: StreamResult, fetch: FetchMode) -> Result<QueryOutput, StoreError> {
    let result = match result {
        StreamResult::Ok {
            response: StreamResponse::Execute { result },
        } => result,
        StreamResult::Ok {
            response: StreamResponse::Close,
        } => return Err(StoreError::Remote("unexpected close response".to_string())),
        StreamResult::Error { error } => {
            return Err(StoreError::Remote(match error.code {
                Some(code) => format!("{} ({})", error.message, code),
                None => error.message,
            }))
        }
    };

    let names = result
        .cols
        .into_iter()
        .enumerate()
        .map(|(i, c)| c.name.unwrap_or_else(|| format!("col{}", i)))
        .collect::<Vec<_>>();
    let take = match fetch {
        FetchMode::None => 0,
        FetchMode::One => 1,
        FetchMode::All => usize::MAX,
    };
    let mut rows = Vec::new();
    for raw in result.rows.into_iter().take(take) {
        let mut values = HashMap::with_capacity(names.len());
        for (name, value) in names.iter().zip(raw) {
            values.insert(name.clone(), from_hrana(value)?);
        }
        rows.push(Row::from_values(values));
    }
    let last_insert_id = result
        .last_insert_rowid
        .and_then(|id| id.parse::<i64>().ok());

    Ok(QueryOutput {
        rows,
        rows_affected: result.affected_row_count,
        last_insert_id,
    })
}
