//! Transport-agnostic request handlers.
//!
//! The HTTP layer only has to turn a request into a [`Request`] and write
//! the returned [`Response`]. Routes:
//!
//! | Method | Path | Body | Response |
//! |---|---|---|---|
//! | POST | `/reports` | JSON array of reports | `OK` |
//! | POST | `/query[/<since>]` | packed query vector | JSON array of reports |
//! | GET | `/sync[/<since>]` | - | JSON array of reports |
//!
//! `since` may also be given as a `since=` query parameter. When absent the
//! configured lookback is used.

use tracing::{debug, info, warn};

use serde_json::Value;

use tracebox_core::{HashedPk, Report};
use tracebox_store::{
    now_secs, Backend, PartialQueryFailure, QueryOutcome, ReportStore, RowError, StoreError,
    WriteOutcome,
};

use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};

/// Body returned by a successful submit.
pub const OK_BODY: &str = "OK";

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request as seen by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Method.
    pub method: Method,
    /// URL path, e.g. `/query/1588000000`.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl Request {
    /// A POST request.
    pub fn post(path: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: None,
            body: body.into(),
        }
    }

    /// A GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: None,
            body: Vec::new(),
        }
    }

    /// Attach a query string.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

/// A response to write back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP-style status code.
    pub status: u16,
    /// Body bytes.
    pub body: Vec<u8>,
    /// Set when some shards of a query failed, in which case the body holds
    /// only the rows that were read, or when some rows of a submitted batch
    /// were not stored. Transports surface this as a header.
    pub partial_failure: Option<String>,
}

impl Response {
    fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            partial_failure: None,
        }
    }

    fn error(err: &ServiceError) -> Self {
        Self {
            status: err.status(),
            body: err.to_string().into_bytes(),
            partial_failure: None,
        }
    }
}

/// Rows returned by a query or sync.
#[derive(Debug, Default)]
pub struct QueryResponse {
    /// Matching reports, in no particular order.
    pub reports: Vec<Report>,
    /// Shards that failed, if any.
    pub partial_failure: Option<PartialQueryFailure>,
}

impl QueryResponse {
    /// The JSON array of reports.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.reports)?)
    }
}

impl From<QueryOutcome> for QueryResponse {
    fn from(outcome: QueryOutcome) -> Self {
        Self {
            reports: outcome.reports,
            partial_failure: outcome.failure,
        }
    }
}

/// Extract `since` from a path such as `/query/<since>` or a `since=`
/// query parameter. The path segment wins when both are present.
pub fn parse_since(path: &str, query: Option<&str>) -> Result<Option<i64>> {
    let segment = path.trim_matches('/').split('/').nth(1).filter(|s| !s.is_empty());
    let param = query.and_then(|q| {
        q.split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "since")
            .map(|(_, value)| value)
    });

    segment
        .or(param)
        .map(|raw| {
            raw.parse::<i64>()
                .map_err(|e| ServiceError::InvalidSince(format!("{:?}: {}", raw, e)))
        })
        .transpose()
}

/// The report service: one store, shared by every handler.
pub struct ReportService<B> {
    store: ReportStore<B>,
    lookback_secs: i64,
}

impl ReportService<Box<dyn Backend>> {
    /// Validate `config` and open its backend.
    pub fn open(config: &ServiceConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.open_backend()?, config)
    }
}

impl<B: Backend> ReportService<B> {
    /// Create a service over an already opened backend.
    ///
    /// A backend pinned to a bucket width other than `config.prefix_bits`
    /// is refused.
    pub fn new(backend: B, config: &ServiceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: ReportStore::open(backend, config.store_config()?)?,
            lookback_secs: config.default_lookback_secs,
        })
    }

    /// Get the underlying store.
    pub fn store(&self) -> &ReportStore<B> {
        &self.store
    }

    /// Store a JSON array of reports.
    ///
    /// Fails only if the body is not a JSON array or the backend could not
    /// attempt the batch. Rows that do not decode are rejected one by one
    /// and the rest are still written; per-row failures are in the outcome.
    pub async fn submit_reports(&self, body: &[u8]) -> Result<WriteOutcome> {
        let rows: Vec<Value> = serde_json::from_slice(body)?;
        let count = rows.len();

        let mut positions = Vec::with_capacity(count);
        let mut reports = Vec::with_capacity(count);
        let mut undecodable = Vec::new();
        for (index, row) in rows.into_iter().enumerate() {
            let hashed_pk = row
                .get("hashedPK")
                .and_then(Value::as_str)
                .and_then(|h| HashedPk::from_hex(h).ok());
            match serde_json::from_value::<Report>(row) {
                Ok(report) => {
                    positions.push(index);
                    reports.push(report);
                }
                Err(e) => undecodable.push(RowError::new(
                    index,
                    hashed_pk,
                    &StoreError::Rejected(e.to_string()),
                )),
            }
        }

        let mut outcome = self.store.write_batch(reports).await?;
        for row in &mut outcome.rejected {
            row.index = positions[row.index];
        }
        outcome.rejected.append(&mut undecodable);
        outcome.rejected.sort_by_key(|r| r.index);

        if !outcome.is_complete() {
            warn!(
                submitted = count,
                rejected = outcome.rejected.len(),
                "some reports were not stored"
            );
        }
        Ok(outcome)
    }

    /// Reports in the buckets of a packed vector, ingested since `since`
    /// (default: now minus the configured lookback).
    pub async fn query_reports(&self, vector: &[u8], since: Option<i64>) -> Result<QueryResponse> {
        let since = self.resolve_since(since);
        debug!(bytes = vector.len(), since, "bucket query");
        Ok(self.store.query(vector, since).await?.into())
    }

    /// Every report ingested since `since`.
    pub async fn sync_reports(&self, since: Option<i64>) -> Result<QueryResponse> {
        let since = self.resolve_since(since);
        debug!(since, "sync");
        Ok(self.store.sync(since).await?.into())
    }

    fn resolve_since(&self, since: Option<i64>) -> i64 {
        since.unwrap_or_else(|| now_secs() - self.lookback_secs)
    }

    /// Route and serve a request. Never fails: errors become error
    /// responses.
    pub async fn handle(&self, request: &Request) -> Response {
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(path = %request.path, status = e.status(), error = %e, "request failed");
                Response::error(&e)
            }
        }
    }

    async fn dispatch(&self, request: &Request) -> Result<Response> {
        let route = request.path.trim_matches('/').split('/').next().unwrap_or("");
        match (request.method, route) {
            (Method::Post, "reports") => {
                let outcome = self.submit_reports(&request.body).await?;
                info!(accepted = outcome.accepted, "reports submitted");
                let mut out = Response::ok(OK_BODY);
                if !outcome.is_complete() {
                    out.partial_failure = Some(format!(
                        "{} of {} rows rejected",
                        outcome.rejected.len(),
                        outcome.accepted + outcome.rejected.len()
                    ));
                }
                Ok(out)
            }
            (Method::Post, "query") => {
                let since = parse_since(&request.path, request.query.as_deref())?;
                let response = self.query_reports(&request.body, since).await?;
                Self::rows_response(response)
            }
            (Method::Get, "sync") => {
                let since = parse_since(&request.path, request.query.as_deref())?;
                let response = self.sync_reports(since).await?;
                Self::rows_response(response)
            }
            _ => Err(ServiceError::NotFound(request.path.clone())),
        }
    }

    fn rows_response(response: QueryResponse) -> Result<Response> {
        let mut out = Response::ok(response.to_json()?);
        out.partial_failure = response.partial_failure.map(|f| f.to_string());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracebox_core::{pack_vector, PrefixWidth};
    use tracebox_store::{MemoryBackend, RowFailure, SqliteBackend};

    fn service() -> ReportService<MemoryBackend> {
        ReportService::new(MemoryBackend::new(), &ServiceConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_since_path_and_param() {
        assert_eq!(parse_since("/query/1588000000", None).unwrap(), Some(1_588_000_000));
        assert_eq!(parse_since("/query/", Some("since=42")).unwrap(), Some(42));
        assert_eq!(parse_since("/query", Some("a=1&since=7&b=2")).unwrap(), Some(7));
        assert_eq!(parse_since("/query/5", Some("since=42")).unwrap(), Some(5));
        assert_eq!(parse_since("/query", None).unwrap(), None);
        assert!(matches!(
            parse_since("/query/yesterday", None),
            Err(ServiceError::InvalidSince(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_then_query_round_trip() {
        let svc = service();
        let report = Report::new(HashedPk::of(b"contact"), vec![0xAB; 40]);
        let body = serde_json::to_vec(&vec![report.clone()]).unwrap();

        let resp = svc.handle(&Request::post("/reports", body)).await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, OK_BODY.as_bytes());

        let width = svc.store().config().width;
        let vector = pack_vector(&[report.bucket(width)], width).unwrap();
        let resp = svc.handle(&Request::post("/query/0", vector)).await;
        assert_eq!(resp.status, 200);
        assert!(resp.partial_failure.is_none());

        let rows: Vec<Report> = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(rows, vec![report]);
    }

    #[tokio::test]
    async fn test_undecodable_row_does_not_sink_the_batch() {
        let svc = service();
        let good = Report::new(HashedPk::of(b"good"), vec![0x5A; 24]);
        let keyed = HashedPk::of(b"keyed");
        let body = serde_json::to_vec(&serde_json::json!([
            &good,
            {"hashedPK": "abcd", "encodedMsg": "0102"},
            {"hashedPK": keyed.to_hex(), "encodedMsg": "not hex"},
            "not an object",
        ]))
        .unwrap();

        let resp = svc.handle(&Request::post("/reports", body.clone())).await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.partial_failure.as_deref(), Some("3 of 4 rows rejected"));

        let outcome = svc.submit_reports(&body).await.unwrap();
        assert_eq!(outcome.accepted, 1);
        let rejected: Vec<_> = outcome
            .rejected
            .iter()
            .map(|r| (r.index, r.hashed_pk, r.failure))
            .collect();
        assert_eq!(
            rejected,
            vec![
                (1, None, RowFailure::Rejected),
                (2, Some(keyed), RowFailure::Rejected),
                (3, None, RowFailure::Rejected),
            ]
        );

        let width = svc.store().config().width;
        let vector = pack_vector(&[good.bucket(width)], width).unwrap();
        let found = svc.query_reports(&vector, Some(0)).await.unwrap();
        assert_eq!(found.reports, vec![good]);
    }

    #[tokio::test]
    async fn test_rejected_rows_keep_batch_positions() {
        let svc = service();
        let batch = serde_json::json!([
            {"hashedPK": "00", "encodedMsg": "01"},
            Report::new(HashedPk::of(b"empty"), Vec::new()),
            Report::new(HashedPk::of(b"fine"), vec![1, 2, 3]),
        ]);
        let outcome = svc
            .submit_reports(&serde_json::to_vec(&batch).unwrap())
            .await
            .unwrap();

        assert_eq!(outcome.accepted, 1);
        let indices: Vec<_> = outcome.rejected.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(outcome.rejected[1].hashed_pk, Some(HashedPk::of(b"empty")));
    }

    #[tokio::test]
    async fn test_non_array_body_is_refused() {
        let svc = service();
        let resp = svc
            .handle(&Request::post("/reports", br#"{"hashedPK": "00"}"#.to_vec()))
            .await;
        assert_eq!(resp.status, 400);
    }

    #[test]
    fn test_backend_width_must_match_config() {
        let backend = SqliteBackend::open_memory(PrefixWidth::BITS_18).unwrap();
        assert!(matches!(
            ReportService::new(backend, &ServiceConfig::default()),
            Err(ServiceError::Store(StoreError::InvalidData(_)))
        ));

        let backend = SqliteBackend::open_memory(PrefixWidth::BITS_18).unwrap();
        let config = ServiceConfig {
            prefix_bits: 18,
            ..ServiceConfig::default()
        };
        assert!(ReportService::new(backend, &config).is_ok());
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let svc = service();

        let resp = svc.handle(&Request::post("/reports", b"not json".to_vec())).await;
        assert_eq!(resp.status, 400);

        let resp = svc.handle(&Request::post("/query/0", Vec::new())).await;
        assert_eq!(resp.status, 400);

        let resp = svc.handle(&Request::post("/query/soon", vec![0u8; 3])).await;
        assert_eq!(resp.status, 400);

        let resp = svc.handle(&Request::get("/nowhere")).await;
        assert_eq!(resp.status, 404);
    }

    #[tokio::test]
    async fn test_default_lookback_hides_old_rows() {
        let svc = service();
        let old = Report::new(HashedPk::of(b"old"), vec![1; 8]);
        svc.store()
            .write_batch_at(vec![old.clone()], now_secs() - 7200)
            .await
            .unwrap();

        let width = svc.store().config().width;
        let vector = pack_vector(&[old.bucket(width)], width).unwrap();

        let recent = svc.query_reports(&vector, None).await.unwrap();
        assert!(recent.reports.is_empty());

        let all = svc.query_reports(&vector, Some(0)).await.unwrap();
        assert_eq!(all.reports, vec![old]);
    }

    #[tokio::test]
    async fn test_sync_route() {
        let svc = service();
        let reports: Vec<_> = (0u8..5)
            .map(|i| Report::new(HashedPk::of(&[i]), vec![i; 4]))
            .collect();
        svc.submit_reports(&serde_json::to_vec(&reports).unwrap())
            .await
            .unwrap();

        let resp = svc.handle(&Request::get("/sync").with_query("since=0")).await;
        assert_eq!(resp.status, 200);
        let rows: Vec<Report> = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(rows.len(), 5);
    }
}
