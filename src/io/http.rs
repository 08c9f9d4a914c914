//! HTTP JSON surface
//!
//! Door endpoints (check-in/out, live count) talk to the occupancy store;
//! admin and profile endpoints talk to the visit ledger. Ledger calls are
//! synchronous SQLite work and always run on the blocking pool.

use crate::domain::types::{MemberFilter, MemberId, MemberType, MonthKey, UnknownMemberType, VisitId};
use crate::domain::{MemberProfile, MemberSummary, VisitDetail, VisitSummary};
use crate::infra::Metrics;
use crate::io::prometheus::format_prometheus_metrics;
use crate::io::store::VisitStore;
use crate::services::ledger::{self, LedgerError, VisitLedger};
use crate::services::OccupancyStore;
use anyhow::Context;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub type HttpResponse = Response<Full<Bytes>>;

/// Paths served by this module; a known path with the wrong method is a 405
const ROUTES: &[&str] = &[
    "/count-json",
    "/checkin",
    "/checkout",
    "/status",
    "/admin/visits",
    "/admin/visits/today",
    "/admin/visits/user",
    "/admin/visits/pay",
    "/admin/visits/add",
    "/admin/visits/delete",
    "/admin/member/type",
    "/admin/member/poster-id",
    "/admin/members",
    "/member/profile",
    "/metrics",
    "/health",
];

/// Shared state handed to every request
pub struct AppState<S> {
    pub occupancy: Arc<OccupancyStore>,
    pub ledger: Arc<VisitLedger<S>>,
    pub metrics: Arc<Metrics>,
    pub site_id: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("not found")]
    NotFound,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("internal server error")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn into_response(self) -> HttpResponse {
        if let ApiError::Internal(detail) = &self {
            error!(error = %detail, "http_internal_error");
        }
        json_response(self.status(), &ErrorBody { ok: false, error: self.to_string() })
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::EmptyMemberId => ApiError::BadRequest(e.to_string()),
            LedgerError::Store(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("ledger task failed: {e}"))
    }
}

type ApiResult = Result<HttpResponse, ApiError>;

// Request and response bodies

#[derive(Debug, Serialize)]
struct ErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug, Serialize)]
struct CountResponse {
    count: usize,
    max: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    checked_in: bool,
    count: usize,
    max: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckInRequest {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MonthListing {
    month: MonthKey,
    month_label: String,
    is_prev: bool,
    rows: Vec<VisitSummary>,
}

#[derive(Debug, Serialize)]
struct TodayListing {
    date: String,
    rows: Vec<VisitSummary>,
}

#[derive(Debug, Serialize)]
struct RosterListing {
    month: MonthKey,
    rows: Vec<MemberSummary>,
}

#[derive(Debug, Deserialize)]
struct PayRequest {
    visit_id: i64,
    paid: bool,
}

#[derive(Debug, Deserialize)]
struct VisitIdRequest {
    visit_id: i64,
}

#[derive(Debug, Deserialize)]
struct MemberRequest {
    #[serde(default)]
    line_user_id: String,
}

#[derive(Debug, Deserialize)]
struct MemberTypeRequest {
    #[serde(default)]
    line_user_id: String,
    #[serde(default)]
    member_type: String,
}

#[derive(Debug, Deserialize)]
struct PosterIdRequest {
    #[serde(default)]
    line_user_id: String,
    #[serde(default)]
    poster_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OkResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    visit_id: Option<VisitId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl OkResponse {
    fn ok() -> Self {
        Self { ok: true, visit_id: None, message: None }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    exists: bool,
    #[serde(flatten)]
    profile: Option<MemberProfile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileRequest {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    member_type: String,
    #[serde(default)]
    display_name: String,
}

// Response helpers

fn response(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> HttpResponse {
    let mut resp = Response::new(Full::new(body.into()));
    *resp.status_mut() = status;
    resp.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => response(status, "application/json", bytes),
        Err(e) => {
            error!(error = %e, "json_encode_error");
            response(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "internal server error")
        }
    }
}

fn json_ok<T: Serialize>(body: &T) -> ApiResult {
    Ok(json_response(StatusCode::OK, body))
}

// Request helpers

fn query_params(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

fn param<'a>(params: &'a HashMap<String, String>, key: &str) -> &'a str {
    params.get(key).map(String::as_str).unwrap_or("")
}

fn required(value: &str, name: &str) -> Result<MemberId, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("{name} is required")));
    }
    Ok(MemberId::new(value))
}

fn parse_member_type(value: &str) -> Result<MemberType, ApiError> {
    value.parse().map_err(|e: UnknownMemberType| ApiError::BadRequest(e.to_string()))
}

async fn read_json<B, T>(body: B) -> Result<T, ApiError>
where
    B: Body,
    B::Error: std::fmt::Display,
    T: DeserializeOwned,
{
    let bytes = body
        .collect()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?
        .to_bytes();
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}

/// Run a ledger call on the blocking pool
async fn with_ledger<S, T, F>(state: &AppState<S>, f: F) -> Result<T, ApiError>
where
    S: VisitStore + 'static,
    T: Send + 'static,
    F: FnOnce(&VisitLedger<S>) -> ledger::Result<T> + Send + 'static,
{
    let ledger = state.ledger.clone();
    let result = tokio::task::spawn_blocking(move || f(&ledger)).await?;
    Ok(result?)
}

/// Handle one HTTP request; never fails at the transport level
pub async fn handle_request<S, B>(req: Request<B>, state: Arc<AppState<S>>) -> HttpResponse
where
    S: VisitStore + 'static,
    B: Body,
    B::Error: std::fmt::Display,
{
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let resp = route(req, &state).await.unwrap_or_else(ApiError::into_response);

    state.metrics.record_request(started.elapsed().as_micros() as u64);
    debug!(method = %method, path = %path, status = %resp.status().as_u16(), "http_request");
    resp
}

async fn route<S, B>(req: Request<B>, state: &AppState<S>) -> ApiResult
where
    S: VisitStore + 'static,
    B: Body,
    B::Error: std::fmt::Display,
{
    let (parts, body) = req.into_parts();
    let params = query_params(parts.uri.query());

    match (&parts.method, parts.uri.path()) {
        (&Method::GET, "/count-json") => count(state),
        (&Method::POST, "/checkin") => check_in(state, read_json(body).await?).await,
        (&Method::POST, "/checkout") => check_out(state, read_json(body).await?),
        (&Method::GET, "/status") => status(state, &params),
        (&Method::GET, "/admin/visits") => monthly_visits(state, &params).await,
        (&Method::GET, "/admin/visits/today") => today_visits(state).await,
        (&Method::GET, "/admin/visits/user") => visit_detail(state, &params).await,
        (&Method::POST, "/admin/visits/pay") => pay_visit(state, read_json(body).await?).await,
        (&Method::POST, "/admin/visits/add") => add_visit(state, read_json(body).await?).await,
        (&Method::POST, "/admin/visits/delete") => delete_visit(state, read_json(body).await?).await,
        (&Method::POST, "/admin/member/type") => member_type(state, read_json(body).await?).await,
        (&Method::POST, "/admin/member/poster-id") => poster_id(state, read_json(body).await?).await,
        (&Method::GET, "/admin/members") => members(state, &params).await,
        (&Method::GET, "/member/profile") => profile(state, &params).await,
        (&Method::POST, "/member/profile") => save_profile(state, read_json(body).await?).await,
        (&Method::GET, "/metrics") => {
            let occupancy = state.occupancy.current_count();
            let body = format_prometheus_metrics(
                &state.metrics,
                occupancy,
                state.occupancy.capacity(),
                &state.site_id,
            );
            Ok(response(StatusCode::OK, "text/plain; version=0.0.4; charset=utf-8", body))
        }
        (&Method::GET, "/health") => Ok(response(StatusCode::OK, "text/plain", "ok")),
        (_, path) if ROUTES.contains(&path) => Err(ApiError::MethodNotAllowed),
        _ => Err(ApiError::NotFound),
    }
}

fn count<S>(state: &AppState<S>) -> ApiResult {
    json_ok(&CountResponse {
        count: state.occupancy.current_count(),
        max: state.occupancy.capacity(),
    })
}

async fn check_in<S: VisitStore + 'static>(state: &AppState<S>, req: CheckInRequest) -> ApiResult {
    let member_id = required(&req.user_id, "userId")?;
    let count = state.occupancy.check_in(member_id.as_str());
    info!(user_id = %member_id, count = %count, "check_in");

    // The door stays open even when the visit cannot be written
    let display_name = req.display_name;
    let visit_member = member_id.clone();
    if let Err(e) =
        with_ledger(state, move |l| l.record_check_in_visit(&visit_member, &display_name)).await
    {
        warn!(user_id = %member_id, error = %e, "check_in_visit_not_recorded");
    }

    json_ok(&CountResponse { count, max: state.occupancy.capacity() })
}

fn check_out<S>(state: &AppState<S>, req: CheckInRequest) -> ApiResult {
    let member_id = required(&req.user_id, "userId")?;
    let count = state.occupancy.check_out(member_id.as_str());
    info!(user_id = %member_id, count = %count, "check_out");
    json_ok(&CountResponse { count, max: state.occupancy.capacity() })
}

fn status<S>(state: &AppState<S>, params: &HashMap<String, String>) -> ApiResult {
    let member_id = required(param(params, "userId"), "userId")?;
    let checked_in = state.occupancy.is_active(member_id.as_str());
    json_ok(&StatusResponse {
        checked_in,
        count: state.occupancy.current_count(),
        max: state.occupancy.capacity(),
    })
}

async fn monthly_visits<S: VisitStore + 'static>(
    state: &AppState<S>,
    params: &HashMap<String, String>,
) -> ApiResult {
    let current = MonthKey::of(state.ledger.calendar().now().date());
    let is_prev = param(params, "mode") == "prev";
    let month = if is_prev { current.previous() } else { current };
    let filter = MemberFilter::from_params(param(params, "q"), param(params, "member_type"));

    let rows = with_ledger(state, move |l| l.monthly_summaries(month, &filter)).await?;
    json_ok(&MonthListing { month, month_label: month.label(), is_prev, rows })
}

async fn today_visits<S: VisitStore + 'static>(state: &AppState<S>) -> ApiResult {
    let now = state.ledger.calendar().now();
    let rows = with_ledger(state, move |l| l.today_summary_at(now)).await?;
    json_ok(&TodayListing { date: now.format("%Y-%m-%d").to_string(), rows })
}

async fn visit_detail<S: VisitStore + 'static>(
    state: &AppState<S>,
    params: &HashMap<String, String>,
) -> ApiResult {
    let member_id = required(param(params, "line_user_id"), "line_user_id")?;
    // Empty or malformed month falls back to the current month
    let month: Option<MonthKey> = param(params, "month").parse().ok();

    let detail: VisitDetail =
        with_ledger(state, move |l| l.user_monthly_detail(&member_id, month)).await?;
    json_ok(&detail)
}

async fn pay_visit<S: VisitStore + 'static>(state: &AppState<S>, req: PayRequest) -> ApiResult {
    let visit_id = VisitId(req.visit_id);
    let paid = req.paid;
    if !with_ledger(state, move |l| l.set_paid(visit_id, paid)).await? {
        return Err(ApiError::NotFound);
    }
    json_ok(&OkResponse::ok())
}

async fn add_visit<S: VisitStore + 'static>(state: &AppState<S>, req: MemberRequest) -> ApiResult {
    let member_id = required(&req.line_user_id, "line_user_id")?;
    let visit_id = with_ledger(state, move |l| l.add_visit(&member_id)).await?;
    json_ok(&OkResponse { visit_id: Some(visit_id), ..OkResponse::ok() })
}

async fn delete_visit<S: VisitStore + 'static>(state: &AppState<S>, req: VisitIdRequest) -> ApiResult {
    let visit_id = VisitId(req.visit_id);
    if !with_ledger(state, move |l| l.delete_visit(visit_id)).await? {
        return Err(ApiError::NotFound);
    }
    json_ok(&OkResponse::ok())
}

async fn member_type<S: VisitStore + 'static>(
    state: &AppState<S>,
    req: MemberTypeRequest,
) -> ApiResult {
    let member_id = required(&req.line_user_id, "line_user_id")?;
    let member_type = parse_member_type(&req.member_type)?;
    if !with_ledger(state, move |l| l.set_member_type(&member_id, member_type)).await? {
        return Err(ApiError::NotFound);
    }
    json_ok(&OkResponse::ok())
}

async fn poster_id<S: VisitStore + 'static>(state: &AppState<S>, req: PosterIdRequest) -> ApiResult {
    let member_id = required(&req.line_user_id, "line_user_id")?;
    let poster_id = req.poster_id.trim().to_string();
    let name = with_ledger(state, move |l| l.set_poster_id(&member_id, &poster_id)).await?;
    json_ok(&OkResponse { message: Some(format!("Updated poster id for {name}")), ..OkResponse::ok() })
}

async fn members<S: VisitStore + 'static>(
    state: &AppState<S>,
    params: &HashMap<String, String>,
) -> ApiResult {
    let now = state.ledger.calendar().now();
    let filter = MemberFilter::from_params(param(params, "q"), param(params, "member_type"));
    let rows = with_ledger(state, move |l| l.member_roster_at(&filter, now)).await?;
    json_ok(&RosterListing { month: MonthKey::of(now.date()), rows })
}

async fn profile<S: VisitStore + 'static>(
    state: &AppState<S>,
    params: &HashMap<String, String>,
) -> ApiResult {
    let member_id = required(param(params, "userId"), "userId")?;
    let profile = with_ledger(state, move |l| l.member_profile(&member_id)).await?;
    json_ok(&ProfileResponse { exists: profile.is_some(), profile })
}

async fn save_profile<S: VisitStore + 'static>(state: &AppState<S>, req: ProfileRequest) -> ApiResult {
    let member_id = required(&req.user_id, "userId")?;
    if req.last_name.trim().is_empty() || req.first_name.trim().is_empty() {
        return Err(ApiError::BadRequest("lastName and firstName are required".to_string()));
    }
    let member_type = parse_member_type(&req.member_type)?;

    with_ledger(state, move |l| {
        l.save_member_profile(&member_id, &req.last_name, &req.first_name, member_type, &req.display_name)
    })
    .await?;
    json_ok(&OkResponse::ok())
}

/// Serve HTTP on an already-bound listener until shutdown is signalled
pub async fn serve<S: VisitStore + 'static>(
    listener: TcpListener,
    state: Arc<AppState<S>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { Ok::<_, Infallible>(handle_request(req, state).await) }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return;
                }
            }
        }
    }
}

/// Bind and start the HTTP server
pub async fn start_server<S: VisitStore + 'static>(
    addr: SocketAddr,
    state: Arc<AppState<S>>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {addr}"))?;

    info!(addr = %addr, site = %state.site_id, "http_server_started");
    serve(listener, state, shutdown).await;
    Ok(())
}
