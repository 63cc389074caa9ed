//! Request handlers for the credit ledger API.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use ofistur_common::{
    AccountId, BookingId, ClientId, Currency, EntryId, InvestmentId, OperatorDueId, OperatorId,
    Page, PageRequest, ReceiptId,
};
use ofistur_ledger::{
    AccountCreation, AccountFilter, AdjustBalance, AdjustmentOutcome, CreateAccount,
    CreditAccount, CreditEntry, DeletedEntry, EntryFilter, EntryPatch, MetricsSnapshot,
    PostEntry, PostedEntry, ReconciliationReport, UpdatedEntry,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Caller;
use crate::error::ApiResult;
use crate::state::AppState;

type JsonBody<T> = Result<Json<T>, JsonRejection>;
type PathParam<T> = Result<Path<T>, PathRejection>;
type QueryParams<T> = Result<Query<T>, QueryRejection>;

fn currency_filter(raw: Option<String>) -> ApiResult<Option<Currency>> {
    Ok(raw
        .filter(|code| !code.trim().is_empty())
        .map(|code| Currency::parse(&code))
        .transpose()?)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub storage: &'static str,
    pub uptime_seconds: u64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        storage: state.backend.as_str(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.engine.metrics().snapshot())
}

// Accounts

#[derive(Debug, Default, Deserialize)]
pub struct AccountQuery {
    pub client_id: Option<i64>,
    pub operator_id: Option<i64>,
    pub currency: Option<String>,
    pub enabled: Option<bool>,
    pub cursor: Option<Uuid>,
    pub take: Option<usize>,
}

pub async fn create_account(
    State(state): State<AppState>,
    Caller(auth): Caller,
    body: JsonBody<CreateAccount>,
) -> ApiResult<(StatusCode, Json<AccountCreation>)> {
    let Json(request) = body?;
    let creation = state.engine.create_account(&auth, request).await?;
    let status = if creation.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(creation)))
}

pub async fn list_accounts(
    State(state): State<AppState>,
    Caller(auth): Caller,
    query: QueryParams<AccountQuery>,
) -> ApiResult<Json<Page<CreditAccount>>> {
    let Query(query) = query?;
    let filter = AccountFilter {
        client_id: query.client_id.map(ClientId),
        operator_id: query.operator_id.map(OperatorId),
        currency: currency_filter(query.currency)?,
        enabled: query.enabled,
    };
    let page = PageRequest::new(query.cursor, query.take);
    Ok(Json(state.engine.list_accounts(&auth, &filter, &page).await?))
}

pub async fn get_account(
    State(state): State<AppState>,
    Caller(auth): Caller,
    id: PathParam<Uuid>,
) -> ApiResult<Json<CreditAccount>> {
    let Path(id) = id?;
    let account = state
        .engine
        .get_account(&auth, AccountId::from_uuid(id))
        .await?;
    Ok(Json(account))
}

#[derive(Debug, Deserialize)]
pub struct AccountUpdate {
    pub enabled: bool,
}

pub async fn update_account(
    State(state): State<AppState>,
    Caller(auth): Caller,
    id: PathParam<Uuid>,
    body: JsonBody<AccountUpdate>,
) -> ApiResult<Json<CreditAccount>> {
    let Path(id) = id?;
    let Json(update) = body?;
    let account = state
        .engine
        .set_account_enabled(&auth, AccountId::from_uuid(id), update.enabled)
        .await?;
    Ok(Json(account))
}

pub async fn adjust_balance(
    State(state): State<AppState>,
    Caller(auth): Caller,
    id: PathParam<Uuid>,
    body: JsonBody<AdjustBalance>,
) -> ApiResult<Json<AdjustmentOutcome>> {
    let Path(id) = id?;
    let Json(request) = body?;
    let outcome = state
        .engine
        .adjust_balance(&auth, AccountId::from_uuid(id), request)
        .await?;
    Ok(Json(outcome))
}

pub async fn reconcile_account(
    State(state): State<AppState>,
    Caller(auth): Caller,
    id: PathParam<Uuid>,
) -> ApiResult<Json<ReconciliationReport>> {
    let Path(id) = id?;
    let report = state
        .engine
        .reconcile_account(&auth, AccountId::from_uuid(id))
        .await?;
    Ok(Json(report))
}

// Entries

#[derive(Debug, Default, Deserialize)]
pub struct EntryQuery {
    pub account_id: Option<Uuid>,
    pub client_id: Option<i64>,
    pub operator_id: Option<i64>,
    pub currency: Option<String>,
    pub doc_type: Option<String>,
    pub booking_id: Option<i64>,
    pub receipt_id: Option<i64>,
    pub investment_id: Option<i64>,
    pub operator_due_id: Option<i64>,
    pub value_date_from: Option<NaiveDate>,
    pub value_date_to: Option<NaiveDate>,
    pub cursor: Option<Uuid>,
    pub take: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    pub allow_linked: Option<bool>,
}

pub async fn post_entry(
    State(state): State<AppState>,
    Caller(auth): Caller,
    body: JsonBody<PostEntry>,
) -> ApiResult<(StatusCode, Json<PostedEntry>)> {
    let Json(request) = body?;
    let posted = state.engine.post_entry(&auth, request).await?;
    Ok((StatusCode::CREATED, Json(posted)))
}

pub async fn list_entries(
    State(state): State<AppState>,
    Caller(auth): Caller,
    query: QueryParams<EntryQuery>,
) -> ApiResult<Json<Page<CreditEntry>>> {
    let Query(query) = query?;
    let filter = EntryFilter {
        account_id: query.account_id.map(AccountId::from_uuid),
        client_id: query.client_id.map(ClientId),
        operator_id: query.operator_id.map(OperatorId),
        currency: currency_filter(query.currency)?,
        doc_type: query.doc_type.filter(|d| !d.trim().is_empty()),
        booking_id: query.booking_id.map(BookingId),
        receipt_id: query.receipt_id.map(ReceiptId),
        investment_id: query.investment_id.map(InvestmentId),
        operator_due_id: query.operator_due_id.map(OperatorDueId),
        value_date_from: query.value_date_from,
        value_date_to: query.value_date_to,
    };
    let page = PageRequest::new(query.cursor, query.take);
    Ok(Json(state.engine.list_entries(&auth, &filter, &page).await?))
}

pub async fn get_entry(
    State(state): State<AppState>,
    Caller(auth): Caller,
    id: PathParam<Uuid>,
) -> ApiResult<Json<CreditEntry>> {
    let Path(id) = id?;
    let entry = state.engine.get_entry(&auth, EntryId::from_uuid(id)).await?;
    Ok(Json(entry))
}

pub async fn update_entry(
    State(state): State<AppState>,
    Caller(auth): Caller,
    id: PathParam<Uuid>,
    body: JsonBody<EntryPatch>,
) -> ApiResult<Json<UpdatedEntry>> {
    let Path(id) = id?;
    let Json(patch) = body?;
    let updated = state
        .engine
        .update_entry(&auth, EntryId::from_uuid(id), patch)
        .await?;
    Ok(Json(updated))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    Caller(auth): Caller,
    id: PathParam<Uuid>,
    query: QueryParams<DeleteQuery>,
) -> ApiResult<Json<DeletedEntry>> {
    let Path(id) = id?;
    let Query(query) = query?;
    let deleted = state
        .engine
        .delete_entry(
            &auth,
            EntryId::from_uuid(id),
            query.allow_linked.unwrap_or(false),
        )
        .await?;
    Ok(Json(deleted))
}
