//! PostgreSQL ledger store.
//!
//! Balance updates rely on `SELECT ... FOR UPDATE` row locks taken inside the
//! request's transaction; find-or-create of accounts is serialized with a
//! transaction-scoped advisory lock on the (agency, subject, currency) key and
//! backed by partial unique indexes.

use async_trait::async_trait;
use chrono::Utc;
use ofistur_common::{
    AccountId, AgencyId, BookingId, ClientId, Currency, EntryId, InvestmentId, LedgerError,
    OperatorDueId, OperatorId, Page, PageRequest, ReceiptId, Result, Subject, UserId,
};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row, Transaction};
use tracing::info;

use super::{AgencyCounter, LedgerStore, LedgerTx};
use crate::account::{AccountFilter, CreditAccount};
use crate::doc_type::DocType;
use crate::entry::{CreditEntry, EntryFilter, EntryLinks};

const ACCOUNT_COLUMNS: &str = "id_credit_account, agency_credit_account_id, id_agency, \
     client_id, operator_id, currency, balance, enabled, created_at, updated_at";

const ENTRY_COLUMNS: &str = "e.id_entry, e.agency_credit_entry_id, e.id_agency, e.account_id, \
     e.amount, e.currency, e.doc_type, e.concept, e.value_date, e.reference, e.booking_id, \
     e.receipt_id, e.investment_id, e.operator_due_id, e.created_by, e.created_at, e.updated_at";

/// Map a driver error; serialization failures and deadlocks are retryable.
fn db_error(err: sqlx::Error) -> LedgerError {
    if let sqlx::Error::Database(db) = &err {
        if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) {
            return LedgerError::StorageConflict(db.message().to_string());
        }
    }
    LedgerError::Database(err.to_string())
}

fn account_from_row(row: &PgRow) -> std::result::Result<CreditAccount, sqlx::Error> {
    let client_id: Option<i64> = row.try_get("client_id")?;
    let operator_id: Option<i64> = row.try_get("operator_id")?;
    let subject = match (client_id, operator_id) {
        (Some(client), None) => Subject::Client(ClientId(client)),
        (None, Some(operator)) => Subject::Operator(OperatorId(operator)),
        _ => {
            return Err(sqlx::Error::ColumnDecode {
                index: "client_id".to_string(),
                source: "credit account must reference exactly one subject".into(),
            })
        }
    };
    let currency: String = row.try_get("currency")?;

    Ok(CreditAccount {
        id: AccountId::from_uuid(row.try_get("id_credit_account")?),
        agency_account_number: row.try_get("agency_credit_account_id")?,
        agency_id: AgencyId(row.try_get("id_agency")?),
        subject,
        currency: Currency::new(currency),
        balance: row.try_get("balance")?,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> std::result::Result<CreditEntry, sqlx::Error> {
    let currency: String = row.try_get("currency")?;
    let doc_type: String = row.try_get("doc_type")?;
    let booking_id: Option<i64> = row.try_get("booking_id")?;
    let receipt_id: Option<i64> = row.try_get("receipt_id")?;
    let investment_id: Option<i64> = row.try_get("investment_id")?;
    let operator_due_id: Option<i64> = row.try_get("operator_due_id")?;

    Ok(CreditEntry {
        id: EntryId::from_uuid(row.try_get("id_entry")?),
        agency_entry_number: row.try_get("agency_credit_entry_id")?,
        agency_id: AgencyId(row.try_get("id_agency")?),
        account_id: AccountId::from_uuid(row.try_get("account_id")?),
        amount: row.try_get("amount")?,
        currency: Currency::new(currency),
        doc_type: DocType::parse(&doc_type),
        concept: row.try_get("concept")?,
        value_date: row.try_get("value_date")?,
        reference: row.try_get("reference")?,
        links: EntryLinks {
            booking_id: booking_id.map(BookingId),
            receipt_id: receipt_id.map(ReceiptId),
            investment_id: investment_id.map(InvestmentId),
            operator_due_id: operator_due_id.map(OperatorDueId),
        },
        created_by: UserId(row.try_get("created_by")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Ledger store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(db_error)?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Database(format!("migration failed: {}", e)))?;
        info!("Credit ledger schema is up to date");
        Ok(())
    }

    async fn cursor_exists(&self, sql: &str, cursor: uuid::Uuid, agency_id: AgencyId) -> Result<()> {
        let found = sqlx::query(sql)
            .bind(cursor)
            .bind(agency_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        match found {
            Some(_) => Ok(()),
            None => Err(LedgerError::validation("unknown cursor", "cursor")),
        }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await.map_err(db_error)?;
        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn subject_agency(&self, subject: &Subject) -> Result<Option<AgencyId>> {
        let (sql, id) = match subject {
            Subject::Client(id) => ("SELECT id_agency FROM clients WHERE id_client = $1", id.get()),
            Subject::Operator(id) => (
                "SELECT id_agency FROM operators WHERE id_operator = $1",
                id.get(),
            ),
        };
        let agency: Option<i64> = sqlx::query_scalar(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(agency.map(AgencyId))
    }

    async fn find_account(&self, id: AccountId) -> Result<Option<CreditAccount>> {
        let sql = format!(
            "SELECT {} FROM credit_accounts WHERE id_credit_account = $1",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref().map(account_from_row).transpose().map_err(db_error)
    }

    async fn find_entry(&self, id: EntryId) -> Result<Option<CreditEntry>> {
        let sql = format!("SELECT {} FROM credit_entries e WHERE e.id_entry = $1", ENTRY_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref().map(entry_from_row).transpose().map_err(db_error)
    }

    async fn list_accounts(
        &self,
        agency_id: AgencyId,
        filter: &AccountFilter,
        page: &PageRequest,
    ) -> Result<Page<CreditAccount>> {
        if let Some(cursor) = page.cursor {
            self.cursor_exists(
                "SELECT 1 FROM credit_accounts WHERE id_credit_account = $1 AND id_agency = $2",
                cursor,
                agency_id,
            )
            .await?;
        }

        let take = page.take();
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM credit_accounts WHERE id_agency = ",
            ACCOUNT_COLUMNS
        ));
        qb.push_bind(agency_id.get());
        if let Some(client_id) = filter.client_id {
            qb.push(" AND client_id = ").push_bind(client_id.get());
        }
        if let Some(operator_id) = filter.operator_id {
            qb.push(" AND operator_id = ").push_bind(operator_id.get());
        }
        if let Some(currency) = &filter.currency {
            qb.push(" AND currency = ").push_bind(currency.code().to_string());
        }
        if let Some(enabled) = filter.enabled {
            qb.push(" AND enabled = ").push_bind(enabled);
        }
        if let Some(cursor) = page.cursor {
            qb.push(
                " AND (updated_at, id_credit_account) < \
                 (SELECT updated_at, id_credit_account FROM credit_accounts WHERE id_credit_account = ",
            )
            .push_bind(cursor)
            .push(")");
        }
        qb.push(" ORDER BY updated_at DESC, id_credit_account DESC LIMIT ")
            .push_bind((take + 1) as i64);

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_error)?;
        let accounts = rows
            .iter()
            .map(account_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_error)?;
        Ok(Page::from_overfetch(accounts, take, |a| *a.id.as_uuid()))
    }

    async fn list_entries(
        &self,
        agency_id: AgencyId,
        filter: &EntryFilter,
        page: &PageRequest,
    ) -> Result<Page<CreditEntry>> {
        if let Some(cursor) = page.cursor {
            self.cursor_exists(
                "SELECT 1 FROM credit_entries WHERE id_entry = $1 AND id_agency = $2",
                cursor,
                agency_id,
            )
            .await?;
        }

        let take = page.take();
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM credit_entries e \
             JOIN credit_accounts a ON a.id_credit_account = e.account_id \
             WHERE e.id_agency = ",
            ENTRY_COLUMNS
        ));
        qb.push_bind(agency_id.get());
        if let Some(account_id) = filter.account_id {
            qb.push(" AND e.account_id = ").push_bind(*account_id.as_uuid());
        }
        if let Some(client_id) = filter.client_id {
            qb.push(" AND a.client_id = ").push_bind(client_id.get());
        }
        if let Some(operator_id) = filter.operator_id {
            qb.push(" AND a.operator_id = ").push_bind(operator_id.get());
        }
        if let Some(currency) = &filter.currency {
            qb.push(" AND e.currency = ").push_bind(currency.code().to_string());
        }
        if let Some(doc_type) = &filter.doc_type {
            qb.push(" AND e.doc_type = ")
                .push_bind(DocType::parse(doc_type).as_str().to_string());
        }
        if let Some(booking_id) = filter.booking_id {
            qb.push(" AND e.booking_id = ").push_bind(booking_id.get());
        }
        if let Some(receipt_id) = filter.receipt_id {
            qb.push(" AND e.receipt_id = ").push_bind(receipt_id.get());
        }
        if let Some(investment_id) = filter.investment_id {
            qb.push(" AND e.investment_id = ").push_bind(investment_id.get());
        }
        if let Some(operator_due_id) = filter.operator_due_id {
            qb.push(" AND e.operator_due_id = ").push_bind(operator_due_id.get());
        }
        if let Some(from) = filter.value_date_from {
            qb.push(" AND e.value_date >= ").push_bind(from);
        }
        if let Some(to) = filter.value_date_to {
            qb.push(" AND e.value_date <= ").push_bind(to);
        }
        if let Some(cursor) = page.cursor {
            qb.push(
                " AND (e.created_at, e.id_entry) < \
                 (SELECT created_at, id_entry FROM credit_entries WHERE id_entry = ",
            )
            .push_bind(cursor)
            .push(")");
        }
        qb.push(" ORDER BY e.created_at DESC, e.id_entry DESC LIMIT ")
            .push_bind((take + 1) as i64);

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_error)?;
        let entries = rows
            .iter()
            .map(entry_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_error)?;
        Ok(Page::from_overfetch(entries, take, |e| *e.id.as_uuid()))
    }
}

/// A PostgreSQL transaction. Dropped without commit, sqlx rolls it back.
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<CreditAccount>> {
        let sql = format!(
            "SELECT {} FROM credit_accounts WHERE id_credit_account = $1 FOR UPDATE",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?;
        row.as_ref().map(account_from_row).transpose().map_err(db_error)
    }

    async fn lock_subject_key(
        &mut self,
        agency_id: AgencyId,
        subject: &Subject,
        currency: &Currency,
    ) -> Result<()> {
        let key = format!("credit_account:{}:{}:{}", agency_id, subject, currency);
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn find_account_by_key(
        &mut self,
        agency_id: AgencyId,
        subject: &Subject,
        currency: &Currency,
    ) -> Result<Option<CreditAccount>> {
        let sql = format!(
            "SELECT {} FROM credit_accounts \
             WHERE id_agency = $1 \
               AND client_id IS NOT DISTINCT FROM $2 \
               AND operator_id IS NOT DISTINCT FROM $3 \
               AND currency = $4 \
             FOR UPDATE",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(agency_id.get())
            .bind(subject.client_id().map(|id| id.get()))
            .bind(subject.operator_id().map(|id| id.get()))
            .bind(currency.code())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?;
        row.as_ref().map(account_from_row).transpose().map_err(db_error)
    }

    async fn insert_account(&mut self, account: &CreditAccount) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO credit_accounts (id_credit_account, agency_credit_account_id, id_agency, \
             client_id, operator_id, currency, balance, enabled, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT DO NOTHING",
        )
        .bind(*account.id.as_uuid())
        .bind(account.agency_account_number)
        .bind(account.agency_id.get())
        .bind(account.subject.client_id().map(|id| id.get()))
        .bind(account.subject.operator_id().map(|id| id.get()))
        .bind(account.currency.code())
        .bind(account.balance)
        .bind(account.enabled)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_balance(&mut self, id: AccountId, balance: Decimal) -> Result<()> {
        let result = sqlx::query(
            "UPDATE credit_accounts SET balance = $2, updated_at = $3 WHERE id_credit_account = $1",
        )
        .bind(*id.as_uuid())
        .bind(balance)
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::AccountNotFound(id));
        }
        Ok(())
    }

    async fn set_enabled(&mut self, id: AccountId, enabled: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE credit_accounts SET enabled = $2, updated_at = $3 WHERE id_credit_account = $1",
        )
        .bind(*id.as_uuid())
        .bind(enabled)
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::AccountNotFound(id));
        }
        Ok(())
    }

    async fn next_agency_counter(
        &mut self,
        agency_id: AgencyId,
        counter: AgencyCounter,
    ) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO agency_counters (id_agency, counter_name, last_value) VALUES ($1, $2, 1) \
             ON CONFLICT (id_agency, counter_name) \
             DO UPDATE SET last_value = agency_counters.last_value + 1 \
             RETURNING last_value",
        )
        .bind(agency_id.get())
        .bind(counter.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)
    }

    async fn lock_entry(&mut self, id: EntryId) -> Result<Option<CreditEntry>> {
        let sql = format!(
            "SELECT {} FROM credit_entries e WHERE e.id_entry = $1 FOR UPDATE",
            ENTRY_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?;
        row.as_ref().map(entry_from_row).transpose().map_err(db_error)
    }

    async fn insert_entry(&mut self, entry: &CreditEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO credit_entries (id_entry, agency_credit_entry_id, id_agency, account_id, \
             amount, currency, doc_type, concept, value_date, reference, booking_id, receipt_id, \
             investment_id, operator_due_id, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(*entry.id.as_uuid())
        .bind(entry.agency_entry_number)
        .bind(entry.agency_id.get())
        .bind(*entry.account_id.as_uuid())
        .bind(entry.amount)
        .bind(entry.currency.code())
        .bind(entry.doc_type.as_str())
        .bind(&entry.concept)
        .bind(entry.value_date)
        .bind(entry.reference.as_deref())
        .bind(entry.links.booking_id.map(|id| id.get()))
        .bind(entry.links.receipt_id.map(|id| id.get()))
        .bind(entry.links.investment_id.map(|id| id.get()))
        .bind(entry.links.operator_due_id.map(|id| id.get()))
        .bind(entry.created_by.get())
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn update_entry(&mut self, entry: &CreditEntry) -> Result<()> {
        let result = sqlx::query(
            "UPDATE credit_entries \
             SET concept = $2, value_date = $3, doc_type = $4, reference = $5, updated_at = $6 \
             WHERE id_entry = $1",
        )
        .bind(*entry.id.as_uuid())
        .bind(&entry.concept)
        .bind(entry.value_date)
        .bind(entry.doc_type.as_str())
        .bind(entry.reference.as_deref())
        .bind(entry.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::EntryNotFound(entry.id));
        }
        Ok(())
    }

    async fn delete_entry(&mut self, id: EntryId) -> Result<()> {
        let result = sqlx::query("DELETE FROM credit_entries WHERE id_entry = $1")
            .bind(*id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::EntryNotFound(id));
        }
        Ok(())
    }

    async fn account_entries(&mut self, id: AccountId) -> Result<Vec<CreditEntry>> {
        let sql = format!(
            "SELECT {} FROM credit_entries e WHERE e.account_id = $1 \
             ORDER BY e.created_at, e.id_entry",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(*id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_error)?;
        rows.iter()
            .map(entry_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_error)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PgLedgerTx { tx } = *self;
        tx.commit().await.map_err(db_error)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let PgLedgerTx { tx } = *self;
        tx.rollback().await.map_err(db_error)
    }
}
