//! Database service for billing-service.
//!
//! All billing mutations run here, inside one transaction each. SQLite
//! permits a single writer, so mutating operations additionally serialize
//! through an in-process write lock; the aggregate checks (received versus
//! delivered, payment versus remaining balance) therefore observe the same
//! rows the subsequent insert commits against.

use crate::models::{
    derive_totals, Admin, Bill, BillGenerationFailure, BillGenerationReport, BillSummary,
    BillWithPayments, CreateAdmin, CreateCustomer, CreateDeliveryEntry, CreatePayment, Customer,
    DeliveryEntry, EntryKind, Invoice, ListBillsFilter, ListDeliveriesFilter,
    ListPaymentLogsFilter, Payment, PaymentEventKind, PaymentLog, UpdateDeliveryEntry,
};
use crate::models::parse_customer_ref;
use crate::services::metrics::{
    BILLS_GENERATED_TOTAL, DB_QUERY_DURATION, ERRORS_TOTAL, PAYMENTS_TOTAL, PAYMENT_AMOUNT_TOTAL,
};
use crate::tenant::{Principal, TenantScope};
use chrono::{Months, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Transaction;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use service_core::error::AppError;

/// Per-customer outcome of one generation attempt.
enum GenerationOutcome {
    Generated(Bill),
    AlreadyBilled,
    NoActivity,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    // One writer at a time: every mutating operation holds this across its
    // transaction so read-aggregate-then-write sequences stay serializable.
    write_lock: Arc<Mutex<()>>,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "billing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to SQLite"
        );

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Invalid database url: {}", e))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("SQLite connection pool established");

        Ok(Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Tenant Operations
    // -------------------------------------------------------------------------

    /// Register a tenant owner.
    #[instrument(skip(self, input))]
    pub async fn create_admin(&self, input: &CreateAdmin) -> Result<Admin, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_admin"])
            .start_timer();

        let admin_id = Uuid::new_v4();
        let now = Utc::now();
        let admin = sqlx::query_as::<_, Admin>(
            r#"
            INSERT INTO admins (admin_id, name, created_utc)
            VALUES (?1, ?2, ?3)
            RETURNING admin_id, name, created_utc
            "#,
        )
        .bind(admin_id)
        .bind(&input.name)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create admin: {}", e)))?;

        timer.observe_duration();
        info!(admin_id = %admin.admin_id, "Tenant owner registered");

        Ok(admin)
    }

    /// The tenant id new records are attributed to.
    ///
    /// Owners and members write into their own tenant. A super-operator has
    /// no tenant, so their writes land in the earliest-registered tenant; an
    /// empty registry is an error rather than an unscoped write.
    #[instrument(skip(self, principal))]
    pub async fn tenant_id_for_create(&self, principal: &Principal) -> Result<Uuid, AppError> {
        match principal {
            Principal::Owner { admin_id } => Ok(*admin_id),
            Principal::Member {
                admin_id: Some(admin_id),
            } => Ok(*admin_id),
            Principal::Member { admin_id: None } => Err(AppError::Forbidden(anyhow::anyhow!(
                "Member has no resolved tenant"
            ))),
            Principal::Super => {
                let admin_id = sqlx::query_scalar::<_, Uuid>(
                    "SELECT admin_id FROM admins ORDER BY created_utc ASC, admin_id ASC LIMIT 1",
                )
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to resolve tenant: {}", e))
                })?;

                admin_id.ok_or_else(|| {
                    AppError::BadRequest(anyhow::anyhow!(
                        "No tenant owner registered to attribute the record to"
                    ))
                })
            }
        }
    }

    // -------------------------------------------------------------------------
    // Customer Operations
    // -------------------------------------------------------------------------

    /// Create a customer inside a tenant.
    #[instrument(skip(self, input), fields(admin_id = %admin_id))]
    pub async fn create_customer(
        &self,
        admin_id: Uuid,
        input: &CreateCustomer,
    ) -> Result<Customer, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_customer"])
            .start_timer();

        let customer_id = Uuid::new_v4();
        let now = Utc::now();
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (customer_id, admin_id, code, name, phone, created_utc)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING customer_id, admin_id, code, name, phone, created_utc
            "#,
        )
        .bind(customer_id)
        .bind(admin_id)
        .bind(&input.code)
        .bind(&input.name)
        .bind(&input.phone)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create customer: {}", e))
        })?;

        timer.observe_duration();
        info!(customer_id = %customer.customer_id, "Customer created");

        Ok(customer)
    }

    /// Get a customer in scope.
    #[instrument(skip(self, scope), fields(customer_id = %customer_id))]
    pub async fn get_customer(
        &self,
        scope: &TenantScope,
        customer_id: Uuid,
    ) -> Result<Option<Customer>, AppError> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT customer_id, admin_id, code, name, phone, created_utc
            FROM customers
            WHERE customer_id = ?1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get customer: {}", e)))?;

        Ok(customer.filter(|c| scope.allows(c.admin_id)))
    }

    /// List customers in scope.
    #[instrument(skip(self, scope))]
    pub async fn list_customers(&self, scope: &TenantScope) -> Result<Vec<Customer>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_customers"])
            .start_timer();

        let scope_id = match scope {
            TenantScope::All => None,
            TenantScope::Tenant(id) => Some(*id),
            TenantScope::Denied => return Ok(Vec::new()),
        };

        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT customer_id, admin_id, code, name, phone, created_utc
            FROM customers
            WHERE (?1 IS NULL OR admin_id = ?1)
            ORDER BY name, customer_id
            "#,
        )
        .bind(scope_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list customers: {}", e))
        })?;

        timer.observe_duration();

        Ok(customers)
    }

    /// Resolve a legacy composite customer reference ("CODE · Name") within a
    /// tenant: exact (code, name) match first, then name only. Resolution
    /// failure returns `None` rather than an error; the caller keeps the raw
    /// string as the entry's customer name.
    #[instrument(skip(self), fields(admin_id = %admin_id))]
    pub async fn resolve_customer_ref(
        &self,
        admin_id: Uuid,
        reference: &str,
    ) -> Result<Option<Customer>, AppError> {
        let (code, name) = match parse_customer_ref(reference) {
            Some((code, name)) => (Some(code), name),
            None => (None, reference.trim()),
        };

        if let Some(code) = code {
            let exact = sqlx::query_as::<_, Customer>(
                r#"
                SELECT customer_id, admin_id, code, name, phone, created_utc
                FROM customers
                WHERE admin_id = ?1 AND code = ?2 AND name = ?3
                LIMIT 1
                "#,
            )
            .bind(admin_id)
            .bind(code)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to resolve customer: {}", e))
            })?;

            if exact.is_some() {
                return Ok(exact);
            }
        }

        let by_name = sqlx::query_as::<_, Customer>(
            r#"
            SELECT customer_id, admin_id, code, name, phone, created_utc
            FROM customers
            WHERE admin_id = ?1 AND name = ?2
            LIMIT 1
            "#,
        )
        .bind(admin_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to resolve customer: {}", e))
        })?;

        if by_name.is_none() {
            warn!(reference = %reference, "Customer reference did not resolve, keeping raw name");
        }

        Ok(by_name)
    }

    // -------------------------------------------------------------------------
    // Delivery Ledger Operations
    // -------------------------------------------------------------------------

    /// Record a cylinder movement.
    ///
    /// RECEIVED entries are validated against the customer's cumulative
    /// delivered quantity inside the same transaction as the insert.
    #[instrument(skip(self, input), fields(admin_id = %admin_id, kind = input.kind.as_str()))]
    pub async fn record_delivery(
        &self,
        admin_id: Uuid,
        input: &CreateDeliveryEntry,
    ) -> Result<DeliveryEntry, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_delivery"])
            .start_timer();

        // Resolve the customer before opening the write transaction.
        let (customer_id, customer_name) = match (input.customer_id, input.customer_ref.as_deref())
        {
            (Some(id), _) => {
                let customer = self
                    .get_customer(&TenantScope::Tenant(admin_id), id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Customer not found")))?;
                (Some(customer.customer_id), customer.name)
            }
            (None, Some(reference)) => match self.resolve_customer_ref(admin_id, reference).await? {
                Some(customer) => (Some(customer.customer_id), customer.name),
                None => (None, reference.trim().to_string()),
            },
            (None, None) => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "A customer id or customer reference is required"
                )))
            }
        };

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        if input.kind == EntryKind::Received {
            if let Some(customer_id) = customer_id {
                check_received_within_delivered(
                    &mut tx,
                    admin_id,
                    customer_id,
                    None,
                    input.quantity,
                )
                .await?;
            }
        }

        let entry_id = Uuid::new_v4();
        let now = Utc::now();
        let amount = input.quantity * input.unit_price;
        let entry = sqlx::query_as::<_, DeliveryEntry>(
            r#"
            INSERT INTO delivery_entries (
                entry_id, admin_id, customer_id, customer_name, kind,
                quantity, unit_price, amount, cylinder_label, delivery_date, verified,
                empties_collected, payment_type, payment_amount, payment_received_by,
                created_utc, updated_utc
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)
            RETURNING entry_id, admin_id, customer_id, customer_name, kind,
                quantity, unit_price, amount, cylinder_label, delivery_date, verified,
                empties_collected, payment_type, payment_amount, payment_received_by,
                created_utc, updated_utc
            "#,
        )
        .bind(entry_id)
        .bind(admin_id)
        .bind(customer_id)
        .bind(&customer_name)
        .bind(input.kind.as_str())
        .bind(input.quantity)
        .bind(input.unit_price)
        .bind(amount)
        .bind(&input.cylinder_label)
        .bind(input.delivery_date)
        .bind(input.verified)
        .bind(input.empties_collected)
        .bind(&input.payment_type)
        .bind(input.payment_amount)
        .bind(&input.payment_received_by)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record delivery: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            entry_id = %entry.entry_id,
            quantity = entry.quantity,
            amount = entry.amount,
            "Delivery entry recorded"
        );

        Ok(entry)
    }

    /// Get a delivery entry in scope.
    #[instrument(skip(self, scope), fields(entry_id = %entry_id))]
    pub async fn get_delivery(
        &self,
        scope: &TenantScope,
        entry_id: Uuid,
    ) -> Result<Option<DeliveryEntry>, AppError> {
        let entry = sqlx::query_as::<_, DeliveryEntry>(
            r#"
            SELECT entry_id, admin_id, customer_id, customer_name, kind,
                quantity, unit_price, amount, cylinder_label, delivery_date, verified,
                empties_collected, payment_type, payment_amount, payment_received_by,
                created_utc, updated_utc
            FROM delivery_entries
            WHERE entry_id = ?1
            "#,
        )
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get delivery entry: {}", e))
        })?;

        Ok(entry.filter(|e| scope.allows(e.admin_id)))
    }

    /// Update a delivery entry in scope.
    #[instrument(skip(self, scope, input), fields(entry_id = %entry_id))]
    pub async fn update_delivery(
        &self,
        scope: &TenantScope,
        entry_id: Uuid,
        input: &UpdateDeliveryEntry,
    ) -> Result<DeliveryEntry, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_delivery"])
            .start_timer();

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let existing = fetch_delivery(&mut tx, entry_id).await?;
        let existing = match existing {
            Some(e) if scope.allows(e.admin_id) => e,
            _ => return Err(AppError::NotFound(anyhow::anyhow!("Delivery entry not found"))),
        };

        let quantity = input.quantity.unwrap_or(existing.quantity);
        let unit_price = input.unit_price.unwrap_or(existing.unit_price);
        if quantity <= 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Quantity must be positive"
            )));
        }

        if let Some(customer_id) = existing.customer_id {
            match existing.entry_kind() {
                Some(EntryKind::Received) => {
                    check_received_within_delivered(
                        &mut tx,
                        existing.admin_id,
                        customer_id,
                        Some(entry_id),
                        quantity,
                    )
                    .await?;
                }
                // Shrinking a delivery can break the same invariant from the
                // other side.
                Some(EntryKind::Delivered) => {
                    check_delivered_covers_received(
                        &mut tx,
                        existing.admin_id,
                        customer_id,
                        entry_id,
                        quantity,
                    )
                    .await?;
                }
                None => {}
            }
        }

        let amount = quantity * unit_price;
        let now = Utc::now();
        let entry = sqlx::query_as::<_, DeliveryEntry>(
            r#"
            UPDATE delivery_entries
            SET quantity = ?2,
                unit_price = ?3,
                amount = ?4,
                cylinder_label = COALESCE(?5, cylinder_label),
                delivery_date = COALESCE(?6, delivery_date),
                verified = COALESCE(?7, verified),
                empties_collected = COALESCE(?8, empties_collected),
                payment_type = COALESCE(?9, payment_type),
                payment_amount = COALESCE(?10, payment_amount),
                payment_received_by = COALESCE(?11, payment_received_by),
                updated_utc = ?12
            WHERE entry_id = ?1
            RETURNING entry_id, admin_id, customer_id, customer_name, kind,
                quantity, unit_price, amount, cylinder_label, delivery_date, verified,
                empties_collected, payment_type, payment_amount, payment_received_by,
                created_utc, updated_utc
            "#,
        )
        .bind(entry_id)
        .bind(quantity)
        .bind(unit_price)
        .bind(amount)
        .bind(&input.cylinder_label)
        .bind(input.delivery_date)
        .bind(input.verified)
        .bind(input.empties_collected)
        .bind(&input.payment_type)
        .bind(input.payment_amount)
        .bind(&input.payment_received_by)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update delivery: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(entry_id = %entry.entry_id, "Delivery entry updated");

        Ok(entry)
    }

    /// Delete a delivery entry in scope.
    ///
    /// Deleting a DELIVERED entry also deletes the RECEIVED entries that
    /// mirror it: same tenant, same calendar day, same cylinder label, same
    /// unit price, and a customer name equal to the deleted entry's raw or
    /// normalized name. Returns the deleted entry and the cascade count.
    #[instrument(skip(self, scope), fields(entry_id = %entry_id))]
    pub async fn delete_delivery(
        &self,
        scope: &TenantScope,
        entry_id: Uuid,
    ) -> Result<(DeliveryEntry, u64), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_delivery"])
            .start_timer();

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let entry = fetch_delivery(&mut tx, entry_id).await?;
        let entry = match entry {
            Some(e) if scope.allows(e.admin_id) => e,
            _ => return Err(AppError::NotFound(anyhow::anyhow!("Delivery entry not found"))),
        };

        let mut cascade_deleted = 0;
        if entry.entry_kind() == Some(EntryKind::Delivered) {
            let normalized = parse_customer_ref(&entry.customer_name)
                .map(|(_, name)| name.to_string())
                .unwrap_or_else(|| entry.customer_name.trim().to_string());

            let result = sqlx::query(
                r#"
                DELETE FROM delivery_entries
                WHERE admin_id = ?1
                  AND kind = 'received'
                  AND delivery_date = ?2
                  AND cylinder_label = ?3
                  AND unit_price = ?4
                  AND customer_name IN (?5, ?6)
                "#,
            )
            .bind(entry.admin_id)
            .bind(entry.delivery_date)
            .bind(&entry.cylinder_label)
            .bind(entry.unit_price)
            .bind(&entry.customer_name)
            .bind(&normalized)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to cascade received entries: {}",
                    e
                ))
            })?;
            cascade_deleted = result.rows_affected();
        }

        sqlx::query("DELETE FROM delivery_entries WHERE entry_id = ?1")
            .bind(entry_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete delivery: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            entry_id = %entry.entry_id,
            cascade_deleted = cascade_deleted,
            "Delivery entry deleted"
        );

        Ok((entry, cascade_deleted))
    }

    /// List delivery entries in scope.
    #[instrument(skip(self, scope, filter))]
    pub async fn list_deliveries(
        &self,
        scope: &TenantScope,
        filter: &ListDeliveriesFilter,
    ) -> Result<Vec<DeliveryEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_deliveries"])
            .start_timer();

        let scope_id = match scope {
            TenantScope::All => None,
            TenantScope::Tenant(id) => Some(*id),
            TenantScope::Denied => return Ok(Vec::new()),
        };

        let limit = filter.page_size.clamp(1, 100) as i64;
        let kind = filter.kind.map(|k| k.as_str());

        let entries = if let Some(cursor) = filter.page_token {
            sqlx::query_as::<_, DeliveryEntry>(
                r#"
                SELECT entry_id, admin_id, customer_id, customer_name, kind,
                    quantity, unit_price, amount, cylinder_label, delivery_date, verified,
                    empties_collected, payment_type, payment_amount, payment_received_by,
                    created_utc, updated_utc
                FROM delivery_entries
                WHERE (?1 IS NULL OR admin_id = ?1)
                  AND (?2 IS NULL OR customer_id = ?2)
                  AND (?3 IS NULL OR kind = ?3)
                  AND (?4 IS NULL OR delivery_date >= ?4)
                  AND (?5 IS NULL OR delivery_date < ?5)
                  AND entry_id > ?6
                ORDER BY entry_id
                LIMIT ?7
                "#,
            )
            .bind(scope_id)
            .bind(filter.customer_id)
            .bind(kind)
            .bind(filter.start_date)
            .bind(filter.end_date)
            .bind(cursor)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, DeliveryEntry>(
                r#"
                SELECT entry_id, admin_id, customer_id, customer_name, kind,
                    quantity, unit_price, amount, cylinder_label, delivery_date, verified,
                    empties_collected, payment_type, payment_amount, payment_received_by,
                    created_utc, updated_utc
                FROM delivery_entries
                WHERE (?1 IS NULL OR admin_id = ?1)
                  AND (?2 IS NULL OR customer_id = ?2)
                  AND (?3 IS NULL OR kind = ?3)
                  AND (?4 IS NULL OR delivery_date >= ?4)
                  AND (?5 IS NULL OR delivery_date < ?5)
                ORDER BY entry_id
                LIMIT ?6
                "#,
            )
            .bind(scope_id)
            .bind(filter.customer_id)
            .bind(kind)
            .bind(filter.start_date)
            .bind(filter.end_date)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list deliveries: {}", e)))?;

        timer.observe_duration();

        Ok(entries)
    }

    // -------------------------------------------------------------------------
    // Bill Operations
    // -------------------------------------------------------------------------

    /// Generate bills for every active customer of a tenant for one period.
    ///
    /// Customers are processed as independent concurrent tasks; a failure for
    /// one customer is collected into the report and never aborts the rest.
    /// Generation is idempotent per (customer, period).
    #[instrument(skip(self), fields(admin_id = %admin_id, period_start = %period_start, period_end = %period_end))]
    pub async fn generate_bills(
        &self,
        admin_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<BillGenerationReport, AppError> {
        if period_start >= period_end {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Billing period start {} must precede end {}",
                period_start,
                period_end
            )));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["generate_bills"])
            .start_timer();

        let customers = self
            .list_customers(&TenantScope::Tenant(admin_id))
            .await?;

        let tasks = customers.iter().map(|customer| async move {
            let outcome = self
                .generate_bill_for_customer(admin_id, customer, period_start, period_end)
                .await;
            (customer, outcome)
        });
        let outcomes = futures::future::join_all(tasks).await;

        let mut report = BillGenerationReport::default();
        for (customer, outcome) in outcomes {
            match outcome {
                Ok(GenerationOutcome::Generated(bill)) => {
                    BILLS_GENERATED_TOTAL.with_label_values(&["generated"]).inc();
                    report.generated.push(bill);
                }
                Ok(GenerationOutcome::AlreadyBilled) => {
                    BILLS_GENERATED_TOTAL.with_label_values(&["skipped"]).inc();
                    report.skipped_existing += 1;
                }
                Ok(GenerationOutcome::NoActivity) => {
                    BILLS_GENERATED_TOTAL.with_label_values(&["skipped"]).inc();
                    report.skipped_inactive += 1;
                }
                Err(e) => {
                    BILLS_GENERATED_TOTAL.with_label_values(&["failed"]).inc();
                    ERRORS_TOTAL.with_label_values(&["bill_generation"]).inc();
                    warn!(
                        customer_id = %customer.customer_id,
                        error = %e,
                        "Bill generation failed for customer"
                    );
                    report.failures.push(BillGenerationFailure {
                        customer_id: customer.customer_id,
                        customer_name: customer.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        timer.observe_duration();

        info!(
            generated = report.generated.len(),
            skipped_existing = report.skipped_existing,
            skipped_inactive = report.skipped_inactive,
            failed = report.failures.len(),
            "Bill generation completed"
        );

        Ok(report)
    }

    /// Generate one customer's bill for a period, if due.
    async fn generate_bill_for_customer(
        &self,
        admin_id: Uuid,
        customer: &Customer,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<GenerationOutcome, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let existing = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT bill_id FROM bills
            WHERE admin_id = ?1 AND customer_id = ?2
              AND bill_start_date = ?3 AND bill_end_date = ?4
            "#,
        )
        .bind(admin_id)
        .bind(customer.customer_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check existing bill: {}", e))
        })?;

        if existing.is_some() {
            return Ok(GenerationOutcome::AlreadyBilled);
        }

        let (amount, cylinders) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COALESCE(SUM(amount), 0), COALESCE(SUM(quantity), 0)
            FROM delivery_entries
            WHERE admin_id = ?1 AND customer_id = ?2 AND kind = 'delivered'
              AND delivery_date >= ?3 AND delivery_date < ?4
            "#,
        )
        .bind(admin_id)
        .bind(customer.customer_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to aggregate deliveries: {}", e))
        })?;

        if amount == 0 && cylinders == 0 {
            return Ok(GenerationOutcome::NoActivity);
        }

        let last_month_remaining =
            prior_outstanding(&mut tx, admin_id, customer.customer_id, period_start).await?;

        let bill_id = Uuid::new_v4();
        let now = Utc::now();
        let inserted = sqlx::query_as::<_, Bill>(
            r#"
            INSERT INTO bills (
                bill_id, admin_id, customer_id, bill_start_date, bill_end_date,
                last_month_remaining, current_month_bill, cylinders, created_utc
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            RETURNING bill_id, admin_id, customer_id, bill_start_date, bill_end_date,
                last_month_remaining, current_month_bill, cylinders, created_utc
            "#,
        )
        .bind(bill_id)
        .bind(admin_id)
        .bind(customer.customer_id)
        .bind(period_start)
        .bind(period_end)
        .bind(last_month_remaining)
        .bind(amount)
        .bind(cylinders)
        .bind(now)
        .fetch_one(&mut *tx)
        .await;

        let bill = match inserted {
            Ok(bill) => bill,
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                // A racing generator from another process won the period.
                return Ok(GenerationOutcome::AlreadyBilled);
            }
            Err(e) => {
                return Err(AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to insert bill: {}",
                    e
                )));
            }
        };

        append_log(
            &mut tx,
            admin_id,
            Some(customer.customer_id),
            Some(bill.bill_id),
            PaymentEventKind::BillGenerated,
            bill.current_month_bill,
            Some(format!(
                "Bill for {} covering {} to {}",
                customer.name, period_start, period_end
            )),
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        info!(
            bill_id = %bill.bill_id,
            customer_id = %customer.customer_id,
            current_month_bill = bill.current_month_bill,
            last_month_remaining = bill.last_month_remaining,
            "Bill generated"
        );

        Ok(GenerationOutcome::Generated(bill))
    }

    /// Delete a bill in scope, with its payments.
    ///
    /// Rejected while an invoice is linked. The audit row survives with a
    /// nulled bill reference.
    #[instrument(skip(self, scope), fields(bill_id = %bill_id))]
    pub async fn delete_bill(&self, scope: &TenantScope, bill_id: Uuid) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_bill"])
            .start_timer();

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let bill = fetch_bill(&mut tx, bill_id).await?;
        let bill = match bill {
            Some(b) if scope.allows(b.admin_id) => b,
            _ => return Err(AppError::NotFound(anyhow::anyhow!("Bill not found"))),
        };

        ensure_not_invoiced(&mut tx, bill.bill_id).await?;

        let paid = payment_sum(&mut tx, bill.bill_id).await?;
        let totals = derive_totals(bill.last_month_remaining, bill.current_month_bill, paid);

        sqlx::query("DELETE FROM payments WHERE bill_id = ?1")
            .bind(bill.bill_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete payments: {}", e))
            })?;

        sqlx::query("DELETE FROM bills WHERE bill_id = ?1")
            .bind(bill.bill_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete bill: {}", e)))?;

        append_log(
            &mut tx,
            bill.admin_id,
            Some(bill.customer_id),
            None,
            PaymentEventKind::BillDeleted,
            totals.total_amount,
            Some(format!(
                "Bill {} covering {} to {} deleted (paid {}, remaining {})",
                bill.bill_id, bill.bill_start_date, bill.bill_end_date, paid,
                totals.remaining_amount
            )),
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(bill_id = %bill.bill_id, "Bill deleted");

        Ok(())
    }

    /// Get a bill in scope with payments, invoice link, and derived totals.
    #[instrument(skip(self, scope), fields(bill_id = %bill_id))]
    pub async fn get_bill(
        &self,
        scope: &TenantScope,
        bill_id: Uuid,
    ) -> Result<BillWithPayments, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_bill"])
            .start_timer();

        let bill = sqlx::query_as::<_, Bill>(
            r#"
            SELECT bill_id, admin_id, customer_id, bill_start_date, bill_end_date,
                last_month_remaining, current_month_bill, cylinders, created_utc
            FROM bills
            WHERE bill_id = ?1
            "#,
        )
        .bind(bill_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get bill: {}", e)))?;

        let bill = match bill {
            Some(b) if scope.allows(b.admin_id) => b,
            _ => return Err(AppError::NotFound(anyhow::anyhow!("Bill not found"))),
        };

        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, admin_id, bill_id, amount, paid_on, method, notes, created_utc
            FROM payments
            WHERE bill_id = ?1
            ORDER BY paid_on, created_utc
            "#,
        )
        .bind(bill.bill_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payments: {}", e)))?;

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, admin_id, bill_id, invoice_number, generated_utc
            FROM invoices
            WHERE bill_id = ?1
            "#,
        )
        .bind(bill.bill_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        let paid = payments.iter().map(|p| p.amount).sum();
        let totals = derive_totals(bill.last_month_remaining, bill.current_month_bill, paid);

        timer.observe_duration();

        Ok(BillWithPayments {
            bill,
            payments,
            invoice,
            totals,
        })
    }

    /// List bills in scope with derived totals.
    #[instrument(skip(self, scope, filter))]
    pub async fn list_bills(
        &self,
        scope: &TenantScope,
        filter: &ListBillsFilter,
    ) -> Result<Vec<BillSummary>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_bills"])
            .start_timer();

        let scope_id = match scope {
            TenantScope::All => None,
            TenantScope::Tenant(id) => Some(*id),
            TenantScope::Denied => return Ok(Vec::new()),
        };

        let limit = filter.page_size.clamp(1, 100) as i64;

        let rows = if let Some(cursor) = filter.page_token {
            sqlx::query_as::<_, BillListRow>(BILL_LIST_SQL_PAGED)
                .bind(scope_id)
                .bind(filter.customer_id)
                .bind(filter.period_start)
                .bind(filter.period_end)
                .bind(cursor)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
        } else {
            sqlx::query_as::<_, BillListRow>(BILL_LIST_SQL)
                .bind(scope_id)
                .bind(filter.customer_id)
                .bind(filter.period_start)
                .bind(filter.period_end)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
        }
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list bills: {}", e)))?;

        timer.observe_duration();

        Ok(rows.into_iter().map(BillListRow::into_summary).collect())
    }

    // -------------------------------------------------------------------------
    // Payment Operations
    // -------------------------------------------------------------------------

    /// Record a payment against a bill.
    ///
    /// This is the single write path for payment rows; every other module is
    /// read-only with respect to payments. The bill's payment sum is re-read
    /// inside the same transaction as the insert, so two concurrent payments
    /// cannot jointly exceed the remaining balance.
    #[instrument(skip(self, scope, input), fields(bill_id = %input.bill_id, amount = input.amount))]
    pub async fn record_payment(
        &self,
        scope: &TenantScope,
        input: &CreatePayment,
    ) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_payment"])
            .start_timer();

        if input.amount <= 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount must be positive"
            )));
        }

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let bill = fetch_bill(&mut tx, input.bill_id).await?;
        let bill = match bill {
            Some(b) if scope.allows(b.admin_id) => b,
            _ => return Err(AppError::NotFound(anyhow::anyhow!("Bill not found"))),
        };

        ensure_not_invoiced(&mut tx, bill.bill_id).await?;

        let paid = payment_sum(&mut tx, bill.bill_id).await?;
        let totals = derive_totals(bill.last_month_remaining, bill.current_month_bill, paid);
        if input.amount > totals.remaining_amount {
            return Err(AppError::BusinessRule(anyhow::anyhow!(
                "Payment of {} exceeds the bill's remaining balance of {}",
                input.amount,
                totals.remaining_amount
            )));
        }

        let payment_id = Uuid::new_v4();
        let now = Utc::now();
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (payment_id, admin_id, bill_id, amount, paid_on, method, notes, created_utc)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            RETURNING payment_id, admin_id, bill_id, amount, paid_on, method, notes, created_utc
            "#,
        )
        .bind(payment_id)
        .bind(bill.admin_id)
        .bind(bill.bill_id)
        .bind(input.amount)
        .bind(input.paid_on)
        .bind(&input.method)
        .bind(&input.notes)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record payment: {}", e)))?;

        append_log(
            &mut tx,
            bill.admin_id,
            Some(bill.customer_id),
            Some(bill.bill_id),
            PaymentEventKind::PaymentReceived,
            payment.amount,
            Some(format!("Payment via {} on {}", payment.method, payment.paid_on)),
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        PAYMENTS_TOTAL.with_label_values(&[&payment.method]).inc();
        PAYMENT_AMOUNT_TOTAL
            .with_label_values(&[&payment.method])
            .inc_by(payment.amount as f64);

        info!(
            payment_id = %payment.payment_id,
            bill_id = %payment.bill_id,
            amount = payment.amount,
            "Payment recorded"
        );

        Ok(payment)
    }

    /// Delete a payment in scope. Rejected while the owning bill is invoiced.
    #[instrument(skip(self, scope), fields(payment_id = %payment_id))]
    pub async fn delete_payment(
        &self,
        scope: &TenantScope,
        payment_id: Uuid,
    ) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_payment"])
            .start_timer();

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, admin_id, bill_id, amount, paid_on, method, notes, created_utc
            FROM payments
            WHERE payment_id = ?1
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payment: {}", e)))?;

        let payment = match payment {
            Some(p) if scope.allows(p.admin_id) => p,
            _ => return Err(AppError::NotFound(anyhow::anyhow!("Payment not found"))),
        };

        ensure_not_invoiced(&mut tx, payment.bill_id).await?;

        let customer_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT customer_id FROM bills WHERE bill_id = ?1",
        )
        .bind(payment.bill_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get bill: {}", e)))?;

        sqlx::query("DELETE FROM payments WHERE payment_id = ?1")
            .bind(payment.payment_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete payment: {}", e))
            })?;

        append_log(
            &mut tx,
            payment.admin_id,
            customer_id,
            Some(payment.bill_id),
            PaymentEventKind::PaymentDeleted,
            payment.amount,
            Some(format!(
                "Payment of {} via {} deleted",
                payment.amount, payment.method
            )),
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(payment_id = %payment.payment_id, amount = payment.amount, "Payment deleted");

        Ok(payment)
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    /// Issue an invoice against a bill, freezing its financial state.
    #[instrument(skip(self, scope), fields(bill_id = %bill_id))]
    pub async fn generate_invoice(
        &self,
        scope: &TenantScope,
        bill_id: Uuid,
    ) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["generate_invoice"])
            .start_timer();

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let bill = fetch_bill(&mut tx, bill_id).await?;
        let bill = match bill {
            Some(b) if scope.allows(b.admin_id) => b,
            _ => return Err(AppError::NotFound(anyhow::anyhow!("Bill not found"))),
        };

        let existing = sqlx::query_scalar::<_, String>(
            "SELECT invoice_number FROM invoices WHERE bill_id = ?1",
        )
        .bind(bill.bill_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to check invoice: {}", e)))?;

        if let Some(number) = existing {
            return Err(AppError::BusinessRule(anyhow::anyhow!(
                "Invoice {} is already issued against this bill",
                number
            )));
        }

        // Numbers are per tenant and monotonic; deleted invoices leave gaps
        // rather than reassigning.
        let next_seq = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(MAX(CAST(SUBSTR(invoice_number, 5) AS INTEGER)), 0) + 1
            FROM invoices
            WHERE admin_id = ?1
            "#,
        )
        .bind(bill.admin_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to allocate invoice number: {}", e))
        })?;
        let invoice_number = format!("INV-{:05}", next_seq);

        let invoice_id = Uuid::new_v4();
        let now = Utc::now();
        let inserted = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (invoice_id, admin_id, bill_id, invoice_number, generated_utc)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING invoice_id, admin_id, bill_id, invoice_number, generated_utc
            "#,
        )
        .bind(invoice_id)
        .bind(bill.admin_id)
        .bind(bill.bill_id)
        .bind(&invoice_number)
        .bind(now)
        .fetch_one(&mut *tx)
        .await;

        let invoice = match inserted {
            Ok(invoice) => invoice,
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "A racing request already issued an invoice for this bill"
                )));
            }
            Err(e) => {
                return Err(AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to create invoice: {}",
                    e
                )));
            }
        };

        append_log(
            &mut tx,
            bill.admin_id,
            Some(bill.customer_id),
            Some(bill.bill_id),
            PaymentEventKind::InvoiceGenerated,
            bill.last_month_remaining + bill.current_month_bill,
            Some(format!("Invoice {} issued", invoice.invoice_number)),
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number,
            bill_id = %invoice.bill_id,
            "Invoice issued"
        );

        Ok(invoice)
    }

    /// Withdraw an invoice, unlocking its bill.
    #[instrument(skip(self, scope), fields(invoice_id = %invoice_id))]
    pub async fn delete_invoice(
        &self,
        scope: &TenantScope,
        invoice_id: Uuid,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_invoice"])
            .start_timer();

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, admin_id, bill_id, invoice_number, generated_utc
            FROM invoices
            WHERE invoice_id = ?1
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        let invoice = match invoice {
            Some(i) if scope.allows(i.admin_id) => i,
            _ => return Err(AppError::NotFound(anyhow::anyhow!("Invoice not found"))),
        };

        let customer_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT customer_id FROM bills WHERE bill_id = ?1",
        )
        .bind(invoice.bill_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get bill: {}", e)))?;

        sqlx::query("DELETE FROM invoices WHERE invoice_id = ?1")
            .bind(invoice.invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete invoice: {}", e))
            })?;

        append_log(
            &mut tx,
            invoice.admin_id,
            customer_id,
            Some(invoice.bill_id),
            PaymentEventKind::InvoiceDeleted,
            0,
            Some(format!("Invoice {} withdrawn", invoice.invoice_number)),
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(invoice_number = %invoice.invoice_number, "Invoice withdrawn");

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reconciliation Operations
    // -------------------------------------------------------------------------

    /// Re-aggregate the bill covering `period_hint` for one customer.
    ///
    /// Invoiced bills are frozen and left untouched. Returns whether a bill
    /// was updated.
    #[instrument(skip(self), fields(admin_id = %admin_id, customer_id = %customer_id, period_hint = %period_hint))]
    pub async fn resync_bill_for_customer(
        &self,
        admin_id: Uuid,
        customer_id: Uuid,
        period_hint: NaiveDate,
    ) -> Result<bool, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let bill = sqlx::query_as::<_, Bill>(
            r#"
            SELECT bill_id, admin_id, customer_id, bill_start_date, bill_end_date,
                last_month_remaining, current_month_bill, cylinders, created_utc
            FROM bills
            WHERE admin_id = ?1 AND customer_id = ?2
              AND bill_start_date <= ?3 AND bill_end_date > ?3
            "#,
        )
        .bind(admin_id)
        .bind(customer_id)
        .bind(period_hint)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to find bill: {}", e)))?;

        let Some(bill) = bill else {
            return Ok(false);
        };

        let updated = resync_bill(&mut tx, &bill).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        Ok(updated)
    }

    /// Re-aggregate every uninvoiced bill of a tenant overlapping a month.
    #[instrument(skip(self), fields(admin_id = %admin_id, month = %month_start))]
    pub async fn resync_bills_for_month(
        &self,
        admin_id: Uuid,
        month_start: NaiveDate,
    ) -> Result<u64, AppError> {
        let month_end = month_start
            .checked_add_months(Months::new(1))
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Month out of range")))?;

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let bills = sqlx::query_as::<_, Bill>(
            r#"
            SELECT bill_id, admin_id, customer_id, bill_start_date, bill_end_date,
                last_month_remaining, current_month_bill, cylinders, created_utc
            FROM bills
            WHERE admin_id = ?1 AND bill_start_date < ?2 AND bill_end_date > ?3
            ORDER BY bill_start_date
            "#,
        )
        .bind(admin_id)
        .bind(month_end)
        .bind(month_start)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list bills: {}", e)))?;

        let mut updated = 0;
        for bill in &bills {
            if resync_bill(&mut tx, bill).await? {
                updated += 1;
            }
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        info!(updated = updated, "Month resync completed");

        Ok(updated)
    }

    // -------------------------------------------------------------------------
    // Audit Trail Operations
    // -------------------------------------------------------------------------

    /// List audit rows in scope.
    #[instrument(skip(self, scope, filter))]
    pub async fn list_payment_logs(
        &self,
        scope: &TenantScope,
        filter: &ListPaymentLogsFilter,
    ) -> Result<Vec<PaymentLog>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payment_logs"])
            .start_timer();

        let scope_id = match scope {
            TenantScope::All => None,
            TenantScope::Tenant(id) => Some(*id),
            TenantScope::Denied => return Ok(Vec::new()),
        };

        let limit = filter.page_size.clamp(1, 100) as i64;
        let kind = filter.kind.map(|k| k.as_str());

        let logs = if let Some(cursor) = filter.page_token {
            sqlx::query_as::<_, PaymentLog>(
                r#"
                SELECT log_id, admin_id, customer_id, bill_id, kind, amount, details, created_utc
                FROM payment_logs
                WHERE (?1 IS NULL OR admin_id = ?1)
                  AND (?2 IS NULL OR customer_id = ?2)
                  AND (?3 IS NULL OR bill_id = ?3)
                  AND (?4 IS NULL OR kind = ?4)
                  AND log_id > ?5
                ORDER BY log_id
                LIMIT ?6
                "#,
            )
            .bind(scope_id)
            .bind(filter.customer_id)
            .bind(filter.bill_id)
            .bind(kind)
            .bind(cursor)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, PaymentLog>(
                r#"
                SELECT log_id, admin_id, customer_id, bill_id, kind, amount, details, created_utc
                FROM payment_logs
                WHERE (?1 IS NULL OR admin_id = ?1)
                  AND (?2 IS NULL OR customer_id = ?2)
                  AND (?3 IS NULL OR bill_id = ?3)
                  AND (?4 IS NULL OR kind = ?4)
                ORDER BY log_id
                LIMIT ?5
                "#,
            )
            .bind(scope_id)
            .bind(filter.customer_id)
            .bind(filter.bill_id)
            .bind(kind)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list logs: {}", e)))?;

        timer.observe_duration();

        Ok(logs)
    }
}

// -----------------------------------------------------------------------------
// Transaction-scoped helpers
// -----------------------------------------------------------------------------

async fn fetch_delivery(
    tx: &mut Transaction<'_, sqlx::Sqlite>,
    entry_id: Uuid,
) -> Result<Option<DeliveryEntry>, AppError> {
    sqlx::query_as::<_, DeliveryEntry>(
        r#"
        SELECT entry_id, admin_id, customer_id, customer_name, kind,
            quantity, unit_price, amount, cylinder_label, delivery_date, verified,
            empties_collected, payment_type, payment_amount, payment_received_by,
            created_utc, updated_utc
        FROM delivery_entries
        WHERE entry_id = ?1
        "#,
    )
    .bind(entry_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get delivery entry: {}", e)))
}

async fn fetch_bill(
    tx: &mut Transaction<'_, sqlx::Sqlite>,
    bill_id: Uuid,
) -> Result<Option<Bill>, AppError> {
    sqlx::query_as::<_, Bill>(
        r#"
        SELECT bill_id, admin_id, customer_id, bill_start_date, bill_end_date,
            last_month_remaining, current_month_bill, cylinders, created_utc
        FROM bills
        WHERE bill_id = ?1
        "#,
    )
    .bind(bill_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get bill: {}", e)))
}

/// Sum of a bill's payments, read inside the caller's transaction.
async fn payment_sum(
    tx: &mut Transaction<'_, sqlx::Sqlite>,
    bill_id: Uuid,
) -> Result<i64, AppError> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE bill_id = ?1",
    )
    .bind(bill_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum payments: {}", e)))
}

/// Reject the mutation when an invoice is linked to the bill.
async fn ensure_not_invoiced(
    tx: &mut Transaction<'_, sqlx::Sqlite>,
    bill_id: Uuid,
) -> Result<(), AppError> {
    let invoice_number = sqlx::query_scalar::<_, String>(
        "SELECT invoice_number FROM invoices WHERE bill_id = ?1",
    )
    .bind(bill_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to check invoice: {}", e)))?;

    match invoice_number {
        Some(number) => Err(AppError::BusinessRule(anyhow::anyhow!(
            "Bill is financially locked: invoice {} is issued against it",
            number
        ))),
        None => Ok(()),
    }
}

/// The cumulative-quantity invariant for RECEIVED entries: a customer can
/// never have returned more cylinders than were delivered to them.
async fn check_received_within_delivered(
    tx: &mut Transaction<'_, sqlx::Sqlite>,
    admin_id: Uuid,
    customer_id: Uuid,
    exclude_entry: Option<Uuid>,
    new_quantity: i64,
) -> Result<(), AppError> {
    let delivered = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COALESCE(SUM(quantity), 0)
        FROM delivery_entries
        WHERE admin_id = ?1 AND customer_id = ?2 AND kind = 'delivered'
        "#,
    )
    .bind(admin_id)
    .bind(customer_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum delivered: {}", e)))?;

    let received = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COALESCE(SUM(quantity), 0)
        FROM delivery_entries
        WHERE admin_id = ?1 AND customer_id = ?2 AND kind = 'received'
          AND (?3 IS NULL OR entry_id != ?3)
        "#,
    )
    .bind(admin_id)
    .bind(customer_id)
    .bind(exclude_entry)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum received: {}", e)))?;

    if received + new_quantity > delivered {
        return Err(AppError::BusinessRule(anyhow::anyhow!(
            "Cannot receive {} cylinders: total received ({}) would exceed total delivered ({})",
            new_quantity,
            received + new_quantity,
            delivered
        )));
    }

    Ok(())
}

/// The mirror of [`check_received_within_delivered`], applied when a
/// DELIVERED entry is edited: the delivered total may not fall below what the
/// customer has already returned.
async fn check_delivered_covers_received(
    tx: &mut Transaction<'_, sqlx::Sqlite>,
    admin_id: Uuid,
    customer_id: Uuid,
    entry_id: Uuid,
    new_quantity: i64,
) -> Result<(), AppError> {
    let delivered_others = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COALESCE(SUM(quantity), 0)
        FROM delivery_entries
        WHERE admin_id = ?1 AND customer_id = ?2 AND kind = 'delivered'
          AND entry_id != ?3
        "#,
    )
    .bind(admin_id)
    .bind(customer_id)
    .bind(entry_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum delivered: {}", e)))?;

    let received = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COALESCE(SUM(quantity), 0)
        FROM delivery_entries
        WHERE admin_id = ?1 AND customer_id = ?2 AND kind = 'received'
        "#,
    )
    .bind(admin_id)
    .bind(customer_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum received: {}", e)))?;

    if delivered_others + new_quantity < received {
        return Err(AppError::BusinessRule(anyhow::anyhow!(
            "Cannot reduce the delivery to {} cylinders: total delivered ({}) would fall below total received ({})",
            new_quantity,
            delivered_others + new_quantity,
            received
        )));
    }

    Ok(())
}

/// Outstanding balance of the most recent bill ending on or before `before`.
async fn prior_outstanding(
    tx: &mut Transaction<'_, sqlx::Sqlite>,
    admin_id: Uuid,
    customer_id: Uuid,
    before: NaiveDate,
) -> Result<i64, AppError> {
    let prior = sqlx::query_as::<_, Bill>(
        r#"
        SELECT bill_id, admin_id, customer_id, bill_start_date, bill_end_date,
            last_month_remaining, current_month_bill, cylinders, created_utc
        FROM bills
        WHERE admin_id = ?1 AND customer_id = ?2 AND bill_end_date <= ?3
        ORDER BY bill_end_date DESC
        LIMIT 1
        "#,
    )
    .bind(admin_id)
    .bind(customer_id)
    .bind(before)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to find prior bill: {}", e)))?;

    let Some(prior) = prior else {
        return Ok(0);
    };

    let paid = payment_sum(tx, prior.bill_id).await?;
    let totals = derive_totals(prior.last_month_remaining, prior.current_month_bill, paid);
    Ok(totals.remaining_amount)
}

/// Recompute one bill's aggregates from the delivery ledger and its carried
/// balance from the prior bill. Invoiced bills are frozen and skipped.
async fn resync_bill(
    tx: &mut Transaction<'_, sqlx::Sqlite>,
    bill: &Bill,
) -> Result<bool, AppError> {
    let invoiced = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM invoices WHERE bill_id = ?1",
    )
    .bind(bill.bill_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to check invoice: {}", e)))?;

    if invoiced > 0 {
        return Ok(false);
    }

    let (amount, cylinders) = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT COALESCE(SUM(amount), 0), COALESCE(SUM(quantity), 0)
        FROM delivery_entries
        WHERE admin_id = ?1 AND customer_id = ?2 AND kind = 'delivered'
          AND delivery_date >= ?3 AND delivery_date < ?4
        "#,
    )
    .bind(bill.admin_id)
    .bind(bill.customer_id)
    .bind(bill.bill_start_date)
    .bind(bill.bill_end_date)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to aggregate deliveries: {}", e)))?;

    let last_month_remaining =
        prior_outstanding(tx, bill.admin_id, bill.customer_id, bill.bill_start_date).await?;

    if amount == bill.current_month_bill
        && cylinders == bill.cylinders
        && last_month_remaining == bill.last_month_remaining
    {
        return Ok(false);
    }

    sqlx::query(
        r#"
        UPDATE bills
        SET current_month_bill = ?2, cylinders = ?3, last_month_remaining = ?4
        WHERE bill_id = ?1
        "#,
    )
    .bind(bill.bill_id)
    .bind(amount)
    .bind(cylinders)
    .bind(last_month_remaining)
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to resync bill: {}", e)))?;

    info!(
        bill_id = %bill.bill_id,
        current_month_bill = amount,
        last_month_remaining = last_month_remaining,
        "Bill re-synced from delivery ledger"
    );

    Ok(true)
}

/// Append an audit row inside the caller's transaction.
async fn append_log(
    tx: &mut Transaction<'_, sqlx::Sqlite>,
    admin_id: Uuid,
    customer_id: Option<Uuid>,
    bill_id: Option<Uuid>,
    kind: PaymentEventKind,
    amount: i64,
    details: Option<String>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO payment_logs (log_id, admin_id, customer_id, bill_id, kind, amount, details, created_utc)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(admin_id)
    .bind(customer_id)
    .bind(bill_id)
    .bind(kind.as_str())
    .bind(amount)
    .bind(details)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to append audit log: {}", e)))?;

    Ok(())
}

// -----------------------------------------------------------------------------
// List row mapping
// -----------------------------------------------------------------------------

const BILL_LIST_SQL: &str = r#"
SELECT b.bill_id, b.admin_id, b.customer_id, b.bill_start_date, b.bill_end_date,
       b.last_month_remaining, b.current_month_bill, b.cylinders, b.created_utc,
       COALESCE((SELECT SUM(p.amount) FROM payments p WHERE p.bill_id = b.bill_id), 0) AS paid_amount,
       EXISTS (SELECT 1 FROM invoices i WHERE i.bill_id = b.bill_id) AS invoiced
FROM bills b
WHERE (?1 IS NULL OR b.admin_id = ?1)
  AND (?2 IS NULL OR b.customer_id = ?2)
  AND (?3 IS NULL OR b.bill_start_date >= ?3)
  AND (?4 IS NULL OR b.bill_end_date <= ?4)
ORDER BY b.bill_id
LIMIT ?5
"#;

const BILL_LIST_SQL_PAGED: &str = r#"
SELECT b.bill_id, b.admin_id, b.customer_id, b.bill_start_date, b.bill_end_date,
       b.last_month_remaining, b.current_month_bill, b.cylinders, b.created_utc,
       COALESCE((SELECT SUM(p.amount) FROM payments p WHERE p.bill_id = b.bill_id), 0) AS paid_amount,
       EXISTS (SELECT 1 FROM invoices i WHERE i.bill_id = b.bill_id) AS invoiced
FROM bills b
WHERE (?1 IS NULL OR b.admin_id = ?1)
  AND (?2 IS NULL OR b.customer_id = ?2)
  AND (?3 IS NULL OR b.bill_start_date >= ?3)
  AND (?4 IS NULL OR b.bill_end_date <= ?4)
  AND b.bill_id > ?5
ORDER BY b.bill_id
LIMIT ?6
"#;

#[derive(sqlx::FromRow)]
struct BillListRow {
    bill_id: Uuid,
    admin_id: Uuid,
    customer_id: Uuid,
    bill_start_date: NaiveDate,
    bill_end_date: NaiveDate,
    last_month_remaining: i64,
    current_month_bill: i64,
    cylinders: i64,
    created_utc: chrono::DateTime<Utc>,
    paid_amount: i64,
    invoiced: bool,
}

impl BillListRow {
    fn into_summary(self) -> BillSummary {
        let totals = derive_totals(self.last_month_remaining, self.current_month_bill, self.paid_amount);
        BillSummary {
            bill: Bill {
                bill_id: self.bill_id,
                admin_id: self.admin_id,
                customer_id: self.customer_id,
                bill_start_date: self.bill_start_date,
                bill_end_date: self.bill_end_date,
                last_month_remaining: self.last_month_remaining,
                current_month_bill: self.current_month_bill,
                cylinders: self.cylinders,
                created_utc: self.created_utc,
            },
            totals,
            invoiced: self.invoiced,
        }
    }
}
