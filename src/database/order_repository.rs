use crate::database::error::{DatabaseError, DatabaseErrorKind};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tokio::sync::Mutex;
use uuid::Uuid;

#[cfg(feature = "database")]
use sqlx::PgPool;

/// Order lifecycle. `Booked` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Booked,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Booked => "booked",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "booked" => Ok(OrderStatus::Booked),
            "failed" => Ok(OrderStatus::Failed),
            other => Err(DatabaseError::new(DatabaseErrorKind::CorruptRow {
                message: format!("unknown order status '{}'", other),
            })),
        }
    }
}

impl TryFrom<String> for OrderStatus {
    type Error = DatabaseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Order entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Order {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub gateway: String,
    pub product_name: String,
    pub quantity: i32,
    pub unit: String,
    pub total_price: BigDecimal,
    pub amount_paid: BigDecimal,
    pub payment_option: String,
    /// Internal txnid until a successful callback replaces it with the
    /// gateway's own reference.
    pub utr_code: String,
    #[cfg_attr(feature = "database", sqlx(try_from = "String"))]
    pub status: OrderStatus,
    pub buyer_name: String,
    pub buyer_mobile: String,
    pub address_line_1: String,
    pub address_line_2: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything needed to insert an order; it always starts `Pending`.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Option<Uuid>,
    pub gateway: String,
    pub product_name: String,
    pub quantity: i32,
    pub unit: String,
    pub total_price: BigDecimal,
    pub amount_paid: BigDecimal,
    pub payment_option: String,
    pub utr_code: String,
    pub buyer_name: String,
    pub buyer_mobile: String,
    pub address_line_1: String,
    pub address_line_2: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
}

impl NewOrder {
    fn into_order(self, now: DateTime<Utc>) -> Order {
        Order {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            gateway: self.gateway,
            product_name: self.product_name,
            quantity: self.quantity,
            unit: self.unit,
            total_price: self.total_price,
            amount_paid: self.amount_paid,
            payment_option: self.payment_option,
            utr_code: self.utr_code,
            status: OrderStatus::Pending,
            buyer_name: self.buyer_name,
            buyer_mobile: self.buyer_mobile,
            address_line_1: self.address_line_1,
            address_line_2: self.address_line_2,
            city: self.city,
            state: self.state,
            pincode: self.pincode,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of a compare-and-swap status update
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    Committed(Order),
    /// The order was no longer `Pending` when the update ran.
    Conflict,
}

/// Order persistence seen by the orchestrator
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: NewOrder) -> Result<Order, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError>;

    async fn find_by_utr_code(&self, utr_code: &str) -> Result<Option<Order>, DatabaseError>;

    /// Moves a `Pending` order to `status` and replaces its utr code.
    /// Returns `Conflict` if the stored status is no longer `Pending`.
    async fn update_status_and_utr(
        &self,
        id: Uuid,
        status: OrderStatus,
        new_utr: &str,
    ) -> Result<UpdateOutcome, DatabaseError>;

    async fn ping(&self) -> Result<(), DatabaseError>;
}

fn order_not_found(id: Uuid) -> DatabaseError {
    DatabaseError::new(DatabaseErrorKind::NotFound {
        entity: "Order".to_string(),
        id: id.to_string(),
    })
}

// ============================================================================
// Postgres
// ============================================================================

#[cfg(feature = "database")]
const ORDER_COLUMNS: &str = "id, user_id, gateway, product_name, quantity, unit, total_price, \
     amount_paid, payment_option, utr_code, status, buyer_name, buyer_mobile, address_line_1, \
     address_line_2, city, state, pincode, created_at, updated_at";

/// Repository for orders backed by Postgres
#[cfg(feature = "database")]
pub struct PgOrderRepository {
    pool: PgPool,
}

#[cfg(feature = "database")]
impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "database")]
#[async_trait]
impl OrderStore for PgOrderRepository {
    async fn create(&self, order: NewOrder) -> Result<Order, DatabaseError> {
        let sql = format!(
            "INSERT INTO orders (id, user_id, gateway, product_name, quantity, unit, total_price, \
             amount_paid, payment_option, utr_code, status, buyer_name, buyer_mobile, \
             address_line_1, address_line_2, city, state, pincode) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
             RETURNING {}",
            ORDER_COLUMNS
        );
        sqlx::query_as::<_, Order>(&sql)
            .bind(Uuid::new_v4())
            .bind(order.user_id)
            .bind(&order.gateway)
            .bind(&order.product_name)
            .bind(order.quantity)
            .bind(&order.unit)
            .bind(&order.total_price)
            .bind(&order.amount_paid)
            .bind(&order.payment_option)
            .bind(&order.utr_code)
            .bind(OrderStatus::Pending.as_str())
            .bind(&order.buyer_name)
            .bind(&order.buyer_mobile)
            .bind(&order.address_line_1)
            .bind(&order.address_line_2)
            .bind(&order.city)
            .bind(&order.state)
            .bind(&order.pincode)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
        sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_utr_code(&self, utr_code: &str) -> Result<Option<Order>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM orders WHERE utr_code = $1 ORDER BY created_at DESC LIMIT 1",
            ORDER_COLUMNS
        );
        sqlx::query_as::<_, Order>(&sql)
            .bind(utr_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn update_status_and_utr(
        &self,
        id: Uuid,
        status: OrderStatus,
        new_utr: &str,
    ) -> Result<UpdateOutcome, DatabaseError> {
        // The status predicate is the compare-and-swap; concurrent callers
        // serialize on the row lock and the loser sees zero rows.
        let sql = format!(
            "UPDATE orders SET status = $2, utr_code = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $4 RETURNING {}",
            ORDER_COLUMNS
        );
        let updated = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .bind(status.as_str())
            .bind(new_utr)
            .bind(OrderStatus::Pending.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        match updated {
            Some(order) => Ok(UpdateOutcome::Committed(order)),
            None => match self.find_by_id(id).await? {
                Some(_) => Ok(UpdateOutcome::Conflict),
                None => Err(order_not_found(id)),
            },
        }
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        super::health_check(&self.pool).await
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local store used by tests and `SKIP_EXTERNALS` runs.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<Uuid, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.lock().await.is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: NewOrder) -> Result<Order, DatabaseError> {
        let mut orders = self.orders.lock().await;
        if orders.values().any(|o| o.utr_code == order.utr_code) {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: "orders_utr_code_key".to_string(),
            }));
        }
        let order = order.into_order(Utc::now());
        orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError> {
        Ok(self.orders.lock().await.get(&id).cloned())
    }

    async fn find_by_utr_code(&self, utr_code: &str) -> Result<Option<Order>, DatabaseError> {
        Ok(self
            .orders
            .lock()
            .await
            .values()
            .filter(|o| o.utr_code == utr_code)
            .max_by_key(|o| o.created_at)
            .cloned())
    }

    async fn update_status_and_utr(
        &self,
        id: Uuid,
        status: OrderStatus,
        new_utr: &str,
    ) -> Result<UpdateOutcome, DatabaseError> {
        let mut orders = self.orders.lock().await;
        let order = orders.get_mut(&id).ok_or_else(|| order_not_found(id))?;
        if order.status != OrderStatus::Pending {
            return Ok(UpdateOutcome::Conflict);
        }
        order.status = status;
        order.utr_code = new_utr.to_string();
        order.updated_at = Utc::now();
        Ok(UpdateOutcome::Committed(order.clone()))
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}
