use std::fmt::{Display, Formatter};
use std::io::Write;

use chrono::NaiveDateTime;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::Queryable;
use serde::{Deserialize, Serialize};

use crate::schema::sql_types;

/// Order lifecycle. A single tagged state replaces the draft/status boolean
/// pair of the legacy data model, so the impossible draft-and-finished
/// combination cannot be stored at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = sql_types::OrderStatus)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,
    Sent,
    Finished,
}

impl OrderStatus {
    /// Items may only be attached or removed while the order sits at the table.
    pub fn items_mutable(self) -> bool {
        matches!(self, OrderStatus::Draft)
    }

    /// Draft -> Sent. Returns the offending state when the order already
    /// left the table.
    pub fn send(self) -> Result<Self, Self> {
        match self {
            OrderStatus::Draft => Ok(OrderStatus::Sent),
            other => Err(other),
        }
    }

    /// Sent -> Finished. Finishing twice is accepted and keeps the order
    /// finished; finishing a draft is rejected.
    pub fn finish(self) -> Result<Self, Self> {
        match self {
            OrderStatus::Sent | OrderStatus::Finished => Ok(OrderStatus::Finished),
            OrderStatus::Draft => Err(OrderStatus::Draft),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Sent => "sent",
            OrderStatus::Finished => "finished",
        }
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl ToSql<sql_types::OrderStatus, Pg> for OrderStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<sql_types::OrderStatus, Pg> for OrderStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"draft" => Ok(OrderStatus::Draft),
            b"sent" => Ok(OrderStatus::Sent),
            b"finished" => Ok(OrderStatus::Finished),
            other => Err(format!("unrecognized order_status: {}", String::from_utf8_lossy(other)).into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = sql_types::UserRole)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
}

impl ToSql<sql_types::UserRole, Pg> for Role {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            Role::User => out.write_all(b"USER")?,
            Role::Admin => out.write_all(b"ADMIN")?,
        }
        Ok(IsNull::No)
    }
}

impl FromSql<sql_types::UserRole, Pg> for Role {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"USER" => Ok(Role::User),
            b"ADMIN" => Ok(Role::Admin),
            other => Err(format!("unrecognized user_role: {}", String::from_utf8_lossy(other)).into()),
        }
    }
}

#[derive(Queryable, Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub role: Role,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// User as exposed over the API: everything but the password hash.
#[derive(Queryable, Debug, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: NaiveDateTime,
}

#[derive(Queryable, Debug, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Queryable, Debug, Serialize)]
pub struct CategorySummary {
    pub id: i64,
    pub name: String,
}

#[derive(Queryable, Debug, Serialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: i32,
    pub description: String,
    pub banner: String,
    pub disabled: bool,
    pub category_id: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Queryable, Debug, Serialize)]
pub struct ProductSummary {
    pub id: i64,
    pub name: String,
    pub price: i32,
    pub banner: String,
}

#[derive(Debug, Serialize)]
pub struct ProductWithCategory {
    #[serde(flatten)]
    pub product: Product,
    pub category: CategorySummary,
}

#[derive(Queryable, Debug, Serialize)]
pub struct Order {
    pub id: i64,
    #[serde(rename = "table")]
    pub table_number: i32,
    pub name: Option<String>,
    pub status: OrderStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Queryable, Debug, Serialize)]
pub struct Item {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub amount: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Serialize)]
pub struct ItemWithProduct {
    #[serde(flatten)]
    pub item: Item,
    pub product: ProductSummary,
}

#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<ItemWithProduct>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_order_can_be_sent_once() {
        assert_eq!(OrderStatus::Draft.send(), Ok(OrderStatus::Sent));
        assert_eq!(OrderStatus::Sent.send(), Err(OrderStatus::Sent));
        assert_eq!(OrderStatus::Finished.send(), Err(OrderStatus::Finished));
    }

    #[test]
    fn finishing_requires_the_order_to_have_left_the_table() {
        assert_eq!(OrderStatus::Sent.finish(), Ok(OrderStatus::Finished));
        assert_eq!(OrderStatus::Draft.finish(), Err(OrderStatus::Draft));
    }

    #[test]
    fn finishing_twice_is_idempotent() {
        let status = OrderStatus::Sent.finish().unwrap();
        assert_eq!(status.finish(), Ok(OrderStatus::Finished));
    }

    #[test]
    fn items_are_mutable_only_while_draft() {
        assert!(OrderStatus::Draft.items_mutable());
        assert!(!OrderStatus::Sent.items_mutable());
        assert!(!OrderStatus::Finished.items_mutable());
    }

    #[test]
    fn status_serializes_in_upper_case() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Draft).unwrap(),
            "\"DRAFT\""
        );
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"ADMIN\"");
    }
}
