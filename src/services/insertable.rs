use diesel::Insertable;
use serde::Serialize;

use crate::schema::categories;
use crate::schema::items;
use crate::schema::orders;
use crate::schema::products;
use crate::schema::users;
use crate::services::db_models::OrderStatus;

#[derive(Insertable, Clone)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    /// Argon2 hash, never the plain password.
    pub password: String,
}

#[derive(Insertable, Serialize, Clone)]
#[diesel(table_name = categories)]
pub struct NewCategory {
    pub name: String,
}

#[derive(Insertable, Serialize, Clone)]
#[diesel(table_name = products)]
pub struct NewProduct {
    pub name: String,
    pub price: i32,
    pub description: String,
    pub banner: String,
    pub category_id: i64,
}

#[derive(Insertable, Serialize, Clone)]
#[diesel(table_name = orders)]
pub struct NewOrder {
    pub table_number: i32,
    pub name: Option<String>,
    pub status: OrderStatus,
}

#[derive(Insertable, Serialize, Clone)]
#[diesel(table_name = items)]
pub struct NewItem {
    pub order_id: i64,
    pub product_id: i64,
    pub amount: i32,
}
