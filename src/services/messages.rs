use actix::Message;

use crate::errors::ApiError;
use crate::services::db_models::{
    Category, Item, Order, OrderWithItems, Product, ProductWithCategory, User, UserProfile,
};

// ---- users ----

#[derive(Message)]
#[rtype(result = "Result<UserProfile, ApiError>")]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Credential check happens inside the database actor so the argon2 work
/// stays off the async threads. The token itself is signed in the route.
#[derive(Message)]
#[rtype(result = "Result<User, ApiError>")]
pub struct AuthenticateUser {
    pub email: String,
    pub password: String,
}

#[derive(Message)]
#[rtype(result = "Result<User, ApiError>")]
pub struct FetchUser(pub i64);

// ---- catalog ----

#[derive(Message)]
#[rtype(result = "Result<Category, ApiError>")]
pub struct CreateCategory {
    pub name: String,
}

#[derive(Message)]
#[rtype(result = "Result<Vec<Category>, ApiError>")]
pub struct FetchCategories;

#[derive(Message)]
#[rtype(result = "Result<Category, ApiError>")]
pub struct FetchCategory(pub i64);

#[derive(Message)]
#[rtype(result = "Result<Product, ApiError>")]
pub struct CreateProduct {
    pub name: String,
    pub price: i32,
    pub description: String,
    pub banner: String,
    pub category_id: i64,
}

#[derive(Message)]
#[rtype(result = "Result<Vec<ProductWithCategory>, ApiError>")]
pub struct FetchProducts {
    pub disabled: bool,
}

#[derive(Message)]
#[rtype(result = "Result<Vec<ProductWithCategory>, ApiError>")]
pub struct FetchProductsByCategory(pub i64);

// ---- orders ----

#[derive(Message)]
#[rtype(result = "Result<Order, ApiError>")]
pub struct CreateOrder {
    pub table_number: i32,
    pub name: Option<String>,
}

#[derive(Message)]
#[rtype(result = "Result<(), ApiError>")]
pub struct DeleteOrder(pub i64);

#[derive(Message)]
#[rtype(result = "Result<Item, ApiError>")]
pub struct AddItem {
    pub order_id: i64,
    pub product_id: i64,
    pub amount: i32,
}

#[derive(Message)]
#[rtype(result = "Result<(), ApiError>")]
pub struct RemoveItem(pub i64);

#[derive(Message)]
#[rtype(result = "Result<OrderWithItems, ApiError>")]
pub struct SendOrder {
    pub order_id: i64,
    pub name: String,
}

#[derive(Message)]
#[rtype(result = "Result<OrderWithItems, ApiError>")]
pub struct FinishOrder(pub i64);

#[derive(Message)]
#[rtype(result = "Result<Vec<Order>, ApiError>")]
pub struct FetchOrders {
    pub draft: Option<bool>,
}

#[derive(Message)]
#[rtype(result = "Result<OrderWithItems, ApiError>")]
pub struct FetchOrderDetail(pub i64);
