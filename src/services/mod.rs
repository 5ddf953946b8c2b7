use actix_web::{get, HttpResponse, Responder};

pub mod auth_handling;
pub mod db_models;
pub mod db_utils;
pub mod insertable;
pub mod messages;
pub mod pg_handling;
pub mod upload_handling;

#[get("/")]
pub async fn home_page() -> impl Responder {
    HttpResponse::Ok().body("comanda order-management service")
}

// "/session" and "/users"
pub mod session_route {
    use actix_web::web::{Data, Json};
    use actix_web::{post, HttpResponse};
    use serde::Deserialize;
    use serde_json::json;
    use validator::Validate;

    use crate::errors::ApiError;
    use crate::services::db_utils::AppState;
    use crate::services::messages::{AuthenticateUser, CreateUser};

    #[derive(Deserialize, Validate)]
    pub struct CreateUserBody {
        #[validate(length(min = 1, message = "name is required"))]
        pub name: String,
        #[validate(email(message = "email must be a valid address"))]
        pub email: String,
        #[validate(length(min = 1, message = "password is required"))]
        pub password: String,
    }

    #[post("/users")]
    pub async fn create_user(
        state: Data<AppState>,
        body: Json<CreateUserBody>,
    ) -> Result<HttpResponse, ApiError> {
        body.validate()?;
        let body = body.into_inner();

        let profile = state
            .pg_db
            .send(CreateUser {
                name: body.name,
                email: body.email,
                password: body.password,
            })
            .await??;

        Ok(HttpResponse::Created().json(profile))
    }

    #[derive(Deserialize, Validate)]
    pub struct SessionBody {
        #[validate(email(message = "email must be a valid address"))]
        pub email: String,
        #[validate(length(min = 1, message = "password is required"))]
        pub password: String,
    }

    #[post("/session")]
    pub async fn create_session(
        state: Data<AppState>,
        body: Json<SessionBody>,
    ) -> Result<HttpResponse, ApiError> {
        body.validate()?;
        let body = body.into_inner();

        let user = state
            .pg_db
            .send(AuthenticateUser {
                email: body.email,
                password: body.password,
            })
            .await??;

        let token = state.jwt.sign(&user)?;

        Ok(HttpResponse::Ok().json(json!({
            "id": user.id,
            "name": user.name,
            "email": user.email,
            "role": user.role,
            "token": token,
        })))
    }
}

// sub-route "/category"
pub mod category_route {
    use actix_web::web::{Data, Json};
    use actix_web::{get, post, HttpResponse};
    use serde::Deserialize;
    use validator::Validate;

    use crate::errors::ApiError;
    use crate::services::auth_handling::{AdminUser, AuthedUser};
    use crate::services::db_utils::AppState;
    use crate::services::messages::{CreateCategory, FetchCategories};

    #[derive(Deserialize, Validate)]
    pub struct CreateCategoryBody {
        #[validate(length(min = 2, message = "category name needs at least 2 characters"))]
        pub name: String,
    }

    #[post("")]
    pub async fn create_category(
        state: Data<AppState>,
        body: Json<CreateCategoryBody>,
        _admin: AdminUser,
    ) -> Result<HttpResponse, ApiError> {
        body.validate()?;

        let category = state
            .pg_db
            .send(CreateCategory {
                name: body.into_inner().name,
            })
            .await??;

        Ok(HttpResponse::Created().json(category))
    }

    #[get("")]
    pub async fn list_categories(
        state: Data<AppState>,
        _user: AuthedUser,
    ) -> Result<HttpResponse, ApiError> {
        let categories = state.pg_db.send(FetchCategories).await??;

        Ok(HttpResponse::Ok().json(categories))
    }
}

// "/product" and sub-route "/products"
pub mod product_route {
    use actix_multipart::Multipart;
    use actix_web::web::{Data, Query};
    use actix_web::{get, post, HttpResponse};
    use serde::Deserialize;

    use crate::errors::ApiError;
    use crate::services::auth_handling::{AdminUser, AuthedUser};
    use crate::services::db_models::Product;
    use crate::services::db_utils::AppState;
    use crate::services::messages::{
        CreateProduct, FetchCategory, FetchProducts, FetchProductsByCategory,
    };
    use crate::services::upload_handling::read_product_form;

    #[post("/product")]
    pub async fn create_product(
        state: Data<AppState>,
        payload: Multipart,
        _admin: AdminUser,
    ) -> Result<HttpResponse, ApiError> {
        let form = read_product_form(payload).await?;

        // The category is checked before anything leaves the process, so a
        // bad id costs no remote upload.
        state.pg_db.send(FetchCategory(form.category_id)).await??;

        let stored = state
            .images
            .upload(form.image.bytes, &form.image.filename)
            .await
            .map_err(ApiError::from)?;

        let inserted: Result<Product, ApiError> = state
            .pg_db
            .send(CreateProduct {
                name: form.name,
                price: form.price,
                description: form.description,
                banner: stored.secure_url.clone(),
                category_id: form.category_id,
            })
            .await
            .map_err(ApiError::from)
            .and_then(|res| res);

        match inserted {
            Ok(product) => Ok(HttpResponse::Created().json(product)),
            Err(err) => {
                // Best effort: do not leave an orphaned asset referenced by
                // no product.
                if let Err(del_err) = state.images.delete(&stored.public_id).await {
                    tracing::warn!(
                        public_id = %stored.public_id,
                        error = %del_err,
                        "failed to clean up orphaned product image"
                    );
                }
                Err(err)
            }
        }
    }

    #[derive(Deserialize)]
    pub struct ListProductsQuery {
        pub disabled: Option<bool>,
    }

    #[get("")]
    pub async fn list_products(
        state: Data<AppState>,
        query: Query<ListProductsQuery>,
        _user: AuthedUser,
    ) -> Result<HttpResponse, ApiError> {
        let products = state
            .pg_db
            .send(FetchProducts {
                disabled: query.disabled.unwrap_or(false),
            })
            .await??;

        Ok(HttpResponse::Ok().json(products))
    }

    #[derive(Deserialize)]
    pub struct ByCategoryQuery {
        pub category_id: i64,
    }

    #[get("/category")]
    pub async fn list_products_by_category(
        state: Data<AppState>,
        query: Query<ByCategoryQuery>,
        _user: AuthedUser,
    ) -> Result<HttpResponse, ApiError> {
        let products = state
            .pg_db
            .send(FetchProductsByCategory(query.category_id))
            .await??;

        Ok(HttpResponse::Ok().json(products))
    }
}

// sub-route "/order"
pub mod order_route {
    use actix_web::web::{Data, Json, Query};
    use actix_web::{delete, get, post, put, HttpResponse};
    use serde::Deserialize;
    use serde_json::json;
    use validator::Validate;

    use crate::errors::ApiError;
    use crate::services::auth_handling::AuthedUser;
    use crate::services::db_utils::AppState;
    use crate::services::messages::{
        AddItem, CreateOrder, DeleteOrder, FetchOrderDetail, FetchOrders, FinishOrder, RemoveItem,
        SendOrder,
    };

    #[derive(Deserialize, Validate)]
    pub struct CreateOrderBody {
        #[validate(range(min = 1, message = "table number must be positive"))]
        pub table: i32,
        pub name: Option<String>,
    }

    #[post("")]
    pub async fn create_order(
        state: Data<AppState>,
        body: Json<CreateOrderBody>,
        _user: AuthedUser,
    ) -> Result<HttpResponse, ApiError> {
        body.validate()?;
        let body = body.into_inner();

        let order = state
            .pg_db
            .send(CreateOrder {
                table_number: body.table,
                name: body.name,
            })
            .await??;

        Ok(HttpResponse::Created().json(order))
    }

    #[derive(Deserialize)]
    pub struct OrderQuery {
        pub order_id: i64,
    }

    #[delete("")]
    pub async fn delete_order(
        state: Data<AppState>,
        query: Query<OrderQuery>,
        _user: AuthedUser,
    ) -> Result<HttpResponse, ApiError> {
        state.pg_db.send(DeleteOrder(query.order_id)).await??;

        Ok(HttpResponse::Ok().json(json!({ "message": "order removed" })))
    }

    #[derive(Deserialize, Validate)]
    pub struct AddItemBody {
        pub order_id: i64,
        pub product_id: i64,
        #[validate(range(min = 1, message = "amount must be positive"))]
        pub amount: i32,
    }

    #[post("/add")]
    pub async fn add_item(
        state: Data<AppState>,
        body: Json<AddItemBody>,
        _user: AuthedUser,
    ) -> Result<HttpResponse, ApiError> {
        body.validate()?;

        let item = state
            .pg_db
            .send(AddItem {
                order_id: body.order_id,
                product_id: body.product_id,
                amount: body.amount,
            })
            .await??;

        Ok(HttpResponse::Created().json(item))
    }

    #[derive(Deserialize)]
    pub struct ItemQuery {
        pub item_id: i64,
    }

    #[delete("/remove")]
    pub async fn remove_item(
        state: Data<AppState>,
        query: Query<ItemQuery>,
        _user: AuthedUser,
    ) -> Result<HttpResponse, ApiError> {
        state.pg_db.send(RemoveItem(query.item_id)).await??;

        Ok(HttpResponse::Ok().json(json!({ "message": "item removed from order" })))
    }

    #[derive(Deserialize, Validate)]
    pub struct SendOrderBody {
        pub order_id: i64,
        #[validate(length(min = 1, message = "customer name is required"))]
        pub name: String,
    }

    #[put("/send")]
    pub async fn send_order(
        state: Data<AppState>,
        body: Json<SendOrderBody>,
        _user: AuthedUser,
    ) -> Result<HttpResponse, ApiError> {
        body.validate()?;
        let body = body.into_inner();

        let order = state
            .pg_db
            .send(SendOrder {
                order_id: body.order_id,
                name: body.name,
            })
            .await??;

        Ok(HttpResponse::Ok().json(order))
    }

    #[derive(Deserialize)]
    pub struct FinishOrderBody {
        pub order_id: i64,
    }

    #[put("/finish")]
    pub async fn finish_order(
        state: Data<AppState>,
        body: Json<FinishOrderBody>,
        _user: AuthedUser,
    ) -> Result<HttpResponse, ApiError> {
        let order = state.pg_db.send(FinishOrder(body.order_id)).await??;

        Ok(HttpResponse::Ok().json(order))
    }

    #[derive(Deserialize)]
    pub struct ListOrdersQuery {
        pub draft: Option<bool>,
    }

    #[get("")]
    pub async fn list_orders(
        state: Data<AppState>,
        query: Query<ListOrdersQuery>,
        _user: AuthedUser,
    ) -> Result<HttpResponse, ApiError> {
        let orders = state
            .pg_db
            .send(FetchOrders { draft: query.draft })
            .await??;

        Ok(HttpResponse::Ok().json(orders))
    }

    #[get("/detail")]
    pub async fn order_detail(
        state: Data<AppState>,
        query: Query<OrderQuery>,
        _user: AuthedUser,
    ) -> Result<HttpResponse, ApiError> {
        let order = state.pg_db.send(FetchOrderDetail(query.order_id)).await??;

        Ok(HttpResponse::Ok().json(order))
    }
}

#[cfg(test)]
mod tests {
    use validator::Validate;

    use super::category_route::CreateCategoryBody;
    use super::order_route::{AddItemBody, CreateOrderBody, SendOrderBody};
    use super::session_route::SessionBody;

    #[test]
    fn category_name_needs_two_characters() {
        let short = CreateCategoryBody { name: "B".into() };
        assert!(short.validate().is_err());

        let ok = CreateCategoryBody {
            name: "Burgers".into(),
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn order_table_must_be_positive() {
        let bad = CreateOrderBody {
            table: 0,
            name: None,
        };
        assert!(bad.validate().is_err());

        let ok = CreateOrderBody {
            table: 5,
            name: Some("Maria".into()),
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn item_amount_must_be_positive() {
        let bad = AddItemBody {
            order_id: 1,
            product_id: 1,
            amount: 0,
        };
        assert!(bad.validate().is_err());

        let ok = AddItemBody {
            order_id: 1,
            product_id: 1,
            amount: 2,
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn send_order_requires_a_customer_name() {
        let bad = SendOrderBody {
            order_id: 1,
            name: String::new(),
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn session_email_must_be_well_formed() {
        let bad = SessionBody {
            email: "not-an-email".into(),
            password: "secret".into(),
        };
        assert!(bad.validate().is_err());

        let ok = SessionBody {
            email: "admin@example.com".into(),
            password: "secret".into(),
        };
        assert!(ok.validate().is_ok());
    }
}
