use actix::Handler;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error};
use diesel::{ExpressionMethods, OptionalExtension, PgConnection, QueryDsl, RunQueryDsl};

use crate::errors::ApiError;
use crate::services::auth_handling::{hash_password, verify_password};
use crate::services::db_models::{
    Category, CategorySummary, Item, ItemWithProduct, Order, OrderStatus, OrderWithItems, Product,
    ProductSummary, ProductWithCategory, User, UserProfile,
};
use crate::services::db_utils::PgActor;
use crate::services::insertable::{NewCategory, NewItem, NewOrder, NewProduct, NewUser};
use crate::services::messages::{
    AddItem, AuthenticateUser, CreateCategory, CreateOrder, CreateProduct, CreateUser, DeleteOrder,
    FetchCategories, FetchCategory, FetchOrderDetail, FetchOrders, FetchProducts,
    FetchProductsByCategory, FetchUser, FinishOrder, RemoveItem, SendOrder,
};

fn establish_connection(
    pool: &Pool<ConnectionManager<PgConnection>>,
) -> Result<PooledConnection<ConnectionManager<PgConnection>>, ApiError> {
    pool.get().map_err(|err| {
        ApiError::Persistence(Error::DatabaseError(
            DatabaseErrorKind::ClosedConnection,
            Box::new(format!("failed to check out a connection: {err}")),
        ))
    })
}

fn order_not_found() -> ApiError {
    ApiError::NotFound("order not found".into())
}

fn find_order(conn: &mut PgConnection, order_id: i64) -> Result<Order, ApiError> {
    use crate::schema::orders::dsl::orders;

    orders
        .find(order_id)
        .first::<Order>(conn)
        .optional()?
        .ok_or_else(order_not_found)
}

fn with_items(conn: &mut PgConnection, order: Order) -> Result<OrderWithItems, ApiError> {
    use crate::schema::{items, products};

    let rows = items::table
        .inner_join(products::table)
        .filter(items::order_id.eq(order.id))
        .order(items::created_at.asc())
        .select((
            items::all_columns,
            (products::id, products::name, products::price, products::banner),
        ))
        .load::<(Item, ProductSummary)>(conn)?;

    Ok(OrderWithItems {
        order,
        items: rows
            .into_iter()
            .map(|(item, product)| ItemWithProduct { item, product })
            .collect(),
    })
}

/// A unique-violation slipping past the pre-insert email lookup means two
/// requests raced; it gets the same answer the pre-check gives.
fn duplicate_email(err: Error) -> ApiError {
    match err {
        Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            ApiError::Validation("a user with this email already exists".into())
        }
        other => ApiError::Persistence(other),
    }
}

fn invalid_transition(state: OrderStatus) -> ApiError {
    match state {
        OrderStatus::Sent => ApiError::InvalidState("order already sent to the kitchen".into()),
        OrderStatus::Finished => ApiError::InvalidState("order already finished".into()),
        OrderStatus::Draft => {
            ApiError::InvalidState("order is still a draft and was never sent to the kitchen".into())
        }
    }
}

impl Handler<CreateUser> for PgActor {
    type Result = Result<UserProfile, ApiError>;

    fn handle(&mut self, msg: CreateUser, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::users::dsl::users;
        use crate::schema::users::{created_at, email, id, name, role};

        let mut conn = establish_connection(&self.0)?;

        let taken = users
            .filter(email.eq(&msg.email))
            .select(id)
            .first::<i64>(&mut conn)
            .optional()?;
        if taken.is_some() {
            return Err(ApiError::Validation(
                "a user with this email already exists".into(),
            ));
        }

        let profile = diesel::insert_into(users)
            .values(NewUser {
                name: msg.name,
                email: msg.email,
                password: hash_password(&msg.password)?,
            })
            .returning((id, name, email, role, created_at))
            .get_result::<UserProfile>(&mut conn)
            .map_err(duplicate_email)?;

        Ok(profile)
    }
}

impl Handler<AuthenticateUser> for PgActor {
    type Result = Result<User, ApiError>;

    fn handle(&mut self, msg: AuthenticateUser, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::users::dsl::users;
        use crate::schema::users::email;

        let mut conn = establish_connection(&self.0)?;

        // One message for both the unknown-email and wrong-password cases,
        // so the response does not reveal which half was wrong.
        let user = users
            .filter(email.eq(&msg.email))
            .first::<User>(&mut conn)
            .optional()?
            .ok_or(ApiError::Auth("invalid credentials"))?;

        if !verify_password(&user.password, &msg.password) {
            return Err(ApiError::Auth("invalid credentials"));
        }

        Ok(user)
    }
}

impl Handler<FetchUser> for PgActor {
    type Result = Result<User, ApiError>;

    fn handle(&mut self, msg: FetchUser, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::users::dsl::users;

        let mut conn = establish_connection(&self.0)?;

        users
            .find(msg.0)
            .first::<User>(&mut conn)
            .optional()?
            .ok_or_else(|| ApiError::NotFound("user not found".into()))
    }
}

impl Handler<CreateCategory> for PgActor {
    type Result = Result<Category, ApiError>;

    fn handle(&mut self, msg: CreateCategory, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::categories::dsl::categories;

        let mut conn = establish_connection(&self.0)?;

        let category = diesel::insert_into(categories)
            .values(NewCategory { name: msg.name })
            .get_result::<Category>(&mut conn)?;

        Ok(category)
    }
}

impl Handler<FetchCategories> for PgActor {
    type Result = Result<Vec<Category>, ApiError>;

    fn handle(&mut self, _msg: FetchCategories, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::categories::created_at;
        use crate::schema::categories::dsl::categories;

        let mut conn = establish_connection(&self.0)?;

        Ok(categories
            .order(created_at.desc())
            .load::<Category>(&mut conn)?)
    }
}

impl Handler<FetchCategory> for PgActor {
    type Result = Result<Category, ApiError>;

    fn handle(&mut self, msg: FetchCategory, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::categories::dsl::categories;

        let mut conn = establish_connection(&self.0)?;

        categories
            .find(msg.0)
            .first::<Category>(&mut conn)
            .optional()?
            .ok_or_else(|| ApiError::NotFound("category not found".into()))
    }
}

impl Handler<CreateProduct> for PgActor {
    type Result = Result<Product, ApiError>;

    fn handle(&mut self, msg: CreateProduct, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::products::dsl::products;

        let mut conn = establish_connection(&self.0)?;

        diesel::insert_into(products)
            .values(NewProduct {
                name: msg.name,
                price: msg.price,
                description: msg.description,
                banner: msg.banner,
                category_id: msg.category_id,
            })
            .get_result::<Product>(&mut conn)
            .map_err(|err| match err {
                // The category was checked before the upload, but it may have
                // been deleted in between. Surface the constraint as the same
                // not-found the pre-check produces.
                Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                    ApiError::NotFound("category not found".into())
                }
                other => ApiError::Persistence(other),
            })
    }
}

impl Handler<FetchProducts> for PgActor {
    type Result = Result<Vec<ProductWithCategory>, ApiError>;

    fn handle(&mut self, msg: FetchProducts, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::{categories, products};

        let mut conn = establish_connection(&self.0)?;

        let rows = products::table
            .inner_join(categories::table)
            .filter(products::disabled.eq(msg.disabled))
            .order(products::created_at.desc())
            .select((products::all_columns, (categories::id, categories::name)))
            .load::<(Product, CategorySummary)>(&mut conn)?;

        Ok(rows
            .into_iter()
            .map(|(product, category)| ProductWithCategory { product, category })
            .collect())
    }
}

impl Handler<FetchProductsByCategory> for PgActor {
    type Result = Result<Vec<ProductWithCategory>, ApiError>;

    fn handle(&mut self, msg: FetchProductsByCategory, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::{categories, products};

        let mut conn = establish_connection(&self.0)?;

        let category_known = categories::table
            .find(msg.0)
            .select(categories::id)
            .first::<i64>(&mut conn)
            .optional()?;
        if category_known.is_none() {
            return Err(ApiError::NotFound("category not found".into()));
        }

        let rows = products::table
            .inner_join(categories::table)
            .filter(products::category_id.eq(msg.0))
            .filter(products::disabled.eq(false))
            .order(products::created_at.desc())
            .select((products::all_columns, (categories::id, categories::name)))
            .load::<(Product, CategorySummary)>(&mut conn)?;

        Ok(rows
            .into_iter()
            .map(|(product, category)| ProductWithCategory { product, category })
            .collect())
    }
}

impl Handler<CreateOrder> for PgActor {
    type Result = Result<Order, ApiError>;

    fn handle(&mut self, msg: CreateOrder, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::orders::dsl::orders;

        let mut conn = establish_connection(&self.0)?;

        let order = diesel::insert_into(orders)
            .values(NewOrder {
                table_number: msg.table_number,
                name: msg.name,
                status: OrderStatus::Draft,
            })
            .get_result::<Order>(&mut conn)?;

        Ok(order)
    }
}

impl Handler<DeleteOrder> for PgActor {
    type Result = Result<(), ApiError>;

    fn handle(&mut self, msg: DeleteOrder, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::items::{dsl::items, order_id};
        use crate::schema::orders::dsl::orders;

        let mut conn = establish_connection(&self.0)?;

        conn.build_transaction().run(|trx_conn| {
            let order = find_order(trx_conn, msg.0)?;
            if !order.status.items_mutable() {
                return Err(invalid_transition(order.status));
            }

            diesel::delete(items.filter(order_id.eq(order.id))).execute(trx_conn)?;
            diesel::delete(orders.find(order.id)).execute(trx_conn)?;

            Ok(())
        })
    }
}

impl Handler<AddItem> for PgActor {
    type Result = Result<Item, ApiError>;

    fn handle(&mut self, msg: AddItem, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::items::dsl::items;
        use crate::schema::products::{dsl::products, id as product_pk};

        let mut conn = establish_connection(&self.0)?;

        let order = find_order(&mut conn, msg.order_id)?;
        if !order.status.items_mutable() {
            return Err(invalid_transition(order.status));
        }

        let product_known = products
            .find(msg.product_id)
            .select(product_pk)
            .first::<i64>(&mut conn)
            .optional()?;
        if product_known.is_none() {
            return Err(ApiError::NotFound("product not found".into()));
        }

        let item = diesel::insert_into(items)
            .values(NewItem {
                order_id: msg.order_id,
                product_id: msg.product_id,
                amount: msg.amount,
            })
            .get_result::<Item>(&mut conn)?;

        Ok(item)
    }
}

impl Handler<RemoveItem> for PgActor {
    type Result = Result<(), ApiError>;

    fn handle(&mut self, msg: RemoveItem, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::items::dsl::items;
        use crate::schema::orders::{dsl::orders, status};

        let mut conn = establish_connection(&self.0)?;

        conn.build_transaction().run(|trx_conn| {
            let item = items
                .find(msg.0)
                .first::<Item>(trx_conn)
                .optional()?
                .ok_or_else(|| ApiError::NotFound("item not found".into()))?;

            let order_state = orders
                .find(item.order_id)
                .select(status)
                .first::<OrderStatus>(trx_conn)?;
            if !order_state.items_mutable() {
                return Err(invalid_transition(order_state));
            }

            diesel::delete(items.find(item.id)).execute(trx_conn)?;

            Ok(())
        })
    }
}

impl Handler<SendOrder> for PgActor {
    type Result = Result<OrderWithItems, ApiError>;

    fn handle(&mut self, msg: SendOrder, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::orders::{dsl::orders, name, status, updated_at};

        let mut conn = establish_connection(&self.0)?;

        conn.build_transaction().run(|trx_conn| {
            let order = find_order(trx_conn, msg.order_id)?;
            let next = order.status.send().map_err(invalid_transition)?;

            let updated = diesel::update(orders.find(order.id))
                .set((
                    status.eq(next),
                    name.eq(Some(msg.name)),
                    updated_at.eq(diesel::dsl::now),
                ))
                .get_result::<Order>(trx_conn)?;

            with_items(trx_conn, updated)
        })
    }
}

impl Handler<FinishOrder> for PgActor {
    type Result = Result<OrderWithItems, ApiError>;

    fn handle(&mut self, msg: FinishOrder, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::orders::{dsl::orders, status, updated_at};

        let mut conn = establish_connection(&self.0)?;

        conn.build_transaction().run(|trx_conn| {
            let order = find_order(trx_conn, msg.0)?;
            let next = order.status.finish().map_err(invalid_transition)?;

            let updated = diesel::update(orders.find(order.id))
                .set((status.eq(next), updated_at.eq(diesel::dsl::now)))
                .get_result::<Order>(trx_conn)?;

            with_items(trx_conn, updated)
        })
    }
}

impl Handler<FetchOrders> for PgActor {
    type Result = Result<Vec<Order>, ApiError>;

    fn handle(&mut self, msg: FetchOrders, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::orders::{created_at, dsl::orders, status};

        let mut conn = establish_connection(&self.0)?;

        let rows = match msg.draft {
            Some(true) => orders
                .filter(status.eq(OrderStatus::Draft))
                .order(created_at.desc())
                .load::<Order>(&mut conn)?,
            Some(false) => orders
                .filter(status.ne(OrderStatus::Draft))
                .order(created_at.desc())
                .load::<Order>(&mut conn)?,
            None => orders.order(created_at.desc()).load::<Order>(&mut conn)?,
        };

        Ok(rows)
    }
}

impl Handler<FetchOrderDetail> for PgActor {
    type Result = Result<OrderWithItems, ApiError>;

    fn handle(&mut self, msg: FetchOrderDetail, _ctx: &mut Self::Context) -> Self::Result {
        let mut conn = establish_connection(&self.0)?;

        let order = find_order(&mut conn, msg.0)?;
        with_items(&mut conn, order)
    }
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::ResponseError;

    use super::*;

    #[test]
    fn blocked_transitions_surface_as_invalid_state() {
        let already_sent = invalid_transition(OrderStatus::Sent);
        assert!(
            matches!(&already_sent, ApiError::InvalidState(msg) if msg == "order already sent to the kitchen")
        );

        let already_finished = invalid_transition(OrderStatus::Finished);
        assert!(
            matches!(&already_finished, ApiError::InvalidState(msg) if msg == "order already finished")
        );

        let never_sent = invalid_transition(OrderStatus::Draft);
        assert!(
            matches!(&never_sent, ApiError::InvalidState(msg) if msg == "order is still a draft and was never sent to the kitchen")
        );
    }

    #[test]
    fn a_missing_order_is_not_found_not_a_state_conflict() {
        let missing = order_not_found();
        assert!(matches!(&missing, ApiError::NotFound(msg) if msg == "order not found"));

        // The two failure modes stay distinguishable on the wire.
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            invalid_transition(OrderStatus::Sent).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn racing_duplicate_email_gets_the_pre_check_answer() {
        let unique = Error::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new("users_email_key".to_owned()),
        );
        assert!(
            matches!(duplicate_email(unique), ApiError::Validation(msg) if msg == "a user with this email already exists")
        );

        let other = duplicate_email(Error::BrokenTransactionManager);
        assert!(matches!(other, ApiError::Persistence(_)));
    }
}
