use std::env;

use actix::{Addr, SyncArbiter};
use actix_cors::Cors;
use actix_web::web::Data;
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use services::auth_handling::JwtService;
use services::db_utils::{get_db_pool, AppState, PgActor};
use services::upload_handling::ImageStore;

mod errors;
mod schema;
mod services;
mod types;

fn init_pg_db() -> Addr<PgActor> {
    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = get_db_pool(&db_url).expect("failed to build the postgres pool");

    SyncArbiter::start(5, move || PgActor(pool.clone()))
}

fn init_jwt() -> JwtService {
    let secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

    JwtService::from_secret(&secret)
}

fn init_image_store() -> ImageStore {
    let base_url = env::var("IMAGE_STORE_URL").expect("IMAGE_STORE_URL must be set");
    let folder = env::var("IMAGE_STORE_FOLDER").unwrap_or_else(|_| "products".to_owned());

    ImageStore::new(base_url, folder)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let pg_db = init_pg_db();
    let jwt = init_jwt();
    let images = init_image_store();

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_owned());
    tracing::info!(%bind_addr, "starting order-management backend");

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(Data::new(AppState {
                pg_db: pg_db.clone(),
                jwt: jwt.clone(),
                images: images.clone(),
            }))
            .service(services::home_page)
            .service(services::session_route::create_user)
            .service(services::session_route::create_session)
            .service(services::product_route::create_product)
            .service(
                web::scope("/category")
                    .service(services::category_route::create_category)
                    .service(services::category_route::list_categories),
            )
            .service(
                web::scope("/products")
                    .service(services::product_route::list_products)
                    .service(services::product_route::list_products_by_category),
            )
            .service(
                web::scope("/order")
                    .service(services::order_route::create_order)
                    .service(services::order_route::delete_order)
                    .service(services::order_route::add_item)
                    .service(services::order_route::remove_item)
                    .service(services::order_route::send_order)
                    .service(services::order_route::finish_order)
                    .service(services::order_route::list_orders)
                    .service(services::order_route::order_detail),
            )
    })
    .bind(bind_addr)?
    .run()
    .await
}
