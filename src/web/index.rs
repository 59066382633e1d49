use crate::constants::FRONT_PAGE_LISTINGS;
use crate::db::get_db_pool;
use crate::middleware::ClientCtx;
use crate::orm::listings;
use crate::web::listing::{hydrate_listings, ListingView};
use actix_web::{error, get, Error, Responder};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::{entity::*, query::*};

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_index);
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    client: ClientCtx,
    listings: Vec<ListingView>,
}

#[get("/")]
pub async fn view_index(client: ClientCtx) -> Result<impl Responder, Error> {
    let db = get_db_pool();

    let models = listings::Entity::find()
        .filter(listings::Column::IsActive.eq(true))
        .order_by_desc(listings::Column::CreatedAt)
        .order_by_desc(listings::Column::Id)
        .limit(FRONT_PAGE_LISTINGS)
        .all(db)
        .await
        .map_err(|e| {
            log::error!("view_index: {}", e);
            error::ErrorInternalServerError("Couldn't load listings")
        })?;

    let listings = hydrate_listings(db, models).await.map_err(|e| {
        log::error!("view_index: {}", e);
        error::ErrorInternalServerError("Couldn't load listings")
    })?;

    Ok(IndexTemplate { client, listings }.to_response())
}
