//! Category browse pages with keyword filtering and pagination.

use crate::constants::LISTINGS_PER_PAGE;
use crate::db::get_db_pool;
use crate::middleware::ClientCtx;
use crate::orm::{listings, sub_categories, super_categories};
use crate::template::{clamp_page, Paginator, PaginatorToHtml};
use crate::web::listing::{hydrate_listings, ListingView};
use actix_web::{error, get, web, Error, Responder};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::{entity::*, query::*, sea_query::Expr, DatabaseConnection, DbErr};

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_category);
}

/// One page of a filtered category listing.
pub struct SearchResults {
    pub listings: Vec<listings::Model>,
    pub page: i32,
    pub page_count: i32,
    pub total: u64,
}

/// Case-insensitive keyword search over a sub-category's active listings.
///
/// The keyword matches against both title and description. Out-of-range
/// page numbers are clamped rather than rejected.
pub async fn search_listings(
    db: &DatabaseConnection,
    sub_category_id: i32,
    keyword: &str,
    page: i32,
) -> Result<SearchResults, DbErr> {
    let mut query = listings::Entity::find()
        .filter(listings::Column::SubCategoryId.eq(sub_category_id))
        .filter(listings::Column::IsActive.eq(true));

    let keyword = keyword.trim();
    if !keyword.is_empty() {
        let pattern = format!("%{}%", keyword);
        query = query.filter(Expr::cust_with_values(
            "(title ILIKE ? OR content ILIKE ?)",
            vec![pattern.clone(), pattern],
        ));
    }

    let paginator = query
        .order_by_desc(listings::Column::CreatedAt)
        .order_by_desc(listings::Column::Id)
        .paginate(db, LISTINGS_PER_PAGE);

    let total = paginator.num_items().await? as u64;
    let page_count = crate::template::page_count(total, LISTINGS_PER_PAGE as u64);
    let page = clamp_page(page, page_count);

    let listings = paginator.fetch_page((page - 1) as usize).await?;

    Ok(SearchResults {
        listings,
        page,
        page_count,
        total,
    })
}

#[derive(Template)]
#[template(path = "by_category.html")]
struct CategoryTemplate {
    client: ClientCtx,
    category_id: i32,
    category_name: String,
    super_category_name: String,
    keyword: String,
    listings: Vec<ListingView>,
    paginator: Paginator,
}

#[get("/categories/{id}")]
pub async fn view_category(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let category_id = path.into_inner();
    let db = get_db_pool();

    let category = sub_categories::Entity::find_by_id(category_id)
        .one(db)
        .await
        .map_err(|e| {
            log::error!("view_category: {}", e);
            error::ErrorInternalServerError("Couldn't load category")
        })?
        .ok_or_else(|| error::ErrorNotFound("No such category."))?;

    let super_category = super_categories::Entity::find_by_id(category.super_category_id)
        .one(db)
        .await
        .map_err(|e| {
            log::error!("view_category: {}", e);
            error::ErrorInternalServerError("Couldn't load category")
        })?
        .ok_or_else(|| error::ErrorNotFound("No such category."))?;

    let state = client.query_state().clone();

    let results = search_listings(db, category_id, &state.keyword, state.page)
        .await
        .map_err(|e| {
            log::error!("view_category: {}", e);
            error::ErrorInternalServerError("Couldn't load category")
        })?;

    let listings = hydrate_listings(db, results.listings).await.map_err(|e| {
        log::error!("view_category: {}", e);
        error::ErrorInternalServerError("Couldn't load category")
    })?;

    // Page links keep the current keyword.
    let base_url = if state.keyword.is_empty() {
        format!("/categories/{}?page=", category_id)
    } else {
        format!("/categories/{}{}&page=", category_id, state.keyword_suffix())
    };

    Ok(CategoryTemplate {
        client,
        category_id,
        category_name: category.name,
        super_category_name: super_category.name,
        keyword: state.keyword,
        listings,
        paginator: Paginator {
            base_url,
            this_page: results.page,
            page_count: results.page_count,
        },
    }
    .to_response())
}

