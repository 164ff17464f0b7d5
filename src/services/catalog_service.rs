use sea_orm::{
    ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    sea_query::{Expr, Func, LikeExpr, Query},
};
use uuid::Uuid;

use crate::{
    dto::products::{ProductDetail, ProductList, ReviewSummary},
    entity::{
        ProductImages, Products, Reviews, Variants,
        product_images::Column as ImageCol,
        products::{Column as ProdCol, Model as ProductModel},
        reviews::Column as ReviewCol,
        variants::Column as VariantCol,
    },
    error::{AppError, AppResult},
    models::{Product, ProductImage, Variant},
    response::{ApiResponse, Meta},
    routes::params::{Pagination, ProductQuery, ProductSort},
    sanitize::markdown_to_safe_html,
    services::analytics_service::{self, ViewContext},
    state::AppState,
};

fn variant_filter(column: VariantCol, value: &str) -> sea_orm::sea_query::SelectStatement {
    Query::select()
        .column(VariantCol::ProductId)
        .from(Variants)
        .and_where(Expr::col(column).eq(value))
        .to_owned()
}

const LIKE_ESCAPE: char = '\\';

/// Lowercased substring pattern with `%`, `_` and the escape character
/// matched literally.
fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub fn listing_condition(query: &ProductQuery) -> Condition {
    let mut condition = Condition::all().add(ProdCol::Active.eq(true));

    if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = contains_pattern(q);
        let like = || LikeExpr::new(pattern.clone()).escape(LIKE_ESCAPE);
        condition = condition.add(
            Condition::any()
                .add(Expr::expr(Func::lower(Expr::col(ProdCol::Name))).like(like()))
                .add(Expr::expr(Func::lower(Expr::col(ProdCol::Brand))).like(like()))
                .add(Expr::expr(Func::lower(Expr::col(ProdCol::Sku))).like(like())),
        );
    }
    if let Some(brand) = query.brand.as_deref().filter(|b| !b.is_empty()) {
        condition = condition.add(ProdCol::Brand.eq(brand));
    }
    if let Some(category) = query.category.as_deref().filter(|c| !c.is_empty()) {
        condition = condition.add(ProdCol::Category.eq(category));
    }
    if let Some(size) = query.size.as_deref().filter(|s| !s.is_empty()) {
        condition = condition.add(ProdCol::Id.in_subquery(variant_filter(VariantCol::Size, size)));
    }
    if let Some(colour) = query.colour.as_deref().filter(|c| !c.is_empty()) {
        condition =
            condition.add(ProdCol::Id.in_subquery(variant_filter(VariantCol::Colour, colour)));
    }
    if let Some(min) = query.min_price {
        condition = condition.add(ProdCol::PriceCents.gte(min));
    }
    if let Some(max) = query.max_price {
        condition = condition.add(ProdCol::PriceCents.lte(max));
    }
    condition
}

pub async fn list_products(
    state: &AppState,
    pagination: Pagination,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = pagination.normalize();

    let mut finder = Products::find().filter(listing_condition(&query));
    finder = match query.sort.unwrap_or_default() {
        ProductSort::Newest => finder.order_by_desc(ProdCol::CreatedAt),
        ProductSort::PriceAsc => finder.order_by_asc(ProdCol::PriceCents),
        ProductSort::PriceDesc => finder.order_by_desc(ProdCol::PriceCents),
    };
    finder = finder.order_by_asc(ProdCol::Id);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    Ok(ApiResponse::success(
        "Products",
        ProductList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn review_summary(state: &AppState, product_id: Uuid) -> AppResult<ReviewSummary> {
    let ratings: Vec<i16> = Reviews::find()
        .select_only()
        .column(ReviewCol::Rating)
        .filter(ReviewCol::ProductId.eq(product_id))
        .into_tuple()
        .all(&state.orm)
        .await?;
    Ok(summarise(&ratings))
}

pub fn summarise(ratings: &[i16]) -> ReviewSummary {
    let count = ratings.len() as u64;
    let average_rating = (count > 0).then(|| {
        let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
        ((sum as f64 / count as f64) * 100.0).round() / 100.0
    });
    ReviewSummary {
        count,
        average_rating,
    }
}

async fn detail(state: &AppState, product: ProductModel) -> AppResult<ProductDetail> {
    let variants = Variants::find()
        .filter(VariantCol::ProductId.eq(product.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Variant::from)
        .collect();

    let images = ProductImages::find()
        .filter(ImageCol::ProductId.eq(product.id))
        .order_by_asc(ImageCol::SortIndex)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(ProductImage::from)
        .collect();

    let reviews = review_summary(state, product.id).await?;

    Ok(ProductDetail {
        description_html: markdown_to_safe_html(&product.description_md),
        product: Product::from(product),
        variants,
        images,
        reviews,
    })
}

pub async fn get_product(
    state: &AppState,
    ctx: ViewContext,
    id: Uuid,
) -> AppResult<ApiResponse<ProductDetail>> {
    let product = Products::find_by_id(id)
        .filter(ProdCol::Active.eq(true))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    analytics_service::record_view(state, &ctx, &format!("/products/{id}"), Some(id)).await;
    let data = detail(state, product).await?;
    Ok(ApiResponse::success("Product", data, None))
}

pub async fn get_product_by_slug(
    state: &AppState,
    ctx: ViewContext,
    slug: &str,
) -> AppResult<ApiResponse<ProductDetail>> {
    let product = Products::find()
        .filter(ProdCol::SeoSlug.eq(slug))
        .filter(ProdCol::Active.eq(true))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    analytics_service::record_view(
        state,
        &ctx,
        &format!("/products/slug/{slug}"),
        Some(product.id),
    )
    .await;
    let data = detail(state, product).await?;
    Ok(ApiResponse::success("Product", data, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, QueryTrait};

    #[test]
    fn summary_rounds_average_to_two_places() {
        let s = summarise(&[5, 4, 4]);
        assert_eq!(s.count, 3);
        assert_eq!(s.average_rating, Some(4.33));
        assert_eq!(summarise(&[]).average_rating, None);
    }

    #[test]
    fn listing_only_shows_active_products() {
        let sql = Products::find()
            .filter(listing_condition(&ProductQuery::default()))
            .build(DbBackend::Postgres)
            .to_string();
        assert!(sql.contains(r#""products"."active" = TRUE"#), "{sql}");
    }

    #[test]
    fn size_filter_uses_variant_subquery() {
        let query = ProductQuery {
            size: Some("M".into()),
            q: Some("Tee".into()),
            ..Default::default()
        };
        let sql = Products::find()
            .filter(listing_condition(&query))
            .build(DbBackend::Postgres)
            .to_string();
        assert!(sql.contains(r#"IN (SELECT "product_id" FROM "variants""#), "{sql}");
        assert!(sql.contains("'%tee%'"), "{sql}");
    }

    #[test]
    fn search_terms_escape_like_wildcards() {
        assert_eq!(contains_pattern("Tee"), "%tee%");
        assert_eq!(contains_pattern("50%_OFF"), r"%50\%\_off%");
        assert_eq!(contains_pattern(r"a\b"), r"%a\\b%");
    }

    #[test]
    fn search_wildcards_match_literally() {
        let query = ProductQuery {
            q: Some("50%_OFF".into()),
            ..Default::default()
        };
        let sql = Products::find()
            .filter(listing_condition(&query))
            .build(DbBackend::Postgres)
            .to_string();
        assert!(sql.contains("ESCAPE"), "{sql}");
        assert!(!sql.contains("'%50%_off%'"), "{sql}");
    }
}
