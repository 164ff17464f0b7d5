use marketplace_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    services::{auth_service::hash_password, seller_service::slugify},
};
use uuid::Uuid;

struct SeedProduct {
    sku: &'static str,
    name: &'static str,
    brand: &'static str,
    category: &'static str,
    description_md: &'static str,
    price_cents: i64,
    sizes: &'static [&'static str],
    colour: &'static str,
}

const PRODUCTS: &[SeedProduct] = &[
    SeedProduct {
        sku: "TEE-FERRIS-001",
        name: "Ferris Tee",
        brand: "Crab Co",
        category: "tops",
        description_md: "Heavyweight cotton tee with a **Ferris** print.",
        price_cents: 2500,
        sizes: &["S", "M", "L", "XL"],
        colour: "orange",
    },
    SeedProduct {
        sku: "HOOD-ASYNC-001",
        name: "Async Hoodie",
        brand: "Crab Co",
        category: "tops",
        description_md: "Warm hoodie for long compile times.",
        price_cents: 5500,
        sizes: &["M", "L"],
        colour: "black",
    },
    SeedProduct {
        sku: "CAP-BORROW-001",
        name: "Borrow Cap",
        brand: "Lifetime",
        category: "accessories",
        description_md: "One size fits all, *mutably*.",
        price_cents: 1800,
        sizes: &[],
        colour: "navy",
    },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;
    let pool = orm.get_postgres_connection_pool();

    let admin_id = ensure_user(pool, "admin@example.com", "admin12345", "admin").await?;
    let seller_id = ensure_user(pool, "seller@example.com", "seller12345", "seller").await?;
    let customer_id = ensure_user(pool, "customer@example.com", "customer12345", "customer").await?;
    seed_products(pool, seller_id, &config.default_currency).await?;

    println!(
        "Seed completed. Admin ID: {admin_id}, Seller ID: {seller_id}, Customer ID: {customer_id}"
    );
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let display_name = email.split('@').next().unwrap_or(email);

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, display_name, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(display_name)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn seed_products(pool: &sqlx::PgPool, owner_id: Uuid, currency: &str) -> anyhow::Result<()> {
    for product in PRODUCTS {
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO products
                (id, owner_id, sku, name, brand, category, description_md, price_cents, currency, seo_slug)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(product.sku)
        .bind(product.name)
        .bind(product.brand)
        .bind(product.category)
        .bind(product.description_md)
        .bind(product.price_cents)
        .bind(currency)
        .bind(slugify(product.name))
        .fetch_optional(pool)
        .await?;

        let Some((product_id,)) = inserted else {
            continue;
        };

        for size in product.sizes {
            sqlx::query(
                "INSERT INTO variants (id, product_id, size, colour, stock) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(product_id)
            .bind(*size)
            .bind(product.colour)
            .bind(25_i32)
            .execute(pool)
            .await?;
        }
    }

    println!("Seeded products");
    Ok(())
}
