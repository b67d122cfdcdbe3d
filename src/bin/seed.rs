use gift_marketplace_api::{
    config::AppConfig,
    db::{create_pool, run_migrations},
    services::auth_service::hash_password,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

struct SeedProduct {
    name: &'static str,
    description: &'static str,
    price_cents: i64,
    stock: i32,
    category: &'static str,
    image: &'static str,
}

const PRODUCTS: &[SeedProduct] = &[
    SeedProduct {
        name: "Dark Chocolate Truffles",
        description: "Twelve hand-rolled truffles in a gift box",
        price_cents: 2499,
        stock: 40,
        category: "CHOCOLATE",
        image: "https://images.giftiy.shop/truffles.jpg",
    },
    SeedProduct {
        name: "Red Rose Bouquet",
        description: "A dozen long-stem roses",
        price_cents: 4500,
        stock: 15,
        category: "FLOWERS",
        image: "https://images.giftiy.shop/roses.jpg",
    },
    SeedProduct {
        name: "Surprise Box",
        description: "Curated mystery gifts, different every time",
        price_cents: 3000,
        stock: 25,
        category: "MYSTERY_BOX",
        image: "https://images.giftiy.shop/mystery.jpg",
    },
    SeedProduct {
        name: "Engraved Photo Frame",
        description: "Wooden frame with your photo and message",
        price_cents: 3999,
        stock: 10,
        category: "CUSTOM_GIFT",
        image: "https://images.giftiy.shop/frame.jpg",
    },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    let seller_id = ensure_user(&pool, "seller@example.com", "seller123", "Tent Keeper").await?;
    let buyer_id = ensure_user(&pool, "buyer@example.com", "buyer123", "Gift Buyer").await?;
    let tent_id = ensure_tent(&pool, seller_id, "Sweet Surprises").await?;
    seed_products(&pool, tent_id).await?;

    println!("Seed completed. Seller ID: {seller_id}, Buyer ID: {buyer_id}, Tent ID: {tent_id}");
    Ok(())
}

async fn ensure_user(pool: &PgPool, email: &str, password: &str, name: &str) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, name, password_hash)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(name)
    .bind(password_hash)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email}");
    Ok(user_id)
}

async fn ensure_tent(pool: &PgPool, owner_id: Uuid, name: &str) -> anyhow::Result<Uuid> {
    let existing: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM tents WHERE owner_id = $1 AND name = $2")
            .bind(owner_id)
            .bind(name)
            .fetch_optional(pool)
            .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO tents (id, owner_id, name, description)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(owner_id)
    .bind(name)
    .bind("Chocolates, flowers and little surprises")
    .fetch_one(pool)
    .await?;

    println!("Created tent {name}");
    Ok(id)
}

async fn seed_products(pool: &PgPool, tent_id: Uuid) -> anyhow::Result<()> {
    for product in PRODUCTS {
        let existing: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM products WHERE tent_id = $1 AND name = $2")
                .bind(tent_id)
                .bind(product.name)
                .fetch_optional(pool)
                .await?;
        if existing.is_some() {
            continue;
        }

        let mut tx = pool.begin().await?;
        let product_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO products (id, tent_id, name, description, price, stock, category)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(product_id)
        .bind(tent_id)
        .bind(product.name)
        .bind(product.description)
        .bind(Decimal::new(product.price_cents, 2))
        .bind(product.stock)
        .bind(product.category)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO product_images (id, product_id, url) VALUES ($1, $2, $3)")
            .bind(Uuid::new_v4())
            .bind(product_id)
            .bind(product.image)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    println!("Seeded products");
    Ok(())
}
