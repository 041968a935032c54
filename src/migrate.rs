use anyhow::Result;
use sqlx::SqlitePool;

/// Create the `products` and `orders` tables if they do not exist.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            specifications TEXT,
            price TEXT,
            activity TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Timestamps are stored as 'YYYY-MM-DD HH:MM:SS' text.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            order_id TEXT PRIMARY KEY,
            user_id TEXT,
            product_ids TEXT,
            status TEXT,
            total_amount REAL,
            create_time TEXT,
            pay_time TEXT,
            ship_time TEXT,
            receive_time TEXT,
            logistics_info TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_user_id ON orders(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}
