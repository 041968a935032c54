//! Sample catalog and order data.
//!
//! `shopdesk seed` loads 15 apparel products and 10 orders covering every
//! order status, enough to exercise all three capability tools. Rows are
//! inserted with `INSERT OR IGNORE`, so re-seeding never overwrites edits.

use anyhow::Result;
use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use tracing::info;

use shopdesk_core::models::{format_timestamp, Order, Product};

/// Number of rows actually inserted by a seed run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedStats {
    pub products: u64,
    pub orders: u64,
}

fn product(
    id: &str,
    name: &str,
    description: &str,
    specifications: &str,
    price: &str,
    activity: &str,
) -> Product {
    Product {
        id: id.to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        specifications: Some(specifications.to_string()),
        price: Some(price.to_string()),
        activity: Some(activity.to_string()),
    }
}

fn ts(s: Option<&str>) -> Option<NaiveDateTime> {
    s.and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok())
}

#[allow(clippy::too_many_arguments)]
fn order(
    order_id: &str,
    user_id: &str,
    product_ids: &str,
    status: &str,
    total_amount: f64,
    times: [Option<&str>; 4],
    logistics_info: Option<&str>,
) -> Order {
    let [create, pay, ship, receive] = times;
    Order {
        order_id: order_id.to_string(),
        user_id: Some(user_id.to_string()),
        product_ids: Some(product_ids.to_string()),
        status: Some(status.to_string()),
        total_amount: Some(total_amount),
        create_time: ts(create),
        pay_time: ts(pay),
        ship_time: ts(ship),
        receive_time: ts(receive),
        logistics_info: logistics_info.map(str::to_string),
    }
}

/// The sample product catalog.
pub fn sample_products() -> Vec<Product> {
    vec![
        product("001", "纯棉T恤", "100%纯棉材质，透气舒适，适合夏季穿着", "S/M/L/XL", "99元", "满200减30，可叠加使用"),
        product("002", "牛仔裤", "修身版型，弹力面料，经典款式", "28/29/30/31/32（腰围）", "159元", "第二件半价"),
        product("003", "运动鞋", "轻便透气，缓震鞋底，适合跑步健身", "39/40/41/42/43/44", "299元", "会员专享8折"),
        product("004", "连衣裙", "雪纺材质，碎花图案，优雅大方", "S/M/L", "179元", "满300减50"),
        product("005", "夹克外套", "防风防水面料，春秋季适用", "M/L/XL/XXL", "259元", "新品上市，暂无活动"),
        product("006", "羊毛衫", "含羊毛成分，保暖舒适", "S/M/L/XL", "199元", "满2件减100"),
        product("007", "休闲裤", "棉质混纺，宽松版型，日常穿着舒适", "M/L/XL", "129元", "满150减20"),
        product("008", "卫衣", "加绒加厚，连帽设计，时尚休闲", "S/M/L/XL", "149元", "限时折扣，直降30元"),
        product("009", "衬衫", "免烫处理，商务休闲两用", "38/39/40/41/42", "169元", "满300减60"),
        product("010", "羽绒服", "90%白鸭绒填充，轻便保暖", "M/L/XL/XXL", "499元", "预售优惠，定金50抵100"),
        product("011", "帆布鞋", "经典款式，舒适百搭，适合日常穿着", "35/36/37/38/39/40", "79元", "买一送一"),
        product("012", "背包", "大容量设计，防水面料，适合通勤旅行", "均码（黑色/灰色/蓝色）", "199元", "满200减40"),
        product("013", "帽子", "棉质材质，防晒透气，时尚简约", "均码（可调节）", "59元", "3件起9折"),
        product("014", "围巾", "羊毛混纺，柔软保暖，多种颜色可选", "均码（红色/蓝色/灰色/黑色）", "89元", "满100减20"),
        product("015", "手套", "加绒加厚，触屏设计，冬季必备", "M/L（黑色/棕色）", "69元", "买二送一"),
    ]
}

/// Sample orders covering 待付款, 已付款, 已发货, 已签收 and 已取消.
pub fn sample_orders() -> Vec<Order> {
    vec![
        order("12345", "user001", "001,003", "已签收", 398.0,
            [Some("2023-10-01 09:30:00"), Some("2023-10-01 10:15:00"), Some("2023-10-02 14:20:00"), Some("2023-10-04 16:45:00")],
            Some("圆通快递: YT1234567890")),
        order("12346", "user002", "002", "已发货", 159.0,
            [Some("2023-10-02 11:20:00"), Some("2023-10-02 11:30:00"), Some("2023-10-03 08:10:00"), None],
            Some("中通快递: ZT0987654321")),
        order("12347", "user003", "004,006", "已付款", 378.0,
            [Some("2023-10-02 15:40:00"), Some("2023-10-02 16:05:00"), None, None],
            None),
        order("12348", "user004", "005", "待付款", 259.0,
            [Some("2023-10-03 09:10:00"), None, None, None],
            None),
        order("12349", "user005", "007,008,009", "已签收", 447.0,
            [Some("2023-10-03 14:30:00"), Some("2023-10-03 15:00:00"), Some("2023-10-04 09:20:00"), Some("2023-10-06 11:30:00")],
            Some("顺丰速运: SF1122334455")),
        order("12350", "user006", "010", "已取消", 499.0,
            [Some("2023-10-04 10:20:00"), None, None, None],
            None),
        order("12351", "user007", "001,008", "已发货", 248.0,
            [Some("2023-10-04 16:50:00"), Some("2023-10-04 17:10:00"), Some("2023-10-05 10:30:00"), None],
            Some("韵达快递: YD5566778899")),
        order("12352", "user008", "003,005", "已付款", 558.0,
            [Some("2023-10-05 08:40:00"), Some("2023-10-05 09:05:00"), None, None],
            None),
        order("12353", "user009", "006,007", "已签收", 328.0,
            [Some("2023-10-05 13:20:00"), Some("2023-10-05 14:00:00"), Some("2023-10-06 09:15:00"), Some("2023-10-08 15:20:00")],
            Some("圆通快递: YT9876543210")),
        order("12354", "user010", "002,009", "待付款", 328.0,
            [Some("2023-10-06 11:10:00"), None, None, None],
            None),
    ]
}

/// Insert products, skipping ids that already exist. Returns rows inserted.
pub async fn insert_products(pool: &SqlitePool, products: &[Product]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;
    for p in products {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO products (id, name, description, specifications, price, activity) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&p.id)
        .bind(&p.name)
        .bind(&p.description)
        .bind(&p.specifications)
        .bind(&p.price)
        .bind(&p.activity)
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected();
    }
    tx.commit().await?;
    Ok(inserted)
}

/// Insert orders, skipping ids that already exist. Returns rows inserted.
pub async fn insert_orders(pool: &SqlitePool, orders: &[Order]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;
    for o in orders {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO orders (order_id, user_id, product_ids, status, total_amount, \
             create_time, pay_time, ship_time, receive_time, logistics_info) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&o.order_id)
        .bind(&o.user_id)
        .bind(&o.product_ids)
        .bind(&o.status)
        .bind(o.total_amount)
        .bind(o.create_time.as_ref().map(format_timestamp))
        .bind(o.pay_time.as_ref().map(format_timestamp))
        .bind(o.ship_time.as_ref().map(format_timestamp))
        .bind(o.receive_time.as_ref().map(format_timestamp))
        .bind(&o.logistics_info)
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected();
    }
    tx.commit().await?;
    Ok(inserted)
}

/// Load the sample catalog and orders.
pub async fn run_seed(pool: &SqlitePool) -> Result<SeedStats> {
    let stats = SeedStats {
        products: insert_products(pool, &sample_products()).await?,
        orders: insert_orders(pool, &sample_orders()).await?,
    };
    info!(
        products = stats.products,
        orders = stats.orders,
        "seed data inserted"
    );
    Ok(stats)
}
