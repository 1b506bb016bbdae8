#![forbid(unsafe_code)]

//! Built-in sample data sources and their row generators.
//!
//! Rows are generated on demand from their index, so a 100 000-row source
//! costs nothing until a page is read. Values that look random are derived
//! from a per-column hash of the index: the same index always yields the same
//! row, across pages, runs and machines.

use std::time::Duration;

use qgrid_core::{ColumnMetadata, ColumnType, Row};
use serde_json::{Value, json};

/// Seconds since the Unix epoch for 2023-12-26T08:00:00Z.
const BASE_EPOCH: u64 = 1_703_577_600;

/// One of the mock backend's tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleSource {
    Users,
    Analytics,
    Products,
    Transactions,
}

impl SampleSource {
    pub const ALL: [Self; 4] = [Self::Users, Self::Analytics, Self::Products, Self::Transactions];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Analytics => "analytics",
            Self::Products => "products",
            Self::Transactions => "transactions",
        }
    }

    /// Query that routes to this source.
    #[must_use]
    pub const fn sample_sql(self) -> &'static str {
        match self {
            Self::Users => "SELECT * FROM users;",
            Self::Analytics => "SELECT * FROM analytics WHERE date > '2024-01-01';",
            Self::Products => "SELECT * FROM products;",
            Self::Transactions => "SELECT * FROM transactions;",
        }
    }

    /// Short human title.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Users => "Get all users",
            Self::Analytics => "Analytics report (slow)",
            Self::Products => "Product catalog (wide table)",
            Self::Transactions => "Transaction history (large dataset)",
        }
    }

    #[must_use]
    pub const fn total_rows(self) -> usize {
        match self {
            Self::Users => 1_000,
            Self::Analytics => 0,
            Self::Products => 25_000,
            Self::Transactions => 100_000,
        }
    }

    /// Time spent in `running` before the execution settles.
    #[must_use]
    pub const fn execution_time(self) -> Duration {
        match self {
            Self::Users => Duration::from_millis(2_000),
            Self::Analytics => Duration::from_millis(15_000),
            Self::Products => Duration::from_millis(3_500),
            Self::Transactions => Duration::from_millis(4_000),
        }
    }

    /// Typical page fetch latency for this source.
    #[must_use]
    pub const fn fetch_delay(self) -> Duration {
        match self {
            Self::Users => Duration::from_millis(200),
            Self::Analytics => Duration::ZERO,
            Self::Products => Duration::from_millis(250),
            Self::Transactions => Duration::from_millis(180),
        }
    }

    /// Whether executions against this source end in a timeout failure.
    #[must_use]
    pub const fn times_out(self) -> bool {
        self.execution_time().as_millis() >= 15_000
    }

    /// Pick the source a query reads from by its `from <table>` clause.
    ///
    /// Unrecognized SQL reads from `users`.
    #[must_use]
    pub fn route(sql: &str) -> Self {
        let lower = sql.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|source| lower.contains(&format!("from {}", source.name())))
            .unwrap_or(Self::Users)
    }

    /// Look a source up by name, case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|source| source.name().eq_ignore_ascii_case(name.trim()))
    }

    #[must_use]
    pub fn columns(self) -> Vec<ColumnMetadata> {
        use ColumnType::{Array, Epoch, Json, Number, String};
        let layout: &[(&str, ColumnType)] = match self {
            Self::Users => &[
                ("id", Number),
                ("name", String),
                ("email", String),
                ("metadata", Json),
                ("created_at", Epoch),
            ],
            Self::Analytics => &[],
            Self::Products => &[
                ("id", Number),
                ("sku", String),
                ("name", String),
                ("category", String),
                ("price", Number),
                ("stock", Number),
                ("weight_kg", Number),
                ("dimensions", String),
                ("manufacturer", String),
                ("warranty_months", Number),
                ("tags", Array),
                ("specifications", Json),
                ("rating", Number),
                ("reviews_count", Number),
                ("created_at", Epoch),
            ],
            Self::Transactions => &[
                ("id", Number),
                ("user_id", Number),
                ("amount", Number),
                ("currency", String),
                ("status", String),
                ("payment_method", String),
                ("created_at", Epoch),
            ],
        };
        layout.iter()
            .map(|(name, column_type)| ColumnMetadata::new(*name, *column_type))
            .collect()
    }

    /// Rows `offset .. offset + limit`, cut short at the end of the source.
    #[must_use]
    pub fn page(self, offset: usize, limit: usize) -> Vec<Row> {
        let end = self.total_rows().min(offset.saturating_add(limit));
        (offset..end).map(|index| self.row(index)).collect()
    }

    /// The row at `index`. Indices past the end still generate a row.
    #[must_use]
    pub fn row(self, index: usize) -> Row {
        match self {
            Self::Users => user_row(index),
            Self::Analytics => Row::null(),
            Self::Products => product_row(index),
            Self::Transactions => transaction_row(index),
        }
    }
}

impl std::fmt::Display for SampleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn pick<T: Copy>(choices: &[T], index: usize) -> T {
    choices[index % choices.len()]
}

/// SplitMix64 finalizer over `(index, salt)`.
fn mix(index: usize, salt: u64) -> u64 {
    let mut z = (index as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(salt.wrapping_mul(0xD1B5_4A32_D192_ED03));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Uniform value in `[0, 1)`.
fn unit(index: usize, salt: u64) -> f64 {
    (mix(index, salt) >> 11) as f64 / (1_u64 << 53) as f64
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10_f64.powi(places);
    (value * scale).round() / scale
}

fn epoch(index: usize, step_secs: u64) -> Value {
    json!(BASE_EPOCH + index as u64 * step_secs)
}

fn user_row(index: usize) -> Row {
    let n = index + 1;
    let role = if index % 2 == 0 { "admin" } else { "user" };
    Row::from(json!({
        "id": n,
        "name": format!("User {n}"),
        "email": format!("user{n}@demo.com"),
        "metadata": {
            "role": role,
            "active": index % 3 != 0,
            "department": pick(&["Engineering", "Sales", "Marketing", "Support"], index),
        },
        "created_at": epoch(index, 86_400),
    }))
}

fn product_row(index: usize) -> Row {
    let n = index + 1;
    let side = |salt| 10 + (unit(index, salt) * 50.0) as u64;
    let tags: &[&str] = pick(
        &[
            &["new", "featured"][..],
            &["sale", "clearance"][..],
            &["bestseller"][..],
            &["premium", "limited"][..],
        ],
        index,
    );
    Row::from(json!({
        "id": n,
        "sku": format!("SKU-{n:06}"),
        "name": format!("Product {n}"),
        "category": pick(&["Electronics", "Clothing", "Home", "Sports"], index),
        "price": round_to(unit(index, 1) * 1000.0 + 10.0, 2),
        "stock": (unit(index, 2) * 1000.0) as u64,
        "weight_kg": round_to(unit(index, 3) * 50.0 + 0.1, 2),
        "dimensions": format!("{}x{}x{}", side(4), side(5), side(6)),
        "manufacturer": format!("Manufacturer {}", index % 10 + 1),
        "warranty_months": pick(&[12, 24, 36, 48], index),
        "tags": tags,
        "specifications": {
            "color": pick(&["Red", "Blue", "Green", "Black"], index),
            "material": pick(&["Plastic", "Metal", "Wood", "Fabric"], index),
            "origin": pick(&["USA", "China", "Germany", "Japan"], index),
        },
        "rating": round_to(unit(index, 7) * 2.0 + 3.0, 1),
        "reviews_count": (unit(index, 8) * 500.0) as u64,
        "created_at": epoch(index, 3_600),
    }))
}

fn transaction_row(index: usize) -> Row {
    Row::from(json!({
        "id": index + 1,
        "user_id": (unit(index, 11) * 10_000.0) as u64 + 1,
        "amount": round_to(unit(index, 12) * 5000.0 + 10.0, 2),
        "currency": pick(&["USD", "EUR", "GBP", "JPY"], index),
        "status": pick(&["completed", "pending", "failed"], index),
        "payment_method": pick(&["credit_card", "paypal", "bank_transfer"], index),
        "created_at": epoch(index, 60),
    }))
}
