mod seed;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use occacia_core::{ChatTurn, MatchCriteria, Package, PriceRange, Vendor};
use parking_lot::RwLock;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

pub use seed::{demo_catalog, seed_demo_catalog};

pub trait CatalogRepository: Send + Sync {
    /// Packages satisfying `criteria`, in catalog order, at most `limit`.
    async fn find_packages(&self, criteria: &MatchCriteria, limit: usize) -> Result<Vec<Package>>;
    async fn list_packages(&self, limit: usize) -> Result<Vec<Package>>;
    async fn insert_vendor(&self, vendor: Vendor) -> Result<i64>;
    async fn insert_package(&self, package: Package) -> Result<i64>;
    async fn count_vendors(&self) -> Result<u64>;
}

pub trait ChatHistoryRepository: Send + Sync {
    async fn save_turn(&self, turn: &ChatTurn) -> Result<()>;
    /// The latest `limit` turns of a session, oldest first.
    async fn recent_turns(&self, session_id: &str, limit: usize) -> Result<Vec<ChatTurn>>;
}

#[derive(Default)]
struct MemoryCatalog {
    vendors: Vec<Vendor>,
    packages: Vec<Package>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    catalog: Arc<RwLock<MemoryCatalog>>,
    turns: Arc<RwLock<HashMap<String, Vec<ChatTurn>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CatalogRepository for MemoryStore {
    async fn find_packages(&self, criteria: &MatchCriteria, limit: usize) -> Result<Vec<Package>> {
        Ok(self
            .catalog
            .read()
            .packages
            .iter()
            .filter(|package| package.matches(criteria))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_packages(&self, limit: usize) -> Result<Vec<Package>> {
        Ok(self.catalog.read().packages.iter().take(limit).cloned().collect())
    }

    async fn insert_vendor(&self, mut vendor: Vendor) -> Result<i64> {
        let mut catalog = self.catalog.write();
        if catalog.vendors.iter().any(|existing| existing.email == vendor.email) {
            anyhow::bail!("vendor email already registered: {}", vendor.email);
        }
        vendor.id = catalog.vendors.len() as i64 + 1;
        let id = vendor.id;
        catalog.vendors.push(vendor);
        Ok(id)
    }

    async fn insert_package(&self, mut package: Package) -> Result<i64> {
        let mut catalog = self.catalog.write();
        if !catalog.vendors.iter().any(|vendor| vendor.id == package.vendor_id) {
            anyhow::bail!("unknown vendor id {}", package.vendor_id);
        }
        package.id = catalog.packages.len() as i64 + 1;
        let id = package.id;
        catalog.packages.push(package);
        Ok(id)
    }

    async fn count_vendors(&self) -> Result<u64> {
        Ok(self.catalog.read().vendors.len() as u64)
    }
}

impl ChatHistoryRepository for MemoryStore {
    async fn save_turn(&self, turn: &ChatTurn) -> Result<()> {
        self.turns
            .write()
            .entry(turn.session_id.clone())
            .or_default()
            .push(turn.clone());
        Ok(())
    }

    async fn recent_turns(&self, session_id: &str, limit: usize) -> Result<Vec<ChatTurn>> {
        let guard = self.turns.read();
        let Some(turns) = guard.get(session_id) else {
            return Ok(Vec::new());
        };

        let mut newest_first = turns.iter().rev().cloned().collect::<Vec<_>>();
        newest_first.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        newest_first.truncate(limit);
        newest_first.reverse();
        Ok(newest_first)
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        // Every connection to `:memory:` opens a separate database, so pin the pool to one.
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options
            .connect(database_url)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vendors (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              business_name TEXT NOT NULL,
              location_base TEXT NOT NULL,
              email TEXT NOT NULL UNIQUE,
              phone TEXT,
              is_verified INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS packages (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              vendor_id INTEGER NOT NULL REFERENCES vendors(id),
              name TEXT NOT NULL,
              description TEXT,
              price REAL NOT NULL,
              price_per_head REAL,
              min_guests INTEGER NOT NULL,
              max_guests INTEGER NOT NULL,
              tags_json TEXT NOT NULL,
              location_coverage TEXT,
              location_key TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_history (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              session_id TEXT NOT NULL,
              user_message TEXT NOT NULL,
              ai_message TEXT,
              created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_history_session ON chat_history (session_id, created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

const PACKAGE_COLUMNS: &str = "SELECT id, vendor_id, name, description, price, price_per_head, \
     min_guests, max_guests, tags_json, location_coverage FROM packages";

fn package_from_row(row: &SqliteRow) -> Package {
    let tags_json: String = row.get("tags_json");
    Package {
        id: row.get("id"),
        vendor_id: row.get("vendor_id"),
        name: row.get("name"),
        description: row.get("description"),
        price: row.get("price"),
        price_per_head: row.get("price_per_head"),
        min_guests: u32::try_from(row.get::<i64, _>("min_guests")).unwrap_or(0),
        max_guests: u32::try_from(row.get::<i64, _>("max_guests")).unwrap_or(0),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        location_coverage: row.get("location_coverage"),
    }
}

fn build_match_query(criteria: &MatchCriteria, limit: usize) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::<Sqlite>::new(PACKAGE_COLUMNS);
    builder.push(" WHERE 1 = 1");

    // SQLite's lower() folds ASCII only; location_key holds the Unicode-folded coverage.
    if let Some(location) = criteria.location.as_ref() {
        builder
            .push(" AND instr(coalesce(location_key, ''), ")
            .push_bind(location.to_lowercase())
            .push(") > 0");
    }

    match criteria.price {
        Some(PriceRange::Below(limit)) => {
            builder.push(" AND price < ").push_bind(limit);
        }
        Some(PriceRange::Between(low, high)) => {
            builder
                .push(" AND price >= ")
                .push_bind(low)
                .push(" AND price <= ")
                .push_bind(high);
        }
        Some(PriceRange::Above(limit)) => {
            builder.push(" AND price > ").push_bind(limit);
        }
        None => {}
    }

    if !criteria.tags.is_empty() {
        builder.push(
            " AND EXISTS (SELECT 1 FROM json_each(packages.tags_json) WHERE json_each.value IN (",
        );
        let mut tags = builder.separated(", ");
        for tag in &criteria.tags {
            tags.push_bind(tag.clone());
        }
        builder.push("))");
    }

    builder.push(" ORDER BY id LIMIT ").push_bind(limit as i64);
    builder
}

impl CatalogRepository for SqliteStore {
    async fn find_packages(&self, criteria: &MatchCriteria, limit: usize) -> Result<Vec<Package>> {
        let rows = build_match_query(criteria, limit)
            .build()
            .fetch_all(&self.pool)
            .await
            .context("package match query failed")?;

        Ok(rows.iter().map(package_from_row).collect())
    }

    async fn list_packages(&self, limit: usize) -> Result<Vec<Package>> {
        let rows = sqlx::query(&format!("{PACKAGE_COLUMNS} ORDER BY id LIMIT ?1"))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(package_from_row).collect())
    }

    async fn insert_vendor(&self, vendor: Vendor) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO vendors (business_name, location_base, email, phone, is_verified)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&vendor.business_name)
        .bind(&vendor.location_base)
        .bind(&vendor.email)
        .bind(&vendor.phone)
        .bind(vendor.is_verified)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed inserting vendor {}", vendor.email))?;

        Ok(result.last_insert_rowid())
    }

    async fn insert_package(&self, package: Package) -> Result<i64> {
        let tags_json = serde_json::to_string(&package.tags)?;

        let result = sqlx::query(
            r#"
            INSERT INTO packages (
              vendor_id, name, description, price, price_per_head,
              min_guests, max_guests, tags_json, location_coverage, location_key
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(package.vendor_id)
        .bind(&package.name)
        .bind(&package.description)
        .bind(package.price)
        .bind(package.price_per_head)
        .bind(i64::from(package.min_guests))
        .bind(i64::from(package.max_guests))
        .bind(tags_json)
        .bind(&package.location_coverage)
        .bind(package.location_coverage.as_deref().map(str::to_lowercase))
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed inserting package {}", package.name))?;

        Ok(result.last_insert_rowid())
    }

    async fn count_vendors(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vendors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

impl ChatHistoryRepository for SqliteStore {
    async fn save_turn(&self, turn: &ChatTurn) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_history (session_id, user_message, ai_message, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&turn.session_id)
        .bind(&turn.user_message)
        .bind(&turn.ai_message)
        .bind(turn.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_turns(&self, session_id: &str, limit: usize) -> Result<Vec<ChatTurn>> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, user_message, ai_message, created_at
            FROM chat_history
            WHERE session_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            "#,
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut turns = rows
            .into_iter()
            .map(|row| ChatTurn {
                session_id: row.get("session_id"),
                user_message: row.get("user_message"),
                ai_message: row.get("ai_message"),
                created_at: row
                    .get::<String, _>("created_at")
                    .parse()
                    .unwrap_or_else(|_| Utc::now()),
            })
            .collect::<Vec<_>>();
        turns.reverse();

        Ok(turns)
    }
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Sqlite(_) => "sqlite",
        }
    }
}

impl CatalogRepository for Store {
    async fn find_packages(&self, criteria: &MatchCriteria, limit: usize) -> Result<Vec<Package>> {
        match self {
            Store::Memory(store) => store.find_packages(criteria, limit).await,
            Store::Sqlite(store) => store.find_packages(criteria, limit).await,
        }
    }

    async fn list_packages(&self, limit: usize) -> Result<Vec<Package>> {
        match self {
            Store::Memory(store) => store.list_packages(limit).await,
            Store::Sqlite(store) => store.list_packages(limit).await,
        }
    }

    async fn insert_vendor(&self, vendor: Vendor) -> Result<i64> {
        match self {
            Store::Memory(store) => store.insert_vendor(vendor).await,
            Store::Sqlite(store) => store.insert_vendor(vendor).await,
        }
    }

    async fn insert_package(&self, package: Package) -> Result<i64> {
        match self {
            Store::Memory(store) => store.insert_package(package).await,
            Store::Sqlite(store) => store.insert_package(package).await,
        }
    }

    async fn count_vendors(&self) -> Result<u64> {
        match self {
            Store::Memory(store) => store.count_vendors().await,
            Store::Sqlite(store) => store.count_vendors().await,
        }
    }
}

impl ChatHistoryRepository for Store {
    async fn save_turn(&self, turn: &ChatTurn) -> Result<()> {
        match self {
            Store::Memory(store) => store.save_turn(turn).await,
            Store::Sqlite(store) => store.save_turn(turn).await,
        }
    }

    async fn recent_turns(&self, session_id: &str, limit: usize) -> Result<Vec<ChatTurn>> {
        match self {
            Store::Memory(store) => store.recent_turns(session_id, limit).await,
            Store::Sqlite(store) => store.recent_turns(session_id, limit).await,
        }
    }
}
