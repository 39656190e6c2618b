//! Sifter test utilities.
//!
//! Helpers for integration testing: item fixtures, an in-memory repository
//! that evaluates queryables without a database, and tracing setup.

use std::sync::{Arc, Once};

use serde_json::Value as JsonValue;
use sifter_core::Schema;
use tracing_subscriber::EnvFilter;

mod memory;

pub use memory::MemoryRepository;

/// Columns of the `items` fixture table.
pub const ITEM_FIELDS: [&str; 6] = ["id", "title", "category", "price", "status", "deleted"];

/// Schema for the `items` fixture table, keyed on `id`.
pub fn items_schema() -> Arc<Schema> {
    match Schema::new("items", "id", ITEM_FIELDS) {
        Ok(schema) => Arc::new(schema),
        Err(e) => panic!("fixture schema is invalid: {e}"),
    }
}

/// Create a test item with default values.
pub fn test_item(id: i64, title: &str) -> TestItem {
    TestItem {
        id,
        title: title.to_string(),
        category: "general".to_string(),
        price: 0,
        status: 1,
        deleted: false,
    }
}

/// A test item builder for creating test fixtures.
#[derive(Debug, Clone)]
pub struct TestItem {
    pub id: i64,
    pub title: String,
    pub category: String,
    pub price: i64,
    pub status: i16,
    pub deleted: bool,
}

impl TestItem {
    /// Set the category.
    pub fn in_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    /// Set the price.
    pub fn with_price(mut self, price: i64) -> Self {
        self.price = price;
        self
    }

    /// Set as unpublished.
    pub fn unpublished(mut self) -> Self {
        self.status = 0;
        self
    }

    /// Set as soft-deleted.
    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    /// Render as a row.
    pub fn to_json(&self) -> JsonValue {
        serde_json::json!({
            "id": self.id,
            "title": self.title,
            "category": self.category,
            "price": self.price,
            "status": self.status,
            "deleted": self.deleted,
        })
    }
}

/// Twelve items across three categories. Items 11 and 12 are soft-deleted;
/// item 10 is unpublished.
pub fn sample_items() -> Vec<TestItem> {
    vec![
        test_item(1, "Anvil").in_category("tools").with_price(120),
        test_item(2, "Bucket").in_category("garden").with_price(15),
        test_item(3, "Chisel").in_category("tools").with_price(25),
        test_item(4, "Drill").in_category("tools").with_price(90),
        test_item(5, "Edger").in_category("garden").with_price(60),
        test_item(6, "File").in_category("tools").with_price(8),
        test_item(7, "Gloves").in_category("garden").with_price(12),
        test_item(8, "Hammer").in_category("tools").with_price(30),
        test_item(9, "Ink").in_category("office").with_price(5),
        test_item(10, "Journal")
            .in_category("office")
            .with_price(9)
            .unpublished(),
        test_item(11, "Knife")
            .in_category("tools")
            .with_price(18)
            .deleted(),
        test_item(12, "Ladder")
            .in_category("tools")
            .with_price(75)
            .deleted(),
    ]
}

/// In-memory repository loaded with [`sample_items`].
pub fn sample_repository() -> MemoryRepository {
    MemoryRepository::new(sample_items().iter().map(TestItem::to_json))
}

/// Install a tracing subscriber for tests, once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Assertion helpers for result rows.
pub mod assert {
    use serde_json::Value;

    /// Extract the `id` column of each row.
    pub fn ids(rows: &[Value]) -> Vec<i64> {
        rows.iter()
            .filter_map(|row| row.get("id").and_then(Value::as_i64))
            .collect()
    }

    /// Assert that rows carry exactly the given ids, in order.
    pub fn ids_eq(rows: &[Value], expected: &[i64]) {
        let actual = ids(rows);
        assert_eq!(
            actual, expected,
            "row ids mismatch:\nactual: {actual:?}\nexpected: {expected:?}"
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }
}
