//! # Product Name Validator
//!
//! Live validation for the product name field of the product form.
//!
//! ```text
//! set_name("W") ─ set_name("Wh") ─ ... ─ set_name("Whole Milk")
//!                                               │
//!                                   300ms quiet │ (restarts on every keystroke)
//!                                               ▼
//!                         local rules ──► product_name_exists() ──► NameValidation
//!                                                                       │
//!                              dropped if the name changed meanwhile ◄──┘
//! ```
//!
//! Local rules always run. The uniqueness lookup only runs for names that
//! pass them, at most once per quiet period.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tally_core::validation::{product_name_issues, FieldIssue};
use tally_db::StockStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const NAME_CHECK_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NameValidation {
    /// The name these issues belong to.
    pub name: String,
    pub issues: Vec<FieldIssue>,
    /// A newer name is waiting for its quiet period.
    pub pending: bool,
}

impl NameValidation {
    pub fn is_valid(&self) -> bool {
        !self.pending && self.issues.is_empty()
    }
}

pub struct ProductNameValidator {
    input: watch::Sender<String>,
    output: watch::Receiver<NameValidation>,
    task: JoinHandle<()>,
}

impl ProductNameValidator {
    /// `exclude_id` is the product being edited, so its own name is not a duplicate.
    pub fn spawn(store: Arc<dyn StockStore>, exclude_id: Option<String>) -> Self {
        Self::with_debounce(store, exclude_id, NAME_CHECK_DEBOUNCE)
    }

    pub fn with_debounce(store: Arc<dyn StockStore>, exclude_id: Option<String>, debounce: Duration) -> Self {
        let (input, input_rx) = watch::channel(String::new());
        let (output_tx, output) = watch::channel(NameValidation::default());
        let task = tokio::spawn(run(store, exclude_id, debounce, input_rx, output_tx));
        ProductNameValidator { input, output, task }
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.input.send_replace(name.into());
    }

    pub fn current(&self) -> NameValidation {
        self.output.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NameValidation> {
        self.output.clone()
    }
}

impl Drop for ProductNameValidator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    store: Arc<dyn StockStore>,
    exclude_id: Option<String>,
    debounce: Duration,
    mut input: watch::Receiver<String>,
    output: watch::Sender<NameValidation>,
) {
    while input.changed().await.is_ok() {
        output.send_modify(|v| v.pending = true);

        // Wait for a quiet period; any keystroke restarts it.
        loop {
            tokio::select! {
                _ = tokio::time::sleep(debounce) => break,
                changed = input.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }

        let name = input.borrow_and_update().clone();
        let mut issues = product_name_issues(&name);

        if issues.is_empty() {
            match store.product_name_exists(name.trim(), exclude_id.as_deref()).await {
                Ok(true) => issues.push(FieldIssue::new(
                    "name",
                    "DUPLICATE",
                    "A product with this name already exists",
                )),
                Ok(false) => {}
                Err(err) => {
                    warn!(name = %name, error = %err, "Product name uniqueness check failed");
                    issues.push(FieldIssue::new(
                        "name",
                        "CHECK_FAILED",
                        "Could not check whether this name is already used",
                    ));
                }
            }
        }

        if input.has_changed().unwrap_or(false) {
            debug!(name = %name, "Discarding name check for superseded input");
            continue;
        }

        output.send_replace(NameValidation {
            name,
            issues,
            pending: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{PricingMode, Product};
    use tally_db::{DbError, MemoryStore, StoreOp};

    fn store() -> MemoryStore {
        MemoryStore::new().with_product(
            Product {
                id: "p-milk".into(),
                sku: "MILK-1L".into(),
                name: "Whole Milk".into(),
                price_cents: 299,
                pricing_mode: PricingMode::Unit,
                variants: Vec::new(),
                track_inventory: true,
                is_active: true,
            },
            10,
        )
    }

    fn name_checks(store: &MemoryStore) -> usize {
        store.calls().iter().filter(|op| **op == StoreOp::NameExists).count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_burst_checks_once() {
        let store = store();
        let validator = ProductNameValidator::spawn(Arc::new(store.clone()), None);

        for prefix in ["W", "Wh", "Whole", "Whole M", "Whole Milk"] {
            validator.set_name(prefix);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(name_checks(&store), 0);
        assert!(validator.current().pending);

        tokio::time::sleep(Duration::from_millis(400)).await;

        let result = validator.current();
        assert_eq!(result.name, "Whole Milk");
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].code, "DUPLICATE");
        assert!(!result.is_valid());
        assert_eq!(name_checks(&store), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_editing_product_keeps_own_name() {
        let store = store();
        let validator = ProductNameValidator::spawn(Arc::new(store.clone()), Some("p-milk".into()));

        validator.set_name("Whole Milk");
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(validator.current().is_valid());
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_rules_skip_remote_lookup() {
        let store = store();
        let validator = ProductNameValidator::spawn(Arc::new(store.clone()), None);

        validator.set_name("   ");
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(validator.current().issues[0].code, "REQUIRED");
        assert_eq!(name_checks(&store), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_failure_is_reported_on_the_field() {
        let store = store();
        store.fail(StoreOp::NameExists, DbError::Unavailable("offline".into()));
        let validator = ProductNameValidator::spawn(Arc::new(store.clone()), None);

        validator.set_name("Oat Milk");
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(validator.current().issues[0].code, "CHECK_FAILED");
    }
}
