//! Product filtering and order queries
//!
//! [`ProductFilter`] restricts bulk reassignment candidates to orders whose
//! line items match a list of products. [`OrderQuery`] is the query shape
//! the engine hands to an [`OrderStore`](crate::store::OrderStore).

use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::error::{AssignmentError, Result};
use crate::order::types::{LineItem, Order, OrderStatus};

/// How the listed products must appear in an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterLogic {
    /// Every listed product must appear
    All,
    /// At least one listed product must appear
    Any,
}

impl Default for FilterLogic {
    fn default() -> Self {
        FilterLogic::Any
    }
}

/// One product to look for; every field that is set must match
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductRef {
    pub title: Option<String>,
    pub sku: Option<String>,
}

impl ProductRef {
    pub fn sku(sku: impl Into<String>) -> Self {
        Self { title: None, sku: Some(sku.into()) }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self { title: Some(title.into()), sku: None }
    }

    fn is_empty(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        blank(&self.title) && blank(&self.sku)
    }

    /// SKUs compare exactly after trimming, titles compare case-insensitively
    pub fn matches(&self, item: &LineItem) -> bool {
        if self.is_empty() {
            return false;
        }
        let sku_ok = match self.sku.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(wanted) => item.sku.as_deref().map(str::trim) == Some(wanted),
            None => true,
        };
        let title_ok = match self.title.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(wanted) => item.title.trim().eq_ignore_ascii_case(wanted),
            None => true,
        };
        sku_ok && title_ok
    }
}

/// Product filter for bulk reassignment candidates
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductFilter {
    pub enabled: bool,
    pub products: Vec<ProductRef>,
    pub logic: FilterLogic,
}

impl ProductFilter {
    pub fn new(logic: FilterLogic, products: Vec<ProductRef>) -> Self {
        Self { enabled: true, products, logic }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// An enabled filter must name at least one product, each with a title or sku
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.products.is_empty() {
            return Err(AssignmentError::validation(
                "product filter is enabled but lists no products",
            ));
        }
        if let Some(index) = self.products.iter().position(ProductRef::is_empty) {
            return Err(AssignmentError::validation(format!(
                "product filter entry {} has neither title nor sku",
                index
            )));
        }
        Ok(())
    }

    /// A disabled filter matches every order
    pub fn matches(&self, order: &Order) -> bool {
        if !self.enabled {
            return true;
        }
        let present = |product: &ProductRef| order.line_items.iter().any(|item| product.matches(item));
        match self.logic {
            FilterLogic::All => !self.products.is_empty() && self.products.iter().all(present),
            FilterLogic::Any => self.products.iter().any(present),
        }
    }
}

/// Sort order for order queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSort {
    /// Oldest `created_at` first, ties by id
    CreatedAtAsc,
    /// Most recent `order_date` first, ties by id
    OrderDateDesc,
}

impl OrderSort {
    pub fn compare(&self, a: &Order, b: &Order) -> std::cmp::Ordering {
        match self {
            OrderSort::CreatedAtAsc => a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)),
            OrderSort::OrderDateDesc => b.order_date.cmp(&a.order_date).then_with(|| a.id.cmp(&b.id)),
        }
    }
}

/// Which assignee an order query targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssigneeFilter {
    /// Orders with no agent
    Unassigned,
    /// Orders with any agent
    AnyAgent,
    /// Orders belonging to one of these agents
    Agents(Vec<AgentId>),
}

/// Query handed to an order store
#[derive(Debug, Clone)]
pub struct OrderQuery {
    pub assignee: AssigneeFilter,
    /// Restrict to these statuses; `None` means any status
    pub statuses: Option<Vec<OrderStatus>>,
    pub products: Option<ProductFilter>,
    pub sort: OrderSort,
    /// Applied after status and product filtering
    pub limit: Option<usize>,
}

impl OrderQuery {
    pub fn new(assignee: AssigneeFilter, sort: OrderSort) -> Self {
        Self {
            assignee,
            statuses: None,
            products: None,
            sort,
            limit: None,
        }
    }

    pub fn with_statuses(mut self, statuses: Vec<OrderStatus>) -> Self {
        self.statuses = Some(statuses);
        self
    }

    pub fn with_products(mut self, filter: Option<ProductFilter>) -> Self {
        self.products = filter.filter(|f| f.enabled);
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Everything except sort and limit
    pub fn matches(&self, order: &Order) -> bool {
        let assignee_ok = match &self.assignee {
            AssigneeFilter::Unassigned => order.assigned_agent_id.is_none(),
            AssigneeFilter::AnyAgent => order.assigned_agent_id.is_some(),
            AssigneeFilter::Agents(ids) => order
                .assigned_agent_id
                .as_ref()
                .map_or(false, |id| ids.contains(id)),
        };
        let status_ok = self
            .statuses
            .as_ref()
            .map_or(true, |statuses| statuses.contains(&order.status));
        let products_ok = self.products.as_ref().map_or(true, |filter| filter.matches(order));
        assignee_ok && status_ok && products_ok
    }

    /// Filter, sort and truncate an in-memory candidate list
    pub fn apply(&self, orders: impl IntoIterator<Item = Order>) -> Vec<Order> {
        let mut matched: Vec<Order> = orders.into_iter().filter(|o| self.matches(o)).collect();
        matched.sort_by(|a, b| self.sort.compare(a, b));
        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn order_with(id: &str, items: &[(&str, Option<&str>)]) -> Order {
        let mut order = Order::new(id, id, Utc::now());
        for (title, sku) in items {
            order = order.with_line_item(LineItem::new(*title, *sku, 1));
        }
        order
    }

    #[test]
    fn test_any_logic_requires_one_product() {
        let filter = ProductFilter::new(
            FilterLogic::Any,
            vec![ProductRef::sku("SKU-1"), ProductRef::title("Blender")],
        );
        assert!(filter.matches(&order_with("o1", &[("Kettle", Some("SKU-1"))])));
        assert!(filter.matches(&order_with("o2", &[("blender", None)])));
        assert!(!filter.matches(&order_with("o3", &[("Toaster", Some("SKU-9"))])));
    }

    #[test]
    fn test_all_logic_requires_every_product() {
        let filter = ProductFilter::new(
            FilterLogic::All,
            vec![ProductRef::sku("SKU-1"), ProductRef::sku("SKU-2")],
        );
        assert!(filter.matches(&order_with("o1", &[("A", Some("SKU-1")), ("B", Some("SKU-2"))])));
        assert!(!filter.matches(&order_with("o2", &[("A", Some("SKU-1"))])));
    }

    #[test]
    fn test_ref_with_title_and_sku_needs_both() {
        let product = ProductRef { title: Some("Kettle".into()), sku: Some("SKU-1".into()) };
        assert!(product.matches(&LineItem::new("kettle", Some("SKU-1"), 1)));
        assert!(!product.matches(&LineItem::new("Kettle", Some("SKU-2"), 1)));
    }

    #[test]
    fn test_disabled_filter_matches_everything() {
        assert!(ProductFilter::disabled().matches(&order_with("o1", &[])));
    }

    #[test]
    fn test_enabled_filter_validation() {
        assert!(ProductFilter::new(FilterLogic::Any, vec![]).validate().is_err());
        assert!(ProductFilter::new(FilterLogic::Any, vec![ProductRef::default()]).validate().is_err());
        assert!(ProductFilter::new(FilterLogic::All, vec![ProductRef::sku("X")]).validate().is_ok());
    }

    #[test]
    fn test_query_sorts_and_limits() {
        let now = Utc::now();
        let mut old = Order::new("old", "old", now - Duration::hours(2));
        old.order_date = now - Duration::hours(2);
        let new = Order::new("new", "new", now);

        let query = OrderQuery::new(AssigneeFilter::Unassigned, OrderSort::CreatedAtAsc);
        let sorted = query.apply(vec![new.clone(), old.clone()]);
        assert_eq!(sorted[0].id, old.id);

        let query = OrderQuery::new(AssigneeFilter::Unassigned, OrderSort::OrderDateDesc).with_limit(Some(1));
        let sorted = query.apply(vec![old, new.clone()]);
        assert_eq!(sorted.len(), 1);
        assert_eq!(sorted[0].id, new.id);
    }
}
