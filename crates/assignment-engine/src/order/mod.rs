//! # Order Module
//!
//! The slice of the order model the assignment engine works with: identity,
//! status, assignee, dates and product lines, plus the query and product
//! filter types the stores understand.

pub mod filter;
pub mod types;

pub use filter::{AssigneeFilter, FilterLogic, OrderQuery, OrderSort, ProductFilter, ProductRef};
pub use types::{LineItem, Order, OrderId, OrderStatus};
