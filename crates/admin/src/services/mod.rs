//! Business logic services for admin.
//!
//! # Services
//!
//! - `catalog` - Slugs, the category tree and taxonomy payload shaping
//! - `comments` - Comment listing across statuses, counts and moderation
//! - `completion` - Chat-completion client for blog drafts and ideas
//! - `customers` - Registered and guest customer reconciliation
//! - `dashboard` - Dashboard and order statistics
//! - `images` - Generated product image registry
//! - `inventory` - Inventory projection, updates and stock statistics
//! - `webhooks` - Order webhook signature verification

pub mod catalog;
pub mod comments;
pub mod completion;
pub mod customers;
pub mod dashboard;
pub mod images;
pub mod inventory;
pub mod webhooks;

pub use comments::{CommentService, CommentSource};
pub use completion::{CompletionClient, CompletionError};
pub use customers::{CustomerReconciler, CustomerSource};
pub use images::{ImageRegistry, RegistryError};
pub use inventory::{InventoryService, ProductSource};
