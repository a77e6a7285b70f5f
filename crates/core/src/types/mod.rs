//! Core types for Ibulore.
//!
//! This module provides type-safe wrappers and rule tables for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod pagination;
pub mod status;

pub use email::{Email, EmailError, guest_id, normalize_email};
pub use id::*;
pub use money::{amount_to_f64, format_amount, parse_amount, parse_amount_value, round_cents};
pub use pagination::{Pagination, clamp_per_page, paginate, total_pages};
pub use status::*;
