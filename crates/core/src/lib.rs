//! Ibulore Core - Shared types library.
//!
//! This crate provides the pure data-shaping rules used by the admin backend:
//! - canonical comment statuses and their translation to the content source
//! - order status predicates (abandoned carts, revenue, purchase history)
//! - pagination math for locally merged lists
//! - guest identity and money formatting
//!
//! # Architecture
//!
//! The core crate contains only types and functions - no I/O, no HTTP clients.
//! Everything here can be tested without a network.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers and rule tables for ids, statuses, emails, money and pages

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
