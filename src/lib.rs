#![doc = include_str!("../README.md")]

pub mod bulk;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod groups;
pub mod money;
pub mod order;
pub mod period;
pub mod report;
pub mod shop;
pub mod vat;

pub use cache::Cache;
pub use client::Client;
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use groups::Groups;
pub use money::Money;
pub use order::Order;
pub use period::Period;
pub use report::{Dimension, Report};
pub use shop::Shop;
