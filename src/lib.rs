pub mod config;
pub mod context;
pub mod contract;
pub mod error;
pub mod evidence;
pub mod ledger;
pub mod logger;
pub mod medicine;
pub mod order;
pub mod service;
pub mod transfer;
pub mod types;
pub mod utils;
