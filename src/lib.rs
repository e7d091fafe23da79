//! MMO account store
//!
//! PostgreSQL persistence for game-server accounts: login and access-token
//! validation, access levels and bans, per-account gold/cash balances, and
//! all-or-nothing account provisioning.
//!
//! # Modules
//!
//! - [`config`] - defaults, `pgsqlConfig.json` and `pg*` environment overrides
//! - [`logging`] - tracing subscriber setup
//! - [`db`] - connection pool, statement cache, predicates, CRUD executor
//! - [`account`] - account, token, ledger and provisioning operations

pub mod account;
pub mod config;
pub mod db;
pub mod logging;

pub use account::{AccountStore, Currency, ProvisionError};
pub use config::{AppConfig, ConfigError, LoadReport, PgConfig};
pub use db::{Database, DbError, Executor, Predicate, QueryCache};
