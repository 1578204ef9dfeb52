//! Database layer
//!
//! Storage for users, login tokens and study sessions on either
//! SQLite (default, single file) or MySQL. The driver is selected by
//! configuration; everything above this module talks to repository traits.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, mysql_pool, sqlite_pool, DatabasePool, DynDatabasePool,
    MysqlDatabase, SqliteDatabase,
};
