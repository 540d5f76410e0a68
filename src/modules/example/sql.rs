//! SQL statements for the example module.

pub const SQL_USERS: &str = "SELECT name, email FROM users WHERE name = :name";
