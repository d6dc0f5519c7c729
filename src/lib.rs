pub mod cli;
pub mod dates;
pub mod db;
pub mod error;
pub mod feed;
pub mod logging;
pub mod model;
pub mod reconcile;

pub const TARGET_DB: &str = "db_query";
pub const TARGET_WEB_REQUEST: &str = "web_request";
pub const TARGET_RECONCILE: &str = "reconcile";
