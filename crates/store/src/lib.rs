pub mod db;
pub mod project;
pub mod query;
pub mod schema;
pub mod write;

pub use db::Store;
