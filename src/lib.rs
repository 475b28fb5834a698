pub mod config;
pub mod engine;
pub mod geometry;
pub mod matching;
pub mod resolver;
pub mod schema;
pub mod store;
pub mod validate;

pub use engine::ConsolidationEngine;
pub use store::PlateStore;
