pub mod evaluator;
pub mod notify;
pub mod store;
