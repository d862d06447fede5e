pub mod alert;
pub mod snapshot;
