
//! Background workers
pub mod update_worker;
pub use update_worker::UpdateWorker;
