pub mod config;
pub mod error;
pub mod event_bus;
pub mod predicate;
pub mod store;
pub mod types;

pub use config::AppConfig;
pub use error::{FlowError, FlowResult};
pub use store::ContactStore;
