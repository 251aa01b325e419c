pub mod local_store;
pub mod remote_api;

pub use local_store::LocalStore;
pub use remote_api::{RemoteAcceptance, RemoteApi, RemoteOutcome};
