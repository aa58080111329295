pub mod auth;
pub mod client;
pub mod credentials;
pub mod error;
pub mod value;
pub mod writer;

pub use client::FirestoreClient;
pub use credentials::ServiceAccount;
pub use error::FirestoreError;
pub use writer::{existing_buckets, plan_new_records, write_new_measurements, WriteSummary};
