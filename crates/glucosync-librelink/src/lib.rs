pub mod client;
pub mod error;
pub mod normalize;
pub mod patient;
pub mod record;
pub(crate) mod retry;
pub mod types;

pub use client::LibreLinkClient;
pub use error::LibreLinkError;
pub use normalize::Normalizer;
pub use patient::{display_name, extract_patient_id, select_patient, SelectedPatient};
pub use record::RecordView;
