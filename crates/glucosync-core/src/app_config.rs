use chrono_tz::Tz;

/// Regional LibreLinkUp endpoint used when `LIBRELINK_API_URL` is unset.
pub const DEFAULT_API_URL: &str = "https://api-jp.libreview.io";

/// Zone applied to naive vendor timestamps when `LIBRELINK_ASSUME_TZ` is unset.
pub const DEFAULT_ASSUME_TZ: &str = "Asia/Tokyo";

/// Writes per Firestore commit when `FIRESTORE_BATCH_SIZE` is unset.
pub const DEFAULT_BATCH_SIZE: usize = 450;

/// Firestore rejects commits with more writes than this.
pub const MAX_BATCH_SIZE: usize = 500;

#[derive(Clone)]
pub struct AppConfig {
    pub librelink_email: String,
    pub librelink_password: String,
    pub firebase_service_account: String,
    pub librelink_api_url: String,
    pub librelink_patient_id: Option<String>,
    pub librelink_patient_index: i64,
    pub assume_tz: Tz,
    pub debug_intervals: bool,
    pub librelink_client_version: String,
    pub librelink_request_timeout_secs: u64,
    pub librelink_max_retries: u32,
    pub firestore_collection: String,
    pub firestore_batch_size: usize,
    pub firestore_emulator_host: Option<String>,
    pub log_level: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("librelink_email", &"[redacted]")
            .field("librelink_password", &"[redacted]")
            .field("firebase_service_account", &"[redacted]")
            .field("librelink_api_url", &self.librelink_api_url)
            .field("librelink_patient_id", &self.librelink_patient_id)
            .field("librelink_patient_index", &self.librelink_patient_index)
            .field("assume_tz", &self.assume_tz)
            .field("debug_intervals", &self.debug_intervals)
            .field("librelink_client_version", &self.librelink_client_version)
            .field(
                "librelink_request_timeout_secs",
                &self.librelink_request_timeout_secs,
            )
            .field("librelink_max_retries", &self.librelink_max_retries)
            .field("firestore_collection", &self.firestore_collection)
            .field("firestore_batch_size", &self.firestore_batch_size)
            .field("firestore_emulator_host", &self.firestore_emulator_host)
            .field("log_level", &self.log_level)
            .finish()
    }
}
