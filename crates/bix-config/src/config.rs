use std::path::{Path, PathBuf};

use bix_types::{PipelineError, Result};
use regex::Regex;

/// Resolved pipeline configuration.
///
/// Loaded once by the entry point and passed by value; nothing below the
/// entry point reads the environment.
#[derive(Clone)]
pub struct PipelineConfig {
    // Staging
    pub staging_dir: PathBuf,
    pub plaintext_filename: String,
    pub ciphertext_filename: String,

    // Encryption tool
    pub tool_path: PathBuf,
    pub tool_working_dir: PathBuf,
    pub tool_config_name: String,
    pub tool_column_actions: String,
    pub tool_success_marker: String,
    /// Diagnostic escape hatch. Halts every run after encryption.
    pub retain_plaintext_after_encryption: bool,

    // Reporting API
    pub bi_api_url: String,
    pub bi_api_key: String,
    pub bi_api_key_header: String,
    pub bi_api_timeout_secs: u64,

    // Mailbox
    pub mesh_api_url: String,
    pub mesh_mailbox_from: Option<String>,
    pub mesh_mailbox_to: String,
    pub mesh_workflow_id: String,
    pub mesh_certificate_path: Option<PathBuf>,
    pub mesh_key_vault: Option<String>,

    // Schedule
    pub export_schedule: String,
    pub export_lookback_days: u32,

    // Logging
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub log_json: bool,
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("staging_dir", &self.staging_dir)
            .field("plaintext_filename", &self.plaintext_filename)
            .field("ciphertext_filename", &self.ciphertext_filename)
            .field("tool_path", &self.tool_path)
            .field("tool_working_dir", &self.tool_working_dir)
            .field("tool_config_name", &self.tool_config_name)
            .field("tool_column_actions", &self.tool_column_actions)
            .field("tool_success_marker", &self.tool_success_marker)
            .field(
                "retain_plaintext_after_encryption",
                &self.retain_plaintext_after_encryption,
            )
            .field("bi_api_url", &self.bi_api_url)
            .field("bi_api_key", &"<redacted>")
            .field("bi_api_key_header", &self.bi_api_key_header)
            .field("bi_api_timeout_secs", &self.bi_api_timeout_secs)
            .field("mesh_api_url", &self.mesh_api_url)
            .field("mesh_mailbox_from", &self.mesh_mailbox_from)
            .field("mesh_mailbox_to", &self.mesh_mailbox_to)
            .field("mesh_workflow_id", &self.mesh_workflow_id)
            .field("mesh_certificate_path", &self.mesh_certificate_path)
            .field("mesh_key_vault", &self.mesh_key_vault)
            .field("export_schedule", &self.export_schedule)
            .field("export_lookback_days", &self.export_lookback_days)
            .field("log_level", &self.log_level)
            .field("log_file", &self.log_file)
            .field("log_json", &self.log_json)
            .finish()
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables (with dotenvy).
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignore errors, the file is optional)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(lookup);

        let staging_dir = env.path_or("STAGING_DIR", || {
            std::env::temp_dir().join("bix-staging")
        });
        let tool_path = PathBuf::from(env.required("AGEM_CLI_PATH")?);
        let tool_working_dir = env.path_or("AGEM_WORKING_DIR", || {
            tool_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        });

        let config = PipelineConfig {
            staging_dir,
            plaintext_filename: env.or("PLAINTEXT_FILENAME", || "testfile.csv".to_string()),
            ciphertext_filename: env.or("CIPHERTEXT_FILENAME", || "testfile_enc.csv".to_string()),

            tool_path,
            tool_working_dir,
            tool_config_name: env.or("AGEM_CONFIG_NAME", || "WMS".to_string()),
            tool_column_actions: env.or("AGEM_COLUMN_ACTIONS", || "0:P".to_string()),
            tool_success_marker: env.required("AGEM_SUCCESS_MARKER")?,
            retain_plaintext_after_encryption: env.bool("RETAIN_PLAINTEXT_AFTER_ENCRYPTION", false),

            bi_api_url: env.required("BI_API_URL")?,
            bi_api_key: env.required("BI_API_KEY")?,
            bi_api_key_header: env.or("BI_API_KEY_HEADER", || "X-API-KEY".to_string()),
            bi_api_timeout_secs: env.u64("BI_API_TIMEOUT_SECS", 100),

            mesh_api_url: env.required("MESH_API_URL")?,
            mesh_mailbox_from: env.opt("MESH_MAILBOX_FROM"),
            mesh_mailbox_to: env.required("MESH_MAILBOX_TO")?,
            mesh_workflow_id: env.or("MESH_WORKFLOW_ID", || "WMS_REFERRALS".to_string()),
            mesh_certificate_path: env.opt("MESH_CERTIFICATE_PATH").map(PathBuf::from),
            mesh_key_vault: env.opt("MESH_KEY_VAULT"),

            export_schedule: env.or("EXPORT_SCHEDULE", || "0 2 * * *".to_string()),
            export_lookback_days: env.u32("EXPORT_LOOKBACK_DAYS", 7),

            log_level: env.or("LOG_LEVEL", || "info".to_string()),
            log_file: env.opt("LOG_FILE").map(PathBuf::from),
            log_json: env.bool("LOG_JSON", false),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that the environment alone cannot express.
    pub fn validate(&self) -> Result<()> {
        let re = Regex::new(r"^[\w\-. ]+$")
            .map_err(|e| PipelineError::Config(format!("Invalid filename pattern: {e}")))?;

        for (key, name) in [
            ("PLAINTEXT_FILENAME", &self.plaintext_filename),
            ("CIPHERTEXT_FILENAME", &self.ciphertext_filename),
        ] {
            if !re.is_match(name) || name.contains("..") {
                return Err(PipelineError::Config(format!(
                    "{key} must be a bare file name, got '{name}'"
                )));
            }
        }

        if self.plaintext_filename == self.ciphertext_filename {
            return Err(PipelineError::Config(
                "PLAINTEXT_FILENAME and CIPHERTEXT_FILENAME must differ".to_string(),
            ));
        }

        if self.tool_success_marker.is_empty() {
            return Err(PipelineError::Config(
                "AGEM_SUCCESS_MARKER must not be empty".to_string(),
            ));
        }

        if self.export_lookback_days == 0 {
            return Err(PipelineError::Config(
                "EXPORT_LOOKBACK_DAYS must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Full path of the plaintext extract inside the staging directory.
    pub fn plaintext_path(&self) -> PathBuf {
        self.staging_dir.join(&self.plaintext_filename)
    }

    /// Full path of the encrypted extract inside the staging directory.
    pub fn ciphertext_path(&self) -> PathBuf {
        self.staging_dir.join(&self.ciphertext_filename)
    }

    /// Non-secret settings for display.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        vec![
            ("staging_dir", self.staging_dir.display().to_string()),
            ("plaintext_path", self.plaintext_path().display().to_string()),
            ("ciphertext_path", self.ciphertext_path().display().to_string()),
            ("tool_path", self.tool_path.display().to_string()),
            ("tool_working_dir", self.tool_working_dir.display().to_string()),
            ("tool_config_name", self.tool_config_name.clone()),
            (
                "retain_plaintext_after_encryption",
                self.retain_plaintext_after_encryption.to_string(),
            ),
            ("bi_api_url", self.bi_api_url.clone()),
            ("mesh_api_url", self.mesh_api_url.clone()),
            ("mesh_mailbox_to", self.mesh_mailbox_to.clone()),
            ("mesh_workflow_id", self.mesh_workflow_id.clone()),
            ("export_schedule", self.export_schedule.clone()),
            ("export_lookback_days", self.export_lookback_days.to_string()),
        ]
    }
}

// ---------------------------------------------------------------------------
// Env helpers
// ---------------------------------------------------------------------------

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn or(&self, key: &str, default: impl FnOnce() -> String) -> String {
        self.opt(key).unwrap_or_else(default)
    }

    fn opt(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|s| !s.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.opt(key).ok_or_else(|| {
            PipelineError::Config(format!("{key} is required. Set it in .env or environment."))
        })
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        self.opt(key)
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(default)
    }

    fn u32(&self, key: &str, default: u32) -> u32 {
        self.opt(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn u64(&self, key: &str, default: u64) -> u64 {
        self.opt(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn path_or(&self, key: &str, default: impl FnOnce() -> PathBuf) -> PathBuf {
        self.opt(key).map(PathBuf::from).unwrap_or_else(default)
    }
}
