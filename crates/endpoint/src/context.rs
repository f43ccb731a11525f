//! Explicit deployment context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest resource name the managed service accepts.
const MAX_NAME_LEN: usize = 63;

/// Timestamp suffix appended to resource names.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S-%3f";

/// Account, region and naming settings for one deployment.
///
/// Built once from configuration and handed to the [`crate::Driver`] and the
/// service backend. Nothing reads ambient session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    /// Cloud region, e.g. `us-east-1`.
    pub region: String,
    /// Execution role the endpoint assumes to read the bundle.
    pub role_arn: String,
    /// Bucket the bundle archive is uploaded to.
    pub bucket: String,
    /// Object-key prefix and resource-name prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Named credentials profile. Uses the default chain when unset.
    #[serde(default)]
    pub profile: Option<String>,
}

fn default_prefix() -> String {
    "lora-multi-adapter".to_owned()
}

impl Context {
    /// A unique resource name for `base`, stamped with the current UTC time.
    pub fn resource_name(&self, base: &str) -> String {
        self.resource_name_at(base, Utc::now())
    }

    /// A resource name for `base` stamped with `at`.
    ///
    /// The result only holds ASCII alphanumerics and single hyphens and is
    /// never longer than 63 characters. The timestamp is always kept whole.
    pub fn resource_name_at(&self, base: &str, at: DateTime<Utc>) -> String {
        let stamp = at.format(TIMESTAMP_FORMAT).to_string();
        let mut stem = sanitize(&format!("{}-{base}", self.prefix));
        stem.truncate(MAX_NAME_LEN - stamp.len() - 1);
        let stem = stem.trim_end_matches('-');
        if stem.is_empty() {
            return stamp;
        }
        format!("{stem}-{stamp}")
    }

    /// Object key for an uploaded file.
    pub fn object_key(&self, file_name: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            file_name.to_owned()
        } else {
            format!("{prefix}/{file_name}")
        }
    }
}

fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    out
}
