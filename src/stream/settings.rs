//! Stream construction defaults (spec §4.8), loaded the way the teacher
//! loads its own process-wide settings: a `serde`-derived struct with a
//! `Default`, optionally layered over environment/file config via
//! `figment` behind the `figment_config` feature.

use serde::{Deserialize, Serialize};

/// Default block size: large enough to amortize per-block overhead, small
/// enough to stay off the allocator's large-object path (spec §4.8).
pub const DEFAULT_BLOCK_SIZE: usize = 80 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamSettings {
    pub block_size: usize,
    pub pool_capacity: usize,
    pub release_on_read: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        StreamSettings {
            block_size: DEFAULT_BLOCK_SIZE,
            pool_capacity: 16,
            release_on_read: false,
        }
    }
}

#[cfg(feature = "figment_config")]
impl StreamSettings {
    /// Layers environment variables (`STRATA_STREAM_*`) over an optional
    /// JSON/YAML config file, the same provider stack the teacher loads its
    /// own configuration through.
    pub fn from_env_and_file(path: Option<&std::path::Path>) -> crate::error::Result<Self> {
        use figment::providers::{Env, Format, Json, Serialized, Yaml};
        use figment::Figment;

        let mut figment = Figment::from(Serialized::defaults(StreamSettings::default()));
        if let Some(path) = path {
            figment = match path.extension().and_then(|e| e.to_str()) {
                Some("yaml") | Some("yml") => figment.merge(Yaml::file(path)),
                _ => figment.merge(Json::file(path)),
            };
        }
        figment = figment.merge(Env::prefixed("STRATA_STREAM_"));
        figment
            .extract()
            .map_err(|e| crate::error::Error::persistence(format!("invalid stream settings: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_block_size_matches_spec() {
        assert_eq!(StreamSettings::default().block_size, 80 * 1024);
    }
}
