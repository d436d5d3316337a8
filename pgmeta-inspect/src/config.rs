//! pgmeta configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via PGMETA_CONFIG or --config)
//! 3. Environment variables

use pgmeta_format::control::{DEFAULT_CONTROL_VERSION, DEFAULT_CRC_OFFSET};
use pgmeta_format::{
    BlockSize, ControlFileLayout, SegmentSize, ServerVersion, WalPolicy, DEFAULT_XLOG_BLCKSZ,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// pgmeta configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The cluster being inspected.
    pub cluster: ClusterConfig,
    /// WAL segment expectations.
    pub wal: WalConfig,
    /// Control file layout.
    pub control: ControlConfig,
}

impl Config {
    /// Loads configuration from `PGMETA_CONFIG` if set, then applies
    /// environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Like [`Config::load`], with an explicit file taking precedence over
    /// `PGMETA_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var("PGMETA_CONFIG") {
                Ok(path) => Self::from_file(&path)?,
                Err(_) => Self::default(),
            },
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`, keyed by environment variable name.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.cluster.apply_overrides(&lookup);
        self.wal.apply_overrides(&lookup);
        self.control.apply_overrides(&lookup);
    }

    /// Checks that every size and offset is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.wal.segment_size()?;
        self.wal.block_size()?;
        self.control.layout()?;
        Ok(())
    }

    /// Builds the WAL validation policy for the configured server.
    pub fn wal_policy(&self) -> Result<WalPolicy, ConfigError> {
        let version = self.cluster.server_version.ok_or_else(|| {
            ConfigError::ValidationError("cluster.server_version is not set".to_string())
        })?;
        let policy = WalPolicy::for_server(version, self.wal.segment_size()?, self.wal.block_size()?)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        Ok(match self.wal.page_magic {
            Some(magic) => policy.with_magic(magic),
            None => policy,
        })
    }

    /// Returns the control file layout.
    pub fn control_layout(&self) -> Result<ControlFileLayout, ConfigError> {
        self.control.layout()
    }

    /// Returns the WAL directory: `wal.dir` if set, otherwise `pg_wal`
    /// (`pg_xlog` before 10) under the data directory.
    pub fn wal_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.wal.dir {
            return Some(dir.clone());
        }
        let data_dir = self.cluster.data_dir.as_ref()?;
        let name = match self.cluster.server_version {
            Some(v) if v < ServerVersion::new(100000) => "pg_xlog",
            _ => "pg_wal",
        };
        Some(data_dir.join(name))
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Cluster configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Data directory.
    pub data_dir: Option<PathBuf>,
    /// Server version, as `130004` or `"13.4"`.
    #[serde(with = "server_version_serde")]
    pub server_version: Option<ServerVersion>,
}

impl ClusterConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("PGMETA_DATA").or_else(|| lookup("PGDATA")) {
            self.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(version) = lookup("PGMETA_SERVER_VERSION") {
            if let Ok(parsed) = version.parse() {
                self.server_version = Some(parsed);
            }
        }
    }
}

/// WAL configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalConfig {
    /// WAL directory. Derived from the data directory when unset.
    pub dir: Option<PathBuf>,
    /// WAL segment size in megabytes.
    pub segment_size_mb: u32,
    /// WAL block size in bytes.
    pub block_size: u32,
    /// Page magic override for builds with a patched `XLOG_PAGE_MAGIC`.
    pub page_magic: Option<u16>,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            dir: None,
            segment_size_mb: 16,
            block_size: DEFAULT_XLOG_BLCKSZ,
            page_magic: None,
        }
    }
}

impl WalConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("PGMETA_WAL_DIR") {
            self.dir = Some(PathBuf::from(dir));
        }

        if let Some(size) = lookup("PGMETA_WAL_SEGMENT_SIZE_MB") {
            if let Ok(mb) = size.parse() {
                self.segment_size_mb = mb;
            }
        }

        if let Some(size) = lookup("PGMETA_WAL_BLOCK_SIZE") {
            if let Ok(bytes) = size.parse() {
                self.block_size = bytes;
            }
        }

        if let Some(magic) = lookup("PGMETA_WAL_PAGE_MAGIC") {
            let parsed = match magic.strip_prefix("0x").or_else(|| magic.strip_prefix("0X")) {
                Some(hex) => u16::from_str_radix(hex, 16).ok(),
                None => magic.parse().ok(),
            };
            if parsed.is_some() {
                self.page_magic = parsed;
            }
        }
    }

    /// Returns the validated segment size.
    pub fn segment_size(&self) -> Result<SegmentSize, ConfigError> {
        SegmentSize::from_mb(self.segment_size_mb)
            .map_err(|e| ConfigError::ValidationError(format!("wal.segment_size_mb: {}", e)))
    }

    /// Returns the validated block size.
    pub fn block_size(&self) -> Result<BlockSize, ConfigError> {
        BlockSize::new(self.block_size)
            .map_err(|e| ConfigError::ValidationError(format!("wal.block_size: {}", e)))
    }
}

/// Control file configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Expected `pg_control_version`.
    pub expected_version: u32,
    /// Byte offset of the CRC field.
    pub crc_offset: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            expected_version: DEFAULT_CONTROL_VERSION,
            crc_offset: DEFAULT_CRC_OFFSET,
        }
    }
}

impl ControlConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(version) = lookup("PGMETA_CONTROL_VERSION") {
            if let Ok(v) = version.parse() {
                self.expected_version = v;
            }
        }

        if let Some(offset) = lookup("PGMETA_CONTROL_CRC_OFFSET") {
            if let Ok(n) = offset.parse() {
                self.crc_offset = n;
            }
        }
    }

    pub fn layout(&self) -> Result<ControlFileLayout, ConfigError> {
        ControlFileLayout::new(self.expected_version, self.crc_offset)
            .map_err(|e| ConfigError::ValidationError(format!("control: {}", e)))
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(_, e) => Some(e),
            _ => None,
        }
    }
}

/// Server versions as strings in YAML, accepting bare numbers too.
mod server_version_serde {
    use pgmeta_format::ServerVersion;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u32),
        // Unquoted `13.4` arrives as a float.
        Float(f64),
        Text(String),
    }

    pub fn serialize<S>(version: &Option<ServerVersion>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match version {
            Some(v) => serializer.serialize_str(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<ServerVersion>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Num(n)) => parse(&n.to_string()),
            Some(Raw::Float(f)) => parse(&f.to_string()),
            Some(Raw::Text(s)) => parse(&s),
        }
    }

    fn parse<E: serde::de::Error>(s: &str) -> Result<Option<ServerVersion>, E> {
        s.parse().map(Some).map_err(E::custom)
    }
}
