//! Server configuration.

/// Response compression settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionConfig {
    /// Whether responses may be compressed at all.
    pub enabled: bool,
    /// Bodies shorter than this are sent as is.
    pub min_size: usize,
    /// gzip level, 0-9.
    pub gzip_level: u32,
    /// zstd level, 1-22.
    pub zstd_level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_size: 0,
            gzip_level: 6,
            zstd_level: 3,
        }
    }
}

impl CompressionConfig {
    /// Compression switched off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Sets the minimum body size worth compressing.
    #[must_use]
    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    /// Sets the gzip level.
    #[must_use]
    pub fn with_gzip_level(mut self, level: u32) -> Self {
        self.gzip_level = level.min(9);
        self
    }

    /// Sets the zstd level.
    #[must_use]
    pub fn with_zstd_level(mut self, level: i32) -> Self {
        self.zstd_level = level.clamp(1, 22);
        self
    }
}

/// Configuration for the protocol front end.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Response compression.
    pub compression: CompressionConfig,
    /// Whether mutate responses list the uids assigned to blank nodes.
    pub expose_uids: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 4 * 1024 * 1024,
            compression: CompressionConfig::default(),
            expose_uids: true,
        }
    }
}

impl ServerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request body limit.
    #[must_use]
    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Sets the compression settings.
    #[must_use]
    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    /// Sets whether blank-node uids are reported.
    #[must_use]
    pub fn with_expose_uids(mut self, expose: bool) -> Self {
        self.expose_uids = expose;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_body_bytes, 4 * 1024 * 1024);
        assert!(config.compression.enabled);
        assert!(config.expose_uids);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_max_body_bytes(1024)
            .with_compression(
                CompressionConfig::default()
                    .with_min_size(64)
                    .with_gzip_level(42)
                    .with_zstd_level(0),
            )
            .with_expose_uids(false);

        assert_eq!(config.max_body_bytes, 1024);
        assert_eq!(config.compression.min_size, 64);
        assert_eq!(config.compression.gzip_level, 9);
        assert_eq!(config.compression.zstd_level, 1);
        assert!(!config.expose_uids);
        assert!(!CompressionConfig::disabled().enabled);
    }
}
