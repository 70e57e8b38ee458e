// =============================================================================
// Application Identity
// =============================================================================

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "dataplane";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".dataplane";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "dataplane.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "DATAPLANE_CONFIG";

// =============================================================================
// Environment Variables
// =============================================================================

/// Environment variable for debug mode
pub const ENV_DEBUG: &str = "DATAPLANE_DEBUG";

/// Environment variable for server host
pub const ENV_HOST: &str = "DATAPLANE_HOST";

/// Environment variable for server port
pub const ENV_PORT: &str = "DATAPLANE_PORT";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "DATAPLANE_LOG";

/// Environment variable for the table directory
pub const ENV_TABLES_DIR: &str = "DATAPLANE_TABLES_DIR";

/// Environment variable for the remote table request timeout
pub const ENV_REMOTE_TIMEOUT_SECS: &str = "DATAPLANE_REMOTE_TIMEOUT_SECS";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 8080;

/// Directories scanned for table files when none are configured
pub const DEFAULT_TABLE_DIRS: &[&str] = &["tables", "data_plane/tables"];

/// Request body limit (filter specs are small)
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

// =============================================================================
// Table Files
// =============================================================================

/// Extension of table spec files
pub const TABLE_SPEC_EXTENSION: &str = "json";

/// Extension of CSV table files
pub const CSV_TABLE_EXTENSION: &str = "csv";
