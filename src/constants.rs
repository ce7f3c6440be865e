/// Snapshelf emoji prefix: Picture + Shelf + Lock
pub const EMOJI_PREFIX: &str = "🖼️📚🔒";

/// Application name
pub const APP_NAME: &str = "Snapshelf";

/// Default listen port
pub const DEFAULT_PORT: u16 = 6654;

/// Placeholder password used when none is configured
pub const DEFAULT_PASSWORD: &str = "changeme";

/// Default cap on a single upload request body (50 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Allow-listed image file extensions (compared lowercase, without the dot)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg"];

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "token";

/// Session cookie lifetime in seconds (24 hours)
pub const SESSION_MAX_AGE_SECS: u64 = 24 * 60 * 60;

/// Cache header for served image files
pub const IMAGE_CACHE_CONTROL: &str = "public, max-age=31536000";

/// Fallback content type for unknown extensions
pub const OCTET_STREAM: &str = "application/octet-stream";
