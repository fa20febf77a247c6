use std::path::Path;

/// Load environment variables from .env files with proper precedence
///
/// Precedence (later entries override earlier):
/// 1. .env (base defaults)
/// 2. .env.local (local overrides, not committed)
/// 3. .env.testing (test-suite settings)
/// 4. .env.testing.local (test-suite local overrides)
/// 5. Actual system environment variables (highest priority)
pub fn load_dotenv(project_root: &Path) {
    // dotenvy never overwrites a variable that is already set, so the most
    // specific file is loaded first
    let _ = dotenvy::from_path(project_root.join(".env.testing.local"));
    let _ = dotenvy::from_path(project_root.join(".env.testing"));
    let _ = dotenvy::from_path(project_root.join(".env.local"));
    let _ = dotenvy::from_path(project_root.join(".env"));
}

/// Get an environment variable with a default value
///
/// Unset or unparsable values fall back to `default`.
///
/// # Example
/// ```
/// use ephemeral_pg::config::env;
///
/// let secs: u64 = env("EPHEMERAL_CLEANUP_TIMEOUT_SECS", 15);
/// ```
pub fn env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Get an optional environment variable
///
/// # Example
/// ```
/// use ephemeral_pg::config::env_optional;
///
/// let url: Option<String> = env_optional("TEST_DATABASE_URL");
/// ```
pub fn env_optional<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse().ok())
}
