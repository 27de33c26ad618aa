use std::sync::LazyLock;

use regex::Regex;

static CREDENTIALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z][A-Za-z0-9+.\-]*://)[^/\s:@]+:[^/\s@]+@")
        .expect("credentials pattern must compile")
});

/// Masks `scheme://user:pass@` credentials in tool output.
pub fn scrub_credentials(text: &str) -> String {
    CREDENTIALS
        .replace_all(text, "${1}<xxx>:<xxx>@")
        .into_owned()
}
