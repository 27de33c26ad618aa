use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/simple/";

/// pip configuration files, most specific first.
pub const PIP_CONF_FILES: [&str; 3] = ["~/.config/pip/pip.conf", "~/.pip/pip.conf", "/etc/pip.conf"];

pub const NETRC_FILE: &str = "~/.netrc";

static EMBEDDED_AUTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"//([^:/@]+)(?::([^@/]+))?@").expect("auth pattern must compile")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexAuth {
    pub username: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub url: String,
    pub auth: Option<IndexAuth>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_INDEX_URL.to_string(),
            auth: None,
        }
    }
}

impl IndexConfig {
    /// Splits `user[:pass]@` out of `url` and normalises the trailing slash.
    pub fn from_url(url: &str) -> Self {
        let url = url.trim();
        let auth = EMBEDDED_AUTH.captures(url).and_then(|captures| {
            let username = captures.get(1)?.as_str().to_string();
            let password = captures.get(2).map(|m| m.as_str().to_string());
            Some(IndexAuth { username, password })
        });
        let mut url = EMBEDDED_AUTH.replace(url, "//").into_owned();
        if !url.ends_with('/') {
            url.push('/');
        }
        Self { url, auth }
    }

    /// The URL with credentials embedded again, as pip expects it on
    /// `--index-url`.
    pub fn authenticated_url(&self) -> String {
        let Some(auth) = &self.auth else {
            return self.url.clone();
        };
        let userinfo = match &auth.password {
            Some(password) => format!("{}:{password}@", auth.username),
            None => format!("{}@", auth.username),
        };
        match self.url.split_once("://") {
            Some((scheme, rest)) => format!("{scheme}://{userinfo}{rest}"),
            None => format!("{userinfo}{}", self.url),
        }
    }

    fn needs_password(&self) -> bool {
        self.auth
            .as_ref()
            .map_or(true, |auth| auth.password.is_none())
    }
}

/// Works out which index to query and with what credentials.
///
/// An explicitly configured URL wins; otherwise the first pip.conf with a
/// `[global] index-url` is used. Missing credentials are then looked up in
/// netrc by host. Without any configuration the public index is used.
pub fn discover_index(home: Option<&Path>, configured_url: Option<&str>) -> IndexConfig {
    let mut config = configured_url.map(IndexConfig::from_url).or_else(|| {
        PIP_CONF_FILES.iter().find_map(|candidate| {
            let path = expand_home(candidate, home)?;
            let raw = read_optional(&path)?;
            let found = parse_pip_conf_index(&raw);
            if found.is_some() {
                debug!("using index-url from {}", path.display());
            }
            found
        })
    });

    if let Some(found) = config.as_mut() {
        if found.needs_password() {
            let netrc = expand_home(NETRC_FILE, home)
                .and_then(|path| read_optional(&path))
                .and_then(|raw| parse_netrc_credentials(&raw, &found.url));
            if let Some(auth) = netrc {
                debug!("using netrc credentials for {}", found.url);
                found.auth = Some(auth);
            }
        }
    }

    config.unwrap_or_default()
}

/// `index-url` from the `[global]` section of a pip.conf.
pub fn parse_pip_conf_index(raw: &str) -> Option<IndexConfig> {
    let mut section = String::new();
    for line in raw.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            section = name.trim().to_ascii_lowercase();
            continue;
        }
        if section != "global" {
            continue;
        }
        let Some((key, value)) = line.split_once(['=', ':']) else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase().replace('_', "-");
        if key == "index-url" && !value.trim().is_empty() {
            return Some(IndexConfig::from_url(value));
        }
    }
    None
}

/// Login and password for the first netrc machine that is a substring of
/// `index_url`. Accepts both the one-line and the multi-line layouts.
pub fn parse_netrc_credentials(raw: &str, index_url: &str) -> Option<IndexAuth> {
    #[derive(Default)]
    struct Entry {
        machine: Option<String>,
        login: Option<String>,
        password: Option<String>,
    }

    let mut entries: Vec<Entry> = Vec::new();
    let mut tokens = raw.split_whitespace();
    while let Some(token) = tokens.next() {
        match token {
            "machine" => entries.push(Entry {
                machine: tokens.next().map(str::to_string),
                ..Entry::default()
            }),
            "default" => entries.push(Entry::default()),
            "login" | "password" | "account" => {
                let value = tokens.next().map(str::to_string);
                let Some(entry) = entries.last_mut() else {
                    continue;
                };
                match token {
                    "login" => entry.login = value,
                    "password" => entry.password = value,
                    _ => {}
                }
            }
            _ => {}
        }
    }

    entries.into_iter().find_map(|entry| {
        let machine = entry.machine?;
        if machine.is_empty() || !index_url.contains(&machine) {
            return None;
        }
        Some(IndexAuth {
            username: entry.login.unwrap_or_default(),
            password: Some(entry.password?),
        })
    })
}

fn expand_home(path: &str, home: Option<&Path>) -> Option<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => home.map(|home| home.join(rest)),
        None => Some(PathBuf::from(path)),
    }
}

fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(raw) => Some(raw),
        Err(err) => {
            if path.exists() {
                debug!("could not read {}: {err}", path.display());
            }
            None
        }
    }
}
