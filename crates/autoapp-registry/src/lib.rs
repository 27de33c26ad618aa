mod credentials;
mod http_index;

pub use credentials::{
    discover_index, parse_netrc_credentials, parse_pip_conf_index, IndexAuth, IndexConfig,
    DEFAULT_INDEX_URL, NETRC_FILE, PIP_CONF_FILES,
};
pub use http_index::{HttpIndex, PackageIndex, REQUEST_TIMEOUT};

#[cfg(test)]
mod tests;
