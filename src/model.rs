//! Records exchanged with the clustering API
//!
//! Field names follow the API's snake_case wire format, so the structs
//! deserialize straight out of expansion responses.

use serde::{Deserialize, Deserializer, Serialize};

/// Opaque identifier of a cluster node
pub type ClusterKey = String;

/// A single point of interest; the terminal unit of the traversal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafEntity {
    /// Unique key, also used to address the detail document
    pub key: String,

    /// Key of the cluster this leaf was reported under
    pub cluster_key: String,

    pub latitude: f64,
    pub longitude: f64,
}

/// An unexpanded subtree of the spatial hierarchy
///
/// Only the key is needed to expand a cluster further. The rest is kept
/// when the API sends it and is `None` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterNode {
    pub cluster_key: ClusterKey,

    /// Number of leaves the API reports below this node
    #[serde(default)]
    pub count: Option<u64>,

    /// Centroid
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,

    /// Bounding box
    #[serde(default)]
    pub min_latitude: Option<f64>,
    #[serde(default)]
    pub max_latitude: Option<f64>,
    #[serde(default)]
    pub min_longitude: Option<f64>,
    #[serde(default)]
    pub max_longitude: Option<f64>,
}

/// A leaf's detail document, kept as the raw JSON the API returned
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailDocument {
    /// Key of the leaf this document was fetched for
    pub leaf_key: String,

    pub body: serde_json::Value,
}

/// One entry of the proxy pool
///
/// The port is kept as written in the configuration so a malformed entry can be
/// detected (and, depending on the proxy policy, tolerated) instead of failing
/// the whole config parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyDescriptor {
    pub host: String,

    #[serde(deserialize_with = "deserialize_port")]
    pub port: String,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyDescriptor {
    /// Creates a descriptor without credentials
    pub fn new(host: impl Into<String>, port: impl ToString) -> Self {
        Self {
            host: host.into(),
            port: port.to_string(),
            user: None,
            password: None,
        }
    }

    /// Adds basic-auth credentials
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Returns the port as a number, if it is a valid non-zero TCP port
    pub fn port_number(&self) -> Option<u16> {
        self.port.trim().parse::<u16>().ok().filter(|port| *port != 0)
    }

    /// A descriptor is usable iff the host is non-empty and the port is valid
    pub fn is_usable(&self) -> bool {
        !self.host.trim().is_empty() && self.port_number().is_some()
    }

    /// Credentials, only when both user and password are non-empty
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.user.as_deref(), self.password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some((user, password))
            }
            _ => None,
        }
    }

    /// The proxy address in `http://host:port` form
    pub fn proxy_url(&self) -> String {
        format!("http://{}:{}", self.host.trim(), self.port.trim())
    }
}

impl std::fmt::Display for ProxyDescriptor {
    // Credentials are never printed.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPort {
    Number(i64),
    Text(String),
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawPort::deserialize(deserializer)? {
        RawPort::Number(port) => port.to_string(),
        RawPort::Text(port) => port,
    })
}
