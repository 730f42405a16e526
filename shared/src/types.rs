use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

/// TXT record attributes. `None` marks a boolean attribute (a key without `=`).
pub type Attributes = BTreeMap<String, Option<Vec<u8>>>;

/// A DNS-SD service instance, either discovered on the network or published locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Service type, e.g. "_http._tcp.local."
    pub service_type: String,

    /// Instance name, e.g. "fileserver"
    pub name: String,

    /// Hostname of the providing device, e.g. "nas.local."
    pub hostname: String,

    /// Service port
    pub port: u16,

    /// TXT record key-value pairs
    pub attributes: Attributes,
}

impl Service {
    /// Full DNS-SD instance name, e.g. "fileserver._http._tcp.local."
    pub fn fqdn(&self) -> String {
        format!("{}.{}", self.name, self.service_type)
    }

    /// Value of a TXT attribute, if present and valid UTF-8
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)?
            .as_deref()
            .and_then(|value| std::str::from_utf8(value).ok())
    }
}
