//! Type-discriminated configuration blobs.
//!
//! Load strategies, set schemes and progression rules are stored as an open
//! JSON object carrying a `type` discriminator and a per-type `version`:
//!
//! ```json
//! {"type": "percent_of_max", "version": 1, "max_type": "training_max", "percent": 0.85}
//! ```
//!
//! Each family decodes blobs through its own `from_blob` factory, so adding a
//! variant never requires migrating stored data.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stored form of a polymorphic configuration value
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConfigBlob {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

fn default_version() -> u32 {
    1
}

impl ConfigBlob {
    /// Encode typed parameters under a discriminator
    pub fn encode<T: Serialize>(kind: &str, version: u32, params: &T) -> Result<Self> {
        let params = match serde_json::to_value(params)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(Error::InvalidConfig(format!(
                    "parameters for '{}' must be an object, got {}",
                    kind, other
                )))
            }
        };

        Ok(Self {
            kind: kind.to_string(),
            version,
            params,
        })
    }

    /// Decode the parameters into the struct for this blob's type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.params.clone())).map_err(|e| {
            Error::InvalidConfig(format!(
                "bad parameters for '{}' v{}: {}",
                self.kind, self.version, e
            ))
        })
    }

    /// Error for a discriminator/version pair no factory recognises
    pub fn unsupported(&self, family: &str) -> Error {
        Error::InvalidConfig(format!(
            "unsupported {} type '{}' version {}",
            family, self.kind, self.version
        ))
    }
}
