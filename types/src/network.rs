//! Network identifier.

use serde::{Deserialize, Serialize};

/// Which federation a node belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    /// The production federation.
    Main,
    /// The public test federation.
    Test,
    /// A single-machine federation used for development.
    Local,
    /// A private federation identified by a 4-byte magic.
    Custom([u8; 4]),
}

impl NetworkId {
    /// Magic number carried in peer handshakes.
    pub fn magic(&self) -> u32 {
        match self {
            Self::Main => 0xFA92_E5A2,
            Self::Test => 0xFA92_E5A3,
            Self::Local => 0xFA92_E5A4,
            Self::Custom(bytes) => u32::from_be_bytes(*bytes),
        }
    }

    /// Small ordinal reported by status endpoints.
    pub fn number(&self) -> u8 {
        match self {
            Self::Main => 0,
            Self::Test => 1,
            Self::Local => 2,
            Self::Custom(_) => 3,
        }
    }

    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Test => "test",
            Self::Local => "local",
            Self::Custom(_) => "custom",
        }
    }

    /// Parse a CLI/config name. Custom networks need an explicit magic.
    pub fn parse(name: &str, custom_magic: Option<[u8; 4]>) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "main" => Some(Self::Main),
            "test" => Some(Self::Test),
            "local" => Some(Self::Local),
            "custom" => custom_magic.map(Self::Custom),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_requires_magic() {
        assert_eq!(NetworkId::parse("custom", None), None);
        let net = NetworkId::parse("CUSTOM", Some([1, 2, 3, 4])).unwrap();
        assert_eq!(net.magic(), 0x0102_0304);
        assert_eq!(NetworkId::parse("Local", None), Some(NetworkId::Local));
        assert_eq!(NetworkId::parse("mesh", None), None);
    }
}
