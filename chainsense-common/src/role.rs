//! Deployment role configuration
//!
//! The same controller firmware is deployed in front of different peripheral node boards. The
//! boards differ in how many sensor channels they wire up, which determines the mask applied to
//! every node once discovery has completed.
//!
//! With the `std` feature a [`RoleConfig`] can also be loaded from a TOML document:
//!
//! ```toml
//! # One of "arduino-uno", "arduino-micro", "pro-trinket", "test"
//! peripheral = "arduino-uno"
//! # Optional overrides
//! default_mask = 0x0F
//! bus_address = 9
//! max_nodes = 8
//! ```

use crate::constants::{HOST_BUS_ADDR, MAX_NODES};

/// The type of board fitted as peripheral nodes on the chain
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(serde::Deserialize))]
#[cfg_attr(feature = "std", serde(rename_all = "kebab-case"))]
pub enum PeripheralKind {
    /// Arduino Uno nodes, 6 channels
    ArduinoUno,
    /// Arduino Micro nodes, using the first 8 of 12 channels
    ArduinoMicro,
    /// Pro Trinket nodes, 8 channels
    ProTrinket,
    /// Bench test nodes, 2 channels
    #[default]
    Test,
}

impl PeripheralKind {
    /// The sampling mask enabling every wired channel of this board
    pub const fn default_mask(self) -> u8 {
        match self {
            PeripheralKind::ArduinoUno => 0x3F,
            PeripheralKind::ArduinoMicro => 0xFF,
            PeripheralKind::ProTrinket => 0xFF,
            PeripheralKind::Test => 0x03,
        }
    }
}

/// Role specific constants for a controller deployment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RoleConfig {
    /// Mask applied to every node after discovery
    pub default_mask: u8,
    /// Address of the controller on the host bus
    ///
    /// Applied by the host bus driver when it configures its peripheral.
    pub bus_address: u8,
    /// Largest node count discovery will accept before faulting
    pub max_nodes: u8,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self::for_peripheral(PeripheralKind::default())
    }
}

impl RoleConfig {
    /// Create the default configuration for a chain of `kind` nodes
    pub const fn for_peripheral(kind: PeripheralKind) -> Self {
        Self {
            default_mask: kind.default_mask(),
            bus_address: HOST_BUS_ADDR,
            max_nodes: MAX_NODES as u8,
        }
    }

    /// Set the post-discovery mask
    pub const fn with_default_mask(mut self, mask: u8) -> Self {
        self.default_mask = mask;
        self
    }

    /// Set the host bus address
    pub const fn with_bus_address(mut self, addr: u8) -> Self {
        self.bus_address = addr;
        self
    }

    /// Set the node ceiling
    ///
    /// The value is clamped to `1..=MAX_NODES`.
    pub const fn with_max_nodes(mut self, max_nodes: u8) -> Self {
        self.max_nodes = if max_nodes == 0 {
            1
        } else if max_nodes as usize > MAX_NODES {
            MAX_NODES as u8
        } else {
            max_nodes
        };
        self
    }

    /// The node ceiling as a usize, clamped to `1..=MAX_NODES`
    pub const fn node_limit(&self) -> usize {
        let limit = self.max_nodes as usize;
        if limit == 0 {
            1
        } else if limit > MAX_NODES {
            MAX_NODES
        } else {
            limit
        }
    }
}

#[cfg(feature = "std")]
pub use load::{ConfigError, RoleConfigFile};

#[cfg(feature = "std")]
mod load {
    use serde::Deserialize;
    use snafu::{ResultExt, Snafu};

    use super::{PeripheralKind, RoleConfig};
    use crate::constants::MAX_NODES;

    /// Error returned when loading a [`RoleConfig`] from TOML
    #[derive(Debug, Snafu)]
    pub enum ConfigError {
        /// The document is not valid TOML, or does not match the expected schema
        #[snafu(display("Failed to parse role config: {source}"))]
        Parse {
            /// The underlying parse error
            source: toml::de::Error,
        },
        /// The configured node ceiling cannot be supported
        #[snafu(display("max_nodes must be between 1 and {}, got {max_nodes}", MAX_NODES))]
        InvalidMaxNodes {
            /// The rejected value
            max_nodes: u8,
        },
        /// Failed reading the config file
        #[snafu(display("Failed to read {path}: {source}"))]
        Io {
            /// The path which was read
            path: String,
            /// The underlying IO error
            source: std::io::Error,
        },
    }

    /// The on-disk representation of a [`RoleConfig`]
    #[derive(Clone, Debug, Default, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct RoleConfigFile {
        /// Peripheral board type, selecting the default mask
        #[serde(default)]
        pub peripheral: PeripheralKind,
        /// Explicit mask, overriding the peripheral's default
        pub default_mask: Option<u8>,
        /// Host bus address
        pub bus_address: Option<u8>,
        /// Node ceiling
        pub max_nodes: Option<u8>,
    }

    impl RoleConfigFile {
        /// Resolve the file into a [`RoleConfig`], validating values
        pub fn resolve(&self) -> Result<RoleConfig, ConfigError> {
            let mut config = RoleConfig::for_peripheral(self.peripheral);
            if let Some(mask) = self.default_mask {
                config = config.with_default_mask(mask);
            }
            if let Some(addr) = self.bus_address {
                config = config.with_bus_address(addr);
            }
            if let Some(max_nodes) = self.max_nodes {
                if max_nodes == 0 || max_nodes as usize > MAX_NODES {
                    return InvalidMaxNodesSnafu { max_nodes }.fail();
                }
                config = config.with_max_nodes(max_nodes);
            }
            Ok(config)
        }
    }

    impl RoleConfig {
        /// Load a config from a TOML string
        pub fn load_from_str(s: &str) -> Result<Self, ConfigError> {
            let file: RoleConfigFile = toml::from_str(s).context(ParseSnafu)?;
            file.resolve()
        }

        /// Load a config from a TOML file
        pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
            let path = path.as_ref();
            let s = std::fs::read_to_string(path).context(IoSnafu {
                path: path.display().to_string(),
            })?;
            Self::load_from_str(&s)
        }
    }
}
