//! Raw configuration records produced by the parser.
//!
//! Nothing here is validated beyond syntax: packet kinds, element directions and
//! type names are kept as written. [`crate::schema::Device::load`] turns a
//! [`DeviceConfig`] into a validated model.

/// One parsed configuration file: any number of devices and common-packet families.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub devices: Vec<DeviceConfig>,
    pub common: Vec<CommonSection>,
}

/// Packets shared by every device of one category.
#[derive(Debug, Clone)]
pub struct CommonSection {
    pub category: String,
    pub packets: Vec<PacketConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceName {
    /// `PiezoSpeaker`
    pub display: String,
    /// `piezo_speaker`
    pub wire: String,
    /// `Piezo Speaker`, also the name stored in the firmware.
    pub human: String,
}

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub name: DeviceName,
    pub category: String,
    pub device_identifier: u16,
    pub version: (u8, u8, u8),
    pub description: Option<String>,
    pub released: bool,
    pub packets: Vec<PacketConfig>,
    pub constant_groups: Vec<ConstantGroupConfig>,
    /// Set once the category's common packets have been appended.
    pub common_included: bool,
}

impl DeviceConfig {
    /// Append `common` to this device's packets unless that already happened.
    /// Returns whether packets were added.
    pub fn include_common(&mut self, common: &[PacketConfig]) -> bool {
        if self.common_included {
            return false;
        }
        self.packets.extend(common.iter().cloned());
        self.common_included = true;
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PacketConfig {
    /// `function` or `callback` once validated.
    pub kind: String,
    pub display_name: String,
    pub wire_name: String,
    pub function_id: Option<u64>,
    pub response_expected: Option<bool>,
    /// Opaque documentation payload.
    pub doc: Option<String>,
    pub elements: Vec<ElementConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementConfig {
    pub name: String,
    pub type_name: String,
    pub cardinality: u64,
    /// `in` or `out` once validated.
    pub direction: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantGroupConfig {
    pub name: String,
    pub type_name: String,
    pub items: Vec<(String, Literal)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Bool(bool),
    Char(char),
    String(String),
}

impl Literal {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Literal::Int(i) => (*i).try_into().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Bool(b) => Some(*b),
            _ => None,
        }
    }
}
