//! Database identities and their canonical table order.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tables of the northbound database, in the order they are monitored.
pub const NB_TABLES_ORDER: &[&str] = &[
    "NB_Global",
    "Logical_Switch",
    "Logical_Switch_Port",
    "Address_Set",
    "Port_Group",
    "Load_Balancer",
    "Load_Balancer_Health_Check",
    "ACL",
    "Logical_Router",
    "QoS",
    "Meter",
    "Meter_Band",
    "Logical_Router_Port",
    "Logical_Router_Static_Route",
    "Logical_Router_Policy",
    "NAT",
    "DHCP_Options",
    "Connection",
    "DNS",
    "SSL",
    "Gateway_Chassis",
    "HA_Chassis_Group",
    "HA_Chassis",
];

/// Tables of the southbound database, in the order they are monitored.
pub const SB_TABLES_ORDER: &[&str] = &[
    "SB_Global",
    "Chassis",
    "Chassis_Private",
    "Encap",
    "Address_Set",
    "Port_Group",
    "Logical_Flow",
    "Logical_DP_Group",
    "Multicast_Group",
    "Meter",
    "Meter_Band",
    "Datapath_Binding",
    "Port_Binding",
    "MAC_Binding",
    "DHCP_Options",
    "DHCPv6_Options",
    "Connection",
    "SSL",
    "DNS",
    "RBAC_Role",
    "RBAC_Permission",
    "Gateway_Chassis",
    "HA_Chassis",
    "HA_Chassis_Group",
    "Controller_Event",
    "IP_Multicast",
    "IGMP_Group",
    "Service_Monitor",
    "Load_Balancer",
];

/// One of the two logical databases a client can connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DatabaseId {
    /// `OVN_Northbound`, the desired logical network state.
    #[default]
    #[serde(rename = "OVN_Northbound")]
    Northbound,
    /// `OVN_Southbound`, the physical/runtime state.
    #[serde(rename = "OVN_Southbound")]
    Southbound,
}

impl DatabaseId {
    /// Returns the database name as advertised by the store.
    pub fn name(&self) -> &'static str {
        match self {
            DatabaseId::Northbound => "OVN_Northbound",
            DatabaseId::Southbound => "OVN_Southbound",
        }
    }

    /// Returns the canonical ordered table list for this database.
    pub fn canonical_tables(&self) -> &'static [&'static str] {
        match self {
            DatabaseId::Northbound => NB_TABLES_ORDER,
            DatabaseId::Southbound => SB_TABLES_ORDER,
        }
    }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatabaseId {
    type Err = ProtocolError;

    /// Parses a database name. An empty name selects the northbound database.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "OVN_Northbound" | "nb" | "northbound" => Ok(DatabaseId::Northbound),
            "OVN_Southbound" | "sb" | "southbound" => Ok(DatabaseId::Southbound),
            other => Err(ProtocolError::UnknownDatabase(other.to_string())),
        }
    }
}
