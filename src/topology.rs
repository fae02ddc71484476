use crate::collaborators::{AddressDiscovery, TopologyMap};
use crate::error::RmError;
use crate::relation::Role;

/// Role name this node installs as and advertises under.
pub const SELF_ROLE: &str = "resourcemanager";

/// Combines the discovered local address with the upstream address.
/// Nothing is cached; the upstream may move between passes.
pub struct TopologyResolver<'a> {
    discovery: &'a dyn AddressDiscovery,
}

impl<'a> TopologyResolver<'a> {
    pub fn new(discovery: &'a dyn AddressDiscovery) -> Self {
        Self { discovery }
    }

    pub fn self_address(&self) -> Result<String, RmError> {
        let address = self.discovery.discover_self_address()?;
        let address = address.trim();
        if address.is_empty() {
            return Err(RmError::Resolution {
                message: "address discovery returned nothing".into(),
            });
        }
        Ok(address.to_string())
    }

    pub fn build_topology(&self, upstream_address: &str) -> Result<TopologyMap, RmError> {
        let own = self.self_address()?;
        Ok(TopologyMap::from([
            (Role::Upstream.name().to_string(), upstream_address.to_string()),
            (SELF_ROLE.to_string(), own),
        ]))
    }
}
