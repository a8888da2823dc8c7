//! Resource path helpers
//!
//! ARM identifies every resource by a hierarchical path of the form
//! `/subscriptions/{s}/resourceGroups/{g}/providers/{provider}/{type}/{name}`.
//! The same string is the PUT target, the polling target and the
//! rollback-ledger key.

/// Default api-version attached to every request whose path lacks one.
pub const API_VERSION: &str = "2024-05-01";

/// Append the default `api-version` query parameter unless the path already
/// carries one.
pub fn ensure_api_version(path: &str) -> String {
    if path.contains("api-version=") {
        path.to_string()
    } else if path.contains('?') {
        format!("{path}&api-version={API_VERSION}")
    } else {
        format!("{path}?api-version={API_VERSION}")
    }
}

/// Path of a resource group.
pub fn resource_group_path(subscription: &str, group: &str) -> String {
    format!("/subscriptions/{subscription}/resourceGroups/{group}")
}

/// Derive the virtual-network id from a subnet id by dropping the trailing
/// `/subnets/{name}` segments.
pub fn virtual_network_id_of_subnet(subnet_id: &str) -> String {
    let segments: Vec<&str> = subnet_id.split('/').collect();
    segments[..segments.len().saturating_sub(2)].join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_api_version_to_bare_path() {
        assert_eq!(
            ensure_api_version("/subscriptions/s1/resourceGroups"),
            format!("/subscriptions/s1/resourceGroups?api-version={API_VERSION}")
        );
    }

    #[test]
    fn appends_api_version_to_existing_query() {
        assert_eq!(
            ensure_api_version("/subscriptions/s1/resources?$top=5"),
            format!("/subscriptions/s1/resources?$top=5&api-version={API_VERSION}")
        );
    }

    #[test]
    fn keeps_caller_supplied_api_version() {
        let path = "/subscriptions/s1/providers/Microsoft.Compute/virtualMachines/vm1?api-version=2017-03-30";
        assert_eq!(ensure_api_version(path), path);
    }

    #[test]
    fn derives_virtual_network_id() {
        let subnet = "/subscriptions/s1/resourceGroups/g1/providers/Microsoft.Network/virtualNetworks/vnet1/subnets/default";
        assert_eq!(
            virtual_network_id_of_subnet(subnet),
            "/subscriptions/s1/resourceGroups/g1/providers/Microsoft.Network/virtualNetworks/vnet1"
        );
    }
}
