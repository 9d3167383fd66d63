//! Catalogue of container-scoped resource types.
//!
//! A [`ResourceType`] is all the reconciler knows about a resource: its name,
//! its collection path and which list fields are order-sensitive. Field
//! schemas are left to the API.

use crate::desired::DesiredSpec;
use crate::error::Result;
use serde_json::Value;
use std::fmt;

/// Descriptor of one resource collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceType {
    /// Short identifier, e.g. `address`.
    pub name: &'static str,
    /// Collection path under the API base, e.g. `/config/objects/v1/addresses`.
    pub path: &'static str,
    /// List fields whose order is significant.
    pub ordered_fields: &'static [&'static str],
}

impl ResourceType {
    /// Descriptor with only unordered list fields.
    #[must_use]
    pub const fn new(name: &'static str, path: &'static str) -> Self {
        Self {
            name,
            path,
            ordered_fields: &[],
        }
    }

    /// Descriptor with the given order-sensitive list fields.
    #[must_use]
    pub const fn with_ordered(
        name: &'static str,
        path: &'static str,
        ordered_fields: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            path,
            ordered_fields,
        }
    }

    /// Whether a list field is compared in order.
    #[must_use]
    pub fn is_ordered(&self, field: &str) -> bool {
        self.ordered_fields.contains(&field)
    }

    /// Build a [`DesiredSpec`] from JSON using this type's ordered fields.
    pub fn desired_from_json(&self, value: &Value) -> Result<DesiredSpec> {
        DesiredSpec::from_json(value, self.ordered_fields)
    }

    /// Every catalogued type.
    #[must_use]
    pub fn all() -> &'static [ResourceType] {
        CATALOGUE
    }

    /// Look up a catalogued type by name; `-` and `_` are interchangeable.
    #[must_use]
    pub fn lookup(name: &str) -> Option<ResourceType> {
        let wanted = name.trim().replace('-', "_").to_ascii_lowercase();
        CATALOGUE.iter().copied().find(|t| t.name == wanted)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// =============================================================================
// Objects
// =============================================================================

/// Address objects.
pub const ADDRESS: ResourceType = ResourceType::new("address", "/config/objects/v1/addresses");
/// Static and dynamic address groups.
pub const ADDRESS_GROUP: ResourceType =
    ResourceType::new("address_group", "/config/objects/v1/address-groups");
/// Custom applications.
pub const APPLICATION: ResourceType =
    ResourceType::new("application", "/config/objects/v1/applications");
/// Application filters.
pub const APPLICATION_FILTER: ResourceType =
    ResourceType::new("application_filter", "/config/objects/v1/application-filters");
/// Application groups.
pub const APPLICATION_GROUP: ResourceType =
    ResourceType::new("application_group", "/config/objects/v1/application-groups");
/// Service objects.
pub const SERVICE: ResourceType = ResourceType::new("service", "/config/objects/v1/services");
/// Service groups.
pub const SERVICE_GROUP: ResourceType =
    ResourceType::new("service_group", "/config/objects/v1/service-groups");
/// Tags.
pub const TAG: ResourceType = ResourceType::new("tag", "/config/objects/v1/tags");
/// Schedules.
pub const SCHEDULE: ResourceType = ResourceType::new("schedule", "/config/objects/v1/schedules");
/// HIP objects.
pub const HIP_OBJECT: ResourceType =
    ResourceType::new("hip_object", "/config/objects/v1/hip-objects");
/// HIP profiles.
pub const HIP_PROFILE: ResourceType =
    ResourceType::new("hip_profile", "/config/objects/v1/hip-profiles");
/// External dynamic lists.
pub const EXTERNAL_DYNAMIC_LIST: ResourceType = ResourceType::new(
    "external_dynamic_list",
    "/config/objects/v1/external-dynamic-lists",
);
/// Dynamic user groups.
pub const DYNAMIC_USER_GROUP: ResourceType =
    ResourceType::new("dynamic_user_group", "/config/objects/v1/dynamic-user-groups");
/// Log forwarding profiles.
pub const LOG_FORWARDING_PROFILE: ResourceType = ResourceType::new(
    "log_forwarding_profile",
    "/config/objects/v1/log-forwarding-profiles",
);
/// Regions.
pub const REGION: ResourceType = ResourceType::new("region", "/config/objects/v1/regions");

// =============================================================================
// Security
// =============================================================================

/// Security rules.
pub const SECURITY_RULE: ResourceType =
    ResourceType::new("security_rule", "/config/security/v1/security-rules");
/// Anti-spyware profiles.
pub const ANTI_SPYWARE_PROFILE: ResourceType = ResourceType::new(
    "anti_spyware_profile",
    "/config/security/v1/anti-spyware-profiles",
);
/// Vulnerability protection profiles.
pub const VULNERABILITY_PROTECTION_PROFILE: ResourceType = ResourceType::new(
    "vulnerability_protection_profile",
    "/config/security/v1/vulnerability-protection-profiles",
);
/// WildFire antivirus profiles.
pub const WILDFIRE_ANTIVIRUS_PROFILE: ResourceType = ResourceType::new(
    "wildfire_antivirus_profile",
    "/config/security/v1/wildfire-anti-virus-profiles",
);
/// DNS security profiles.
pub const DNS_SECURITY_PROFILE: ResourceType = ResourceType::new(
    "dns_security_profile",
    "/config/security/v1/dns-security-profiles",
);
/// Decryption profiles.
pub const DECRYPTION_PROFILE: ResourceType =
    ResourceType::new("decryption_profile", "/config/security/v1/decryption-profiles");
/// Custom URL categories.
pub const URL_CATEGORY: ResourceType =
    ResourceType::new("url_category", "/config/security/v1/url-categories");
/// URL access profiles.
pub const URL_ACCESS_PROFILE: ResourceType =
    ResourceType::new("url_access_profile", "/config/security/v1/url-access-profiles");
/// Security profile groups.
pub const PROFILE_GROUP: ResourceType =
    ResourceType::new("profile_group", "/config/security/v1/profile-groups");

// =============================================================================
// Network
// =============================================================================

/// NAT rules.
pub const NAT_RULE: ResourceType = ResourceType::new("nat_rule", "/config/network/v1/nat-rules");
/// Security zones.
pub const ZONE: ResourceType = ResourceType::new("zone", "/config/network/v1/zones");
/// IKE crypto profiles; proposal lists are ordered.
pub const IKE_CRYPTO_PROFILE: ResourceType = ResourceType::with_ordered(
    "ike_crypto_profile",
    "/config/network/v1/ike-crypto-profiles",
    &["encryption", "hash", "dh_group"],
);
/// IPsec crypto profiles; proposal lists are ordered.
pub const IPSEC_CRYPTO_PROFILE: ResourceType = ResourceType::with_ordered(
    "ipsec_crypto_profile",
    "/config/network/v1/ipsec-crypto-profiles",
    &["encryption", "authentication", "dh_group"],
);
/// IKE gateways.
pub const IKE_GATEWAY: ResourceType =
    ResourceType::new("ike_gateway", "/config/network/v1/ike-gateways");
/// IPsec tunnels.
pub const IPSEC_TUNNEL: ResourceType =
    ResourceType::new("ipsec_tunnel", "/config/network/v1/ipsec-tunnels");

const CATALOGUE: &[ResourceType] = &[
    ADDRESS,
    ADDRESS_GROUP,
    APPLICATION,
    APPLICATION_FILTER,
    APPLICATION_GROUP,
    SERVICE,
    SERVICE_GROUP,
    TAG,
    SCHEDULE,
    HIP_OBJECT,
    HIP_PROFILE,
    EXTERNAL_DYNAMIC_LIST,
    DYNAMIC_USER_GROUP,
    LOG_FORWARDING_PROFILE,
    REGION,
    SECURITY_RULE,
    ANTI_SPYWARE_PROFILE,
    VULNERABILITY_PROTECTION_PROFILE,
    WILDFIRE_ANTIVIRUS_PROFILE,
    DNS_SECURITY_PROFILE,
    DECRYPTION_PROFILE,
    URL_CATEGORY,
    URL_ACCESS_PROFILE,
    PROFILE_GROUP,
    NAT_RULE,
    ZONE,
    IKE_CRYPTO_PROFILE,
    IPSEC_CRYPTO_PROFILE,
    IKE_GATEWAY,
    IPSEC_TUNNEL,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desired::FieldValue;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_lookup() {
        assert_eq!(ResourceType::lookup("address"), Some(ADDRESS));
        assert_eq!(ResourceType::lookup("Address-Group"), Some(ADDRESS_GROUP));
        assert_eq!(ResourceType::lookup("nope"), None);
    }

    #[test]
    fn test_catalogue_names_and_paths_unique() {
        let names: HashSet<_> = ResourceType::all().iter().map(|t| t.name).collect();
        let paths: HashSet<_> = ResourceType::all().iter().map(|t| t.path).collect();
        assert_eq!(names.len(), ResourceType::all().len());
        assert_eq!(paths.len(), ResourceType::all().len());
        assert!(ResourceType::all().iter().all(|t| t.path.starts_with("/config/")));
    }

    #[test]
    fn test_crypto_proposals_are_ordered() {
        assert!(IKE_CRYPTO_PROFILE.is_ordered("encryption"));
        assert!(!ADDRESS.is_ordered("tag"));

        let spec = IPSEC_CRYPTO_PROFILE
            .desired_from_json(&json!({
                "esp": {"encryption": ["aes-256-gcm", "aes-128-gcm"]},
                "tag": ["vpn"]
            }))
            .unwrap();
        match spec.get("esp") {
            FieldValue::Object(esp) => {
                assert!(matches!(esp.get("encryption"), FieldValue::Ordered(_)));
            }
            other => panic!("unexpected field: {other:?}"),
        }
        assert!(matches!(spec.get("tag"), FieldValue::Set(_)));
    }
}
