//! Utility functions for value normalization and conversion

/// Strip an enum type prefix (e.g., "InstanceTenancy.dedicated" -> "dedicated")
pub fn enum_variant(s: &str) -> String {
    s.split('.').next_back().unwrap_or(s).to_string()
}

/// Normalize region value (e.g., "ap_northeast_1" -> "ap-northeast-1")
pub fn normalize_region(s: &str) -> String {
    enum_variant(s).replace('_', "-")
}

/// Normalize availability zone value (e.g., "ap_northeast_1a" -> "ap-northeast-1a")
pub fn normalize_availability_zone(s: &str) -> String {
    enum_variant(s).replace('_', "-")
}
