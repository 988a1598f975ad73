//! Custom validation functions for configuration.

use std::net::IpAddr;

use validator::ValidationError;

/// The bind address must be a literal IPv4 or IPv6 address.
pub fn validate_bind_address(address: &str) -> Result<(), ValidationError> {
    address
        .parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("invalid_bind_address"))
}

/// Directives are parsed by the subscriber at startup; here we only reject
/// a blank filter, which would silently disable all output.
pub fn validate_log_filter(filter: &str) -> Result<(), ValidationError> {
    if filter.trim().is_empty() {
        return Err(ValidationError::new("empty_log_filter"));
    }
    Ok(())
}
