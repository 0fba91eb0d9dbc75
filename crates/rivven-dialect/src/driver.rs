//! Facts about the connected database product and its driver

use serde::{Deserialize, Serialize};
use std::fmt;

/// Product and driver information captured once per connection inspection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DriverInfo {
    /// Database product name
    pub product_name: Option<String>,
    /// Database product version
    pub product_version: Option<String>,
    /// Driver name
    pub driver_name: Option<String>,
    /// Driver API major version
    pub major_version: u32,
    /// Driver API minor version
    pub minor_version: u32,
}

impl DriverInfo {
    /// Whether the driver API version is at least `major.minor`
    pub fn jdbc_version_at_least(&self, major: u32, minor: u32) -> bool {
        self.major_version > major || (self.major_version == major && self.minor_version >= minor)
    }

    /// Product name
    pub fn product_name(&self) -> Option<&str> {
        self.product_name.as_deref()
    }

    /// Product version
    pub fn product_version(&self) -> Option<&str> {
        self.product_version.as_deref()
    }

    /// Driver name
    pub fn driver_name(&self) -> Option<&str> {
        self.driver_name.as_deref()
    }
}

impl fmt::Display for DriverInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.product_name {
            write!(f, "{} ", name)?;
        }
        if let Some(version) = &self.product_version {
            write!(f, "{} ", version)?;
        }
        if let Some(driver) = &self.driver_name {
            write!(f, "using {} ", driver)?;
        }
        write!(f, "{}.{}", self.major_version, self.minor_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(major: u32, minor: u32) -> DriverInfo {
        DriverInfo {
            product_name: Some("PostgreSQL".into()),
            product_version: Some("16.2".into()),
            driver_name: Some("tokio-postgres".into()),
            major_version: major,
            minor_version: minor,
        }
    }

    #[test]
    fn test_version_at_least() {
        let driver = info(4, 2);
        assert!(driver.jdbc_version_at_least(4, 2));
        assert!(driver.jdbc_version_at_least(4, 1));
        assert!(driver.jdbc_version_at_least(3, 9));
        assert!(!driver.jdbc_version_at_least(4, 3));
        assert!(!driver.jdbc_version_at_least(5, 0));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            info(4, 2).to_string(),
            "PostgreSQL 16.2 using tokio-postgres 4.2"
        );
        assert_eq!(DriverInfo::default().to_string(), "0.0");
    }
}
