//! Static lookup from logical service tags to their GATT UUIDs.

use std::fmt;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::core::bluetooth::{
    TEST_SERVICE_TAG, UUID_NOTIFY_CHAR, UUID_READABLE_CHAR, UUID_TEST_SERVICE, UUID_WRITABLE_CHAR,
};

/// Logical name of a service in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceTag(String);

impl ServiceTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The built-in test service
    pub fn test() -> Self {
        Self::new(TEST_SERVICE_TAG)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub tag: ServiceTag,
    pub uuid: Uuid,
    /// Characteristics of interest, in declaration order
    pub characteristics: Vec<Uuid>,
}

/// Immutable catalog of the services the client knows about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCatalog {
    entries: Vec<ServiceEntry>,
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self {
            entries: vec![ServiceEntry {
                tag: ServiceTag::test(),
                uuid: UUID_TEST_SERVICE,
                characteristics: vec![UUID_READABLE_CHAR, UUID_WRITABLE_CHAR, UUID_NOTIFY_CHAR],
            }],
        }
    }
}

impl ServiceCatalog {
    /// Builds the catalog from configuration, rejecting duplicate tags.
    pub fn from_config(services: &[ServiceConfig]) -> Result<Self> {
        let mut entries: Vec<ServiceEntry> = Vec::with_capacity(services.len());
        for service in services {
            if entries.iter().any(|e| e.tag == service.tag) {
                bail!("Duplicate service tag in catalog: {}", service.tag);
            }
            entries.push(ServiceEntry {
                tag: service.tag.clone(),
                uuid: service.uuid,
                characteristics: service.characteristics.clone(),
            });
        }
        Ok(Self { entries })
    }

    pub fn get(&self, tag: &ServiceTag) -> Option<&ServiceEntry> {
        self.entries.iter().find(|e| &e.tag == tag)
    }

    /// Service UUID for `tag`
    pub fn uuid(&self, tag: &ServiceTag) -> Option<Uuid> {
        self.get(tag).map(|e| e.uuid)
    }

    pub fn characteristics(&self, tag: &ServiceTag) -> &[Uuid] {
        self.get(tag).map(|e| e.characteristics.as_slice()).unwrap_or(&[])
    }

    /// Resolves a list of tags to service UUIDs, failing on unknown tags.
    pub fn resolve(&self, tags: &[ServiceTag]) -> Result<Vec<Uuid>> {
        tags.iter()
            .map(|tag| match self.uuid(tag) {
                Some(uuid) => Ok(uuid),
                None => bail!("Unknown service tag: {}", tag),
            })
            .collect()
    }

    pub fn entries(&self) -> &[ServiceEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_holds_test_service() {
        let catalog = ServiceCatalog::default();
        assert_eq!(catalog.uuid(&ServiceTag::test()), Some(UUID_TEST_SERVICE));
        assert_eq!(
            catalog.characteristics(&ServiceTag::test()),
            &[UUID_READABLE_CHAR, UUID_WRITABLE_CHAR, UUID_NOTIFY_CHAR]
        );
    }

    #[test]
    fn unknown_tag_has_no_characteristics() {
        let catalog = ServiceCatalog::default();
        assert!(catalog.characteristics(&ServiceTag::new("auth")).is_empty());
        assert!(catalog.resolve(&[ServiceTag::new("auth")]).is_err());
    }

    #[test]
    fn duplicate_tags_are_rejected() {
        let service = ServiceConfig {
            tag: ServiceTag::test(),
            uuid: UUID_TEST_SERVICE,
            characteristics: vec![],
        };
        let err = ServiceCatalog::from_config(&[service.clone(), service]).unwrap_err();
        assert!(err.to_string().contains("Duplicate service tag"));
    }
}
