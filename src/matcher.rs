use uuid::Uuid;

use crate::layout::LayoutCatalog;
use crate::protocol::APPLICATION_SERVICE_UUID;

/// Selects discovered devices by advertised service.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DeviceMatcher {
    service_uuid: Uuid,
}

impl DeviceMatcher {
    #[must_use]
    pub const fn new(service_uuid: Uuid) -> Self {
        Self { service_uuid }
    }

    /// Matches on the identifying service declared by `catalog`.
    #[must_use]
    pub fn for_catalog(catalog: &LayoutCatalog) -> Self {
        Self::new(catalog.service_uuid())
    }

    #[must_use]
    pub fn service_uuid(&self) -> Uuid {
        self.service_uuid
    }

    /// Returns whether the identifying service appears in `advertised`.
    ///
    /// ```
    /// use buwizz::{APPLICATION_SERVICE_UUID, DeviceMatcher};
    ///
    /// let matcher = DeviceMatcher::default();
    /// assert!(matcher.matches(&[APPLICATION_SERVICE_UUID]));
    /// assert!(!matcher.matches(&[]));
    /// ```
    pub fn matches<'a>(&self, advertised: impl IntoIterator<Item = &'a Uuid>) -> bool {
        advertised
            .into_iter()
            .any(|service| *service == self.service_uuid)
    }
}

impl Default for DeviceMatcher {
    fn default() -> Self {
        Self::new(APPLICATION_SERVICE_UUID)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const HEART_RATE_SERVICE: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);

    #[rstest]
    #[case(&[APPLICATION_SERVICE_UUID], true)]
    #[case(&[HEART_RATE_SERVICE, APPLICATION_SERVICE_UUID], true)]
    #[case(&[HEART_RATE_SERVICE], false)]
    #[case(&[], false)]
    fn default_matcher_requires_application_service(
        #[case] advertised: &[Uuid],
        #[case] expected: bool,
    ) {
        assert_eq!(expected, DeviceMatcher::default().matches(advertised));
    }

    #[test]
    fn catalog_matcher_follows_injected_service() {
        let catalog = LayoutCatalog::builder()
            .service_uuid(HEART_RATE_SERVICE)
            .build();
        let matcher = DeviceMatcher::for_catalog(&catalog);

        assert!(matcher.matches(&[HEART_RATE_SERVICE]));
        assert!(!matcher.matches(&[APPLICATION_SERVICE_UUID]));
    }
}
