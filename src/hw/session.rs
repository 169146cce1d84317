use strum::IntoEnumIterator;
use tracing::instrument;
use uuid::Uuid;

use super::model::{CharacteristicInfo, EndpointPresence, ServiceInfo};
use crate::error::InteractionError;
use crate::layout::LayoutCatalog;
use crate::protocol::{self, EndpointId};

/// Endpoints a session binds to after connecting.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct NegotiatedEndpoints {
    pub(crate) service: Uuid,
    pub(crate) application: Uuid,
}

/// Verifies that `services` expose the catalog's service and a write + notify
/// application characteristic.
#[instrument(skip(services, catalog), level = "debug", fields(service_count = services.len()))]
pub(crate) fn negotiate_session_endpoints(
    services: &[ServiceInfo],
    catalog: &LayoutCatalog,
) -> Result<NegotiatedEndpoints, InteractionError> {
    let application = services
        .iter()
        .filter(|service| service.uuid() == catalog.service_uuid())
        .find_map(|service| service.characteristic(catalog.telemetry_characteristic()))
        .filter(|characteristic| supports_write(characteristic) && supports_notify(characteristic));

    match application {
        Some(characteristic) => Ok(NegotiatedEndpoints {
            service: catalog.service_uuid(),
            application: characteristic.uuid(),
        }),
        None => {
            let mut missing = missing_required_endpoints(&endpoint_presence(services));
            if missing.is_empty() {
                // Present, but without the write + notify properties a session needs.
                missing.push(EndpointId::ApplicationCharacteristic);
            }
            Err(InteractionError::MissingRequiredEndpoints {
                missing: format_missing_endpoints(&missing),
            })
        }
    }
}

/// Flags every catalogued endpoint found among `services`.
pub(crate) fn endpoint_presence(services: &[ServiceInfo]) -> EndpointPresence {
    let mut by_endpoint = protocol::empty_presence_map();
    for service in services {
        if let Some(endpoint) = protocol::endpoint_for_uuid(&service.uuid()) {
            by_endpoint.insert(endpoint, true);
        }
        for characteristic in service.characteristics() {
            if let Some(endpoint) = protocol::endpoint_for_uuid(&characteristic.uuid()) {
                by_endpoint.insert(endpoint, true);
            }
        }
    }
    EndpointPresence::new(by_endpoint)
}

pub(crate) fn missing_required_endpoints(presence: &EndpointPresence) -> Vec<EndpointId> {
    EndpointId::iter()
        .filter(|endpoint| endpoint.is_required() && !presence.is_present(*endpoint))
        .collect()
}

fn format_missing_endpoints(endpoints: &[EndpointId]) -> String {
    endpoints
        .iter()
        .map(|endpoint| {
            let metadata = protocol::endpoint_metadata(*endpoint);
            format!("{} ({})", metadata.name(), metadata.uuid())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn supports_write(characteristic: &CharacteristicInfo) -> bool {
    characteristic.has_property("write") || characteristic.has_property("write_without_response")
}

fn supports_notify(characteristic: &CharacteristicInfo) -> bool {
    characteristic.has_property("notify") || characteristic.has_property("indicate")
}
