//! Process-wide contract caches.
//!
//! Entries are computed at most once per key; concurrent first uses race on
//! the map entry, not on a global lock.
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::{
    Result,
    contract::{MethodContract, MethodShape, ServiceContract, ServiceDescription},
    version::SoapVersion,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ServiceKey {
    service: String,
    version: SoapVersion,
    client: bool,
}

static METHOD_CONTRACTS: Lazy<DashMap<String, Arc<MethodContract>>> = Lazy::new(DashMap::new);

static SERVICE_CONTRACTS: Lazy<DashMap<ServiceKey, Arc<ServiceContract>>> = Lazy::new(DashMap::new);

/// The contract of `shape`, keyed by declaring type and signature.
pub fn method_contract(shape: &MethodShape) -> Result<Arc<MethodContract>> {
    let key = shape.to_key();
    if let Some(contract) = METHOD_CONTRACTS.get(&key) {
        return Ok(Arc::clone(contract.value()));
    }

    let entry = METHOD_CONTRACTS
        .entry(key)
        .or_try_insert_with(|| MethodContract::build(shape).map(Arc::new))?;
    debug!(method = shape.name(), "Cached method contract");
    Ok(Arc::clone(entry.value()))
}

/// The compiled contract of `service` for `version`, keyed by service name.
pub fn service_contract(
    service: &ServiceDescription,
    version: SoapVersion,
    client: bool,
) -> Result<Arc<ServiceContract>> {
    let key = ServiceKey {
        service: service.name.clone(),
        version,
        client,
    };
    if let Some(contract) = SERVICE_CONTRACTS.get(&key) {
        return Ok(Arc::clone(contract.value()));
    }

    let entry = SERVICE_CONTRACTS
        .entry(key)
        .or_try_insert_with(|| ServiceContract::compile(service, version, client).map(Arc::new))?;
    Ok(Arc::clone(entry.value()))
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::{contract::MethodDescriptor, serializer::XmlTypeCode};

    fn echo() -> MethodShape {
        MethodDescriptor::builder()
            .name("Echo")
            .declaring_type("CacheTests")
            .return_type(XmlTypeCode::String)
            .build()
            .into()
    }

    #[test]
    fn test_method_contract_is_built_once() {
        let shape = echo();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shape = shape.clone();
                thread::spawn(move || method_contract(&shape).unwrap())
            })
            .collect();
        let contracts: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();
        assert!(contracts.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    }

    #[test]
    fn test_service_contract_is_keyed_by_version() {
        let service = ServiceDescription::builder()
            .name("CacheTests")
            .methods(vec![echo()])
            .build();
        let soap11 = service_contract(&service, SoapVersion::Soap11, false).unwrap();
        let again = service_contract(&service, SoapVersion::Soap11, false).unwrap();
        let soap12 = service_contract(&service, SoapVersion::Soap12, false).unwrap();
        assert!(Arc::ptr_eq(&soap11, &again));
        assert!(!Arc::ptr_eq(&soap11, &soap12));
    }
}
