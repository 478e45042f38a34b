// # Entity Host Trait
//
// The boundary to whatever hosts and indexes entities (a plugin container,
// a status page, a home-automation bus). Only registration and
// deregistration are consumed here; dispatch is provided by
// `crate::dispatch`.

/// Entity type name used when registering DNS records
pub const DNS_RECORD_ENTITY_TYPE: &str = "DnsRecord";

/// Registration interface keyed by an opaque identifier
///
/// Called from the owner thread only, so implementations must not block
/// for long.
pub trait EntityHost: Send + Sync {
    /// Register an entity
    ///
    /// # Parameters
    ///
    /// - `local_id`: Identifier assigned by this crate (`DnsRecord_{n}`)
    /// - `entity_type`: Entity type name
    /// - `name`: Display name
    ///
    /// # Returns
    ///
    /// The opaque host identifier, later passed to [`EntityHost::deregister_entity`]
    fn register_entity(
        &self,
        local_id: &str,
        entity_type: &str,
        name: &str,
    ) -> Result<String, crate::Error>;

    /// Deregister a previously registered entity
    fn deregister_entity(&self, host_id: &str) -> Result<(), crate::Error>;
}
