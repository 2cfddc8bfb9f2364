//! Service layer: the registry and ledger over SQLite, the reconciler over
//! the remote listing, and the gateway that sequences all of them.

pub mod gateway;
pub mod quota;
pub mod reconcile;
pub mod registry;
