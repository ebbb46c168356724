//=========================================================================
// Factory Registry
//=========================================================================
//
// Explicit registration table for subsystem and provider constructors.
//
//=========================================================================

mod registry;

pub use registry::{FactoryRegistry, RegistryInitializer};
