//=========================================================================
// Message Envelope
//=========================================================================
//
// Type-erased wrapper that lets messages of any kind share one ordered
// buffer while still being routed by their concrete type.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::any::{Any, TypeId};

//=== Internal Dependencies ===============================================

use super::Message;

//=========================================================================

/// Type-erased storage for one published message.
pub(super) trait Envelope: Send {
    /// `TypeId` of the wrapped message; this is the routing key.
    fn kind(&self) -> TypeId;

    /// Name of the wrapped type, for logging.
    fn kind_name(&self) -> &'static str;

    /// Downcasts to `&dyn Any` so handlers can recover the concrete type.
    fn payload(&self) -> &dyn Any;
}

/// Concrete envelope for messages of type `M`.
///
/// A wrapper rather than a blanket impl, so a boxed envelope can never be
/// mistaken for a message itself.
pub(super) struct Packet<M: Message>(pub(super) M);

impl<M: Message> Envelope for Packet<M> {
    fn kind(&self) -> TypeId {
        TypeId::of::<M>()
    }

    fn kind_name(&self) -> &'static str {
        std::any::type_name::<M>()
    }

    fn payload(&self) -> &dyn Any {
        &self.0
    }
}

//=========================================================================
// Tests
//=========================================================================
