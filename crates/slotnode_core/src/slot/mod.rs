//! Slot descriptors and the generic accessors they drive.

mod accessor;
pub mod descriptor;

pub use descriptor::{
    AccessorKind, CustomGetter, CustomSetter, DuplicateOp, FinalizeHook, GetHook,
    ShouldStoreHook, SlotDescriptor, SlotDescriptorBuilder, SlotError, SlotHooks, SlotResult,
    UndefinedGetHook, UpdateHook, ValidItem, ValidItemsProvider, ValidationMode,
};
