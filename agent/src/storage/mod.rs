//! Agent storage: slot layout, slot store and settings

pub mod layout;
pub mod settings;
pub mod slot;
