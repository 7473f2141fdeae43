// # Domain Registry Implementations
//
// This module provides implementations of the DomainRegistry trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::FileDomainRegistry;
pub use memory::MemoryDomainRegistry;
