// Utilities module
//
// This module contains common utility functions:
// - http: Shared outbound client and canned responses
// - path: Path manipulation utilities
// - radix: Prefix-compressed tree backing the routing table
// - validation: Common validation helpers

pub mod http;
pub mod path;
pub mod radix;
pub mod validation;
