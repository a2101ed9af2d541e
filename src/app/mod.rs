//! Application boundary: the port traits the link layer is written against.

pub mod ports;
