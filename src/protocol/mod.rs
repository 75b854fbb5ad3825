//! High-level components of the MILCAN A protocol: network management and
//! CAN transport.
pub mod managment;
pub mod transport;
