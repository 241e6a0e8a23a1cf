//! PN532 driver: host-link framing and the UART transport.

pub mod device;
pub mod frame;

pub use device::Pn532Uart;
