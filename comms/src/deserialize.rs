use std::io;

/// Rebuilds a value from its wire representation, borrowing from the receive buffer.
pub trait Deserialize<'a>: Sized {
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self>;
}
