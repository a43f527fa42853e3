use std::io;

/// Turns a value into its wire representation.
pub trait Serialize<'a> {
    /// Writes the owned part of the encoding into `buf`.
    ///
    /// # Arguments
    /// * `buf` - The buffer to write the header and any owned bytes into.
    ///
    /// # Returns
    /// An optional borrowed tail that is written right after `buf` without being copied,
    /// or an error if the value could not be encoded.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> io::Result<Option<&'a [u8]>>;
}
