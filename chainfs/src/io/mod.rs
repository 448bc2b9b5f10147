mod block;
mod diskemu;
#[cfg(test)]
pub(crate) mod memdisk;

pub use block::{BlockNumber, BlockStorage};
pub use diskemu::{DiskImage, DiskImageBuilder};
