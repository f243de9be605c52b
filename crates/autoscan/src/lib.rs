#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use autoscan_3d as k3d;

#[doc(inline)]
pub use autoscan_processing as processing;

#[doc(inline)]
pub use autoscan_workbench as workbench;
