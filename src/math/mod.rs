pub mod device;
pub mod matrix;

pub use device::Device;
pub use matrix::Matrix;
