mod image_id;
mod service;

pub use image_id::*;
pub use service::*;
