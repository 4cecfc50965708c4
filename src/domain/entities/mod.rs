//! Domain entities.

mod image;
mod task;

pub use image::{CacheKey, ImageSource, LoadedImage, image_byte_size};
pub use task::{LoadTask, TaskHandle, TaskState};
