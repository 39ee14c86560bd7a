//! Asset loading for the data the renderer uploads at startup
//!
//! Images become RGBA8 pixel buffers and OBJ models become de-duplicated
//! vertex/index lists ready for the GPU.

pub mod image_loader;
pub mod obj_loader;

pub use image_loader::ImageData;
pub use obj_loader::{load_model, ModelData, ObjLoader};

use thiserror::Error;

/// Asset errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Asset not found
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// Failed to load asset
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// Invalid asset data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// IO error while reading an asset
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
