//! Data models for registry-gc.
//!
//! These types are decoupled from any particular registry client so the
//! retention engine and the collaborators can share them.

mod image;

pub use image::{
    DeleteImagesResult, Image, ImageFailure, ImageId, SHORT_DIGEST_LEN, newest_first, short_digest,
};
