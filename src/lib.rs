//! Caption compositing and local mockup storage for vertical carousel posts.
//!
//! The [`store`] module persists user supplied mockup images, the
//! [`compositor`] burns caption text onto a 1080x1920 background, and
//! [`carousel`] ties both to the generated slide content.

pub mod carousel;
pub mod compositor;
pub mod config;
pub mod error;
pub mod export;
pub mod image_handler;
pub mod store;
pub mod utils;

pub use compositor::{CanvasLayout, Compositor};
pub use error::{CarouselError, Result};
pub use store::{MockupImage, MockupStore};
