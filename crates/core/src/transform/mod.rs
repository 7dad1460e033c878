//! Transform module: re-encoding the images embedded in a PDF.
//!
//! The [`Transformer`] trait is synchronous; the coordinator runs it on a
//! blocking thread and forwards its per-image progress. [`PdfTransformer`]
//! is the lopdf-based implementation.
//!
//! # Behaviour
//!
//! - Every image XObject reachable from a page is decoded to 8-bit gray or
//!   RGB pixels (CMYK and indexed images are expanded to RGB or gray)
//! - Optional grayscale conversion, then resize by the job's ratio
//!   (bilinear, at least 1x1)
//! - `jpeg` writes `DCTDecode` at the requested quality; `png` writes
//!   lossless `FlateDecode` samples and ignores quality
//! - Any image that cannot be decoded fails the whole document
//!
//! # Example
//!
//! ```ignore
//! use pressroom_core::transform::{PdfTransformer, Transformer};
//!
//! let (tx, _rx) = tokio::sync::mpsc::channel(64);
//! let report = PdfTransformer::new().transform(
//!     Path::new("source.pdf"),
//!     Path::new("paper_converted.pdf"),
//!     &params,
//!     &tx,
//!     &CancelFlag::new(),
//! )?;
//! println!("{} images rewritten", report.images.len());
//! ```

mod codec;
mod colorspace;
mod error;
mod objects;
mod pdf;
mod traits;
mod types;

pub use error::{object_label, TransformError};
pub use pdf::PdfTransformer;
pub use traits::Transformer;
pub use types::{
    scaled_dimensions, ColorMode, ImageRewrite, ImageUnit, TransformProgress, TransformReport,
};
