//! Pipeline stages for label generation.
//!
//! Each submodule implements exactly one transformation step, so every
//! stage is testable on its own and only the controller holds state.
//!
//! ## Data Flow
//!
//! ```text
//! render ──▶ capture ──▶ compose ──▶ assemble
//! (QR)       (PNG URI)   (layout)    (PDF)
//! ```
//!
//! 1. [`render`] draws each identifier's QR matrix on the render surface.
//!    Paints run in `spawn_blocking` and are joined before anything reads
//!    the surface.
//! 2. [`capture`] PNG-encodes and base64-wraps each painted surface.
//! 3. [`compose`] lays out one page with its code, logo and captions.
//! 4. [`assemble`] builds one page per snapshot in input order and encodes
//!    the result as PDF.

pub mod assemble;
pub mod capture;
pub mod compose;
pub mod render;
