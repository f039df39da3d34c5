//! Pipeline stages for image-to-table extraction.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and a recognizer backend can be swapped without
//! touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ decode ──▶ recognize ──▶ collect ──▶ (present / export)
//! (bytes)   (RGB)      (regions)     (tables)
//! ```
//!
//! 1. [`input`]     — read a path, download a URL or accept an upload buffer;
//!    sniff PNG/JPEG
//! 2. [`decode`]    — decode to an RGB grid on the blocking pool
//! 3. [`recognize`] — the [`recognize::TableRecognizer`] seam; the only stage
//!    with network I/O. Backends: [`vision`] (with [`encode`] and
//!    [`postprocess`]) and [`service`]
//! 4. [`collect`]   — parse each table region's [`markup`] into rows,
//!    skipping malformed regions with a warning

pub mod collect;
pub mod decode;
pub mod encode;
pub mod input;
pub mod markup;
pub mod postprocess;
pub mod recognize;
pub mod service;
pub mod vision;
