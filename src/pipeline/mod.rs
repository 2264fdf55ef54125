//! Pipeline stages between a backend response and the final text.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and none of them knows which backend produced the
//! blocks.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ (adapter) ──▶ normalize ──▶ markup ──▶ postprocess
//! (bytes)    RawDocument   (order+names)  (text)     (cleanup)
//! ```
//!
//! 1. [`input`]      : validate PDF bytes, estimate page count, load files
//! 2. [`normalize`]  : sort and merge pages, sanitise boxes, classify blocks,
//!    name images; uses [`columns`] for reading order
//! 3. [`markup`]     : canonical text serialisation
//! 4. [`postprocess`]: deterministic whitespace cleanup

pub mod columns;
pub mod input;
pub mod markup;
pub mod normalize;
pub mod postprocess;
