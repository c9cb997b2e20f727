//! Reference matching and annotation merge engine.
//!
//! Page text flows through `patterns` (token recognition), `locate` and
//! `geometry` (rectangles, stamp exclusion), `highlight` (record
//! construction), `identity` (dedup keys), `merge`/`codec` (store
//! combination and persistence format) and `xref` (document notes).

pub mod codec;
pub mod geometry;
pub mod highlight;
pub mod identity;
pub mod locate;
pub mod merge;
pub mod patterns;
pub mod scan;
pub mod xref;
