//! Replays an Atom archive feed from its oldest page to its newest.
//!
//! The feed is served as a chain of archive pages linked by `prev-archive`
//! and `next-archive`, optionally wrapped in an encrypted envelope whose
//! data key is recovered through an external key-unwrap service.

pub mod config;
pub mod crypto;
pub mod feed;
pub mod util;
