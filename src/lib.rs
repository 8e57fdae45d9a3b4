#![forbid(unsafe_code)]

//! Building blocks for assembling audiobook download lists from YouTube.
//!
//! Records are edited in a [`collection::CollectionStore`], their metadata is
//! checked against YouTube through [`reconcile`], and the finished list is
//! turned into a yt-dlp script by [`script`]. The `audiobook-dl` binary wires
//! these together behind a small command line.

pub mod collection;
pub mod config;
pub mod csv_codec;
pub mod debounce;
pub mod oembed;
pub mod reconcile;
pub mod record;
pub mod script;
pub mod transform;
pub mod youtube;
