//! A random-access decoder for GIF87a / GIF89a files.
//!
//! [decoder::GifDecoder] opens a GIF from a path, exposes the logical screen size and
//! file-wide metadata (comment, looping flag, frame count), and serves each animation frame in
//! turn as a matrix of packed 0x00RRGGBB colors, composing frames onto a persistent canvas
//! with the disposal-method semantics the format prescribes. Reads go through a small cache of
//! file pages, so wrapping a looping animation back to its first frame costs no extra I/O.

pub mod canvas;
pub mod decoder;
pub mod lzw;
pub mod palette;
pub mod parser;
pub mod reader;

pub mod prelude;
