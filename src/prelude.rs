pub use crate::{
	canvas::{Canvas, Rect, TRANSPARENT},
	decoder::{FileParameters, GifDecoder, GifError, ImageParameters, NextImageMode},
	palette::{to_rgb32, Palette},
	parser::Disposal,
	reader::PagedReader,
};
