//! The public face of the crate: [GifDecoder] opens a GIF file, walks its block structure and
//! serves each animation frame as a matrix of packed colors, composed onto a persistent canvas
//! according to the disposal method carried by the preceding graphic control extension.

use std::path::Path;

use byteorder::ReadBytesExt;
use thiserror::Error;

use crate::canvas::{Canvas, Rect, RowOrder, TRANSPARENT};
use crate::lzw::{lzw_decode, LzwError};
use crate::palette::{bits_to_num_colors, Palette, PaletteError};
use crate::parser::{
	skip_sub_blocks, ApplicationExtension, CommentExtension, Disposal, GifExtensionLabel, GifHeader,
	GraphicControlExtension, LocalImageDescriptor, EXTENSION_INTRODUCER, GIF_TRAILER, IMAGE_DESCRIPTOR_SEPARATOR,
};
use crate::reader::PagedReader;

#[derive(Error, Debug)]
pub enum GifError {
	#[error("Bad or unsupported GIF file: {0}")]
	BadFile(String),

	#[error("GIF palette data error")]
	BadPalette(#[from] PaletteError),

	#[error("LZW decoding error")]
	LzwError(#[from] LzwError),

	#[error("Region is not fully within the logical screen boundaries")]
	OutOfBounds,

	#[error("The decoder has been closed")]
	Closed,

	#[error("GIF I/O error")]
	IOError(#[from] std::io::Error),
}

/// File-wide properties gathered from the whole block stream.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FileParameters {
	/// Text of the first comment extension in the file, if any.
	pub comment: Option<String>,
	/// True when the file carries a NETSCAPE2.0 application extension, which marks the
	/// animation as looping.
	pub looped: bool,
	/// Total number of images in the file.
	pub number_of_images: u32,
}

/// Properties of the currently loaded frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ImageParameters {
	/// 1-based position of the loaded frame within the file.
	pub image_no: u32,
	/// How long this frame should stay on screen, in milliseconds. Zero when the frame did
	/// not come with a graphic control extension.
	pub delay_ms: u32,
}

/// Controls what [GifDecoder::next_image] does once the last frame of the file has been
/// reached.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NextImageMode {
	/// Stop at the last frame.
	Never,
	/// Always start over from the first frame.
	Always,
	/// Start over only when the file marks itself as looping.
	Play,
}

/// Decodes GIF87a / GIF89a files frame by frame.
///
/// Opening a file parses the header and eagerly loads the first frame. [GifDecoder::read_matrix]
/// then returns the composed canvas for the most recently loaded frame as rows of packed
/// 0x00RRGGBB colors ([TRANSPARENT] for cells no frame has painted), indexed `[row][column]`
/// with 0-based coordinates. [GifDecoder::next_image] advances through the animation and can
/// wrap back to the first frame, re-reading the file from the first image onwards.
///
/// The decoder owns its file handle exclusively and performs no buffering beyond a small page
/// cache, so backtracking for a looping animation does not re-read the file from disk.
#[derive(Debug)]
pub struct GifDecoder {
	reader: PagedReader,
	closed: bool,
	screen_width: u16,
	screen_height: u16,
	global_palette: Option<Palette>,
	first_frame_offset: u64,
	at_trailer: bool,

	// frame composition state. the background canvas is what the next frame composes over,
	// which differs from the visible frame after a "restore" disposal.
	current_frame: Canvas,
	background: Canvas,
	pending_erase: Option<Rect>,
	pending_control: Option<GraphicControlExtension>,
	loaded_image_no: u32,
	current_delay_ms: u32,

	// file-wide metadata accumulated across walks of the block stream. the watermark holds
	// the highest block offset already accounted for, so that walking the same stretch of
	// the file twice (metadata scan overlapping decoding, or looping) counts nothing twice.
	comment: Option<String>,
	looped: bool,
	image_count: u32,
	metadata_watermark: u64,
	metadata_complete: bool,
}

impl GifDecoder {
	/// Opens the GIF file at the given path, reading everything up to and including the first
	/// frame. Fails if the file is not a GIF or does not contain at least one image.
	pub fn open(path: &Path) -> Result<GifDecoder, GifError> {
		let mut reader = PagedReader::open(path)?;

		let header = GifHeader::read(&mut reader)?;
		if header.signature != *b"GIF" || (header.version != *b"87a" && header.version != *b"89a") {
			return Err(GifError::BadFile(String::from("Expected GIF87a or GIF89a header signature")));
		}
		if header.screen_width == 0 || header.screen_height == 0 {
			return Err(GifError::BadFile(String::from("Logical screen dimensions must be non-zero")));
		}

		let global_palette = if header.has_global_color_table() {
			let num_colors = bits_to_num_colors(header.global_color_table_bits() as u32);
			Some(Palette::load_from_bytes(&mut reader, num_colors)?)
		} else {
			None // a local color table on the image may still provide colors
		};

		let first_frame_offset = reader.position();
		let mut decoder = GifDecoder {
			reader, //
			closed: false,
			screen_width: header.screen_width,
			screen_height: header.screen_height,
			global_palette,
			first_frame_offset,
			at_trailer: false,
			current_frame: Canvas::new(header.screen_width as u32, header.screen_height as u32),
			background: Canvas::new(header.screen_width as u32, header.screen_height as u32),
			pending_erase: None,
			pending_control: None,
			loaded_image_no: 0,
			current_delay_ms: 0,
			comment: None,
			looped: false,
			image_count: 0,
			metadata_watermark: 0,
			metadata_complete: false,
		};

		if !decoder.advance_to_next_image()? {
			return Err(GifError::BadFile(String::from("No image data was found")));
		}
		Ok(decoder)
	}

	/// Returns the dimensions of the logical screen as declared by the file header.
	#[inline]
	pub fn dimensions(&self) -> (u16, u16) {
		(self.screen_width, self.screen_height)
	}

	/// Returns the file-wide parameters: comment, looping flag and total image count. The
	/// first call walks the remainder of the file to gather them (leaving the decoding
	/// position untouched); the result is cached, so subsequent calls are free.
	pub fn file_parameters(&mut self) -> Result<FileParameters, GifError> {
		if self.closed {
			return Err(GifError::Closed);
		}
		if !self.metadata_complete {
			let saved_position = self.reader.position();
			let result = self.scan_remaining();
			self.reader.jump(saved_position);
			result?;
		}
		Ok(FileParameters {
			comment: self.comment.clone(), //
			looped: self.looped,
			number_of_images: self.image_count,
		})
	}

	/// Returns the 1-based frame number and delay of the currently loaded frame.
	pub fn image_parameters(&self) -> Result<ImageParameters, GifError> {
		if self.closed {
			return Err(GifError::Closed);
		}
		Ok(ImageParameters { image_no: self.loaded_image_no, delay_ms: self.current_delay_ms })
	}

	/// Returns the full canvas of the currently loaded frame as a matrix of packed colors,
	/// indexed `[row][column]`.
	pub fn read_matrix(&self) -> Result<Vec<Vec<i32>>, GifError> {
		self.read_matrix_region(0, 0, self.screen_width as u32, self.screen_height as u32)
	}

	/// Returns a rectangular window of the currently loaded frame's canvas as a matrix of
	/// packed colors, indexed `[row][column]`. The window must be non-empty and lie fully
	/// inside the logical screen.
	pub fn read_matrix_region(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Vec<Vec<i32>>, GifError> {
		if self.closed {
			return Err(GifError::Closed);
		}
		if width == 0
			|| height == 0
			|| (x as u64 + width as u64) > self.screen_width as u64
			|| (y as u64 + height as u64) > self.screen_height as u64
		{
			return Err(GifError::OutOfBounds);
		}
		let mut matrix = Vec::with_capacity(height as usize);
		for row in y..y + height {
			matrix.push(self.current_frame.row(row)[x as usize..(x + width) as usize].to_vec());
		}
		Ok(matrix)
	}

	/// Attempts to load the next frame, returning true on success. At the end of the file the
	/// mode decides what happens: with [NextImageMode::Never] the call returns false, with
	/// [NextImageMode::Always] the animation starts over from the first frame, and with
	/// [NextImageMode::Play] it starts over only for files marked as looping.
	pub fn next_image(&mut self, mode: NextImageMode) -> Result<bool, GifError> {
		if self.closed {
			return Err(GifError::Closed);
		}
		if self.advance_to_next_image()? {
			return Ok(true);
		}

		let start_over = match mode {
			NextImageMode::Never => false,
			NextImageMode::Always => true,
			NextImageMode::Play => self.looped,
		};
		if !start_over {
			return Ok(false);
		}

		self.rewind();
		if !self.advance_to_next_image()? {
			return Err(GifError::BadFile(String::from("No image data was found")));
		}
		Ok(true)
	}

	/// Releases the file handle and page cache. Every other method fails from here on. Safe
	/// to call more than once.
	pub fn close(&mut self) {
		self.closed = true;
		self.reader.close();
	}

	/// Puts the decoder back into its freshly opened state, just before loading frame 1.
	fn rewind(&mut self) {
		self.reader.jump(self.first_frame_offset);
		self.at_trailer = false;
		self.current_frame.fill(TRANSPARENT);
		self.background.fill(TRANSPARENT);
		self.pending_erase = None;
		self.pending_control = None;
		self.loaded_image_no = 0;
		self.current_delay_ms = 0;
	}

	/// Marks the block at the given offset as processed for metadata purposes. Returns true
	/// if this is the first time the block has been seen.
	fn note_block(&mut self, offset: u64) -> bool {
		if offset > self.metadata_watermark {
			self.metadata_watermark = offset;
			true
		} else {
			false
		}
	}

	/// Walks the block stream from the current position until an image has been decoded,
	/// returning false when the file trailer is reached instead.
	fn advance_to_next_image(&mut self) -> Result<bool, GifError> {
		if self.at_trailer {
			return Ok(false);
		}
		loop {
			let offset = self.reader.position();
			let introducer = self.reader.read_u8()?;
			match introducer {
				GIF_TRAILER => {
					self.at_trailer = true;
					self.metadata_complete = true;
					return Ok(false);
				}
				IMAGE_DESCRIPTOR_SEPARATOR => {
					if self.note_block(offset) {
						self.image_count += 1;
					}
					self.load_image()?;
					return Ok(true);
				}
				EXTENSION_INTRODUCER => self.handle_extension(offset, true)?,
				_ => {
					return Err(GifError::BadFile(format!(
						"Unexpected byte found {} not a file trailer, image separator or extension introducer",
						introducer
					)));
				}
			}
		}
	}

	/// Walks the remaining block stream without decoding pixel data, so that the image count,
	/// comment and looping flag cover the whole file.
	fn scan_remaining(&mut self) -> Result<(), GifError> {
		loop {
			let offset = self.reader.position();
			let introducer = self.reader.read_u8()?;
			match introducer {
				GIF_TRAILER => {
					self.metadata_complete = true;
					return Ok(());
				}
				IMAGE_DESCRIPTOR_SEPARATOR => {
					if self.note_block(offset) {
						self.image_count += 1;
					}
					self.skip_image()?;
				}
				EXTENSION_INTRODUCER => self.handle_extension(offset, false)?,
				_ => {
					return Err(GifError::BadFile(format!(
						"Unexpected byte found {} not a file trailer, image separator or extension introducer",
						introducer
					)));
				}
			}
		}
	}

	/// Consumes one extension block. Graphic control state is only retained when decoding
	/// (`store_control`); the metadata scan must not disturb the state the next decoded
	/// frame will be composed with.
	fn handle_extension(&mut self, offset: u64, store_control: bool) -> Result<(), GifError> {
		let label = self.reader.read_u8()?;
		match GifExtensionLabel::from(label) {
			Some(GifExtensionLabel::GraphicControl) => {
				let control = GraphicControlExtension::read(&mut self.reader)?;
				self.note_block(offset);
				if store_control {
					self.pending_control = Some(control);
				}
			}
			Some(GifExtensionLabel::Comment) => {
				let extension = CommentExtension::read(&mut self.reader)?;
				// only the first comment in the file counts
				if self.note_block(offset) && self.comment.is_none() {
					self.comment = Some(String::from_utf8_lossy(&extension.data).into_owned());
				}
			}
			Some(GifExtensionLabel::Application) => {
				let extension = ApplicationExtension::read(&mut self.reader)?;
				self.note_block(offset);
				if extension.is_netscape_looping() {
					self.looped = true;
				}
			}
			None => {
				// plain text and unrecognized extensions have no effect on decoding
				self.note_block(offset);
				skip_sub_blocks(&mut self.reader)?;
			}
		}
		Ok(())
	}

	/// Skips one image without decoding it: descriptor, optional local color table, minimum
	/// code size byte and the compressed data sub-blocks.
	fn skip_image(&mut self) -> Result<(), GifError> {
		let descriptor = LocalImageDescriptor::read(&mut self.reader)?;
		if descriptor.has_local_color_table() {
			let num_colors = bits_to_num_colors(descriptor.local_color_table_bits() as u32);
			self.reader.skip(num_colors as i64 * 3)?;
		}
		self.reader.read_u8()?;
		skip_sub_blocks(&mut self.reader)
	}

	/// Decodes the image whose descriptor follows the current position and composes it onto
	/// the canvas, honoring the disposal method, transparency and interlacing.
	fn load_image(&mut self) -> Result<(), GifError> {
		let control = self.pending_control.take();
		let descriptor = LocalImageDescriptor::read(&mut self.reader)?;

		if descriptor.width == 0 || descriptor.height == 0 {
			return Err(GifError::BadFile(String::from("Image dimensions must be non-zero")));
		}
		if descriptor.x as u32 + descriptor.width as u32 > self.screen_width as u32
			|| descriptor.y as u32 + descriptor.height as u32 > self.screen_height as u32
		{
			return Err(GifError::BadFile(String::from("Image rectangle extends beyond the logical screen")));
		}
		let frame_rect = Rect {
			x: descriptor.x as u32,
			y: descriptor.y as u32,
			width: descriptor.width as u32,
			height: descriptor.height as u32,
		};

		let local_palette = if descriptor.has_local_color_table() {
			let num_colors = bits_to_num_colors(descriptor.local_color_table_bits() as u32);
			Some(Palette::load_from_bytes(&mut self.reader, num_colors)?)
		} else {
			None
		};
		let palette = match &local_palette {
			Some(palette) => palette,
			None => match &self.global_palette {
				Some(palette) => palette,
				None => return Err(GifError::BadFile(String::from("No palette data was found"))),
			},
		};

		let min_code_size = self.reader.read_u8()? as usize;

		let disposal = control.as_ref().map_or(Disposal::Keep, |c| c.disposal());
		let transparent_color = control.as_ref().and_then(|c| c.transparent_color());
		let delay_ms = control.as_ref().map_or(0, |c| c.delay_ms());

		// a "restore background" disposal on the previous frame is applied lazily, right
		// before the next frame composes over it
		if let Some(erase_rect) = self.pending_erase.take() {
			self.background.fill_rect(&erase_rect, TRANSPARENT);
		}
		self.current_frame.copy_from(&self.background);

		let mut rows = RowOrder::new(frame_rect.height, descriptor.is_interlaced());
		let mut row = rows.next();
		let mut column = 0u32;
		let expected_pixels = frame_rect.width as u64 * frame_rect.height as u64;
		let mut emitted_pixels: u64 = 0;
		let mut stray_color_index: Option<u8> = None;

		let canvas = &mut self.current_frame;
		lzw_decode(&mut self.reader, min_code_size, |color_index| {
			let y = match row {
				Some(y) => y,
				None => {
					emitted_pixels += 1;
					return;
				}
			};
			if transparent_color != Some(color_index) {
				match palette.get(color_index as usize) {
					Some(color) => canvas.set_pixel(frame_rect.x + column, frame_rect.y + y, color),
					None => stray_color_index = Some(color_index),
				}
			}
			emitted_pixels += 1;
			column += 1;
			if column == frame_rect.width {
				column = 0;
				row = rows.next();
			}
		})?;

		if let Some(color_index) = stray_color_index {
			return Err(GifError::BadFile(format!("Color index {} is outside of the palette", color_index)));
		}
		if emitted_pixels != expected_pixels {
			return Err(GifError::BadFile(format!(
				"Image data holds {} pixels where {} were expected",
				emitted_pixels, expected_pixels
			)));
		}

		match disposal {
			Disposal::Keep => self.background.copy_from(&self.current_frame),
			Disposal::RestoreBackground => {
				self.background.copy_from(&self.current_frame);
				self.pending_erase = Some(frame_rect);
			}
			Disposal::RestorePrevious => {
				// the background keeps its pre-frame contents; this frame is visible but
				// leaves no trace on the one after it
			}
		}

		self.loaded_image_no += 1;
		self.current_delay_ms = delay_ms;
		Ok(())
	}
}
