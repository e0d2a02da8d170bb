//! The GIF container structure: header, image descriptors, extension blocks and the
//! length-prefixed sub-block series used everywhere the format stores variable-length data.
//! Each block type knows how to read itself off a byte stream; walking the stream and deciding
//! what to do with the blocks is the decoder's job.

use byteorder::{LittleEndian, ReadBytesExt};

use crate::decoder::GifError;

pub const GIF_TRAILER: u8 = 0x3b;
pub const EXTENSION_INTRODUCER: u8 = 0x21;
pub const IMAGE_DESCRIPTOR_SEPARATOR: u8 = 0x2c;

const NETSCAPE_LOOPING_IDENTIFIER: &[u8] = b"NETSCAPE2.0";

fn map_eof(error: std::io::Error) -> GifError {
	if error.kind() == std::io::ErrorKind::UnexpectedEof {
		GifError::BadFile(String::from("Premature end of sub-block series"))
	} else {
		GifError::IOError(error)
	}
}

/// Reads an entire sub-block series, concatenating the data of every block until the
/// zero-length terminator.
pub fn read_raw_sub_block_data<T: ReadBytesExt>(reader: &mut T) -> Result<Box<[u8]>, GifError> {
	let mut data = Vec::new();
	let mut count = reader.read_u8().map_err(map_eof)?;
	while count > 0 {
		let mut sub_block = vec![0u8; count as usize];
		reader.read_exact(&mut sub_block).map_err(map_eof)?;
		data.append(&mut sub_block);
		// read next sub block data size (or 0 if this is the end)
		count = reader.read_u8().map_err(map_eof)?;
	}
	Ok(data.into_boxed_slice())
}

/// Reads an entire sub-block series, discarding the data.
pub fn skip_sub_blocks<T: ReadBytesExt>(reader: &mut T) -> Result<(), GifError> {
	let mut scratch = [0u8; 255];
	let mut count = reader.read_u8().map_err(map_eof)?;
	while count > 0 {
		reader.read_exact(&mut scratch[0..count as usize]).map_err(map_eof)?;
		count = reader.read_u8().map_err(map_eof)?;
	}
	Ok(())
}

#[derive(Debug, Copy, Clone)]
pub struct GifHeader {
	pub signature: [u8; 3],
	pub version: [u8; 3],
	pub screen_width: u16,
	pub screen_height: u16,
	pub flags: u8,
	pub background_color: u8,
	pub aspect_ratio: u8,
}

impl GifHeader {
	pub fn has_global_color_table(&self) -> bool {
		self.flags & 0b10000000 != 0
	}

	pub fn global_color_table_bits(&self) -> u8 {
		self.flags & 0b00000111
	}

	pub fn read<T: ReadBytesExt>(reader: &mut T) -> Result<Self, GifError> {
		let mut signature = [0u8; 3];
		reader.read_exact(&mut signature)?;
		let mut version = [0u8; 3];
		reader.read_exact(&mut version)?;
		Ok(GifHeader {
			signature, //
			version,
			screen_width: reader.read_u16::<LittleEndian>()?,
			screen_height: reader.read_u16::<LittleEndian>()?,
			flags: reader.read_u8()?,
			background_color: reader.read_u8()?,
			aspect_ratio: reader.read_u8()?,
		})
	}
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum GifExtensionLabel {
	GraphicControl,
	Application,
	Comment,
}

impl GifExtensionLabel {
	/// Maps a label byte to the extensions the decoder cares about. Anything else (plain text
	/// extensions included) has no effect on decoding and is skipped as a plain sub-block
	/// series by the caller.
	pub fn from(value: u8) -> Option<Self> {
		use GifExtensionLabel::*;
		match value {
			0xf9 => Some(GraphicControl),
			0xff => Some(Application),
			0xfe => Some(Comment),
			_ => None,
		}
	}
}

/// What to do with the currently displayed frame before rendering the next one.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Disposal {
	/// Leave the frame in place; the next frame draws over it.
	Keep,
	/// Clear the frame's rectangle back to transparent before the next frame draws.
	RestoreBackground,
	/// Put the canvas back the way it was before this frame was drawn.
	RestorePrevious,
}

#[derive(Debug, Copy, Clone)]
pub struct GraphicControlExtension {
	pub flags: u8,
	pub delay: u16,
	pub transparent_color: u8,
}

impl GraphicControlExtension {
	pub fn disposal(&self) -> Disposal {
		match (self.flags & 0b00011100).wrapping_shr(2) {
			2 => Disposal::RestoreBackground,
			3 => Disposal::RestorePrevious,
			_ => Disposal::Keep,
		}
	}

	pub fn has_transparent_color(&self) -> bool {
		self.flags & 0b00000001 != 0
	}

	pub fn transparent_color(&self) -> Option<u8> {
		if self.has_transparent_color() {
			Some(self.transparent_color)
		} else {
			None
		}
	}

	/// The frame delay in milliseconds (stored in the file as centiseconds).
	pub fn delay_ms(&self) -> u32 {
		self.delay as u32 * 10
	}

	pub fn read<T: ReadBytesExt>(reader: &mut T) -> Result<Self, GifError> {
		let block_size = reader.read_u8()?;
		if block_size != 4 {
			return Err(GifError::BadFile(format!("Graphic control extension block size {} should be 4", block_size)));
		}
		let extension = GraphicControlExtension {
			flags: reader.read_u8()?, //
			delay: reader.read_u16::<LittleEndian>()?,
			transparent_color: reader.read_u8()?,
		};
		let terminator = reader.read_u8()?;
		if terminator != 0 {
			return Err(GifError::BadFile(format!("Graphic control extension terminator {} should be 0", terminator)));
		}
		Ok(extension)
	}
}

#[derive(Debug, Clone)]
pub struct ApplicationExtension {
	pub identifier: Box<[u8]>,
}

impl ApplicationExtension {
	/// True for the NETSCAPE2.0 extension, which marks the animation as looping.
	pub fn is_netscape_looping(&self) -> bool {
		*self.identifier == *NETSCAPE_LOOPING_IDENTIFIER
	}

	pub fn read<T: ReadBytesExt>(reader: &mut T) -> Result<Self, GifError> {
		let block_size = reader.read_u8()?;
		let mut identifier = vec![0u8; block_size as usize];
		reader.read_exact(&mut identifier)?;
		// the application's own payload follows as a sub-block series. nothing in it affects
		// decoding (the looping count in particular is not honored), so it is not kept.
		skip_sub_blocks(reader)?;
		Ok(ApplicationExtension { identifier: identifier.into_boxed_slice() })
	}
}

#[derive(Debug, Clone)]
pub struct CommentExtension {
	pub data: Box<[u8]>,
}

impl CommentExtension {
	pub fn read<T: ReadBytesExt>(reader: &mut T) -> Result<Self, GifError> {
		Ok(CommentExtension { data: read_raw_sub_block_data(reader)? })
	}
}

#[derive(Debug, Clone)]
pub struct LocalImageDescriptor {
	pub x: u16,
	pub y: u16,
	pub width: u16,
	pub height: u16,
	pub flags: u8,
}

impl LocalImageDescriptor {
	pub fn has_local_color_table(&self) -> bool {
		self.flags & 0b10000000 != 0
	}

	pub fn is_interlaced(&self) -> bool {
		self.flags & 0b01000000 != 0
	}

	pub fn local_color_table_bits(&self) -> u8 {
		self.flags & 0b00000111
	}

	pub fn read<T: ReadBytesExt>(reader: &mut T) -> Result<Self, GifError> {
		Ok(LocalImageDescriptor {
			x: reader.read_u16::<LittleEndian>()?, //
			y: reader.read_u16::<LittleEndian>()?,
			width: reader.read_u16::<LittleEndian>()?,
			height: reader.read_u16::<LittleEndian>()?,
			flags: reader.read_u8()?,
		})
	}
}
