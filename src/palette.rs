use byteorder::ReadBytesExt;
use thiserror::Error;

/// The largest color table a GIF file can carry.
pub const MAX_COLORS: usize = 256;

/// Converts a set of individual RGB components to a combined 32-bit color value, packed into
/// the format 0x00RRGGBB.
///
/// # Arguments
///
/// * `r`: the red component (0-255)
/// * `g`: the green component (0-255)
/// * `b`: the blue component (0-255)
///
/// returns: the packed color
#[inline]
pub fn to_rgb32(r: u8, g: u8, b: u8) -> i32 {
	(b as i32) + ((g as i32) << 8) + ((r as i32) << 16)
}

/// Returns the number of colors in a color table whose size is encoded with the given bits in
/// a packed field. The formula is `2 ^ (bits + 1) = num_colors`.
#[inline]
pub fn bits_to_num_colors(bits: u32) -> usize {
	1_usize.wrapping_shl(bits + 1)
}

#[derive(Error, Debug)]
pub enum PaletteError {
	#[error("Palette I/O error")]
	IOError(#[from] std::io::Error),

	#[error("Size or index is out of the supported range for palettes: {0}")]
	OutOfRange(usize),
}

/// Contains a color table read out of a GIF file, either the global one from the logical screen
/// descriptor or a local one attached to a single image. The colors are stored as 32-bit packed
/// values in the format 0x00RRGGBB, in table order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Palette {
	colors: Box<[i32]>,
}

impl Palette {
	/// Loads and returns a Palette from a reader, where the data is expected to be a run of
	/// 3-byte RGB triples as GIF color tables store them.
	///
	/// # Arguments
	///
	/// * `reader`: the reader to load the color triples from
	/// * `num_colors`: the number of colors in the table to be loaded (<= 256)
	pub fn load_from_bytes<T: ReadBytesExt>(reader: &mut T, num_colors: usize) -> Result<Palette, PaletteError> {
		if num_colors > MAX_COLORS {
			return Err(PaletteError::OutOfRange(num_colors));
		}
		let mut colors = vec![0; num_colors];
		for color in colors.iter_mut() {
			let r = reader.read_u8()?;
			let g = reader.read_u8()?;
			let b = reader.read_u8()?;
			*color = to_rgb32(r, g, b);
		}
		Ok(Palette { colors: colors.into_boxed_slice() })
	}

	/// Returns the number of colors in this palette.
	#[inline]
	pub fn len(&self) -> usize {
		self.colors.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.colors.is_empty()
	}

	/// Returns the color stored at the given table index, or `None` if the index lies beyond
	/// the end of the table.
	#[inline]
	pub fn get(&self, index: usize) -> Option<i32> {
		self.colors.get(index).copied()
	}
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use claim::*;

	use super::*;

	#[test]
	fn packs_rgb_components() {
		assert_eq!(0xff0000, to_rgb32(255, 0, 0));
		assert_eq!(0x00ff00, to_rgb32(0, 255, 0));
		assert_eq!(0x0000ff, to_rgb32(0, 0, 255));
		assert_eq!(0xffffff, to_rgb32(255, 255, 255));
		assert_eq!(0x123456, to_rgb32(0x12, 0x34, 0x56));
	}

	#[test]
	fn num_colors_from_packed_bits() {
		assert_eq!(2, bits_to_num_colors(0));
		assert_eq!(4, bits_to_num_colors(1));
		assert_eq!(256, bits_to_num_colors(7));
	}

	#[test]
	fn loads_color_triples() -> Result<(), PaletteError> {
		let bytes: &[u8] = &[255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255];
		let palette = Palette::load_from_bytes(&mut Cursor::new(bytes), 4)?;
		assert_eq!(4, palette.len());
		assert_eq!(Some(0xff0000), palette.get(0));
		assert_eq!(Some(0x00ff00), palette.get(1));
		assert_eq!(Some(0x0000ff), palette.get(2));
		assert_eq!(Some(0xffffff), palette.get(3));
		assert_eq!(None, palette.get(4));
		Ok(())
	}

	#[test]
	fn rejects_oversized_tables() {
		let result = Palette::load_from_bytes(&mut Cursor::new([0u8; 3 * 512]), 512);
		assert_matches!(result, Err(PaletteError::OutOfRange(512)));
	}

	#[test]
	fn fails_on_short_reads() {
		let result = Palette::load_from_bytes(&mut Cursor::new([0u8; 5]), 4);
		assert_matches!(result, Err(PaletteError::IOError(_)));
	}
}
