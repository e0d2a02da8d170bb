//! GIF-variant LZW (Lempel-Ziv-Welch) decompression.
//!
//! The GIF-specific properties handled here are:
//!
//! * The code stream is chopped into a series of data sub-blocks of at most 255 bytes, each
//!   preceded by a one-byte length, with the series terminated by a zero-length block.
//! * Codes have a variable bit width. The width starts at `minimum code size + 1` (the minimum
//!   code size itself must be between 2 and 8) and grows as the code table fills, up to a
//!   maximum of 12 bits. The table never grows past 4096 entries; once full, codes simply keep
//!   their 12-bit width.
//! * Codes are packed into bytes least-significant-bit first, across byte boundaries.
//! * Two code values are reserved: a "clear code" which resets the table and the code width,
//!   and an "end of information" code which terminates the stream. A well-formed stream starts
//!   with a clear code and ends with an end of information code, immediately followed by the
//!   sub-block terminator.
//!
//! The code table is kept as flat prefix/pixel arrays rather than materialized byte strings.
//! Each table entry extends an earlier phrase by one pixel, so a phrase is reproduced by
//! walking the prefix links backwards and emitting the collected pixels in reverse. An entry is
//! created as soon as its prefix phrase has been decoded, with its final pixel left unresolved
//! until the next phrase arrives; a code that references the entry still awaiting its pixel is
//! the classic `KwKwK` self-reference case.

use byteorder::ReadBytesExt;
use thiserror::Error;

type LzwCode = u16;

const GIF_MAX_CODE_SIZE_BITS: usize = 8;
const MIN_BITS: usize = 2;
const MAX_BITS: usize = 12;
const MAX_TABLE_SIZE: usize = 1 << MAX_BITS;

#[derive(Error, Debug)]
pub enum LzwError {
	#[error("Code size bits {0} is unsupported")]
	UnsupportedCodeSizeBits(usize),

	#[error("Decoding error: {0}")]
	DecodingError(String),

	#[error("LZW I/O error")]
	IOError(#[from] std::io::Error),
}

fn is_valid_gif_min_code_size_bits(min_code_size_bits: usize) -> bool {
	(MIN_BITS..=GIF_MAX_CODE_SIZE_BITS).contains(&min_code_size_bits)
}

fn get_bitmask_for_bits(bits: usize) -> u32 {
	1_u32.wrapping_shl(bits as u32) - 1
}

#[derive(Debug)]
struct LzwByteUnpacker {
	buffer: u32,
	buffer_length: usize,
	current_bit_size: usize,
	bitmask: u32,
	initial_bit_size: usize,
}

impl LzwByteUnpacker {
	pub fn new(initial_bit_size: usize) -> Self {
		LzwByteUnpacker {
			buffer: 0,
			buffer_length: 0,
			current_bit_size: initial_bit_size,
			bitmask: get_bitmask_for_bits(initial_bit_size),
			initial_bit_size,
		}
	}

	pub fn increase_bit_size(&mut self) -> Result<(), LzwError> {
		if self.current_bit_size >= MAX_BITS {
			return Err(LzwError::UnsupportedCodeSizeBits(self.current_bit_size + 1));
		}
		self.current_bit_size += 1;
		self.bitmask = get_bitmask_for_bits(self.current_bit_size);
		Ok(())
	}

	pub fn reset_bit_size(&mut self) {
		self.current_bit_size = self.initial_bit_size;
		self.bitmask = get_bitmask_for_bits(self.current_bit_size);
	}

	pub fn push_byte(&mut self, byte: u8) {
		self.buffer |= (byte as u32).wrapping_shl(self.buffer_length as u32);
		self.buffer_length += 8;
	}

	pub fn take_code(&mut self) -> Option<LzwCode> {
		if self.buffer_length >= self.current_bit_size {
			let code = (self.buffer & self.bitmask) as LzwCode;
			self.buffer = self.buffer.wrapping_shr(self.current_bit_size as u32);
			self.buffer_length -= self.current_bit_size;
			Some(code)
		} else {
			None
		}
	}

	/// Returns true if every bit still sitting in the buffer is zero. Encoders pad the final
	/// byte of the stream with zero bits, so anything else after the end of information code
	/// means the stream carries data it should not.
	pub fn has_clear_padding(&self) -> bool {
		self.buffer == 0
	}
}

#[derive(Debug)]
struct LzwBytesReader {
	unpacker: LzwByteUnpacker,
	sub_block_remaining_bytes: u8,
	reached_end: bool,
}

impl LzwBytesReader {
	pub fn new(code_size_bits: usize) -> Self {
		LzwBytesReader {
			unpacker: LzwByteUnpacker::new(code_size_bits),
			sub_block_remaining_bytes: 0,
			reached_end: false,
		}
	}

	fn read_byte<T: ReadBytesExt>(&mut self, reader: &mut T) -> Result<Option<u8>, LzwError> {
		if self.reached_end {
			return Ok(None);
		}
		// if we reached the end of the current sub-block, read the length of the next one.
		// a length of zero is the terminator for the whole series of sub-blocks.
		if self.sub_block_remaining_bytes == 0 {
			self.sub_block_remaining_bytes = match reader.read_u8() {
				Ok(length) => length,
				Err(error) if error.kind() == std::io::ErrorKind::UnexpectedEof => {
					return Err(LzwError::DecodingError(String::from("Premature end of sub-block series")));
				}
				Err(error) => return Err(LzwError::IOError(error)),
			};
			if self.sub_block_remaining_bytes == 0 {
				self.reached_end = true;
				return Ok(None);
			}
		}

		self.sub_block_remaining_bytes -= 1;
		match reader.read_u8() {
			Ok(byte) => Ok(Some(byte)),
			Err(error) if error.kind() == std::io::ErrorKind::UnexpectedEof => {
				Err(LzwError::DecodingError(String::from("Premature end of sub-block series")))
			}
			Err(error) => Err(LzwError::IOError(error)),
		}
	}

	pub fn read_code<T: ReadBytesExt>(&mut self, reader: &mut T) -> Result<LzwCode, LzwError> {
		loop {
			if let Some(code) = self.unpacker.take_code() {
				return Ok(code);
			}
			match self.read_byte(reader)? {
				Some(byte) => self.unpacker.push_byte(byte),
				None => return Err(LzwError::DecodingError(String::from("Unexpected end of code stream"))),
			}
		}
	}

	/// Verifies the stream ends exactly where it should: nothing buffered past the end of
	/// information code, no bytes left in the current sub-block, and the series terminator
	/// present right after it.
	pub fn finish<T: ReadBytesExt>(&mut self, reader: &mut T) -> Result<(), LzwError> {
		if !self.unpacker.has_clear_padding() {
			return Err(LzwError::DecodingError(String::from("Non-zero padding bits after end of information code")));
		}
		if self.reached_end {
			return Ok(());
		}
		if self.sub_block_remaining_bytes != 0 {
			return Err(LzwError::DecodingError(String::from("Trailing bytes after end of information code")));
		}
		match reader.read_u8() {
			Ok(0) => {
				self.reached_end = true;
				Ok(())
			}
			Ok(_) => Err(LzwError::DecodingError(String::from("Missing sub-block series terminator"))),
			Err(error) if error.kind() == std::io::ErrorKind::UnexpectedEof => {
				Err(LzwError::DecodingError(String::from("Premature end of sub-block series")))
			}
			Err(error) => Err(LzwError::IOError(error)),
		}
	}
}

/// Decodes one image's worth of LZW-compressed data read from `src`, calling `output` once per
/// decoded pixel in stream order. `src` must be positioned at the first data sub-block; the
/// minimum code size byte that precedes it is passed in as `min_code_size`. On success the
/// whole sub-block series, including its terminator, has been consumed.
pub fn lzw_decode<S, F>(src: &mut S, min_code_size: usize, mut output: F) -> Result<(), LzwError>
where
	S: ReadBytesExt,
	F: FnMut(u8),
{
	if !is_valid_gif_min_code_size_bits(min_code_size) {
		return Err(LzwError::UnsupportedCodeSizeBits(min_code_size));
	}

	let clear_code = (1 as LzwCode).wrapping_shl(min_code_size as u32);
	let end_of_info_code = clear_code + 1;

	let mut reader = LzwBytesReader::new(min_code_size + 1);
	let mut limit: usize = 1 << (min_code_size + 1);
	let mut next_code = clear_code + 2;

	// table entry `code` extends the phrase of `prefixes[code]` by one pixel. codes below
	// clear_code are literals and never appear in these arrays.
	let mut prefixes = [0 as LzwCode; MAX_TABLE_SIZE];
	let mut pixels = [0u8; MAX_TABLE_SIZE];
	// entry that has been allocated but whose final pixel is still unknown
	let mut incomplete: Option<LzwCode> = None;

	let mut phrase: Vec<u8> = Vec::with_capacity(MAX_TABLE_SIZE);

	if reader.read_code(src)? != clear_code {
		return Err(LzwError::DecodingError(String::from("Code stream does not begin with a clear code")));
	}

	loop {
		let code = reader.read_code(src)?;

		if code == clear_code {
			reader.unpacker.reset_bit_size();
			limit = 1 << (min_code_size + 1);
			next_code = clear_code + 2;
			incomplete = None;
			continue;
		}
		if code == end_of_info_code {
			return reader.finish(src);
		}
		if code >= next_code {
			return Err(LzwError::DecodingError(format!("Code {} is not in the table (next free code is {})", code, next_code)));
		}

		// unroll the phrase by walking prefix links down to a literal. the pixels come out
		// back to front.
		phrase.clear();
		let mut current = code;
		while current >= clear_code {
			phrase.push(pixels[current as usize]);
			current = prefixes[current as usize];
		}
		phrase.push(current as u8);

		let first_pixel = *phrase.last().unwrap();
		if let Some(entry) = incomplete.take() {
			pixels[entry as usize] = first_pixel;
			if code == entry {
				// self-reference: the phrase ends with its own first pixel
				phrase[0] = first_pixel;
			}
		}

		for &pixel in phrase.iter().rev() {
			output(pixel);
		}

		if (next_code as usize) < MAX_TABLE_SIZE {
			prefixes[next_code as usize] = code;
			incomplete = Some(next_code);
			// this table runs one entry ahead of the codes actually seen, so the width has
			// to grow as soon as an entry is assigned the first code the current width
			// cannot represent
			if next_code as usize == limit && reader.unpacker.current_bit_size < MAX_BITS {
				reader.unpacker.increase_bit_size()?;
				limit <<= 1;
			}
			next_code += 1;
		}
	}
}
