
//! Bit-field extraction and the (32,26) Hamming parity code.
//!
//! Navigation words arrive MSB-first; signed fields are two's complement.
//! The parity helpers work on 30-bit transmitted words: 24 data bits
//! complemented by the previous word's last bit, then 6 parity bits formed
//! over the decoded data and the previous word's last two bits.

use crate::Error;

pub fn to_u32(bits: &[bool]) -> u32 {
	debug_assert!(bits.len() <= 32);
	bits.iter().fold(0u32, |acc, b| (acc << 1) | (*b as u32))
}

pub fn to_i32(bits: &[bool]) -> i32 {
	let n = bits.len();
	debug_assert!(n >= 2 && n <= 32);
	let raw = to_u32(bits) as i64;
	if bits[0] { (raw - (1i64 << n)) as i32 } else { raw as i32 }
}

pub fn to_u8(bits: &[bool]) -> u8 { to_u32(bits) as u8 }
pub fn to_u16(bits: &[bool]) -> u16 { to_u32(bits) as u16 }
pub fn to_i8(bits: &[bool]) -> i8 { to_i32(bits) as i8 }
pub fn to_i16(bits: &[bool]) -> i16 { to_i32(bits) as i16 }

/// The six parity bits over 24 decoded data bits and the last two bits of
/// the previous word
pub fn parity_bits(d: &[bool], last_d29: bool, last_d30: bool) -> [bool; 6] {
	debug_assert_eq!(d.len(), 24);
	[
		last_d29 ^ d[0] ^ d[1] ^ d[2] ^ d[4] ^ d[5] ^ d[9]  ^ d[10] ^ d[11] ^ d[12] ^ d[13] ^ d[16] ^ d[17] ^ d[19] ^ d[22],
		last_d30 ^ d[1] ^ d[2] ^ d[3] ^ d[5] ^ d[6] ^ d[10] ^ d[11] ^ d[12] ^ d[13] ^ d[14] ^ d[17] ^ d[18] ^ d[20] ^ d[23],
		last_d29 ^ d[0] ^ d[2] ^ d[3] ^ d[4] ^ d[6] ^ d[7]  ^ d[11] ^ d[12] ^ d[13] ^ d[14] ^ d[15] ^ d[18] ^ d[19] ^ d[21],
		last_d30 ^ d[1] ^ d[3] ^ d[4] ^ d[5] ^ d[7] ^ d[8]  ^ d[12] ^ d[13] ^ d[14] ^ d[15] ^ d[16] ^ d[19] ^ d[20] ^ d[22],
		last_d30 ^ d[0] ^ d[2] ^ d[4] ^ d[5] ^ d[6] ^ d[8]  ^ d[9]  ^ d[13] ^ d[14] ^ d[15] ^ d[16] ^ d[17] ^ d[20] ^ d[21] ^ d[23],
		last_d29 ^ d[2] ^ d[4] ^ d[5] ^ d[7] ^ d[8] ^ d[9]  ^ d[10] ^ d[12] ^ d[14] ^ d[18] ^ d[21] ^ d[22] ^ d[23],
	]
}

/// Checks one 30-bit transmitted word against its trailing parity bits
pub fn parity_check(word: &[bool], last_d29: bool, last_d30: bool) -> bool {
	debug_assert_eq!(word.len(), 30);
	let d:Vec<bool> = word.iter().take(24).map(|b| b ^ last_d30).collect();
	let parity = parity_bits(&d, last_d29, last_d30);
	word.iter().skip(24).zip(parity.iter()).all(|(a, b)| a == b)
}

/// Checks all ten words of a subframe and strips the parity bits, undoing
/// the data complement.  The first word is checked against zero priors,
/// which holds because the last two parity bits of every word 10 are forced
/// to zero at encoding time.
pub fn data_recover(subframe: &[bool; 300]) -> Result<[bool; 240], Error> {
	for w in 0..10 {
		let (d29, d30) = if w == 0 { (false, false) } else { (subframe[30 * w - 2], subframe[30 * w - 1]) };
		if !parity_check(&subframe[30 * w..30 * (w + 1)], d29, d30) {
			return Err(Error::InvalidTelemetryData("word parity check failed"));
		}
	}

	let mut data = [false; 240];
	for bit in 0..24 { data[bit] = subframe[bit]; }
	for w in 1..10 {
		let d30 = subframe[30 * w - 1];
		for bit in 0..24 { data[24 * w + bit] = subframe[30 * w + bit] ^ d30; }
	}
	Ok(data)
}

#[cfg(test)]
pub(crate) mod test_encode {

	use super::parity_bits;

	/// Encodes 24 data bits into one transmitted word.  For words whose last
	/// two data bits are reserved (HOW and word 10), `solve_tail` picks them
	/// so the word ends with two zero parity bits.
	pub fn encode_word(data: &[bool; 24], last_d29: bool, last_d30: bool, solve_tail: bool) -> [bool; 30] {
		let mut d = *data;
		if solve_tail {
			d[23] = false;
			d[23] = parity_bits(&d, last_d29, last_d30)[4];
			d[22] = false;
			d[22] = parity_bits(&d, last_d29, last_d30)[5];
		}
		let parity = parity_bits(&d, last_d29, last_d30);
		let mut word = [false; 30];
		for i in 0..24 { word[i] = d[i] ^ last_d30; }
		word[24..30].copy_from_slice(&parity);
		word
	}

	/// Encodes 240 data bits into a 300-bit subframe, chaining parity priors
	/// word to word.  Words 2 and 10 get their reserved bits solved so that
	/// downstream priors work out to zero at each subframe boundary.
	pub fn encode_subframe(data: &[bool; 240]) -> [bool; 300] {
		let mut out = [false; 300];
		let mut d29 = false;
		let mut d30 = false;
		for w in 0..10 {
			let mut word_data = [false; 24];
			word_data.copy_from_slice(&data[24 * w..24 * (w + 1)]);
			let word = encode_word(&word_data, d29, d30, w == 1 || w == 9);
			out[30 * w..30 * (w + 1)].copy_from_slice(&word);
			d29 = word[28];
			d30 = word[29];
		}
		out
	}

	/// Writes `value` into `bits[range]` MSB-first; signed values pass
	/// through their two's-complement representation
	pub fn set_bits(bits: &mut [bool], start: usize, len: usize, value: u64) {
		for i in 0..len {
			bits[start + i] = (value >> (len - 1 - i)) & 1 == 1;
		}
	}

}

#[cfg(test)]
mod tests {

	use super::*;
	use super::test_encode::*;

	#[test]
	fn signed_fields_decode_as_twos_complement() {
		let mut bits = [false; 8];
		set_bits(&mut bits, 0, 8, (-5i8 as u8) as u64);
		assert_eq!(to_i8(&bits), -5);
		set_bits(&mut bits, 0, 8, 0x7F);
		assert_eq!(to_i8(&bits), 127);

		let mut bits = [false; 16];
		set_bits(&mut bits, 0, 16, (-12345i16 as u16) as u64);
		assert_eq!(to_i16(&bits), -12345);
		assert_eq!(to_u16(&bits), (-12345i16) as u16);
	}

	#[test]
	fn parity_round_trip() {
		let mut data = [false; 24];
		set_bits(&mut data, 0, 24, 0xA5_13_7E);
		let word = encode_word(&data, true, false, false);
		assert!(parity_check(&word, true, false));

		// Any single flipped bit must be caught
		for i in 0..30 {
			let mut bad = word;
			bad[i] = !bad[i];
			assert!(!parity_check(&bad, true, false), "flip at {} undetected", i);
		}
	}

	#[test]
	fn subframe_recovery_round_trip() {
		let mut data = [false; 240];
		for w in 0..10 {
			set_bits(&mut data, 24 * w, 24, (0x123456 * (w as u64 + 1)) & 0xFF_FF_FF);
		}
		let encoded = encode_subframe(&data);
		let recovered = data_recover(&encoded).unwrap();

		// Reserved tail bits of words 2 and 10 are rewritten by the encoder
		for w in 0..10 {
			let n = if w == 1 || w == 9 { 22 } else { 24 };
			assert_eq!(&recovered[24 * w..24 * w + n], &data[24 * w..24 * w + n], "word {}", w);
		}

		// Word 10 must leave zero priors for the next subframe's first word
		assert!(!encoded[298] && !encoded[299]);
	}

	#[test]
	fn corrupted_subframe_rejected() {
		let data = [false; 240];
		let mut encoded = encode_subframe(&data);
		encoded[150] = !encoded[150];
		assert_eq!(data_recover(&encoded), Err(Error::InvalidTelemetryData("word parity check failed")));
	}

}
