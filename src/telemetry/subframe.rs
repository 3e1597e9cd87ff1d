
//! Navigation subframe field extraction.
//!
//! Operates on the 240 data bits left after parity stripping.  Field
//! positions are in data-only coordinates; scale factors follow the
//! interface specification.  Angles stay in semicircles here and are
//! converted to radians where the orbit is evaluated.

use serde::{Serialize, Deserialize};

use crate::telemetry::bits;
use crate::Error;

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Subframe {
	/// Truncated TOW count from the handover word; refers to the start of
	/// the next subframe
	pub time_of_week_truncated: u32,
	pub subframe_id: u8,
	pub body: SubframeBody,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub enum SubframeBody {
	Subframe1(Subframe1),
	Subframe2(Subframe2),
	Subframe3(Subframe3),
	/// Almanac and ionosphere pages, carried but not parsed
	Other,
}

/// Clock correction and health
#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Subframe1 {
	pub week_number: u16,
	pub ura_index: u8,
	pub sv_health: u8,
	pub iodc: u16,
	pub t_gd: f64,
	pub t_oc: u32,
	pub a_f2: f64,
	pub a_f1: f64,
	pub a_f0: f64,
}

/// First half of the ephemeris
#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Subframe2 {
	pub iode: u8,
	pub crs: f64,
	pub dn: f64,
	pub m0: f64,
	pub cuc: f64,
	pub e: f64,
	pub cus: f64,
	pub sqrt_a: f64,
	pub t_oe: f64,
	pub fit_interval: bool,
}

/// Second half of the ephemeris
#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Subframe3 {
	pub cic: f64,
	pub omega0: f64,
	pub cis: f64,
	pub i0: f64,
	pub crc: f64,
	pub omega: f64,
	pub omega_dot: f64,
	pub iode: u8,
	pub idot: f64,
}

impl Subframe {

	/// TOW in seconds of the week at the start of the next subframe
	pub fn time_of_week(&self) -> f64 { (self.time_of_week_truncated as f64) * 6.0 }

}

pub fn decode(data: &[bool; 240]) -> Result<Subframe, Error> {
	let time_of_week_truncated = bits::to_u32(&data[24..41]);
	if time_of_week_truncated > 100_799 {
		return Err(Error::InvalidTelemetryData("TOW count past the end of the week"));
	}
	let subframe_id = bits::to_u8(&data[43..46]);

	let body = match subframe_id {
		1 => SubframeBody::Subframe1(decode_subframe1(data)),
		2 => SubframeBody::Subframe2(decode_subframe2(data)),
		3 => SubframeBody::Subframe3(decode_subframe3(data)),
		4 | 5 => SubframeBody::Other,
		_ => return Err(Error::InvalidTelemetryData("subframe ID outside 1 through 5")),
	};

	Ok(Subframe{ time_of_week_truncated, subframe_id, body })
}

fn decode_subframe1(data: &[bool; 240]) -> Subframe1 {
	Subframe1{
		week_number: bits::to_u16(&data[48..58]),
		ura_index:   bits::to_u8(&data[60..64]),
		sv_health:   bits::to_u8(&data[64..70]),
		iodc:        bits::to_u16(&[&data[70..72], &data[168..176]].concat()),
		t_gd:       (bits::to_i8(&data[160..168]) as f64) * 2.0_f64.powi(-31),
		t_oc:        bits::to_u32(&data[176..192]) * 16,
		a_f2:       (bits::to_i8(&data[192..200]) as f64) * 2.0_f64.powi(-55),
		a_f1:       (bits::to_i16(&data[200..216]) as f64) * 2.0_f64.powi(-43),
		a_f0:       (bits::to_i32(&data[216..238]) as f64) * 2.0_f64.powi(-31),
	}
}

fn decode_subframe2(data: &[bool; 240]) -> Subframe2 {
	Subframe2{
		iode:    bits::to_u8(&data[48..56]),
		crs:    (bits::to_i16(&data[56..72]) as f64) * 2.0_f64.powi(-5),
		dn:     (bits::to_i16(&data[72..88]) as f64) * 2.0_f64.powi(-43),
		m0:     (bits::to_i32(&data[88..120]) as f64) * 2.0_f64.powi(-31),
		cuc:    (bits::to_i16(&data[120..136]) as f64) * 2.0_f64.powi(-29),
		e:      (bits::to_u32(&data[136..168]) as f64) * 2.0_f64.powi(-33),
		cus:    (bits::to_i16(&data[168..184]) as f64) * 2.0_f64.powi(-29),
		sqrt_a: (bits::to_u32(&data[184..216]) as f64) * 2.0_f64.powi(-19),
		t_oe:   (bits::to_u16(&data[216..232]) as f64) * 2.0_f64.powi(4),
		fit_interval: data[233],
	}
}

fn decode_subframe3(data: &[bool; 240]) -> Subframe3 {
	Subframe3{
		cic:       (bits::to_i16(&data[48..64]) as f64) * 2.0_f64.powi(-29),
		omega0:    (bits::to_i32(&data[64..96]) as f64) * 2.0_f64.powi(-31),
		cis:       (bits::to_i16(&data[96..112]) as f64) * 2.0_f64.powi(-29),
		i0:        (bits::to_i32(&data[112..144]) as f64) * 2.0_f64.powi(-31),
		crc:       (bits::to_i16(&data[144..160]) as f64) * 2.0_f64.powi(-5),
		omega:     (bits::to_i32(&data[160..192]) as f64) * 2.0_f64.powi(-31),
		omega_dot: (bits::to_i32(&data[192..216]) as f64) * 2.0_f64.powi(-43),
		iode:       bits::to_u8(&data[216..224]),
		idot:      (bits::to_i16(&data[224..238]) as f64) * 2.0_f64.powi(-43),
	}
}
