//! Fixed-width binary encodings shared by every ISO 9660 structure.
//!
//! ISO 9660 duplicates most numeric fields in both byte orders ("LSB+MSB"
//! fields); the helpers here write and read those dual fields as one unit.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use chrono::{Datelike, TimeZone, Timelike};

use crate::prelude::*;

/// Serialization into a caller-provided buffer. `extent` reports the number
/// of bytes `serialize` will touch.
pub trait IsoSerialize {
  fn extent(&self) -> usize;
  fn serialize(&self, buf: &mut [u8]) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
  Little,
  Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
  /// Single-byte a-characters/d-characters.
  Ascii,
  /// Big-endian UCS-2, as used by Joliet supplementary descriptors.
  Ucs2Be,
}

pub fn put_u16_le(buf: &mut [u8], off: usize, v: u16) {
  LittleEndian::write_u16(&mut buf[off..off + 2], v);
}

pub fn put_u16_be(buf: &mut [u8], off: usize, v: u16) {
  BigEndian::write_u16(&mut buf[off..off + 2], v);
}

pub fn put_u32_le(buf: &mut [u8], off: usize, v: u32) {
  LittleEndian::write_u32(&mut buf[off..off + 4], v);
}

pub fn put_u32_be(buf: &mut [u8], off: usize, v: u32) {
  BigEndian::write_u32(&mut buf[off..off + 4], v);
}

/// Write a 16-bit value as a 4-byte LSB+MSB dual field.
pub fn put_u16_both(buf: &mut [u8], off: usize, v: u16) {
  put_u16_le(buf, off, v);
  put_u16_be(buf, off + 2, v);
}

/// Write a 32-bit value as an 8-byte LSB+MSB dual field.
pub fn put_u32_both(buf: &mut [u8], off: usize, v: u32) {
  put_u32_le(buf, off, v);
  put_u32_be(buf, off + 4, v);
}

pub fn get_u8(buf: &[u8], off: usize) -> u8 {
  buf[off]
}

pub fn get_u16_le(buf: &[u8], off: usize) -> u16 {
  LittleEndian::read_u16(&buf[off..off + 2])
}

pub fn get_u32_le(buf: &[u8], off: usize) -> u32 {
  LittleEndian::read_u32(&buf[off..off + 4])
}

pub fn get_u32_be(buf: &[u8], off: usize) -> u32 {
  BigEndian::read_u32(&buf[off..off + 4])
}

/// Read the little-endian half of a 4-byte LSB+MSB dual field.
pub fn get_u16_both(buf: &[u8], off: usize) -> u16 {
  get_u16_le(buf, off)
}

/// Read the little-endian half of an 8-byte LSB+MSB dual field.
pub fn get_u32_both(buf: &[u8], off: usize) -> u32 {
  get_u32_le(buf, off)
}

/// Write a fixed-width identifier field, right-padded with spaces in the
/// given encoding. Input longer than the field is truncated.
pub fn put_str_field(buf: &mut [u8], off: usize, width: usize, s: &str, encoding: TextEncoding) {
  let field = &mut buf[off..off + width];

  match encoding {
    TextEncoding::Ascii => {
      field.fill(b' ');
      let bytes = s.as_bytes();
      let len = bytes.len().min(width);
      field[..len].copy_from_slice(&bytes[..len]);
    }
    TextEncoding::Ucs2Be => {
      // Space-pad in UCS-2 code units.
      for pair in field.chunks_exact_mut(2) {
        pair[0] = 0x00;
        pair[1] = 0x20;
      }

      let mut units = [0u16; 128];
      let count = ucs2::encode(s, &mut units).unwrap_or(0);
      let count = count.min(width / 2);

      for (ix, unit) in units[..count].iter().enumerate() {
        BigEndian::write_u16(&mut field[ix * 2..ix * 2 + 2], *unit);
      }
    }
  }
}

/// Decode a fixed-width identifier field, trimming the space padding.
pub fn get_str_field(buf: &[u8], off: usize, width: usize, encoding: TextEncoding) -> String {
  let field = &buf[off..off + width];

  match encoding {
    TextEncoding::Ascii => String::from_utf8_lossy(field)
      .trim_end_matches([' ', '\0'])
      .to_string(),
    TextEncoding::Ucs2Be => {
      let units = field
        .chunks_exact(2)
        .map(BigEndian::read_u16)
        .collect::<Vec<_>>();
      let mut bytes = vec![0u8; units.len() * 3];
      let len = ucs2::decode(&units, &mut bytes).unwrap_or(0);
      String::from_utf8_lossy(&bytes[..len])
        .trim_end_matches([' ', '\0'])
        .to_string()
    }
  }
}

/// Encode an identifier into UCS-2 big-endian bytes (Joliet file and
/// directory identifiers).
pub fn ucs2_bytes(s: &str) -> Vec<u8> {
  let mut units = [0u16; 256];
  let count = ucs2::encode(s, &mut units).unwrap_or(0);
  let mut out = Vec::with_capacity(count * 2);
  for unit in &units[..count] {
    out.extend_from_slice(&unit.to_be_bytes());
  }
  out
}

/// 17-byte "digits" timestamp: `YYYYMMDDHHMMSScc` as ASCII digits followed
/// by a GMT offset byte in 15-minute units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsciiDateTime {
  pub year: u16,
  pub month: u8,
  pub day: u8,
  pub hour: u8,
  pub minute: u8,
  pub second: u8,
  pub hundredths: u8,
  pub gmt_offset: i8,
}

impl AsciiDateTime {
  pub const EXTENT: usize = 17;

  /// The all-zero value meaning "not specified".
  pub fn unspecified() -> Self {
    Self {
      year: 0,
      month: 0,
      day: 0,
      hour: 0,
      minute: 0,
      second: 0,
      hundredths: 0,
      gmt_offset: 0,
    }
  }

  pub fn encode(&self, buf: &mut [u8]) {
    let digits = format!(
      "{:04}{:02}{:02}{:02}{:02}{:02}{:02}",
      self.year, self.month, self.day, self.hour, self.minute, self.second, self.hundredths
    );
    buf[..16].copy_from_slice(digits.as_bytes());
    buf[16] = self.gmt_offset as u8;
  }

  pub fn decode(buf: &[u8]) -> Self {
    fn digits(buf: &[u8], off: usize, len: usize) -> u16 {
      std::str::from_utf8(&buf[off..off + len])
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
    }

    Self {
      year: digits(buf, 0, 4),
      month: digits(buf, 4, 2) as u8,
      day: digits(buf, 6, 2) as u8,
      hour: digits(buf, 8, 2) as u8,
      minute: digits(buf, 10, 2) as u8,
      second: digits(buf, 12, 2) as u8,
      hundredths: digits(buf, 14, 2) as u8,
      gmt_offset: buf[16] as i8,
    }
  }

  pub fn to_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
    if self.year == 0 {
      return None;
    }

    chrono::Utc
      .with_ymd_and_hms(
        self.year as i32,
        self.month as u32,
        self.day as u32,
        self.hour as u32,
        self.minute as u32,
        self.second as u32,
      )
      .single()
  }
}

impl<Tz: chrono::TimeZone> From<chrono::DateTime<Tz>> for AsciiDateTime {
  fn from(dt: chrono::DateTime<Tz>) -> Self {
    let dt = dt.with_timezone(&chrono::Utc);

    Self {
      year: dt.year() as u16,
      month: dt.month() as u8,
      day: dt.day() as u8,
      hour: dt.hour() as u8,
      minute: dt.minute() as u8,
      second: dt.second() as u8,
      hundredths: (dt.timestamp_subsec_millis() / 10) as u8,
      gmt_offset: 0,
    }
  }
}

/// 7-byte numerical timestamp used in directory records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedDateTime {
  pub years_since_1900: u8,
  pub month: u8,
  pub day: u8,
  pub hour: u8,
  pub minute: u8,
  pub second: u8,
  pub gmt_offset: i8,
}

impl RecordedDateTime {
  pub const EXTENT: usize = 7;

  pub fn encode(&self, buf: &mut [u8]) {
    buf[0] = self.years_since_1900;
    buf[1] = self.month;
    buf[2] = self.day;
    buf[3] = self.hour;
    buf[4] = self.minute;
    buf[5] = self.second;
    buf[6] = self.gmt_offset as u8;
  }

  pub fn decode(buf: &[u8]) -> Self {
    Self {
      years_since_1900: buf[0],
      month: buf[1],
      day: buf[2],
      hour: buf[3],
      minute: buf[4],
      second: buf[5],
      gmt_offset: buf[6] as i8,
    }
  }

  pub fn to_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::Utc
      .with_ymd_and_hms(
        1900 + self.years_since_1900 as i32,
        self.month as u32,
        self.day as u32,
        self.hour as u32,
        self.minute as u32,
        self.second as u32,
      )
      .single()
  }
}

impl<Tz: chrono::TimeZone> From<chrono::DateTime<Tz>> for RecordedDateTime {
  fn from(dt: chrono::DateTime<Tz>) -> Self {
    let dt = dt.with_timezone(&chrono::Utc);

    Self {
      years_since_1900: (dt.year().max(1900) - 1900) as u8,
      month: dt.month() as u8,
      day: dt.day() as u8,
      hour: dt.hour() as u8,
      minute: dt.minute() as u8,
      second: dt.second() as u8,
      gmt_offset: 0,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dual_fields_carry_both_byte_orders() {
    let mut buf = [0u8; 8];

    put_u16_both(&mut buf, 0, 0x1234);
    assert_eq!(&buf[..4], &[0x34, 0x12, 0x12, 0x34]);
    assert_eq!(get_u16_both(&buf, 0), 0x1234);

    put_u32_both(&mut buf, 0, 0xdeadbeef);
    assert_eq!(&buf[..4], &[0xef, 0xbe, 0xad, 0xde]);
    assert_eq!(&buf[4..], &[0xde, 0xad, 0xbe, 0xef]);
    assert_eq!(get_u32_both(&buf, 0), 0xdeadbeef);
  }

  #[test]
  fn string_fields_round_trip_with_padding() {
    let mut buf = [0u8; 32];
    put_str_field(&mut buf, 0, 32, "LINUX", TextEncoding::Ascii);
    assert_eq!(&buf[..6], b"LINUX ");
    assert_eq!(get_str_field(&buf, 0, 32, TextEncoding::Ascii), "LINUX");
  }

  #[test]
  fn ucs2_fields_round_trip() {
    let mut buf = [0u8; 32];
    put_str_field(&mut buf, 0, 32, "DISC", TextEncoding::Ucs2Be);
    assert_eq!(&buf[..8], &[0x00, b'D', 0x00, b'I', 0x00, b'S', 0x00, b'C']);
    assert_eq!(get_str_field(&buf, 0, 32, TextEncoding::Ucs2Be), "DISC");
  }

  #[test]
  fn ascii_datetime_round_trips() {
    let dt = AsciiDateTime {
      year: 2024,
      month: 6,
      day: 1,
      hour: 12,
      minute: 30,
      second: 5,
      hundredths: 0,
      gmt_offset: 0,
    };

    let mut buf = [0u8; 17];
    dt.encode(&mut buf);
    assert_eq!(&buf[..16], b"2024060112300500");
    assert_eq!(AsciiDateTime::decode(&buf), dt);
  }

  #[test]
  fn recorded_datetime_round_trips() {
    let dt = RecordedDateTime {
      years_since_1900: 124,
      month: 6,
      day: 1,
      hour: 12,
      minute: 30,
      second: 5,
      gmt_offset: 0,
    };

    let mut buf = [0u8; 7];
    dt.encode(&mut buf);
    assert_eq!(RecordedDateTime::decode(&buf), dt);
  }
}
