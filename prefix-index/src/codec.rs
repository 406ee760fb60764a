//! Derivation of fixed-bit-length prefixes from digests and from hash-prefix text.
//!
//! A prefix is always taken from the leading 32 bits of a digest read big-endian.
//! Narrowing a prefix only drops its trailing bits, so the `b`-bit prefix of a digest
//! is always the first `b` characters of its 32-bit rendering.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Number of leading digest bytes a prefix is derived from.
pub const PREFIX_BYTES: usize = 4;

/// Widest supported prefix in bits.
pub const MAX_BIT_LENGTH: u8 = 32;

/// Bit length of a Safe Browsing v4 short hash.
pub const DEFAULT_BIT_LENGTH: BitLength = BitLength(MAX_BIT_LENGTH);

/// Validated prefix width in bits, always in `1..=32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BitLength(u8);

impl BitLength {
    pub fn new(bits: u8) -> Result<Self> {
        if (1..=MAX_BIT_LENGTH).contains(&bits) {
            Ok(Self(bits))
        } else {
            Err(Error::InvalidBitLength(bits.to_string()))
        }
    }

    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Number of low bits dropped from a 32-bit word to keep this many leading bits.
    #[inline]
    const fn shift(self) -> u32 {
        (MAX_BIT_LENGTH - self.0) as u32
    }
}

impl Default for BitLength {
    fn default() -> Self {
        DEFAULT_BIT_LENGTH
    }
}

impl fmt::Display for BitLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BitLength {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bits: u8 = s.trim().parse().map_err(|_| Error::InvalidBitLength(s.to_string()))?;
        Self::new(bits)
    }
}

/// Text representation of an externally supplied prefix population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixEncoding {
    /// Canonical left-to-right bit string, e.g. `0001001000110100`.
    Binary,
    /// Fixed-width hexadecimal hash prefix, e.g. `12345678`.
    Hex,
}

impl fmt::Display for PrefixEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixEncoding::Binary => f.write_str("binary"),
            PrefixEncoding::Hex => f.write_str("hex"),
        }
    }
}

/// The leading `bits` bits of a digest.
///
/// The value holds those bits right-aligned; `Display` renders the canonical
/// zero-padded bit string. Two prefixes are only equal when both the width and the
/// bits agree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Prefix {
    bits: BitLength,
    value: u32,
}

impl Prefix {
    /// Keeps the leading `bits` bits of a 32-bit word.
    #[inline]
    pub fn from_u32(word: u32, bits: BitLength) -> Self {
        Self { bits, value: word >> bits.shift() }
    }

    #[inline]
    pub fn bits(&self) -> BitLength {
        self.bits
    }

    #[inline]
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Drops trailing bits so the prefix is `bits` wide. Widening is not possible.
    pub fn truncate(self, bits: BitLength) -> Result<Self> {
        if bits > self.bits {
            return Err(Error::WidenPrefix { from: self.bits, to: bits });
        }
        Ok(Self { bits, value: self.value >> (self.bits.get() - bits.get()) })
    }

    /// Parses a canonical bit string of 1 to 32 `0`/`1` characters.
    pub fn from_bit_str(text: &str) -> Result<Self> {
        let malformed = || Error::MalformedPrefix {
            text: text.to_string(),
            encoding: PrefixEncoding::Binary,
        };

        let bits = u8::try_from(text.len())
            .ok()
            .and_then(|n| BitLength::new(n).ok())
            .ok_or_else(malformed)?;
        let mut value = 0u32;
        for c in text.bytes() {
            let bit = match c {
                b'0' => 0,
                b'1' => 1,
                _ => return Err(malformed()),
            };
            value = (value << 1) | bit;
        }

        Ok(Self { bits, value })
    }

    /// Normalizes a hexadecimal hash prefix to a `bits`-wide prefix.
    ///
    /// The hex text is read as the leading `4 * len` bits of a digest, so `"1234"`
    /// narrowed to 16 bits and `"12345678"` narrowed to 16 bits are the same prefix.
    /// Prefixes longer than four bytes, as kept by Safe Browsing stores, must be whole
    /// bytes and only their first four bytes are read. Text narrower than `bits` is
    /// rejected rather than zero-filled.
    pub fn from_hex(text: &str, bits: BitLength) -> Result<Self> {
        let malformed = || Error::MalformedPrefix {
            text: text.to_string(),
            encoding: PrefixEncoding::Hex,
        };

        let max_digits = PREFIX_BYTES * 2;
        if text.is_empty() || (text.len() > max_digits && text.len() % 2 != 0) {
            return Err(malformed());
        }

        let mut word = 0u32;
        for (i, c) in text.bytes().enumerate() {
            let nibble = hex_to_nibble(c).ok_or_else(malformed)?;
            if i < max_digits {
                word = (word << 4) | nibble as u32;
            }
        }

        let width = text.len().min(max_digits) as u32 * 4;
        if width < bits.get() as u32 {
            return Err(Error::PrefixTooNarrow {
                text: text.to_string(),
                encoding: PrefixEncoding::Hex,
                width,
                bits,
            });
        }

        // Left-align so the first hex digit lands in the top nibble.
        let word = if width == 32 { word } else { word << (32 - width) };
        Ok(Self::from_u32(word, bits))
    }

    /// Parses one externally supplied prefix in the given encoding at width `bits`.
    ///
    /// Binary text must already be exactly `bits` wide; hex text is normalized.
    pub fn parse(text: &str, encoding: PrefixEncoding, bits: BitLength) -> Result<Self> {
        let text = text.trim();
        match encoding {
            PrefixEncoding::Binary => {
                let prefix = Self::from_bit_str(text)?;
                if prefix.bits != bits {
                    return Err(Error::BitLengthMismatch { expected: bits, found: prefix.bits });
                }
                Ok(prefix)
            }
            PrefixEncoding::Hex => Self::from_hex(text, bits),
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$b}", self.value, width = self.bits.get() as usize)
    }
}

impl fmt::Debug for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Prefix({self})")
    }
}

impl FromStr for Prefix {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_bit_str(s)
    }
}

impl Serialize for Prefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Prefix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_bit_str(&text).map_err(serde::de::Error::custom)
    }
}

/// Convert hex ASCII character to nibble value (0-15)
#[inline]
pub fn hex_to_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

/// Reads the first four bytes of a digest as a big-endian integer.
#[inline]
pub fn leading_u32(digest: &[u8]) -> Result<u32> {
    let head: [u8; PREFIX_BYTES] = digest
        .get(..PREFIX_BYTES)
        .and_then(|head| head.try_into().ok())
        .ok_or(Error::DigestTooShort { len: digest.len() })?;
    Ok(u32::from_be_bytes(head))
}

/// Derives the `bits`-wide prefix of a digest.
///
/// Digests shorter than four bytes are rejected, never padded.
#[inline]
pub fn prefix(digest: &[u8], bits: BitLength) -> Result<Prefix> {
    Ok(Prefix::from_u32(leading_u32(digest)?, bits))
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    fn bits(n: u8) -> BitLength {
        BitLength::new(n).unwrap()
    }

    #[test]
    fn test_hex_to_nibble() {
        assert_eq!(hex_to_nibble(b'0'), Some(0));
        assert_eq!(hex_to_nibble(b'9'), Some(9));
        assert_eq!(hex_to_nibble(b'A'), Some(10));
        assert_eq!(hex_to_nibble(b'F'), Some(15));
        assert_eq!(hex_to_nibble(b'a'), Some(10));
        assert_eq!(hex_to_nibble(b'f'), Some(15));
        assert_eq!(hex_to_nibble(b'g'), None);
    }

    #[test]
    fn test_bit_length_bounds() {
        assert!(BitLength::new(0).is_err());
        assert!(BitLength::new(33).is_err());
        assert_eq!(BitLength::new(1).unwrap().get(), 1);
        assert_eq!(BitLength::new(32).unwrap(), DEFAULT_BIT_LENGTH);
        assert_eq!("18".parse::<BitLength>().unwrap().get(), 18);
        assert!("x".parse::<BitLength>().is_err());
    }

    #[test]
    fn test_prefix_16_bits() {
        let digest = hex!("12345678 9abcdef0");
        assert_eq!(prefix(&digest, bits(16)).unwrap().to_string(), "0001001000110100");
    }

    #[test]
    fn test_prefix_32_bits_is_zero_padded() {
        let digest = hex!("00000001");
        assert_eq!(prefix(&digest, bits(32)).unwrap().to_string(), "0".repeat(31) + "1");
    }

    #[test]
    fn test_prefix_rejects_short_digest() {
        let err = prefix(&hex!("123456"), bits(8)).unwrap_err();
        assert!(matches!(err, Error::DigestTooShort { len: 3 }));
    }

    #[test]
    fn test_prefix_monotonicity() {
        let digest = hex!("ddf3b5a4cf0acbc3ee90e2daa0bb3b5d3ca5d0fa1e8e48e1b1d0a0d31a2c5f01");
        let widest = prefix(&digest, bits(32)).unwrap().to_string();
        for b1 in 1..=32u8 {
            let narrow = prefix(&digest, bits(b1)).unwrap();
            assert_eq!(narrow.to_string(), widest[..b1 as usize]);
            for b2 in b1..=32u8 {
                let wide = prefix(&digest, bits(b2)).unwrap();
                assert_eq!(wide.truncate(bits(b1)).unwrap(), narrow);
            }
        }
    }

    #[test]
    fn test_truncate_cannot_widen() {
        let p = Prefix::from_u32(0x1234_5678, bits(8));
        assert!(matches!(p.truncate(bits(9)), Err(Error::WidenPrefix { .. })));
    }

    #[test]
    fn test_bit_str_roundtrip() {
        let p = Prefix::from_bit_str("0001001000110100").unwrap();
        assert_eq!(p.bits(), bits(16));
        assert_eq!(p.value(), 0x1234);
        assert_eq!(p.to_string(), "0001001000110100");
    }

    #[test]
    fn test_bit_str_rejects_garbage() {
        assert!(Prefix::from_bit_str("").is_err());
        assert!(Prefix::from_bit_str("0120").is_err());
        assert!(Prefix::from_bit_str(&"1".repeat(33)).is_err());
    }

    #[test]
    fn test_hex_normalization() {
        let p = Prefix::from_hex("12345678", bits(32)).unwrap();
        assert_eq!(p.to_string(), "00010010001101000101011001111000");

        // Same leading bits whether the hex is 4 or 8 digits wide.
        assert_eq!(
            Prefix::from_hex("1234", bits(16)).unwrap(),
            Prefix::from_hex("12345678", bits(16)).unwrap()
        );
        assert_eq!(Prefix::from_hex("ABCD0000", bits(16)).unwrap().to_string(), "1010101111001101");
    }

    #[test]
    fn test_hex_guards() {
        assert!(matches!(
            Prefix::from_hex("1234", bits(32)),
            Err(Error::PrefixTooNarrow { width: 16, .. })
        ));
        assert!(matches!(
            Prefix::from_hex("12g45678", bits(32)),
            Err(Error::MalformedPrefix { encoding: PrefixEncoding::Hex, .. })
        ));
        assert!(Prefix::from_hex("123456789", bits(32)).is_err());
        assert!(Prefix::from_hex("", bits(8)).is_err());
        assert!(Prefix::from_hex("12345678zz", bits(32)).is_err());
    }

    #[test]
    fn test_long_hex_reads_leading_four_bytes() {
        let short = Prefix::from_hex("73d986e0", bits(32)).unwrap();
        assert_eq!(Prefix::from_hex("73d986e009065f182c10", bits(32)).unwrap(), short);
        assert_eq!(Prefix::from_hex("73D986E00906", bits(16)).unwrap().to_string(), "0111001111011001");
    }

    #[test]
    fn test_raw_hex_is_never_read_as_binary() {
        // "10101010" is valid in both encodings and means different prefixes.
        let as_hex = Prefix::parse("10101010", PrefixEncoding::Hex, bits(8)).unwrap();
        let as_bin = Prefix::parse("10101010", PrefixEncoding::Binary, bits(8)).unwrap();
        assert_eq!(as_hex.to_string(), "00010000");
        assert_eq!(as_bin.to_string(), "10101010");
        assert_ne!(as_hex, as_bin);
    }

    #[test]
    fn test_parse_binary_width_must_match() {
        let err = Prefix::parse("0101", PrefixEncoding::Binary, bits(8)).unwrap_err();
        assert!(matches!(err, Error::BitLengthMismatch { .. }));
        assert!(Prefix::parse(" 0101\r", PrefixEncoding::Binary, bits(4)).is_ok());
    }

    #[test]
    fn test_serde_as_bit_string() {
        let p = Prefix::from_bit_str("101").unwrap();
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"101\"");
        let back: Prefix = serde_json::from_str("\"101\"").unwrap();
        assert_eq!(back, p);
    }
}
