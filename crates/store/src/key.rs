//! Order-preserving tuple keys.
//!
//! A key is a tuple of string and integer parts. The byte encoding sorts the
//! same way the tuples do: strings bytewise, integers numerically, and a tuple
//! before any tuple it is a prefix of. Prefix scans over a partial tuple
//! therefore translate into byte-range scans on the backend.

use std::fmt;

use beacon_core::error::{BeaconError, Result};

const STR_TAG: u8 = 0x02;
const INT_TAG: u8 = 0x21;
const ESCAPE: u8 = 0xFF;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Str(String),
    Int(i64),
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Key(Vec<KeyPart>);

macro_rules! key {
    ($($part:expr),* $(,)?) => {
        $crate::key::Key::new(vec![$($crate::key::KeyPart::from($part)),*])
    };
}
pub(crate) use key;

impl Key {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn str_at(&self, idx: usize) -> Option<&str> {
        match self.0.get(idx) {
            Some(KeyPart::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn int_at(&self, idx: usize) -> Option<i64> {
        match self.0.get(idx) {
            Some(KeyPart::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * 16);
        for part in &self.0 {
            match part {
                KeyPart::Str(s) => {
                    out.push(STR_TAG);
                    for &b in s.as_bytes() {
                        out.push(b);
                        if b == 0x00 {
                            out.push(ESCAPE);
                        }
                    }
                    out.push(0x00);
                }
                KeyPart::Int(v) => {
                    out.push(INT_TAG);
                    out.extend_from_slice(&((*v as u64) ^ (1 << 63)).to_be_bytes());
                }
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut parts = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                STR_TAG => {
                    i += 1;
                    let mut raw = Vec::new();
                    loop {
                        let Some(&b) = bytes.get(i) else {
                            return Err(corrupt_key(bytes, "unterminated string part"));
                        };
                        i += 1;
                        if b != 0x00 {
                            raw.push(b);
                        } else if bytes.get(i) == Some(&ESCAPE) {
                            raw.push(0x00);
                            i += 1;
                        } else {
                            break;
                        }
                    }
                    let s = String::from_utf8(raw)
                        .map_err(|_| corrupt_key(bytes, "string part is not utf-8"))?;
                    parts.push(KeyPart::Str(s));
                }
                INT_TAG => {
                    let raw: [u8; 8] = bytes
                        .get(i + 1..i + 9)
                        .and_then(|s| s.try_into().ok())
                        .ok_or_else(|| corrupt_key(bytes, "truncated integer part"))?;
                    parts.push(KeyPart::Int((u64::from_be_bytes(raw) ^ (1 << 63)) as i64));
                    i += 9;
                }
                tag => {
                    return Err(corrupt_key(bytes, &format!("unknown part tag {tag:#04x}")));
                }
            }
        }
        Ok(Self(parts))
    }
}

fn corrupt_key(bytes: &[u8], reason: &str) -> BeaconError {
    BeaconError::CorruptValue(format!("key {bytes:02x?}: {reason}"))
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (idx, part) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            match part {
                KeyPart::Str(s) => write!(f, "{s:?}")?,
                KeyPart::Int(v) => write!(f, "{v}")?,
            }
        }
        f.write_str(")")
    }
}
