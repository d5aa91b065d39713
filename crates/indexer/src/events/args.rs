//! Defensive argument extraction.
//!
//! Chain metadata differs between runtimes: the same field may arrive as
//! `min_qty`, `minQty` or positionally (`arg2`, or index 2 of an array), and
//! numbers may be JSON numbers, decimal strings or `0x` hex. Absent fields
//! fall back to zero / `None` where the caller allows it; present but
//! unreadable fields are a [`DecodeError`].

use serde_json::Value;

use crate::error::DecodeError;

/// Read-only view over one event's arguments.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    value: &'a Value,
}

type Result<T> = std::result::Result<T, DecodeError>;

impl<'a> Args<'a> {
    /// Wrap an argument container.
    ///
    /// Anything other than an object or an array behaves as "no arguments",
    /// so required fields then report [`DecodeError::Missing`].
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    /// Raw lookup by snake_case name, camelCase name, `arg{pos}`, or array index.
    pub fn raw(&self, name: &str, pos: usize) -> Option<&'a Value> {
        let found = match self.value {
            Value::Object(map) => map
                .get(name)
                .or_else(|| map.get(&camel_case(name)))
                .or_else(|| map.get(&format!("arg{}", pos))),
            Value::Array(items) => items.get(pos),
            _ => None,
        };
        found.filter(|v| !v.is_null())
    }

    /// Required unsigned integer.
    pub fn u64(&self, name: &'static str, pos: usize) -> Result<u64> {
        self.opt_u64(name, pos)?.ok_or(DecodeError::Missing(name))
    }

    /// Unsigned integer, zero when absent.
    pub fn u64_or_zero(&self, name: &'static str, pos: usize) -> Result<u64> {
        Ok(self.opt_u64(name, pos)?.unwrap_or(0))
    }

    /// Optional unsigned integer.
    pub fn opt_u64(&self, name: &'static str, pos: usize) -> Result<Option<u64>> {
        match self.opt_u128(name, pos)? {
            None => Ok(None),
            Some(v) => u64::try_from(v)
                .map(Some)
                .map_err(|_| DecodeError::malformed(name, format!("{} does not fit in 64 bits", v))),
        }
    }

    /// Required balance-sized integer.
    pub fn u128(&self, name: &'static str, pos: usize) -> Result<u128> {
        self.opt_u128(name, pos)?.ok_or(DecodeError::Missing(name))
    }

    /// Balance-sized integer, zero when absent.
    pub fn u128_or_zero(&self, name: &'static str, pos: usize) -> Result<u128> {
        Ok(self.opt_u128(name, pos)?.unwrap_or(0))
    }

    /// Optional balance-sized integer.
    pub fn opt_u128(&self, name: &'static str, pos: usize) -> Result<Option<u128>> {
        self.raw(name, pos).map(|v| parse_u128(name, v)).transpose()
    }

    /// Required identifier or account, rendered as a string.
    pub fn string(&self, name: &'static str, pos: usize) -> Result<String> {
        self.opt_string(name, pos)?.ok_or(DecodeError::Missing(name))
    }

    /// Optional identifier or account.
    pub fn opt_string(&self, name: &'static str, pos: usize) -> Result<Option<String>> {
        match self.raw(name, pos) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(DecodeError::malformed(
                name,
                format!("expected a string or number, got {}", other),
            )),
        }
    }

    /// Flag, `false` when absent.
    pub fn flag(&self, name: &'static str, pos: usize) -> Result<bool> {
        match self.raw(name, pos) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::Number(n)) => Ok(n.as_u64().map(|v| v != 0).unwrap_or(false)),
            Some(Value::String(s)) => match s.as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(DecodeError::malformed(name, format!("not a flag: {}", s))),
            },
            Some(other) => Err(DecodeError::malformed(name, format!("not a flag: {}", other))),
        }
    }

    /// Required byte string, lower-case hex without prefix.
    ///
    /// Accepts `0x` hex, an array of byte values, or raw text (its UTF-8 bytes).
    pub fn bytes_hex(&self, name: &'static str, pos: usize) -> Result<String> {
        let value = self.raw(name, pos).ok_or(DecodeError::Missing(name))?;
        match value {
            Value::String(s) => match s.strip_prefix("0x") {
                Some(digits) => hex::decode(digits)
                    .map(hex::encode)
                    .map_err(|e| DecodeError::malformed(name, e.to_string())),
                None => Ok(hex::encode(s.as_bytes())),
            },
            Value::Array(items) => {
                let bytes = items
                    .iter()
                    .map(|item| {
                        item.as_u64()
                            .and_then(|b| u8::try_from(b).ok())
                            .ok_or_else(|| DecodeError::malformed(name, "array holds a non-byte"))
                    })
                    .collect::<Result<Vec<u8>>>()?;
                Ok(hex::encode(bytes))
            }
            other => Err(DecodeError::malformed(name, format!("not a byte string: {}", other))),
        }
    }

    /// Pair of integers given as `[a, b]` or `{"0": a, "1": b}` / `{first, second}`.
    pub fn pair_u64(
        &self,
        name: &'static str,
        pos: usize,
        first: &'static str,
        second: &'static str,
    ) -> Result<(u64, u64)> {
        let value = self.raw(name, pos).ok_or(DecodeError::Missing(name))?;
        let inner = Args::new(value);
        let a = inner.opt_u64(first, 0)?.or(inner.opt_u64_key("0")?);
        let b = inner.opt_u64(second, 1)?.or(inner.opt_u64_key("1")?);
        match (a, b) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(DecodeError::malformed(name, "tuple needs two elements")),
        }
    }

    fn opt_u64_key(&self, key: &'static str) -> Result<Option<u64>> {
        match self.value {
            Value::Object(map) => map
                .get(key)
                .filter(|v| !v.is_null())
                .map(|v| parse_u128(key, v))
                .transpose()?
                .map(|v| u64::try_from(v).map_err(|_| DecodeError::malformed(key, "too large")))
                .transpose(),
            _ => Ok(None),
        }
    }
}

fn parse_u128(name: &'static str, value: &Value) -> Result<u128> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| DecodeError::malformed(name, format!("not an unsigned integer: {}", n))),
        Value::String(s) => {
            let s = s.trim();
            let parsed = match s.strip_prefix("0x") {
                Some(digits) => u128::from_str_radix(digits, 16),
                None => s.parse::<u128>(),
            };
            parsed.map_err(|e| DecodeError::malformed(name, format!("{}: {}", s, e)))
        }
        other => Err(DecodeError::malformed(
            name,
            format!("not an unsigned integer: {}", other),
        )),
    }
}

/// `min_qty` -> `minQty`.
pub(crate) fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// `OtcListing` / `otcListing` -> `otc_listing`.
pub(crate) fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}
