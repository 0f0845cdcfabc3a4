//! Secret redaction for sensitive data in logs, serialization, and display.
//!
//! Wrap private keys, keypair material, and similar values in [`Redacted`]
//! so they cannot leak through `Debug`, `Display`, or `Serialize`.

use std::fmt::{self, Debug, Display};

/// Wrapper that redacts its inner value when formatted or serialized.
#[derive(Clone, Copy)]
pub struct Redacted<T>(pub T);

impl<T> Redacted<T> {
    /// Access the wrapped value. Call sites should use the value
    /// immediately and avoid re-wrapping it in printable types.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> serde::Serialize for Redacted<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        "<redacted>".serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts() {
        let wrapped = Redacted("0xdeadbeef");
        assert_eq!(format!("{:?}", wrapped), "<redacted>");
        assert_eq!(format!("{}", wrapped), "<redacted>");
    }

    #[test]
    fn test_serialize_redacts() {
        let wrapped = Redacted("supersecret");
        let json = serde_json::to_string(&wrapped).unwrap();
        assert_eq!(json, "\"<redacted>\"");
    }

    #[test]
    fn test_expose_returns_inner() {
        let wrapped = Redacted(42u64);
        assert_eq!(*wrapped.expose(), 42);
    }
}
