//! Error types for the protocol layer.
//!
//! Each crate in Warroom defines its own error enum. A decoding
//! `ProtocolError` means the bytes themselves were malformed: truncated,
//! carrying an unknown header, or holding invalid UTF-8. Callers treat
//! these as protocol-fatal for the connection that sent them.
//!
//! [`ProtocolError::Unencodable`] is the one encoding-side variant: a
//! local value that has no representation on the wire. No peer caused it.

/// Errors that can occur while encoding or decoding wire data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The message ended before a field could be read.
    #[error("unexpected end of message: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof {
        /// Bytes the field required.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A header byte did not match any known message.
    #[error("unknown {context} header: {header}")]
    UnknownHeader {
        /// Which header table was consulted ("message", "state", …).
        context: &'static str,
        /// The offending byte.
        header: u8,
    },

    /// A string field did not contain valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// The message is invalid at the protocol level.
    ///
    /// For logical errors that pass byte-level decoding but violate
    /// protocol rules, e.g. an unknown denial code.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A value is too large for the field that carries it on the wire.
    #[error("{field} {value} does not fit its wire field (max {max})")]
    Unencodable {
        /// What was being written ("length", "tile id", …).
        field: &'static str,
        value: usize,
        max: usize,
    },
}

impl ProtocolError {
    /// Whether the bytes of a remote peer caused this error.
    ///
    /// Only decoding errors qualify. An unencodable value is a local fault.
    pub fn is_peer_fault(&self) -> bool {
        !matches!(self, Self::Unencodable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unencodable_is_not_a_peer_fault() {
        let err = ProtocolError::Unencodable {
            field: "length",
            value: 70_000,
            max: 65_535,
        };
        assert!(!err.is_peer_fault());
        assert_eq!(err.to_string(), "length 70000 does not fit its wire field (max 65535)");
        assert!(ProtocolError::InvalidMessage("x".into()).is_peer_fault());
    }
}
