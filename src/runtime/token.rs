//! Operation token tracking for completion correlation.
//!
//! Every submitted operation carries a token (the engine's `user_data`) that
//! names the context it belongs to. Connection tokens pair a registry slot
//! with the generation the slot had when the connection was created, so a
//! token that outlives its connection never resolves to a newer occupant.

/// Identity of an in-flight operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// The listener's accept slot. There is at most one accept in flight.
    Accept,
    /// A client connection in the registry.
    Conn {
        /// Slot in the connection registry.
        index: u32,
        /// Generation of that slot when the connection was inserted.
        generation: u32,
    },
}

impl Token {
    /// Reserved user_data value for the accept slot.
    pub const ACCEPT: u64 = u64::MAX;

    /// Encode into a 64-bit user_data value.
    ///
    /// Layout: generation in the upper 32 bits, slot index in the lower 32.
    #[inline]
    pub fn encode(self) -> u64 {
        match self {
            Token::Accept => Self::ACCEPT,
            Token::Conn { index, generation } => {
                debug_assert!(index != u32::MAX, "slot index collides with accept token");
                ((generation as u64) << 32) | index as u64
            }
        }
    }

    /// Decode a user_data value taken from a completion.
    #[inline]
    pub fn decode(user_data: u64) -> Self {
        if user_data == Self::ACCEPT {
            return Token::Accept;
        }
        Token::Conn {
            index: user_data as u32,
            generation: (user_data >> 32) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_token() {
        assert_eq!(Token::Accept.encode(), u64::MAX);
        assert_eq!(Token::decode(u64::MAX), Token::Accept);
    }

    #[test]
    fn test_conn_token_layout() {
        let token = Token::Conn {
            index: 7,
            generation: 3,
        };
        let raw = token.encode();
        assert_eq!(raw, (3u64 << 32) | 7);
        assert_eq!(Token::decode(raw), token);

        // Highest generation with a real slot must not look like the accept slot.
        let token = Token::Conn {
            index: 0,
            generation: u32::MAX,
        };
        assert_ne!(token.encode(), Token::ACCEPT);
        assert_eq!(Token::decode(token.encode()), token);
    }
}
