use std::fmt;

/// Delivery guarantee of a PUBLISH or a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Qos {
    /// Fire and forget, no acknowledgement.
    #[default]
    AtMostOnce = 0,

    /// Acknowledged with PUBACK.
    AtLeastOnce = 1,

    /// Acknowledged with the PUBREC/PUBREL/PUBCOMP exchange.
    ExactlyOnce = 2,
}

impl Qos {
    /// Converts a numeric value to a `Qos`.
    ///
    /// Returns `None` for anything outside 0..=2.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::AtMostOnce),
            1 => Some(Self::AtLeastOnce),
            2 => Some(Self::ExactlyOnce),
            _ => None,
        }
    }

    /// Converts the `Qos` to its numeric value.
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Qos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::AtMostOnce => "at most once",
            Self::AtLeastOnce => "at least once",
            Self::ExactlyOnce => "exactly once",
        };

        write!(f, "{value}")
    }
}
