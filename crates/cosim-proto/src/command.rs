//! Inbound command grammar.

use std::fmt;

/// A message sent by the peer simulator.
///
/// Parsing never fails: anything outside the grammar becomes
/// [`Command::Unknown`] carrying the raw text, and the dispatcher decides
/// what a protocol violation means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `TICK:<remote time>`: advance the local clock to (or within) this
    /// coarse timestamp.
    Tick(u64),

    /// `DRIVE:<name>:<value>`: set an input signal.
    Drive {
        /// Registered input signal name.
        name: String,
        /// Serialized value, passed through uninterpreted.
        value: String,
    },

    /// `END`: the peer is finished.
    End,

    /// Anything else.
    Unknown(String),
}

impl Command {
    /// Parse one framed message.
    ///
    /// `DRIVE` requires exactly three colon-separated fields with a non-empty
    /// name and value. `TICK` requires an unsigned integer.
    pub fn parse(message: &str) -> Self {
        if message == "END" {
            return Self::End;
        }

        if let Some(time) = message.strip_prefix("TICK:") {
            return time.parse::<u64>().map_or_else(|_| Self::unknown(message), Self::Tick);
        }

        if let Some(rest) = message.strip_prefix("DRIVE:") {
            return match rest.split_once(':') {
                Some((name, value))
                    if !name.is_empty() && !value.is_empty() && !value.contains(':') =>
                {
                    Self::Drive { name: name.to_owned(), value: value.to_owned() }
                },
                _ => Self::unknown(message),
            };
        }

        Self::unknown(message)
    }

    /// Short label for logging.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Tick(_) => "TICK",
            Self::Drive { .. } => "DRIVE",
            Self::End => "END",
            Self::Unknown(_) => "UNKNOWN",
        }
    }

    fn unknown(message: &str) -> Self {
        Self::Unknown(message.to_owned())
    }
}

/// Renders the wire form without a separator.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tick(time) => write!(f, "TICK:{time}"),
            Self::Drive { name, value } => write!(f, "DRIVE:{name}:{value}"),
            Self::End => f.write_str("END"),
            Self::Unknown(raw) => f.write_str(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tick() {
        assert_eq!(Command::parse("TICK:0"), Command::Tick(0));
        assert_eq!(Command::parse("TICK:1234"), Command::Tick(1234));
    }

    #[test]
    fn rejects_non_numeric_tick() {
        assert_eq!(Command::parse("TICK:abc"), Command::Unknown("TICK:abc".into()));
        assert_eq!(Command::parse("TICK:-1"), Command::Unknown("TICK:-1".into()));
        assert_eq!(Command::parse("TICK:"), Command::Unknown("TICK:".into()));
    }

    #[test]
    fn parses_drive() {
        assert_eq!(
            Command::parse("DRIVE:apple:01XZ1100"),
            Command::Drive { name: "apple".into(), value: "01XZ1100".into() }
        );
    }

    #[test]
    fn rejects_malformed_drive() {
        for raw in ["DRIVE:apple", "DRIVE::1", "DRIVE:apple:", "DRIVE:a:1:2"] {
            assert_eq!(Command::parse(raw), Command::Unknown(raw.into()), "{raw}");
        }
    }

    #[test]
    fn end_is_exact_match() {
        assert_eq!(Command::parse("END"), Command::End);
        assert_eq!(Command::parse("ENDX"), Command::Unknown("ENDX".into()));
        assert_eq!(Command::parse("end"), Command::Unknown("end".into()));
    }

    #[test]
    fn display_matches_wire_form() {
        for raw in ["TICK:7", "DRIVE:a:1", "END", "HELLO"] {
            assert_eq!(Command::parse(raw).to_string(), raw);
        }
    }

    #[test]
    fn kind_labels_follow_the_parse() {
        let commands = ["TICK:1", "DRIVE:a:1", "END", "TICK:x"].map(Command::parse);
        let kinds: Vec<_> = commands.iter().map(Command::kind).collect();
        assert_eq!(kinds, vec!["TICK", "DRIVE", "END", "UNKNOWN"]);
    }
}
