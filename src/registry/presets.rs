// src/registry/presets.rs
// The closed set of tool presets (spec §3, §4.4)

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// A named subset of the tool catalog. The set is closed and enumerated at
/// compile time (spec invariant: "the active preset is always a member of
/// the closed preset set").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    Core,
    Review,
    Refactor,
    Federation,
    Docs,
    Ops,
    Full,
}

impl Preset {
    pub const ALL: [Preset; 7] = [
        Preset::Core,
        Preset::Review,
        Preset::Refactor,
        Preset::Federation,
        Preset::Docs,
        Preset::Ops,
        Preset::Full,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Core => "core",
            Preset::Review => "review",
            Preset::Refactor => "refactor",
            Preset::Federation => "federation",
            Preset::Docs => "docs",
            Preset::Ops => "ops",
            Preset::Full => "full",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Preset {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for p in Preset::ALL {
            assert_eq!(p.as_str().parse::<Preset>().unwrap(), p);
        }
    }

    #[test]
    fn unknown_preset_rejected() {
        assert!("made-up".parse::<Preset>().is_err());
    }
}
