//! Register entity types that are mirrored into the search engine.

use serde::{Deserialize, Serialize};

/// A record type of the register that owns its own search index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Agency,
    Institution,
    Report,
    Programme,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        Self::Agency,
        Self::Institution,
        Self::Report,
        Self::Programme,
    ];

    /// Index name used when the configuration does not override it.
    pub fn default_index_name(&self) -> &'static str {
        match self {
            Self::Agency => "agencies-v3",
            Self::Institution => "institutions-v3",
            Self::Report => "reports-v3",
            Self::Programme => "programmes-v3",
        }
    }

    /// Plural slug, as used on the command line and in log fields.
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Agency => "agencies",
            Self::Institution => "institutions",
            Self::Report => "reports",
            Self::Programme => "programmes",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Agency => write!(f, "agency"),
            Self::Institution => write!(f, "institution"),
            Self::Report => write!(f, "report"),
            Self::Programme => write!(f, "programme"),
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.to_string() == s || k.plural() == s)
            .ok_or_else(|| {
                format!("unknown entity '{s}' (expected agency, institution, report or programme)")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_singular_and_plural() {
        assert_eq!("report".parse::<EntityKind>().unwrap(), EntityKind::Report);
        assert_eq!("Agencies".parse::<EntityKind>().unwrap(), EntityKind::Agency);
        assert!("universities".parse::<EntityKind>().is_err());
    }

    #[test]
    fn default_names() {
        assert_eq!(EntityKind::Institution.default_index_name(), "institutions-v3");
        assert_eq!(EntityKind::Programme.default_index_name(), "programmes-v3");
    }
}
