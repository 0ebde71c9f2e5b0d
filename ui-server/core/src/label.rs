use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// Categories of relationship between two objects.
///
/// Labels serialize in `snake_case`; the kebab-case spelling is accepted when parsing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeLabel {
    Offshoot,
    View,
    Ops,
    OwnedBy,
    ExposedBy,
    BackupVia,
    RestoreInto,
    MonitoredBy,
    Event,
    Authn,
    Authz,
    Storage,
    NetworkPolicy,
    Ca,
    CertIssuer,
    Config,
    ConnectVia,
    LocatedOn,
    Policy,
    Source,
    ScannedBy,
    Catalog,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown edge label: {0:?}")]
pub struct UnknownLabel(pub String);

impl EdgeLabel {
    pub const ALL: [EdgeLabel; 22] = [
        EdgeLabel::Offshoot,
        EdgeLabel::View,
        EdgeLabel::Ops,
        EdgeLabel::OwnedBy,
        EdgeLabel::ExposedBy,
        EdgeLabel::BackupVia,
        EdgeLabel::RestoreInto,
        EdgeLabel::MonitoredBy,
        EdgeLabel::Event,
        EdgeLabel::Authn,
        EdgeLabel::Authz,
        EdgeLabel::Storage,
        EdgeLabel::NetworkPolicy,
        EdgeLabel::Ca,
        EdgeLabel::CertIssuer,
        EdgeLabel::Config,
        EdgeLabel::ConnectVia,
        EdgeLabel::LocatedOn,
        EdgeLabel::Policy,
        EdgeLabel::Source,
        EdgeLabel::ScannedBy,
        EdgeLabel::Catalog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offshoot => "offshoot",
            Self::View => "view",
            Self::Ops => "ops",
            Self::OwnedBy => "owned_by",
            Self::ExposedBy => "exposed_by",
            Self::BackupVia => "backup_via",
            Self::RestoreInto => "restore_into",
            Self::MonitoredBy => "monitored_by",
            Self::Event => "event",
            Self::Authn => "authn",
            Self::Authz => "authz",
            Self::Storage => "storage",
            Self::NetworkPolicy => "network_policy",
            Self::Ca => "ca",
            Self::CertIssuer => "cert_issuer",
            Self::Config => "config",
            Self::ConnectVia => "connect_via",
            Self::LocatedOn => "located_on",
            Self::Policy => "policy",
            Self::Source => "source",
            Self::ScannedBy => "scanned_by",
            Self::Catalog => "catalog",
        }
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().replace('-', "_").to_ascii_lowercase();
        Self::ALL
            .iter()
            .find(|l| l.as_str() == norm)
            .copied()
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

impl Serialize for EdgeLabel {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EdgeLabel {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(de::Error::custom)
    }
}
