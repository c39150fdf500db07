//! Offline URIs: stable string addresses for stored resources.
//!
//! An offline URI names exactly one resource inside one cell of one storage
//! mechanism:
//!
//! ```text
//! offline:<kind>/<mechanism>/<cell>/<key>
//! ```
//!
//! `<kind>` is `manifest` or `segment`, `<mechanism>` and `<cell>` are
//! validated ids, and `<key>` is an unsigned decimal integer. Anything else is
//! rejected; there is no lenient mode.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TypeError};
use crate::ids::{CellId, MechanismId};

const SCHEME: &str = "offline:";

/// The kind of resource an [`OfflineUri`] points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A stored manifest record.
    Manifest,
    /// Stored segment bytes referenced by a manifest.
    Segment,
}

impl ResourceKind {
    /// The tag used in the string form.
    pub fn tag(self) -> &'static str {
        match self {
            ResourceKind::Manifest => "manifest",
            ResourceKind::Segment => "segment",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Address of a stored resource: `(kind, mechanism, cell, key)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OfflineUri {
    kind: ResourceKind,
    mechanism: MechanismId,
    cell: CellId,
    key: u64,
}

impl OfflineUri {
    /// Address a manifest record.
    pub fn manifest(mechanism: MechanismId, cell: CellId, key: u64) -> Self {
        Self {
            kind: ResourceKind::Manifest,
            mechanism,
            cell,
            key,
        }
    }

    /// Address stored segment data.
    pub fn segment(mechanism: MechanismId, cell: CellId, key: u64) -> Self {
        Self {
            kind: ResourceKind::Segment,
            mechanism,
            cell,
            key,
        }
    }

    /// Parse the string form.
    ///
    /// # Examples
    ///
    /// ```
    /// use oms_types::OfflineUri;
    ///
    /// let uri = OfflineUri::parse("offline:manifest/memory/default/7").unwrap();
    /// assert!(uri.is_manifest());
    /// assert_eq!(uri.key(), 7);
    /// assert!(OfflineUri::parse("offline:manifest/memory/7").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let malformed = |reason: String| TypeError::MalformedUri {
            uri: s.to_string(),
            reason,
        };

        let rest = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| malformed(format!("expected '{SCHEME}' prefix")))?;

        let segments: Vec<&str> = rest.split('/').collect();
        let [tag, mechanism, cell, key] = segments.as_slice() else {
            return Err(malformed(format!(
                "expected 4 segments after scheme, found {}",
                segments.len()
            )));
        };

        let kind = match *tag {
            "manifest" => ResourceKind::Manifest,
            "segment" => ResourceKind::Segment,
            other => return Err(malformed(format!("unknown resource tag {other:?}"))),
        };
        let mechanism = MechanismId::new(*mechanism).map_err(|e| malformed(e.to_string()))?;
        let cell = CellId::new(*cell).map_err(|e| malformed(e.to_string()))?;

        // `u64::from_str` accepts a leading '+', which would break the round trip.
        if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed(format!("key {key:?} is not an unsigned integer")));
        }
        if key.len() > 1 && key.starts_with('0') {
            return Err(malformed(format!("key {key:?} has leading zeros")));
        }
        let key = key
            .parse::<u64>()
            .map_err(|e| malformed(format!("key {key:?}: {e}")))?;

        Ok(Self {
            kind,
            mechanism,
            cell,
            key,
        })
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn is_manifest(&self) -> bool {
        self.kind == ResourceKind::Manifest
    }

    pub fn is_segment(&self) -> bool {
        self.kind == ResourceKind::Segment
    }

    pub fn mechanism(&self) -> &MechanismId {
        &self.mechanism
    }

    pub fn cell(&self) -> &CellId {
        &self.cell
    }

    pub fn key(&self) -> u64 {
        self.key
    }
}

impl fmt::Display for OfflineUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SCHEME}{}/{}/{}/{}",
            self.kind, self.mechanism, self.cell, self.key
        )
    }
}

impl FromStr for OfflineUri {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OfflineUri {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<OfflineUri> for String {
    fn from(uri: OfflineUri) -> String {
        uri.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mech(s: &str) -> MechanismId {
        MechanismId::new(s).unwrap()
    }

    fn cell(s: &str) -> CellId {
        CellId::new(s).unwrap()
    }

    #[test]
    fn manifest_string_form() {
        let uri = OfflineUri::manifest(mech("memory"), cell("default"), 42);
        assert_eq!(uri.to_string(), "offline:manifest/memory/default/42");
    }

    #[test]
    fn segment_string_form() {
        let uri = OfflineUri::segment(mech("idb"), cell("v5"), 0);
        assert_eq!(uri.to_string(), "offline:segment/idb/v5/0");
        assert!(uri.is_segment());
        assert!(!uri.is_manifest());
    }

    #[test]
    fn parse_accessors() {
        let uri: OfflineUri = "offline:manifest/memory/default/7".parse().unwrap();
        assert_eq!(uri.kind(), ResourceKind::Manifest);
        assert_eq!(uri.mechanism().as_str(), "memory");
        assert_eq!(uri.cell().as_str(), "default");
        assert_eq!(uri.key(), 7);
    }

    #[test]
    fn parse_max_key() {
        let s = format!("offline:manifest/m/c/{}", u64::MAX);
        assert_eq!(OfflineUri::parse(&s).unwrap().key(), u64::MAX);
    }

    #[test]
    fn parse_zero_key() {
        let uri = OfflineUri::parse("offline:manifest/m/c/0").unwrap();
        assert_eq!(uri.key(), 0);
        assert_eq!(uri.to_string(), "offline:manifest/m/c/0");
    }

    #[test]
    fn reject_malformed_strings() {
        let bad = [
            "",
            "offline:",
            "manifest/memory/default/1",
            "online:manifest/memory/default/1",
            "offline:manifest/memory/default",
            "offline:manifest/memory/1",
            "offline:manifest/memory/default/1/extra",
            "offline:manifest/memory/default/",
            "offline:manifest//default/1",
            "offline:manifest/memory//1",
            "offline:period/memory/default/1",
            "offline:Manifest/memory/default/1",
            "offline:manifest/memory/default/abc",
            "offline:manifest/memory/default/-1",
            "offline:manifest/memory/default/+1",
            "offline:manifest/memory/default/1.5",
            "offline:manifest/memory/default/ 1",
            "offline:manifest/memory/default/18446744073709551616",
            "offline:manifest/memory/default/007",
            "offline:manifest/memory/default/00",
            " offline:manifest/memory/default/1",
        ];
        for s in bad {
            let err = OfflineUri::parse(s).expect_err(s);
            assert!(
                matches!(err, TypeError::MalformedUri { .. }),
                "{s:?} produced {err:?}"
            );
        }
    }

    #[test]
    fn serde_uses_string_form() {
        let uri = OfflineUri::manifest(mech("memory"), cell("default"), 3);
        let json = serde_json::to_string(&uri).unwrap();
        assert_eq!(json, "\"offline:manifest/memory/default/3\"");
        let back: OfflineUri = serde_json::from_str(&json).unwrap();
        assert_eq!(back, uri);
        assert!(serde_json::from_str::<OfflineUri>("\"offline:nope\"").is_err());
    }

    proptest! {
        #[test]
        fn string_form_round_trips(
            mechanism in "[a-zA-Z0-9._-]{1,16}",
            cell_name in "[a-zA-Z0-9._:-]{1,16}",
            key in any::<u64>(),
            segment in any::<bool>(),
        ) {
            let (m, c) = (mech(&mechanism), cell(&cell_name));
            let uri = if segment {
                OfflineUri::segment(m, c, key)
            } else {
                OfflineUri::manifest(m, c, key)
            };
            let parsed = OfflineUri::parse(&uri.to_string()).unwrap();
            prop_assert_eq!(parsed, uri);
        }
    }
}
