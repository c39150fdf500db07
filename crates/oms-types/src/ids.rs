//! Validated identifiers for storage mechanisms and cells.
//!
//! Both ids appear as path segments of an [`OfflineUri`](crate::OfflineUri),
//! so they follow the same rules:
//! - Must be non-empty
//! - Must not contain `/` (the uri segment separator)
//! - Must not contain whitespace or control characters

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TypeError};

fn validate(what: &'static str, id: &str) -> Result<()> {
    let reject = |reason: String| {
        Err(TypeError::InvalidId {
            what,
            id: id.to_string(),
            reason,
        })
    };

    if id.is_empty() {
        return reject(format!("{what} id must not be empty"));
    }
    if id.contains('/') {
        return reject("must not contain '/'".into());
    }
    if let Some(ch) = id.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return reject(format!("contains forbidden character: {ch:?}"));
    }
    Ok(())
}

macro_rules! storage_id {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap an identifier.
            pub fn new(id: impl Into<String>) -> Result<Self> {
                let id = id.into();
                validate($what, &id)?;
                Ok(Self(id))
            }

            /// The identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = TypeError;

            fn try_from(s: String) -> Result<Self> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

storage_id!(
    /// Name of a registered storage mechanism (a backend).
    MechanismId,
    "mechanism"
);

storage_id!(
    /// Name of a storage cell inside a mechanism.
    CellId,
    "cell"
);
