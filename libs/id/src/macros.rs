//! Macros for defining typed identifier types.

/// Macro to define a typed opaque identifier.
///
/// This generates a newtype wrapper around `String` with:
/// - A `KIND` constant used in error messages
/// - `new()` to generate a fresh UUIDv4-based identifier
/// - `parse()` to validate an identifier received from elsewhere
/// - `Display` and `FromStr` implementations
/// - `Serialize` and `Deserialize` implementations that validate on input
/// - `Ord`, `Hash`, `Borrow<str>`, and other standard traits
///
/// # Example
///
/// ```ignore
/// define_opaque_id!(PodUid, "pod uid");
///
/// let uid = PodUid::new();
/// let parsed: PodUid = "6f1c8f0e-2b5d-4a51-9a43-55f1d7c0e9b2".parse()?;
/// ```
#[macro_export]
macro_rules! define_opaque_id {
    ($name:ident, $kind:literal) => {
        /// A typed opaque identifier for this resource type.
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Human-readable name of this identifier type.
            pub const KIND: &'static str = $kind;

            /// Creates a new identifier from a fresh UUIDv4.
            #[must_use]
            pub fn new() -> Self {
                Self($crate::Uuid::new_v4().to_string())
            }

            /// Parses and validates an identifier.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                if s.is_empty() {
                    return Err($crate::IdError::Empty { kind: Self::KIND });
                }

                if s.len() > $crate::MAX_ID_LEN {
                    return Err($crate::IdError::TooLong {
                        kind: Self::KIND,
                        max: $crate::MAX_ID_LEN,
                        actual: s.len(),
                    });
                }

                if let Some((position, ch)) = s
                    .char_indices()
                    .find(|(_, c)| c.is_whitespace() || c.is_control())
                {
                    return Err($crate::IdError::InvalidCharacter {
                        kind: Self::KIND,
                        ch,
                        position,
                    });
                }

                Ok(Self(s.to_owned()))
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier, returning the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::IdError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(&s)?;
                Ok(Self(s))
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::try_from(s).map_err(serde::de::Error::custom)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}
