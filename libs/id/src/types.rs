//! Typed identifier definitions for node-side resources.

use crate::define_opaque_id;

// =============================================================================
// Workloads
// =============================================================================

define_opaque_id!(PodUid, "pod uid");

// =============================================================================
// Nodes
// =============================================================================

define_opaque_id!(NodeName, "node name");

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IdError;
    use proptest::prelude::*;

    #[test]
    fn test_pod_uid_roundtrip() {
        let uid = PodUid::new();
        let s = uid.to_string();
        let parsed: PodUid = s.parse().unwrap();
        assert_eq!(uid, parsed);
    }

    #[test]
    fn test_pod_uid_is_uuid() {
        let uid = PodUid::new();
        assert!(crate::Uuid::parse_str(uid.as_str()).is_ok());
    }

    #[test]
    fn test_pod_uid_accepts_arbitrary_opaque_strings() {
        let uid: PodUid = "p1".parse().unwrap();
        assert_eq!(uid.as_str(), "p1");

        let uid: PodUid = "default/nginx-7f9c".parse().unwrap();
        assert_eq!(uid.to_string(), "default/nginx-7f9c");
    }

    #[test]
    fn test_pod_uid_empty() {
        let result: Result<PodUid, _> = "".parse();
        assert!(result.unwrap_err().is_empty());
    }

    #[test]
    fn test_pod_uid_whitespace() {
        let result: Result<PodUid, _> = "pod 1".parse();
        assert_eq!(
            result.unwrap_err(),
            IdError::InvalidCharacter {
                kind: "pod uid",
                ch: ' ',
                position: 3,
            }
        );
    }

    #[test]
    fn test_pod_uid_too_long() {
        let long = "a".repeat(crate::MAX_ID_LEN + 1);
        let result = PodUid::parse(&long);
        assert!(matches!(result, Err(IdError::TooLong { actual, .. }) if actual == long.len()));
    }

    #[test]
    fn test_pod_uid_json_roundtrip() {
        let uid = PodUid::new();
        let json = serde_json::to_string(&uid).unwrap();
        assert_eq!(json, format!("\"{uid}\""));
        let parsed: PodUid = serde_json::from_str(&json).unwrap();
        assert_eq!(uid, parsed);
    }

    #[test]
    fn test_pod_uid_json_rejects_invalid() {
        let result: Result<PodUid, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_pod_uid_borrow_lookup() {
        let mut map = std::collections::HashMap::new();
        map.insert(PodUid::parse("p1").unwrap(), 1);
        assert_eq!(map.get("p1"), Some(&1));
    }

    #[test]
    fn test_kinds_distinct() {
        assert_ne!(PodUid::KIND, NodeName::KIND);
    }

    proptest! {
        #[test]
        fn prop_visible_ascii_roundtrips(s in "[!-~]{1,64}") {
            let uid = PodUid::parse(&s).unwrap();
            prop_assert_eq!(uid.as_str(), s.as_str());
            let reparsed: PodUid = uid.to_string().parse().unwrap();
            prop_assert_eq!(reparsed, uid);
        }

        #[test]
        fn prop_whitespace_rejected(prefix in "[a-z]{0,8}", suffix in "[a-z]{0,8}") {
            let s = format!("{prefix}\t{suffix}");
            prop_assert!(PodUid::parse(&s).is_err());
        }
    }
}
