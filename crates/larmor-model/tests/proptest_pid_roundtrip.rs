#![forbid(unsafe_code)]

//! Property tests for Pid serialisation invariants.
//!
//! Validates:
//! - Display then parse reproduces any structured Pid exactly, whatever
//!   reserved characters its fields contain.
//! - Child derivation extends the path by exactly one field.
//! - Rename via `with_last_field` touches only the final field.
//! - Pid ordering is total and consistent with equality.

use proptest::prelude::*;

use larmor_model::{Pid, TypeCode};

// ============================================================================
// Strategy helpers
// ============================================================================

fn type_code_strategy() -> impl Strategy<Value = TypeCode> {
    "[A-Za-z][A-Za-z0-9]{0,3}".prop_map(|code| TypeCode::new(code).unwrap())
}

/// Printable ASCII, reserved characters included.
fn field_strategy() -> impl Strategy<Value = String> {
    "[ -~]{0,12}"
}

fn fields_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(field_strategy(), 1..=5)
}

fn pid_strategy() -> impl Strategy<Value = Pid> {
    (type_code_strategy(), fields_strategy())
        .prop_map(|(type_code, fields)| Pid::new(type_code, fields))
}

// ============================================================================
// Round trip
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn display_then_parse_is_identity(pid in pid_strategy()) {
        let serialised = pid.to_string();
        let parsed = Pid::parse(&serialised).unwrap();
        prop_assert_eq!(parsed, pid);
    }

    #[test]
    fn serialised_form_starts_with_type_code(pid in pid_strategy()) {
        let serialised = pid.to_string();
        prop_assert!(serialised.starts_with(pid.type_code().as_str()));
        prop_assert_eq!(
            serialised.as_bytes()[pid.type_code().as_str().len()],
            b':'
        );
    }
}

// ============================================================================
// Structural derivation
// ============================================================================

proptest! {
    #[test]
    fn child_extends_path_by_one(
        pid in pid_strategy(),
        class in type_code_strategy(),
        key in field_strategy(),
    ) {
        let child = pid.child(class.clone(), key.clone());
        prop_assert_eq!(child.depth(), pid.depth() + 1);
        prop_assert_eq!(child.last_field(), key.as_str());
        prop_assert_eq!(child.type_code(), &class);
        prop_assert_eq!(&child.fields()[..pid.depth()], pid.fields());

        // The derived identifier survives serialisation too.
        prop_assert_eq!(Pid::parse(&child.to_string()).unwrap(), child);
    }

    #[test]
    fn with_last_field_changes_only_the_key(
        pid in pid_strategy(),
        key in field_strategy(),
    ) {
        let renamed = pid.with_last_field(key.clone());
        prop_assert_eq!(renamed.depth(), pid.depth());
        prop_assert_eq!(renamed.last_field(), key.as_str());
        prop_assert_eq!(renamed.type_code(), pid.type_code());
        prop_assert_eq!(
            &renamed.fields()[..pid.depth() - 1],
            &pid.fields()[..pid.depth() - 1]
        );
    }
}

// ============================================================================
// Ordering
// ============================================================================

proptest! {
    #[test]
    fn ordering_is_consistent_with_equality(a in pid_strategy(), b in pid_strategy()) {
        use std::cmp::Ordering;
        match a.cmp(&b) {
            Ordering::Equal => prop_assert_eq!(&a, &b),
            Ordering::Less => prop_assert_eq!(b.cmp(&a), Ordering::Greater),
            Ordering::Greater => prop_assert_eq!(b.cmp(&a), Ordering::Less),
        }
    }
}
