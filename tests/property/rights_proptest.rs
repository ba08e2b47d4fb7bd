//! Property-based tests for right codes

use proptest::prelude::*;

use docsync::shared::config::ProjectRoleConfig;
use docsync::shared::rights::{right_code, split_right, Operation, ProjectRights};

fn operation() -> impl Strategy<Value = Operation> {
    prop::sample::select(Operation::ALL.to_vec())
}

fn domain() -> impl Strategy<Value = u32> {
    (1u32..10_000).prop_map(|d| d * 10)
}

proptest! {
    #[test]
    fn test_right_code_splits_back(domain in domain(), op in operation()) {
        prop_assert_eq!(split_right(right_code(domain, op)), Some((domain, op)));
    }

    #[test]
    fn test_codes_ending_in_zero_eight_or_nine_are_malformed(domain in domain(), low in prop::sample::select(vec![0u32, 8, 9])) {
        prop_assert_eq!(split_right(domain + low), None);
    }

    #[test]
    fn test_role_holds_exactly_its_codes(
        domain in domain(),
        granted in prop::collection::hash_set(operation(), 0..4),
        asked in operation(),
    ) {
        let codes: Vec<u32> = granted.iter().map(|op| right_code(domain, *op)).collect();
        let rights = ProjectRights::from_roles(&[ProjectRoleConfig::new("member", codes)]);

        prop_assert_eq!(rights.has_right("member", domain, asked), granted.contains(&asked));
        prop_assert!(!rights.has_right("member", domain + 10, asked));
        prop_assert!(!rights.has_right("stranger", domain, asked));
    }
}
