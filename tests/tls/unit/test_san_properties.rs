use proptest::prelude::*;
use tokaido_tls::tls::validation::{
    validate_common_name, validate_hostname, validate_project_name, validate_subject_names,
};
use tokaido_tls::ErrorKind;

proptest! {
    #[test]
    fn valid_hostnames(name in "[a-z0-9]([a-z0-9-]{0,20}[a-z0-9])?(\\.[a-z0-9]([a-z0-9-]{0,20}[a-z0-9])?){0,3}") {
        prop_assert!(validate_hostname(&name).is_ok());
    }

    #[test]
    fn wildcard_hostnames(base in "[a-z]{1,10}\\.[a-z]{2,6}") {
        let wildcard = format!("*.{base}");
        prop_assert!(validate_hostname(&wildcard).is_ok());
        let embedded = format!("a.*.{base}");
        prop_assert!(validate_hostname(&embedded).is_err());
    }

    #[test]
    fn case_folded_duplicates_are_rejected(name in "[a-z]{1,12}\\.local") {
        let upper = name.to_uppercase();
        let err = validate_subject_names(&[name.clone(), upper]).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn distinct_names_keep_their_order(names in prop::collection::btree_set("[a-z]{1,8}\\.local", 1..6)) {
        let input: Vec<String> = names.into_iter().collect();
        let parsed = validate_subject_names(&input).unwrap();
        prop_assert_eq!(parsed.len(), input.len());
        for (parsed, original) in parsed.iter().zip(&input) {
            prop_assert_eq!(parsed.normalized(), original.clone());
        }
    }

    #[test]
    fn ipv4_literals_are_accepted(a in 0u8..=255, b in 0u8..=255, c in 0u8..=255, d in 0u8..=255) {
        let ip = format!("{a}.{b}.{c}.{d}");
        prop_assert!(validate_subject_names(&[ip]).is_ok());
    }

    #[test]
    fn common_names_with_separators_are_rejected(left in "[a-z]{0,8}", right in "[a-z]{0,8}", sep in "[/\\\\]") {
        let cn = format!("{left}{sep}{right}");
        prop_assert!(validate_common_name(&cn).is_err());
    }

    #[test]
    fn slug_projects_are_accepted(project in "[a-z0-9][a-z0-9_-]{0,30}") {
        prop_assert!(validate_project_name(&project).is_ok());
    }

    #[test]
    fn hidden_projects_are_rejected(rest in "[a-z0-9._-]{0,12}") {
        let project = format!(".{rest}");
        prop_assert!(validate_project_name(&project).is_err());
    }
}
