//! Property tests for the controller line classifier

use megg_communication::firmware::arduino::{classify, classify_for, Command, LineClass, LineKind};
use megg_core::Component;
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_any_line_with_error_is_an_error(prefix in "[ -~]{0,20}", suffix in "[ -~]{0,20}") {
        let line = format!("{}ERROR{}", prefix, suffix);
        prop_assert_eq!(classify(&line), LineKind::Error(line.trim().to_string()));
    }

    #[test]
    fn test_lower_case_chatter_is_info(line in "[a-z0-9 :.,-]{0,40}") {
        prop_assume!(!line.contains("calibration complete"));
        prop_assert_eq!(classify(&line), LineKind::Info);
    }

    #[test]
    fn test_calibration_completes_only_on_completion(name in "[A-Z][A-Z0-9]{1,8}") {
        prop_assume!(!name.contains("ERROR"));
        let component: Component = name.parse().unwrap();
        let command = Command::calibrate(component, None);

        let start = format!("CALIBRATION_START:{}", name);
        prop_assert!(matches!(classify_for(&command, &start), LineClass::Info(Some(_))));

        let done = format!("CALIBRATION_COMPLETE:{}", name);
        prop_assert!(matches!(classify_for(&command, &done), LineClass::Terminator(_)));
    }

    #[test]
    fn test_banner_rules_end_status(width in 3usize..60) {
        let rule = "=".repeat(width);
        prop_assert!(matches!(
            classify_for(&Command::Status, &rule),
            LineClass::Terminator(_)
        ));
    }
}
