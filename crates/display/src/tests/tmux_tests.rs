use super::*;

#[test]
fn window_must_match_a_whole_name() {
    let listing = "padd\ncontrol\n";

    assert!(window_listed(listing, "control"));
    assert!(window_listed(listing, "padd"));
    assert!(!window_listed(listing, "pad"));
    assert!(!window_listed(listing, "logs"));
    assert!(!window_listed("", "padd"));
}

#[test]
fn first_pid_skips_noise() {
    assert_eq!(first_pid("1234\n5678\n"), Some(1234));
    assert_eq!(first_pid("  \n 42 \n"), Some(42));
    assert_eq!(first_pid(""), None);
    assert_eq!(first_pid("not-a-pid"), None);
}
