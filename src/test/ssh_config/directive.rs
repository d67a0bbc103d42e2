use super::super::tokenize;
use super::Directive;
use std::collections::HashSet;

#[test]
fn tokenize_strips_comments_outside_quotes() {
    assert_eq!(tokenize("User root # the admin"), vec!["User", "root"]);
    assert_eq!(
        tokenize("ProxyCommand 'nc # not-a-comment' %h"),
        vec!["ProxyCommand", "nc # not-a-comment", "%h"]
    );
    assert!(tokenize("   # only a comment").is_empty());
    assert!(tokenize("").is_empty());
}

#[test]
fn parses_option_and_values() {
    let d = Directive::parse("HostName example.com");
    assert_eq!(d.opt(), "hostname");
    assert_eq!(d.values, vec!["example.com"]);
    assert!(!d.is_empty());
}

#[test]
fn blank_and_comment_lines_are_empty() {
    assert!(Directive::parse("").is_empty());
    assert!(Directive::parse("  # nothing here").is_empty());
}

#[test]
fn splits_key_value_syntax() {
    let d = Directive::parse("Foo=bar baz");
    assert_eq!(d.opt(), "foo");
    assert_eq!(d.values, vec!["bar", "baz"]);

    // Quoting is resolved before the split, so the value re-tokenises.
    let quoted = Directive::parse("Foo='a b' c");
    assert_eq!(quoted.opt(), "foo");
    assert_eq!(quoted.values, vec!["a", "b", "c"]);
}

#[test]
fn display_normalises_spacing_and_drops_comments() {
    let d = Directive::parse("User   root   # trailing");
    assert_eq!(d.to_string(), "User root");

    let bare = Directive::parse("Compression");
    assert_eq!(bare.to_string(), "Compression");
}

#[test]
fn equality_ignores_option_case() {
    let a = Directive::parse("HostName x");
    let b = Directive::parse("hostname x");
    let c = Directive::parse("hostname y");
    assert_eq!(a, b);
    assert_ne!(a, c);

    let mut set = HashSet::new();
    set.insert(a);
    assert!(set.contains(&b));
}
