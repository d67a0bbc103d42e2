use super::{Block, BlockLine, glob_match};

fn block(hosts: &[&str]) -> Block {
    Block::new("", hosts.iter().map(|h| h.to_string()).collect(), false, "")
}

#[test]
fn glob_matches_star_and_question() {
    assert!(glob_match("web*", "web-1"));
    assert!(glob_match("web?", "web1"));
    assert!(!glob_match("web?", "web-10"));
    assert!(glob_match("*", "anything"));
    assert!(!glob_match("db*", "web"));
}

#[test]
fn test_requires_a_positive_hit() {
    let b = block(&["web*", "db"]);
    assert!(b.test("web-1"));
    assert!(b.test("db"));
    assert!(!b.test("cache"));
}

#[test]
fn negated_pattern_vetoes_the_block() {
    let b = block(&["web*", "!web-db"]);
    assert!(b.test("web-1"));
    assert!(!b.test("web-db"));
    assert!(!b.test("db"));
}

#[test]
fn trimmed_skips_blanks_and_comments() {
    let mut b = block(&["h"]);
    b.push(BlockLine::Raw("  User root".to_string()));
    b.push(BlockLine::Raw("  # a comment".to_string()));
    b.push(BlockLine::Raw("  Port 22".to_string()));

    let lines = b.trimmed(7);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].0, "User root");
    assert_eq!(lines[0].1.opt(), "user");
    assert_eq!(lines[0].2, 7);
    assert_eq!(lines[1].1.opt(), "port");
}

#[test]
fn ordinals_increase_per_block() {
    let a = block(&[]);
    let b = block(&[]);
    assert!(b.no > a.no);
}
