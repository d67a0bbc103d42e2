use super::Config;
use std::io::Cursor;

fn parse(text: &str) -> Config {
    Config::parse(Cursor::new(text.to_string())).expect("in-memory parse")
}

fn opts(conf: &Config, host: &str) -> Vec<String> {
    conf.query(host).iter().map(|l| l.text.clone()).collect()
}

#[test]
fn leading_directives_become_defaults() {
    let conf = parse("Compression yes\n\nHost h\n  User u\n");
    let rendered = conf.render(None);
    assert!(rendered.starts_with("Host *  # Default\n"));
    assert!(opts(&conf, "elsewhere").contains(&"Compression yes".to_string()));
}

#[test]
fn render_is_stable_after_one_pass() {
    let input = "\
Port 2222

Host web db*
  User root  # admin
  IdentityFile ~/.ssh/id_a

Match exec \"true\"
  ForwardAgent yes

Host web
  Hostname 10.0.0.1
";
    let first = parse(input).render(None);
    let second = parse(&first).render(None);
    assert_eq!(first, second);
}

#[test]
fn query_takes_first_occurrence_per_option() {
    let conf = parse("Host h\n  User first\n\nHost h\n  User second\n  Port 22\n");
    let lines = opts(&conf, "h");
    assert_eq!(lines, vec!["User first", "Port 22"]);
}

#[test]
fn identity_directives_accumulate_across_blocks() {
    let conf = parse(
        "Host *\n  IdentityFile ~/.ssh/a\n  IdentityFile ~/.ssh/b\n\nHost x\n  User u\n",
    );
    let lines = opts(&conf, "x");
    let identities: Vec<&String> = lines.iter().filter(|l| l.starts_with("IdentityFile")).collect();
    assert_eq!(identities, vec!["IdentityFile ~/.ssh/a", "IdentityFile ~/.ssh/b"]);
}

#[test]
fn wildcard_blocks_respect_host_test() {
    let conf = parse("Host web*\n  User web\n\nHost db\n  User db\n");
    assert_eq!(opts(&conf, "web-1"), vec!["User web"]);
    assert!(opts(&conf, "db").contains(&"User db".to_string()));
    assert!(!opts(&conf, "db").contains(&"User web".to_string()));
}

#[test]
fn attach_inherits_the_difference() {
    let mut conf = parse("Host h\n  Hostname 1.2.3.4\n  User u\n");
    conf.attach("n", "h");

    let lines = opts(&conf, "n");
    assert!(lines.contains(&"Hostname 1.2.3.4".to_string()));
    assert!(lines.contains(&"User u".to_string()));
    // The source pinned a Hostname already, so none is synthesised.
    assert!(!lines.contains(&"Hostname h".to_string()));

    let rendered = conf.render(None);
    assert!(rendered.starts_with("Host n  # inherits from h\n"));
    assert!(rendered.contains("  Hostname 1.2.3.4  # Host h\n"));
    assert!(rendered.contains("  User u\n"));
}

#[test]
fn attach_adds_hostname_when_source_has_none() {
    let mut conf = parse("Host h\n  User u\n");
    conf.attach("n", "h");
    assert!(opts(&conf, "n").contains(&"Hostname h".to_string()));
}

#[test]
fn attach_to_itself_is_a_no_op() {
    let mut conf = parse("Host h\n  User u\n");
    let before = conf.render(None);
    conf.attach("h", "h");
    assert_eq!(conf.render(None), before);
}

#[test]
fn attach_skips_directives_the_alias_already_has() {
    let mut conf = parse("Host h\n  User u\n  Port 22\n\nHost n\n  Port 22\n");
    conf.attach("n", "h");
    let lines = opts(&conf, "n");
    let ports: Vec<&String> = lines.iter().filter(|l| l.starts_with("Port")).collect();
    assert_eq!(ports.len(), 1);
    assert!(lines.contains(&"User u".to_string()));
}

#[test]
fn add_host_dedups_on_payload() {
    use crate::ssh_config::BlockLine;

    let mut conf = parse("Host h\n  User u\n");
    let lines = || vec![BlockLine::Raw("ProxyJump j".to_string())];
    let first = conf.add_host(&["x".to_string()], lines(), "via j");
    let second = conf.add_host(&["y".to_string()], lines(), "via j");
    assert_eq!(first, second);

    let rendered = conf.render(None);
    assert!(rendered.contains("Host x y  # via j\n"));

    // A different comment is merged, not duplicated.
    conf.add_host(&["x".to_string()], lines(), "other");
    assert!(conf.render(None).contains("Host x y  # via j; other\n"));
}

#[test]
fn sub_replaces_tokens_and_annotates() {
    let mut conf = parse("Host h\n  ProxyCommand {{ CMD }}\n");
    let res = conf.sub(|key| format!("nc -x proxy # {key}"));

    assert_eq!(res.get("CMD").map(String::as_str), Some("nc -x proxy"));
    let rendered = conf.render(None);
    assert!(rendered.contains("  ProxyCommand nc -x proxy # CMD # CMD\n"));
}

#[test]
fn sub_leaves_plain_lines_alone() {
    let mut conf = parse("Host h\n  User u\n");
    let res = conf.sub(|_| unreachable!("no tokens to replace"));
    assert!(res.is_empty());
    assert!(conf.render(None).contains("  User u\n"));
}

#[test]
fn hostnames_yield_first_hit_per_host() {
    let conf = parse(
        "Host h\n  Hostname 10.0.0.1\n\nHost h\n  Hostname 10.0.0.2\n\nHost bare\n  User u\n",
    );
    let mut pairs = conf.hostnames();
    pairs.sort();
    assert_eq!(pairs, vec![("h".to_string(), "10.0.0.1".to_string())]);
}

#[test]
fn hosts_lists_exact_names_only() {
    let conf = parse("Host web* db gw\n  User u\n");
    let mut hosts = conf.hosts();
    hosts.sort();
    assert_eq!(hosts, vec!["db", "gw"]);
}

#[test]
fn separator_sits_between_ext_and_input_blocks() {
    let mut conf = parse("Host h\n  User u\n");
    conf.attach("n", "h");
    let rendered = conf.render(Some("# ----"));
    let sep = rendered.find("# ----").expect("separator present");
    let ext = rendered.find("Host n").expect("ext block present");
    let orig = rendered.find("\nHost h\n").expect("input block present");
    assert!(ext < sep && sep < orig);
}
