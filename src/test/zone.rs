use super::{ZoneConfig, ZoneError, parse_ini};
use crate::probe::{Backend, Gateways, Interfaces, Locality};
use crate::ssh_config::Config;
use crate::Error;
use std::io::Cursor;
use std::net::Ipv4Addr;

fn conf(text: &str) -> Config {
    Config::parse(Cursor::new(text.to_string())).expect("in-memory parse")
}

fn zone_err(result: crate::Result<ZoneConfig>) -> ZoneError {
    match result {
        Err(Error::Zone(err)) => err,
        Err(other) => panic!("expected a zone error, got {other}"),
        Ok(_) => panic!("expected a zone error"),
    }
}

/// Gateway 10.1.0.1, five and a half hours east.
fn here() -> Locality {
    let gws = Gateways::from_addrs(vec![Ipv4Addr::new(10, 1, 0, 1)]);
    Locality::fixed(Backend::Gateways(gws), 5.5 * 3600.0)
}

#[test]
fn parses_sections_pairs_and_continuations() {
    let sections = parse_ini(
        "# top comment\n[alpha]\nhost = a\narc: B:30\n; another comment\n[beta]\nhost = b\n    b2:x\n",
    )
    .expect("valid file");
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0].0, "alpha");
    assert_eq!(sections[0].1, vec![
        ("host".to_string(), "a".to_string()),
        ("arc".to_string(), "B:30".to_string()),
    ]);
    // The indented line continues the previous value.
    assert_eq!(sections[1].1, vec![("host".to_string(), "b b2:x".to_string())]);
}

#[test]
fn pairs_outside_a_section_are_rejected() {
    assert!(matches!(parse_ini("host = a\n"), Err(ZoneError::Parse(_))));
    assert!(matches!(parse_ini("[z]\njust words\n"), Err(ZoneError::Parse(_))));
}

#[test]
fn duplicate_aliases_across_zones_are_rejected() {
    let err = zone_err(ZoneConfig::parse("[A]\nhost = a:shared\n[B]\nhost = b shared\n", None));
    match err {
        ZoneError::DuplicateName { name, zone } => {
            assert_eq!(name, "shared");
            assert_eq!(zone, "B");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn arc_grammar_direct_zone_and_costed_variants() {
    // Direct zone link, via-host with cost, and full via:to:cost. Only A
    // is a source; the other zones sit behind an unmatched subnet.
    let text = "\
[A]
host = a
arc = B b2:C:15
[B]
host = b
subnet = 192.0.2.0/24
arc = c:25
[C]
host = c:b2
subnet = 192.0.2.0/24
";
    let mut zc = ZoneConfig::parse(text, None).expect("valid zones");
    let graph = zc.route(&here());
    // B is reached directly (cost 20), its host b one step further.
    assert_eq!(graph.trace("b").unwrap(), Some(vec!["b".to_string()]));
    // b2 is C's alias: A reaches c through it at cost 15, cheaper than
    // the 25-cost arc out of B.
    assert_eq!(graph.trace("c").unwrap(), Some(vec!["b2".to_string()]));
    assert_eq!(graph.zone_dist(2), 15);
}

#[test]
fn arc_with_unknown_zone_is_rejected() {
    let err = zone_err(ZoneConfig::parse("[A]\nhost = a\narc = via:nowhere:5\n", None));
    assert!(matches!(err, ZoneError::UnknownZone(_)));
}

#[test]
fn arc_with_bad_cost_is_rejected() {
    let err = zone_err(ZoneConfig::parse(
        "[A]\nhost = a\narc = via:B:cheap\n[B]\nhost = b\n",
        None,
    ));
    assert!(matches!(err, ZoneError::BadCost(_)));
}

#[test]
fn arc_with_unresolvable_via_is_rejected() {
    let err = zone_err(ZoneConfig::parse("[A]\nhost = a\narc = mystery\n", None));
    assert!(matches!(err, ZoneError::MissingTarget(_)));
}

#[test]
fn bad_subnet_and_timezone_are_rejected() {
    assert!(matches!(
        zone_err(ZoneConfig::parse("[A]\nsubnet = not-a-net\n", None)),
        ZoneError::BadSubnet(_)
    ));
    assert!(matches!(
        zone_err(ZoneConfig::parse("[A]\ntimezone = noon\n", None)),
        ZoneError::BadTimezone(_)
    ));
}

#[test]
fn source_predicate_ands_timezone_with_subnets() {
    let text = "\
[tz-only]
host = a
timezone = 5.5
[subnet-only]
host = b
subnet = 10.1.0.0/16
[both-wrong-tz]
host = c
timezone = -8
subnet = 10.1.0.0/16
[both]
host = d
timezone = 5.5
subnet = 192.0.2.0/24 10.1.0.0/16
[unconstrained]
host = e
";
    let mut zc = ZoneConfig::parse(text, None).expect("valid zones");
    let graph = zc.route(&here());
    // Sources have distance zero; their hosts sit one step out.
    assert_eq!(graph.zone_dist(0), 0);
    assert_eq!(graph.zone_dist(1), 0);
    assert_eq!(graph.zone_dist(2), crate::route::INF);
    assert_eq!(graph.zone_dist(3), 0);
    assert_eq!(graph.zone_dist(4), 0);
}

#[test]
fn state_key_reflects_declared_predicates() {
    let loc = here();

    let zc = ZoneConfig::parse("[A]\nhost = a\n", None).expect("valid");
    assert_eq!(zc.state(&loc), "");

    let zc = ZoneConfig::parse("[A]\nhost = a\ntimezone = 5.5\n", None).expect("valid");
    assert_eq!(zc.state(&loc), "tz:19800");

    let zc = ZoneConfig::parse(
        "[A]\nhost = a\ntimezone = 5.5\n[B]\nhost = b\nsubnet = 10.1.0.0/16\n",
        None,
    )
    .expect("valid");
    let state = zc.state(&loc);
    assert_eq!(state, "tz:19800|if:gateways: 10.1.0.1");
    // Deterministic for a fixed environment.
    assert_eq!(zc.state(&loc), state);
}

#[test]
fn smart_discovery_claims_subnet_hosts_with_prefix_aliases() {
    let conf = conf(
        "Host web\n  Hostname 10.0.0.5\n\nHost web-a\n  Hostname 10.0.0.6\n\nHost webby\n  Hostname named.example\n\nHost db\n  Hostname 10.9.0.1\n",
    );
    let mut zc = ZoneConfig::parse("[Z]\nsubnet = 10.0.0.0/24\narc = gw:Z:5\n", Some(&conf))
        .expect("valid zones");

    let graph = zc.graph();
    // web was discovered canonical; web-a and webby share its prefix.
    assert!(graph.has_node("web"));
    assert!(!graph.has_node("web-a"));
    assert!(!graph.has_node("webby"));
    assert!(graph.contains(0, "web"));
    assert!(graph.contains(0, "web-a"));
    assert!(graph.contains(0, "webby"));
    // db's address is outside the subnet.
    assert!(!graph.has_node("db"));
    assert!(!graph.contains(0, "db"));
}

#[test]
fn strict_zones_do_not_discover() {
    let conf = conf("Host web\n  Hostname 10.0.0.5\n");
    let mut zc = ZoneConfig::parse(
        "[Z]\nsubnet = 10.0.0.0/24\nstrict-host = yes\n",
        Some(&conf),
    )
    .expect("valid zones");
    assert!(!zc.graph().has_node("web"));
}

#[test]
fn discovery_skips_hosts_already_claimed() {
    let conf = conf("Host web\n  Hostname 10.0.0.5\n");
    let mut zc = ZoneConfig::parse(
        "[A]\nhost = web\nstrict-host = yes\n[Z]\nsubnet = 10.0.0.0/24\n",
        Some(&conf),
    )
    .expect("valid zones");
    // web already belongs to A; Z must not claim it.
    assert!(zc.graph().contains(0, "web"));
    assert!(!zc.graph().contains(1, "web"));
}

#[test]
fn direct_mode_unwraps_prefixed_managed_hosts() {
    let zc = ZoneConfig::parse("[A]\nhost = h\n", None).expect("valid zones");
    assert_eq!(zc.resolve_direct_mode("d.h"), Some("h".to_string()));
    // Managed hosts route normally.
    assert_eq!(zc.resolve_direct_mode("h"), None);
    // Unmanaged names pass through untouched, zone names included.
    assert_eq!(zc.resolve_direct_mode("elsewhere"), Some("elsewhere".to_string()));
    assert_eq!(zc.resolve_direct_mode("A"), Some("A".to_string()));
    assert_eq!(zc.resolve_direct_mode("d.unknown"), Some("d.unknown".to_string()));
}

#[test]
fn hooks_outside_the_working_directory_are_rejected() {
    let outside = tempfile::NamedTempFile::new().expect("temp file");
    let text = format!("[A]\nhost = a\nhook = {}\n", outside.path().display());
    let err = zone_err(ZoneConfig::parse(&text, None));
    assert!(matches!(err, ZoneError::HookOutsideCwd(_)));
}

// Hook files must live under the working directory, so these place them
// in a temporary directory inside it.
#[cfg(unix)]
fn hook_dir() -> tempfile::TempDir {
    let cwd = std::env::current_dir().expect("cwd");
    tempfile::Builder::new()
        .prefix("luna-hook")
        .tempdir_in(cwd)
        .expect("temp dir in cwd")
}

#[cfg(unix)]
fn write_hook(dir: &std::path::Path, body: &str, mode: u32) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let hook = dir.join("hook.sh");
    std::fs::write(&hook, body).expect("write hook");
    let mut perms = std::fs::metadata(&hook).expect("hook metadata").permissions();
    perms.set_mode(mode);
    std::fs::set_permissions(&hook, perms).expect("chmod hook");
    hook
}

#[cfg(unix)]
#[test]
fn hooks_receive_the_event_name_and_json_payload() {
    let dir = hook_dir();
    let event_out = dir.path().join("event");
    let payload_out = dir.path().join("payload");
    let hook = write_hook(
        dir.path(),
        &format!(
            "#!/bin/sh\nprintf '%s' \"$1\" > \"{}\"\ncat > \"{}\"\n",
            event_out.display(),
            payload_out.display()
        ),
        0o755,
    );

    let text = format!("[A]\nhost = a\nhook = {}\n", hook.display());
    let zc = ZoneConfig::parse(&text, None).expect("valid zones");

    let payload = serde_json::json!({"output": "out", "host": "a", "state": "tz:19800"});
    zc.run_hooks("generated", &payload).expect("hooks run");

    assert_eq!(
        std::fs::read_to_string(&event_out).expect("event written"),
        "generated"
    );
    let echoed: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(&payload_out).expect("payload written"),
    )
    .expect("payload is json");
    assert_eq!(echoed, payload);
}

#[cfg(unix)]
#[test]
fn hook_spawn_failures_surface_as_errors() {
    let dir = hook_dir();
    // Present but not executable, so the spawn itself fails.
    let hook = write_hook(dir.path(), "#!/bin/sh\n", 0o644);

    let text = format!("[A]\nhost = a\nhook = {}\n", hook.display());
    let zc = ZoneConfig::parse(&text, None).expect("valid zones");
    assert!(zc.run_hooks("generated", &serde_json::json!({})).is_err());
}

#[test]
fn interface_backend_state_matches_exact_subnets_only() {
    let ints = Interfaces::from_addrs(vec!["10.1.2.3/16".parse().expect("valid cidr")]);
    let loc = Locality::fixed(Backend::Interfaces(ints), 0.0);
    let mut zc = ZoneConfig::parse("[A]\nhost = a\nsubnet = 10.1.0.0/16\n", None).expect("valid");
    let graph = zc.route(&loc);
    assert_eq!(graph.zone_dist(0), 0);

    let state = zc.state(&loc);
    assert_eq!(state, "if:interfaces: 10.1.2.3/16");
}
