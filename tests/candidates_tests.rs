use relay_probe_rs::candidates::{parse_candidates_str, CandidateSource, StaticPool};

#[test]
fn mixed_list_parses_dedups_and_caps() {
    let input = r#"
        # relay candidate pool
        104.16.1.7
        104.16.1.7:2053   # duplicate address, dropped
        188.114.96.5:443
        10.0.0.0/29       # 6 hosts, capped below
        not an address
    "#;

    let out = parse_candidates_str(input, 3);
    let ips: Vec<String> = out.iter().map(|c| c.ip.to_string()).collect();
    assert_eq!(
        ips,
        vec![
            "104.16.1.7",
            "188.114.96.5",
            "10.0.0.1",
            "10.0.0.3",
            "10.0.0.5",
        ]
    );
    // First occurrence wins: the plain form keeps no port override.
    assert_eq!(out[0].port, None);
    assert_eq!(out[1].port, Some(443));
}

#[test]
fn pool_is_drained_in_batches_until_empty() {
    let mut pool = StaticPool::new(parse_candidates_str("1.1.1.1\n2.2.2.2\n3.3.3.3\n4.4.4.4\n", 1));

    let first = pool.next_batch(3);
    assert_eq!(first.len(), 3);
    let second = pool.next_batch(3);
    assert_eq!(second.len(), 1);
    assert!(pool.next_batch(3).is_empty());
}
